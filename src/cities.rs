/// Ciudades con más búsquedas. Alimenta los datalist de los formularios de
/// búsqueda y publicación.
pub const POPULAR_CITIES: [&str; 18] = [
    "Buenos Aires",
    "Córdoba",
    "Rosario",
    "Mendoza",
    "Mar del Plata",
    "La Plata",
    "San Miguel de Tucumán",
    "Salta",
    "Santa Fe",
    "San Juan",
    "Resistencia",
    "Neuquén",
    "Posadas",
    "Bariloche",
    "Formosa",
    "Corrientes",
    "Bahía Blanca",
    "Paraná",
];
