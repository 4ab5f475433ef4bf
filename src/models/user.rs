use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub uuid: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub rating: f64,
    pub review_count: i64,
    pub vehicle_brand: Option<String>,
    pub vehicle_model: Option<String>,
    pub vehicle_year: Option<i64>,
    pub vehicle_plate: Option<String>,
    pub vehicle_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_logout_at: Option<DateTime<Utc>>,
}

const MESES: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

impl User {
    pub fn vehicle(&self) -> Option<VehicleInfo> {
        let brand = self.vehicle_brand.as_deref()?;
        Some(VehicleInfo {
            brand: brand.to_string(),
            model: self.vehicle_model.clone().unwrap_or_default(),
            year: self.vehicle_year,
            plate: self.vehicle_plate.clone(),
            active: self.vehicle_active,
        })
    }

    pub fn bio_display(&self) -> &str {
        self.bio.as_deref().unwrap_or("")
    }

    /// "miembro desde junio 2023", derivado de la fecha de alta.
    pub fn member_since(&self) -> String {
        let month = MESES[self.created_at.month0() as usize];
        format!("{} {}", month, self.created_at.year())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleInfo {
    pub brand: String,
    pub model: String,
    pub year: Option<i64>,
    pub plate: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStats {
    pub trips_completed: i64,
    pub passengers_transported: i64,
    pub frequent_routes: Vec<FrequentRoute>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrequentRoute {
    pub origin: String,
    pub destination: String,
    pub count: i64,
}
