use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Un viaje publicado por un conductor: ruta, horario, precio y asientos.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: String,
    pub driver_id: String,
    pub origin: String,
    pub destination: String,
    pub origin_coords: Option<GeoPoint>,
    pub destination_coords: Option<GeoPoint>,
    pub date: NaiveDate,
    pub departure_time: String,
    pub arrival_time: Option<String>,
    pub duration: Option<String>,
    pub price: f64,
    pub available_seats: i64,
    pub vehicle: Vehicle,
    pub features: Vec<String>,
    pub notes: Option<String>,
    pub meeting_point: Option<String>,
    pub drop_off_point: Option<String>,
    pub stops: Vec<Stop>,
    pub driver: Option<TripDriver>,
    pub created_at: DateTime<Utc>,
}

impl Trip {
    pub fn new(driver_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            driver_id: driver_id.into(),
            origin: String::new(),
            destination: String::new(),
            origin_coords: None,
            destination_coords: None,
            date: Utc::now().date_naive(),
            departure_time: "00:00".into(),
            arrival_time: None,
            duration: None,
            price: 0.0,
            available_seats: 0,
            vehicle: Vehicle::default(),
            features: Vec::new(),
            notes: None,
            meeting_point: None,
            drop_off_point: None,
            stops: Vec::new(),
            driver: None,
            created_at: Utc::now(),
        }
    }

    pub fn notes_display(&self) -> &str {
        self.notes.as_deref().unwrap_or("")
    }

    pub fn is_upcoming(&self, today: NaiveDate) -> bool {
        self.date >= today
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vehicle {
    pub brand: String,
    pub model: String,
    pub year: Option<i64>,
    pub plate: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stop {
    pub location: String,
    pub time: String,
}

/// Datos del conductor desnormalizados sobre el viaje al momento de leerlo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripDriver {
    pub id: String,
    pub name: String,
    pub avatar: Option<String>,
    pub rating: f64,
    pub review_count: i64,
}
