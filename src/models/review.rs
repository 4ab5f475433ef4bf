use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reseña sobre un usuario (o un viaje puntual). Este módulo solo las lee:
/// las calificaciones llegan cargadas de afuera, no hay alta desde la app.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub user_id: String,
    pub trip_id: Option<String>,
    pub rating: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub reviewer: Reviewer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reviewer {
    pub id: String,
    pub name: String,
    pub avatar: Option<String>,
}
