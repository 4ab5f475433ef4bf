use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::AppError,
    models::booking::{Booking, BookingStatus},
    services::store::TripStore,
};

#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub trip_id: String,
    pub seats: i64,
    pub message: String,
}

/// Flujo de reserva: valida contra una lectura fresca del viaje, persiste la
/// solicitud en estado pendiente y después descuenta asientos.
///
/// La validación de asientos es consultiva: entre esta lectura y el
/// descuento, otra reserva pudo haber tomado los mismos asientos. El
/// descuento en sí tiene piso en cero, así que el contador nunca queda
/// negativo. Si el descuento falla, la reserva ya quedó escrita: se loguea
/// y no se revierte nada.
pub async fn submit_booking(
    store: &TripStore,
    passenger: &AuthenticatedUser,
    request: BookingRequest,
) -> Result<Booking, AppError> {
    if request.seats < 1 {
        return Err(AppError::Validation("Elegí al menos un asiento".into()));
    }

    let trip = store
        .get_trip(&request.trip_id)
        .await?
        .ok_or(AppError::NotFound)?;
    if request.seats > trip.available_seats {
        return Err(AppError::Validation(format!(
            "Quedan {} asientos disponibles para este viaje",
            trip.available_seats
        )));
    }

    let booking = Booking {
        id: Uuid::new_v4().to_string(),
        trip_id: trip.id.clone(),
        user_id: passenger.uuid.clone(),
        seats: request.seats,
        message: request.message.trim().to_string(),
        status: BookingStatus::Pending,
        created_at: Utc::now(),
    };

    if let Err(err) = store.create_booking(&booking).await {
        warn!("booking write failed for trip {}: {err}", trip.id);
        return Err(AppError::BookingFailed);
    }

    if let Err(err) = store
        .decrement_available_seats(&trip.id, request.seats)
        .await
    {
        warn!("seat decrement failed for trip {}: {err}", trip.id);
    }

    Ok(booking)
}
