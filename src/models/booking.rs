use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Una solicitud de asientos de un pasajero sobre un viaje.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub trip_id: String,
    pub user_id: String,
    pub seats: i64,
    /// Mensaje para el conductor; cadena vacía cuando no se escribió nada.
    pub message: String,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BookingStatus {
    #[default]
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "accepted")]
    Accepted,
    #[serde(rename = "rejected")]
    Rejected,
    #[serde(rename = "canceled")]
    Canceled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Accepted => "accepted",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Canceled => "canceled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(BookingStatus::Pending),
            "accepted" => Some(BookingStatus::Accepted),
            "rejected" => Some(BookingStatus::Rejected),
            "canceled" => Some(BookingStatus::Canceled),
            _ => None,
        }
    }

    /// Transiciones admitidas. Hoy ningún handler las dispara: el flujo de
    /// reserva solo produce `Pending` y ahí queda.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Accepted) | (Pending, Rejected) | (Pending, Canceled) | (Accepted, Canceled)
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "Pendiente",
            BookingStatus::Accepted => "Aceptada",
            BookingStatus::Rejected => "Rechazada",
            BookingStatus::Canceled => "Cancelada",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::BookingStatus::*;

    #[test]
    fn pending_can_move_to_every_terminal_state() {
        assert!(Pending.can_transition_to(Accepted));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Pending.can_transition_to(Canceled));
    }

    #[test]
    fn accepted_can_only_be_canceled() {
        assert!(Accepted.can_transition_to(Canceled));
        assert!(!Accepted.can_transition_to(Pending));
        assert!(!Accepted.can_transition_to(Rejected));
    }

    #[test]
    fn terminal_states_do_not_move() {
        for status in [Rejected, Canceled] {
            for next in [Pending, Accepted, Rejected, Canceled] {
                assert!(!status.can_transition_to(next));
            }
        }
    }

    #[test]
    fn status_round_trips_through_storage_repr() {
        for status in [Pending, Accepted, Rejected, Canceled] {
            assert_eq!(super::BookingStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(super::BookingStatus::parse("confirmed"), None);
    }
}
