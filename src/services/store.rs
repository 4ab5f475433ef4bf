use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, Row};

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        booking::{Booking, BookingStatus},
        review::{Review, Reviewer},
        trip::{GeoPoint, Stop, Trip, TripDriver, Vehicle},
        user::{FrequentRoute, User, UserStats},
    },
};

/// Frontera con el almacén de datos. Toda falla de SQL sale de acá como
/// `AppError::Store`; ningún error del proveedor sube crudo hasta el render.
#[derive(Clone)]
pub struct TripStore {
    db: DbPool,
}

const SELECT_TRIPS: &str = "SELECT t.id, t.driver_id, t.origin, t.destination, \
     t.origin_lat, t.origin_lng, t.destination_lat, t.destination_lng, \
     t.date, t.departure_time, t.arrival_time, t.duration, t.price, \
     t.available_seats, t.vehicle_brand, t.vehicle_model, t.vehicle_year, \
     t.vehicle_plate, t.features, t.notes, t.meeting_point, t.drop_off_point, \
     t.stops, t.created_at, \
     u.name AS driver_name, u.avatar AS driver_avatar, \
     u.rating AS driver_rating, u.review_count AS driver_review_count \
     FROM trips t LEFT JOIN users u ON u.uuid = t.driver_id";

impl TripStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Consulta con predicados exactos sobre origen, destino y fecha, tal
    /// como la ejecuta el almacén. El matcheo laxo por subcadena vive en
    /// `search::filter_and_sort` para listas ya traídas.
    pub async fn search_trips(
        &self,
        origin: &str,
        destination: &str,
        date: NaiveDate,
    ) -> Result<Vec<Trip>, AppError> {
        let sql = format!(
            "{SELECT_TRIPS} WHERE t.origin = ?1 AND t.destination = ?2 AND t.date = ?3 \
             ORDER BY t.departure_time"
        );
        let rows = sqlx::query_as::<_, TripRow>(&sql)
            .bind(origin)
            .bind(destination)
            .bind(date)
            .fetch_all(&self.db)
            .await?;
        Ok(rows.into_iter().map(TripRow::into_trip).collect())
    }

    pub async fn recent_trips(&self, limit: i64) -> Result<Vec<Trip>, AppError> {
        let sql = format!("{SELECT_TRIPS} ORDER BY t.created_at DESC LIMIT ?1");
        let rows = sqlx::query_as::<_, TripRow>(&sql)
            .bind(limit)
            .fetch_all(&self.db)
            .await?;
        Ok(rows.into_iter().map(TripRow::into_trip).collect())
    }

    pub async fn get_trip(&self, id: &str) -> Result<Option<Trip>, AppError> {
        let sql = format!("{SELECT_TRIPS} WHERE t.id = ?1");
        let row = sqlx::query_as::<_, TripRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(TripRow::into_trip))
    }

    pub async fn related_trips(
        &self,
        origin: &str,
        destination: &str,
        from_date: NaiveDate,
        exclude_id: &str,
        limit: i64,
    ) -> Result<Vec<Trip>, AppError> {
        let sql = format!(
            "{SELECT_TRIPS} WHERE t.origin = ?1 AND t.destination = ?2 \
             AND t.date >= ?3 AND t.id != ?4 \
             ORDER BY t.date, t.departure_time LIMIT ?5"
        );
        let rows = sqlx::query_as::<_, TripRow>(&sql)
            .bind(origin)
            .bind(destination)
            .bind(from_date)
            .bind(exclude_id)
            .bind(limit)
            .fetch_all(&self.db)
            .await?;
        Ok(rows.into_iter().map(TripRow::into_trip).collect())
    }

    pub async fn trips_by_driver(&self, driver_uuid: &str) -> Result<Vec<Trip>, AppError> {
        let sql = format!("{SELECT_TRIPS} WHERE t.driver_id = ?1 ORDER BY t.date DESC");
        let rows = sqlx::query_as::<_, TripRow>(&sql)
            .bind(driver_uuid)
            .fetch_all(&self.db)
            .await?;
        Ok(rows.into_iter().map(TripRow::into_trip).collect())
    }

    pub async fn create_trip(&self, trip: &Trip) -> Result<(), AppError> {
        let features = serde_json::to_string(&trip.features)
            .map_err(|err| AppError::Other(err.into()))?;
        let stops =
            serde_json::to_string(&trip.stops).map_err(|err| AppError::Other(err.into()))?;

        sqlx::query(
            "INSERT INTO trips (id, driver_id, origin, destination, origin_lat, origin_lng, \
             destination_lat, destination_lng, date, departure_time, arrival_time, duration, \
             price, available_seats, vehicle_brand, vehicle_model, vehicle_year, vehicle_plate, \
             features, notes, meeting_point, drop_off_point, stops, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, \
             ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)",
        )
        .bind(&trip.id)
        .bind(&trip.driver_id)
        .bind(&trip.origin)
        .bind(&trip.destination)
        .bind(trip.origin_coords.map(|c| c.lat))
        .bind(trip.origin_coords.map(|c| c.lng))
        .bind(trip.destination_coords.map(|c| c.lat))
        .bind(trip.destination_coords.map(|c| c.lng))
        .bind(trip.date)
        .bind(&trip.departure_time)
        .bind(&trip.arrival_time)
        .bind(&trip.duration)
        .bind(trip.price)
        .bind(trip.available_seats)
        .bind(&trip.vehicle.brand)
        .bind(&trip.vehicle.model)
        .bind(trip.vehicle.year)
        .bind(&trip.vehicle.plate)
        .bind(&features)
        .bind(&trip.notes)
        .bind(&trip.meeting_point)
        .bind(&trip.drop_off_point)
        .bind(&stops)
        .bind(trip.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Descuento de asientos con piso en cero, en una sola sentencia
    /// condicional: el contador nunca queda negativo aunque dos reservas
    /// hayan validado contra el mismo valor viejo.
    pub async fn decrement_available_seats(
        &self,
        trip_id: &str,
        seats: i64,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE trips SET available_seats = MAX(0, available_seats - ?1) WHERE id = ?2")
            .bind(seats)
            .bind(trip_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    pub async fn create_booking(&self, booking: &Booking) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO bookings (id, trip_id, user_id, seats, message, status, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&booking.id)
        .bind(&booking.trip_id)
        .bind(&booking.user_id)
        .bind(booking.seats)
        .bind(&booking.message)
        .bind(booking.status.as_str())
        .bind(booking.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    pub async fn bookings_for_user(
        &self,
        user_uuid: &str,
    ) -> Result<Vec<(Booking, Trip)>, AppError> {
        let rows = sqlx::query_as::<_, BookingRow>(
            "SELECT id, trip_id, user_id, seats, message, status, created_at \
             FROM bookings WHERE user_id = ?1 ORDER BY created_at DESC",
        )
        .bind(user_uuid)
        .fetch_all(&self.db)
        .await?;

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let booking = row.into_booking();
            if let Some(trip) = self.get_trip(&booking.trip_id).await? {
                result.push((booking, trip));
            }
        }
        Ok(result)
    }

    pub async fn get_user(&self, uuid: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE uuid = ?1")
            .bind(uuid)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    pub async fn update_profile(
        &self,
        uuid: &str,
        update: &ProfileUpdate,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE users SET name = ?1, phone = ?2, bio = ?3, vehicle_brand = ?4, \
             vehicle_model = ?5, vehicle_year = ?6, vehicle_plate = ?7, vehicle_active = ?8 \
             WHERE uuid = ?9",
        )
        .bind(&update.name)
        .bind(&update.phone)
        .bind(&update.bio)
        .bind(&update.vehicle_brand)
        .bind(&update.vehicle_model)
        .bind(update.vehicle_year)
        .bind(&update.vehicle_plate)
        .bind(update.vehicle_active)
        .bind(uuid)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    pub async fn reviews_for_user(&self, user_uuid: &str) -> Result<Vec<Review>, AppError> {
        let rows = sqlx::query_as::<_, ReviewRow>(
            "SELECT r.id, r.user_id, r.trip_id, r.rating, r.content, r.created_at, \
             r.reviewer_id, ru.name AS reviewer_name, ru.avatar AS reviewer_avatar \
             FROM reviews r LEFT JOIN users ru ON ru.uuid = r.reviewer_id \
             WHERE r.user_id = ?1 ORDER BY r.created_at DESC",
        )
        .bind(user_uuid)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(ReviewRow::into_review).collect())
    }

    pub async fn user_stats(
        &self,
        user_uuid: &str,
        today: NaiveDate,
    ) -> Result<UserStats, AppError> {
        let trips_completed: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM trips WHERE driver_id = ?1 AND date < ?2")
                .bind(user_uuid)
                .bind(today)
                .fetch_one(&self.db)
                .await?;

        let passengers_transported: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(b.seats), 0) FROM bookings b \
             JOIN trips t ON t.id = b.trip_id WHERE t.driver_id = ?1",
        )
        .bind(user_uuid)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query(
            "SELECT origin, destination, COUNT(*) AS route_count FROM trips \
             WHERE driver_id = ?1 GROUP BY origin, destination \
             ORDER BY route_count DESC LIMIT 3",
        )
        .bind(user_uuid)
        .fetch_all(&self.db)
        .await?;
        let frequent_routes = rows
            .into_iter()
            .map(|row| FrequentRoute {
                origin: row.get("origin"),
                destination: row.get("destination"),
                count: row.get("route_count"),
            })
            .collect();

        Ok(UserStats {
            trips_completed,
            passengers_transported,
            frequent_routes,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub name: String,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub vehicle_brand: Option<String>,
    pub vehicle_model: Option<String>,
    pub vehicle_year: Option<i64>,
    pub vehicle_plate: Option<String>,
    pub vehicle_active: bool,
}

#[derive(Debug, FromRow)]
struct TripRow {
    id: String,
    driver_id: String,
    origin: String,
    destination: String,
    origin_lat: Option<f64>,
    origin_lng: Option<f64>,
    destination_lat: Option<f64>,
    destination_lng: Option<f64>,
    date: NaiveDate,
    departure_time: String,
    arrival_time: Option<String>,
    duration: Option<String>,
    price: f64,
    available_seats: i64,
    vehicle_brand: String,
    vehicle_model: String,
    vehicle_year: Option<i64>,
    vehicle_plate: Option<String>,
    features: Option<String>,
    notes: Option<String>,
    meeting_point: Option<String>,
    drop_off_point: Option<String>,
    stops: Option<String>,
    created_at: DateTime<Utc>,
    driver_name: Option<String>,
    driver_avatar: Option<String>,
    driver_rating: Option<f64>,
    driver_review_count: Option<i64>,
}

impl TripRow {
    /// Normalización al leer: las columnas JSON vacías o rotas degradan a
    /// listas vacías, y si el conductor ya no existe el viaje queda sin
    /// datos desnormalizados en vez de romper el listado.
    fn into_trip(self) -> Trip {
        let driver = match (self.driver_name, self.driver_rating) {
            (Some(name), Some(rating)) => Some(TripDriver {
                id: self.driver_id.clone(),
                name,
                avatar: self.driver_avatar,
                rating,
                review_count: self.driver_review_count.unwrap_or(0),
            }),
            _ => None,
        };

        Trip {
            id: self.id,
            driver_id: self.driver_id,
            origin: self.origin,
            destination: self.destination,
            origin_coords: geo_point(self.origin_lat, self.origin_lng),
            destination_coords: geo_point(self.destination_lat, self.destination_lng),
            date: self.date,
            departure_time: self.departure_time,
            arrival_time: self.arrival_time,
            duration: self.duration,
            price: self.price,
            available_seats: self.available_seats,
            vehicle: Vehicle {
                brand: self.vehicle_brand,
                model: self.vehicle_model,
                year: self.vehicle_year,
                plate: self.vehicle_plate,
            },
            features: decode_json_list(self.features.as_deref()),
            notes: self.notes,
            meeting_point: self.meeting_point,
            drop_off_point: self.drop_off_point,
            stops: decode_json_list(self.stops.as_deref()),
            driver,
            created_at: self.created_at,
        }
    }
}

fn geo_point(lat: Option<f64>, lng: Option<f64>) -> Option<GeoPoint> {
    match (lat, lng) {
        (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
        _ => None,
    }
}

fn decode_json_list<T: serde::de::DeserializeOwned>(raw: Option<&str>) -> Vec<T> {
    raw.and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default()
}

#[derive(Debug, FromRow)]
struct BookingRow {
    id: String,
    trip_id: String,
    user_id: String,
    seats: i64,
    message: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl BookingRow {
    fn into_booking(self) -> Booking {
        Booking {
            id: self.id,
            trip_id: self.trip_id,
            user_id: self.user_id,
            seats: self.seats,
            message: self.message,
            status: BookingStatus::parse(&self.status).unwrap_or_default(),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct ReviewRow {
    id: String,
    user_id: String,
    trip_id: Option<String>,
    rating: i64,
    content: String,
    created_at: DateTime<Utc>,
    reviewer_id: String,
    reviewer_name: Option<String>,
    reviewer_avatar: Option<String>,
}

impl ReviewRow {
    fn into_review(self) -> Review {
        Review {
            id: self.id,
            user_id: self.user_id,
            trip_id: self.trip_id,
            rating: self.rating,
            content: self.content,
            created_at: self.created_at,
            reviewer: Reviewer {
                id: self.reviewer_id,
                name: self.reviewer_name.unwrap_or_else(|| "Usuario".into()),
                avatar: self.reviewer_avatar,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    // Una consulta sin resultados devuelve una lista vacía; una consulta
    // contra un almacén caído devuelve `Store`. Nunca se confunden.
    #[tokio::test]
    async fn a_dead_store_reports_store_error_not_an_empty_list() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool");
        let store = TripStore::new(pool.clone());
        pool.close().await;

        let err = store.recent_trips(10).await.unwrap_err();
        assert!(matches!(err, AppError::Store(_)));
    }
}
