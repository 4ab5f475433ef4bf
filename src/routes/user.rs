use askama::Template;
use askama_axum::IntoResponse as AskamaTemplateResponse;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use chrono::{Local, NaiveDate, NaiveTime};
use serde::Deserialize;

use crate::{
    auth::CurrentUser,
    cities::POPULAR_CITIES,
    error::AppError,
    models::trip::{Stop, Trip, Vehicle},
    services::bookings::{submit_booking, BookingRequest},
    services::store::ProfileUpdate,
    state::AppState,
};

use super::public::{format_date, format_price, trip_detail_template};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/publicar", get(publish_form).post(publish_submit))
        .route("/viaje/:id/reservar", post(booking_submit))
        .route("/mis-viajes", get(my_trips))
        .route("/mi-perfil", get(profile_edit_form).post(profile_edit_submit))
}

#[derive(Debug, Clone, Default)]
struct PublishFormValues {
    origen: String,
    destino: String,
    fecha: String,
    hora_salida: String,
    hora_llegada: String,
    asientos: String,
    precio: String,
    marca: String,
    modelo: String,
    anio: String,
    patente: String,
    notas: String,
    punto_encuentro: String,
    punto_bajada: String,
    paradas: String,
    aire: bool,
    musica: bool,
    mascotas: bool,
    fumar: bool,
    equipaje: bool,
}

#[derive(Template)]
#[template(path = "trip/new.html")]
struct PublishTemplate {
    logged_in: bool,
    cities: Vec<&'static str>,
    errors: Vec<String>,
    form: PublishFormValues,
}

async fn publish_form(current: CurrentUser) -> Result<impl IntoResponse, AppError> {
    current.require_user()?;
    Ok(AskamaTemplateResponse::into_response(PublishTemplate {
        logged_in: true,
        cities: POPULAR_CITIES.to_vec(),
        errors: Vec::new(),
        form: PublishFormValues::default(),
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PublishForm {
    origen: String,
    destino: String,
    fecha: String,
    hora_salida: String,
    hora_llegada: String,
    asientos: String,
    precio: String,
    marca: String,
    modelo: String,
    anio: String,
    patente: String,
    aire: Option<String>,
    musica: Option<String>,
    mascotas: Option<String>,
    fumar: Option<String>,
    equipaje: Option<String>,
    notas: String,
    punto_encuentro: String,
    punto_bajada: String,
    paradas: String,
}

async fn publish_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(form): Form<PublishForm>,
) -> Result<Response, AppError> {
    let user = current.require_user()?;
    let today = Local::now().date_naive();
    let mut errors = Vec::new();

    let origin = form.origen.trim().to_string();
    if origin.is_empty() {
        errors.push("Ingresá el origen".to_string());
    }
    let destination = form.destino.trim().to_string();
    if destination.is_empty() {
        errors.push("Ingresá el destino".to_string());
    }

    let date = match NaiveDate::parse_from_str(form.fecha.trim(), "%Y-%m-%d") {
        Ok(date) if date >= today => Some(date),
        Ok(_) => {
            errors.push("La fecha tiene que ser hoy o posterior".to_string());
            None
        }
        Err(_) => {
            errors.push("Ingresá una fecha válida".to_string());
            None
        }
    };

    let departure = match NaiveTime::parse_from_str(form.hora_salida.trim(), "%H:%M") {
        Ok(time) => Some(time),
        Err(_) => {
            errors.push("Ingresá una hora de salida válida (HH:MM)".to_string());
            None
        }
    };
    let arrival = match normalize_optional(Some(form.hora_llegada.clone())) {
        Some(raw) => match NaiveTime::parse_from_str(&raw, "%H:%M") {
            Ok(time) => Some(time),
            Err(_) => {
                errors.push("La hora de llegada no es válida (HH:MM)".to_string());
                None
            }
        },
        None => None,
    };

    let seats = match form.asientos.trim().parse::<i64>() {
        Ok(seats) if (1..=6).contains(&seats) => Some(seats),
        _ => {
            errors.push("Elegí entre 1 y 6 asientos".to_string());
            None
        }
    };
    let price = match form.precio.trim().parse::<f64>() {
        Ok(price) if price > 0.0 => Some(price),
        _ => {
            errors.push("Ingresá un precio por asiento mayor a cero".to_string());
            None
        }
    };

    let brand = form.marca.trim().to_string();
    if brand.is_empty() {
        errors.push("Contanos la marca del vehículo".to_string());
    }
    let model = form.modelo.trim().to_string();
    if model.is_empty() {
        errors.push("Contanos el modelo del vehículo".to_string());
    }
    let year = match normalize_optional(Some(form.anio.clone())) {
        Some(raw) => match raw.parse::<i64>() {
            Ok(year) if (1950..=2100).contains(&year) => Some(year),
            _ => {
                errors.push("El año del vehículo no es válido".to_string());
                None
            }
        },
        None => None,
    };

    let stops = match parse_stops(&form.paradas) {
        Ok(stops) => stops,
        Err(message) => {
            errors.push(message);
            Vec::new()
        }
    };

    if !errors.is_empty() {
        return Ok(render_publish_error(form, errors));
    }

    // A esta altura todos los campos obligatorios parsearon.
    let (Some(date), Some(departure), Some(seats), Some(price)) = (date, departure, seats, price)
    else {
        return Ok(render_publish_error(form, vec!["Revisá los datos del viaje".to_string()]));
    };

    let mut features = Vec::new();
    if form.aire.is_some() {
        features.push("Aire acondicionado".to_string());
    }
    if form.musica.is_some() {
        features.push("Música".to_string());
    }
    if form.mascotas.is_some() {
        features.push("Mascotas permitidas".to_string());
    }
    if form.fumar.is_some() {
        features.push("Se permite fumar".to_string());
    }
    if form.equipaje.is_some() {
        features.push("Equipaje grande".to_string());
    }

    let mut trip = Trip::new(user.uuid.as_str());
    trip.origin = origin;
    trip.destination = destination;
    trip.date = date;
    trip.departure_time = departure.format("%H:%M").to_string();
    trip.arrival_time = arrival.map(|time| time.format("%H:%M").to_string());
    trip.duration = arrival.and_then(|arrival| trip_duration(departure, arrival));
    trip.price = price;
    trip.available_seats = seats;
    trip.vehicle = Vehicle {
        brand,
        model,
        year,
        plate: normalize_optional(Some(form.patente.clone())),
    };
    trip.features = features;
    trip.notes = normalize_optional(Some(form.notas.clone()));
    trip.meeting_point = normalize_optional(Some(form.punto_encuentro.clone()));
    trip.drop_off_point = normalize_optional(Some(form.punto_bajada.clone()));
    trip.stops = stops;

    state.store.create_trip(&trip).await?;

    Ok(Redirect::to(&format!("/viaje/{}", trip.id)).into_response())
}

fn render_publish_error(form: PublishForm, errors: Vec<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        AskamaTemplateResponse::into_response(PublishTemplate {
            logged_in: true,
            cities: POPULAR_CITIES.to_vec(),
            errors,
            form: PublishFormValues {
                origen: form.origen,
                destino: form.destino,
                fecha: form.fecha,
                hora_salida: form.hora_salida,
                hora_llegada: form.hora_llegada,
                asientos: form.asientos,
                precio: form.precio,
                marca: form.marca,
                modelo: form.modelo,
                anio: form.anio,
                patente: form.patente,
                notas: form.notas,
                punto_encuentro: form.punto_encuentro,
                punto_bajada: form.punto_bajada,
                paradas: form.paradas,
                aire: form.aire.is_some(),
                musica: form.musica.is_some(),
                mascotas: form.mascotas.is_some(),
                fumar: form.fumar.is_some(),
                equipaje: form.equipaje.is_some(),
            },
        }),
    )
        .into_response()
}

#[derive(Deserialize)]
struct BookingForm {
    asientos: String,
    #[serde(default)]
    mensaje: String,
}

async fn booking_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
    Form(form): Form<BookingForm>,
) -> Result<Response, AppError> {
    let user = current.require_user()?;

    let request = BookingRequest {
        trip_id: id.clone(),
        seats: form.asientos.trim().parse().unwrap_or(0),
        message: form.mensaje,
    };

    match submit_booking(&state.store, user, request).await {
        Ok(_) => Ok(Redirect::to("/mis-viajes").into_response()),
        Err(AppError::Validation(message)) => {
            let template = trip_detail_template(&state, &id, true, Some(message)).await?;
            Ok((
                StatusCode::BAD_REQUEST,
                AskamaTemplateResponse::into_response(template),
            )
                .into_response())
        }
        Err(AppError::BookingFailed) => {
            let template = trip_detail_template(
                &state,
                &id,
                true,
                Some("No pudimos registrar tu reserva. Probá de nuevo en unos minutos.".to_string()),
            )
            .await?;
            Ok((
                StatusCode::BAD_GATEWAY,
                AskamaTemplateResponse::into_response(template),
            )
                .into_response())
        }
        Err(err) => Err(err),
    }
}

#[derive(Clone)]
struct PublishedRow {
    id: String,
    origin: String,
    destination: String,
    date: String,
    departure_time: String,
    price: String,
    available_seats: i64,
    status_label: &'static str,
}

#[derive(Clone)]
struct BookedRow {
    trip_id: String,
    origin: String,
    destination: String,
    date: String,
    departure_time: String,
    seats: i64,
    total: String,
    booking_status: &'static str,
    trip_status: &'static str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MyTripsQuery {
    estado: String,
}

#[derive(Template)]
#[template(path = "my_trips.html")]
struct MyTripsTemplate {
    logged_in: bool,
    status_filter: String,
    published: Vec<PublishedRow>,
    booked: Vec<BookedRow>,
}

async fn my_trips(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(q): Query<MyTripsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let today = Local::now().date_naive();
    let status_filter = match q.estado.as_str() {
        "upcoming" | "completed" => q.estado.clone(),
        _ => "all".to_string(),
    };
    let keep = |date: NaiveDate| match status_filter.as_str() {
        "upcoming" => date >= today,
        "completed" => date < today,
        _ => true,
    };

    let published = state
        .store
        .trips_by_driver(&user.uuid)
        .await?
        .into_iter()
        .filter(|trip| keep(trip.date))
        .map(|trip| PublishedRow {
            id: trip.id.clone(),
            origin: trip.origin.clone(),
            destination: trip.destination.clone(),
            date: format_date(trip.date),
            departure_time: trip.departure_time.clone(),
            price: format_price(trip.price),
            available_seats: trip.available_seats,
            status_label: status_label(trip.date, today),
        })
        .collect();

    let booked = state
        .store
        .bookings_for_user(&user.uuid)
        .await?
        .into_iter()
        .filter(|(_, trip)| keep(trip.date))
        .map(|(booking, trip)| BookedRow {
            trip_id: trip.id.clone(),
            origin: trip.origin.clone(),
            destination: trip.destination.clone(),
            date: format_date(trip.date),
            departure_time: trip.departure_time.clone(),
            seats: booking.seats,
            total: format_price(trip.price * booking.seats as f64),
            booking_status: booking.status.label(),
            trip_status: status_label(trip.date, today),
        })
        .collect();

    Ok(AskamaTemplateResponse::into_response(MyTripsTemplate {
        logged_in: true,
        status_filter,
        published,
        booked,
    }))
}

fn status_label(date: NaiveDate, today: NaiveDate) -> &'static str {
    if date >= today {
        "Próximo"
    } else {
        "Completado"
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProfileEditQuery {
    guardado: Option<String>,
}

#[derive(Template)]
#[template(path = "profile/edit.html")]
struct ProfileEditTemplate {
    logged_in: bool,
    saved: bool,
    errors: Vec<String>,
    uuid: String,
    name: String,
    email: String,
    phone: String,
    bio: String,
    brand: String,
    model: String,
    year: String,
    plate: String,
    vehicle_active: bool,
}

async fn profile_edit_form(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(q): Query<ProfileEditQuery>,
) -> Result<impl IntoResponse, AppError> {
    let auth_user = current.require_user()?;
    let user = state
        .store
        .get_user(&auth_user.uuid)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(AskamaTemplateResponse::into_response(ProfileEditTemplate {
        logged_in: true,
        saved: q.guardado.is_some(),
        errors: Vec::new(),
        uuid: user.uuid.clone(),
        name: user.name.clone(),
        email: user.email.clone(),
        phone: user.phone.clone().unwrap_or_default(),
        bio: user.bio_display().to_string(),
        brand: user.vehicle_brand.clone().unwrap_or_default(),
        model: user.vehicle_model.clone().unwrap_or_default(),
        year: user
            .vehicle_year
            .map(|year| year.to_string())
            .unwrap_or_default(),
        plate: user.vehicle_plate.clone().unwrap_or_default(),
        vehicle_active: user.vehicle_active,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProfileForm {
    nombre: String,
    telefono: String,
    bio: String,
    marca: String,
    modelo: String,
    anio: String,
    patente: String,
    vehiculo_activo: Option<String>,
}

async fn profile_edit_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(form): Form<ProfileForm>,
) -> Result<Response, AppError> {
    let auth_user = current.require_user()?;
    let mut errors = Vec::new();

    let name = form.nombre.trim().to_string();
    if name.is_empty() {
        errors.push("Ingresá tu nombre".to_string());
    } else if name != auth_user.name {
        let taken: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE name = ?1 AND uuid != ?2")
                .bind(&name)
                .bind(&auth_user.uuid)
                .fetch_one(&state.db)
                .await?;
        if taken > 0 {
            errors.push("Ese nombre ya está en uso".to_string());
        }
    }

    let year = match normalize_optional(Some(form.anio.clone())) {
        Some(raw) => match raw.parse::<i64>() {
            Ok(year) if (1950..=2100).contains(&year) => Some(year),
            _ => {
                errors.push("El año del vehículo no es válido".to_string());
                None
            }
        },
        None => None,
    };

    if !errors.is_empty() {
        return Ok((
            StatusCode::BAD_REQUEST,
            AskamaTemplateResponse::into_response(ProfileEditTemplate {
                logged_in: true,
                saved: false,
                errors,
                uuid: auth_user.uuid.clone(),
                name: form.nombre,
                email: auth_user.email.clone(),
                phone: form.telefono,
                bio: form.bio,
                brand: form.marca,
                model: form.modelo,
                year: form.anio,
                plate: form.patente,
                vehicle_active: form.vehiculo_activo.is_some(),
            }),
        )
            .into_response());
    }

    let update = ProfileUpdate {
        name,
        phone: normalize_optional(Some(form.telefono)),
        bio: normalize_optional(Some(form.bio)),
        vehicle_brand: normalize_optional(Some(form.marca)),
        vehicle_model: normalize_optional(Some(form.modelo)),
        vehicle_year: year,
        vehicle_plate: normalize_optional(Some(form.patente)),
        vehicle_active: form.vehiculo_activo.is_some(),
    };
    state.store.update_profile(&auth_user.uuid, &update).await?;

    Ok(Redirect::to("/mi-perfil?guardado=1").into_response())
}

fn normalize_optional(input: Option<String>) -> Option<String> {
    input.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Una parada por línea, "Lugar HH:MM".
fn parse_stops(raw: &str) -> Result<Vec<Stop>, String> {
    let mut stops = Vec::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parsed = line
            .rsplit_once(' ')
            .and_then(|(location, time)| {
                NaiveTime::parse_from_str(time.trim(), "%H:%M")
                    .ok()
                    .map(|time| (location.trim().to_string(), time))
            });
        let Some((location, time)) = parsed else {
            return Err(format!(
                "No entendimos la parada \"{line}\". Usá \"Lugar HH:MM\", una por línea"
            ));
        };
        stops.push(Stop {
            location,
            time: time.format("%H:%M").to_string(),
        });
    }
    Ok(stops)
}

fn trip_duration(departure: NaiveTime, arrival: NaiveTime) -> Option<String> {
    let minutes = arrival.signed_duration_since(departure).num_minutes();
    if minutes <= 0 {
        return None;
    }
    Some(format!("{}h {:02}m", minutes / 60, minutes % 60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_parse_one_per_line_with_padded_times() {
        let stops = parse_stops("Chascomús 09:15\n\n  Dolores 10:30  ").expect("stops");
        assert_eq!(stops.len(), 2);
        assert_eq!(stops[0].location, "Chascomús");
        assert_eq!(stops[0].time, "09:15");
        assert_eq!(stops[1].location, "Dolores");
        assert_eq!(stops[1].time, "10:30");
    }

    #[test]
    fn a_stop_without_time_is_rejected() {
        assert!(parse_stops("Chascomús").is_err());
        assert!(parse_stops("Chascomús 9 y cuarto").is_err());
    }

    #[test]
    fn duration_is_derived_from_departure_and_arrival() {
        let departure = NaiveTime::parse_from_str("08:00", "%H:%M").unwrap();
        let arrival = NaiveTime::parse_from_str("12:30", "%H:%M").unwrap();
        assert_eq!(trip_duration(departure, arrival).as_deref(), Some("4h 30m"));
        assert_eq!(trip_duration(arrival, departure), None);
    }
}
