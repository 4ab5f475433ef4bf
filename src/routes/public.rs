use askama::Template;
use askama_axum::IntoResponse as AskamaTemplateResponse;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use axum_extra::extract::PrivateCookieJar;
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use serde_with::{serde_as, NoneAsEmptyString};
use tracing::{info, warn};

use crate::{
    auth::{self, CurrentUser},
    cities::POPULAR_CITIES,
    error::AppError,
    models::trip::{Stop, Trip},
    search::{filter_and_sort, SearchCriteria, SortOrder},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(landing))
        .route("/como-funciona", get(how_it_works))
        .route("/buscar", get(search))
        .route("/viaje/:id", get(trip_detail))
        .route("/perfil/:id", get(profile))
        .route("/login", get(login_form).post(login_submit))
        .route("/registro", get(register_form).post(register_submit))
        .route("/logout", post(logout))
        .route(
            "/recuperar-contrasena",
            get(reset_request_form).post(reset_request_submit),
        )
        .route(
            "/recuperar-contrasena/:token",
            get(reset_confirm_form).post(reset_confirm_submit),
        )
}

#[derive(Clone)]
pub(crate) struct TripCard {
    pub id: String,
    pub origin: String,
    pub destination: String,
    pub date: String,
    pub departure_time: String,
    pub price: String,
    pub available_seats: i64,
    pub has_driver: bool,
    pub driver_name: String,
    pub driver_rating: String,
}

#[derive(Template)]
#[template(path = "landing.html")]
struct LandingTemplate {
    logged_in: bool,
    cities: Vec<&'static str>,
    trips: Vec<TripCard>,
}

async fn landing(State(state): State<AppState>, current: CurrentUser) -> impl IntoResponse {
    let today = Local::now().date_naive();
    let trips = match state.store.recent_trips(12).await {
        Ok(trips) => filter_and_sort(trips, &SearchCriteria::default(), today),
        Err(err) => {
            warn!("no se pudieron cargar los últimos viajes: {err}");
            Vec::new()
        }
    };
    let trips = trips.iter().take(6).map(trip_card).collect();

    AskamaTemplateResponse::into_response(LandingTemplate {
        logged_in: current.is_logged_in(),
        cities: POPULAR_CITIES.to_vec(),
        trips,
    })
}

#[derive(Template)]
#[template(path = "como_funciona.html")]
struct HowItWorksTemplate {
    logged_in: bool,
}

async fn how_it_works(current: CurrentUser) -> impl IntoResponse {
    AskamaTemplateResponse::into_response(HowItWorksTemplate {
        logged_in: current.is_logged_in(),
    })
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchQuery {
    #[serde_as(as = "NoneAsEmptyString")]
    origen: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    destino: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    fecha: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    ordenar: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    precio_min: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    precio_max: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    hora_salida_min: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    hora_salida_max: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    calificacion_min: Option<String>,
}

#[derive(Default)]
struct SearchFormValues {
    origen: String,
    destino: String,
    fecha: String,
    ordenar: String,
    precio_min: String,
    precio_max: String,
    hora_salida_min: String,
    hora_salida_max: String,
    calificacion_min: String,
}

#[derive(Template)]
#[template(path = "search.html")]
struct SearchTemplate {
    logged_in: bool,
    title: String,
    searched: bool,
    store_failed: bool,
    trips: Vec<TripCard>,
    cities: Vec<&'static str>,
    q: SearchFormValues,
}

/// Controlador de la página de búsqueda: lee los criterios de la query
/// string, elige el camino de consulta (predicados exactos cuando vienen
/// origen, destino y fecha; últimos publicados si no) y pasa todo por el
/// motor de filtrado. Lista vacía y almacén caído se renderizan distinto.
async fn search(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(q): Query<SearchQuery>,
) -> impl IntoResponse {
    let today = Local::now().date_naive();
    let criteria = SearchCriteria {
        origin: q.origen.clone(),
        destination: q.destino.clone(),
        date: q.fecha.as_deref().and_then(parse_date),
        min_price: q.precio_min.as_deref().and_then(|s| s.parse().ok()),
        max_price: q.precio_max.as_deref().and_then(|s| s.parse().ok()),
        min_departure_time: q.hora_salida_min.clone(),
        max_departure_time: q.hora_salida_max.clone(),
        min_rating: q.calificacion_min.as_deref().and_then(|s| s.parse().ok()),
        sort_by: SortOrder::parse(q.ordenar.as_deref().unwrap_or_default()),
    };

    let exact = match (&criteria.origin, &criteria.destination, criteria.date) {
        (Some(origin), Some(destination), Some(date)) => {
            Some((origin.clone(), destination.clone(), date))
        }
        _ => None,
    };

    let loaded = match &exact {
        Some((origin, destination, date)) => {
            state.store.search_trips(origin, destination, *date).await
        }
        None => state.store.recent_trips(50).await,
    };

    let (trips, store_failed) = match loaded {
        Ok(trips) => (filter_and_sort(trips, &criteria, today), false),
        Err(err) => {
            warn!("la búsqueda de viajes falló: {err}");
            (Vec::new(), true)
        }
    };

    let title = match (&criteria.origin, &criteria.destination) {
        (Some(origin), Some(destination)) => format!("Viajes de {origin} a {destination}"),
        _ => "Últimos viajes publicados".to_string(),
    };

    AskamaTemplateResponse::into_response(SearchTemplate {
        logged_in: current.is_logged_in(),
        title,
        searched: exact.is_some(),
        store_failed,
        trips: trips.iter().map(trip_card).collect(),
        cities: POPULAR_CITIES.to_vec(),
        q: SearchFormValues {
            origen: q.origen.unwrap_or_default(),
            destino: q.destino.unwrap_or_default(),
            fecha: q.fecha.unwrap_or_default(),
            ordenar: criteria.sort_by.as_str().to_string(),
            precio_min: q.precio_min.unwrap_or_default(),
            precio_max: q.precio_max.unwrap_or_default(),
            hora_salida_min: q.hora_salida_min.unwrap_or_default(),
            hora_salida_max: q.hora_salida_max.unwrap_or_default(),
            calificacion_min: q.calificacion_min.unwrap_or_default(),
        },
    })
}

#[derive(Clone)]
pub(crate) struct ReviewCard {
    pub reviewer_name: String,
    pub rating: i64,
    pub content: String,
    pub date: String,
}

#[derive(Template)]
#[template(path = "trip/detail.html")]
pub(crate) struct TripDetailTemplate {
    pub logged_in: bool,
    pub id: String,
    pub origin: String,
    pub destination: String,
    pub date: String,
    pub departure_time: String,
    pub arrival_time: String,
    pub duration: String,
    pub price: String,
    pub available_seats: i64,
    pub vehicle: String,
    pub features: Vec<String>,
    pub notes: String,
    pub meeting_point: String,
    pub drop_off_point: String,
    pub stops: Vec<Stop>,
    pub has_driver: bool,
    pub driver_id: String,
    pub driver_name: String,
    pub driver_rating: String,
    pub driver_review_count: i64,
    pub seat_options: Vec<i64>,
    pub booking_error: String,
    pub related: Vec<TripCard>,
    pub reviews: Vec<ReviewCard>,
}

/// Arma la página de detalle. La usa también el POST de reserva para volver
/// a renderizar con el error al lado del formulario.
pub(crate) async fn trip_detail_template(
    state: &AppState,
    id: &str,
    logged_in: bool,
    booking_error: Option<String>,
) -> Result<TripDetailTemplate, AppError> {
    let trip = state.store.get_trip(id).await?.ok_or(AppError::NotFound)?;

    // Secundarios a mejor esfuerzo: si fallan, la página sale igual.
    let related = match state
        .store
        .related_trips(&trip.origin, &trip.destination, trip.date, &trip.id, 3)
        .await
    {
        Ok(related) => related,
        Err(err) => {
            warn!("no se pudieron cargar viajes relacionados: {err}");
            Vec::new()
        }
    };
    let reviews = match state.store.reviews_for_user(&trip.driver_id).await {
        Ok(reviews) => reviews,
        Err(err) => {
            warn!("no se pudieron cargar reseñas del conductor: {err}");
            Vec::new()
        }
    };

    let vehicle = match trip.vehicle.year {
        Some(year) => format!("{} {} ({})", trip.vehicle.brand, trip.vehicle.model, year),
        None => format!("{} {}", trip.vehicle.brand, trip.vehicle.model),
    };

    Ok(TripDetailTemplate {
        logged_in,
        id: trip.id.clone(),
        origin: trip.origin.clone(),
        destination: trip.destination.clone(),
        date: format_date(trip.date),
        departure_time: trip.departure_time.clone(),
        arrival_time: trip.arrival_time.clone().unwrap_or_default(),
        duration: trip.duration.clone().unwrap_or_default(),
        price: format_price(trip.price),
        available_seats: trip.available_seats,
        vehicle,
        features: trip.features.clone(),
        notes: trip.notes_display().to_string(),
        meeting_point: trip.meeting_point.clone().unwrap_or_default(),
        drop_off_point: trip.drop_off_point.clone().unwrap_or_default(),
        stops: trip.stops.clone(),
        has_driver: trip.driver.is_some(),
        driver_id: trip.driver_id.clone(),
        driver_name: trip
            .driver
            .as_ref()
            .map(|d| d.name.clone())
            .unwrap_or_default(),
        driver_rating: trip
            .driver
            .as_ref()
            .map(|d| format_rating(d.rating))
            .unwrap_or_default(),
        driver_review_count: trip.driver.as_ref().map(|d| d.review_count).unwrap_or(0),
        seat_options: (1..=trip.available_seats).collect(),
        booking_error: booking_error.unwrap_or_default(),
        related: related.iter().map(trip_card).collect(),
        reviews: reviews
            .iter()
            .take(3)
            .map(|review| ReviewCard {
                reviewer_name: review.reviewer.name.clone(),
                rating: review.rating,
                content: review.content.clone(),
                date: format_date(review.created_at.date_naive()),
            })
            .collect(),
    })
}

async fn trip_detail(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let template = trip_detail_template(&state, &id, current.is_logged_in(), None).await?;
    Ok(AskamaTemplateResponse::into_response(template))
}

#[derive(Clone)]
struct RouteView {
    origin: String,
    destination: String,
    count: i64,
}

#[derive(Template)]
#[template(path = "profile/public.html")]
struct ProfileTemplate {
    logged_in: bool,
    name: String,
    member_since: String,
    bio: String,
    rating: String,
    review_count: i64,
    has_vehicle: bool,
    vehicle: String,
    trips_completed: i64,
    passengers_transported: i64,
    frequent_routes: Vec<RouteView>,
    reviews: Vec<ReviewCard>,
    upcoming: Vec<TripCard>,
}

async fn profile(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.store.get_user(&id).await?.ok_or(AppError::NotFound)?;
    let today = Local::now().date_naive();

    let stats = state.store.user_stats(&user.uuid, today).await?;
    let reviews = match state.store.reviews_for_user(&user.uuid).await {
        Ok(reviews) => reviews,
        Err(err) => {
            warn!("no se pudieron cargar reseñas del perfil: {err}");
            Vec::new()
        }
    };
    let upcoming = match state.store.trips_by_driver(&user.uuid).await {
        Ok(trips) => filter_and_sort(trips, &SearchCriteria::default(), today),
        Err(err) => {
            warn!("no se pudieron cargar viajes del perfil: {err}");
            Vec::new()
        }
    };

    let vehicle = user
        .vehicle()
        .map(|v| match v.year {
            Some(year) => format!("{} {} ({})", v.brand, v.model, year),
            None => format!("{} {}", v.brand, v.model),
        })
        .unwrap_or_default();

    Ok(AskamaTemplateResponse::into_response(ProfileTemplate {
        logged_in: current.is_logged_in(),
        name: user.name.clone(),
        member_since: user.member_since(),
        bio: user.bio_display().to_string(),
        rating: format_rating(user.rating),
        review_count: user.review_count,
        has_vehicle: user.vehicle().is_some(),
        vehicle,
        trips_completed: stats.trips_completed,
        passengers_transported: stats.passengers_transported,
        frequent_routes: stats
            .frequent_routes
            .into_iter()
            .map(|route| RouteView {
                origin: route.origin,
                destination: route.destination,
                count: route.count,
            })
            .collect(),
        reviews: reviews
            .iter()
            .map(|review| ReviewCard {
                reviewer_name: review.reviewer.name.clone(),
                rating: review.rating,
                content: review.content.clone(),
                date: format_date(review.created_at.date_naive()),
            })
            .collect(),
        upcoming: upcoming.iter().take(4).map(trip_card).collect(),
    }))
}

#[derive(Template)]
#[template(path = "auth/login.html")]
struct LoginTemplate {
    logged_in: bool,
    show_error: bool,
    error_message: String,
    identifier: String,
}

async fn login_form() -> impl IntoResponse {
    AskamaTemplateResponse::into_response(LoginTemplate {
        logged_in: false,
        show_error: false,
        error_message: String::new(),
        identifier: String::new(),
    })
}

#[derive(Deserialize)]
struct LoginForm {
    identifier: String,
    password: String,
}

async fn login_submit(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    match auth::authenticate_user(&state, &form.identifier, &form.password).await {
        Ok(user) => {
            let session_id = auth::create_session(&state, user.id).await?;
            Ok((
                auth::apply_session_cookie(jar, &session_id),
                Redirect::to("/mis-viajes"),
            )
                .into_response())
        }
        Err(AppError::Unauthorized) => Ok(render_login_error(
            form.identifier,
            "No pudimos iniciar sesión 😿 revisá tus datos.".into(),
        )),
        Err(AppError::Validation(msg)) => Ok(render_login_error(form.identifier, msg)),
        Err(err) => Err(err),
    }
}

fn render_login_error(identifier: String, message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        AskamaTemplateResponse::into_response(LoginTemplate {
            logged_in: false,
            show_error: true,
            error_message: message,
            identifier,
        }),
    )
        .into_response()
}

#[derive(Template)]
#[template(path = "auth/register.html")]
struct RegisterTemplate {
    logged_in: bool,
    show_error: bool,
    error_message: String,
    name: String,
    email: String,
}

async fn register_form() -> impl IntoResponse {
    AskamaTemplateResponse::into_response(RegisterTemplate {
        logged_in: false,
        show_error: false,
        error_message: String::new(),
        name: String::new(),
        email: String::new(),
    })
}

#[derive(Deserialize)]
struct RegisterForm {
    name: String,
    email: String,
    password: String,
    password_confirm: String,
}

async fn register_submit(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Form(form): Form<RegisterForm>,
) -> Result<Response, AppError> {
    if form.password != form.password_confirm {
        return Ok(render_register_error(
            form.name,
            form.email,
            "Las contraseñas no coinciden".into(),
        ));
    }

    match auth::register_user(&state, &form.name, &form.email, &form.password).await {
        Ok(user) => {
            let session_id = auth::create_session(&state, user.id).await?;
            Ok((
                auth::apply_session_cookie(jar, &session_id),
                Redirect::to("/mis-viajes"),
            )
                .into_response())
        }
        Err(AppError::Validation(msg)) => Ok(render_register_error(form.name, form.email, msg)),
        Err(err) => Err(err),
    }
}

fn render_register_error(name: String, email: String, message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        AskamaTemplateResponse::into_response(RegisterTemplate {
            logged_in: false,
            show_error: true,
            error_message: message,
            name,
            email,
        }),
    )
        .into_response()
}

async fn logout(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: PrivateCookieJar,
) -> Result<(PrivateCookieJar, Redirect), AppError> {
    if let Some(cookie) = jar.get(auth::SESSION_COOKIE) {
        auth::destroy_session(&state, cookie.value()).await?;
    }
    if let Some(user) = &current.0 {
        auth::record_logout(&state, user.id).await?;
    }
    Ok((auth::clear_session_cookie(jar), Redirect::to("/")))
}

#[derive(Template)]
#[template(path = "auth/reset_request.html")]
struct ResetRequestTemplate {
    logged_in: bool,
    show_sent: bool,
    email: String,
}

async fn reset_request_form() -> impl IntoResponse {
    AskamaTemplateResponse::into_response(ResetRequestTemplate {
        logged_in: false,
        show_sent: false,
        email: String::new(),
    })
}

#[derive(Deserialize)]
struct ResetRequestForm {
    email: String,
}

async fn reset_request_submit(
    State(state): State<AppState>,
    Form(form): Form<ResetRequestForm>,
) -> Result<impl IntoResponse, AppError> {
    // Se responde igual exista o no la cuenta, para no revelar emails.
    if let Some(token) = auth::create_password_reset(&state, &form.email).await? {
        let link = state
            .config
            .public_base_url
            .join(&format!("recuperar-contrasena/{token}"))
            .map(|url| url.to_string())
            .unwrap_or_else(|_| format!("/recuperar-contrasena/{token}"));
        // Sin mailer configurado, el enlace sale por el log.
        info!("enlace de recuperación para {}: {link}", form.email.trim());
    }

    Ok(AskamaTemplateResponse::into_response(
        ResetRequestTemplate {
            logged_in: false,
            show_sent: true,
            email: form.email,
        },
    ))
}

#[derive(Template)]
#[template(path = "auth/reset_confirm.html")]
struct ResetConfirmTemplate {
    logged_in: bool,
    token: String,
    show_error: bool,
    error_message: String,
}

async fn reset_confirm_form(Path(token): Path<String>) -> impl IntoResponse {
    AskamaTemplateResponse::into_response(ResetConfirmTemplate {
        logged_in: false,
        token,
        show_error: false,
        error_message: String::new(),
    })
}

#[derive(Deserialize)]
struct ResetConfirmForm {
    password: String,
    password_confirm: String,
}

async fn reset_confirm_submit(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Form(form): Form<ResetConfirmForm>,
) -> Result<Response, AppError> {
    if form.password != form.password_confirm {
        return Ok(render_reset_error(
            token,
            "Las contraseñas no coinciden".into(),
        ));
    }

    match auth::reset_password(&state, &token, &form.password).await {
        Ok(()) => Ok(Redirect::to("/login").into_response()),
        Err(AppError::Validation(msg)) => Ok(render_reset_error(token, msg)),
        Err(err) => Err(err),
    }
}

fn render_reset_error(token: String, message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        AskamaTemplateResponse::into_response(ResetConfirmTemplate {
            logged_in: false,
            token,
            show_error: true,
            error_message: message,
        }),
    )
        .into_response()
}

pub(crate) fn trip_card(trip: &Trip) -> TripCard {
    TripCard {
        id: trip.id.clone(),
        origin: trip.origin.clone(),
        destination: trip.destination.clone(),
        date: format_date(trip.date),
        departure_time: trip.departure_time.clone(),
        price: format_price(trip.price),
        available_seats: trip.available_seats,
        has_driver: trip.driver.is_some(),
        driver_name: trip
            .driver
            .as_ref()
            .map(|d| d.name.clone())
            .unwrap_or_default(),
        driver_rating: trip
            .driver
            .as_ref()
            .map(|d| format_rating(d.rating))
            .unwrap_or_default(),
    }
}

pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

pub(crate) fn format_price(price: f64) -> String {
    format!("$ {:.0}", price)
}

pub(crate) fn format_rating(rating: f64) -> String {
    format!("{:.1}", rating)
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}
