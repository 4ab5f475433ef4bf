use std::{fmt, fs::File, net::SocketAddr};

use anyhow::Context;
use chrono::{Local, NaiveDate};
use cucumber::{given, then, when, World as _};
use rumbo::{
    auth::AuthenticatedUser,
    config::AppConfig,
    db::init_pool,
    error::AppError,
    models::{
        booking::Booking,
        trip::{Trip, Vehicle},
    },
    search::{filter_and_sort, SearchCriteria, SortOrder},
    services::bookings::{submit_booking, BookingRequest},
    services::store::TripStore,
    state::AppState,
};
use tempfile::TempDir;

#[derive(Debug, cucumber::World, Default)]
struct AppWorld {
    state: Option<TestState>,
    users: Vec<AuthenticatedUser>,
    published: Vec<Trip>,
    last_search: Vec<Trip>,
    last_booking: Option<Result<Booking, AppError>>,
}

impl AppWorld {
    fn app_state(&self) -> &AppState {
        self.state
            .as_ref()
            .expect("state must be initialised first")
            .app()
    }

    fn store(&self) -> &TripStore {
        &self.app_state().store
    }

    fn user(&self, name: &str) -> &AuthenticatedUser {
        self.users
            .iter()
            .find(|user| user.name == name)
            .expect("user must be registered first")
    }

    fn published_trip(&self, origin: &str, destination: &str) -> &Trip {
        self.published
            .iter()
            .find(|trip| trip.origin == origin && trip.destination == destination)
            .expect("trip must be published first")
    }
}

struct TestState {
    app: AppState,
    _root: TempDir,
}

impl fmt::Debug for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestState").finish()
    }
}

impl TestState {
    async fn new() -> anyhow::Result<Self> {
        let root = TempDir::new().context("create temp dir for bdd world")?;

        let db_path = root.path().join("bdd.sqlite");
        File::create(&db_path)?;
        let database_url = format!("sqlite://{}", db_path.to_string_lossy());

        let config = AppConfig {
            database_url: database_url.clone(),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            public_base_url: "http://127.0.0.1:3000".parse().context("base url")?,
            cookie_secret: "bdd-cookie-secret".into(),
        };

        let db = init_pool(&config.database_url).await?;
        sqlx::migrate!("./migrations").run(&db).await?;

        let store = TripStore::new(db.clone());
        let app = AppState::new(config, db, store);
        Ok(Self { app, _root: root })
    }

    fn app(&self) -> &AppState {
        &self.app
    }
}

#[given("a fresh application state")]
async fn given_fresh_state(world: &mut AppWorld) {
    world.state = Some(TestState::new().await.expect("state"));
    world.users.clear();
    world.published.clear();
    world.last_search.clear();
    world.last_booking = None;
}

#[given(
    regex = r#"^a registered user \"([^\"]+)\" with email \"([^\"]+)\" and password \"([^\"]+)\"$"#
)]
async fn given_registered_user(
    world: &mut AppWorld,
    name: String,
    email: String,
    password: String,
) {
    register_user(world, name, email, password).await;
}

#[when(
    regex = r#"^I register a user \"([^\"]+)\" with email \"([^\"]+)\" and password \"([^\"]+)\"$"#
)]
async fn when_register_user(world: &mut AppWorld, name: String, email: String, password: String) {
    register_user(world, name, email, password).await;
}

#[then(regex = r#"^I can authenticate as \"([^\"]+)\" using password \"([^\"]+)\"$"#)]
async fn then_can_authenticate(world: &mut AppWorld, identifier: String, password: String) {
    let authed = rumbo::auth::authenticate_user(world.app_state(), &identifier, &password)
        .await
        .expect("authentication");
    assert_eq!(authed.name, identifier);
}

#[then(regex = r#"^authenticating as \"([^\"]+)\" with password \"([^\"]+)\" fails$"#)]
async fn then_cannot_authenticate(world: &mut AppWorld, identifier: String, password: String) {
    let result = rumbo::auth::authenticate_user(world.app_state(), &identifier, &password).await;
    assert!(matches!(result, Err(AppError::Unauthorized)));
}

#[given(
    regex = r#"^\"([^\"]+)\" published a trip from \"([^\"]+)\" to \"([^\"]+)\" on \"([^\"]+)\" at \"([^\"]+)\" for (\d+) with (\d+) seats$"#
)]
async fn given_published_trip(
    world: &mut AppWorld,
    driver: String,
    origin: String,
    destination: String,
    date: String,
    departure_time: String,
    price: f64,
    seats: i64,
) {
    let driver_uuid = world.user(&driver).uuid.clone();
    let mut trip = Trip::new(driver_uuid);
    trip.origin = origin;
    trip.destination = destination;
    trip.date = parse_date(&date);
    trip.departure_time = departure_time;
    trip.price = price;
    trip.available_seats = seats;
    trip.vehicle = Vehicle {
        brand: "Toyota".into(),
        model: "Corolla".into(),
        year: None,
        plate: None,
    };
    world.store().create_trip(&trip).await.expect("create trip");
    world.published.push(trip);
}

#[when(
    regex = r#"^I search trips from \"([^\"]+)\" to \"([^\"]+)\" on \"([^\"]+)\" sorted by \"([^\"]+)\"$"#
)]
async fn when_search(
    world: &mut AppWorld,
    origin: String,
    destination: String,
    date: String,
    sort_by: String,
) {
    let date = parse_date(&date);
    let loaded = world
        .store()
        .search_trips(&origin, &destination, date)
        .await
        .expect("search");
    let criteria = SearchCriteria {
        origin: Some(origin),
        destination: Some(destination),
        date: Some(date),
        sort_by: SortOrder::parse(&sort_by),
        ..Default::default()
    };
    world.last_search = filter_and_sort(loaded, &criteria, Local::now().date_naive());
}

#[then(regex = r"^I get (\d+) results$")]
async fn then_result_count(world: &mut AppWorld, expected: usize) {
    assert_eq!(world.last_search.len(), expected);
}

#[then(regex = r"^result (\d+) costs (\d+)$")]
async fn then_result_costs(world: &mut AppWorld, position: usize, price: f64) {
    let trip = world
        .last_search
        .get(position - 1)
        .expect("result position out of range");
    assert_eq!(trip.price, price);
}

#[when(regex = r#"^\"([^\"]+)\" books (\d+) seats on the trip from \"([^\"]+)\" to \"([^\"]+)\"$"#)]
async fn when_book(
    world: &mut AppWorld,
    passenger: String,
    seats: i64,
    origin: String,
    destination: String,
) {
    let passenger = world.user(&passenger).clone();
    let trip_id = world.published_trip(&origin, &destination).id.clone();
    let result = submit_booking(
        world.store(),
        &passenger,
        BookingRequest {
            trip_id,
            seats,
            message: String::new(),
        },
    )
    .await;
    world.last_booking = Some(result);
}

#[then("the booking is accepted")]
async fn then_booking_accepted(world: &mut AppWorld) {
    let booking = world.last_booking.as_ref().expect("a booking was attempted");
    assert!(booking.is_ok(), "expected booking to succeed: {booking:?}");
}

#[then("the booking is rejected with a validation error")]
async fn then_booking_rejected(world: &mut AppWorld) {
    let booking = world.last_booking.as_ref().expect("a booking was attempted");
    assert!(
        matches!(booking, Err(AppError::Validation(_))),
        "expected a validation error: {booking:?}"
    );
}

#[then(regex = r#"^the trip from \"([^\"]+)\" to \"([^\"]+)\" has (\d+) seats left$"#)]
async fn then_seats_left(world: &mut AppWorld, origin: String, destination: String, seats: i64) {
    let trip_id = world.published_trip(&origin, &destination).id.clone();
    let trip = world
        .store()
        .get_trip(&trip_id)
        .await
        .expect("get trip")
        .expect("trip exists");
    assert_eq!(trip.available_seats, seats);
}

async fn register_user(world: &mut AppWorld, name: String, email: String, password: String) {
    let created = rumbo::auth::register_user(world.app_state(), &name, &email, &password)
        .await
        .expect("register user");
    world.users.push(created);
}

fn parse_date(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("valid date in feature file")
}

#[tokio::main]
async fn main() {
    AppWorld::cucumber()
        .fail_on_skipped()
        .with_default_cli()
        .run("tests/features")
        .await;
}
