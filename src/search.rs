use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::models::trip::Trip;

/// Peso del rating del conductor y del precio en el orden "recomendados".
/// El rating manda; el precio solo desempata.
const RATING_WEIGHT: f64 = 2.0;
const PRICE_WEIGHT: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum SortOrder {
    #[default]
    #[serde(rename = "recommended")]
    Recommended,
    #[serde(rename = "price_asc")]
    PriceAsc,
    #[serde(rename = "price_desc")]
    PriceDesc,
    #[serde(rename = "departure")]
    Departure,
    #[serde(rename = "rating")]
    Rating,
}

impl SortOrder {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "price_asc" => SortOrder::PriceAsc,
            "price_desc" => SortOrder::PriceDesc,
            "departure" => SortOrder::Departure,
            "rating" => SortOrder::Rating,
            _ => SortOrder::Recommended,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Recommended => "recommended",
            SortOrder::PriceAsc => "price_asc",
            SortOrder::PriceDesc => "price_desc",
            SortOrder::Departure => "departure",
            SortOrder::Rating => "rating",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchCriteria {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub date: Option<NaiveDate>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_departure_time: Option<String>,
    pub max_departure_time: Option<String>,
    pub min_rating: Option<f64>,
    pub sort_by: SortOrder,
}

/// Filtra y ordena una lista de viajes ya traída del store.
///
/// Sobre una lista en memoria, origen y destino se comparan por subcadena
/// sin distinguir mayúsculas; la variante exacta vive en la consulta SQL de
/// `TripStore::search_trips`. Nunca falla: criterios sin coincidencias
/// producen una lista vacía.
pub fn filter_and_sort(mut trips: Vec<Trip>, criteria: &SearchCriteria, today: NaiveDate) -> Vec<Trip> {
    // Los viajes con fecha pasada no se muestran nunca, pida lo que pida el
    // resto del filtro. Granularidad de día, no de hora.
    trips.retain(|trip| trip.date >= today);

    if let Some(origin) = &criteria.origin {
        let needle = origin.to_lowercase();
        trips.retain(|trip| trip.origin.to_lowercase().contains(&needle));
    }
    if let Some(destination) = &criteria.destination {
        let needle = destination.to_lowercase();
        trips.retain(|trip| trip.destination.to_lowercase().contains(&needle));
    }
    if let Some(date) = criteria.date {
        trips.retain(|trip| trip.date == date);
    }
    if let Some(min) = criteria.min_price {
        trips.retain(|trip| trip.price >= min);
    }
    if let Some(max) = criteria.max_price {
        trips.retain(|trip| trip.price <= max);
    }
    // "HH:MM" con cero a la izquierda: comparar como texto ordena bien.
    if let Some(min) = &criteria.min_departure_time {
        trips.retain(|trip| trip.departure_time.as_str() >= min.as_str());
    }
    if let Some(max) = &criteria.max_departure_time {
        trips.retain(|trip| trip.departure_time.as_str() <= max.as_str());
    }
    // Sin datos del conductor el filtro de calificación no aplica.
    if let Some(min) = criteria.min_rating {
        trips.retain(|trip| trip.driver.as_ref().map_or(true, |d| d.rating >= min));
    }

    match criteria.sort_by {
        SortOrder::PriceAsc => trips.sort_by(|a, b| a.price.total_cmp(&b.price)),
        SortOrder::PriceDesc => trips.sort_by(|a, b| b.price.total_cmp(&a.price)),
        SortOrder::Departure => trips.sort_by(|a, b| a.departure_time.cmp(&b.departure_time)),
        SortOrder::Rating => trips.sort_by(|a, b| {
            driver_rating(b)
                .unwrap_or(0.0)
                .total_cmp(&driver_rating(a).unwrap_or(0.0))
        }),
        SortOrder::Recommended => trips.sort_by(recommended_cmp),
    }

    trips
}

fn driver_rating(trip: &Trip) -> Option<f64> {
    trip.driver.as_ref().map(|d| d.rating)
}

fn recommended_cmp(a: &Trip, b: &Trip) -> Ordering {
    match (a.driver.as_ref(), b.driver.as_ref()) {
        (Some(da), Some(db)) => (db.rating * RATING_WEIGHT)
            .total_cmp(&(da.rating * RATING_WEIGHT))
            .then_with(|| (a.price * PRICE_WEIGHT).total_cmp(&(b.price * PRICE_WEIGHT))),
        _ => a.price.total_cmp(&b.price),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::trip::TripDriver;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn trip(
        id: &str,
        origin: &str,
        destination: &str,
        date: NaiveDate,
        departure_time: &str,
        price: f64,
        rating: Option<f64>,
    ) -> Trip {
        let mut trip = Trip::new("driver-1");
        trip.id = id.into();
        trip.origin = origin.into();
        trip.destination = destination.into();
        trip.date = date;
        trip.departure_time = departure_time.into();
        trip.price = price;
        trip.available_seats = 3;
        trip.driver = rating.map(|rating| TripDriver {
            id: "driver-1".into(),
            name: "Conductor".into(),
            avatar: None,
            rating,
            review_count: 10,
        });
        trip
    }

    fn today() -> NaiveDate {
        day(2030, 1, 1)
    }

    fn ids(trips: &[Trip]) -> Vec<&str> {
        trips.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn past_trips_never_come_back() {
        let trips = vec![
            trip("ayer", "Buenos Aires", "Rosario", day(2029, 12, 31), "08:00", 3800.0, Some(4.9)),
            trip("manana", "Buenos Aires", "Rosario", day(2030, 1, 2), "08:00", 3800.0, Some(4.9)),
        ];
        let result = filter_and_sort(trips, &SearchCriteria::default(), today());
        assert_eq!(ids(&result), ["manana"]);
    }

    #[test]
    fn past_trips_stay_hidden_even_when_asked_for_exactly() {
        let trips = vec![trip(
            "ayer",
            "Buenos Aires",
            "Rosario",
            day(2029, 12, 31),
            "08:00",
            3800.0,
            Some(4.9),
        )];
        let criteria = SearchCriteria {
            date: Some(day(2029, 12, 31)),
            ..Default::default()
        };
        assert!(filter_and_sort(trips, &criteria, today()).is_empty());
    }

    #[test]
    fn origin_matches_by_case_insensitive_substring() {
        let trips = vec![
            trip("a", "Buenos Aires", "Rosario", day(2030, 1, 10), "08:00", 3800.0, None),
            trip("b", "Córdoba", "Mendoza", day(2030, 1, 10), "08:00", 5200.0, None),
        ];
        let criteria = SearchCriteria {
            origin: Some("buenos".into()),
            ..Default::default()
        };
        assert_eq!(ids(&filter_and_sort(trips, &criteria, today())), ["a"]);
    }

    #[test]
    fn price_bounds_are_inclusive() {
        let trips = vec![
            trip("a", "Buenos Aires", "Rosario", day(2030, 1, 10), "08:00", 3800.0, None),
            trip("b", "Buenos Aires", "Rosario", day(2030, 1, 10), "09:00", 4500.0, None),
            trip("c", "Buenos Aires", "Rosario", day(2030, 1, 10), "10:00", 5200.0, None),
        ];
        let criteria = SearchCriteria {
            min_price: Some(3800.0),
            max_price: Some(4500.0),
            sort_by: SortOrder::PriceAsc,
            ..Default::default()
        };
        assert_eq!(ids(&filter_and_sort(trips, &criteria, today())), ["a", "b"]);
    }

    #[test]
    fn departure_window_compares_padded_times_as_text() {
        let trips = vec![
            trip("temprano", "Buenos Aires", "Rosario", day(2030, 1, 10), "07:30", 3800.0, None),
            trip("media", "Buenos Aires", "Rosario", day(2030, 1, 10), "10:00", 3800.0, None),
            trip("tarde", "Buenos Aires", "Rosario", day(2030, 1, 10), "21:15", 3800.0, None),
        ];
        let criteria = SearchCriteria {
            min_departure_time: Some("08:00".into()),
            max_departure_time: Some("21:15".into()),
            sort_by: SortOrder::Departure,
            ..Default::default()
        };
        assert_eq!(ids(&filter_and_sort(trips, &criteria, today())), ["media", "tarde"]);
    }

    #[test]
    fn min_rating_keeps_trips_without_driver_data() {
        let trips = vec![
            trip("con", "Buenos Aires", "Rosario", day(2030, 1, 10), "08:00", 3800.0, Some(3.5)),
            trip("sin", "Buenos Aires", "Rosario", day(2030, 1, 10), "09:00", 4500.0, None),
        ];
        let criteria = SearchCriteria {
            min_rating: Some(4.0),
            ..Default::default()
        };
        assert_eq!(ids(&filter_and_sort(trips, &criteria, today())), ["sin"]);
    }

    // Escenario de referencia: Buenos Aires → Rosario por precio ascendente.
    #[test]
    fn price_asc_orders_cheapest_first() {
        let trips = vec![
            trip("barato", "Buenos Aires", "Rosario", day(2030, 1, 10), "08:00", 3800.0, Some(4.9)),
            trip("caro", "Buenos Aires", "Rosario", day(2030, 1, 10), "10:00", 4500.0, Some(4.2)),
        ];
        let criteria = SearchCriteria {
            origin: Some("Buenos Aires".into()),
            destination: Some("Rosario".into()),
            date: Some(day(2030, 1, 10)),
            sort_by: SortOrder::PriceAsc,
            ..Default::default()
        };
        let result = filter_and_sort(trips, &criteria, today());
        assert_eq!(result.iter().map(|t| t.price).collect::<Vec<_>>(), [3800.0, 4500.0]);
    }

    #[test]
    fn rating_sort_puts_best_driver_first() {
        let trips = vec![
            trip("a", "Buenos Aires", "Rosario", day(2030, 1, 10), "08:00", 3800.0, Some(4.9)),
            trip("b", "Buenos Aires", "Rosario", day(2030, 1, 10), "10:00", 4500.0, Some(4.2)),
        ];
        let criteria = SearchCriteria {
            sort_by: SortOrder::Rating,
            ..Default::default()
        };
        let result = filter_and_sort(trips, &criteria, today());
        let ratings: Vec<f64> = result
            .iter()
            .map(|t| t.driver.as_ref().map(|d| d.rating).unwrap_or(0.0))
            .collect();
        assert_eq!(ratings, [4.9, 4.2]);
    }

    #[test]
    fn recommended_prefers_rating_over_price() {
        let trips = vec![
            trip("caro-bueno", "Buenos Aires", "Rosario", day(2030, 1, 10), "08:00", 4500.0, Some(4.9)),
            trip("barato-flojo", "Buenos Aires", "Rosario", day(2030, 1, 10), "10:00", 3800.0, Some(4.2)),
        ];
        let result = filter_and_sort(trips, &SearchCriteria::default(), today());
        assert_eq!(ids(&result), ["caro-bueno", "barato-flojo"]);
    }

    #[test]
    fn recommended_breaks_rating_ties_by_price() {
        let trips = vec![
            trip("caro", "Buenos Aires", "Rosario", day(2030, 1, 10), "08:00", 4500.0, Some(4.8)),
            trip("barato", "Buenos Aires", "Rosario", day(2030, 1, 10), "10:00", 3800.0, Some(4.8)),
        ];
        let result = filter_and_sort(trips, &SearchCriteria::default(), today());
        assert_eq!(ids(&result), ["barato", "caro"]);
    }

    #[test]
    fn recommended_without_driver_data_falls_back_to_price() {
        let trips = vec![
            trip("caro", "Buenos Aires", "Rosario", day(2030, 1, 10), "08:00", 4500.0, None),
            trip("barato", "Buenos Aires", "Rosario", day(2030, 1, 10), "10:00", 3800.0, None),
        ];
        let result = filter_and_sort(trips, &SearchCriteria::default(), today());
        assert_eq!(ids(&result), ["barato", "caro"]);
    }

    #[test]
    fn filtering_twice_changes_nothing() {
        let trips = vec![
            trip("a", "Buenos Aires", "Rosario", day(2030, 1, 10), "08:00", 3800.0, Some(4.9)),
            trip("b", "Buenos Aires", "Mar del Plata", day(2030, 1, 12), "09:00", 4500.0, Some(4.2)),
            trip("c", "Córdoba", "Mendoza", day(2030, 1, 11), "07:30", 5200.0, Some(4.7)),
        ];
        let criteria = SearchCriteria {
            origin: Some("Buenos Aires".into()),
            min_price: Some(3000.0),
            sort_by: SortOrder::PriceAsc,
            ..Default::default()
        };
        let once = filter_and_sort(trips, &criteria, today());
        let twice = filter_and_sort(once.clone(), &criteria, today());
        assert_eq!(ids(&once), ids(&twice));
    }

    #[test]
    fn equal_prices_keep_their_input_order() {
        let trips = vec![
            trip("primero", "Buenos Aires", "Rosario", day(2030, 1, 10), "08:00", 4000.0, None),
            trip("segundo", "Buenos Aires", "Rosario", day(2030, 1, 10), "09:00", 4000.0, None),
            trip("tercero", "Buenos Aires", "Rosario", day(2030, 1, 10), "10:00", 4000.0, None),
        ];
        let criteria = SearchCriteria {
            sort_by: SortOrder::PriceAsc,
            ..Default::default()
        };
        assert_eq!(
            ids(&filter_and_sort(trips, &criteria, today())),
            ["primero", "segundo", "tercero"]
        );
    }

    #[test]
    fn no_matches_means_empty_list_not_an_error() {
        let trips = vec![trip(
            "a",
            "Buenos Aires",
            "Rosario",
            day(2030, 1, 10),
            "08:00",
            3800.0,
            Some(4.9),
        )];
        let criteria = SearchCriteria {
            origin: Some("Salta".into()),
            ..Default::default()
        };
        assert!(filter_and_sort(trips, &criteria, today()).is_empty());
    }

    #[test]
    fn unknown_sort_keys_fall_back_to_recommended() {
        assert_eq!(SortOrder::parse("cualquiera"), SortOrder::Recommended);
        assert_eq!(SortOrder::parse(""), SortOrder::Recommended);
        assert_eq!(SortOrder::parse("price_asc"), SortOrder::PriceAsc);
    }
}
