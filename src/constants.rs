pub const DEFAULT_API_URL: &str = "http://localhost:8088";
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8090";

pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_BULK_TIMEOUT_SECONDS: u64 = 120;
pub const DEFAULT_CHUNK_SIZE: usize = 200;
pub const DEFAULT_MAX_IN_FLIGHT: usize = 0;
pub const DEFAULT_DIRECTORY_TTL_SECONDS: u64 = 5 * 60;
pub const DEFAULT_FORECAST_TTL_SECONDS: u64 = 2 * 60;

pub const DEFAULT_CITY_ID: u32 = 1;
pub const DEFAULT_SERVICE_TYPE: i64 = 1;
pub const DEFAULT_HORIZON: i64 = 30;

// Surge domain mapped onto [0, 1] before bucketing.
pub const SURGE_DOMAIN_MIN: f64 = -20.0;
pub const SURGE_DOMAIN_SPAN: f64 = 100.0;

pub const HEXAGON_FILL_ALPHA: u8 = 200;

#[derive(Clone, Copy, Debug)]
pub struct ServiceType {
    pub id: i64,
    pub name: &'static str,
}

pub static SERVICE_TYPES: [ServiceType; 8] = [
    ServiceType { id: 1, name: "Eco" },
    ServiceType { id: 2, name: "Plus" },
    ServiceType { id: 3, name: "Rose" },
    ServiceType { id: 4, name: "Yellow" },
    ServiceType { id: 5, name: "Delivery" },
    ServiceType { id: 6, name: "Eat" },
    ServiceType { id: 7, name: "Bike" },
    ServiceType { id: 8, name: "Yellow2" },
];

#[derive(Clone, Copy, Debug)]
pub struct City {
    pub id: u32,
    pub name: &'static str,
    pub longitude: f64,
    pub latitude: f64,
    pub zoom: f64,
}

pub static CITIES: [City; 5] = [
    City { id: 1, name: "Tehran", longitude: 51.389, latitude: 35.689, zoom: 11.0 },
    City { id: 2, name: "Karaj", longitude: 50.991, latitude: 35.84, zoom: 11.0 },
    City { id: 3, name: "Isfahan", longitude: 51.668, latitude: 32.655, zoom: 11.0 },
    City { id: 4, name: "Shiraz", longitude: 52.531, latitude: 29.592, zoom: 11.0 },
    City { id: 5, name: "Mashhad", longitude: 59.579, latitude: 36.261, zoom: 11.0 },
];

pub fn find_city(city_id: u32) -> Option<&'static City> {
    CITIES.iter().find(|city| city.id == city_id)
}

pub fn find_service_type(service_type: i64) -> Option<&'static ServiceType> {
    SERVICE_TYPES.iter().find(|entry| entry.id == service_type)
}
