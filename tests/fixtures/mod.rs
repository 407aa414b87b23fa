//! Provider response bodies used across the integration tests

#![allow(dead_code)]

use serde_json::{json, Value};

/// A `current.json` body as returned by the provider.
pub fn current_weather(temp_c: f64, wind_kph: f64, humidity: i64, last_updated: &str) -> Value {
    json!({
        "location": { "name": "London", "country": "United Kingdom" },
        "current": {
            "last_updated": last_updated,
            "temp_c": temp_c,
            "wind_kph": wind_kph,
            "humidity": humidity,
            "condition": { "text": "Partly cloudy" }
        }
    })
}

pub fn london() -> Value {
    current_weather(14.0, 19.1, 77, "2024-06-01 12:30")
}

/// Body the provider returns for unknown locations.
pub const NO_LOCATION_FOUND: &str =
    r#"{"error":{"code":1006,"message":"No matching location found."}}"#;
