use serde_json::{json, Value};
use tracing::info;

use super::ToolDefinition;
use crate::errors::{ServerError, ServerResult};
use crate::weather::WeatherClient;

pub const GET_WEATHER_ALERTS: &str = "get_weather_alerts";
pub const GET_COORDINATES: &str = "get_coordinates";
pub const GET_WEATHER_FORECAST: &str = "get_weather_forecast";

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: GET_WEATHER_ALERTS,
            description: "Get active weather alerts for the given US state. Requires a 2-letter \
                          US state code, e.g. CA, TX, FL, NY or RI. Use this when users ask \
                          about alerts, warnings or severe weather.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "state": {
                        "type": "string",
                        "description": "2-letter US state code (e.g., CA, TX, FL, NY, RI)"
                    }
                },
                "required": ["state"]
            }),
        },
        ToolDefinition {
            name: GET_COORDINATES,
            description: "Get latitude and longitude for any city, address or landmark \
                          worldwide using OpenStreetMap. Use this before requesting a \
                          forecast for a named place.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "location": {
                        "type": "string",
                        "description": "Location name to get coordinates for"
                    }
                },
                "required": ["location"]
            }),
        },
        ToolDefinition {
            name: GET_WEATHER_FORECAST,
            description: "Get the real-time National Weather Service forecast for the given \
                          coordinates. Only US locations are covered.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "latitude": {
                        "type": "number",
                        "description": "Latitude coordinate (-90 to 90)"
                    },
                    "longitude": {
                        "type": "number",
                        "description": "Longitude coordinate (-180 to 180)"
                    }
                },
                "required": ["latitude", "longitude"]
            }),
        },
    ]
}

pub fn is_known(name: &str) -> bool {
    definitions().iter().any(|tool| tool.name == name)
}

fn string_arg<'a>(arguments: &'a Value, key: &str) -> ServerResult<&'a str> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ServerError::InvalidParams(format!("Missing required argument: {}", key)))
}

/// Numbers may arrive as JSON numbers or numeric strings
fn number_arg(arguments: &Value, key: &str) -> ServerResult<f64> {
    match arguments.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| ServerError::InvalidParams(format!("Missing or non-numeric argument: {}", key)))
}

/// Run a tool and return its JSON payload
pub async fn call(weather: &WeatherClient, name: &str, arguments: &Value) -> ServerResult<Value> {
    info!("Calling tool {} with {}", name, arguments);
    match name {
        GET_WEATHER_ALERTS => weather.alerts(string_arg(arguments, "state")?).await,
        GET_COORDINATES => weather.coordinates(string_arg(arguments, "location")?).await,
        GET_WEATHER_FORECAST => {
            let latitude = number_arg(arguments, "latitude")?;
            let longitude = number_arg(arguments, "longitude")?;
            weather.forecast(latitude, longitude).await
        }
        other => Err(ServerError::MethodNotFound(format!("Unknown tool: {}", other))),
    }
}
