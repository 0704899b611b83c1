//! Clients for the National Weather Service and Nominatim APIs

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::UpstreamConfig;
use crate::errors::{ServerError, ServerResult};

/// Nominatim's usage policy allows one request per second
const GEOCODER_INTERVAL: Duration = Duration::from_secs(1);

/// Forecast periods returned to the caller
const FORECAST_PERIODS: usize = 7;

#[derive(Debug, Deserialize)]
struct AlertCollection {
    #[serde(default)]
    features: Vec<AlertFeature>,
}

#[derive(Debug, Deserialize)]
struct AlertFeature {
    #[serde(default)]
    properties: AlertProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlertProperties {
    #[serde(default)]
    event: String,
    #[serde(default)]
    headline: Option<String>,
    #[serde(default)]
    severity: String,
    #[serde(default)]
    urgency: String,
    #[serde(default)]
    area_desc: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    expires: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocoderHit {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct PointResponse {
    properties: PointProperties,
}

#[derive(Debug, Deserialize)]
struct PointProperties {
    forecast: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    properties: ForecastProperties,
}

#[derive(Debug, Deserialize)]
struct ForecastProperties {
    #[serde(default)]
    updated: Option<String>,
    #[serde(default)]
    periods: Vec<Value>,
}

/// Thin client over the two public APIs the tools use
pub struct WeatherClient {
    http: reqwest::Client,
    upstream: UpstreamConfig,
    last_geocode: Mutex<Option<Instant>>,
}

impl WeatherClient {
    pub fn new(upstream: UpstreamConfig) -> ServerResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(upstream.user_agent.clone())
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            upstream,
            last_geocode: Mutex::new(None),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> ServerResult<T> {
        debug!("GET {}", url);
        let response = self
            .http
            .get(url)
            .header("Accept", "application/geo+json, application/json")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(if status == StatusCode::NOT_FOUND {
                ServerError::NotFound(format!("{} returned 404", url))
            } else {
                ServerError::External(format!("{} returned {}: {}", url, status, body))
            });
        }
        Ok(response.json::<T>().await?)
    }

    /// Active alerts for a two-letter US state code
    pub async fn alerts(&self, state: &str) -> ServerResult<Value> {
        let state = state.trim();
        if state.len() != 2 || !state.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ServerError::InvalidParams(
                "State must be a 2-letter US state code".to_string(),
            ));
        }
        let state = state.to_ascii_uppercase();
        let url = format!("{}/alerts/active?area={}", self.upstream.weather_api_url, state);
        let collection: AlertCollection = self.get_json(&url).await?;

        let alerts: Vec<Value> = collection
            .features
            .into_iter()
            .map(|feature| {
                let p = feature.properties;
                json!({
                    "event": p.event,
                    "headline": p.headline.unwrap_or_default(),
                    "severity": p.severity,
                    "urgency": p.urgency,
                    "areas": p.area_desc,
                    "description": p.description.unwrap_or_default(),
                    "expires": p.expires.unwrap_or_default(),
                })
            })
            .collect();
        info!("{} active alert(s) for {}", alerts.len(), state);
        Ok(json!({ "state": state, "count": alerts.len(), "alerts": alerts }))
    }

    /// Geocode a free-form location.
    ///
    /// A miss is an ordinary answer with `found: false`, not an error.
    pub async fn coordinates(&self, location: &str) -> ServerResult<Value> {
        let location = location.trim();
        if location.is_empty() {
            return Err(ServerError::InvalidParams("Location must not be empty".to_string()));
        }

        {
            let mut last = self.last_geocode.lock().await;
            if let Some(previous) = *last {
                tokio::time::sleep_until(previous + GEOCODER_INTERVAL).await;
            }
            *last = Some(Instant::now());
        }

        let url = reqwest::Url::parse_with_params(
            &format!("{}/search", self.upstream.geocoder_url),
            &[("q", location), ("format", "json"), ("limit", "1")],
        )
        .map_err(|e| ServerError::Internal(format!("Invalid geocoder URL: {}", e)))?;
        let hits: Vec<GeocoderHit> = self.get_json(url.as_str()).await?;

        let Some(hit) = hits.into_iter().next() else {
            return Ok(json!({
                "location": location,
                "found": false,
                "error": format!("No coordinates found for '{}'. Try being more specific (e.g., add state/country).", location),
            }));
        };
        let latitude: f64 = hit
            .lat
            .parse()
            .map_err(|_| ServerError::External(format!("Bad latitude from geocoder: {}", hit.lat)))?;
        let longitude: f64 = hit
            .lon
            .parse()
            .map_err(|_| ServerError::External(format!("Bad longitude from geocoder: {}", hit.lon)))?;

        Ok(json!({
            "location": location,
            "display_name": hit.display_name,
            "latitude": latitude,
            "longitude": longitude,
            "found": true,
            "source": "OpenStreetMap Nominatim",
        }))
    }

    /// Forecast for a point, resolved through the NWS grid lookup
    pub async fn forecast(&self, latitude: f64, longitude: f64) -> ServerResult<Value> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(ServerError::InvalidParams("Invalid coordinates".to_string()));
        }

        let url = format!(
            "{}/points/{:.4},{:.4}",
            self.upstream.weather_api_url, latitude, longitude
        );
        let point: PointResponse = match self.get_json(&url).await {
            Ok(point) => point,
            Err(ServerError::NotFound(_)) => {
                return Ok(json!({
                    "error": "Location not found or outside US National Weather Service coverage area",
                    "latitude": latitude,
                    "longitude": longitude,
                }))
            }
            Err(e) => return Err(e),
        };
        let forecast_url = point.properties.forecast.ok_or_else(|| {
            ServerError::External("No forecast URL found in grid point response".to_string())
        })?;

        let forecast: ForecastResponse = self.get_json(&forecast_url).await?;
        let periods: Vec<Value> = forecast
            .properties
            .periods
            .into_iter()
            .take(FORECAST_PERIODS)
            .map(|period| {
                json!({
                    "name": period["name"],
                    "temperature": period["temperature"],
                    "temperatureUnit": period["temperatureUnit"],
                    "windSpeed": period["windSpeed"],
                    "windDirection": period["windDirection"],
                    "shortForecast": period["shortForecast"],
                    "detailedForecast": period["detailedForecast"],
                })
            })
            .collect();

        Ok(json!({
            "location": format!("{}, {}", latitude, longitude),
            "updated": forecast.properties.updated.unwrap_or_else(|| "Unknown".to_string()),
            "periods": periods,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client(base: &str) -> WeatherClient {
        WeatherClient::new(UpstreamConfig {
            weather_api_url: base.to_string(),
            geocoder_url: base.to_string(),
            user_agent: "mcp-duet-test".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_alerts_are_flattened() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/alerts/active")
            .match_query(Matcher::UrlEncoded("area".into(), "RI".into()))
            .match_header("user-agent", "mcp-duet-test")
            .with_status(200)
            .with_body(
                r#"{"features":[{"properties":{"event":"Flood Watch","headline":"Flood Watch issued","severity":"Moderate","urgency":"Expected","areaDesc":"Providence"}}]}"#,
            )
            .create_async()
            .await;

        let alerts = client(&server.url()).alerts("ri").await.unwrap();

        mock.assert_async().await;
        assert_eq!(alerts["count"], 1);
        assert_eq!(alerts["alerts"][0]["event"], "Flood Watch");
        assert_eq!(alerts["alerts"][0]["areas"], "Providence");
    }

    #[tokio::test]
    async fn test_bad_state_code_is_rejected_locally() {
        let result = client("http://127.0.0.1:1").alerts("Rhode Island").await;
        assert!(matches!(result, Err(ServerError::InvalidParams(_))));
    }

    #[tokio::test]
    async fn test_coordinates_hit_and_miss() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/search")
            .match_query(Matcher::UrlEncoded("q".into(), "Providence RI".into()))
            .with_status(200)
            .with_body(r#"[{"lat":"41.8239891","lon":"-71.4128343","display_name":"Providence, Rhode Island"}]"#)
            .create_async()
            .await;
        server
            .mock("GET", "/search")
            .match_query(Matcher::UrlEncoded("q".into(), "Atlantis".into()))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let client = client(&server.url());
        let hit = client.coordinates("Providence RI").await.unwrap();
        assert_eq!(hit["found"], true);
        assert!((hit["latitude"].as_f64().unwrap() - 41.82).abs() < 0.01);

        let miss = client.coordinates("Atlantis").await.unwrap();
        assert_eq!(miss["found"], false);
    }

    #[tokio::test]
    async fn test_forecast_follows_grid_link() {
        let mut server = mockito::Server::new_async().await;
        let forecast_url = format!("{}/gridpoints/BOX/64,64/forecast", server.url());
        server
            .mock("GET", "/points/41.8000,-71.4000")
            .with_status(200)
            .with_body(format!(r#"{{"properties":{{"forecast":"{}"}}}}"#, forecast_url))
            .create_async()
            .await;
        server
            .mock("GET", "/gridpoints/BOX/64,64/forecast")
            .with_status(200)
            .with_body(
                r#"{"properties":{"updated":"2024-06-01T12:00:00Z","periods":[{"name":"Tonight","temperature":58,"temperatureUnit":"F","windSpeed":"5 mph","windDirection":"SW","shortForecast":"Clear","detailedForecast":"Clear skies."}]}}"#,
            )
            .create_async()
            .await;

        let forecast = client(&server.url()).forecast(41.8, -71.4).await.unwrap();
        assert_eq!(forecast["periods"][0]["shortForecast"], "Clear");
        assert_eq!(forecast["updated"], "2024-06-01T12:00:00Z");
    }

    #[tokio::test]
    async fn test_forecast_outside_coverage() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/points/48.8566,2.3522")
            .with_status(404)
            .create_async()
            .await;

        let forecast = client(&server.url()).forecast(48.8566, 2.3522).await.unwrap();
        assert!(forecast["error"].as_str().unwrap().contains("outside"));
    }
}
