//! Configuration-driven HTTP/JSON provider.
//!
//! Each domain has an optional URL template. Placeholders are replaced with
//! request parameters, the request goes through `resilient_fetch`, and the
//! body is decoded as JSON (tiles are returned as raw bytes).
//!
//! | Domain  | Placeholders                             |
//! |---------|------------------------------------------|
//! | weather | `{lat}` `{lon}`                          |
//! | radar   | `{south}` `{west}` `{north}` `{east}`    |
//! | traffic | `{south}` `{west}` `{north}` `{east}`    |
//! | tiles   | `{z}` `{x}` `{y}`                        |
//!
//! `{key}` is available everywhere and is filled from `api_key_env`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::config::{ProviderConfig, RetryConfig};
use crate::error::{FetchError, FetchResult};
use crate::geo::{Bounds, LatLon, TileCoord};
use crate::provider::{DataDomain, Provider, SpeedCamera, TrafficFlow, WeatherNow};
use crate::resilience::{resilient_fetch, RetryOptions};
use crate::transport::{HttpRequest, HttpTransport};

/// Replace every `{name}` in `template` with its value.
pub fn expand_template(template: &str, vars: &[(&str, String)]) -> String {
    let mut url = template.to_string();
    for (name, value) in vars {
        url = url.replace(&format!("{{{}}}", name), value);
    }
    url
}

fn bounds_vars(a: LatLon, b: LatLon) -> Vec<(&'static str, String)> {
    let bounds = Bounds::from_corners(a, b);
    vec![
        ("south", bounds.south.to_string()),
        ("west", bounds.west.to_string()),
        ("north", bounds.north.to_string()),
        ("east", bounds.east.to_string()),
    ]
}

pub struct HttpProvider {
    config: ProviderConfig,
    transport: Arc<dyn HttpTransport>,
    retry: RetryOptions,
    api_key: Option<String>,
}

impl HttpProvider {
    pub fn new(config: ProviderConfig, transport: Arc<dyn HttpTransport>, retry: &RetryConfig) -> Self {
        let mut options = RetryOptions::from_config(retry, &config.name);
        if let Some(ms) = config.timeout_ms {
            options.timeout = Duration::from_millis(ms);
        }

        let api_key = config.api_key_env.as_deref().and_then(|var| match std::env::var(var) {
            Ok(key) => Some(key),
            Err(_) => {
                tracing::warn!(provider = %config.name, env = %var, "API key variable not set");
                None
            }
        });

        Self {
            config,
            transport,
            retry: options,
            api_key,
        }
    }

    fn request(&self, domain: DataDomain, mut vars: Vec<(&'static str, String)>) -> FetchResult<HttpRequest> {
        let template = self
            .config
            .template_for(domain)
            .ok_or_else(|| self.unsupported(domain))?;

        vars.push(("key", self.api_key.clone().unwrap_or_default()));
        let mut request = HttpRequest::get(expand_template(template, &vars));
        for (name, value) in &self.config.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        Ok(request)
    }

    async fn fetch_bytes(&self, domain: DataDomain, vars: Vec<(&'static str, String)>) -> FetchResult<Bytes> {
        let request = self.request(domain, vars)?;
        tracing::debug!(provider = %self.config.name, domain = %domain, url = %request.url, "Provider request");

        let response = resilient_fetch(self.transport.as_ref(), &request, &self.retry, None)
            .await?
            .error_for_status(&self.config.name)?;
        Ok(response.body)
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        domain: DataDomain,
        vars: Vec<(&'static str, String)>,
    ) -> FetchResult<T> {
        let body = self.fetch_bytes(domain, vars).await?;
        serde_json::from_slice(&body).map_err(|e| FetchError::Decode {
            service: self.config.name.clone(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl Provider for HttpProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn supports(&self, domain: DataDomain) -> bool {
        self.config.template_for(domain).is_some()
    }

    async fn get_weather_now(&self, lat: f64, lon: f64) -> FetchResult<WeatherNow> {
        let vars = vec![("lat", lat.to_string()), ("lon", lon.to_string())];
        self.fetch_json(DataDomain::Weather, vars).await
    }

    async fn get_speed_cameras(&self, a: LatLon, b: LatLon) -> FetchResult<Vec<SpeedCamera>> {
        self.fetch_json(DataDomain::Radar, bounds_vars(a, b)).await
    }

    async fn get_traffic_flow(&self, a: LatLon, b: LatLon) -> FetchResult<TrafficFlow> {
        self.fetch_json(DataDomain::Traffic, bounds_vars(a, b)).await
    }

    async fn get_tile(&self, coord: TileCoord) -> FetchResult<Bytes> {
        let vars = vec![
            ("z", coord.z.to_string()),
            ("x", coord.x.to_string()),
            ("y", coord.y.to_string()),
        ];
        self.fetch_bytes(DataDomain::Tiles, vars).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{HttpResponse, TransportError};
    use std::sync::Mutex;

    /// Records request URLs and answers every call with the same response.
    struct Recording {
        response: HttpResponse,
        urls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HttpTransport for Recording {
        async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.urls.lock().unwrap().push(request.url.clone());
            Ok(self.response.clone())
        }
    }

    fn provider(config: ProviderConfig, response: HttpResponse) -> (HttpProvider, Arc<Recording>) {
        let transport = Arc::new(Recording {
            response,
            urls: Mutex::new(Vec::new()),
        });
        let retry = RetryConfig {
            max_retries: 0,
            ..RetryConfig::default()
        };
        (HttpProvider::new(config, transport.clone(), &retry), transport)
    }

    fn config() -> ProviderConfig {
        ProviderConfig {
            name: "alpha".into(),
            weather_url: Some("https://alpha.test/now?lat={lat}&lon={lon}".into()),
            cameras_url: Some("https://alpha.test/cams?bbox={south},{west},{north},{east}".into()),
            traffic_url: None,
            tile_url: Some("https://alpha.test/{z}/{x}/{y}.png".into()),
            api_key_env: None,
            timeout_ms: None,
            headers: Default::default(),
        }
    }

    #[test]
    fn test_expand_template() {
        let url = expand_template(
            "https://t.test/{z}/{x}/{y}.png?k={key}",
            &[("z", "3".into()), ("x", "4".into()), ("y", "2".into()), ("key", "abc".into())],
        );
        assert_eq!(url, "https://t.test/3/4/2.png?k=abc");
    }

    #[tokio::test]
    async fn test_weather_decodes_json() {
        let body = r#"{"temperature_c": 18.5, "condition": "cloudy", "wind_speed_kph": 12.0}"#;
        let (p, transport) = provider(config(), HttpResponse::new(200, body));

        let weather = p.get_weather_now(52.52, 13.405).await.unwrap();
        assert_eq!(weather.condition, "cloudy");
        assert_eq!(
            transport.urls.lock().unwrap()[0],
            "https://alpha.test/now?lat=52.52&lon=13.405"
        );
    }

    #[tokio::test]
    async fn test_camera_box_is_normalized() {
        let (p, transport) = provider(config(), HttpResponse::new(200, "[]"));

        let cams = p
            .get_speed_cameras(LatLon::new(53.0, 14.0), LatLon::new(52.0, 13.0))
            .await
            .unwrap();
        assert!(cams.is_empty());
        assert_eq!(
            transport.urls.lock().unwrap()[0],
            "https://alpha.test/cams?bbox=52,13,53,14"
        );
    }

    #[tokio::test]
    async fn test_missing_template_is_unsupported() {
        let (p, transport) = provider(config(), HttpResponse::new(200, "{}"));
        let err = p
            .get_traffic_flow(LatLon::new(0.0, 0.0), LatLon::new(1.0, 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Unsupported { domain: DataDomain::Traffic, .. }));
        assert!(transport.urls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_client_error_and_bad_body() {
        let (p, _) = provider(config(), HttpResponse::new(404, "nope"));
        let err = p.get_weather_now(0.0, 0.0).await.unwrap_err();
        assert!(matches!(err, FetchError::Http { status: 404, .. }));

        let (p, _) = provider(config(), HttpResponse::new(200, "not json"));
        let err = p.get_weather_now(0.0, 0.0).await.unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_tile_bytes() {
        let (p, transport) = provider(config(), HttpResponse::new(200, &b"\x89PNG"[..]));
        let bytes = p.get_tile(TileCoord { z: 10, x: 550, y: 335 }).await.unwrap();
        assert_eq!(&bytes[..], b"\x89PNG");
        assert_eq!(transport.urls.lock().unwrap()[0], "https://alpha.test/10/550/335.png");
    }
}
