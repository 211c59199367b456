// File: presencebot-core/src/samplers/weather.rs

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::http::HttpClient;
use crate::Error;

pub const WEATHER_ENDPOINT: &str = "https://api.weatherapi.com/v1/current.json";
pub const POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const MAX_RETRIES: u32 = 10;
const RETRY_PAUSE: Duration = Duration::from_secs(3);

pub const DEFAULT_TIMEZONE: &str = "Asia/Bangkok";

/// Latest conditions for a city. Fields hold their display defaults until the
/// first successful poll.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherSnapshot {
    pub timezone: String,
    pub city: String,
    pub region: String,
    pub country: String,
    pub temp_c: f64,
    pub temp_f: f64,
    pub wind_kph: f64,
    pub wind_mph: f64,
    pub wind_degree: f64,
    pub wind_dir: String,
    pub pressure_mb: f64,
    pub pressure_in: f64,
    pub precip_mm: f64,
    pub precip_in: f64,
    pub gust_kph: f64,
    pub gust_mph: f64,
    pub feelslike_c: f64,
    pub feelslike_f: f64,
    pub windchill_c: f64,
    pub windchill_f: f64,
    pub heatindex_c: f64,
    pub heatindex_f: f64,
    pub dewpoint_c: f64,
    pub dewpoint_f: f64,
    pub vis_km: f64,
    pub vis_miles: f64,
    pub humidity: f64,
    pub cloud: f64,
    pub uv: f64,
    pub co: f64,
    pub no2: f64,
    pub o3: f64,
    pub so2: f64,
    pub pm2_5: f64,
    pub pm10: f64,
}

impl Default for WeatherSnapshot {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE.to_string(),
            city: "Unknown".to_string(),
            region: String::new(),
            country: String::new(),
            temp_c: 0.0,
            temp_f: 32.0,
            wind_kph: 0.0,
            wind_mph: 0.0,
            wind_degree: 0.0,
            wind_dir: "N".to_string(),
            pressure_mb: 1013.0,
            pressure_in: 29.92,
            precip_mm: 0.0,
            precip_in: 0.0,
            gust_kph: 0.0,
            gust_mph: 0.0,
            feelslike_c: 0.0,
            feelslike_f: 32.0,
            windchill_c: 0.0,
            windchill_f: 32.0,
            heatindex_c: 0.0,
            heatindex_f: 32.0,
            dewpoint_c: 0.0,
            dewpoint_f: 32.0,
            vis_km: 10.0,
            vis_miles: 6.2,
            humidity: 50.0,
            cloud: 0.0,
            uv: 0.0,
            co: 0.0,
            no2: 0.0,
            o3: 0.0,
            so2: 0.0,
            pm2_5: 0.0,
            pm10: 0.0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    location: ApiLocation,
    current: ApiCurrent,
}

#[derive(Debug, Deserialize)]
struct ApiLocation {
    name: Option<String>,
    region: Option<String>,
    country: Option<String>,
    tz_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiCurrent {
    temp_c: Option<f64>,
    temp_f: Option<f64>,
    wind_kph: Option<f64>,
    wind_mph: Option<f64>,
    wind_degree: Option<f64>,
    wind_dir: Option<String>,
    pressure_mb: Option<f64>,
    pressure_in: Option<f64>,
    precip_mm: Option<f64>,
    precip_in: Option<f64>,
    gust_kph: Option<f64>,
    gust_mph: Option<f64>,
    feelslike_c: Option<f64>,
    feelslike_f: Option<f64>,
    windchill_c: Option<f64>,
    windchill_f: Option<f64>,
    heatindex_c: Option<f64>,
    heatindex_f: Option<f64>,
    dewpoint_c: Option<f64>,
    dewpoint_f: Option<f64>,
    vis_km: Option<f64>,
    vis_miles: Option<f64>,
    humidity: Option<f64>,
    cloud: Option<f64>,
    uv: Option<f64>,
    air_quality: Option<ApiAirQuality>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiAirQuality {
    co: Option<f64>,
    no2: Option<f64>,
    o3: Option<f64>,
    so2: Option<f64>,
    pm2_5: Option<f64>,
    pm10: Option<f64>,
}

/// Parses a weatherapi.com `current.json` body. Missing or zero fields keep
/// the display defaults.
pub fn parse_current(body: &str) -> Result<WeatherSnapshot, Error> {
    let api: ApiResponse = serde_json::from_str(body)?;
    let d = WeatherSnapshot::default();
    let c = api.current;
    let aq = c.air_quality.unwrap_or_default();

    let num = |v: Option<f64>, fallback: f64| v.filter(|x| *x != 0.0).unwrap_or(fallback);
    let text = |v: Option<String>, fallback: String| v.filter(|s| !s.is_empty()).unwrap_or(fallback);

    Ok(WeatherSnapshot {
        timezone: text(api.location.tz_id, d.timezone),
        city: text(api.location.name, d.city),
        region: text(api.location.region, d.region),
        country: text(api.location.country, d.country),
        temp_c: num(c.temp_c, d.temp_c),
        temp_f: num(c.temp_f, d.temp_f),
        wind_kph: num(c.wind_kph, d.wind_kph),
        wind_mph: num(c.wind_mph, d.wind_mph),
        wind_degree: num(c.wind_degree, d.wind_degree),
        wind_dir: text(c.wind_dir, d.wind_dir),
        pressure_mb: num(c.pressure_mb, d.pressure_mb),
        pressure_in: num(c.pressure_in, d.pressure_in),
        precip_mm: num(c.precip_mm, d.precip_mm),
        precip_in: num(c.precip_in, d.precip_in),
        gust_kph: num(c.gust_kph, d.gust_kph),
        gust_mph: num(c.gust_mph, d.gust_mph),
        feelslike_c: num(c.feelslike_c, d.feelslike_c),
        feelslike_f: num(c.feelslike_f, d.feelslike_f),
        windchill_c: num(c.windchill_c, d.windchill_c),
        windchill_f: num(c.windchill_f, d.windchill_f),
        heatindex_c: num(c.heatindex_c, d.heatindex_c),
        heatindex_f: num(c.heatindex_f, d.heatindex_f),
        dewpoint_c: num(c.dewpoint_c, d.dewpoint_c),
        dewpoint_f: num(c.dewpoint_f, d.dewpoint_f),
        vis_km: num(c.vis_km, d.vis_km),
        vis_miles: num(c.vis_miles, d.vis_miles),
        humidity: num(c.humidity, d.humidity),
        cloud: num(c.cloud, d.cloud),
        uv: num(c.uv, d.uv),
        co: num(aq.co, d.co),
        no2: num(aq.no2, d.no2),
        o3: num(aq.o3, d.o3),
        so2: num(aq.so2, d.so2),
        pm2_5: num(aq.pm2_5, d.pm2_5),
        pm10: num(aq.pm10, d.pm10),
    })
}

/// Polls current conditions for one city and keeps the latest snapshot.
/// Readers never wait on the network.
pub struct WeatherSampler {
    city: String,
    api_key: Option<String>,
    http: Arc<dyn HttpClient>,
    latest: RwLock<WeatherSnapshot>,
}

impl WeatherSampler {
    pub fn new(city: impl Into<String>, api_key: Option<String>, http: Arc<dyn HttpClient>) -> Self {
        Self {
            city: city.into(),
            api_key,
            http,
            latest: RwLock::new(WeatherSnapshot::default()),
        }
    }

    pub fn latest(&self) -> WeatherSnapshot {
        self.latest.read().clone()
    }

    /// One poll, retried up to [`MAX_RETRIES`] times.
    pub async fn update(&self) -> Result<(), Error> {
        let Some(key) = self.api_key.as_deref() else {
            return Err(Error::Config("no weather API key configured".into()));
        };
        let mut url = Url::parse(WEATHER_ENDPOINT)?;
        url.query_pairs_mut()
            .append_pair("key", key)
            .append_pair("q", &self.city)
            .append_pair("aqi", "yes");

        let mut attempt = 0;
        loop {
            match self.fetch(url.as_str()).await {
                Ok(snapshot) => {
                    debug!("(WeatherSampler) {} -> {}°C", self.city, snapshot.temp_c);
                    *self.latest.write() = snapshot;
                    return Ok(());
                }
                Err(e) if attempt < MAX_RETRIES => {
                    attempt += 1;
                    debug!("(WeatherSampler) attempt {} for '{}' failed: {:?}", attempt, self.city, e);
                    sleep(RETRY_PAUSE).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<WeatherSnapshot, Error> {
        let resp = self.http.get(url.to_string(), HashMap::new()).await?;
        if !resp.is_success() {
            return Err(Error::Platform(format!("weather API returned HTTP {}", resp.status)));
        }
        parse_current(&resp.body)
    }

    /// Polls every [`POLL_INTERVAL`] until `cancel` fires.
    pub fn spawn_polling(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            if self.api_key.is_none() {
                debug!("(WeatherSampler) no API key; '{}' keeps default readings", self.city);
                return;
            }
            loop {
                if let Err(e) = self.update().await {
                    warn!("(WeatherSampler) giving up on '{}' until next poll: {:?}", self.city, e);
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = sleep(POLL_INTERVAL) => {}
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpResponse, MockHttpClient};

    const BODY: &str = r#"{
        "location": {"name": "Pattaya", "region": "Chon Buri", "country": "Thailand", "tz_id": "Asia/Bangkok"},
        "current": {"temp_c": 31.5, "temp_f": 88.7, "wind_dir": "SW", "humidity": 70,
                    "vis_km": 0, "air_quality": {"pm2_5": 12.3}}
    }"#;

    #[test]
    fn parses_and_fills_defaults() {
        let snap = parse_current(BODY).expect("parse");
        assert_eq!(snap.city, "Pattaya");
        assert_eq!(snap.temp_c, 31.5);
        assert_eq!(snap.wind_dir, "SW");
        assert_eq!(snap.humidity, 70.0);
        assert_eq!(snap.pm2_5, 12.3);
        // zero and missing fall back
        assert_eq!(snap.vis_km, 10.0);
        assert_eq!(snap.pressure_mb, 1013.0);
    }

    #[tokio::test]
    async fn update_stores_latest_snapshot() {
        let mut http = MockHttpClient::new();
        http.expect_get()
            .withf(|url, _| url.contains("q=Pattaya") && url.contains("aqi=yes"))
            .times(1)
            .returning(|_, _| Ok(HttpResponse { status: 200, body: BODY.to_string() }));

        let sampler = WeatherSampler::new("Pattaya", Some("k".into()), Arc::new(http));
        sampler.update().await.expect("update");
        assert_eq!(sampler.latest().region, "Chon Buri");
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let mut http = MockHttpClient::new();
        http.expect_get()
            .times(MAX_RETRIES as usize + 1)
            .returning(|_, _| Ok(HttpResponse { status: 500, body: String::new() }));

        let sampler = WeatherSampler::new("Nowhere", Some("k".into()), Arc::new(http));
        assert!(sampler.update().await.is_err());
        assert_eq!(sampler.latest(), WeatherSnapshot::default());
    }

    #[tokio::test]
    async fn missing_key_is_a_config_error() {
        let sampler = WeatherSampler::new("x", None, Arc::new(MockHttpClient::new()));
        assert!(matches!(sampler.update().await, Err(Error::Config(_))));
    }
}
