use std::time;

use serde_derive::Deserialize;
use slog_scope::{debug, warn};

use crate::settings;

/// Outcome of a rain check.  `Unknown` gates identically to `Clear`
/// (fail-open), but stays distinguishable for logging and the status label.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RainDecision {
    Rained,
    Clear,
    Unknown,
}

impl RainDecision {
    pub fn blocks_watering(&self) -> bool {
        *self == RainDecision::Rained
    }

    pub fn label(&self) -> &'static str {
        match *self {
            RainDecision::Rained => "Rain in last 24h",
            RainDecision::Clear => "No rain in last 24h",
            RainDecision::Unknown => "Weather data unavailable",
        }
    }
}

/// The gating seam between the scheduler and the weather service, so tests
/// can run against a canned decision.
pub trait RainCheck {
    fn decide(&self) -> RainDecision;
}

/// Queries the weather service for the last 24 hours of precipitation at a
/// fixed location.  Every failure mode degrades to `Unknown`: a broken
/// weather integration must never block watering.
pub struct RainGate {
    agent: ureq::Agent,
    endpoint: String,
    latitude: f64,
    longitude: f64,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct Forecast {
    #[serde(default)]
    hourly: Vec<HourlySample>,
}

#[derive(Debug, Deserialize)]
struct HourlySample {
    #[serde(default)]
    precipitation: f64,
}

impl RainGate {
    pub fn new(weather: &settings::Weather) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(time::Duration::from_secs(weather.timeout_secs))
            .build();

        RainGate {
            agent,
            endpoint: weather.endpoint.clone(),
            latitude: weather.latitude,
            longitude: weather.longitude,
            api_key: weather.api_key.clone(),
        }
    }

    fn fetch(&self) -> Result<RainDecision, failure::Error> {
        let response = self
            .agent
            .get(&self.endpoint)
            .query("lat", &self.latitude.to_string())
            .query("lon", &self.longitude.to_string())
            .query("appid", &self.api_key)
            .call()?;
        let forecast: Forecast = response.into_json()?;

        Ok(evaluate(&forecast))
    }
}

impl RainCheck for RainGate {
    fn decide(&self) -> RainDecision {
        match self.fetch() {
            Ok(decision) => {
                debug!("rain check: {:?}", decision);
                decision
            }
            Err(e) => {
                warn!("rain check failed, watering proceeds: {}", e);
                RainDecision::Unknown
            }
        }
    }
}

/// Rained iff any of the most recent 24 hourly samples reports measurable
/// precipitation.
fn evaluate(forecast: &Forecast) -> RainDecision {
    let rained = forecast
        .hourly
        .iter()
        .rev()
        .take(24)
        .any(|sample| sample.precipitation > 0.0);

    if rained {
        RainDecision::Rained
    } else {
        RainDecision::Clear
    }
}
