use serde_derive::Deserialize;

/// Deployment settings: everything that describes the installation rather
/// than a single invocation.  Loaded from an optional settings file merged
/// with `SOAK_*` environment variables (`SOAK_WEATHER__API_KEY`, ...).
#[derive(Debug, Deserialize)]
pub struct Settings {
    pub relay: Relay,
    pub weather: Weather,
    pub dashboard: Dashboard,
    pub reporter: Reporter,
}

#[derive(Debug, Deserialize)]
pub struct Relay {
    pub pin: u64,
    /// Level convention of the relay board; the stock wiring switches the
    /// valve on a low level.
    pub active_low: bool,
}

#[derive(Debug, Deserialize)]
pub struct Weather {
    pub endpoint: String,
    pub latitude: f64,
    pub longitude: f64,
    pub api_key: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct Dashboard {
    pub url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct Reporter {
    pub interval_secs: u64,
}

pub fn load(name: &str) -> Result<Settings, failure::Error> {
    let mut raw = config::Config::new();

    raw.set_default("relay.pin", 27i64)?;
    raw.set_default("relay.active_low", true)?;
    raw.set_default("weather.endpoint", "https://api.openweathermap.org/data/3.0/onecall")?;
    raw.set_default("weather.latitude", 0.0)?;
    raw.set_default("weather.longitude", 0.0)?;
    raw.set_default("weather.api_key", "")?;
    raw.set_default("weather.timeout_secs", 10i64)?;
    raw.set_default("dashboard.url", "http://127.0.0.1:5000/api/status")?;
    raw.set_default("dashboard.timeout_secs", 10i64)?;
    raw.set_default("reporter.interval_secs", 300i64)?;

    raw.merge(config::File::with_name(name).required(false))?;
    raw.merge(config::Environment::with_prefix("SOAK").separator("__"))?;

    Ok(raw.try_into()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_section() {
        let settings = load("soak-settings-test-nonexistent").unwrap();

        assert_eq!(settings.relay.pin, 27);
        assert!(settings.relay.active_low);
        assert_eq!(settings.weather.timeout_secs, 10);
        assert_eq!(settings.dashboard.timeout_secs, 10);
        assert_eq!(settings.reporter.interval_secs, 300);
    }
}
