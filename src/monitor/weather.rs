//! Outside temperature threshold check.
//!
//! The forecast itself comes from an external collaborator behind
//! [`WeatherSource`]; this module only owns the alerting logic: compare the
//! upcoming low/high against configured thresholds and word the warning.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::TemperatureConfig;
use crate::scheduler::Job;

const DATETIME_FORMAT: &str = "at %I:%M %p on %A";
const DEGREE: &str = "°C";

#[derive(Error, Debug)]
pub enum WeatherError {
    #[error("weather fetch failed: {0}")]
    Fetch(String),
}

/// Upcoming temperature extremes, in degrees Celsius.
#[derive(Debug, Clone, Default)]
pub struct Forecast {
    pub lowest: Option<(f64, DateTime<Utc>)>,
    pub highest: Option<(f64, DateTime<Utc>)>,
}

/// Forecast provider contract.
pub trait WeatherSource: Send {
    fn fetch(&mut self) -> impl Future<Output = Result<Forecast, WeatherError>> + Send;
}

/// Periodic temperature alerting against configured thresholds.
pub struct OutsideTemperature<W> {
    source: W,
    hot_threshold: f64,
    pipe_threshold: f64,
    interval: Duration,
}

impl<W: WeatherSource> OutsideTemperature<W> {
    pub fn from_config(config: &TemperatureConfig, source: W) -> Self {
        Self {
            source,
            hot_threshold: config.outside_hot_alert_threshold,
            pipe_threshold: config.pipe_alert_threshold,
            interval: Duration::from_secs(config.forecast_interval_hours * 60 * 60),
        }
    }

    /// How often the check should run.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Fetch the forecast and build the alert message. Empty when nothing
    /// crosses a threshold; only forecast points still in the future count.
    pub async fn check_temperature(&mut self) -> Result<String, WeatherError> {
        let forecast = self.source.fetch().await?;
        let now = Utc::now();
        Ok(self.check_forecast(&forecast, now))
    }

    fn check_forecast(&self, forecast: &Forecast, now: DateTime<Utc>) -> String {
        let (Some((low, low_t)), Some((high, high_t))) = (forecast.lowest, forecast.highest)
        else {
            return "Umm, The network seems to be having issues.".to_string();
        };

        tracing::debug!("low={}, low_t={}", low, low_t);
        tracing::debug!("high={}, high_t={}", high, high_t);

        let mut message = String::new();
        let mut alert = |header: &str, line: String| {
            if !message.is_empty() {
                message.push('\n');
            }
            message.push_str(header);
            message.push('\n');
            message.push_str(&line);
        };

        if low_t > now && low <= self.pipe_threshold {
            alert("keep your pipes!!", format_extreme("low", low, low_t));
        }
        if high_t > now && high < 0.0 {
            alert("It will be too cold!!", format_extreme("high", high, high_t));
        }
        if high_t > now && high > self.hot_threshold {
            alert("It will be too hot!!", format_extreme("high", high, high_t));
        }
        if low_t > now && low > self.hot_threshold {
            alert("You become butter...", format_extreme("low", low, low_t));
        }
        message
    }

    /// Plain two-line low/high summary, no thresholds involved.
    pub async fn fetch_temperature(&mut self) -> Result<Option<String>, WeatherError> {
        let forecast = self.source.fetch().await?;
        let (Some((low, low_t)), Some((high, high_t))) = (forecast.lowest, forecast.highest)
        else {
            return Ok(None);
        };
        Ok(Some(format!(
            "{}\n{}",
            format_extreme("low", low, low_t),
            format_extreme("high", high, high_t)
        )))
    }
}

fn format_extreme(kind: &str, value: f64, at: DateTime<Utc>) -> String {
    format!(
        "A {} of {:.1}{} {}",
        kind,
        value,
        DEGREE,
        at.format(DATETIME_FORMAT)
    )
}

impl<W: WeatherSource + 'static> Job for OutsideTemperature<W> {
    async fn run(&mut self) -> Option<String> {
        // A failed fetch keeps the job alive; next interval retries.
        match self.check_temperature().await {
            Ok(message) if !message.is_empty() => Some(message),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("temperature check failed: {}", e);
                None
            }
        }
    }
}
