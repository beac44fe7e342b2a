//! hookdrain.toml configuration parser.
//!
//! Every field is optional; missing values fall back to the defaults of
//! the drain policy (12 attempts, 300s apart, 5m peak window over
//! `Custom/WindowsMetrics/ActiveUserSessions`).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_NAMESPACE: &str = "Custom/WindowsMetrics";
pub const DEFAULT_METRIC_NAME: &str = "ActiveUserSessions";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 12;
pub const DEFAULT_DELAY: Duration = Duration::from_secs(300);
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(300);
pub const DEFAULT_TICK: Duration = Duration::from_secs(30);
pub const DEFAULT_RETAIN_RESOLVED: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookdrainConfig {
    pub metric: Option<MetricConfig>,
    pub drain: Option<DrainConfig>,
    pub scheduler: Option<SchedulerConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricConfig {
    pub namespace: Option<String>,
    pub name: Option<String>,
    pub window: Option<String>,
    pub period: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DrainConfig {
    pub max_attempts: Option<u32>,
    pub delay: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub tick: Option<String>,
    pub retain_resolved: Option<String>,
}

/// Resolved drain policy used by the loop.
#[derive(Debug, Clone, PartialEq)]
pub struct DrainSettings {
    pub namespace: String,
    pub metric_name: String,
    /// Lookback window for the peak-usage query.
    pub window: Duration,
    /// Aggregation period passed to the metric source.
    pub period: Duration,
    pub max_attempts: u32,
    /// Wait between poll cycles.
    pub delay: Duration,
}

impl Default for DrainSettings {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            metric_name: DEFAULT_METRIC_NAME.to_string(),
            window: DEFAULT_WINDOW,
            period: DEFAULT_PERIOD,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_DELAY,
        }
    }
}

impl DrainSettings {
    /// Worst-case wall-clock time a drain can hold a pause.
    pub fn budget(&self) -> Duration {
        self.delay.saturating_mul(self.max_attempts)
    }
}

/// Resolved scheduler settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    pub tick: Duration,
    pub retain_resolved: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick: DEFAULT_TICK,
            retain_resolved: DEFAULT_RETAIN_RESOLVED,
        }
    }
}

impl HookdrainConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply defaults and validate the drain policy.
    pub fn drain_settings(&self) -> Result<DrainSettings, ConfigError> {
        let defaults = DrainSettings::default();
        let metric = self.metric.clone().unwrap_or_default();
        let drain = self.drain.clone().unwrap_or_default();

        let max_attempts = drain.max_attempts.unwrap_or(defaults.max_attempts);
        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "drain.max_attempts",
                message: "must be at least 1".to_string(),
            });
        }

        let namespace = metric.namespace.unwrap_or(defaults.namespace);
        let metric_name = metric.name.unwrap_or(defaults.metric_name);
        for (field, value) in [("metric.namespace", &namespace), ("metric.name", &metric_name)] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field,
                    message: "must not be empty".to_string(),
                });
            }
        }

        Ok(DrainSettings {
            namespace,
            metric_name,
            window: duration_or("metric.window", metric.window, defaults.window)?,
            period: duration_or("metric.period", metric.period, defaults.period)?,
            max_attempts,
            delay: duration_or("drain.delay", drain.delay, defaults.delay)?,
        })
    }

    pub fn scheduler_settings(&self) -> Result<SchedulerSettings, ConfigError> {
        let defaults = SchedulerSettings::default();
        let scheduler = self.scheduler.clone().unwrap_or_default();
        Ok(SchedulerSettings {
            tick: duration_or("scheduler.tick", scheduler.tick, defaults.tick)?,
            retain_resolved: duration_or(
                "scheduler.retain_resolved",
                scheduler.retain_resolved,
                defaults.retain_resolved,
            )?,
        })
    }
}

fn duration_or(
    field: &'static str,
    value: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => parse_duration(&raw).ok_or(ConfigError::Duration { field, value: raw }),
    }
}

/// Parse a duration string like "500ms", "30s", "5m", "1h", or bare seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else if let Some(hours) = s.strip_suffix('h') {
        hours
            .parse::<u64>()
            .ok()
            .and_then(|h| h.checked_mul(3600))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = HookdrainConfig::from_toml("").unwrap();
        let settings = config.drain_settings().unwrap();
        assert_eq!(settings, DrainSettings::default());
        assert_eq!(settings.max_attempts, 12);
        assert_eq!(settings.delay, Duration::from_secs(300));
        assert_eq!(settings.window, Duration::from_secs(300));
        assert_eq!(settings.budget(), Duration::from_secs(3600));
    }

    #[test]
    fn overrides_apply() {
        let config = HookdrainConfig::from_toml(
            r#"
[metric]
namespace = "Custom/LinuxMetrics"
name = "ActiveConnections"
window = "10m"

[drain]
max_attempts = 3
delay = "1m"

[scheduler]
tick = "5s"
"#,
        )
        .unwrap();

        let drain = config.drain_settings().unwrap();
        assert_eq!(drain.namespace, "Custom/LinuxMetrics");
        assert_eq!(drain.metric_name, "ActiveConnections");
        assert_eq!(drain.window, Duration::from_secs(600));
        assert_eq!(drain.max_attempts, 3);
        assert_eq!(drain.delay, Duration::from_secs(60));

        let scheduler = config.scheduler_settings().unwrap();
        assert_eq!(scheduler.tick, Duration::from_secs(5));
        assert_eq!(scheduler.retain_resolved, DEFAULT_RETAIN_RESOLVED);
    }

    #[test]
    fn zero_attempts_rejected() {
        let config = HookdrainConfig::from_toml("[drain]\nmax_attempts = 0\n").unwrap();
        assert!(matches!(
            config.drain_settings(),
            Err(ConfigError::Invalid { field: "drain.max_attempts", .. })
        ));
    }

    #[test]
    fn bad_duration_rejected() {
        let config = HookdrainConfig::from_toml("[drain]\ndelay = \"soon\"\n").unwrap();
        assert!(matches!(
            config.drain_settings(),
            Err(ConfigError::Duration { field: "drain.delay", .. })
        ));
    }

    #[test]
    fn parse_duration_values() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("45"), Some(Duration::from_secs(45)));
        assert_eq!(parse_duration("invalid"), None);
    }

    #[test]
    fn overflowing_duration_rejected() {
        assert_eq!(parse_duration("307445734561825861m"), None);
        assert_eq!(parse_duration("5124095576030432h"), None);

        let config =
            HookdrainConfig::from_toml("[drain]\ndelay = \"307445734561825861m\"\n").unwrap();
        assert!(matches!(
            config.drain_settings(),
            Err(ConfigError::Duration { field: "drain.delay", .. })
        ));
    }

    #[test]
    fn budget_saturates_on_huge_delay() {
        let settings = DrainSettings {
            delay: Duration::from_secs(u64::MAX),
            ..DrainSettings::default()
        };
        assert_eq!(settings.budget(), Duration::MAX);
    }
}
