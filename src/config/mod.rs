use crate::rating::RatingMethodology;
use chrono::NaiveDate;
use std::env;
use std::fmt;
use std::str::FromStr;

/// Distinguishes runtime behavior for different stages of a rating cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub telemetry: TelemetryConfig,
    pub rating: RatingOverrides,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let rating = RatingOverrides {
            winsor_threshold: parse_var("STAR_WINSOR_THRESHOLD")?,
            winsor_step: parse_var("STAR_WINSOR_STEP")?,
            winsor_max_iterations: parse_var("STAR_WINSOR_MAX_ITERATIONS")?,
            percentile_buckets: parse_var("STAR_PERCENTILE_BUCKETS")?,
            recency_cutoff: parse_date_var("STAR_RECENCY_CUTOFF")?,
        };

        Ok(Self {
            environment,
            telemetry: TelemetryConfig { log_level },
            rating,
        })
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Environment overrides layered on top of a methodology file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RatingOverrides {
    pub winsor_threshold: Option<f64>,
    pub winsor_step: Option<f64>,
    pub winsor_max_iterations: Option<u32>,
    pub percentile_buckets: Option<u32>,
    pub recency_cutoff: Option<NaiveDate>,
}

impl RatingOverrides {
    pub fn apply(&self, methodology: &mut RatingMethodology) {
        if let Some(threshold) = self.winsor_threshold {
            methodology.winsor.threshold = threshold;
        }
        if let Some(step) = self.winsor_step {
            methodology.winsor.step = step;
        }
        if let Some(max_iterations) = self.winsor_max_iterations {
            methodology.winsor.max_iterations = max_iterations;
        }
        if let Some(buckets) = self.percentile_buckets {
            methodology.percentile.buckets = buckets;
        }
        if let Some(cutoff) = self.recency_cutoff {
            methodology.availability.recency_cutoff = Some(cutoff);
        }
    }
}

fn parse_var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { var: name, value: raw }),
        _ => Ok(None),
    }
}

fn parse_date_var(name: &'static str) -> Result<Option<NaiveDate>, ConfigError> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|source| ConfigError::InvalidDate {
                var: name,
                value: raw,
                source,
            }),
        _ => Ok(None),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidNumber {
        var: &'static str,
        value: String,
    },
    InvalidDate {
        var: &'static str,
        value: String,
        source: chrono::ParseError,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidNumber { var, value } => {
                write!(f, "{var} must be numeric (found '{value}')")
            }
            ConfigError::InvalidDate { var, value, .. } => {
                write!(f, "{var} must be a YYYY-MM-DD date (found '{value}')")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidNumber { .. } => None,
            ConfigError::InvalidDate { source, .. } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for var in [
            "APP_ENV",
            "APP_LOG_LEVEL",
            "STAR_WINSOR_THRESHOLD",
            "STAR_WINSOR_STEP",
            "STAR_WINSOR_MAX_ITERATIONS",
            "STAR_PERCENTILE_BUCKETS",
            "STAR_RECENCY_CUTOFF",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.rating, RatingOverrides::default());
    }

    #[test]
    fn overrides_reach_the_methodology() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("STAR_WINSOR_MAX_ITERATIONS", "500");
        env::set_var("STAR_RECENCY_CUTOFF", "2024-01-01");
        let config = AppConfig::load().expect("config loads");
        reset_env();

        let mut methodology = RatingMethodology::standard();
        config.rating.apply(&mut methodology);
        assert_eq!(methodology.winsor.max_iterations, 500);
        assert_eq!(methodology.winsor.threshold, 2.58);
        assert_eq!(
            methodology.availability.recency_cutoff,
            NaiveDate::from_ymd_opt(2024, 1, 1)
        );
    }

    #[test]
    fn rejects_malformed_numbers() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("STAR_WINSOR_STEP", "tiny");
        let result = AppConfig::load();
        reset_env();

        match result {
            Err(ConfigError::InvalidNumber { var, .. }) => assert_eq!(var, "STAR_WINSOR_STEP"),
            other => panic!("expected invalid number, got {other:?}"),
        }
    }
}
