//! Configuration for PPOR services.
//!
//! Programmatic defaults, a builder, and `PPOR_`-prefixed environment
//! overrides:
//!
//! - `PPOR_STRICT_MODE` - require the 2-of-3 secondary channel quorum
//! - `PPOR_NONCE_TTL_SECS` - challenge lifetime
//! - `PPOR_SCHEDULE_DUR_MS` - stimulus schedule duration
//! - `PPOR_HISTORY_WINDOW` - per-room round-history window
//! - `PPOR_LOG_LEVEL` - tracing filter level

use crate::verify::LivenessThresholds;
use crate::{PporError, Result};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PporConfig {
    /// Require at least 2 of 3 secondary liveness channels to pass.
    pub strict_mode: bool,
    /// Unconsumed challenge nonces expire after this many seconds.
    pub nonce_ttl_secs: u64,
    /// Target capture duration handed to the stimulus generator.
    pub schedule_dur_ms: u32,
    /// Most-recent rounds retained per room for in-session display.
    pub history_window: usize,
    /// Verifier thresholds; fixed in production, overridable for tests.
    pub thresholds: LivenessThresholds,
    /// Log level for the tracing subscriber.
    pub log_level: String,
}

impl Default for PporConfig {
    fn default() -> Self {
        Self {
            strict_mode: true,
            nonce_ttl_secs: 120,
            schedule_dur_ms: crate::stimulus::DEFAULT_DURATION_MS,
            history_window: 32,
            thresholds: LivenessThresholds::default(),
            log_level: "info".into(),
        }
    }
}

impl PporConfig {
    pub fn builder() -> PporConfigBuilder {
        PporConfigBuilder::default()
    }

    /// Load configuration from `PPOR_*` environment variables on top of the
    /// defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(strict) = std::env::var("PPOR_STRICT_MODE") {
            config.strict_mode = strict.eq_ignore_ascii_case("true") || strict == "1";
        }
        if let Ok(ttl) = std::env::var("PPOR_NONCE_TTL_SECS") {
            config.nonce_ttl_secs = ttl
                .parse()
                .map_err(|e| PporError::ConfigError(format!("invalid PPOR_NONCE_TTL_SECS: {e}")))?;
        }
        if let Ok(dur) = std::env::var("PPOR_SCHEDULE_DUR_MS") {
            config.schedule_dur_ms = dur
                .parse()
                .map_err(|e| PporError::ConfigError(format!("invalid PPOR_SCHEDULE_DUR_MS: {e}")))?;
        }
        if let Ok(window) = std::env::var("PPOR_HISTORY_WINDOW") {
            config.history_window = window
                .parse()
                .map_err(|e| PporError::ConfigError(format!("invalid PPOR_HISTORY_WINDOW: {e}")))?;
        }
        if let Ok(level) = std::env::var("PPOR_LOG_LEVEL") {
            config.log_level = level;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.nonce_ttl_secs == 0 {
            return Err(PporError::ConfigError("nonce_ttl_secs must be > 0".into()));
        }
        if !(400..=10_000).contains(&self.schedule_dur_ms) {
            return Err(PporError::ConfigError(
                "schedule_dur_ms must be in 400..=10000".into(),
            ));
        }
        if self.history_window == 0 {
            return Err(PporError::ConfigError("history_window must be > 0".into()));
        }
        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(PporError::ConfigError(format!("unknown log level: {other}"))),
        }
    }
}

#[derive(Default)]
pub struct PporConfigBuilder {
    strict_mode: Option<bool>,
    nonce_ttl_secs: Option<u64>,
    schedule_dur_ms: Option<u32>,
    history_window: Option<usize>,
    thresholds: Option<LivenessThresholds>,
    log_level: Option<String>,
}

impl PporConfigBuilder {
    pub fn strict_mode(mut self, strict: bool) -> Self {
        self.strict_mode = Some(strict);
        self
    }

    pub fn nonce_ttl_secs(mut self, secs: u64) -> Self {
        self.nonce_ttl_secs = Some(secs);
        self
    }

    pub fn schedule_dur_ms(mut self, ms: u32) -> Self {
        self.schedule_dur_ms = Some(ms);
        self
    }

    pub fn history_window(mut self, window: usize) -> Self {
        self.history_window = Some(window);
        self
    }

    pub fn thresholds(mut self, thresholds: LivenessThresholds) -> Self {
        self.thresholds = Some(thresholds);
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    pub fn build(self) -> Result<PporConfig> {
        let defaults = PporConfig::default();
        let config = PporConfig {
            strict_mode: self.strict_mode.unwrap_or(defaults.strict_mode),
            nonce_ttl_secs: self.nonce_ttl_secs.unwrap_or(defaults.nonce_ttl_secs),
            schedule_dur_ms: self.schedule_dur_ms.unwrap_or(defaults.schedule_dur_ms),
            history_window: self.history_window.unwrap_or(defaults.history_window),
            thresholds: self.thresholds.unwrap_or(defaults.thresholds),
            log_level: self.log_level.unwrap_or(defaults.log_level),
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        PporConfig::default().validate().unwrap();
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = PporConfig::builder()
            .strict_mode(false)
            .nonce_ttl_secs(30)
            .history_window(8)
            .build()
            .unwrap();
        assert!(!config.strict_mode);
        assert_eq!(config.nonce_ttl_secs, 30);
        assert_eq!(config.history_window, 8);
    }

    #[test]
    fn zero_ttl_rejected() {
        let result = PporConfig::builder().nonce_ttl_secs(0).build();
        assert!(matches!(result, Err(PporError::ConfigError(_))));
    }

    #[test]
    fn out_of_range_duration_rejected() {
        let result = PporConfig::builder().schedule_dur_ms(50).build();
        assert!(matches!(result, Err(PporError::ConfigError(_))));
    }

    #[test]
    fn bad_log_level_rejected() {
        let result = PporConfig::builder().log_level("verbose").build();
        assert!(matches!(result, Err(PporError::ConfigError(_))));
    }
}
