//! Lab configuration
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration:
//!
//! ```rust
//! use trueno_lab::config::LabConfig;
//!
//! let config = LabConfig::from_json_str(r#"{ "poll_interval_ms": 50 }"#).unwrap();
//! assert_eq!(config.poll_interval_ms, 50);
//! assert_eq!(config.assistant_name, "George Jetson");
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{Error, Result};

/// Settings shared by a [`Laboratory`](crate::lab::Laboratory) and its assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabConfig {
    /// Name recorded on every experiment the assistant queues
    pub assistant_name: String,
    /// Supervisor poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Environment speed factor applied to duration estimates
    pub speed_factor: f32,
    /// Timeout for experiments that do not declare one (`None` = no timeout)
    pub default_max_duration_ms: Option<u64>,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            assistant_name: "George Jetson".to_string(),
            poll_interval_ms: 100,
            speed_factor: 1.0,
            default_max_duration_ms: None,
        }
    }
}

impl LabConfig {
    /// Parse and validate a JSON document.
    ///
    /// # Errors
    ///
    /// [`Error::Json`] on malformed JSON, [`Error::InvalidConfig`] if
    /// validation fails.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the assistant cannot work with.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] for a zero poll interval or a speed factor
    /// that is not strictly positive.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "poll_interval_ms must be at least 1".to_string(),
            ));
        }
        if !(self.speed_factor > 0.0 && self.speed_factor.is_finite()) {
            return Err(Error::InvalidConfig(format!(
                "speed_factor must be a positive number, got {}",
                self.speed_factor
            )));
        }
        Ok(())
    }

    /// Poll interval as a [`Duration`].
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Default timeout as a [`Duration`].
    #[must_use]
    pub fn default_max_duration(&self) -> Option<Duration> {
        self.default_max_duration_ms.map(Duration::from_millis)
    }
}
