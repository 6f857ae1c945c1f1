//! Engine configuration
//!
//! [`TicketEngineConfig`] groups every tunable of the engine into sections.
//! All sections have working defaults, so an empty file (or no file at all)
//! yields the standard routing weights and SLA table.
//!
//! # Configuration Sections
//!
//! - [`RoutingConfig`]: candidate ordering and conflict retries
//! - [`ScoringConfig`]: factor weights, proximity cutoff, performance window
//! - [`SlaConfig`]: per-priority timeouts
//! - [`EscalationConfig`]: background sweep schedule
//! - [`DatabaseConfig`]: SQLite connection settings
//! - [`LoggingConfig`]: tracing output
//!
//! # Loading
//!
//! ```no_run
//! use fixdesk_ticket_engine::config::TicketEngineConfig;
//!
//! // Defaults, then ticket-engine.toml, then FIXDESK__* environment variables
//! let config = TicketEngineConfig::load(Some("ticket-engine.toml".as_ref()))?;
//! assert!(config.validate().is_ok());
//! # Ok::<(), fixdesk_ticket_engine::TicketEngineError>(())
//! ```
//!
//! Environment variables use `__` between path segments, for example
//! `FIXDESK__ESCALATION__SWEEP_INTERVAL_SECS=30` or
//! `FIXDESK__DATABASE__URL=sqlite://tickets.db`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TicketEngineError};
use crate::logging::LoggingConfig;
use crate::types::Priority;

/// Tolerance used when checking that weights sum to one
const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketEngineConfig {
    pub routing: RoutingConfig,
    pub scoring: ScoringConfig,
    pub sla: SlaConfig,
    pub escalation: EscalationConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

/// Candidate selection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Extra selection rounds after a provider fills up at commit time
    pub max_conflict_retries: u32,

    /// Providers whose availability differs by no more than this are ordered
    /// by distance instead
    pub availability_band: f64,
}

/// Weighted scoring settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub skill_match_weight: f64,
    pub availability_weight: f64,
    pub proximity_weight: f64,
    pub performance_weight: f64,

    /// Moved from skill match and performance onto proximity and availability
    /// for HIGH priority tickets
    pub high_priority_shift: f64,

    /// Proximity score reaches zero at this distance
    pub proximity_cutoff_km: f64,

    /// Trailing window of completed tickets used for the performance factor
    pub performance_window_days: u32,

    /// Performance score for providers without completed tickets in the
    /// window. Sits below a perfect record so new providers are not favoured
    /// over proven ones.
    pub neutral_performance: f64,
}

/// Timeouts for one priority level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaThresholds {
    /// OPEN ticket must be assigned within this many minutes
    pub assignment_timeout_minutes: u32,
    /// ASSIGNED ticket must be accepted within this many minutes
    pub acceptance_timeout_minutes: u32,
    /// Ticket must be resolved within this many hours
    pub resolution_timeout_hours: u32,
}

/// Per-priority SLA table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlaConfig {
    pub high: SlaThresholds,
    pub medium: SlaThresholds,
    pub low: SlaThresholds,
}

/// Background escalation sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    pub enabled: bool,
    pub sweep_interval_secs: u64,
}

/// SQLite connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `sqlite::memory:` or `sqlite://path/to/file.db`
    pub url: String,
    pub max_connections: u32,
    pub create_if_missing: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 3,
            availability_band: 0.1,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            skill_match_weight: 0.4,
            availability_weight: 0.2,
            proximity_weight: 0.3,
            performance_weight: 0.1,
            high_priority_shift: 0.1,
            proximity_cutoff_km: 50.0,
            performance_window_days: 30,
            neutral_performance: 0.7,
        }
    }
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            high: SlaThresholds {
                assignment_timeout_minutes: 15,
                acceptance_timeout_minutes: 30,
                resolution_timeout_hours: 4,
            },
            medium: SlaThresholds {
                assignment_timeout_minutes: 30,
                acceptance_timeout_minutes: 60,
                resolution_timeout_hours: 12,
            },
            low: SlaThresholds {
                assignment_timeout_minutes: 120,
                acceptance_timeout_minutes: 240,
                resolution_timeout_hours: 48,
            },
        }
    }
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval_secs: 60,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 5,
            create_if_missing: true,
        }
    }
}

impl SlaConfig {
    pub fn thresholds(&self, priority: Priority) -> &SlaThresholds {
        match priority {
            Priority::High => &self.high,
            Priority::Medium => &self.medium,
            Priority::Low => &self.low,
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        for priority in Priority::ALL {
            let t = self.thresholds(priority);
            if t.assignment_timeout_minutes == 0
                || t.acceptance_timeout_minutes == 0
                || t.resolution_timeout_hours == 0
            {
                return Err(format!("SLA timeouts for {} must be greater than 0", priority));
            }
        }

        if !(self.high.resolution_timeout_hours <= self.medium.resolution_timeout_hours
            && self.medium.resolution_timeout_hours <= self.low.resolution_timeout_hours)
        {
            return Err(
                "resolution timeouts must be ordered HIGH <= MEDIUM <= LOW".to_string(),
            );
        }

        Ok(())
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        let weights = [
            ("skill_match_weight", self.skill_match_weight),
            ("availability_weight", self.availability_weight),
            ("proximity_weight", self.proximity_weight),
            ("performance_weight", self.performance_weight),
        ];
        for (name, weight) in weights {
            if !(0.0..=1.0).contains(&weight) {
                return Err(format!("{} must be within [0, 1], got {}", name, weight));
            }
        }

        let sum: f64 = weights.iter().map(|(_, w)| w).sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(format!("scoring weights must sum to 1.0, got {}", sum));
        }

        let shift = self.high_priority_shift;
        if shift < 0.0
            || self.skill_match_weight - shift < -WEIGHT_TOLERANCE
            || self.performance_weight - shift < -WEIGHT_TOLERANCE
            || self.proximity_weight + shift > 1.0 + WEIGHT_TOLERANCE
            || self.availability_weight + shift > 1.0 + WEIGHT_TOLERANCE
        {
            return Err(format!(
                "high_priority_shift {} pushes a weight outside [0, 1]",
                shift
            ));
        }

        if !(self.proximity_cutoff_km > 0.0) {
            return Err("proximity_cutoff_km must be greater than 0".to_string());
        }

        if self.performance_window_days == 0 {
            return Err("performance_window_days must be greater than 0".to_string());
        }

        if !(0.0..=1.0).contains(&self.neutral_performance) {
            return Err("neutral_performance must be within [0, 1]".to_string());
        }

        Ok(())
    }
}

impl TicketEngineConfig {
    /// Layer defaults, an optional config file and `FIXDESK__*` variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("FIXDESK")
                .separator("__")
                .try_parsing(true),
        );

        let config: TicketEngineConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| TicketEngineError::config(e.to_string()))?;

        config.validate().map_err(TicketEngineError::Config)?;
        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(self.routing.availability_band >= 0.0 && self.routing.availability_band <= 1.0) {
            return Err("availability_band must be within [0, 1]".to_string());
        }

        self.scoring.validate()?;
        self.sla.validate()?;

        if self.escalation.sweep_interval_secs == 0 {
            return Err("sweep_interval_secs must be greater than 0".to_string());
        }

        if self.database.url.is_empty() {
            return Err("database url cannot be empty".to_string());
        }

        if self.database.max_connections == 0 {
            return Err("max_connections must be greater than 0".to_string());
        }

        self.logging.validate()
    }
}
