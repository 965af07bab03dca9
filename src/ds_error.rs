//! Setup-time errors. Nothing after `Simulation::new` can fail.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Ways a configuration can be rejected before the scheduler starts
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{name} must be within [0, 1], got {value}")]
    InvalidFraction { name: &'static str, value: f64 },

    #[error("attacker fractions sum to {0}, must not exceed 1")]
    AttackerFractionsExceedOne(f64),

    #[error("{name} must be finite, got {value}")]
    NonFinite { name: &'static str, value: f64 },

    #[error("weight {name} must be non-negative, got {value}")]
    NegativeWeight { name: &'static str, value: f64 },

    #[error("parent selection weights must sum to a positive total")]
    ZeroWeightTotal,

    #[error("topology needs at least one node")]
    EmptyTopology,

    #[error("area and radio range must be positive, got {width}x{height} with range {range}")]
    InvalidArea { width: f64, height: f64, range: f64 },

    #[error("{name} must be positive, got {value}")]
    InvalidInterval { name: &'static str, value: f64 },

    #[error("{name} must be a non-negative cost, got {value}")]
    InvalidCost { name: &'static str, value: f64 },

    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    #[error("scenario parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("scenario read error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rejects NaN and infinities
pub(crate) fn ensure_finite(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonFinite { name, value })
    }
}

pub(crate) fn ensure_fraction(name: &'static str, value: f64) -> Result<()> {
    ensure_finite(name, value)?;
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidFraction { name, value })
    }
}

pub(crate) fn ensure_positive(name: &'static str, value: f64) -> Result<()> {
    ensure_finite(name, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidInterval { name, value })
    }
}

pub(crate) fn ensure_cost(name: &'static str, value: f64) -> Result<()> {
    ensure_finite(name, value)?;
    if value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidCost { name, value })
    }
}
