//! Small parsing helpers shared by config validation and the schedulers.

use crate::errors::ConfigError;

/// A threshold expressed either as an absolute value or a percentage of some
/// termination budget. `--t-start`/`--t-end` accept `"25%"` or an absolute
/// number in the termination's unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Threshold {
    Absolute(f64),
    Percent(f64),
}

impl Threshold {
    pub fn parse(field: &str, s: &str) -> Result<Self, ConfigError> {
        let s = s.trim();
        if let Some(pct) = s.strip_suffix('%') {
            let value: f64 = pct.parse().map_err(|_| ConfigError::InvalidValue {
                field: field.to_string(),
                message: format!("'{}' is not a valid percentage", s),
            })?;
            Ok(Threshold::Percent(value))
        } else {
            let value: f64 = s.parse().map_err(|_| ConfigError::InvalidValue {
                field: field.to_string(),
                message: format!("'{}' is not a valid number", s),
            })?;
            Ok(Threshold::Absolute(value))
        }
    }

    /// Resolve against a termination budget expressed in the same unit
    /// (seconds for time termination, request count for count termination).
    pub fn resolve(&self, budget: f64) -> f64 {
        match self {
            Threshold::Absolute(v) => *v,
            Threshold::Percent(p) => p / 100.0 * budget,
        }
    }
}

/// Loads a request body: `@path` reads the file at `path` (relative to cwd),
/// anything else is the literal bytes of the argument.
pub fn load_body(raw: &str) -> Result<Vec<u8>, ConfigError> {
    if let Some(path) = raw.strip_prefix('@') {
        let p = std::path::Path::new(path);
        if !p.exists() {
            return Err(ConfigError::BodyFileNotFound(path.to_string()));
        }
        std::fs::read(p).map_err(|source| ConfigError::BodyFileRead {
            path: path.to_string(),
            source,
        })
    } else {
        Ok(raw.as_bytes().to_vec())
    }
}
