//! Job progress values

use serde::{Deserialize, Serialize};

use crate::errors::{Result, TidemarkError};

/// Progress reported by a running job.
///
/// Always satisfies `0 <= value <= max` and `max > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    value: i64,
    max: i64,
}

impl Progress {
    pub fn new(value: i64, max: i64) -> Result<Self> {
        if max <= 0 {
            return Err(TidemarkError::InvalidInput(format!(
                "progress max must be positive, got {max}"
            )));
        }
        if value < 0 || value > max {
            return Err(TidemarkError::InvalidInput(format!(
                "progress value {value} outside 0..={max}"
            )));
        }
        Ok(Self { value, max })
    }

    pub const fn value(&self) -> i64 {
        self.value
    }

    pub const fn max(&self) -> i64 {
        self.max
    }

    /// Fraction complete in `0.0..=1.0`.
    #[allow(clippy::cast_precision_loss)]
    pub fn percentage(&self) -> f64 {
        self.value as f64 / self.max as f64
    }
}
