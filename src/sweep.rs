use crate::error::{Error, Result};

/// Wavenumbers `q0, q0 + step, q0 + 2 step, ...` strictly below `qmax`,
/// with `step = (qmax - q0) / points`.
///
/// The step is accumulated rather than recomputed from the index, so the
/// last value may drift by a few ulps from `q0 + i * step`.
#[derive(Debug, Clone)]
pub struct QSweep {
    current: f64,
    qmax: f64,
    step: f64,
}

impl QSweep {
    pub fn new(q0: f64, qmax: f64, points: usize) -> Result<Self> {
        if points == 0 {
            return Err(Error::InvalidParameter(
                "the Q sweep needs at least one point".to_string(),
            ));
        }
        if !q0.is_finite() || !qmax.is_finite() {
            return Err(Error::InvalidParameter(format!(
                "Q range must be finite, got [{}, {})",
                q0, qmax
            )));
        }

        Ok(Self {
            current: q0,
            qmax,
            step: (qmax - q0) / points as f64,
        })
    }

    pub fn step(&self) -> f64 {
        self.step
    }
}

impl Iterator for QSweep {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        // a non-positive step means qmax <= q0, the range is empty
        if self.step <= 0.0 || self.current >= self.qmax {
            return None;
        }
        let value = self.current;
        let next = self.current + self.step;
        // a step below the resolution of `current` would never reach qmax
        self.current = if next > self.current { next } else { self.qmax };
        Some(value)
    }
}
