use std::fmt;

/// A validated real number in `[0.0, 1.0]`. Pixel distances are normalized into this
/// range by construction (see `episode_binger::distance`) and reliability scores are
/// derived from them, so both get to share one invariant instead of re-deriving it.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct UnitInterval(f64);

#[derive(Debug, thiserror::Error)]
#[error("{0} is not within [0.0, 1.0]")]
pub struct OutOfRange(f64);

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("{0} is not within [0.0, 1.0]")]
    OutOfRange(f64),
    #[error("not a number: {0}")]
    NotANumber(#[from] std::num::ParseFloatError),
}

impl UnitInterval {
    pub const ZERO: UnitInterval = UnitInterval(0.0);
    pub const ONE: UnitInterval = UnitInterval(1.0);

    pub fn new(value: f64) -> Result<Self, OutOfRange> {
        if (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(OutOfRange(value))
        }
    }

    /// Clamps instead of rejecting. Distance kernels are expected to already stay in
    /// range by construction; this exists for the rare floating point rounding that
    /// pushes a value a few ULPs outside [0,1].
    pub fn clamped(value: f64) -> Self {
        Self(value.clamp(0.0, 1.0))
    }

    pub fn get(self) -> f64 {
        self.0
    }

    pub fn complement(self) -> Self {
        Self(1.0 - self.0)
    }
}

impl fmt::Display for UnitInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

/// Lets `UnitInterval` be used directly as a `clap` argument type.
impl std::str::FromStr for UnitInterval {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: f64 = s.parse()?;
        Self::new(value).map_err(|OutOfRange(v)| ParseError::OutOfRange(v))
    }
}

impl Eq for UnitInterval {}

impl Ord for UnitInterval {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_out_of_range() {
        assert!(UnitInterval::new(-0.01).is_err());
        assert!(UnitInterval::new(1.01).is_err());
        assert!(UnitInterval::new(0.5).is_ok());
    }

    #[test]
    fn complement_round_trips() {
        let v = UnitInterval::new(0.3).unwrap();
        assert!((v.complement().get() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn parses_from_a_cli_style_string() {
        assert_eq!("0.9".parse::<UnitInterval>().unwrap().get(), 0.9);
        assert!("1.5".parse::<UnitInterval>().is_err());
        assert!("nope".parse::<UnitInterval>().is_err());
    }
}
