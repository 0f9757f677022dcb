//! Minimal 256-bit unsigned integer, used only for difficulty/target math.
//!
//! `bitcoin::pow::Target` exposes comparisons and compact-bits conversion but
//! not general arithmetic. This wraps `ruint`'s fixed-width integer so
//! `Difficulty` can do exact multiply/divide against `DIFF1_TARGET` without
//! going through lossy floats.

use std::ops::{Div, Mul};

use bitcoin::pow::Target;
use ruint::Uint;

pub type Repr = Uint<256, 4>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct U256(Repr);

impl U256 {
    pub const ZERO: Self = Self(Repr::ZERO);

    pub fn from_le_bytes(bytes: [u8; 32]) -> Self {
        Self(Repr::from_le_bytes(bytes))
    }

    pub fn to_le_bytes(self) -> [u8; 32] {
        self.0.to_le_bytes()
    }
}

impl From<Target> for U256 {
    fn from(target: Target) -> Self {
        Self::from_le_bytes(target.to_le_bytes())
    }
}

impl From<U256> for Target {
    fn from(value: U256) -> Self {
        Target::from_le_bytes(value.to_le_bytes())
    }
}

impl Mul<u64> for U256 {
    type Output = Self;
    fn mul(self, rhs: u64) -> Self {
        Self(self.0.saturating_mul(Repr::from(rhs)))
    }
}

impl Div<u64> for U256 {
    type Output = Self;
    fn div(self, rhs: u64) -> Self {
        Self(self.0 / Repr::from(rhs.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_roundtrip() {
        let t = Target::MAX;
        let u = U256::from(t);
        let back = Target::from(u);
        assert_eq!(t, back);
    }

    #[test]
    fn mul_div() {
        let one = U256::from_le_bytes({
            let mut b = [0u8; 32];
            b[0] = 1;
            b
        });
        let ten = one * 10;
        assert_eq!(ten / 10, one);
    }
}
