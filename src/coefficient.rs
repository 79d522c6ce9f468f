//! Coefficient algebra for traverser multiplicity.
//!
//! A coefficient is a semiring element attached to every traverser:
//!
//! - `combine_sequential` (the product) is applied when a traverser passes a
//!   step that carries its own coefficient. Associative, with `identity()` as
//!   its neutral element.
//! - `combine_merge` (the sum) is applied when two traversers holding equal
//!   values are coalesced. Associative and commutative, with `zero()` as its
//!   neutral element.
//!
//! Mixing domains is rejected by the type system: a `Pipeline<LongCoefficient>`
//! can only ever see `LongCoefficient` values.

use crate::bytecode::Value;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A multiplicity/weight domain for traversers.
pub trait Coefficient:
    Clone + Eq + Hash + fmt::Debug + fmt::Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Neutral element of `combine_sequential`; the coefficient of a fresh seed.
    fn identity() -> Self;

    /// Neutral element of `combine_merge`; the total of an empty stream.
    fn zero() -> Self;

    fn combine_sequential(&self, other: &Self) -> Self;

    fn combine_merge(&self, other: &Self) -> Self;

    /// The coefficient as a traverser value (used by `count`, `group_count`).
    fn to_value(&self) -> Value;

    fn is_identity(&self) -> bool {
        *self == Self::identity()
    }
}

/// Unsigned bulk counts. Sequential composition multiplies, merging adds.
///
/// Arithmetic saturates at `u64::MAX`; saturation keeps both operations
/// associative over the whole domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LongCoefficient(pub u64);

impl Coefficient for LongCoefficient {
    fn identity() -> Self {
        LongCoefficient(1)
    }

    fn zero() -> Self {
        LongCoefficient(0)
    }

    fn combine_sequential(&self, other: &Self) -> Self {
        LongCoefficient(self.0.saturating_mul(other.0))
    }

    fn combine_merge(&self, other: &Self) -> Self {
        LongCoefficient(self.0.saturating_add(other.0))
    }

    fn to_value(&self) -> Value {
        Value::Int(i64::try_from(self.0).unwrap_or(i64::MAX))
    }
}

impl fmt::Display for LongCoefficient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for LongCoefficient {
    fn from(n: u64) -> Self {
        LongCoefficient(n)
    }
}

/// Real-valued weights. Sequential composition multiplies, merging adds.
///
/// Equality and hashing are bitwise (with `-0.0` folded into `0.0`), so
/// weights can participate in structural step equality.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RealCoefficient(pub f64);

impl RealCoefficient {
    fn bits(&self) -> u64 {
        if self.0 == 0.0 {
            0.0f64.to_bits()
        } else {
            self.0.to_bits()
        }
    }
}

impl PartialEq for RealCoefficient {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for RealCoefficient {}

impl Hash for RealCoefficient {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

impl Coefficient for RealCoefficient {
    fn identity() -> Self {
        RealCoefficient(1.0)
    }

    fn zero() -> Self {
        RealCoefficient(0.0)
    }

    fn combine_sequential(&self, other: &Self) -> Self {
        RealCoefficient(self.0 * other.0)
    }

    fn combine_merge(&self, other: &Self) -> Self {
        RealCoefficient(self.0 + other.0)
    }

    fn to_value(&self) -> Value {
        Value::Float(self.0)
    }
}

impl fmt::Display for RealCoefficient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl From<f64> for RealCoefficient {
    fn from(x: f64) -> Self {
        RealCoefficient(x)
    }
}
