//! Field abstraction
//!
//! Everything above this module is written against the [`Field`] trait
//! rather than a concrete representation, mirroring the way the teacher
//! crate writes its engine against a `Scalar`/`StarkPoint` pair without ever
//! hard-coding curve arithmetic into the fabric. Two backends are provided:
//! [`mersenne61::Mersenne61`], a fast 61-bit Mersenne-prime field used by the
//! engine's tests and demo binary, and [`modular::ModularInt`], a generic
//! `num-bigint`-backed modular integer for arbitrary primes.

use std::fmt::Debug;
use std::ops::{Add, Mul, Neg, Sub};

use rand::RngCore;

pub mod mersenne61;
pub mod modular;

/// Re-exported as the engine's default field element type
pub use mersenne61::Mersenne61 as Fp;

/// The number of rejection-sampling retries attempted before giving up and
/// raising `FrescoError::ResourceExhausted` (spec.md §6)
pub const MAX_REJECTION_SAMPLING_ATTEMPTS: usize = 100;

/// An element of a prime field ℤ/pℤ
///
/// Implementors must maintain the canonical-representative invariant: the
/// value returned by any operation lies in `[0, p)`.
pub trait Field:
    Copy
    + Clone
    + Debug
    + PartialEq
    + Eq
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Neg<Output = Self>
    + Send
    + Sync
    + 'static
{
    /// The fixed-length big-endian byte encoding of an element, rounded up
    /// from `⌈log₂ p⌉` bits
    const BYTE_LEN: usize;

    /// The additive identity
    fn zero() -> Self;

    /// The multiplicative identity
    fn one() -> Self;

    /// Lift a `u64` into the field, reducing modulo `p`
    fn from_u64(value: u64) -> Self;

    /// Serialize to a fixed-length big-endian byte string
    fn to_bytes(&self) -> Vec<u8>;

    /// Deserialize from a fixed-length big-endian byte string
    ///
    /// # Panics
    /// Panics if `bytes.len() != Self::BYTE_LEN`.
    fn from_bytes(bytes: &[u8]) -> Self;

    /// Sample a uniformly random element using rejection sampling over a
    /// DRBG bitstream, retrying up to [`MAX_REJECTION_SAMPLING_ATTEMPTS`]
    /// times before returning `None`
    fn try_random(rng: &mut impl RngCore) -> Option<Self>;

    /// Sample a uniformly random element
    ///
    /// # Panics
    /// Panics if rejection sampling exceeds the documented retry bound; use
    /// [`Field::try_random`] to handle this as a `ResourceExhausted` error
    /// instead.
    fn random(rng: &mut impl RngCore) -> Self {
        Self::try_random(rng).expect("rejection sampling exceeded retry bound")
    }

    /// The multiplicative inverse, if one exists (it always does for a
    /// nonzero element of a prime field)
    fn inverse(&self) -> Option<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_len_is_eight_for_mersenne61() {
        assert_eq!(Fp::BYTE_LEN, 8);
    }
}
