//! The 61-bit Mersenne prime field ℤ/pℤ, p = 2^61 - 1
//!
//! Used as the engine's default field: fast modular reduction (a shift and
//! an add, no division) keeps the round-based evaluator's local gate
//! arithmetic cheap, which matters far more here than in a curve-based
//! protocol since every linear combination in the numeric builder surface
//! runs through it.

use std::ops::{Add, Mul, Neg, Sub};

use rand::RngCore;
use zeroize::Zeroize;

use super::{Field, MAX_REJECTION_SAMPLING_ATTEMPTS};

/// The modulus, p = 2^61 - 1 (a Mersenne prime)
pub const MODULUS: u64 = (1u64 << 61) - 1;

/// An element of ℤ/pℤ for p = 2^61 - 1
///
/// The inner `u64` is always kept in `[0, MODULUS)`.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Mersenne61(u64);

impl std::fmt::Debug for Mersenne61 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Mersenne61({})", self.0)
    }
}

/// Lets a dealt secret (a triple's `a`/`b`/`c`, a mask's clear value, the
/// combined MAC key) be wiped from its stack slot once it has been split
/// into shares, rather than lingering for the rest of `InMemorySource::deal`
impl Zeroize for Mersenne61 {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

impl Mersenne61 {
    /// Reduce a 128-bit product modulo `p` using the Mersenne-prime trick:
    /// `2^61 ≡ 1 (mod p)`, so splitting `x` into high and low 61-bit halves
    /// and summing them reduces the bit length without division
    fn reduce128(x: u128) -> u64 {
        let mut low = (x & (MODULUS as u128)) as u64;
        let mut high = (x >> 61) as u64;

        // One pass rarely fully reduces since `high` itself can exceed `p`;
        // loop the shift-and-add until the sum fits below `2 * p`.
        while high > 0 {
            let sum = low as u128 + high as u128;
            low = (sum & (MODULUS as u128)) as u64;
            high = (sum >> 61) as u64;
        }

        if low >= MODULUS {
            low - MODULUS
        } else {
            low
        }
    }

    /// Construct an element from a raw `u64`, reducing modulo `p`
    pub fn new(value: u64) -> Self {
        Self(value % MODULUS)
    }

    /// The canonical representative, guaranteed to lie in `[0, p)`
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Field for Mersenne61 {
    const BYTE_LEN: usize = 8;

    fn zero() -> Self {
        Self(0)
    }

    fn one() -> Self {
        Self(1)
    }

    fn from_u64(value: u64) -> Self {
        Self::new(value)
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.0.to_be_bytes().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        assert_eq!(bytes.len(), Self::BYTE_LEN, "wrong byte length for Mersenne61");
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Self::new(u64::from_be_bytes(buf))
    }

    fn try_random(rng: &mut impl RngCore) -> Option<Self> {
        for _ in 0..MAX_REJECTION_SAMPLING_ATTEMPTS {
            // Draw 61 bits and reject the (vanishingly rare) draws >= p to
            // avoid biasing the distribution
            let candidate = rng.next_u64() & MODULUS;
            if candidate < MODULUS {
                return Some(Self(candidate));
            }
        }
        None
    }

    fn inverse(&self) -> Option<Self> {
        if self.0 == 0 {
            return None;
        }
        // p is prime, so a^(p-2) = a^-1 by Fermat's little theorem
        Some(self.pow(MODULUS - 2))
    }
}

impl Mersenne61 {
    /// Modular exponentiation by repeated squaring
    fn pow(&self, mut exp: u64) -> Self {
        let mut base = *self;
        let mut acc = Self::one();
        while exp > 0 {
            if exp & 1 == 1 {
                acc = acc * base;
            }
            base = base * base;
            exp >>= 1;
        }
        acc
    }
}

impl Add for Mersenne61 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        let sum = self.0 + rhs.0;
        Self(if sum >= MODULUS { sum - MODULUS } else { sum })
    }
}

impl Sub for Mersenne61 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        if self.0 >= rhs.0 {
            Self(self.0 - rhs.0)
        } else {
            Self(MODULUS - (rhs.0 - self.0))
        }
    }
}

impl Mul for Mersenne61 {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self(Self::reduce128(self.0 as u128 * rhs.0 as u128))
    }
}

impl Neg for Mersenne61 {
    type Output = Self;
    fn neg(self) -> Self {
        if self.0 == 0 {
            self
        } else {
            Self(MODULUS - self.0)
        }
    }
}

impl From<u64> for Mersenne61 {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl From<i64> for Mersenne61 {
    fn from(value: i64) -> Self {
        if value >= 0 {
            Self::new(value as u64)
        } else {
            -Self::new((-value) as u64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn add_sub_roundtrip() {
        let a = Mersenne61::new(MODULUS - 1);
        let b = Mersenne61::new(2);
        assert_eq!(a + b, Mersenne61::new(1));
        assert_eq!((a + b) - b, a);
    }

    #[test]
    fn mul_and_inverse() {
        let a = Mersenne61::new(12345);
        let inv = a.inverse().unwrap();
        assert_eq!(a * inv, Mersenne61::one());
    }

    #[test]
    fn negation() {
        let a = Mersenne61::new(7);
        assert_eq!(a + (-a), Mersenne61::zero());
    }

    #[test]
    fn serialization_roundtrip() {
        let a = Mersenne61::new(0xDEAD_BEEF);
        let bytes = a.to_bytes();
        assert_eq!(bytes.len(), Mersenne61::BYTE_LEN);
        assert_eq!(Mersenne61::from_bytes(&bytes), a);
    }

    #[test]
    fn canonical_representative_stays_in_range() {
        let a = Mersenne61::new(MODULUS + 5);
        assert_eq!(a.value(), 5);
    }

    proptest! {
        /// The canonical representative always lies in `[0, p)`, for any
        /// raw `u64` including ones at or beyond the modulus
        #[test]
        fn canonical_representative_is_always_in_range(raw in any::<u64>()) {
            let a = Mersenne61::new(raw);
            prop_assert!(a.value() < MODULUS);
        }

        /// Addition and multiplication are commutative and associative, and
        /// multiplication distributes over addition -- the field axioms
        /// every linear and Beaver-triple gate in `crate::spdz`/`crate::protocol`
        /// relies on
        #[test]
        fn field_axioms_hold(x in any::<u64>(), y in any::<u64>(), z in any::<u64>()) {
            let (a, b, c) = (Mersenne61::new(x), Mersenne61::new(y), Mersenne61::new(z));

            prop_assert_eq!(a + b, b + a);
            prop_assert_eq!(a * b, b * a);
            prop_assert_eq!((a + b) + c, a + (b + c));
            prop_assert_eq!((a * b) * c, a * (b * c));
            prop_assert_eq!(a * (b + c), a * b + a * c);
            prop_assert_eq!(a - b, a + (-b));
        }

        /// Serialization round-trips for any element
        #[test]
        fn serialization_roundtrips_for_any_element(raw in any::<u64>()) {
            let a = Mersenne61::new(raw);
            let bytes = a.to_bytes();
            prop_assert_eq!(bytes.len(), Mersenne61::BYTE_LEN);
            prop_assert_eq!(Mersenne61::from_bytes(&bytes), a);
        }

        /// Every nonzero element's inverse multiplies back to one
        #[test]
        fn nonzero_elements_have_a_multiplicative_inverse(raw in 1u64..MODULUS) {
            let a = Mersenne61::new(raw);
            let inv = a.inverse().expect("nonzero element always has an inverse in a prime field");
            prop_assert_eq!(a * inv, Mersenne61::one());
        }
    }
}
