//! A generic modular-integer field backend for an arbitrary prime modulus
//!
//! Unlike [`super::mersenne61::Mersenne61`], the modulus here is a runtime
//! value rather than a compile-time constant, so two `ModularInt`s must
//! share a `Modulus` to be combined. This backend exists to exercise field
//! serialization and rejection sampling against a modulus that is not a
//! convenient power-of-two-minus-one; the engine itself is wired against
//! the Mersenne backend for speed (see `field::Fp`).

use std::sync::Arc;

use num_bigint::BigUint;
use num_traits::{One, Zero};
use rand::RngCore;

use super::MAX_REJECTION_SAMPLING_ATTEMPTS;

/// A shared prime modulus for a family of [`ModularInt`] elements
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Modulus(Arc<BigUint>);

impl Modulus {
    /// Construct a modulus from a `BigUint`
    pub fn new(p: BigUint) -> Self {
        Self(Arc::new(p))
    }

    /// The number of bytes needed for a fixed-length big-endian encoding of
    /// an element, `⌈⌈log₂ p⌉ / 8⌉`
    pub fn byte_len(&self) -> usize {
        (self.0.bits() as usize).div_ceil(8)
    }
}

/// An element of ℤ/pℤ for a runtime-chosen prime `p`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModularInt {
    value: BigUint,
    modulus: Modulus,
}

impl ModularInt {
    /// Construct an element, reducing `value` modulo `modulus.0`
    pub fn new(value: BigUint, modulus: Modulus) -> Self {
        let value = value % modulus.0.as_ref();
        Self { value, modulus }
    }

    /// The zero element under the given modulus
    pub fn zero(modulus: Modulus) -> Self {
        Self { value: BigUint::zero(), modulus }
    }

    /// The one element under the given modulus
    pub fn one(modulus: Modulus) -> Self {
        Self { value: BigUint::one(), modulus }
    }

    /// The modulus this element is defined over
    pub fn modulus(&self) -> &Modulus {
        &self.modulus
    }

    /// The canonical representative as a `BigUint`
    pub fn value(&self) -> &BigUint {
        &self.value
    }

    fn check_same_modulus(&self, other: &Self) {
        assert_eq!(self.modulus, other.modulus, "modular arithmetic across different moduli");
    }

    /// Elementwise addition
    pub fn add(&self, rhs: &Self) -> Self {
        self.check_same_modulus(rhs);
        Self::new(&self.value + &rhs.value, self.modulus.clone())
    }

    /// Elementwise subtraction
    pub fn sub(&self, rhs: &Self) -> Self {
        self.check_same_modulus(rhs);
        let p = self.modulus.0.as_ref();
        let value = (p + &self.value - &rhs.value) % p;
        Self { value, modulus: self.modulus.clone() }
    }

    /// Elementwise multiplication
    pub fn mul(&self, rhs: &Self) -> Self {
        self.check_same_modulus(rhs);
        Self::new(&self.value * &rhs.value, self.modulus.clone())
    }

    /// Negation
    pub fn neg(&self) -> Self {
        if self.value.is_zero() {
            self.clone()
        } else {
            Self { value: self.modulus.0.as_ref() - &self.value, modulus: self.modulus.clone() }
        }
    }

    /// Serialize to a fixed-length big-endian byte string
    pub fn to_bytes(&self) -> Vec<u8> {
        let len = self.modulus.byte_len();
        let raw = self.value.to_bytes_be();
        let mut out = vec![0u8; len - raw.len()];
        out.extend_from_slice(&raw);
        out
    }

    /// Deserialize from a fixed-length big-endian byte string under the
    /// given modulus
    pub fn from_bytes(bytes: &[u8], modulus: Modulus) -> Self {
        Self::new(BigUint::from_bytes_be(bytes), modulus)
    }

    /// Sample a uniform element modulo `p` by rejection sampling over a
    /// byte-aligned DRBG bitstream, giving up after
    /// [`MAX_REJECTION_SAMPLING_ATTEMPTS`] attempts
    pub fn try_random(rng: &mut impl RngCore, modulus: Modulus) -> Option<Self> {
        let len = modulus.byte_len();
        for _ in 0..MAX_REJECTION_SAMPLING_ATTEMPTS {
            let mut buf = vec![0u8; len];
            rng.fill_bytes(&mut buf);
            let candidate = BigUint::from_bytes_be(&buf);
            if &candidate < modulus.0.as_ref() {
                return Some(Self { value: candidate, modulus });
            }
        }
        None
    }

    /// Multiplicative inverse via Fermat's little theorem, `a^(p-2) mod p`
    pub fn inverse(&self) -> Option<Self> {
        if self.value.is_zero() {
            return None;
        }
        let p = self.modulus.0.as_ref();
        let exponent = p - BigUint::from(2u32);
        let value = self.value.modpow(&exponent, p);
        Some(Self { value, modulus: self.modulus.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_modulus() -> Modulus {
        // A small prime for fast tests: 2^31 - 1 (Mersenne prime)
        Modulus::new(BigUint::from((1u64 << 31) - 1))
    }

    #[test]
    fn add_sub_roundtrip() {
        let m = test_modulus();
        let a = ModularInt::new(BigUint::from(10u32), m.clone());
        let b = ModularInt::new(BigUint::from(3u32), m);
        assert_eq!(a.add(&b).sub(&b), a);
    }

    #[test]
    fn mul_and_inverse() {
        let m = test_modulus();
        let a = ModularInt::new(BigUint::from(12345u32), m.clone());
        let inv = a.inverse().unwrap();
        assert_eq!(a.mul(&inv), ModularInt::one(m));
    }

    #[test]
    fn serialization_roundtrip() {
        let m = test_modulus();
        let a = ModularInt::new(BigUint::from(999_999u32), m.clone());
        let bytes = a.to_bytes();
        assert_eq!(bytes.len(), m.byte_len());
        assert_eq!(ModularInt::from_bytes(&bytes, m), a);
    }
}
