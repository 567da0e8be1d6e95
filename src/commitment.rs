//! Hash-based commitments
//!
//! Used by the broadcast-validation step of native protocols (spec.md
//! §4.3) and by the batched MAC-check (spec.md §4.5): a party commits to a
//! value, exchanges commitments with its peers, then opens, so that no
//! party can choose its own contribution as a function of anyone else's.

use digest::Digest;
use sha3::Sha3_256;

use crate::field::Field;

/// A commitment to a field element together with the opening needed to
/// verify it
///
/// Constructed with a fresh random blinder every time so that committing to
/// the same value twice does not produce the same commitment.
#[derive(Clone, Debug)]
pub struct HashCommitment<F: Field> {
    /// The value committed to
    pub value: F,
    /// The random blinder mixed into the hash
    pub blinder: [u8; 32],
    /// The commitment itself, `H(blinder || value)`
    pub commitment: [u8; 32],
}

impl<F: Field> HashCommitment<F> {
    /// Commit to `value` using a fresh random blinder
    pub fn commit(value: F, rng: &mut impl rand::RngCore) -> Self {
        let mut blinder = [0u8; 32];
        rng.fill_bytes(&mut blinder);
        let commitment = Self::hash(&blinder, &value);

        Self { value, blinder, commitment }
    }

    /// Recompute the commitment hash for a given blinder and value
    fn hash(blinder: &[u8; 32], value: &F) -> [u8; 32] {
        let mut hasher = Sha3_256::new();
        hasher.update(blinder);
        hasher.update(value.to_bytes());
        hasher.finalize().into()
    }

    /// Verify that this commitment's opening matches its own commitment
    /// hash, i.e. that it was constructed honestly
    pub fn verify(&self) -> bool {
        Self::hash(&self.blinder, &self.value) == self.commitment
    }

    /// Verify a commitment received from a peer: recompute the hash from
    /// the claimed value and blinder and compare against the commitment
    /// that was exchanged before the opening
    pub fn verify_opening(commitment: &[u8; 32], blinder: &[u8; 32], value: &F) -> bool {
        &Self::hash(blinder, value) == commitment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Fp;
    use rand::thread_rng;

    #[test]
    fn commitment_verifies() {
        let mut rng = thread_rng();
        let comm = HashCommitment::commit(Fp::from_u64(42), &mut rng);
        assert!(comm.verify());
    }

    #[test]
    fn tampered_value_fails_verification() {
        let mut rng = thread_rng();
        let comm = HashCommitment::commit(Fp::from_u64(42), &mut rng);
        assert!(!HashCommitment::verify_opening(&comm.commitment, &comm.blinder, &Fp::from_u64(43)));
    }
}
