//! Correlated-randomness supplier
//!
//! The offline/preprocessing phase that manufactures Beaver triples, input
//! masks and random shares is out of scope (spec.md §1): the engine only
//! consumes a [`Preprocessing`] trait, generalizing the teacher's
//! `SharedValueSource` from a single scalar/triple shape to the five
//! operations spec.md §6 names. Two implementations ship for tests and
//! demos; a real deployment would back this trait with an MPC-generated
//! feed instead (out of scope here, same as for the teacher's own
//! `#[cfg(test)] DummySharedScalarSource`).

use std::collections::HashMap;

use itertools::Itertools;
use rand::{rngs::StdRng, RngCore, SeedableRng};
use zeroize::Zeroize;

use crate::error::FrescoError;
use crate::field::{Field, Fp};
use crate::share::AuthenticatedShare;
use crate::PartyId;

/// A Beaver triple share: `a`, `b`, `c` such that `a * b = c` for the
/// underlying secrets
pub type TripleShare = (AuthenticatedShare, AuthenticatedShare, AuthenticatedShare);

/// One party's view of an input mask: an authenticated share of a random
/// field element `r`, plus `r` itself in the clear at the one party the mask
/// was generated for
///
/// `InputProtocol` needs both halves: every party folds `share` into the
/// fresh authenticated share it produces, but only the inputter can compute
/// the broadcast value `v - r` (spec.md §4.3 "Input"), which requires the
/// full clear `r`, not merely that party's own additive fragment of it.
/// Grounded in `kc1212-ezmpc`'s `RandShareMsg { share, clear, party_id }`
/// (`examples/other_examples/...-kc1212-ezmpc__src-message.rs.rs`), where
/// `clear` is likewise `Some` only for the message's owning party.
#[derive(Copy, Clone, Debug)]
pub struct InputMask {
    /// This party's authenticated share of the mask
    pub share: AuthenticatedShare,
    /// `Some(r)` only at the party this mask belongs to
    pub clear: Option<Fp>,
}

/// A truncation pair used by fixed-point division protocols (not exercised
/// by the numeric surface but part of the consumed interface per spec.md §6)
pub type TruncationPairShare = (AuthenticatedShare, AuthenticatedShare);

/// The correlated-randomness supplier consumed by native protocols
///
/// Every operation must be deterministic across parties in the sense that
/// the i-th call by every party returns *their* share of the same joint
/// randomness (spec.md §6); the two implementations below uphold this by
/// construction (a seeded trusted dealer) rather than by coordination.
pub trait Preprocessing: Send {
    /// Dequeue the next Beaver triple share
    fn next_triple(&mut self) -> Result<TripleShare, FrescoError>;

    /// Dequeue the next input-mask share for the given inputter
    ///
    /// The mask's clear value is known only to `inputter`; every party
    /// (including `inputter`) holds an authenticated share of it.
    fn next_input_mask(&mut self, inputter: PartyId) -> Result<InputMask, FrescoError>;

    /// Dequeue the next share of a uniformly random field element, known
    /// to no single party
    fn next_random_share(&mut self) -> Result<AuthenticatedShare, FrescoError>;

    /// Dequeue the next share of a uniformly random bit (0 or 1)
    fn next_bit(&mut self) -> Result<AuthenticatedShare, FrescoError>;

    /// Dequeue the next truncation pair for a `d`-bit truncation
    fn next_truncation_pair(&mut self, d: u32) -> Result<TruncationPairShare, FrescoError>;

    /// This party's share of the global MAC key α
    fn mac_key_share(&self) -> Fp;
}

/// A dummy preprocessing source that hands out only ones, mirroring the
/// teacher's `DummySharedScalarSource` test helper
///
/// Every "share" is simply the clear value itself on party 0 and zero
/// elsewhere, which keeps the MAC equation trivially satisfied (mac_key
/// share 1 on party 0, 0 elsewhere) without modelling real secret sharing.
/// Only useful for exercising the evaluator's control flow, never for
/// anything whose opened value needs to look like the underlying protocol.
#[derive(Clone, Debug)]
pub struct DummySource {
    party_id: PartyId,
}

impl DummySource {
    /// Construct a dummy source for the given party
    pub fn new(party_id: PartyId) -> Self {
        Self { party_id }
    }

    fn one_share(&self) -> AuthenticatedShare {
        if self.party_id == 0 {
            AuthenticatedShare::raw(Fp::one(), Fp::one())
        } else {
            AuthenticatedShare::raw(Fp::zero(), Fp::zero())
        }
    }
}

impl Preprocessing for DummySource {
    fn next_triple(&mut self) -> Result<TripleShare, FrescoError> {
        Ok((self.one_share(), self.one_share(), self.one_share()))
    }

    fn next_input_mask(&mut self, inputter: PartyId) -> Result<InputMask, FrescoError> {
        let share = self.one_share();
        let clear = if self.party_id == inputter { Some(share.value_share()) } else { None };
        Ok(InputMask { share, clear })
    }

    fn next_random_share(&mut self) -> Result<AuthenticatedShare, FrescoError> {
        Ok(self.one_share())
    }

    fn next_bit(&mut self) -> Result<AuthenticatedShare, FrescoError> {
        Ok(self.one_share())
    }

    fn next_truncation_pair(&mut self, _d: u32) -> Result<TruncationPairShare, FrescoError> {
        Ok((self.one_share(), self.one_share()))
    }

    fn mac_key_share(&self) -> Fp {
        if self.party_id == 0 {
            Fp::one()
        } else {
            Fp::zero()
        }
    }
}

/// A trusted-dealer preprocessing source: a single seed deals out
/// *correct* correlated randomness for `n` parties up front, each party
/// receiving only its own shares
///
/// This is test/demo tooling, not the offline phase (spec.md §1 explicitly
/// excludes a security proof or implementation of the real preprocessing
/// protocol); it exists so the engine's online-phase tests can run against
/// triples and masks that actually satisfy the MAC and triple invariants.
pub struct InMemorySource {
    party_id: PartyId,
    mac_key_share: Fp,
    triples: std::collections::VecDeque<TripleShare>,
    input_masks: HashMap<PartyId, std::collections::VecDeque<InputMask>>,
    random_shares: std::collections::VecDeque<AuthenticatedShare>,
    bits: std::collections::VecDeque<AuthenticatedShare>,
    truncation_pairs: std::collections::VecDeque<TruncationPairShare>,
}

impl InMemorySource {
    /// Deal preprocessing material for `n` parties from a single seed,
    /// returning one [`InMemorySource`] per party
    ///
    /// `count` bounds how many of each resource to pre-generate; a program
    /// that consumes more than `count` triples, masks, random shares or
    /// bits will see [`FrescoError::ResourceExhausted`] (spec.md §7, §8
    /// scenario 6).
    pub fn deal(n: usize, count: usize, seed: u64) -> Vec<Self> {
        let mut rng = StdRng::seed_from_u64(seed);

        // A single global MAC key, additively shared
        let alpha_shares = additive_share(Fp::random(&mut rng), n, &mut rng);

        let mut per_party_triples: Vec<_> = (0..n).map(|_| std::collections::VecDeque::new()).collect();
        for _ in 0..count {
            let mut a = Fp::random(&mut rng);
            let mut b = Fp::random(&mut rng);
            let mut c = a * b;
            let mut alpha = sum(&alpha_shares);

            let a_shares = authenticated_share(a, alpha, n, &mut rng);
            let b_shares = authenticated_share(b, alpha, n, &mut rng);
            let c_shares = authenticated_share(c, alpha, n, &mut rng);
            // the trusted dealer's plaintext a/b/c/alpha have no further use
            // once every party's share is computed
            a.zeroize();
            b.zeroize();
            c.zeroize();
            alpha.zeroize();
            for p in 0..n {
                per_party_triples[p].push_back((a_shares[p], b_shares[p], c_shares[p]));
            }
        }

        let mut per_party_masks: Vec<HashMap<PartyId, std::collections::VecDeque<InputMask>>> =
            (0..n).map(|_| HashMap::new()).collect();
        for inputter in 0..n {
            let mut queues: Vec<_> = (0..n).map(|_| std::collections::VecDeque::new()).collect();
            for _ in 0..count {
                let mut r = Fp::random(&mut rng);
                let mut alpha = sum(&alpha_shares);
                let shares = authenticated_share(r, alpha, n, &mut rng);
                // only the inputter's own dealt queue entry carries the
                // clear mask value; every other party gets `clear: None`
                // alongside the same `share` any other correlated value
                // would carry
                for p in 0..n {
                    let clear = if p == inputter { Some(r) } else { None };
                    queues[p].push_back(InputMask { share: shares[p], clear });
                }
                r.zeroize();
                alpha.zeroize();
            }
            for p in 0..n {
                per_party_masks[p].insert(inputter as PartyId, std::mem::take(&mut queues[p]));
            }
        }

        let mut per_party_random: Vec<_> = (0..n).map(|_| std::collections::VecDeque::new()).collect();
        let mut per_party_bits: Vec<_> = (0..n).map(|_| std::collections::VecDeque::new()).collect();
        for _ in 0..count {
            let mut alpha = sum(&alpha_shares);

            let mut r = Fp::random(&mut rng);
            let r_shares = authenticated_share(r, alpha, n, &mut rng);
            r.zeroize();

            let mut bit = if rng.next_u32() % 2 == 0 { Fp::zero() } else { Fp::one() };
            let bit_shares = authenticated_share(bit, alpha, n, &mut rng);
            bit.zeroize();
            alpha.zeroize();
            for p in 0..n {
                per_party_random[p].push_back(r_shares[p]);
            }
            for p in 0..n {
                per_party_bits[p].push_back(bit_shares[p]);
            }
        }

        let mut per_party_truncation: Vec<_> = (0..n).map(|_| std::collections::VecDeque::new()).collect();
        for _ in 0..count {
            let mut alpha = sum(&alpha_shares);
            let mut r = Fp::random(&mut rng);
            let mut r_shifted = r; // a single shared field has no bit-shift; kept as the same value
            let r_shares = authenticated_share(r, alpha, n, &mut rng);
            let r_shifted_shares = authenticated_share(r_shifted, alpha, n, &mut rng);
            r.zeroize();
            r_shifted.zeroize();
            alpha.zeroize();
            for p in 0..n {
                per_party_truncation[p].push_back((r_shares[p], r_shifted_shares[p]));
            }
        }

        (0..n)
            .map(|p| Self {
                party_id: p as PartyId,
                mac_key_share: alpha_shares[p],
                triples: per_party_triples[p].clone(),
                input_masks: per_party_masks[p].clone(),
                random_shares: per_party_random[p].clone(),
                bits: per_party_bits[p].clone(),
                truncation_pairs: per_party_truncation[p].clone(),
            })
            .collect_vec()
    }
}

fn additive_share(secret: Fp, n: usize, rng: &mut impl RngCore) -> Vec<Fp> {
    let mut shares = Vec::with_capacity(n);
    let mut sum = Fp::zero();
    for _ in 0..n - 1 {
        let r = Fp::random(rng);
        sum = sum + r;
        shares.push(r);
    }
    shares.push(secret - sum);
    shares
}

fn authenticated_share(secret: Fp, alpha: Fp, n: usize, rng: &mut impl RngCore) -> Vec<AuthenticatedShare> {
    let value_shares = additive_share(secret, n, rng);
    let mac_shares = additive_share(alpha * secret, n, rng);
    value_shares
        .into_iter()
        .zip(mac_shares)
        .map(|(x, m)| AuthenticatedShare::raw(x, m))
        .collect()
}

fn sum(shares: &[Fp]) -> Fp {
    shares.iter().fold(Fp::zero(), |acc, s| acc + *s)
}

impl Preprocessing for InMemorySource {
    fn next_triple(&mut self) -> Result<TripleShare, FrescoError> {
        self.triples.pop_front().ok_or_else(|| {
            FrescoError::resource_exhausted("triples queue exhausted", 0)
        })
    }

    fn next_input_mask(&mut self, inputter: PartyId) -> Result<InputMask, FrescoError> {
        self.input_masks
            .get_mut(&inputter)
            .and_then(|q| q.pop_front())
            .ok_or_else(|| FrescoError::resource_exhausted(
                format!("input mask queue for party {inputter} exhausted"),
                0,
            ))
    }

    fn next_random_share(&mut self) -> Result<AuthenticatedShare, FrescoError> {
        self.random_shares.pop_front().ok_or_else(|| {
            FrescoError::resource_exhausted("random share queue exhausted", 0)
        })
    }

    fn next_bit(&mut self) -> Result<AuthenticatedShare, FrescoError> {
        self.bits.pop_front().ok_or_else(|| FrescoError::resource_exhausted("bit queue exhausted", 0))
    }

    fn next_truncation_pair(&mut self, _d: u32) -> Result<TruncationPairShare, FrescoError> {
        self.truncation_pairs.pop_front().ok_or_else(|| {
            FrescoError::resource_exhausted("truncation pair queue exhausted", 0)
        })
    }

    fn mac_key_share(&self) -> Fp {
        self.mac_key_share
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dealt_triples_satisfy_ab_eq_c() {
        let sources = InMemorySource::deal(3, 4, 7);
        let mut sources = sources;
        let mut a_total = Fp::zero();
        let mut b_total = Fp::zero();
        let mut c_total = Fp::zero();
        for s in sources.iter_mut() {
            let (a, b, c) = s.next_triple().unwrap();
            a_total = a_total + a.value_share();
            b_total = b_total + b.value_share();
            c_total = c_total + c.value_share();
        }
        assert_eq!(a_total * b_total, c_total);
    }

    #[test]
    fn dealt_shares_satisfy_mac_equation() {
        let mut sources = InMemorySource::deal(2, 1, 11);
        let alpha: Fp = sources.iter().map(|s| s.mac_key_share()).fold(Fp::zero(), |a, b| a + b);

        let share0 = sources[0].next_random_share().unwrap();
        let share1 = sources[1].next_random_share().unwrap();

        let x = share0.value_share() + share1.value_share();
        let m = share0.mac_share() + share1.mac_share();
        assert_eq!(m, alpha * x);
    }

    #[test]
    fn queue_exhaustion_reports_resource_error() {
        let mut sources = InMemorySource::deal(2, 0, 3);
        let err = sources[0].next_triple().unwrap_err();
        assert!(matches!(err, FrescoError::ResourceExhausted { .. }));
    }

    #[test]
    fn only_the_inputter_learns_the_clear_mask_and_shares_still_sum_to_it() {
        let mut sources = InMemorySource::deal(3, 2, 21);
        for inputter in 0..3u64 {
            let masks: Vec<InputMask> = sources.iter_mut().map(|s| s.next_input_mask(inputter).unwrap()).collect();

            for (p, mask) in masks.iter().enumerate() {
                if p as u64 == inputter {
                    assert!(mask.clear.is_some());
                } else {
                    assert!(mask.clear.is_none());
                }
            }

            let r: Fp = masks[inputter as usize].clear.unwrap();
            let reconstructed = masks.iter().fold(Fp::zero(), |acc, m| acc + m.share.value_share());
            assert_eq!(reconstructed, r);
        }
    }
}
