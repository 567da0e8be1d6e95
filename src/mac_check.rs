//! Batched MAC-check (spec.md §4.5)
//!
//! Every value a program opens is only provisionally revealed: its clear
//! value and MAC share are appended to an [`OpenedValueStore`], and nothing
//! derived from it is safe to act on until a batched check confirms that
//! `Σ mac_share = α · Σ value` across every opened value since the last
//! check. This runs directly against the network rather than through
//! `crate::protocol::NativeProtocol`/`crate::evaluator::Evaluator`: it
//! happens at program boundaries (after a `seq`/`par` block finishes, or
//! before the program hands back a final result, spec.md §4.4) rather than
//! as a graph leaf with its own dependencies, so driving it as a plain
//! async function against `crate::network::MpcNetwork` is simpler than
//! fitting it through the round abstraction built for graph nodes.
//!
//! The joint random coefficients are derived from a coin-tossing DRBG seed
//! (commit to a local seed, exchange, reveal, XOR together) rather than a
//! single party choosing them, so no party can bias which linear
//! combination of opened values gets checked. The check itself is the
//! textbook SPDZ batched MAC-check: commit to `z_i`, exchange commitments,
//! reveal `z_i`, verify against the commitment, and accept only if
//! `Σ z_i = 0`.

use rand::{rngs::StdRng, RngCore, SeedableRng};
use digest::Digest;
use sha3::Sha3_256;

use crate::commitment::HashCommitment;
use crate::error::{FrescoError, FrescoResult};
use crate::field::{Field, Fp};
use crate::network::MpcNetwork;
use crate::share::OpenedValue;

/// The append-only buffer of values opened since the last successful
/// MAC-check
///
/// A program must drain this (via [`run_mac_check`]) before it can trust
/// anything derived from an opened value; `crate::evaluator::Evaluator`
/// pushes into it every time an `Open` protocol resolves.
#[derive(Default)]
pub struct OpenedValueStore {
    entries: Vec<OpenedValue>,
}

impl OpenedValueStore {
    /// An empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly opened value, still pending a MAC check
    pub fn push(&mut self, value: OpenedValue) {
        self.entries.push(value);
    }

    /// Whether any opened values are pending a check
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The number of opened values pending a check
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn drain(&mut self) -> Vec<OpenedValue> {
        std::mem::take(&mut self.entries)
    }
}

fn hash_seed(seed: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(seed);
    hasher.finalize().into()
}

/// Jointly sample a 32-byte seed no single party controls: commit to a
/// local seed, exchange commitments, reveal, verify, then XOR every party's
/// seed together
async fn joint_seed(network: &mut dyn MpcNetwork, batch: u64) -> FrescoResult<[u8; 32]> {
    let mut rng = rand::thread_rng();
    let mut local_seed = [0u8; 32];
    rng.fill_bytes(&mut local_seed);

    let commitments = network.exchange_with_all(hash_seed(&local_seed).to_vec()).await?;
    let seeds = network.exchange_with_all(local_seed.to_vec()).await?;

    let mut joint = local_seed;
    for (peer, seed_bytes) in &seeds {
        if seed_bytes.len() != 32 {
            return Err(FrescoError::malicious("wrong byte length in mac-check seed reveal", batch));
        }
        let mut seed = [0u8; 32];
        seed.copy_from_slice(seed_bytes);

        let commitment = commitments
            .get(peer)
            .ok_or_else(|| FrescoError::transport(*peer, "no seed commitment on file for peer", batch))?;
        if hash_seed(&seed).as_slice() != commitment.as_slice() {
            return Err(FrescoError::malicious(
                format!("party {peer} revealed a seed not matching its earlier commitment"),
                batch,
            ));
        }

        for (j, b) in joint.iter_mut().enumerate() {
            *b ^= seed[j];
        }
    }

    Ok(joint)
}

/// Run a batched MAC-check over every value opened since the last call,
/// returning an error if the check fails or the network misbehaves
///
/// Draining the store happens up front: whether this returns `Ok` or `Err`,
/// the entries it checked are gone, since a failed check aborts the session
/// anyway (spec.md §7) and nothing may be retried under the same batch.
pub async fn run_mac_check(
    network: &mut dyn MpcNetwork,
    store: &mut OpenedValueStore,
    mac_key_share: Fp,
    batch: u64,
) -> FrescoResult<()> {
    let entries = store.drain();
    if entries.is_empty() {
        return Ok(());
    }

    let seed = joint_seed(network, batch).await?;
    let mut drbg = StdRng::from_seed(seed);
    let coefficients: Vec<Fp> = (0..entries.len()).map(|_| Fp::random(&mut drbg)).collect();

    let mut value = Fp::zero();
    let mut mac = Fp::zero();
    let mut modifier = Fp::zero();
    for (entry, r) in entries.iter().zip(&coefficients) {
        value = value + *r * entry.value;
        mac = mac + *r * entry.mac_share;
        modifier = modifier + *r * entry.public_modifier;
    }

    // every party's mac_share was only ever taken over the share *before*
    // any public constant was folded in (`AuthenticatedShare::add_public`
    // never touches `mac_share`), so the check must subtract that net
    // public modifier back out before comparing against the local mac share
    let z_i = mac_key_share * (value - modifier) - mac;

    let mut rng = rand::thread_rng();
    let commitment = HashCommitment::commit(z_i, &mut rng);

    let commitments = network.exchange_with_all(commitment.commitment.to_vec()).await?;

    let mut opening = z_i.to_bytes();
    opening.extend_from_slice(&commitment.blinder);
    let openings = network.exchange_with_all(opening).await?;

    let mut sum = z_i;
    for (peer, bytes) in &openings {
        if bytes.len() != Fp::BYTE_LEN + 32 {
            return Err(FrescoError::malicious("wrong byte length in mac-check opening", batch));
        }
        let peer_z = Fp::from_bytes(&bytes[..Fp::BYTE_LEN]);
        let mut peer_blinder = [0u8; 32];
        peer_blinder.copy_from_slice(&bytes[Fp::BYTE_LEN..]);

        let peer_commitment = commitments
            .get(peer)
            .ok_or_else(|| FrescoError::transport(*peer, "no mac-check commitment on file for peer", batch))?;
        let mut commitment_bytes = [0u8; 32];
        commitment_bytes.copy_from_slice(peer_commitment);
        if !HashCommitment::<Fp>::verify_opening(&commitment_bytes, &peer_blinder, &peer_z) {
            return Err(FrescoError::malicious(
                format!("party {peer} opened a mac-check commitment to a different value"),
                batch,
            ));
        }

        sum = sum + peer_z;
    }

    if sum != Fp::zero() {
        return Err(FrescoError::malicious("mac-check failed: sum of z_i is nonzero", batch));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::InMemoryDuplexNetwork;
    use std::time::Duration;

    #[tokio::test]
    async fn honest_opened_values_pass_the_check() {
        let mut networks = InMemoryDuplexNetwork::new_n_party(2, Duration::from_secs(1));
        let alpha = Fp::from_u64(7);
        let alpha_shares = [alpha, Fp::zero()];

        let value = Fp::from_u64(9);
        let mac = alpha * value;
        let mac_shares = [mac, Fp::zero()];

        let mut stores = [OpenedValueStore::new(), OpenedValueStore::new()];
        for i in 0..2 {
            stores[i].push(OpenedValue { value, mac_share: mac_shares[i], public_modifier: Fp::zero() });
        }

        let mut net1 = networks.remove(0);
        let mut net0 = networks.remove(0);
        let alpha0 = alpha_shares[0];
        let alpha1 = alpha_shares[1];
        let mut store0 = std::mem::take(&mut stores[0]);
        let mut store1 = std::mem::take(&mut stores[1]);

        let (r0, r1) = tokio::join!(
            run_mac_check(&mut net0, &mut store0, alpha0, 0),
            run_mac_check(&mut net1, &mut store1, alpha1, 0),
        );
        r0.unwrap();
        r1.unwrap();
    }

    #[tokio::test]
    async fn tampered_mac_share_fails_the_check() {
        let mut networks = InMemoryDuplexNetwork::new_n_party(2, Duration::from_secs(1));
        let alpha = Fp::from_u64(7);
        let value = Fp::from_u64(9);
        let mac = alpha * value;

        let mut store0 = OpenedValueStore::new();
        store0.push(OpenedValue { value, mac_share: mac, public_modifier: Fp::zero() });
        let mut store1 = OpenedValueStore::new();
        // party 1 lies about its mac share
        store1.push(OpenedValue { value, mac_share: Fp::from_u64(1), public_modifier: Fp::zero() });

        let mut net1 = networks.remove(0);
        let mut net0 = networks.remove(0);

        let (r0, r1) = tokio::join!(
            run_mac_check(&mut net0, &mut store0, alpha, 0),
            run_mac_check(&mut net1, &mut store1, Fp::zero(), 0),
        );
        assert!(r0.is_err());
        assert!(r1.is_err());
    }
}
