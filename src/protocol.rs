//! Native protocol state machines (spec.md §4.3)
//!
//! A [`NativeProtocol`] is a leaf of the computation graph: a round-numbered
//! state machine with a fixed per-peer byte contract at every round. The
//! evaluator (`crate::evaluator`) never inspects a protocol's internals; it
//! only calls [`NativeProtocol::outbound`] (the dry-run byte probe doubling
//! as the actual payload, since recomputing it is cheap and deterministic),
//! [`NativeProtocol::recv_len`] (to size and validate the inbound slice) and
//! [`NativeProtocol::advance`] (to step the round), then
//! [`NativeProtocol::finish`] once `advance` reports [`ProtocolStatus::Done`].
//!
//! Every concrete protocol here is grounded in `kc1212-ezmpc`'s `VM::do_input`
//! / Beaver-triple multiply / `do_mac_check` reference algorithms, and in the
//! teacher's `AuthenticatedStarkPointResult` commit-then-open pattern for
//! broadcast validation, generalized from a thread-and-channel virtual
//! machine to dependency-id-addressed graph nodes the round-based evaluator
//! drives directly.

use std::collections::HashMap;

use crate::builder::result::{ResultId, ResultValue};
use crate::error::FrescoError;
use crate::field::{Field, Fp};
use crate::network::PeerBuffer;
use crate::preprocessing::Preprocessing;
use crate::share::{AuthenticatedShare, OpenedValue};
use crate::PartyId;

/// The outcome of stepping a [`NativeProtocol`] by one round
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProtocolStatus {
    /// The protocol must be stepped again next batch
    HasMoreRounds,
    /// The protocol is finished; its output is ready to be read with
    /// [`NativeProtocol::finish`]
    Done,
}

/// A read-only view the evaluator gives native protocols of already-resolved
/// dependency values, so a protocol never needs to borrow the whole graph
pub trait ResolvedValues {
    /// Look up an already-resolved dependency by id
    fn get(&self, id: ResultId) -> Option<&ResultValue>;
}

/// A leaf of the computation graph: a multi-round state machine with inputs,
/// outputs, and at each round a fixed per-peer byte contract (spec.md §4.3)
pub trait NativeProtocol: Send {
    /// The ids of other results this protocol reads before its first round
    /// can run; the evaluator only collects this protocol once every id here
    /// has a resolved value (spec.md §4.2 step 1)
    fn args(&self) -> &[ResultId];

    /// The bytes this protocol sends to each peer in `peers` this round,
    /// given the now-resolved values of `args()`
    ///
    /// An empty map marks the protocol as a "local gate" for this round: the
    /// evaluator resolves it without a network round-trip (spec.md §4.4's
    /// free linear operations).
    fn outbound(&self, resolved: &dyn ResolvedValues, peers: &[PartyId]) -> HashMap<PartyId, Vec<u8>>;

    /// The number of bytes expected from `peer` this round; must match what
    /// that peer's `outbound` sends symmetrically, or the batch is malformed
    fn recv_len(&self, peer: PartyId) -> usize;

    /// Step the protocol forward one round given what every peer sent this
    /// round (empty for a local gate)
    fn advance(
        &mut self,
        resolved: &dyn ResolvedValues,
        inbound: PeerBuffer,
    ) -> Result<ProtocolStatus, FrescoError>;

    /// Consume the protocol and produce its resolved output, only ever
    /// called once `advance` has returned [`ProtocolStatus::Done`]
    fn finish(self: Box<Self>) -> Result<ResultValue, FrescoError>;

    /// Any values this protocol reconstructed in clear along the way to its
    /// real output, still owed a mac-check
    ///
    /// Most protocols never open anything beyond what `finish` itself
    /// returns (already forwarded to the opened-value store when it
    /// resolves to [`ResultValue::Opened`]) and keep the default empty
    /// implementation. [`MultiplyProtocol`] is the exception: its Beaver
    /// `ε`/`δ` are reconstructed in clear every round but never surface as a
    /// graph result, so without this they would never reach a mac-check --
    /// a party that lies about its own `ε`/`δ` share skews the product by a
    /// known amount without the final mac-check ever noticing, since the
    /// lie is baked symmetrically into both the opened value and its mac
    /// share. Called once `advance` has returned [`ProtocolStatus::Done`],
    /// before `finish` consumes the protocol.
    fn opened_values(&self) -> Vec<OpenedValue> {
        Vec::new()
    }
}

/// Broadcast `payload` identically to every peer in `peers`
fn broadcast_to(peers: &[PartyId], payload: Vec<u8>) -> HashMap<PartyId, Vec<u8>> {
    peers.iter().map(|p| (*p, payload.clone())).collect()
}

/// Sum a field element across every peer's contribution plus our own
fn sum_field_contributions(own: Fp, inbound: &PeerBuffer) -> Result<Fp, FrescoError> {
    let mut total = own;
    for bytes in inbound.values() {
        if bytes.len() != Fp::BYTE_LEN {
            return Err(FrescoError::malicious("wrong byte length in field broadcast", 0));
        }
        total = total + Fp::from_bytes(bytes);
    }
    Ok(total)
}

fn expect_share(resolved: &dyn ResolvedValues, id: ResultId) -> AuthenticatedShare {
    match resolved.get(id) {
        Some(ResultValue::Share(s)) => *s,
        other => panic!("expected a resolved Share dependency, got {other:?}"),
    }
}

fn hash_of(value: Fp) -> [u8; 32] {
    use digest::Digest;
    use sha3::Sha3_256;
    let mut hasher = Sha3_256::new();
    hasher.update(value.to_bytes());
    hasher.finalize().into()
}

// -------------------
// | Random element   |
// -------------------

/// Dequeues a pre-generated random share; zero rounds (spec.md §4.3)
pub struct RandomElementProtocol {
    share: AuthenticatedShare,
}

impl RandomElementProtocol {
    /// Draw the next random share from `preprocessing` immediately; callers
    /// must draw in the same deterministic order at every party
    pub fn new(preprocessing: &mut dyn Preprocessing) -> Result<Self, FrescoError> {
        Ok(Self { share: preprocessing.next_random_share()? })
    }
}

impl NativeProtocol for RandomElementProtocol {
    fn args(&self) -> &[ResultId] {
        &[]
    }

    fn outbound(&self, _resolved: &dyn ResolvedValues, _peers: &[PartyId]) -> HashMap<PartyId, Vec<u8>> {
        HashMap::new()
    }

    fn recv_len(&self, _peer: PartyId) -> usize {
        0
    }

    fn advance(
        &mut self,
        _resolved: &dyn ResolvedValues,
        _inbound: PeerBuffer,
    ) -> Result<ProtocolStatus, FrescoError> {
        Ok(ProtocolStatus::Done)
    }

    fn finish(self: Box<Self>) -> Result<ResultValue, FrescoError> {
        Ok(ResultValue::Share(self.share))
    }
}

// -----------------------------
// | Broadcast with validation  |
// -----------------------------

/// Broadcasts a field element, then exchanges a hash of what every party
/// received, aborting on disagreement (spec.md §4.3 "Broadcast-with-validation")
///
/// Guards against an equivocating sender who whispers a different value to
/// each peer: a plain broadcast alone cannot catch that, since the lie only
/// needs to be internally consistent with whatever that party later does
/// with its own copy -- this round forces every recipient's copy to match
/// before anyone acts on it.
pub struct BroadcastValidated {
    args: Vec<ResultId>,
    sender: PartyId,
    party_id: PartyId,
    /// `Some` only on `sender`: the value being broadcast
    own_value: Option<Fp>,
    round: u8,
    received_value: Option<Fp>,
}

impl BroadcastValidated {
    /// Construct a broadcast, to be sent by `sender`
    ///
    /// `own_value` must be `Some` iff `party_id == sender`.
    pub fn new(sender: PartyId, party_id: PartyId, own_value: Option<Fp>, args: Vec<ResultId>) -> Self {
        Self { args, sender, party_id, own_value, round: 0, received_value: None }
    }
}

impl NativeProtocol for BroadcastValidated {
    fn args(&self) -> &[ResultId] {
        &self.args
    }

    fn outbound(&self, _resolved: &dyn ResolvedValues, peers: &[PartyId]) -> HashMap<PartyId, Vec<u8>> {
        match self.round {
            0 if self.party_id == self.sender => {
                let value = self.own_value.expect("sender must supply its own value");
                broadcast_to(peers, value.to_bytes())
            }
            1 => {
                let value = self.received_value.expect("round 0 sets this before round 1 is collected");
                broadcast_to(peers, hash_of(value).to_vec())
            }
            _ => HashMap::new(),
        }
    }

    fn recv_len(&self, peer: PartyId) -> usize {
        match self.round {
            0 => {
                if peer == self.sender {
                    Fp::BYTE_LEN
                } else {
                    0
                }
            }
            1 => 32,
            _ => 0,
        }
    }

    fn advance(
        &mut self,
        _resolved: &dyn ResolvedValues,
        inbound: PeerBuffer,
    ) -> Result<ProtocolStatus, FrescoError> {
        match self.round {
            0 => {
                let value = if self.party_id == self.sender {
                    self.own_value.expect("sender must supply its own value")
                } else {
                    let bytes = inbound
                        .get(&self.sender)
                        .ok_or_else(|| FrescoError::transport(self.sender, "missing broadcast payload", 0))?;
                    if bytes.len() != Fp::BYTE_LEN {
                        return Err(FrescoError::malicious("wrong broadcast payload length", 0));
                    }
                    Fp::from_bytes(bytes)
                };
                self.received_value = Some(value);
                self.round = 1;
                Ok(ProtocolStatus::HasMoreRounds)
            }
            1 => {
                let my_hash = hash_of(self.received_value.expect("round 0 sets this"));
                for (peer, bytes) in &inbound {
                    if bytes.as_slice() != my_hash {
                        return Err(FrescoError::malicious(
                            format!("broadcast equivocation detected from party {peer}"),
                            0,
                        ));
                    }
                }
                self.round = 2;
                Ok(ProtocolStatus::Done)
            }
            _ => Ok(ProtocolStatus::Done),
        }
    }

    fn finish(self: Box<Self>) -> Result<ResultValue, FrescoError> {
        Ok(ResultValue::Field(self.received_value.expect("broadcast resolves by round 1")))
    }
}

// -----------
// | Input    |
// -----------

/// `p` broadcasts `v - r`, where `r` is the next input mask known in clear
/// to `p` and as a share to everyone (spec.md §4.3)
///
/// Two rounds, both delegated to [`BroadcastValidated`]: the masked-value
/// broadcast, then its hash-validation round. The resulting authenticated
/// share is `mask_share.add_public(e, party_id)`.
pub struct InputProtocol {
    party_id: PartyId,
    mask_share: AuthenticatedShare,
    broadcast: BroadcastValidated,
}

impl InputProtocol {
    /// Construct an input protocol; `value` must be `Some` iff
    /// `party_id == inputter`. Draws the next input mask for `inputter`
    /// immediately -- the mask queue is consumed in the same deterministic
    /// order at every party (spec.md §5).
    pub fn new(
        inputter: PartyId,
        party_id: PartyId,
        value: Option<Fp>,
        preprocessing: &mut dyn Preprocessing,
    ) -> Result<Self, FrescoError> {
        let mask = preprocessing.next_input_mask(inputter)?;

        let own_value = if party_id == inputter {
            let v = value.ok_or_else(|| FrescoError::programmer("input party must supply its own value"))?;
            let r = mask.clear.ok_or_else(|| {
                FrescoError::programmer("preprocessing did not reveal the input mask's clear value to its owner")
            })?;
            Some(v - r)
        } else {
            None
        };

        Ok(Self {
            party_id,
            mask_share: mask.share,
            broadcast: BroadcastValidated::new(inputter, party_id, own_value, Vec::new()),
        })
    }
}

impl NativeProtocol for InputProtocol {
    fn args(&self) -> &[ResultId] {
        self.broadcast.args()
    }

    fn outbound(&self, resolved: &dyn ResolvedValues, peers: &[PartyId]) -> HashMap<PartyId, Vec<u8>> {
        self.broadcast.outbound(resolved, peers)
    }

    fn recv_len(&self, peer: PartyId) -> usize {
        self.broadcast.recv_len(peer)
    }

    fn advance(
        &mut self,
        resolved: &dyn ResolvedValues,
        inbound: PeerBuffer,
    ) -> Result<ProtocolStatus, FrescoError> {
        self.broadcast.advance(resolved, inbound)
    }

    fn finish(self: Box<Self>) -> Result<ResultValue, FrescoError> {
        let e = match Box::new(self.broadcast).finish()? {
            ResultValue::Field(e) => e,
            other => return Err(FrescoError::programmer(format!("expected Field, got {other:?}"))),
        };
        let share = self.mask_share.add_public(e, self.party_id);
        Ok(ResultValue::Share(share))
    }
}

// ----------
// | Open    |
// ----------

/// Each party sends its share to everyone; one round (spec.md §4.3)
///
/// The reconstructed value is appended to the opened-value store by the
/// caller (spec.md §4.4); this protocol only performs the reconstruction.
pub struct OpenProtocol {
    args: Vec<ResultId>,
    x: ResultId,
    result: Option<OpenedValue>,
}

impl OpenProtocol {
    /// Construct an open of the share at result id `x`
    pub fn new(x: ResultId) -> Self {
        Self { args: vec![x], x, result: None }
    }
}

impl NativeProtocol for OpenProtocol {
    fn args(&self) -> &[ResultId] {
        &self.args
    }

    fn outbound(&self, resolved: &dyn ResolvedValues, peers: &[PartyId]) -> HashMap<PartyId, Vec<u8>> {
        let share = expect_share(resolved, self.x);
        broadcast_to(peers, share.value_share().to_bytes())
    }

    fn recv_len(&self, _peer: PartyId) -> usize {
        Fp::BYTE_LEN
    }

    fn advance(
        &mut self,
        resolved: &dyn ResolvedValues,
        inbound: PeerBuffer,
    ) -> Result<ProtocolStatus, FrescoError> {
        let share = expect_share(resolved, self.x);
        let value = sum_field_contributions(share.value_share(), &inbound)?;
        self.result = Some(OpenedValue {
            value,
            mac_share: share.mac_share(),
            public_modifier: share.public_modifier(),
        });
        Ok(ProtocolStatus::Done)
    }

    fn finish(self: Box<Self>) -> Result<ResultValue, FrescoError> {
        Ok(ResultValue::Opened(self.result.expect("advance sets this before Done")))
    }
}

// --------------
// | Multiply    |
// --------------

/// Consumes a Beaver triple `(a, b, c)` with `ab = c`: computes
/// `ε = x - a`, `δ = y - b`, opens both in one batched round, then sets
/// `z = c + ε·b + δ·a + ε·δ` (only party 0 adds `ε·δ`) (spec.md §4.3)
///
/// Grounded directly in `kc1212-ezmpc::crypto`'s triple-multiply reference
/// algorithm (`e = x - a; d = y - b; z = c + e*b + d*a`, with the `e*d` cross
/// term folded in only by the party whose `add_clear` flag is set).
pub struct MultiplyProtocol {
    args: Vec<ResultId>,
    x: ResultId,
    y: ResultId,
    party_id: PartyId,
    a: AuthenticatedShare,
    b: AuthenticatedShare,
    c: AuthenticatedShare,
    /// This party's own authenticated share of `x - a`/`y - b`, kept around
    /// so `opened_values` can report their mac shares once `ε`/`δ` are
    /// reconstructed in clear
    eps_delta_shares: Option<(AuthenticatedShare, AuthenticatedShare)>,
    opened_eps_delta: Option<(Fp, Fp)>,
}

impl MultiplyProtocol {
    /// Construct a multiply of the shares at `x` and `y`, drawing the next
    /// Beaver triple from `preprocessing` immediately (deterministic queue
    /// order across parties, spec.md §5)
    pub fn new(
        x: ResultId,
        y: ResultId,
        party_id: PartyId,
        preprocessing: &mut dyn Preprocessing,
    ) -> Result<Self, FrescoError> {
        let (a, b, c) = preprocessing.next_triple()?;
        Ok(Self { args: vec![x, y], x, y, party_id, a, b, c, eps_delta_shares: None, opened_eps_delta: None })
    }

    fn local_eps_delta_shares(&self, resolved: &dyn ResolvedValues) -> (AuthenticatedShare, AuthenticatedShare) {
        let x = expect_share(resolved, self.x);
        let y = expect_share(resolved, self.y);
        (x - self.a, y - self.b)
    }
}

impl NativeProtocol for MultiplyProtocol {
    fn args(&self) -> &[ResultId] {
        &self.args
    }

    fn outbound(&self, resolved: &dyn ResolvedValues, peers: &[PartyId]) -> HashMap<PartyId, Vec<u8>> {
        let (eps_share, delta_share) = self.local_eps_delta_shares(resolved);
        let mut payload = eps_share.value_share().to_bytes();
        payload.extend(delta_share.value_share().to_bytes());
        broadcast_to(peers, payload)
    }

    fn recv_len(&self, _peer: PartyId) -> usize {
        2 * Fp::BYTE_LEN
    }

    fn advance(
        &mut self,
        resolved: &dyn ResolvedValues,
        inbound: PeerBuffer,
    ) -> Result<ProtocolStatus, FrescoError> {
        let (eps_share, delta_share) = self.local_eps_delta_shares(resolved);
        let (mut eps, mut delta) = (eps_share.value_share(), delta_share.value_share());
        for bytes in inbound.values() {
            if bytes.len() != 2 * Fp::BYTE_LEN {
                return Err(FrescoError::malicious("wrong byte length in multiply broadcast", 0));
            }
            eps = eps + Fp::from_bytes(&bytes[..Fp::BYTE_LEN]);
            delta = delta + Fp::from_bytes(&bytes[Fp::BYTE_LEN..]);
        }

        self.eps_delta_shares = Some((eps_share, delta_share));
        self.opened_eps_delta = Some((eps, delta));
        Ok(ProtocolStatus::Done)
    }

    fn finish(self: Box<Self>) -> Result<ResultValue, FrescoError> {
        let (eps, delta) = self.opened_eps_delta.expect("advance sets this before Done");
        let z = self.c + self.b.mul_public(eps) + self.a.mul_public(delta);
        // `add_public` must run on every party, not just party 0: it always
        // records the public modifier (needed so a later mac-check can
        // subtract `eps * delta` back out, `crate::mac_check::run_mac_check`)
        // even though only party 0's value share is actually adjusted by it.
        // Skipping the call entirely on other parties (as a naive reading of
        // "only party 0 adds ε·δ" suggests) would leave their modifier at
        // zero and desynchronize it from party 0's, failing every
        // subsequent mac-check on an honest multiplication.
        Ok(ResultValue::Share(z.add_public(eps * delta, self.party_id)))
    }

    fn opened_values(&self) -> Vec<OpenedValue> {
        let (eps, delta) = self.opened_eps_delta.expect("advance sets this before Done");
        let (eps_share, delta_share) =
            self.eps_delta_shares.expect("advance sets this before Done");
        vec![
            OpenedValue { value: eps, mac_share: eps_share.mac_share(), public_modifier: eps_share.public_modifier() },
            OpenedValue {
                value: delta,
                mac_share: delta_share.mac_share(),
                public_modifier: delta_share.public_modifier(),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    struct EmptyResolved;
    impl ResolvedValues for EmptyResolved {
        fn get(&self, _id: ResultId) -> Option<&ResultValue> {
            None
        }
    }

    #[test]
    fn random_element_has_zero_rounds() {
        let mut source = crate::preprocessing::DummySource::new(0);
        let mut proto = RandomElementProtocol::new(&mut source).unwrap();
        let status = proto.advance(&EmptyResolved, Map::new()).unwrap();
        assert_eq!(status, ProtocolStatus::Done);
    }

    #[test]
    fn broadcast_validated_round_zero_is_sender_only() {
        let proto = BroadcastValidated::new(0, 0, Some(Fp::from_u64(7)), Vec::new());
        let out = proto.outbound(&EmptyResolved, &[1, 2]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[&1], Fp::from_u64(7).to_bytes());
    }
}
