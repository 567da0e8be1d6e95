//! SPDZ online-phase linear operations (spec.md §4.3, §4.4)
//!
//! Addition, subtraction, and scaling by a public constant never touch the
//! network: every party applies the operation to its own share (and, for
//! public constants, only the party designated by `share::AuthenticatedShare`'s
//! `public_modifier` convention updates its value share). These are modeled
//! as zero-round [`NativeProtocol`]s -- `outbound` always returns an empty
//! map -- purely so they flow through the same dependency-graph machinery as
//! every other operation rather than needing a special case in the
//! evaluator (spec.md §4.4's "free" linear operations still resolve in the
//! same cascading local-gate pass described there).

use std::collections::HashMap;

use crate::builder::result::{ResultId, ResultValue};
use crate::error::FrescoError;
use crate::field::Fp;
use crate::network::PeerBuffer;
use crate::protocol::{NativeProtocol, ProtocolStatus, ResolvedValues};
use crate::share::AuthenticatedShare;
use crate::PartyId;

fn expect_share(resolved: &dyn ResolvedValues, id: ResultId) -> AuthenticatedShare {
    match resolved.get(id) {
        Some(ResultValue::Share(s)) => *s,
        other => panic!("expected a resolved Share dependency, got {other:?}"),
    }
}

fn expect_field(resolved: &dyn ResolvedValues, id: ResultId) -> Fp {
    match resolved.get(id) {
        Some(ResultValue::Field(f)) => *f,
        other => panic!("expected a resolved Field dependency, got {other:?}"),
    }
}

/// `x + y`, zero rounds (spec.md §4.3 "Add")
pub struct AddProtocol {
    args: Vec<ResultId>,
    x: ResultId,
    y: ResultId,
    result: Option<AuthenticatedShare>,
}

impl AddProtocol {
    /// Construct an addition of the shares at `x` and `y`
    pub fn new(x: ResultId, y: ResultId) -> Self {
        Self { args: vec![x, y], x, y, result: None }
    }
}

impl NativeProtocol for AddProtocol {
    fn args(&self) -> &[ResultId] {
        &self.args
    }

    fn outbound(&self, _resolved: &dyn ResolvedValues, _peers: &[PartyId]) -> HashMap<PartyId, Vec<u8>> {
        HashMap::new()
    }

    fn recv_len(&self, _peer: PartyId) -> usize {
        0
    }

    fn advance(&mut self, resolved: &dyn ResolvedValues, _inbound: PeerBuffer) -> Result<ProtocolStatus, FrescoError> {
        let x = expect_share(resolved, self.x);
        let y = expect_share(resolved, self.y);
        self.result = Some(x + y);
        Ok(ProtocolStatus::Done)
    }

    fn finish(self: Box<Self>) -> Result<ResultValue, FrescoError> {
        Ok(ResultValue::Share(self.result.expect("advance sets this before Done")))
    }
}

/// `x - y`, zero rounds (spec.md §4.3 "Sub")
pub struct SubProtocol {
    args: Vec<ResultId>,
    x: ResultId,
    y: ResultId,
    result: Option<AuthenticatedShare>,
}

impl SubProtocol {
    /// Construct a subtraction of the share at `y` from the share at `x`
    pub fn new(x: ResultId, y: ResultId) -> Self {
        Self { args: vec![x, y], x, y, result: None }
    }
}

impl NativeProtocol for SubProtocol {
    fn args(&self) -> &[ResultId] {
        &self.args
    }

    fn outbound(&self, _resolved: &dyn ResolvedValues, _peers: &[PartyId]) -> HashMap<PartyId, Vec<u8>> {
        HashMap::new()
    }

    fn recv_len(&self, _peer: PartyId) -> usize {
        0
    }

    fn advance(&mut self, resolved: &dyn ResolvedValues, _inbound: PeerBuffer) -> Result<ProtocolStatus, FrescoError> {
        let x = expect_share(resolved, self.x);
        let y = expect_share(resolved, self.y);
        self.result = Some(x - y);
        Ok(ProtocolStatus::Done)
    }

    fn finish(self: Box<Self>) -> Result<ResultValue, FrescoError> {
        Ok(ResultValue::Share(self.result.expect("advance sets this before Done")))
    }
}

/// `x * c` for a public constant `c`, zero rounds (spec.md §4.3 "MulPublic")
pub struct MulPublicProtocol {
    args: Vec<ResultId>,
    x: ResultId,
    constant: Fp,
    result: Option<AuthenticatedShare>,
}

impl MulPublicProtocol {
    /// Construct a scaling of the share at `x` by `constant`
    pub fn new(x: ResultId, constant: Fp) -> Self {
        Self { args: vec![x], x, constant, result: None }
    }
}

impl NativeProtocol for MulPublicProtocol {
    fn args(&self) -> &[ResultId] {
        &self.args
    }

    fn outbound(&self, _resolved: &dyn ResolvedValues, _peers: &[PartyId]) -> HashMap<PartyId, Vec<u8>> {
        HashMap::new()
    }

    fn recv_len(&self, _peer: PartyId) -> usize {
        0
    }

    fn advance(&mut self, resolved: &dyn ResolvedValues, _inbound: PeerBuffer) -> Result<ProtocolStatus, FrescoError> {
        let x = expect_share(resolved, self.x);
        self.result = Some(x.mul_public(self.constant));
        Ok(ProtocolStatus::Done)
    }

    fn finish(self: Box<Self>) -> Result<ResultValue, FrescoError> {
        Ok(ResultValue::Share(self.result.expect("advance sets this before Done")))
    }
}

/// `x + c` or `x - c` for a public constant `c`, zero rounds (spec.md §4.3
/// "AddPublic"/"SubPublic")
///
/// Takes `c` as a `ResultId` rather than a bare `Fp` so a public constant
/// produced by another part of the graph (e.g. the output of an `Open`) can
/// feed directly into it without the caller needing to pre-extract it.
pub struct AddPublicProtocol {
    args: Vec<ResultId>,
    x: ResultId,
    constant: ResultId,
    party_id: PartyId,
    negate: bool,
    result: Option<AuthenticatedShare>,
}

impl AddPublicProtocol {
    /// Construct `x + constant` (or `x - constant` if `negate`)
    pub fn new(x: ResultId, constant: ResultId, party_id: PartyId, negate: bool) -> Self {
        Self { args: vec![x, constant], x, constant, party_id, negate, result: None }
    }
}

impl NativeProtocol for AddPublicProtocol {
    fn args(&self) -> &[ResultId] {
        &self.args
    }

    fn outbound(&self, _resolved: &dyn ResolvedValues, _peers: &[PartyId]) -> HashMap<PartyId, Vec<u8>> {
        HashMap::new()
    }

    fn recv_len(&self, _peer: PartyId) -> usize {
        0
    }

    fn advance(&mut self, resolved: &dyn ResolvedValues, _inbound: PeerBuffer) -> Result<ProtocolStatus, FrescoError> {
        let x = expect_share(resolved, self.x);
        let c = expect_field(resolved, self.constant);
        let c = if self.negate { -c } else { c };
        self.result = Some(x.add_public(c, self.party_id));
        Ok(ProtocolStatus::Done)
    }

    fn finish(self: Box<Self>) -> Result<ResultValue, FrescoError> {
        Ok(ResultValue::Share(self.result.expect("advance sets this before Done")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use std::collections::HashMap as Map;

    struct Fixture(HashMap<ResultId, ResultValue>);
    impl ResolvedValues for Fixture {
        fn get(&self, id: ResultId) -> Option<&ResultValue> {
            self.0.get(&id)
        }
    }

    #[test]
    fn add_sums_shares_locally() {
        let resolved = Fixture(HashMap::from([
            (0, ResultValue::Share(AuthenticatedShare::raw(Fp::from_u64(3), Fp::from_u64(30)))),
            (1, ResultValue::Share(AuthenticatedShare::raw(Fp::from_u64(4), Fp::from_u64(40)))),
        ]));
        let mut proto = AddProtocol::new(0, 1);
        proto.advance(&resolved, Map::new()).unwrap();
        let ResultValue::Share(sum) = Box::new(proto).finish().unwrap() else { panic!() };
        assert_eq!(sum.value_share(), Fp::from_u64(7));
    }

    #[test]
    fn mul_public_scales_both_value_and_mac() {
        let resolved = Fixture(HashMap::from([(
            0,
            ResultValue::Share(AuthenticatedShare::raw(Fp::from_u64(3), Fp::from_u64(30))),
        )]));
        let mut proto = MulPublicProtocol::new(0, Fp::from_u64(5));
        proto.advance(&resolved, Map::new()).unwrap();
        let ResultValue::Share(scaled) = Box::new(proto).finish().unwrap() else { panic!() };
        assert_eq!(scaled.value_share(), Fp::from_u64(15));
        assert_eq!(scaled.mac_share(), Fp::from_u64(150));
    }
}
