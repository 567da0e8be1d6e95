//! The computation builder: a hierarchical scope tree of deferred results
//! (spec.md §3, §4.1)
//!
//! Building a program never touches the network. `Builder::seq` and
//! `Builder::par` open a new scope, eagerly run the closure given to them
//! (FRESCO's numeric operations are pure dataflow -- a program never needs
//! to branch on a secret value while it is being constructed), and record
//! the scope's position in its parent. Every leaf operation (`known`,
//! `input`, `open`, `random`, `multiply`, and the local gates registered by
//! `crate::spdz`) allocates a [`ResultId`][crate::builder::result::ResultId]
//! and attaches it to whichever scope is open at the time.
//!
//! The scope tree itself carries the crate's ordering guarantee (spec.md
//! §4.1): inside a [`ScopeKind::Sequential`] scope, child `k+1` only becomes
//! eligible for evaluation once child `k` is fully resolved; inside a
//! [`ScopeKind::Parallel`] scope every child is eligible as soon as the
//! scope itself is. `crate::evaluator::Evaluator` walks this tree every
//! sweep via [`Builder::frontier`] to discover what is currently eligible,
//! and is the only thing that calls `advance`/`finish` on a protocol.
//!
//! This generalizes the teacher's `FabricInner`/executor split: instead of
//! a `crossbeam` job queue draining `Operation`s with an `inflight_args`
//! counter (`examples/renegade-fi-mpc-stark/src/fabric/executor.rs`), a
//! single-threaded cooperative fabric can recompute eligibility directly
//! from the tree on each sweep, which is cheap at the scale this engine
//! targets (spec.md §6) and keeps the whole graph inspectable from one
//! `RefCell`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::builder::result::{FromResultValue, ResultHandle, ResultId, ResultValue};
use crate::error::FrescoError;
use crate::field::Fp;
use crate::preprocessing::Preprocessing;
use crate::protocol::{
    InputProtocol, MultiplyProtocol, NativeProtocol, OpenProtocol, ProtocolStatus, RandomElementProtocol,
    ResolvedValues,
};
use crate::share::{AuthenticatedShare, OpenedValue};
use crate::PartyId;

pub mod result;

/// Identifies a scope in the builder's tree
pub type ScopeId = u64;

/// Whether a scope's children become eligible for evaluation one at a time,
/// in order, or all together (spec.md §4.1)
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ScopeKind {
    /// Child `k+1` is only eligible once child `k` is fully resolved
    Sequential,
    /// Every child is eligible as soon as the scope itself is
    Parallel,
}

/// One child of a scope: either a single leaf result or a nested sub-scope
#[derive(Copy, Clone, Debug)]
enum Child {
    Leaf(ResultId),
    Sub(ScopeId),
}

#[derive(Debug)]
struct ScopeNode {
    kind: ScopeKind,
    children: Vec<Child>,
}

struct FabricInner {
    party_id: PartyId,
    peers: Vec<PartyId>,
    preprocessing: Box<dyn Preprocessing>,
    next_result_id: ResultId,
    next_scope_id: ScopeId,
    // the graph's hot lookup tables: keyed by a densely-allocated integer
    // id with no adversarial input, so the teacher's `FxHashMap` (a faster,
    // non-DoS-resistant hasher) is a better fit than the stdlib default
    values: FxHashMap<ResultId, ResultValue>,
    protocols: FxHashMap<ResultId, Box<dyn NativeProtocol>>,
    scopes: FxHashMap<ScopeId, ScopeNode>,
    scope_stack: Vec<ScopeId>,
    root: ScopeId,
}

/// A read-only view over already-resolved results, handed to a protocol's
/// `outbound`/`advance` without exposing the rest of the builder's state
struct ResolvedView<'a>(&'a FxHashMap<ResultId, ResultValue>);

impl<'a> ResolvedValues for ResolvedView<'a> {
    fn get(&self, id: ResultId) -> Option<&ResultValue> {
        self.0.get(&id)
    }
}

/// A cheaply-cloneable handle onto a party's computation graph
///
/// The crate's `MpcFabric` equivalent: every numeric operation takes a
/// `&Builder` and returns a typed [`ResultHandle`]. Cloning a `Builder`
/// shares the same underlying graph (an `Rc<RefCell<_>>`, mirroring the
/// teacher's `Rc`-based single-threaded fabric handle), so closures passed
/// to `seq`/`par` can freely capture and clone it.
#[derive(Clone)]
pub struct Builder {
    inner: Rc<RefCell<FabricInner>>,
}

impl Builder {
    /// Construct a new builder for `party_id`, with `peers` the ids of
    /// every other party in the session
    pub fn new(party_id: PartyId, peers: Vec<PartyId>, preprocessing: Box<dyn Preprocessing>) -> Self {
        let root: ScopeId = 0;
        let mut scopes = FxHashMap::default();
        scopes.insert(root, ScopeNode { kind: ScopeKind::Sequential, children: Vec::new() });

        Self {
            inner: Rc::new(RefCell::new(FabricInner {
                party_id,
                peers,
                preprocessing,
                next_result_id: 0,
                next_scope_id: root + 1,
                values: FxHashMap::default(),
                protocols: FxHashMap::default(),
                scopes,
                scope_stack: vec![root],
                root,
            })),
        }
    }

    /// This party's id
    pub fn party_id(&self) -> PartyId {
        self.inner.borrow().party_id
    }

    /// The ids of every other party in the session
    pub fn peers(&self) -> Vec<PartyId> {
        self.inner.borrow().peers.clone()
    }

    fn alloc_result_id(&self) -> ResultId {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_result_id;
        inner.next_result_id += 1;
        id
    }

    fn attach_leaf(&self, id: ResultId) {
        let mut inner = self.inner.borrow_mut();
        let scope = *inner.scope_stack.last().expect("the root scope is never popped");
        inner.scopes.get_mut(&scope).expect("scope ids are never removed").children.push(Child::Leaf(id));
    }

    /// Register a native protocol as the next leaf of the currently open
    /// scope, returning a typed handle to its eventual output
    pub fn register<T>(&self, protocol: impl NativeProtocol + 'static) -> ResultHandle<T> {
        let id = self.alloc_result_id();
        self.attach_leaf(id);
        self.inner.borrow_mut().protocols.insert(id, Box::new(protocol));
        ResultHandle::new(id)
    }

    /// Register an already-known value with no protocol to run, resolving
    /// it immediately (used for public constants, spec.md §4.3 "Known")
    fn known_value<T>(&self, value: ResultValue) -> ResultHandle<T> {
        let id = self.alloc_result_id();
        self.attach_leaf(id);
        self.inner.borrow_mut().values.insert(id, value);
        ResultHandle::new(id)
    }

    /// Lift a public constant into the graph; resolves immediately, no
    /// rounds (spec.md §4.3, §4.4)
    pub fn known(&self, value: Fp) -> ResultHandle<Fp> {
        self.known_value(ResultValue::Field(value))
    }

    /// `inputter` contributes `value` (`Some` only at `inputter`) as a fresh
    /// authenticated share (spec.md §4.3 "Input")
    pub fn input(&self, inputter: PartyId, value: Option<Fp>) -> Result<ResultHandle<AuthenticatedShare>, FrescoError> {
        let party_id = self.party_id();
        let protocol = self.with_preprocessing(|prep| InputProtocol::new(inputter, party_id, value, prep))?;
        Ok(self.register(protocol))
    }

    /// Open `x` to every party, yielding the clear value alongside its MAC
    /// share, still pending a batched MAC-check (spec.md §4.3 "Open", §4.4)
    pub fn open(&self, x: ResultHandle<AuthenticatedShare>) -> ResultHandle<OpenedValue> {
        self.register(OpenProtocol::new(x.id()))
    }

    /// Draw a fresh authenticated share of a uniformly random field element,
    /// known to no single party (spec.md §4.3 "RandomElement")
    pub fn random(&self) -> Result<ResultHandle<AuthenticatedShare>, FrescoError> {
        let protocol = self.with_preprocessing(RandomElementProtocol::new)?;
        Ok(self.register(protocol))
    }

    /// Multiply two authenticated shares via a Beaver triple (spec.md §4.3
    /// "Multiply")
    pub fn multiply(
        &self,
        x: ResultHandle<AuthenticatedShare>,
        y: ResultHandle<AuthenticatedShare>,
    ) -> Result<ResultHandle<AuthenticatedShare>, FrescoError> {
        let party_id = self.party_id();
        let protocol = self.with_preprocessing(|prep| MultiplyProtocol::new(x.id(), y.id(), party_id, prep))?;
        Ok(self.register(protocol))
    }

    /// Run `f` with mutable access to the preprocessing source, used by
    /// operations that must dequeue correlated randomness as part of
    /// constructing their protocol
    pub(crate) fn with_preprocessing<R>(&self, f: impl FnOnce(&mut dyn Preprocessing) -> R) -> R {
        let mut inner = self.inner.borrow_mut();
        f(inner.preprocessing.as_mut())
    }

    /// Open a sequential scope, eagerly run `f` inside it, then return to
    /// the enclosing scope
    pub fn seq<R>(&self, f: impl FnOnce(&Builder) -> R) -> R {
        self.push_scope(ScopeKind::Sequential, f)
    }

    /// Open a parallel scope, eagerly run `f` inside it, then return to the
    /// enclosing scope
    pub fn par<R>(&self, f: impl FnOnce(&Builder) -> R) -> R {
        self.push_scope(ScopeKind::Parallel, f)
    }

    fn push_scope<R>(&self, kind: ScopeKind, f: impl FnOnce(&Builder) -> R) -> R {
        let scope_id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_scope_id;
            inner.next_scope_id += 1;
            inner.scopes.insert(id, ScopeNode { kind, children: Vec::new() });
            let parent = *inner.scope_stack.last().expect("the root scope is never popped");
            inner.scopes.get_mut(&parent).expect("scope ids are never removed").children.push(Child::Sub(id));
            inner.scope_stack.push(id);
            id
        };

        let result = f(self);

        let mut inner = self.inner.borrow_mut();
        let popped = inner.scope_stack.pop();
        debug_assert_eq!(popped, Some(scope_id), "seq/par scopes must nest; never leak across closures");
        result
    }

    /// Read out a resolved result, converting it to `T`
    ///
    /// # Errors
    /// Returns `ProgrammerError` if the result has not yet been resolved by
    /// the evaluator, or resolved to a different type than `T`.
    pub fn extract<T: FromResultValue>(&self, handle: ResultHandle<T>) -> Result<T, FrescoError> {
        let value = self
            .inner
            .borrow()
            .values
            .get(&handle.id())
            .cloned()
            .ok_or_else(|| FrescoError::programmer("read of a DRes the evaluator has not resolved yet"))?;
        T::from_result_value(value)
    }

    /// Whether `id` already has a resolved value
    pub(crate) fn is_resolved(&self, id: ResultId) -> bool {
        self.inner.borrow().values.contains_key(&id)
    }

    /// The dependency ids a still-pending protocol declared, if `id` is
    /// still pending
    pub(crate) fn protocol_args(&self, id: ResultId) -> Option<Vec<ResultId>> {
        self.inner.borrow().protocols.get(&id).map(|p| p.args().to_vec())
    }

    /// The bytes a still-pending protocol would send each peer this round
    pub(crate) fn protocol_outbound(&self, id: ResultId, peers: &[PartyId]) -> HashMap<PartyId, Vec<u8>> {
        let inner = self.inner.borrow();
        match inner.protocols.get(&id) {
            Some(protocol) => protocol.outbound(&ResolvedView(&inner.values), peers),
            None => HashMap::new(),
        }
    }

    /// The number of bytes a still-pending protocol expects from `peer`
    /// this round
    pub(crate) fn protocol_recv_len(&self, id: ResultId, peer: PartyId) -> usize {
        self.inner.borrow().protocols.get(&id).map(|p| p.recv_len(peer)).unwrap_or(0)
    }

    /// Step a pending protocol forward one round, resolving it and removing
    /// it from the pending table if this was its last round
    ///
    /// Returns any values the protocol opened in clear along the way to its
    /// real output (`NativeProtocol::opened_values`, e.g. `MultiplyProtocol`'s
    /// Beaver `ε`/`δ`) alongside the round's status, so the evaluator can
    /// fold them into the session's mac-check store the same as a plain
    /// `Open`.
    pub(crate) fn step_protocol(
        &self,
        id: ResultId,
        inbound: HashMap<PartyId, Vec<u8>>,
    ) -> Result<(ProtocolStatus, Vec<OpenedValue>), FrescoError> {
        let mut inner = self.inner.borrow_mut();
        let FabricInner { protocols, values, .. } = &mut *inner;

        let status = {
            let protocol = protocols.get_mut(&id).expect("step_protocol called on an unknown or resolved id");
            protocol.advance(&ResolvedView(values), inbound)?
        };

        let mut opened = Vec::new();
        if status == ProtocolStatus::Done {
            let protocol = protocols.remove(&id).expect("just advanced it above");
            opened = protocol.opened_values();
            let value = protocol.finish()?;
            values.insert(id, value);
        }
        Ok((status, opened))
    }

    /// The leaf result ids currently eligible for evaluation given scope
    /// ordering alone (spec.md §4.1); a protocol-level dependency that
    /// hasn't resolved yet still blocks collection even if its id appears
    /// here, which `crate::evaluator::Evaluator` checks separately via
    /// [`Builder::protocol_args`]
    pub(crate) fn frontier(&self) -> Vec<ResultId> {
        let inner = self.inner.borrow();
        Self::frontier_of(&inner.scopes, &inner.values, inner.root)
    }

    fn frontier_of(
        scopes: &FxHashMap<ScopeId, ScopeNode>,
        values: &FxHashMap<ResultId, ResultValue>,
        scope_id: ScopeId,
    ) -> Vec<ResultId> {
        let scope = scopes.get(&scope_id).expect("scope ids are never removed");
        match scope.kind {
            ScopeKind::Sequential => {
                for child in &scope.children {
                    if !Self::child_done(scopes, values, child) {
                        return Self::expand_child(scopes, values, child);
                    }
                }
                Vec::new()
            }
            ScopeKind::Parallel => scope
                .children
                .iter()
                .filter(|c| !Self::child_done(scopes, values, c))
                .flat_map(|c| Self::expand_child(scopes, values, c))
                .collect(),
        }
    }

    fn child_done(scopes: &FxHashMap<ScopeId, ScopeNode>, values: &FxHashMap<ResultId, ResultValue>, child: &Child) -> bool {
        match child {
            Child::Leaf(id) => values.contains_key(id),
            Child::Sub(scope_id) => {
                let scope = scopes.get(scope_id).expect("scope ids are never removed");
                scope.children.iter().all(|c| Self::child_done(scopes, values, c))
            }
        }
    }

    fn expand_child(
        scopes: &FxHashMap<ScopeId, ScopeNode>,
        values: &FxHashMap<ResultId, ResultValue>,
        child: &Child,
    ) -> Vec<ResultId> {
        match child {
            Child::Leaf(id) => vec![*id],
            Child::Sub(scope_id) => Self::frontier_of(scopes, values, *scope_id),
        }
    }

    /// Whether every leaf in the graph has been resolved
    pub(crate) fn is_fully_resolved(&self) -> bool {
        let inner = self.inner.borrow();
        inner.protocols.is_empty()
    }

    /// If `id` resolved to an opened value, hand it back so the evaluator
    /// can append it to the session's [`crate::mac_check::OpenedValueStore`]
    /// (spec.md §4.4: every `Open` is provisional until the next MAC-check)
    pub(crate) fn take_opened(&self, id: ResultId) -> Option<OpenedValue> {
        match self.inner.borrow().values.get(&id) {
            Some(ResultValue::Opened(opened)) => Some(*opened),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use crate::preprocessing::DummySource;

    fn test_builder() -> Builder {
        Builder::new(0, vec![1], Box::new(DummySource::new(0)))
    }

    #[test]
    fn known_resolves_immediately() {
        let builder = test_builder();
        let handle = builder.known(Fp::from_u64(5));
        assert!(builder.is_resolved(handle.id()));
        assert_eq!(builder.extract(handle).unwrap(), Fp::from_u64(5));
    }

    #[test]
    fn seq_nests_children_under_their_scope() {
        let builder = test_builder();
        let (a, b) = builder.seq(|b| {
            let a = b.known(Fp::from_u64(1));
            let b2 = b.known(Fp::from_u64(2));
            (a, b2)
        });
        assert!(builder.is_resolved(a.id()));
        assert!(builder.is_resolved(b.id()));
        // both already resolved, so the graph reports no remaining frontier
        assert!(builder.frontier().is_empty());
    }

    #[test]
    fn sequential_scope_only_surfaces_the_first_unresolved_child() {
        let builder = test_builder();
        let random_proto = builder.with_preprocessing(RandomElementProtocol::new).unwrap();
        let first = builder.register::<AuthenticatedShare>(random_proto);
        let random_proto2 = builder.with_preprocessing(RandomElementProtocol::new).unwrap();
        let _second = builder.register::<AuthenticatedShare>(random_proto2);

        let frontier = builder.frontier();
        assert_eq!(frontier, vec![first.id()]);
    }
}
