//! Deferred-result bookkeeping for the computation builder
//!
//! A [`ResultHandle`] (the crate's `DRes<T>`) is a typed reference into the
//! builder's dependency graph rather than a value: reading it before the
//! evaluator has resolved the underlying operation is a programmer error
//! (spec.md §3). Unlike the teacher's `ResultHandle`, which implements
//! `Future` so callers on other threads can poll/wake across the fabric's
//! background executor thread, this crate's evaluator drives the whole
//! graph from a single cooperative loop (spec.md §5), so there is no
//! cross-thread waking to do -- `ResultHandle` is a plain `Copy` handle and
//! the builder looks up its value directly once evaluation reaches it.

use std::marker::PhantomData;

use crate::error::FrescoError;
use crate::field::Fp;
use crate::share::{AuthenticatedShare, OpenedValue};

/// Identifies a single result (and the operation that produces it) in a
/// builder's dependency graph
pub type ResultId = u64;

/// The resolved payload of an operation
///
/// Covers every type that flows through the graph: raw field elements
/// (public constants, opened outputs), authenticated shares (the bulk of
/// online-phase traffic), opened values awaiting a MAC check, and the batch
/// forms of each, mirroring the teacher's per-type `ResultValue` variants
/// (`Scalar`/`ScalarBatch`/`Point`/`PointBatch`) generalized to this crate's
/// field-and-share domain.
#[derive(Clone, Debug)]
pub enum ResultValue {
    /// A public field element
    Field(Fp),
    /// A batch of public field elements
    FieldBatch(Vec<Fp>),
    /// An authenticated share
    Share(AuthenticatedShare),
    /// A batch of authenticated shares
    ShareBatch(Vec<AuthenticatedShare>),
    /// An opened value, still pending a MAC check
    Opened(OpenedValue),
    /// A batch of opened values
    OpenedBatch(Vec<OpenedValue>),
    /// An opaque byte payload (used internally by native protocols)
    Bytes(Vec<u8>),
    /// No payload -- used for operations run only for their side effect
    Unit,
}

/// One completed operation's id and value, as inserted into the builder's
/// result table by the evaluator
#[derive(Clone, Debug)]
pub struct OpResult {
    /// The id of the result this completes
    pub id: ResultId,
    /// The resolved value
    pub value: ResultValue,
}

/// A typed deferred result: the crate's `DRes<T>`
///
/// Carries no data of its own -- only the id of the operation in the owning
/// builder that will eventually produce a `T`. Cloning a handle is cheap and
/// does not duplicate work; the underlying operation still runs exactly
/// once, whichever handle observes it first.
pub struct ResultHandle<T> {
    id: ResultId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ResultHandle<T> {
    /// Wrap a raw result id in a typed handle
    pub(crate) fn new(id: ResultId) -> Self {
        Self { id, _marker: PhantomData }
    }

    /// The underlying result id
    pub fn id(&self) -> ResultId {
        self.id
    }
}

impl<T> Clone for ResultHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ResultHandle<T> {}

impl<T> std::fmt::Debug for ResultHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultHandle").field("id", &self.id).finish()
    }
}

/// Converts a resolved [`ResultValue`] into a concrete output type,
/// raising a `ProgrammerError` if the builder produced the wrong variant
///
/// A mismatch can only happen from a bug in this crate (a protocol
/// registered under the wrong handle type), never from untrusted input, so
/// this is modeled as a programmer error rather than a recoverable one.
pub trait FromResultValue: Sized {
    /// Attempt the conversion
    fn from_result_value(value: ResultValue) -> Result<Self, FrescoError>;
}

macro_rules! impl_from_result_value {
    ($ty:ty, $variant:ident) => {
        impl FromResultValue for $ty {
            fn from_result_value(value: ResultValue) -> Result<Self, FrescoError> {
                match value {
                    ResultValue::$variant(inner) => Ok(inner),
                    other => Err(FrescoError::programmer(format!(
                        "expected {} result, got {:?}",
                        stringify!($variant),
                        other
                    ))),
                }
            }
        }
    };
}

impl_from_result_value!(Fp, Field);
impl_from_result_value!(Vec<Fp>, FieldBatch);
impl_from_result_value!(AuthenticatedShare, Share);
impl_from_result_value!(Vec<AuthenticatedShare>, ShareBatch);
impl_from_result_value!(OpenedValue, Opened);
impl_from_result_value!(Vec<OpenedValue>, OpenedBatch);
impl_from_result_value!(Vec<u8>, Bytes);

impl FromResultValue for () {
    fn from_result_value(value: ResultValue) -> Result<Self, FrescoError> {
        match value {
            ResultValue::Unit => Ok(()),
            other => Err(FrescoError::programmer(format!("expected Unit result, got {other:?}"))),
        }
    }
}
