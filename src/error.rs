//! The error type returned by the fresco engine
//!
//! Every abort path raises exactly one `FrescoError`, carrying its kind, the
//! peer id where one is implicated, and the batch number the evaluator was
//! on when the failure was observed.

use std::fmt::{self, Display, Formatter};

use crate::PartyId;

/// The top level error type for the fresco engine
///
/// Mirrors the taxonomy of spec.md: malicious behaviour, transport failure,
/// programmer error, resource exhaustion, and arithmetic error are kept as
/// distinct variants so callers can match on them rather than parse a string.
#[derive(Clone, Debug)]
pub enum FrescoError {
    /// A MAC-check failed, a broadcast validation failed, or a peer sent a
    /// payload of the wrong length -- the session must abort and never
    /// return a value opened under this or a later batch
    Malicious {
        /// Human readable description of what was detected
        reason: String,
        /// The batch at which the failure was detected
        batch: u64,
    },
    /// The network layer could not deliver or receive a message
    Transport {
        /// The peer the transport error is attributed to
        peer: PartyId,
        /// Description of the underlying I/O failure
        reason: String,
        /// The batch the evaluator was processing
        batch: u64,
    },
    /// A misuse of the API that should never happen in a correct program:
    /// reading an unfulfilled `DRes`, a dimension mismatch between
    /// arguments, or starting an evaluator twice
    ProgrammerError {
        /// Description of the violated invariant
        reason: String,
    },
    /// A correlated-randomness queue (triples, input masks, random shares)
    /// ran dry before the program finished consuming it
    ResourceExhausted {
        /// Which resource ran out
        reason: String,
        /// The batch at which the shortage was discovered
        batch: u64,
    },
    /// An arithmetic invariant was violated locally, e.g. a native protocol
    /// produced an output of unexpected length
    Arithmetic {
        /// Description of the failure
        reason: String,
    },
    /// A full sweep of the evaluator completed without finishing a single
    /// protocol while the computation graph was non-empty
    NoProgress {
        /// The batch at which no progress was made
        batch: u64,
    },
}

impl Display for FrescoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FrescoError::Malicious { reason, batch } => {
                write!(f, "malicious behaviour detected at batch {batch}: {reason}")
            }
            FrescoError::Transport { peer, reason, batch } => {
                write!(f, "transport failure with party {peer} at batch {batch}: {reason}")
            }
            FrescoError::ProgrammerError { reason } => {
                write!(f, "programmer error: {reason}")
            }
            FrescoError::ResourceExhausted { reason, batch } => {
                write!(f, "resource exhausted at batch {batch}: {reason}")
            }
            FrescoError::Arithmetic { reason } => {
                write!(f, "arithmetic error: {reason}")
            }
            FrescoError::NoProgress { batch } => {
                write!(f, "no progress made in batch {batch}, aborting")
            }
        }
    }
}

impl std::error::Error for FrescoError {}

impl FrescoError {
    /// Construct a `Malicious` error
    pub fn malicious(reason: impl Into<String>, batch: u64) -> Self {
        FrescoError::Malicious { reason: reason.into(), batch }
    }

    /// Construct a `Transport` error
    pub fn transport(peer: PartyId, reason: impl Into<String>, batch: u64) -> Self {
        FrescoError::Transport { peer, reason: reason.into(), batch }
    }

    /// Construct a `ProgrammerError`
    pub fn programmer(reason: impl Into<String>) -> Self {
        FrescoError::ProgrammerError { reason: reason.into() }
    }

    /// Construct a `ResourceExhausted` error
    pub fn resource_exhausted(reason: impl Into<String>, batch: u64) -> Self {
        FrescoError::ResourceExhausted { reason: reason.into(), batch }
    }

    /// Construct an `Arithmetic` error
    pub fn arithmetic(reason: impl Into<String>) -> Self {
        FrescoError::Arithmetic { reason: reason.into() }
    }

    /// Whether this error kind is considered fatal to the process, as
    /// opposed to recoverable at a layer above the core (the core never
    /// retries, but this distinguishes "the session is broken" from
    /// "the caller misused the API")
    pub fn is_programmer_error(&self) -> bool {
        matches!(self, FrescoError::ProgrammerError { .. })
    }
}

/// A convenience alias used throughout the crate
pub type FrescoResult<T> = Result<T, FrescoError>;
