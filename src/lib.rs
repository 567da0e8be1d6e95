#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

//! FRESCO-RS: a framework for Secure Multi-Party Computation (spec.md §1)
//!
//! Several mutually-distrusting parties jointly evaluate an arithmetic
//! function over secret inputs without revealing them. The crate has three
//! tightly coupled layers, leaves-first:
//!
//! - [`field`] and [`share`]: the field abstraction and the authenticated
//!   (MAC'd) additive shares arithmetic is built over.
//! - [`protocol`] and [`spdz`]: native, round-numbered state machines
//!   (input, open, multiply, random, and the free linear gates) that
//!   realise SPDZ-style arithmetic under active security.
//! - [`builder`] and [`evaluator`]: a hierarchically-scoped graph of
//!   deferred results, and the round-based batched scheduler that drives it
//!   to completion over a network, running a batched [`mac_check`] before
//!   any opened value is trusted.
//!
//! [`numeric`] layers ergonomic `add`/`sub`/`mul`/`input`/`open` methods
//! over the builder; [`session`] wires builder, evaluator and MAC-check
//! together behind a single `run_mpc` entry point; [`preprocessing`] and
//! [`network`] are the correlated-randomness and transport traits the core
//! consumes rather than implements (spec.md §1's "external collaborators").

use rand::thread_rng;

use field::{Field, Fp};

pub mod builder;
pub mod commitment;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod field;
pub mod mac_check;
pub mod network;
pub mod numeric;
pub mod preprocessing;
pub mod protocol;
pub mod session;
pub mod share;
pub mod spdz;

/// Identifies one party in a session
///
/// Kept as a plain type alias rather than a newtype: every native protocol,
/// the network trait, and `FrescoError::Transport` pass it around as a bare
/// integer key into per-peer maps, and a newtype would buy no additional
/// safety there (spec.md §3, §6).
pub type PartyId = u64;

/// The first party in a two-party session
pub const PARTY0: PartyId = 0;
/// The second party in a two-party session
pub const PARTY1: PartyId = 1;

/// Sample a uniformly random public field element
///
/// Convenience wrapper over [`Field::random`] for callers (the demo binary,
/// scenario tests) that need a plain public value rather than a share.
pub fn random_field_element() -> Fp {
    Fp::random(&mut thread_rng())
}

/// Test-only session scaffolding, also used by the integration harness and
/// benchmarks (hence gated on the `test_helpers` feature rather than only
/// `#[cfg(test)]`)
#[cfg(any(test, feature = "test_helpers"))]
pub mod test_helpers {
    use std::time::Duration;

    use crate::network::InMemoryDuplexNetwork;
    use crate::preprocessing::InMemorySource;

    /// Build an `n`-party in-memory network plus matching dealt
    /// preprocessing material, one pair per party, so a test can run a full
    /// session without any real transport or offline phase
    ///
    /// Mirrors the teacher's `mock_fabric`/`execute_mock_mpc` test helpers
    /// (`examples/ertosns-mpc-stark/src/lib.rs`), generalized from a fixed
    /// two-party duplex stream to `n` parties and a dealt (rather than
    /// dummy) preprocessing source so property tests can exercise real MAC
    /// and triple invariants, and exposed under `test_helpers` so the
    /// integration harness and benchmarks can reuse it too.
    pub fn mock_session(
        n: usize,
        triples_per_party: usize,
        seed: u64,
    ) -> (Vec<InMemoryDuplexNetwork>, Vec<InMemorySource>) {
        let networks = InMemoryDuplexNetwork::new_n_party(n, Duration::from_secs(5));
        let sources = InMemorySource::deal(n, triples_per_party, seed);
        (networks, sources)
    }
}
