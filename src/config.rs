//! Session configuration
//!
//! A small, serde-backed config describing one party's view of a session:
//! its own id, the addresses of its peers, how long to wait on a batch
//! reply before aborting, and which field backend to run over. Grounded in
//! `TaceoLabs-worldcoin-experiments`'s `mpc-net`-style `NetworkConfig`
//! (`examples/TaceoLabs-worldcoin-experiments/iris-aby3/src/tests/aby_config.rs`)
//! and `cberkhoff-ipa`'s `config::NetworkConfig` (`serde::Deserialize` plus
//! a `PeerConfig` list), generalized from that crate's HTTP/HPKE-heavy peer
//! descriptor to the plain `(id, socket address)` pair this engine's QUIC
//! transport needs.
//!
//! Loaded from a YAML file via `serde_yaml`, matching the same pack
//! members' choice of `serde_yaml` for this role rather than `toml` or a
//! hand-rolled format.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FrescoError, FrescoResult};
use crate::PartyId;

/// The field backend a session runs its numeric builder surface over
///
/// The engine is written against the [`crate::field::Field`] trait
/// throughout, so this only selects which concrete backend `session::run_mpc`
/// should construct preprocessing and protocols against; the two named here
/// are the ones shipped by [`crate::field`] (spec.md §3, §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldChoice {
    /// The 61-bit Mersenne prime field, [`crate::field::mersenne61::Mersenne61`]
    Mersenne61,
    /// A runtime-chosen modulus, [`crate::field::modular::ModularInt`]
    Modular,
}

impl Default for FieldChoice {
    fn default() -> Self {
        FieldChoice::Mersenne61
    }
}

/// One peer's address in a session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerConfig {
    /// The peer's party id
    pub id: PartyId,
    /// The address this party's transport should dial (or was dialed on)
    /// to reach the peer
    pub address: SocketAddr,
}

/// A party's view of a session: its own id, its peers, and the transport
/// and field choices governing it
///
/// `recv_timeout_ms` bounds how long the evaluator's network layer waits
/// for a batch reply before treating the peer as disconnected (spec.md §5
/// "per-receive timeout (configurable)").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// This party's own id
    pub party_id: PartyId,
    /// Every other party in the session
    pub peers: Vec<PeerConfig>,
    /// How long to wait for a peer's batch reply before aborting
    #[serde(default = "default_recv_timeout_ms")]
    pub recv_timeout_ms: u64,
    /// Which field backend to run over
    #[serde(default)]
    pub field: FieldChoice,
    /// How many batches may pass with opened values pending a MAC-check
    /// before one runs automatically; `None` only checks once, at the end
    /// of the program (spec.md §4.5)
    #[serde(default)]
    pub mac_check_interval: Option<u64>,
}

/// The default per-receive timeout, five seconds
fn default_recv_timeout_ms() -> u64 {
    5_000
}

impl SessionConfig {
    /// This party's per-receive timeout as a [`Duration`]
    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    /// The ids of every peer, in the order given in the config file
    pub fn peer_ids(&self) -> Vec<PartyId> {
        self.peers.iter().map(|p| p.id).collect()
    }

    /// Parse a session config from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> FrescoResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            FrescoError::programmer(format!("failed to read session config {}: {e}", path.as_ref().display()))
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Parse a session config from a YAML string
    pub fn from_yaml_str(yaml: &str) -> FrescoResult<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| FrescoError::programmer(format!("invalid session config: {e}")))
    }

    /// Parse a session config from a JSON string
    ///
    /// Alongside YAML, since a deployment's orchestration tooling (or a
    /// `tracing` log line recording what a party was launched with) may
    /// produce JSON rather than hand-written YAML.
    pub fn from_json_str(json: &str) -> FrescoResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| FrescoError::programmer(format!("invalid session config: {e}")))
    }

    /// Serialize this config to a JSON string, e.g. for a startup log line
    pub fn to_json_string(&self) -> FrescoResult<String> {
        serde_json::to_string(self).map_err(|e| FrescoError::programmer(format!("config serialization: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_two_party_config() {
        let yaml = r#"
party_id: 0
peers:
  - id: 1
    address: "127.0.0.1:9001"
"#;
        let config = SessionConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.party_id, 0);
        assert_eq!(config.peer_ids(), vec![1]);
        assert_eq!(config.recv_timeout(), Duration::from_secs(5));
        assert_eq!(config.field, FieldChoice::Mersenne61);
    }

    #[test]
    fn rejects_malformed_yaml() {
        assert!(SessionConfig::from_yaml_str("not: [valid, session").is_err());
    }

    #[test]
    fn json_round_trips_through_to_json_string_and_from_json_str() {
        let yaml = r#"
party_id: 0
peers:
  - id: 1
    address: "127.0.0.1:9001"
mac_check_interval: 16
"#;
        let config = SessionConfig::from_yaml_str(yaml).unwrap();
        let json = config.to_json_string().unwrap();
        let round_tripped = SessionConfig::from_json_str(&json).unwrap();
        assert_eq!(round_tripped.party_id, config.party_id);
        assert_eq!(round_tripped.peer_ids(), config.peer_ids());
        assert_eq!(round_tripped.mac_check_interval, Some(16));
    }
}
