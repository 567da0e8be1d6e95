//! Network transport consumed by the round-based evaluator
//!
//! The evaluator only ever needs three operations: broadcast a per-peer set
//! of byte buffers, receive the corresponding buffers back, and exchange a
//! single value with every peer (used by the MAC-check's commit/open
//! rounds). Everything above this trait -- framing, retries, fault recovery
//! -- is explicitly out of scope (spec.md §1): a disconnect or a short read
//! aborts the session.
//!
//! Two implementations ship: [`InMemoryDuplexNetwork`], an in-process
//! n-party hub used by tests, the demo binary and the integration harness,
//! and [`QuicNetwork`], a thin QUIC-backed transport for real deployments,
//! generalized from the teacher's two-party `QuicTwoPartyNet` to one QUIC
//! connection per peer pair.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quinn::{ClientConfig, Endpoint, RecvStream, SendStream, ServerConfig};
use rustls::{Certificate, PrivateKey};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::error::FrescoError;
use crate::PartyId;

/// A per-peer byte buffer sent or received in one evaluator batch
pub type PeerBuffer = HashMap<PartyId, Vec<u8>>;

/// The network transport consumed by [`crate::evaluator::Evaluator`]
///
/// A single call to `send_then_receive` corresponds to one batch (spec.md
/// §4.2 steps 2-3): every outbound buffer for the batch is flushed together,
/// then the call blocks until every peer's batch has arrived.
#[async_trait]
pub trait MpcNetwork: Send {
    /// This party's id
    fn party_id(&self) -> PartyId;

    /// The ids of every other party in the session
    fn peers(&self) -> Vec<PartyId>;

    /// Send `outbound[p]` to peer `p` for every peer, then block until a
    /// buffer has arrived from every peer and return them keyed by sender
    async fn send_then_receive(&mut self, outbound: PeerBuffer) -> FrescoResult<PeerBuffer>;

    /// Exchange a single buffer with every peer: send `payload` to all of
    /// them and return what each of them sent back, keyed by sender. Used
    /// for the commit/open rounds of broadcast validation and the
    /// MAC-check.
    async fn exchange_with_all(&mut self, payload: Vec<u8>) -> FrescoResult<PeerBuffer> {
        let outbound = self.peers().into_iter().map(|p| (p, payload.clone())).collect();
        self.send_then_receive(outbound).await
    }
}

type FrescoResult<T> = Result<T, FrescoError>;

// ---------------------------
// | In-memory duplex network |
// ---------------------------

/// An in-process transport connecting `n` simulated parties by unbounded
/// mpsc channels, one pair per ordered pair of parties
///
/// Generalizes the teacher's two-party `UnboundedDuplexStream` to an
/// n-party hub: `new_n_party` builds the full mesh of channels up front and
/// hands each party its own handle.
pub struct InMemoryDuplexNetwork {
    party_id: PartyId,
    peers: Vec<PartyId>,
    senders: HashMap<PartyId, UnboundedSender<(PartyId, Vec<u8>)>>,
    receiver: UnboundedReceiver<(PartyId, Vec<u8>)>,
    recv_timeout: Duration,
}

impl InMemoryDuplexNetwork {
    /// Build the full mesh of channels for `n` parties and return one
    /// network handle per party, indexed by party id `0..n`
    pub fn new_n_party(n: usize, recv_timeout: Duration) -> Vec<Self> {
        assert!(n >= 2, "an MPC session requires at least two parties");

        // One unbounded channel per party, used as that party's inbox
        let (txs, mut rxs): (Vec<_>, Vec<_>) = (0..n)
            .map(|_| unbounded_channel::<(PartyId, Vec<u8>)>())
            .unzip();

        let mut networks = Vec::with_capacity(n);
        for party_id in 0..n {
            let receiver = std::mem::replace(&mut rxs[party_id], unbounded_channel().1);
            let senders = (0..n)
                .filter(|&p| p != party_id)
                .map(|p| (p as PartyId, txs[p].clone()))
                .collect();
            let peers = (0..n).filter(|&p| p != party_id).map(|p| p as PartyId).collect();

            networks.push(Self { party_id: party_id as PartyId, peers, senders, receiver, recv_timeout });
        }
        networks
    }
}

#[async_trait]
impl MpcNetwork for InMemoryDuplexNetwork {
    fn party_id(&self) -> PartyId {
        self.party_id
    }

    fn peers(&self) -> Vec<PartyId> {
        self.peers.clone()
    }

    async fn send_then_receive(&mut self, outbound: PeerBuffer) -> FrescoResult<PeerBuffer> {
        for (peer, payload) in outbound {
            let sender = self.senders.get(&peer).ok_or_else(|| {
                FrescoError::transport(peer, "no channel to peer", 0)
            })?;
            sender.send((self.party_id, payload)).map_err(|_| {
                FrescoError::transport(peer, "peer's inbox was dropped", 0)
            })?;
        }

        let mut inbound = PeerBuffer::new();
        while inbound.len() < self.peers.len() {
            let next = timeout(self.recv_timeout, self.receiver.recv()).await.map_err(|_| {
                FrescoError::transport(0, "receive timed out waiting on peer batch", 0)
            })?;
            let (from, payload) = next.ok_or_else(|| {
                FrescoError::transport(0, "inbox closed before all peers reported in", 0)
            })?;
            inbound.insert(from, payload);
        }

        Ok(inbound)
    }
}

// ----------------
// | QUIC network |
// ----------------

/// A thin QUIC-backed transport: one connection per peer pair, each
/// message length-prefixed with a 4-byte big-endian length
///
/// This is intentionally minimal -- connection setup, certificate
/// generation and reconnection policy are left to the caller via
/// [`QuicNetwork::new`]; the transport itself only implements the
/// `send_then_receive` batching contract that the evaluator needs.
pub struct QuicNetwork {
    party_id: PartyId,
    peers: Vec<PartyId>,
    connections: HashMap<PartyId, Arc<Mutex<(SendStream, RecvStream)>>>,
    recv_timeout: Duration,
}

impl QuicNetwork {
    /// Build a QUIC transport over already-established bidirectional
    /// streams, one per peer
    pub fn new(
        party_id: PartyId,
        streams: HashMap<PartyId, (SendStream, RecvStream)>,
        recv_timeout: Duration,
    ) -> Self {
        let peers = streams.keys().copied().collect();
        let connections =
            streams.into_iter().map(|(p, s)| (p, Arc::new(Mutex::new(s)))).collect();
        Self { party_id, peers, connections, recv_timeout }
    }

    /// Dial a peer over QUIC as the client side of the pair and return the
    /// negotiated bidirectional stream
    pub async fn connect(local_addr: SocketAddr, peer_addr: SocketAddr) -> FrescoResult<(SendStream, RecvStream)> {
        let mut endpoint = Endpoint::client(local_addr)
            .map_err(|e| FrescoError::transport(0, format!("client bind: {e}"), 0))?;
        endpoint.set_default_client_config(insecure_client_config());

        let connection = endpoint
            .connect(peer_addr, "fresco-peer")
            .map_err(|e| FrescoError::transport(0, format!("connect: {e}"), 0))?
            .await
            .map_err(|e| FrescoError::transport(0, format!("handshake: {e}"), 0))?;

        connection
            .open_bi()
            .await
            .map_err(|e| FrescoError::transport(0, format!("open stream: {e}"), 0))
    }

    /// Listen for a single incoming QUIC connection as the server side of
    /// the pair and return its negotiated bidirectional stream
    ///
    /// `cert`/`key` are a self-signed certificate pair (see
    /// [`self_signed_cert`]); in production these would be provisioned out
    /// of band per spec.md §6's "consumed, not specified" network contract.
    pub async fn listen(
        local_addr: SocketAddr,
        cert: Certificate,
        key: PrivateKey,
    ) -> FrescoResult<(SendStream, RecvStream)> {
        let server_config = ServerConfig::with_single_cert(vec![cert], key)
            .map_err(|e| FrescoError::transport(0, format!("tls config: {e}"), 0))?;
        let endpoint = Endpoint::server(server_config, local_addr)
            .map_err(|e| FrescoError::transport(0, format!("bind: {e}"), 0))?;

        let incoming = endpoint
            .accept()
            .await
            .ok_or_else(|| FrescoError::transport(0, "no incoming connection", 0))?;
        let connection = incoming.await.map_err(|e| FrescoError::transport(0, format!("handshake: {e}"), 0))?;

        connection
            .accept_bi()
            .await
            .map_err(|e| FrescoError::transport(0, format!("accept stream: {e}"), 0))
    }
}

/// A client config that skips certificate verification
///
/// Authenticating the peer's identity is delegated to an out-of-band
/// channel (spec.md §6 treats the transport as an external collaborator);
/// this keeps the demo usable without a CA.
fn insecure_client_config() -> ClientConfig {
    struct SkipVerification;
    impl rustls::client::ServerCertVerifier for SkipVerification {
        fn verify_server_cert(
            &self,
            _end_entity: &Certificate,
            _intermediates: &[Certificate],
            _server_name: &rustls::ServerName,
            _scts: &mut dyn Iterator<Item = &[u8]>,
            _ocsp_response: &[u8],
            _now: std::time::SystemTime,
        ) -> Result<rustls::client::ServerCertVerified, rustls::Error> {
            Ok(rustls::client::ServerCertVerified::assertion())
        }
    }

    let crypto = rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_custom_certificate_verifier(Arc::new(SkipVerification))
        .with_no_client_auth();
    ClientConfig::new(Arc::new(crypto))
}

#[async_trait]
impl MpcNetwork for QuicNetwork {
    fn party_id(&self) -> PartyId {
        self.party_id
    }

    fn peers(&self) -> Vec<PartyId> {
        self.peers.clone()
    }

    async fn send_then_receive(&mut self, outbound: PeerBuffer) -> FrescoResult<PeerBuffer> {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        for (peer, payload) in &outbound {
            let conn = self
                .connections
                .get(peer)
                .ok_or_else(|| FrescoError::transport(*peer, "no connection to peer", 0))?;
            let mut guard = conn.lock().await;
            let (send, _recv) = &mut *guard;
            let len = (payload.len() as u32).to_be_bytes();
            send.write_all(&len)
                .await
                .map_err(|e| FrescoError::transport(*peer, e.to_string(), 0))?;
            send.write_all(payload)
                .await
                .map_err(|e| FrescoError::transport(*peer, e.to_string(), 0))?;
        }

        let mut inbound = PeerBuffer::new();
        for peer in self.peers.clone() {
            let conn = self.connections.get(&peer).unwrap();
            let mut guard = conn.lock().await;
            let (_send, recv) = &mut *guard;

            let mut len_buf = [0u8; 4];
            timeout(self.recv_timeout, recv.read_exact(&mut len_buf))
                .await
                .map_err(|_| FrescoError::transport(peer, "receive timed out", 0))?
                .map_err(|e| FrescoError::transport(peer, format!("short read: {e}"), 0))?;
            let len = u32::from_be_bytes(len_buf) as usize;

            let mut payload = vec![0u8; len];
            recv.read_exact(&mut payload)
                .await
                .map_err(|e| FrescoError::transport(peer, format!("short read: {e}"), 0))?;
            inbound.insert(peer, payload);
        }

        Ok(inbound)
    }
}

/// Generate a self-signed certificate for local testing of the QUIC
/// transport
pub fn self_signed_cert() -> (Certificate, PrivateKey) {
    let cert = rcgen::generate_simple_self_signed(vec!["fresco-peer".into()])
        .expect("self-signed cert generation");
    let cert_der = cert.serialize_der().expect("cert serialization");
    let key_der = cert.serialize_private_key_der();
    (Certificate(cert_der), PrivateKey(key_der))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Duration as StdDuration;

    #[tokio::test]
    async fn in_memory_network_delivers_all_peer_buffers() {
        let mut nets = InMemoryDuplexNetwork::new_n_party(3, StdDuration::from_secs(5));
        let mut handles = Vec::new();
        for mut net in nets.drain(..) {
            handles.push(tokio::spawn(async move {
                let outbound: PeerBuffer =
                    net.peers().into_iter().map(|p| (p, vec![net.party_id() as u8])).collect();
                net.send_then_receive(outbound).await.unwrap()
            }));
        }

        for (i, h) in handles.into_iter().enumerate() {
            let inbound = h.await.unwrap();
            for (from, payload) in inbound {
                assert_eq!(payload, vec![from as u8]);
                assert_ne!(from as usize, i);
            }
        }
    }
}
