//! Connected peer registry and broadcast.
//!
//! One [`PeerRegistry`] is created per server and shared by every
//! connection task. Register, deregister and broadcast all hold the same
//! lock for their whole duration, so a broadcast sees a consistent
//! membership snapshot. Writes inside a broadcast are the only I/O done
//! under the lock; a stalled peer delays delivery to everyone else.

use std::fmt;
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Token returned by [`PeerRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(u64);

impl PeerId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// Registry shared by all TCP connection handlers.
pub type SharedRegistry = Arc<PeerRegistry<OwnedWriteHalf>>;

/// Creates an empty registry for TCP write halves.
pub fn new_shared_registry() -> SharedRegistry {
    Arc::new(PeerRegistry::new())
}

#[derive(Debug)]
struct Members<W> {
    peers: Vec<(PeerId, W)>,
    next_id: u64,
}

/// Mutex-guarded set of peer write handles.
#[derive(Debug)]
pub struct PeerRegistry<W> {
    members: Mutex<Members<W>>,
}

impl<W> Default for PeerRegistry<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W> PeerRegistry<W> {
    pub fn new() -> Self {
        Self {
            members: Mutex::new(Members {
                peers: Vec::new(),
                next_id: 1,
            }),
        }
    }

    /// Adds a handle; the returned id is used to deregister it.
    pub async fn register(&self, handle: W) -> PeerId {
        let mut members = self.members.lock().await;
        let id = PeerId(members.next_id);
        members.next_id += 1;
        members.peers.push((id, handle));
        debug!(peer_id = %id, peers = members.peers.len(), "Registered peer");
        id
    }

    /// Removes a handle and gives it back to the caller.
    ///
    /// Deregistering an id that is not present is a no-op returning `None`.
    /// The handle is returned rather than dropped so the connection is
    /// only closed after it has left the registry.
    pub async fn deregister(&self, id: PeerId) -> Option<W> {
        let mut members = self.members.lock().await;
        let Some(index) = members.peers.iter().position(|(peer, _)| *peer == id) else {
            debug!(peer_id = %id, "Peer already deregistered");
            return None;
        };
        let (_, handle) = members.peers.remove(index);
        debug!(peer_id = %id, peers = members.peers.len(), "Deregistered peer");
        Some(handle)
    }

    /// Number of registered peers.
    pub async fn len(&self) -> usize {
        self.members.lock().await.peers.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.members.lock().await.peers.is_empty()
    }

    pub async fn contains(&self, id: PeerId) -> bool {
        self.members
            .lock()
            .await
            .peers
            .iter()
            .any(|(peer, _)| *peer == id)
    }
}

impl<W: AsyncWrite + Unpin + Send> PeerRegistry<W> {
    /// Writes `payload` to every registered peer in registration order.
    ///
    /// A failed write is logged and skipped; the peer stays registered
    /// until its own reader deregisters it. Returns the number of peers
    /// the payload was delivered to.
    pub async fn broadcast(&self, payload: &[u8]) -> usize {
        let mut members = self.members.lock().await;
        let mut delivered = 0;
        for (id, handle) in members.peers.iter_mut() {
            let result = async {
                handle.write_all(payload).await?;
                handle.flush().await
            }
            .await;
            match result {
                Ok(()) => delivered += 1,
                Err(e) => warn!(peer_id = %id, error = %e, "Failed to write broadcast to peer"),
            }
        }
        delivered
    }
}
