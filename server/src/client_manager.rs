//! Connection registry for the arena server
//!
//! This module tracks the TCP connections the server has accepted:
//! - Connection lifecycle (greeted, attached to an agent, closed, timed out)
//! - The outgoing frame queue feeding each connection's writer task
//! - Connection health monitoring through last-activity timestamps
//! - Capacity management so a flood of sockets cannot exhaust the server
//!
//! Every connection is paired with exactly one agent inside the game. The
//! registry is the only place that knows how to reach that agent's socket.

use crate::agent_info::AgentId;
use log::{debug, info};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Identifier the network layer assigns to each accepted socket
pub type ConnectionId = u64;

/// An encoded frame shared between every connection it is broadcast to
pub type Frame = Arc<Vec<u8>>;

/// Represents one accepted connection and the agent behind it
///
/// Each client maintains:
/// - Connection metadata (IDs, address, last activity)
/// - The queue its writer task drains onto the socket
#[derive(Debug)]
pub struct Client {
    /// Connection identifier assigned by the network layer
    pub id: ConnectionId,
    /// Agent this connection speaks for inside the game
    pub agent_id: AgentId,
    /// Remote address, used for logging only
    pub addr: SocketAddr,
    /// Last time we received a complete message from this client
    pub last_seen: Instant,
    outgoing: mpsc::UnboundedSender<Frame>,
}

impl Client {
    /// Creates a client record for a freshly greeted connection
    ///
    /// The client is marked as recently active so the timeout checker gives
    /// it a full grace period before its first message arrives.
    pub fn new(id: ConnectionId, agent_id: AgentId, addr: SocketAddr, outgoing: mpsc::UnboundedSender<Frame>) -> Self {
        Self {
            id,
            agent_id,
            addr,
            last_seen: Instant::now(),
            outgoing,
        }
    }

    /// Records activity on the connection
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Queues a frame for the writer task
    ///
    /// Returns false once the writer has gone away, which means the socket
    /// is closed and the connection should be dropped.
    pub fn send(&self, frame: Frame) -> bool {
        self.outgoing.send(frame).is_ok()
    }

    /// Checks if the client has exceeded the connection timeout
    ///
    /// Returns true if no messages have been received from this client
    /// within the specified timeout duration. Healthy clients send a sync
    /// check every few seconds, so silence means a dead peer.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages every accepted connection
///
/// The ClientManager enforces the server's connection cap and maps between
/// connection IDs (what the socket tasks know) and agent IDs (what the game
/// knows).
#[derive(Debug)]
pub struct ClientManager {
    clients: HashMap<ConnectionId, Client>,
    max_clients: usize,
    timeout: Duration,
}

impl ClientManager {
    /// Creates an empty registry with the given capacity and idle timeout
    pub fn new(max_clients: usize, timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            max_clients,
            timeout,
        }
    }

    /// Returns true if another connection would exceed the cap
    pub fn is_full(&self) -> bool {
        self.clients.len() >= self.max_clients
    }

    /// Registers a connection
    ///
    /// Returns false and leaves the registry untouched when the server is
    /// at capacity or the connection ID is already known.
    pub fn add_client(&mut self, client: Client) -> bool {
        if self.is_full() || self.clients.contains_key(&client.id) {
            return false;
        }
        info!(
            "Connection {} from {} attached to agent {} ({}/{})",
            client.id,
            client.addr,
            client.agent_id,
            self.clients.len() + 1,
            self.max_clients
        );
        self.clients.insert(client.id, client);
        true
    }

    /// Removes a connection, returning the agent it was attached to
    pub fn remove_client(&mut self, id: ConnectionId) -> Option<AgentId> {
        let client = self.clients.remove(&id)?;
        info!("Connection {} from {} closed", id, client.addr);
        Some(client.agent_id)
    }

    /// Updates the activity timestamp and returns the connection's agent
    pub fn touch(&mut self, id: ConnectionId) -> Option<AgentId> {
        let client = self.clients.get_mut(&id)?;
        client.touch();
        Some(client.agent_id)
    }

    pub fn agent_for(&self, id: ConnectionId) -> Option<AgentId> {
        self.clients.get(&id).map(|client| client.agent_id)
    }

    /// Queues a frame for one agent's connection
    ///
    /// Returns the connection ID if the writer has gone away so the caller
    /// can tear the connection down.
    pub fn send_to_agent(&self, agent_id: AgentId, frame: Frame) -> Option<ConnectionId> {
        let client = self.clients.values().find(|client| client.agent_id == agent_id)?;
        if client.send(frame) {
            None
        } else {
            Some(client.id)
        }
    }

    /// Queues a frame for every connection
    ///
    /// Returns the connections whose writers have gone away.
    pub fn broadcast(&self, frame: &Frame) -> Vec<ConnectionId> {
        self.clients
            .values()
            .filter(|client| !client.send(Arc::clone(frame)))
            .map(|client| client.id)
            .collect()
    }

    /// Checks for and removes timed-out connections
    ///
    /// Returns the agents that lost their connection so the game can be
    /// told about each one.
    pub fn check_timeouts(&mut self) -> Vec<(ConnectionId, AgentId)> {
        let timed_out: Vec<(ConnectionId, AgentId)> = self
            .clients
            .values()
            .filter(|client| client.is_timed_out(self.timeout))
            .map(|client| (client.id, client.agent_id))
            .collect();

        for (id, agent_id) in &timed_out {
            debug!("Connection {} for agent {} timed out", id, agent_id);
            self.clients.remove(id);
        }

        timed_out
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

/// Tests cover registration, capacity enforcement, frame routing and
/// timeout handling.
#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:6789".parse().unwrap()
    }

    fn client(id: ConnectionId, agent_id: AgentId) -> (Client, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Client::new(id, agent_id, test_addr(), tx), rx)
    }

    #[test]
    fn test_client_timeout() {
        let (mut client, _rx) = client(1, 1);
        assert!(!client.is_timed_out(Duration::from_secs(1)));

        client.last_seen = Instant::now() - Duration::from_secs(2);
        assert!(client.is_timed_out(Duration::from_secs(1)));

        client.touch();
        assert!(!client.is_timed_out(Duration::from_secs(1)));
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1, Duration::from_secs(30));
        let (first, _rx1) = client(1, 10);
        let (second, _rx2) = client(2, 11);

        assert!(manager.add_client(first));
        assert!(manager.is_full());
        assert!(!manager.add_client(second));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_duplicate_connection_is_refused() {
        let mut manager = ClientManager::new(4, Duration::from_secs(30));
        let (first, _rx1) = client(1, 10);
        let (again, _rx2) = client(1, 11);

        assert!(manager.add_client(first));
        assert!(!manager.add_client(again));
        assert_eq!(manager.agent_for(1), Some(10));
    }

    #[test]
    fn test_remove_client_returns_agent() {
        let mut manager = ClientManager::new(2, Duration::from_secs(30));
        let (first, _rx) = client(7, 3);
        manager.add_client(first);

        assert_eq!(manager.remove_client(7), Some(3));
        assert_eq!(manager.remove_client(7), None);
        assert!(manager.is_empty());
    }

    #[test]
    fn test_frames_reach_the_right_connection() {
        let mut manager = ClientManager::new(4, Duration::from_secs(30));
        let (first, mut rx1) = client(1, 10);
        let (second, mut rx2) = client(2, 11);
        manager.add_client(first);
        manager.add_client(second);

        assert_eq!(manager.send_to_agent(11, Arc::new(vec![1, 2])), None);
        assert!(rx1.try_recv().is_err());
        assert_eq!(*rx2.try_recv().unwrap(), vec![1, 2]);

        assert!(manager.broadcast(&Arc::new(vec![3])).is_empty());
        assert_eq!(*rx1.try_recv().unwrap(), vec![3]);
        assert_eq!(*rx2.try_recv().unwrap(), vec![3]);
    }

    #[test]
    fn test_closed_writer_is_reported() {
        let mut manager = ClientManager::new(4, Duration::from_secs(30));
        let (first, rx) = client(5, 10);
        manager.add_client(first);
        drop(rx);

        assert_eq!(manager.send_to_agent(10, Arc::new(vec![0])), Some(5));
        assert_eq!(manager.broadcast(&Arc::new(vec![0])), vec![5]);
    }

    #[test]
    fn test_check_timeouts() {
        let mut manager = ClientManager::new(4, Duration::from_secs(1));
        let (stale, _rx1) = client(1, 10);
        let (fresh, _rx2) = client(2, 11);
        manager.add_client(stale);
        manager.add_client(fresh);
        manager.clients.get_mut(&1).unwrap().last_seen = Instant::now() - Duration::from_secs(2);

        assert_eq!(manager.check_timeouts(), vec![(1, 10)]);
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.touch(2), Some(11));
    }
}
