//! Network Manager
//!
//! Façade the game code talks to. Owns the transport, the dispatcher and
//! the background receive loop.
//!
//! ```text
//!  game thread                          receive thread (current-thread tokio)
//!  ───────────                          ─────────────────────────────────────
//!  send_*()  ── encode ── outbound ───► route_local ── send_to ──► peers
//!                                       recv_from ── Dispatcher ── relay ──► peers
//!  poll(bridge) ◄──────── inbound ◄───────────────────┘ (bounded queue)
//!  peers()      ◄──────── watch   ◄──── registry snapshot
//! ```
//!
//! Game state is only ever mutated inside [`NetworkManager::poll`], on the
//! caller's thread. The manager is meant to be driven from a synchronous
//! game loop, not from inside an async runtime.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, instrument, warn};

use crate::core::{PlayerId, Vec3};
use crate::network::bridge::{GameStateBridge, GameStateProvider, NetEvent};
use crate::network::config::{NetConfig, Role};
use crate::network::dispatch::{Dispatcher, Outgoing};
use crate::network::error::NetError;
use crate::network::protocol::Message;
use crate::network::session::PeerInfo;
use crate::network::transport::{Received, Transport};

/// Handles owned while the receive loop runs.
struct Running {
    role: Role,
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    outbound_tx: mpsc::Sender<Arc<[u8]>>,
    inbound_rx: mpsc::Receiver<NetEvent>,
    peers_rx: watch::Receiver<Vec<PeerInfo>>,
    thread: JoinHandle<()>,
}

/// One participant's view of the peer group.
///
/// Lifecycle: `Stopped ─start()→ Running ─stop()→ Stopped`.
pub struct NetworkManager {
    config: NetConfig,
    player_id: PlayerId,
    provider: Option<Arc<dyn GameStateProvider>>,
    running: Option<Running>,
}

impl NetworkManager {
    /// Create a stopped manager. Generates a player id unless the config supplies one.
    pub fn new(config: NetConfig) -> Self {
        let player_id = config.player_id.clone().unwrap_or_else(PlayerId::generate);
        Self {
            config,
            player_id,
            provider: None,
            running: None,
        }
    }

    /// Builder-style [`set_state_provider`](Self::set_state_provider).
    pub fn with_state_provider(mut self, provider: Arc<dyn GameStateProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Snapshot source for new clients (host only). Takes effect on the next `start()`.
    pub fn set_state_provider(&mut self, provider: Arc<dyn GameStateProvider>) {
        self.provider = Some(provider);
    }

    /// Local participant id, stamped on every outbound message.
    pub fn player_id(&self) -> &PlayerId {
        &self.player_id
    }

    /// Current configuration.
    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    /// Whether the receive loop is running.
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Role while running.
    pub fn role(&self) -> Option<Role> {
        self.running.as_ref().map(|r| r.role)
    }

    /// Bound local address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    /// Bind the transport for `role` and launch the receive loop.
    ///
    /// Returns the bound address. On error the manager stays stopped.
    pub fn start(&mut self, role: Role) -> Result<SocketAddr, NetError> {
        if self.running.is_some() {
            return Err(NetError::InvalidState("network manager is already running"));
        }
        if !self.player_id.is_valid() {
            return Err(NetError::InvalidPlayerId(self.player_id.to_string()));
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let transport = {
            let _guard = runtime.enter();
            Transport::bind(role.local_bind_addr())?
        };
        let local_addr = transport.local_addr();

        let shutdown = Arc::new(AtomicBool::new(false));
        let capacity = self.config.queue_capacity.max(1);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        let (peers_tx, peers_rx) = watch::channel(Vec::new());

        let receive_loop = ReceiveLoop {
            transport,
            dispatcher: Dispatcher::new(self.player_id.clone(), role, self.provider.clone()),
            shutdown: shutdown.clone(),
            outbound_rx,
            inbound_tx,
            peers_tx,
            recv_timeout: self.config.recv_timeout,
            session_timeout: if role.is_host() { self.config.session_timeout } else { None },
        };

        let thread = std::thread::Builder::new()
            .name(format!("net-recv-{}", self.player_id))
            .spawn(move || runtime.block_on(receive_loop.run()))?;

        info!(
            player = %self.player_id,
            %local_addr,
            "network {} started",
            if role.is_host() { "host" } else { "client" },
        );

        self.running = Some(Running {
            role,
            local_addr,
            shutdown,
            outbound_tx,
            inbound_rx,
            peers_rx,
            thread,
        });

        Ok(local_addr)
    }

    /// Stop the receive loop and release the socket. Idempotent.
    ///
    /// Blocks for at most about one receive timeout. Undrained events are discarded.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        running.shutdown.store(true, Ordering::Release);
        // Closing the outbound queue wakes the loop without waiting out the receive timeout.
        drop(running.outbound_tx);

        if running.thread.join().is_err() {
            error!(player = %self.player_id, "receive loop panicked");
        }

        info!(player = %self.player_id, "network stopped");
    }

    /// Announce this participant to the host.
    pub fn send_connect(&self) -> Result<(), NetError> {
        self.send(Message::Connect { player_id: self.player_id.clone() })
    }

    /// Publish the local transform.
    pub fn send_player_update(&self, position: Vec3, rotation: Vec3) -> Result<(), NetError> {
        self.send(Message::PlayerUpdate {
            player_id: self.player_id.clone(),
            position,
            rotation,
        })
    }

    /// Publish a shot.
    pub fn send_shoot(&self, position: Vec3, direction: Vec3) -> Result<(), NetError> {
        self.send(Message::Shoot {
            player_id: self.player_id.clone(),
            position,
            direction,
        })
    }

    /// Publish damage dealt by the local participant.
    pub fn send_damage(&self, target_id: &PlayerId, amount: f32) -> Result<(), NetError> {
        self.send(Message::Damage {
            from_player: self.player_id.clone(),
            target_id: target_id.clone(),
            amount,
        })
    }

    /// Encode on the caller's thread and hand off to the receive loop for routing.
    ///
    /// Never blocks: when the receive loop has fallen `queue_capacity` sends
    /// behind, the message is dropped like a lost datagram.
    fn send(&self, message: Message) -> Result<(), NetError> {
        let running = self.running.as_ref()
            .ok_or(NetError::InvalidState("network manager is stopped"))?;

        let bytes = message.encode()?;
        match running.outbound_tx.try_send(Arc::from(bytes)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(player = %self.player_id, "outbound queue full, dropping {}", message.kind());
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(NetError::Send("receive loop has exited")),
        }
    }

    /// Take whatever events are queued right now, in arrival order.
    ///
    /// Takes at most `queue_capacity` events so a busy receive loop cannot
    /// keep the caller here indefinitely.
    pub fn drain_events(&mut self) -> Result<Vec<NetEvent>, NetError> {
        let limit = self.config.queue_capacity.max(1);
        let running = self.running.as_mut()
            .ok_or(NetError::InvalidState("network manager is stopped"))?;

        let mut events = Vec::new();
        while events.len() < limit {
            match running.inbound_rx.try_recv() {
                Ok(event) => events.push(event),
                Err(_) => break,
            }
        }
        Ok(events)
    }

    /// Drain the inbound queue into `bridge`. Call once per game tick.
    ///
    /// Returns the number of callbacks invoked.
    pub fn poll<B: GameStateBridge + ?Sized>(&mut self, bridge: &mut B) -> Result<usize, NetError> {
        let events = self.drain_events()?;
        let count = events.len();
        for event in events {
            event.apply(bridge);
        }
        Ok(count)
    }

    /// Sessions known to the host, as last published by the receive loop.
    ///
    /// Empty on clients and while stopped.
    pub fn peers(&self) -> Vec<PeerInfo> {
        self.running.as_ref()
            .map(|r| r.peers_rx.borrow().clone())
            .unwrap_or_default()
    }
}

impl Drop for NetworkManager {
    fn drop(&mut self) {
        self.stop();
    }
}

// =============================================================================
// RECEIVE LOOP
// =============================================================================

/// State moved onto the receive thread.
struct ReceiveLoop {
    transport: Transport,
    dispatcher: Dispatcher,
    shutdown: Arc<AtomicBool>,
    outbound_rx: mpsc::Receiver<Arc<[u8]>>,
    inbound_tx: mpsc::Sender<NetEvent>,
    peers_tx: watch::Sender<Vec<PeerInfo>>,
    recv_timeout: Duration,
    session_timeout: Option<Duration>,
}

impl ReceiveLoop {
    #[instrument(name = "receive_loop", skip(self), fields(player = %self.dispatcher.local_id(), local = %self.transport.local_addr()))]
    async fn run(mut self) {
        let mut last_sweep = Instant::now();

        loop {
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }

            tokio::select! {
                outbound = self.outbound_rx.recv() => match outbound {
                    Some(data) => {
                        let outgoing = self.dispatcher.route_local(data);
                        self.send_all(outgoing).await;
                    }
                    None => break,
                },
                received = self.transport.receive(self.recv_timeout) => match received {
                    Ok(Received::Datagram { data, from }) => self.handle_datagram(&data, from).await,
                    Ok(Received::Timeout) => {}
                    Err(e) => debug!("receive error: {}", e),
                },
            }

            if last_sweep.elapsed() >= self.recv_timeout {
                self.sweep_sessions();
                last_sweep = Instant::now();
            }
        }

        info!("receive loop exited");
    }

    async fn handle_datagram(&mut self, data: &[u8], from: SocketAddr) {
        #[cfg(feature = "debug-tracing")]
        tracing::trace!(%from, len = data.len(), "datagram {}", String::from_utf8_lossy(data));

        let dispatch = match self.dispatcher.handle_datagram(data, from, Instant::now()) {
            Ok(dispatch) => dispatch,
            Err(e) => {
                warn!(%from, "dropping datagram: {}", e);
                return;
            }
        };

        // Relay first, then hand the event to the game loop.
        self.send_all(dispatch.outgoing).await;
        for event in dispatch.events {
            self.enqueue(event);
        }
        if dispatch.peers_changed {
            self.publish_peers();
        }
    }

    async fn send_all(&self, outgoing: Vec<Outgoing>) {
        for Outgoing { data, to } in outgoing {
            if let Err(e) = self.transport.send_to(&data, to).await {
                warn!(%to, "send failed: {}", e);
            }
        }
    }

    fn enqueue(&self, event: NetEvent) {
        match self.inbound_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!("inbound queue full, dropping {:?}", event);
            }
            // Manager is shutting down.
            Err(TrySendError::Closed(_)) => {}
        }
    }

    fn sweep_sessions(&mut self) {
        let Some(timeout) = self.session_timeout else {
            return;
        };

        let evicted = self.dispatcher.evict_stale(Instant::now(), timeout);
        if evicted.is_empty() {
            return;
        }
        for event in evicted {
            self.enqueue(event);
        }
        self.publish_peers();
    }

    fn publish_peers(&self) {
        self.peers_tx.send_replace(self.dispatcher.registry().snapshot());
    }
}
