//! Message Dispatcher
//!
//! Classifies decoded datagrams and applies the host relay policy.
//! Pure with respect to I/O: it returns the datagrams to send and the
//! events to queue, and the receive loop performs both.
//!
//! ```text
//!            ┌────────── host ──────────┐
//!  A ──────► │ upsert A, relay ─────────┼──► B
//!            │            └─────────────┼──► C
//!            │ queue event for game loop│
//!            └──────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::core::PlayerId;
use crate::network::bridge::{GameStateProvider, NetEvent};
use crate::network::config::Role;
use crate::network::protocol::{DecodeError, Message};
use crate::network::session::{SessionRegistry, Upsert};

/// One datagram to put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    /// Encoded bytes, shared across every recipient of a fan-out.
    pub data: Arc<[u8]>,
    /// Destination.
    pub to: SocketAddr,
}

/// Everything one inbound datagram caused.
#[derive(Debug, Default)]
pub struct Dispatch {
    /// Relays and handshake replies, in send order.
    pub outgoing: Vec<Outgoing>,
    /// Events for the game loop, in arrival order.
    pub events: Vec<NetEvent>,
    /// The registry's (player, address) set changed.
    pub peers_changed: bool,
}

/// Inbound classification and relay policy for one participant.
pub struct Dispatcher {
    local_id: PlayerId,
    role: Role,
    registry: SessionRegistry,
    provider: Option<Arc<dyn GameStateProvider>>,
}

impl Dispatcher {
    /// Create a dispatcher for `local_id` acting as `role`.
    pub fn new(local_id: PlayerId, role: Role, provider: Option<Arc<dyn GameStateProvider>>) -> Self {
        Self {
            local_id,
            role,
            registry: SessionRegistry::new(),
            provider,
        }
    }

    /// Local participant id.
    pub fn local_id(&self) -> &PlayerId {
        &self.local_id
    }

    /// Session table (empty on clients).
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Decode and dispatch one datagram.
    pub fn handle_datagram(&mut self, data: &[u8], from: SocketAddr, now: Instant) -> Result<Dispatch, DecodeError> {
        let message = Message::decode(data)?;

        Ok(match self.role {
            Role::Host { .. } => self.dispatch_host(message, data, from, now),
            Role::Client { host_addr } => self.dispatch_client(message, from, host_addr),
        })
    }

    /// Destinations for an already-encoded message originated locally.
    ///
    /// Host: every session. Client: the host.
    pub fn route_local(&self, data: Arc<[u8]>) -> Vec<Outgoing> {
        match self.role {
            Role::Host { .. } => self.registry
                .addrs_except(Some(&self.local_id))
                .map(|to| Outgoing { data: data.clone(), to })
                .collect(),
            Role::Client { host_addr } => vec![Outgoing { data, to: host_addr }],
        }
    }

    /// Evict sessions silent for longer than `timeout` (host only).
    pub fn evict_stale(&mut self, now: Instant, timeout: Duration) -> Vec<NetEvent> {
        self.registry.evict_stale(now, timeout)
            .into_iter()
            .map(|player_id| {
                info!(player = %player_id, "session timed out");
                NetEvent::PeerTimedOut { player_id }
            })
            .collect()
    }

    fn dispatch_host(&mut self, message: Message, raw: &[u8], from: SocketAddr, now: Instant) -> Dispatch {
        let mut dispatch = Dispatch::default();

        let sender = match message.sender() {
            Some(id) => id.clone(),
            None => {
                warn!(%from, "dropping {} sent to the host", message.kind());
                return dispatch;
            }
        };

        if sender == self.local_id {
            warn!(%from, "dropping {} carrying the host's own id", message.kind());
            return dispatch;
        }

        let upsert = self.registry.upsert(&sender, from, now);
        dispatch.peers_changed = upsert.changed_membership();

        match upsert {
            Upsert::Inserted => {
                info!(player = %sender, %from, "player connected");
                dispatch.events.push(NetEvent::PeerConnected { player_id: sender.clone(), addr: from });
            }
            Upsert::Moved { previous } => {
                info!(player = %sender, %previous, %from, "player address changed");
                dispatch.events.push(NetEvent::PeerConnected { player_id: sender.clone(), addr: from });
            }
            Upsert::Refreshed => {}
        }

        if let Message::Connect { .. } = message {
            if let Some(reply) = self.game_state_reply(from) {
                dispatch.outgoing.push(reply);
            }
            return dispatch;
        }

        // Relay the original bytes; re-encoding could change them.
        let data: Arc<[u8]> = Arc::from(raw);
        dispatch.outgoing.extend(
            self.registry
                .addrs_except(Some(&sender))
                .map(|to| Outgoing { data: data.clone(), to }),
        );

        dispatch.events.extend(into_event(message));
        dispatch
    }

    fn dispatch_client(&mut self, message: Message, from: SocketAddr, host_addr: SocketAddr) -> Dispatch {
        let mut dispatch = Dispatch::default();

        if from != host_addr {
            debug!(%from, "dropping {} from a non-host address", message.kind());
            return dispatch;
        }

        if message.sender() == Some(&self.local_id) {
            warn!("dropping echoed {}", message.kind());
            return dispatch;
        }

        dispatch.events.extend(into_event(message));
        dispatch
    }

    fn game_state_reply(&self, to: SocketAddr) -> Option<Outgoing> {
        let provider = self.provider.as_ref()?;
        let message = Message::GameState { payload: provider.get_game_state() };

        match message.encode() {
            Ok(bytes) => Some(Outgoing { data: bytes.into(), to }),
            Err(e) => {
                warn!(%to, "cannot send game state: {}", e);
                None
            }
        }
    }
}

/// Game-loop event for a decoded message. `Connect` has none.
fn into_event(message: Message) -> Option<NetEvent> {
    match message {
        Message::Connect { .. } => None,
        Message::PlayerUpdate { player_id, position, rotation } => {
            Some(NetEvent::PlayerUpdate { player_id, position, rotation })
        }
        Message::Shoot { player_id, position, direction } => {
            Some(NetEvent::Shoot { player_id, position, direction })
        }
        Message::Damage { from_player, target_id, amount } => {
            Some(NetEvent::Damage { from_player, target_id, amount })
        }
        Message::GameState { payload } => Some(NetEvent::GameState { payload }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Vec3;
    use serde_json::json;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    const HOST: u16 = 5555;
    const A: u16 = 4001;
    const B: u16 = 4002;
    const C: u16 = 4003;

    fn host(provider: Option<Arc<dyn GameStateProvider>>) -> Dispatcher {
        Dispatcher::new(PlayerId::new("H001"), Role::Host { bind_addr: addr(HOST) }, provider)
    }

    fn client(id: &str) -> Dispatcher {
        Dispatcher::new(PlayerId::new(id), Role::Client { host_addr: addr(HOST) }, None)
    }

    fn bytes(message: &Message) -> Vec<u8> {
        message.encode().unwrap()
    }

    fn connect(id: &str) -> Vec<u8> {
        bytes(&Message::Connect { player_id: PlayerId::new(id) })
    }

    fn update(id: &str) -> Message {
        Message::PlayerUpdate {
            player_id: PlayerId::new(id),
            position: Vec3::new(1.0, 0.0, 2.0),
            rotation: Vec3::new(0.0, 90.0, 0.0),
        }
    }

    fn register_abc(dispatcher: &mut Dispatcher) {
        let now = Instant::now();
        for (id, port) in [("A", A), ("B", B), ("C", C)] {
            dispatcher.handle_datagram(&connect(id), addr(port), now).unwrap();
        }
    }

    fn targets(dispatch: &Dispatch) -> Vec<SocketAddr> {
        let mut to: Vec<_> = dispatch.outgoing.iter().map(|o| o.to).collect();
        to.sort();
        to
    }

    #[test]
    fn test_host_relays_to_everyone_but_sender() {
        let mut host = host(None);
        register_abc(&mut host);

        let raw = bytes(&update("A"));
        let dispatch = host.handle_datagram(&raw, addr(A), Instant::now()).unwrap();

        assert_eq!(targets(&dispatch), vec![addr(B), addr(C)]);
        assert!(dispatch.outgoing.iter().all(|o| &*o.data == raw.as_slice()));
        assert_eq!(dispatch.events, vec![NetEvent::PlayerUpdate {
            player_id: PlayerId::new("A"),
            position: Vec3::new(1.0, 0.0, 2.0),
            rotation: Vec3::new(0.0, 90.0, 0.0),
        }]);
    }

    #[test]
    fn test_relay_is_verbatim() {
        let mut host = host(None);
        register_abc(&mut host);

        // Formatting a re-encode would normalize: spaces, integer floats.
        let raw = br#"{ "type": "shoot", "player_id": "B", "position": [0, 1, 0], "direction": [1, 0, 0] }"#;
        let dispatch = host.handle_datagram(raw, addr(B), Instant::now()).unwrap();

        assert_eq!(targets(&dispatch), vec![addr(A), addr(C)]);
        assert!(dispatch.outgoing.iter().all(|o| &*o.data == &raw[..]));
    }

    #[test]
    fn test_damage_relayed_and_keyed_by_from_player() {
        let mut host = host(None);
        register_abc(&mut host);

        let raw = bytes(&Message::Damage {
            from_player: PlayerId::new("C"),
            target_id: PlayerId::new("H001"),
            amount: 10.0,
        });
        let dispatch = host.handle_datagram(&raw, addr(C), Instant::now()).unwrap();

        assert_eq!(targets(&dispatch), vec![addr(A), addr(B)]);
        assert_eq!(dispatch.events, vec![NetEvent::Damage {
            from_player: PlayerId::new("C"),
            target_id: PlayerId::new("H001"),
            amount: 10.0,
        }]);
    }

    #[test]
    fn test_connect_is_not_relayed() {
        let mut host = host(None);
        register_abc(&mut host);

        let dispatch = host.handle_datagram(&connect("D"), addr(4004), Instant::now()).unwrap();
        assert!(dispatch.outgoing.is_empty());
        assert!(dispatch.peers_changed);
        assert_eq!(dispatch.events, vec![NetEvent::PeerConnected {
            player_id: PlayerId::new("D"),
            addr: addr(4004),
        }]);
        assert_eq!(host.registry().lookup(&PlayerId::new("D")), Some(addr(4004)));
    }

    #[test]
    fn test_connect_sends_game_state_to_new_session_only() {
        let provider: Arc<dyn GameStateProvider> = Arc::new(|| json!({ "enemies": 4 }));
        let mut host = host(Some(provider));
        register_abc(&mut host);

        let dispatch = host.handle_datagram(&connect("C002"), addr(4010), Instant::now()).unwrap();
        assert_eq!(dispatch.outgoing.len(), 1);
        assert_eq!(dispatch.outgoing[0].to, addr(4010));
        assert_eq!(
            Message::decode(&dispatch.outgoing[0].data).unwrap(),
            Message::GameState { payload: json!({ "enemies": 4 }) },
        );
    }

    #[test]
    fn test_repeated_connect_same_address_is_quiet() {
        let mut host = host(None);
        let first = host.handle_datagram(&connect("C002"), addr(A), Instant::now()).unwrap();
        let before = host.registry().snapshot();
        let second = host.handle_datagram(&connect("C002"), addr(A), Instant::now()).unwrap();

        assert!(first.peers_changed);
        assert!(!second.peers_changed);
        assert!(second.events.is_empty());
        assert_eq!(host.registry().snapshot(), before);
    }

    #[test]
    fn test_later_connect_wins() {
        let mut host = host(None);
        host.handle_datagram(&connect("C002"), addr(A), Instant::now()).unwrap();
        let dispatch = host.handle_datagram(&connect("C002"), addr(B), Instant::now()).unwrap();

        assert!(dispatch.peers_changed);
        assert_eq!(host.registry().lookup(&PlayerId::new("C002")), Some(addr(B)));
        assert_eq!(host.registry().len(), 1);
    }

    #[test]
    fn test_update_without_connect_registers_sender() {
        let mut host = host(None);
        let dispatch = host.handle_datagram(&bytes(&update("C002")), addr(A), Instant::now()).unwrap();

        assert_eq!(host.registry().lookup(&PlayerId::new("C002")), Some(addr(A)));
        assert_eq!(dispatch.events.len(), 2);
        assert!(matches!(dispatch.events[0], NetEvent::PeerConnected { .. }));
        assert!(matches!(dispatch.events[1], NetEvent::PlayerUpdate { .. }));
    }

    #[test]
    fn test_host_drops_own_id() {
        let mut host = host(None);
        register_abc(&mut host);

        let dispatch = host.handle_datagram(&bytes(&update("H001")), addr(A), Instant::now()).unwrap();
        assert!(dispatch.outgoing.is_empty());
        assert!(dispatch.events.is_empty());
        assert!(host.registry().lookup(&PlayerId::new("H001")).is_none());
    }

    #[test]
    fn test_host_drops_game_state() {
        let mut host = host(None);
        register_abc(&mut host);

        let raw = bytes(&Message::GameState { payload: json!(null) });
        let dispatch = host.handle_datagram(&raw, addr(A), Instant::now()).unwrap();
        assert!(dispatch.outgoing.is_empty());
        assert!(dispatch.events.is_empty());
    }

    #[test]
    fn test_decode_error_leaves_state_untouched() {
        let mut host = host(None);
        register_abc(&mut host);

        assert!(host.handle_datagram(b"{not json", addr(A), Instant::now()).is_err());
        assert_eq!(host.registry().len(), 3);
    }

    #[test]
    fn test_host_route_local_fans_out() {
        let mut host = host(None);
        register_abc(&mut host);

        let outgoing = host.route_local(Arc::from(bytes(&update("H001"))));
        let mut to: Vec<_> = outgoing.iter().map(|o| o.to).collect();
        to.sort();
        assert_eq!(to, vec![addr(A), addr(B), addr(C)]);
    }

    #[test]
    fn test_host_route_local_without_sessions() {
        let host = host(None);
        assert!(host.route_local(Arc::from(bytes(&update("H001")))).is_empty());
    }

    #[test]
    fn test_client_routes_to_host_only() {
        let client = client("C002");
        let outgoing = client.route_local(Arc::from(bytes(&update("C002"))));
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].to, addr(HOST));
    }

    #[test]
    fn test_client_never_relays() {
        let mut client = client("C002");
        let dispatch = client.handle_datagram(&bytes(&update("C003")), addr(HOST), Instant::now()).unwrap();

        assert!(dispatch.outgoing.is_empty());
        assert_eq!(dispatch.events.len(), 1);
        assert!(client.registry().is_empty());
    }

    #[test]
    fn test_client_ignores_strangers_and_echoes() {
        let mut client = client("C002");

        let stranger = client.handle_datagram(&bytes(&update("C003")), addr(A), Instant::now()).unwrap();
        assert!(stranger.events.is_empty());

        let echo = client.handle_datagram(&bytes(&update("C002")), addr(HOST), Instant::now()).unwrap();
        assert!(echo.events.is_empty());

        let announce = client.handle_datagram(&connect("H001"), addr(HOST), Instant::now()).unwrap();
        assert!(announce.events.is_empty());
    }

    #[test]
    fn test_client_surfaces_game_state() {
        let mut client = client("C002");
        let raw = bytes(&Message::GameState { payload: json!({ "wave": 2 }) });
        let dispatch = client.handle_datagram(&raw, addr(HOST), Instant::now()).unwrap();

        assert_eq!(dispatch.events, vec![NetEvent::GameState { payload: json!({ "wave": 2 }) }]);
    }

    #[test]
    fn test_evict_stale_emits_timeouts() {
        let mut host = host(None);
        let start = Instant::now();
        host.handle_datagram(&connect("A"), addr(A), start).unwrap();

        let events = host.evict_stale(start + Duration::from_secs(11), Duration::from_secs(10));
        assert_eq!(events, vec![NetEvent::PeerTimedOut { player_id: PlayerId::new("A") }]);
        assert!(host.registry().is_empty());
    }
}
