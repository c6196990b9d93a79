//! Skirmish Net demo peer
//!
//! Headless participant that walks a circle, fires now and then, and logs
//! everything it hears. Run one as host and one or more as clients:
//!
//! ```text
//! SKIRMISH_ROLE=host   cargo run
//! SKIRMISH_ROLE=client SKIRMISH_HOST=127.0.0.1 cargo run
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use anyhow::Context;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use skirmish_net::{
    DEFAULT_PORT, VERSION,
    core::{PlayerId, Vec3},
    network::{GameStateBridge, GameStatePayload, NetConfig, NetworkManager, Role},
};

/// Demo tick rate (Hz)
const TICK_RATE: u32 = 20;

/// Ticks between shots.
const FIRE_EVERY: u64 = 40;

/// Ticks between damage reports against the last player heard from.
const DAMAGE_EVERY: u64 = 100;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    let run_for = std::env::var("SKIRMISH_DEMO_SECS").ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(30));

    info!("Skirmish Net v{}", VERSION);
    info!("Default port: {}, tick rate: {} Hz", DEFAULT_PORT, TICK_RATE);

    let role = Role::from_env().context("invalid network role")?;
    let started = Instant::now();

    let mut manager = NetworkManager::new(NetConfig::from_env())
        .with_state_provider(Arc::new(move || json!({
            "uptime_ms": started.elapsed().as_millis() as u64,
        })));

    let local_addr = manager.start(role).context("failed to start network")?;
    info!("Player {} listening on {}", manager.player_id(), local_addr);

    if !role.is_host() {
        manager.send_connect()?;
    }

    let mut bridge = LoggingBridge::default();
    let tick = Duration::from_secs(1) / TICK_RATE;
    let mut t: u64 = 0;

    while started.elapsed() < run_for {
        let frame_start = Instant::now();

        manager.poll(&mut bridge)?;

        let angle = t as f32 / TICK_RATE as f32;
        let position = Vec3::new(5.0 * angle.cos(), 0.0, 5.0 * angle.sin());
        let rotation = Vec3::new(0.0, angle.to_degrees() % 360.0, 0.0);
        manager.send_player_update(position, rotation)?;

        if t % FIRE_EVERY == 0 {
            manager.send_shoot(position, Vec3::new(-angle.sin(), 0.0, angle.cos()))?;
        }

        if t % DAMAGE_EVERY == 0 {
            if let Some(target) = bridge.last_heard.clone() {
                manager.send_damage(&target, 10.0)?;
            }
        }

        if role.is_host() && t % (TICK_RATE as u64 * 5) == 0 {
            info!("Tick {}: {} connected", t, manager.peers().len());
        }

        t += 1;
        if let Some(rest) = tick.checked_sub(frame_start.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    manager.stop();
    info!(
        "Done after {} ticks: {} updates, {} shots, {} damage",
        t, bridge.updates, bridge.shots, bridge.damage,
    );
    Ok(())
}

/// Logs callbacks and counts what it saw.
#[derive(Default)]
struct LoggingBridge {
    last_heard: Option<PlayerId>,
    updates: u64,
    shots: u64,
    damage: u64,
}

impl GameStateBridge for LoggingBridge {
    fn on_player_update(&mut self, player_id: &PlayerId, position: Vec3, _rotation: Vec3) {
        self.updates += 1;
        // Position updates arrive every tick; only log a sample.
        if self.updates % 100 == 1 {
            info!("Player {} at {:?}", player_id, position);
        }
        self.last_heard = Some(player_id.clone());
    }

    fn on_shoot(&mut self, player_id: &PlayerId, position: Vec3, direction: Vec3) {
        self.shots += 1;
        info!("Player {} fired from {:?} towards {:?}", player_id, position, direction);
    }

    fn on_damage(&mut self, from_player: &PlayerId, target_id: &PlayerId, amount: f32) {
        self.damage += 1;
        info!("Player {} hit {} for {}", from_player, target_id, amount);
    }

    fn on_game_state(&mut self, payload: &GameStatePayload) {
        info!("Received game state: {}", payload);
    }

    fn on_peer_connected(&mut self, player_id: &PlayerId, addr: SocketAddr) {
        info!("Player {} joined from {}", player_id, addr);
    }

    fn on_peer_timed_out(&mut self, player_id: &PlayerId) {
        warn!("Player {} timed out", player_id);
        if self.last_heard.as_ref() == Some(player_id) {
            self.last_heard = None;
        }
    }
}
