//! Per-frame session orchestration.
//!
//! [`Session::frame`] runs the whole local pipeline once per display frame:
//! inbound network packets, physics results, watchdog, toggles, movement
//! intent, action resolution and the outbound diff. It never waits on the
//! physics thread or the socket.

use crate::character::LocalCharacter;
use crate::connection::{Connection, ConnectionEvent, ConnectionState, Connector, InactivityWatchdog};
use crate::input::InputFrame;
use crate::roster::Roster;
use crate::sync::Synchronizer;
use log::{debug, info, warn};
use physics::service::{PhysicsEvent, PhysicsHandle, PhysicsRequest};
use shared::Packet;
use std::time::Instant;

/// Collider wireframe last received from physics.
#[derive(Debug, Clone, Default)]
pub struct DebugGeometry {
    pub vertices: Vec<[f32; 3]>,
    pub colors: Vec<[f32; 4]>,
}

pub struct Session<C: Connector> {
    connector: C,
    connection: Connection,
    physics: PhysicsHandle,
    roster: Roster,
    sync: Synchronizer,
    watchdog: InactivityWatchdog,
    physics_ready: bool,
    debug_physics: bool,
    debug_geometry: Option<DebugGeometry>,
}

impl<C: Connector> Session<C> {
    pub fn new(mut connector: C, physics: PhysicsHandle, sync: Synchronizer) -> Self {
        let connection = connector.connect();
        Self {
            connector,
            connection,
            physics,
            roster: Roster::new(),
            sync,
            watchdog: InactivityWatchdog::default(),
            physics_ready: false,
            debug_physics: false,
            debug_geometry: None,
        }
    }

    pub fn set_watchdog(&mut self, watchdog: InactivityWatchdog) {
        self.watchdog = watchdog;
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Disconnected with nothing pending; the user may reconnect.
    pub fn can_reconnect(&self) -> bool {
        self.connection.state() == ConnectionState::Closed
    }

    pub fn physics_ready(&self) -> bool {
        self.physics_ready
    }

    pub fn debug_physics(&self) -> bool {
        self.debug_physics
    }

    pub fn set_debug_physics(&mut self, enabled: bool) {
        self.debug_physics = enabled;
        if !enabled {
            self.debug_geometry = None;
        }
    }

    pub fn debug_geometry(&self) -> Option<&DebugGeometry> {
        self.debug_geometry.as_ref()
    }

    pub fn frame(&mut self, input: &InputFrame, dt: f32, now: Instant) {
        self.process_connection(now);
        self.process_physics();

        if input.activity {
            self.watchdog.touch(now);
        }
        if self.watchdog.poll(now) {
            info!("No input for {:?}, closing connection", crate::connection::INACTIVITY_TIMEOUT);
            self.connection.close();
        }

        if input.reconnect && self.can_reconnect() {
            self.reconnect();
        }

        if let Some(local) = self.roster.local_mut() {
            drive_local(local, input, dt, now, &mut self.sync, &self.connection, &self.physics);
            local.advance_clips(dt);
        }
        for remote in self.roster.remotes_mut() {
            remote.advance_clips(dt);
        }

        self.physics.send(PhysicsRequest::Step);
        if self.debug_physics {
            self.physics.send(PhysicsRequest::DebugGeometry);
        }
    }

    fn process_connection(&mut self, now: Instant) {
        for event in self.connection.drain() {
            match event {
                ConnectionEvent::Opened => {
                    info!("Connection open");
                    self.watchdog.arm(now);
                }
                ConnectionEvent::Packet(packet) => {
                    self.sync
                        .apply_inbound(packet, &mut self.roster, &self.physics, now);
                }
                ConnectionEvent::Closed => {
                    warn!("Connection closed, press R to reconnect");
                    self.watchdog.disarm();
                    for id in self.roster.clear_remotes() {
                        self.physics.send(PhysicsRequest::RemoveRigidBody { id });
                    }
                }
            }
        }
    }

    fn process_physics(&mut self) {
        for event in self.physics.drain_events() {
            match event {
                PhysicsEvent::Ready => {
                    info!("Physics ready");
                    self.physics_ready = true;
                }
                PhysicsEvent::MovementApplied {
                    id,
                    translation,
                    grounded,
                } => match self.roster.local_mut() {
                    Some(local) if *local.id() == id => local.apply_movement(translation, grounded),
                    _ => debug!("Movement result for non-local {}", id),
                },
                PhysicsEvent::RotationApplied { id, rotation } => {
                    if let Some(local) = self.roster.local_mut().filter(|l| *l.id() == id) {
                        local.apply_rotation(rotation);
                    }
                }
                PhysicsEvent::PositionUpdated {
                    id,
                    position,
                    rotation,
                } => {
                    if let Some(remote) = self.roster.remote_mut(&id) {
                        remote.apply_network_pose(position, rotation);
                    }
                }
                PhysicsEvent::DebugGeometry { vertices, colors } => {
                    if self.debug_physics {
                        self.debug_geometry = Some(DebugGeometry { vertices, colors });
                    }
                }
            }
        }
    }

    /// Discards every character, local included, and opens a new connection.
    pub fn reconnect(&mut self) {
        info!("Reconnecting");
        for id in self.roster.clear_all() {
            self.physics.send(PhysicsRequest::RemoveRigidBody { id });
        }
        self.sync.reset();
        self.connection = self.connector.connect();
    }

    pub fn shutdown(mut self) {
        self.connection.close();
        self.physics.shutdown();
    }
}

fn send(connection: &Connection, packet: &Packet) {
    if !connection.is_open() {
        return;
    }
    if let Err(e) = connection.send(packet) {
        warn!("Failed to send packet: {}", e);
    }
}

fn drive_local(
    local: &mut LocalCharacter,
    input: &InputFrame,
    dt: f32,
    now: Instant,
    sync: &mut Synchronizer,
    connection: &Connection,
    physics: &PhysicsHandle,
) {
    let (dx, dy) = input.look_delta;
    local.camera.pointer_moved(dx, dy, input.touch);

    if input.toggle_run {
        local.run = !local.run;
    }
    if input.toggle_holding {
        local.holding = !local.holding;
    }
    if input.toggle_view {
        let facing = local.state.rotation;
        if local.camera.is_first_person() {
            local.camera.enter_third_person(&facing);
            let reset = sync.reset_look(local);
            send(connection, &reset);
        } else {
            local.camera.enter_first_person(&facing);
        }
    }

    if local.camera.is_first_person() && dy != 0.0 && connection.is_open() {
        if let Some(packet) = sync.outbound_look(local, dy, input.touch, now) {
            send(connection, &packet);
        }
    }

    let intent = local.movement_intent(input, dt);
    physics.send(PhysicsRequest::ApplyMovement {
        id: local.id().clone(),
        intent,
    });

    local.update_action(input, now);

    if connection.is_open() {
        if let Some(packet) = sync.outbound_move(local) {
            send(connection, &packet);
        }
    }
}
