//! Network synchronizer.
//!
//! Outbound traffic runs on two independent channels:
//!
//! - [`TransformChannel`]: a full `move` whenever position, orientation or
//!   action differ from the last broadcast beyond tolerance. Not rate capped.
//! - [`LookChannel`]: first-person head pitch, sent only when the change
//!   clears a threshold and a minimum interval has passed since the last send.
//!
//! Inbound packets are applied by [`Synchronizer::apply_inbound`], which keeps
//! the [`Roster`] and the physics thread's bodies in step with each other.

use crate::animation::Crossfade;
use crate::character::{LocalCharacter, RemoteCharacter};
use crate::roster::Roster;
use log::{debug, info};
use nalgebra::{UnitQuaternion, Vector3};
use physics::service::{PhysicsHandle, PhysicsRequest};
use shared::{Action, Locomotion, Packet, PlayerId, PlayerSnapshot, SPAWN_POSITION};
use std::f32::consts::FRAC_PI_4;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncTuning {
    /// Per-axis position tolerance.
    pub position_tolerance: f32,
    /// Per-component quaternion tolerance.
    pub quaternion_tolerance: f32,
    pub max_look_pitch: f32,
    pub look_threshold: f32,
    pub look_interval: Duration,
    /// Radians of pitch per pixel of pointer movement.
    pub look_speed: f32,
    pub touch_look_multiplier: f32,
}

impl Default for SyncTuning {
    fn default() -> Self {
        Self {
            position_tolerance: 0.1,
            quaternion_tolerance: 0.01,
            max_look_pitch: FRAC_PI_4,
            look_threshold: 0.01,
            look_interval: Duration::from_micros(1_000_000 / 15),
            look_speed: 0.0005,
            touch_look_multiplier: 3.0,
        }
    }
}

pub fn spawn_point() -> Vector3<f32> {
    Vector3::from(SPAWN_POSITION)
}

/// Last broadcast pose and action
#[derive(Debug, Clone, Default)]
pub struct TransformChannel {
    position: Option<Vector3<f32>>,
    rotation: Option<UnitQuaternion<f32>>,
    action: Option<Action>,
}

impl TransformChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the `move` to broadcast, if anything changed. Position and
    /// rotation snapshots follow every send; the action only when it changed.
    pub fn diff(
        &mut self,
        tuning: &SyncTuning,
        id: &PlayerId,
        position: Vector3<f32>,
        rotation: UnitQuaternion<f32>,
        action: Action,
    ) -> Option<Packet> {
        let moved = self.position.map_or(true, |last| {
            (position - last)
                .iter()
                .any(|d| d.abs() > tuning.position_tolerance)
        });
        let turned = self.rotation.map_or(true, |last| {
            (rotation.coords - last.coords)
                .iter()
                .any(|d| d.abs() > tuning.quaternion_tolerance)
        });
        let acted = self.action != Some(action);

        if !(moved || turned || acted) {
            return None;
        }

        self.position = Some(position);
        self.rotation = Some(rotation);
        if acted {
            self.action = Some(action);
        }

        Some(Packet::Move {
            id: id.clone(),
            position: position.into(),
            quaternion: rotation.into(),
            action: action.to_string(),
        })
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Head pitch state plus the rate gate for `neckRotationX`
#[derive(Debug, Clone)]
pub struct LookChannel {
    initial: f32,
    pitch: f32,
    last_sent: Option<f32>,
    last_sent_at: Option<Instant>,
}

impl Default for LookChannel {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl LookChannel {
    pub fn new(initial: f32) -> Self {
        Self {
            initial,
            pitch: initial,
            last_sent: None,
            last_sent_at: None,
        }
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Folds in a vertical pointer delta; moving down pitches the head down
    /// (negative). Returns the pitch to send when both
    /// the threshold and the interval gate pass.
    pub fn sample(&mut self, tuning: &SyncTuning, dy: f32, touch: bool, now: Instant) -> Option<f32> {
        let speed = if touch {
            tuning.look_speed * tuning.touch_look_multiplier
        } else {
            tuning.look_speed
        };
        self.pitch = (self.pitch - dy * speed).clamp(-tuning.max_look_pitch, tuning.max_look_pitch);

        let changed = self
            .last_sent
            .map_or(true, |last| (self.pitch - last).abs() > tuning.look_threshold);
        let due = self
            .last_sent_at
            .map_or(true, |at| now.duration_since(at) >= tuning.look_interval);

        if changed && due {
            self.last_sent = Some(self.pitch);
            self.last_sent_at = Some(now);
            Some(self.pitch)
        } else {
            None
        }
    }

    /// Back to the initial pitch. The caller sends the result unconditionally.
    pub fn reset(&mut self) -> f32 {
        self.pitch = self.initial;
        self.last_sent = Some(self.initial);
        self.pitch
    }
}

pub struct Synchronizer {
    tuning: SyncTuning,
    locomotion: Locomotion,
    transform: TransformChannel,
    look: LookChannel,
}

impl Default for Synchronizer {
    fn default() -> Self {
        Self::new(SyncTuning::default(), Locomotion::default())
    }
}

impl Synchronizer {
    pub fn new(tuning: SyncTuning, locomotion: Locomotion) -> Self {
        Self {
            tuning,
            locomotion,
            transform: TransformChannel::new(),
            look: LookChannel::default(),
        }
    }

    /// Forgets everything sent so far. Used when a new identity is assigned.
    pub fn reset(&mut self) {
        self.transform.reset();
        self.look = LookChannel::default();
    }

    pub fn outbound_move(&mut self, local: &LocalCharacter) -> Option<Packet> {
        self.transform.diff(
            &self.tuning,
            local.id(),
            local.state.position,
            local.state.rotation,
            local.state.action,
        )
    }

    /// Samples the look channel; updates the character's pitch either way.
    pub fn outbound_look(
        &mut self,
        local: &mut LocalCharacter,
        dy: f32,
        touch: bool,
        now: Instant,
    ) -> Option<Packet> {
        let sent = self.look.sample(&self.tuning, dy, touch, now);
        local.state.neck_pitch = self.look.pitch();
        sent.map(|pitch| Packet::NeckRotationX {
            id: local.id().clone(),
            neck_rotation_x: pitch,
        })
    }

    pub fn reset_look(&mut self, local: &mut LocalCharacter) -> Packet {
        let pitch = self.look.reset();
        local.state.neck_pitch = pitch;
        Packet::NeckRotationX {
            id: local.id().clone(),
            neck_rotation_x: pitch,
        }
    }

    /// Applies one server packet. Returns the crossfade a remote `move`
    /// started, if any.
    pub fn apply_inbound(
        &mut self,
        packet: Packet,
        roster: &mut Roster,
        physics: &PhysicsHandle,
        now: Instant,
    ) -> Option<Crossfade> {
        match packet {
            Packet::AssignId { id } => {
                if let Some(previous) = roster.assign_local(LocalCharacter::new(id.clone(), spawn_point(), now)) {
                    if previous.state.id != id {
                        physics.send(PhysicsRequest::RemoveRigidBody {
                            id: previous.state.id,
                        });
                    }
                }
                self.reset();
                physics.send(PhysicsRequest::CreateCharacter {
                    id,
                    position: spawn_point(),
                    rotation: UnitQuaternion::identity(),
                    locomotion: self.locomotion,
                });
                None
            }
            Packet::NewPlayer { id } => {
                self.spawn_remote(roster, physics, id, spawn_point(), UnitQuaternion::identity());
                None
            }
            Packet::ExistingPlayers { players } => {
                info!("Received {} existing players", players.len());
                for PlayerSnapshot {
                    id,
                    position,
                    quaternion,
                } in players
                {
                    self.spawn_remote(roster, physics, id, position.into(), quaternion.to_unit());
                }
                None
            }
            Packet::PlayerLeft { id } => {
                if roster.remove(&id) {
                    info!("Player {} left", id);
                    physics.send(PhysicsRequest::RemoveRigidBody { id });
                } else {
                    debug!("playerLeft for unknown id {}", id);
                }
                None
            }
            Packet::Move {
                id,
                position,
                quaternion,
                action,
            } => {
                let Some(remote) = roster.remote_mut(&id) else {
                    debug!("Ignoring move for {}", id);
                    return None;
                };
                physics.send(PhysicsRequest::UpdatePosition {
                    id,
                    position: position.into(),
                    rotation: quaternion.to_unit(),
                });
                match Action::from_label(&action) {
                    Some(action) => remote.play(action),
                    None => {
                        debug!("Unknown action label {:?}", action);
                        None
                    }
                }
            }
            Packet::NeckRotationX {
                id,
                neck_rotation_x,
            } => {
                match roster.remote_mut(&id) {
                    Some(remote) => remote.set_neck_pitch(neck_rotation_x),
                    None => debug!("Ignoring neckRotationX for {}", id),
                }
                None
            }
        }
    }

    fn spawn_remote(
        &self,
        roster: &mut Roster,
        physics: &PhysicsHandle,
        id: PlayerId,
        position: Vector3<f32>,
        rotation: UnitQuaternion<f32>,
    ) {
        if !roster.add_remote(RemoteCharacter::new(id.clone(), position, rotation)) {
            return;
        }
        physics.send(PhysicsRequest::CreateCharacter {
            id,
            position,
            rotation,
            locomotion: self.locomotion,
        });
    }
}
