use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{AsRefStr, Display, EnumString};
use thiserror::Error;

pub const GRAVITY: f32 = -29.43;
pub const PLAYER_HEIGHT: f32 = 3.35;
pub const CAPSULE_RADIUS: f32 = 0.65;
pub const WALK_SPEED: f32 = 6.0;
pub const RUN_SPEED: f32 = 12.0;
pub const JUMP_IMPULSE: f32 = 15.0;
pub const SPAWN_POSITION: [f32; 3] = [0.0, 8.0, 0.0];

/// Per-character movement tuning, copied into the physics thread on creation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Locomotion {
    pub radius: f32,
    /// Full standing height, hemispheres included.
    pub height: f32,
    pub walk_speed: f32,
    pub run_speed: f32,
    pub jump_impulse: f32,
    pub gravity: f32,
}

impl Default for Locomotion {
    fn default() -> Self {
        Self {
            radius: CAPSULE_RADIUS,
            height: PLAYER_HEIGHT,
            walk_speed: WALK_SPEED,
            run_speed: RUN_SPEED,
            jump_impulse: JUMP_IMPULSE,
            gravity: GRAVITY,
        }
    }
}

impl Locomotion {
    /// Length of the capsule's cylindrical section.
    pub fn capsule_height(&self) -> f32 {
        (self.height - 2.0 * self.radius).max(0.0)
    }

    pub fn speed(&self, run: bool) -> f32 {
        if run {
            self.run_speed
        } else {
            self.walk_speed
        }
    }
}

/// Server-assigned identity. The relay may hand out numbers or strings; both
/// are echoed back unchanged.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(untagged)]
pub enum PlayerId {
    Number(u64),
    Text(String),
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerId::Number(n) => write!(f, "{}", n),
            PlayerId::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for PlayerId {
    fn from(n: u64) -> Self {
        PlayerId::Number(n)
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        PlayerId::Text(s.to_string())
    }
}

/// Animation/action labels. The string form is what travels on the wire and
/// what the animation clips are named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr, Display)]
pub enum Action {
    Idle,
    #[strum(serialize = "Idle_Holding")]
    IdleHolding,
    Walk,
    #[strum(serialize = "Walk_Holding")]
    WalkHolding,
    Run,
    #[strum(serialize = "Run_Holding")]
    RunHolding,
    #[strum(serialize = "Jump_Idle")]
    JumpIdle,
    Yes,
    No,
    Wave,
}

impl Action {
    pub fn idle(holding: bool) -> Self {
        if holding {
            Action::IdleHolding
        } else {
            Action::Idle
        }
    }

    pub fn locomotion(run: bool, holding: bool) -> Self {
        match (run, holding) {
            (true, true) => Action::RunHolding,
            (true, false) => Action::Run,
            (false, true) => Action::WalkHolding,
            (false, false) => Action::Walk,
        }
    }

    pub fn is_gesture(self) -> bool {
        matches!(self, Action::Yes | Action::No | Action::Wave)
    }

    /// Parses a wire label, `None` for anything outside the known clip set.
    pub fn from_label(label: &str) -> Option<Self> {
        label.parse().ok()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct WireVec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl From<Vector3<f32>> for WireVec3 {
    fn from(v: Vector3<f32>) -> Self {
        Self {
            x: v.x,
            y: v.y,
            z: v.z,
        }
    }
}

impl From<WireVec3> for Vector3<f32> {
    fn from(v: WireVec3) -> Self {
        Vector3::new(v.x, v.y, v.z)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct WireQuat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for WireQuat {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }
}

impl From<UnitQuaternion<f32>> for WireQuat {
    fn from(q: UnitQuaternion<f32>) -> Self {
        Self {
            x: q.i,
            y: q.j,
            z: q.k,
            w: q.w,
        }
    }
}

impl WireQuat {
    /// Degenerate (zero-length or NaN) quaternions from the wire collapse to identity.
    pub fn to_unit(self) -> UnitQuaternion<f32> {
        UnitQuaternion::try_new(Quaternion::new(self.w, self.x, self.y, self.z), 1.0e-6)
            .filter(|q| q.coords.iter().all(|c| c.is_finite()))
            .unwrap_or_else(UnitQuaternion::identity)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    #[serde(default)]
    pub position: WireVec3,
    #[serde(default)]
    pub quaternion: WireQuat,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Packet {
    AssignId {
        id: PlayerId,
    },
    NewPlayer {
        id: PlayerId,
    },
    ExistingPlayers {
        players: Vec<PlayerSnapshot>,
    },
    PlayerLeft {
        id: PlayerId,
    },
    Move {
        id: PlayerId,
        position: WireVec3,
        quaternion: WireQuat,
        action: String,
    },
    NeckRotationX {
        id: PlayerId,
        #[serde(rename = "neckRotationX")]
        neck_rotation_x: f32,
    },
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed packet: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl Packet {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}
