//! Turns held keys and the camera into a movement intent for the physics thread.

use crate::input::DirectionKeys;
use nalgebra::{UnitQuaternion, Vector3};
use physics::controller::MovementIntent;
use std::time::{Duration, Instant};

/// Time off the ground before a character counts as airborne.
pub const AIR_GRACE: Duration = Duration::from_millis(200);

/// World-space walk direction from held keys relative to the camera.
/// Zero when nothing is held or the keys cancel out.
pub fn walk_direction(keys: &DirectionKeys, camera_forward: &Vector3<f32>) -> Vector3<f32> {
    let forward = Vector3::new(camera_forward.x, 0.0, camera_forward.z)
        .try_normalize(f32::EPSILON)
        .unwrap_or_else(Vector3::zeros);
    let right = Vector3::y().cross(&forward);

    let mut direction = Vector3::zeros();
    if keys.forward {
        direction += forward;
    }
    if keys.back {
        direction -= forward;
    }
    if keys.left {
        direction += right;
    }
    if keys.right {
        direction -= right;
    }

    direction
        .try_normalize(1.0e-6)
        .unwrap_or_else(Vector3::zeros)
}

/// Jump latch plus the debounced airborne flag.
#[derive(Debug, Clone)]
pub struct AirState {
    grounded: bool,
    airborne: bool,
    jumping: bool,
    left_ground: bool,
    last_grounded: Instant,
}

impl AirState {
    pub fn new(now: Instant) -> Self {
        Self {
            grounded: false,
            airborne: false,
            jumping: false,
            left_ground: false,
            last_grounded: now,
        }
    }

    /// Latest ground contact reported by physics. Touching down after a
    /// takeoff ends the jump before the next intent is built.
    pub fn set_grounded(&mut self, grounded: bool) {
        self.grounded = grounded;
        if grounded && self.left_ground {
            self.land();
        }
    }

    fn land(&mut self) {
        self.jumping = false;
        self.left_ground = false;
        self.airborne = false;
    }

    pub fn grounded(&self) -> bool {
        self.grounded
    }

    pub fn airborne(&self) -> bool {
        self.airborne
    }

    /// A jump waiting to take off or still in the air.
    pub fn jumping(&self) -> bool {
        self.jumping
    }

    pub fn request_jump(&mut self, held: bool) {
        if held && self.grounded && !self.jumping {
            self.jumping = true;
        }
    }

    pub fn cancel_jump(&mut self) {
        self.jumping = false;
    }

    /// Advances the airborne debounce. Call once per frame after the jump request.
    pub fn update(&mut self, now: Instant) {
        if self.grounded {
            self.airborne = false;
            self.last_grounded = now;
        } else if now.duration_since(self.last_grounded) > AIR_GRACE {
            self.airborne = true;
        }

        if self.jumping {
            self.airborne = true;
        }
        if self.airborne && !self.grounded {
            self.left_ground = true;
        }

        if self.grounded && self.left_ground {
            self.land();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TranslatorInput<'a> {
    pub keys: &'a DirectionKeys,
    pub jump_held: bool,
    pub camera_forward: Vector3<f32>,
    pub look: UnitQuaternion<f32>,
    pub first_person: bool,
    pub run: bool,
    /// A one-shot gesture owns the character; no walking or jumping.
    pub gesture_locked: bool,
    pub dt: f32,
}

/// Builds the intent for one frame. The air state's jump latch is updated
/// in place so a held jump turns into a single request.
pub fn translate(input: &TranslatorInput<'_>, air: &mut AirState) -> MovementIntent {
    let mut direction = walk_direction(input.keys, &input.camera_forward);
    air.request_jump(input.jump_held);

    if input.gesture_locked {
        direction = Vector3::zeros();
        air.cancel_jump();
    }

    MovementIntent {
        direction,
        dt: input.dt,
        jump: air.jumping(),
        look: input.look,
        first_person: input.first_person,
        run: input.run,
    }
}
