//! Third-person orbit and first-person look.

use nalgebra::{UnitQuaternion, Vector3};
use physics::controller::facing_yaw;
use std::f32::consts::FRAC_PI_2;

pub const ORBIT_RADIUS: f32 = 10.0;
pub const ORBIT_MAX_PITCH: f32 = FRAC_PI_2 - 0.1;
pub const MOUSE_SENSITIVITY: f32 = 0.001;
pub const TOUCH_SENSITIVITY: f32 = 0.002;
/// First-person look speed, mouse and touch alike.
pub const LOOK_SENSITIVITY: f32 = 0.002;
/// Camera eye offset in front of the character when entering first person.
const FIRST_PERSON_FORWARD: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    FirstPerson,
    #[default]
    ThirdPerson,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraRig {
    pub mode: ViewMode,
    /// Orbit yaw around the character.
    pub orbit_yaw: f32,
    /// Orbit elevation, 0 is level.
    pub orbit_pitch: f32,
    pub look_yaw: f32,
    pub look_pitch: f32,
}

impl Default for CameraRig {
    fn default() -> Self {
        Self {
            mode: ViewMode::ThirdPerson,
            orbit_yaw: 0.0,
            orbit_pitch: 0.0,
            look_yaw: 0.0,
            look_pitch: 0.0,
        }
    }
}

impl CameraRig {
    pub fn is_first_person(&self) -> bool {
        self.mode == ViewMode::FirstPerson
    }

    /// Applies a pointer delta in pixels to whichever view is active.
    pub fn pointer_moved(&mut self, dx: f32, dy: f32, touch: bool) {
        match self.mode {
            ViewMode::ThirdPerson => {
                let sensitivity = if touch {
                    TOUCH_SENSITIVITY
                } else {
                    MOUSE_SENSITIVITY
                };
                self.orbit_yaw -= dx * sensitivity;
                self.orbit_pitch =
                    (self.orbit_pitch + dy * sensitivity).clamp(0.0, ORBIT_MAX_PITCH);
            }
            ViewMode::FirstPerson => {
                self.look_yaw -= dx * LOOK_SENSITIVITY;
                self.look_pitch =
                    (self.look_pitch - dy * LOOK_SENSITIVITY).clamp(-FRAC_PI_2, FRAC_PI_2);
            }
        }
    }

    /// Looks along the character's facing, eyes at head height.
    pub fn enter_first_person(&mut self, facing: &UnitQuaternion<f32>) {
        self.mode = ViewMode::FirstPerson;
        self.look_yaw = yaw_of(facing);
        self.look_pitch = 0.0;
    }

    /// Places the orbit camera behind the character.
    pub fn enter_third_person(&mut self, facing: &UnitQuaternion<f32>) {
        self.mode = ViewMode::ThirdPerson;
        let offset = facing * Vector3::new(0.0, 0.0, ORBIT_RADIUS);
        self.orbit_yaw = offset.x.atan2(offset.z);
        self.orbit_pitch = 0.0;
    }

    /// World-space eye position for a character standing at `target`.
    pub fn eye(&self, target: &Vector3<f32>, height: f32, facing: &UnitQuaternion<f32>) -> Vector3<f32> {
        match self.mode {
            ViewMode::ThirdPerson => {
                let x = ORBIT_RADIUS * self.orbit_yaw.sin() * self.orbit_pitch.cos();
                let z = ORBIT_RADIUS * self.orbit_yaw.cos() * self.orbit_pitch.cos();
                let y = ORBIT_RADIUS * self.orbit_pitch.sin() + height;
                target + Vector3::new(x, y, z)
            }
            ViewMode::FirstPerson => {
                let ahead = facing * Vector3::new(0.0, 0.0, -FIRST_PERSON_FORWARD);
                target + Vector3::new(ahead.x, height / 2.0, ahead.z)
            }
        }
    }

    /// Unit view direction for a character standing at `target`.
    pub fn forward(&self, target: &Vector3<f32>, height: f32) -> Vector3<f32> {
        match self.mode {
            ViewMode::ThirdPerson => {
                let eye = self.eye(target, height, &UnitQuaternion::identity());
                (target - eye)
                    .try_normalize(f32::EPSILON)
                    .unwrap_or_else(|| -Vector3::z())
            }
            ViewMode::FirstPerson => {
                let (sy, cy) = self.look_yaw.sin_cos();
                let (sp, cp) = self.look_pitch.sin_cos();
                Vector3::new(-sy * cp, sp, -cy * cp)
            }
        }
    }

    /// Yaw-only rotation taking -Z onto the flattened view direction.
    pub fn look_quaternion(&self, target: &Vector3<f32>, height: f32) -> UnitQuaternion<f32> {
        let forward = self.forward(target, height);
        let flat = Vector3::new(forward.x, 0.0, forward.z);
        match flat.try_normalize(f32::EPSILON).and_then(|f| facing_yaw(&f)) {
            Some(yaw) => UnitQuaternion::from_axis_angle(&Vector3::y_axis(), yaw),
            None => UnitQuaternion::identity(),
        }
    }
}

/// Rotation about +Y, assuming `q` is yaw-only or close to it.
pub fn yaw_of(q: &UnitQuaternion<f32>) -> f32 {
    let forward = q * -Vector3::z();
    facing_yaw(&Vector3::new(forward.x, 0.0, forward.z)).unwrap_or(0.0)
}
