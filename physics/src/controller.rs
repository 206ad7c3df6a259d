//! Kinematic character controller.
//!
//! One call to [`CharacterController::step`] is one simulated tick for one
//! character: resolve the jump or ground reset from last tick's contact,
//! integrate gravity, sweep the capsule, apply the corrected displacement and
//! pick the new facing. Vertical velocity only ever changes through gravity,
//! the jump impulse, or the reset when ground contact is found.

use crate::collision::{CapsuleSweep, SweepQuery};
use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use rapier3d::control::{CharacterAutostep, CharacterLength, KinematicCharacterController};
use rapier3d::prelude::{Capsule, ColliderHandle, RigidBodyHandle};
use shared::Locomotion;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerSettings {
    /// Skin gap kept between the capsule and geometry.
    pub offset: f32,
    /// Radians.
    pub max_slope_climb_angle: f32,
    /// Radians.
    pub min_slope_slide_angle: f32,
    pub autostep_max_height: f32,
    pub autostep_min_width: f32,
    pub autostep_include_dynamic_bodies: bool,
    pub snap_to_ground: f32,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            offset: 0.03,
            max_slope_climb_angle: 90f32.to_radians(),
            min_slope_slide_angle: 30f32.to_radians(),
            autostep_max_height: 1.0,
            autostep_min_width: 0.3,
            autostep_include_dynamic_bodies: true,
            snap_to_ground: 1.0,
        }
    }
}

impl ControllerSettings {
    pub fn build(&self) -> KinematicCharacterController {
        KinematicCharacterController {
            up: Vector3::y_axis(),
            offset: CharacterLength::Absolute(self.offset),
            slide: true,
            autostep: Some(CharacterAutostep {
                max_height: CharacterLength::Absolute(self.autostep_max_height),
                min_width: CharacterLength::Absolute(self.autostep_min_width),
                include_dynamic_bodies: self.autostep_include_dynamic_bodies,
            }),
            max_slope_climb_angle: self.max_slope_climb_angle,
            min_slope_slide_angle: self.min_slope_slide_angle,
            snap_to_ground: Some(CharacterLength::Absolute(self.snap_to_ground)),
            ..Default::default()
        }
    }
}

/// Physics-side record of one character.
#[derive(Debug, Clone)]
pub struct CharacterBody {
    pub body: RigidBodyHandle,
    pub collider: ColliderHandle,
    pub shape: Capsule,
    pub translation: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub vertical_velocity: f32,
    /// Ground contact as of the last completed tick.
    pub grounded: bool,
    pub locomotion: Locomotion,
}

impl CharacterBody {
    pub fn pose(&self) -> Isometry3<f32> {
        Isometry3::from_parts(Translation3::from(self.translation), self.rotation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementIntent {
    /// World-space horizontal direction; any length, normalized before use.
    pub direction: Vector3<f32>,
    pub dt: f32,
    pub jump: bool,
    /// Camera look rotation, used as facing in first person.
    pub look: UnitQuaternion<f32>,
    pub first_person: bool,
    pub run: bool,
}

impl Default for MovementIntent {
    fn default() -> Self {
        Self {
            direction: Vector3::zeros(),
            dt: 0.0,
            jump: false,
            look: UnitQuaternion::identity(),
            first_person: false,
            run: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerResult {
    pub translation: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub grounded: bool,
}

/// Vertical velocity at the start of a tick, before gravity.
pub fn launch_velocity(grounded: bool, jump: bool, impulse: f32, current: f32) -> f32 {
    match (grounded, jump) {
        (true, true) => impulse,
        (true, false) => 0.0,
        (false, _) => current,
    }
}

/// Yaw facing a horizontal displacement, `None` when there is nothing to face.
pub fn facing_yaw(horizontal: &Vector3<f32>) -> Option<f32> {
    if horizontal.x == 0.0 && horizontal.z == 0.0 {
        return None;
    }
    Some((-horizontal.x).atan2(-horizontal.z))
}

pub fn horizontal_displacement(direction: &Vector3<f32>, speed: f32, dt: f32) -> Vector3<f32> {
    let flat = Vector3::new(direction.x, 0.0, direction.z);
    flat.try_normalize(f32::EPSILON)
        .map(|unit| unit * speed * dt)
        .unwrap_or_else(Vector3::zeros)
}

pub struct CharacterController {
    kcc: KinematicCharacterController,
}

impl Default for CharacterController {
    fn default() -> Self {
        Self::new(&ControllerSettings::default())
    }
}

impl CharacterController {
    pub fn new(settings: &ControllerSettings) -> Self {
        Self {
            kcc: settings.build(),
        }
    }

    pub fn step<S: CapsuleSweep + ?Sized>(
        &self,
        character: &mut CharacterBody,
        intent: &MovementIntent,
        sweep: &S,
    ) -> ControllerResult {
        let locomotion = character.locomotion;

        character.vertical_velocity = launch_velocity(
            character.grounded,
            intent.jump,
            locomotion.jump_impulse,
            character.vertical_velocity,
        );
        character.vertical_velocity += locomotion.gravity * intent.dt;

        let horizontal =
            horizontal_displacement(&intent.direction, locomotion.speed(intent.run), intent.dt);
        let desired = Vector3::new(
            horizontal.x,
            character.vertical_velocity * intent.dt,
            horizontal.z,
        );

        // The capsule stays upright whatever the facing.
        let outcome = sweep.sweep(
            &self.kcc,
            &SweepQuery {
                body: character.body,
                shape: character.shape,
                pose: Isometry3::translation(
                    character.translation.x,
                    character.translation.y,
                    character.translation.z,
                ),
                desired,
                dt: intent.dt,
            },
        );

        let mut corrected = outcome.translation;
        if horizontal == Vector3::zeros() {
            corrected.x = 0.0;
            corrected.z = 0.0;
        }
        character.translation += corrected;

        character.grounded = outcome.grounded && character.vertical_velocity <= 0.0;
        if character.grounded {
            character.vertical_velocity = 0.0;
        }

        if intent.first_person {
            character.rotation = intent.look;
        } else if let Some(yaw) = facing_yaw(&horizontal) {
            character.rotation = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), yaw);
        }

        ControllerResult {
            translation: character.translation,
            rotation: character.rotation,
            grounded: character.grounded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::SweepOutcome;
    use assert_approx_eq::assert_approx_eq;
    use std::cell::RefCell;
    use std::f32::consts::{FRAC_PI_2, PI};

    const DT: f32 = 1.0 / 60.0;

    /// Infinite floor at `height`; records every desired displacement.
    struct FlatGround {
        height: f32,
        requests: RefCell<Vec<Vector3<f32>>>,
    }

    impl FlatGround {
        fn new(height: f32) -> Self {
            Self {
                height,
                requests: RefCell::new(Vec::new()),
            }
        }
    }

    impl CapsuleSweep for FlatGround {
        fn sweep(
            &self,
            _controller: &KinematicCharacterController,
            query: &SweepQuery,
        ) -> SweepOutcome {
            self.requests.borrow_mut().push(query.desired);
            let feet = query.pose.translation.vector.y
                - query.shape.half_height()
                - query.shape.radius;
            let mut translation = query.desired;
            let grounded = feet + translation.y <= self.height + 1e-4;
            if grounded {
                translation.y = self.height - feet;
            }
            SweepOutcome {
                translation,
                grounded,
            }
        }
    }

    fn character_at(y: f32, grounded: bool) -> CharacterBody {
        let locomotion = Locomotion::default();
        CharacterBody {
            body: RigidBodyHandle::invalid(),
            collider: ColliderHandle::invalid(),
            shape: Capsule::new_y(locomotion.capsule_height() / 2.0, locomotion.radius),
            translation: Vector3::new(0.0, y, 0.0),
            rotation: UnitQuaternion::identity(),
            vertical_velocity: 0.0,
            grounded,
            locomotion,
        }
    }

    /// Centre height of a capsule resting on y = 0.
    fn standing_height() -> f32 {
        Locomotion::default().height / 2.0
    }

    #[test]
    fn test_settings_build_kcc() {
        let kcc = ControllerSettings::default().build();
        assert!(matches!(kcc.offset, CharacterLength::Absolute(o) if o == 0.03));
        assert!(matches!(kcc.snap_to_ground, Some(CharacterLength::Absolute(s)) if s == 1.0));
        assert_approx_eq!(kcc.max_slope_climb_angle, FRAC_PI_2, 1e-6);
        assert_approx_eq!(kcc.min_slope_slide_angle, PI / 6.0, 1e-6);
        let autostep = kcc.autostep.unwrap();
        assert!(matches!(autostep.max_height, CharacterLength::Absolute(h) if h == 1.0));
        assert!(matches!(autostep.min_width, CharacterLength::Absolute(w) if w == 0.3));
        assert!(autostep.include_dynamic_bodies);
    }

    #[test]
    fn test_launch_velocity_rules() {
        assert_eq!(launch_velocity(true, true, 15.0, -3.0), 15.0);
        assert_eq!(launch_velocity(true, false, 15.0, -3.0), 0.0);
        assert_eq!(launch_velocity(false, true, 15.0, -3.0), -3.0);
        assert_eq!(launch_velocity(false, false, 15.0, 4.0), 4.0);
    }

    #[test]
    fn test_grounded_idle_has_no_vertical_drift() {
        let controller = CharacterController::default();
        let ground = FlatGround::new(0.0);
        let mut character = character_at(standing_height(), true);

        for _ in 0..120 {
            let result = controller.step(
                &mut character,
                &MovementIntent {
                    dt: DT,
                    ..Default::default()
                },
                &ground,
            );
            assert!(result.grounded);
            assert_eq!(character.vertical_velocity, 0.0);
        }
        assert_approx_eq!(character.translation.y, standing_height(), 1e-4);
    }

    #[test]
    fn test_held_jump_applies_impulse_once() {
        let controller = CharacterController::default();
        let ground = FlatGround::new(0.0);
        let mut character = character_at(standing_height(), true);
        let intent = MovementIntent {
            dt: DT,
            jump: true,
            ..Default::default()
        };

        let mut launches = 0;
        let mut airborne_ticks = 0;
        for _ in 0..150 {
            let before = character.vertical_velocity;
            let was_grounded = character.grounded;
            let result = controller.step(&mut character, &intent, &ground);
            if was_grounded && character.vertical_velocity > before {
                launches += 1;
            }
            if !result.grounded {
                airborne_ticks += 1;
            }
            if launches == 1 && result.grounded {
                break;
            }
        }

        assert_eq!(launches, 1);
        assert!(airborne_ticks > 30);
        assert!(character.grounded);
        assert_eq!(character.vertical_velocity, 0.0);
    }

    #[test]
    fn test_jump_arc_descends_until_contact() {
        let controller = CharacterController::default();
        let ground = FlatGround::new(0.0);
        let mut character = character_at(standing_height(), true);

        let first = controller.step(
            &mut character,
            &MovementIntent {
                dt: DT,
                jump: true,
                ..Default::default()
            },
            &ground,
        );
        assert!(!first.grounded);
        assert_approx_eq!(
            character.vertical_velocity,
            shared::JUMP_IMPULSE + shared::GRAVITY * DT,
            1e-4
        );

        let idle = MovementIntent {
            dt: DT,
            ..Default::default()
        };
        let mut peak = character.translation.y;
        let mut landed = false;
        for _ in 0..200 {
            let result = controller.step(&mut character, &idle, &ground);
            peak = peak.max(result.translation.y);
            if result.grounded {
                landed = true;
                assert_eq!(character.vertical_velocity, 0.0);
                break;
            }
        }
        assert!(landed);
        assert!(peak > standing_height() + 3.0);
        assert_approx_eq!(character.translation.y, standing_height(), 1e-3);
    }

    #[test]
    fn test_walk_speed_and_facing() {
        let controller = CharacterController::default();
        let ground = FlatGround::new(0.0);
        let mut character = character_at(standing_height(), true);

        let result = controller.step(
            &mut character,
            &MovementIntent {
                direction: Vector3::new(3.0, 0.0, 0.0),
                dt: 0.5,
                ..Default::default()
            },
            &ground,
        );

        assert_approx_eq!(result.translation.x, shared::WALK_SPEED * 0.5, 1e-4);
        assert_approx_eq!(result.translation.z, 0.0, 1e-6);
        // Facing is the model's -Z axis.
        let forward = result.rotation * Vector3::new(0.0, 0.0, -1.0);
        assert_approx_eq!(forward.x, 1.0, 1e-5);
        assert_approx_eq!(forward.z, 0.0, 1e-5);

        let run = controller.step(
            &mut character,
            &MovementIntent {
                direction: Vector3::new(0.0, 0.0, -1.0),
                dt: 0.5,
                run: true,
                ..Default::default()
            },
            &ground,
        );
        assert_approx_eq!(run.translation.z, -shared::RUN_SPEED * 0.5, 1e-4);
        assert_approx_eq!(run.rotation.angle(), 0.0, 1e-4);
    }

    #[test]
    fn test_idle_keeps_facing_and_position() {
        let controller = CharacterController::default();
        let ground = FlatGround::new(0.0);
        let mut character = character_at(standing_height(), true);
        let facing = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 1.2);
        character.rotation = facing;
        character.translation.x = 4.0;

        let result = controller.step(
            &mut character,
            &MovementIntent {
                dt: DT,
                ..Default::default()
            },
            &ground,
        );

        assert_eq!(result.rotation, facing);
        assert_eq!(result.translation.x, 4.0);
        let desired = ground.requests.borrow()[0];
        assert_eq!(desired.x, 0.0);
        assert_eq!(desired.z, 0.0);
    }

    #[test]
    fn test_first_person_follows_look() {
        let controller = CharacterController::default();
        let ground = FlatGround::new(0.0);
        let mut character = character_at(standing_height(), true);
        let look = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 0.7);

        let result = controller.step(
            &mut character,
            &MovementIntent {
                direction: Vector3::new(1.0, 0.0, 1.0),
                dt: DT,
                look,
                first_person: true,
                ..Default::default()
            },
            &ground,
        );
        assert_eq!(result.rotation, look);
    }

    #[test]
    fn test_facing_yaw_and_displacement_helpers() {
        assert_eq!(facing_yaw(&Vector3::zeros()), None);
        assert_approx_eq!(facing_yaw(&Vector3::new(0.0, 0.0, 1.0)).unwrap().abs(), PI, 1e-6);
        let d = horizontal_displacement(&Vector3::new(3.0, 9.0, 4.0), 10.0, 0.1);
        assert_approx_eq!(d.x, 0.6, 1e-5);
        assert_approx_eq!(d.y, 0.0, 1e-6);
        assert_approx_eq!(d.z, 0.8, 1e-5);
    }
}
