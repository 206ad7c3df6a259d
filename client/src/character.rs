//! Local and remote characters.
//!
//! Both share [`CharacterState`] but have separate update paths. A
//! [`LocalCharacter`] is driven by input and controller results; a
//! [`RemoteCharacter`] only ever takes what the network sent.

use crate::animation::{ActionInputs, ActionStateMachine, ClipPlayer, Crossfade};
use crate::camera::CameraRig;
use crate::movement::{translate, AirState, TranslatorInput};
use crate::input::InputFrame;
use nalgebra::{UnitQuaternion, Vector3};
use physics::collision::hsl_to_rgb;
use physics::controller::MovementIntent;
use rand::Rng;
use shared::{Action, Locomotion, PlayerId};
use std::time::Instant;

/// Fraction of the way the displayed rotation moves toward physics each update.
pub const ROTATION_SLERP: f32 = 0.2;

#[derive(Debug, Clone, PartialEq)]
pub struct CharacterState {
    pub id: PlayerId,
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub action: Action,
    /// Head pitch in radians.
    pub neck_pitch: f32,
    /// Body tint, RGB in 0..1.
    pub color: [f32; 3],
}

impl CharacterState {
    pub fn new(id: PlayerId, position: Vector3<f32>, rotation: UnitQuaternion<f32>) -> Self {
        Self {
            id,
            position,
            rotation,
            action: Action::Idle,
            neck_pitch: 0.0,
            color: random_color(&mut rand::thread_rng()),
        }
    }
}

/// Random hue and saturation, lightness kept in the upper half.
pub fn random_color<R: Rng>(rng: &mut R) -> [f32; 3] {
    let h = rng.gen_range(0.0..360.0);
    let s = rng.gen_range(0.0..=1.0);
    let l = rng.gen_range(0.5..=0.9);
    hsl_to_rgb(h, s, l)
}

/// The player's own character
#[derive(Debug, Clone)]
pub struct LocalCharacter {
    pub state: CharacterState,
    pub locomotion: Locomotion,
    pub camera: CameraRig,
    pub run: bool,
    pub holding: bool,
    air: AirState,
    animation: ActionStateMachine,
    clips: ClipPlayer,
}

impl LocalCharacter {
    pub fn new(id: PlayerId, position: Vector3<f32>, now: Instant) -> Self {
        Self {
            state: CharacterState::new(id, position, UnitQuaternion::identity()),
            locomotion: Locomotion::default(),
            camera: CameraRig::default(),
            run: true,
            holding: false,
            air: AirState::new(now),
            animation: ActionStateMachine::default(),
            clips: ClipPlayer::default(),
        }
    }

    pub fn id(&self) -> &PlayerId {
        &self.state.id
    }

    pub fn air(&self) -> &AirState {
        &self.air
    }

    pub fn animation(&self) -> &ActionStateMachine {
        &self.animation
    }

    pub fn clips(&self) -> &ClipPlayer {
        &self.clips
    }

    /// Builds this frame's movement intent.
    pub fn movement_intent(&mut self, input: &InputFrame, dt: f32) -> MovementIntent {
        let height = self.locomotion.height;
        let forward = self.camera.forward(&self.state.position, height);
        let look = self.camera.look_quaternion(&self.state.position, height);

        translate(
            &TranslatorInput {
                keys: &input.directions,
                jump_held: input.jump,
                camera_forward: forward,
                look,
                first_person: self.camera.is_first_person(),
                run: self.run,
                gesture_locked: self.animation.lock().is_locked(),
                dt,
            },
            &mut self.air,
        )
    }

    /// Airborne debounce, then action resolution. Returns the crossfade, if any.
    pub fn update_action(&mut self, input: &InputFrame, now: Instant) -> Option<Crossfade> {
        self.air.update(now);
        let crossfade = self.animation.update(&ActionInputs {
            directions: input.directions,
            gesture: input.gesture,
            grounded: self.air.grounded(),
            airborne: self.air.airborne(),
            run: self.run,
            holding: self.holding,
        })?;
        self.clips.apply(&crossfade);
        self.state.action = crossfade.to;
        Some(crossfade)
    }

    /// Advances clip playback and releases a finished gesture.
    pub fn advance_clips(&mut self, dt: f32) {
        if let Some(handle) = self.clips.advance(dt) {
            self.animation.clip_finished(handle);
        }
    }

    pub fn apply_movement(&mut self, translation: Vector3<f32>, grounded: bool) {
        self.state.position = translation;
        self.air.set_grounded(grounded);
    }

    /// Eases the displayed rotation toward the physics rotation.
    pub fn apply_rotation(&mut self, target: UnitQuaternion<f32>) {
        self.state.rotation = self
            .state
            .rotation
            .try_slerp(&target, ROTATION_SLERP, 1.0e-6)
            .unwrap_or(target);
    }
}

/// A peer's character, mirrored from network messages
#[derive(Debug, Clone)]
pub struct RemoteCharacter {
    pub state: CharacterState,
    animation: ActionStateMachine,
    clips: ClipPlayer,
}

impl RemoteCharacter {
    pub fn new(id: PlayerId, position: Vector3<f32>, rotation: UnitQuaternion<f32>) -> Self {
        Self {
            state: CharacterState::new(id, position, rotation),
            animation: ActionStateMachine::default(),
            clips: ClipPlayer::default(),
        }
    }

    pub fn id(&self) -> &PlayerId {
        &self.state.id
    }

    pub fn animation(&self) -> &ActionStateMachine {
        &self.animation
    }

    pub fn clips(&self) -> &ClipPlayer {
        &self.clips
    }

    /// Pose confirmed by the physics thread after an inbound move.
    pub fn apply_network_pose(&mut self, position: Vector3<f32>, rotation: UnitQuaternion<f32>) {
        self.state.position = position;
        self.state.rotation = rotation;
    }

    pub fn play(&mut self, action: Action) -> Option<Crossfade> {
        let crossfade = self.animation.play_direct(action)?;
        self.clips.apply(&crossfade);
        self.state.action = crossfade.to;
        Some(crossfade)
    }

    pub fn set_neck_pitch(&mut self, pitch: f32) {
        self.state.neck_pitch = pitch;
    }

    pub fn advance_clips(&mut self, dt: f32) {
        self.clips.advance(dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_random_color_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let [r, g, b] = random_color(&mut rng);
            for c in [r, g, b] {
                assert!((0.0..=1.0 + 1e-5).contains(&c));
            }
            // Lightness of at least 0.5 keeps the brightest channel high.
            assert!(r.max(g).max(b) >= 0.5 - 1e-5);
        }
    }

    #[test]
    fn test_rotation_eases_toward_target() {
        let mut local = LocalCharacter::new(1u64.into(), Vector3::zeros(), Instant::now());
        let target = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 1.0);
        local.apply_rotation(target);
        assert_approx_eq!(local.state.rotation.angle(), 0.2, 1e-4);
        for _ in 0..60 {
            local.apply_rotation(target);
        }
        assert_approx_eq!(local.state.rotation.angle_to(&target), 0.0, 1e-3);
    }

    #[test]
    fn test_local_gesture_round_trip() {
        let now = Instant::now();
        let mut local = LocalCharacter::new(1u64.into(), Vector3::zeros(), now);
        local.apply_movement(Vector3::new(0.0, 1.7, 0.0), true);

        let frame = InputFrame {
            gesture: Some(Action::Wave),
            ..Default::default()
        };
        let fade = local.update_action(&frame, now).unwrap();
        assert_eq!(fade.to, Action::Wave);
        assert_eq!(local.state.action, Action::Wave);

        // Walking is frozen until the clip ends.
        let walk = InputFrame {
            directions: crate::input::DirectionKeys {
                forward: true,
                ..Default::default()
            },
            jump: true,
            ..Default::default()
        };
        let intent = local.movement_intent(&walk, 0.016);
        assert_eq!(intent.direction, Vector3::zeros());
        assert!(!intent.jump);

        for _ in 0..200 {
            local.advance_clips(0.016);
        }
        assert!(!local.animation().lock().is_locked());
        let fade = local.update_action(&walk, now).unwrap();
        assert_eq!(fade.to, Action::Run);
    }

    #[test]
    fn test_remote_plays_network_action() {
        let mut remote = RemoteCharacter::new(
            "peer".into(),
            Vector3::new(1.0, 2.0, 3.0),
            UnitQuaternion::identity(),
        );
        let fade = remote.play(Action::Run).unwrap();
        assert_eq!((fade.from, fade.to), (Action::Idle, Action::Run));
        assert!(remote.play(Action::Run).is_none());
        assert_eq!(remote.clips().current(), Some(Action::Run));

        remote.set_neck_pitch(0.3);
        assert_eq!(remote.state.neck_pitch, 0.3);
    }
}
