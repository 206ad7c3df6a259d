//! Action state machine and clip playback.
//!
//! The state machine decides which [`Action`] a character shows each frame and
//! emits a [`Crossfade`] whenever that changes. One-shot gestures hold a
//! [`GestureLock`] tied to the handle of the clip that was started for them;
//! only the completion of that exact clip releases it.

use crate::input::DirectionKeys;
use shared::Action;
use std::collections::HashMap;

pub const FADE_DURATION: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClipHandle(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Playback {
    Loop,
    /// Play once and hold the last frame.
    OnceClamped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GestureLock {
    #[default]
    None,
    Yes(ClipHandle),
    No(ClipHandle),
    Wave(ClipHandle),
}

impl GestureLock {
    fn for_gesture(action: Action, handle: ClipHandle) -> Self {
        match action {
            Action::Yes => GestureLock::Yes(handle),
            Action::No => GestureLock::No(handle),
            Action::Wave => GestureLock::Wave(handle),
            _ => GestureLock::None,
        }
    }

    pub fn action(&self) -> Option<Action> {
        match self {
            GestureLock::None => None,
            GestureLock::Yes(_) => Some(Action::Yes),
            GestureLock::No(_) => Some(Action::No),
            GestureLock::Wave(_) => Some(Action::Wave),
        }
    }

    pub fn handle(&self) -> Option<ClipHandle> {
        match *self {
            GestureLock::None => None,
            GestureLock::Yes(h) | GestureLock::No(h) | GestureLock::Wave(h) => Some(h),
        }
    }

    pub fn is_locked(&self) -> bool {
        *self != GestureLock::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossfade {
    pub from: Action,
    pub to: Action,
    pub fade: f32,
    pub playback: Playback,
    pub handle: ClipHandle,
}

/// Per-frame inputs to action resolution.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ActionInputs {
    pub directions: DirectionKeys,
    /// Gesture key pressed this frame.
    pub gesture: Option<Action>,
    pub grounded: bool,
    pub airborne: bool,
    pub run: bool,
    pub holding: bool,
}

#[derive(Debug, Clone)]
pub struct ActionStateMachine {
    current: Action,
    lock: GestureLock,
    next_handle: u64,
    fade: f32,
}

impl Default for ActionStateMachine {
    fn default() -> Self {
        Self::new(Action::Idle)
    }
}

impl ActionStateMachine {
    pub fn new(initial: Action) -> Self {
        Self {
            current: initial,
            lock: GestureLock::None,
            next_handle: 0,
            fade: FADE_DURATION,
        }
    }

    pub fn current(&self) -> Action {
        self.current
    }

    pub fn lock(&self) -> GestureLock {
        self.lock
    }

    /// The action these inputs call for, ignoring any lock.
    pub fn resolve(inputs: &ActionInputs) -> Action {
        if let Some(gesture) = inputs.gesture.filter(|g| g.is_gesture()) {
            if inputs.grounded {
                return gesture;
            }
        }

        let keys = &inputs.directions;
        // Three or more keys always move, whatever cancels out.
        if keys.count() >= 3 {
            return Action::locomotion(inputs.run, inputs.holding);
        }
        if inputs.airborne {
            return Action::JumpIdle;
        }
        if keys.opposing() {
            return Action::idle(inputs.holding);
        }
        if keys.any() {
            return Action::locomotion(inputs.run, inputs.holding);
        }
        Action::idle(inputs.holding)
    }

    /// Local characters: resolve, lock gestures, and crossfade on change.
    pub fn update(&mut self, inputs: &ActionInputs) -> Option<Crossfade> {
        if self.lock.is_locked() {
            return None;
        }

        let next = Self::resolve(inputs);
        let crossfade = self.transition(next)?;
        if next.is_gesture() {
            self.lock = GestureLock::for_gesture(next, crossfade.handle);
        }
        Some(crossfade)
    }

    /// Remote characters: follow the label the network sent, no lock logic.
    pub fn play_direct(&mut self, action: Action) -> Option<Crossfade> {
        self.transition(action)
    }

    /// Clears the lock if `handle` is the clip that set it.
    pub fn clip_finished(&mut self, handle: ClipHandle) -> bool {
        if self.lock.handle() == Some(handle) {
            self.lock = GestureLock::None;
            true
        } else {
            false
        }
    }

    fn transition(&mut self, to: Action) -> Option<Crossfade> {
        if to == self.current {
            return None;
        }
        let handle = ClipHandle(self.next_handle);
        self.next_handle += 1;

        let crossfade = Crossfade {
            from: self.current,
            to,
            fade: self.fade,
            playback: if to.is_gesture() {
                Playback::OnceClamped
            } else {
                Playback::Loop
            },
            handle,
        };
        self.current = to;
        Some(crossfade)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PlayingClip {
    action: Action,
    handle: ClipHandle,
    playback: Playback,
    elapsed: f32,
    finished: bool,
}

/// Stand-in mixer: plays one clip per character and reports when play-once
/// clips reach their end.
#[derive(Debug, Clone)]
pub struct ClipPlayer {
    durations: HashMap<Action, f32>,
    playing: Option<PlayingClip>,
    fade_remaining: f32,
}

impl Default for ClipPlayer {
    fn default() -> Self {
        let durations = [
            (Action::Yes, 1.6),
            (Action::No, 1.8),
            (Action::Wave, 2.0),
            (Action::JumpIdle, 0.8),
            (Action::Walk, 1.0),
            (Action::WalkHolding, 1.0),
            (Action::Run, 0.7),
            (Action::RunHolding, 0.7),
            (Action::Idle, 2.5),
            (Action::IdleHolding, 2.5),
        ]
        .into_iter()
        .collect();

        Self {
            durations,
            playing: None,
            fade_remaining: 0.0,
        }
    }
}

impl ClipPlayer {
    pub fn current(&self) -> Option<Action> {
        self.playing.map(|clip| clip.action)
    }

    /// Seconds left on the running crossfade.
    pub fn fade_remaining(&self) -> f32 {
        self.fade_remaining
    }

    /// Starts the target clip from its first frame.
    pub fn apply(&mut self, crossfade: &Crossfade) {
        self.playing = Some(PlayingClip {
            action: crossfade.to,
            handle: crossfade.handle,
            playback: crossfade.playback,
            elapsed: 0.0,
            finished: false,
        });
        self.fade_remaining = crossfade.fade;
    }

    /// Advances playback; returns the handle of a play-once clip that just ended.
    pub fn advance(&mut self, dt: f32) -> Option<ClipHandle> {
        self.fade_remaining = (self.fade_remaining - dt).max(0.0);

        let clip = self.playing.as_mut()?;
        let duration = self.durations.get(&clip.action).copied().unwrap_or(1.0);
        clip.elapsed += dt;

        match clip.playback {
            Playback::Loop => {
                if duration > 0.0 {
                    clip.elapsed %= duration;
                }
                None
            }
            Playback::OnceClamped => {
                if clip.finished || clip.elapsed < duration {
                    return None;
                }
                clip.elapsed = duration;
                clip.finished = true;
                Some(clip.handle)
            }
        }
    }
}
