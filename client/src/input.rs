//! Keyboard, mouse and touch sampling.
//!
//! [`KeyboardState`] is the platform-free core: held controls, debounced
//! toggles and one-shot presses. [`InputManager`] feeds it from macroquad once
//! per frame and packages the result as an [`InputFrame`].

use macroquad::prelude::{
    is_key_down, is_mouse_button_pressed, mouse_position, touches, KeyCode, MouseButton,
    TouchPhase,
};
use shared::Action;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

pub const TOGGLE_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Forward,
    Left,
    Back,
    Right,
    Jump,
    Yes,
    No,
    Wave,
    Run,
    View,
    Holding,
    Reconnect,
}

impl Control {
    pub const ALL: [Control; 12] = [
        Control::Forward,
        Control::Left,
        Control::Back,
        Control::Right,
        Control::Jump,
        Control::Yes,
        Control::No,
        Control::Wave,
        Control::Run,
        Control::View,
        Control::Holding,
        Control::Reconnect,
    ];

    pub fn keys(self) -> &'static [KeyCode] {
        match self {
            Control::Forward => &[KeyCode::W, KeyCode::Up],
            Control::Left => &[KeyCode::A, KeyCode::Left],
            Control::Back => &[KeyCode::S, KeyCode::Down],
            Control::Right => &[KeyCode::D, KeyCode::Right],
            Control::Jump => &[KeyCode::Space],
            Control::Yes => &[KeyCode::Key1],
            Control::No => &[KeyCode::Key2],
            Control::Wave => &[KeyCode::Key3],
            Control::Run => &[KeyCode::LeftShift, KeyCode::RightShift],
            Control::View => &[KeyCode::V, KeyCode::X],
            Control::Holding => &[KeyCode::Enter, KeyCode::KpEnter],
            Control::Reconnect => &[KeyCode::R],
        }
    }

    /// Toggles accept at most one press per [`TOGGLE_DEBOUNCE`].
    pub fn is_debounced(self) -> bool {
        matches!(self, Control::Run | Control::View | Control::Holding)
    }

    pub fn gesture(self) -> Option<Action> {
        match self {
            Control::Yes => Some(Action::Yes),
            Control::No => Some(Action::No),
            Control::Wave => Some(Action::Wave),
            _ => None,
        }
    }
}

/// The four directional key groups held this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirectionKeys {
    pub forward: bool,
    pub left: bool,
    pub back: bool,
    pub right: bool,
}

impl DirectionKeys {
    pub fn count(&self) -> usize {
        [self.forward, self.left, self.back, self.right]
            .iter()
            .filter(|&&held| held)
            .count()
    }

    pub fn any(&self) -> bool {
        self.count() > 0
    }

    /// Left with right, or forward with back.
    pub fn opposing(&self) -> bool {
        (self.left && self.right) || (self.forward && self.back)
    }
}

#[derive(Debug, Default)]
pub struct KeyboardState {
    held: HashSet<Control>,
    pending: HashSet<Control>,
    last_accepted: HashMap<Control, Instant>,
}

impl KeyboardState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a key-down. Returns false when a toggle press is debounced away.
    pub fn press(&mut self, control: Control, now: Instant) -> bool {
        if control.is_debounced() {
            if let Some(last) = self.last_accepted.get(&control) {
                if now.duration_since(*last) < TOGGLE_DEBOUNCE {
                    return false;
                }
            }
            self.last_accepted.insert(control, now);
        }
        self.held.insert(control);
        self.pending.insert(control);
        true
    }

    pub fn release(&mut self, control: Control) {
        self.held.remove(&control);
    }

    pub fn is_held(&self, control: Control) -> bool {
        self.held.contains(&control)
    }

    /// Consumes an accepted press; true at most once per press.
    pub fn take(&mut self, control: Control) -> bool {
        self.pending.remove(&control)
    }

    pub fn directions(&self) -> DirectionKeys {
        DirectionKeys {
            forward: self.is_held(Control::Forward),
            left: self.is_held(Control::Left),
            back: self.is_held(Control::Back),
            right: self.is_held(Control::Right),
        }
    }
}

/// Everything the session needs from one frame of input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputFrame {
    pub directions: DirectionKeys,
    pub jump: bool,
    /// Gesture key pressed this frame, first in Yes/No/Wave order.
    pub gesture: Option<Action>,
    pub toggle_run: bool,
    pub toggle_view: bool,
    pub toggle_holding: bool,
    pub reconnect: bool,
    /// Pointer movement in pixels since last frame.
    pub look_delta: (f32, f32),
    pub touch: bool,
    /// Key down, mouse move, click or touch happened this frame.
    pub activity: bool,
}

impl InputFrame {
    pub fn from_keyboard(keyboard: &mut KeyboardState) -> Self {
        let pressed: Vec<Control> = [Control::Yes, Control::No, Control::Wave]
            .into_iter()
            .filter(|&c| keyboard.take(c))
            .collect();
        let gesture = pressed.into_iter().find_map(Control::gesture);

        Self {
            directions: keyboard.directions(),
            jump: keyboard.is_held(Control::Jump),
            gesture,
            toggle_run: keyboard.take(Control::Run),
            toggle_view: keyboard.take(Control::View),
            toggle_holding: keyboard.take(Control::Holding),
            reconnect: keyboard.take(Control::Reconnect),
            ..Default::default()
        }
    }
}

/// Samples macroquad input state once per frame
pub struct InputManager {
    keyboard: KeyboardState,
    prev_down: HashSet<Control>,
    last_mouse: Option<(f32, f32)>,
    last_touch: Option<(u64, f32, f32)>,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            keyboard: KeyboardState::new(),
            prev_down: HashSet::new(),
            last_mouse: None,
            last_touch: None,
        }
    }

    pub fn update(&mut self, now: Instant) -> InputFrame {
        let mut key_activity = false;

        for control in Control::ALL {
            let down = control.keys().iter().any(|&key| is_key_down(key));
            let was_down = self.prev_down.contains(&control);

            if down && !was_down {
                self.keyboard.press(control, now);
                self.prev_down.insert(control);
                key_activity = true;
            } else if !down && was_down {
                self.keyboard.release(control);
                self.prev_down.remove(&control);
            }
        }

        // Discard the first sample so the initial cursor position is not a jump.
        let mouse = mouse_position();
        let mut look_delta = match self.last_mouse {
            Some((x, y)) => (mouse.0 - x, mouse.1 - y),
            None => (0.0, 0.0),
        };
        self.last_mouse = Some(mouse);

        let mut touch = false;
        let active_touches = touches();
        if let Some(t) = active_touches.first() {
            touch = true;
            if let (TouchPhase::Moved, Some((id, x, y))) = (t.phase, self.last_touch) {
                if id == t.id {
                    look_delta = (t.position.x - x, t.position.y - y);
                }
            }
            self.last_touch = Some((t.id, t.position.x, t.position.y));
        } else {
            self.last_touch = None;
        }

        let clicked = is_mouse_button_pressed(MouseButton::Left);
        let moved = look_delta != (0.0, 0.0);

        let mut frame = InputFrame::from_keyboard(&mut self.keyboard);
        frame.look_delta = look_delta;
        frame.touch = touch;
        frame.activity = key_activity || moved || clicked || touch;
        frame
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}
