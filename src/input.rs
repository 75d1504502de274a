//! Keyboard snapshot.
//!
//! [`KeyboardState`] folds raw window events into the set of keys currently
//! held, which the frame loop reads once per frame as a snapshot.
//!
//! | Key          | Effect                 |
//! |--------------|------------------------|
//! | Up / Down    | move along +z / -z     |
//! | Left / Right | move along +x / -x     |
//! | O / L        | move along +y / -y     |
//! | I / K        | pitch up / down        |
//! | Escape       | quit                   |

use std::collections::HashSet;

use glam::Vec3;
use winit::event::{ElementState, WindowEvent};
use winit::keyboard::{KeyCode as WinitKeyCode, PhysicalKey};

use crate::camera::CameraMotion;

/// Keys the simulation reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Up,
    Down,
    Left,
    Right,
    I,
    K,
    O,
    L,
    Escape,
    Other,
}

impl From<WinitKeyCode> for KeyCode {
    fn from(key: WinitKeyCode) -> Self {
        match key {
            WinitKeyCode::ArrowUp => KeyCode::Up,
            WinitKeyCode::ArrowDown => KeyCode::Down,
            WinitKeyCode::ArrowLeft => KeyCode::Left,
            WinitKeyCode::ArrowRight => KeyCode::Right,
            WinitKeyCode::KeyI => KeyCode::I,
            WinitKeyCode::KeyK => KeyCode::K,
            WinitKeyCode::KeyO => KeyCode::O,
            WinitKeyCode::KeyL => KeyCode::L,
            WinitKeyCode::Escape => KeyCode::Escape,
            _ => KeyCode::Other,
        }
    }
}

/// Held and just-pressed keys.
#[derive(Debug, Default, Clone)]
pub struct KeyboardState {
    keys_held: HashSet<KeyCode>,
    keys_pressed: HashSet<KeyCode>,
}

impl KeyboardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_held(&self, key: KeyCode) -> bool {
        self.keys_held.contains(&key)
    }

    /// Whether `key` went down since the last [`begin_frame`](Self::begin_frame).
    pub fn key_pressed(&self, key: KeyCode) -> bool {
        self.keys_pressed.contains(&key)
    }

    /// Clear per-frame state. Held keys persist.
    pub fn begin_frame(&mut self) {
        self.keys_pressed.clear();
    }

    /// Process a winit window event.
    pub fn handle_event(&mut self, event: &WindowEvent) {
        if let WindowEvent::KeyboardInput { event, .. } = event {
            if let PhysicalKey::Code(code) = event.physical_key {
                self.set_key(KeyCode::from(code), event.state);
            }
        }
    }

    pub fn set_key(&mut self, key: KeyCode, state: ElementState) {
        if key == KeyCode::Other {
            return;
        }
        match state {
            ElementState::Pressed => {
                // key repeat does not count as a new press
                if self.keys_held.insert(key) {
                    self.keys_pressed.insert(key);
                }
            }
            ElementState::Released => {
                self.keys_held.remove(&key);
            }
        }
    }

    /// Release everything, e.g. when the window loses focus.
    pub fn clear(&mut self) {
        self.keys_held.clear();
        self.keys_pressed.clear();
    }

    pub fn quit_requested(&self) -> bool {
        self.key_pressed(KeyCode::Escape)
    }

    /// Camera movement implied by the held keys.
    pub fn camera_motion(&self) -> CameraMotion {
        let axis = |positive: KeyCode, negative: KeyCode| -> f32 {
            self.key_held(positive) as i32 as f32 - self.key_held(negative) as i32 as f32
        };

        CameraMotion {
            translate: Vec3::new(
                axis(KeyCode::Left, KeyCode::Right),
                axis(KeyCode::O, KeyCode::L),
                axis(KeyCode::Up, KeyCode::Down),
            ),
            pitch: axis(KeyCode::I, KeyCode::K),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_state() {
        let mut keys = KeyboardState::new();
        assert!(!keys.key_held(KeyCode::Up));

        keys.set_key(KeyCode::Up, ElementState::Pressed);
        assert!(keys.key_held(KeyCode::Up));
        assert!(keys.key_pressed(KeyCode::Up));

        keys.begin_frame();
        assert!(keys.key_held(KeyCode::Up));
        assert!(!keys.key_pressed(KeyCode::Up));

        // repeat while held is not a new press
        keys.set_key(KeyCode::Up, ElementState::Pressed);
        assert!(!keys.key_pressed(KeyCode::Up));

        keys.set_key(KeyCode::Up, ElementState::Released);
        assert!(!keys.key_held(KeyCode::Up));
    }

    #[test]
    fn test_camera_motion_mapping() {
        let mut keys = KeyboardState::new();
        keys.set_key(KeyCode::Up, ElementState::Pressed);
        keys.set_key(KeyCode::Right, ElementState::Pressed);
        keys.set_key(KeyCode::O, ElementState::Pressed);
        keys.set_key(KeyCode::K, ElementState::Pressed);

        let motion = keys.camera_motion();
        assert_eq!(motion.translate, Vec3::new(-1.0, 1.0, 1.0));
        assert_eq!(motion.pitch, -1.0);
    }

    #[test]
    fn test_opposite_keys_cancel() {
        let mut keys = KeyboardState::new();
        keys.set_key(KeyCode::Left, ElementState::Pressed);
        keys.set_key(KeyCode::Right, ElementState::Pressed);
        assert_eq!(keys.camera_motion(), CameraMotion::default());
    }

    #[test]
    fn test_escape_requests_quit() {
        let mut keys = KeyboardState::new();
        assert!(!keys.quit_requested());
        keys.set_key(KeyCode::Escape, ElementState::Pressed);
        assert!(keys.quit_requested());
    }

    #[test]
    fn test_winit_mapping() {
        assert_eq!(KeyCode::from(WinitKeyCode::ArrowLeft), KeyCode::Left);
        assert_eq!(KeyCode::from(WinitKeyCode::KeyI), KeyCode::I);
        assert_eq!(KeyCode::from(WinitKeyCode::Space), KeyCode::Other);
    }
}
