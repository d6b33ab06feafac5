use std::collections::HashSet;

use glam::Vec2;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::node::Node;

/// Identifier for a keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
    Digit(u8),
    Function(u8),
}

impl KeyCode {
    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(key) = parse_named_key(name) {
            return Some(key);
        }
        let mut chars = name.chars();
        if let (Some(ch), None) = (chars.next(), chars.next()) {
            if ch.is_ascii_alphabetic() {
                return Some(Self::Character(ch.to_ascii_uppercase()));
            }
            if ch.is_ascii_digit() {
                return Some(Self::Digit(ch as u8 - b'0'));
            }
        }
        if let Some(function) = name.strip_prefix('F').or_else(|| name.strip_prefix('f')) {
            if let Ok(index) = function.parse::<u8>() {
                if (1..=15).contains(&index) {
                    return Some(Self::Function(index));
                }
            }
        }
        None
    }

    /// Numeric key code reported to scripts (`Key.getCode()` values).
    pub fn code(self) -> u32 {
        match self {
            KeyCode::Named(key) => key.code(),
            KeyCode::Character(ch) => u32::from(ch.to_ascii_uppercase()),
            KeyCode::Digit(digit) => 48 + u32::from(digit.min(9)),
            KeyCode::Function(index) => 111 + u32::from(index),
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        if let Some(key) = NamedKey::ALL.iter().find(|key| key.code() == code) {
            return Some(KeyCode::Named(*key));
        }
        match code {
            48..=57 => Some(KeyCode::Digit((code - 48) as u8)),
            65..=90 => char::from_u32(code).map(KeyCode::Character),
            112..=126 => Some(KeyCode::Function((code - 111) as u8)),
            _ => None,
        }
    }
}

fn parse_named_key(name: &str) -> Option<KeyCode> {
    use NamedKey::*;
    let key = match name {
        "Space" => Space,
        "Enter" | "Return" => Enter,
        "Tab" => Tab,
        "Left" => Left,
        "Right" => Right,
        "Up" => Up,
        "Down" => Down,
        "Escape" | "Esc" => Escape,
        "Backspace" => Backspace,
        "Delete" => Delete,
        "Insert" => Insert,
        "Home" => Home,
        "End" => End,
        "PageUp" => PageUp,
        "PageDown" => PageDown,
        "Shift" => Shift,
        "Control" | "Ctrl" => Control,
        "Alt" => Alt,
        "CapsLock" => CapsLock,
        _ => return None,
    };
    Some(KeyCode::Named(key))
}

/// Keys with fixed names and codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedKey {
    Space,
    Enter,
    Tab,
    Left,
    Right,
    Up,
    Down,
    Escape,
    Backspace,
    Delete,
    Insert,
    Home,
    End,
    PageUp,
    PageDown,
    Shift,
    Control,
    Alt,
    CapsLock,
}

impl NamedKey {
    const ALL: [NamedKey; 19] = [
        NamedKey::Space,
        NamedKey::Enter,
        NamedKey::Tab,
        NamedKey::Left,
        NamedKey::Right,
        NamedKey::Up,
        NamedKey::Down,
        NamedKey::Escape,
        NamedKey::Backspace,
        NamedKey::Delete,
        NamedKey::Insert,
        NamedKey::Home,
        NamedKey::End,
        NamedKey::PageUp,
        NamedKey::PageDown,
        NamedKey::Shift,
        NamedKey::Control,
        NamedKey::Alt,
        NamedKey::CapsLock,
    ];

    pub fn code(self) -> u32 {
        match self {
            NamedKey::Backspace => 8,
            NamedKey::Tab => 9,
            NamedKey::Enter => 13,
            NamedKey::Shift => 16,
            NamedKey::Control => 17,
            NamedKey::Alt => 18,
            NamedKey::CapsLock => 20,
            NamedKey::Escape => 27,
            NamedKey::Space => 32,
            NamedKey::PageUp => 33,
            NamedKey::PageDown => 34,
            NamedKey::End => 35,
            NamedKey::Home => 36,
            NamedKey::Left => 37,
            NamedKey::Up => 38,
            NamedKey::Right => 39,
            NamedKey::Down => 40,
            NamedKey::Insert => 45,
            NamedKey::Delete => 46,
        }
    }
}

/// Identifier for a mouse button (left button is zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MouseButton(u8);

impl MouseButton {
    pub const LEFT: Self = Self(0);

    pub fn new(index: u8) -> Self {
        Self(index)
    }

    pub fn index(self) -> u8 {
        self.0
    }

    /// Bit used for this button in a button mask.
    pub fn mask(self) -> u32 {
        1u32.checked_shl(u32::from(self.0)).unwrap_or(0)
    }
}

/// Raw input snapshot: held keys, cursor position and button mask.
#[derive(Debug, Default)]
pub struct InputState {
    keys: RwLock<HashSet<KeyCode>>,
    mouse_buttons: RwLock<u32>,
    mouse_position: RwLock<Vec2>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_key_down(&self, key: KeyCode) {
        self.keys.write().insert(key);
    }

    pub fn set_key_up(&self, key: KeyCode) {
        self.keys.write().remove(&key);
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys.read().contains(&key)
    }

    pub fn is_key_down_by_name(&self, name: &str) -> bool {
        KeyCode::from_name(name).is_some_and(|key| self.is_key_down(key))
    }

    pub fn press_buttons(&self, mask: u32) {
        *self.mouse_buttons.write() |= mask;
    }

    pub fn release_buttons(&self, mask: u32) {
        *self.mouse_buttons.write() &= !mask;
    }

    pub fn set_buttons(&self, mask: u32) {
        *self.mouse_buttons.write() = mask;
    }

    pub fn buttons(&self) -> u32 {
        *self.mouse_buttons.read()
    }

    pub fn is_mouse_button_down(&self, button: MouseButton) -> bool {
        self.buttons() & button.mask() != 0
    }

    pub fn set_mouse_position(&self, position: Vec2) {
        *self.mouse_position.write() = position;
    }

    pub fn mouse_position(&self) -> Vec2 {
        *self.mouse_position.read()
    }
}

/// Primary pointer button state as seen by the pointer state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ButtonState {
    #[default]
    Up,
    Down,
}

impl ButtonState {
    pub fn from_mask(mask: u32) -> Self {
        if mask & MouseButton::LEFT.mask() != 0 {
            ButtonState::Down
        } else {
            ButtonState::Up
        }
    }
}

/// Per-cursor interaction state mutated only by the pointer state machine.
#[derive(Debug, Clone, Default)]
pub struct PointerState {
    /// Button state after the last evaluation.
    pub last: ButtonState,
    /// Button state requested by the latest input.
    pub current: ButtonState,
    /// Whether the cursor was over the active node at the last evaluation.
    pub inside_active: bool,
    /// Node that receives button events.
    pub active: Option<Node>,
    /// Topmost pointer-aware node under the cursor.
    pub topmost: Option<Node>,
}
