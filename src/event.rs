use crate::input::KeyCode;
use crate::value::Value;

/// Events the runtime delivers to nodes and listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventId {
    Press,
    Release,
    ReleaseOutside,
    RollOver,
    RollOut,
    DragOver,
    DragOut,
    KeyPress(KeyCode),
    MouseMove,
    MouseDown,
    MouseUp,
    EnterFrame,
    Load,
    Unload,
    SetFocus,
    KillFocus,
}

impl EventId {
    /// Events driven by the pointer state machine.
    pub const BUTTON_EVENTS: [EventId; 7] = [
        EventId::Press,
        EventId::Release,
        EventId::ReleaseOutside,
        EventId::RollOver,
        EventId::RollOut,
        EventId::DragOver,
        EventId::DragOut,
    ];

    /// Name of the script method that handles the event.
    pub fn handler_name(&self) -> &'static str {
        match self {
            EventId::Press => "onPress",
            EventId::Release => "onRelease",
            EventId::ReleaseOutside => "onReleaseOutside",
            EventId::RollOver => "onRollOver",
            EventId::RollOut => "onRollOut",
            EventId::DragOver => "onDragOver",
            EventId::DragOut => "onDragOut",
            EventId::KeyPress(_) => "onKeyDown",
            EventId::MouseMove => "onMouseMove",
            EventId::MouseDown => "onMouseDown",
            EventId::MouseUp => "onMouseUp",
            EventId::EnterFrame => "onEnterFrame",
            EventId::Load => "onLoad",
            EventId::Unload => "onUnload",
            EventId::SetFocus => "onSetFocus",
            EventId::KillFocus => "onKillFocus",
        }
    }

    /// Arguments passed to the handler.
    pub fn arguments(&self) -> Vec<Value> {
        match self {
            EventId::KeyPress(key) => vec![Value::from(key.code())],
            _ => Vec::new(),
        }
    }

    pub fn is_button_event(&self) -> bool {
        Self::BUTTON_EVENTS.contains(self)
    }
}
