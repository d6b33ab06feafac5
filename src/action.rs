use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::environment::Environment;
use crate::node::Node;
use crate::object::Function;
use crate::value::Value;

/// Immutable block of script code attached to a frame or a clip event.
#[derive(Clone, PartialEq, Eq)]
pub struct ActionBuffer {
    label: Arc<str>,
    code: Arc<[u8]>,
}

impl ActionBuffer {
    pub fn new(label: impl Into<Arc<str>>, code: impl Into<Arc<[u8]>>) -> Self {
        Self {
            label: label.into(),
            code: code.into(),
        }
    }

    pub fn from_source(label: impl Into<Arc<str>>, source: &str) -> Self {
        Self::new(label, source.as_bytes())
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// The code as UTF-8 text, when it is text.
    pub fn as_source(&self) -> Option<&str> {
        std::str::from_utf8(&self.code).ok()
    }
}

impl fmt::Debug for ActionBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionBuffer")
            .field("label", &self.label)
            .field("len", &self.code.len())
            .finish()
    }
}

/// One unit of pending script work bound to the node it runs against.
#[derive(Debug, Clone)]
pub enum ActionItem {
    Code { buffer: ActionBuffer, target: Node },
    Call { function: Function, args: Vec<Value>, target: Node },
}

impl ActionItem {
    pub fn target(&self) -> &Node {
        match self {
            ActionItem::Code { target, .. } | ActionItem::Call { target, .. } => target,
        }
    }

    /// Short description used in logs.
    pub fn label(&self) -> String {
        match self {
            ActionItem::Code { buffer, .. } => buffer.label().to_string(),
            ActionItem::Call { target, .. } => format!("call@{}", target.target_path()),
        }
    }
}

/// FIFO of pending action items, shared by everything that schedules work.
#[derive(Default)]
pub struct ActionQueue {
    items: Arc<Mutex<VecDeque<ActionItem>>>,
}

impl Clone for ActionQueue {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
        }
    }
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: ActionItem) {
        self.items.lock().push_back(item);
    }

    pub fn push_code(&self, buffer: ActionBuffer, target: Node) {
        self.push(ActionItem::Code { buffer, target });
    }

    pub fn push_call(&self, function: Function, args: Vec<Value>, target: Node) {
        self.push(ActionItem::Call {
            function,
            args,
            target,
        });
    }

    /// Takes the oldest item; the lock is released before it runs.
    pub fn pop(&self) -> Option<ActionItem> {
        self.items.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn clear(&self) {
        self.items.lock().clear();
    }
}

impl fmt::Debug for ActionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionQueue").field("len", &self.len()).finish()
    }
}

/// Runs action buffers. Implemented by the bytecode or script interpreter
/// sitting on top of this runtime.
pub trait ActionExecutor {
    fn execute(&mut self, buffer: &ActionBuffer, env: &mut Environment) -> anyhow::Result<()>;
}

impl<T> ActionExecutor for Box<T>
where
    T: ActionExecutor + ?Sized,
{
    fn execute(&mut self, buffer: &ActionBuffer, env: &mut Environment) -> anyhow::Result<()> {
        (**self).execute(buffer, env)
    }
}
