//! Scripting core for a frame-based animation player.
//!
//! The crate provides dynamic values with version-dependent coercions,
//! variable scope resolution, target path lookup over the node tree and the
//! per-frame scheduler driving timers, queued actions, listeners and the
//! pointer state machine. Bytecode interpretation sits behind
//! [`ActionExecutor`]; a Lua executor is bundled for scripted scenes and
//! tooling. Rendering is reduced to the [`Canvas`] trait so the core stays
//! headless and easy to embed.

pub mod action;
pub mod app;
mod builtins;
pub mod config;
pub mod environment;
pub mod error;
pub mod event;
pub mod fonts;
pub mod input;
pub mod node;
pub mod object;
pub mod path;
pub mod render;
pub mod scene;
pub mod scripting;
pub mod stage;
pub mod timer;
pub mod value;
pub mod vm;

pub use action::{ActionBuffer, ActionExecutor, ActionItem, ActionQueue};
pub use config::PlayerConfig;
pub use environment::Environment;
pub use error::{RuntimeError, RuntimeResult};
pub use event::EventId;
pub use fonts::{Font, FontLibrary};
pub use input::{InputState, KeyCode, MouseButton, NamedKey};
pub use node::{Node, Rect};
pub use object::{FnCall, Function, Object};
pub use render::{Canvas, Viewport};
pub use scene::Scene;
pub use scripting::LuaActionExecutor;
pub use stage::{DragState, Stage};
pub use timer::IntervalTimer;
pub use value::Value;
pub use vm::Vm;
