//! Lua implementation of [`ActionExecutor`](crate::action::ActionExecutor).

mod bindings;
mod lua;

pub use lua::{LuaActionExecutor, DEFAULT_INSTRUCTION_LIMIT};
