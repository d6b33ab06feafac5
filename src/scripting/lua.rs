use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use mlua::{HookTriggers, Lua};

use crate::action::{ActionBuffer, ActionExecutor};
use crate::environment::Environment;

use super::bindings::register_globals;

const HOOK_INTERVAL: u32 = 1000;

/// Hook ticks allowed per action before the script is aborted.
pub const DEFAULT_INSTRUCTION_LIMIT: u64 = 10_000;

/// Executes action buffers holding Lua source against the runtime.
///
/// One Lua state is kept for the executor's lifetime, so plain Lua globals
/// persist between actions. The host API (`get_variable`, `trace`,
/// `call_function` and friends) is rebound for every action so it always
/// talks to the environment of the action being run.
pub struct LuaActionExecutor {
    lua: Lua,
    steps: Arc<AtomicU64>,
}

impl LuaActionExecutor {
    pub fn new() -> Self {
        Self::with_instruction_limit(DEFAULT_INSTRUCTION_LIMIT)
    }

    /// `limit` counts hook ticks, each one a thousand VM instructions.
    pub fn with_instruction_limit(limit: u64) -> Self {
        let lua = Lua::new();
        let steps = Arc::new(AtomicU64::new(0));
        let hook_steps = Arc::clone(&steps);
        lua.set_hook(
            HookTriggers {
                every_nth_instruction: Some(HOOK_INTERVAL),
                ..Default::default()
            },
            move |_, _| {
                if hook_steps.fetch_add(1, Ordering::AcqRel) >= limit {
                    Err(mlua::Error::RuntimeError(
                        "action exceeded its instruction budget".into(),
                    ))
                } else {
                    Ok(())
                }
            },
        );
        Self { lua, steps }
    }
}

impl Default for LuaActionExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionExecutor for LuaActionExecutor {
    fn execute(&mut self, buffer: &ActionBuffer, env: &mut Environment) -> Result<()> {
        let source = buffer
            .as_source()
            .ok_or_else(|| anyhow!("action {} is not UTF-8", buffer.label()))?;
        self.steps.store(0, Ordering::Release);

        let env = RefCell::new(env);
        self.lua
            .scope(|scope| {
                register_globals(&self.lua, scope, &env)?;
                self.lua.load(source).set_name(buffer.label()).exec()
            })
            .map_err(anyhow::Error::from)
            .with_context(|| format!("Lua error in action {}", buffer.label()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::PlayerConfig;
    use crate::node::Node;
    use crate::object::Function;
    use crate::stage::Stage;
    use crate::value::Value;
    use crate::vm::Vm;

    fn environment() -> (Environment, Node) {
        let root = Node::new("_level0");
        let clip = Node::new("clip");
        root.add_child(clip.clone());
        let vm = Vm::new(&PlayerConfig::default(), root.clone());
        (Environment::new(vm, root), clip)
    }

    fn run(executor: &mut LuaActionExecutor, env: &mut Environment, source: &str) -> Result<()> {
        executor.execute(&ActionBuffer::from_source("test", source), env)
    }

    #[test]
    fn variables_and_trace() {
        let (mut env, _) = environment();
        let mut executor = LuaActionExecutor::new();
        run(
            &mut executor,
            &mut env,
            "set_variable('score', 40) trace(get_variable('score') + 2, target)",
        )
        .unwrap();

        assert!(env
            .get_variable("score", &[])
            .strictly_equals(&Value::Number(40.0)));
        assert_eq!(env.vm().take_trace_output(), vec!["42 _level0"]);
    }

    #[test]
    fn nodes_are_reachable_by_path() {
        let (mut env, clip) = environment();
        let mut executor = LuaActionExecutor::new();
        run(
            &mut executor,
            &mut env,
            "local c = get_variable('clip') c._x = 12 c._visible = false \
             local b = bounds('clip') trace(b.min[1])",
        )
        .unwrap();

        assert_eq!(clip.position().x, 12.0);
        assert!(!clip.is_visible());
        assert_eq!(env.vm().take_trace_output(), vec!["12"]);
    }

    #[test]
    fn queued_actions_land_on_the_current_target() {
        let (mut env, clip) = environment();
        env.set_target(clip.clone());
        let mut executor = LuaActionExecutor::new();
        run(&mut executor, &mut env, "queue_action('later', 'trace(1)')").unwrap();

        let item = env.vm().queue().pop().unwrap();
        assert!(item.target().ptr_eq(&clip));
        assert_eq!(item.label(), "later");
    }

    #[test]
    fn calls_runtime_functions() {
        let (mut env, clip) = environment();
        clip.set_member(
            "double",
            Function::native(|_, call| Value::Number(call.arg(0).to_number(7) * 2.0)).into(),
        );
        let mut executor = LuaActionExecutor::new();
        run(
            &mut executor,
            &mut env,
            "trace(call_method('clip', 'double', 4)) call_function('trace', 'direct')",
        )
        .unwrap();
        assert_eq!(env.vm().take_trace_output(), vec!["8", "direct"]);
    }

    #[test]
    fn runaway_scripts_are_stopped() {
        let (mut env, _) = environment();
        let mut executor = LuaActionExecutor::with_instruction_limit(5);
        let err = run(&mut executor, &mut env, "while true do end").unwrap_err();
        assert!(format!("{err:#}").contains("instruction budget"));

        // the budget resets for the next action
        run(&mut executor, &mut env, "trace('ok')").unwrap();
        assert_eq!(env.vm().take_trace_output(), vec!["ok"]);
    }

    #[test]
    fn rejects_binary_buffers() {
        let (mut env, _) = environment();
        let mut executor = LuaActionExecutor::new();
        let buffer = ActionBuffer::new("blob", vec![0xff, 0xfe, 0x00]);
        assert!(executor.execute(&buffer, &mut env).is_err());
    }

    #[test]
    fn drives_frame_actions_through_a_stage() {
        let root = Node::new("_level0");
        root.add_frame_action(
            1,
            ActionBuffer::from_source("frame1", "count = (count or 0) + 1 trace('frame', count)"),
        );
        root.set_total_frames(1);
        let mut stage = Stage::new(
            PlayerConfig::default(),
            root,
            Box::new(LuaActionExecutor::new()),
        );
        stage.advance(Duration::from_millis(10));
        assert_eq!(stage.vm().take_trace_output(), vec!["frame 1"]);
    }
}
