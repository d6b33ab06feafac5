//! Variable resolution across with-blocks, call frames, the host node and
//! the global object.

use std::sync::Arc;

use log::{debug, error};

use crate::error::{RuntimeError, RuntimeResult};
use crate::node::Node;
use crate::object::Object;
use crate::path;
use crate::value::Value;
use crate::vm::Vm;

/// Size of the always-valid register bank used outside of any function and
/// as the fallback for out-of-range register access.
pub const GLOBAL_REGISTER_COUNT: usize = 4;

/// Locals and registers owned by one function invocation.
#[derive(Debug, Default)]
pub struct CallFrame {
    locals: Vec<(String, Value)>,
    registers: Vec<Value>,
}

impl CallFrame {
    fn with_registers(count: usize) -> Self {
        Self {
            locals: Vec::new(),
            registers: vec![Value::Undefined; count],
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.locals.iter().rposition(|(slot, _)| slot == name)
    }
}

/// Execution context handed to script code: the host node that bare names
/// resolve against, plus the call-frame stack of the running script.
pub struct Environment {
    vm: Arc<Vm>,
    target: Node,
    frames: Vec<CallFrame>,
    global_registers: [Value; GLOBAL_REGISTER_COUNT],
}

impl Environment {
    pub fn new(vm: Arc<Vm>, target: Node) -> Self {
        Self {
            vm,
            target,
            frames: vec![CallFrame::default()],
            global_registers: Default::default(),
        }
    }

    pub fn vm(&self) -> &Arc<Vm> {
        &self.vm
    }

    pub fn version(&self) -> u8 {
        self.vm.version()
    }

    /// The host node.
    pub fn target(&self) -> &Node {
        &self.target
    }

    pub fn set_target(&mut self, target: Node) {
        self.target = target;
    }

    pub(crate) fn replace_target(&mut self, target: Node) -> Node {
        std::mem::replace(&mut self.target, target)
    }

    pub fn root(&self) -> Node {
        self.vm.root()
    }

    /// Reads a variable.
    ///
    /// Qualified names (`clip.x`, `/menu:count`) read the leaf directly from
    /// the addressed node. Bare names search the with-stack innermost first,
    /// then the open call frame, `this`, the host node, the `_root`,
    /// `_level0` and `_global` aliases and finally the global object.
    pub fn get_variable(&self, name: &str, with_stack: &[Object]) -> Value {
        if let Some((target_path, leaf)) = path::parse_path(name) {
            return match self.find_target(&target_path) {
                Some(node) => node.get_member(&leaf).unwrap_or_default(),
                None => {
                    error!("find_target('{target_path}') failed while reading '{name}'");
                    Value::Undefined
                }
            };
        }

        for object in with_stack.iter().rev() {
            if let Some(value) = object.get_member(name) {
                return value;
            }
        }

        if let Some(value) = self.local(name) {
            return value.clone();
        }

        if name == "this" {
            return Value::from(&self.target);
        }

        if let Some(value) = self.target.get_member(name) {
            return value;
        }

        match name {
            "_root" | "_level0" => return Value::from(self.root()),
            "_global" => return Value::Object(self.vm.global().clone()),
            _ => {}
        }

        if let Some(value) = self.vm.global().get_member(name) {
            return value;
        }

        debug!("get_variable('{name}') failed, returning undefined");
        Value::Undefined
    }

    /// Assigns a variable.
    ///
    /// The first with-stack entry or local that already holds the name is
    /// updated; otherwise the value lands on the host node.
    pub fn set_variable(&mut self, name: &str, value: Value, with_stack: &[Object]) {
        if let Some((target_path, leaf)) = path::parse_path(name) {
            match self.find_target(&target_path) {
                Some(node) => node.set_member(&leaf, value),
                None => error!("find_target('{target_path}') failed while assigning '{name}'"),
            }
            return;
        }

        for object in with_stack.iter().rev() {
            if object.has_member(name) {
                object.set_member(name, value);
                return;
            }
        }

        if let Some(slot) = self.find_local(name) {
            if let Some(frame) = self.frames.last_mut() {
                frame.locals[slot].1 = value;
                return;
            }
        }

        self.target.set_member(name, value);
    }

    fn current_frame(&mut self) -> RuntimeResult<&mut CallFrame> {
        self.frames.last_mut().ok_or(RuntimeError::NoActiveFrame)
    }

    /// Appends a local without checking for an existing slot.
    pub fn add_local(&mut self, name: &str, value: Value) -> RuntimeResult<()> {
        if name.is_empty() {
            return Err(RuntimeError::EmptyLocalName);
        }
        self.current_frame()?.locals.push((name.to_string(), value));
        Ok(())
    }

    /// Updates the local in place, or appends it when absent.
    pub fn set_local(&mut self, name: &str, value: Value) -> RuntimeResult<()> {
        if name.is_empty() {
            return Err(RuntimeError::EmptyLocalName);
        }
        let frame = self.current_frame()?;
        match frame.position(name) {
            Some(slot) => frame.locals[slot].1 = value,
            None => frame.locals.push((name.to_string(), value)),
        }
        Ok(())
    }

    /// Declares an undefined local unless one already exists.
    pub fn declare_local(&mut self, name: &str) -> RuntimeResult<()> {
        if name.is_empty() {
            return Err(RuntimeError::EmptyLocalName);
        }
        let frame = self.current_frame()?;
        if frame.position(name).is_none() {
            frame.locals.push((name.to_string(), Value::Undefined));
        }
        Ok(())
    }

    /// Slot index of the most recent local called `name` in the open frame.
    pub fn find_local(&self, name: &str) -> Option<usize> {
        self.frames.last()?.position(name)
    }

    pub fn local(&self, name: &str) -> Option<&Value> {
        let frame = self.frames.last()?;
        frame.position(name).map(|slot| &frame.locals[slot].1)
    }

    /// Opens a call frame with a fresh register window.
    pub fn push_frame(&mut self, registers: usize) {
        self.frames.push(CallFrame::with_registers(registers));
    }

    /// Closes the innermost call frame. The top-level frame cannot be popped.
    pub fn pop_frame(&mut self) -> RuntimeResult<()> {
        if self.frames.len() <= 1 {
            return Err(RuntimeError::NoActiveFrame);
        }
        self.frames.pop();
        Ok(())
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    /// Register `index`, counted 1-based from the end of the active window.
    ///
    /// Out-of-range indices log and hand back the first global register.
    pub fn register(&mut self, index: i32) -> &mut Value {
        let size = self.frames.last().map_or(0, |frame| frame.registers.len());
        let in_range = usize::try_from(index).is_ok_and(|index| (1..=size).contains(&index));
        if !in_range {
            error!("register({index}) out of range for a window of {size}");
            return &mut self.global_registers[0];
        }
        let slot = size - index as usize;
        match self.frames.last_mut() {
            Some(frame) => &mut frame.registers[slot],
            None => &mut self.global_registers[0],
        }
    }

    /// Register from the global bank; indices wrap into the bank.
    pub fn global_register(&mut self, index: usize) -> &mut Value {
        &mut self.global_registers[index % GLOBAL_REGISTER_COUNT]
    }

    /// Resolves a path relative to the host node.
    pub fn find_target(&self, target_path: &str) -> Option<Node> {
        path::find_target(&self.target, target_path)
    }

    /// Resolves a value naming a node: node references directly, anything
    /// else through its text as a path.
    pub fn find_target_value(&self, value: &Value) -> Option<Node> {
        match value {
            Value::MovieNode(_) | Value::Object(_) => value.to_node(&self.root()),
            _ => self.find_target(&value.to_text()),
        }
    }

    /// Calls the function stored under `name`, returning Undefined when it
    /// is missing or not callable.
    pub fn call_function(&mut self, name: &str, args: &[Value]) -> Value {
        let value = self.get_variable(name, &[]);
        match value.as_function() {
            Some(function) => function.call(self, None, args),
            None => {
                debug!("call_function('{name}'): not a function ({})", value.to_debug_string());
                Value::Undefined
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlayerConfig;
    use crate::object::Function;

    fn fixture() -> (Environment, Node) {
        let root = Node::new("_level0");
        let clip = Node::new("clip");
        root.add_child(clip.clone());
        let vm = Vm::new(&PlayerConfig::default(), root.clone());
        (Environment::new(vm, root), clip)
    }

    #[test]
    fn locals_do_not_cross_frame_boundaries() {
        let (mut env, _) = fixture();
        env.add_local("x", Value::Number(1.0)).unwrap();
        env.push_frame(0);
        assert_eq!(env.find_local("x"), None);
        env.add_local("y", Value::Number(2.0)).unwrap();
        assert_eq!(env.find_local("y"), Some(0));
        env.pop_frame().unwrap();
        assert_eq!(env.find_local("y"), None);
        assert_eq!(env.find_local("x"), Some(0));
        assert_eq!(env.pop_frame(), Err(RuntimeError::NoActiveFrame));
    }

    #[test]
    fn local_declaration_primitives() {
        let (mut env, _) = fixture();
        env.set_local("a", Value::Number(1.0)).unwrap();
        env.set_local("a", Value::Number(2.0)).unwrap();
        env.declare_local("a").unwrap();
        env.declare_local("b").unwrap();
        assert!(env.local("a").unwrap().strictly_equals(&Value::Number(2.0)));
        assert!(env.local("b").unwrap().is_undefined());
        assert_eq!(env.add_local("", Value::Null), Err(RuntimeError::EmptyLocalName));
        assert_eq!(env.declare_local(""), Err(RuntimeError::EmptyLocalName));
    }

    #[test]
    fn registers_count_from_the_end_and_fall_back() {
        let (mut env, _) = fixture();
        env.push_frame(3);
        *env.register(1) = Value::from("last");
        *env.register(3) = Value::from("first");
        assert!(env.register(1).strictly_equals(&Value::from("last")));

        *env.register(0) = Value::from("fallback");
        assert!(env.register(4).strictly_equals(&Value::from("fallback")));
        assert!(env.register(-2).strictly_equals(&Value::from("fallback")));
        assert!(env.global_register(0).strictly_equals(&Value::from("fallback")));
        assert!(env.register(3).strictly_equals(&Value::from("first")));
    }

    #[test]
    fn resolution_precedence() {
        let (mut env, clip) = fixture();
        env.vm().global().set_member("speed", Value::Number(1.0));
        assert!(env.get_variable("speed", &[]).strictly_equals(&Value::Number(1.0)));

        env.target().set_member("speed", Value::Number(2.0));
        assert!(env.get_variable("speed", &[]).strictly_equals(&Value::Number(2.0)));

        env.add_local("speed", Value::Number(3.0)).unwrap();
        assert!(env.get_variable("speed", &[]).strictly_equals(&Value::Number(3.0)));

        let scope = Object::new();
        scope.set_member("speed", Value::Number(4.0));
        let inner = Object::new();
        inner.set_member("speed", Value::Number(5.0));
        let with_stack = [scope, inner];
        assert!(env
            .get_variable("speed", &with_stack)
            .strictly_equals(&Value::Number(5.0)));

        assert!(env.get_variable("this", &[]).strictly_equals(&Value::from(env.target())));
        assert!(env.get_variable("_root", &[]).strictly_equals(&Value::from(env.root())));
        assert!(env.get_variable("clip", &[]).strictly_equals(&Value::from(&clip)));
        assert!(matches!(env.get_variable("_global", &[]), Value::Object(_)));
        assert!(env.get_variable("missing", &[]).is_undefined());
    }

    #[test]
    fn assignment_updates_the_owning_scope() {
        let (mut env, _) = fixture();
        let scope = Object::new();
        scope.set_member("hp", Value::Number(10.0));
        let with_stack = [scope.clone()];

        env.set_variable("hp", Value::Number(9.0), &with_stack);
        assert!(scope.get_member("hp").unwrap().strictly_equals(&Value::Number(9.0)));
        assert!(!env.target().object().members().contains("hp"));

        env.add_local("count", Value::Number(0.0)).unwrap();
        env.set_variable("count", Value::Number(1.0), &with_stack);
        assert!(env.local("count").unwrap().strictly_equals(&Value::Number(1.0)));

        env.set_variable("fresh", Value::Bool(true), &with_stack);
        assert!(env.target().object().members().contains("fresh"));
    }

    #[test]
    fn qualified_names_skip_the_chain() {
        let (mut env, clip) = fixture();
        env.set_variable("clip.score", Value::Number(7.0), &[]);
        assert!(clip.get_member("score").unwrap().strictly_equals(&Value::Number(7.0)));
        assert!(env.get_variable("/clip:score", &[]).strictly_equals(&Value::Number(7.0)));
        assert!(env.get_variable("_level0.clip._name", &[]).strictly_equals(&Value::from("clip")));

        env.set_variable("missing.score", Value::Number(1.0), &[]);
        assert!(env.get_variable("missing.score", &[]).is_undefined());

        env.set_target(clip.clone());
        env.set_variable("/:lives", Value::Number(3.0), &[]);
        assert!(clip.get_member("lives").unwrap().strictly_equals(&Value::Number(3.0)));
        assert!(env.root().get_member("lives").is_none());
        assert!(env.get_variable("/:lives", &[]).strictly_equals(&Value::Number(3.0)));

        env.set_variable("_root:lives", Value::Number(5.0), &[]);
        assert!(env.root().get_member("lives").unwrap().strictly_equals(&Value::Number(5.0)));
    }

    #[test]
    fn call_function_by_name() {
        let (mut env, _) = fixture();
        let double = Function::with_params(&["n"], 0, |env, _| {
            Value::Number(env.get_variable("n", &[]).to_number(7) * 2.0)
        });
        env.vm().global().set_member("double", Value::from(double));
        let result = env.call_function("double", &[Value::Number(21.0)]);
        assert!(result.strictly_equals(&Value::Number(42.0)));
        assert!(env.call_function("nothing", &[]).is_undefined());
        assert_eq!(env.frame_depth(), 1);
    }
}
