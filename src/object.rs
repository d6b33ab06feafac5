use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use log::warn;
use parking_lot::RwLock;

use crate::environment::Environment;
use crate::node::{Node, NodeState};
use crate::value::Value;

/// Ordered name -> value table backing every object's own properties.
#[derive(Debug, Clone, Default)]
pub struct PropertyTable {
    entries: BTreeMap<String, Value>,
}

impl PropertyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    /// Exact match first, then the first ASCII case-insensitive match.
    pub fn get_ignore_case(&self, name: &str) -> Option<&Value> {
        self.entries.get(name).or_else(|| {
            self.entries
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value)
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(name.into(), value)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.entries.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub(crate) struct ObjectInner {
    pub(crate) members: RwLock<PropertyTable>,
    kind: ObjectKind,
}

enum ObjectKind {
    Plain,
    Function(FunctionBody),
    Node(Arc<NodeState>),
}

/// Shared handle to a script object. Clones share identity.
#[derive(Clone)]
pub struct Object(pub(crate) Arc<ObjectInner>);

impl Object {
    /// Creates an empty plain object.
    pub fn new() -> Self {
        Self::with_kind(ObjectKind::Plain)
    }

    fn with_kind(kind: ObjectKind) -> Self {
        Self(Arc::new(ObjectInner {
            members: RwLock::new(PropertyTable::new()),
            kind,
        }))
    }

    pub(crate) fn for_node(state: Arc<NodeState>) -> Self {
        Self::with_kind(ObjectKind::Node(state))
    }

    /// Reads a property. Nodes also expose built-in properties and children.
    pub fn get_member(&self, name: &str) -> Option<Value> {
        if let Some(node) = self.as_node() {
            return node.get_member(name);
        }
        self.0.members.read().get(name).cloned()
    }

    /// Case-insensitive property read, used for legacy method lookups.
    pub fn get_member_ignore_case(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.get_member(name) {
            return Some(value);
        }
        self.0.members.read().get_ignore_case(name).cloned()
    }

    pub fn set_member(&self, name: &str, value: Value) {
        if let Some(node) = self.as_node() {
            node.set_member(name, value);
            return;
        }
        self.0.members.write().insert(name, value);
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.get_member(name).is_some()
    }

    pub fn delete_member(&self, name: &str) -> bool {
        self.0.members.write().remove(name).is_some()
    }

    /// Snapshot of the object's own property table.
    pub fn members(&self) -> PropertyTable {
        self.0.members.read().clone()
    }

    /// Capability query: the callable behind this object, if any.
    pub fn as_function(&self) -> Option<Function> {
        match &self.0.kind {
            ObjectKind::Function(body) => Some(Function {
                object: self.clone(),
                body: body.clone(),
            }),
            _ => None,
        }
    }

    /// Capability query: the scene node behind this object, if any.
    pub fn as_node(&self) -> Option<Node> {
        match &self.0.kind {
            ObjectKind::Node(state) => Some(Node::from_parts(self.clone(), Arc::clone(state))),
            _ => None,
        }
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn downgrade(&self) -> WeakObject {
        WeakObject(Arc::downgrade(&self.0))
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Object {}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.0.kind {
            ObjectKind::Plain => "object",
            ObjectKind::Function(_) => "function",
            ObjectKind::Node(_) => "node",
        };
        write!(f, "Object({kind}@{:p})", Arc::as_ptr(&self.0))
    }
}

/// Non-owning handle, used for parent links in the scene tree.
#[derive(Clone, Default)]
pub(crate) struct WeakObject(Weak<ObjectInner>);

impl WeakObject {
    pub(crate) fn upgrade(&self) -> Option<Object> {
        self.0.upgrade().map(Object)
    }
}

/// Arguments handed to a native function body.
pub struct FnCall<'a> {
    pub this: Option<&'a Object>,
    pub args: &'a [Value],
}

impl FnCall<'_> {
    /// Returns the positional argument, or Undefined when it was not passed.
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or_default()
    }
}

type NativeFn = dyn Fn(&mut Environment, &FnCall<'_>) -> Value + Send + Sync;

#[derive(Clone)]
struct FunctionBody {
    native: Arc<NativeFn>,
    params: Arc<[String]>,
    registers: usize,
}

/// Typed handle to a callable object.
#[derive(Clone)]
pub struct Function {
    object: Object,
    body: FunctionBody,
}

impl Function {
    /// Wraps a native body taking no declared parameters.
    pub fn native<F>(body: F) -> Self
    where
        F: Fn(&mut Environment, &FnCall<'_>) -> Value + Send + Sync + 'static,
    {
        Self::with_params(&[], 0, body)
    }

    /// Wraps a native body whose arguments are also bound as locals named
    /// `params`, with a register window of `registers` slots.
    pub fn with_params<F>(params: &[&str], registers: usize, body: F) -> Self
    where
        F: Fn(&mut Environment, &FnCall<'_>) -> Value + Send + Sync + 'static,
    {
        let body = FunctionBody {
            native: Arc::new(body),
            params: params.iter().map(|name| name.to_string()).collect(),
            registers,
        };
        let object = Object::with_kind(ObjectKind::Function(body.clone()));
        Self { object, body }
    }

    pub fn object(&self) -> &Object {
        &self.object
    }

    pub fn into_object(self) -> Object {
        self.object
    }

    /// Invokes the function in a fresh call frame.
    ///
    /// When `this` is a node it becomes the host node for the duration of
    /// the call, so bare names resolve against its properties.
    pub fn call(&self, env: &mut Environment, this: Option<&Object>, args: &[Value]) -> Value {
        let previous_target = this
            .and_then(Object::as_node)
            .map(|node| env.replace_target(node));

        env.push_frame(self.body.registers);
        for (index, name) in self.body.params.iter().enumerate() {
            let value = args.get(index).cloned().unwrap_or_default();
            if let Err(err) = env.add_local(name, value) {
                warn!("cannot bind parameter {index}: {err}");
            }
        }

        let result = (self.body.native)(env, &FnCall { this, args });

        if let Err(err) = env.pop_frame() {
            warn!("call frame mismatch after function returned: {err}");
        }
        if let Some(target) = previous_target {
            env.replace_target(target);
        }
        result
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        self.object.ptr_eq(&other.object)
    }
}

impl Eq for Function {}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("object", &self.object)
            .field("params", &self.body.params)
            .finish()
    }
}
