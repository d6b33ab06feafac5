//! Dynamically-typed script values and their coercion rules.
//!
//! Coercions come in two flavours: context-free ones that only need the
//! scripting version, and `*_in` variants that receive the running
//! [`Environment`] so user-level `toString`/`valueOf` methods can be invoked.

mod number;

use std::fmt;
use std::sync::Arc;

use log::{debug, error};

use crate::environment::Environment;
use crate::node::Node;
use crate::object::{Function, Object};
use crate::path;

pub use number::{number_to_string, parse_number};

/// A script value. Exactly one variant is active at a time.
///
/// Derived text and numbers are computed on demand, so assigning a new value
/// can never leave a stale representation behind.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Object(Object),
    Function(Function),
    /// Soft reference to a scene node, stored as its dot-form target path
    /// and re-resolved on every access.
    MovieNode(String),
}

impl Value {
    /// Wraps an object, routing nodes and functions to their own variants.
    pub fn from_object(object: Object) -> Self {
        if let Some(node) = object.as_node() {
            return Value::MovieNode(node.target_path());
        }
        if let Some(function) = object.as_function() {
            return Value::Function(function);
        }
        Value::Object(object)
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    /// Returns the referenced object for the Object and Function variants.
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            Value::Function(function) => Some(function.object()),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<Function> {
        match self {
            Value::Function(function) => Some(function.clone()),
            Value::Object(object) => object.as_function(),
            _ => None,
        }
    }

    /// Resolves a node reference against the tree rooted at `root`.
    ///
    /// A path that no longer resolves yields `None`, never a stale handle.
    pub fn to_node(&self, root: &Node) -> Option<Node> {
        match self {
            Value::MovieNode(target) => {
                let node = path::find_target(root, target);
                if node.is_none() {
                    error!("node value is a dangling reference: target '{target}' not found");
                }
                node
            }
            Value::Object(object) => object.as_node(),
            _ => None,
        }
    }

    /// Script-visible type name, as reported by `typeof`.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
            Value::MovieNode(_) => "movieclip",
        }
    }

    pub fn to_debug_string(&self) -> String {
        match self {
            Value::Undefined => "[undefined]".to_string(),
            Value::Null => "[null]".to_string(),
            Value::Bool(value) => format!("[bool:{value}]"),
            Value::Number(value) => format!("[number:{}]", number_to_string(*value)),
            Value::String(value) => format!("[string:{value}]"),
            Value::Object(object) => format!("[object:{:p}]", Arc::as_ptr(&object.0)),
            Value::Function(function) => {
                format!("[function:{:p}]", Arc::as_ptr(&function.object().0))
            }
            Value::MovieNode(target) => format!("[movieclip:{target}]"),
        }
    }

    /// Text form without an environment: user `toString` is never invoked.
    pub fn to_text(&self) -> String {
        self.text_with(None)
    }

    /// Text form that may invoke a user-level `toString` method.
    pub fn to_text_in(&self, env: &mut Environment) -> String {
        self.text_with(Some(env))
    }

    /// Like [`Value::to_text`], except Undefined renders as "" below version 7.
    pub fn to_text_versioned(&self, version: u8) -> String {
        if self.is_undefined() && version <= 6 {
            return String::new();
        }
        self.to_text()
    }

    pub fn to_text_versioned_in(&self, env: &mut Environment) -> String {
        if self.is_undefined() && env.version() <= 6 {
            return String::new();
        }
        self.to_text_in(env)
    }

    fn text_with(&self, env: Option<&mut Environment>) -> String {
        match self {
            Value::String(text) | Value::MovieNode(text) => text.clone(),
            Value::Number(value) => number_to_string(*value),
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(value) => value.to_string(),
            Value::Object(object) => reference_text(object, "[type Object]", env),
            Value::Function(function) => {
                reference_text(function.object(), "[type Function]", env)
            }
        }
    }

    /// Numeric form without an environment.
    pub fn to_number(&self, version: u8) -> f64 {
        self.number_with(version, None)
    }

    /// Numeric form that may invoke a user-level `valueOf` method.
    pub fn to_number_in(&self, env: &mut Environment) -> f64 {
        let version = env.version();
        self.number_with(version, Some(env))
    }

    fn number_with(&self, version: u8, env: Option<&mut Environment>) -> f64 {
        match self {
            Value::String(text) => parse_number(text),
            Value::Undefined | Value::Null => {
                if version >= 7 {
                    f64::NAN
                } else {
                    0.0
                }
            }
            Value::Bool(value) => {
                if *value {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(value) => *value,
            Value::Object(_) | Value::Function(_) => {
                if let (Some(object), Some(env)) = (self.as_object(), env) {
                    match call_user_method(object, "valueOf", env) {
                        Some(Value::Number(value)) => return value,
                        Some(other) => debug!(
                            "valueOf() did not return a number: {}",
                            other.to_debug_string()
                        ),
                        None => {}
                    }
                }
                if matches!(self, Value::Function(_)) && version < 6 {
                    0.0
                } else {
                    f64::NAN
                }
            }
            Value::MovieNode(_) => f64::NAN,
        }
    }

    /// Truthiness, following the rules of the given scripting version.
    pub fn to_bool(&self, version: u8) -> bool {
        match self {
            Value::String(text) => {
                if version >= 7 {
                    return !text.is_empty();
                }
                match text.as_str() {
                    "false" => false,
                    "true" => true,
                    _ => {
                        let value = parse_number(text);
                        value != 0.0 && !value.is_nan()
                    }
                }
            }
            Value::Number(value) => {
                if version == 6 {
                    value.is_finite() && *value != 0.0
                } else {
                    *value != 0.0 && !value.is_nan()
                }
            }
            Value::Bool(value) => *value,
            Value::Object(_) | Value::Function(_) | Value::MovieNode(_) => true,
            Value::Undefined | Value::Null => false,
        }
    }

    /// Converts a reference to a primitive through its `valueOf` method;
    /// everything else (and objects without the method) is returned as is.
    pub fn to_primitive(&self, env: &mut Environment) -> Value {
        if let Some(object) = self.as_object() {
            if let Some(result) = call_user_method(object, "valueOf", env) {
                return result;
            }
        }
        self.clone()
    }

    /// Abstract equality without an environment. References compared against
    /// primitives are never equal here since `valueOf` cannot run.
    pub fn equals(&self, other: &Value, version: u8) -> bool {
        self.equals_with(other, version, None)
    }

    /// Abstract equality, converting references through `valueOf`.
    pub fn equals_in(&self, other: &Value, env: &mut Environment) -> bool {
        let version = env.version();
        self.equals_with(other, version, Some(env))
    }

    fn equals_with(&self, other: &Value, version: u8, env: Option<&mut Environment>) -> bool {
        let self_nullish = matches!(self, Value::Undefined | Value::Null);
        let other_nullish = matches!(other, Value::Undefined | Value::Null);
        if self_nullish || other_nullish {
            return self_nullish == other_nullish;
        }

        if let (Some(left), Some(right)) = (self.as_object(), other.as_object()) {
            return left.ptr_eq(right);
        }
        if std::mem::discriminant(self) == std::mem::discriminant(other) {
            return self.equals_same_type(other);
        }

        match (self, other) {
            (Value::Number(number), Value::String(text))
            | (Value::String(text), Value::Number(number)) => {
                return numbers_equal(*number, parse_number(text));
            }
            (Value::String(text), _) => return *text == other.text_with(env),
            (_, Value::String(text)) => return self.text_with(env) == *text,
            (Value::Bool(flag), _) => return *flag == other.to_bool(version),
            (_, Value::Bool(flag)) => return self.to_bool(version) == *flag,
            _ => {}
        }

        let (reference, primitive_side) = if self.as_object().is_some() {
            (self, other)
        } else if other.as_object().is_some() {
            (other, self)
        } else {
            return false;
        };
        let Some(env) = env else {
            return false;
        };
        let converted = reference.to_primitive(env);
        if converted.as_object().is_some() {
            return false;
        }
        converted.equals_with(primitive_side, version, Some(env))
    }

    /// Equality for two values of the same variant.
    ///
    /// NaN never equals anything, and negative zero equals positive zero.
    pub fn equals_same_type(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(left), Value::Bool(right)) => left == right,
            (Value::Number(left), Value::Number(right)) => numbers_equal(*left, *right),
            (Value::String(left), Value::String(right))
            | (Value::MovieNode(left), Value::MovieNode(right)) => left == right,
            (Value::Object(left), Value::Object(right)) => left.ptr_eq(right),
            (Value::Function(left), Value::Function(right)) => left == right,
            _ => false,
        }
    }

    /// Strict equality: the variants must match.
    pub fn strictly_equals(&self, other: &Value) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
            && self.equals_same_type(other)
    }

    /// Appends text, turning the value into a String.
    pub fn string_concat(&mut self, suffix: &str) {
        let mut text = self.to_text();
        text.push_str(suffix);
        *self = Value::String(text);
    }
}

fn numbers_equal(left: f64, right: f64) -> bool {
    // IEEE comparison already treats NaN as unequal and -0 as 0.
    left == right
}

fn reference_text(object: &Object, placeholder: &str, env: Option<&mut Environment>) -> String {
    if let Some(env) = env {
        match call_user_method(object, "toString", env) {
            Some(Value::String(text)) => return text,
            Some(other) => debug!(
                "toString() did not return a string: {}",
                other.to_debug_string()
            ),
            None => {}
        }
    }
    placeholder.to_string()
}

/// Looks up and invokes a zero-argument method on `object`.
///
/// Method names are matched case-insensitively below version 7.
fn call_user_method(object: &Object, name: &str, env: &mut Environment) -> Option<Value> {
    let method = if env.version() < 7 {
        object.get_member_ignore_case(name)
    } else {
        object.get_member(name)
    };
    let Some(method) = method else {
        debug!("get_member({name}) returned nothing");
        return None;
    };
    let Some(function) = method.as_function() else {
        debug!("{name} is not callable: {}", method.to_debug_string());
        return None;
    };
    Some(function.call(env, Some(object), &[]))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Value::from_object(object)
    }
}

impl From<Option<Object>> for Value {
    fn from(object: Option<Object>) -> Self {
        object.map_or(Value::Null, Value::from_object)
    }
}

impl From<Function> for Value {
    fn from(function: Function) -> Self {
        Value::Function(function)
    }
}

impl From<&Node> for Value {
    fn from(node: &Node) -> Self {
        Value::MovieNode(node.target_path())
    }
}

impl From<Node> for Value {
    fn from(node: Node) -> Self {
        Value::from(&node)
    }
}
