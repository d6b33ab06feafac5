use std::cell::RefCell;

use mlua::{
    Lua, LuaSerdeExt, MetaMethod, Result as LuaResult, Scope, UserData, UserDataMethods,
    Value as LuaValue, Variadic,
};

use crate::action::ActionBuffer;
use crate::environment::Environment;
use crate::node::Node;
use crate::object::Object;
use crate::value::{number_to_string, Value};

/// Environment borrowed by one action for the duration of a Lua scope.
pub(super) type SharedEnvironment<'a> = RefCell<&'a mut Environment>;

/// Installs the host API for one action run. The functions only live as
/// long as `scope`; every run installs fresh ones.
pub(super) fn register_globals<'lua, 'scope, 'env: 'scope>(
    lua: &'lua Lua,
    scope: &Scope<'lua, 'scope>,
    env: &'scope SharedEnvironment<'env>,
) -> LuaResult<()> {
    let globals = lua.globals();
    globals.set("target", env.borrow().target().target_path())?;
    globals.set("version", env.borrow().version())?;

    let get_variable = scope.create_function(move |lua, name: String| {
        let env = env.borrow();
        let value = env.get_variable(&name, &[]);
        value_to_lua(lua, &value, &env.root())
    })?;
    globals.set("get_variable", get_variable)?;

    let set_variable = scope.create_function(move |_, (name, value): (String, LuaValue)| {
        let value = lua_to_value(value)?;
        env.borrow_mut().set_variable(&name, value, &[]);
        Ok(())
    })?;
    globals.set("set_variable", set_variable)?;

    let trace = scope.create_function(move |_, values: Variadic<LuaValue>| {
        let mut guard = env.borrow_mut();
        let env: &mut Environment = &mut guard;
        let mut parts = Vec::with_capacity(values.len());
        for value in values.into_iter() {
            parts.push(lua_to_value(value)?.to_text_versioned_in(env));
        }
        env.vm().trace(parts.join(" "));
        Ok(())
    })?;
    globals.set("trace", trace.clone())?;
    globals.set("print", trace)?;

    let call_function =
        scope.create_function(move |lua, (name, args): (String, Variadic<LuaValue>)| {
            let args = args
                .into_iter()
                .map(lua_to_value)
                .collect::<LuaResult<Vec<_>>>()?;
            let mut guard = env.borrow_mut();
            let result = guard.call_function(&name, &args);
            value_to_lua(lua, &result, &guard.root())
        })?;
    globals.set("call_function", call_function)?;

    let call_method = scope.create_function(
        move |lua, (object, name, args): (LuaValue, String, Variadic<LuaValue>)| {
            let object = match lua_to_value(object)? {
                Value::String(path) | Value::MovieNode(path) => lua_object(&env.borrow(), &path),
                other => other.as_object().cloned(),
            };
            let Some(object) = object else {
                return Ok(LuaValue::Nil);
            };
            let Some(method) = object.get_member(&name).and_then(|value| value.as_function())
            else {
                return Ok(LuaValue::Nil);
            };
            let args = args
                .into_iter()
                .map(lua_to_value)
                .collect::<LuaResult<Vec<_>>>()?;
            let mut guard = env.borrow_mut();
            let env: &mut Environment = &mut guard;
            let result = method.call(env, Some(&object), &args);
            value_to_lua(lua, &result, &env.root())
        },
    )?;
    globals.set("call_method", call_method)?;

    let queue_action = scope.create_function(move |_, (label, source): (String, String)| {
        let env = env.borrow();
        let buffer = ActionBuffer::from_source(label, &source);
        env.vm().queue().push_code(buffer, env.target().clone());
        Ok(())
    })?;
    globals.set("queue_action", queue_action)?;

    let bounds = scope.create_function(move |lua, path: Option<String>| {
        let env = env.borrow();
        let node = match path {
            Some(path) => env.find_target(&path),
            None => Some(env.target().clone()),
        };
        match node {
            Some(node) => lua.to_value(&node.bounds()),
            None => Ok(LuaValue::Nil),
        }
    })?;
    globals.set("bounds", bounds)?;

    Ok(())
}

/// Resolves a target path, as passed by scripts, to the node's object.
fn lua_object(env: &Environment, path: &str) -> Option<Object> {
    env.find_target(path).map(|node| node.object().clone())
}

pub(super) fn value_to_lua<'lua>(
    lua: &'lua Lua,
    value: &Value,
    root: &Node,
) -> LuaResult<LuaValue<'lua>> {
    let object = match value {
        Value::Undefined | Value::Null => return Ok(LuaValue::Nil),
        Value::Bool(flag) => return Ok(LuaValue::Boolean(*flag)),
        Value::Number(number) => return Ok(LuaValue::Number(*number)),
        Value::String(text) => return lua.create_string(text).map(LuaValue::String),
        Value::Object(object) => object.clone(),
        Value::Function(function) => function.object().clone(),
        Value::MovieNode(_) => match value.to_node(root) {
            Some(node) => node.object().clone(),
            None => return Ok(LuaValue::Nil),
        },
    };
    let userdata = LuaObject {
        object,
        root: root.clone(),
    };
    lua.create_userdata(userdata).map(LuaValue::UserData)
}

pub(super) fn lua_to_value(value: LuaValue<'_>) -> LuaResult<Value> {
    match value {
        LuaValue::Nil => Ok(Value::Undefined),
        LuaValue::Boolean(flag) => Ok(Value::Bool(flag)),
        LuaValue::Integer(number) => Ok(Value::Number(number as f64)),
        LuaValue::Number(number) => Ok(Value::Number(number)),
        LuaValue::String(text) => Ok(Value::from(text.to_str()?)),
        LuaValue::UserData(userdata) => {
            let object = userdata.borrow::<LuaObject>()?;
            Ok(Value::from(object.object.clone()))
        }
        LuaValue::Table(table) => {
            let object = Object::new();
            for pair in table.pairs::<LuaValue, LuaValue>() {
                let (key, value) = pair?;
                let key = match key {
                    LuaValue::String(text) => text.to_str()?.to_string(),
                    LuaValue::Integer(index) => index.to_string(),
                    LuaValue::Number(number) => number_to_string(number),
                    _ => continue,
                };
                object.set_member(&key, lua_to_value(value)?);
            }
            Ok(Value::Object(object))
        }
        other => Err(mlua::Error::FromLuaConversionError {
            from: other.type_name(),
            to: "Value",
            message: Some("only plain data and runtime objects cross into scripts".into()),
        }),
    }
}

/// Script object exposed to Lua. Property reads and writes go straight to
/// the runtime object, so nodes keep their built-in properties.
struct LuaObject {
    object: Object,
    root: Node,
}

impl UserData for LuaObject {
    fn add_methods<'lua, M: UserDataMethods<'lua, Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::Index, |lua, this, key: String| {
            match this.object.get_member(&key) {
                Some(value) => value_to_lua(lua, &value, &this.root),
                None => Ok(LuaValue::Nil),
            }
        });
        methods.add_meta_method(
            MetaMethod::NewIndex,
            |_, this, (key, value): (String, LuaValue)| {
                this.object.set_member(&key, lua_to_value(value)?);
                Ok(())
            },
        );
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(Value::from(this.object.clone()).to_text())
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_values_convert_both_ways() {
        let lua = Lua::new();
        let root = Node::new("_level0");
        let text = value_to_lua(&lua, &Value::from("hi"), &root).unwrap();
        assert!(lua_to_value(text).unwrap().strictly_equals(&Value::from("hi")));
        assert!(matches!(
            value_to_lua(&lua, &Value::Null, &root).unwrap(),
            LuaValue::Nil
        ));
        assert!(lua_to_value(LuaValue::Integer(4))
            .unwrap()
            .strictly_equals(&Value::Number(4.0)));
        assert!(lua_to_value(LuaValue::Nil).unwrap().is_undefined());
    }

    #[test]
    fn tables_become_objects() {
        let lua = Lua::new();
        let table: LuaValue = lua.load("{ name = 'box', 10, flag = true }").eval().unwrap();
        let value = lua_to_value(table).unwrap();
        let object = value.as_object().unwrap();
        assert!(object.get_member("name").unwrap().strictly_equals(&Value::from("box")));
        assert!(object.get_member("1").unwrap().strictly_equals(&Value::Number(10.0)));
        assert!(object.get_member("flag").unwrap().strictly_equals(&Value::Bool(true)));
    }

    #[test]
    fn dangling_nodes_become_nil() {
        let lua = Lua::new();
        let root = Node::new("_level0");
        let gone = Value::MovieNode("_level0.gone".into());
        assert!(matches!(value_to_lua(&lua, &gone, &root).unwrap(), LuaValue::Nil));
    }

    #[test]
    fn object_userdata_reads_and_writes_members() {
        let lua = Lua::new();
        let root = Node::new("_level0");
        let clip = Node::new("clip");
        root.add_child(clip.clone());
        let value = value_to_lua(&lua, &Value::from(&clip), &root).unwrap();
        lua.globals().set("clip", value).unwrap();

        let (name, text): (String, String) = lua
            .load("clip._x = 15 clip.hp = 3 return clip._name, tostring(clip)")
            .eval()
            .unwrap();
        assert_eq!(name, "clip");
        assert_eq!(text, "_level0.clip");
        assert_eq!(clip.position().x, 15.0);
        assert!(clip.get_member("hp").unwrap().strictly_equals(&Value::Number(3.0)));
    }
}
