//! Functions and objects installed on every runtime's global object.

use std::time::Duration;

use log::warn;

use crate::environment::Environment;
use crate::object::{FnCall, Function, Object};
use crate::timer::IntervalTimer;
use crate::value::Value;
use crate::vm::Vm;

pub(crate) fn install(global: &Object) {
    global.set_member("trace", Function::native(trace).into());
    global.set_member(
        "setInterval",
        Function::native(|env, call| schedule(env, call, true)).into(),
    );
    global.set_member(
        "setTimeout",
        Function::native(|env, call| schedule(env, call, false)).into(),
    );
    global.set_member("clearInterval", Function::native(clear_interval).into());
    global.set_member("clearTimeout", Function::native(clear_interval).into());
    global.set_member("random", Function::native(random).into());
    global.set_member(
        "Mouse",
        listener_registry(Vm::add_mouse_listener, Vm::remove_mouse_listener).into(),
    );
    global.set_member(
        "Key",
        listener_registry(Vm::add_keypress_listener, Vm::remove_keypress_listener).into(),
    );
}

fn trace(env: &mut Environment, call: &FnCall<'_>) -> Value {
    let line = call.arg(0).to_text_versioned_in(env);
    env.vm().trace(line);
    Value::Undefined
}

/// `setInterval(fn, ms, args...)` or `setInterval(object, "method", ms,
/// args...)`. Returns the timer id, or undefined for unusable arguments.
fn schedule(env: &mut Environment, call: &FnCall<'_>, repeat: bool) -> Value {
    let first = call.arg(0);
    let (function, this, rest) = match first.as_function() {
        Some(function) => (function, None, 1),
        None => {
            let Some(object) = first.as_object().cloned().or_else(|| {
                first.to_node(&env.root()).map(|node| node.object().clone())
            }) else {
                warn!("setInterval: {} is not callable", first.to_debug_string());
                return Value::Undefined;
            };
            let name = call.arg(1).to_text();
            let Some(function) = object.get_member(&name).and_then(|method| method.as_function())
            else {
                warn!("setInterval: object has no method '{name}'");
                return Value::Undefined;
            };
            (function, Some(object), 2)
        }
    };

    let millis = call.arg(rest).to_number_in(env);
    let millis = if millis.is_finite() && millis > 0.0 { millis } else { 0.0 };
    let args = call.args.get(rest + 1..).unwrap_or_default().to_vec();

    let mut timer = IntervalTimer::new(function, Duration::from_secs_f64(millis / 1000.0))
        .with_args(args);
    if let Some(this) = this {
        timer = timer.with_this(this);
    }
    if !repeat {
        timer = timer.once();
    }
    Value::from(env.vm().add_interval_timer(timer))
}

fn clear_interval(env: &mut Environment, call: &FnCall<'_>) -> Value {
    let id = call.arg(0).to_number_in(env);
    if !(id.fract() == 0.0 && id >= 0.0 && id <= f64::from(u32::MAX)) {
        return Value::Bool(false);
    }
    Value::Bool(env.vm().clear_interval_timer(id as u32))
}

/// `random(n)`: integer in `0..n` from the runtime's shared generator.
fn random(env: &mut Environment, call: &FnCall<'_>) -> Value {
    let bound = call.arg(0).to_number_in(env);
    let bound = if bound.is_finite() && bound > 0.0 {
        bound.min(f64::from(u32::MAX)) as u32
    } else {
        0
    };
    Value::from(env.vm().random_below(bound))
}

fn listener_registry(
    add: fn(&Vm, Object) -> bool,
    remove: fn(&Vm, &Object) -> bool,
) -> Object {
    let registry = Object::new();
    registry.set_member(
        "addListener",
        Function::native(move |env, call| match listener_object(env, &call.arg(0)) {
            Some(listener) => Value::Bool(add(env.vm(), listener)),
            None => Value::Bool(false),
        })
        .into(),
    );
    registry.set_member(
        "removeListener",
        Function::native(move |env, call| match listener_object(env, &call.arg(0)) {
            Some(listener) => Value::Bool(remove(env.vm(), &listener)),
            None => Value::Bool(false),
        })
        .into(),
    );
    registry
}

fn listener_object(env: &Environment, value: &Value) -> Option<Object> {
    match value {
        Value::MovieNode(_) => value.to_node(&env.root()).map(|node| node.object().clone()),
        _ => value.as_object().cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlayerConfig;
    use crate::node::Node;

    fn environment() -> Environment {
        let root = Node::new("_level0");
        let vm = Vm::new(&PlayerConfig::default(), root.clone());
        Environment::new(vm, root)
    }

    #[test]
    fn trace_collects_text() {
        let mut env = environment();
        env.call_function("trace", &[Value::Number(1.5)]);
        env.call_function("trace", &[Value::Undefined]);
        assert_eq!(env.vm().take_trace_output(), vec!["1.5", "undefined"]);
    }

    #[test]
    fn set_interval_returns_increasing_ids() {
        let mut env = environment();
        let callback = Value::from(Function::native(|_, _| Value::Undefined));
        let first = env.call_function("setInterval", &[callback.clone(), Value::Number(10.0)]);
        let second = env.call_function("setTimeout", &[callback, Value::Number(10.0)]);
        assert!(first.strictly_equals(&Value::Number(1.0)));
        assert!(second.strictly_equals(&Value::Number(2.0)));

        let cleared = env.call_function("clearInterval", &[first.clone()]);
        assert!(cleared.strictly_equals(&Value::Bool(true)));
        let again = env.call_function("clearInterval", &[first]);
        assert!(again.strictly_equals(&Value::Bool(true)));
        let unknown = env.call_function("clearInterval", &[Value::Number(9.0)]);
        assert!(unknown.strictly_equals(&Value::Bool(false)));
        let fractional = env.call_function("clearInterval", &[Value::Number(2.5)]);
        assert!(fractional.strictly_equals(&Value::Bool(false)));

        let invalid = env.call_function("setInterval", &[Value::Number(3.0)]);
        assert!(invalid.is_undefined());
    }

    #[test]
    fn set_interval_accepts_object_and_method_name() {
        let mut env = environment();
        let object = Object::new();
        object.set_member("tick", Function::native(|_, _| Value::Undefined).into());
        let id = env.call_function(
            "setInterval",
            &[Value::Object(object), Value::from("tick"), Value::Number(5.0)],
        );
        assert!(id.strictly_equals(&Value::Number(1.0)));
        assert_eq!(env.vm().timers().lock().len(), 1);
    }

    #[test]
    fn random_stays_in_range() {
        let mut env = environment();
        for _ in 0..20 {
            let value = env.call_function("random", &[Value::Number(6.0)]).to_number(7);
            assert!((0.0..6.0).contains(&value));
        }
        assert!(env
            .call_function("random", &[Value::from("nope")])
            .strictly_equals(&Value::Number(0.0)));
    }

    #[test]
    fn listener_registries() {
        let mut env = environment();
        let listener = Value::Object(Object::new());
        let mouse = env.get_variable("Mouse", &[]);
        let add = mouse.as_object().unwrap().get_member("addListener").unwrap();
        let added = add.as_function().unwrap().call(&mut env, None, &[listener.clone()]);
        assert!(added.strictly_equals(&Value::Bool(true)));
        assert_eq!(env.vm().mouse_listeners().len(), 1);

        let key = env.get_variable("Key", &[]);
        let remove = key.as_object().unwrap().get_member("removeListener").unwrap();
        let removed = remove.as_function().unwrap().call(&mut env, None, &[listener]);
        assert!(removed.strictly_equals(&Value::Bool(false)));
    }
}
