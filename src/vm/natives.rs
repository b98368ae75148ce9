//! Built-in higher-order natives: `map`, `filter`, `forEach`.
//!
//! Each takes a collection and a function and calls back into the engine
//! through [`Vm::call_function`].

use crate::error::RuntimeError;

use super::value::{NativeFunction, Value};
use super::vm::Vm;

/// Register the built-ins on a fresh engine.
pub fn install(vm: &mut Vm) {
    vm.register_native(NativeFunction::new("map", 2, native_map));
    vm.register_native(NativeFunction::new("filter", 2, native_filter));
    vm.register_native(NativeFunction::new("forEach", 2, native_for_each));
}

fn split_args(name: &str, args: Vec<Value>) -> Result<(Vec<Value>, Value), RuntimeError> {
    let [items, callback]: [Value; 2] = args
        .try_into()
        .map_err(|args: Vec<Value>| RuntimeError::wrong_arity(name, 2, args.len()))?;
    if !callback.is_callable() {
        return Err(RuntimeError::host(
            name,
            format!("expected a function, got {}", callback.type_name()),
        ));
    }
    Ok((items.iter_values()?, callback))
}

fn native_map(vm: &mut Vm, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let (items, callback) = split_args("map", args)?;
    let mut mapped = Vec::with_capacity(items.len());
    for item in items {
        mapped.push(vm.call_function(&callback, vec![item])?);
    }
    Ok(Value::list(mapped))
}

fn native_filter(vm: &mut Vm, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let (items, callback) = split_args("filter", args)?;
    let mut kept = Vec::new();
    for item in items {
        if vm.call_function(&callback, vec![item.clone()])?.is_truthy() {
            kept.push(item);
        }
    }
    Ok(Value::list(kept))
}

fn native_for_each(vm: &mut Vm, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let (items, callback) = split_args("forEach", args)?;
    for item in items {
        vm.call_function(&callback, vec![item])?;
    }
    Ok(Value::Absent)
}
