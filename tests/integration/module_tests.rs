//! Modules and global-binding snapshots.

use std::rc::Rc;

use deeppickle::vm::{CodeBuilder, Interpreter, ModuleOrigin, Value};

use crate::common::{call, func, function_in, roundtrip, scratch_module};

#[test]
fn test_globals_keep_only_referenced_names() {
    let mut interp = Interpreter::new();
    let module = scratch_module(&mut interp);
    module.set("ONE", Value::Int(1));
    module.set("TWO", Value::Int(2));
    let mut b = CodeBuilder::new("f");
    b.load_global("ONE").return_value();
    let f = function_in(&module, b);

    let decoded = roundtrip(&mut interp, &f);
    let globals = func(&decoded).globals.clone();
    let globals = globals.borrow();
    assert_eq!(globals.get_str("ONE").unwrap().as_int(), Some(1));
    assert!(!globals.contains_str("TWO"));
    assert!(!globals.contains_str("__builtins__"));
    assert_eq!(globals.len(), 1);
}

#[test]
fn test_builtins_kept_when_a_name_falls_through() {
    let mut interp = Interpreter::new();
    let module = scratch_module(&mut interp);
    let mut b = CodeBuilder::new("size").params(&["s"]);
    b.load_global("len").load_fast("s").call(1).return_value();
    let f = function_in(&module, b);

    let decoded = roundtrip(&mut interp, &f);
    assert!(func(&decoded).globals.borrow().contains_str("__builtins__"));
    assert_eq!(call(&mut interp, &decoded, &[Value::str("abcd")]).as_int(), Some(4));
}

#[test]
fn test_nested_code_names_count_as_referenced() {
    let mut interp = Interpreter::new();
    let module = scratch_module(&mut interp);
    module.set("LIMIT", Value::Int(7));
    module.set("UNUSED", Value::Int(0));

    let mut inner = CodeBuilder::new("inner");
    inner.load_global("LIMIT").return_value();
    let inner = Rc::new(inner.build().unwrap());
    let mut outer = CodeBuilder::new("outer");
    outer
        .load_const(Value::Code(inner))
        .load_const(Value::str("outer.<locals>.inner"))
        .make_function(deeppickle::vm::MakeFunctionFlags(0))
        .return_value();
    let outer = function_in(&module, outer);

    let decoded = roundtrip(&mut interp, &outer);
    assert!(func(&decoded).globals.borrow().contains_str("LIMIT"));
    assert!(!func(&decoded).globals.borrow().contains_str("UNUSED"));
    let inner = call(&mut interp, &decoded, &[]);
    assert_eq!(call(&mut interp, &inner, &[]).as_int(), Some(7));
}

#[test]
fn test_functions_in_one_session_share_snapshots() {
    let mut interp = Interpreter::new();
    let module = scratch_module(&mut interp);
    module.set("ONE", Value::Int(1));
    let mut b = CodeBuilder::new("f");
    b.load_global("ONE").return_value();
    let f = function_in(&module, b);

    let decoded = roundtrip(&mut interp, &Value::list(vec![f.clone(), f]));
    let Value::List(items) = &decoded else { panic!("expected list") };
    let items = items.borrow();
    assert!(items[0].is(&items[1]));
    assert!(Rc::ptr_eq(&func(&items[0]).globals, &func(&items[1]).globals));
}

#[test]
fn test_sys_decodes_to_the_live_module() {
    let mut interp = Interpreter::new();
    let sys = interp.module("sys").unwrap();
    let decoded = roundtrip(&mut interp, &Value::Module(sys.clone()));
    let Value::Module(decoded) = decoded else { panic!("expected module") };
    assert!(Rc::ptr_eq(&decoded, &sys));
}

#[test]
fn test_dynamic_module_is_rebuilt() {
    let mut interp = Interpreter::new();
    let module = interp.new_module("plugin", ModuleOrigin::Dynamic);
    module.set("answer", Value::Int(42));
    module.set("self_ref", Value::Module(module.clone()));

    let decoded = roundtrip(&mut interp, &Value::Module(module.clone()));
    let Value::Module(decoded) = &decoded else { panic!("expected module") };
    assert!(!Rc::ptr_eq(decoded, &module));
    assert_eq!(&*decoded.name, "plugin");
    assert_eq!(decoded.get("answer").and_then(|v| v.as_int()), Some(42));
    let self_ref = decoded.get("self_ref").unwrap();
    assert!(matches!(&self_ref, Value::Module(m) if Rc::ptr_eq(m, decoded)));
}

#[test]
fn test_native_function_by_reference() {
    let mut interp = Interpreter::new();
    let len = interp.find_global("builtins", "len").unwrap();
    let decoded = roundtrip(&mut interp, &len);
    assert!(decoded.is(&len));
}

#[test]
fn test_module_dict_stays_aliased() {
    // [m.__dict__, m]
    let mut interp = Interpreter::new();
    let module = scratch_module(&mut interp);
    module.set("answer", Value::Int(42));
    let value = Value::list(vec![Value::Dict(module.dict()), Value::Module(module.clone())]);

    let decoded = roundtrip(&mut interp, &value);
    let Value::List(items) = &decoded else { panic!("expected list") };
    let items = items.borrow();
    let Value::Module(m) = &items[1] else { panic!("expected module") };
    assert!(items[0].is(&Value::Dict(m.dict())));
    assert_eq!(m.get("answer").and_then(|v| v.as_int()), Some(42));
}
