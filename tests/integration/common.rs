//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::rc::Rc;

use deeppickle::vm::{CodeBuilder, Function, Interpreter, MakeFunctionFlags, Module, ModuleOrigin, Value};
use deeppickle::{dumps, loads};

/// Encode with the default config and decode into the same interpreter.
pub fn roundtrip(interp: &mut Interpreter, value: &Value) -> Value {
    let bytes = dumps(interp, value).expect("encode");
    loads(interp, &bytes).expect("decode")
}

/// Compile `builder` into a function whose globals are `module`'s dict.
pub fn function_in(module: &Rc<Module>, builder: CodeBuilder) -> Value {
    let code = Rc::new(builder.build().expect("valid code"));
    Value::Function(Rc::new(Function::new(code, module.dict(), None, None, None)))
}

pub fn scratch_module(interp: &mut Interpreter) -> Rc<Module> {
    interp.new_module("scratch", ModuleOrigin::Dynamic)
}

/// `make()` returns `inner(y)`, which adds the captured `x = 1` to `y`.
pub fn closure_factory(interp: &mut Interpreter) -> Value {
    let module = scratch_module(interp);

    let mut inner = CodeBuilder::new("inner").params(&["y"]).freevars(&["x"]);
    inner.load_deref("x").load_fast("y").binary_add().return_value();
    let inner = Rc::new(inner.build().expect("valid code"));

    let mut make = CodeBuilder::new("make").cellvars(&["x"]);
    make.load_const(Value::Int(1))
        .store_deref("x")
        .load_closure("x")
        .build_tuple(1)
        .load_const(Value::Code(inner))
        .load_const(Value::str("make.<locals>.inner"))
        .make_function(MakeFunctionFlags::CLOSURE)
        .return_value();
    let make = function_in(&module, make);
    module.set("make", make.clone());
    make
}

pub fn call(interp: &mut Interpreter, callable: &Value, args: &[Value]) -> Value {
    interp.call(callable, args, &[]).expect("call")
}

pub fn func(value: &Value) -> &Rc<Function> {
    value.as_function().expect("a function")
}
