//! Sample object graphs for `dump-demo`

use std::rc::Rc;

use anyhow::{bail, Result};
use clap::ValueEnum;
use deeppickle::vm::{
    CmpOp, CodeBuilder, Dict, Function, Interpreter, MakeFunctionFlags, ModuleOrigin, Value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Demo {
    /// `inner(y)` closing over `x = 1`; call with 5 to get 6
    Closure,
    /// Recursive `fact(n)` reaching itself through its globals
    Factorial,
    /// Function whose default argument is a dict holding the function
    Cycle,
    /// Instance of a class with a custom metaclass and a method
    Class,
}

pub fn build(interp: &mut Interpreter, demo: Demo) -> Result<Value> {
    match demo {
        Demo::Closure => closure(interp),
        Demo::Factorial => factorial(interp),
        Demo::Cycle => cycle(interp),
        Demo::Class => class(interp),
    }
}

fn closure(interp: &mut Interpreter) -> Result<Value> {
    let module = interp.new_module("demo", ModuleOrigin::Dynamic);

    let mut inner = CodeBuilder::new("inner").params(&["y"]).freevars(&["x"]);
    inner.load_deref("x").load_fast("y").binary_add().return_value();
    let inner = Rc::new(inner.build()?);

    let mut make = CodeBuilder::new("make").cellvars(&["x"]);
    make.load_const(Value::Int(1))
        .store_deref("x")
        .load_closure("x")
        .build_tuple(1)
        .load_const(Value::Code(inner))
        .load_const(Value::str("make.<locals>.inner"))
        .make_function(MakeFunctionFlags::CLOSURE)
        .return_value();
    let make = Rc::new(make.build()?);
    let make = Value::Function(Rc::new(Function::new(make, module.dict(), None, None, None)));
    module.set("make", make.clone());
    Ok(interp.call(&make, &[], &[])?)
}

fn factorial(interp: &mut Interpreter) -> Result<Value> {
    let module = interp.new_module("demo", ModuleOrigin::Dynamic);

    let mut b = CodeBuilder::new("fact").params(&["n"]);
    let recurse = b.new_label();
    b.load_fast("n")
        .load_const(Value::Int(2))
        .compare(CmpOp::Lt)
        .pop_jump_if_false(recurse)
        .load_const(Value::Int(1))
        .return_value()
        .bind(recurse)
        .load_fast("n")
        .load_global("fact")
        .load_fast("n")
        .load_const(Value::Int(1))
        .binary_subtract()
        .call(1)
        .binary_multiply()
        .return_value();
    let fact = Value::Function(Rc::new(Function::new(
        Rc::new(b.build()?),
        module.dict(),
        None,
        None,
        None,
    )));
    module.set("fact", fact.clone());
    Ok(fact)
}

fn cycle(interp: &mut Interpreter) -> Result<Value> {
    let module = interp.new_module("demo", ModuleOrigin::Dynamic);

    let mut b = CodeBuilder::new("g").params(&["d"]);
    b.load_fast("d").return_value();
    let defaults = Value::empty_dict();
    let func = Value::Function(Rc::new(Function::new(
        Rc::new(b.build()?),
        module.dict(),
        None,
        Some(Rc::from(vec![defaults.clone()])),
        None,
    )));
    let Value::Dict(d) = &defaults else {
        bail!("default is not a dict");
    };
    d.borrow_mut().set_str("f", func.clone());
    Ok(func)
}

fn class(interp: &mut Interpreter) -> Result<Value> {
    let type_ = interp.types().type_.clone();
    let meta = interp.new_class(
        "Registry",
        vec![type_],
        Dict::from_str_pairs([("kind", Value::str("registry"))]),
        None,
    )?;

    let module = interp.module("__main__");
    let globals = match &module {
        Some(m) => m.dict(),
        None => bail!("__main__ is not registered"),
    };
    let mut b = CodeBuilder::new("describe").params(&["self"]);
    b.load_fast("self").load_attr("label").return_value();
    let describe = Value::Function(Rc::new(Function::new(
        Rc::new(b.build()?),
        globals,
        None,
        None,
        None,
    )));

    let cls = interp.new_class(
        "Widget",
        vec![],
        Dict::from_str_pairs([("describe", describe)]),
        Some(meta),
    )?;
    let inst = interp.new_instance(&cls)?;
    interp.setattr(&inst, "label", Value::str("knob"))?;
    Ok(inst)
}

/// Parse `--call` arguments as ints, falling back to strings
pub fn parse_args(raw: &[String]) -> Vec<Value> {
    raw.iter()
        .map(|s| match s.parse::<i64>() {
            Ok(n) => Value::Int(n),
            Err(_) => Value::str(s),
        })
        .collect()
}
