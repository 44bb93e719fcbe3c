//! Functions, closures and code objects.

use std::rc::Rc;

use deeppickle::vm::{Cell, CodeBuilder, ExecError, Function, Interpreter, Value};

use crate::common::{call, closure_factory, func, function_in, roundtrip, scratch_module};

#[test]
fn test_make_inner_adds_captured_value() {
    let mut interp = Interpreter::new();
    let make = closure_factory(&mut interp);

    let decoded = roundtrip(&mut interp, &make);
    assert!(!decoded.is(&make));
    let inner = call(&mut interp, &decoded, &[]);
    assert_eq!(call(&mut interp, &inner, &[Value::Int(5)]).as_int(), Some(6));
}

#[test]
fn test_closure_instance_keeps_its_cell() {
    let mut interp = Interpreter::new();
    let make = closure_factory(&mut interp);
    let inner = call(&mut interp, &make, &[]);

    let decoded = roundtrip(&mut interp, &inner);
    assert_eq!(func(&decoded).qualname().as_ref(), "make.<locals>.inner");
    assert_eq!(call(&mut interp, &decoded, &[Value::Int(41)]).as_int(), Some(42));
}

#[test]
fn test_two_functions_share_one_cell() {
    let mut interp = Interpreter::new();
    let module = scratch_module(&mut interp);
    let cell = Value::Cell(Rc::new(Cell::new(Value::Int(10))));

    let make = |name: &str| {
        let mut b = CodeBuilder::new(name).freevars(&["shared"]);
        b.load_deref("shared").return_value();
        Value::Function(Rc::new(Function::new(
            Rc::new(b.build().unwrap()),
            module.dict(),
            None,
            None,
            Some(Rc::from(vec![cell.clone()])),
        )))
    };
    let pair = Value::tuple(vec![make("first"), make("second")]);

    let decoded = roundtrip(&mut interp, &pair);
    let items = decoded.as_tuple().unwrap();
    let a = func(&items[0]).closure.clone().unwrap();
    let b = func(&items[1]).closure.clone().unwrap();
    assert!(a[0].is(&b[0]));
    assert!(!a[0].is(&cell));

    // writes through one closure are visible through the other
    a[0].as_cell().unwrap().set(Value::Int(99));
    assert_eq!(call(&mut interp, &items[1], &[]).as_int(), Some(99));
}

#[test]
fn test_recursive_function_through_globals() {
    let mut interp = Interpreter::new();
    let module = scratch_module(&mut interp);

    let mut b = CodeBuilder::new("fact").params(&["n"]);
    let recurse = b.new_label();
    b.load_fast("n")
        .load_const(Value::Int(2))
        .compare(deeppickle::vm::CmpOp::Lt)
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
    let fact = function_in(&module, b);
    module.set("fact", fact.clone());

    let decoded = roundtrip(&mut interp, &fact);
    let globals = func(&decoded).globals.clone();
    assert!(globals.borrow().get_str("fact").unwrap().is(&decoded));
    assert_eq!(call(&mut interp, &decoded, &[Value::Int(5)]).as_int(), Some(120));
}

#[test]
fn test_recursive_closure_through_cell() {
    // def outer(): def rec(n): return 0 if n < 1 else rec(n - 1) + 2; return rec
    let mut interp = Interpreter::new();
    let module = scratch_module(&mut interp);
    let cell = Rc::new(Cell::empty());

    let mut b = CodeBuilder::new("rec").params(&["n"]).freevars(&["rec"]);
    let recurse = b.new_label();
    b.load_fast("n")
        .load_const(Value::Int(1))
        .compare(deeppickle::vm::CmpOp::Lt)
        .pop_jump_if_false(recurse)
        .load_const(Value::Int(0))
        .return_value()
        .bind(recurse)
        .load_deref("rec")
        .load_fast("n")
        .load_const(Value::Int(1))
        .binary_subtract()
        .call(1)
        .load_const(Value::Int(2))
        .binary_add()
        .return_value();
    let rec = Value::Function(Rc::new(Function::new(
        Rc::new(b.build().unwrap()),
        module.dict(),
        None,
        None,
        Some(Rc::from(vec![Value::Cell(cell.clone())])),
    )));
    cell.set(rec.clone());

    let decoded = roundtrip(&mut interp, &rec);
    let closure = func(&decoded).closure.clone().unwrap();
    assert!(closure[0].as_cell().unwrap().get().unwrap().is(&decoded));
    assert_eq!(call(&mut interp, &decoded, &[Value::Int(3)]).as_int(), Some(6));
}

#[test]
fn test_function_attribute_refers_to_itself() {
    let mut interp = Interpreter::new();
    let module = scratch_module(&mut interp);
    let mut b = CodeBuilder::new("f");
    b.load_const(Value::None).return_value();
    let f = function_in(&module, b);
    func(&f).meta().dict.borrow_mut().set_str("me", f.clone());

    let decoded = roundtrip(&mut interp, &f);
    let me = interp.getattr(&decoded, "me").unwrap();
    assert!(me.is(&decoded));
}

#[test]
fn test_defaults_kwdefaults_and_posonly() {
    // def f(a, /, b=10, *, c=100): return a + b + c
    let mut interp = Interpreter::new();
    let module = scratch_module(&mut interp);
    let mut b = CodeBuilder::new("f")
        .params(&["a", "b"])
        .posonly(1)
        .kwonly(&["c"]);
    b.load_fast("a")
        .load_fast("b")
        .binary_add()
        .load_fast("c")
        .binary_add()
        .return_value();
    let code = Rc::new(b.build().unwrap());
    let f = Rc::new(Function::new(
        code,
        module.dict(),
        None,
        Some(Rc::from(vec![Value::Int(10)])),
        None,
    ));
    f.meta_mut().kwdefaults = Value::dict(deeppickle::vm::Dict::from_str_pairs([(
        "c",
        Value::Int(100),
    )]));
    let f = Value::Function(f);

    let decoded = roundtrip(&mut interp, &f);
    assert_eq!(call(&mut interp, &decoded, &[Value::Int(1)]).as_int(), Some(111));
    assert_eq!(
        call(&mut interp, &decoded, &[Value::Int(1), Value::Int(2)]).as_int(),
        Some(103)
    );

    let kw = [(Rc::from("a"), Value::Int(1))];
    let err = interp.call(&decoded, &[], &kw).unwrap_err();
    assert!(matches!(err, ExecError::Type(_)));
}

#[test]
fn test_annotations_doc_and_names_survive() {
    let mut interp = Interpreter::new();
    let module = scratch_module(&mut interp);
    let mut b = CodeBuilder::new("documented").docstring("Adds nothing.");
    b.load_const(Value::None).return_value();
    let f = function_in(&module, b);
    {
        let mut meta = func(&f).meta_mut();
        meta.annotations =
            Value::dict(deeppickle::vm::Dict::from_str_pairs([("return", Value::None)]));
        meta.qualname = Rc::from("Outer.documented");
    }

    let decoded = roundtrip(&mut interp, &f);
    let doc = interp.getattr(&decoded, "__doc__").unwrap();
    assert_eq!(doc.as_str(), Some("Adds nothing."));
    let qualname = interp.getattr(&decoded, "__qualname__").unwrap();
    assert_eq!(qualname.as_str(), Some("Outer.documented"));
    let module_name = interp.getattr(&decoded, "__module__").unwrap();
    assert_eq!(module_name.as_str(), Some("scratch"));
    let annotations = interp.getattr(&decoded, "__annotations__").unwrap();
    assert!(annotations.as_dict().unwrap().borrow().contains_str("return"));
}

#[test]
fn test_code_is_shared_between_functions() {
    let mut interp = Interpreter::new();
    let module = scratch_module(&mut interp);
    let mut b = CodeBuilder::new("f");
    b.load_const(Value::Int(1)).return_value();
    let f = function_in(&module, b);
    let code = func(&f).code.clone();
    let g = Value::Function(Rc::new(Function::new(
        code,
        module.dict(),
        Some(Rc::from("g")),
        None,
        None,
    )));

    let decoded = roundtrip(&mut interp, &Value::list(vec![f, g]));
    let Value::List(items) = &decoded else { panic!("expected list") };
    let items = items.borrow();
    assert!(Rc::ptr_eq(&func(&items[0]).code, &func(&items[1]).code));
    assert_eq!(&*func(&items[1]).name, "g");
}
