//! Classes, metaclasses, instances and descriptors.

use std::rc::Rc;

use deeppickle::vm::{
    ClassMethod, CodeBuilder, Dict, ExecError, Interpreter, Module, Property, StaticMethod,
    TypeObject, Value,
};
use deeppickle::{Classification, ClassificationPolicy};

use crate::common::{call, function_in, roundtrip};

fn main_module(interp: &Interpreter) -> Rc<Module> {
    interp.module("__main__").expect("__main__ is registered")
}

fn class_of(value: &Value) -> Rc<TypeObject> {
    match value {
        Value::Type(ty) => ty.clone(),
        Value::Instance(inst) => inst.class.clone(),
        other => panic!("expected a class or instance, got {}", other.kind_name()),
    }
}

#[test]
fn test_native_lock_type_is_referenced() {
    let mut interp = Interpreter::new();
    let lock = interp.types().lock.clone();
    let policy = ClassificationPolicy::default();
    assert_eq!(policy.classify(&interp, &lock), Classification::Opaque);

    let decoded = roundtrip(&mut interp, &Value::Type(lock.clone()));
    assert!(Rc::ptr_eq(&class_of(&decoded), &lock));
}

#[test]
fn test_user_lock_class_is_rebuilt() {
    let mut interp = Interpreter::new();
    let main = main_module(&interp);
    let mut acquire = CodeBuilder::new("acquire").params(&["self"]);
    acquire.load_const(Value::Bool(true)).return_value();
    let ns = Dict::from_str_pairs([("acquire", function_in(&main, acquire))]);
    let user = interp.new_class("lock", vec![], ns, None).unwrap();

    let policy = ClassificationPolicy::default();
    assert_eq!(policy.classify(&interp, &user), Classification::Reconstructible);

    let decoded = class_of(&roundtrip(&mut interp, &Value::Type(user.clone())));
    assert!(!Rc::ptr_eq(&decoded, &user));
    assert_eq!(&*decoded.name, "lock");
    let inst = interp.new_instance(&decoded).unwrap();
    let acquire = interp.getattr(&inst, "acquire").unwrap();
    assert!(call(&mut interp, &acquire, &[]).is_truthy());
}

#[test]
fn test_metaclass_chain_up_to_type() {
    let mut interp = Interpreter::new();
    let type_ = interp.types().type_.clone();
    let m1 = interp
        .new_class("M1", vec![type_.clone()], Dict::from_str_pairs([("tag", Value::str("m1"))]), None)
        .unwrap();
    let m2 = interp.new_class("M2", vec![m1.clone()], Dict::new(), None).unwrap();
    let c = interp.new_class("C", vec![], Dict::new(), Some(m2.clone())).unwrap();

    let decoded = class_of(&roundtrip(&mut interp, &Value::Type(c.clone())));
    let meta = decoded.meta.clone().expect("decoded class keeps its metaclass");
    assert!(!Rc::ptr_eq(&meta, &m2));
    assert_eq!(&*meta.name, "M2");
    assert_eq!(&*meta.bases[0].name, "M1");
    assert!(Rc::ptr_eq(&meta.bases[0].bases[0], &type_));

    let tag = interp.getattr(&Value::Type(decoded), "tag").unwrap();
    assert_eq!(tag.as_str(), Some("m1"));
}

#[test]
fn test_instance_dict_state() {
    let mut interp = Interpreter::new();
    let cls = interp.new_class("Point", vec![], Dict::new(), None).unwrap();
    let p = interp.new_instance(&cls).unwrap();
    interp.setattr(&p, "x", Value::Int(3)).unwrap();
    interp.setattr(&p, "me", p.clone()).unwrap();

    let decoded = roundtrip(&mut interp, &p);
    assert_eq!(interp.getattr(&decoded, "x").unwrap().as_int(), Some(3));
    assert!(interp.getattr(&decoded, "me").unwrap().is(&decoded));
    assert_eq!(&*class_of(&decoded).qualname(), "Point");
}

#[test]
fn test_slots_instance() {
    let mut interp = Interpreter::new();
    let ns = Dict::from_str_pairs([("__slots__", Value::tuple(vec![Value::str("x"), Value::str("y")]))]);
    let cls = interp.new_class("Slotted", vec![], ns, None).unwrap();
    let inst = interp.new_instance(&cls).unwrap();
    interp.setattr(&inst, "x", Value::Int(1)).unwrap();

    let decoded = roundtrip(&mut interp, &inst);
    assert_eq!(interp.getattr(&decoded, "x").unwrap().as_int(), Some(1));
    assert!(matches!(
        interp.getattr(&decoded, "y"),
        Err(ExecError::Attribute { .. })
    ));
    // slot descriptors are recreated from __slots__, not encoded
    let decoded_cls = class_of(&decoded);
    assert_eq!(decoded_cls.slots.as_deref().map(|s| s.len()), Some(2));
}

#[test]
fn test_slots_and_dict_together() {
    let mut interp = Interpreter::new();
    let ns = Dict::from_str_pairs([("__slots__", Value::str("x"))]);
    let base = interp.new_class("Base", vec![], ns, None).unwrap();
    let derived = interp.new_class("Derived", vec![base], Dict::new(), None).unwrap();
    let inst = interp.new_instance(&derived).unwrap();
    interp.setattr(&inst, "x", Value::Int(2)).unwrap();
    interp.setattr(&inst, "z", Value::Int(3)).unwrap();

    let decoded = roundtrip(&mut interp, &inst);
    assert_eq!(interp.getattr(&decoded, "x").unwrap().as_int(), Some(2));
    assert_eq!(interp.getattr(&decoded, "z").unwrap().as_int(), Some(3));
}

#[test]
fn test_methods_and_property() {
    let mut interp = Interpreter::new();
    let main = main_module(&interp);

    let mut area = CodeBuilder::new("area").params(&["self"]);
    area.load_fast("self")
        .load_attr("w")
        .load_fast("self")
        .load_attr("h")
        .binary_multiply()
        .return_value();
    let mut unit = CodeBuilder::new("unit");
    unit.load_const(Value::Int(1)).return_value();
    let mut kind = CodeBuilder::new("kind").params(&["cls"]);
    kind.load_fast("cls").load_attr("__name__").return_value();

    let ns = Dict::from_str_pairs([
        (
            "area",
            Value::Property(Rc::new(Property {
                fget: function_in(&main, area),
                fset: Value::None,
                fdel: Value::None,
                doc: Value::str("width times height"),
            })),
        ),
        (
            "unit",
            Value::StaticMethod(Rc::new(StaticMethod {
                func: function_in(&main, unit),
            })),
        ),
        (
            "kind",
            Value::ClassMethod(Rc::new(ClassMethod {
                func: function_in(&main, kind),
            })),
        ),
    ]);
    let cls = interp.new_class("Rect", vec![], ns, None).unwrap();
    let rect = interp.new_instance(&cls).unwrap();
    interp.setattr(&rect, "w", Value::Int(3)).unwrap();
    interp.setattr(&rect, "h", Value::Int(4)).unwrap();

    let decoded = roundtrip(&mut interp, &rect);
    assert_eq!(interp.getattr(&decoded, "area").unwrap().as_int(), Some(12));
    let unit = interp.getattr(&decoded, "unit").unwrap();
    assert_eq!(call(&mut interp, &unit, &[]).as_int(), Some(1));
    let kind = interp.getattr(&decoded, "kind").unwrap();
    assert_eq!(call(&mut interp, &kind, &[]).as_str(), Some("Rect"));
}

#[test]
fn test_bound_method_keeps_receiver() {
    let mut interp = Interpreter::new();
    let main = main_module(&interp);
    let mut double = CodeBuilder::new("double").params(&["self"]);
    double
        .load_fast("self")
        .load_attr("n")
        .load_fast("self")
        .load_attr("n")
        .binary_add()
        .return_value();
    let ns = Dict::from_str_pairs([("double", function_in(&main, double))]);
    let cls = interp.new_class("Counter", vec![], ns, None).unwrap();
    let inst = interp.new_instance(&cls).unwrap();
    interp.setattr(&inst, "n", Value::Int(21)).unwrap();
    let method = interp.getattr(&inst, "double").unwrap();

    let decoded = roundtrip(&mut interp, &method);
    assert!(matches!(decoded, Value::BoundMethod(_)));
    assert_eq!(call(&mut interp, &decoded, &[]).as_int(), Some(42));
}

#[test]
fn test_method_referencing_its_class_through_globals() {
    let mut interp = Interpreter::new();
    let main = main_module(&interp);
    let mut again = CodeBuilder::new("again").params(&["self"]);
    again.load_global("Widget").return_value();
    let ns = Dict::from_str_pairs([("again", function_in(&main, again))]);
    let cls = interp.new_class("Widget", vec![], ns, None).unwrap();
    main.set("Widget", Value::Type(cls.clone()));

    let decoded = roundtrip(&mut interp, &Value::Type(cls));
    let inst = interp.new_instance(&class_of(&decoded)).unwrap();
    let again = interp.getattr(&inst, "again").unwrap();
    assert!(call(&mut interp, &again, &[]).is(&decoded));
}

/// `__reduce__` returns `(cls._load, (self.times_pickled + 1,))`
fn counting_class(interp: &mut Interpreter) -> Rc<TypeObject> {
    let main = main_module(interp);

    let mut load = CodeBuilder::new("_load").params(&["cls", "times_pickled"]);
    load.load_fast("cls")
        .call(0)
        .store_fast("obj")
        .load_fast("times_pickled")
        .load_fast("obj")
        .store_attr("times_pickled")
        .load_fast("obj")
        .return_value();

    let mut reduce = CodeBuilder::new("__reduce__").params(&["self"]);
    reduce
        .load_fast("self")
        .load_attr("_load")
        .load_fast("self")
        .load_attr("times_pickled")
        .load_const(Value::Int(1))
        .binary_add()
        .build_tuple(1)
        .build_tuple(2)
        .return_value();

    let ns = Dict::from_str_pairs([
        (
            "_load",
            Value::ClassMethod(Rc::new(ClassMethod {
                func: function_in(&main, load),
            })),
        ),
        ("__reduce__", function_in(&main, reduce)),
    ]);
    interp.new_class("Pickled", vec![], ns, None).unwrap()
}

#[test]
fn test_reduce_hook_runs_on_every_encode() {
    let mut interp = Interpreter::new();
    let cls = counting_class(&mut interp);
    let mut value = interp.new_instance(&cls).unwrap();
    interp.setattr(&value, "times_pickled", Value::Int(0)).unwrap();

    for expected in 1..=3 {
        value = roundtrip(&mut interp, &value);
        let count = interp.getattr(&value, "times_pickled").unwrap();
        assert_eq!(count.as_int(), Some(expected));
    }
}

#[test]
fn test_reduce_hook_result_is_shared() {
    let mut interp = Interpreter::new();
    let cls = counting_class(&mut interp);
    let inst = interp.new_instance(&cls).unwrap();
    interp.setattr(&inst, "times_pickled", Value::Int(4)).unwrap();

    let decoded = roundtrip(&mut interp, &Value::list(vec![inst.clone(), inst]));
    let Value::List(items) = &decoded else { panic!("expected list") };
    let items = items.borrow();
    assert!(items[0].is(&items[1]));
    assert_eq!(interp.getattr(&items[0], "times_pickled").unwrap().as_int(), Some(5));
}

#[test]
fn test_reduce_hook_error_is_reported() {
    let mut interp = Interpreter::new();
    let cls = counting_class(&mut interp);
    // no times_pickled attribute: the hook raises
    let inst = interp.new_instance(&cls).unwrap();
    let err = deeppickle::dumps(&mut interp, &inst).unwrap_err();
    assert!(matches!(
        err,
        deeppickle::PickleError::Encode(deeppickle::EncodeError::Reduce { .. })
    ));
}
