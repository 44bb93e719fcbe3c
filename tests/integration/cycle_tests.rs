//! Identity, aliasing and cycles.

use std::rc::Rc;

use deeppickle::vm::{CodeBuilder, Dict, Function, Interpreter, Value};

use crate::common::{call, func, roundtrip, scratch_module};

#[test]
fn test_default_dict_holding_the_function() {
    // def f(d={}): return d; f.__defaults__[0]['f'] = f
    let mut interp = Interpreter::new();
    let module = scratch_module(&mut interp);
    let mut b = CodeBuilder::new("f").params(&["d"]);
    b.load_fast("d").return_value();
    let default = Value::empty_dict();
    let f = Value::Function(Rc::new(Function::new(
        Rc::new(b.build().unwrap()),
        module.dict(),
        None,
        Some(Rc::from(vec![default.clone()])),
        None,
    )));
    default.as_dict().unwrap().borrow_mut().set_str("f", f.clone());

    let g = roundtrip(&mut interp, &f);
    let d = call(&mut interp, &g, &[]);
    assert!(d.as_dict().unwrap().borrow().get_str("f").unwrap().is(&g));
    assert!(func(&g).defaults.as_ref().unwrap()[0].is(&d));
}

#[test]
fn test_aliased_values_stay_aliased() {
    let mut interp = Interpreter::new();
    let shared = Value::dict(Dict::from_str_pairs([("k", Value::Int(1))]));
    let value = Value::list(vec![shared.clone(), Value::tuple(vec![shared.clone()]), shared]);

    let decoded = roundtrip(&mut interp, &value);
    let Value::List(items) = &decoded else { panic!("expected list") };
    let items = items.borrow();
    assert!(items[0].is(&items[2]));
    assert!(items[1].as_tuple().unwrap()[0].is(&items[0]));
}

#[test]
fn test_self_containing_list() {
    let mut interp = Interpreter::new();
    let list = Value::list(vec![Value::Int(1)]);
    if let Value::List(inner) = &list {
        inner.borrow_mut().push(list.clone());
    }

    let decoded = roundtrip(&mut interp, &list);
    let Value::List(items) = &decoded else { panic!("expected list") };
    assert_eq!(items.borrow()[0].as_int(), Some(1));
    assert!(items.borrow()[1].is(&decoded));
}

#[test]
fn test_tuple_reached_through_its_own_list() {
    let mut interp = Interpreter::new();
    let list = Value::list(vec![]);
    let tuple = Value::tuple(vec![list.clone(), Value::str("tag")]);
    if let Value::List(inner) = &list {
        inner.borrow_mut().push(tuple.clone());
    }

    let decoded = roundtrip(&mut interp, &tuple);
    let items = decoded.as_tuple().unwrap();
    let Value::List(inner) = &items[0] else { panic!("expected list") };
    assert!(inner.borrow()[0].is(&decoded));
    assert_eq!(items[1].as_str(), Some("tag"));
}

#[test]
fn test_long_tuple_and_sets() {
    let mut interp = Interpreter::new();
    let long = Value::tuple((0..6).map(Value::Int).collect());
    let set = Value::set(vec![Value::Int(1), Value::Int(2)]).unwrap();
    let frozen = Value::frozenset(vec![Value::str("a"), Value::str("b")]).unwrap();
    let value = Value::tuple(vec![long.clone(), set.clone(), frozen.clone(), Value::tuple(vec![])]);

    let decoded = roundtrip(&mut interp, &value);
    assert!(decoded.py_eq(&value));
    let items = decoded.as_tuple().unwrap();
    assert_eq!(items[0].as_tuple().unwrap().len(), 6);
    assert!(matches!(items[1], Value::Set(_)));
    assert!(matches!(items[2], Value::FrozenSet(_)));
}

#[test]
fn test_large_list_spans_batches() {
    let mut interp = Interpreter::new();
    let list = Value::list((0..2500).map(Value::Int).collect());
    let decoded = roundtrip(&mut interp, &list);
    let Value::List(items) = &decoded else { panic!("expected list") };
    assert_eq!(items.borrow().len(), 2500);
    assert_eq!(items.borrow()[2499].as_int(), Some(2499));
}

#[test]
fn test_instance_dict_stays_aliased() {
    // [inst.__dict__, inst] and [inst, inst.__dict__]
    let mut interp = Interpreter::new();
    let cls = interp.new_class("Box", vec![], Dict::new(), None).unwrap();
    let inst = interp.new_instance(&cls).unwrap();
    interp.setattr(&inst, "x", Value::Int(1)).unwrap();
    let dict = interp.getattr(&inst, "__dict__").unwrap();

    for value in [
        Value::list(vec![dict.clone(), inst.clone()]),
        Value::list(vec![inst.clone(), dict.clone()]),
    ] {
        let decoded = roundtrip(&mut interp, &value);
        let Value::List(items) = &decoded else { panic!("expected list") };
        let items = items.borrow();
        let (d, i) = match &items[0] {
            Value::Dict(_) => (items[0].clone(), items[1].clone()),
            _ => (items[1].clone(), items[0].clone()),
        };
        assert!(interp.getattr(&i, "__dict__").unwrap().is(&d));
        assert_eq!(interp.getattr(&i, "x").unwrap().as_int(), Some(1));
    }
}

#[test]
fn test_empty_instance_dict_stays_aliased() {
    let mut interp = Interpreter::new();
    let cls = interp.new_class("Empty", vec![], Dict::new(), None).unwrap();
    let inst = interp.new_instance(&cls).unwrap();
    let dict = interp.getattr(&inst, "__dict__").unwrap();
    let value = Value::list(vec![inst, dict]);

    let decoded = roundtrip(&mut interp, &value);
    let Value::List(items) = &decoded else { panic!("expected list") };
    let items = items.borrow();
    assert!(interp.getattr(&items[0], "__dict__").unwrap().is(&items[1]));
}
