//! Error variants surfaced through the public API.

use std::rc::Rc;

use deeppickle::encoding::{Op, StreamWriter};
use deeppickle::vm::{CodeBuilder, Dict, Function, Interpreter, Value};
use deeppickle::{dumps, dumps_with, loads, DecodeError, EncodeError, EncoderConfig, PickleError};

use crate::common::{call, scratch_module};

#[test]
fn test_lock_instance_is_unsupported() {
    let mut interp = Interpreter::new();
    let allocate = interp.find_global("_thread", "allocate_lock").unwrap();
    let lock = call(&mut interp, &allocate, &[]);

    let err = dumps(&mut interp, &Value::list(vec![lock])).unwrap_err();
    match err {
        PickleError::Encode(EncodeError::UnsupportedValue { kind, .. }) => assert_eq!(kind, "lock"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_bare_member_descriptor_is_unsupported() {
    let mut interp = Interpreter::new();
    let ns = Dict::from_str_pairs([("__slots__", Value::str("x"))]);
    let cls = interp.new_class("S", vec![], ns, None).unwrap();
    let descriptor = cls.namespace().get_str("x").unwrap();

    let err = dumps(&mut interp, &descriptor).unwrap_err();
    assert!(matches!(
        err,
        PickleError::Encode(EncodeError::UnsupportedValue { .. })
    ));
}

#[test]
fn test_closure_length_mismatch() {
    let mut interp = Interpreter::new();
    let module = scratch_module(&mut interp);
    let mut b = CodeBuilder::new("needs_cell").freevars(&["x"]);
    b.load_deref("x").return_value();
    let f = Value::Function(Rc::new(Function::new(
        Rc::new(b.build().unwrap()),
        module.dict(),
        None,
        None,
        None,
    )));

    let err = dumps(&mut interp, &f).unwrap_err();
    assert!(matches!(
        err,
        PickleError::Encode(EncodeError::InvalidClosure { freevars: 1, cells: 0, .. })
    ));
}

#[test]
fn test_depth_limit() {
    let mut interp = Interpreter::new();
    let mut value = Value::Int(0);
    for _ in 0..20 {
        value = Value::list(vec![value]);
    }
    let config = EncoderConfig::default().with_max_depth(10);

    let err = dumps_with(&mut interp, &value, &config).unwrap_err();
    assert!(matches!(
        err,
        PickleError::Encode(EncodeError::RecursionLimit { limit: 10 })
    ));
    assert!(dumps(&mut interp, &value).is_ok());
}

#[test]
fn test_truncated_stream() {
    let mut interp = Interpreter::new();
    let bytes = dumps(&mut interp, &Value::str("truncated payload")).unwrap();
    let err = loads(&mut interp, &bytes[..bytes.len() - 4]).unwrap_err();
    assert!(matches!(err, PickleError::Decode(DecodeError::UnexpectedEof { .. })));
}

#[test]
fn test_invalid_opcode_and_protocol() {
    let mut interp = Interpreter::new();
    let err = loads(&mut interp, &[Op::Proto.byte(), 1, 0xff]).unwrap_err();
    assert!(matches!(
        err,
        PickleError::Decode(DecodeError::InvalidOpcode { byte: 0xff, offset: 2 })
    ));

    let err = loads(&mut interp, &[Op::Proto.byte(), 2, Op::Stop.byte()]).unwrap_err();
    assert!(matches!(err, PickleError::Decode(DecodeError::UnsupportedProtocol(2))));
}

#[test]
fn test_missing_stop() {
    let mut interp = Interpreter::new();
    let bytes = dumps(&mut interp, &Value::Int(3)).unwrap();
    let err = loads(&mut interp, &bytes[..bytes.len() - 1]).unwrap_err();
    assert!(matches!(err, PickleError::Decode(DecodeError::MissingStop)));
}

#[test]
fn test_class_from_unregistered_module_does_not_resolve() {
    // classes in a module with no backing file are referenced by location
    let mut interp = Interpreter::new();
    scratch_module(&mut interp);
    let ns = Dict::from_str_pairs([("__module__", Value::str("scratch"))]);
    let cls = interp.new_class("Thing", vec![], ns, None).unwrap();
    let bytes = dumps(&mut interp, &Value::Type(cls)).unwrap();

    let err = loads(&mut interp, &bytes).unwrap_err();
    match err {
        PickleError::Decode(DecodeError::UnresolvableNativeReference { module, name }) => {
            assert_eq!(module, "scratch");
            assert_eq!(name, "Thing");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_constructor_failure_carries_offset() {
    let mut w = StreamWriter::new();
    w.proto();
    w.global("types", "CodeType");
    w.int(1);
    w.op(Op::Tuple1);
    w.op(Op::Reduce);
    w.op(Op::Stop);

    let mut interp = Interpreter::new();
    let err = loads(&mut interp, w.as_bytes()).unwrap_err();
    assert!(matches!(err, PickleError::Decode(DecodeError::Exec { .. })));
}

#[test]
fn test_default_depth_limit_fits_a_spawned_thread() {
    use deeppickle::config::DEFAULT_MAX_DEPTH;

    // default spawned threads get 2 MiB of stack
    let result = std::thread::spawn(|| {
        let mut interp = Interpreter::new();

        let mut nested = Value::Int(0);
        for _ in 0..DEFAULT_MAX_DEPTH - 1 {
            nested = Value::list(vec![nested]);
        }
        let fits = dumps(&mut interp, &nested).is_ok();

        for _ in 0..10 {
            nested = Value::list(vec![nested]);
        }
        let lists = dumps(&mut interp, &nested).unwrap_err().to_string();

        // each function reaches the next through its defaults
        let module = scratch_module(&mut interp);
        let mut chain = Value::None;
        for _ in 0..DEFAULT_MAX_DEPTH {
            let mut b = CodeBuilder::new("link").params(&["next"]);
            b.load_fast("next").return_value();
            chain = Value::Function(Rc::new(Function::new(
                Rc::new(b.build().unwrap()),
                module.dict(),
                None,
                Some(Rc::from(vec![chain])),
                None,
            )));
        }
        let functions = dumps(&mut interp, &chain).unwrap_err().to_string();
        (fits, lists, functions)
    })
    .join()
    .expect("encoder stayed within the thread's stack");

    assert!(result.0);
    assert!(result.1.contains("Maximum serialization depth"));
    assert!(result.2.contains("Maximum serialization depth"));
}
