//! Stream format, files, configuration and the quine.

use std::io::Write;

use deeppickle::encoding::{disassemble, fingerprint};
use deeppickle::vm::{Interpreter, Value};
use deeppickle::{
    check_quine, dump_file, dumps, load_file, make_quine, Classification, EncoderConfig,
    QuineStyle,
};
use tempfile::{tempdir, NamedTempFile};

use crate::common::{call, closure_factory};

#[test]
fn test_closure_listing() {
    let mut interp = Interpreter::new();
    let make = closure_factory(&mut interp);
    let inner = call(&mut interp, &make, &[]);
    let listing = disassemble(&dumps(&mut interp, &inner).unwrap()).unwrap();

    assert!(listing.starts_with("    0: PROTO"));
    assert!(listing.contains("\"FunctionType\""));
    assert!(listing.contains("\"CodeType\""));
    assert!(listing.contains("\"CellType\""));
    assert!(listing.contains("\"cell_contents\""));
    assert!(listing.trim_end().ends_with(&format!(
        "highest memo slot: {}",
        listing.matches("MEMOIZE").count() - 1
    )));
}

#[test]
fn test_encoding_is_deterministic() {
    let mut interp = Interpreter::new();
    let make = closure_factory(&mut interp);
    let a = dumps(&mut interp, &make).unwrap();
    let b = dumps(&mut interp, &make).unwrap();
    assert_eq!(fingerprint(&a), fingerprint(&b));
}

#[test]
fn test_file_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("make.pkl");
    let mut interp = Interpreter::new();
    let make = closure_factory(&mut interp);

    dump_file(&path, &mut interp, &make).unwrap();
    let mut fresh = Interpreter::new();
    let decoded = load_file(&path, &mut fresh).unwrap();
    let inner = call(&mut fresh, &decoded, &[]);
    assert_eq!(call(&mut fresh, &inner, &[Value::Int(5)]).as_int(), Some(6));
}

#[test]
fn test_config_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
max_depth = 64
batch_size = 8

[policy]
import_by_name = ["sys", "operator"]

[policy.namespaces]
mylib = "opaque"
"#
    )
    .unwrap();

    let config = EncoderConfig::load(file.path()).unwrap();
    assert_eq!(config.max_depth, 64);
    assert_eq!(config.batch_size, 8);
    assert_eq!(config.policy.namespaces.get("mylib"), Some(&Classification::Opaque));
    assert!(config.policy.imports_by_name("operator"));
}

#[test]
fn test_config_rejects_unknown_keys() {
    assert!(EncoderConfig::parse("max_depht = 3").is_err());
}

#[test]
fn test_both_quines_reproduce_themselves() {
    let mut interp = Interpreter::new();
    for style in [QuineStyle::Readable, QuineStyle::Golfed] {
        let data = make_quine(style);
        assert!(check_quine(&mut interp, &data).unwrap(), "{style:?}");
        assert!(disassemble(&data).is_ok());
    }
}
