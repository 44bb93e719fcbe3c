//! Object-graph serializer for closures, code objects, cells and classes
//!
//! Extends a pickle-style stack-machine stream with encoders for the values
//! a plain pickler only references by name: functions and their code,
//! closure cells, dynamically created classes and modules. Cycles are broken
//! either eagerly (memoize after construction, guard against re-entry) or by
//! deferring state into an attribute patch applied after the value exists.
//!
//! # Example
//! ```
//! use deeppickle::{dumps, loads};
//! use deeppickle_vm::{Interpreter, Value};
//!
//! let mut interp = Interpreter::new();
//! let value = Value::tuple(vec![Value::Int(1), Value::str("x")]);
//! let bytes = dumps(&mut interp, &value).unwrap();
//! assert!(loads(&mut interp, &bytes).unwrap().py_eq(&value));
//! ```

pub mod config;
pub mod encoding;
pub mod globals;
pub mod memo;
pub mod pickler;
pub mod policy;
pub mod quine;
pub mod unpickler;
mod api;
mod error;

pub use api::{dump_file, dumps, dumps_with, load_file, loads};
pub use config::EncoderConfig;
pub use error::{ConfigError, DecodeError, EncodeError, PickleError, PickleResult};
pub use pickler::Pickler;
pub use policy::{Classification, ClassificationPolicy, GlobalName};
pub use quine::{check_quine, make_quine, QuineStyle};
pub use unpickler::Unpickler;

pub use deeppickle_vm as vm;
