//! Host runtime for deeppickle
//!
//! A small object model and word-code interpreter. Functions, closures,
//! cells, classes and modules built here are the values the serializer
//! walks; the interpreter lets decoded functions be called again.
//!
//! # Object Model
//! - Every non-primitive value is a shared `Rc` allocation; its address is
//!   its identity (see [`ObjId`]).
//! - Classes carry their metaclass explicitly (`None` means `type`).
//! - Modules carry an explicit [`ModuleOrigin`] instead of a loader object.

mod attr;
mod builtins;
pub mod code;
mod dict;
mod error;
mod eval;
mod interp;
mod object;
mod ops;
mod value;

pub use code::{CmpOp, Code, CodeBuilder, CodeFlags, Label, MakeFunctionFlags, Opcode};
pub use dict::{Dict, HashKey, ValueSet};
pub use error::{ExecError, ExecResult};
pub use interp::{BuiltinTypes, Interpreter, DEFAULT_MAX_CALL_DEPTH};
pub use object::{
    BoundMethod, Cell, ClassMethod, DescriptorKind, Function, FunctionMeta, Generator, Instance,
    MemberDescriptor, Module, ModuleOrigin, NativeCtor, NativeFn, NativeFunction, NativeObject,
    NativeState, NativeType, Property, Slice, StaticMethod, TypeObject,
};
pub use value::{DictRef, Kwarg, ListRef, ObjId, SetRef, Value};
