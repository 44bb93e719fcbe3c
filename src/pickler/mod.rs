//! The extended encoder
//!
//! Walks a value graph depth first and writes a program for the decoder's
//! stack machine. Every heap value is written once; later references load
//! it from the memo.
//!
//! # Breaking cycles
//!
//! Values are built with one of two strategies:
//!
//! - **Eager**: push the constructor, a mark and the arguments, then call.
//!   Used where the arguments are needed at construction time (tuples,
//!   frozensets, functions, code, classes). After the arguments are written
//!   the encoder checks whether the value got memoized while writing them;
//!   if so the constructor and arguments are dropped and the memo copy is
//!   loaded instead.
//! - **Deferred**: push an empty value, memoize it, then fill it in. Used for
//!   lists, dicts, sets, instances and cells.
//!
//! Any cycle in a constructible graph passes through at least one deferred
//! value, which is memoized before its contents are written, so the walk
//! always terminates.

mod function;
mod reduce;
mod types;

use deeppickle_vm::{Interpreter, Value};
use tracing::{debug, trace};

use crate::config::EncoderConfig;
use crate::encoding::{fingerprint, format_fingerprint, Op, StreamWriter};
use crate::error::EncodeError;
use crate::globals::GlobalsCache;
use crate::memo::MemoTable;

/// Constructor pushed before the arguments of an eager value
pub(crate) enum Ctor<'a> {
    /// A `module.qualname` location
    Global(&'a str),
    /// Any encodable value, e.g. a metaclass
    Value(Value),
}

/// One encode session: a stream, its memo and the globals cache
pub struct Pickler<'a> {
    interp: &'a mut Interpreter,
    config: &'a EncoderConfig,
    out: StreamWriter,
    memo: MemoTable,
    globals: GlobalsCache,
    depth: usize,
}

impl<'a> Pickler<'a> {
    pub fn new(interp: &'a mut Interpreter, config: &'a EncoderConfig) -> Self {
        Self {
            interp,
            config,
            out: StreamWriter::with_capacity(256),
            memo: MemoTable::new(),
            globals: GlobalsCache::new(),
            depth: 0,
        }
    }

    /// Write one complete stream for `value`
    pub fn dump(&mut self, value: &Value) -> Result<(), EncodeError> {
        self.out.proto();
        self.save(value)?;
        self.out.op(Op::Stop);
        Ok(())
    }

    pub fn finish(self) -> Vec<u8> {
        let bytes = self.out.into_bytes();
        debug!(
            bytes = bytes.len(),
            memo = self.memo.len(),
            snapshots = self.globals.len(),
            fingerprint = %format_fingerprint(fingerprint(&bytes)),
            "encode finished"
        );
        bytes
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    pub(crate) fn save(&mut self, value: &Value) -> Result<(), EncodeError> {
        if self.depth >= self.config.max_depth {
            return Err(EncodeError::RecursionLimit {
                limit: self.config.max_depth,
            });
        }
        self.depth += 1;
        let result = self.save_value(value);
        self.depth -= 1;
        result
    }

    fn save_value(&mut self, value: &Value) -> Result<(), EncodeError> {
        match value {
            Value::None => self.out.none(),
            Value::Bool(b) => self.out.bool(*b),
            Value::Int(i) => self.out.int(*i),
            Value::Float(f) => self.out.float(*f),
            Value::Str(s) => self.out.str(s),
            Value::Bytes(b) => self.out.bytes(b),
            _ => {
                if let Some(slot) = self.memo.lookup(value) {
                    self.out.get(slot);
                    return Ok(());
                }
                trace!(kind = value.kind_name(), depth = self.depth, "save");
                self.save_heap(value)?;
            }
        }
        Ok(())
    }

    fn save_heap(&mut self, value: &Value) -> Result<(), EncodeError> {
        match value {
            Value::Tuple(items) => self.save_tuple(value, items),
            Value::FrozenSet(items) => self.save_frozenset(value, items),
            Value::List(list) => {
                self.out.op(Op::EmptyList);
                self.memoize(value)?;
                let items = list.borrow().clone();
                self.batched(&items, Op::Append, Op::Appends)
            }
            Value::Set(set) => {
                self.out.op(Op::EmptySet);
                self.memoize(value)?;
                let items: Vec<Value> = set.borrow().iter().cloned().collect();
                self.batched(&items, Op::AddItems, Op::AddItems)
            }
            Value::Dict(dict) => {
                self.out.op(Op::EmptyDict);
                self.memoize(value)?;
                let pairs: Vec<(Value, Value)> = dict
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                self.set_items(&pairs)
            }
            Value::Function(func) => self.save_function(value, func),
            Value::Code(code) => self.save_code(value, code),
            Value::Cell(cell) => self.save_cell(value, cell),
            Value::Type(ty) => self.save_type(value, ty),
            Value::Instance(inst) => self.save_instance(value, inst),
            Value::Module(module) => self.save_module(value, module),
            Value::StaticMethod(_)
            | Value::ClassMethod(_)
            | Value::Property(_)
            | Value::BoundMethod(_)
            | Value::Slice(_) => self.save_simple(value),
            Value::Native(native) => {
                let (module, name) = (native.module.clone(), native.name.clone());
                self.save_global_ref(value, &module, &name)
            }
            Value::MemberDescriptor(d) => Err(EncodeError::UnsupportedValue {
                kind: value.kind_name().to_string(),
                detail: format!("member '{}' of '{}' only exists inside its class", d.name, d.owner),
            }),
            Value::NativeObject(obj) => Err(EncodeError::UnsupportedValue {
                kind: obj.class.name.to_string(),
                detail: "runtime-internal state cannot be rebuilt from parts".to_string(),
            }),
            Value::Generator(generator) => Err(EncodeError::UnsupportedValue {
                kind: value.kind_name().to_string(),
                detail: format!("suspended execution of '{}'", generator.function.qualname()),
            }),
            Value::None
            | Value::Bool(_)
            | Value::Int(_)
            | Value::Float(_)
            | Value::Str(_)
            | Value::Bytes(_) => Err(EncodeError::Internal(format!(
                "{} reached the heap encoder",
                value.kind_name()
            ))),
        }
    }

    // ========================================================================
    // Stream helpers
    // ========================================================================

    /// Store the top of the stack in the next memo slot
    pub(crate) fn memoize(&mut self, value: &Value) -> Result<u64, EncodeError> {
        let slot = self.memo.reserve(value)?;
        self.out.op(Op::Memoize);
        Ok(slot)
    }

    /// Items appended in batches of at most `batch_size`
    fn batched(&mut self, items: &[Value], single: Op, many: Op) -> Result<(), EncodeError> {
        for chunk in items.chunks(self.config.batch_size.max(1)) {
            if let ([item], Op::Append) = (chunk, single) {
                self.save(item)?;
                self.out.op(Op::Append);
                continue;
            }
            self.out.op(Op::Mark);
            for item in chunk {
                self.save(item)?;
            }
            self.out.op(many);
        }
        Ok(())
    }

    /// Key/value pairs set on the dict at the top of the stack
    pub(crate) fn set_items(&mut self, pairs: &[(Value, Value)]) -> Result<(), EncodeError> {
        for chunk in pairs.chunks(self.config.batch_size.max(1)) {
            if let [(k, v)] = chunk {
                self.save(k)?;
                self.save(v)?;
                self.out.op(Op::SetItem);
                continue;
            }
            self.out.op(Op::Mark);
            for (k, v) in chunk {
                self.save(k)?;
                self.save(v)?;
            }
            self.out.op(Op::SetItems);
        }
        Ok(())
    }

    /// `setattr` each entry on the value at the top of the stack
    pub(crate) fn patch_attrs(&mut self, attrs: &[(&str, Value)]) -> Result<(), EncodeError> {
        self.out.none();
        self.out.op(Op::EmptyDict);
        let pairs: Vec<(Value, Value)> = attrs
            .iter()
            .map(|(name, value)| (Value::str(name), value.clone()))
            .collect();
        self.set_items(&pairs)?;
        self.out.op(Op::Tuple2);
        self.out.op(Op::Build);
        Ok(())
    }

    /// Constructor, mark, arguments, guard, call, memoize.
    ///
    /// Returns `false` when `value` was memoized while its arguments were
    /// written; the stream then loads the memo copy and the caller must not
    /// patch anything.
    pub(crate) fn save_reduce(
        &mut self,
        value: &Value,
        ctor: Ctor<'_>,
        args: &[Value],
    ) -> Result<bool, EncodeError> {
        match ctor {
            Ctor::Global(path) => self.out.global_path(path),
            Ctor::Value(ctor) => self.save(&ctor)?,
        }
        self.out.op(Op::Mark);
        for arg in args {
            self.save(arg)?;
        }
        if let Some(slot) = self.memo.lookup(value) {
            trace!(kind = value.kind_name(), slot, "memoized during its own arguments");
            self.out.op(Op::PopMark);
            self.out.op(Op::Pop);
            self.out.get(slot);
            return Ok(false);
        }
        self.out.op(Op::Tuple);
        self.out.op(Op::Reduce);
        self.memoize(value)?;
        Ok(true)
    }

    // ========================================================================
    // Eager containers
    // ========================================================================

    fn save_tuple(&mut self, value: &Value, items: &[Value]) -> Result<(), EncodeError> {
        if items.is_empty() {
            self.out.op(Op::EmptyTuple);
            self.memoize(value)?;
            return Ok(());
        }
        if items.len() <= 3 {
            for item in items {
                self.save(item)?;
            }
            if let Some(slot) = self.memo.lookup(value) {
                for _ in items {
                    self.out.op(Op::Pop);
                }
                self.out.get(slot);
                return Ok(());
            }
            self.out.small_tuple(items.len());
            self.memoize(value)?;
            return Ok(());
        }

        self.out.op(Op::Mark);
        for item in items {
            self.save(item)?;
        }
        if let Some(slot) = self.memo.lookup(value) {
            self.out.op(Op::PopMark);
            self.out.get(slot);
            return Ok(());
        }
        self.out.op(Op::Tuple);
        self.memoize(value)?;
        Ok(())
    }

    fn save_frozenset(&mut self, value: &Value, items: &[Value]) -> Result<(), EncodeError> {
        self.out.op(Op::Mark);
        for item in items {
            self.save(item)?;
        }
        if let Some(slot) = self.memo.lookup(value) {
            self.out.op(Op::PopMark);
            self.out.get(slot);
            return Ok(());
        }
        self.out.op(Op::FrozenSet);
        self.memoize(value)?;
        Ok(())
    }
}
