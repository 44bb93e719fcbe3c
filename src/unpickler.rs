//! Stack-machine decoder
//!
//! Replays a stream against a live interpreter. Constructors are called
//! through the interpreter's call protocol and attribute patches go through
//! `setattr`, so the decoded graph is built exactly as running code would
//! build it.

use std::rc::Rc;

use deeppickle_vm::{Interpreter, Value};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::encoding::{Arg, Instruction, Op, StreamReader, PROTOCOL_VERSION};
use crate::error::DecodeError;

pub struct Unpickler<'a, 'd> {
    interp: &'a mut Interpreter,
    reader: StreamReader<'d>,
    stack: Vec<Value>,
    marks: Vec<usize>,
    memo: FxHashMap<u64, Value>,
}

impl<'a, 'd> Unpickler<'a, 'd> {
    pub fn new(interp: &'a mut Interpreter, data: &'d [u8]) -> Self {
        Self {
            interp,
            reader: StreamReader::new(data),
            stack: Vec::new(),
            marks: Vec::new(),
            memo: FxHashMap::default(),
        }
    }

    /// Run until `STOP` and return the value on top of the stack
    pub fn load(mut self) -> Result<Value, DecodeError> {
        while let Some(instr) = self.reader.next_instruction()? {
            if instr.op == Op::Stop {
                let value = self.pop(&instr)?;
                debug!(
                    offset = instr.offset,
                    memo = self.memo.len(),
                    leftover = self.stack.len(),
                    "decode finished"
                );
                return Ok(value);
            }
            self.step(&instr)?;
        }
        Err(DecodeError::MissingStop)
    }

    fn step(&mut self, instr: &Instruction<'_>) -> Result<(), DecodeError> {
        trace!(offset = instr.offset, op = instr.op.name(), depth = self.stack.len(), "step");
        let offset = instr.offset;
        match (instr.op, instr.arg) {
            (Op::Proto, Arg::U8(version)) => {
                if version != PROTOCOL_VERSION {
                    return Err(DecodeError::UnsupportedProtocol(version));
                }
            }
            (Op::Mark, _) => self.marks.push(self.stack.len()),
            (Op::Pop, _) => {
                self.pop(instr)?;
            }
            (Op::PopMark, _) => {
                self.pop_mark(instr)?;
            }
            (Op::Dup, _) => {
                let top = self.top(instr)?.clone();
                self.stack.push(top);
            }

            (Op::NoneValue, _) => self.stack.push(Value::None),
            (Op::True, _) => self.stack.push(Value::Bool(true)),
            (Op::False, _) => self.stack.push(Value::Bool(false)),
            (Op::Int, Arg::Int(v)) => self.stack.push(Value::Int(v)),
            (Op::Float, Arg::Float(v)) => self.stack.push(Value::Float(v)),
            (Op::Str, Arg::Str(s)) => self.stack.push(Value::str(s)),
            (Op::Bytes, Arg::Bytes(b)) => self.stack.push(Value::bytes(b)),

            (Op::EmptyTuple, _) => self.stack.push(Value::tuple(Vec::new())),
            (Op::EmptyList, _) => self.stack.push(Value::list(Vec::new())),
            (Op::EmptyDict, _) => self.stack.push(Value::empty_dict()),
            (Op::EmptySet, _) => {
                let set = Value::set(Vec::new()).map_err(|e| DecodeError::exec(offset, e))?;
                self.stack.push(set);
            }
            (Op::Tuple, _) => {
                let items = self.pop_mark(instr)?;
                self.stack.push(Value::tuple(items));
            }
            (Op::Tuple1 | Op::Tuple2 | Op::Tuple3, _) => {
                let n = match instr.op {
                    Op::Tuple1 => 1,
                    Op::Tuple2 => 2,
                    _ => 3,
                };
                if self.stack.len() < n + self.mark_floor() {
                    return Err(DecodeError::underflow(instr.op.name(), offset));
                }
                let items = self.stack.split_off(self.stack.len() - n);
                self.stack.push(Value::tuple(items));
            }
            (Op::FrozenSet, _) => {
                let items = self.pop_mark(instr)?;
                let set = Value::frozenset(items).map_err(|e| DecodeError::exec(offset, e))?;
                self.stack.push(set);
            }

            (Op::Append, _) => {
                let item = self.pop(instr)?;
                self.extend_list(instr, vec![item])?;
            }
            (Op::Appends, _) => {
                let items = self.pop_mark(instr)?;
                self.extend_list(instr, items)?;
            }
            (Op::SetItem, _) => {
                let value = self.pop(instr)?;
                let key = self.pop(instr)?;
                self.set_items(instr, vec![key, value])?;
            }
            (Op::SetItems, _) => {
                let items = self.pop_mark(instr)?;
                if items.len() % 2 != 0 {
                    return Err(DecodeError::InvalidState(format!(
                        "SETITEMS with an odd item count at offset {offset}"
                    )));
                }
                self.set_items(instr, items)?;
            }
            (Op::AddItems, _) => {
                let items = self.pop_mark(instr)?;
                let Value::Set(set) = self.top(instr)? else {
                    return Err(self.wrong_target(instr, "set"));
                };
                let set = set.clone();
                let mut set = set.borrow_mut();
                for item in items {
                    set.add(item).map_err(|e| DecodeError::exec(offset, e))?;
                }
            }

            (Op::Get, Arg::Uint(slot)) => {
                let value = self.memo.get(&slot).cloned().ok_or(DecodeError::MemoMissing {
                    slot,
                    offset: offset as u64,
                })?;
                self.stack.push(value);
            }
            (Op::Put, Arg::Uint(slot)) => {
                let top = self.top(instr)?.clone();
                self.memo.insert(slot, top);
            }
            (Op::Memoize, _) => {
                let top = self.top(instr)?.clone();
                self.memo.insert(self.memo.len() as u64, top);
            }

            (Op::StackGlobal, _) => {
                let name = self.pop_str(instr)?;
                let module = self.pop_str(instr)?;
                let value = self.interp.find_global(&module, &name).map_err(|_| {
                    DecodeError::UnresolvableNativeReference {
                        module: module.to_string(),
                        name: name.to_string(),
                    }
                })?;
                self.stack.push(value);
            }
            (Op::Reduce, _) => {
                let args = self.pop(instr)?;
                let callable = self.pop(instr)?;
                let Value::Tuple(args) = args else {
                    return Err(DecodeError::InvalidState(format!(
                        "REDUCE arguments must be a tuple, not {} (offset {offset})",
                        args.kind_name()
                    )));
                };
                let result = self
                    .interp
                    .call(&callable, &args, &[])
                    .map_err(|e| DecodeError::exec(offset, e))?;
                self.stack.push(result);
            }
            (Op::NewObj, _) => {
                let args = self.pop(instr)?;
                let cls = self.pop(instr)?;
                let Value::Type(cls) = cls else {
                    return Err(DecodeError::InvalidState(format!(
                        "NEWOBJ needs a class, not {} (offset {offset})",
                        cls.kind_name()
                    )));
                };
                if !matches!(args.as_tuple(), Some([])) {
                    return Err(DecodeError::InvalidState(format!(
                        "NEWOBJ takes no constructor arguments (offset {offset})"
                    )));
                }
                let inst = self
                    .interp
                    .new_instance(&cls)
                    .map_err(|e| DecodeError::exec(offset, e))?;
                self.stack.push(inst);
            }
            (Op::Build, _) => {
                let state = self.pop(instr)?;
                let target = self.top(instr)?.clone();
                self.build(instr, &target, state)?;
            }

            (op, arg) => {
                return Err(DecodeError::InvalidState(format!(
                    "{} with operand {arg:?} at offset {offset}",
                    op.name()
                )))
            }
        }
        Ok(())
    }

    // ========================================================================
    // Stack helpers
    // ========================================================================

    fn mark_floor(&self) -> usize {
        self.marks.last().copied().unwrap_or(0)
    }

    fn pop(&mut self, instr: &Instruction<'_>) -> Result<Value, DecodeError> {
        if self.stack.len() <= self.mark_floor() && !self.marks.is_empty() {
            return Err(DecodeError::underflow(instr.op.name(), instr.offset));
        }
        self.stack
            .pop()
            .ok_or_else(|| DecodeError::underflow(instr.op.name(), instr.offset))
    }

    fn top(&self, instr: &Instruction<'_>) -> Result<&Value, DecodeError> {
        self.stack
            .last()
            .ok_or_else(|| DecodeError::underflow(instr.op.name(), instr.offset))
    }

    fn pop_mark(&mut self, instr: &Instruction<'_>) -> Result<Vec<Value>, DecodeError> {
        let mark = self.marks.pop().ok_or(DecodeError::MissingMark {
            offset: instr.offset as u64,
        })?;
        Ok(self.stack.split_off(mark))
    }

    fn pop_str(&mut self, instr: &Instruction<'_>) -> Result<Rc<str>, DecodeError> {
        match self.pop(instr)? {
            Value::Str(s) => Ok(s),
            other => Err(DecodeError::InvalidState(format!(
                "{} expects a str, not {} (offset {})",
                instr.op.name(),
                other.kind_name(),
                instr.offset
            ))),
        }
    }

    fn wrong_target(&self, instr: &Instruction<'_>, expected: &str) -> DecodeError {
        let found = self.stack.last().map_or("nothing", |v| v.kind_name());
        DecodeError::InvalidState(format!(
            "{} needs a {expected} on the stack, found {found} (offset {})",
            instr.op.name(),
            instr.offset
        ))
    }

    fn extend_list(&mut self, instr: &Instruction<'_>, items: Vec<Value>) -> Result<(), DecodeError> {
        match self.top(instr)? {
            Value::List(list) => {
                list.borrow_mut().extend(items);
                Ok(())
            }
            _ => Err(self.wrong_target(instr, "list")),
        }
    }

    fn set_items(&mut self, instr: &Instruction<'_>, items: Vec<Value>) -> Result<(), DecodeError> {
        let Value::Dict(dict) = self.top(instr)? else {
            return Err(self.wrong_target(instr, "dict"));
        };
        let dict = dict.clone();
        let mut dict = dict.borrow_mut();
        let mut items = items.into_iter();
        while let (Some(key), Some(value)) = (items.next(), items.next()) {
            dict.insert(key, value)
                .map_err(|e| DecodeError::exec(instr.offset, e))?;
        }
        Ok(())
    }

    // ========================================================================
    // BUILD
    // ========================================================================

    /// Apply `state` or `(state, slotstate)` to `target`.
    ///
    /// A dict state becomes an instance's `__dict__` (or is merged into a
    /// non-empty one); anything else is applied one `setattr` at a time.
    fn build(&mut self, instr: &Instruction<'_>, target: &Value, state: Value) -> Result<(), DecodeError> {
        let (state, slotstate) = match &state {
            Value::Tuple(pair) if pair.len() == 2 => (pair[0].clone(), pair[1].clone()),
            _ => (state, Value::None),
        };

        match (&state, target) {
            (Value::None, _) => {}
            (Value::Dict(state), Value::Instance(inst)) if inst.has_dict() => {
                match inst.dict() {
                    // fresh from NEWOBJ: adopt the state so aliases of it stay shared
                    Some(dict) if dict.borrow().is_empty() => {
                        inst.set_dict(state.clone());
                    }
                    Some(dict) => {
                        let entries: Vec<(Value, Value)> = state
                            .borrow()
                            .iter()
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect();
                        let mut dict = dict.borrow_mut();
                        for (k, v) in entries {
                            dict.insert(k, v)
                                .map_err(|e| DecodeError::exec(instr.offset, e))?;
                        }
                    }
                    None => {}
                }
            }
            (Value::Dict(_), _) => self.setattrs(instr, target, &state)?,
            (other, _) => {
                return Err(DecodeError::InvalidState(format!(
                    "BUILD state must be a dict or None, not {} (offset {})",
                    other.kind_name(),
                    instr.offset
                )))
            }
        }

        match &slotstate {
            Value::None => Ok(()),
            Value::Dict(_) => self.setattrs(instr, target, &slotstate),
            other => Err(DecodeError::InvalidState(format!(
                "BUILD slot state must be a dict or None, not {} (offset {})",
                other.kind_name(),
                instr.offset
            ))),
        }
    }

    fn setattrs(&mut self, instr: &Instruction<'_>, target: &Value, attrs: &Value) -> Result<(), DecodeError> {
        let Value::Dict(attrs) = attrs else {
            return Ok(());
        };
        let entries: Vec<(Value, Value)> = attrs
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, value) in entries {
            let Value::Str(name) = key else {
                return Err(DecodeError::InvalidState(format!(
                    "attribute names must be str, not {} (offset {})",
                    key.kind_name(),
                    instr.offset
                )));
            };
            self.interp
                .setattr(target, &name, value)
                .map_err(|e| DecodeError::exec(instr.offset, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::StreamWriter;
    use deeppickle_vm::{Dict, ExecError};

    fn load(bytes: &[u8]) -> Result<Value, DecodeError> {
        let mut interp = Interpreter::new();
        Unpickler::new(&mut interp, bytes).load()
    }

    fn stream(build: impl FnOnce(&mut StreamWriter)) -> Vec<u8> {
        let mut w = StreamWriter::new();
        w.proto();
        build(&mut w);
        w.op(Op::Stop);
        w.into_bytes()
    }

    #[test]
    fn test_primitives() {
        let value = load(&stream(|w| w.int(-7))).unwrap();
        assert_eq!(value.as_int(), Some(-7));
        let value = load(&stream(|w| w.str("hi"))).unwrap();
        assert_eq!(value.as_str(), Some("hi"));
    }

    #[test]
    fn test_reduce_calls_global() {
        let bytes = stream(|w| {
            w.global("operator", "add");
            w.int(2);
            w.int(3);
            w.op(Op::Tuple2);
            w.op(Op::Reduce);
        });
        assert_eq!(load(&bytes).unwrap().as_int(), Some(5));
    }

    #[test]
    fn test_memoize_and_get_share_identity() {
        let bytes = stream(|w| {
            w.op(Op::EmptyList);
            w.op(Op::Memoize);
            w.get(0);
            w.op(Op::Append);
        });
        let value = load(&bytes).unwrap();
        let Value::List(list) = &value else { panic!("expected list") };
        assert!(list.borrow()[0].is(&value));
    }

    #[test]
    fn test_unsupported_protocol() {
        let bytes = [Op::Proto.byte(), 9, Op::NoneValue.byte(), Op::Stop.byte()];
        assert!(matches!(load(&bytes), Err(DecodeError::UnsupportedProtocol(9))));
    }

    #[test]
    fn test_missing_stop() {
        let mut w = StreamWriter::new();
        w.proto();
        w.none();
        assert!(matches!(load(w.as_bytes()), Err(DecodeError::MissingStop)));
    }

    #[test]
    fn test_underflow_and_missing_mark() {
        assert!(matches!(
            load(&stream(|w| w.op(Op::Reduce))),
            Err(DecodeError::StackUnderflow { op: "REDUCE", .. })
        ));
        assert!(matches!(
            load(&stream(|w| {
                w.none();
                w.op(Op::Tuple)
            })),
            Err(DecodeError::MissingMark { .. })
        ));
    }

    #[test]
    fn test_memo_missing() {
        assert!(matches!(
            load(&stream(|w| w.get(3))),
            Err(DecodeError::MemoMissing { slot: 3, .. })
        ));
    }

    #[test]
    fn test_unresolvable_global() {
        let err = load(&stream(|w| w.global("nowhere", "thing"))).unwrap_err();
        match err {
            DecodeError::UnresolvableNativeReference { module, name } => {
                assert_eq!(module, "nowhere");
                assert_eq!(name, "thing");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_exec_error_carries_offset() {
        let bytes = stream(|w| {
            w.global("operator", "add");
            w.int(1);
            w.str("x");
            w.op(Op::Tuple2);
            w.op(Op::Reduce);
        });
        match load(&bytes).unwrap_err() {
            DecodeError::Exec { source, .. } => assert!(matches!(source, ExecError::Type(_))),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_build_patches_attributes() {
        let bytes = stream(|w| {
            w.global("types", "CellType");
            w.op(Op::EmptyTuple);
            w.op(Op::Reduce);
            w.none();
            w.op(Op::EmptyDict);
            w.str("cell_contents");
            w.int(9);
            w.op(Op::SetItem);
            w.op(Op::Tuple2);
            w.op(Op::Build);
        });
        let value = load(&bytes).unwrap();
        let cell = value.as_cell().unwrap();
        assert_eq!(cell.get().and_then(|v| v.as_int()), Some(9));
    }

    #[test]
    fn test_pop_mark_discards_items() {
        let bytes = stream(|w| {
            w.int(1);
            w.op(Op::Mark);
            w.int(2);
            w.int(3);
            w.op(Op::PopMark);
        });
        assert_eq!(load(&bytes).unwrap().as_int(), Some(1));
    }

    #[test]
    fn test_build_adopts_dict_state() {
        let mut interp = Interpreter::new();
        let cls = interp.new_class("Box", vec![], Dict::new(), None).unwrap();
        interp.module("__main__").unwrap().set("Box", Value::Type(cls));
        // [obj, state] where state was applied to obj by BUILD
        let bytes = stream(|w| {
            w.op(Op::EmptyList);
            w.op(Op::Memoize);
            w.global("__main__", "Box");
            w.op(Op::EmptyTuple);
            w.op(Op::NewObj);
            w.op(Op::Memoize);
            w.op(Op::EmptyDict);
            w.op(Op::Memoize);
            w.str("k");
            w.int(1);
            w.op(Op::SetItem);
            w.op(Op::Build);
            w.op(Op::Append);
            w.get(2);
            w.op(Op::Append);
        });
        let value = Unpickler::new(&mut interp, &bytes).load().unwrap();
        let Value::List(items) = &value else { panic!("expected list") };
        let items = items.borrow();
        let Value::Instance(inst) = &items[0] else { panic!("expected instance") };
        assert!(Value::Dict(inst.dict().unwrap()).is(&items[1]));
        assert_eq!(interp.getattr(&items[0], "k").unwrap().as_int(), Some(1));
    }
}
