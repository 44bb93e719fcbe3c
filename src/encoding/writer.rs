//! Instruction-stream writer

use super::opcode::{Op, PROTOCOL_VERSION};
use super::varint::{write_varint, zigzag_encode};

/// Append-only buffer of encoded instructions
#[derive(Debug, Default)]
pub struct StreamWriter {
    buf: Vec<u8>,
}

impl StreamWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn op(&mut self, op: Op) {
        self.buf.push(op.byte());
    }

    pub fn proto(&mut self) {
        self.op(Op::Proto);
        self.buf.push(PROTOCOL_VERSION);
    }

    pub fn none(&mut self) {
        self.op(Op::NoneValue);
    }

    pub fn bool(&mut self, value: bool) {
        self.op(if value { Op::True } else { Op::False });
    }

    pub fn int(&mut self, value: i64) {
        self.op(Op::Int);
        write_varint(zigzag_encode(value), &mut self.buf);
    }

    pub fn float(&mut self, value: f64) {
        self.op(Op::Float);
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn str(&mut self, value: &str) {
        self.op(Op::Str);
        self.blob(value.as_bytes());
    }

    pub fn bytes(&mut self, value: &[u8]) {
        self.op(Op::Bytes);
        self.blob(value);
    }

    fn blob(&mut self, data: &[u8]) {
        write_varint(data.len() as u64, &mut self.buf);
        self.buf.extend_from_slice(data);
    }

    /// Load a memo slot
    pub fn get(&mut self, slot: u64) {
        self.op(Op::Get);
        write_varint(slot, &mut self.buf);
    }

    /// Store the top of the stack into an explicit memo slot
    pub fn put(&mut self, slot: u64) {
        self.op(Op::Put);
        write_varint(slot, &mut self.buf);
    }

    /// Push the value named `module` + dotted `qualname`
    pub fn global(&mut self, module: &str, qualname: &str) {
        self.str(module);
        self.str(qualname);
        self.op(Op::StackGlobal);
    }

    /// Push the value at a canonical `module.qualname` location
    pub fn global_path(&mut self, path: &str) {
        match path.rsplit_once('.') {
            Some((module, name)) => self.global(module, name),
            None => self.global("builtins", path),
        }
    }

    /// Wrap the `n` topmost items into a tuple, using the short forms when possible.
    ///
    /// Only valid when the items were pushed without a mark, so callers with
    /// larger arities go through `Mark`/`Tuple` themselves.
    pub fn small_tuple(&mut self, n: usize) -> bool {
        let op = match n {
            0 => Op::EmptyTuple,
            1 => Op::Tuple1,
            2 => Op::Tuple2,
            3 => Op::Tuple3,
            _ => return false,
        };
        self.op(op);
        true
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}
