//! A stream that decodes to its own bytes.
//!
//! Layout: `head ++ body ++ tail` where `body = head ++ tail` is pushed as a
//! bytes literal by `head`, and `tail` rebuilds
//! `body[:H] + body + body[H:]` with `H = len(head)`.

use deeppickle_vm::{Interpreter, Value};
use tracing::debug;

use crate::encoding::varint::{varint_size, write_varint};
use crate::encoding::{Op, StreamWriter, PROTOCOL_VERSION};
use crate::error::PickleResult;
use crate::unpickler::Unpickler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuineStyle {
    /// Every intermediate is stored in an explicit memo slot
    #[default]
    Readable,
    /// Shortest instruction sequence, memo slots assigned implicitly
    Golfed,
}

/// Build a stream that decodes to a bytes value equal to the stream.
pub fn make_quine(style: QuineStyle) -> Vec<u8> {
    // head is proto (2 bytes), the bytes opcode and the body length
    let mut head_len = 4;
    loop {
        let tail = tail(style, head_len);
        let body_len = head_len + tail.len();
        let needed = 3 + varint_size(body_len as u64);
        if needed == head_len {
            let mut head = vec![Op::Proto.byte(), PROTOCOL_VERSION, Op::Bytes.byte()];
            write_varint(body_len as u64, &mut head);

            let mut out = Vec::with_capacity(head_len + body_len + tail.len());
            out.extend_from_slice(&head);
            out.extend_from_slice(&head);
            out.extend_from_slice(&tail);
            out.extend_from_slice(&tail);
            debug!(?style, len = out.len(), head = head_len, "quine assembled");
            return out;
        }
        head_len = needed;
    }
}

/// Decode `data` and report whether it reproduced itself.
pub fn check_quine(interp: &mut Interpreter, data: &[u8]) -> PickleResult<bool> {
    let value = Unpickler::new(interp, data).load()?;
    Ok(matches!(value, Value::Bytes(b) if &b[..] == data))
}

fn tail(style: QuineStyle, head_len: usize) -> Vec<u8> {
    let h = head_len as i64;
    let mut w = StreamWriter::new();
    match style {
        QuineStyle::Readable => {
            w.put(0);
            w.global("builtins", "slice");
            w.put(1);
            w.global("operator", "getitem");
            w.put(2);
            w.global("operator", "add");
            w.put(3);

            // slices for body[:H] and body[H:]
            w.get(1);
            w.none();
            w.int(h);
            call_pair(&mut w, Some(4));
            w.get(1);
            w.int(h);
            w.none();
            call_pair(&mut w, Some(5));

            for (slice, slot) in [(4, 6), (5, 7)] {
                w.get(2);
                w.get(0);
                w.get(slice);
                call_pair(&mut w, Some(slot));
            }

            w.get(3);
            w.get(6);
            w.get(0);
            call_pair(&mut w, Some(8));
            w.get(3);
            w.get(8);
            w.get(7);
            call_pair(&mut w, None);
        }
        QuineStyle::Golfed => {
            w.op(Op::Memoize);
            w.str("operator");
            w.op(Op::Memoize);
            w.str("add");
            w.op(Op::StackGlobal);
            w.op(Op::Dup);

            w.get(1);
            w.str("getitem");
            w.op(Op::StackGlobal);
            w.op(Op::Memoize);
            w.get(0);
            w.global("builtins", "slice");
            w.op(Op::Memoize);
            w.none();
            w.int(h);
            w.op(Op::Tuple2);
            w.op(Op::Reduce);
            w.op(Op::Tuple2);
            w.op(Op::Reduce);

            w.get(0);
            w.op(Op::Tuple2);
            w.op(Op::Reduce);

            w.get(2);
            w.get(0);
            w.get(3);
            w.int(h);
            w.none();
            w.op(Op::Tuple2);
            w.op(Op::Reduce);
            w.op(Op::Tuple2);
            w.op(Op::Reduce);

            w.op(Op::Tuple2);
            w.op(Op::Reduce);
        }
    }
    w.op(Op::Stop);
    w.into_bytes()
}

/// Call the callable below the top two items with them as arguments
fn call_pair(w: &mut StreamWriter, slot: Option<u64>) {
    w.op(Op::Tuple2);
    w.op(Op::Reduce);
    if let Some(slot) = slot {
        w.put(slot);
    }
}
