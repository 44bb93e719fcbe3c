//! Human-readable listing of an encoded stream

use std::fmt::Write;

use rustc_hash::FxHashSet;

use super::opcode::Op;
use super::reader::{Arg, StreamReader};
use crate::error::DecodeError;

/// Render one instruction per line with its offset, indented by the number
/// of open marks. Memo stores are annotated with the slot they fill.
///
/// ```
/// use deeppickle::encoding::{disassemble, StreamWriter, Op};
///
/// let mut w = StreamWriter::new();
/// w.proto();
/// w.int(3);
/// w.op(Op::Memoize);
/// w.op(Op::Stop);
/// let listing = disassemble(w.as_bytes()).unwrap();
/// assert!(listing.contains("MEMOIZE"));
/// assert!(listing.contains("(as 0)"));
/// ```
pub fn disassemble(data: &[u8]) -> Result<String, DecodeError> {
    let mut out = String::new();
    let mut marks: Vec<usize> = Vec::new();
    let mut memo: FxHashSet<u64> = FxHashSet::default();
    let mut stopped = false;

    for instr in StreamReader::new(data) {
        let instr = instr?;
        if stopped {
            return Err(DecodeError::InvalidState(format!(
                "data after STOP at offset {}",
                instr.offset
            )));
        }
        if consumes_mark(instr.op) && marks.pop().is_none() {
            return Err(DecodeError::MissingMark {
                offset: instr.offset as u64,
            });
        }

        let indent = marks.len() * 2;
        let _ = write!(out, "{:5}: {:indent$}{:<13}", instr.offset, "", instr.op.name());
        match instr.arg {
            Arg::None => {}
            Arg::U8(v) => {
                let _ = write!(out, " {v}");
            }
            Arg::Uint(v) => {
                let _ = write!(out, " {v}");
            }
            Arg::Int(v) => {
                let _ = write!(out, " {v}");
            }
            Arg::Float(v) => {
                let _ = write!(out, " {v:?}");
            }
            Arg::Str(s) => {
                let _ = write!(out, " {s:?}");
            }
            Arg::Bytes(b) => {
                let _ = write!(out, " b'{}'", b.escape_ascii());
            }
        }

        match instr.op {
            Op::Mark => marks.push(instr.offset),
            Op::Memoize => {
                let slot = memo.len() as u64;
                memo.insert(slot);
                let _ = write!(out, " (as {slot})");
            }
            Op::Put => {
                if let Arg::Uint(slot) = instr.arg {
                    memo.insert(slot);
                }
            }
            Op::Get => {
                if let Arg::Uint(slot) = instr.arg {
                    if !memo.contains(&slot) {
                        return Err(DecodeError::MemoMissing {
                            slot,
                            offset: instr.offset as u64,
                        });
                    }
                }
            }
            Op::Stop => stopped = true,
            _ => {}
        }
        out.push('\n');
    }

    if !stopped {
        return Err(DecodeError::MissingStop);
    }
    if let Some(open) = marks.last() {
        let _ = writeln!(out, "warning: mark at offset {open} never closed");
    }
    let _ = writeln!(out, "highest memo slot: {}", memo.iter().max().map_or(-1, |&s| s as i64));
    Ok(out)
}

fn consumes_mark(op: Op) -> bool {
    matches!(
        op,
        Op::PopMark | Op::Tuple | Op::Appends | Op::SetItems | Op::AddItems | Op::FrozenSet
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::writer::StreamWriter;

    #[test]
    fn test_listing_indents_marks() {
        let mut w = StreamWriter::new();
        w.proto();
        w.op(Op::Mark);
        w.int(1);
        w.str("x");
        w.op(Op::Tuple);
        w.op(Op::Stop);
        let listing = disassemble(w.as_bytes()).unwrap();
        let lines: Vec<&str> = listing.lines().collect();
        assert!(lines[0].contains("PROTO"));
        assert!(lines[2].starts_with("    3:   INT"));
        assert!(lines[3].contains("\"x\""));
        assert!(lines[4].starts_with("    8: TUPLE"));
        assert!(listing.ends_with("highest memo slot: -1\n"));
    }

    #[test]
    fn test_missing_mark() {
        let mut w = StreamWriter::new();
        w.proto();
        w.op(Op::Tuple);
        assert!(matches!(
            disassemble(w.as_bytes()),
            Err(DecodeError::MissingMark { offset: 2 })
        ));
    }

    #[test]
    fn test_missing_stop() {
        let mut w = StreamWriter::new();
        w.proto();
        w.none();
        assert!(matches!(disassemble(w.as_bytes()), Err(DecodeError::MissingStop)));
    }

    #[test]
    fn test_get_before_store() {
        let mut w = StreamWriter::new();
        w.proto();
        w.get(0);
        w.op(Op::Stop);
        assert!(matches!(
            disassemble(w.as_bytes()),
            Err(DecodeError::MemoMissing { slot: 0, .. })
        ));
    }
}
