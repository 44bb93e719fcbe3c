//! Stream format: opcodes, varints, writer, reader and disassembler
//!
//! A stream starts with `PROTO 1` and ends with `STOP`. Everything in
//! between is a program for a stack machine with marks and a memo.

pub mod disasm;
pub mod hash;
pub mod opcode;
pub mod reader;
pub mod varint;
pub mod writer;

pub use disasm::disassemble;
pub use hash::{fingerprint, format_fingerprint};
pub use opcode::{Op, Operand, PROTOCOL_VERSION};
pub use reader::{Arg, Instruction, StreamReader};
pub use writer::StreamWriter;
