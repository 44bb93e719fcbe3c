//! Instruction-stream reader
//!
//! Splits a byte stream into instructions. Interpretation of the
//! instructions belongs to the decoder and the disassembler.

use super::opcode::{Op, Operand};
use super::varint::{decode_varint, zigzag_decode};
use crate::error::DecodeError;

/// Decoded operand of an instruction
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arg<'a> {
    None,
    U8(u8),
    Uint(u64),
    Int(i64),
    Float(f64),
    Str(&'a str),
    Bytes(&'a [u8]),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Instruction<'a> {
    /// Position of the opcode byte
    pub offset: usize,
    pub op: Op,
    pub arg: Arg<'a>,
}

pub struct StreamReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> StreamReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Read the next instruction; `None` once the data is exhausted
    pub fn next_instruction(&mut self) -> Result<Option<Instruction<'a>>, DecodeError> {
        if self.is_at_end() {
            return Ok(None);
        }
        let offset = self.pos;
        let byte = self.data[offset];
        let op = Op::from_u8(byte).ok_or(DecodeError::InvalidOpcode {
            byte,
            offset: offset as u64,
        })?;
        self.pos += 1;

        let arg = match op.operand() {
            Operand::None => Arg::None,
            Operand::U8 => Arg::U8(self.take(1)?[0]),
            Operand::Varint => Arg::Uint(self.varint()?),
            Operand::Signed => Arg::Int(zigzag_decode(self.varint()?)),
            Operand::F64 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(self.take(8)?);
                Arg::Float(f64::from_be_bytes(raw))
            }
            Operand::Blob => {
                let len = usize::try_from(self.varint()?).map_err(|_| DecodeError::VarintOverflow)?;
                let data = self.take(len)?;
                if op == Op::Str {
                    Arg::Str(std::str::from_utf8(data).map_err(|_| DecodeError::InvalidUtf8)?)
                } else {
                    Arg::Bytes(data)
                }
            }
        };
        Ok(Some(Instruction { offset, op, arg }))
    }

    fn varint(&mut self) -> Result<u64, DecodeError> {
        let rest = &self.data[self.pos..];
        if rest.is_empty() {
            return Err(self.eof());
        }
        let (value, len) = decode_varint(rest).map_err(|e| match e {
            DecodeError::InvalidVarint => self.eof(),
            other => other,
        })?;
        self.pos += len;
        Ok(value)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let all: &'a [u8] = self.data;
        let end = self.pos.checked_add(len).ok_or_else(|| self.eof())?;
        let data = all.get(self.pos..end).ok_or_else(|| self.eof())?;
        self.pos = end;
        Ok(data)
    }

    fn eof(&self) -> DecodeError {
        DecodeError::UnexpectedEof {
            offset: self.data.len() as u64,
        }
    }
}

impl<'a> Iterator for StreamReader<'a> {
    type Item = Result<Instruction<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_instruction() {
            Ok(Some(instr)) => Some(Ok(instr)),
            Ok(None) => None,
            Err(e) => {
                // stop after the first error
                self.pos = self.data.len();
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::writer::StreamWriter;

    #[test]
    fn test_reads_back_writer_output() {
        let mut w = StreamWriter::new();
        w.proto();
        w.int(-300);
        w.float(2.5);
        w.str("héllo");
        w.bytes(&[1, 2]);
        w.get(7);
        w.op(Op::Stop);
        let bytes = w.into_bytes();

        let instrs: Vec<_> = StreamReader::new(&bytes)
            .collect::<Result<_, _>>()
            .unwrap();
        let args: Vec<_> = instrs.iter().map(|i| i.arg).collect();
        assert_eq!(
            args,
            vec![
                Arg::U8(1),
                Arg::Int(-300),
                Arg::Float(2.5),
                Arg::Str("héllo"),
                Arg::Bytes(&[1, 2]),
                Arg::Uint(7),
                Arg::None,
            ]
        );
        assert_eq!(instrs[1].offset, 2);
    }

    #[test]
    fn test_truncated_string() {
        let bytes = [b'X', 5, b'a'];
        let err = StreamReader::new(&bytes).next_instruction().unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedEof { offset: 3 }));
    }

    #[test]
    fn test_invalid_opcode_offset() {
        let bytes = [b'N', 0x00];
        let mut reader = StreamReader::new(&bytes);
        reader.next_instruction().unwrap();
        let err = reader.next_instruction().unwrap_err();
        assert!(matches!(err, DecodeError::InvalidOpcode { byte: 0, offset: 1 }));
    }

    #[test]
    fn test_invalid_utf8() {
        let bytes = [b'X', 1, 0xff];
        assert!(matches!(
            StreamReader::new(&bytes).next_instruction(),
            Err(DecodeError::InvalidUtf8)
        ));
    }
}
