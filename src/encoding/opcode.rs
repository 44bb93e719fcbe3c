//! Instruction bytes of the stream

/// Version written in the `Proto` header
pub const PROTOCOL_VERSION: u8 = 1;

/// One instruction of the stack machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Op {
    Mark = b'(',
    Stop = b'.',
    Pop = b'0',
    PopMark = b'1',
    Dup = b'2',
    Float = b'G',
    Int = b'I',
    NoneValue = b'N',
    Reduce = b'R',
    Str = b'X',
    Bytes = b'B',
    Append = b'a',
    Build = b'b',
    Appends = b'e',
    Get = b'h',
    Put = b'q',
    SetItem = b's',
    Tuple = b't',
    SetItems = b'u',
    EmptyDict = b'}',
    EmptyList = b']',
    EmptyTuple = b')',
    Proto = 0x80,
    NewObj = 0x81,
    Tuple1 = 0x85,
    Tuple2 = 0x86,
    Tuple3 = 0x87,
    True = 0x88,
    False = 0x89,
    EmptySet = 0x8f,
    AddItems = 0x90,
    FrozenSet = 0x91,
    StackGlobal = 0x93,
    Memoize = 0x94,
}

/// What follows an opcode byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    None,
    /// One raw byte
    U8,
    /// Unsigned LEB128
    Varint,
    /// Zigzag LEB128
    Signed,
    /// 8 bytes, big-endian IEEE 754
    F64,
    /// Varint length followed by that many bytes
    Blob,
}

impl Op {
    pub fn from_u8(byte: u8) -> Option<Self> {
        use Op::*;
        Some(match byte {
            b'(' => Mark,
            b'.' => Stop,
            b'0' => Pop,
            b'1' => PopMark,
            b'2' => Dup,
            b'G' => Float,
            b'I' => Int,
            b'N' => NoneValue,
            b'R' => Reduce,
            b'X' => Str,
            b'B' => Bytes,
            b'a' => Append,
            b'b' => Build,
            b'e' => Appends,
            b'h' => Get,
            b'q' => Put,
            b's' => SetItem,
            b't' => Tuple,
            b'u' => SetItems,
            b'}' => EmptyDict,
            b']' => EmptyList,
            b')' => EmptyTuple,
            0x80 => Proto,
            0x81 => NewObj,
            0x85 => Tuple1,
            0x86 => Tuple2,
            0x87 => Tuple3,
            0x88 => True,
            0x89 => False,
            0x8f => EmptySet,
            0x90 => AddItems,
            0x91 => FrozenSet,
            0x93 => StackGlobal,
            0x94 => Memoize,
            _ => return None,
        })
    }

    #[inline]
    pub fn byte(self) -> u8 {
        self as u8
    }

    pub fn operand(self) -> Operand {
        match self {
            Op::Proto => Operand::U8,
            Op::Get | Op::Put => Operand::Varint,
            Op::Int => Operand::Signed,
            Op::Float => Operand::F64,
            Op::Str | Op::Bytes => Operand::Blob,
            _ => Operand::None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Op::Mark => "MARK",
            Op::Stop => "STOP",
            Op::Pop => "POP",
            Op::PopMark => "POP_MARK",
            Op::Dup => "DUP",
            Op::Float => "FLOAT",
            Op::Int => "INT",
            Op::NoneValue => "NONE",
            Op::Reduce => "REDUCE",
            Op::Str => "STR",
            Op::Bytes => "BYTES",
            Op::Append => "APPEND",
            Op::Build => "BUILD",
            Op::Appends => "APPENDS",
            Op::Get => "GET",
            Op::Put => "PUT",
            Op::SetItem => "SETITEM",
            Op::Tuple => "TUPLE",
            Op::SetItems => "SETITEMS",
            Op::EmptyDict => "EMPTY_DICT",
            Op::EmptyList => "EMPTY_LIST",
            Op::EmptyTuple => "EMPTY_TUPLE",
            Op::Proto => "PROTO",
            Op::NewObj => "NEWOBJ",
            Op::Tuple1 => "TUPLE1",
            Op::Tuple2 => "TUPLE2",
            Op::Tuple3 => "TUPLE3",
            Op::True => "TRUE",
            Op::False => "FALSE",
            Op::EmptySet => "EMPTY_SET",
            Op::AddItems => "ADDITEMS",
            Op::FrozenSet => "FROZENSET",
            Op::StackGlobal => "STACK_GLOBAL",
            Op::Memoize => "MEMOIZE",
        }
    }
}
