//! Code objects and the word-code assembler
//!
//! Every instruction is two bytes: an opcode and an argument byte. Arguments
//! wider than a byte are prefixed with `ExtendedArg` instructions carrying the
//! high bytes.

use std::ops::BitOr;
use std::rc::Rc;

use crate::error::{ExecError, ExecResult};
use crate::value::Value;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CodeFlags(pub u32);

impl CodeFlags {
    pub const OPTIMIZED: Self = Self(0x01);
    pub const NEWLOCALS: Self = Self(0x02);
    pub const VARARGS: Self = Self(0x04);
    pub const VARKEYWORDS: Self = Self(0x08);
    pub const NESTED: Self = Self(0x10);
    pub const GENERATOR: Self = Self(0x20);
    pub const NOFREE: Self = Self(0x40);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for CodeFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Which optional values `MakeFunction` pops below the code object
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MakeFunctionFlags(pub u32);

impl MakeFunctionFlags {
    pub const DEFAULTS: Self = Self(0x01);
    pub const KWDEFAULTS: Self = Self(0x02);
    pub const ANNOTATIONS: Self = Self(0x04);
    pub const CLOSURE: Self = Self(0x08);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for MakeFunctionFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A compiled code block
///
/// Field order matches the sixteen positional arguments of the `code`
/// constructor.
#[derive(Debug)]
pub struct Code {
    pub argcount: u32,
    pub posonlyargcount: u32,
    pub kwonlyargcount: u32,
    pub nlocals: u32,
    pub stacksize: u32,
    pub flags: CodeFlags,
    pub bytecode: Rc<[u8]>,
    pub consts: Rc<[Value]>,
    pub names: Vec<Rc<str>>,
    pub varnames: Vec<Rc<str>>,
    pub filename: Rc<str>,
    pub name: Rc<str>,
    pub firstlineno: u32,
    pub linetable: Rc<[u8]>,
    pub freevars: Vec<Rc<str>>,
    pub cellvars: Vec<Rc<str>>,
}

impl Code {
    /// Index of a deref slot: cellvars first, then freevars
    pub fn deref_name(&self, index: usize) -> Option<&Rc<str>> {
        self.cellvars
            .get(index)
            .or_else(|| self.freevars.get(index.checked_sub(self.cellvars.len())?))
    }

    /// Nested code objects stored among the constants
    pub fn nested_code(&self) -> impl Iterator<Item = &Rc<Code>> {
        self.consts.iter().filter_map(|c| match c {
            Value::Code(code) => Some(code),
            _ => None,
        })
    }
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    Nop = 0,
    PopTop = 1,
    DupTop = 2,
    RotTwo = 3,
    BinaryAdd = 10,
    BinarySubtract = 11,
    BinaryMultiply = 12,
    BinarySubscr = 13,
    LoadConst = 20,
    LoadFast = 21,
    StoreFast = 22,
    LoadGlobal = 23,
    StoreGlobal = 24,
    LoadDeref = 25,
    StoreDeref = 26,
    LoadClosure = 27,
    LoadAttr = 28,
    StoreAttr = 29,
    DeleteAttr = 30,
    BuildTuple = 40,
    BuildList = 41,
    BuildMap = 42,
    CompareOp = 50,
    IsOp = 51,
    Jump = 60,
    PopJumpIfFalse = 61,
    PopJumpIfTrue = 62,
    CallFunction = 70,
    CallFunctionKw = 71,
    MakeFunction = 72,
    ReturnValue = 73,
    ExtendedArg = 90,
}

impl Opcode {
    pub fn from_u8(byte: u8) -> Option<Self> {
        use Opcode::*;
        Some(match byte {
            0 => Nop,
            1 => PopTop,
            2 => DupTop,
            3 => RotTwo,
            10 => BinaryAdd,
            11 => BinarySubtract,
            12 => BinaryMultiply,
            13 => BinarySubscr,
            20 => LoadConst,
            21 => LoadFast,
            22 => StoreFast,
            23 => LoadGlobal,
            24 => StoreGlobal,
            25 => LoadDeref,
            26 => StoreDeref,
            27 => LoadClosure,
            28 => LoadAttr,
            29 => StoreAttr,
            30 => DeleteAttr,
            40 => BuildTuple,
            41 => BuildList,
            42 => BuildMap,
            50 => CompareOp,
            51 => IsOp,
            60 => Jump,
            61 => PopJumpIfFalse,
            62 => PopJumpIfTrue,
            70 => CallFunction,
            71 => CallFunctionKw,
            72 => MakeFunction,
            73 => ReturnValue,
            90 => ExtendedArg,
            _ => return None,
        })
    }

    fn stack_effect(self, arg: u32) -> i32 {
        use Opcode::*;
        let arg = arg as i32;
        match self {
            Nop | ExtendedArg | Jump | RotTwo | LoadAttr => 0,
            PopTop | ReturnValue | PopJumpIfFalse | PopJumpIfTrue => -1,
            DupTop => 1,
            BinaryAdd | BinarySubtract | BinaryMultiply | BinarySubscr | CompareOp | IsOp => -1,
            LoadConst | LoadFast | LoadGlobal | LoadDeref | LoadClosure => 1,
            StoreFast | StoreGlobal | StoreDeref | DeleteAttr => -1,
            StoreAttr => -2,
            BuildTuple | BuildList => 1 - arg,
            BuildMap => 1 - 2 * arg,
            CallFunction => -arg,
            CallFunctionKw => -arg - 1,
            MakeFunction => -1 - (arg as u32).count_ones() as i32,
        }
    }
}

/// Comparison operators for `CompareOp`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Lt = 0,
    Le = 1,
    Eq = 2,
    Ne = 3,
    Gt = 4,
    Ge = 5,
}

impl CmpOp {
    pub fn from_arg(arg: u32) -> Option<Self> {
        Some(match arg {
            0 => CmpOp::Lt,
            1 => CmpOp::Le,
            2 => CmpOp::Eq,
            3 => CmpOp::Ne,
            4 => CmpOp::Gt,
            5 => CmpOp::Ge,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Label(usize);

/// Assembles a [`Code`] object
///
/// Setup methods consume and return the builder; emit methods take `&mut self`
/// so instruction sequences chain:
///
/// ```
/// use deeppickle_vm::{CodeBuilder, Value};
///
/// let mut b = CodeBuilder::new("inc").params(&["n"]);
/// b.load_fast("n").load_const(Value::Int(1)).binary_add().return_value();
/// let code = b.build().unwrap();
/// assert_eq!(code.argcount, 1);
/// ```
pub struct CodeBuilder {
    name: Rc<str>,
    filename: Rc<str>,
    firstlineno: u32,
    argcount: u32,
    posonlyargcount: u32,
    kwonlyargcount: u32,
    flags: CodeFlags,
    varnames: Vec<Rc<str>>,
    names: Vec<Rc<str>>,
    consts: Vec<Value>,
    freevars: Vec<Rc<str>>,
    cellvars: Vec<Rc<str>>,
    bytecode: Vec<u8>,
    labels: Vec<Option<usize>>,
    fixups: Vec<(usize, Label)>,
    depth: i32,
    max_depth: i32,
    error: Option<ExecError>,
}

impl CodeBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: Rc::from(name),
            filename: Rc::from("<deeppickle>"),
            firstlineno: 1,
            argcount: 0,
            posonlyargcount: 0,
            kwonlyargcount: 0,
            flags: CodeFlags::default(),
            varnames: Vec::new(),
            names: Vec::new(),
            // slot 0 is reserved for the docstring
            consts: vec![Value::None],
            freevars: Vec::new(),
            cellvars: Vec::new(),
            bytecode: Vec::new(),
            labels: Vec::new(),
            fixups: Vec::new(),
            depth: 0,
            max_depth: 0,
            error: None,
        }
    }

    // ------------------------------------------------------------------------
    // Setup
    // ------------------------------------------------------------------------

    pub fn filename(mut self, filename: &str) -> Self {
        self.filename = Rc::from(filename);
        self
    }

    pub fn first_line(mut self, line: u32) -> Self {
        self.firstlineno = line;
        self
    }

    pub fn docstring(mut self, doc: &str) -> Self {
        self.consts[0] = Value::str(doc);
        self
    }

    /// Positional parameters; must be declared before any other local
    pub fn params(mut self, names: &[&str]) -> Self {
        self.argcount = names.len() as u32;
        self.varnames.extend(names.iter().map(|n| Rc::from(*n)));
        self
    }

    /// Marks the first `n` positional parameters positional-only
    pub fn posonly(mut self, n: u32) -> Self {
        self.posonlyargcount = n;
        self
    }

    pub fn kwonly(mut self, names: &[&str]) -> Self {
        self.kwonlyargcount = names.len() as u32;
        self.varnames.extend(names.iter().map(|n| Rc::from(*n)));
        self
    }

    pub fn varargs(mut self, name: &str) -> Self {
        self.flags = self.flags | CodeFlags::VARARGS;
        self.varnames.push(Rc::from(name));
        self
    }

    pub fn varkeywords(mut self, name: &str) -> Self {
        self.flags = self.flags | CodeFlags::VARKEYWORDS;
        self.varnames.push(Rc::from(name));
        self
    }

    pub fn cellvars(mut self, names: &[&str]) -> Self {
        self.cellvars = names.iter().map(|n| Rc::from(*n)).collect();
        self
    }

    pub fn freevars(mut self, names: &[&str]) -> Self {
        self.freevars = names.iter().map(|n| Rc::from(*n)).collect();
        self.flags = self.flags | CodeFlags::NESTED;
        self
    }

    pub fn generator(mut self) -> Self {
        self.flags = self.flags | CodeFlags::GENERATOR;
        self
    }

    // ------------------------------------------------------------------------
    // Emission
    // ------------------------------------------------------------------------

    fn emit(&mut self, op: Opcode, arg: u32) -> &mut Self {
        for shift in [24u32, 16, 8] {
            if arg >> shift != 0 {
                self.bytecode.push(Opcode::ExtendedArg as u8);
                self.bytecode.push((arg >> shift) as u8);
            }
        }
        self.bytecode.push(op as u8);
        self.bytecode.push(arg as u8);
        self.adjust(op.stack_effect(arg));
        self
    }

    // Jumps always take the two-word form so targets can be patched in place.
    fn emit_jump(&mut self, op: Opcode, label: Label) -> &mut Self {
        let at = self.bytecode.len();
        self.bytecode
            .extend_from_slice(&[Opcode::ExtendedArg as u8, 0, op as u8, 0]);
        self.fixups.push((at, label));
        self.adjust(op.stack_effect(0));
        self
    }

    fn adjust(&mut self, effect: i32) {
        self.depth += effect;
        self.max_depth = self.max_depth.max(self.depth);
    }

    fn fail(&mut self, message: String) -> &mut Self {
        if self.error.is_none() {
            self.error = Some(ExecError::bytecode(&self.name, self.bytecode.len(), message));
        }
        self
    }

    fn local_index(&mut self, name: &str) -> u32 {
        match self.varnames.iter().position(|v| &**v == name) {
            Some(i) => i as u32,
            None => {
                self.varnames.push(Rc::from(name));
                (self.varnames.len() - 1) as u32
            }
        }
    }

    fn name_index(&mut self, name: &str) -> u32 {
        match self.names.iter().position(|v| &**v == name) {
            Some(i) => i as u32,
            None => {
                self.names.push(Rc::from(name));
                (self.names.len() - 1) as u32
            }
        }
    }

    fn deref_index(&self, name: &str) -> Option<u32> {
        self.cellvars
            .iter()
            .chain(self.freevars.iter())
            .position(|v| &**v == name)
            .map(|i| i as u32)
    }

    pub fn load_const(&mut self, value: Value) -> &mut Self {
        let index = match self.consts.iter().position(|c| c.is(&value)) {
            Some(i) => i,
            None => {
                self.consts.push(value);
                self.consts.len() - 1
            }
        };
        self.emit(Opcode::LoadConst, index as u32)
    }

    pub fn load_fast(&mut self, name: &str) -> &mut Self {
        let i = self.local_index(name);
        self.emit(Opcode::LoadFast, i)
    }

    pub fn store_fast(&mut self, name: &str) -> &mut Self {
        let i = self.local_index(name);
        self.emit(Opcode::StoreFast, i)
    }

    pub fn load_global(&mut self, name: &str) -> &mut Self {
        let i = self.name_index(name);
        self.emit(Opcode::LoadGlobal, i)
    }

    pub fn store_global(&mut self, name: &str) -> &mut Self {
        let i = self.name_index(name);
        self.emit(Opcode::StoreGlobal, i)
    }

    fn emit_deref(&mut self, op: Opcode, name: &str) -> &mut Self {
        match self.deref_index(name) {
            Some(i) => self.emit(op, i),
            None => self.fail(format!("'{name}' is neither a cell nor a free variable")),
        }
    }

    pub fn load_deref(&mut self, name: &str) -> &mut Self {
        self.emit_deref(Opcode::LoadDeref, name)
    }

    pub fn store_deref(&mut self, name: &str) -> &mut Self {
        self.emit_deref(Opcode::StoreDeref, name)
    }

    pub fn load_closure(&mut self, name: &str) -> &mut Self {
        self.emit_deref(Opcode::LoadClosure, name)
    }

    pub fn load_attr(&mut self, name: &str) -> &mut Self {
        let i = self.name_index(name);
        self.emit(Opcode::LoadAttr, i)
    }

    pub fn store_attr(&mut self, name: &str) -> &mut Self {
        let i = self.name_index(name);
        self.emit(Opcode::StoreAttr, i)
    }

    pub fn delete_attr(&mut self, name: &str) -> &mut Self {
        let i = self.name_index(name);
        self.emit(Opcode::DeleteAttr, i)
    }

    pub fn binary_add(&mut self) -> &mut Self {
        self.emit(Opcode::BinaryAdd, 0)
    }

    pub fn binary_subtract(&mut self) -> &mut Self {
        self.emit(Opcode::BinarySubtract, 0)
    }

    pub fn binary_multiply(&mut self) -> &mut Self {
        self.emit(Opcode::BinaryMultiply, 0)
    }

    pub fn binary_subscr(&mut self) -> &mut Self {
        self.emit(Opcode::BinarySubscr, 0)
    }

    pub fn compare(&mut self, op: CmpOp) -> &mut Self {
        self.emit(Opcode::CompareOp, op as u32)
    }

    /// `is` when `negate` is false, `is not` otherwise
    pub fn is_op(&mut self, negate: bool) -> &mut Self {
        self.emit(Opcode::IsOp, negate as u32)
    }

    pub fn build_tuple(&mut self, n: u32) -> &mut Self {
        self.emit(Opcode::BuildTuple, n)
    }

    pub fn build_list(&mut self, n: u32) -> &mut Self {
        self.emit(Opcode::BuildList, n)
    }

    /// Pops `n` key/value pairs
    pub fn build_map(&mut self, n: u32) -> &mut Self {
        self.emit(Opcode::BuildMap, n)
    }

    pub fn call(&mut self, argc: u32) -> &mut Self {
        self.emit(Opcode::CallFunction, argc)
    }

    /// Call with `argc` stacked arguments, the last `names.len()` of which
    /// are passed by keyword
    pub fn call_kw(&mut self, argc: u32, names: &[&str]) -> &mut Self {
        let names = Value::tuple(names.iter().map(|n| Value::str(n)).collect());
        self.load_const(names);
        self.emit(Opcode::CallFunctionKw, argc)
    }

    pub fn make_function(&mut self, flags: MakeFunctionFlags) -> &mut Self {
        self.emit(Opcode::MakeFunction, flags.0)
    }

    pub fn pop_top(&mut self) -> &mut Self {
        self.emit(Opcode::PopTop, 0)
    }

    pub fn dup_top(&mut self) -> &mut Self {
        self.emit(Opcode::DupTop, 0)
    }

    pub fn rot_two(&mut self) -> &mut Self {
        self.emit(Opcode::RotTwo, 0)
    }

    pub fn return_value(&mut self) -> &mut Self {
        self.emit(Opcode::ReturnValue, 0)
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    pub fn bind(&mut self, label: Label) -> &mut Self {
        self.labels[label.0] = Some(self.bytecode.len());
        self
    }

    pub fn jump(&mut self, label: Label) -> &mut Self {
        self.emit_jump(Opcode::Jump, label)
    }

    pub fn pop_jump_if_false(&mut self, label: Label) -> &mut Self {
        self.emit_jump(Opcode::PopJumpIfFalse, label)
    }

    pub fn pop_jump_if_true(&mut self, label: Label) -> &mut Self {
        self.emit_jump(Opcode::PopJumpIfTrue, label)
    }

    pub fn build(mut self) -> ExecResult<Code> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        for &(at, label) in &self.fixups {
            let target = self.labels[label.0].ok_or_else(|| {
                ExecError::bytecode(&self.name, at, format!("label {} never bound", label.0))
            })?;
            if target > 0xffff {
                return Err(ExecError::bytecode(&self.name, at, "jump target out of range"));
            }
            self.bytecode[at + 1] = (target >> 8) as u8;
            self.bytecode[at + 3] = target as u8;
        }

        let mut flags = self.flags | CodeFlags::OPTIMIZED | CodeFlags::NEWLOCALS;
        if self.freevars.is_empty() && self.cellvars.is_empty() {
            flags = flags | CodeFlags::NOFREE;
        }
        Ok(Code {
            argcount: self.argcount,
            posonlyargcount: self.posonlyargcount,
            kwonlyargcount: self.kwonlyargcount,
            nlocals: self.varnames.len() as u32,
            stacksize: self.max_depth.max(1) as u32,
            flags,
            bytecode: Rc::from(self.bytecode),
            consts: Rc::from(self.consts),
            names: self.names,
            varnames: self.varnames,
            filename: self.filename,
            name: self.name,
            firstlineno: self.firstlineno,
            linetable: Rc::from(Vec::new()),
            freevars: self.freevars,
            cellvars: self.cellvars,
        })
    }
}
