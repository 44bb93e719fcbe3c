//! The value representation
//!
//! `Value` is a closed tagged union. Primitives are stored inline and carry
//! no identity; everything else is an `Rc` whose address is the identity
//! used by `is` and by the serializer's memo table.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::code::Code;
use crate::dict::{Dict, HashKey, ValueSet};
use crate::error::{ExecError, ExecResult};
use crate::object::{
    BoundMethod, Cell, ClassMethod, Function, Generator, Instance, MemberDescriptor, Module,
    NativeFunction, NativeObject, Property, Slice, StaticMethod, TypeObject,
};

pub type DictRef = Rc<RefCell<Dict>>;
pub type ListRef = Rc<RefCell<Vec<Value>>>;
pub type SetRef = Rc<RefCell<ValueSet>>;

/// A keyword argument as passed to calls
pub type Kwarg = (Rc<str>, Value);

/// Identity of a heap value: the address of its shared allocation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjId(usize);

impl ObjId {
    pub fn of<T: ?Sized>(rc: &Rc<T>) -> Self {
        ObjId(Rc::as_ptr(rc) as *const () as usize)
    }

    pub fn addr(self) -> usize {
        self.0
    }
}

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Bytes(Rc<[u8]>),
    Tuple(Rc<[Value]>),
    List(ListRef),
    Dict(DictRef),
    Set(SetRef),
    FrozenSet(Rc<[Value]>),
    Function(Rc<Function>),
    Code(Rc<Code>),
    Cell(Rc<Cell>),
    Type(Rc<TypeObject>),
    Instance(Rc<Instance>),
    Module(Rc<Module>),
    StaticMethod(Rc<StaticMethod>),
    ClassMethod(Rc<ClassMethod>),
    Property(Rc<Property>),
    BoundMethod(Rc<BoundMethod>),
    MemberDescriptor(Rc<MemberDescriptor>),
    Native(Rc<NativeFunction>),
    NativeObject(Rc<NativeObject>),
    Slice(Rc<Slice>),
    Generator(Rc<Generator>),
}

impl Value {
    pub fn str(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }

    pub fn bytes(b: &[u8]) -> Self {
        Value::Bytes(Rc::from(b))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(Rc::from(items))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn dict(dict: Dict) -> Self {
        Value::Dict(Rc::new(RefCell::new(dict)))
    }

    pub fn empty_dict() -> Self {
        Self::dict(Dict::new())
    }

    pub fn set(items: Vec<Value>) -> ExecResult<Self> {
        Ok(Value::Set(Rc::new(RefCell::new(ValueSet::from_values(
            items,
        )?))))
    }

    /// Build a frozenset, dropping duplicate elements
    pub fn frozenset(items: Vec<Value>) -> ExecResult<Self> {
        let set = ValueSet::from_values(items)?;
        Ok(Value::FrozenSet(set.iter().cloned().collect()))
    }

    /// Identity of heap values; `None` for primitives
    pub fn id(&self) -> Option<ObjId> {
        let id = match self {
            Value::None
            | Value::Bool(_)
            | Value::Int(_)
            | Value::Float(_)
            | Value::Str(_)
            | Value::Bytes(_) => return None,
            Value::Tuple(v) | Value::FrozenSet(v) => ObjId::of(v),
            Value::List(v) => ObjId::of(v),
            Value::Dict(v) => ObjId::of(v),
            Value::Set(v) => ObjId::of(v),
            Value::Function(v) => ObjId::of(v),
            Value::Code(v) => ObjId::of(v),
            Value::Cell(v) => ObjId::of(v),
            Value::Type(v) => ObjId::of(v),
            Value::Instance(v) => ObjId::of(v),
            Value::Module(v) => ObjId::of(v),
            Value::StaticMethod(v) => ObjId::of(v),
            Value::ClassMethod(v) => ObjId::of(v),
            Value::Property(v) => ObjId::of(v),
            Value::BoundMethod(v) => ObjId::of(v),
            Value::MemberDescriptor(v) => ObjId::of(v),
            Value::Native(v) => ObjId::of(v),
            Value::NativeObject(v) => ObjId::of(v),
            Value::Slice(v) => ObjId::of(v),
            Value::Generator(v) => ObjId::of(v),
        };
        Some(id)
    }

    /// Short name of the value's kind, used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::Tuple(_) => "tuple",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Set(_) => "set",
            Value::FrozenSet(_) => "frozenset",
            Value::Function(_) => "function",
            Value::Code(_) => "code",
            Value::Cell(_) => "cell",
            Value::Type(_) => "type",
            Value::Instance(_) => "object",
            Value::Module(_) => "module",
            Value::StaticMethod(_) => "staticmethod",
            Value::ClassMethod(_) => "classmethod",
            Value::Property(_) => "property",
            Value::BoundMethod(_) => "method",
            Value::MemberDescriptor(_) => "member_descriptor",
            Value::Native(_) => "builtin_function_or_method",
            Value::NativeObject(_) => "native object",
            Value::Slice(_) => "slice",
            Value::Generator(_) => "generator",
        }
    }

    /// Name of the value's class, resolving instances to their class name
    pub fn type_name(&self) -> String {
        match self {
            Value::Instance(inst) => inst.class.name.to_string(),
            Value::NativeObject(obj) => obj.class.name.to_string(),
            other => other.kind_name().to_string(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[Value]> {
        match self {
            Value::Tuple(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&DictRef> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Rc<Function>> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<&Rc<TypeObject>> {
        match self {
            Value::Type(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_cell(&self) -> Option<&Rc<Cell>> {
        match self {
            Value::Cell(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::Tuple(t) | Value::FrozenSet(t) => !t.is_empty(),
            Value::List(l) => !l.borrow().is_empty(),
            Value::Dict(d) => !d.borrow().is_empty(),
            Value::Set(s) => !s.borrow().is_empty(),
            _ => true,
        }
    }

    /// Identity comparison (`is`)
    pub fn is(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            _ => match (self.id(), other.id()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Structural equality (`==`)
    pub fn py_eq(&self, other: &Value) -> bool {
        if self.is(other) {
            return true;
        }
        match (self, other) {
            (Value::Bool(_) | Value::Int(_), Value::Bool(_) | Value::Int(_)) => {
                self.as_int() == other.as_int()
            }
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Float(f), Value::Int(i)) | (Value::Int(i), Value::Float(f)) => {
                *i as f64 == *f
            }
            (Value::Tuple(a), Value::Tuple(b)) => seq_eq(a, b),
            (Value::List(a), Value::List(b)) => seq_eq(&a.borrow(), &b.borrow()),
            (Value::Dict(a), Value::Dict(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter().all(|(k, v)| match b.get(k) {
                        Ok(Some(other)) => v.py_eq(&other),
                        _ => false,
                    })
            }
            (
                Value::Set(_) | Value::FrozenSet(_),
                Value::Set(_) | Value::FrozenSet(_),
            ) => {
                let a = self.set_elements();
                let b = other.set_elements();
                a.len() == b.len()
                    && match ValueSet::from_values(b) {
                        Ok(b) => a.iter().all(|v| b.contains(v).unwrap_or(false)),
                        Err(_) => false,
                    }
            }
            _ => false,
        }
    }

    fn set_elements(&self) -> Vec<Value> {
        match self {
            Value::Set(s) => s.borrow().iter().cloned().collect(),
            Value::FrozenSet(items) => items.to_vec(),
            _ => Vec::new(),
        }
    }

    /// Key used by dicts and sets; fails for unhashable containers
    pub fn hash_key(&self) -> ExecResult<HashKey> {
        Ok(match self {
            Value::None => HashKey::None,
            Value::Bool(b) => HashKey::Int(*b as i64),
            Value::Int(i) => HashKey::Int(*i),
            Value::Float(f) => {
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                    HashKey::Int(*f as i64)
                } else {
                    HashKey::Float(f.to_bits())
                }
            }
            Value::Str(s) => HashKey::Str(s.clone()),
            Value::Bytes(b) => HashKey::Bytes(b.clone()),
            Value::Tuple(items) => HashKey::Tuple(
                items
                    .iter()
                    .map(Value::hash_key)
                    .collect::<ExecResult<Vec<_>>>()?,
            ),
            Value::FrozenSet(items) => {
                let mut keys = items
                    .iter()
                    .map(Value::hash_key)
                    .collect::<ExecResult<Vec<_>>>()?;
                keys.sort();
                HashKey::FrozenSet(keys)
            }
            Value::List(_) | Value::Dict(_) | Value::Set(_) => {
                return Err(ExecError::type_error(format!(
                    "unhashable type: '{}'",
                    self.kind_name()
                )))
            }
            other => HashKey::Identity(other.id().ok_or_else(|| {
                ExecError::type_error(format!("unhashable type: '{}'", other.kind_name()))
            })?),
        })
    }
}

fn seq_eq(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.py_eq(y))
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

// Containers print shallowly so cyclic graphs can be debugged without
// recursing forever.
impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Str(s) => write!(f, "{:?}", &**s),
            Value::Bytes(b) => write!(f, "b{:?}", String::from_utf8_lossy(b)),
            Value::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item:?}")?;
                }
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Value::List(l) => write!(f, "<list len={}>", l.borrow().len()),
            Value::Dict(d) => write!(f, "<dict len={}>", d.borrow().len()),
            Value::Set(s) => write!(f, "<set len={}>", s.borrow().len()),
            Value::FrozenSet(items) => write!(f, "<frozenset len={}>", items.len()),
            Value::Function(func) => write!(f, "<function {}>", func.qualname()),
            Value::Code(code) => write!(f, "<code object {}>", code.name),
            Value::Cell(cell) => match cell.get() {
                Some(v) => write!(f, "<cell: {}>", v.type_name()),
                None => write!(f, "<cell: empty>"),
            },
            Value::Type(t) => write!(f, "<class '{}.{}'>", t.module_name(), t.qualname()),
            Value::Instance(inst) => write!(f, "<{} object>", inst.class.qualname()),
            Value::Module(m) => write!(f, "<module '{}'>", m.name),
            Value::StaticMethod(_) => write!(f, "<staticmethod>"),
            Value::ClassMethod(_) => write!(f, "<classmethod>"),
            Value::Property(_) => write!(f, "<property>"),
            Value::BoundMethod(m) => write!(f, "<bound method {:?}>", m.func),
            Value::MemberDescriptor(d) => write!(f, "<member '{}'>", d.name),
            Value::Native(n) => write!(f, "<built-in function {}.{}>", n.module, n.name),
            Value::NativeObject(o) => write!(f, "<{} object>", o.class.name),
            Value::Slice(s) => write!(f, "slice({:?}, {:?}, {:?})", s.start, s.stop, s.step),
            Value::Generator(g) => write!(f, "<generator {}>", g.function.qualname()),
        }
    }
}
