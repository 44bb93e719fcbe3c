//! Heap object kinds

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use crate::code::Code;
use crate::dict::Dict;
use crate::error::ExecResult;
use crate::interp::Interpreter;
use crate::value::{DictRef, Kwarg, Value};

/// Signature of native callables
pub type NativeFn = fn(&mut Interpreter, &[Value], &[Kwarg]) -> ExecResult<Value>;

/// Signature of native type constructors; receives the class being called
pub type NativeCtor =
    fn(&mut Interpreter, &Rc<TypeObject>, &[Value], &[Kwarg]) -> ExecResult<Value>;

// ============================================================================
// Functions and cells
// ============================================================================

/// A function: code bound to globals, defaults and captured cells
pub struct Function {
    pub code: Rc<Code>,
    pub globals: DictRef,
    pub name: Rc<str>,
    pub defaults: Option<Rc<[Value]>>,
    /// One `Value::Cell` per entry of `code.freevars`
    pub closure: Option<Rc<[Value]>>,
    meta: RefCell<FunctionMeta>,
}

/// Mutable function attributes, applied after construction
#[derive(Clone)]
pub struct FunctionMeta {
    pub annotations: Value,
    pub dict: DictRef,
    pub kwdefaults: Value,
    pub qualname: Rc<str>,
    pub doc: Value,
    pub module: Value,
}

impl Function {
    pub fn new(
        code: Rc<Code>,
        globals: DictRef,
        name: Option<Rc<str>>,
        defaults: Option<Rc<[Value]>>,
        closure: Option<Rc<[Value]>>,
    ) -> Self {
        let name = name.unwrap_or_else(|| code.name.clone());
        let doc = match code.consts.first() {
            Some(Value::Str(s)) => Value::Str(s.clone()),
            _ => Value::None,
        };
        let module = globals.borrow().get_str("__name__").unwrap_or(Value::None);
        Self {
            meta: RefCell::new(FunctionMeta {
                annotations: Value::empty_dict(),
                dict: Rc::new(RefCell::new(Dict::new())),
                kwdefaults: Value::None,
                qualname: name.clone(),
                doc,
                module,
            }),
            code,
            globals,
            name,
            defaults,
            closure,
        }
    }

    pub fn meta(&self) -> Ref<'_, FunctionMeta> {
        self.meta.borrow()
    }

    pub fn meta_mut(&self) -> RefMut<'_, FunctionMeta> {
        self.meta.borrow_mut()
    }

    pub fn qualname(&self) -> Rc<str> {
        self.meta.borrow().qualname.clone()
    }

    pub fn closure_len(&self) -> usize {
        self.closure.as_ref().map_or(0, |c| c.len())
    }
}

/// A captured-variable cell
#[derive(Default)]
pub struct Cell {
    contents: RefCell<Option<Value>>,
}

impl Cell {
    pub fn new(value: Value) -> Self {
        Self {
            contents: RefCell::new(Some(value)),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Value> {
        self.contents.borrow().clone()
    }

    pub fn set(&self, value: Value) {
        *self.contents.borrow_mut() = Some(value);
    }

    pub fn clear(&self) {
        *self.contents.borrow_mut() = None;
    }

    pub fn is_empty(&self) -> bool {
        self.contents.borrow().is_none()
    }
}

/// A generator object; created by calling a generator function, never resumed
pub struct Generator {
    pub function: Rc<Function>,
    pub locals: Vec<Option<Value>>,
}

// ============================================================================
// Types and instances
// ============================================================================

#[derive(Clone, Copy)]
pub struct NativeType {
    pub ctor: Option<NativeCtor>,
}

/// A class
pub struct TypeObject {
    pub name: Rc<str>,
    qualname: RefCell<Rc<str>>,
    module: Rc<str>,
    pub bases: Vec<Rc<TypeObject>>,
    namespace: RefCell<Dict>,
    pub slots: Option<Vec<Rc<str>>>,
    /// The metaclass; `None` is the root `type`
    pub meta: Option<Rc<TypeObject>>,
    pub native: Option<NativeType>,
}

impl TypeObject {
    pub fn native(
        name: &str,
        module: &str,
        bases: Vec<Rc<TypeObject>>,
        ctor: Option<NativeCtor>,
        namespace: Dict,
    ) -> Self {
        Self {
            name: Rc::from(name),
            qualname: RefCell::new(Rc::from(name)),
            module: Rc::from(module),
            bases,
            namespace: RefCell::new(namespace),
            slots: None,
            meta: None,
            native: Some(NativeType { ctor }),
        }
    }

    pub fn user(
        name: Rc<str>,
        qualname: Rc<str>,
        module: Rc<str>,
        bases: Vec<Rc<TypeObject>>,
        namespace: Dict,
        slots: Option<Vec<Rc<str>>>,
        meta: Option<Rc<TypeObject>>,
    ) -> Self {
        Self {
            name,
            qualname: RefCell::new(qualname),
            module,
            bases,
            namespace: RefCell::new(namespace),
            slots,
            meta,
            native: None,
        }
    }

    pub fn qualname(&self) -> Rc<str> {
        self.qualname.borrow().clone()
    }

    pub fn set_qualname(&self, qualname: Rc<str>) {
        *self.qualname.borrow_mut() = qualname;
    }

    /// `__module__` from the namespace, falling back to the defining module
    pub fn module_name(&self) -> Rc<str> {
        match self.namespace.borrow().get_str("__module__") {
            Some(Value::Str(s)) => s,
            _ => self.module.clone(),
        }
    }

    pub fn namespace(&self) -> Ref<'_, Dict> {
        self.namespace.borrow()
    }

    pub fn namespace_mut(&self) -> RefMut<'_, Dict> {
        self.namespace.borrow_mut()
    }

    pub fn is_native(&self) -> bool {
        self.native.is_some()
    }

    /// C3 linearization, starting with `self`
    pub fn mro(self: &Rc<Self>) -> Vec<Rc<TypeObject>> {
        let mut seqs: Vec<Vec<Rc<TypeObject>>> = self.bases.iter().map(|b| b.mro()).collect();
        seqs.push(self.bases.clone());
        let mut result = vec![self.clone()];
        loop {
            seqs.retain(|s| !s.is_empty());
            if seqs.is_empty() {
                return result;
            }
            let candidate = seqs
                .iter()
                .map(|s| &s[0])
                .find(|c| {
                    !seqs
                        .iter()
                        .any(|s| s[1..].iter().any(|t| Rc::ptr_eq(t, *c)))
                })
                .cloned();
            let Some(next) = candidate else {
                // inconsistent hierarchy: keep declaration order
                for seq in seqs {
                    for t in seq {
                        if !result.iter().any(|r| Rc::ptr_eq(r, &t)) {
                            result.push(t);
                        }
                    }
                }
                return result;
            };
            for seq in seqs.iter_mut() {
                if Rc::ptr_eq(&seq[0], &next) {
                    seq.remove(0);
                }
            }
            result.push(next);
        }
    }

    pub fn is_subtype_of(self: &Rc<Self>, other: &Rc<TypeObject>) -> bool {
        Rc::ptr_eq(self, other) || self.mro().iter().any(|t| Rc::ptr_eq(t, other))
    }

    /// Look `name` up along the MRO
    pub fn lookup(self: &Rc<Self>, name: &str) -> Option<Value> {
        self.mro()
            .iter()
            .find_map(|t| t.namespace.borrow().get_str(name))
    }

    /// Whether instances carry a `__dict__`
    pub fn has_instance_dict(self: &Rc<Self>) -> bool {
        matches!(
            self.lookup("__dict__"),
            Some(Value::MemberDescriptor(d)) if d.kind == DescriptorKind::InstanceDict
        )
    }
}

/// An instance of a user class
pub struct Instance {
    pub class: Rc<TypeObject>,
    dict: Option<RefCell<DictRef>>,
    slots: RefCell<Dict>,
}

impl Instance {
    pub fn new(class: Rc<TypeObject>, with_dict: bool) -> Self {
        Self {
            class,
            dict: with_dict.then(|| RefCell::new(Rc::new(RefCell::new(Dict::new())))),
            slots: RefCell::new(Dict::new()),
        }
    }

    /// The current `__dict__`, if the layout has one
    pub fn dict(&self) -> Option<DictRef> {
        self.dict.as_ref().map(|d| d.borrow().clone())
    }

    pub fn has_dict(&self) -> bool {
        self.dict.is_some()
    }

    /// Rebind `__dict__` to `dict`. Returns false when the layout has none.
    pub fn set_dict(&self, dict: DictRef) -> bool {
        match &self.dict {
            Some(slot) => {
                *slot.borrow_mut() = dict;
                true
            }
            None => false,
        }
    }

    pub fn slot(&self, name: &str) -> Option<Value> {
        self.slots.borrow().get_str(name)
    }

    pub fn set_slot(&self, name: &str, value: Value) {
        self.slots.borrow_mut().set_str(name, value);
    }

    pub fn del_slot(&self, name: &str) -> Option<Value> {
        self.slots.borrow_mut().remove_str(name)
    }

    /// Filled slots in assignment order
    pub fn slot_values(&self) -> Vec<(Rc<str>, Value)> {
        self.slots
            .borrow()
            .iter()
            .filter_map(|(k, v)| match k {
                Value::Str(s) => Some((s.clone(), v.clone())),
                _ => None,
            })
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DescriptorKind {
    /// A declared `__slots__` entry
    Slot,
    /// `__dict__` of instances
    InstanceDict,
    /// `__weakref__` of instances
    WeakRef,
}

/// Attribute stored in the instance layout rather than its dict
pub struct MemberDescriptor {
    pub name: Rc<str>,
    pub owner: Rc<str>,
    pub kind: DescriptorKind,
}

// ============================================================================
// Modules
// ============================================================================

/// Where a module's contents came from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModuleOrigin {
    /// Compiled into the runtime
    BuiltIn,
    /// Loaded from a source file
    Source { file: String },
    /// Loaded from a native extension library
    Extension { file: String },
    /// Created at runtime with no backing file
    Dynamic,
}

impl ModuleOrigin {
    pub fn file(&self) -> Option<&str> {
        match self {
            ModuleOrigin::Source { file } | ModuleOrigin::Extension { file } => Some(file),
            ModuleOrigin::BuiltIn | ModuleOrigin::Dynamic => None,
        }
    }
}

pub struct Module {
    pub name: Rc<str>,
    dict: RefCell<DictRef>,
    pub origin: ModuleOrigin,
}

impl Module {
    pub fn new(name: &str, origin: ModuleOrigin) -> Self {
        let mut dict = Dict::new();
        dict.set_str("__name__", Value::str(name));
        dict.set_str("__doc__", Value::None);
        Self {
            name: Rc::from(name),
            dict: RefCell::new(Rc::new(RefCell::new(dict))),
            origin,
        }
    }

    pub fn dict(&self) -> DictRef {
        self.dict.borrow().clone()
    }

    /// Rebind the namespace; functions created earlier keep the old one
    pub fn set_dict(&self, dict: DictRef) {
        *self.dict.borrow_mut() = dict;
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.dict.borrow().borrow().get_str(name)
    }

    pub fn set(&self, name: &str, value: Value) {
        self.dict.borrow().borrow_mut().set_str(name, value);
    }
}

// ============================================================================
// Descriptors and wrappers
// ============================================================================

pub struct StaticMethod {
    pub func: Value,
}

pub struct ClassMethod {
    pub func: Value,
}

pub struct Property {
    pub fget: Value,
    pub fset: Value,
    pub fdel: Value,
    pub doc: Value,
}

/// A callable bound to its first argument
pub struct BoundMethod {
    pub func: Value,
    pub receiver: Value,
}

pub struct Slice {
    pub start: Value,
    pub stop: Value,
    pub step: Value,
}

// ============================================================================
// Native values
// ============================================================================

pub struct NativeFunction {
    pub module: Rc<str>,
    pub name: Rc<str>,
    pub func: NativeFn,
}

impl NativeFunction {
    pub fn new(module: &str, name: &str, func: NativeFn) -> Self {
        Self {
            module: Rc::from(module),
            name: Rc::from(name),
            func,
        }
    }
}

/// Runtime-internal state with no reconstructible parts
pub enum NativeState {
    Lock(std::cell::Cell<bool>),
}

pub struct NativeObject {
    pub class: Rc<TypeObject>,
    pub state: NativeState,
}
