//! The interpreter: module registry, builtin types and the call protocol

use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::builtins;
use crate::dict::Dict;
use crate::error::{ExecError, ExecResult};
use crate::object::{DescriptorKind, Instance, MemberDescriptor, Module, ModuleOrigin, TypeObject};
use crate::value::{Kwarg, Value};

/// Default bound on nested function calls
pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

/// The classes of the builtin value kinds
pub struct BuiltinTypes {
    pub object: Rc<TypeObject>,
    pub type_: Rc<TypeObject>,
    pub none_type: Rc<TypeObject>,
    pub bool_: Rc<TypeObject>,
    pub int: Rc<TypeObject>,
    pub float: Rc<TypeObject>,
    pub str_: Rc<TypeObject>,
    pub bytes: Rc<TypeObject>,
    pub tuple: Rc<TypeObject>,
    pub list: Rc<TypeObject>,
    pub dict: Rc<TypeObject>,
    pub set: Rc<TypeObject>,
    pub frozenset: Rc<TypeObject>,
    pub function: Rc<TypeObject>,
    pub code: Rc<TypeObject>,
    pub cell: Rc<TypeObject>,
    pub module: Rc<TypeObject>,
    pub staticmethod: Rc<TypeObject>,
    pub classmethod: Rc<TypeObject>,
    pub property: Rc<TypeObject>,
    pub method: Rc<TypeObject>,
    pub member_descriptor: Rc<TypeObject>,
    pub builtin_function: Rc<TypeObject>,
    pub slice: Rc<TypeObject>,
    pub generator: Rc<TypeObject>,
    pub lock: Rc<TypeObject>,
}

pub struct Interpreter {
    modules: FxHashMap<Rc<str>, Rc<Module>>,
    types: BuiltinTypes,
    builtins: Rc<Module>,
    pub(crate) depth: usize,
    max_call_depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        let (types, modules) = builtins::bootstrap();
        let builtins = modules
            .iter()
            .find(|m| &*m.name == "builtins")
            .cloned()
            .unwrap_or_else(|| Rc::new(Module::new("builtins", ModuleOrigin::BuiltIn)));
        let mut interp = Self {
            modules: FxHashMap::default(),
            types,
            builtins,
            depth: 0,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        };
        for module in modules {
            interp.register_module(module);
        }
        interp.new_module(
            "__main__",
            ModuleOrigin::Source {
                file: "__main__.py".to_string(),
            },
        );
        interp
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn max_call_depth(&self) -> usize {
        self.max_call_depth
    }

    pub fn types(&self) -> &BuiltinTypes {
        &self.types
    }

    pub fn builtins(&self) -> &Rc<Module> {
        &self.builtins
    }

    // ========================================================================
    // Modules
    // ========================================================================

    pub fn module(&self, name: &str) -> Option<Rc<Module>> {
        self.modules.get(name).cloned()
    }

    pub fn register_module(&mut self, module: Rc<Module>) {
        trace!(module = %module.name, "register module");
        self.modules.insert(module.name.clone(), module);
    }

    /// Create and register a module whose globals see the builtins
    pub fn new_module(&mut self, name: &str, origin: ModuleOrigin) -> Rc<Module> {
        let module = Rc::new(Module::new(name, origin));
        module.set("__builtins__", Value::Dict(self.builtins.dict()));
        self.register_module(module.clone());
        module
    }

    pub fn import(&self, name: &str) -> ExecResult<Rc<Module>> {
        self.module(name)
            .ok_or_else(|| ExecError::Import(name.to_string()))
    }

    /// Resolve `module` + dotted `qualname` to a live value
    pub fn find_global(&mut self, module: &str, qualname: &str) -> ExecResult<Value> {
        let mut value = Value::Module(self.import(module)?);
        for part in qualname.split('.') {
            value = self.getattr(&value, part)?;
        }
        Ok(value)
    }

    // ========================================================================
    // Types
    // ========================================================================

    pub fn type_of(&self, value: &Value) -> Rc<TypeObject> {
        let t = &self.types;
        match value {
            Value::None => t.none_type.clone(),
            Value::Bool(_) => t.bool_.clone(),
            Value::Int(_) => t.int.clone(),
            Value::Float(_) => t.float.clone(),
            Value::Str(_) => t.str_.clone(),
            Value::Bytes(_) => t.bytes.clone(),
            Value::Tuple(_) => t.tuple.clone(),
            Value::List(_) => t.list.clone(),
            Value::Dict(_) => t.dict.clone(),
            Value::Set(_) => t.set.clone(),
            Value::FrozenSet(_) => t.frozenset.clone(),
            Value::Function(_) => t.function.clone(),
            Value::Code(_) => t.code.clone(),
            Value::Cell(_) => t.cell.clone(),
            Value::Type(ty) => ty.meta.clone().unwrap_or_else(|| t.type_.clone()),
            Value::Instance(inst) => inst.class.clone(),
            Value::Module(_) => t.module.clone(),
            Value::StaticMethod(_) => t.staticmethod.clone(),
            Value::ClassMethod(_) => t.classmethod.clone(),
            Value::Property(_) => t.property.clone(),
            Value::BoundMethod(_) => t.method.clone(),
            Value::MemberDescriptor(_) => t.member_descriptor.clone(),
            Value::Native(_) => t.builtin_function.clone(),
            Value::NativeObject(obj) => obj.class.clone(),
            Value::Slice(_) => t.slice.clone(),
            Value::Generator(_) => t.generator.clone(),
        }
    }

    pub fn isinstance(&self, value: &Value, cls: &Rc<TypeObject>) -> bool {
        self.type_of(value).is_subtype_of(cls)
    }

    /// Create a class the way `type(name, bases, namespace)` does
    ///
    /// `__qualname__` is moved out of the namespace into the class, `__slots__`
    /// becomes one member descriptor per slot, and classes without slots gain
    /// `__dict__` and `__weakref__` descriptors.
    pub fn new_class(
        &mut self,
        name: &str,
        bases: Vec<Rc<TypeObject>>,
        mut namespace: Dict,
        meta: Option<Rc<TypeObject>>,
    ) -> ExecResult<Rc<TypeObject>> {
        let bases = if bases.is_empty() {
            vec![self.types.object.clone()]
        } else {
            bases
        };
        let meta = self.resolve_meta(meta, &bases)?;

        let qualname: Rc<str> = match namespace.remove_str("__qualname__") {
            Some(Value::Str(q)) => q,
            Some(other) => {
                return Err(ExecError::type_error(format!(
                    "type __qualname__ must be a str, not {}",
                    other.kind_name()
                )))
            }
            None => Rc::from(name),
        };
        let module: Rc<str> = match namespace.get_str("__module__") {
            Some(Value::Str(m)) => m,
            _ => {
                namespace.set_str("__module__", Value::str("__main__"));
                Rc::from("__main__")
            }
        };
        if !namespace.contains_str("__doc__") {
            namespace.set_str("__doc__", Value::None);
        }

        let slots = match namespace.get_str("__slots__") {
            None => None,
            Some(Value::Str(s)) => Some(vec![s]),
            Some(Value::Tuple(items)) => Some(slot_names(&items)?),
            Some(Value::List(items)) => Some(slot_names(&items.borrow())?),
            Some(other) => {
                return Err(ExecError::type_error(format!(
                    "__slots__ must be a str or a sequence of str, not {}",
                    other.kind_name()
                )))
            }
        };
        let class_name: Rc<str> = Rc::from(name);
        match &slots {
            Some(names) => {
                for slot in names {
                    namespace.set_str(slot, member(slot, &class_name, DescriptorKind::Slot));
                }
            }
            None => {
                let inherits_dict = bases.iter().any(|b| b.has_instance_dict());
                if !inherits_dict {
                    namespace.set_str(
                        "__dict__",
                        member("__dict__", &class_name, DescriptorKind::InstanceDict),
                    );
                    namespace.set_str(
                        "__weakref__",
                        member("__weakref__", &class_name, DescriptorKind::WeakRef),
                    );
                }
            }
        }

        trace!(class = %qualname, module = %module, "new class");
        Ok(Rc::new(TypeObject::user(
            class_name, qualname, module, bases, namespace, slots, meta,
        )))
    }

    // The most derived metaclass among the explicit one and the bases'.
    fn resolve_meta(
        &self,
        explicit: Option<Rc<TypeObject>>,
        bases: &[Rc<TypeObject>],
    ) -> ExecResult<Option<Rc<TypeObject>>> {
        let mut winner = explicit;
        for base in bases {
            let Some(candidate) = &base.meta else { continue };
            winner = match winner {
                None => Some(candidate.clone()),
                Some(current) => {
                    if candidate.is_subtype_of(&current) {
                        Some(candidate.clone())
                    } else if current.is_subtype_of(candidate) {
                        Some(current)
                    } else {
                        return Err(ExecError::type_error(
                            "metaclass conflict: the metaclass of a derived class must be a \
                             subclass of the metaclasses of all its bases",
                        ));
                    }
                }
            };
        }
        Ok(winner)
    }

    /// Allocate an instance of `cls` without running `__init__`
    pub fn new_instance(&self, cls: &Rc<TypeObject>) -> ExecResult<Value> {
        if cls.is_native() && !Rc::ptr_eq(cls, &self.types.object) {
            return Err(ExecError::type_error(format!(
                "object.__new__({}) is not safe, use {}.__new__()",
                cls.name, cls.name
            )));
        }
        Ok(Value::Instance(Rc::new(Instance::new(
            cls.clone(),
            cls.has_instance_dict(),
        ))))
    }

    // ========================================================================
    // Calls
    // ========================================================================

    pub fn call(&mut self, callable: &Value, args: &[Value], kwargs: &[Kwarg]) -> ExecResult<Value> {
        match callable {
            Value::Function(func) => self.call_function(func, args, kwargs),
            Value::BoundMethod(method) => {
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(method.receiver.clone());
                full.extend_from_slice(args);
                self.call(&method.func, &full, kwargs)
            }
            Value::Native(native) => (native.func)(self, args, kwargs),
            Value::Type(cls) => self.call_type(cls, args, kwargs),
            Value::StaticMethod(wrapper) => self.call(&wrapper.func, args, kwargs),
            Value::Instance(inst) => match inst.class.lookup("__call__") {
                Some(dunder) => {
                    let mut full = Vec::with_capacity(args.len() + 1);
                    full.push(callable.clone());
                    full.extend_from_slice(args);
                    self.call(&dunder, &full, kwargs)
                }
                None => Err(not_callable(callable)),
            },
            other => Err(not_callable(other)),
        }
    }

    fn call_type(&mut self, cls: &Rc<TypeObject>, args: &[Value], kwargs: &[Kwarg]) -> ExecResult<Value> {
        let ctor = cls
            .mro()
            .iter()
            .find_map(|t| t.native.and_then(|n| n.ctor));
        match ctor {
            Some(ctor) => ctor(self, cls, args, kwargs),
            None => Err(ExecError::type_error(format!(
                "cannot create '{}.{}' instances",
                cls.module_name(),
                cls.qualname()
            ))),
        }
    }
}

fn member(name: &str, owner: &Rc<str>, kind: DescriptorKind) -> Value {
    Value::MemberDescriptor(Rc::new(MemberDescriptor {
        name: Rc::from(name),
        owner: owner.clone(),
        kind,
    }))
}

fn slot_names(items: &[Value]) -> ExecResult<Vec<Rc<str>>> {
    items
        .iter()
        .map(|item| match item {
            Value::Str(s) => Ok(s.clone()),
            other => Err(ExecError::type_error(format!(
                "__slots__ items must be strings, not '{}'",
                other.kind_name()
            ))),
        })
        .collect()
}

fn not_callable(value: &Value) -> ExecError {
    ExecError::type_error(format!("'{}' object is not callable", value.type_name()))
}
