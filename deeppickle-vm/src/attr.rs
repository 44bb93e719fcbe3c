//! Attribute protocol

use std::rc::Rc;

use crate::code::Code;
use crate::error::{ExecError, ExecResult};
use crate::interp::Interpreter;
use crate::object::{BoundMethod, DescriptorKind, Function, Instance, TypeObject};
use crate::value::Value;

fn bind(func: Value, receiver: Value) -> Value {
    Value::BoundMethod(Rc::new(BoundMethod { func, receiver }))
}

fn str_tuple(names: &[Rc<str>]) -> Value {
    Value::tuple(names.iter().map(|n| Value::Str(n.clone())).collect())
}

fn expect_str(name: &str, value: &Value) -> ExecResult<Rc<str>> {
    match value {
        Value::Str(s) => Ok(s.clone()),
        other => Err(ExecError::type_error(format!(
            "{name} must be set to a str, not {}",
            other.kind_name()
        ))),
    }
}

impl Interpreter {
    pub fn getattr(&mut self, obj: &Value, name: &str) -> ExecResult<Value> {
        if name == "__class__" {
            return Ok(Value::Type(self.type_of(obj)));
        }
        let found = match obj {
            Value::Instance(inst) => return self.instance_getattr(inst, obj, name),
            Value::Type(ty) => return self.type_getattr(ty, name),
            Value::Function(func) => function_attr(func, name),
            Value::Code(code) => code_attr(code, name),
            Value::Module(module) => match name {
                "__dict__" => Some(Value::Dict(module.dict())),
                _ => module.get(name),
            },
            Value::Cell(cell) => match name {
                "cell_contents" => match cell.get() {
                    Some(v) => Some(v),
                    None => return Err(ExecError::Value("Cell is empty".to_string())),
                },
                _ => None,
            },
            Value::StaticMethod(s) => match name {
                "__func__" | "__wrapped__" => Some(s.func.clone()),
                "__doc__" => Some(self.getattr(&s.func, "__doc__")?),
                _ => None,
            },
            Value::ClassMethod(c) => match name {
                "__func__" | "__wrapped__" => Some(c.func.clone()),
                "__doc__" => Some(self.getattr(&c.func, "__doc__")?),
                _ => None,
            },
            Value::Property(p) => match name {
                "fget" => Some(p.fget.clone()),
                "fset" => Some(p.fset.clone()),
                "fdel" => Some(p.fdel.clone()),
                "__doc__" => Some(p.doc.clone()),
                _ => None,
            },
            Value::BoundMethod(m) => match name {
                "__self__" => Some(m.receiver.clone()),
                "__func__" => Some(m.func.clone()),
                _ => return self.getattr(&m.func.clone(), name),
            },
            Value::Native(n) => match name {
                "__name__" | "__qualname__" => Some(Value::Str(n.name.clone())),
                "__module__" => Some(Value::Str(n.module.clone())),
                "__doc__" => Some(Value::None),
                _ => None,
            },
            Value::NativeObject(o) => o
                .class
                .lookup(name)
                .map(|attr| match attr {
                    Value::Native(_) => bind(attr, obj.clone()),
                    other => other,
                }),
            Value::MemberDescriptor(d) => match name {
                "__name__" => Some(Value::Str(d.name.clone())),
                _ => None,
            },
            Value::Slice(s) => match name {
                "start" => Some(s.start.clone()),
                "stop" => Some(s.stop.clone()),
                "step" => Some(s.step.clone()),
                _ => None,
            },
            _ => None,
        };
        found.ok_or_else(|| ExecError::attribute(obj.type_name(), name))
    }

    fn instance_getattr(&mut self, inst: &Rc<Instance>, obj: &Value, name: &str) -> ExecResult<Value> {
        let class_attr = inst.class.lookup(name);
        match &class_attr {
            Some(Value::Property(p)) => {
                if p.fget.is_none() {
                    return Err(ExecError::attribute(inst.class.name.to_string(), name));
                }
                let fget = p.fget.clone();
                return self.call(&fget, &[obj.clone()], &[]);
            }
            Some(Value::MemberDescriptor(d)) if d.kind == DescriptorKind::Slot => {
                return inst
                    .slot(name)
                    .ok_or_else(|| ExecError::attribute(inst.class.name.to_string(), name));
            }
            _ => {}
        }
        if let Some(dict) = inst.dict() {
            if name == "__dict__" {
                return Ok(Value::Dict(dict));
            }
            let found = dict.borrow().get_str(name);
            if let Some(v) = found {
                return Ok(v);
            }
        }
        match class_attr {
            Some(Value::Function(f)) => Ok(bind(Value::Function(f), obj.clone())),
            Some(Value::StaticMethod(s)) => Ok(s.func.clone()),
            Some(Value::ClassMethod(c)) => Ok(bind(c.func.clone(), Value::Type(inst.class.clone()))),
            Some(v) => Ok(v),
            None => Err(ExecError::attribute(inst.class.name.to_string(), name)),
        }
    }

    fn type_getattr(&mut self, ty: &Rc<TypeObject>, name: &str) -> ExecResult<Value> {
        match name {
            "__name__" => return Ok(Value::Str(ty.name.clone())),
            "__qualname__" => return Ok(Value::Str(ty.qualname())),
            "__module__" => return Ok(Value::Str(ty.module_name())),
            "__bases__" => {
                return Ok(Value::tuple(
                    ty.bases.iter().map(|b| Value::Type(b.clone())).collect(),
                ))
            }
            "__mro__" => {
                return Ok(Value::tuple(
                    ty.mro().into_iter().map(Value::Type).collect(),
                ))
            }
            // a snapshot, like the read-only mapping proxy
            "__dict__" => return Ok(Value::dict(ty.namespace().clone())),
            _ => {}
        }
        if let Some(attr) = ty.lookup(name) {
            return Ok(match attr {
                Value::StaticMethod(s) => s.func.clone(),
                Value::ClassMethod(c) => bind(c.func.clone(), Value::Type(ty.clone())),
                other => other,
            });
        }
        if let Some(meta) = &ty.meta {
            if let Some(attr) = meta.lookup(name) {
                return Ok(match attr {
                    Value::Function(_) => bind(attr, Value::Type(ty.clone())),
                    Value::Property(p) => {
                        let fget = p.fget.clone();
                        return self.call(&fget, &[Value::Type(ty.clone())], &[]);
                    }
                    other => other,
                });
            }
        }
        if name == "__doc__" {
            return Ok(Value::None);
        }
        Err(ExecError::attribute("type", name))
    }

    pub fn setattr(&mut self, obj: &Value, name: &str, value: Value) -> ExecResult<()> {
        match obj {
            Value::Instance(inst) => {
                match inst.class.lookup(name) {
                    Some(Value::Property(p)) => {
                        if p.fset.is_none() {
                            return Err(ExecError::Attribute {
                                owner: inst.class.name.to_string(),
                                name: format!("{name} (property has no setter)"),
                            });
                        }
                        let fset = p.fset.clone();
                        self.call(&fset, &[obj.clone(), value], &[])?;
                        return Ok(());
                    }
                    Some(Value::MemberDescriptor(d)) if d.kind == DescriptorKind::Slot => {
                        inst.set_slot(name, value);
                        return Ok(());
                    }
                    _ => {}
                }
                match inst.dict() {
                    Some(_) if name == "__dict__" => match value {
                        Value::Dict(new) => {
                            inst.set_dict(new);
                            Ok(())
                        }
                        other => Err(ExecError::type_error(format!(
                            "__dict__ must be set to a dictionary, not a '{}'",
                            other.kind_name()
                        ))),
                    },
                    Some(dict) => {
                        dict.borrow_mut().set_str(name, value);
                        Ok(())
                    }
                    None => Err(ExecError::attribute(inst.class.name.to_string(), name)),
                }
            }
            Value::Function(func) => set_function_attr(func, name, value),
            Value::Type(ty) => {
                if ty.is_native() {
                    return Err(ExecError::type_error(format!(
                        "cannot set '{name}' attribute of immutable type '{}'",
                        ty.name
                    )));
                }
                match name {
                    "__qualname__" => ty.set_qualname(expect_str("__qualname__", &value)?),
                    "__name__" | "__bases__" | "__mro__" | "__dict__" => {
                        return Err(ExecError::type_error(format!("cannot set '{name}' of a class")))
                    }
                    _ => {
                        ty.namespace_mut().set_str(name, value);
                    }
                }
                Ok(())
            }
            Value::Module(module) => {
                if name == "__dict__" {
                    let Value::Dict(new) = value else {
                        return Err(ExecError::type_error("module __dict__ must be a dict"));
                    };
                    module.set_dict(new);
                    return Ok(());
                }
                module.set(name, value);
                Ok(())
            }
            Value::Cell(cell) if name == "cell_contents" => {
                cell.set(value);
                Ok(())
            }
            other => Err(ExecError::attribute(other.type_name(), name)),
        }
    }

    pub fn delattr(&mut self, obj: &Value, name: &str) -> ExecResult<()> {
        let missing = || ExecError::attribute(obj.type_name(), name);
        match obj {
            Value::Instance(inst) => {
                match inst.class.lookup(name) {
                    Some(Value::Property(p)) => {
                        if p.fdel.is_none() {
                            return Err(missing());
                        }
                        let fdel = p.fdel.clone();
                        self.call(&fdel, &[obj.clone()], &[])?;
                        return Ok(());
                    }
                    Some(Value::MemberDescriptor(d)) if d.kind == DescriptorKind::Slot => {
                        return inst.del_slot(name).map(|_| ()).ok_or_else(missing);
                    }
                    _ => {}
                }
                let removed = inst.dict().and_then(|d| d.borrow_mut().remove_str(name));
                removed.map(|_| ()).ok_or_else(missing)
            }
            Value::Function(func) => {
                let removed = func.meta().dict.borrow_mut().remove_str(name);
                removed.map(|_| ()).ok_or_else(missing)
            }
            Value::Type(ty) if !ty.is_native() => {
                let removed = ty.namespace_mut().remove_str(name);
                removed.map(|_| ()).ok_or_else(missing)
            }
            Value::Module(module) => {
                let removed = module.dict().borrow_mut().remove_str(name);
                removed.map(|_| ()).ok_or_else(missing)
            }
            Value::Cell(cell) if name == "cell_contents" => {
                cell.clear();
                Ok(())
            }
            _ => Err(missing()),
        }
    }

    pub fn hasattr(&mut self, obj: &Value, name: &str) -> ExecResult<bool> {
        match self.getattr(obj, name) {
            Ok(_) => Ok(true),
            Err(ExecError::Attribute { .. }) => Ok(false),
            Err(other) => Err(other),
        }
    }
}

fn function_attr(func: &Function, name: &str) -> Option<Value> {
    let meta = func.meta();
    Some(match name {
        "__code__" => Value::Code(func.code.clone()),
        "__globals__" => Value::Dict(func.globals.clone()),
        "__name__" => Value::Str(func.name.clone()),
        "__defaults__" => func.defaults.clone().map_or(Value::None, Value::Tuple),
        "__closure__" => func.closure.clone().map_or(Value::None, Value::Tuple),
        "__annotations__" => meta.annotations.clone(),
        "__dict__" => Value::Dict(meta.dict.clone()),
        "__kwdefaults__" => meta.kwdefaults.clone(),
        "__qualname__" => Value::Str(meta.qualname.clone()),
        "__doc__" => meta.doc.clone(),
        "__module__" => meta.module.clone(),
        _ => return meta.dict.borrow().get_str(name),
    })
}

fn set_function_attr(func: &Function, name: &str, value: Value) -> ExecResult<()> {
    let mut meta = func.meta_mut();
    match name {
        "__annotations__" | "__kwdefaults__" => {
            if !matches!(value, Value::Dict(_) | Value::None) {
                return Err(ExecError::type_error(format!(
                    "{name} must be set to a dict object"
                )));
            }
            if name == "__annotations__" {
                meta.annotations = match value {
                    Value::None => Value::empty_dict(),
                    dict => dict,
                };
            } else {
                meta.kwdefaults = value;
            }
        }
        "__dict__" => match value {
            Value::Dict(d) => meta.dict = d,
            other => {
                return Err(ExecError::type_error(format!(
                    "__dict__ must be set to a dictionary, not a '{}'",
                    other.kind_name()
                )))
            }
        },
        "__qualname__" => meta.qualname = expect_str("__qualname__", &value)?,
        "__doc__" => meta.doc = value,
        "__module__" => meta.module = value,
        "__code__" | "__globals__" | "__name__" | "__defaults__" | "__closure__" => {
            return Err(ExecError::Attribute {
                owner: "function".to_string(),
                name: format!("{name} (read-only)"),
            })
        }
        _ => {
            meta.dict.borrow_mut().set_str(name, value);
        }
    }
    Ok(())
}

fn code_attr(code: &Code, name: &str) -> Option<Value> {
    let int = |v: u32| Value::Int(i64::from(v));
    Some(match name {
        "co_argcount" => int(code.argcount),
        "co_posonlyargcount" => int(code.posonlyargcount),
        "co_kwonlyargcount" => int(code.kwonlyargcount),
        "co_nlocals" => int(code.nlocals),
        "co_stacksize" => int(code.stacksize),
        "co_flags" => int(code.flags.bits()),
        "co_code" => Value::Bytes(code.bytecode.clone()),
        "co_consts" => Value::Tuple(code.consts.clone()),
        "co_names" => str_tuple(&code.names),
        "co_varnames" => str_tuple(&code.varnames),
        "co_filename" => Value::Str(code.filename.clone()),
        "co_name" => Value::Str(code.name.clone()),
        "co_firstlineno" => int(code.firstlineno),
        "co_linetable" => Value::Bytes(code.linetable.clone()),
        "co_freevars" => str_tuple(&code.freevars),
        "co_cellvars" => str_tuple(&code.cellvars),
        _ => return None,
    })
}
