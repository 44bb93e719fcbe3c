//! Builtin types, native constructors and the builtin modules

use std::cell::RefCell;
use std::rc::Rc;

use crate::code::{Code, CodeFlags};
use crate::dict::{Dict, ValueSet};
use crate::error::{ExecError, ExecResult};
use crate::interp::{BuiltinTypes, Interpreter};
use crate::object::{
    BoundMethod, Cell, ClassMethod, Function, Module, ModuleOrigin, NativeCtor, NativeFn,
    NativeFunction, NativeObject, NativeState, Property, Slice, StaticMethod, TypeObject,
};
use crate::value::{Kwarg, Value};

/// Build the builtin types and modules of a fresh interpreter
pub(crate) fn bootstrap() -> (BuiltinTypes, Vec<Rc<Module>>) {
    let object = Rc::new(TypeObject::native(
        "object",
        "builtins",
        vec![],
        Some(object_new),
        Dict::new(),
    ));
    let native = |name: &str, ctor: Option<NativeCtor>| {
        Rc::new(TypeObject::native(
            name,
            "builtins",
            vec![object.clone()],
            ctor,
            Dict::new(),
        ))
    };
    let int = native("int", None);
    let mut lock_ns = Dict::new();
    add_native(&mut lock_ns, "_thread", "acquire", lock_acquire);
    add_native(&mut lock_ns, "_thread", "release", lock_release);
    add_native(&mut lock_ns, "_thread", "locked", lock_locked);

    let types = BuiltinTypes {
        type_: native("type", Some(type_new)),
        none_type: native("NoneType", None),
        bool_: Rc::new(TypeObject::native(
            "bool",
            "builtins",
            vec![int.clone()],
            None,
            Dict::new(),
        )),
        int,
        float: native("float", None),
        str_: native("str", None),
        bytes: native("bytes", None),
        tuple: native("tuple", Some(tuple_new)),
        list: native("list", Some(list_new)),
        dict: native("dict", Some(dict_new)),
        set: native("set", Some(set_new)),
        frozenset: native("frozenset", Some(frozenset_new)),
        function: native("function", Some(function_new)),
        code: native("code", Some(code_new)),
        cell: native("cell", Some(cell_new)),
        module: native("module", Some(module_new)),
        staticmethod: native("staticmethod", Some(staticmethod_new)),
        classmethod: native("classmethod", Some(classmethod_new)),
        property: native("property", Some(property_new)),
        method: native("method", Some(method_new)),
        member_descriptor: native("member_descriptor", None),
        builtin_function: native("builtin_function_or_method", None),
        slice: native("slice", Some(slice_new)),
        generator: native("generator", None),
        lock: Rc::new(TypeObject::native(
            "lock",
            "_thread",
            vec![object.clone()],
            None,
            lock_ns,
        )),
        object,
    };

    let modules = vec![
        builtins_module(&types),
        types_module(&types),
        thread_module(&types),
        operator_module(),
        sys_module(),
    ];
    (types, modules)
}

fn add_native(dict: &mut Dict, module: &str, name: &str, func: NativeFn) {
    dict.set_str(
        name,
        Value::Native(Rc::new(NativeFunction::new(module, name, func))),
    );
}

fn builtins_module(types: &BuiltinTypes) -> Rc<Module> {
    let module = Module::new("builtins", ModuleOrigin::BuiltIn);
    {
        let namespace = module.dict();
        let mut dict = namespace.borrow_mut();
        for ty in [
            &types.object,
            &types.type_,
            &types.bool_,
            &types.int,
            &types.float,
            &types.str_,
            &types.bytes,
            &types.tuple,
            &types.list,
            &types.dict,
            &types.set,
            &types.frozenset,
            &types.staticmethod,
            &types.classmethod,
            &types.property,
            &types.slice,
        ] {
            dict.set_str(&ty.name, Value::Type(ty.clone()));
        }
        add_native(&mut dict, "builtins", "__import__", builtin_import);
        add_native(&mut dict, "builtins", "getattr", builtin_getattr);
        add_native(&mut dict, "builtins", "setattr", builtin_setattr);
        add_native(&mut dict, "builtins", "hasattr", builtin_hasattr);
        add_native(&mut dict, "builtins", "isinstance", builtin_isinstance);
        add_native(&mut dict, "builtins", "len", builtin_len);
    }
    Rc::new(module)
}

fn types_module(types: &BuiltinTypes) -> Rc<Module> {
    let module = Module::new(
        "types",
        ModuleOrigin::Source {
            file: "lib/types.py".to_string(),
        },
    );
    for (name, ty) in [
        ("FunctionType", &types.function),
        ("CodeType", &types.code),
        ("CellType", &types.cell),
        ("ModuleType", &types.module),
        ("MethodType", &types.method),
        ("MemberDescriptorType", &types.member_descriptor),
        ("BuiltinFunctionType", &types.builtin_function),
        ("GeneratorType", &types.generator),
        ("NoneType", &types.none_type),
    ] {
        module.set(name, Value::Type(ty.clone()));
    }
    Rc::new(module)
}

fn thread_module(types: &BuiltinTypes) -> Rc<Module> {
    let module = Module::new("_thread", ModuleOrigin::BuiltIn);
    module.set("LockType", Value::Type(types.lock.clone()));
    add_native(&mut module.dict().borrow_mut(), "_thread", "allocate_lock", allocate_lock);
    Rc::new(module)
}

fn operator_module() -> Rc<Module> {
    let module = Module::new(
        "operator",
        ModuleOrigin::Source {
            file: "lib/operator.py".to_string(),
        },
    );
    {
        let namespace = module.dict();
        let mut dict = namespace.borrow_mut();
        add_native(&mut dict, "operator", "add", operator_add);
        add_native(&mut dict, "operator", "sub", operator_sub);
        add_native(&mut dict, "operator", "mul", operator_mul);
        add_native(&mut dict, "operator", "getitem", operator_getitem);
        add_native(&mut dict, "operator", "eq", operator_eq);
    }
    Rc::new(module)
}

fn sys_module() -> Rc<Module> {
    let module = Module::new("sys", ModuleOrigin::BuiltIn);
    module.set("maxsize", Value::Int(i64::MAX));
    module.set("byteorder", Value::str("little"));
    module.set("version", Value::str(env!("CARGO_PKG_VERSION")));
    Rc::new(module)
}

// ============================================================================
// Argument helpers
// ============================================================================

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> ExecResult<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{min}")
        } else {
            format!("{min} to {max}")
        };
        return Err(ExecError::type_error(format!(
            "{name}() takes {expected} arguments ({} given)",
            args.len()
        )));
    }
    Ok(())
}

fn no_kwargs(name: &str, kwargs: &[Kwarg]) -> ExecResult<()> {
    match kwargs.first() {
        Some((k, _)) => Err(ExecError::type_error(format!(
            "{name}() got an unexpected keyword argument '{k}'"
        ))),
        None => Ok(()),
    }
}

/// Positional-or-keyword parameters in declaration order
fn bind_params(
    name: &str,
    params: &[&str],
    required: usize,
    args: &[Value],
    kwargs: &[Kwarg],
) -> ExecResult<Vec<Value>> {
    arity(name, args, 0, params.len())?;
    let mut bound: Vec<Option<Value>> = vec![None; params.len()];
    for (slot, value) in bound.iter_mut().zip(args) {
        *slot = Some(value.clone());
    }
    for (key, value) in kwargs {
        let Some(i) = params.iter().position(|p| **p == **key) else {
            return Err(ExecError::type_error(format!(
                "{name}() got an unexpected keyword argument '{key}'"
            )));
        };
        if bound[i].is_some() {
            return Err(ExecError::type_error(format!(
                "{name}() got multiple values for argument '{key}'"
            )));
        }
        bound[i] = Some(value.clone());
    }
    bound
        .into_iter()
        .enumerate()
        .map(|(i, v)| match v {
            Some(v) => Ok(v),
            None if i >= required => Ok(Value::None),
            None => Err(ExecError::type_error(format!(
                "{name}() missing required argument '{}'",
                params[i]
            ))),
        })
        .collect()
}

fn expect_str(what: &str, value: &Value) -> ExecResult<Rc<str>> {
    match value {
        Value::Str(s) => Ok(s.clone()),
        other => Err(ExecError::type_error(format!(
            "{what} must be a str, not {}",
            other.kind_name()
        ))),
    }
}

fn expect_u32(what: &str, value: &Value) -> ExecResult<u32> {
    value
        .as_int()
        .and_then(|i| u32::try_from(i).ok())
        .ok_or_else(|| ExecError::type_error(format!("{what} must be a non-negative int")))
}

fn expect_bytes(what: &str, value: &Value) -> ExecResult<Rc<[u8]>> {
    match value {
        Value::Bytes(b) => Ok(b.clone()),
        other => Err(ExecError::type_error(format!(
            "{what} must be bytes, not {}",
            other.kind_name()
        ))),
    }
}

fn str_tuple(what: &str, value: &Value) -> ExecResult<Vec<Rc<str>>> {
    let items = value
        .as_tuple()
        .ok_or_else(|| ExecError::type_error(format!("{what} must be a tuple of strings")))?;
    items.iter().map(|item| expect_str(what, item)).collect()
}

fn optional_tuple(what: &str, value: &Value) -> ExecResult<Option<Rc<[Value]>>> {
    match value {
        Value::None => Ok(None),
        Value::Tuple(t) => Ok(Some(t.clone())),
        other => Err(ExecError::type_error(format!(
            "{what} must be None or a tuple, not {}",
            other.kind_name()
        ))),
    }
}

fn iterate(value: &Value) -> ExecResult<Vec<Value>> {
    Ok(match value {
        Value::Tuple(t) | Value::FrozenSet(t) => t.to_vec(),
        Value::List(l) => l.borrow().clone(),
        Value::Set(s) => s.borrow().iter().cloned().collect(),
        Value::Dict(d) => d.borrow().keys().cloned().collect(),
        Value::Str(s) => s.chars().map(|c| Value::str(&c.to_string())).collect(),
        Value::Bytes(b) => b.iter().map(|&x| Value::Int(i64::from(x))).collect(),
        other => {
            return Err(ExecError::type_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            )))
        }
    })
}

fn optional_iterable(name: &str, args: &[Value], kwargs: &[Kwarg]) -> ExecResult<Vec<Value>> {
    no_kwargs(name, kwargs)?;
    arity(name, args, 0, 1)?;
    args.first().map_or(Ok(Vec::new()), iterate)
}

// ============================================================================
// Native constructors
// ============================================================================

fn object_new(
    interp: &mut Interpreter,
    cls: &Rc<TypeObject>,
    args: &[Value],
    kwargs: &[Kwarg],
) -> ExecResult<Value> {
    let inst = interp.new_instance(cls)?;
    match cls.lookup("__init__") {
        Some(init @ Value::Function(_)) => {
            let mut full = Vec::with_capacity(args.len() + 1);
            full.push(inst.clone());
            full.extend_from_slice(args);
            let ret = interp.call(&init, &full, kwargs)?;
            if !ret.is_none() {
                return Err(ExecError::type_error(format!(
                    "__init__() should return None, not '{}'",
                    ret.type_name()
                )));
            }
        }
        _ if !args.is_empty() || !kwargs.is_empty() => {
            return Err(ExecError::type_error(format!(
                "{}() takes no arguments",
                cls.name
            )))
        }
        _ => {}
    }
    Ok(inst)
}

fn type_new(
    interp: &mut Interpreter,
    cls: &Rc<TypeObject>,
    args: &[Value],
    kwargs: &[Kwarg],
) -> ExecResult<Value> {
    no_kwargs("type", kwargs)?;
    let is_root = Rc::ptr_eq(cls, &interp.types().type_);
    if is_root && args.len() == 1 {
        return Ok(Value::Type(interp.type_of(&args[0])));
    }
    if args.len() != 3 {
        return Err(ExecError::type_error("type() takes 1 or 3 arguments"));
    }
    let name = expect_str("type() argument 1", &args[0])?;
    let bases = args[1]
        .as_tuple()
        .ok_or_else(|| ExecError::type_error("type() argument 2 must be a tuple"))?
        .iter()
        .map(|b| match b {
            Value::Type(t) => Ok(t.clone()),
            other => Err(ExecError::type_error(format!(
                "bases must be types, not {}",
                other.kind_name()
            ))),
        })
        .collect::<ExecResult<Vec<_>>>()?;
    let namespace = match &args[2] {
        Value::Dict(d) => d.borrow().clone(),
        other => {
            return Err(ExecError::type_error(format!(
                "type() argument 3 must be a dict, not {}",
                other.kind_name()
            )))
        }
    };
    let meta = (!is_root).then(|| cls.clone());
    let class = interp.new_class(&name, bases, namespace, meta)?;
    Ok(Value::Type(class))
}

fn function_new(
    _interp: &mut Interpreter,
    _cls: &Rc<TypeObject>,
    args: &[Value],
    kwargs: &[Kwarg],
) -> ExecResult<Value> {
    let params = ["code", "globals", "name", "argdefs", "closure"];
    let p = bind_params("function", &params, 2, args, kwargs)?;
    let Value::Code(code) = &p[0] else {
        return Err(ExecError::type_error("function() argument 'code' must be code"));
    };
    let Value::Dict(globals) = &p[1] else {
        return Err(ExecError::type_error("function() argument 'globals' must be dict"));
    };
    let name = match &p[2] {
        Value::None => None,
        other => Some(expect_str("function() argument 'name'", other)?),
    };
    let defaults = optional_tuple("arg 4 (defaults)", &p[3])?;
    let closure = optional_tuple("arg 5 (closure)", &p[4])?;

    let given = closure.as_ref().map_or(0, |c| c.len());
    if given != code.freevars.len() {
        return Err(ExecError::Value(format!(
            "{} requires closure of length {}, not {}",
            code.name,
            code.freevars.len(),
            given
        )));
    }
    if let Some(cells) = &closure {
        if let Some(bad) = cells.iter().find(|c| !matches!(c, Value::Cell(_))) {
            return Err(ExecError::type_error(format!(
                "arg 5 (closure) expected cell, found {}",
                bad.kind_name()
            )));
        }
    }
    Ok(Value::Function(Rc::new(Function::new(
        code.clone(),
        globals.clone(),
        name,
        defaults,
        closure,
    ))))
}

fn code_new(
    _interp: &mut Interpreter,
    _cls: &Rc<TypeObject>,
    args: &[Value],
    kwargs: &[Kwarg],
) -> ExecResult<Value> {
    no_kwargs("code", kwargs)?;
    arity("code", args, 16, 16)?;
    let consts = match &args[7] {
        Value::Tuple(t) => t.clone(),
        other => {
            return Err(ExecError::type_error(format!(
                "code() argument 8 must be tuple, not {}",
                other.kind_name()
            )))
        }
    };
    let code = Code {
        argcount: expect_u32("co_argcount", &args[0])?,
        posonlyargcount: expect_u32("co_posonlyargcount", &args[1])?,
        kwonlyargcount: expect_u32("co_kwonlyargcount", &args[2])?,
        nlocals: expect_u32("co_nlocals", &args[3])?,
        stacksize: expect_u32("co_stacksize", &args[4])?,
        flags: CodeFlags(expect_u32("co_flags", &args[5])?),
        bytecode: expect_bytes("co_code", &args[6])?,
        consts,
        names: str_tuple("co_names", &args[8])?,
        varnames: str_tuple("co_varnames", &args[9])?,
        filename: expect_str("co_filename", &args[10])?,
        name: expect_str("co_name", &args[11])?,
        firstlineno: expect_u32("co_firstlineno", &args[12])?,
        linetable: expect_bytes("co_linetable", &args[13])?,
        freevars: str_tuple("co_freevars", &args[14])?,
        cellvars: str_tuple("co_cellvars", &args[15])?,
    };
    let params = code.argcount
        + code.kwonlyargcount
        + code.flags.contains(CodeFlags::VARARGS) as u32
        + code.flags.contains(CodeFlags::VARKEYWORDS) as u32;
    if code.posonlyargcount > code.argcount || params as usize > code.varnames.len() {
        return Err(ExecError::Value(format!(
            "code '{}' declares more arguments than local names",
            code.name
        )));
    }
    if code.bytecode.len() % 2 != 0 {
        return Err(ExecError::Value(format!(
            "code '{}' has an odd bytecode length",
            code.name
        )));
    }
    Ok(Value::Code(Rc::new(code)))
}

fn cell_new(
    _interp: &mut Interpreter,
    _cls: &Rc<TypeObject>,
    args: &[Value],
    kwargs: &[Kwarg],
) -> ExecResult<Value> {
    no_kwargs("cell", kwargs)?;
    arity("cell", args, 0, 1)?;
    let cell = match args.first() {
        Some(v) => Cell::new(v.clone()),
        None => Cell::empty(),
    };
    Ok(Value::Cell(Rc::new(cell)))
}

fn module_new(
    _interp: &mut Interpreter,
    _cls: &Rc<TypeObject>,
    args: &[Value],
    kwargs: &[Kwarg],
) -> ExecResult<Value> {
    let p = bind_params("module", &["name", "doc"], 1, args, kwargs)?;
    let name = expect_str("module() argument 'name'", &p[0])?;
    let module = Module::new(&name, ModuleOrigin::Dynamic);
    module.set("__doc__", p[1].clone());
    Ok(Value::Module(Rc::new(module)))
}

fn method_new(
    _interp: &mut Interpreter,
    _cls: &Rc<TypeObject>,
    args: &[Value],
    kwargs: &[Kwarg],
) -> ExecResult<Value> {
    no_kwargs("method", kwargs)?;
    arity("method", args, 2, 2)?;
    if args[1].is_none() {
        return Err(ExecError::type_error("self must not be None"));
    }
    Ok(Value::BoundMethod(Rc::new(BoundMethod {
        func: args[0].clone(),
        receiver: args[1].clone(),
    })))
}

fn staticmethod_new(
    _interp: &mut Interpreter,
    _cls: &Rc<TypeObject>,
    args: &[Value],
    kwargs: &[Kwarg],
) -> ExecResult<Value> {
    no_kwargs("staticmethod", kwargs)?;
    arity("staticmethod", args, 1, 1)?;
    Ok(Value::StaticMethod(Rc::new(StaticMethod {
        func: args[0].clone(),
    })))
}

fn classmethod_new(
    _interp: &mut Interpreter,
    _cls: &Rc<TypeObject>,
    args: &[Value],
    kwargs: &[Kwarg],
) -> ExecResult<Value> {
    no_kwargs("classmethod", kwargs)?;
    arity("classmethod", args, 1, 1)?;
    Ok(Value::ClassMethod(Rc::new(ClassMethod {
        func: args[0].clone(),
    })))
}

fn property_new(
    interp: &mut Interpreter,
    _cls: &Rc<TypeObject>,
    args: &[Value],
    kwargs: &[Kwarg],
) -> ExecResult<Value> {
    let p = bind_params("property", &["fget", "fset", "fdel", "doc"], 0, args, kwargs)?;
    let doc = if p[3].is_none() && !p[0].is_none() {
        interp.getattr(&p[0], "__doc__").unwrap_or(Value::None)
    } else {
        p[3].clone()
    };
    Ok(Value::Property(Rc::new(Property {
        fget: p[0].clone(),
        fset: p[1].clone(),
        fdel: p[2].clone(),
        doc,
    })))
}

fn slice_new(
    _interp: &mut Interpreter,
    _cls: &Rc<TypeObject>,
    args: &[Value],
    kwargs: &[Kwarg],
) -> ExecResult<Value> {
    no_kwargs("slice", kwargs)?;
    let (start, stop, step) = match args {
        [stop] => (Value::None, stop.clone(), Value::None),
        [start, stop] => (start.clone(), stop.clone(), Value::None),
        [start, stop, step] => (start.clone(), stop.clone(), step.clone()),
        _ => return arity("slice", args, 1, 3).map(|_| Value::None),
    };
    Ok(Value::Slice(Rc::new(Slice { start, stop, step })))
}

fn tuple_new(
    _interp: &mut Interpreter,
    _cls: &Rc<TypeObject>,
    args: &[Value],
    kwargs: &[Kwarg],
) -> ExecResult<Value> {
    Ok(Value::tuple(optional_iterable("tuple", args, kwargs)?))
}

fn list_new(
    _interp: &mut Interpreter,
    _cls: &Rc<TypeObject>,
    args: &[Value],
    kwargs: &[Kwarg],
) -> ExecResult<Value> {
    Ok(Value::list(optional_iterable("list", args, kwargs)?))
}

fn dict_new(
    _interp: &mut Interpreter,
    _cls: &Rc<TypeObject>,
    args: &[Value],
    kwargs: &[Kwarg],
) -> ExecResult<Value> {
    arity("dict", args, 0, 1)?;
    let mut dict = match args.first() {
        Some(Value::Dict(d)) => d.borrow().clone(),
        Some(other) => {
            let mut dict = Dict::new();
            for pair in iterate(other)? {
                match pair.as_tuple() {
                    Some([k, v]) => {
                        dict.insert(k.clone(), v.clone())?;
                    }
                    _ => {
                        return Err(ExecError::Value(
                            "dictionary update sequence element has wrong length".to_string(),
                        ))
                    }
                }
            }
            dict
        }
        None => Dict::new(),
    };
    for (k, v) in kwargs {
        dict.set_str(k, v.clone());
    }
    Ok(Value::dict(dict))
}

fn set_new(
    _interp: &mut Interpreter,
    _cls: &Rc<TypeObject>,
    args: &[Value],
    kwargs: &[Kwarg],
) -> ExecResult<Value> {
    let items = optional_iterable("set", args, kwargs)?;
    Ok(Value::Set(Rc::new(RefCell::new(ValueSet::from_values(
        items,
    )?))))
}

fn frozenset_new(
    _interp: &mut Interpreter,
    _cls: &Rc<TypeObject>,
    args: &[Value],
    kwargs: &[Kwarg],
) -> ExecResult<Value> {
    Value::frozenset(optional_iterable("frozenset", args, kwargs)?)
}

// ============================================================================
// Native functions
// ============================================================================

fn builtin_import(interp: &mut Interpreter, args: &[Value], _kwargs: &[Kwarg]) -> ExecResult<Value> {
    arity("__import__", args, 1, 5)?;
    let name = expect_str("__import__() argument 1", &args[0])?;
    Ok(Value::Module(interp.import(&name)?))
}

fn builtin_getattr(interp: &mut Interpreter, args: &[Value], kwargs: &[Kwarg]) -> ExecResult<Value> {
    no_kwargs("getattr", kwargs)?;
    arity("getattr", args, 2, 3)?;
    let name = expect_str("attribute name", &args[1])?;
    match (interp.getattr(&args[0], &name), args.get(2)) {
        (Err(ExecError::Attribute { .. }), Some(default)) => Ok(default.clone()),
        (result, _) => result,
    }
}

fn builtin_setattr(interp: &mut Interpreter, args: &[Value], kwargs: &[Kwarg]) -> ExecResult<Value> {
    no_kwargs("setattr", kwargs)?;
    arity("setattr", args, 3, 3)?;
    let name = expect_str("attribute name", &args[1])?;
    interp.setattr(&args[0], &name, args[2].clone())?;
    Ok(Value::None)
}

fn builtin_hasattr(interp: &mut Interpreter, args: &[Value], kwargs: &[Kwarg]) -> ExecResult<Value> {
    no_kwargs("hasattr", kwargs)?;
    arity("hasattr", args, 2, 2)?;
    let name = expect_str("attribute name", &args[1])?;
    Ok(Value::Bool(interp.hasattr(&args[0], &name)?))
}

fn builtin_isinstance(interp: &mut Interpreter, args: &[Value], kwargs: &[Kwarg]) -> ExecResult<Value> {
    no_kwargs("isinstance", kwargs)?;
    arity("isinstance", args, 2, 2)?;
    let classes = match &args[1] {
        Value::Type(t) => vec![t.clone()],
        Value::Tuple(items) => items
            .iter()
            .filter_map(|v| v.as_type().cloned())
            .collect(),
        other => {
            return Err(ExecError::type_error(format!(
                "isinstance() arg 2 must be a type or tuple of types, not {}",
                other.kind_name()
            )))
        }
    };
    Ok(Value::Bool(
        classes.iter().any(|cls| interp.isinstance(&args[0], cls)),
    ))
}

fn builtin_len(_interp: &mut Interpreter, args: &[Value], kwargs: &[Kwarg]) -> ExecResult<Value> {
    no_kwargs("len", kwargs)?;
    arity("len", args, 1, 1)?;
    let len = match &args[0] {
        Value::Str(s) => s.chars().count(),
        Value::Bytes(b) => b.len(),
        Value::Tuple(t) | Value::FrozenSet(t) => t.len(),
        Value::List(l) => l.borrow().len(),
        Value::Dict(d) => d.borrow().len(),
        Value::Set(s) => s.borrow().len(),
        other => {
            return Err(ExecError::type_error(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )))
        }
    };
    Ok(Value::Int(len as i64))
}

fn binary(name: &str, args: &[Value], kwargs: &[Kwarg]) -> ExecResult<()> {
    no_kwargs(name, kwargs)?;
    arity(name, args, 2, 2)
}

fn operator_add(_interp: &mut Interpreter, args: &[Value], kwargs: &[Kwarg]) -> ExecResult<Value> {
    binary("add", args, kwargs)?;
    crate::ops::add(&args[0], &args[1])
}

fn operator_sub(_interp: &mut Interpreter, args: &[Value], kwargs: &[Kwarg]) -> ExecResult<Value> {
    binary("sub", args, kwargs)?;
    crate::ops::sub(&args[0], &args[1])
}

fn operator_mul(_interp: &mut Interpreter, args: &[Value], kwargs: &[Kwarg]) -> ExecResult<Value> {
    binary("mul", args, kwargs)?;
    crate::ops::mul(&args[0], &args[1])
}

fn operator_getitem(_interp: &mut Interpreter, args: &[Value], kwargs: &[Kwarg]) -> ExecResult<Value> {
    binary("getitem", args, kwargs)?;
    crate::ops::getitem(&args[0], &args[1])
}

fn operator_eq(_interp: &mut Interpreter, args: &[Value], kwargs: &[Kwarg]) -> ExecResult<Value> {
    binary("eq", args, kwargs)?;
    Ok(Value::Bool(args[0].py_eq(&args[1])))
}

fn allocate_lock(interp: &mut Interpreter, args: &[Value], kwargs: &[Kwarg]) -> ExecResult<Value> {
    no_kwargs("allocate_lock", kwargs)?;
    arity("allocate_lock", args, 0, 0)?;
    Ok(Value::NativeObject(Rc::new(NativeObject {
        class: interp.types().lock.clone(),
        state: NativeState::Lock(std::cell::Cell::new(false)),
    })))
}

fn lock_state<'a>(name: &str, args: &'a [Value]) -> ExecResult<&'a std::cell::Cell<bool>> {
    match args.first() {
        Some(Value::NativeObject(obj)) => match &obj.state {
            NativeState::Lock(locked) => Ok(locked),
        },
        _ => Err(ExecError::type_error(format!(
            "descriptor '{name}' requires a 'lock' object"
        ))),
    }
}

fn lock_acquire(_interp: &mut Interpreter, args: &[Value], _kwargs: &[Kwarg]) -> ExecResult<Value> {
    let locked = lock_state("acquire", args)?;
    if locked.get() {
        return Ok(Value::Bool(false));
    }
    locked.set(true);
    Ok(Value::Bool(true))
}

fn lock_release(_interp: &mut Interpreter, args: &[Value], _kwargs: &[Kwarg]) -> ExecResult<Value> {
    let locked = lock_state("release", args)?;
    if !locked.replace(false) {
        return Err(ExecError::Unsupported("release unlocked lock".to_string()));
    }
    Ok(Value::None)
}

fn lock_locked(_interp: &mut Interpreter, args: &[Value], _kwargs: &[Kwarg]) -> ExecResult<Value> {
    Ok(Value::Bool(lock_state("locked", args)?.get()))
}
