//! Argument binding and the bytecode evaluation loop

use std::rc::Rc;

use crate::code::{CmpOp, Code, CodeFlags, MakeFunctionFlags, Opcode};
use crate::dict::Dict;
use crate::error::{ExecError, ExecResult};
use crate::interp::Interpreter;
use crate::object::{Cell, Function, Generator};
use crate::ops;
use crate::value::{Kwarg, Value};

struct Frame {
    func: Rc<Function>,
    code: Rc<Code>,
    locals: Vec<Option<Value>>,
    cells: Vec<Rc<Cell>>,
    stack: Vec<Value>,
    offset: usize,
}

impl Frame {
    fn error(&self, message: impl Into<String>) -> ExecError {
        ExecError::bytecode(&self.code.name, self.offset, message)
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> ExecResult<Value> {
        match self.stack.pop() {
            Some(v) => Ok(v),
            None => Err(self.error("stack underflow")),
        }
    }

    fn pop_n(&mut self, n: usize) -> ExecResult<Vec<Value>> {
        if n > self.stack.len() {
            return Err(self.error("stack underflow"));
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    fn name(&self, index: u32) -> ExecResult<Rc<str>> {
        match self.code.names.get(index as usize) {
            Some(n) => Ok(n.clone()),
            None => Err(self.error(format!("name index {index} out of range"))),
        }
    }

    fn cell(&self, index: u32) -> ExecResult<Rc<Cell>> {
        match self.cells.get(index as usize) {
            Some(c) => Ok(c.clone()),
            None => Err(self.error(format!("cell index {index} out of range"))),
        }
    }
}

impl Interpreter {
    pub(crate) fn call_function(
        &mut self,
        func: &Rc<Function>,
        args: &[Value],
        kwargs: &[Kwarg],
    ) -> ExecResult<Value> {
        if self.depth >= self.max_call_depth() {
            return Err(ExecError::RecursionLimit {
                limit: self.max_call_depth(),
            });
        }
        let code = func.code.clone();
        let mut locals = bind_arguments(func, args, kwargs)?;

        if code.flags.contains(CodeFlags::GENERATOR) {
            return Ok(Value::Generator(Rc::new(Generator {
                function: func.clone(),
                locals,
            })));
        }

        let mut cells = Vec::with_capacity(code.cellvars.len() + code.freevars.len());
        for name in &code.cellvars {
            let cell = Rc::new(Cell::empty());
            // arguments captured by inner functions live in their cell
            if let Some(i) = code.varnames.iter().position(|v| v == name) {
                if let Some(v) = locals.get_mut(i).and_then(Option::take) {
                    cell.set(v);
                }
            }
            cells.push(cell);
        }
        let closure = func.closure.as_deref().unwrap_or(&[]);
        if closure.len() != code.freevars.len() {
            return Err(ExecError::type_error(format!(
                "{}() closure has {} cells but code expects {}",
                func.name,
                closure.len(),
                code.freevars.len()
            )));
        }
        for item in closure {
            match item {
                Value::Cell(cell) => cells.push(cell.clone()),
                other => {
                    return Err(ExecError::type_error(format!(
                        "closure items must be cells, not {}",
                        other.kind_name()
                    )))
                }
            }
        }

        let frame = Frame {
            func: func.clone(),
            code,
            locals,
            cells,
            stack: Vec::new(),
            offset: 0,
        };
        self.depth += 1;
        let result = self.run_frame(frame);
        self.depth -= 1;
        result
    }

    fn run_frame(&mut self, mut frame: Frame) -> ExecResult<Value> {
        let code = frame.code.clone();
        let bytes = &code.bytecode;
        frame.stack.reserve(code.stacksize as usize);
        let mut pc = 0usize;
        let mut ext: u32 = 0;

        loop {
            if pc + 1 >= bytes.len() {
                return Err(frame.error("execution ran past the end of the code"));
            }
            frame.offset = pc;
            let op = Opcode::from_u8(bytes[pc])
                .ok_or_else(|| frame.error(format!("unknown opcode {}", bytes[pc])))?;
            let arg = (ext << 8) | u32::from(bytes[pc + 1]);
            pc += 2;
            ext = 0;

            match op {
                Opcode::ExtendedArg => ext = arg,
                Opcode::Nop => {}
                Opcode::PopTop => {
                    frame.pop()?;
                }
                Opcode::DupTop => {
                    let top = frame.pop()?;
                    frame.push(top.clone());
                    frame.push(top);
                }
                Opcode::RotTwo => {
                    let a = frame.pop()?;
                    let b = frame.pop()?;
                    frame.push(a);
                    frame.push(b);
                }
                Opcode::BinaryAdd | Opcode::BinarySubtract | Opcode::BinaryMultiply => {
                    let rhs = frame.pop()?;
                    let lhs = frame.pop()?;
                    let result = match op {
                        Opcode::BinaryAdd => ops::add(&lhs, &rhs)?,
                        Opcode::BinarySubtract => ops::sub(&lhs, &rhs)?,
                        _ => ops::mul(&lhs, &rhs)?,
                    };
                    frame.push(result);
                }
                Opcode::BinarySubscr => {
                    let key = frame.pop()?;
                    let container = frame.pop()?;
                    frame.push(ops::getitem(&container, &key)?);
                }
                Opcode::LoadConst => {
                    let value = code
                        .consts
                        .get(arg as usize)
                        .cloned()
                        .ok_or_else(|| frame.error(format!("const index {arg} out of range")))?;
                    frame.push(value);
                }
                Opcode::LoadFast => {
                    let value = match frame.locals.get(arg as usize) {
                        Some(Some(v)) => v.clone(),
                        Some(None) => {
                            let name = code
                                .varnames
                                .get(arg as usize)
                                .map(|n| n.to_string())
                                .unwrap_or_default();
                            return Err(ExecError::Name(format!(
                                "{name} (local variable referenced before assignment)"
                            )));
                        }
                        None => return Err(frame.error(format!("local index {arg} out of range"))),
                    };
                    frame.push(value);
                }
                Opcode::StoreFast => {
                    let value = frame.pop()?;
                    let slot = arg as usize;
                    if slot >= frame.locals.len() {
                        frame.locals.resize(slot + 1, None);
                    }
                    frame.locals[slot] = Some(value);
                }
                Opcode::LoadGlobal => {
                    let name = frame.name(arg)?;
                    let value = self.load_global(&frame.func, &name)?;
                    frame.push(value);
                }
                Opcode::StoreGlobal => {
                    let name = frame.name(arg)?;
                    let value = frame.pop()?;
                    frame.func.globals.borrow_mut().set_str(&name, value);
                }
                Opcode::LoadDeref => {
                    let cell = frame.cell(arg)?;
                    match cell.get() {
                        Some(v) => frame.push(v),
                        None => {
                            let name = code
                                .deref_name(arg as usize)
                                .map(|n| n.to_string())
                                .unwrap_or_default();
                            return Err(ExecError::Name(format!(
                                "{name} (free variable referenced before assignment)"
                            )));
                        }
                    }
                }
                Opcode::StoreDeref => {
                    let value = frame.pop()?;
                    frame.cell(arg)?.set(value);
                }
                Opcode::LoadClosure => {
                    let cell = frame.cell(arg)?;
                    frame.push(Value::Cell(cell));
                }
                Opcode::LoadAttr => {
                    let name = frame.name(arg)?;
                    let obj = frame.pop()?;
                    frame.push(self.getattr(&obj, &name)?);
                }
                Opcode::StoreAttr => {
                    let name = frame.name(arg)?;
                    let obj = frame.pop()?;
                    let value = frame.pop()?;
                    self.setattr(&obj, &name, value)?;
                }
                Opcode::DeleteAttr => {
                    let name = frame.name(arg)?;
                    let obj = frame.pop()?;
                    self.delattr(&obj, &name)?;
                }
                Opcode::BuildTuple => {
                    let items = frame.pop_n(arg as usize)?;
                    frame.push(Value::tuple(items));
                }
                Opcode::BuildList => {
                    let items = frame.pop_n(arg as usize)?;
                    frame.push(Value::list(items));
                }
                Opcode::BuildMap => {
                    let items = frame.pop_n(2 * arg as usize)?;
                    let mut dict = Dict::new();
                    for pair in items.chunks(2) {
                        dict.insert(pair[0].clone(), pair[1].clone())?;
                    }
                    frame.push(Value::dict(dict));
                }
                Opcode::CompareOp => {
                    let cmp = CmpOp::from_arg(arg)
                        .ok_or_else(|| frame.error(format!("unknown comparison {arg}")))?;
                    let rhs = frame.pop()?;
                    let lhs = frame.pop()?;
                    frame.push(Value::Bool(ops::compare(cmp, &lhs, &rhs)?));
                }
                Opcode::IsOp => {
                    let rhs = frame.pop()?;
                    let lhs = frame.pop()?;
                    frame.push(Value::Bool(lhs.is(&rhs) != (arg != 0)));
                }
                Opcode::Jump => pc = arg as usize,
                Opcode::PopJumpIfFalse => {
                    if !frame.pop()?.is_truthy() {
                        pc = arg as usize;
                    }
                }
                Opcode::PopJumpIfTrue => {
                    if frame.pop()?.is_truthy() {
                        pc = arg as usize;
                    }
                }
                Opcode::CallFunction => {
                    let args = frame.pop_n(arg as usize)?;
                    let callable = frame.pop()?;
                    let result = self.call(&callable, &args, &[])?;
                    frame.push(result);
                }
                Opcode::CallFunctionKw => {
                    let names = frame.pop()?;
                    let names = names
                        .as_tuple()
                        .ok_or_else(|| frame.error("keyword names must be a tuple"))?
                        .to_vec();
                    let mut args = frame.pop_n(arg as usize)?;
                    if names.len() > args.len() {
                        return Err(frame.error("more keyword names than arguments"));
                    }
                    let kw_values = args.split_off(args.len() - names.len());
                    let mut kwargs = Vec::with_capacity(names.len());
                    for (name, value) in names.iter().zip(kw_values) {
                        let name = match name {
                            Value::Str(s) => s.clone(),
                            _ => return Err(frame.error("keyword names must be strings")),
                        };
                        kwargs.push((name, value));
                    }
                    let callable = frame.pop()?;
                    let result = self.call(&callable, &args, &kwargs)?;
                    frame.push(result);
                }
                Opcode::MakeFunction => {
                    let func = self.make_function(&mut frame, MakeFunctionFlags(arg))?;
                    frame.push(func);
                }
                Opcode::ReturnValue => return frame.pop(),
            }
        }
    }

    fn make_function(&mut self, frame: &mut Frame, flags: MakeFunctionFlags) -> ExecResult<Value> {
        let qualname = frame.pop()?;
        let code = match frame.pop()? {
            Value::Code(code) => code,
            other => {
                return Err(frame.error(format!(
                    "MakeFunction expects a code object, got {}",
                    other.kind_name()
                )))
            }
        };
        let closure = if flags.contains(MakeFunctionFlags::CLOSURE) {
            match frame.pop()? {
                Value::Tuple(t) => Some(t),
                _ => return Err(frame.error("closure must be a tuple")),
            }
        } else {
            None
        };
        let annotations = if flags.contains(MakeFunctionFlags::ANNOTATIONS) {
            Some(frame.pop()?)
        } else {
            None
        };
        let kwdefaults = if flags.contains(MakeFunctionFlags::KWDEFAULTS) {
            Some(frame.pop()?)
        } else {
            None
        };
        let defaults = if flags.contains(MakeFunctionFlags::DEFAULTS) {
            match frame.pop()? {
                Value::Tuple(t) => Some(t),
                _ => return Err(frame.error("defaults must be a tuple")),
            }
        } else {
            None
        };

        let func = Function::new(code, frame.func.globals.clone(), None, defaults, closure);
        {
            let mut meta = func.meta_mut();
            if let Value::Str(q) = qualname {
                meta.qualname = q;
            }
            if let Some(a) = annotations {
                meta.annotations = a;
            }
            if let Some(k) = kwdefaults {
                meta.kwdefaults = k;
            }
        }
        Ok(Value::Function(Rc::new(func)))
    }

    fn load_global(&self, func: &Function, name: &str) -> ExecResult<Value> {
        if let Some(v) = func.globals.borrow().get_str(name) {
            return Ok(v);
        }
        let fallback = func.globals.borrow().get_str("__builtins__");
        let found = match fallback {
            Some(Value::Dict(d)) => d.borrow().get_str(name),
            Some(Value::Module(m)) => m.get(name),
            _ => self.builtins().get(name),
        };
        found.ok_or_else(|| ExecError::Name(name.to_string()))
    }
}

/// Bind call arguments to local slots
fn bind_arguments(func: &Function, args: &[Value], kwargs: &[Kwarg]) -> ExecResult<Vec<Option<Value>>> {
    let code = &func.code;
    let argcount = code.argcount as usize;
    let posonly = code.posonlyargcount as usize;
    let total = argcount + code.kwonlyargcount as usize;
    let nlocals = (code.nlocals as usize).max(code.varnames.len());
    if total > code.varnames.len() || posonly > argcount {
        return Err(ExecError::type_error(format!(
            "{}() has an inconsistent argument layout",
            func.name
        )));
    }
    let mut locals: Vec<Option<Value>> = vec![None; nlocals];
    let has_varargs = code.flags.contains(CodeFlags::VARARGS);
    let has_varkw = code.flags.contains(CodeFlags::VARKEYWORDS);

    for (slot, value) in locals.iter_mut().zip(args.iter().take(argcount)) {
        *slot = Some(value.clone());
    }
    if args.len() > argcount && !has_varargs {
        return Err(ExecError::type_error(format!(
            "{}() takes {} positional arguments but {} were given",
            func.name,
            argcount,
            args.len()
        )));
    }
    if has_varargs {
        let rest = args.get(argcount..).unwrap_or(&[]).to_vec();
        if let Some(slot) = locals.get_mut(total) {
            *slot = Some(Value::tuple(rest));
        }
    }

    let mut extra_kw = Dict::new();
    for (name, value) in kwargs {
        let index = code.varnames[..total.min(code.varnames.len())]
            .iter()
            .position(|v| v == name);
        match index {
            Some(i) if i >= posonly => {
                if locals[i].is_some() {
                    return Err(ExecError::type_error(format!(
                        "{}() got multiple values for argument '{}'",
                        func.name, name
                    )));
                }
                locals[i] = Some(value.clone());
            }
            Some(_) if !has_varkw => {
                return Err(ExecError::type_error(format!(
                    "{}() got some positional-only arguments passed as keyword arguments: '{}'",
                    func.name, name
                )));
            }
            _ if has_varkw => {
                extra_kw.set_str(name, value.clone());
            }
            _ => {
                return Err(ExecError::type_error(format!(
                    "{}() got an unexpected keyword argument '{}'",
                    func.name, name
                )));
            }
        }
    }
    if has_varkw {
        let slot = total + has_varargs as usize;
        if let Some(slot) = locals.get_mut(slot) {
            *slot = Some(Value::dict(extra_kw));
        }
    }

    let defaults = func.defaults.as_deref().unwrap_or(&[]);
    let first_default = argcount.saturating_sub(defaults.len());
    for i in 0..argcount {
        if locals[i].is_none() {
            match i.checked_sub(first_default).and_then(|d| defaults.get(d)) {
                Some(default) => locals[i] = Some(default.clone()),
                None => {
                    return Err(ExecError::type_error(format!(
                        "{}() missing required positional argument: '{}'",
                        func.name, code.varnames[i]
                    )))
                }
            }
        }
    }

    let kwdefaults = func.meta().kwdefaults.clone();
    for i in argcount..total {
        if locals[i].is_none() {
            let name = &code.varnames[i];
            let default = match &kwdefaults {
                Value::Dict(d) => d.borrow().get_str(name),
                _ => None,
            };
            match default {
                Some(v) => locals[i] = Some(v),
                None => {
                    return Err(ExecError::type_error(format!(
                        "{}() missing required keyword-only argument: '{}'",
                        func.name, name
                    )))
                }
            }
        }
    }
    Ok(locals)
}
