//! Functions, code blocks and cells

use std::rc::Rc;

use deeppickle_vm::{Cell, Code, Function, Value};

use super::{Ctor, Pickler};
use crate::encoding::Op;
use crate::error::EncodeError;

fn str_tuple(names: &[Rc<str>]) -> Value {
    Value::tuple(names.iter().cloned().map(Value::Str).collect())
}

impl Pickler<'_> {
    /// `types.FunctionType(code, globals, name, defaults, closure)`, then the
    /// mutable attributes as a patch.
    ///
    /// The globals are a snapshot holding only the names the code can reach,
    /// shared by every reference to this function in the session.
    pub(super) fn save_function(
        &mut self,
        value: &Value,
        func: &Rc<Function>,
    ) -> Result<(), EncodeError> {
        let freevars = func.code.freevars.len();
        if func.closure_len() != freevars {
            return Err(EncodeError::InvalidClosure {
                function: func.qualname().to_string(),
                freevars,
                cells: func.closure_len(),
            });
        }

        let globals = self.globals.snapshot(self.interp, func);
        let args = [
            Value::Code(func.code.clone()),
            globals,
            Value::Str(func.name.clone()),
            func.defaults.clone().map_or(Value::None, Value::Tuple),
            func.closure.clone().map_or(Value::None, Value::Tuple),
        ];
        if !self.save_reduce(value, Ctor::Global("types.FunctionType"), &args)? {
            return Ok(());
        }

        let meta = func.meta().clone();
        self.patch_attrs(&[
            ("__annotations__", meta.annotations),
            ("__dict__", Value::Dict(meta.dict)),
            ("__kwdefaults__", meta.kwdefaults),
            ("__module__", meta.module),
            ("__qualname__", Value::Str(meta.qualname)),
            ("__doc__", meta.doc),
        ])
    }

    /// `types.CodeType` with its sixteen fields in declaration order
    pub(super) fn save_code(&mut self, value: &Value, code: &Code) -> Result<(), EncodeError> {
        let int = |v: u32| Value::Int(i64::from(v));
        let args = [
            int(code.argcount),
            int(code.posonlyargcount),
            int(code.kwonlyargcount),
            int(code.nlocals),
            int(code.stacksize),
            int(code.flags.bits()),
            Value::Bytes(code.bytecode.clone()),
            Value::Tuple(code.consts.clone()),
            str_tuple(&code.names),
            str_tuple(&code.varnames),
            Value::Str(code.filename.clone()),
            Value::Str(code.name.clone()),
            int(code.firstlineno),
            Value::Bytes(code.linetable.clone()),
            str_tuple(&code.freevars),
            str_tuple(&code.cellvars),
        ];
        self.save_reduce(value, Ctor::Global("types.CodeType"), &args)?;
        Ok(())
    }

    /// Cells are always deferred: an empty cell is memoized before its
    /// contents are written, which is what lets recursive closures terminate.
    pub(super) fn save_cell(&mut self, value: &Value, cell: &Cell) -> Result<(), EncodeError> {
        self.out.global_path("types.CellType");
        self.out.op(Op::EmptyTuple);
        self.out.op(Op::Reduce);
        self.memoize(value)?;
        if let Some(contents) = cell.get() {
            self.patch_attrs(&[("cell_contents", contents)])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncoderConfig;
    use crate::encoding::disassemble;
    use deeppickle_vm::{CodeBuilder, Interpreter, ModuleOrigin};

    #[test]
    fn test_closure_mismatch() {
        let mut interp = Interpreter::new();
        let module = interp.new_module("m", ModuleOrigin::Dynamic);
        let mut b = CodeBuilder::new("inner").freevars(&["x"]);
        b.load_deref("x");
        b.return_value();
        let code = Rc::new(b.build().unwrap());
        let func = Value::Function(Rc::new(Function::new(
            code,
            module.dict(),
            None,
            None,
            None,
        )));

        let config = EncoderConfig::default();
        let mut pickler = Pickler::new(&mut interp, &config);
        let err = pickler.dump(&func).unwrap_err();
        assert!(matches!(
            err,
            EncodeError::InvalidClosure { freevars: 1, cells: 0, .. }
        ));
    }

    #[test]
    fn test_empty_cell_has_no_patch() {
        let mut interp = Interpreter::new();
        let config = EncoderConfig::default();
        let mut pickler = Pickler::new(&mut interp, &config);
        pickler.dump(&Value::Cell(Rc::new(Cell::empty()))).unwrap();
        let listing = disassemble(&pickler.finish()).unwrap();
        assert!(listing.contains("\"CellType\""));
        assert!(!listing.contains("BUILD"));
    }

    #[test]
    fn test_code_fields_in_order() {
        let mut interp = Interpreter::new();
        let mut b = CodeBuilder::new("f").params(&["a"]).filename("demo.py");
        b.load_fast("a");
        b.return_value();
        let code = Value::Code(Rc::new(b.build().unwrap()));

        let config = EncoderConfig::default();
        let mut pickler = Pickler::new(&mut interp, &config);
        pickler.dump(&code).unwrap();
        let listing = disassemble(&pickler.finish()).unwrap();
        let filename = listing.find("\"demo.py\"").unwrap();
        let name = listing.find("\"f\"").unwrap();
        assert!(filename < name);
        assert!(listing.contains("\"CodeType\""));
    }
}
