//! Values rebuilt by one constructor call: method wrappers, properties,
//! bound methods, slices and modules

use deeppickle_vm::{Module, Value};

use super::{Ctor, Pickler};
use crate::error::EncodeError;

impl Pickler<'_> {
    pub(super) fn save_simple(&mut self, value: &Value) -> Result<(), EncodeError> {
        let (ctor, args) = match value {
            Value::StaticMethod(w) => ("builtins.staticmethod", vec![w.func.clone()]),
            Value::ClassMethod(w) => ("builtins.classmethod", vec![w.func.clone()]),
            Value::Property(p) => (
                "builtins.property",
                vec![p.fget.clone(), p.fset.clone(), p.fdel.clone(), p.doc.clone()],
            ),
            Value::BoundMethod(m) => ("types.MethodType", vec![m.func.clone(), m.receiver.clone()]),
            Value::Slice(s) => (
                "builtins.slice",
                vec![s.start.clone(), s.stop.clone(), s.step.clone()],
            ),
            other => {
                return Err(EncodeError::Internal(format!(
                    "{} has no single-call constructor",
                    other.kind_name()
                )))
            }
        };
        self.save_reduce(value, Ctor::Global(ctor), &args)?;
        Ok(())
    }

    /// `types.ModuleType(name, doc)` followed by its `__dict__`, or an
    /// import for modules the policy names
    pub(super) fn save_module(&mut self, value: &Value, module: &Module) -> Result<(), EncodeError> {
        let name = Value::Str(module.name.clone());
        if self.config.policy.imports_by_name(&module.name) {
            self.save_reduce(value, Ctor::Global("builtins.__import__"), &[name])?;
            return Ok(());
        }

        let doc = module.get("__doc__").unwrap_or(Value::None);
        if !self.save_reduce(value, Ctor::Global("types.ModuleType"), &[name, doc])? {
            return Ok(());
        }
        self.patch_attrs(&[("__dict__", Value::Dict(module.dict()))])
    }
}
