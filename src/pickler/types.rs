//! Classes, instances and global references

use std::rc::Rc;

use deeppickle_vm::{Dict, Instance, TypeObject, Value};
use tracing::{trace, warn};

use super::{Ctor, Pickler};
use crate::encoding::Op;
use crate::error::EncodeError;
use crate::globals::resolves_to;
use crate::policy::Classification;

/// Namespace entries the class machinery recreates by itself
const IMPLICIT_MEMBERS: [&str; 3] = ["__dict__", "__weakref__", "_abc_impl"];

impl Pickler<'_> {
    /// Opaque classes become global references; the rest are rebuilt by
    /// calling their metaclass with `(name, bases, namespace)`.
    pub(super) fn save_type(&mut self, value: &Value, ty: &Rc<TypeObject>) -> Result<(), EncodeError> {
        let policy = &self.config.policy;
        if policy.classify(self.interp, ty) == Classification::Opaque {
            let name = policy.global_name(ty);
            return self.save_global_ref(value, &name.module, &name.qualname);
        }

        let declared: &[Rc<str>] = ty.slots.as_deref().unwrap_or(&[]);
        let mut namespace = Dict::new();
        for (key, item) in ty.namespace().iter() {
            if let Value::Str(name) = key {
                if IMPLICIT_MEMBERS.contains(&&**name) || declared.contains(name) {
                    continue;
                }
            }
            namespace
                .insert(key.clone(), item.clone())
                .map_err(|e| EncodeError::Internal(format!("class namespace key: {e}")))?;
        }

        let ctor = match &ty.meta {
            None => Ctor::Global("builtins.type"),
            Some(meta) => Ctor::Value(Value::Type(meta.clone())),
        };
        let bases = Value::tuple(ty.bases.iter().cloned().map(Value::Type).collect());
        let args = [Value::Str(ty.name.clone()), bases, Value::dict(namespace)];
        if !self.save_reduce(value, ctor, &args)? {
            return Ok(());
        }
        self.patch_attrs(&[("__qualname__", Value::Str(ty.qualname()))])
    }

    /// Allocate without `__init__`, memoize, then restore the state.
    /// Classes that define `__reduce__` are encoded from its result.
    pub(super) fn save_instance(&mut self, value: &Value, inst: &Instance) -> Result<(), EncodeError> {
        if defines_reduce(&inst.class) {
            return self.save_reduced(value, inst);
        }
        self.save(&Value::Type(inst.class.clone()))?;
        self.out.op(Op::EmptyTuple);
        self.out.op(Op::NewObj);
        self.memoize(value)?;

        // an empty dict is still written when something else holds it
        let dict_state = inst
            .dict()
            .filter(|d| !d.borrow().is_empty() || Rc::strong_count(d) > 2);
        let has_slots = inst.class.mro().iter().any(|t| t.slots.is_some());
        if !has_slots {
            if let Some(dict) = dict_state {
                self.save(&Value::Dict(dict))?;
                self.out.op(Op::Build);
            }
            return Ok(());
        }

        let slots = inst.slot_values();
        if dict_state.is_none() && slots.is_empty() {
            return Ok(());
        }
        match dict_state {
            Some(dict) => self.save(&Value::Dict(dict))?,
            None => self.out.none(),
        }
        self.out.op(Op::EmptyDict);
        let pairs: Vec<(Value, Value)> = slots
            .into_iter()
            .map(|(name, v)| (Value::Str(name), v))
            .collect();
        self.set_items(&pairs)?;
        self.out.op(Op::Tuple2);
        self.out.op(Op::Build);
        Ok(())
    }

    /// Encode `callable(*args)` with optional `BUILD` state, as returned by
    /// `__reduce__`. A str result names a global in the class's module.
    fn save_reduced(&mut self, value: &Value, inst: &Instance) -> Result<(), EncodeError> {
        let fail = |source| EncodeError::Reduce {
            class: inst.class.qualname().to_string(),
            source,
        };
        let hook = self.interp.getattr(value, "__reduce__").map_err(fail)?;
        let reduced = self.interp.call(&hook, &[], &[]).map_err(fail)?;
        trace!(class = %inst.class.qualname(), result = reduced.kind_name(), "reduce hook");

        let parts = match &reduced {
            Value::Str(name) => {
                let module = inst.class.module_name();
                return self.save_global_ref(value, &module, name);
            }
            Value::Tuple(parts) if (2..=3).contains(&parts.len()) => parts.clone(),
            other => {
                return Err(EncodeError::UnsupportedValue {
                    kind: inst.class.qualname().to_string(),
                    detail: format!(
                        "__reduce__ must return a str or a 2- or 3-tuple, not {}",
                        other.kind_name()
                    ),
                })
            }
        };
        let Value::Tuple(args) = &parts[1] else {
            return Err(EncodeError::UnsupportedValue {
                kind: inst.class.qualname().to_string(),
                detail: format!("__reduce__ arguments must be a tuple, not {}", parts[1].kind_name()),
            });
        };
        if !self.save_reduce(value, Ctor::Value(parts[0].clone()), args)? {
            return Ok(());
        }
        match parts.get(2) {
            None | Some(Value::None) => Ok(()),
            Some(state) => {
                self.save(state)?;
                self.out.op(Op::Build);
                Ok(())
            }
        }
    }

    /// Reference a value by where it lives.
    ///
    /// The location is checked against the live runtime; a mismatch is only
    /// logged, and surfaces at decode time if it still does not resolve.
    pub(super) fn save_global_ref(
        &mut self,
        value: &Value,
        module: &str,
        qualname: &str,
    ) -> Result<(), EncodeError> {
        if !resolves_to(self.interp, module, qualname, value) {
            warn!(
                module,
                qualname,
                kind = value.kind_name(),
                "global reference does not resolve to the encoded value"
            );
        }
        self.out.global(module, qualname);
        self.memoize(value)?;
        Ok(())
    }
}

/// Whether a user class in the MRO defines `__reduce__`
fn defines_reduce(class: &Rc<TypeObject>) -> bool {
    class
        .mro()
        .iter()
        .any(|t| !t.is_native() && t.namespace().contains_str("__reduce__"))
}
