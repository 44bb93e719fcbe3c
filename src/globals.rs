//! Global-binding snapshots and static global lookup

use std::rc::Rc;

use deeppickle_vm::{Code, Dict, Function, Interpreter, ObjId, Value};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

/// Names a code block (and every code block nested in its constants) may
/// look up as globals or attributes
pub fn referenced_names(code: &Code) -> FxHashSet<Rc<str>> {
    let mut names = FxHashSet::default();
    let mut pending = vec![code];
    while let Some(code) = pending.pop() {
        names.extend(code.names.iter().cloned());
        pending.extend(code.nested_code().map(|c| &**c));
    }
    names
}

/// Filtered globals per function, shared for the whole session so that
/// every encoding of a function sees one snapshot identity.
#[derive(Default)]
pub struct GlobalsCache {
    snapshots: FxHashMap<ObjId, (Rc<Function>, Value)>,
}

impl GlobalsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// The globals `func` needs, as a dict value
    pub fn snapshot(&mut self, interp: &Interpreter, func: &Rc<Function>) -> Value {
        let id = ObjId::of(func);
        if let Some((_, snapshot)) = self.snapshots.get(&id) {
            return snapshot.clone();
        }
        let snapshot = Value::dict(filter_globals(interp, func));
        self.snapshots.insert(id, (func.clone(), snapshot.clone()));
        snapshot
    }
}

fn filter_globals(interp: &Interpreter, func: &Function) -> Dict {
    let names = referenced_names(&func.code);
    let globals = func.globals.borrow();
    let mut filtered = Dict::new();
    let mut needs_builtins = false;

    for (key, value) in globals.iter() {
        if let Value::Str(name) = key {
            if names.contains(name) {
                filtered.set_str(name, value.clone());
            }
        }
    }
    let builtins = globals.get_str("__builtins__");
    for name in &names {
        if !globals.contains_str(name) && resolves_in_builtins(interp, builtins.as_ref(), name) {
            needs_builtins = true;
            break;
        }
    }
    if needs_builtins {
        if let Some(builtins) = builtins {
            filtered.set_str("__builtins__", builtins);
        }
    }

    debug!(
        function = %func.qualname(),
        referenced = names.len(),
        kept = filtered.len(),
        builtins = needs_builtins,
        "globals snapshot"
    );
    filtered
}

fn resolves_in_builtins(interp: &Interpreter, builtins: Option<&Value>, name: &str) -> bool {
    let dict = match builtins {
        Some(Value::Dict(d)) => d.clone(),
        Some(Value::Module(m)) => m.dict(),
        _ => interp.builtins().dict(),
    };
    let found = dict.borrow().contains_str(name);
    found
}

/// Resolve `module` + dotted `qualname` without running any code.
///
/// Only module dicts and class namespaces are consulted, so this never
/// mutates the interpreter.
pub fn resolve_static(interp: &Interpreter, module: &str, qualname: &str) -> Option<Value> {
    let mut value = Value::Module(interp.module(module)?);
    for part in qualname.split('.') {
        value = match &value {
            Value::Module(m) => m.get(part)?,
            Value::Type(t) => t.lookup(part)?,
            _ => return None,
        };
    }
    Some(value)
}

/// Whether `module` + `qualname` currently names exactly `value`
pub fn resolves_to(interp: &Interpreter, module: &str, qualname: &str, value: &Value) -> bool {
    resolve_static(interp, module, qualname).is_some_and(|found| found.is(value))
}
