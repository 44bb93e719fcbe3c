//! Opaque vs reconstructible classification of classes
//!
//! An opaque class is encoded as a reference to where it lives; a
//! reconstructible one is rebuilt from its name, bases and namespace. The
//! decision is driven by data: a per-module table, the module's origin and
//! the set of native-extension file suffixes.
//!
//! # Example policy
//!
//! ```toml
//! extension_suffixes = [".so"]
//! import_by_name = ["sys"]
//!
//! [namespaces]
//! builtins = "opaque"
//! mylib = "reconstructible"
//!
//! [canonical_names]
//! "_thread.lock" = "_thread.LockType"
//! ```

use std::collections::HashMap;
use std::rc::Rc;

use deeppickle_vm::{DescriptorKind, Interpreter, ModuleOrigin, TypeObject, Value};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

static DEFAULT_POLICY_TOML: &str = include_str!("default_policy.toml");

/// Policy shipped with the crate
pub static DEFAULT_POLICY: Lazy<ClassificationPolicy> = Lazy::new(|| {
    toml::from_str(DEFAULT_POLICY_TOML).expect("embedded default policy is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// Encoded as a global reference
    Opaque,
    /// Encoded as a call to its metaclass
    Reconstructible,
}

/// Where an opaque value is looked up at decode time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalName {
    pub module: String,
    pub qualname: String,
}

impl GlobalName {
    /// Split a `module.qualname` path on its last dot
    pub fn parse(path: &str) -> Self {
        match path.rsplit_once('.') {
            Some((module, qualname)) => Self {
                module: module.to_string(),
                qualname: qualname.to_string(),
            },
            None => Self {
                module: "builtins".to_string(),
                qualname: path.to_string(),
            },
        }
    }
}

impl std::fmt::Display for GlobalName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.module, self.qualname)
    }
}

/// Classification tables.
///
/// A policy loaded from a file replaces the shipped tables wholesale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ClassificationPolicy {
    /// Per-module verdicts that bypass the origin checks.
    #[serde(default)]
    pub namespaces: HashMap<String, Classification>,

    /// File suffixes of native extension modules.
    #[serde(default = "default_extension_suffixes")]
    pub extension_suffixes: Vec<String>,

    /// `module.qualname` of an opaque class mapped to the location it is
    /// reachable from.
    #[serde(default)]
    pub canonical_names: HashMap<String, String>,

    /// Modules encoded as `builtins.__import__(name)`.
    #[serde(default = "default_import_by_name")]
    pub import_by_name: Vec<String>,
}

fn default_extension_suffixes() -> Vec<String> {
    [".so", ".pyd", ".dll", ".dylib"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_import_by_name() -> Vec<String> {
    vec!["sys".to_string()]
}

impl Default for ClassificationPolicy {
    fn default() -> Self {
        DEFAULT_POLICY.clone()
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

impl ClassificationPolicy {
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let policy: Self = toml::from_str(s)?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for suffix in &self.extension_suffixes {
            if !suffix.starts_with('.') || suffix.len() < 2 {
                return Err(ConfigError::Invalid(format!(
                    "extension suffix {suffix:?} must start with '.'"
                )));
            }
        }
        for (from, to) in &self.canonical_names {
            if !from.contains('.') || !to.contains('.') {
                return Err(ConfigError::Invalid(format!(
                    "canonical name {from:?} = {to:?} must use module.qualname paths"
                )));
            }
        }
        if let Some(empty) = self.import_by_name.iter().find(|n| n.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "import_by_name entry {empty:?} is empty"
            )));
        }
        Ok(())
    }

    /// The shipped policy as TOML text.
    pub fn default_toml() -> &'static str {
        DEFAULT_POLICY_TOML
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

impl ClassificationPolicy {
    pub fn classify(&self, interp: &Interpreter, ty: &TypeObject) -> Classification {
        let (verdict, reason) = self.decide(interp, ty);
        debug!(
            class = %ty.qualname(),
            module = %ty.module_name(),
            ?verdict,
            reason,
            "classified class"
        );
        verdict
    }

    fn decide(&self, interp: &Interpreter, ty: &TypeObject) -> (Classification, &'static str) {
        use Classification::*;

        let module_name = ty.module_name();
        if let Some(verdict) = self.namespaces.get(&*module_name) {
            return (*verdict, "namespace table");
        }
        let Some(module) = interp.module(&module_name) else {
            return (Opaque, "module not loaded");
        };
        let unexplained = has_unexplained_slots(ty);
        match &module.origin {
            ModuleOrigin::Extension { .. } if unexplained => {
                (Opaque, "extension class with undeclared slots")
            }
            ModuleOrigin::Extension { .. } => (Reconstructible, "extension module"),
            _ if unexplained => (Opaque, "undeclared member descriptors"),
            origin => match origin.file() {
                None => (Opaque, "module has no file"),
                Some(file) if self.is_extension_file(file) => (Opaque, "native extension file"),
                Some(_) => (Reconstructible, "source module"),
            },
        }
    }

    fn is_extension_file(&self, file: &str) -> bool {
        self.extension_suffixes.iter().any(|s| file.ends_with(s.as_str()))
    }

    /// Location used to reference an opaque class
    pub fn global_name(&self, ty: &TypeObject) -> GlobalName {
        let module = ty.module_name();
        let qualname = ty.qualname();
        let key = format!("{module}.{qualname}");
        match self.canonical_names.get(&key) {
            Some(canonical) => GlobalName::parse(canonical),
            None => GlobalName {
                module: module.to_string(),
                qualname: qualname.to_string(),
            },
        }
    }

    pub fn imports_by_name(&self, module: &str) -> bool {
        self.import_by_name.iter().any(|m| m == module)
    }
}

// Slot descriptors in the class body that no declared slot accounts for.
fn has_unexplained_slots(ty: &TypeObject) -> bool {
    let declared: &[Rc<str>] = ty.slots.as_deref().unwrap_or(&[]);
    ty.namespace().iter().any(|(name, value)| match value {
        Value::MemberDescriptor(d) if d.kind == DescriptorKind::Slot => match name {
            Value::Str(name) => !declared.contains(name),
            _ => true,
        },
        _ => false,
    })
}
