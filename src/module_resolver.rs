//! Module resolution interface.
//!
//! The solver only ever asks a resolver for a module's return pack; the
//! actual filesystem/virtual-path machinery lives with the caller.

use crate::types::{Location, TypePackId};

/// What kind of source a resolved module is.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SourceKind {
    /// A module: returns values and may be required.
    Module,
    /// A plain script; requiring one is an error.
    Script,
}

/// A resolved module's surface, imported into the solver's arena by the
/// caller ahead of time.
#[derive(Clone, Debug)]
pub struct ModuleExports {
    pub kind: SourceKind,
    pub return_pack: TypePackId,
    pub human_name: String,
}

/// Identifies the module a `require` names, as computed by the generator.
#[derive(Clone, Debug, Default)]
pub struct ModuleInfo {
    /// Empty when the require path could not be resolved to a name.
    pub name: String,
    pub optional: bool,
}

/// A known require cycle through this module.
#[derive(Clone, Debug)]
pub struct RequireCycle {
    pub location: Location,
    /// The cycle's module path, starting at the first re-entered module.
    pub path: Vec<String>,
}

pub trait ModuleResolver {
    fn module_exists(&self, name: &str) -> bool;
    fn module(&self, name: &str) -> Option<ModuleExports>;
    fn human_readable_name(&self, name: &str) -> String;
}

/// A resolver that knows nothing; useful for tests and single-module runs.
#[derive(Default)]
pub struct NullModuleResolver;

impl ModuleResolver for NullModuleResolver {
    fn module_exists(&self, _name: &str) -> bool {
        false
    }

    fn module(&self, _name: &str) -> Option<ModuleExports> {
        None
    }

    fn human_readable_name(&self, name: &str) -> String {
        name.to_string()
    }
}
