//! Modules: lifecycle, properties, capability interface and the thread that
//! drives them.

pub mod builtin;
pub mod instance;
pub mod plugin;
pub mod property;
pub(crate) mod runner;
pub mod state;

pub use instance::{ModuleHandle, ModuleInfo, ModuleInstance, ModuleStatus};
pub use plugin::{AnyModule, BuiltinModule, ModuleContext, ModulePlugin};
pub use property::{Constraint, PropertyGroup, PropertySpec, PropertyValue};
pub use state::{ModuleFailure, ModuleState};
