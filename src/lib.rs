//! # vizkernel: module container and data-flow kernel
//!
//! The kernel loads independently written processing and rendering units
//! ("modules"), wires them into a data-flow graph through typed connectors
//! and runs each module on its own thread, waking it when data arrives, a
//! property changes or shutdown is requested.
//!
//! ## Architecture
//!
//! - **Sync**: persistent conditions and condition sets that module threads
//!   sleep on
//! - **Graph**: typed input and output connectors with single-producer inputs
//! - **Module**: lifecycle state machine, properties and the per-module runner
//! - **Registry / Container**: prototypes and the live module graph
//! - **Project**: saving and restoring a whole graph as TOML or JSON
//! - **Kernel**: a thread owning the container, driven through
//!   [`KernelHandle`] by crossbeam channels
//! - **Scripting**: Rhai functions over the same handle
//!
//! The GUI subscribes to [`KernelEvent`]s and the renderer implements
//! [`SceneGraph`]; neither is part of this crate.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vizkernel::{
//!     config::KernelConfig, graph::Endpoint, scene::TracingScene, Kernel, ModuleRegistry,
//! };
//!
//! fn main() -> vizkernel::Result<()> {
//!     let config = KernelConfig::load_or_default();
//!     let registry = ModuleRegistry::with_builtins()?;
//!     let (kernel, thread) = Kernel::spawn(registry, &config, Arc::new(TracingScene))?;
//!
//!     let source = kernel.create("Scalar Source")?;
//!     let scale = kernel.create("Scale")?;
//!     kernel.connect(Endpoint::new(source, "values"), Endpoint::new(scale, "in"))?;
//!     kernel.set_property(scale, "factor", 2.0)?;
//!
//!     kernel.shutdown();
//!     let _ = thread.join();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod container;
pub mod error;
pub mod events;
pub mod graph;
pub mod kernel;
pub mod logging;
pub mod module;
pub mod project;
pub mod registry;
pub mod scene;
pub mod scripting;
pub mod sync;

// Re-export commonly used types
pub use container::ModuleContainer;
pub use error::{KernelError, Result, ResultExt};
pub use events::{EventBus, KernelEvent};
pub use kernel::{Kernel, KernelCommand, KernelHandle};
pub use module::{
    AnyModule, ModuleContext, ModuleHandle, ModuleInfo, ModuleInstance, ModulePlugin, ModuleState,
    PropertyValue,
};
pub use project::ProjectFile;
pub use registry::{ModulePrototype, ModuleRegistry};
pub use scene::{SceneGraph, SceneNode};
pub use scripting::ScriptBridge;
