//! Thread boundary between the kernel and its callers.
//!
//! Every request carries its own reply channel, so `KernelHandle` can be
//! cloned freely and used from any thread (GUI, scripts, tests).

use crate::error::{KernelError, Result};
use crate::events::{EventBus, KernelEvent};
use crate::graph::{Endpoint, ModuleId};
use crate::module::{ModuleHandle, ModuleInfo, ModuleInstance, ModuleStatus, PropertyValue};
use crate::project::ProjectFile;
use crossbeam_channel::{bounded, Receiver, Sender};

/// A prototype that fits next to a module, with the `(output, input)` pairs
/// that would link them.
#[derive(Debug, Clone, PartialEq)]
pub struct CompatibleSummary {
    pub info: ModuleInfo,
    pub connections: Vec<(String, String)>,
}

/// Commands sent to the kernel thread.
pub enum KernelCommand {
    /// List registered prototypes.
    Prototypes { reply: Sender<Vec<ModuleInfo>> },
    /// Prototypes that can be added next to a module (or standalone).
    CompatiblePrototypes {
        on: Option<ModuleId>,
        reply: Sender<Result<Vec<CompatibleSummary>>>,
    },
    /// Create a module from a prototype and add it.
    Create {
        name: String,
        reply: Sender<Result<ModuleId>>,
    },
    /// Add an instance built outside the registry.
    Add {
        instance: ModuleInstance,
        reply: Sender<Result<ModuleId>>,
    },
    Remove {
        id: ModuleId,
        reply: Sender<Result<()>>,
    },
    Connect {
        from: Endpoint,
        to: Endpoint,
        reply: Sender<Result<()>>,
    },
    Disconnect {
        from: Endpoint,
        to: Endpoint,
        reply: Sender<Result<()>>,
    },
    /// Create a module and feed it from an existing one.
    Apply {
        on: ModuleId,
        name: String,
        reply: Sender<Result<ModuleId>>,
    },
    PossibleConnections {
        id: ModuleId,
        reply: Sender<Result<Vec<(Endpoint, Endpoint)>>>,
    },
    /// Look up a live module.
    Module {
        id: ModuleId,
        reply: Sender<Option<ModuleHandle>>,
    },
    /// Status of every live module in insertion order.
    Modules { reply: Sender<Vec<ModuleStatus>> },
    /// Snapshot the live graph.
    SaveProject { reply: Sender<ProjectFile> },
    /// Recreate a saved graph, all or nothing.
    ApplyProject {
        project: ProjectFile,
        reply: Sender<Result<Vec<ModuleId>>>,
    },
    /// Stop every module and end the kernel thread.
    Shutdown,
}

impl std::fmt::Debug for KernelCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            KernelCommand::Prototypes { .. } => "Prototypes",
            KernelCommand::CompatiblePrototypes { .. } => "CompatiblePrototypes",
            KernelCommand::Create { .. } => "Create",
            KernelCommand::Add { .. } => "Add",
            KernelCommand::Remove { .. } => "Remove",
            KernelCommand::Connect { .. } => "Connect",
            KernelCommand::Disconnect { .. } => "Disconnect",
            KernelCommand::Apply { .. } => "Apply",
            KernelCommand::PossibleConnections { .. } => "PossibleConnections",
            KernelCommand::Module { .. } => "Module",
            KernelCommand::Modules { .. } => "Modules",
            KernelCommand::SaveProject { .. } => "SaveProject",
            KernelCommand::ApplyProject { .. } => "ApplyProject",
            KernelCommand::Shutdown => "Shutdown",
        };
        f.write_str(name)
    }
}

/// Caller-side handle of the kernel thread.
#[derive(Clone)]
pub struct KernelHandle {
    cmd_tx: Sender<KernelCommand>,
    events: EventBus,
}

impl KernelHandle {
    /// Create a handle and the command receiver owned by the kernel thread.
    pub(crate) fn new(capacity: usize, events: EventBus) -> (Self, Receiver<KernelCommand>) {
        let (cmd_tx, cmd_rx) = bounded(capacity.max(1));
        (Self { cmd_tx, events }, cmd_rx)
    }

    fn request<T>(&self, make: impl FnOnce(Sender<T>) -> KernelCommand) -> Result<T> {
        let (reply, rx) = bounded(1);
        self.cmd_tx
            .send(make(reply))
            .map_err(|_| KernelError::Channel("kernel thread is not running".to_string()))?;
        rx.recv()
            .map_err(|_| KernelError::Channel("kernel dropped the request".to_string()))
    }

    /// Receive structural notifications from now on.
    pub fn subscribe(&self) -> Receiver<KernelEvent> {
        self.events.subscribe()
    }

    pub fn prototypes(&self) -> Result<Vec<ModuleInfo>> {
        self.request(|reply| KernelCommand::Prototypes { reply })
    }

    pub fn compatible_prototypes(&self, on: Option<ModuleId>) -> Result<Vec<CompatibleSummary>> {
        self.request(|reply| KernelCommand::CompatiblePrototypes { on, reply })?
    }

    pub fn create(&self, name: &str) -> Result<ModuleId> {
        self.request(|reply| KernelCommand::Create {
            name: name.to_string(),
            reply,
        })?
    }

    pub fn add(&self, instance: ModuleInstance) -> Result<ModuleId> {
        self.request(|reply| KernelCommand::Add { instance, reply })?
    }

    pub fn remove(&self, id: ModuleId) -> Result<()> {
        self.request(|reply| KernelCommand::Remove { id, reply })?
    }

    pub fn connect(&self, from: Endpoint, to: Endpoint) -> Result<()> {
        self.request(|reply| KernelCommand::Connect { from, to, reply })?
    }

    pub fn disconnect(&self, from: Endpoint, to: Endpoint) -> Result<()> {
        self.request(|reply| KernelCommand::Disconnect { from, to, reply })?
    }

    pub fn apply(&self, on: ModuleId, name: &str) -> Result<ModuleId> {
        self.request(|reply| KernelCommand::Apply {
            on,
            name: name.to_string(),
            reply,
        })?
    }

    pub fn possible_connections(&self, id: ModuleId) -> Result<Vec<(Endpoint, Endpoint)>> {
        self.request(|reply| KernelCommand::PossibleConnections { id, reply })?
    }

    pub fn module(&self, id: ModuleId) -> Result<ModuleHandle> {
        self.request(|reply| KernelCommand::Module { id, reply })?
            .ok_or(KernelError::UnknownModule(id.0))
    }

    pub fn modules(&self) -> Result<Vec<ModuleStatus>> {
        self.request(|reply| KernelCommand::Modules { reply })
    }

    pub fn save_project(&self) -> Result<ProjectFile> {
        self.request(|reply| KernelCommand::SaveProject { reply })
    }

    pub fn apply_project(&self, project: ProjectFile) -> Result<Vec<ModuleId>> {
        self.request(|reply| KernelCommand::ApplyProject { project, reply })?
    }

    /// Load a project file and apply it. Returns the new module ids.
    pub fn load_project_file(&self, path: impl AsRef<std::path::Path>) -> Result<Vec<ModuleId>> {
        let path = path.as_ref();
        let project = ProjectFile::load(path)?;
        tracing::info!("Loading project {:?}", path);
        self.apply_project(project)
            .map_err(|e| e.with_context(format!("Project {:?} failed", path)))
    }

    /// Save the live graph to `path`.
    pub fn save_project_file(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        self.save_project()?.save(path)
    }

    /// Property writes go straight to the module; they never queue behind
    /// kernel commands.
    pub fn set_property(&self, id: ModuleId, name: &str, value: impl Into<PropertyValue>) -> Result<()> {
        self.module(id)?.set_property(name, value)
    }

    pub fn property(&self, id: ModuleId, name: &str) -> Result<PropertyValue> {
        let module = self.module(id)?;
        module
            .property(name)
            .ok_or_else(|| KernelError::UnknownProperty {
                module: module.name().to_string(),
                property: name.to_string(),
            })
    }

    /// Ask the kernel to stop. Returns false if it was already gone.
    pub fn shutdown(&self) -> bool {
        self.cmd_tx.send(KernelCommand::Shutdown).is_ok()
    }
}

impl std::fmt::Debug for KernelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelHandle")
            .field("pending", &self.cmd_tx.len())
            .finish()
    }
}
