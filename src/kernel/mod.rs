//! The kernel thread.
//!
//! One thread owns the registry and the container and serves
//! [`KernelCommand`]s one at a time, which serializes every structural
//! change. It blocks on the command channel between requests.

pub mod bridge;

pub use bridge::{CompatibleSummary, KernelCommand, KernelHandle};

use crate::config::KernelConfig;
use crate::container::ModuleContainer;
use crate::error::{KernelError, Result};
use crate::events::{EventBus, KernelEvent};
use crate::graph::ModuleId;
use crate::registry::ModuleRegistry;
use crate::scene::SceneGraph;
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::thread::JoinHandle;

pub struct Kernel {
    registry: ModuleRegistry,
    container: ModuleContainer,
    cmd_rx: Receiver<KernelCommand>,
    defaults: Vec<String>,
}

impl Kernel {
    /// Build a kernel and its handle. Nothing runs until [`Kernel::run`].
    pub fn new(
        mut registry: ModuleRegistry,
        config: &KernelConfig,
        scene: Arc<dyn SceneGraph>,
    ) -> (Self, KernelHandle) {
        registry.set_filter(config.modules.filter());
        let events = EventBus::new(config.kernel.event_capacity);
        let (handle, cmd_rx) = KernelHandle::new(config.kernel.command_capacity, events.clone());
        let container =
            ModuleContainer::new(events, scene).with_stack_size(config.kernel.thread_stack_size);
        let kernel = Self {
            registry,
            container,
            cmd_rx,
            defaults: config.modules.default.clone(),
        };
        (kernel, handle)
    }

    /// Start the kernel on its own thread.
    pub fn spawn(
        registry: ModuleRegistry,
        config: &KernelConfig,
        scene: Arc<dyn SceneGraph>,
    ) -> Result<(KernelHandle, JoinHandle<()>)> {
        let (kernel, handle) = Self::new(registry, config, scene);
        let thread = std::thread::Builder::new()
            .name("kernel".to_string())
            .spawn(move || kernel.run())
            .map_err(|e| KernelError::Io(e).with_context("Failed to start kernel thread"))?;
        Ok((handle, thread))
    }

    /// Serve commands until shutdown or until every handle is dropped.
    pub fn run(mut self) {
        tracing::info!(
            "Kernel thread started with {} prototype(s)",
            self.registry.len()
        );
        self.load_defaults();

        while let Ok(cmd) = self.cmd_rx.recv() {
            tracing::trace!("Kernel command {:?}", cmd);
            if !self.handle_command(cmd) {
                break;
            }
        }

        self.container.stop();
        self.container.events().emit(KernelEvent::Shutdown);
        tracing::info!("Kernel thread exiting");
    }

    fn load_defaults(&mut self) {
        for name in std::mem::take(&mut self.defaults) {
            if let Err(e) = self.create(&name) {
                tracing::warn!("Skipping default module \"{}\": {}", name, e);
            }
        }
    }

    fn create(&mut self, name: &str) -> Result<ModuleId> {
        let instance = self.registry.create(name)?;
        self.container.add(instance)
    }

    /// Returns false when the kernel should stop.
    fn handle_command(&mut self, cmd: KernelCommand) -> bool {
        // Send errors mean the caller gave up waiting; nothing to do.
        match cmd {
            KernelCommand::Prototypes { reply } => {
                let infos = self
                    .registry
                    .prototypes()
                    .iter()
                    .map(|p| p.info().clone())
                    .collect();
                let _ = reply.send(infos);
            }
            KernelCommand::CompatiblePrototypes { on, reply } => {
                let _ = reply.send(self.compatible_prototypes(on));
            }
            KernelCommand::Create { name, reply } => {
                let _ = reply.send(self.create(&name));
            }
            KernelCommand::Add { instance, reply } => {
                let result = if self.registry.filter().permits(instance.name()) {
                    self.container.add(instance)
                } else {
                    Err(KernelError::ModuleNotAllowed(instance.name().to_string()))
                };
                let _ = reply.send(result);
            }
            KernelCommand::Remove { id, reply } => {
                let _ = reply.send(self.container.remove(id));
            }
            KernelCommand::Connect { from, to, reply } => {
                let result = self
                    .container
                    .connect(from.module, &from.connector, to.module, &to.connector);
                let _ = reply.send(result);
            }
            KernelCommand::Disconnect { from, to, reply } => {
                let result = self
                    .container
                    .disconnect(from.module, &from.connector, to.module, &to.connector);
                let _ = reply.send(result);
            }
            KernelCommand::Apply { on, name, reply } => {
                let _ = reply.send(self.container.apply_module(&self.registry, on, &name));
            }
            KernelCommand::PossibleConnections { id, reply } => {
                let _ = reply.send(self.container.possible_connections(id));
            }
            KernelCommand::Module { id, reply } => {
                let _ = reply.send(self.container.module(id));
            }
            KernelCommand::Modules { reply } => {
                let _ = reply.send(self.container.statuses());
            }
            KernelCommand::SaveProject { reply } => {
                let _ = reply.send(self.container.save_project());
            }
            KernelCommand::ApplyProject { project, reply } => {
                let _ = reply.send(self.container.apply_project(&self.registry, &project));
            }
            KernelCommand::Shutdown => {
                tracing::info!("Kernel shutdown requested");
                return false;
            }
        }
        true
    }

    fn compatible_prototypes(&self, on: Option<ModuleId>) -> Result<Vec<CompatibleSummary>> {
        let module = match on {
            Some(id) => Some(
                self.container
                    .module(id)
                    .ok_or(KernelError::UnknownModule(id.0))?,
            ),
            None => None,
        };
        Ok(self
            .registry
            .compatible_prototypes(module.as_ref())
            .into_iter()
            .map(|c| CompatibleSummary {
                info: c.prototype.info().clone(),
                connections: c.connections,
            })
            .collect())
    }
}
