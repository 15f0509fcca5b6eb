//! The container owning every live module.
//!
//! Only the thread that owns a `ModuleContainer` mutates the id mapping, so
//! `add` and `remove` are serialized. Module ids grow monotonically, which
//! makes the `BTreeMap` order the insertion order.

use crate::error::{KernelError, Result};
use crate::events::{EventBus, KernelEvent};
use crate::graph::{self, Endpoint, InputConnector, ModuleId, OutputConnector};
use crate::module::instance::Attachment;
use crate::module::runner;
use crate::module::{ModuleHandle, ModuleInstance, ModuleState, ModuleStatus};
use crate::registry::ModuleRegistry;
use crate::scene::SceneGraph;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::JoinHandle;

struct ModuleEntry {
    handle: ModuleHandle,
    thread: Option<JoinHandle<()>>,
}

pub struct ModuleContainer {
    modules: BTreeMap<ModuleId, ModuleEntry>,
    next_id: Option<ModuleId>,
    events: EventBus,
    scene: Arc<dyn SceneGraph>,
    stack_size: Option<usize>,
}

impl ModuleContainer {
    pub fn new(events: EventBus, scene: Arc<dyn SceneGraph>) -> Self {
        Self {
            modules: BTreeMap::new(),
            next_id: Some(ModuleId(0)),
            events,
            scene,
            stack_size: None,
        }
    }

    /// Stack size for module threads; `None` uses the platform default.
    pub fn with_stack_size(mut self, stack_size: Option<usize>) -> Self {
        self.stack_size = stack_size;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Assign an id, start the module thread and take ownership.
    pub fn add(&mut self, instance: ModuleInstance) -> Result<ModuleId> {
        let id = self.next_id.ok_or(KernelError::IdsExhausted)?;
        let (core, logic) = instance.into_parts();
        if !core.attach(Attachment {
            id,
            events: self.events.clone(),
            scene: self.scene.clone(),
        }) {
            return Err(KernelError::InvalidState {
                module: core.info.name.clone(),
                message: "module already belongs to a container".to_string(),
            });
        }

        let handle = ModuleHandle(core.clone());
        let thread = runner::spawn(core, logic, self.stack_size).map_err(|e| {
            KernelError::Io(e).with_context(format!("Failed to start module \"{}\"", handle.name()))
        })?;

        self.next_id = id.next();
        if self.next_id.is_none() {
            tracing::warn!("Module id {} was the last one available", id);
        }
        self.modules.insert(
            id,
            ModuleEntry {
                handle: handle.clone(),
                thread: Some(thread),
            },
        );
        tracing::info!("Added module {} \"{}\"", id, handle.name());
        self.events.emit(KernelEvent::ModuleAdded {
            id,
            name: handle.name().to_string(),
            description: handle.info().description.clone(),
            icon: handle.info().icon.clone(),
        });
        Ok(id)
    }

    /// Shut the module down, wait for its thread, unlink it and forget it.
    pub fn remove(&mut self, id: ModuleId) -> Result<()> {
        let entry = self
            .modules
            .remove(&id)
            .ok_or(KernelError::UnknownModule(id.0))?;
        entry.handle.0.request_shutdown();
        self.teardown(id, entry);
        Ok(())
    }

    fn teardown(&self, id: ModuleId, mut entry: ModuleEntry) {
        if let Some(thread) = entry.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Module {} thread panicked outside its hooks", id);
            }
        }
        let core = &entry.handle.0;
        core.disconnect_all();
        core.clear_connectors();
        tracing::info!("Removed module {} \"{}\"", id, entry.handle.name());
        self.events.emit(KernelEvent::ModuleRemoved { id });
    }

    /// Signal every module, then tear them down in insertion order.
    pub fn stop(&mut self) {
        if self.modules.is_empty() {
            return;
        }
        tracing::info!("Stopping {} module(s)", self.modules.len());
        for entry in self.modules.values() {
            entry.handle.0.request_shutdown();
        }
        while let Some((id, entry)) = self.modules.pop_first() {
            self.teardown(id, entry);
        }
    }

    pub fn module(&self, id: ModuleId) -> Option<ModuleHandle> {
        self.modules.get(&id).map(|e| e.handle.clone())
    }

    pub fn contains(&self, id: ModuleId) -> bool {
        self.modules.contains_key(&id)
    }

    /// Live modules in insertion order.
    pub fn modules(&self) -> Vec<(ModuleId, ModuleHandle)> {
        self.modules
            .iter()
            .map(|(id, e)| (*id, e.handle.clone()))
            .collect()
    }

    pub fn ids(&self) -> Vec<ModuleId> {
        self.modules.keys().copied().collect()
    }

    pub fn statuses(&self) -> Vec<ModuleStatus> {
        self.modules.values().map(|e| e.handle.status()).collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    fn live(&self, id: ModuleId) -> Result<ModuleHandle> {
        self.module(id).ok_or(KernelError::UnknownModule(id.0))
    }

    fn resolve(
        &self,
        out_id: ModuleId,
        out_name: &str,
        in_id: ModuleId,
        in_name: &str,
    ) -> Result<(ModuleHandle, Arc<OutputConnector>, ModuleHandle, Arc<InputConnector>)> {
        let producer = self.live(out_id)?;
        let consumer = self.live(in_id)?;
        let output = producer
            .output(out_name)
            .ok_or_else(|| KernelError::UnknownConnector {
                module: producer.name().to_string(),
                connector: out_name.to_string(),
                direction: "output",
            })?;
        let input = consumer
            .input(in_name)
            .ok_or_else(|| KernelError::UnknownConnector {
                module: consumer.name().to_string(),
                connector: in_name.to_string(),
                direction: "input",
            })?;
        Ok((producer, output, consumer, input))
    }

    /// Connect after both modules are ready.
    pub fn connect(&self, out_id: ModuleId, out_name: &str, in_id: ModuleId, in_name: &str) -> Result<()> {
        let (producer, output, consumer, input) = self.resolve(out_id, out_name, in_id, in_name)?;
        for handle in [&producer, &consumer] {
            if !handle.wait_ready() {
                return Err(KernelError::ModuleNotRunning(handle.name().to_string()));
            }
        }
        graph::connect(&output, &input)?;

        let from = Endpoint::new(out_id, out_name);
        let to = Endpoint::new(in_id, in_name);
        tracing::info!("Connected {} -> {}", from, to);
        self.events.emit(KernelEvent::Connected { from, to });
        Ok(())
    }

    pub fn disconnect(&self, out_id: ModuleId, out_name: &str, in_id: ModuleId, in_name: &str) -> Result<()> {
        let (_, output, _, input) = self.resolve(out_id, out_name, in_id, in_name)?;
        graph::disconnect(&output, &input)?;

        let from = Endpoint::new(out_id, out_name);
        let to = Endpoint::new(in_id, in_name);
        tracing::info!("Disconnected {} -> {}", from, to);
        self.events.emit(KernelEvent::Disconnected { from, to });
        Ok(())
    }

    /// Create `prototype`, add it and feed it from module `on` through the
    /// first output/input pair whose tags match. Nothing is left behind on
    /// failure.
    pub fn apply_module(&mut self, registry: &ModuleRegistry, on: ModuleId, prototype: &str) -> Result<ModuleId> {
        let source = self.live(on)?;
        let instance = registry.create(prototype)?;

        let new_handle = instance.handle();
        let pair = source.outputs().into_iter().find_map(|output| {
            new_handle
                .inputs()
                .into_iter()
                .find(|input| input.tag() == output.tag())
                .map(|input| (output.name().to_string(), input.name().to_string()))
        });
        let Some((out_name, in_name)) = pair else {
            return Err(KernelError::TypeMismatch {
                output: source.name().to_string(),
                output_tag: "any output".to_string(),
                input: prototype.to_string(),
                input_tag: "any input".to_string(),
            });
        };

        let id = self.add(instance)?;
        if let Err(e) = self.connect(on, &out_name, id, &in_name) {
            // Ignore the removal result: the module was added above.
            let _ = self.remove(id);
            return Err(e);
        }
        Ok(id)
    }

    /// Every `(output, input)` pair between `id` and the other live modules
    /// that could be connected right now, in both directions. Modules that
    /// are shutting down or have failed take no part.
    pub fn possible_connections(&self, id: ModuleId) -> Result<Vec<(Endpoint, Endpoint)>> {
        let this = self.live(id)?;
        let mut pairs = Vec::new();
        if !accepts_links(&this) {
            return Ok(pairs);
        }
        for (other_id, other) in self.modules() {
            if other_id == id || !accepts_links(&other) {
                continue;
            }
            collect_pairs(id, &this, other_id, &other, &mut pairs);
            collect_pairs(other_id, &other, id, &this, &mut pairs);
        }
        Ok(pairs)
    }
}

/// Running, or about to be.
fn accepts_links(handle: &ModuleHandle) -> bool {
    matches!(handle.state(), ModuleState::Unloaded | ModuleState::Ready)
}

fn collect_pairs(
    out_id: ModuleId,
    producer: &ModuleHandle,
    in_id: ModuleId,
    consumer: &ModuleHandle,
    pairs: &mut Vec<(Endpoint, Endpoint)>,
) {
    for output in producer.outputs() {
        for input in consumer.inputs() {
            if graph::can_connect(&output, &input) {
                pairs.push((
                    Endpoint::new(out_id, output.name()),
                    Endpoint::new(in_id, input.name()),
                ));
            }
        }
    }
}

impl Drop for ModuleContainer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ModuleContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleContainer")
            .field("modules", &self.ids())
            .field("next_id", &self.next_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::builtin::{Series, SeriesStats, POINT_RENDERER, SCALAR_SOURCE, SCALE, STATISTICS};
    use crate::scene::{MockSceneGraph, NullScene};
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn setup() -> (ModuleRegistry, ModuleContainer) {
        let registry = ModuleRegistry::with_builtins().unwrap();
        let container = ModuleContainer::new(EventBus::default(), Arc::new(NullScene));
        (registry, container)
    }

    fn wait_for<F: Fn() -> bool>(f: F) -> bool {
        let deadline = std::time::Instant::now() + TIMEOUT;
        while std::time::Instant::now() < deadline {
            if f() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_ids_are_stable_and_ordered() {
        let (registry, mut container) = setup();
        let a = container.add(registry.create(SCALE).unwrap()).unwrap();
        let b = container.add(registry.create(STATISTICS).unwrap()).unwrap();
        assert!(a < b);
        assert_eq!(container.ids(), vec![a, b]);

        container.remove(a).unwrap();
        let c = container.add(registry.create(SCALE).unwrap()).unwrap();
        assert!(c > b);
        assert_eq!(container.ids(), vec![b, c]);
    }

    #[test]
    fn test_add_fails_once_ids_run_out() {
        let (registry, mut container) = setup();
        container.next_id = Some(ModuleId(u32::MAX - 1));
        let last = container.add(registry.create(SCALE).unwrap()).unwrap();
        assert_eq!(last, ModuleId(u32::MAX - 1));
        assert!(last.is_valid());

        let err = container.add(registry.create(SCALE).unwrap()).unwrap_err();
        assert!(matches!(err, KernelError::IdsExhausted));
        assert_eq!(container.ids(), vec![last]);
    }

    #[test]
    fn test_connect_unknown_module() {
        let (registry, mut container) = setup();
        let a = container.add(registry.create(SCALAR_SOURCE).unwrap()).unwrap();
        let err = container.connect(a, "values", ModuleId(99), "in").unwrap_err();
        assert!(matches!(err, KernelError::UnknownModule(99)));
    }

    #[test]
    fn test_connect_unknown_connector() {
        let (registry, mut container) = setup();
        let a = container.add(registry.create(SCALAR_SOURCE).unwrap()).unwrap();
        let b = container.add(registry.create(SCALE).unwrap()).unwrap();
        let err = container.connect(a, "nope", b, "in").unwrap_err();
        assert!(matches!(err, KernelError::UnknownConnector { direction: "output", .. }));
    }

    #[test]
    fn test_chain_propagates() {
        let (registry, mut container) = setup();
        let source = container.add(registry.create(SCALAR_SOURCE).unwrap()).unwrap();
        let scale = container.add(registry.create(SCALE).unwrap()).unwrap();
        let stats = container.add(registry.create(STATISTICS).unwrap()).unwrap();

        container.module(source).unwrap().set_property("count", 4i64).unwrap();
        container.module(scale).unwrap().set_property("factor", 2.0).unwrap();
        container.connect(source, "values", scale, "in").unwrap();
        container.connect(scale, "out", stats, "in").unwrap();

        let output = container.module(stats).unwrap().output("stats").unwrap();
        let expected = SeriesStats::of(&Series(vec![0.0, 2.0, 4.0, 6.0]));
        assert!(wait_for(|| {
            output
                .data()
                .and_then(|p| p.get::<SeriesStats>().copied())
                .is_some_and(|s| s == expected)
        }));
    }

    #[test]
    fn test_remove_tears_down_connectors() {
        let (registry, mut container) = setup();
        let source = container.add(registry.create(SCALAR_SOURCE).unwrap()).unwrap();
        let scale = container.add(registry.create(SCALE).unwrap()).unwrap();
        container.connect(source, "values", scale, "in").unwrap();

        let scale_handle = container.module(scale).unwrap();
        let input = scale_handle.input("in").unwrap();
        container.remove(source).unwrap();

        assert!(!input.is_connected());
        assert!(container.module(source).is_none());
        assert!(!container.ids().contains(&source));
        assert!(matches!(container.remove(source), Err(KernelError::UnknownModule(_))));
    }

    #[test]
    fn test_removed_module_is_finished_without_connectors() {
        let (registry, mut container) = setup();
        let id = container.add(registry.create(SCALE).unwrap()).unwrap();
        let handle = container.module(id).unwrap();
        assert!(handle.wait_ready_timeout(TIMEOUT));
        container.remove(id).unwrap();
        assert_eq!(handle.state(), ModuleState::Finished);
        assert!(handle.input("in").is_none());
        assert!(handle.output("out").is_none());
    }

    #[test]
    fn test_apply_module() {
        let (registry, mut container) = setup();
        let source = container.add(registry.create(SCALAR_SOURCE).unwrap()).unwrap();
        let stats = container.apply_module(&registry, source, STATISTICS).unwrap();
        let input = container.module(stats).unwrap().input("in").unwrap();
        assert!(input.is_connected());
    }

    #[test]
    fn test_apply_incompatible_leaves_nothing() {
        let (registry, mut container) = setup();
        let stats = container.add(registry.create(STATISTICS).unwrap()).unwrap();
        let err = container.apply_module(&registry, stats, SCALE).unwrap_err();
        assert!(matches!(err, KernelError::TypeMismatch { .. }));
        assert_eq!(container.ids(), vec![stats]);
    }

    #[test]
    fn test_possible_connections() {
        let (registry, mut container) = setup();
        let source = container.add(registry.create(SCALAR_SOURCE).unwrap()).unwrap();
        let scale = container.add(registry.create(SCALE).unwrap()).unwrap();

        let pairs = container.possible_connections(source).unwrap();
        assert_eq!(
            pairs,
            vec![(Endpoint::new(source, "values"), Endpoint::new(scale, "in"))]
        );

        container.connect(source, "values", scale, "in").unwrap();
        assert!(container.possible_connections(source).unwrap().is_empty());
    }

    #[test]
    fn test_stop_finishes_everything() {
        let (registry, mut container) = setup();
        let handles: Vec<ModuleHandle> = [SCALAR_SOURCE, SCALE, STATISTICS]
            .iter()
            .map(|name| {
                let id = container.add(registry.create(name).unwrap()).unwrap();
                container.module(id).unwrap()
            })
            .collect();
        container.stop();
        assert!(container.is_empty());
        assert!(handles.iter().all(|h| h.state() == ModuleState::Finished));
    }

    #[test]
    fn test_renderer_scene_calls() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let attached = Arc::new(AtomicBool::new(false));
        let mut scene = MockSceneGraph::new();
        {
            let attached = attached.clone();
            scene
                .expect_attach_to_scene()
                .times(1)
                .returning(move |_| attached.store(true, Ordering::SeqCst));
        }
        scene.expect_detach_from_scene().times(1).return_const(());

        let registry = ModuleRegistry::with_builtins().unwrap();
        let mut container = ModuleContainer::new(EventBus::default(), Arc::new(scene));
        let source = container.add(registry.create(SCALAR_SOURCE).unwrap()).unwrap();
        let renderer = container.add(registry.create(POINT_RENDERER).unwrap()).unwrap();
        container.connect(source, "values", renderer, "in").unwrap();

        assert!(wait_for(|| attached.load(Ordering::SeqCst)));
        container.remove(renderer).unwrap();
        // Expectations are checked when the last owner drops the mock.
    }
}
