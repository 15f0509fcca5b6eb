//! Module instances and the shared state behind them.
//!
//! A [`ModuleInstance`] is what the registry creates: unstarted, owned by the
//! caller, open for connector registration. Once the container adds it, the
//! module is only reachable through cloned [`ModuleHandle`]s while its logic
//! moves onto the module thread.

use crate::error::{KernelError, Result};
use crate::events::{EventBus, KernelEvent};
use crate::graph::{
    ConnectorDirection, ConnectorOwner, ConnectorSpec, CutLink, Inbox, InputConnector, ModuleId,
    OutputConnector, SceneNodeId,
};
use crate::module::plugin::AnyModule;
use crate::module::property::{PropertyGroup, PropertySpec, PropertyValue};
use crate::module::state::{ModuleFailure, ModuleState};
use crate::scene::{SceneGraph, SceneNode};
use crate::sync::{lock, Condition, ConditionSet, EventKind, OneShot};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

/// Display metadata of a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub name: String,
    pub description: String,
    pub icon: Option<String>,
}

impl ModuleInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            icon: None,
        }
    }
}

/// Observable status of a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleStatus {
    pub id: ModuleId,
    pub name: String,
    pub state: ModuleState,
    pub error: Option<ModuleFailure>,
}

/// Set once when the container adopts the module.
pub(crate) struct Attachment {
    pub(crate) id: ModuleId,
    pub(crate) events: EventBus,
    pub(crate) scene: Arc<dyn SceneGraph>,
}

pub(crate) struct ModuleCore {
    pub(crate) info: ModuleInfo,
    pub(crate) inbox: Arc<Inbox>,
    owner: Arc<ConnectorOwner>,
    inputs: Mutex<Vec<Arc<InputConnector>>>,
    outputs: Mutex<Vec<Arc<OutputConnector>>>,
    pub(crate) properties: PropertyGroup,
    state: Mutex<ModuleState>,
    failure: Mutex<Option<ModuleFailure>>,
    pub(crate) shutdown: OneShot,
    pub(crate) ready: OneShot,
    pub(crate) finished: OneShot,
    custom: Mutex<Vec<(String, Condition)>>,
    scene_nodes: Mutex<Vec<SceneNodeId>>,
    attachment: OnceLock<Attachment>,
}

impl ModuleCore {
    fn new(info: ModuleInfo) -> Self {
        let inbox = Arc::new(Inbox::new(info.name.clone(), Condition::new()));
        let properties = PropertyGroup::new(info.name.clone());
        let owner = ConnectorOwner::new(info.name.clone());
        Self {
            info,
            inbox,
            owner,
            inputs: Mutex::new(Vec::new()),
            outputs: Mutex::new(Vec::new()),
            properties,
            state: Mutex::new(ModuleState::Unloaded),
            failure: Mutex::new(None),
            shutdown: OneShot::new(),
            ready: OneShot::new(),
            finished: OneShot::new(),
            custom: Mutex::new(Vec::new()),
            scene_nodes: Mutex::new(Vec::new()),
            attachment: OnceLock::new(),
        }
    }

    pub(crate) fn id(&self) -> ModuleId {
        self.attachment
            .get()
            .map(|a| a.id)
            .unwrap_or(ModuleId::INVALID)
    }

    pub(crate) fn attach(&self, attachment: Attachment) -> bool {
        let id = attachment.id;
        if self.attachment.set(attachment).is_err() {
            return false;
        }
        self.owner.set_id(id);
        true
    }

    pub(crate) fn emit(&self, event: KernelEvent) {
        if let Some(a) = self.attachment.get() {
            a.events.emit(event);
        }
    }

    pub(crate) fn state(&self) -> ModuleState {
        *lock(&self.state)
    }

    /// Move to `next` if the transition is legal. Returns whether it happened.
    pub(crate) fn transition(&self, next: ModuleState) -> bool {
        let mut state = lock(&self.state);
        if !state.can_transition_to(next) {
            return false;
        }
        tracing::debug!("Module {} {}: {} -> {}", self.id(), self.info.name, *state, next);
        *state = next;
        true
    }

    /// Record a processing failure and begin shutting down.
    pub(crate) fn fail(&self, message: String) {
        tracing::error!("Module {} {} failed: {}", self.id(), self.info.name, message);
        {
            let mut failure = lock(&self.failure);
            if failure.is_none() {
                *failure = Some(ModuleFailure::new(message.clone()));
            }
        }
        self.transition(ModuleState::ShuttingDown);
        self.emit(KernelEvent::ModuleFailed {
            id: self.id(),
            message,
        });
    }

    pub(crate) fn failure(&self) -> Option<ModuleFailure> {
        lock(&self.failure).clone()
    }

    pub(crate) fn input(&self, name: &str) -> Option<Arc<InputConnector>> {
        lock(&self.inputs).iter().find(|c| c.name() == name).cloned()
    }

    pub(crate) fn output(&self, name: &str) -> Option<Arc<OutputConnector>> {
        lock(&self.outputs).iter().find(|c| c.name() == name).cloned()
    }

    pub(crate) fn inputs(&self) -> Vec<Arc<InputConnector>> {
        lock(&self.inputs).clone()
    }

    pub(crate) fn outputs(&self) -> Vec<Arc<OutputConnector>> {
        lock(&self.outputs).clone()
    }

    pub(crate) fn custom_conditions(&self) -> Vec<(String, Condition)> {
        lock(&self.custom).clone()
    }

    fn has_connector(&self, name: &str) -> bool {
        self.input(name).is_some() || self.output(name).is_some()
    }

    pub(crate) fn property_changed(&self, name: &str) {
        self.emit(KernelEvent::PropertyChanged {
            id: self.id(),
            name: name.to_string(),
        });
    }

    pub(crate) fn attach_to_scene(&self, label: String, detail: String) -> SceneNodeId {
        let id = SceneNodeId::next();
        lock(&self.scene_nodes).push(id);
        if let Some(a) = self.attachment.get() {
            a.scene.attach_to_scene(SceneNode {
                id,
                module: a.id,
                label,
                detail,
            });
        }
        id
    }

    pub(crate) fn detach_from_scene(&self, id: SceneNodeId) -> bool {
        let owned = {
            let mut nodes = lock(&self.scene_nodes);
            let before = nodes.len();
            nodes.retain(|n| *n != id);
            nodes.len() != before
        };
        if owned {
            if let Some(a) = self.attachment.get() {
                a.scene.detach_from_scene(id);
            }
        }
        owned
    }

    /// Detach every node still attached. Returns how many there were.
    pub(crate) fn detach_all_scene_nodes(&self) -> usize {
        let nodes = std::mem::take(&mut *lock(&self.scene_nodes));
        if let Some(a) = self.attachment.get() {
            for id in &nodes {
                a.scene.detach_from_scene(*id);
            }
        }
        nodes.len()
    }

    /// Unlink every connector of this module from the graph and announce
    /// each cut link. Returns the links cut.
    pub(crate) fn disconnect_all(&self) -> Vec<CutLink> {
        let mut cut: Vec<CutLink> = self
            .inputs()
            .iter()
            .filter_map(|input| input.disconnect_all())
            .collect();
        for output in self.outputs() {
            cut.extend(output.disconnect_all());
        }
        for (from, to) in &cut {
            self.emit(KernelEvent::Disconnected {
                from: from.clone(),
                to: to.clone(),
            });
        }
        cut
    }

    /// Forget the connectors entirely; later lookups report not found.
    pub(crate) fn clear_connectors(&self) {
        lock(&self.inputs).clear();
        lock(&self.outputs).clear();
    }

    pub(crate) fn request_shutdown(&self) {
        self.shutdown.notify();
    }
}

/// An unstarted module, as produced by the registry.
pub struct ModuleInstance {
    core: Arc<ModuleCore>,
    logic: AnyModule,
}

impl ModuleInstance {
    pub fn new(info: ModuleInfo, logic: AnyModule) -> Self {
        Self {
            core: Arc::new(ModuleCore::new(info)),
            logic,
        }
    }

    pub fn info(&self) -> &ModuleInfo {
        &self.core.info
    }

    pub fn name(&self) -> &str {
        &self.core.info.name
    }

    pub fn state(&self) -> ModuleState {
        self.core.state()
    }

    /// Connector names are unique across inputs and outputs of one module.
    pub fn register_input(&mut self, spec: ConnectorSpec) -> Result<()> {
        self.check_new_connector(&spec, ConnectorDirection::Input)?;
        let mut inputs = lock(&self.core.inputs);
        let index = inputs.len();
        inputs.push(InputConnector::new(
            &spec,
            index,
            &self.core.owner,
            &self.core.inbox,
        ));
        Ok(())
    }

    pub fn register_output(&mut self, spec: ConnectorSpec) -> Result<()> {
        self.check_new_connector(&spec, ConnectorDirection::Output)?;
        let mut outputs = lock(&self.core.outputs);
        let index = outputs.len();
        outputs.push(OutputConnector::new(&spec, index, &self.core.owner));
        Ok(())
    }

    fn check_new_connector(&self, spec: &ConnectorSpec, direction: ConnectorDirection) -> Result<()> {
        if spec.direction != direction {
            return Err(KernelError::InvalidState {
                module: self.core.info.name.clone(),
                message: format!(
                    "connector \"{}\" is declared as {}",
                    spec.name,
                    spec.direction.as_str()
                ),
            });
        }
        if self.core.has_connector(&spec.name) {
            return Err(KernelError::DuplicateConnector {
                module: self.core.info.name.clone(),
                connector: spec.name.clone(),
            });
        }
        Ok(())
    }

    pub fn declare_property(&mut self, spec: PropertySpec) -> Result<()> {
        self.core.properties.declare(spec)
    }

    /// Register a named resettable condition that wakes the module. The
    /// returned handle may be fired from any thread.
    pub fn add_custom_condition(&mut self, name: impl Into<String>) -> Result<Condition> {
        let name = name.into();
        let mut custom = lock(&self.core.custom);
        if custom.iter().any(|(n, _)| *n == name) {
            return Err(KernelError::InvalidState {
                module: self.core.info.name.clone(),
                message: format!("custom condition \"{}\" registered twice", name),
            });
        }
        let condition = Condition::new();
        custom.push((name, condition.clone()));
        Ok(condition)
    }

    pub fn handle(&self) -> ModuleHandle {
        ModuleHandle(self.core.clone())
    }

    pub(crate) fn into_parts(self) -> (Arc<ModuleCore>, AnyModule) {
        (self.core, self.logic)
    }
}

impl std::fmt::Debug for ModuleInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleInstance")
            .field("name", &self.core.info.name)
            .field("state", &self.core.state())
            .finish()
    }
}

/// Shared, thread-safe view of a module.
#[derive(Clone)]
pub struct ModuleHandle(pub(crate) Arc<ModuleCore>);

impl ModuleHandle {
    /// Container-assigned id, or [`ModuleId::INVALID`] before insertion.
    pub fn id(&self) -> ModuleId {
        self.0.id()
    }

    pub fn info(&self) -> &ModuleInfo {
        &self.0.info
    }

    pub fn name(&self) -> &str {
        &self.0.info.name
    }

    pub fn state(&self) -> ModuleState {
        self.0.state()
    }

    pub fn failure(&self) -> Option<ModuleFailure> {
        self.0.failure()
    }

    pub fn status(&self) -> ModuleStatus {
        ModuleStatus {
            id: self.id(),
            name: self.name().to_string(),
            state: self.state(),
            error: self.failure(),
        }
    }

    pub fn input(&self, name: &str) -> Option<Arc<InputConnector>> {
        self.0.input(name)
    }

    pub fn output(&self, name: &str) -> Option<Arc<OutputConnector>> {
        self.0.output(name)
    }

    /// Inputs in registration order.
    pub fn inputs(&self) -> Vec<Arc<InputConnector>> {
        self.0.inputs()
    }

    pub fn outputs(&self) -> Vec<Arc<OutputConnector>> {
        self.0.outputs()
    }

    pub fn property(&self, name: &str) -> Option<PropertyValue> {
        self.0.properties.get(name)
    }

    pub fn properties(&self) -> Vec<(String, PropertyValue)> {
        self.0.properties.values()
    }

    /// Write a property and wake the module to handle it.
    pub fn set_property(&self, name: &str, value: impl Into<PropertyValue>) -> Result<()> {
        if self.0.properties.set(name, value.into())? {
            tracing::debug!("Module {} {}: property {} changed", self.id(), self.name(), name);
            self.0.property_changed(name);
        }
        Ok(())
    }

    pub fn custom_condition(&self, name: &str) -> Option<Condition> {
        lock(&self.0.custom)
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c.clone())
    }

    fn readiness(&self) -> ConditionSet {
        let set = ConditionSet::new();
        set.add(EventKind::Ready, &self.0.ready);
        set.add(EventKind::Finished, &self.0.finished);
        set
    }

    /// Block until the module is ready or has terminated. Returns whether it
    /// is ready. Only meaningful once the module has been added to a
    /// container.
    pub fn wait_ready(&self) -> bool {
        self.readiness().wait();
        self.state().is_running()
    }

    pub fn wait_ready_timeout(&self, timeout: Duration) -> bool {
        self.readiness().wait_timeout(timeout) && self.state().is_running()
    }

    /// Block until the module thread has returned.
    pub fn wait_finished(&self) {
        self.0.finished.wait();
    }

    pub fn wait_finished_timeout(&self, timeout: Duration) -> bool {
        self.0.finished.wait_timeout(timeout)
    }

    pub fn ptr_eq(&self, other: &ModuleHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{TypeTag, Update};
    use crate::module::plugin::{ModuleContext, ModulePlugin};

    struct Idle;

    impl ModulePlugin for Idle {
        fn on_data(&mut self, _ctx: &mut ModuleContext<'_>, _updates: &[Update]) -> Result<()> {
            Ok(())
        }
    }

    fn instance() -> ModuleInstance {
        ModuleInstance::new(ModuleInfo::new("Test"), AnyModule::plugin(Idle))
    }

    #[test]
    fn test_new_instance_is_unloaded() {
        let m = instance();
        assert_eq!(m.state(), ModuleState::Unloaded);
        assert_eq!(m.handle().id(), ModuleId::INVALID);
        assert!(m.handle().failure().is_none());
    }

    #[test]
    fn test_duplicate_connector_rejected() {
        let mut m = instance();
        m.register_input(ConnectorSpec::input("in", TypeTag::new("a")))
            .unwrap();
        m.register_output(ConnectorSpec::output("out", TypeTag::new("a")))
            .unwrap();

        assert!(matches!(
            m.register_input(ConnectorSpec::input("in", TypeTag::new("b"))),
            Err(KernelError::DuplicateConnector { .. })
        ));
        assert!(matches!(
            m.register_output(ConnectorSpec::output("in", TypeTag::new("a"))),
            Err(KernelError::DuplicateConnector { .. })
        ));
        assert_eq!(m.handle().inputs().len(), 1);
        assert_eq!(m.handle().outputs().len(), 1);
    }

    #[test]
    fn test_connector_direction_checked() {
        let mut m = instance();
        assert!(m
            .register_input(ConnectorSpec::output("x", TypeTag::new("a")))
            .is_err());
        assert!(m.handle().inputs().is_empty());
    }

    #[test]
    fn test_input_indices_follow_registration() {
        let mut m = instance();
        for name in ["a", "b", "c"] {
            m.register_input(ConnectorSpec::input(name, TypeTag::new("t")))
                .unwrap();
        }
        let indices: Vec<usize> = m.handle().inputs().iter().map(|i| i.index()).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_set_property_through_handle() {
        let mut m = instance();
        m.declare_property(PropertySpec::new("gain", 1.0)).unwrap();
        let h = m.handle();
        h.set_property("gain", 2.0).unwrap();
        assert_eq!(h.property("gain"), Some(PropertyValue::Float(2.0)));
        assert!(h.set_property("missing", 1.0).is_err());
    }

    #[test]
    fn test_custom_condition_unique() {
        let mut m = instance();
        let c = m.add_custom_condition("tick").unwrap();
        assert!(m.add_custom_condition("tick").is_err());
        c.notify();
        assert!(m.handle().custom_condition("tick").unwrap().is_fired());
    }

    #[test]
    fn test_teardown_clears_connectors() {
        let mut m = instance();
        m.register_input(ConnectorSpec::input("in", TypeTag::new("t")))
            .unwrap();
        let h = m.handle();
        h.0.disconnect_all();
        h.0.clear_connectors();
        assert!(h.input("in").is_none());
    }

    #[test]
    fn test_repeated_wait_ready_keeps_watchers_bounded() {
        let h = instance().handle();
        h.0.ready.notify();
        // Never started, so the wait returns at once but reports not ready.
        for _ in 0..500 {
            assert!(!h.wait_ready());
            assert!(!h.wait_ready_timeout(Duration::from_millis(1)));
        }
        assert_eq!(h.0.ready.watcher_count(), 0);
        assert!(h.0.finished.watcher_count() <= 1);
    }

    #[test]
    fn test_scene_nodes_tracked_without_container() {
        let handle = instance().handle();
        let core = &handle.0;
        let a = core.attach_to_scene("a".into(), String::new());
        core.attach_to_scene("b".into(), String::new());
        assert!(core.detach_from_scene(a));
        assert!(!core.detach_from_scene(a));
        assert_eq!(core.detach_all_scene_nodes(), 1);
    }
}
