//! Typed connectors and the links between them.
//!
//! An input has at most one source; an output fans out to any number of
//! inputs. Links are weak in both directions, the owning module keeps the
//! strong references.
//!
//! Lock order is always `OutputConnector::state` -> `InputConnector::link`
//! -> the downstream [`Inbox`]. Every function here that touches both sides
//! follows it.

use crate::error::{KernelError, Result};
use crate::graph::data::{Payload, TypeTag};
use crate::graph::id::{Endpoint, ModuleId};
use crate::graph::inbox::{Inbox, Update};
use crate::sync::lock;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, Weak};

/// Whether a connector is an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorDirection {
    Input,
    Output,
}

impl ConnectorDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectorDirection::Input => "input",
            ConnectorDirection::Output => "output",
        }
    }
}

/// Declaration of a connector, as found on a prototype.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorSpec {
    pub name: String,
    pub description: String,
    pub direction: ConnectorDirection,
    pub tag: TypeTag,
}

impl ConnectorSpec {
    pub fn input(name: impl Into<String>, tag: TypeTag) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            direction: ConnectorDirection::Input,
            tag,
        }
    }

    pub fn output(name: impl Into<String>, tag: TypeTag) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            direction: ConnectorDirection::Output,
            tag,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// The module a connector belongs to, shared by all of its connectors.
///
/// The id stays [`ModuleId::INVALID`] until a container adopts the module.
#[derive(Debug)]
pub struct ConnectorOwner {
    name: String,
    id: OnceLock<ModuleId>,
}

impl ConnectorOwner {
    pub(crate) fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            id: OnceLock::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> ModuleId {
        self.id.get().copied().unwrap_or(ModuleId::INVALID)
    }

    pub(crate) fn set_id(&self, id: ModuleId) -> bool {
        self.id.set(id).is_ok()
    }
}

/// A link cut by `disconnect_all`, as `(output, input)`.
pub type CutLink = (Endpoint, Endpoint);

struct InputLink {
    source: Option<Weak<OutputConnector>>,
    current: Option<Payload>,
}

pub struct InputConnector {
    name: String,
    description: String,
    tag: TypeTag,
    index: usize,
    owner: Arc<ConnectorOwner>,
    inbox: Weak<Inbox>,
    link: Mutex<InputLink>,
}

impl InputConnector {
    pub(crate) fn new(
        spec: &ConnectorSpec,
        index: usize,
        owner: &Arc<ConnectorOwner>,
        inbox: &Arc<Inbox>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: spec.name.clone(),
            description: spec.description.clone(),
            tag: spec.tag.clone(),
            index,
            owner: owner.clone(),
            inbox: Arc::downgrade(inbox),
            link: Mutex::new(InputLink {
                source: None,
                current: None,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn tag(&self) -> &TypeTag {
        &self.tag
    }

    /// Registration index within the owning module.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn module_name(&self) -> &str {
        self.owner.name()
    }

    pub fn module_id(&self) -> ModuleId {
        self.owner.id()
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.owner.id(), self.name.clone())
    }

    /// `Module:connector`, used in diagnostics.
    pub fn canonical_name(&self) -> String {
        format!("{}:{}", self.owner.name(), self.name)
    }

    /// Latest data delivered to this input, if any.
    pub fn data(&self) -> Option<Payload> {
        lock(&self.link).current.clone()
    }

    pub fn data_as<T: std::any::Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.data().and_then(|p| p.downcast::<T>())
    }

    pub fn source(&self) -> Option<Arc<OutputConnector>> {
        lock(&self.link).source.as_ref().and_then(Weak::upgrade)
    }

    pub fn is_connected(&self) -> bool {
        self.source().is_some()
    }

    fn deliver(&self, link: &mut InputLink, payload: Option<Payload>) {
        link.current = payload.clone();
        if let Some(inbox) = self.inbox.upgrade() {
            inbox.push(Update {
                input: self.index,
                connector: self.name.clone(),
                payload,
            });
        }
    }

    /// Drop the link to this input's source, if any. Returns the link cut,
    /// unless the source was already gone.
    pub fn disconnect_all(self: &Arc<Self>) -> Option<CutLink> {
        let source = lock(&self.link).source.as_ref().and_then(Weak::upgrade);
        match source {
            Some(output) => disconnect(&output, self)
                .ok()
                .map(|()| (output.endpoint(), self.endpoint())),
            None => {
                let mut link = lock(&self.link);
                if link.source.take().is_some() {
                    self.deliver(&mut link, None);
                }
                None
            }
        }
    }
}

impl fmt::Debug for InputConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputConnector")
            .field("name", &self.canonical_name())
            .field("tag", &self.tag)
            .field("connected", &self.is_connected())
            .finish()
    }
}

struct OutputState {
    data: Option<Payload>,
    targets: Vec<Weak<InputConnector>>,
}

pub struct OutputConnector {
    name: String,
    description: String,
    tag: TypeTag,
    index: usize,
    owner: Arc<ConnectorOwner>,
    state: Mutex<OutputState>,
}

impl OutputConnector {
    pub(crate) fn new(spec: &ConnectorSpec, index: usize, owner: &Arc<ConnectorOwner>) -> Arc<Self> {
        Arc::new(Self {
            name: spec.name.clone(),
            description: spec.description.clone(),
            tag: spec.tag.clone(),
            index,
            owner: owner.clone(),
            state: Mutex::new(OutputState {
                data: None,
                targets: Vec::new(),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn tag(&self) -> &TypeTag {
        &self.tag
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn module_name(&self) -> &str {
        self.owner.name()
    }

    pub fn module_id(&self) -> ModuleId {
        self.owner.id()
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.owner.id(), self.name.clone())
    }

    pub fn canonical_name(&self) -> String {
        format!("{}:{}", self.owner.name(), self.name)
    }

    pub fn data(&self) -> Option<Payload> {
        lock(&self.state).data.clone()
    }

    /// Inputs currently fed by this output, in connection order.
    pub fn targets(&self) -> Vec<Arc<InputConnector>> {
        lock(&self.state)
            .targets
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    pub fn is_connected_to(&self, input: &Arc<InputConnector>) -> bool {
        lock(&self.state)
            .targets
            .iter()
            .any(|t| std::ptr::eq(t.as_ptr(), Arc::as_ptr(input)))
    }

    /// Replace the published data and queue it on every connected input.
    ///
    /// Never blocks on downstream processing. Deliveries happen under this
    /// output's lock, so each input sees updates in call order.
    pub fn update_data(&self, payload: Payload) -> Result<()> {
        if payload.tag() != &self.tag {
            return Err(KernelError::TypeMismatch {
                output: self.canonical_name(),
                output_tag: self.tag.to_string(),
                input: "payload".to_string(),
                input_tag: payload.tag().to_string(),
            });
        }

        let mut state = lock(&self.state);
        state.data = Some(payload.clone());
        state.targets.retain(|t| t.strong_count() > 0);
        for target in state.targets.iter().filter_map(Weak::upgrade) {
            let mut link = lock(&target.link);
            target.deliver(&mut link, Some(payload.clone()));
        }
        Ok(())
    }

    /// Unlink every input fed by this output. Each one observes absent data.
    /// Returns the links cut, in connection order.
    pub fn disconnect_all(self: &Arc<Self>) -> Vec<CutLink> {
        let mut cut = Vec::new();
        let mut state = lock(&self.state);
        let targets = std::mem::take(&mut state.targets);
        for target in targets.iter().filter_map(Weak::upgrade) {
            let mut link = lock(&target.link);
            if link
                .source
                .as_ref()
                .is_some_and(|s| std::ptr::eq(s.as_ptr(), Arc::as_ptr(self)))
            {
                link.source = None;
                target.deliver(&mut link, None);
                cut.push((self.endpoint(), target.endpoint()));
            }
        }
        if !cut.is_empty() {
            tracing::debug!("Disconnected {} input(s) from {}", cut.len(), self.canonical_name());
        }
        cut
    }
}

impl fmt::Debug for OutputConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputConnector")
            .field("name", &self.canonical_name())
            .field("tag", &self.tag)
            .field("targets", &self.targets().len())
            .finish()
    }
}

/// Whether `connect(output, input)` would currently succeed.
pub fn can_connect(output: &OutputConnector, input: &InputConnector) -> bool {
    output.tag == input.tag && !input.is_connected()
}

/// Link `output` to `input` and deliver the output's current data, if any.
///
/// Fails without touching either side when the tags differ or when the input
/// already has a source.
pub fn connect(output: &Arc<OutputConnector>, input: &Arc<InputConnector>) -> Result<()> {
    if output.tag != input.tag {
        return Err(KernelError::TypeMismatch {
            output: output.canonical_name(),
            output_tag: output.tag.to_string(),
            input: input.canonical_name(),
            input_tag: input.tag.to_string(),
        });
    }

    let mut state = lock(&output.state);
    let mut link = lock(&input.link);
    if let Some(existing) = link.source.as_ref().and_then(Weak::upgrade) {
        return Err(KernelError::InputAlreadyConnected {
            input: input.canonical_name(),
            source_name: existing.canonical_name(),
        });
    }

    link.source = Some(Arc::downgrade(output));
    state.targets.retain(|t| t.strong_count() > 0);
    state.targets.push(Arc::downgrade(input));
    tracing::debug!(
        "Connected {} -> {}",
        output.canonical_name(),
        input.canonical_name()
    );

    if let Some(data) = state.data.clone() {
        input.deliver(&mut link, Some(data));
    }
    Ok(())
}

/// Remove the link between `output` and `input`. The input observes absent
/// data.
pub fn disconnect(output: &Arc<OutputConnector>, input: &Arc<InputConnector>) -> Result<()> {
    let mut state = lock(&output.state);
    let mut link = lock(&input.link);
    let linked = link
        .source
        .as_ref()
        .is_some_and(|s| std::ptr::eq(s.as_ptr(), Arc::as_ptr(output)));
    if !linked {
        return Err(KernelError::NotConnected {
            output: output.canonical_name(),
            input: input.canonical_name(),
        });
    }

    link.source = None;
    state
        .targets
        .retain(|t| t.strong_count() > 0 && !std::ptr::eq(t.as_ptr(), Arc::as_ptr(input)));
    input.deliver(&mut link, None);
    tracing::debug!(
        "Disconnected {} -> {}",
        output.canonical_name(),
        input.canonical_name()
    );
    Ok(())
}
