//! Module capability interface.
//!
//! Two-layer design, as for connectors of the graph:
//! - **`ModulePlugin` trait** for modules defined outside the kernel.
//! - **`BuiltinModule` enum** for the modules shipped with the kernel, so the
//!   hot path is a plain `match`.
//!
//! `AnyModule` wraps either variant so the runner handles both uniformly.

use crate::error::{KernelError, Result};
use crate::graph::{InputConnector, ModuleId, OutputConnector, Payload, SceneNodeId, Update};
use crate::module::builtin::{PointRenderer, ScalarSource, Scale, Statistics};
use crate::module::instance::ModuleCore;
use crate::module::property::PropertyValue;
use std::any::Any;
use std::sync::Arc;

/// What a module sees of itself while one of its hooks runs.
pub struct ModuleContext<'a> {
    core: &'a ModuleCore,
}

impl<'a> ModuleContext<'a> {
    pub(crate) fn new(core: &'a ModuleCore) -> Self {
        Self { core }
    }

    pub fn module_id(&self) -> ModuleId {
        self.core.id()
    }

    pub fn name(&self) -> &str {
        &self.core.info.name
    }

    pub fn input(&self, name: &str) -> Option<Arc<InputConnector>> {
        self.core.input(name)
    }

    /// Latest data on input `name`, if present and of type `T`.
    pub fn input_data<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.core.input(name).and_then(|i| i.data_as::<T>())
    }

    pub fn output(&self, name: &str) -> Option<Arc<OutputConnector>> {
        self.core.output(name)
    }

    pub fn update_output(&self, name: &str, payload: Payload) -> Result<()> {
        self.require_output(name)?.update_data(payload)
    }

    /// Publish `value` on output `name` under the output's own tag.
    pub fn publish<T: Any + Send + Sync>(&self, name: &str, value: T) -> Result<()> {
        let output = self.require_output(name)?;
        output.update_data(Payload::tagged(output.tag().clone(), value))
    }

    fn require_output(&self, name: &str) -> Result<Arc<OutputConnector>> {
        self.core
            .output(name)
            .ok_or_else(|| KernelError::UnknownConnector {
                module: self.core.info.name.clone(),
                connector: name.to_string(),
                direction: "output",
            })
    }

    pub fn property(&self, name: &str) -> Option<PropertyValue> {
        self.core.properties.get(name)
    }

    /// Write one of this module's own properties without waking it again.
    pub fn set_property(&self, name: &str, value: impl Into<PropertyValue>) -> Result<()> {
        if self.core.properties.set_quiet(name, value.into())? {
            self.core.property_changed(name);
        }
        Ok(())
    }

    pub fn attach_to_scene(&self, label: impl Into<String>, detail: impl Into<String>) -> SceneNodeId {
        self.core.attach_to_scene(label.into(), detail.into())
    }

    /// Returns whether the node was attached by this module.
    pub fn detach_from_scene(&self, id: SceneNodeId) -> bool {
        self.core.detach_from_scene(id)
    }

    /// Long-running hooks should poll this and return early.
    pub fn shutdown_requested(&self) -> bool {
        self.core.shutdown.is_fired()
    }
}

/// Trait for modules defined outside the kernel.
pub trait ModulePlugin: Send {
    /// Called once on the module thread before the module becomes ready.
    fn on_activate(&mut self, _ctx: &mut ModuleContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Called with the updates pending at wake time, ordered by input
    /// registration index.
    fn on_data(&mut self, ctx: &mut ModuleContext<'_>, updates: &[Update]) -> Result<()>;

    /// Called once per changed property, before any data of the same wake.
    fn on_property_change(
        &mut self,
        _name: &str,
        _value: &PropertyValue,
        _ctx: &mut ModuleContext<'_>,
    ) -> Result<()> {
        Ok(())
    }

    /// Called when a custom condition registered by the module fired.
    fn on_custom(&mut self, _name: &str, _ctx: &mut ModuleContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Called once on the module thread when it stops.
    fn on_deactivate(&mut self, _ctx: &mut ModuleContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// Enum dispatch for built-in modules.
pub enum BuiltinModule {
    ScalarSource(ScalarSource),
    Scale(Scale),
    Statistics(Statistics),
    PointRenderer(PointRenderer),
}

impl BuiltinModule {
    pub fn on_activate(&mut self, ctx: &mut ModuleContext<'_>) -> Result<()> {
        match self {
            BuiltinModule::ScalarSource(m) => m.on_activate(ctx),
            BuiltinModule::Scale(m) => m.on_activate(ctx),
            BuiltinModule::Statistics(m) => m.on_activate(ctx),
            BuiltinModule::PointRenderer(m) => m.on_activate(ctx),
        }
    }

    pub fn on_data(&mut self, ctx: &mut ModuleContext<'_>, updates: &[Update]) -> Result<()> {
        match self {
            BuiltinModule::ScalarSource(m) => m.on_data(ctx, updates),
            BuiltinModule::Scale(m) => m.on_data(ctx, updates),
            BuiltinModule::Statistics(m) => m.on_data(ctx, updates),
            BuiltinModule::PointRenderer(m) => m.on_data(ctx, updates),
        }
    }

    pub fn on_property_change(
        &mut self,
        name: &str,
        value: &PropertyValue,
        ctx: &mut ModuleContext<'_>,
    ) -> Result<()> {
        match self {
            BuiltinModule::ScalarSource(m) => m.on_property_change(name, value, ctx),
            BuiltinModule::Scale(m) => m.on_property_change(name, value, ctx),
            BuiltinModule::Statistics(m) => m.on_property_change(name, value, ctx),
            BuiltinModule::PointRenderer(m) => m.on_property_change(name, value, ctx),
        }
    }

    pub fn on_custom(&mut self, name: &str, ctx: &mut ModuleContext<'_>) -> Result<()> {
        match self {
            BuiltinModule::ScalarSource(m) => m.on_custom(name, ctx),
            BuiltinModule::Scale(m) => m.on_custom(name, ctx),
            BuiltinModule::Statistics(m) => m.on_custom(name, ctx),
            BuiltinModule::PointRenderer(m) => m.on_custom(name, ctx),
        }
    }

    pub fn on_deactivate(&mut self, ctx: &mut ModuleContext<'_>) -> Result<()> {
        match self {
            BuiltinModule::ScalarSource(m) => m.on_deactivate(ctx),
            BuiltinModule::Scale(m) => m.on_deactivate(ctx),
            BuiltinModule::Statistics(m) => m.on_deactivate(ctx),
            BuiltinModule::PointRenderer(m) => m.on_deactivate(ctx),
        }
    }
}

/// Either a built-in module or a plugin.
pub enum AnyModule {
    Builtin(BuiltinModule),
    Plugin(Box<dyn ModulePlugin>),
}

impl AnyModule {
    pub fn plugin(plugin: impl ModulePlugin + 'static) -> Self {
        AnyModule::Plugin(Box::new(plugin))
    }

    pub fn on_activate(&mut self, ctx: &mut ModuleContext<'_>) -> Result<()> {
        match self {
            AnyModule::Builtin(m) => m.on_activate(ctx),
            AnyModule::Plugin(m) => m.on_activate(ctx),
        }
    }

    pub fn on_data(&mut self, ctx: &mut ModuleContext<'_>, updates: &[Update]) -> Result<()> {
        match self {
            AnyModule::Builtin(m) => m.on_data(ctx, updates),
            AnyModule::Plugin(m) => m.on_data(ctx, updates),
        }
    }

    pub fn on_property_change(
        &mut self,
        name: &str,
        value: &PropertyValue,
        ctx: &mut ModuleContext<'_>,
    ) -> Result<()> {
        match self {
            AnyModule::Builtin(m) => m.on_property_change(name, value, ctx),
            AnyModule::Plugin(m) => m.on_property_change(name, value, ctx),
        }
    }

    pub fn on_custom(&mut self, name: &str, ctx: &mut ModuleContext<'_>) -> Result<()> {
        match self {
            AnyModule::Builtin(m) => m.on_custom(name, ctx),
            AnyModule::Plugin(m) => m.on_custom(name, ctx),
        }
    }

    pub fn on_deactivate(&mut self, ctx: &mut ModuleContext<'_>) -> Result<()> {
        match self {
            AnyModule::Builtin(m) => m.on_deactivate(ctx),
            AnyModule::Plugin(m) => m.on_deactivate(ctx),
        }
    }
}

impl From<BuiltinModule> for AnyModule {
    fn from(m: BuiltinModule) -> Self {
        AnyModule::Builtin(m)
    }
}

