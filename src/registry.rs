//! Module prototypes and the registry that creates instances from them.
//!
//! There is no global registry: one is built at start-up and handed to the
//! kernel, tests build their own.

use crate::error::{KernelError, Result};
use crate::graph::{ConnectorSpec, TypeTag};
use crate::module::builtin::register_builtins;
use crate::module::{AnyModule, ModuleHandle, ModuleInfo, ModuleInstance, PropertySpec};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Creates the logic of a fresh module.
pub type ModuleFactory = Arc<dyn Fn() -> AnyModule + Send + Sync>;

/// Immutable template of a module type.
#[derive(Clone)]
pub struct ModulePrototype {
    info: ModuleInfo,
    inputs: Vec<ConnectorSpec>,
    outputs: Vec<ConnectorSpec>,
    properties: Vec<PropertySpec>,
    custom_conditions: Vec<String>,
    factory: ModuleFactory,
}

impl ModulePrototype {
    pub fn builder(name: impl Into<String>) -> ModulePrototypeBuilder {
        ModulePrototypeBuilder {
            info: ModuleInfo::new(name),
            inputs: Vec::new(),
            outputs: Vec::new(),
            properties: Vec::new(),
            custom_conditions: Vec::new(),
        }
    }

    pub fn info(&self) -> &ModuleInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn description(&self) -> &str {
        &self.info.description
    }

    pub fn icon(&self) -> Option<&str> {
        self.info.icon.as_deref()
    }

    pub fn inputs(&self) -> &[ConnectorSpec] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[ConnectorSpec] {
        &self.outputs
    }

    pub fn properties(&self) -> &[PropertySpec] {
        &self.properties
    }

    /// A fresh, unstarted instance with every declared connector, property
    /// and custom condition registered.
    pub fn create(&self) -> Result<ModuleInstance> {
        let mut instance = ModuleInstance::new(self.info.clone(), (self.factory)());
        for spec in &self.inputs {
            instance.register_input(spec.clone())?;
        }
        for spec in &self.outputs {
            instance.register_output(spec.clone())?;
        }
        for spec in &self.properties {
            instance.declare_property(spec.clone())?;
        }
        for name in &self.custom_conditions {
            instance.add_custom_condition(name.clone())?;
        }
        Ok(instance)
    }
}

impl fmt::Debug for ModulePrototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModulePrototype")
            .field("info", &self.info)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("properties", &self.properties.len())
            .finish()
    }
}

pub struct ModulePrototypeBuilder {
    info: ModuleInfo,
    inputs: Vec<ConnectorSpec>,
    outputs: Vec<ConnectorSpec>,
    properties: Vec<PropertySpec>,
    custom_conditions: Vec<String>,
}

impl ModulePrototypeBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.info.description = description.into();
        self
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.info.icon = Some(icon.into());
        self
    }

    pub fn input(mut self, spec: ConnectorSpec) -> Self {
        self.inputs.push(spec);
        self
    }

    pub fn output(mut self, spec: ConnectorSpec) -> Self {
        self.outputs.push(spec);
        self
    }

    pub fn property(mut self, spec: PropertySpec) -> Self {
        self.properties.push(spec);
        self
    }

    pub fn custom_condition(mut self, name: impl Into<String>) -> Self {
        self.custom_conditions.push(name.into());
        self
    }

    /// Finish the prototype. Declarations are validated by creating one
    /// throwaway instance, so a prototype that builds always creates.
    pub fn build<F>(self, factory: F) -> Result<ModulePrototype>
    where
        F: Fn() -> AnyModule + Send + Sync + 'static,
    {
        let prototype = ModulePrototype {
            info: self.info,
            inputs: self.inputs,
            outputs: self.outputs,
            properties: self.properties,
            custom_conditions: self.custom_conditions,
            factory: Arc::new(factory),
        };
        prototype.create()?;
        Ok(prototype)
    }
}

/// Restricts which prototypes may be instantiated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleFilter {
    allowed: Vec<String>,
    ignore: bool,
}

impl ModuleFilter {
    /// An empty allow-list, or `ignore`, admits everything.
    pub fn new(allowed: Vec<String>, ignore: bool) -> Self {
        Self { allowed, ignore }
    }

    pub fn permits(&self, name: &str) -> bool {
        self.ignore || self.allowed.is_empty() || self.allowed.iter().any(|a| a == name)
    }
}

/// A prototype that fits next to a module, with the `(output, input)`
/// connector pairs that would link them.
#[derive(Debug, Clone)]
pub struct CompatiblePrototype {
    pub prototype: Arc<ModulePrototype>,
    pub connections: Vec<(String, String)>,
}

/// Mapping from prototype name to prototype, in registration order.
#[derive(Default)]
pub struct ModuleRegistry {
    prototypes: Vec<Arc<ModulePrototype>>,
    by_name: HashMap<String, usize>,
    filter: ModuleFilter,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in modules.
    pub fn with_builtins() -> Result<Self> {
        let mut registry = Self::new();
        register_builtins(&mut registry)?;
        Ok(registry)
    }

    /// Fails if the name is taken; the existing prototype is kept.
    pub fn register(&mut self, prototype: ModulePrototype) -> Result<()> {
        if self.by_name.contains_key(prototype.name()) {
            return Err(KernelError::DuplicatePrototype(prototype.name().to_string()));
        }
        tracing::debug!("Registered module prototype \"{}\"", prototype.name());
        self.by_name
            .insert(prototype.name().to_string(), self.prototypes.len());
        self.prototypes.push(Arc::new(prototype));
        Ok(())
    }

    pub fn get_prototype_by_name(&self, name: &str) -> Option<Arc<ModulePrototype>> {
        self.by_name.get(name).map(|&i| self.prototypes[i].clone())
    }

    pub fn prototypes(&self) -> &[Arc<ModulePrototype>] {
        &self.prototypes
    }

    pub fn names(&self) -> Vec<String> {
        self.prototypes.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.prototypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prototypes.is_empty()
    }

    pub fn set_filter(&mut self, filter: ModuleFilter) {
        self.filter = filter;
    }

    pub fn filter(&self) -> &ModuleFilter {
        &self.filter
    }

    /// Create an unstarted instance of the named prototype.
    pub fn create(&self, name: &str) -> Result<ModuleInstance> {
        let prototype = self
            .get_prototype_by_name(name)
            .ok_or_else(|| KernelError::UnknownPrototype(name.to_string()))?;
        if !self.filter.permits(name) {
            return Err(KernelError::ModuleNotAllowed(name.to_string()));
        }
        tracing::debug!("Creating module \"{}\"", name);
        prototype.create()
    }

    /// Prototypes that can be added next to `module`: those without inputs
    /// first, then those with an input matching one of the module's outputs.
    pub fn compatible_prototypes(&self, module: Option<&ModuleHandle>) -> Vec<CompatiblePrototype> {
        let allowed = || {
            self.prototypes
                .iter()
                .filter(|p| self.filter.permits(p.name()))
        };

        let mut result: Vec<CompatiblePrototype> = allowed()
            .filter(|p| p.inputs().is_empty())
            .map(|p| CompatiblePrototype {
                prototype: p.clone(),
                connections: Vec::new(),
            })
            .collect();

        if let Some(module) = module {
            let outputs: Vec<(String, TypeTag)> = module
                .outputs()
                .iter()
                .map(|o| (o.name().to_string(), o.tag().clone()))
                .collect();
            for prototype in allowed().filter(|p| !p.inputs().is_empty()) {
                let connections: Vec<(String, String)> = outputs
                    .iter()
                    .flat_map(|(out, tag)| {
                        prototype
                            .inputs()
                            .iter()
                            .filter(move |i| i.tag == *tag)
                            .map(move |i| (out.clone(), i.name.clone()))
                    })
                    .collect();
                if !connections.is_empty() {
                    result.push(CompatiblePrototype {
                        prototype: prototype.clone(),
                        connections,
                    });
                }
            }
        }
        result
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("prototypes", &self.names())
            .field("filter", &self.filter)
            .finish()
    }
}
