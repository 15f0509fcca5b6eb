//! Project files: a saved module graph.
//!
//! A project lists the modules by prototype name, the property values to
//! restore and the links between them. Module ids inside a project are local
//! to the file; applying it assigns fresh container ids.
//!
//! Like the kernel configuration, projects are TOML unless the path ends in
//! `.json`.
//!
//! ```toml
//! [[modules]]
//! id = 0
//! name = "Scalar Source"
//!
//! [[modules]]
//! id = 1
//! name = "Scale"
//!
//! [[properties]]
//! module = 1
//! name = "factor"
//! value = 2.5
//!
//! [[connections]]
//! from = { module = 0, connector = "values" }
//! to = { module = 1, connector = "in" }
//! ```

use crate::container::ModuleContainer;
use crate::error::{KernelError, Result};
use crate::graph::{Endpoint, ModuleId};
use crate::module::PropertyValue;
use crate::registry::ModuleRegistry;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// A module to create, by prototype name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectModule {
    pub id: ModuleId,
    pub name: String,
}

/// A property value to restore on a project module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectProperty {
    pub module: ModuleId,
    pub name: String,
    pub value: PropertyValue,
}

/// A link between two project modules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConnection {
    pub from: Endpoint,
    pub to: Endpoint,
}

/// A saved module graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectFile {
    #[serde(default)]
    pub modules: Vec<ProjectModule>,

    #[serde(default)]
    pub properties: Vec<ProjectProperty>,

    #[serde(default)]
    pub connections: Vec<ProjectConnection>,
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

impl ProjectFile {
    /// Load from `path`; the format follows the extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| KernelError::Io(e).with_context(format!("Failed to read project {:?}", path)))?;

        let project: Self = if is_json(path) {
            serde_json::from_str(&content)
                .map_err(|e| KernelError::Project(format!("Failed to parse project {:?}: {}", path, e)))?
        } else {
            toml::from_str(&content)
                .map_err(|e| KernelError::Project(format!("Failed to parse project {:?}: {}", path, e)))?
        };
        project.validate()?;
        Ok(project)
    }

    /// Save to `path`, creating the parent directory
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                KernelError::Io(e).with_context(format!("Failed to create project directory {:?}", parent))
            })?;
        }

        let content = if is_json(path) {
            serde_json::to_string_pretty(self)
                .map_err(|e| KernelError::Project(format!("Failed to serialize project: {}", e)))?
        } else {
            toml::to_string_pretty(self)
                .map_err(|e| KernelError::Project(format!("Failed to serialize project: {}", e)))?
        };

        std::fs::write(path, content)
            .map_err(|e| KernelError::Io(e).with_context(format!("Failed to write project {:?}", path)))
    }

    /// Module ids are unique and every property and connection names one of
    /// them.
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for module in &self.modules {
            if !ids.insert(module.id) {
                return Err(KernelError::Project(format!(
                    "module id {} is used twice",
                    module.id.0
                )));
            }
        }
        for property in &self.properties {
            if !ids.contains(&property.module) {
                return Err(KernelError::Project(format!(
                    "property \"{}\" refers to unknown module {}",
                    property.name, property.module.0
                )));
            }
        }
        for connection in &self.connections {
            for end in [&connection.from, &connection.to] {
                if !ids.contains(&end.module) {
                    return Err(KernelError::Project(format!(
                        "connection {} -> {} refers to unknown module {}",
                        connection.from, connection.to, end.module.0
                    )));
                }
            }
        }
        Ok(())
    }
}

impl ModuleContainer {
    /// Snapshot of the live graph. Project ids are the container ids.
    pub fn save_project(&self) -> ProjectFile {
        let modules = self.modules();
        let live: HashSet<ModuleId> = modules.iter().map(|(id, _)| *id).collect();
        let mut project = ProjectFile::default();

        for (id, handle) in &modules {
            project.modules.push(ProjectModule {
                id: *id,
                name: handle.name().to_string(),
            });
            project
                .properties
                .extend(handle.properties().into_iter().map(|(name, value)| ProjectProperty {
                    module: *id,
                    name,
                    value,
                }));
            for output in handle.outputs() {
                for target in output.targets() {
                    if live.contains(&target.module_id()) {
                        project.connections.push(ProjectConnection {
                            from: output.endpoint(),
                            to: target.endpoint(),
                        });
                    }
                }
            }
        }
        project
    }

    /// Recreate a saved graph next to the existing modules. Returns the new
    /// ids in project order.
    ///
    /// Either the whole project is applied or nothing is: if any module,
    /// property or connection fails, the modules added so far are removed.
    pub fn apply_project(&mut self, registry: &ModuleRegistry, project: &ProjectFile) -> Result<Vec<ModuleId>> {
        project.validate()?;

        let mut instances = Vec::with_capacity(project.modules.len());
        for module in &project.modules {
            let instance = registry.create(&module.name).map_err(|e| {
                e.with_context(format!("Project module {} \"{}\"", module.id.0, module.name))
            })?;
            let handle = instance.handle();
            for property in project.properties.iter().filter(|p| p.module == module.id) {
                handle
                    .set_property(&property.name, property.value.clone())
                    .map_err(|e| e.with_context(format!("Project module {}", module.id.0)))?;
            }
            instances.push((module.id, instance));
        }

        let mut ids: BTreeMap<ModuleId, ModuleId> = BTreeMap::new();
        let mut added = Vec::with_capacity(instances.len());
        for (local, instance) in instances {
            match self.add(instance) {
                Ok(id) => {
                    ids.insert(local, id);
                    added.push(id);
                }
                Err(e) => {
                    self.roll_back(&added);
                    return Err(e);
                }
            }
        }

        for connection in &project.connections {
            let (Some(&from), Some(&to)) = (ids.get(&connection.from.module), ids.get(&connection.to.module)) else {
                continue;
            };
            if let Err(e) = self.connect(from, &connection.from.connector, to, &connection.to.connector) {
                self.roll_back(&added);
                return Err(e.with_context(format!(
                    "Project connection {} -> {}",
                    connection.from, connection.to
                )));
            }
        }

        tracing::info!(
            "Applied project with {} module(s) and {} connection(s)",
            added.len(),
            project.connections.len()
        );
        Ok(added)
    }

    fn roll_back(&mut self, added: &[ModuleId]) {
        tracing::warn!("Rolling back {} project module(s)", added.len());
        for id in added.iter().rev() {
            // Ignore the removal result: the module was added by this call.
            let _ = self.remove(*id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::module::builtin::{SCALAR_SOURCE, SCALE, STATISTICS};
    use crate::scene::NullScene;
    use std::sync::Arc;

    fn setup() -> (ModuleRegistry, ModuleContainer) {
        let registry = ModuleRegistry::with_builtins().unwrap();
        let container = ModuleContainer::new(EventBus::default(), Arc::new(NullScene));
        (registry, container)
    }

    fn chain(container: &mut ModuleContainer, registry: &ModuleRegistry) -> (ModuleId, ModuleId) {
        let source = container.add(registry.create(SCALAR_SOURCE).unwrap()).unwrap();
        let scale = container.apply_module(registry, source, SCALE).unwrap();
        container.module(scale).unwrap().set_property("factor", 2.5).unwrap();
        container.module(source).unwrap().set_property("count", 8i64).unwrap();
        (source, scale)
    }

    #[test]
    fn test_save_lists_modules_properties_and_links() {
        let (registry, mut container) = setup();
        let (source, scale) = chain(&mut container, &registry);

        let project = container.save_project();
        let names: Vec<&str> = project.modules.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec![SCALAR_SOURCE, SCALE]);
        assert!(project.properties.contains(&ProjectProperty {
            module: scale,
            name: "factor".into(),
            value: PropertyValue::Float(2.5),
        }));
        assert!(project.properties.contains(&ProjectProperty {
            module: source,
            name: "count".into(),
            value: PropertyValue::Int(8),
        }));
        assert_eq!(
            project.connections,
            vec![ProjectConnection {
                from: Endpoint::new(source, "values"),
                to: Endpoint::new(scale, "in"),
            }]
        );
    }

    #[test]
    fn test_file_round_trip_restores_graph() {
        let (registry, mut container) = setup();
        chain(&mut container, &registry);
        let saved = container.save_project();

        let dir = tempfile::tempdir().unwrap();
        for file in ["graph.toml", "nested/graph.json"] {
            let path = dir.path().join(file);
            saved.save(&path).unwrap();
            assert_eq!(ProjectFile::load(&path).unwrap(), saved);
        }

        let (_, mut restored) = setup();
        let project = ProjectFile::load(dir.path().join("graph.toml")).unwrap();
        let ids = restored.apply_project(&registry, &project).unwrap();
        assert_eq!(ids.len(), 2);

        let scale = restored.module(ids[1]).unwrap();
        assert_eq!(scale.property("factor"), Some(PropertyValue::Float(2.5)));
        let input = scale.input("in").unwrap();
        assert!(input.is_connected());
        assert_eq!(input.source().unwrap().module_id(), ids[0]);
    }

    #[test]
    fn test_apply_assigns_fresh_ids() {
        let (registry, mut container) = setup();
        let (source, _) = chain(&mut container, &registry);
        let project = container.save_project();

        let ids = container.apply_project(&registry, &project).unwrap();
        assert_eq!(container.len(), 4);
        assert!(ids.iter().all(|id| *id > source));
    }

    #[test]
    fn test_failed_connection_rolls_back() {
        let (registry, mut container) = setup();
        let existing = container.add(registry.create(SCALE).unwrap()).unwrap();
        let project = ProjectFile {
            modules: vec![
                ProjectModule { id: ModuleId(0), name: SCALAR_SOURCE.into() },
                ProjectModule { id: ModuleId(1), name: STATISTICS.into() },
            ],
            properties: Vec::new(),
            connections: vec![ProjectConnection {
                from: Endpoint::new(ModuleId(0), "values"),
                to: Endpoint::new(ModuleId(1), "missing"),
            }],
        };

        let err = container.apply_project(&registry, &project).unwrap_err();
        assert!(matches!(err.root(), KernelError::UnknownConnector { .. }));
        assert_eq!(container.ids(), vec![existing]);
    }

    #[test]
    fn test_bad_property_adds_nothing() {
        let (registry, mut container) = setup();
        let project = ProjectFile {
            modules: vec![ProjectModule { id: ModuleId(3), name: SCALE.into() }],
            properties: vec![ProjectProperty {
                module: ModuleId(3),
                name: "factor".into(),
                value: PropertyValue::String("loud".into()),
            }],
            connections: Vec::new(),
        };

        let err = container.apply_project(&registry, &project).unwrap_err();
        assert!(matches!(err.root(), KernelError::PropertyType { .. }));
        assert!(container.is_empty());
    }

    #[test]
    fn test_validate_rejects_dangling_references() {
        let (registry, mut container) = setup();
        let duplicate = ProjectFile {
            modules: vec![
                ProjectModule { id: ModuleId(0), name: SCALE.into() },
                ProjectModule { id: ModuleId(0), name: SCALE.into() },
            ],
            ..ProjectFile::default()
        };
        assert!(matches!(duplicate.validate(), Err(KernelError::Project(_))));

        let dangling = ProjectFile {
            modules: vec![ProjectModule { id: ModuleId(0), name: SCALE.into() }],
            connections: vec![ProjectConnection {
                from: Endpoint::new(ModuleId(0), "out"),
                to: Endpoint::new(ModuleId(9), "in"),
            }],
            ..ProjectFile::default()
        };
        assert!(matches!(
            container.apply_project(&registry, &dangling),
            Err(KernelError::Project(_))
        ));
        assert!(container.is_empty());
    }

    #[test]
    fn test_unknown_prototype_adds_nothing() {
        let (registry, mut container) = setup();
        let project = ProjectFile {
            modules: vec![
                ProjectModule { id: ModuleId(0), name: SCALE.into() },
                ProjectModule { id: ModuleId(1), name: "Volume Renderer".into() },
            ],
            ..ProjectFile::default()
        };
        let err = container.apply_project(&registry, &project).unwrap_err();
        assert!(matches!(err.root(), KernelError::UnknownPrototype(_)));
        assert!(container.is_empty());
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[[modules]\n").unwrap();
        assert!(matches!(ProjectFile::load(&path), Err(KernelError::Project(_))));
    }
}
