//! Rhai engine wired to a running kernel

use crate::error::{KernelError, Result};
use crate::graph::{Endpoint, ModuleId};
use crate::kernel::KernelHandle;
use crate::module::PropertyValue;
use rhai::{Array, Dynamic, Engine, EvalAltResult, ImmutableString, Map, AST};
use std::path::Path;

type RhaiResult<T> = std::result::Result<T, Box<EvalAltResult>>;

fn script_error(err: KernelError) -> Box<EvalAltResult> {
    err.to_string().into()
}

fn module_id(id: i64) -> RhaiResult<ModuleId> {
    ModuleId::try_from(id).map_err(script_error)
}

fn endpoint(id: i64, connector: &str) -> RhaiResult<Endpoint> {
    Ok(Endpoint::new(module_id(id)?, connector))
}

/// Convert a property value into a script value
pub fn to_dynamic(value: PropertyValue) -> Dynamic {
    match value {
        PropertyValue::Bool(b) => Dynamic::from(b),
        PropertyValue::Int(i) => Dynamic::from(i),
        PropertyValue::Float(f) => Dynamic::from(f),
        PropertyValue::String(s) => Dynamic::from(s),
    }
}

/// Script engine exposing container operations
pub struct ScriptBridge {
    engine: Engine,
}

impl ScriptBridge {
    /// Create an engine whose functions act on `kernel`
    pub fn new(kernel: KernelHandle) -> Self {
        let mut engine = Engine::new();
        Self::configure_engine(&mut engine, kernel);
        Self { engine }
    }

    fn configure_engine(engine: &mut Engine, kernel: KernelHandle) {
        // Waiting on modules costs no operations, so the budget only bounds
        // runaway loops.
        engine.set_max_expr_depths(64, 64);
        engine.set_max_call_levels(32);
        engine.set_max_operations(1_000_000);
        engine.set_max_string_size(10_000);
        engine.set_max_array_size(10_000);
        engine.set_max_map_size(1_000);

        engine.on_print(|text| tracing::info!(target: "vizkernel::script", "{}", text));
        engine.on_debug(|text, source, pos| {
            tracing::debug!(target: "vizkernel::script", "{} @ {:?} {}", source.unwrap_or("script"), pos, text)
        });

        // ===== Registry =====

        {
            let k = kernel.clone();
            engine.register_fn("prototypes", move || -> RhaiResult<Array> {
                let infos = k.prototypes().map_err(script_error)?;
                Ok(infos.into_iter().map(|i| Dynamic::from(i.name)).collect())
            });
        }

        // ===== Container =====

        {
            let k = kernel.clone();
            engine.register_fn("create", move |name: ImmutableString| -> RhaiResult<i64> {
                let id = k.create(name.as_str()).map_err(script_error)?;
                Ok(i64::from(id.0))
            });
        }
        {
            let k = kernel.clone();
            engine.register_fn("remove", move |id: i64| -> RhaiResult<()> {
                k.remove(module_id(id)?).map_err(script_error)
            });
        }
        {
            let k = kernel.clone();
            engine.register_fn(
                "connect",
                move |out_id: i64, output: ImmutableString, in_id: i64, input: ImmutableString| -> RhaiResult<()> {
                    k.connect(endpoint(out_id, output.as_str())?, endpoint(in_id, input.as_str())?)
                        .map_err(script_error)
                },
            );
        }
        {
            let k = kernel.clone();
            engine.register_fn(
                "disconnect",
                move |out_id: i64, output: ImmutableString, in_id: i64, input: ImmutableString| -> RhaiResult<()> {
                    k.disconnect(endpoint(out_id, output.as_str())?, endpoint(in_id, input.as_str())?)
                        .map_err(script_error)
                },
            );
        }
        {
            let k = kernel.clone();
            engine.register_fn("apply", move |on: i64, name: ImmutableString| -> RhaiResult<i64> {
                let id = k.apply(module_id(on)?, name.as_str()).map_err(script_error)?;
                Ok(i64::from(id.0))
            });
        }
        {
            let k = kernel.clone();
            engine.register_fn("modules", move || -> RhaiResult<Array> {
                let statuses = k.modules().map_err(script_error)?;
                Ok(statuses
                    .into_iter()
                    .map(|status| {
                        let mut map = Map::new();
                        map.insert("id".into(), Dynamic::from(i64::from(status.id.0)));
                        map.insert("name".into(), Dynamic::from(status.name));
                        map.insert("state".into(), Dynamic::from(status.state.as_str().to_string()));
                        map.insert(
                            "error".into(),
                            status
                                .error
                                .map(|f| Dynamic::from(f.message))
                                .unwrap_or(Dynamic::UNIT),
                        );
                        Dynamic::from_map(map)
                    })
                    .collect())
            });
        }
        {
            let k = kernel.clone();
            engine.register_fn("wait_ready", move |id: i64| -> RhaiResult<bool> {
                Ok(k.module(module_id(id)?).map_err(script_error)?.wait_ready())
            });
        }

        // ===== Projects =====

        {
            let k = kernel.clone();
            engine.register_fn("save_project", move |path: ImmutableString| -> RhaiResult<()> {
                k.save_project_file(path.as_str()).map_err(script_error)
            });
        }
        {
            let k = kernel.clone();
            engine.register_fn("load_project", move |path: ImmutableString| -> RhaiResult<Array> {
                let ids = k.load_project_file(path.as_str()).map_err(script_error)?;
                Ok(ids.into_iter().map(|id| Dynamic::from(i64::from(id.0))).collect())
            });
        }

        // ===== Properties =====

        {
            let k = kernel.clone();
            engine.register_fn(
                "set_property",
                move |id: i64, name: ImmutableString, value: bool| -> RhaiResult<()> {
                    k.set_property(module_id(id)?, name.as_str(), value).map_err(script_error)
                },
            );
        }
        {
            let k = kernel.clone();
            engine.register_fn(
                "set_property",
                move |id: i64, name: ImmutableString, value: i64| -> RhaiResult<()> {
                    k.set_property(module_id(id)?, name.as_str(), value).map_err(script_error)
                },
            );
        }
        {
            let k = kernel.clone();
            engine.register_fn(
                "set_property",
                move |id: i64, name: ImmutableString, value: f64| -> RhaiResult<()> {
                    k.set_property(module_id(id)?, name.as_str(), value).map_err(script_error)
                },
            );
        }
        {
            let k = kernel.clone();
            engine.register_fn(
                "set_property",
                move |id: i64, name: ImmutableString, value: ImmutableString| -> RhaiResult<()> {
                    k.set_property(module_id(id)?, name.as_str(), value.to_string())
                        .map_err(script_error)
                },
            );
        }
        {
            let k = kernel;
            engine.register_fn(
                "get_property",
                move |id: i64, name: ImmutableString| -> RhaiResult<Dynamic> {
                    let value = k.property(module_id(id)?, name.as_str()).map_err(script_error)?;
                    Ok(to_dynamic(value))
                },
            );
        }
    }

    /// Compile without running, to report syntax errors early
    pub fn compile(&self, source: &str) -> Result<AST> {
        self.engine
            .compile(source)
            .map_err(|e| KernelError::Script(format!("Compilation error: {}", e)))
    }

    /// Run a script and return its final value
    pub fn run(&self, source: &str) -> Result<Dynamic> {
        let ast = self.compile(source)?;
        self.engine
            .eval_ast::<Dynamic>(&ast)
            .map_err(KernelError::from_rhai_error)
    }

    /// Run the script stored at `path`
    pub fn run_file(&self, path: impl AsRef<Path>) -> Result<Dynamic> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| KernelError::Io(e).with_context(format!("Failed to read script {:?}", path)))?;
        tracing::info!("Running script {:?}", path);
        self.run(&source)
            .map_err(|e| e.with_context(format!("Script {:?} failed", path)))
    }
}

impl std::fmt::Debug for ScriptBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptBridge").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::kernel::Kernel;
    use crate::registry::ModuleRegistry;
    use crate::scene::NullScene;
    use std::sync::Arc;
    use std::thread::JoinHandle;

    fn start() -> (ScriptBridge, KernelHandle, JoinHandle<()>) {
        let (kernel, thread) = Kernel::spawn(
            ModuleRegistry::with_builtins().unwrap(),
            &KernelConfig::default(),
            Arc::new(NullScene),
        )
        .unwrap();
        (ScriptBridge::new(kernel.clone()), kernel, thread)
    }

    fn stop(kernel: KernelHandle, thread: JoinHandle<()>) {
        kernel.shutdown();
        thread.join().unwrap();
    }

    #[test]
    fn test_prototypes_listed() {
        let (bridge, kernel, thread) = start();
        let names = bridge.run("prototypes()").unwrap().into_array().unwrap();
        assert_eq!(names.len(), 4);
        stop(kernel, thread);
    }

    #[test]
    fn test_property_round_trip() {
        let (bridge, kernel, thread) = start();
        let value = bridge
            .run(
                r#"
                let id = create("Scale");
                set_property(id, "factor", 2);
                get_property(id, "factor")
                "#,
            )
            .unwrap();
        assert_eq!(value.as_float().unwrap(), 2.0);
        stop(kernel, thread);
    }

    #[test]
    fn test_kernel_errors_become_script_errors() {
        let (bridge, kernel, thread) = start();
        let err = bridge.run(r#"create("Nope")"#).unwrap_err();
        assert!(err.to_string().contains("Unknown prototype"));

        let err = bridge.run("remove(-1)").unwrap_err();
        assert!(err.to_string().contains("Invalid module id"));
        stop(kernel, thread);
    }

    #[test]
    fn test_syntax_error_reported_before_running() {
        let (bridge, kernel, thread) = start();
        let err = bridge.run(r#"create("Scale"); let = ;"#).unwrap_err();
        assert!(err.to_string().contains("Compilation error"));
        assert!(kernel.modules().unwrap().is_empty());
        stop(kernel, thread);
    }
}
