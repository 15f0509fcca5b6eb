//! vizkernel - Main Entry Point
//!
//! Starts the module kernel, optionally runs a Rhai script against it and
//! shuts it down again.
//!
//! Usage: `vizkernel [SCRIPT.rhai]`

use anyhow::Context;
use std::sync::Arc;
use vizkernel::{
    config::KernelConfig, logging, scene::TracingScene, Kernel, KernelEvent, ModuleRegistry,
    ScriptBridge,
};

fn main() -> anyhow::Result<()> {
    let script = std::env::args_os().nth(1);

    let config = KernelConfig::load_or_default();
    let _log_guard = logging::init(&config.logging).context("Failed to initialise logging")?;

    tracing::info!("Starting vizkernel");

    let registry = ModuleRegistry::with_builtins().context("Failed to register built-in modules")?;
    let (kernel, kernel_thread) = Kernel::spawn(registry, &config, Arc::new(TracingScene))
        .context("Failed to start kernel")?;

    // Stands in for the GUI: every notification goes to the log.
    let events = kernel.subscribe();
    let event_thread = std::thread::Builder::new()
        .name("kernel-events".to_string())
        .spawn(move || {
            for event in events.iter() {
                tracing::info!("Kernel event: {:?}", event);
                if event == KernelEvent::Shutdown {
                    break;
                }
            }
        })
        .context("Failed to start event thread")?;

    let result = match &script {
        Some(path) => ScriptBridge::new(kernel.clone())
            .run_file(path)
            .map(|value| {
                if !value.is_unit() {
                    tracing::info!("Script returned {}", value);
                }
            })
            .map_err(anyhow::Error::from),
        None => {
            tracing::info!("No script given");
            Ok(())
        }
    };

    kernel.shutdown();
    drop(kernel);
    if kernel_thread.join().is_err() {
        tracing::error!("Kernel thread panicked");
    }
    let _ = event_thread.join();

    tracing::info!("vizkernel exited");
    result
}
