//! The module thread.
//!
//! Each started module runs [`run`] on its own named thread: activate, then
//! block on the wake set until shutdown, handling property changes before
//! data and data before custom conditions on every wake.

use crate::events::KernelEvent;
use crate::module::instance::ModuleCore;
use crate::module::plugin::{AnyModule, ModuleContext};
use crate::module::state::ModuleState;
use crate::sync::{ConditionSet, EventKind};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Start the module thread.
pub(crate) fn spawn(
    core: Arc<ModuleCore>,
    logic: AnyModule,
    stack_size: Option<usize>,
) -> std::io::Result<JoinHandle<()>> {
    let mut builder = thread::Builder::new().name(format!("module-{}-{}", core.id().0, core.info.name));
    if let Some(size) = stack_size {
        builder = builder.stack_size(size);
    }
    builder.spawn(move || run(core, logic))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

/// Run one hook, turning both `Err` and panics into a failure message.
fn guarded<F>(f: F) -> Result<(), String>
where
    F: FnOnce() -> crate::error::Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(panic_message(payload)),
    }
}

fn wake_set(core: &ModuleCore) -> ConditionSet {
    let set = ConditionSet::new();
    set.add(EventKind::Shutdown, &core.shutdown);
    set.add(EventKind::DataChanged, core.inbox.data_changed());
    set.add(EventKind::PropertyChanged, core.properties.condition());
    for (name, condition) in core.custom_conditions() {
        set.add(EventKind::Custom(name), &condition);
    }
    set
}

pub(crate) fn run(core: Arc<ModuleCore>, mut logic: AnyModule) {
    let wake = wake_set(&core);
    let mut ctx = ModuleContext::new(&core);
    tracing::debug!("Module {} {} thread started", core.id(), core.info.name);

    if !core.shutdown.is_fired() {
        match guarded(|| logic.on_activate(&mut ctx)) {
            Ok(()) => {
                if core.transition(ModuleState::Ready) {
                    core.ready.notify();
                    core.emit(KernelEvent::ModuleReady { id: core.id() });
                }
            }
            Err(message) => core.fail(format!("activation {}", message)),
        }
    }

    while core.state().is_running() {
        wake.wait();
        if wake.is_fired(&EventKind::Shutdown) {
            break;
        }
        if let Err(message) = step(&core, &mut logic, &mut ctx, &wake) {
            core.fail(message);
        }
    }

    core.transition(ModuleState::ShuttingDown);
    if let Err(message) = guarded(|| logic.on_deactivate(&mut ctx)) {
        tracing::warn!(
            "Module {} {} deactivation failed: {}",
            core.id(),
            core.info.name,
            message
        );
    }

    let leftover = core.detach_all_scene_nodes();
    if leftover > 0 {
        tracing::debug!(
            "Module {} {}: detached {} leftover scene node(s)",
            core.id(),
            core.info.name,
            leftover
        );
    }
    if core.failure().is_some() {
        core.disconnect_all();
    }

    core.transition(ModuleState::Finished);
    core.finished.notify();
    tracing::debug!("Module {} {} thread finished", core.id(), core.info.name);
}

/// Handle one wake. Conditions are reset before their pending state is
/// drained, so anything arriving meanwhile causes another wake.
fn step(
    core: &ModuleCore,
    logic: &mut AnyModule,
    ctx: &mut ModuleContext<'_>,
    wake: &ConditionSet,
) -> Result<(), String> {
    if wake.reset(&EventKind::PropertyChanged) {
        for (name, value) in core.properties.take_changed() {
            if core.shutdown.is_fired() {
                return Ok(());
            }
            guarded(|| logic.on_property_change(&name, &value, ctx))?;
        }
    }

    if wake.reset(&EventKind::DataChanged) && !core.shutdown.is_fired() {
        let updates = core.inbox.drain();
        if !updates.is_empty() {
            guarded(|| logic.on_data(ctx, &updates))?;
        }
    }

    for kind in wake.fired() {
        if core.shutdown.is_fired() {
            return Ok(());
        }
        if let EventKind::Custom(name) = &kind {
            if wake.reset(&kind) {
                guarded(|| logic.on_custom(name, ctx))?;
            }
        }
    }
    Ok(())
}
