use super::{Series, SeriesStats, SERIES, SERIES_STATS};
use crate::error::Result;
use crate::graph::{ConnectorSpec, Update};
use crate::module::plugin::{AnyModule, BuiltinModule, ModuleContext, ModulePlugin};
use crate::registry::ModulePrototype;

pub const NAME: &str = "Statistics";

pub(super) fn prototype() -> Result<ModulePrototype> {
    ModulePrototype::builder(NAME)
        .description("Count, extremes and mean of a series")
        .icon("statistics")
        .input(ConnectorSpec::input("in", SERIES))
        .output(ConnectorSpec::output("stats", SERIES_STATS))
        .build(|| AnyModule::Builtin(BuiltinModule::Statistics(Statistics)))
}

#[derive(Debug, Default)]
pub struct Statistics;

impl ModulePlugin for Statistics {
    fn on_data(&mut self, ctx: &mut ModuleContext<'_>, updates: &[Update]) -> Result<()> {
        // Every queued series is summarised so observers see each one.
        for update in updates {
            if let Some(series) = update.payload.as_ref().and_then(|p| p.get::<Series>()) {
                ctx.publish("stats", SeriesStats::of(series))?;
            }
        }
        Ok(())
    }
}
