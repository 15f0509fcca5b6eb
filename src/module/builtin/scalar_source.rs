use super::{Series, SERIES};
use crate::error::Result;
use crate::graph::{ConnectorSpec, Update};
use crate::module::plugin::{AnyModule, BuiltinModule, ModuleContext, ModulePlugin};
use crate::module::property::{Constraint, PropertySpec, PropertyValue};
use crate::registry::ModulePrototype;

pub const NAME: &str = "Scalar Source";

pub(super) fn prototype() -> Result<ModulePrototype> {
    ModulePrototype::builder(NAME)
        .description("Generates an arithmetic series")
        .icon("source")
        .output(ConnectorSpec::output("values", SERIES).with_description("Generated samples"))
        .property(
            PropertySpec::new("count", 16i64)
                .with_description("Number of samples")
                .with_constraint(Constraint::Range {
                    min: 0.0,
                    max: 1_000_000.0,
                }),
        )
        .property(PropertySpec::new("start", 0.0).with_description("First sample"))
        .property(PropertySpec::new("step", 1.0).with_description("Increment between samples"))
        .build(|| AnyModule::Builtin(BuiltinModule::ScalarSource(ScalarSource)))
}

/// Publishes `count` samples `start, start + step, ...` on activation and
/// after every property change.
#[derive(Debug, Default)]
pub struct ScalarSource;

impl ScalarSource {
    fn generate(ctx: &ModuleContext<'_>) -> Series {
        let count = ctx.property("count").and_then(|v| v.as_int()).unwrap_or(0).max(0);
        let start = ctx.property("start").and_then(|v| v.as_float()).unwrap_or(0.0);
        let step = ctx.property("step").and_then(|v| v.as_float()).unwrap_or(1.0);
        Series((0..count).map(|i| start + step * i as f64).collect())
    }

    fn publish(ctx: &mut ModuleContext<'_>) -> Result<()> {
        let series = Self::generate(ctx);
        tracing::trace!("{} publishing {} samples", ctx.name(), series.len());
        ctx.publish("values", series)
    }
}

impl ModulePlugin for ScalarSource {
    fn on_activate(&mut self, ctx: &mut ModuleContext<'_>) -> Result<()> {
        Self::publish(ctx)
    }

    fn on_data(&mut self, _ctx: &mut ModuleContext<'_>, _updates: &[Update]) -> Result<()> {
        Ok(())
    }

    fn on_property_change(
        &mut self,
        _name: &str,
        _value: &PropertyValue,
        ctx: &mut ModuleContext<'_>,
    ) -> Result<()> {
        Self::publish(ctx)
    }
}
