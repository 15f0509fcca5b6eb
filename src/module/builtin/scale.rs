use super::{Series, SERIES};
use crate::error::Result;
use crate::graph::{ConnectorSpec, Update};
use crate::module::plugin::{AnyModule, BuiltinModule, ModuleContext, ModulePlugin};
use crate::module::property::{PropertySpec, PropertyValue};
use crate::registry::ModulePrototype;

pub const NAME: &str = "Scale";

pub(super) fn prototype() -> Result<ModulePrototype> {
    ModulePrototype::builder(NAME)
        .description("Multiplies every sample by a factor")
        .icon("scale")
        .input(ConnectorSpec::input("in", SERIES))
        .output(ConnectorSpec::output("out", SERIES))
        .property(PropertySpec::new("factor", 1.0).with_description("Multiplier"))
        .build(|| AnyModule::Builtin(BuiltinModule::Scale(Scale)))
}

#[derive(Debug, Default)]
pub struct Scale;

impl Scale {
    fn apply(ctx: &mut ModuleContext<'_>) -> Result<()> {
        let Some(input) = ctx.input_data::<Series>("in") else {
            return Ok(());
        };
        let factor = ctx.property("factor").and_then(|v| v.as_float()).unwrap_or(1.0);
        let scaled = Series(input.values().iter().map(|v| v * factor).collect());
        ctx.publish("out", scaled)
    }
}

impl ModulePlugin for Scale {
    fn on_data(&mut self, ctx: &mut ModuleContext<'_>, _updates: &[Update]) -> Result<()> {
        Self::apply(ctx)
    }

    fn on_property_change(
        &mut self,
        _name: &str,
        _value: &PropertyValue,
        ctx: &mut ModuleContext<'_>,
    ) -> Result<()> {
        Self::apply(ctx)
    }
}
