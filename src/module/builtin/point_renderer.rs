use super::{Series, SeriesStats, SERIES};
use crate::error::Result;
use crate::graph::{ConnectorSpec, SceneNodeId, Update};
use crate::module::plugin::{AnyModule, BuiltinModule, ModuleContext, ModulePlugin};
use crate::module::property::{Constraint, PropertySpec, PropertyValue};
use crate::registry::ModulePrototype;

pub const NAME: &str = "Point Renderer";

pub(super) fn prototype() -> Result<ModulePrototype> {
    ModulePrototype::builder(NAME)
        .description("Shows a series as points in the scene")
        .icon("points")
        .input(ConnectorSpec::input("in", SERIES))
        .property(
            PropertySpec::new("label", "points")
                .with_description("Scene label")
                .with_constraint(Constraint::NotEmpty),
        )
        .build(|| AnyModule::Builtin(BuiltinModule::PointRenderer(PointRenderer::default())))
}

/// Keeps at most one scene node describing the latest series.
#[derive(Debug, Default)]
pub struct PointRenderer {
    node: Option<SceneNodeId>,
}

impl PointRenderer {
    fn clear(&mut self, ctx: &ModuleContext<'_>) {
        if let Some(node) = self.node.take() {
            ctx.detach_from_scene(node);
        }
    }

    fn redraw(&mut self, ctx: &ModuleContext<'_>) {
        self.clear(ctx);
        let Some(series) = ctx.input_data::<Series>("in") else {
            return;
        };
        let label = ctx
            .property("label")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let stats = SeriesStats::of(&series);
        let detail = format!("{} points in [{}, {}]", stats.count, stats.min, stats.max);
        self.node = Some(ctx.attach_to_scene(label, detail));
    }
}

impl ModulePlugin for PointRenderer {
    fn on_data(&mut self, ctx: &mut ModuleContext<'_>, _updates: &[Update]) -> Result<()> {
        self.redraw(ctx);
        Ok(())
    }

    fn on_property_change(
        &mut self,
        _name: &str,
        _value: &PropertyValue,
        ctx: &mut ModuleContext<'_>,
    ) -> Result<()> {
        if self.node.is_some() {
            self.redraw(ctx);
        }
        Ok(())
    }

    fn on_deactivate(&mut self, ctx: &mut ModuleContext<'_>) -> Result<()> {
        self.clear(ctx);
        Ok(())
    }
}
