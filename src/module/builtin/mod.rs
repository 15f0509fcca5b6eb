//! Modules shipped with the kernel.
//!
//! They all exchange [`Series`] data and register through
//! [`register_builtins`].

mod point_renderer;
mod scalar_source;
mod scale;
mod statistics;

pub use point_renderer::{PointRenderer, NAME as POINT_RENDERER};
pub use scalar_source::{ScalarSource, NAME as SCALAR_SOURCE};
pub use scale::{Scale, NAME as SCALE};
pub use statistics::{Statistics, NAME as STATISTICS};

use crate::error::Result;
use crate::graph::TypeTag;
use crate::registry::ModuleRegistry;

pub const SERIES: TypeTag = TypeTag::new("series");
pub const SERIES_STATS: TypeTag = TypeTag::new("series-stats");

/// A sequence of samples.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Series(pub Vec<f64>);

impl Series {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }
}

/// Summary of a [`Series`]. All zero for an empty series.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SeriesStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl SeriesStats {
    pub fn of(series: &Series) -> Self {
        let values = series.values();
        if values.is_empty() {
            return Self::default();
        }
        let (min, max, sum) = values.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |(min, max, sum), &v| (min.min(v), max.max(v), sum + v),
        );
        Self {
            count: values.len(),
            min,
            max,
            mean: sum / values.len() as f64,
        }
    }
}

/// Register every built-in prototype.
pub fn register_builtins(registry: &mut ModuleRegistry) -> Result<()> {
    registry.register(scalar_source::prototype()?)?;
    registry.register(scale::prototype()?)?;
    registry.register(statistics::prototype()?)?;
    registry.register(point_renderer::prototype()?)?;
    Ok(())
}
