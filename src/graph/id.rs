//! Identity types for the module graph.
//!
//! Module ids are handed out by the container in strictly increasing order
//! and never reused, so ordering by id is insertion order.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a module inside a container.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ModuleId(pub u32);

impl ModuleId {
    pub const INVALID: ModuleId = ModuleId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    /// The id following this one, or `None` once the valid range is used up.
    #[inline]
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(ModuleId).filter(|id| id.is_valid())
    }
}

impl fmt::Debug for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "ModuleId(INVALID)")
        } else {
            write!(f, "ModuleId({})", self.0)
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl TryFrom<i64> for ModuleId {
    type Error = crate::error::KernelError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u32::try_from(value)
            .ok()
            .map(ModuleId)
            .filter(|id| id.is_valid())
            .ok_or(crate::error::KernelError::InvalidModuleId(value))
    }
}

/// Handle of a node a module attached to the scene graph.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SceneNodeId(pub u64);

impl fmt::Debug for SceneNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SceneNodeId({})", self.0)
    }
}

/// A named connector on a specific module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub module: ModuleId,
    pub connector: String,
}

impl Endpoint {
    pub fn new(module: ModuleId, connector: impl Into<String>) -> Self {
        Self {
            module,
            connector: connector.into(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.connector)
    }
}
