//! Renderer collaborator.
//!
//! The kernel only ever attaches and detaches nodes; everything else about
//! the scene graph belongs to the renderer.

use crate::graph::{ModuleId, SceneNodeId};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

impl SceneNodeId {
    /// A process-unique node id.
    pub fn next() -> Self {
        SceneNodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Visual representation contributed by a module.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub id: SceneNodeId,
    pub module: ModuleId,
    pub label: String,
    pub detail: String,
}

#[cfg_attr(test, mockall::automock)]
pub trait SceneGraph: Send + Sync {
    fn attach_to_scene(&self, node: SceneNode);
    fn detach_from_scene(&self, id: SceneNodeId);
}

/// Scene that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullScene;

impl SceneGraph for NullScene {
    fn attach_to_scene(&self, _node: SceneNode) {}
    fn detach_from_scene(&self, _id: SceneNodeId) {}
}

/// Scene that logs attach/detach calls. Used by the binary when no renderer
/// is present.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingScene;

impl SceneGraph for TracingScene {
    fn attach_to_scene(&self, node: SceneNode) {
        tracing::info!(
            "Scene: attach {:?} from module {} \"{}\" ({})",
            node.id,
            node.module,
            node.label,
            node.detail
        );
    }

    fn detach_from_scene(&self, id: SceneNodeId) {
        tracing::info!("Scene: detach {:?}", id);
    }
}
