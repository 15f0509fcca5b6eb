//! Fake collaborators for integration tests

use std::collections::HashMap;
use std::sync::Mutex;
use vizkernel::graph::SceneNodeId;
use vizkernel::{SceneGraph, SceneNode};

/// Scene graph that keeps attached nodes in memory
#[derive(Default)]
pub struct MemoryScene {
    nodes: Mutex<HashMap<SceneNodeId, SceneNode>>,
    detached: Mutex<Vec<SceneNodeId>>,
}

impl MemoryScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nodes currently attached
    pub fn nodes(&self) -> Vec<SceneNode> {
        self.nodes.lock().unwrap().values().cloned().collect()
    }

    pub fn detached_count(&self) -> usize {
        self.detached.lock().unwrap().len()
    }
}

impl SceneGraph for MemoryScene {
    fn attach_to_scene(&self, node: SceneNode) {
        self.nodes.lock().unwrap().insert(node.id, node);
    }

    fn detach_from_scene(&self, id: SceneNodeId) {
        self.nodes.lock().unwrap().remove(&id);
        self.detached.lock().unwrap().push(id);
    }
}
