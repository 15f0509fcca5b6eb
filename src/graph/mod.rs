//! The connector-based data-flow graph.

pub mod connector;
pub mod data;
pub mod id;
pub mod inbox;

pub use connector::{
    can_connect, connect, disconnect, ConnectorDirection, ConnectorOwner, ConnectorSpec, CutLink,
    InputConnector, OutputConnector,
};
pub use data::{Payload, TypeTag};
pub use id::{Endpoint, ModuleId, SceneNodeId};
pub use inbox::{Inbox, Update};
