//! beacond — a service registry node: DHT participant plus RPC transports.

pub mod node;

pub use node::{Node, NodeError, NodeState};
