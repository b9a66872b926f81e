//! beacon-services — the service-discovery engine.
//!
//! The DHT adapter feeds discovery events into the peer cache; the
//! discovery engine answers announce/lookup/get/put from the adapter and the
//! cache; the dispatcher maps wire operation names onto the engine.

pub mod cache;
pub mod dht;
pub mod discovery;
pub mod dispatch;

pub use cache::PeerCache;
pub use dht::{DhtAdapter, DhtBackend, DhtError, DhtEvent, DhtObserver, ListenOptions};
pub use discovery::{Discovery, EventRouter};
pub use dispatch::{Dispatcher, Operation};
