//! beacon-core — configuration, key scheme, error taxonomy and RPC envelopes.
//! All other Beacon crates depend on this one.

pub mod config;
pub mod error;
pub mod keys;
pub mod timeslot;
pub mod wire;

pub use config::BeaconConfig;
pub use error::RegistryError;
pub use timeslot::Timeslot;
