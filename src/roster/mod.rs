/// Roster of tracked people
pub mod store;

/// Locating hardware assigned to people
pub mod devices;

/// Sample roster generation
pub mod sample;

pub use devices::{Device, DeviceKind, DeviceRegistry, DeviceStats, DeviceStatus, FleetPolicy};
pub use sample::sample_roster;
pub use store::{PersonUpdate, Roster, RosterSummary};
