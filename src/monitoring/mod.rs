//! Calamity mode: the refresh loop and the snapshots it produces
//!
//! A [`MonitoringSession`] owns the roster, devices, alerts and event log.
//! While active it runs a refresh cycle each time its [`RefreshTimer`] comes
//! due: simulate one tick, recount, refresh the active alert view and publish
//! a [`Snapshot`].

pub mod session;
pub mod snapshot;
pub mod timer;

pub use session::{MonitoringSession, MonitoringState};
pub use snapshot::{AlertView, PersonView, Snapshot, StatusCounts};
pub use timer::RefreshTimer;
