/// Error types for the calamity monitor
pub mod error;

/// Tracked people, statuses, sensor readings and event records
pub mod events;

/// Capped newest-first event log
pub mod aggregator;

/// Roster of tracked people, device registry and sample data
pub mod roster;

/// Key-value persistence of monitor state
pub mod storage;

/// Configuration management
pub mod config;

/// SOS alert manager and notification sinks
pub mod alerts;

/// Randomized status and position simulation
pub mod simulator;

/// Calamity mode session and refresh scheduling
pub mod monitoring;

// Re-export commonly used types
pub use error::{AlertError, ConfigError, MonitorError, StorageError};
pub use events::{EventKind, EventRecord, Position, SensorReading, Status, Timestamp, TrackedPerson};
pub use monitoring::{MonitoringSession, MonitoringState, Snapshot, StatusCounts};
