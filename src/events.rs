//! Core data types for the calamity monitor
//!
//! This module defines the tracked people, their status, the readings pushed by
//! live sensors and the records kept in the event log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type for consistent time handling across the application
pub type Timestamp = DateTime<Utc>;

/// Safety status of a tracked person during a calamity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Accounted for and out of danger
    #[default]
    Safe,
    /// Unable to leave their location, needs rescue
    Trapped,
    /// Whereabouts unknown, last known position is kept
    Missing,
}

impl Status {
    /// Every status a person can be in, in draw order for the simulator
    pub const ALL: [Status; 3] = [Status::Safe, Status::Trapped, Status::Missing];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Safe => "safe",
            Status::Trapped => "trapped",
            Status::Missing => "missing",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

/// A person tracked by the monitor
///
/// Created on manual or bulk entry and removed only by manual deletion. The
/// status simulator and the live sensor feed mutate position, status and
/// `last_update`; nothing else does.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackedPerson {
    /// Unique identifier (e.g. a student number)
    pub id: String,
    /// Display name
    pub name: String,
    /// Group or class label
    pub group: String,
    /// Section within the group
    #[serde(default)]
    pub section: Option<String>,
    /// Contact string, usually a phone number
    #[serde(default)]
    pub contact: Option<String>,
    /// GPS locator device id; only people with one are simulated
    #[serde(default)]
    pub locator_device: Option<String>,
    /// RFID tag device id
    #[serde(default)]
    pub tag_device: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub status: Status,
    /// None until the first simulated or sensor update
    #[serde(default)]
    pub last_update: Option<Timestamp>,
    #[serde(default = "Utc::now")]
    pub created_at: Timestamp,
}

impl TrackedPerson {
    /// Create a new person in the `safe` state at the given position
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        group: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            group: group.into(),
            section: None,
            contact: None,
            locator_device: None,
            tag_device: None,
            latitude,
            longitude,
            status: Status::Safe,
            last_update: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_locator(mut self, device_id: impl Into<String>) -> Self {
        self.locator_device = Some(device_id.into());
        self
    }

    pub fn with_tag(mut self, device_id: impl Into<String>) -> Self {
        self.tag_device = Some(device_id.into());
        self
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    /// Whether this person carries a locator device (blank ids do not count)
    pub fn has_locator(&self) -> bool {
        self.locator_device
            .as_deref()
            .is_some_and(|d| !d.trim().is_empty())
    }

    /// Whether the given device id is this person's locator or tag
    pub fn carries_device(&self, device_id: &str) -> bool {
        let matches = |d: &Option<String>| d.as_deref().is_some_and(|d| d == device_id);
        !device_id.is_empty() && (matches(&self.locator_device) || matches(&self.tag_device))
    }

    pub fn position(&self) -> Position {
        Position {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// A reading pushed by a live sensor
///
/// Readings are authoritative: they overwrite the matching person's position
/// and status for the cycle in which they are applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorReading {
    pub device_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Set when the wearer pressed the distress button
    #[serde(default)]
    pub emergency: bool,
}

impl SensorReading {
    /// Status implied by the reading
    pub fn status(&self) -> Status {
        if self.emergency {
            Status::Trapped
        } else {
            Status::Safe
        }
    }
}

/// Kind of entry in the event log
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    CalamityActivated,
    CalamityDeactivated,
    PersonAdded,
    PersonRemoved,
    DeviceRegistered,
    DeviceUnregistered,
    DevicePing,
    StatusChange,
    SosAlert,
    SosAcknowledged,
    SensorUpdate,
}

/// One entry in the event log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventRecord {
    pub id: u64,
    pub kind: EventKind,
    pub message: String,
    #[serde(default)]
    pub person_id: Option<String>,
    #[serde(default)]
    pub position: Option<Position>,
    pub timestamp: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&Status::Safe).unwrap(), "\"safe\"");
        assert_eq!(
            serde_json::to_string(&Status::Trapped).unwrap(),
            "\"trapped\""
        );
        assert_eq!(
            serde_json::to_string(&Status::Missing).unwrap(),
            "\"missing\""
        );
    }

    #[test]
    fn test_unknown_status_rejected() {
        let result: Result<Status, _> = serde_json::from_str("\"injured\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_person_defaults_when_fields_missing() {
        let json = r#"{"id":"S1","name":"Ana","group":"7","latitude":7.0,"longitude":125.0}"#;
        let person: TrackedPerson = serde_json::from_str(json).unwrap();

        assert_eq!(person.status, Status::Safe);
        assert!(person.last_update.is_none());
        assert!(!person.has_locator());
    }

    #[test]
    fn test_has_locator_ignores_blank_ids() {
        let person = TrackedPerson::new("S1", "Ana", "7", 0.0, 0.0).with_locator("  ");
        assert!(!person.has_locator());

        let person = person.with_locator("GPS0001");
        assert!(person.has_locator());
    }

    #[test]
    fn test_carries_device_matches_locator_or_tag() {
        let person = TrackedPerson::new("S1", "Ana", "7", 0.0, 0.0)
            .with_locator("GPS0001")
            .with_tag("RFID00001");

        assert!(person.carries_device("GPS0001"));
        assert!(person.carries_device("RFID00001"));
        assert!(!person.carries_device("GPS0002"));
        assert!(!person.carries_device(""));
    }

    #[test]
    fn test_sensor_reading_status() {
        let mut reading = SensorReading {
            device_id: "GPS0001".to_string(),
            latitude: 7.0,
            longitude: 125.0,
            emergency: true,
        };
        assert_eq!(reading.status(), Status::Trapped);

        reading.emergency = false;
        assert_eq!(reading.status(), Status::Safe);
    }

    #[test]
    fn test_sensor_reading_emergency_defaults_false() {
        let json = r#"{"device_id":"GPS1","latitude":1.0,"longitude":2.0}"#;
        let reading: SensorReading = serde_json::from_str(json).unwrap();
        assert!(!reading.emergency);
    }

    #[test]
    fn test_event_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&EventKind::SosAcknowledged).unwrap(),
            "\"sos_acknowledged\""
        );
        assert_eq!(
            serde_json::to_string(&EventKind::StatusChange).unwrap(),
            "\"status_change\""
        );
    }
}
