//! Registry of locating hardware (RFID tags and GPS locators)
//!
//! Devices are assigned to tracked people; registering a device writes its id
//! into the person's tag and/or locator field so the status simulator and the
//! live sensor feed can find the wearer.

use crate::error::MonitorError;
use crate::events::Timestamp;
use crate::roster::Roster;
use chrono::Utc;
use log::{debug, info};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// What a device can do
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// RFID tag, fills the person's tag field
    Rfid,
    /// GPS locator, fills the person's locator field
    Gps,
    /// Combined unit, fills both
    Both,
}

impl DeviceKind {
    fn is_tag(self) -> bool {
        matches!(self, DeviceKind::Rfid | DeviceKind::Both)
    }

    fn is_locator(self) -> bool {
        matches!(self, DeviceKind::Gps | DeviceKind::Both)
    }
}

/// Reachability of a device
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    #[default]
    Online,
    Offline,
}

impl DeviceStatus {
    fn toggled(self) -> Self {
        match self {
            DeviceStatus::Online => DeviceStatus::Offline,
            DeviceStatus::Offline => DeviceStatus::Online,
        }
    }
}

/// A registered piece of locating hardware
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Device {
    pub id: String,
    pub kind: DeviceKind,
    /// Id of the person wearing the device
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub status: DeviceStatus,
    /// Battery level in percent
    pub battery: u8,
    pub last_signal: Timestamp,
    pub created_at: Timestamp,
}

impl Device {
    /// A freshly registered device: online with a full battery
    pub fn new(id: impl Into<String>, kind: DeviceKind, assigned_to: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            kind,
            assigned_to,
            status: DeviceStatus::Online,
            battery: 100,
            last_signal: now,
            created_at: now,
        }
    }
}

/// Counts shown on the device page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DeviceStats {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
}

/// Probabilities driving the device fleet simulation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FleetPolicy {
    /// Chance per tick that a device with charge left loses 0 or 1 percent
    pub battery_drain_probability: f64,
    /// Chance per tick that a device flips between online and offline
    pub status_toggle_probability: f64,
}

impl Default for FleetPolicy {
    fn default() -> Self {
        Self {
            battery_drain_probability: 0.3,
            status_toggle_probability: 0.05,
        }
    }
}

/// All registered devices
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device and write its id onto the assigned person
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::DuplicateDevice` if the id is registered or
    /// already carried by someone other than the assignee, and
    /// `MonitorError::UnknownPerson` if the assignee is not on the roster.
    /// Nothing is changed on error.
    pub fn register(
        &mut self,
        device: Device,
        roster: &mut Roster,
    ) -> Result<&Device, MonitorError> {
        if self.get(&device.id).is_some() {
            return Err(MonitorError::DuplicateDevice(device.id));
        }
        if let Some(holder) = roster.find_by_device(&device.id) {
            if device.assigned_to.as_deref() != Some(holder.id.as_str()) {
                return Err(MonitorError::DuplicateDevice(device.id));
            }
        }

        if let Some(person_id) = device.assigned_to.as_deref() {
            let person = roster
                .get_mut(person_id)
                .ok_or_else(|| MonitorError::UnknownPerson(person_id.to_string()))?;
            if device.kind.is_tag() {
                person.tag_device = Some(device.id.clone());
            }
            if device.kind.is_locator() {
                person.locator_device = Some(device.id.clone());
            }
        }

        info!("Registered {:?} device {}", device.kind, device.id);
        self.devices.push(device);
        Ok(&self.devices[self.devices.len() - 1])
    }

    /// Remove a device and clear it from the person wearing it
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::UnknownDevice` if the id is not registered.
    pub fn unregister(&mut self, id: &str, roster: &mut Roster) -> Result<Device, MonitorError> {
        let index = self
            .devices
            .iter()
            .position(|d| d.id == id)
            .ok_or_else(|| MonitorError::UnknownDevice(id.to_string()))?;
        let device = self.devices.remove(index);

        if let Some(person) = device
            .assigned_to
            .as_deref()
            .and_then(|person_id| roster.get_mut(person_id))
        {
            if person.tag_device.as_deref() == Some(id) {
                person.tag_device = None;
            }
            if person.locator_device.as_deref() == Some(id) {
                person.locator_device = None;
            }
        }

        info!("Unregistered device {}", id);
        Ok(device)
    }

    /// Record a successful ping: refresh the signal time and mark online
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::UnknownDevice` if the id is not registered.
    pub fn ping(&mut self, id: &str, now: Timestamp) -> Result<&Device, MonitorError> {
        let device = self
            .devices
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| MonitorError::UnknownDevice(id.to_string()))?;
        device.last_signal = now;
        device.status = DeviceStatus::Online;
        Ok(&*device)
    }

    /// Advance the fleet simulation by one step
    ///
    /// Returns the number of devices whose online status flipped.
    pub fn simulate<R: Rng + ?Sized>(&mut self, policy: &FleetPolicy, rng: &mut R) -> usize {
        let mut toggled = 0;
        for device in &mut self.devices {
            if device.battery > 0 && rng.gen_bool(policy.battery_drain_probability) {
                let drain: u8 = rng.gen_range(0..=1);
                device.battery = device.battery.saturating_sub(drain);
            }

            if rng.gen_bool(policy.status_toggle_probability) {
                device.status = device.status.toggled();
                toggled += 1;
                debug!("Device {} is now {:?}", device.id, device.status);
            }
        }
        toggled
    }

    pub fn stats(&self) -> DeviceStats {
        let online = self
            .devices
            .iter()
            .filter(|d| d.status == DeviceStatus::Online)
            .count();
        DeviceStats {
            total: self.devices.len(),
            online,
            offline: self.devices.len() - online,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::TrackedPerson;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn roster_with(id: &str) -> Roster {
        let mut roster = Roster::new();
        roster
            .add(TrackedPerson::new(id, "Ana", "Grade 7", 7.07, 125.61))
            .unwrap();
        roster
    }

    #[test]
    fn test_register_gps_sets_locator() {
        let mut roster = roster_with("S1");
        let mut registry = DeviceRegistry::new();

        registry
            .register(
                Device::new("GPS0001", DeviceKind::Gps, Some("S1".to_string())),
                &mut roster,
            )
            .unwrap();

        let person = roster.get("S1").unwrap();
        assert_eq!(person.locator_device.as_deref(), Some("GPS0001"));
        assert!(person.tag_device.is_none());
        assert_eq!(registry.get("GPS0001").unwrap().battery, 100);
    }

    #[test]
    fn test_register_both_sets_tag_and_locator() {
        let mut roster = roster_with("S1");
        let mut registry = DeviceRegistry::new();

        registry
            .register(
                Device::new("DEV1", DeviceKind::Both, Some("S1".to_string())),
                &mut roster,
            )
            .unwrap();

        let person = roster.get("S1").unwrap();
        assert_eq!(person.locator_device.as_deref(), Some("DEV1"));
        assert_eq!(person.tag_device.as_deref(), Some("DEV1"));
    }

    #[test]
    fn test_register_rejects_duplicates_and_unknown_people() {
        let mut roster = roster_with("S1");
        let mut registry = DeviceRegistry::new();
        registry
            .register(Device::new("RFID1", DeviceKind::Rfid, None), &mut roster)
            .unwrap();

        let duplicate =
            registry.register(Device::new("RFID1", DeviceKind::Rfid, None), &mut roster);
        assert!(matches!(duplicate, Err(MonitorError::DuplicateDevice(_))));

        let orphan = registry.register(
            Device::new("GPS9", DeviceKind::Gps, Some("nobody".to_string())),
            &mut roster,
        );
        assert!(matches!(orphan, Err(MonitorError::UnknownPerson(_))));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_rejects_id_carried_by_someone_else() {
        let mut roster = roster_with("S1");
        roster
            .add(TrackedPerson::new("S2", "Ben", "Grade 8", 7.07, 125.61).with_locator("GPS1"))
            .unwrap();
        let mut registry = DeviceRegistry::new();

        let result = registry.register(
            Device::new("GPS1", DeviceKind::Gps, Some("S1".to_string())),
            &mut roster,
        );
        assert!(matches!(result, Err(MonitorError::DuplicateDevice(id)) if id == "GPS1"));
        assert!(registry.is_empty());
        assert!(roster.get("S1").unwrap().locator_device.is_none());
        assert_eq!(roster.find_by_device("GPS1").unwrap().id, "S2");

        // The current wearer may still register the id it carries
        registry
            .register(
                Device::new("GPS1", DeviceKind::Gps, Some("S2".to_string())),
                &mut roster,
            )
            .unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister_clears_person_fields() {
        let mut roster = roster_with("S1");
        let mut registry = DeviceRegistry::new();
        registry
            .register(
                Device::new("GPS0001", DeviceKind::Gps, Some("S1".to_string())),
                &mut roster,
            )
            .unwrap();

        registry.unregister("GPS0001", &mut roster).unwrap();

        assert!(registry.is_empty());
        assert!(roster.get("S1").unwrap().locator_device.is_none());
        assert!(matches!(
            registry.unregister("GPS0001", &mut roster),
            Err(MonitorError::UnknownDevice(_))
        ));
    }

    #[test]
    fn test_ping_marks_online() {
        let mut roster = Roster::new();
        let mut registry = DeviceRegistry::new();
        let mut device = Device::new("GPS1", DeviceKind::Gps, None);
        device.status = DeviceStatus::Offline;
        registry.register(device, &mut roster).unwrap();

        let later = Utc::now() + chrono::Duration::seconds(30);
        let pinged = registry.ping("GPS1", later).unwrap();

        assert_eq!(pinged.status, DeviceStatus::Online);
        assert_eq!(pinged.last_signal, later);
    }

    #[test]
    fn test_simulate_with_certain_toggle() {
        let mut roster = Roster::new();
        let mut registry = DeviceRegistry::new();
        registry
            .register(Device::new("A", DeviceKind::Gps, None), &mut roster)
            .unwrap();
        registry
            .register(Device::new("B", DeviceKind::Rfid, None), &mut roster)
            .unwrap();

        let policy = FleetPolicy {
            battery_drain_probability: 0.0,
            status_toggle_probability: 1.0,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        assert_eq!(registry.simulate(&policy, &mut rng), 2);
        assert_eq!(registry.stats().offline, 2);
        assert_eq!(registry.simulate(&policy, &mut rng), 2);
        assert_eq!(registry.stats().online, 2);
    }

    #[test]
    fn test_battery_never_underflows() {
        let mut roster = Roster::new();
        let mut registry = DeviceRegistry::new();
        let mut device = Device::new("A", DeviceKind::Gps, None);
        device.battery = 1;
        registry.register(device, &mut roster).unwrap();

        let policy = FleetPolicy {
            battery_drain_probability: 1.0,
            status_toggle_probability: 0.0,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..50 {
            registry.simulate(&policy, &mut rng);
        }

        assert_eq!(registry.get("A").unwrap().battery, 0);
    }
}
