use crate::alerts::AlertManager;
use crate::events::{Position, Status, Timestamp, TrackedPerson};
use crate::roster::{DeviceStats, Roster};
use serde::Serialize;

/// Aggregate counts shown on the dashboard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub safe: usize,
    pub trapped: usize,
    pub missing: usize,
    /// People carrying a locator device
    pub devices_active: usize,
}

impl StatusCounts {
    pub fn from_roster(roster: &Roster) -> Self {
        roster.iter().fold(Self::default(), |mut counts, person| {
            match person.status {
                Status::Safe => counts.safe += 1,
                Status::Trapped => counts.trapped += 1,
                Status::Missing => counts.missing += 1,
            }
            if person.has_locator() {
                counts.devices_active += 1;
            }
            counts
        })
    }

    pub fn total(&self) -> usize {
        self.safe + self.trapped + self.missing
    }
}

/// One row of the active alert table
///
/// `index` is the value to pass to acknowledge. The person fields are `None`
/// when the person has been removed since the alert was raised.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertView {
    pub index: usize,
    pub alert_id: u64,
    pub label: String,
    pub person_id: String,
    pub person_name: Option<String>,
    pub position: Option<Position>,
    pub raised_at: Timestamp,
}

/// Per-person row for map pins and tables
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonView {
    pub id: String,
    pub name: String,
    pub group: String,
    pub status: Status,
    pub position: Position,
    pub has_locator: bool,
    pub last_update: Option<Timestamp>,
}

impl From<&TrackedPerson> for PersonView {
    fn from(person: &TrackedPerson) -> Self {
        Self {
            id: person.id.clone(),
            name: person.name.clone(),
            group: person.group.clone(),
            status: person.status,
            position: person.position(),
            has_locator: person.has_locator(),
            last_update: person.last_update,
        }
    }
}

/// Plain data handed to display collaborators after each refresh cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// Refresh cycles completed since the session was created
    pub cycle: u64,
    pub refreshed_at: Timestamp,
    pub counts: StatusCounts,
    /// Active alerts, newest first, in displayed order
    pub active_alerts: Vec<AlertView>,
    pub people: Vec<PersonView>,
    pub devices: DeviceStats,
}

impl Snapshot {
    /// Build a snapshot from the current state
    ///
    /// The alert rows follow the manager's displayed view, so their indices
    /// line up with what acknowledge expects until the next refresh.
    pub fn capture(
        cycle: u64,
        refreshed_at: Timestamp,
        roster: &Roster,
        alerts: &AlertManager,
        devices: DeviceStats,
    ) -> Self {
        let active_alerts = alerts
            .displayed()
            .enumerate()
            .filter(|(_, alert)| !alert.acknowledged)
            .map(|(index, alert)| {
                let person = roster.get(&alert.person_id);
                AlertView {
                    index,
                    alert_id: alert.id,
                    label: alert.label(),
                    person_id: alert.person_id.clone(),
                    person_name: person.map(|p| p.name.clone()),
                    position: person.map(TrackedPerson::position),
                    raised_at: alert.raised_at,
                }
            })
            .collect();

        Self {
            cycle,
            refreshed_at,
            counts: StatusCounts::from_roster(roster),
            active_alerts,
            people: roster.iter().map(PersonView::from).collect(),
            devices,
        }
    }
}
