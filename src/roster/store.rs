use crate::error::MonitorError;
use crate::events::{Status, TrackedPerson};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Partial edit of a tracked person
///
/// Fields left as `None` are not touched. For the optional fields on the
/// person, `Some(String::new())` clears the value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersonUpdate {
    pub name: Option<String>,
    pub group: Option<String>,
    pub section: Option<String>,
    pub contact: Option<String>,
    pub locator_device: Option<String>,
    pub tag_device: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Headline numbers for the roster
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RosterSummary {
    pub total: usize,
    /// People with an RFID tag
    pub with_tag: usize,
    /// People with a GPS locator
    pub with_locator: usize,
    /// Distinct groups (classes)
    pub groups: usize,
}

/// Current status and position of every tracked person
///
/// Insertion order is preserved so tables and exports list people the way
/// they were entered.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Roster {
    people: Vec<TrackedPerson>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a person, rejecting duplicate identifiers
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::DuplicatePerson` if the id is already present.
    pub fn add(&mut self, person: TrackedPerson) -> Result<&TrackedPerson, MonitorError> {
        if self.get(&person.id).is_some() {
            return Err(MonitorError::DuplicatePerson(person.id));
        }
        self.people.push(person);
        Ok(&self.people[self.people.len() - 1])
    }

    /// Apply a partial edit to an existing person
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::UnknownPerson` if the id is not present.
    pub fn update(
        &mut self,
        id: &str,
        update: PersonUpdate,
    ) -> Result<&TrackedPerson, MonitorError> {
        let person = self
            .get_mut(id)
            .ok_or_else(|| MonitorError::UnknownPerson(id.to_string()))?;

        if let Some(name) = update.name {
            person.name = name;
        }
        if let Some(group) = update.group {
            person.group = group;
        }
        if let Some(section) = update.section {
            person.section = non_empty(section);
        }
        if let Some(contact) = update.contact {
            person.contact = non_empty(contact);
        }
        if let Some(locator) = update.locator_device {
            person.locator_device = non_empty(locator);
        }
        if let Some(tag) = update.tag_device {
            person.tag_device = non_empty(tag);
        }
        if let Some(latitude) = update.latitude {
            person.latitude = latitude;
        }
        if let Some(longitude) = update.longitude {
            person.longitude = longitude;
        }

        Ok(&*person)
    }

    /// Remove a person and return them
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::UnknownPerson` if the id is not present.
    pub fn remove(&mut self, id: &str) -> Result<TrackedPerson, MonitorError> {
        let index = self
            .people
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| MonitorError::UnknownPerson(id.to_string()))?;
        Ok(self.people.remove(index))
    }

    pub fn get(&self, id: &str) -> Option<&TrackedPerson> {
        self.people.iter().find(|p| p.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut TrackedPerson> {
        self.people.iter_mut().find(|p| p.id == id)
    }

    /// Find the person carrying a locator or tag with this id
    pub fn find_by_device(&self, device_id: &str) -> Option<&TrackedPerson> {
        self.people.iter().find(|p| p.carries_device(device_id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedPerson> {
        self.people.iter()
    }

    /// People matching both filters, in roster order; `None` matches anyone
    pub fn filter<'a>(
        &'a self,
        status: Option<Status>,
        group: Option<&'a str>,
    ) -> impl Iterator<Item = &'a TrackedPerson> + 'a {
        self.people.iter().filter(move |p| {
            status.map_or(true, |s| p.status == s) && group.map_or(true, |g| p.group == g)
        })
    }

    pub fn summary(&self) -> RosterSummary {
        let has = |d: &Option<String>| d.as_deref().is_some_and(|d| !d.trim().is_empty());
        RosterSummary {
            total: self.people.len(),
            with_tag: self.people.iter().filter(|p| has(&p.tag_device)).count(),
            with_locator: self.people.iter().filter(|p| p.has_locator()).count(),
            groups: self
                .people
                .iter()
                .map(|p| p.group.as_str())
                .collect::<HashSet<_>>()
                .len(),
        }
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TrackedPerson> {
        self.people.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.people.len()
    }

    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
    }
}

impl FromIterator<TrackedPerson> for Roster {
    fn from_iter<I: IntoIterator<Item = TrackedPerson>>(iter: I) -> Self {
        Self {
            people: iter.into_iter().collect(),
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
