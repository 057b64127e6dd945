//! Capped, newest-first event log
//!
//! Every notable change in the monitor (status changes, SOS alerts,
//! acknowledgements, roster and device edits) is recorded here. Once the log
//! reaches its capacity the oldest entries are discarded.

use crate::events::{EventKind, EventRecord, Position, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of events retained
pub const DEFAULT_MAX_EVENTS: usize = 1000;

/// Event log with a capacity limit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventLog {
    /// Newest entry at the front
    entries: VecDeque<EventRecord>,
    /// Id handed to the next recorded event
    next_id: u64,
    /// Maximum number of events retained
    #[serde(default = "default_max_events")]
    max_size: usize,
}

fn default_max_events() -> usize {
    DEFAULT_MAX_EVENTS
}

impl EventLog {
    /// Create an empty log that keeps at most `max_size` events
    ///
    /// # Examples
    ///
    /// ```
    /// use calamity::aggregator::EventLog;
    /// use calamity::events::EventKind;
    ///
    /// let mut log = EventLog::new(10);
    /// log.record(EventKind::PersonAdded, "Person Ana added");
    /// assert_eq!(log.len(), 1);
    /// ```
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            next_id: 1,
            max_size,
        }
    }

    /// Change the capacity, discarding the oldest entries if needed
    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
        self.enforce_capacity();
    }

    /// Record an event with only a message
    pub fn record(&mut self, kind: EventKind, message: impl Into<String>) -> &EventRecord {
        self.record_at(kind, message, None, None, Utc::now())
    }

    /// Record an event about a specific person
    pub fn record_for(
        &mut self,
        kind: EventKind,
        message: impl Into<String>,
        person_id: &str,
        position: Option<Position>,
    ) -> &EventRecord {
        self.record_at(
            kind,
            message,
            Some(person_id.to_string()),
            position,
            Utc::now(),
        )
    }

    /// Record an event with an explicit timestamp
    pub fn record_at(
        &mut self,
        kind: EventKind,
        message: impl Into<String>,
        person_id: Option<String>,
        position: Option<Position>,
        timestamp: Timestamp,
    ) -> &EventRecord {
        let record = EventRecord {
            id: self.next_id,
            kind,
            message: message.into(),
            person_id,
            position,
            timestamp,
        };
        self.next_id += 1;
        self.entries.push_front(record);
        self.enforce_capacity();
        &self.entries[0]
    }

    /// The newest `limit` events, newest first
    pub fn recent(&self, limit: usize) -> impl Iterator<Item = &EventRecord> {
        self.entries.iter().take(limit)
    }

    /// Events of one kind, newest first
    pub fn of_kind(&self, kind: EventKind) -> impl Iterator<Item = &EventRecord> {
        self.entries.iter().filter(move |e| e.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn enforce_capacity(&mut self) {
        self.entries.truncate(self.max_size);
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EVENTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newest_first() {
        let mut log = EventLog::new(10);
        log.record(EventKind::PersonAdded, "first");
        log.record(EventKind::PersonRemoved, "second");

        let messages: Vec<_> = log.recent(10).map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["second", "first"]);
    }

    #[test]
    fn test_capacity_enforced() {
        let mut log = EventLog::new(3);
        for i in 0..5 {
            log.record(EventKind::StatusChange, format!("event {}", i));
        }

        assert_eq!(log.len(), 3);
        let newest = log.recent(1).next().unwrap();
        assert_eq!(newest.message, "event 4");
        let oldest = log.recent(3).last().unwrap();
        assert_eq!(oldest.message, "event 2");
    }

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let mut log = EventLog::new(10);
        let a = log.record(EventKind::SosAlert, "a").id;
        let b = log.record(EventKind::SosAlert, "b").id;
        assert!(b > a);
    }

    #[test]
    fn test_of_kind_filters() {
        let mut log = EventLog::new(10);
        log.record(EventKind::SosAlert, "sos");
        log.record_for(EventKind::StatusChange, "change", "S1", None);
        log.record(EventKind::SosAlert, "sos again");

        assert_eq!(log.of_kind(EventKind::SosAlert).count(), 2);
        let change = log.of_kind(EventKind::StatusChange).next().unwrap();
        assert_eq!(change.person_id.as_deref(), Some("S1"));
    }

    #[test]
    fn test_shrinking_capacity_drops_oldest() {
        let mut log = EventLog::new(10);
        for i in 0..6 {
            log.record(EventKind::DevicePing, format!("ping {}", i));
        }
        log.set_max_size(2);

        let messages: Vec<_> = log.recent(10).map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["ping 5", "ping 4"]);
    }

    #[test]
    fn test_round_trips_through_json() {
        let mut log = EventLog::new(5);
        log.record(EventKind::CalamityActivated, "on");
        let json = serde_json::to_string(&log).unwrap();
        let restored: EventLog = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, log);
    }
}
