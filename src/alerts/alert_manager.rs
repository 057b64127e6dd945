use crate::alerts::NotificationSink;
use crate::error::AlertError;
use crate::events::{Timestamp, TrackedPerson};
use chrono::Utc;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of alerts retained
pub const DEFAULT_MAX_RETAINED: usize = 50;

/// A distress signal raised when a person becomes trapped
///
/// The alert only references the person by id. If the person is later removed
/// from the roster the alert stays and lookups simply come back empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub id: u64,
    pub person_id: String,
    pub raised_at: Timestamp,
    /// Only ever goes from false to true
    pub acknowledged: bool,
}

impl Alert {
    /// Human-facing label, e.g. `SOS-12`
    pub fn label(&self) -> String {
        format!("SOS-{}", self.id)
    }
}

/// Creates, retains and acknowledges SOS alerts
///
/// Alerts are kept newest first and capped at `max_retained`; the oldest are
/// discarded once the cap is exceeded. Acknowledgement is addressed by
/// position in the *displayed* list of active alerts. That list is captured
/// whenever an alert is raised and whenever [`AlertManager::refresh_view`] is
/// called (once per refresh cycle), and is deliberately left alone by
/// acknowledgements: the positions an operator sees stay valid until the next
/// render, so acknowledging the same position twice has no further effect.
pub struct AlertManager {
    /// Newest first
    alerts: VecDeque<Alert>,
    max_retained: usize,
    next_id: u64,
    /// Alert ids in the order they were last displayed
    displayed: Vec<u64>,
    sink: Box<dyn NotificationSink>,
}

impl std::fmt::Debug for AlertManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertManager")
            .field("alerts", &self.alerts)
            .field("max_retained", &self.max_retained)
            .field("next_id", &self.next_id)
            .field("displayed", &self.displayed)
            .finish_non_exhaustive()
    }
}

impl AlertManager {
    /// Create a manager that keeps `max_retained` alerts and signals `sink`
    ///
    /// At least one alert is always retained.
    pub fn new(max_retained: usize, sink: Box<dyn NotificationSink>) -> Self {
        let max_retained = max_retained.max(1);
        Self {
            alerts: VecDeque::with_capacity(max_retained + 1),
            max_retained,
            next_id: 1,
            displayed: Vec::new(),
            sink,
        }
    }

    /// Raise a new unacknowledged alert for `person`
    ///
    /// The alert goes to the front of the list, the list is truncated to the
    /// retention cap, the displayed view is recomputed and the notification
    /// sink is signalled. A sink failure is logged and otherwise ignored.
    pub fn raise(&mut self, person: &TrackedPerson) -> &Alert {
        self.raise_at(person, Utc::now())
    }

    pub fn raise_at(&mut self, person: &TrackedPerson, now: Timestamp) -> &Alert {
        let alert = Alert {
            id: self.next_id,
            person_id: person.id.clone(),
            raised_at: now,
            acknowledged: false,
        };
        self.next_id += 1;
        info!("Raised {} for {} ({})", alert.label(), person.name, person.id);

        match self.sink.play_alert(&alert, person) {
            Ok(()) => {}
            Err(AlertError::RateLimitExceeded) => {
                debug!("Notification for {} was throttled", alert.label());
            }
            Err(e) => error!("Failed to signal {}: {}", alert.label(), e),
        }

        self.alerts.push_front(alert);
        if self.alerts.len() > self.max_retained {
            let dropped = self.alerts.len() - self.max_retained;
            self.alerts.truncate(self.max_retained);
            debug!("Alert list over capacity, discarded {} oldest", dropped);
        }
        self.refresh_view();

        &self.alerts[0]
    }

    /// Acknowledge the alert at `index` in the displayed active list
    ///
    /// Returns the alert if this call acknowledged it. An index outside the
    /// displayed list, an alert that has since been discarded, or one that is
    /// already acknowledged leaves everything unchanged and returns `None`.
    pub fn acknowledge(&mut self, index: usize) -> Option<&Alert> {
        let id = *self.displayed.get(index)?;
        let alert = self.alerts.iter_mut().find(|a| a.id == id)?;
        if alert.acknowledged {
            debug!("{} already acknowledged", alert.label());
            return None;
        }
        alert.acknowledged = true;
        info!("Acknowledged {} for {}", alert.label(), alert.person_id);
        Some(&*alert)
    }

    /// Unacknowledged alerts, newest first
    ///
    /// Computed lazily from the current list on every call.
    pub fn list_active(&self) -> impl Iterator<Item = &Alert> + '_ {
        self.alerts.iter().filter(|a| !a.acknowledged)
    }

    /// Capture the current active list as the displayed view
    pub fn refresh_view(&mut self) {
        self.displayed = self.list_active().map(|a| a.id).collect();
    }

    /// The displayed view, as captured by the last refresh
    ///
    /// Entries acknowledged since the capture are still present, flagged.
    pub fn displayed(&self) -> impl Iterator<Item = &Alert> + '_ {
        self.displayed
            .iter()
            .filter_map(|id| self.alerts.iter().find(|a| a.id == *id))
    }

    /// All retained alerts, newest first
    pub fn iter(&self) -> impl Iterator<Item = &Alert> + '_ {
        self.alerts.iter()
    }

    pub fn active_count(&self) -> usize {
        self.list_active().count()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn max_retained(&self) -> usize {
        self.max_retained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::sink::MockNotificationSink;
    use crate::alerts::LogSink;

    fn person(id: &str) -> TrackedPerson {
        TrackedPerson::new(id, format!("Person {}", id), "Grade 7", 7.07, 125.61)
    }

    fn manager(max: usize) -> AlertManager {
        AlertManager::new(max, Box::new(LogSink))
    }

    #[test]
    fn test_raise_is_newest_first() {
        let mut manager = manager(50);
        manager.raise(&person("S1"));
        manager.raise(&person("S2"));

        let people: Vec<_> = manager.list_active().map(|a| a.person_id.as_str()).collect();
        assert_eq!(people, vec!["S2", "S1"]);
    }

    #[test]
    fn test_raise_signals_sink_once() {
        let mut sink = MockNotificationSink::new();
        sink.expect_play_alert()
            .withf(|alert, person| alert.person_id == "S1" && person.id == "S1")
            .times(1)
            .returning(|_, _| Ok(()));

        let mut manager = AlertManager::new(50, Box::new(sink));
        let alert = manager.raise(&person("S1"));
        assert!(!alert.acknowledged);
    }

    #[test]
    fn test_sink_failure_does_not_lose_alert() {
        let mut sink = MockNotificationSink::new();
        sink.expect_play_alert()
            .returning(|_, _| Err(AlertError::NotificationFailed("muted".to_string())));

        let mut manager = AlertManager::new(50, Box::new(sink));
        manager.raise(&person("S1"));
        assert_eq!(manager.active_count(), 1);
    }

    #[test]
    fn test_cap_keeps_most_recent() {
        let mut manager = manager(50);
        for i in 0..60 {
            manager.raise(&person(&format!("S{}", i)));
        }

        assert_eq!(manager.len(), 50);
        let first = manager.iter().next().unwrap();
        let last = manager.iter().last().unwrap();
        assert_eq!(first.person_id, "S59");
        assert_eq!(last.person_id, "S10");
    }

    #[test]
    fn test_zero_capacity_keeps_newest() {
        let mut manager = manager(0);
        assert_eq!(manager.max_retained(), 1);

        manager.raise(&person("S1"));
        let newest = manager.raise(&person("S2"));
        assert_eq!(newest.person_id, "S2");
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_acknowledge_scenario() {
        let mut manager = manager(50);
        manager.raise(&person("S1"));

        let active: Vec<_> = manager.list_active().collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].person_id, "S1");

        assert!(manager.acknowledge(0).is_some());
        assert_eq!(manager.list_active().count(), 0);
    }

    #[test]
    fn test_acknowledge_twice_is_idempotent() {
        let mut manager = manager(50);
        manager.raise(&person("S1"));
        manager.raise(&person("S2"));
        manager.raise(&person("S3"));

        assert!(manager.acknowledge(1).is_some());
        let after_once: Vec<Alert> = manager.iter().cloned().collect();

        assert!(manager.acknowledge(1).is_none());
        let after_twice: Vec<Alert> = manager.iter().cloned().collect();

        assert_eq!(after_once, after_twice);
        let active: Vec<_> = manager.list_active().map(|a| a.person_id.as_str()).collect();
        assert_eq!(active, vec!["S3", "S1"]);
    }

    #[test]
    fn test_indices_follow_refreshed_view() {
        let mut manager = manager(50);
        manager.raise(&person("S1"));
        manager.raise(&person("S2"));

        // Acknowledge S2 (position 0), then re-render
        manager.acknowledge(0);
        manager.refresh_view();

        // Position 0 now refers to S1
        let acked = manager.acknowledge(0).unwrap();
        assert_eq!(acked.person_id, "S1");
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn test_acknowledge_out_of_range_is_noop() {
        let mut manager = manager(50);
        manager.raise(&person("S1"));
        let before: Vec<Alert> = manager.iter().cloned().collect();

        assert!(manager.acknowledge(1).is_none());
        assert!(manager.acknowledge(usize::MAX).is_none());

        let after: Vec<Alert> = manager.iter().cloned().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_acknowledge_on_empty_manager() {
        let mut manager = manager(50);
        assert!(manager.acknowledge(0).is_none());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_displayed_keeps_acknowledged_until_refresh() {
        let mut manager = manager(50);
        manager.raise(&person("S1"));
        manager.acknowledge(0);

        let shown: Vec<_> = manager.displayed().collect();
        assert_eq!(shown.len(), 1);
        assert!(shown[0].acknowledged);

        manager.refresh_view();
        assert_eq!(manager.displayed().count(), 0);
    }

    #[test]
    fn test_acknowledged_alerts_never_resurface() {
        let mut manager = manager(50);
        manager.raise(&person("S1"));
        manager.acknowledge(0);
        manager.raise(&person("S1"));

        // A new alert for the same person is a separate alert
        assert_eq!(manager.len(), 2);
        assert_eq!(manager.active_count(), 1);
        let active = manager.list_active().next().unwrap();
        assert_eq!(active.id, 2);
    }

    #[test]
    fn test_ids_are_unique_and_labelled() {
        let mut manager = manager(50);
        let first = manager.raise(&person("S1")).id;
        let second = manager.raise(&person("S1")).id;
        assert_ne!(first, second);
        assert_eq!(manager.iter().next().unwrap().label(), format!("SOS-{}", second));
    }
}
