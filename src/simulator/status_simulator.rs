use crate::aggregator::EventLog;
use crate::alerts::AlertManager;
use crate::config::{SimulationConfig, MAX_JITTER_RADIUS};
use crate::events::{EventKind, SensorReading, Status, Timestamp, TrackedPerson};
use crate::roster::Roster;
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;

/// Probabilities and radius driving the simulated movement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationPolicy {
    /// Chance per tick that a person with a locator is updated
    pub jitter_probability: f64,
    /// Chance per tick, among updated people, of drawing a new status
    pub status_change_probability: f64,
    /// Maximum displacement per axis, in degrees
    pub jitter_radius: f64,
}

impl Default for SimulationPolicy {
    fn default() -> Self {
        Self::from(&SimulationConfig::default())
    }
}

impl From<&SimulationConfig> for SimulationPolicy {
    fn from(config: &SimulationConfig) -> Self {
        Self {
            jitter_probability: config.jitter_probability,
            status_change_probability: config.status_change_probability,
            jitter_radius: config.jitter_radius,
        }
    }
}

/// A status transition observed during a tick
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub person_id: String,
    pub from: Status,
    pub to: Status,
}

/// What a single tick did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// People moved by the simulator
    pub moved: usize,
    /// People updated from sensor readings
    pub sensor_updates: usize,
    /// Readings whose device matched nobody
    pub unmatched_readings: usize,
    pub changes: Vec<StatusChange>,
    /// Alerts raised by transitions into `trapped`
    pub alerts_raised: usize,
}

/// Perturbs positions and statuses of people carrying locators
///
/// Each tick is an independent set of Bernoulli trials: nothing carries over
/// between ticks except the roster itself.
#[derive(Debug, Clone, Default)]
pub struct StatusSimulator {
    policy: SimulationPolicy,
}

impl StatusSimulator {
    /// Probabilities are clamped to `[0, 1]` and the radius to
    /// `[0, MAX_JITTER_RADIUS]`; non-finite values become zero.
    pub fn new(policy: SimulationPolicy) -> Self {
        let bounded = |value: f64, max: f64| {
            if value.is_finite() {
                value.clamp(0.0, max)
            } else {
                0.0
            }
        };
        Self {
            policy: SimulationPolicy {
                jitter_probability: bounded(policy.jitter_probability, 1.0),
                status_change_probability: bounded(policy.status_change_probability, 1.0),
                jitter_radius: bounded(policy.jitter_radius, MAX_JITTER_RADIUS),
            },
        }
    }

    pub fn policy(&self) -> &SimulationPolicy {
        &self.policy
    }

    /// Run one tick over the roster
    ///
    /// Sensor `readings` are applied first and are authoritative: a person
    /// updated from a reading is not randomized in the same tick. Every
    /// other person with a locator is then jittered with the jitter
    /// probability and, if jittered, given a uniformly drawn status with the
    /// status-change probability. Transitions are logged and a transition
    /// into `trapped` raises an alert.
    pub fn tick<R: Rng + ?Sized>(
        &self,
        roster: &mut Roster,
        alerts: &mut AlertManager,
        events: &mut EventLog,
        readings: Vec<SensorReading>,
        rng: &mut R,
        now: Timestamp,
    ) -> TickReport {
        let mut report = TickReport::default();
        let mut from_sensor = HashSet::new();

        for reading in readings {
            let carrier = roster.iter_mut().find(|p| p.carries_device(&reading.device_id));
            let Some(person) = carrier else {
                warn!("Dropping reading from unknown device {}", reading.device_id);
                report.unmatched_readings += 1;
                continue;
            };

            person.latitude = reading.latitude;
            person.longitude = reading.longitude;
            person.last_update = Some(now);
            events.record_at(
                EventKind::SensorUpdate,
                format!("Reading from {} for {}", reading.device_id, person.name),
                Some(person.id.clone()),
                Some(person.position()),
                now,
            );
            Self::transition(person, reading.status(), alerts, events, &mut report, now);

            from_sensor.insert(person.id.clone());
            report.sensor_updates += 1;
        }

        let radius = self.policy.jitter_radius;
        for person in roster.iter_mut() {
            if !person.has_locator() || from_sensor.contains(&person.id) {
                continue;
            }
            if !rng.gen_bool(self.policy.jitter_probability) {
                continue;
            }

            person.latitude += rng.gen_range(-radius..=radius);
            person.longitude += rng.gen_range(-radius..=radius);
            report.moved += 1;
            debug!(
                "{} moved to {:.6}, {:.6}",
                person.id, person.latitude, person.longitude
            );

            if rng.gen_bool(self.policy.status_change_probability) {
                let drawn = *Status::ALL.choose(rng).unwrap_or(&person.status);
                Self::transition(person, drawn, alerts, events, &mut report, now);
            }

            person.last_update = Some(now);
        }

        report
    }

    fn transition(
        person: &mut TrackedPerson,
        status: Status,
        alerts: &mut AlertManager,
        events: &mut EventLog,
        report: &mut TickReport,
        now: Timestamp,
    ) {
        let previous = person.status;
        if previous == status {
            return;
        }

        person.status = status;
        info!(
            "{} ({}) status changed from {} to {}",
            person.name, person.id, previous, status
        );
        events.record_at(
            EventKind::StatusChange,
            format!(
                "{} status changed from {} to {}",
                person.name, previous, status
            ),
            Some(person.id.clone()),
            Some(person.position()),
            now,
        );
        report.changes.push(StatusChange {
            person_id: person.id.clone(),
            from: previous,
            to: status,
        });

        if status == Status::Trapped {
            alerts.raise_at(person, now);
            events.record_at(
                EventKind::SosAlert,
                format!("SOS alert from {}", person.name),
                Some(person.id.clone()),
                Some(person.position()),
                now,
            );
            report.alerts_raised += 1;
        }
    }
}


// Property-based tests
#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::alerts::LogSink;
    use chrono::Utc;
    use quickcheck_macros::quickcheck;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[quickcheck]
    fn prop_status_always_valid_and_alerts_match_trapped_transitions(
        seed: u64,
        people: u8,
        ticks: u8,
    ) -> bool {
        let mut roster = Roster::new();
        for i in 0..(people % 30) as usize {
            let mut person = TrackedPerson::new(format!("S{}", i), "P", "G", 0.0, 0.0);
            if i % 3 != 0 {
                person = person.with_locator(format!("GPS{}", i));
            }
            let _ = roster.add(person);
        }
        let mut alerts = AlertManager::new(10_000, Box::new(LogSink));
        let mut events = EventLog::new(100_000);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let simulator = StatusSimulator::new(SimulationPolicy {
            jitter_probability: 0.5,
            status_change_probability: 0.5,
            jitter_radius: 0.001,
        });

        let mut trapped_transitions = 0;
        for _ in 0..(ticks % 20) {
            let report = simulator.tick(
                &mut roster,
                &mut alerts,
                &mut events,
                Vec::new(),
                &mut rng,
                Utc::now(),
            );
            trapped_transitions += report
                .changes
                .iter()
                .filter(|c| c.to == Status::Trapped)
                .count();
        }

        let valid = roster.iter().all(|p| Status::ALL.contains(&p.status));
        valid && alerts.len() == trapped_transitions
    }
}
