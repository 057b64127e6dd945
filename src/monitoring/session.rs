use crate::aggregator::EventLog;
use crate::alerts::{Alert, AlertManager, NotificationSink};
use crate::config::Config;
use crate::error::MonitorError;
use crate::events::{EventKind, SensorReading, TrackedPerson};
use crate::monitoring::{RefreshTimer, Snapshot};
use crate::roster::{sample_roster, Device, DeviceRegistry, PersonUpdate, Roster};
use crate::simulator::{SimulationPolicy, StatusSimulator, TickReport};
use crate::storage::{keys, load_or_default, save_json, KeyValueStore, Settings};
use chrono::Utc;
use log::{debug, error, info, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::time::Instant;

/// Whether calamity mode is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitoringState {
    Inactive,
    Active,
}

/// The single owner of all monitoring state
///
/// Roster, devices, alerts and the event log live here and are only mutated
/// through the session, one operation at a time. The session never sleeps:
/// the host drives it by calling [`MonitoringSession::poll`] whenever
/// [`MonitoringSession::next_due`] has passed.
pub struct MonitoringSession {
    config: Config,
    roster: Roster,
    devices: DeviceRegistry,
    events: EventLog,
    settings: Settings,
    alerts: AlertManager,
    simulator: StatusSimulator,
    rng: ChaCha8Rng,
    store: Box<dyn KeyValueStore>,
    /// Sensor readings waiting for the next tick
    pending: Vec<SensorReading>,
    /// At most one armed refresh timer
    timer: Option<RefreshTimer>,
    timer_generation: u64,
    cycles: u64,
    snapshot: Snapshot,
}

impl std::fmt::Debug for MonitoringSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitoringSession")
            .field("state", &self.state())
            .field("people", &self.roster.len())
            .field("devices", &self.devices.len())
            .field("alerts", &self.alerts.len())
            .field("pending", &self.pending.len())
            .field("cycles", &self.cycles)
            .finish_non_exhaustive()
    }
}

impl MonitoringSession {
    /// Build a session from whatever `store` holds
    ///
    /// Missing or corrupt blobs fall back to empty defaults. Alerts are not
    /// persisted, so a loaded session always starts with none.
    pub fn load(
        config: Config,
        store: Box<dyn KeyValueStore>,
        sink: Box<dyn NotificationSink>,
    ) -> Self {
        let roster: Roster = load_or_default(store.as_ref(), keys::ROSTER);
        let devices: DeviceRegistry = load_or_default(store.as_ref(), keys::DEVICES);
        let mut events: EventLog = load_or_default(store.as_ref(), keys::EVENTS);
        events.set_max_size(config.storage.max_events);
        let settings: Settings = load_or_default(store.as_ref(), keys::SETTINGS);

        let rng = match config.simulation.seed {
            Some(seed) => {
                info!("Using fixed simulation seed {}", seed);
                ChaCha8Rng::seed_from_u64(seed)
            }
            None => ChaCha8Rng::from_entropy(),
        };

        let alerts = AlertManager::new(config.alerts.max_retained, sink);
        let simulator = StatusSimulator::new(SimulationPolicy::from(&config.simulation));
        let snapshot = Snapshot::capture(0, Utc::now(), &roster, &alerts, devices.stats());

        info!(
            "Loaded {} people, {} devices and {} events",
            roster.len(),
            devices.len(),
            events.len()
        );

        Self {
            config,
            roster,
            devices,
            events,
            settings,
            alerts,
            simulator,
            rng,
            store,
            pending: Vec::new(),
            timer: None,
            timer_generation: 0,
            cycles: 0,
            snapshot,
        }
    }

    /// Replace the random source, typically with a seeded one in tests
    pub fn with_rng(mut self, rng: ChaCha8Rng) -> Self {
        self.rng = rng;
        self
    }

    /// Whether the persisted calamity flag is set
    pub fn calamity_flag(store: &dyn KeyValueStore) -> bool {
        load_or_default(store, keys::CALAMITY_ACTIVE)
    }

    /// Enter calamity mode
    ///
    /// Runs one refresh cycle immediately and arms the refresh timer one
    /// interval after `now`. Calling this while already active cancels the
    /// armed timer before arming a new one, so there is never more than one.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Precondition` if the roster is empty. No timer
    /// is armed or cancelled in that case.
    pub fn start_monitoring(&mut self, now: Instant) -> Result<&Snapshot, MonitorError> {
        if self.roster.is_empty() {
            return Err(MonitorError::Precondition(
                "cannot start monitoring with an empty roster".to_string(),
            ));
        }

        match self.timer.take() {
            Some(previous) => debug!("Cancelled refresh timer #{}", previous.generation()),
            None => {
                info!("Calamity mode activated for {} people", self.roster.len());
                self.events.record(
                    EventKind::CalamityActivated,
                    format!("Calamity mode activated for {} people", self.roster.len()),
                );
                self.persist(keys::CALAMITY_ACTIVE, &true);
            }
        }

        self.run_cycle();

        self.timer_generation += 1;
        let timer = RefreshTimer::arm(
            self.config.simulation.refresh_interval(),
            now,
            self.timer_generation,
        );
        debug!(
            "Armed refresh timer #{} every {:?}",
            timer.generation(),
            timer.interval()
        );
        self.timer = Some(timer);

        Ok(&self.snapshot)
    }

    /// Leave calamity mode, returning false if it was not active
    pub fn stop_monitoring(&mut self) -> bool {
        if self.timer.take().is_none() {
            return false;
        }

        info!("Calamity mode deactivated after {} cycles", self.cycles);
        self.events
            .record(EventKind::CalamityDeactivated, "Calamity mode deactivated");
        self.persist(keys::CALAMITY_ACTIVE, &false);
        self.persist(keys::EVENTS, &self.events);
        true
    }

    /// Run the refresh cycle if the timer is due
    ///
    /// At most one cycle runs per call; intervals missed while the host was
    /// busy are skipped.
    pub fn poll(&mut self, now: Instant) -> Option<&Snapshot> {
        if !self.timer.as_mut()?.fire(now) {
            return None;
        }
        Some(self.run_cycle())
    }

    /// Next refresh deadline, `None` while inactive
    pub fn next_due(&self) -> Option<Instant> {
        self.timer.as_ref().map(RefreshTimer::next_due)
    }

    pub fn state(&self) -> MonitoringState {
        if self.timer.is_some() {
            MonitoringState::Active
        } else {
            MonitoringState::Inactive
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == MonitoringState::Active
    }

    /// Apply queued sensor readings, simulate one step and save the roster
    ///
    /// Safe to call on an empty roster and whether or not monitoring is
    /// active.
    pub fn tick(&mut self) -> TickReport {
        let readings = std::mem::take(&mut self.pending);
        let report = self.simulator.tick(
            &mut self.roster,
            &mut self.alerts,
            &mut self.events,
            readings,
            &mut self.rng,
            Utc::now(),
        );
        if report.moved + report.sensor_updates > 0 || !report.changes.is_empty() {
            debug!(
                "Tick moved {} people, applied {} readings, {} status changes",
                report.moved,
                report.sensor_updates,
                report.changes.len()
            );
        }

        self.persist(keys::ROSTER, &self.roster);
        report
    }

    fn run_cycle(&mut self) -> &Snapshot {
        self.tick();
        self.alerts.refresh_view();
        self.cycles += 1;
        self.snapshot = Snapshot::capture(
            self.cycles,
            Utc::now(),
            &self.roster,
            &self.alerts,
            self.devices.stats(),
        );
        &self.snapshot
    }

    /// Snapshot of the current state without running a cycle
    pub fn get_snapshot(&self) -> Snapshot {
        Snapshot::capture(
            self.cycles,
            Utc::now(),
            &self.roster,
            &self.alerts,
            self.devices.stats(),
        )
    }

    /// Snapshot produced by the most recent refresh cycle
    pub fn last_snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Raise an SOS alert for a person on the roster
    ///
    /// The person's status is left as it is.
    pub fn raise(&mut self, person_id: &str) -> Result<Alert, MonitorError> {
        let person = self
            .roster
            .get(person_id)
            .ok_or_else(|| MonitorError::UnknownPerson(person_id.to_string()))?;
        let alert = self.alerts.raise(person).clone();
        self.events.record_for(
            EventKind::SosAlert,
            format!("SOS alert from {}", person.name),
            &person.id,
            Some(person.position()),
        );
        Ok(alert)
    }

    /// Acknowledge the alert at `index` in the displayed active list
    ///
    /// Out of range or already acknowledged positions are ignored.
    pub fn acknowledge(&mut self, index: usize) -> Option<Alert> {
        let alert = self.alerts.acknowledge(index)?.clone();
        let person = self.roster.get(&alert.person_id);
        let name = person.map_or(alert.person_id.as_str(), |p| p.name.as_str());
        self.events.record_at(
            EventKind::SosAcknowledged,
            format!("{} for {} acknowledged", alert.label(), name),
            Some(alert.person_id.clone()),
            person.map(TrackedPerson::position),
            Utc::now(),
        );
        Some(alert)
    }

    /// Unacknowledged alerts, newest first
    pub fn list_active(&self) -> impl Iterator<Item = &Alert> + '_ {
        self.alerts.list_active()
    }

    /// Queue a live sensor reading for the next tick
    pub fn ingest(&mut self, reading: SensorReading) {
        debug!("Queued reading from {}", reading.device_id);
        self.pending.push(reading);
    }

    pub fn pending_readings(&self) -> usize {
        self.pending.len()
    }

    /// Add a person, who starts out `safe`
    pub fn add_person(&mut self, mut person: TrackedPerson) -> Result<(), MonitorError> {
        person.status = Default::default();
        let message = format!("{} added to {}", person.name, person.group);
        let id = person.id.clone();
        self.roster.add(person)?;
        self.events
            .record_for(EventKind::PersonAdded, message, &id, None);
        self.persist(keys::ROSTER, &self.roster);
        Ok(())
    }

    pub fn update_person(&mut self, id: &str, update: PersonUpdate) -> Result<(), MonitorError> {
        self.roster.update(id, update)?;
        self.persist(keys::ROSTER, &self.roster);
        Ok(())
    }

    /// Remove a person; alerts referring to them are kept
    pub fn remove_person(&mut self, id: &str) -> Result<TrackedPerson, MonitorError> {
        let person = self.roster.remove(id)?;
        self.events.record_for(
            EventKind::PersonRemoved,
            format!("{} removed", person.name),
            &person.id,
            None,
        );
        self.persist(keys::ROSTER, &self.roster);
        Ok(person)
    }

    /// Append `count` generated people, returning how many were added
    pub fn seed_sample(&mut self, count: usize) -> usize {
        let people = sample_roster(count, self.roster.len(), &self.settings, &mut self.rng);
        let mut added = 0;
        for person in people {
            match self.add_person(person) {
                Ok(()) => added += 1,
                Err(e) => warn!("Skipping sample person: {}", e),
            }
        }
        info!("Added {} sample people", added);
        added
    }

    pub fn register_device(&mut self, device: Device) -> Result<(), MonitorError> {
        let registered = self.devices.register(device, &mut self.roster)?;
        let message = format!("{:?} device {} registered", registered.kind, registered.id);
        let person_id = registered.assigned_to.clone();
        self.events.record_at(
            EventKind::DeviceRegistered,
            message,
            person_id,
            None,
            Utc::now(),
        );
        self.persist(keys::DEVICES, &self.devices);
        self.persist(keys::ROSTER, &self.roster);
        Ok(())
    }

    pub fn unregister_device(&mut self, id: &str) -> Result<Device, MonitorError> {
        let device = self.devices.unregister(id, &mut self.roster)?;
        self.events.record_at(
            EventKind::DeviceUnregistered,
            format!("Device {} unregistered", device.id),
            device.assigned_to.clone(),
            None,
            Utc::now(),
        );
        self.persist(keys::DEVICES, &self.devices);
        self.persist(keys::ROSTER, &self.roster);
        Ok(device)
    }

    pub fn ping_device(&mut self, id: &str) -> Result<(), MonitorError> {
        let device = self.devices.ping(id, Utc::now())?;
        let message = format!("Device {} responded to ping", device.id);
        let person_id = device.assigned_to.clone();
        self.events
            .record_at(EventKind::DevicePing, message, person_id, None, Utc::now());
        Ok(())
    }

    /// Advance the device fleet simulation, returning how many devices toggled
    pub fn simulate_devices(&mut self) -> usize {
        let policy = self.config.devices.policy();
        self.devices.simulate(&policy, &mut self.rng)
    }

    pub fn update_settings(&mut self, settings: Settings) {
        self.settings = settings;
        self.persist(keys::SETTINGS, &self.settings);
    }

    /// Save roster, devices, events and settings
    ///
    /// # Errors
    ///
    /// Returns the first storage failure; later blobs are not attempted.
    pub fn persist_all(&self) -> Result<(), MonitorError> {
        let store = self.store.as_ref();
        save_json(store, keys::ROSTER, &self.roster)?;
        save_json(store, keys::DEVICES, &self.devices)?;
        save_json(store, keys::EVENTS, &self.events)?;
        save_json(store, keys::SETTINGS, &self.settings)?;
        debug!("Persisted all state");
        Ok(())
    }

    fn persist<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        if let Err(e) = save_json(self.store.as_ref(), key, value) {
            error!("Failed to save '{}': {}", key, e);
        }
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn alerts(&self) -> &AlertManager {
        &self.alerts
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Refresh cycles run so far
    pub fn cycles(&self) -> u64 {
        self.cycles
    }
}
