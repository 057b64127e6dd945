//! Notification sinks for newly raised SOS alerts
//!
//! The alert manager does not know how an alert is surfaced to the operator.
//! It hands every new alert to a sink, which may log it, ring a bell, or drop
//! it when too many have been played recently.

use crate::alerts::{Alert, RateLimiter};
use crate::error::AlertError;
use crate::events::TrackedPerson;
use chrono::Utc;
use log::{info, warn};
use std::io::Write;

#[cfg(test)]
use mockall::automock;

/// Receiver of "play alert" signals
#[cfg_attr(test, automock)]
pub trait NotificationSink: Send {
    /// Signal that `alert` was raised for `person`
    fn play_alert(&mut self, alert: &Alert, person: &TrackedPerson) -> Result<(), AlertError>;
}

/// Sink that only writes to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn play_alert(&mut self, alert: &Alert, person: &TrackedPerson) -> Result<(), AlertError> {
        warn!(
            "SOS {} from {} ({}) at {:.6}, {:.6}",
            alert.label(),
            person.name,
            person.id,
            person.latitude,
            person.longitude
        );
        Ok(())
    }
}

/// Sink that rings the terminal bell and prints a line to stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalBell;

impl NotificationSink for TerminalBell {
    fn play_alert(&mut self, alert: &Alert, person: &TrackedPerson) -> Result<(), AlertError> {
        let mut stderr = std::io::stderr().lock();
        writeln!(
            stderr,
            "\x07SOS {}: {} ({}) needs rescue at {:.6}, {:.6}",
            alert.label(),
            person.name,
            person.group,
            person.latitude,
            person.longitude
        )?;
        stderr.flush()?;
        Ok(())
    }
}

/// Wraps a sink with a sliding-window rate limit
///
/// Alerts over the limit are not forwarded; the call returns
/// `AlertError::RateLimitExceeded` so the caller can note the suppression.
#[derive(Debug)]
pub struct ThrottledSink<S> {
    inner: S,
    limiter: RateLimiter,
}

impl<S: NotificationSink> ThrottledSink<S> {
    pub fn new(inner: S, limiter: RateLimiter) -> Self {
        Self { inner, limiter }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: NotificationSink> NotificationSink for ThrottledSink<S> {
    fn play_alert(&mut self, alert: &Alert, person: &TrackedPerson) -> Result<(), AlertError> {
        if !self.limiter.try_acquire_at(Utc::now()) {
            info!("Notification for {} suppressed by rate limit", alert.label());
            return Err(AlertError::RateLimitExceeded);
        }
        self.inner.play_alert(alert, person)
    }
}

/// Sink that forwards each alert to every sink in the list
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn NotificationSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: Box<dyn NotificationSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl NotificationSink for FanoutSink {
    /// Every sink is tried; the first failure is reported
    fn play_alert(&mut self, alert: &Alert, person: &TrackedPerson) -> Result<(), AlertError> {
        let mut first_error = None;
        for sink in &mut self.sinks {
            if let Err(e) = sink.play_alert(alert, person) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
