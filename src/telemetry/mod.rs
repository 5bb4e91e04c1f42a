//! Telemetry for localai-router
//!
//! In-process event log and counters for routed requests, health changes and
//! backups. Nothing leaves the process; the CLI prints a summary on exit.

use crate::health::{HealthStatus, HealthSummary, ServiceHealthMonitor, StatusTransition};
use crate::router::types::{Provenance, RequestKind};
use crate::snapshot::types::Trigger;
use colored::Colorize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::debug;

/// Events kept before the oldest are discarded
pub const MAX_EVENTS: usize = 1000;

/// Telemetry event types
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    RequestRouted {
        kind: RequestKind,
        provenance: Provenance,
        success: bool,
        duration_ms: u64,
        timestamp: Instant,
    },
    StatusChanged {
        service: String,
        from: HealthStatus,
        to: HealthStatus,
        timestamp: Instant,
    },
    HealthCycle {
        healthy: usize,
        total: usize,
        timestamp: Instant,
    },
    BackupCreated {
        id: String,
        trigger: Trigger,
        size_bytes: u64,
        timestamp: Instant,
    },
    BackupSkipped {
        timestamp: Instant,
    },
    BackupFailed {
        error: String,
        timestamp: Instant,
    },
}

/// Telemetry statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryStats {
    pub requests_routed: usize,
    pub local_requests: usize,
    pub fallback_requests: usize,
    pub failed_requests: usize,
    pub status_changes: usize,
    pub health_cycles: usize,
    pub backups_created: usize,
    pub backups_skipped: usize,
    pub backups_failed: usize,
}

/// Telemetry collector, cheap to clone
#[derive(Clone)]
pub struct TelemetryCollector {
    events: Arc<Mutex<VecDeque<TelemetryEvent>>>,
    stats: Arc<Mutex<TelemetryStats>>,
    start_time: Instant,
}

impl TelemetryCollector {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            stats: Arc::new(Mutex::new(TelemetryStats::default())),
            start_time: Instant::now(),
        }
    }

    /// Record an event
    pub fn record(&self, event: TelemetryEvent) {
        {
            let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
            match &event {
                TelemetryEvent::RequestRouted {
                    provenance,
                    success,
                    ..
                } => {
                    stats.requests_routed += 1;
                    match provenance {
                        Provenance::Local => stats.local_requests += 1,
                        Provenance::Fallback => stats.fallback_requests += 1,
                    }
                    if !success {
                        stats.failed_requests += 1;
                    }
                }
                TelemetryEvent::StatusChanged { .. } => stats.status_changes += 1,
                TelemetryEvent::HealthCycle { .. } => stats.health_cycles += 1,
                TelemetryEvent::BackupCreated { .. } => stats.backups_created += 1,
                TelemetryEvent::BackupSkipped { .. } => stats.backups_skipped += 1,
                TelemetryEvent::BackupFailed { .. } => stats.backups_failed += 1,
            }
        }

        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        if events.len() == MAX_EVENTS {
            events.pop_front();
        }
        events.push_back(event);
    }

    pub fn record_request(
        &self,
        kind: RequestKind,
        provenance: Provenance,
        success: bool,
        duration_ms: u64,
    ) {
        self.record(TelemetryEvent::RequestRouted {
            kind,
            provenance,
            success,
            duration_ms,
            timestamp: Instant::now(),
        });
    }

    pub fn get_stats(&self) -> TelemetryStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    pub fn event_count(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Get recent events (last n)
    pub fn recent_events(&self, n: usize) -> Vec<TelemetryEvent> {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        let start = events.len().saturating_sub(n);
        events.iter().skip(start).cloned().collect()
    }

    /// Share of routed requests served locally
    pub fn local_rate(&self) -> f64 {
        let stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        if stats.requests_routed == 0 {
            0.0
        } else {
            stats.local_requests as f64 / stats.requests_routed as f64
        }
    }

    /// Record the monitor's transitions and summaries until it goes away
    pub fn attach_monitor(&self, monitor: &ServiceHealthMonitor) -> JoinHandle<()> {
        let collector = self.clone();
        let mut transitions = monitor.subscribe_transitions();
        let mut summaries = monitor.subscribe_summaries();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = transitions.recv() => match event {
                        Ok(transition) => collector.record_transition(&transition),
                        Err(RecvError::Lagged(missed)) => debug!(missed, "Telemetry lagged behind transitions"),
                        Err(RecvError::Closed) => break,
                    },
                    event = summaries.recv() => match event {
                        Ok(summary) => collector.record_summary(&summary),
                        Err(RecvError::Lagged(missed)) => debug!(missed, "Telemetry lagged behind summaries"),
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        })
    }

    fn record_transition(&self, transition: &StatusTransition) {
        self.record(TelemetryEvent::StatusChanged {
            service: transition.service.clone(),
            from: transition.old_status,
            to: transition.new_status,
            timestamp: Instant::now(),
        });
    }

    fn record_summary(&self, summary: &HealthSummary) {
        self.record(TelemetryEvent::HealthCycle {
            healthy: summary.healthy,
            total: summary.total,
            timestamp: Instant::now(),
        });
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Print a summary of collected statistics
pub fn display_summary(collector: &TelemetryCollector) {
    let stats = collector.get_stats();

    println!();
    println!("{}", "Session Summary".bold());
    println!("─────────────────────────────────────");
    println!("Duration:          {:?}", collector.elapsed());
    println!("Requests routed:   {}", stats.requests_routed);
    println!("Served locally:    {:.1}%", collector.local_rate() * 100.0);
    println!("Status changes:    {}", stats.status_changes);
    println!("Health cycles:     {}", stats.health_cycles);
    println!(
        "Backups:           {} written, {} unchanged, {} failed",
        stats.backups_created, stats.backups_skipped, stats.backups_failed
    );
    println!();
}
