//! Poll loop turning call snapshots into lifecycle events.
//!
//! Each cycle fetches the active calls, folds every bridged call into the
//! store (announcing new calls and first answers) and then ends every stored
//! call that is no longer reported. Ending runs only after all reported calls
//! were processed, so a call that merely changed status is never ended.

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::adapters::{EventSink, NotifyError, PbxApi, PbxError, RetryPolicy};
use crate::domain::{CallParties, CallRecord, CallSnapshot, CallStatus, Direction, EventKind, HangupCause};

use super::classifier::CallClassifier;
use super::notifier::Notifier;
use super::store::CallStore;

/// Loop settings
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// Pause between two polls
    pub poll_interval: Duration,

    /// Re-login policy after the PBX rejected the session
    pub retry: RetryPolicy,

    /// Agent number reported for calls that were never picked up from a queue
    pub queue_extension: String,

    /// Report calls that ended while still waiting in a queue
    pub log_missed_queue_calls: bool,
}

/// Counters for one reconciled snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Calls seen for the first time
    pub new_calls: usize,

    /// Calls answered for the first time
    pub answered: usize,

    /// Calls no longer reported (removed from the store)
    pub ended: usize,

    /// Snapshots that are not bridged
    pub ignored: usize,

    /// Events the ticketing system did not accept
    pub failed_notifications: usize,
}

impl CycleReport {
    pub fn has_activity(&self) -> bool {
        self.new_calls + self.answered + self.ended + self.failed_notifications > 0
    }
}

/// What a single poll did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Snapshots were fetched and reconciled
    Reconciled(CycleReport),

    /// The PBX rejected the session; logged in again, nothing reconciled
    Reauthenticated,

    /// Fetching failed; nothing reconciled
    Skipped,
}

/// Owns the call store and drives the poll cycle
pub struct Reconciler<P, S> {
    pbx: P,
    notifier: Notifier<S>,
    classifier: CallClassifier,
    settings: BridgeSettings,
    store: CallStore,
}

impl<P: PbxApi, S: EventSink> Reconciler<P, S> {
    pub fn new(pbx: P, sink: S, classifier: CallClassifier, settings: BridgeSettings) -> Self {
        Self {
            pbx,
            notifier: Notifier::new(sink),
            classifier,
            settings,
            store: CallStore::new(),
        }
    }

    pub fn store(&self) -> &CallStore {
        &self.store
    }

    pub fn pbx(&self) -> &P {
        &self.pbx
    }

    pub fn sink(&self) -> &S {
        self.notifier.sink()
    }

    /// Poll forever. Returns only when the PBX stayed unreachable for longer
    /// than the retry policy allows.
    pub async fn run(&mut self) -> Result<(), PbxError> {
        info!(
            generation = %self.pbx.generation(),
            sink = self.notifier.sink().name(),
            interval = ?self.settings.poll_interval,
            "Listening for calls"
        );

        loop {
            if let CycleOutcome::Reconciled(report) = self.poll().await? {
                if report.has_activity() {
                    debug!(?report, tracked = self.store.len(), "Cycle complete");
                }
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    /// Run one poll cycle.
    ///
    /// An authentication failure triggers a new login; the snapshot is
    /// fetched again on the next tick. Any other fetch failure skips the
    /// cycle without touching the store.
    pub async fn poll(&mut self) -> Result<CycleOutcome, PbxError> {
        match self.pbx.fetch_active_calls().await {
            Ok(snapshots) => Ok(CycleOutcome::Reconciled(self.reconcile(snapshots).await)),
            Err(err) if err.is_auth_failure() => {
                warn!(error = %err, status = ?err.status(), "PBX rejected the session, authenticating again");
                self.pbx.authenticate_with_retry(&self.settings.retry).await?;
                Ok(CycleOutcome::Reauthenticated)
            }
            Err(err) => {
                error!(error = %err, status = ?err.status(), "Unable to fetch active calls");
                Ok(CycleOutcome::Skipped)
            }
        }
    }

    /// Fold one complete snapshot list into the store and emit the events it
    /// implies.
    pub async fn reconcile(&mut self, snapshots: Vec<CallSnapshot>) -> CycleReport {
        let mut report = CycleReport::default();
        let mut seen = HashSet::new();

        for snapshot in snapshots {
            let pbx = &self.pbx;
            let Some((direction, parties)) = self
                .classifier
                .classify(&snapshot, |number| pbx.is_monitored_extension(number))
            else {
                report.ignored += 1;
                continue;
            };

            seen.insert(snapshot.id.clone());
            self.track(snapshot, direction, parties, &mut report).await;
        }

        for id in self.store.absent_from(&seen) {
            if let Some(record) = self.store.remove(&id) {
                report.ended += 1;
                self.finish(record, &mut report).await;
            }
        }

        report
    }

    async fn track(
        &mut self,
        snapshot: CallSnapshot,
        direction: Direction,
        parties: CallParties,
        report: &mut CycleReport,
    ) {
        let mut record = match self.store.get(&snapshot.id) {
            Some(known) => {
                let mut record = known.clone();
                record.observe(direction, parties, snapshot.status);
                record
            }
            None => {
                let mut record = CallRecord::new(snapshot.id, direction, parties, snapshot.status);
                report.new_calls += 1;
                let result = self.notifier.new_call(&mut record).await;
                log_failure(&record, EventKind::NewCall, result, report);
                record
            }
        };

        if record.status == CallStatus::Talking && !record.notified_answered {
            report.answered += 1;
            let result = self.notifier.answer(&mut record).await;
            log_failure(&record, EventKind::Answer, result, report);
        }

        self.store.upsert(record);
    }

    /// Send the terminal event for a call that disappeared
    async fn finish(&self, mut record: CallRecord, report: &mut CycleReport) {
        let duration_secs = (Utc::now() - record.first_seen).num_seconds();

        let cause = match record.status {
            CallStatus::Routing => HangupCause::Cancel,
            CallStatus::Talking => HangupCause::NormalClearing,
            CallStatus::Transferring if self.settings.log_missed_queue_calls => {
                record.agent_number = self.settings.queue_extension.clone();
                HangupCause::Cancel
            }
            _ => {
                debug!(
                    call_id = %record.id,
                    uid = %record.uid,
                    status = %record.status,
                    duration_secs,
                    "Call ended without a reportable status"
                );
                return;
            }
        };

        debug!(
            call_id = %record.id,
            uid = %record.uid,
            status = %record.status,
            duration_secs,
            "Call ended"
        );
        let result = self.notifier.hangup(&mut record, cause).await;
        log_failure(&record, EventKind::Hangup, result, report);
    }
}

fn log_failure(record: &CallRecord, event: EventKind, result: Result<(), NotifyError>, report: &mut CycleReport) {
    if let Err(err) = result {
        report.failed_notifications += 1;
        error!(
            call_id = %record.id,
            uid = %record.uid,
            %event,
            error = %err,
            "Unable to notify the ticketing system"
        );
    }
}
