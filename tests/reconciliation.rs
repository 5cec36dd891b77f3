//! Reconciliation Integration Tests
//!
//! Drives the poll cycle against a scripted PBX and records every event the
//! ticketing side would receive.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use callbridge::adapters::{ApiGeneration, EventSink, NotifyError, PbxApi, PbxError, RetryPolicy, WebhookPayload};
use callbridge::core::{BridgeSettings, CallClassifier, CycleOutcome, DigitRules, PhoneNormalizer, Reconciler};
use callbridge::domain::{CallSnapshot, EventKind, ExtensionSet, HangupCause};

/// PBX returning one scripted result per poll
struct ScriptedPbx {
    extensions: ExtensionSet,
    polls: Mutex<VecDeque<Result<Vec<CallSnapshot>, PbxError>>>,
    logins: usize,
    failing_logins: usize,
}

impl ScriptedPbx {
    fn new(polls: Vec<Result<Vec<CallSnapshot>, PbxError>>) -> Self {
        Self {
            extensions: ["150", "151"].into_iter().map(String::from).collect(),
            polls: Mutex::new(polls.into()),
            logins: 0,
            failing_logins: 0,
        }
    }
}

#[async_trait]
impl PbxApi for ScriptedPbx {
    fn generation(&self) -> ApiGeneration {
        ApiGeneration::Legacy
    }

    async fn authenticate(&mut self) -> Result<(), PbxError> {
        self.logins += 1;
        if self.failing_logins > 0 {
            self.failing_logins -= 1;
            return Err(http_error(503));
        }
        Ok(())
    }

    async fn fetch_active_calls(&self) -> Result<Vec<CallSnapshot>, PbxError> {
        self.polls.lock().unwrap().pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    fn extensions(&self) -> &ExtensionSet {
        &self.extensions
    }
}

/// Sink keeping every payload, optionally rejecting them all
#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<WebhookPayload>>,
    reject: bool,
}

impl RecordingSink {
    fn sent(&self) -> Vec<WebhookPayload> {
        self.sent.lock().unwrap().clone()
    }

    fn kinds(&self) -> Vec<EventKind> {
        self.sent().iter().map(|p| p.event).collect()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn deliver(&self, payload: &WebhookPayload) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(payload.clone());
        if self.reject {
            return Err(NotifyError::Status {
                status: 502,
                body: "bad gateway".to_string(),
            });
        }
        Ok(())
    }
}

fn http_error(status: u16) -> PbxError {
    PbxError::Status {
        context: "testing",
        status,
        body: String::new(),
    }
}

fn settings(log_missed_queue_calls: bool) -> BridgeSettings {
    BridgeSettings {
        poll_interval: Duration::from_millis(1),
        retry: RetryPolicy::new(Duration::from_millis(50)).with_interval(Duration::from_millis(1)),
        queue_extension: "800".to_string(),
        log_missed_queue_calls,
    }
}

fn reconciler(
    pbx: ScriptedPbx,
    sink: RecordingSink,
    log_missed_queue_calls: bool,
) -> Reconciler<ScriptedPbx, RecordingSink> {
    let classifier = CallClassifier::new(
        DigitRules {
            extension_digits: 3,
            trunk_digits: 10,
        },
        PhoneNormalizer::new(Some("49")),
    );
    Reconciler::new(pbx, sink, classifier, settings(log_missed_queue_calls))
}

fn call(id: &str, caller: &str, callee: &str, status: &str) -> CallSnapshot {
    CallSnapshot::from_party_text(id, caller, callee, status)
}

#[tokio::test]
async fn test_outbound_call_lifecycle() {
    let mut bridge = reconciler(ScriptedPbx::new(vec![]), RecordingSink::default(), false);

    let report = bridge
        .reconcile(vec![call("1", "150 Jane", "0300123456", "Talking")])
        .await;
    assert_eq!(report.new_calls, 1);
    assert_eq!(report.answered, 1);
    assert_eq!(bridge.store().len(), 1);

    let report = bridge.reconcile(vec![]).await;
    assert_eq!(report.ended, 1);
    assert!(bridge.store().is_empty());

    let sent = bridge.sink().sent();
    assert_eq!(
        sent.iter().map(|p| p.event).collect::<Vec<_>>(),
        vec![EventKind::NewCall, EventKind::Answer, EventKind::Hangup]
    );

    let new_call = &sent[0];
    assert_eq!(new_call.direction, "out");
    assert_eq!(new_call.from, "150");
    assert_eq!(new_call.to, "0300123456");
    assert_eq!(new_call.user, "Jane");

    // Outbound answers carry no user
    assert_eq!(sent[1].user, "");
    assert_eq!(sent[2].cause, Some(HangupCause::NormalClearing));

    // One correlation id for the whole call
    assert!(sent.iter().all(|p| p.call_id == new_call.call_id && p.callid == new_call.call_id));
}

#[tokio::test]
async fn test_unanswered_inbound_call_is_cancelled() {
    let mut bridge = reconciler(ScriptedPbx::new(vec![]), RecordingSink::default(), false);

    bridge
        .reconcile(vec![call("2", "4930123456", "151 Max", "Routing")])
        .await;
    bridge.reconcile(vec![]).await;

    let sent = bridge.sink().sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].event, EventKind::NewCall);
    assert_eq!(sent[0].direction, "in");
    // Country prefix rewritten to the national format
    assert_eq!(sent[0].from, "030123456");
    assert_eq!(sent[0].to, "151");
    assert_eq!(sent[1].event, EventKind::Hangup);
    assert_eq!(sent[1].cause, Some(HangupCause::Cancel));
    assert_eq!(sent[1].answering_number, "151");
}

#[tokio::test]
async fn test_events_are_sent_at_most_once() {
    let mut bridge = reconciler(ScriptedPbx::new(vec![]), RecordingSink::default(), false);
    let ringing = call("3", "0300123456", "150 Jane", "Routing");
    let talking = call("3", "0300123456", "150 Jane", "Talking");

    bridge.reconcile(vec![ringing.clone()]).await;
    bridge.reconcile(vec![ringing]).await;
    bridge.reconcile(vec![talking.clone()]).await;
    let report = bridge.reconcile(vec![talking]).await;

    assert_eq!(report.new_calls, 0);
    assert_eq!(report.answered, 0);
    assert!(!report.has_activity());
    assert_eq!(bridge.sink().kinds(), vec![EventKind::NewCall, EventKind::Answer]);

    let record = bridge.store().get("3").unwrap();
    assert!(record.notified_new && record.notified_answered);
}

#[tokio::test]
async fn test_status_change_keeps_the_record() {
    let mut bridge = reconciler(ScriptedPbx::new(vec![]), RecordingSink::default(), false);

    bridge.reconcile(vec![call("4", "0300123456", "150 Jane", "Routing")]).await;
    let uid = bridge.store().get("4").unwrap().uid;
    let first_seen = bridge.store().get("4").unwrap().first_seen;

    bridge.reconcile(vec![call("4", "0300123456", "150 Jane", "Transferring")]).await;

    let record = bridge.store().get("4").unwrap();
    assert_eq!(record.uid, uid);
    assert_eq!(record.first_seen, first_seen);
    assert_eq!(record.status.as_str(), "Transferring");
}

#[tokio::test]
async fn test_missed_queue_call_is_reported_when_enabled() {
    let mut bridge = reconciler(ScriptedPbx::new(vec![]), RecordingSink::default(), true);

    bridge
        .reconcile(vec![call("5", "0300123456", "150 Jane", "Transferring")])
        .await;
    bridge.reconcile(vec![]).await;

    let sent = bridge.sink().sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].event, EventKind::Hangup);
    assert_eq!(sent[1].cause, Some(HangupCause::Cancel));
    assert_eq!(sent[1].answering_number, "800");
    assert_eq!(sent[1].to, "800");
}

#[tokio::test]
async fn test_missed_queue_call_is_silent_when_disabled() {
    let mut bridge = reconciler(ScriptedPbx::new(vec![]), RecordingSink::default(), false);

    bridge
        .reconcile(vec![call("6", "0300123456", "150 Jane", "Transferring")])
        .await;
    let report = bridge.reconcile(vec![]).await;

    assert_eq!(report.ended, 1);
    assert!(bridge.store().is_empty());
    assert_eq!(bridge.sink().kinds(), vec![EventKind::NewCall]);
}

#[tokio::test]
async fn test_unknown_status_ends_silently() {
    let mut bridge = reconciler(ScriptedPbx::new(vec![]), RecordingSink::default(), true);

    bridge.reconcile(vec![call("7", "150 Jane", "0300123456", "Held")]).await;
    bridge.reconcile(vec![]).await;

    assert_eq!(bridge.sink().kinds(), vec![EventKind::NewCall]);
}

#[tokio::test]
async fn test_calls_that_are_not_bridged() {
    let mut bridge = reconciler(ScriptedPbx::new(vec![]), RecordingSink::default(), false);

    let report = bridge
        .reconcile(vec![
            // internal
            call("8", "150 Jane", "151 Max", "Talking"),
            // extension outside the monitored group
            call("9", "0300123456", "199 Bob", "Talking"),
            // external number of the wrong length
            call("10", "150 Jane", "030012", "Talking"),
        ])
        .await;

    assert_eq!(report.ignored, 3);
    assert!(bridge.store().is_empty());
    assert!(bridge.sink().sent().is_empty());
}

#[tokio::test]
async fn test_failed_delivery_does_not_block_the_cycle() {
    let sink = RecordingSink {
        reject: true,
        ..Default::default()
    };
    let mut bridge = reconciler(ScriptedPbx::new(vec![]), sink, false);

    let report = bridge
        .reconcile(vec![
            call("11", "150 Jane", "0300123456", "Talking"),
            call("12", "0300654321", "151 Max", "Routing"),
        ])
        .await;

    assert_eq!(report.new_calls, 2);
    assert_eq!(report.failed_notifications, 3);
    assert_eq!(bridge.store().len(), 2);

    // Failed events are not retried on the next cycle
    bridge
        .reconcile(vec![
            call("11", "150 Jane", "0300123456", "Talking"),
            call("12", "0300654321", "151 Max", "Routing"),
        ])
        .await;
    assert_eq!(bridge.sink().sent().len(), 3);
}

#[tokio::test]
async fn test_ended_call_is_removed_when_delivery_fails() {
    let sink = RecordingSink {
        reject: true,
        ..Default::default()
    };
    let mut bridge = reconciler(ScriptedPbx::new(vec![]), sink, false);

    bridge
        .reconcile(vec![call("16", "0300123456", "150 Jane", "Routing")])
        .await;
    let report = bridge.reconcile(vec![]).await;

    assert_eq!(report.ended, 1);
    assert_eq!(report.failed_notifications, 1);
    assert!(bridge.store().is_empty());
    assert_eq!(bridge.sink().kinds(), vec![EventKind::NewCall, EventKind::Hangup]);
}

#[tokio::test]
async fn test_poll_reconciles_snapshots() {
    let pbx = ScriptedPbx::new(vec![Ok(vec![call("13", "150 Jane", "0300123456", "Routing")])]);
    let mut bridge = reconciler(pbx, RecordingSink::default(), false);

    match bridge.poll().await.unwrap() {
        CycleOutcome::Reconciled(report) => assert_eq!(report.new_calls, 1),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(bridge.store().contains("13"));
}

#[tokio::test]
async fn test_auth_failure_triggers_login() {
    let pbx = ScriptedPbx::new(vec![
        Ok(vec![call("14", "150 Jane", "0300123456", "Routing")]),
        Err(http_error(401)),
    ]);
    let mut bridge = reconciler(pbx, RecordingSink::default(), false);

    bridge.poll().await.unwrap();
    assert_eq!(bridge.poll().await.unwrap(), CycleOutcome::Reauthenticated);

    assert_eq!(bridge.pbx().logins, 1);
    // Nothing was reconciled, so the call is still tracked
    assert!(bridge.store().contains("14"));
    assert_eq!(bridge.sink().kinds(), vec![EventKind::NewCall]);
}

#[tokio::test]
async fn test_other_fetch_errors_skip_the_cycle() {
    let pbx = ScriptedPbx::new(vec![
        Ok(vec![call("15", "150 Jane", "0300123456", "Talking")]),
        Err(http_error(500)),
    ]);
    let mut bridge = reconciler(pbx, RecordingSink::default(), false);

    bridge.poll().await.unwrap();
    assert_eq!(bridge.poll().await.unwrap(), CycleOutcome::Skipped);

    assert_eq!(bridge.pbx().logins, 0);
    assert!(bridge.store().contains("15"));
    assert_eq!(bridge.sink().kinds(), vec![EventKind::NewCall, EventKind::Answer]);
}

#[tokio::test]
async fn test_run_stops_when_pbx_stays_offline() {
    let mut pbx = ScriptedPbx::new(vec![Err(http_error(403))]);
    pbx.failing_logins = usize::MAX;
    let mut bridge = reconciler(pbx, RecordingSink::default(), false);

    let err = tokio::time::timeout(Duration::from_secs(5), bridge.run())
        .await
        .expect("run should give up on its own")
        .unwrap_err();

    assert!(matches!(err, PbxError::OfflineTooLong { .. }));
    assert!(bridge.pbx().logins > 1);
}
