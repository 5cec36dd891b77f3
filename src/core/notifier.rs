//! Flag-guarded delivery of lifecycle events.
//!
//! The record's `notified_new` / `notified_answered` flags make each event
//! idempotent per call. Flags are set before the outcome of the request is
//! known: a failed delivery is logged by the caller and not retried.

use tracing::info;

use crate::adapters::{EventSink, NotifyError, WebhookPayload};
use crate::domain::{CallRecord, HangupCause};

/// Sends `newCall`, `answer` and `hangup` for call records
pub struct Notifier<S> {
    sink: S,
}

impl<S: EventSink> Notifier<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Announce a call. Marks the record as announced even if delivery fails.
    pub async fn new_call(&self, record: &mut CallRecord) -> Result<(), NotifyError> {
        let payload = WebhookPayload::new_call(record);
        record.notified_new = true;

        info!(
            call_id = %record.id,
            uid = %record.uid,
            direction = %record.direction,
            from = %payload.from,
            to = %payload.to,
            "New call"
        );
        self.sink.deliver(&payload).await
    }

    /// Report the call as answered, announcing it first if that never
    /// happened. A second call for the same record sends nothing.
    pub async fn answer(&self, record: &mut CallRecord) -> Result<(), NotifyError> {
        if !record.notified_new {
            self.new_call(record).await?;
        }
        if record.notified_answered {
            return Ok(());
        }

        let payload = WebhookPayload::answer(record);
        record.notified_answered = true;

        info!(
            call_id = %record.id,
            uid = %record.uid,
            agent = %record.agent_number,
            "Call answered"
        );
        self.sink.deliver(&payload).await
    }

    /// Report the end of a call, announcing it first if that never happened.
    pub async fn hangup(&self, record: &mut CallRecord, cause: HangupCause) -> Result<(), NotifyError> {
        if !record.notified_new {
            self.new_call(record).await?;
        }

        let payload = WebhookPayload::hangup(record, cause);
        info!(
            call_id = %record.id,
            uid = %record.uid,
            %cause,
            "Call ended"
        );
        self.sink.deliver(&payload).await
    }
}
