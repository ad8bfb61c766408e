//! Background-task worker over the persisted queue.
//!
//! The worker claims due tasks, executes them, and acknowledges or
//! reschedules with exponential backoff. Two task kinds exist: signed
//! callback deliveries to intervention clients, and reminder-scheduler
//! ticks. Signing happens at delivery time so client secrets never sit in
//! the queue.

mod transport;

pub use transport::HttpCallbackTransport;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};

use crate::domain::broker::CallbackJob;
use crate::domain::oauth::{encode_signed_request, CallbackPayload};
use crate::domain::ports::{CallbackTransport, Clock, OAuthStore, TaskQueue};
use crate::domain::scheduler::CommunicationScheduler;
use crate::domain::task::{backoff_delay, Task, TaskKind};
use crate::domain::Error;

/// Tasks claimed per polling pass.
const CLAIM_BATCH: usize = 20;

/// Result of executing one task.
enum Outcome {
    Done,
    /// Transient failure; retry with backoff.
    Retry(String),
    /// Permanent failure; drop the task.
    Drop(String),
}

pub struct WorkerDeps {
    pub tasks: Arc<dyn TaskQueue>,
    pub oauth: Arc<dyn OAuthStore>,
    pub transport: Arc<dyn CallbackTransport>,
    pub scheduler: Arc<CommunicationScheduler>,
    pub clock: Arc<dyn Clock>,
}

pub struct TaskWorker {
    tasks: Arc<dyn TaskQueue>,
    oauth: Arc<dyn OAuthStore>,
    transport: Arc<dyn CallbackTransport>,
    scheduler: Arc<CommunicationScheduler>,
    clock: Arc<dyn Clock>,
}

impl TaskWorker {
    pub fn new(deps: WorkerDeps) -> Self {
        Self {
            tasks: deps.tasks,
            oauth: deps.oauth,
            transport: deps.transport,
            scheduler: deps.scheduler,
            clock: deps.clock,
        }
    }

    /// Poll forever. `tick_every` paces the reminder scheduler by enqueuing
    /// a `reminder_tick` task; the tick itself is idempotent, so an extra
    /// one after a restart is harmless.
    pub async fn run(&self, poll: StdDuration, tick_every: chrono::Duration) {
        let mut next_tick = self.clock.now();
        loop {
            let now = self.clock.now();
            if now >= next_tick {
                if let Err(err) = self
                    .tasks
                    .enqueue(Task::new(TaskKind::ReminderTick, serde_json::json!({}), now))
                    .await
                {
                    tracing::warn!(error = %err, "failed to enqueue reminder tick");
                }
                next_tick = now + tick_every;
            }
            if let Err(err) = self.run_once().await {
                tracing::error!(error = %err, "worker pass failed");
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Claim and execute one batch of due tasks. Returns the number of
    /// tasks processed.
    pub async fn run_once(&self) -> Result<usize, Error> {
        let now = self.clock.now();
        let batch = self.tasks.claim_due(now, CLAIM_BATCH).await?;
        let processed = batch.len();
        for task in batch {
            let outcome = self.execute(&task, now).await;
            self.settle(task, outcome, now).await?;
        }
        Ok(processed)
    }

    async fn execute(&self, task: &Task, now: DateTime<Utc>) -> Outcome {
        match task.kind {
            TaskKind::DeliverCallback => self.deliver_callback(task, now).await,
            TaskKind::ReminderTick => match self.scheduler.tick().await {
                Ok(summary) => {
                    tracing::info!(
                        emitted = summary.emitted,
                        suspended = summary.suspended,
                        skipped = summary.skipped,
                        "reminder tick finished"
                    );
                    Outcome::Done
                }
                Err(err) => Outcome::Retry(err.to_string()),
            },
        }
    }

    async fn deliver_callback(&self, task: &Task, now: DateTime<Utc>) -> Outcome {
        let job: CallbackJob = match serde_json::from_value(task.payload.clone()) {
            Ok(job) => job,
            Err(err) => return Outcome::Drop(format!("malformed callback job: {err}")),
        };
        let client = match self.oauth.client(&job.client_id).await {
            Ok(Some(client)) => client,
            Ok(None) => return Outcome::Drop(format!("client {} is gone", job.client_id)),
            Err(err) => return Outcome::Retry(err.to_string()),
        };
        let Some(url) = client.callback_url.as_deref() else {
            return Outcome::Drop(format!("client {} has no callback url", job.client_id));
        };
        let payload = CallbackPayload::new(job.event, job.user_id, now.timestamp());
        let signed = match encode_signed_request(client.client_secret.as_str(), &payload) {
            Ok(signed) => signed,
            Err(err) => return Outcome::Drop(err.to_string()),
        };
        match self.transport.deliver(url, &signed).await {
            Ok(()) => Outcome::Done,
            Err(err) if err.is_retryable() => Outcome::Retry(err.to_string()),
            Err(err) => Outcome::Drop(err.to_string()),
        }
    }

    async fn settle(&self, mut task: Task, outcome: Outcome, now: DateTime<Utc>) -> Result<(), Error> {
        match outcome {
            Outcome::Done => self.tasks.complete(task.id).await?,
            Outcome::Drop(reason) => {
                tracing::warn!(task = task.id, kind = ?task.kind, %reason, "task dropped");
                self.tasks.abandon(task.id).await?;
            }
            Outcome::Retry(reason) => {
                task.attempts += 1;
                if task.abandoned() {
                    tracing::warn!(
                        task = task.id,
                        kind = ?task.kind,
                        %reason,
                        attempts = task.attempts,
                        "attempt budget spent, task abandoned"
                    );
                    self.tasks.abandon(task.id).await?;
                } else {
                    tracing::debug!(task = task.id, %reason, attempts = task.attempts, "task rescheduled");
                    task.next_attempt_at = now + backoff_delay(task.attempts);
                    self.tasks.reschedule(task).await?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use zeroize::Zeroizing;

    use crate::domain::assessment_service::{AssessmentDeps, AssessmentService};
    use crate::domain::identity::UserId;
    use crate::domain::oauth::{decode_signed_request, CallbackEvent, Client};
    use crate::domain::ports::{DispatchError, FixedClock};
    use crate::domain::scheduler::SchedulerDeps;
    use crate::domain::task::MAX_ATTEMPTS;
    use crate::outbound::cache::TtlTimelineCache;
    use crate::outbound::mail::{BuiltinTemplates, LogMailer};
    use crate::outbound::memory::MemoryStore;

    #[derive(Default)]
    struct RecordingTransport {
        deliveries: Mutex<Vec<(String, String)>>,
        fail_with: Mutex<Option<DispatchError>>,
    }

    impl RecordingTransport {
        fn deliveries(&self) -> Vec<(String, String)> {
            self.deliveries.lock().expect("lock").clone()
        }

        fn fail_with(&self, err: DispatchError) {
            *self.fail_with.lock().expect("lock") = Some(err);
        }
    }

    #[async_trait]
    impl CallbackTransport for RecordingTransport {
        async fn deliver(&self, url: &str, signed_request: &str) -> Result<(), DispatchError> {
            if let Some(err) = self.fail_with.lock().expect("lock").take() {
                return Err(err);
            }
            self.deliveries
                .lock()
                .expect("lock")
                .push((url.to_owned(), signed_request.to_owned()));
            Ok(())
        }
    }

    struct Harness {
        worker: TaskWorker,
        store: Arc<MemoryStore>,
        transport: Arc<RecordingTransport>,
        clock: Arc<FixedClock>,
    }

    fn harness() -> Harness {
        let store = MemoryStore::new();
        let clock = Arc::new(FixedClock::at(
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0)
                .single()
                .expect("valid instant"),
        ));
        let transport = Arc::new(RecordingTransport::default());
        let cache = Arc::new(TtlTimelineCache::new(Arc::clone(&clock) as _));
        let assessments = Arc::new(AssessmentService::new(AssessmentDeps {
            users: Arc::clone(&store) as _,
            consents: Arc::clone(&store) as _,
            clinical: Arc::clone(&store) as _,
            catalog: Arc::clone(&store) as _,
            questionnaires: Arc::clone(&store) as _,
            responses: Arc::clone(&store) as _,
            timelines: Arc::clone(&store) as _,
            audit: Arc::clone(&store) as _,
            cache,
            clock: Arc::clone(&clock) as _,
        }));
        let scheduler = Arc::new(CommunicationScheduler::new(SchedulerDeps {
            assessments,
            communications: Arc::clone(&store) as _,
            timelines: Arc::clone(&store) as _,
            users: Arc::clone(&store) as _,
            consents: Arc::clone(&store) as _,
            catalog: Arc::clone(&store) as _,
            templates: Arc::new(BuiltinTemplates::new()),
            mailer: Arc::new(LogMailer),
            audit: Arc::clone(&store) as _,
            clock: Arc::clone(&clock) as _,
        }));
        let worker = TaskWorker::new(WorkerDeps {
            tasks: Arc::clone(&store) as _,
            oauth: Arc::clone(&store) as _,
            transport: Arc::clone(&transport) as _,
            scheduler,
            clock: Arc::clone(&clock) as _,
        });
        Harness {
            worker,
            store,
            transport,
            clock,
        }
    }

    fn client(callback_url: Option<&str>) -> Client {
        Client {
            client_id: "decision_support".to_owned(),
            client_secret: Zeroizing::new("s3cret".to_owned()),
            redirect_origins: vec!["https://intervention.example".to_owned()],
            callback_url: callback_url.map(str::to_owned),
            owner_user_id: UserId::new(50),
            intervention_id: None,
        }
    }

    fn callback_task(now: DateTime<Utc>) -> Task {
        let job = CallbackJob {
            client_id: "decision_support".to_owned(),
            event: CallbackEvent::Logout,
            user_id: UserId::new(1),
        };
        Task::new(
            TaskKind::DeliverCallback,
            serde_json::to_value(&job).expect("serialises"),
            now,
        )
    }

    #[actix_web::test]
    async fn callbacks_are_signed_with_the_client_secret() {
        let h = harness();
        use crate::domain::ports::OAuthStore as _;
        h.store
            .save_client(client(Some("https://intervention.example/cb")))
            .await
            .expect("seed client");
        h.store
            .enqueue(callback_task(h.clock.now()))
            .await
            .expect("enqueue");

        let processed = h.worker.run_once().await.expect("pass");
        assert_eq!(processed, 1);

        let deliveries = h.transport.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].0, "https://intervention.example/cb");
        let payload = decode_signed_request("s3cret", &deliveries[0].1).expect("verifies");
        assert_eq!(payload.event, "logout");
        assert_eq!(payload.user_id, 1);

        // Acknowledged tasks are gone.
        let leftover = h.store.claim_due(h.clock.now(), 10).await.expect("claim");
        assert!(leftover.is_empty());
    }

    #[actix_web::test]
    async fn missing_clients_drop_the_task() {
        let h = harness();
        h.store
            .enqueue(callback_task(h.clock.now()))
            .await
            .expect("enqueue");

        h.worker.run_once().await.expect("pass");

        assert!(h.transport.deliveries().is_empty());
        let leftover = h.store.claim_due(h.clock.now(), 10).await.expect("claim");
        assert!(leftover.is_empty());
    }

    #[actix_web::test]
    async fn transport_failures_reschedule_with_backoff() {
        let h = harness();
        use crate::domain::ports::OAuthStore as _;
        h.store
            .save_client(client(Some("https://intervention.example/cb")))
            .await
            .expect("seed client");
        h.store
            .enqueue(callback_task(h.clock.now()))
            .await
            .expect("enqueue");
        h.transport
            .fail_with(DispatchError::transport("connection refused"));

        h.worker.run_once().await.expect("pass");
        assert!(h.transport.deliveries().is_empty());

        // Not yet due again.
        let early = h.store.claim_due(h.clock.now(), 10).await.expect("claim");
        assert!(early.is_empty());

        // After the backoff window the retry succeeds.
        h.clock.advance(chrono::Duration::minutes(2));
        h.worker.run_once().await.expect("pass");
        let deliveries = h.transport.deliveries();
        assert_eq!(deliveries.len(), 1);
    }

    #[actix_web::test]
    async fn spent_attempt_budgets_abandon_the_task() {
        let h = harness();
        use crate::domain::ports::OAuthStore as _;
        h.store
            .save_client(client(Some("https://intervention.example/cb")))
            .await
            .expect("seed client");
        let mut task = callback_task(h.clock.now());
        task.attempts = MAX_ATTEMPTS - 1;
        h.store.enqueue(task).await.expect("enqueue");
        h.transport
            .fail_with(DispatchError::transport("still down"));

        h.worker.run_once().await.expect("pass");

        // Abandoned: nothing left even far in the future.
        h.clock.advance(chrono::Duration::days(1));
        let leftover = h.store.claim_due(h.clock.now(), 10).await.expect("claim");
        assert!(leftover.is_empty());
    }

    #[actix_web::test]
    async fn rejected_deliveries_are_not_retried() {
        let h = harness();
        use crate::domain::ports::OAuthStore as _;
        h.store
            .save_client(client(Some("https://intervention.example/cb")))
            .await
            .expect("seed client");
        h.store
            .enqueue(callback_task(h.clock.now()))
            .await
            .expect("enqueue");
        h.transport.fail_with(DispatchError::rejected("410 gone"));

        h.worker.run_once().await.expect("pass");

        h.clock.advance(chrono::Duration::days(1));
        let leftover = h.store.claim_due(h.clock.now(), 10).await.expect("claim");
        assert!(leftover.is_empty());
    }

    #[actix_web::test]
    async fn reminder_ticks_complete_even_with_nothing_to_send() {
        let h = harness();
        h.store
            .enqueue(Task::new(
                TaskKind::ReminderTick,
                serde_json::json!({}),
                h.clock.now(),
            ))
            .await
            .expect("enqueue");

        let processed = h.worker.run_once().await.expect("pass");
        assert_eq!(processed, 1);
        let leftover = h.store.claim_due(h.clock.now(), 10).await.expect("claim");
        assert!(leftover.is_empty());
    }
}
