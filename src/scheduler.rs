use crate::errors::{AppError, AppResult};
use crate::models::UserRecord;
use crate::notifications::NotificationFeed;
use crate::store::{DocumentStore, USERS_COLLECTION};
use chrono::{DateTime, Datelike, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::task::JoinHandle;
use tokio::time::Duration;

pub const DUE_POLL_INTERVAL: Duration = Duration::from_secs(60);

pub const REVIEW_DUE_MESSAGE: &str = "Your scheduled review is due now!";

#[derive(Default)]
struct UserTimers {
    one_shot: Option<JoinHandle<()>>,
    poll: Option<JoinHandle<()>>,
}

impl UserTimers {
    fn abort_all(&mut self) {
        if let Some(handle) = self.one_shot.take() {
            handle.abort();
        }
        if let Some(handle) = self.poll.take() {
            handle.abort();
        }
    }
}

// At most one pending reminder per user, held in the user record's
// reviewSchedule field. The one-shot timer and the periodic poll race on the
// same fire-and-clear; the compare step keeps the pair idempotent.
#[derive(Clone)]
pub struct ReviewScheduler {
    store: Arc<dyn DocumentStore>,
    feed: NotificationFeed,
    timers: Arc<StdMutex<HashMap<String, UserTimers>>>,
    firing: Arc<StdMutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl ReviewScheduler {
    pub fn new(store: Arc<dyn DocumentStore>, feed: NotificationFeed) -> Self {
        Self {
            store,
            feed,
            timers: Arc::new(StdMutex::new(HashMap::new())),
            firing: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    fn firing_gate(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut gates = self.firing.lock().expect("scheduler firing gate lock");
        gates.entry(user_id.to_string()).or_default().clone()
    }

    async fn load_user(&self, user_id: &str) -> AppResult<UserRecord> {
        match self.store.get_document(USERS_COLLECTION, user_id).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(UserRecord::default()),
        }
    }

    async fn save_user(&self, user_id: &str, record: &UserRecord) -> AppResult<()> {
        let value = serde_json::to_value(record)?;
        self.store.set_document(USERS_COLLECTION, user_id, value).await
    }

    // Overwrites any prior schedule. A past due date is accepted and fires
    // on the next check rather than here.
    pub async fn schedule(&self, user_id: &str, due_at: DateTime<Utc>) -> AppResult<()> {
        let mut record = self.load_user(user_id).await?;
        record.review_schedule = Some(due_at);
        self.save_user(user_id, &record).await?;

        let formatted = format_due_date(due_at, Utc::now());
        if let Err(error) = self
            .feed
            .append(user_id, &format!("Review scheduled for {formatted}"))
            .await
        {
            tracing::warn!(error = %error, user_id, "schedule confirmation notification failed");
        }

        if due_at > Utc::now() {
            self.arm_timer(user_id, due_at);
        }
        Ok(())
    }

    pub async fn check_due(&self, user_id: &str) -> AppResult<()> {
        let record = self.load_user(user_id).await?;
        match record.review_schedule {
            None => Ok(()),
            Some(due) if due <= Utc::now() => self.fire_and_clear(user_id).await,
            Some(due) => {
                self.arm_timer(user_id, due);
                Ok(())
            }
        }
    }

    // One logical compare-and-clear. The firing gate serializes the timer
    // and poll paths; the re-read lets the loser back off. A failed clear
    // after a successful fire is retried next cycle, with the duplicate
    // notification accepted as the lesser failure mode.
    async fn fire_and_clear(&self, user_id: &str) -> AppResult<()> {
        let gate = self.firing_gate(user_id);
        let _firing = gate.lock().await;

        let mut record = self.load_user(user_id).await?;
        let Some(due) = record.review_schedule else {
            return Ok(());
        };
        if due > Utc::now() {
            return Ok(());
        }

        self.feed
            .append(user_id, REVIEW_DUE_MESSAGE)
            .await
            .map_err(|error| AppError::SchedulerFire(format!("fire failed: {error}")))?;

        record.review_schedule = None;
        self.save_user(user_id, &record)
            .await
            .map_err(|error| AppError::SchedulerFire(format!("clear failed after fire: {error}")))
    }

    fn arm_timer(&self, user_id: &str, due_at: DateTime<Utc>) {
        let remaining = (due_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let scheduler = self.clone();
        let user = user_id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            if let Err(error) = scheduler.fire_and_clear(&user).await {
                tracing::warn!(error = %error, user_id = %user, "scheduled review firing failed");
            }
        });

        let mut timers = self.timers.lock().expect("scheduler timer lock");
        let entry = timers.entry(user_id.to_string()).or_default();
        if let Some(previous) = entry.one_shot.replace(handle) {
            previous.abort();
        }
    }

    fn spawn_poll(&self, user_id: &str, every: Duration) {
        let scheduler = self.clone();
        let user = user_id.to_string();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // The immediate first tick duplicates the activation check.
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(error) = scheduler.check_due(&user).await {
                    tracing::warn!(error = %error, user_id = %user, "periodic due check failed");
                }
            }
        });

        let mut timers = self.timers.lock().expect("scheduler timer lock");
        let entry = timers.entry(user_id.to_string()).or_default();
        if let Some(previous) = entry.poll.replace(handle) {
            previous.abort();
        }
    }

    // Session became active: catch up immediately, then poll for the rest
    // of the session.
    pub async fn activate(&self, user_id: &str) {
        if let Err(error) = self.check_due(user_id).await {
            tracing::warn!(error = %error, user_id, "review catch-up check failed");
        }
        self.spawn_poll(user_id, DUE_POLL_INTERVAL);
    }

    pub fn deactivate(&self, user_id: &str) {
        let mut timers = self.timers.lock().expect("scheduler timer lock");
        if let Some(mut entry) = timers.remove(user_id) {
            entry.abort_all();
        }
    }

    pub fn shutdown(&self) {
        let mut timers = self.timers.lock().expect("scheduler timer lock");
        for (_, mut entry) in timers.drain() {
            entry.abort_all();
        }
    }
}

pub fn format_due_date(due: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let time = due.format("%-I:%M %p");
    if due.date_naive() == now.date_naive() {
        format!("Today at {time}")
    } else if due.date_naive() == (now + ChronoDuration::days(1)).date_naive() {
        format!("Tomorrow at {time}")
    } else if due.year() == now.year() {
        format!("{} at {time}", due.format("%b %-d"))
    } else {
        format!("{} at {time}", due.format("%b %-d, %Y"))
    }
}
