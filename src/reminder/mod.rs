//! Reminder scheduler
//!
//! A periodic sweep finds loans that are due soon or overdue and have
//! not been reminded, delivers one notification per loan, and marks
//! each loan only after its delivery succeeded. Failed deliveries stay
//! eligible and are retried on the next sweep.

pub mod notifier;

pub use notifier::{Delivery, LogNotifier, Notifier, WebhookNotifier};

use crate::core::config::{LendingConfig, NotificationsConfig};
use crate::core::error::Result;
use crate::db::repository::LoanRepository;
use chrono::{Duration as ChronoDuration, Local, NaiveDate};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Counts from one completed sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub delivered: usize,
    pub undeliverable: usize,
    pub failed: usize,
}

pub struct ReminderScheduler {
    repository: Arc<LoanRepository>,
    notifier: Arc<dyn Notifier>,
    remind_days_before: i64,
    sweep_interval: Duration,
    // Held for the duration of a sweep; a tick that finds it taken is
    // skipped instead of queued.
    sweep_lock: Mutex<()>,
}

impl ReminderScheduler {
    pub fn new(
        repository: Arc<LoanRepository>,
        notifier: Arc<dyn Notifier>,
        lending: &LendingConfig,
        notifications: &NotificationsConfig,
    ) -> Self {
        Self {
            repository,
            notifier,
            remind_days_before: lending.remind_days_before,
            sweep_interval: Duration::from_secs(notifications.sweep_interval_hours * 3600),
            sweep_lock: Mutex::new(()),
        }
    }

    /// Run sweeps forever at the configured interval
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            interval_hours = self.sweep_interval.as_secs() / 3600,
            "reminder scheduler started"
        );

        loop {
            ticker.tick().await;
            let today = Local::now().date_naive();
            match self.try_sweep(today).await {
                Ok(Some(report)) => {
                    info!(
                        examined = report.examined,
                        delivered = report.delivered,
                        undeliverable = report.undeliverable,
                        failed = report.failed,
                        "reminder sweep complete"
                    );
                }
                Ok(None) => warn!("previous reminder sweep still running, skipping tick"),
                Err(e) => error!(error = %e, "reminder sweep failed"),
            }
        }
    }

    /// Run one sweep unless another is already in flight
    pub async fn try_sweep(&self, today: NaiveDate) -> Result<Option<SweepReport>> {
        let Ok(_guard) = self.sweep_lock.try_lock() else {
            return Ok(None);
        };
        self.sweep(today).await.map(Some)
    }

    async fn sweep(&self, today: NaiveDate) -> Result<SweepReport> {
        let cutoff = today + ChronoDuration::days(self.remind_days_before);
        let due = self.repository.due_for_reminder(cutoff).await?;

        let mut report = SweepReport {
            examined: due.len(),
            ..Default::default()
        };

        for loan in due {
            match self.notifier.notify(&loan, today).await {
                Ok(Delivery::Delivered) => {
                    self.repository
                        .mark_reminded(loan.user_id, loan.kind, &loan.external_id)
                        .await?;
                    report.delivered += 1;
                }
                Ok(outcome) => {
                    // Recipient gone or refusing; leave the loan
                    // eligible so a restored recipient still gets one
                    warn!(
                        user_id = loan.user_id,
                        title = %loan.title,
                        outcome = ?outcome,
                        "reminder not deliverable"
                    );
                    report.undeliverable += 1;
                }
                Err(e) => {
                    error!(
                        user_id = loan.user_id,
                        title = %loan.title,
                        error = %e,
                        "reminder delivery failed"
                    );
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::LendError;
    use crate::db::manager::DatabaseManager;
    use crate::db::models::Loan;
    use crate::providers::{MediaKind, MediaRecord};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingNotifier {
        outcome: std::result::Result<Delivery, ()>,
        calls: AtomicUsize,
    }

    impl RecordingNotifier {
        fn delivering() -> Arc<Self> {
            Arc::new(Self {
                outcome: Ok(Delivery::Delivered),
                calls: AtomicUsize::new(0),
            })
        }

        fn with_outcome(outcome: Delivery) -> Arc<Self> {
            Arc::new(Self {
                outcome: Ok(outcome),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                outcome: Err(()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, _loan: &Loan, _today: NaiveDate) -> Result<Delivery> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome
                .map_err(|_| LendError::NotificationFailure("transport down".to_string()))
        }
    }

    fn scheduler(notifier: Arc<dyn Notifier>) -> (ReminderScheduler, Arc<LoanRepository>) {
        let db = Arc::new(DatabaseManager::new_in_memory().unwrap());
        let repository = Arc::new(LoanRepository::new(db));
        let lending = LendingConfig {
            due_period_days: 14,
            remind_days_before: 1,
            max_loans_per_user: 10,
        };
        let notifications = NotificationsConfig {
            sweep_interval_hours: 24,
            webhook_url: None,
        };
        let scheduler = ReminderScheduler::new(
            repository.clone(),
            notifier,
            &lending,
            &notifications,
        );
        (scheduler, repository)
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn seed_loan(repo: &LoanRepository, user_id: i64, id: &str, due: NaiveDate) {
        let record = MediaRecord::new(MediaKind::Book, id, format!("Title {}", id));
        repo.borrow(user_id, "reader", &record, due).await.unwrap();
    }

    #[tokio::test]
    async fn test_sweep_delivers_and_marks_once() {
        let notifier = RecordingNotifier::delivering();
        let (scheduler, repo) = scheduler(notifier.clone());
        let today = day(2026, 8, 30);
        seed_loan(&repo, 1, "9780306406157", today).await;

        let report = scheduler.try_sweep(today).await.unwrap().unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(notifier.calls(), 1);

        // A second sweep finds nothing left to remind
        let report = scheduler.try_sweep(today).await.unwrap().unwrap();
        assert_eq!(report.examined, 0);
        assert_eq!(notifier.calls(), 1);
    }

    #[tokio::test]
    async fn test_sweep_covers_window_not_future_loans() {
        let notifier = RecordingNotifier::delivering();
        let (scheduler, repo) = scheduler(notifier.clone());
        let today = day(2026, 8, 30);
        // Overdue, due today, due within the 1-day window, and beyond
        seed_loan(&repo, 1, "a", day(2026, 8, 20)).await;
        seed_loan(&repo, 1, "b", today).await;
        seed_loan(&repo, 1, "c", day(2026, 8, 31)).await;
        seed_loan(&repo, 1, "d", day(2026, 9, 15)).await;

        let report = scheduler.try_sweep(today).await.unwrap().unwrap();
        assert_eq!(report.examined, 3);
        assert_eq!(report.delivered, 3);
    }

    #[tokio::test]
    async fn test_failed_delivery_stays_eligible() {
        let notifier = RecordingNotifier::failing();
        let (scheduler, repo) = scheduler(notifier.clone());
        let today = day(2026, 8, 30);
        seed_loan(&repo, 1, "9780306406157", today).await;

        let report = scheduler.try_sweep(today).await.unwrap().unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 0);

        // Still unmarked, so the next sweep retries it
        let report = scheduler.try_sweep(today).await.unwrap().unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(notifier.calls(), 2);
    }

    #[tokio::test]
    async fn test_undeliverable_recipient_is_not_marked() {
        let notifier = RecordingNotifier::with_outcome(Delivery::Forbidden);
        let (scheduler, repo) = scheduler(notifier.clone());
        let today = day(2026, 8, 30);
        seed_loan(&repo, 1, "9780306406157", today).await;

        let report = scheduler.try_sweep(today).await.unwrap().unwrap();
        assert_eq!(report.undeliverable, 1);

        let due = repo.due_for_reminder(today).await.unwrap();
        assert_eq!(due.len(), 1);
        assert!(!due[0].reminded);
    }

    #[tokio::test]
    async fn test_concurrent_sweep_is_skipped() {
        let notifier = RecordingNotifier::delivering();
        let (scheduler, _repo) = scheduler(notifier);
        let today = day(2026, 8, 30);

        let _guard = scheduler.sweep_lock.lock().await;
        let result = scheduler.try_sweep(today).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_per_loan_failures_do_not_stop_the_sweep() {
        // One notifier that fails only for even user ids
        struct SelectiveNotifier;

        #[async_trait]
        impl Notifier for SelectiveNotifier {
            async fn notify(&self, loan: &Loan, _today: NaiveDate) -> Result<Delivery> {
                if loan.user_id % 2 == 0 {
                    Err(LendError::NotificationFailure("boom".to_string()))
                } else {
                    Ok(Delivery::Delivered)
                }
            }
        }

        let (scheduler, repo) = scheduler(Arc::new(SelectiveNotifier));
        let today = day(2026, 8, 30);
        seed_loan(&repo, 1, "a", today).await;
        seed_loan(&repo, 2, "b", today).await;
        seed_loan(&repo, 3, "c", today).await;

        let report = scheduler.try_sweep(today).await.unwrap().unwrap();
        assert_eq!(report.examined, 3);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);
    }
}
