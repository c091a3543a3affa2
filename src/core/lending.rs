//! Lending service: the borrow/return orchestration layer
//!
//! Ties the resolver and the loan repository together and enforces the
//! lending policy (per-user loan cap, due period). Date-dependent
//! operations take the current date as a parameter through the `_on`
//! variants so policy can be tested without a clock.

use crate::core::config::LendingConfig;
use crate::core::error::{LendError, Result};
use crate::db::models::{LedgerStats, Loan, ReturnLogEntry};
use crate::db::repository::LoanRepository;
use crate::providers::{MediaKind, MediaRecord};
use crate::resolver::Resolver;
use chrono::{Duration, Local, NaiveDate};
use std::sync::Arc;
use tracing::info;

/// Outcome of a successful borrow
#[derive(Debug, Clone)]
pub struct BorrowReceipt {
    pub record: MediaRecord,
    pub due_date: NaiveDate,
}

pub struct LendingService {
    repository: Arc<LoanRepository>,
    resolver: Arc<Resolver>,
    policy: LendingConfig,
}

impl LendingService {
    pub fn new(
        repository: Arc<LoanRepository>,
        resolver: Arc<Resolver>,
        policy: LendingConfig,
    ) -> Self {
        Self {
            repository,
            resolver,
            policy,
        }
    }

    /// Resolve a query and record the first candidate as borrowed.
    ///
    /// Re-borrowing an item the user already holds extends its due
    /// date and bypasses the loan cap; only net-new loans count
    /// against it.
    pub async fn borrow(
        &self,
        user_id: i64,
        username: &str,
        kind: MediaKind,
        query: &str,
    ) -> Result<BorrowReceipt> {
        self.borrow_on(user_id, username, kind, query, Local::now().date_naive())
            .await
    }

    pub async fn borrow_on(
        &self,
        user_id: i64,
        username: &str,
        kind: MediaKind,
        query: &str,
        today: NaiveDate,
    ) -> Result<BorrowReceipt> {
        let candidates = self.resolver.resolve(kind, query).await?;
        let Some(record) = candidates.into_iter().next() else {
            return Err(LendError::NotFound(format!(
                "no {} found for '{}'",
                kind,
                query.trim()
            )));
        };

        let already_held = self
            .repository
            .find(user_id, kind, &record.external_id)
            .await?
            .is_some();
        if !already_held {
            let held = self.repository.count_for_user(user_id).await?;
            if held >= self.policy.max_loans_per_user {
                return Err(LendError::LoanLimitReached(format!(
                    "user {} already holds {} items",
                    user_id, held
                )));
            }
        }

        let due_date = today + Duration::days(self.policy.due_period_days);
        self.repository
            .borrow(user_id, username, &record, due_date)
            .await?;

        info!(
            user_id = user_id,
            kind = %kind,
            external_id = %record.external_id,
            title = %record.title,
            due_date = %due_date,
            extended = already_held,
            "loan recorded"
        );
        Ok(BorrowReceipt { record, due_date })
    }

    /// Return an item on behalf of a user. The actor may differ from
    /// the holder (a maintainer clearing a loan); both land in the
    /// return log.
    pub async fn return_item(
        &self,
        actor_id: i64,
        user_id: i64,
        kind: MediaKind,
        external_id: &str,
    ) -> Result<Loan> {
        let snapshot = self
            .repository
            .return_loan(actor_id, user_id, kind, external_id)
            .await?
            .ok_or_else(|| {
                LendError::NotBorrowed(format!(
                    "user {} does not hold {} '{}'",
                    user_id, kind, external_id
                ))
            })?;

        info!(
            actor_id = actor_id,
            user_id = user_id,
            kind = %kind,
            title = %snapshot.title,
            "loan returned"
        );
        Ok(snapshot)
    }

    pub async fn loans_for_user(
        &self,
        user_id: i64,
        kind: Option<MediaKind>,
    ) -> Result<Vec<Loan>> {
        self.repository.list_for_user(user_id, kind).await
    }

    pub async fn overdue(&self) -> Result<Vec<Loan>> {
        self.repository.list_overdue(Local::now().date_naive()).await
    }

    pub async fn stats(&self) -> Result<LedgerStats> {
        self.repository.stats(Local::now().date_naive()).await
    }

    pub async fn recent_returns(&self, limit: usize) -> Result<Vec<ReturnLogEntry>> {
        self.repository.recent_returns(limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::LendError;
    use crate::db::manager::DatabaseManager;
    use crate::providers::ProviderClient;
    use async_trait::async_trait;

    struct FixedClient {
        records: Vec<MediaRecord>,
    }

    #[async_trait]
    impl ProviderClient for FixedClient {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn enabled(&self) -> bool {
            true
        }

        async fn search(&self, _kind: MediaKind, _query: &str) -> Result<Vec<MediaRecord>> {
            Ok(self.records.clone())
        }
    }

    fn service(records: Vec<MediaRecord>, max_loans: usize) -> LendingService {
        let db = Arc::new(DatabaseManager::new_in_memory().unwrap());
        let repository = Arc::new(LoanRepository::new(db));
        let resolver = Arc::new(
            Resolver::builder()
                .route(MediaKind::Movie, Arc::new(FixedClient { records }))
                .build(),
        );
        LendingService::new(
            repository,
            resolver,
            LendingConfig {
                due_period_days: 14,
                remind_days_before: 1,
                max_loans_per_user: max_loans,
            },
        )
    }

    fn movie(id: &str, title: &str) -> MediaRecord {
        MediaRecord::new(MediaKind::Movie, id, title)
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_borrow_records_first_candidate_with_due_date() {
        let service = service(
            vec![movie("603", "The Matrix"), movie("604", "Reloaded")],
            10,
        );
        let today = day(2026, 8, 30);

        let receipt = service
            .borrow_on(1, "reader", MediaKind::Movie, "matrix", today)
            .await
            .unwrap();
        assert_eq!(receipt.record.external_id, "603");
        assert_eq!(receipt.due_date, day(2026, 9, 13));

        let loans = service.loans_for_user(1, None).await.unwrap();
        assert_eq!(loans.len(), 1);
        assert_eq!(loans[0].title, "The Matrix");
    }

    #[tokio::test]
    async fn test_borrow_with_no_candidates_is_not_found() {
        let service = service(Vec::new(), 10);
        let err = service
            .borrow_on(1, "reader", MediaKind::Movie, "nothing", day(2026, 8, 30))
            .await
            .unwrap_err();
        assert!(matches!(err, LendError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_loan_cap_blocks_new_loans_but_not_extensions() {
        let service = service(vec![movie("603", "The Matrix")], 1);
        let today = day(2026, 8, 30);

        service
            .borrow_on(1, "reader", MediaKind::Movie, "matrix", today)
            .await
            .unwrap();

        // Re-borrow of the held item extends instead of hitting the cap
        let receipt = service
            .borrow_on(1, "reader", MediaKind::Movie, "matrix", day(2026, 9, 1))
            .await
            .unwrap();
        assert_eq!(receipt.due_date, day(2026, 9, 15));
        assert_eq!(service.loans_for_user(1, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_loan_cap_reached() {
        let service = service(vec![movie("603", "The Matrix")], 0);
        let err = service
            .borrow_on(1, "reader", MediaKind::Movie, "matrix", day(2026, 8, 30))
            .await
            .unwrap_err();
        assert!(matches!(err, LendError::LoanLimitReached(_)));
    }

    #[tokio::test]
    async fn test_return_yields_snapshot_and_logs() {
        let service = service(vec![movie("603", "The Matrix")], 10);
        service
            .borrow_on(1, "reader", MediaKind::Movie, "matrix", day(2026, 8, 30))
            .await
            .unwrap();

        let snapshot = service
            .return_item(1, 1, MediaKind::Movie, "603")
            .await
            .unwrap();
        assert_eq!(snapshot.title, "The Matrix");
        assert!(service.loans_for_user(1, None).await.unwrap().is_empty());

        let log = service.recent_returns(5).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].actor_id, 1);
    }

    #[tokio::test]
    async fn test_return_of_unheld_item_is_not_borrowed() {
        let service = service(vec![movie("603", "The Matrix")], 10);
        let err = service
            .return_item(1, 1, MediaKind::Movie, "603")
            .await
            .unwrap_err();
        assert!(matches!(err, LendError::NotBorrowed(_)));
    }

    #[tokio::test]
    async fn test_full_lifecycle_backdated_loan_overdue_once() {
        let service = service(vec![movie("603", "The Matrix")], 10);
        let today = day(2026, 8, 30);

        let receipt = service
            .borrow_on(1, "reader", MediaKind::Movie, "matrix", today)
            .await
            .unwrap();
        assert_eq!(receipt.due_date, day(2026, 9, 13));

        // Re-borrow extends the same row instead of adding a second loan
        let extended = service
            .borrow_on(1, "reader", MediaKind::Movie, "matrix", day(2026, 9, 1))
            .await
            .unwrap();
        assert_eq!(extended.due_date, day(2026, 9, 15));
        assert_eq!(service.loans_for_user(1, None).await.unwrap().len(), 1);

        service
            .return_item(1, 1, MediaKind::Movie, "603")
            .await
            .unwrap();
        assert_eq!(service.recent_returns(5).await.unwrap().len(), 1);

        // A fresh borrow recorded from a long-past date is already due
        service
            .borrow_on(1, "reader", MediaKind::Movie, "matrix", day(2020, 1, 1))
            .await
            .unwrap();

        let overdue = service.overdue().await.unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].external_id, "603");
        assert_eq!(overdue[0].due_date, day(2020, 1, 15));
    }

    #[tokio::test]
    async fn test_borrow_return_borrow_lifecycle() {
        let service = service(vec![movie("603", "The Matrix")], 10);
        let today = day(2026, 8, 30);

        service
            .borrow_on(1, "reader", MediaKind::Movie, "matrix", today)
            .await
            .unwrap();
        service
            .return_item(1, 1, MediaKind::Movie, "603")
            .await
            .unwrap();
        service
            .borrow_on(1, "reader", MediaKind::Movie, "matrix", today)
            .await
            .unwrap();

        assert_eq!(service.loans_for_user(1, None).await.unwrap().len(), 1);
        assert_eq!(service.recent_returns(5).await.unwrap().len(), 1);
    }
}
