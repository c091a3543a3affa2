//! Reminder delivery channel
//!
//! A sweep marks a loan as reminded only when its notification was
//! actually delivered, so delivery outcomes are explicit: a rejected
//! or unreachable recipient leaves the loan eligible for the next
//! sweep.

use crate::core::error::{LendError, Result};
use crate::db::models::Loan;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

/// Outcome of one delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The recipient received the reminder
    Delivered,
    /// The recipient refuses messages; retrying will not help
    Forbidden,
    /// The recipient no longer exists
    NotFound,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one due/overdue reminder. Transport failures return an
    /// error; a reachable endpoint that declines the recipient returns
    /// a non-`Delivered` outcome instead.
    async fn notify(&self, loan: &Loan, today: NaiveDate) -> Result<Delivery>;
}

#[derive(Debug, Serialize)]
struct ReminderPayload<'a> {
    user_id: i64,
    username: Option<&'a str>,
    kind: &'a str,
    title: &'a str,
    due_date: String,
    days_left: i64,
    overdue: bool,
}

impl<'a> ReminderPayload<'a> {
    fn from_loan(loan: &'a Loan, today: NaiveDate) -> Self {
        let days_left = loan.days_left(today);
        Self {
            user_id: loan.user_id,
            username: loan.username.as_deref(),
            kind: loan.kind.as_str(),
            title: &loan.title,
            due_date: loan.due_date.format("%Y-%m-%d").to_string(),
            days_left,
            overdue: days_left < 0,
        }
    }
}

/// Posts reminder payloads to a configured webhook
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(http: reqwest::Client, url: String) -> Self {
        Self { http, url }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, loan: &Loan, today: NaiveDate) -> Result<Delivery> {
        let payload = ReminderPayload::from_loan(loan, today);

        let response = self
            .http
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                LendError::NotificationFailure(format!("webhook unreachable: {}", e))
            })?;

        match response.status() {
            s if s.is_success() => Ok(Delivery::Delivered),
            reqwest::StatusCode::FORBIDDEN => Ok(Delivery::Forbidden),
            reqwest::StatusCode::NOT_FOUND => Ok(Delivery::NotFound),
            s => Err(LendError::NotificationFailure(format!(
                "webhook returned status {}",
                s
            ))),
        }
    }
}

/// Fallback channel when no webhook is configured: reminders land in
/// the log and count as delivered.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, loan: &Loan, today: NaiveDate) -> Result<Delivery> {
        let days_left = loan.days_left(today);
        info!(
            user_id = loan.user_id,
            kind = %loan.kind,
            title = %loan.title,
            due_date = %loan.due_date,
            days_left = days_left,
            "loan reminder"
        );
        Ok(Delivery::Delivered)
    }
}
