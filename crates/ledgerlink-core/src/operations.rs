// ── Banking operations ──
//
// Typed wrappers over `ApiClient::request`. Each mutation names the cache
// prefixes it makes stale; they are evicted only after the server confirms
// success.

use serde_json::{Value, json};

use crate::client::{ApiClient, RequestOptions};
use crate::error::CoreError;
use crate::model::{
    AccountSummary, Loan, LoanApplication, NewTicket, SupportTicket, Transaction, TransferRequest,
};

/// Resource families used as invalidation prefixes.
pub mod prefixes {
    pub const LOANS: &str = "/api/loan";
    pub const ANALYTICS: &str = "/api/analytics";
    pub const ACCOUNTS: &str = "/api/account";
    pub const TRANSACTIONS: &str = "/api/transaction";
    pub const ADMIN: &str = "/api/admin";
    pub const SUPPORT: &str = "/api/support";
    pub const NOTIFICATIONS: &str = "/api/notifications";
}

/// Invalidation set for each mutating operation.
pub mod invalidates {
    use super::prefixes::{
        ACCOUNTS, ADMIN, ANALYTICS, LOANS, NOTIFICATIONS, SUPPORT, TRANSACTIONS,
    };

    pub const APPLY_FOR_LOAN: &[&str] = &[LOANS, ANALYTICS];
    pub const APPROVE_LOAN: &[&str] = &[LOANS, ANALYTICS, ACCOUNTS, TRANSACTIONS, ADMIN];
    pub const REJECT_LOAN: &[&str] = &[LOANS, ANALYTICS, ADMIN];
    pub const TRANSFER: &[&str] = &[ACCOUNTS, TRANSACTIONS, ANALYTICS];
    pub const OPEN_TICKET: &[&str] = &[SUPPORT];
    pub const MARK_NOTIFICATIONS_READ: &[&str] = &[NOTIFICATIONS];
}

impl ApiClient {
    // ── Reads ────────────────────────────────────────────────────────

    pub async fn my_loans(&self, account: &str) -> Result<Vec<Loan>, CoreError> {
        self.request(
            &format!("{}/my/{account}", prefixes::LOANS),
            RequestOptions::cached().message("Loading loans..."),
        )
        .await
    }

    pub async fn account_summary(&self, account: &str) -> Result<AccountSummary, CoreError> {
        self.request(
            &format!("{}/{account}", prefixes::ACCOUNTS),
            RequestOptions::cached(),
        )
        .await
    }

    pub async fn transactions(&self, account: &str) -> Result<Vec<Transaction>, CoreError> {
        self.request(
            &format!("{}/{account}", prefixes::TRANSACTIONS),
            RequestOptions::cached().message("Loading transactions..."),
        )
        .await
    }

    /// Aggregate loan figures; shape varies by role, so left untyped.
    pub async fn loan_analytics(&self) -> Result<Value, CoreError> {
        self.request(
            &format!("{}/loans", prefixes::ANALYTICS),
            RequestOptions::cached(),
        )
        .await
    }

    pub async fn my_tickets(&self) -> Result<Vec<SupportTicket>, CoreError> {
        self.request(
            &format!("{}/my", prefixes::SUPPORT),
            RequestOptions::cached(),
        )
        .await
    }

    pub async fn pending_loans(&self) -> Result<Vec<Loan>, CoreError> {
        self.request(
            &format!("{}/loans/pending", prefixes::ADMIN),
            RequestOptions::cached().message("Loading pending loans..."),
        )
        .await
    }

    // ── Mutations ────────────────────────────────────────────────────

    pub async fn apply_for_loan(&self, application: &LoanApplication) -> Result<Loan, CoreError> {
        let body = serde_json::to_value(application).map_err(CoreError::malformed)?;
        self.request(
            &format!("{}/apply", prefixes::LOANS),
            RequestOptions::post(body)
                .message("Submitting application...")
                .invalidating(invalidates::APPLY_FOR_LOAN.iter().copied()),
        )
        .await
    }

    pub async fn approve_loan(&self, loan_id: i64) -> Result<Value, CoreError> {
        self.request(
            &format!("{}/loans/{loan_id}/approve", prefixes::ADMIN),
            RequestOptions::put(None)
                .message("Approving loan...")
                .invalidating(invalidates::APPROVE_LOAN.iter().copied()),
        )
        .await
    }

    pub async fn reject_loan(&self, loan_id: i64, reason: &str) -> Result<Value, CoreError> {
        self.request(
            &format!("{}/loans/{loan_id}/reject", prefixes::ADMIN),
            RequestOptions::put(Some(json!({ "reason": reason })))
                .message("Rejecting loan...")
                .invalidating(invalidates::REJECT_LOAN.iter().copied()),
        )
        .await
    }

    pub async fn transfer(&self, transfer: &TransferRequest) -> Result<Value, CoreError> {
        let body = serde_json::to_value(transfer).map_err(CoreError::malformed)?;
        self.request(
            &format!("{}/transfer", prefixes::TRANSACTIONS),
            RequestOptions::post(body)
                .message("Sending transfer...")
                .invalidating(invalidates::TRANSFER.iter().copied()),
        )
        .await
    }

    pub async fn open_ticket(&self, ticket: &NewTicket) -> Result<SupportTicket, CoreError> {
        let body = serde_json::to_value(ticket).map_err(CoreError::malformed)?;
        self.request(
            prefixes::SUPPORT,
            RequestOptions::post(body).invalidating(invalidates::OPEN_TICKET.iter().copied()),
        )
        .await
    }

    pub async fn mark_notifications_read(&self) -> Result<(), CoreError> {
        let _: Value = self
            .request(
                &format!("{}/read", prefixes::NOTIFICATIONS),
                RequestOptions::put(None)
                    .invalidating(invalidates::MARK_NOTIFICATIONS_READ.iter().copied()),
            )
            .await?;
        Ok(())
    }
}
