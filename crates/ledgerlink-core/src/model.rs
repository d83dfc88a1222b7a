// ── Banking resource types ──
//
// Wire shapes for the resources the operations in `operations.rs` read and
// write. Only fields the client acts on are typed; everything else lands
// in `extra` so callers can still render it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A loan as listed for its owner or for an approver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Loan {
    pub id: i64,
    #[serde(default)]
    pub account_number: Option<String>,
    pub amount: f64,
    #[serde(default)]
    pub status: LoanStatus,
    #[serde(default)]
    pub loan_type: Option<String>,
    #[serde(default)]
    pub tenure_months: Option<u32>,
    #[serde(default)]
    pub interest_rate: Option<f64>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Lifecycle state reported by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Closed,
    /// A status this client version does not know.
    #[serde(other)]
    Unknown,
}

/// Body of `POST /api/loan/apply`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanApplication {
    pub account_number: String,
    pub amount: f64,
    pub loan_type: String,
    pub tenure_months: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
}

/// Body of `POST /api/transaction/transfer`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub from_account: String,
    pub to_account: String,
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(default)]
    pub id: Option<Value>,
    pub amount: f64,
    #[serde(default, alias = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "date")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub account_number: String,
    pub balance: f64,
    #[serde(default)]
    pub account_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportTicket {
    pub id: i64,
    pub subject: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of `POST /api/support`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTicket {
    pub subject: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_loan_status_does_not_fail_decoding() {
        let loan: Loan = serde_json::from_value(json!({
            "id": 7,
            "amount": 5000.0,
            "status": "UNDER_REVIEW",
            "branchCode": "N01",
        }))
        .unwrap();
        assert_eq!(loan.status, LoanStatus::Unknown);
        assert_eq!(loan.extra["branchCode"], "N01");
    }

    #[test]
    fn application_serializes_camel_case() {
        let body = serde_json::to_value(LoanApplication {
            account_number: "ACC123".into(),
            amount: 2500.0,
            loan_type: "PERSONAL".into(),
            tenure_months: 12,
            purpose: None,
        })
        .unwrap();
        assert_eq!(
            body,
            json!({
                "accountNumber": "ACC123",
                "amount": 2500.0,
                "loanType": "PERSONAL",
                "tenureMonths": 12,
            })
        );
    }
}
