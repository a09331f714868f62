use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// unique identifier for a client
pub type ClientId = Uuid;

/// unique identifier for a loan
pub type LoanId = Uuid;

/// unique identifier for an installment row
pub type InstallmentId = Uuid;

/// loan status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    /// performing, nothing past due
    Active,
    /// balance fully repaid
    Paid,
    /// past the loan due date or with a pending installment past due
    Overdue,
    /// closed by an explicit cancel action
    Cancelled,
}

impl LoanStatus {
    /// paid and cancelled loans are never re-derived
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoanStatus::Paid | LoanStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Active => "active",
            LoanStatus::Paid => "paid",
            LoanStatus::Overdue => "overdue",
            LoanStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(LoanStatus::Active),
            "paid" => Ok(LoanStatus::Paid),
            "overdue" => Ok(LoanStatus::Overdue),
            "cancelled" => Ok(LoanStatus::Cancelled),
            other => Err(format!("unknown loan status: {}", other)),
        }
    }
}

/// installment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallmentStatus {
    Pending,
    Paid,
    Overdue,
}

impl InstallmentStatus {
    /// pending and overdue installments can still receive a payment
    pub fn is_open(&self) -> bool {
        !matches!(self, InstallmentStatus::Paid)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstallmentStatus::Pending => "pending",
            InstallmentStatus::Paid => "paid",
            InstallmentStatus::Overdue => "overdue",
        }
    }
}

impl fmt::Display for InstallmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstallmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InstallmentStatus::Pending),
            "paid" => Ok(InstallmentStatus::Paid),
            "overdue" => Ok(InstallmentStatus::Overdue),
            other => Err(format!("unknown installment status: {}", other)),
        }
    }
}

/// offset/limit paging for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub const DEFAULT_LIMIT: usize = 100;

    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    /// every row; the limit still fits a signed 64-bit SQL parameter
    pub fn all() -> Self {
        Self {
            offset: 0,
            limit: i64::MAX as usize,
        }
    }

    /// apply the window to an already ordered list
    pub fn slice<T>(&self, items: Vec<T>) -> Vec<T> {
        items.into_iter().skip(self.offset).take(self.limit).collect()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

/// client list filter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientFilter {
    pub active: Option<bool>,
}

/// loan list filter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoanFilter {
    pub status: Option<LoanStatus>,
    pub client_id: Option<ClientId>,
}

/// installment list filter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallmentFilter {
    pub loan_id: Option<LoanId>,
    pub status: Option<InstallmentStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_through_str() {
        for status in [LoanStatus::Active, LoanStatus::Paid, LoanStatus::Overdue, LoanStatus::Cancelled] {
            assert_eq!(status.as_str().parse::<LoanStatus>().unwrap(), status);
        }
        assert!("vencido".parse::<LoanStatus>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(LoanStatus::Paid.is_terminal());
        assert!(LoanStatus::Cancelled.is_terminal());
        assert!(!LoanStatus::Active.is_terminal());
        assert!(!LoanStatus::Overdue.is_terminal());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&InstallmentStatus::Overdue).unwrap();
        assert_eq!(json, "\"overdue\"");
    }

    #[test]
    fn test_page_slice() {
        let items: Vec<u32> = (1..=10).collect();
        assert_eq!(Page::new(2, 3).slice(items.clone()), vec![3, 4, 5]);
        assert_eq!(Page::new(9, 5).slice(items), vec![10]);
    }
}
