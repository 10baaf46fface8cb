//! Loan model, lifecycle status and query filters

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use crate::error::AppError;

/// Loan lifecycle status.
///
/// Transitions are closed: `Active -> {Overdue, Returned}`, `Overdue -> {Returned}`,
/// and nothing leaves `Returned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Overdue,
    Returned,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Active => "active",
            LoanStatus::Overdue => "overdue",
            LoanStatus::Returned => "returned",
        }
    }

    pub fn can_transition_to(self, next: LoanStatus) -> bool {
        matches!(
            (self, next),
            (LoanStatus::Active, LoanStatus::Overdue)
                | (LoanStatus::Active, LoanStatus::Returned)
                | (LoanStatus::Overdue, LoanStatus::Returned)
        )
    }

    /// Statuses of loans whose unit is still checked out
    pub fn is_open(self) -> bool {
        !matches!(self, LoanStatus::Returned)
    }
}

impl FromStr for LoanStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(LoanStatus::Active),
            "overdue" => Ok(LoanStatus::Overdue),
            "returned" => Ok(LoanStatus::Returned),
            other => Err(AppError::BadRequest(format!("Unknown loan status '{}'", other))),
        }
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One lending transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Loan {
    pub id: i64,
    pub item_id: i64,
    pub borrower_id: i64,
    pub status: LoanStatus,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
}

impl Loan {
    /// Due date passed and the unit has not come back yet
    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        self.status.is_open() && self.returned_at.is_none() && self.due_at < now
    }

    /// `returned_at` must be set exactly when the loan is returned.
    pub fn check_consistency(&self) -> Result<(), AppError> {
        let returned = self.status == LoanStatus::Returned;
        if returned != self.returned_at.is_some() {
            return Err(AppError::Invariant(format!(
                "loan {} has status '{}' but returned_at is {:?}",
                self.id, self.status, self.returned_at
            )));
        }
        Ok(())
    }
}

/// Raw `loans` row; the status column is text
#[derive(Debug, FromRow)]
pub struct LoanRow {
    pub id: i64,
    pub item_id: i64,
    pub borrower_id: i64,
    pub status: String,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
}

impl TryFrom<LoanRow> for Loan {
    type Error = AppError;

    fn try_from(row: LoanRow) -> Result<Self, Self::Error> {
        let status = LoanStatus::from_str(&row.status).map_err(|_| {
            AppError::Invariant(format!("loan {} has unknown status '{}'", row.id, row.status))
        })?;

        let loan = Loan {
            id: row.id,
            item_id: row.item_id,
            borrower_id: row.borrower_id,
            status,
            borrowed_at: row.borrowed_at,
            due_at: row.due_at,
            returned_at: row.returned_at,
        };
        loan.check_consistency()?;
        Ok(loan)
    }
}

/// A loan about to be inserted; the store assigns the id
#[derive(Debug, Clone)]
pub struct NewLoan {
    pub item_id: i64,
    pub borrower_id: i64,
    pub status: LoanStatus,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
}

/// Conjunctive loan filter. Unset fields do not constrain.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LoanFilter {
    /// Only loans of this item
    pub item_id: Option<i64>,
    /// Only loans of this borrower
    pub borrower_id: Option<i64>,
    /// Only loans in this status
    #[param(value_type = Option<String>)]
    pub status: Option<LoanStatus>,
    /// Only loans past due and not yet returned
    #[serde(default)]
    pub overdue: bool,
    /// Borrowed at or after this instant
    pub from: Option<DateTime<Utc>>,
    /// Borrowed at or before this instant
    pub to: Option<DateTime<Utc>>,
}

impl LoanFilter {
    pub fn overdue() -> Self {
        Self {
            overdue: true,
            ..Self::default()
        }
    }

    pub fn for_borrower(borrower_id: i64) -> Self {
        Self {
            borrower_id: Some(borrower_id),
            ..Self::default()
        }
    }

    /// In-process evaluation, equivalent to the SQL predicate built by the loans repository
    pub fn matches(&self, loan: &Loan, now: DateTime<Utc>) -> bool {
        self.item_id.map_or(true, |id| loan.item_id == id)
            && self.borrower_id.map_or(true, |id| loan.borrower_id == id)
            && self.status.map_or(true, |s| loan.status == s)
            && (!self.overdue || (loan.status.is_open() && loan.due_at < now))
            && self.from.map_or(true, |from| loan.borrowed_at >= from)
            && self.to.map_or(true, |to| loan.borrowed_at <= to)
    }
}

/// Loan count for one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BorrowCount {
    pub item_id: i64,
    pub borrow_count: i64,
}
