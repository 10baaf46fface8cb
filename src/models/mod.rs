//! Domain models for the lending ledger

pub mod item;
pub mod loan;

pub use item::ItemStock;
pub use loan::{BorrowCount, Loan, LoanFilter, LoanStatus, NewLoan};
