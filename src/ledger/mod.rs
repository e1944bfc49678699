//! General ledger: chart of accounts, periods, posting, reversal and reporting

pub mod account;
pub mod core;
pub mod journal;
pub mod period;
pub mod reporting;
pub mod reversal;

pub use account::*;
pub use self::core::*;
pub use journal::*;
pub use period::*;
pub use reporting::*;
pub use reversal::*;
