//! Accounts receivable and payable sub-ledgers

pub mod adapter;
pub mod ageing;
pub mod allocation;

pub use adapter::*;
pub use ageing::*;
pub use allocation::*;
