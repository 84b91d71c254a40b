//! Process-wide budget ledger shared between the router (ex-ante
//! reservation checks) and the worker manager (ex-post cost recording).

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod ledger;

pub use ledger::{BudgetLedger, BudgetSnapshot};
