mod ledger;
mod money;
mod student;
mod transaction;

pub use ledger::*;
pub use money::*;
pub use student::*;
pub use transaction::*;
