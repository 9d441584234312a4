//! Accounts: the data model, validation, persistence and the manager that
//! ties them together.

mod manager;
mod model;
mod store;
mod validation;

pub use manager::{AccountManager, AccountStatistics};
pub use model::{Account, AccountId, AccountSettings, AccountType, AuthType, SecurityMode};
pub use store::{AccountStore, MemoryAccountStore, SqliteAccountStore};
pub use validation::{
    ValidationError, ValidationResult, is_valid_email, is_valid_port, validate_account,
    validate_incoming, validate_outgoing,
};
