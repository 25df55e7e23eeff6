pub mod account;
pub mod audit;
pub mod entry;
pub mod hold;
pub mod outbox;
pub mod transfer;

pub use account::Account;
pub use audit::{AuditLog, AuditStatus, RequestProvenance};
pub use entry::Entry;
pub use hold::{Hold, HoldStatus};
pub use outbox::{EventType, OutboxEvent};
pub use transfer::Transfer;
