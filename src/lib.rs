//! Library catalog, membership and circulation engine.
//!
//! This crate tracks books, members and their accounts, applies the
//! borrowing, return, reservation and fine rules, and keeps the whole
//! library in a directory of pipe-delimited flat files.

pub mod account;
pub mod book;
pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod ledger;
pub mod member;
pub mod observers;
pub mod persistence;
pub mod system;

/// Catalog id of a book
pub type BookId = u32;
/// Id of a library member
pub type UserId = u32;

pub use account::{Account, BorrowRecord};
pub use book::{Book, BookStatus};
pub use catalog::Catalog;
pub use config::LibraryConfig;
pub use error::{ConfigError, LibraryError, StorageError};
pub use events::CirculationEvent;
pub use ledger::AccountLedger;
pub use member::{Capability, Member, Membership, Policy, Role};
pub use observers::{CirculationLogger, CirculationObserver, NotificationService};
pub use persistence::FlatFileStore;
pub use system::{Library, LoanReport, OpenError, ReturnOutcome};
