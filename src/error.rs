use std::path::PathBuf;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{BookId, UserId};

/// Reasons a catalog, membership or circulation operation was refused.
///
/// Every variant leaves the library untouched: checks run before any
/// mutation, so the caller can report the error and carry on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LibraryError {
    /// No book with this id is in the catalog
    #[error("book {0} not found")]
    BookNotFound(BookId),
    /// No member with this id is registered
    #[error("member {0} not found")]
    MemberNotFound(UserId),
    /// The member has no account in the ledger
    #[error("no account for member {0}")]
    AccountNotFound(UserId),
    /// A book with this id already exists
    #[error("book {0} already exists")]
    DuplicateBook(BookId),
    /// A member with this id already exists
    #[error("member {0} already exists")]
    DuplicateMember(UserId),
    /// The member's role lacks the capability for this operation
    #[error("member {0} is not eligible for this operation")]
    NotEligible(UserId),
    /// The book is currently on loan
    #[error("book {0} is not available")]
    Unavailable(BookId),
    /// The member already holds as many books as the role allows
    #[error("borrowing limit of {limit} books reached")]
    LimitReached {
        /// Maximum concurrent loans for the member's role
        limit: usize,
    },
    /// The member already has this exact book on loan
    #[error("book {0} is already borrowed by this member")]
    AlreadyBorrowed(BookId),
    /// The member owes a fine and may not borrow
    #[error("outstanding fine of {0} must be paid first")]
    OutstandingFine(Decimal),
    /// The member has no active loan for this book
    #[error("member has no active loan for book {0}")]
    NoActiveLoan(BookId),
    /// The member holds no reservation for this book
    #[error("member has no reservation for book {0}")]
    NoReservation(BookId),
    /// Reservations are only taken while the book is on loan
    #[error("book {0} is on the shelf and cannot be reserved")]
    NotOnLoan(BookId),
    /// The member is already queued for this book
    #[error("book {0} is already reserved by this member")]
    AlreadyReserved(BookId),
}

/// Failures of the flat-file store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading, writing or renaming a file failed
    #[error("i/o error on {path}: {source}")]
    Io {
        /// File or directory being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
    /// The delimited reader or writer failed
    #[error("record error in {path}: {source}")]
    Record {
        /// File being read or written
        path: PathBuf,
        /// Underlying error
        #[source]
        source: csv::Error,
    },
}

/// Problems with the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("cannot read config {path}: {source}")]
    Read {
        /// Config file path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid JSON for [`crate::LibraryConfig`]
    #[error("invalid config {path}: {source}")]
    Parse {
        /// Config file path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },
    /// Loans must last at least one day
    #[error("loan period must be a positive number of days, got {0}")]
    LoanPeriod(i64),
}
