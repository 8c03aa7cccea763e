use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::{BookId, UserId};

/// Circulation changes reported to observers after they are applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CirculationEvent {
    /// A member borrowed a book from the shelf
    Borrowed {
        /// Borrowing member
        user_id: UserId,
        /// Book lent
        book_id: BookId,
        /// When the loan falls due
        due_at: DateTime<Utc>,
    },
    /// A member returned a book, possibly late
    Returned {
        /// Returning member
        user_id: UserId,
        /// Book returned
        book_id: BookId,
        /// Fine charged, zero if on time
        fine: Decimal,
    },
    /// A returned book went straight to the next reservation holder
    HandedOff {
        /// Book passed on
        book_id: BookId,
        /// Member who returned it
        from: UserId,
        /// Reservation holder who now has it
        to: UserId,
        /// When the new loan falls due
        due_at: DateTime<Utc>,
    },
    /// A returned book went back on the shelf
    Shelved {
        /// Book shelved
        book_id: BookId,
    },
    /// A member joined a book's reservation queue
    Reserved {
        /// Queued member
        user_id: UserId,
        /// Book reserved
        book_id: BookId,
    },
    /// A member left a book's reservation queue
    ReservationCancelled {
        /// Member who left the queue
        user_id: UserId,
        /// Book whose queue changed
        book_id: BookId,
    },
    /// A member paid towards their fines
    FinePaid {
        /// Paying member
        user_id: UserId,
        /// Amount paid
        amount: Decimal,
        /// Balance after the payment
        balance: Decimal,
    },
}
