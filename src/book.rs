use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::{BookId, UserId};

/// A catalog entry together with its circulation flag and reservation queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Book {
    /// Unique catalog id
    id: BookId,
    /// Title, matched by catalog search
    title: String,
    /// Author
    author: String,
    /// Publisher
    publisher: String,
    /// Publication year
    year: i32,
    /// ISBN as printed
    isbn: String,
    /// False while an active loan references the book
    available: bool,
    /// Members waiting for the book, earliest first
    reservations: VecDeque<UserId>,
}

impl Book {
    /// Create a book that is on the shelf with nobody waiting for it
    #[must_use]
    pub fn new(
        id: BookId,
        title: &str,
        author: &str,
        publisher: &str,
        year: i32,
        isbn: &str,
    ) -> Self {
        Self {
            id,
            title: title.to_string(),
            author: author.to_string(),
            publisher: publisher.to_string(),
            year,
            isbn: isbn.to_string(),
            available: true,
            reservations: VecDeque::new(),
        }
    }

    /// Catalog id
    #[must_use]
    pub fn id(&self) -> BookId {
        self.id
    }

    /// Title as catalogued
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn author(&self) -> &str {
        &self.author
    }

    #[must_use]
    pub fn publisher(&self) -> &str {
        &self.publisher
    }

    /// Publication year
    #[must_use]
    pub fn year(&self) -> i32 {
        self.year
    }

    #[must_use]
    pub fn isbn(&self) -> &str {
        &self.isbn
    }

    /// True while the book is on the shelf
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Flip the circulation flag. Only the engine and the loader call this.
    pub(crate) fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    /// Queue a member for the book.
    ///
    /// Returns false, leaving the queue untouched, if the book is on the
    /// shelf or the member is already waiting for it.
    pub fn reserve(&mut self, user_id: UserId) -> bool {
        if self.available || self.is_reserved_by(user_id) {
            return false;
        }
        self.reservations.push_back(user_id);
        true
    }

    /// Drop the member's place in the queue, keeping everyone else in order.
    ///
    /// Returns false if the member was not waiting.
    pub fn cancel_reservation(&mut self, user_id: UserId) -> bool {
        match self.reservations.iter().position(|&queued| queued == user_id) {
            Some(pos) => self.reservations.remove(pos).is_some(),
            None => false,
        }
    }

    /// Dequeue the earliest reservation holder, if any
    pub fn pop_next_reservation(&mut self) -> Option<UserId> {
        self.reservations.pop_front()
    }

    #[must_use]
    pub fn is_reserved(&self) -> bool {
        !self.reservations.is_empty()
    }

    #[must_use]
    pub fn is_reserved_by(&self, user_id: UserId) -> bool {
        self.reservations.contains(&user_id)
    }

    /// Queued member ids, earliest first
    pub fn reservations(&self) -> impl Iterator<Item = UserId> + '_ {
        self.reservations.iter().copied()
    }
}

/// Where a book is, as seen from the ledger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BookStatus {
    /// On the shelf
    #[default]
    Available,
    /// Lent to a member
    OnLoan {
        /// Member holding the book
        holder: UserId,
        /// When the loan falls due
        due: DateTime<Utc>,
    },
}

impl BookStatus {
    /// Get a human-readable description of the status
    #[must_use]
    pub fn get_description(&self) -> String {
        match self {
            Self::Available => "Book is available for checkout".to_string(),
            Self::OnLoan { holder, due } => {
                format!("Book is checked out by member {holder}, due {}", due.format("%Y-%m-%d %H:%M"))
            }
        }
    }
}
