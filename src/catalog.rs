use std::collections::BTreeMap;

use crate::{BookId, UserId, book::Book, error::LibraryError};

/// All books held by the library, keyed by id
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    /// Books in id order
    books: BTreeMap<BookId, Book>,
}

impl Catalog {
    /// An empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a book.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::DuplicateBook` if the id is taken.
    pub fn add(&mut self, book: Book) -> Result<(), LibraryError> {
        let id = book.id();
        if self.books.contains_key(&id) {
            return Err(LibraryError::DuplicateBook(id));
        }
        self.books.insert(id, book);
        Ok(())
    }

    /// Delete a book whether or not it is on loan or reserved
    pub fn remove(&mut self, book_id: BookId) -> Option<Book> {
        self.books.remove(&book_id)
    }

    /// Look up a book by id
    #[must_use]
    pub fn find(&self, book_id: BookId) -> Option<&Book> {
        self.books.get(&book_id)
    }

    /// Look up a book for mutation
    pub(crate) fn find_mut(&mut self, book_id: BookId) -> Option<&mut Book> {
        self.books.get_mut(&book_id)
    }

    /// Case-insensitive substring match on titles. An empty query lists
    /// every book.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<&Book> {
        let needle = query.to_lowercase();
        self.books.values().filter(|book| book.title().to_lowercase().contains(&needle)).collect()
    }

    /// Queue `user_id` for a book on loan. False if the book is unknown,
    /// on the shelf, or already reserved by the member.
    pub fn reserve(&mut self, book_id: BookId, user_id: UserId) -> bool {
        self.books.get_mut(&book_id).is_some_and(|book| book.reserve(user_id))
    }

    /// False if the book is unknown or the member was not queued
    pub fn cancel_reservation(&mut self, book_id: BookId, user_id: UserId) -> bool {
        self.books.get_mut(&book_id).is_some_and(|book| book.cancel_reservation(user_id))
    }

    /// Dequeue the earliest holder; `None` when nobody is waiting
    pub fn pop_next_reservation(&mut self, book_id: BookId) -> Option<UserId> {
        self.books.get_mut(&book_id).and_then(Book::pop_next_reservation)
    }

    /// Remove `user_id` from every reservation queue, returning how many
    /// queues it left
    pub fn drop_reservations_of(&mut self, user_id: UserId) -> usize {
        let mut dropped = 0_usize;
        for book in self.books.values_mut() {
            while book.cancel_reservation(user_id) {
                dropped = dropped.saturating_add(1);
            }
        }
        dropped
    }

    /// Books in id order
    pub fn iter(&self) -> impl Iterator<Item = &Book> {
        self.books.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.books.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    /// Number of books currently on the shelf
    #[must_use]
    pub fn available_count(&self) -> usize {
        self.books.values().filter(|book| book.is_available()).count()
    }
}
