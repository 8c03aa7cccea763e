use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::{
    BookId, UserId,
    account::{Account, BorrowRecord},
    book::{Book, BookStatus},
    catalog::Catalog,
    config::LibraryConfig,
    error::{ConfigError, LibraryError, StorageError},
    events::CirculationEvent,
    ledger::AccountLedger,
    member::{Capability, Member, Membership},
    observers::{CirculationLogger, CirculationObserver, NotificationService},
    persistence::{FlatFileStore, LoadedState},
};

/// Failure to bring a library up from its configuration
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    /// The configuration is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The data directory could not be read
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// What happened when a book came back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnOutcome {
    /// Fine charged to the returning member, zero if on time
    pub fine: Decimal,
    /// Reservation holder who received the book, if any
    pub handed_off_to: Option<UserId>,
}

/// An active loan joined with its book and borrower
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoanReport {
    /// Book on loan
    pub book_id: BookId,
    /// Its title
    pub title: String,
    /// Borrowing member
    pub user_id: UserId,
    /// The borrower's name
    pub member_name: String,
    /// When the loan started
    pub borrowed_at: DateTime<Utc>,
    /// When the loan falls due
    pub due_at: DateTime<Utc>,
}

/// Catalog, membership and accounts, plus the circulation rules over them.
///
/// Every successful mutation is written through to the attached store, if
/// any. A failed save is logged and the in-memory change stands.
pub struct Library {
    /// Books and their reservation queues
    catalog: Catalog,
    /// Registered members
    members: Membership,
    /// Loans and fines per member
    ledger: AccountLedger,
    /// Write-through target, absent for purely in-memory libraries
    store: Option<FlatFileStore>,
    /// Registered circulation observers
    observers: Vec<Box<dyn CirculationObserver>>,
}

impl fmt::Debug for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Library")
            .field("catalog", &self.catalog)
            .field("members", &self.members)
            .field("ledger", &self.ledger)
            .field("store", &self.store)
            .field("observers_count", &self.observers.len())
            .finish()
    }
}

impl Default for Library {
    fn default() -> Self {
        Self::new()
    }
}

impl Library {
    /// Create an empty in-memory library with the standard loan period
    #[must_use]
    pub fn new() -> Self {
        Self::from_parts(Catalog::new(), Membership::new(), AccountLedger::new(), None)
    }

    /// Create an empty in-memory library whose loans last `loan_period`
    #[must_use]
    pub fn with_loan_period(loan_period: TimeDelta) -> Self {
        Self::from_parts(
            Catalog::new(),
            Membership::new(),
            AccountLedger::with_loan_period(loan_period),
            None,
        )
    }

    /// Assemble a library from already populated stores
    fn from_parts(
        catalog: Catalog,
        members: Membership,
        ledger: AccountLedger,
        store: Option<FlatFileStore>,
    ) -> Self {
        Self { catalog, members, ledger, store, observers: Vec::new() }
    }

    /// Load the library kept in `store` and write every later change back to it
    ///
    /// # Errors
    ///
    /// Returns a `StorageError` if an existing data file cannot be read.
    pub fn load(store: FlatFileStore, loan_period: TimeDelta) -> Result<Self, StorageError> {
        let LoadedState { catalog, members, ledger } = store.load(loan_period)?;
        let mut library = Self::from_parts(catalog, members, ledger, Some(store));

        library.register_observer(Box::new(CirculationLogger));
        library.register_observer(Box::new(NotificationService));

        info!(
            books = library.catalog.len(),
            members = library.members.len(),
            "library loaded"
        );
        Ok(library)
    }

    /// Load the library described by a configuration
    ///
    /// # Errors
    ///
    /// Returns an `OpenError` for an invalid loan period or unreadable data.
    pub fn open(config: &LibraryConfig) -> Result<Self, OpenError> {
        let loan_period = config.loan_period()?;
        Ok(Self::load(FlatFileStore::new(&config.data_dir), loan_period)?)
    }

    /// Register an observer to be notified of circulation events
    pub fn register_observer(&mut self, observer: Box<dyn CirculationObserver>) {
        self.observers.push(observer);
    }

    /// Hand an applied event to every observer
    fn notify(&self, event: &CirculationEvent) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }

    /// Write the full state through to the store.
    ///
    /// Failures are logged and swallowed; memory and disk may then differ
    /// until the next successful save.
    fn persist(&self) {
        if let Some(store) = &self.store {
            if let Err(err) = store.save(&self.catalog, &self.members, &self.ledger) {
                error!(error = %err, "failed to save library state");
            }
        }
    }

    /// Save now, reporting the outcome to the caller
    ///
    /// # Errors
    ///
    /// Returns the `StorageError` of the failed write. Does nothing for an
    /// in-memory library.
    pub fn save(&self) -> Result<(), StorageError> {
        match &self.store {
            Some(store) => store.save(&self.catalog, &self.members, &self.ledger),
            None => Ok(()),
        }
    }

    // ---- catalog -------------------------------------------------------

    /// Add a book to the catalog. A book whose id still has an active loan,
    /// left behind by an earlier removal, goes in as on loan.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::DuplicateBook` if the id is taken.
    pub fn add_book(&mut self, mut book: Book) -> Result<(), LibraryError> {
        let id = book.id();
        if let Some((holder, _)) = self.ledger.holder_of(id) {
            warn!(book = id, member = holder, "book re-added while still on loan");
            book.set_available(false);
        }
        self.catalog.add(book)?;
        info!(book = id, "book added");
        self.persist();
        Ok(())
    }

    /// Remove a book even if it is on loan or reserved. Loans and queue
    /// entries that point at it are left behind.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::BookNotFound` for an unknown id.
    pub fn remove_book(&mut self, book_id: BookId) -> Result<Book, LibraryError> {
        let book = self.catalog.remove(book_id).ok_or(LibraryError::BookNotFound(book_id))?;
        if !book.is_available() || book.is_reserved() {
            warn!(book = book_id, "removed a book that was on loan or reserved");
        }
        self.persist();
        Ok(book)
    }

    /// Look up a book by id
    #[must_use]
    pub fn book(&self, book_id: BookId) -> Option<&Book> {
        self.catalog.find(book_id)
    }

    /// Case-insensitive title search; an empty query lists every book
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<&Book> {
        self.catalog.search(query)
    }

    /// All books
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Shelf status of a book, derived from the ledger
    #[must_use]
    pub fn book_status(&self, book_id: BookId) -> Option<BookStatus> {
        self.catalog.find(book_id)?;
        Some(match self.ledger.holder_of(book_id) {
            Some((holder, loan)) => BookStatus::OnLoan { holder, due: loan.due_at },
            None => BookStatus::Available,
        })
    }

    // ---- membership ----------------------------------------------------

    /// Register a member and open their account. Reservations left behind
    /// by an earlier member with the same id are dropped.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::DuplicateMember` if the id is taken.
    pub fn add_member(&mut self, member: Member) -> Result<(), LibraryError> {
        let id = member.id();
        self.members.add(member)?;
        self.ledger.open(id);
        let dropped = self.catalog.drop_reservations_of(id);
        if dropped > 0 {
            warn!(member = id, reservations = dropped, "dropped reservations of a former member");
        }
        info!(member = id, "member added");
        self.persist();
        Ok(())
    }

    /// Remove a member and their account, active loans included
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::MemberNotFound` for an unknown id.
    pub fn remove_member(&mut self, user_id: UserId) -> Result<Member, LibraryError> {
        let member = self.members.remove(user_id).ok_or(LibraryError::MemberNotFound(user_id))?;
        if let Some(account) = self.ledger.close(user_id) {
            if !account.current_borrows().is_empty() {
                warn!(member = user_id, loans = account.current_borrows().len(), "removed a member with active loans");
            }
        }
        self.persist();
        Ok(member)
    }

    /// # Errors
    ///
    /// Returns `LibraryError::MemberNotFound` for an unknown id.
    pub fn update_department(&mut self, user_id: UserId, department: &str) -> Result<(), LibraryError> {
        self.members
            .find_mut(user_id)
            .ok_or(LibraryError::MemberNotFound(user_id))?
            .set_department(department);
        self.persist();
        Ok(())
    }

    /// Look up a member by id
    #[must_use]
    pub fn member(&self, user_id: UserId) -> Option<&Member> {
        self.members.find(user_id)
    }

    /// All registered members
    #[must_use]
    pub fn members(&self) -> &Membership {
        &self.members
    }

    /// True only for a known member with exactly this password
    #[must_use]
    pub fn authenticate(&self, user_id: UserId, password: &str) -> bool {
        self.members.authenticate(user_id, password)
    }

    /// Check that the member's role grants `capability`
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::MemberNotFound` or `LibraryError::NotEligible`.
    pub fn authorize(&self, user_id: UserId, capability: Capability) -> Result<(), LibraryError> {
        let member = self.members.find(user_id).ok_or(LibraryError::MemberNotFound(user_id))?;
        if member.policy().allows(capability) { Ok(()) } else { Err(LibraryError::NotEligible(user_id)) }
    }

    // ---- accounts ------------------------------------------------------

    /// A member's loans and fines
    #[must_use]
    pub fn account(&self, user_id: UserId) -> Option<&Account> {
        self.ledger.find(user_id)
    }

    /// Every account
    #[must_use]
    pub fn ledger(&self) -> &AccountLedger {
        &self.ledger
    }

    /// Pay towards a member's fines. The balance stops at zero and the
    /// amount is not validated. Returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::AccountNotFound` for an unknown member.
    pub fn pay_fine(&mut self, user_id: UserId, amount: Decimal) -> Result<Decimal, LibraryError> {
        let balance = self.ledger.pay_fine(user_id, amount)?;
        self.notify(&CirculationEvent::FinePaid { user_id, amount, balance });
        self.persist();
        Ok(balance)
    }

    // ---- circulation ---------------------------------------------------

    /// Run the borrowing checks in order, reporting the first that fails
    fn check_borrow(&self, user_id: UserId, book_id: BookId) -> Result<(), LibraryError> {
        let member = self.members.find(user_id).ok_or(LibraryError::MemberNotFound(user_id))?;
        let book = self.catalog.find(book_id).ok_or(LibraryError::BookNotFound(book_id))?;
        let policy = member.policy();

        if !policy.can_borrow {
            return Err(LibraryError::NotEligible(user_id));
        }
        if !book.is_available() {
            return Err(LibraryError::Unavailable(book_id));
        }

        let account = self.ledger.find(user_id).ok_or(LibraryError::AccountNotFound(user_id))?;
        if account.current_borrows().len() >= policy.max_books {
            return Err(LibraryError::LimitReached { limit: policy.max_books });
        }
        if account.has_borrowed(book_id) {
            return Err(LibraryError::AlreadyBorrowed(book_id));
        }
        if account.total_fine() > Decimal::ZERO {
            return Err(LibraryError::OutstandingFine(account.total_fine()));
        }
        Ok(())
    }

    /// Put the book on loan to the member without any eligibility checks
    fn lend(
        &mut self,
        user_id: UserId,
        book_id: BookId,
        now: DateTime<Utc>,
    ) -> Result<BorrowRecord, LibraryError> {
        let record = self.ledger.record_borrow(user_id, book_id, now)?;
        if let Some(book) = self.catalog.find_mut(book_id) {
            book.set_available(false);
        }
        Ok(record)
    }

    /// Borrow a book from the shelf.
    ///
    /// # Errors
    ///
    /// Fails with the first of `MemberNotFound`, `BookNotFound`,
    /// `NotEligible`, `Unavailable`, `AccountNotFound`, `LimitReached`,
    /// `AlreadyBorrowed` or `OutstandingFine` that applies.
    pub fn borrow(
        &mut self,
        user_id: UserId,
        book_id: BookId,
        now: DateTime<Utc>,
    ) -> Result<BorrowRecord, LibraryError> {
        self.check_borrow(user_id, book_id)?;
        let record = self.lend(user_id, book_id, now)?;

        self.notify(&CirculationEvent::Borrowed { user_id, book_id, due_at: record.due_at });
        self.persist();
        Ok(record)
    }

    /// Return a borrowed book, charging a fine if it is late.
    ///
    /// A fine is one unit of the member's hourly rate per whole hour past the
    /// due date. If anyone has reserved the book it goes straight to the
    /// earliest holder who is still a member, without the usual borrowing
    /// checks; otherwise it goes back on the shelf.
    ///
    /// # Errors
    ///
    /// Returns `MemberNotFound`, `BookNotFound`, `AccountNotFound` or
    /// `NoActiveLoan`.
    pub fn return_book(
        &mut self,
        user_id: UserId,
        book_id: BookId,
        now: DateTime<Utc>,
    ) -> Result<ReturnOutcome, LibraryError> {
        let member = self.members.find(user_id).ok_or(LibraryError::MemberNotFound(user_id))?;
        self.catalog.find(book_id).ok_or(LibraryError::BookNotFound(book_id))?;
        let account = self.ledger.find(user_id).ok_or(LibraryError::AccountNotFound(user_id))?;
        let loan = account.active_loan(book_id).ok_or(LibraryError::NoActiveLoan(book_id))?;

        let fine =
            Decimal::from(loan.overdue_hours(now)).saturating_mul(member.policy().fine_rate_per_hour);

        if fine > Decimal::ZERO {
            self.ledger.add_fine(user_id, fine)?;
        }
        self.ledger.record_return(user_id, book_id)?;
        self.notify(&CirculationEvent::Returned { user_id, book_id, fine });

        let handed_off_to = self.hand_off(user_id, book_id, now)?;
        if handed_off_to.is_none() {
            if let Some(book) = self.catalog.find_mut(book_id) {
                book.set_available(true);
            }
            self.notify(&CirculationEvent::Shelved { book_id });
        }

        self.persist();
        Ok(ReturnOutcome { fine, handed_off_to })
    }

    /// Lend a just-returned book to the next reservation holder, if there
    /// is one who still has an account
    fn hand_off(
        &mut self,
        from: UserId,
        book_id: BookId,
        now: DateTime<Utc>,
    ) -> Result<Option<UserId>, LibraryError> {
        while let Some(next) = self.catalog.pop_next_reservation(book_id) {
            if self.members.find(next).is_none() || self.ledger.find(next).is_none() {
                warn!(member = next, book = book_id, "skipping reservation of departed member");
                continue;
            }
            let record = self.lend(next, book_id, now)?;
            debug!(from, to = next, book = book_id, "reservation hand-off");
            self.notify(&CirculationEvent::HandedOff { book_id, from, to: next, due_at: record.due_at });
            return Ok(Some(next));
        }
        Ok(None)
    }

    /// Join the reservation queue of a book that is on loan.
    ///
    /// # Errors
    ///
    /// Returns `MemberNotFound`, `BookNotFound`, `NotOnLoan` if the book is
    /// on the shelf, or `AlreadyReserved`.
    pub fn reserve(&mut self, user_id: UserId, book_id: BookId) -> Result<(), LibraryError> {
        self.members.find(user_id).ok_or(LibraryError::MemberNotFound(user_id))?;
        let book = self.catalog.find(book_id).ok_or(LibraryError::BookNotFound(book_id))?;
        if book.is_available() {
            return Err(LibraryError::NotOnLoan(book_id));
        }
        if !self.catalog.reserve(book_id, user_id) {
            return Err(LibraryError::AlreadyReserved(book_id));
        }

        self.notify(&CirculationEvent::Reserved { user_id, book_id });
        self.persist();
        Ok(())
    }

    /// Leave a book's reservation queue.
    ///
    /// # Errors
    ///
    /// Returns `BookNotFound` or `NoReservation`.
    pub fn cancel_reservation(&mut self, user_id: UserId, book_id: BookId) -> Result<(), LibraryError> {
        self.catalog.find(book_id).ok_or(LibraryError::BookNotFound(book_id))?;
        if !self.catalog.cancel_reservation(book_id, user_id) {
            return Err(LibraryError::NoReservation(book_id));
        }

        self.notify(&CirculationEvent::ReservationCancelled { user_id, book_id });
        self.persist();
        Ok(())
    }

    /// Books the member is queued for, in catalog order
    #[must_use]
    pub fn reserved_books(&self, user_id: UserId) -> Vec<&Book> {
        self.catalog.iter().filter(|book| book.is_reserved_by(user_id)).collect()
    }

    /// Every active loan whose book and member still exist
    #[must_use]
    pub fn borrowed_books(&self) -> Vec<LoanReport> {
        let mut report = Vec::new();
        for account in self.ledger.iter() {
            let Some(member) = self.members.find(account.user_id()) else {
                continue;
            };
            for loan in account.current_borrows() {
                let Some(book) = self.catalog.find(loan.book_id) else {
                    continue;
                };
                report.push(LoanReport {
                    book_id: book.id(),
                    title: book.title().to_string(),
                    user_id: member.id(),
                    member_name: member.name().to_string(),
                    borrowed_at: loan.borrowed_at,
                    due_at: loan.due_at,
                });
            }
        }
        report
    }
}

impl fmt::Display for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} books ({} available), {} members",
            self.catalog.len(),
            self.catalog.available_count(),
            self.members.len()
        )
    }
}
