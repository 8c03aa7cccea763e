use std::collections::BTreeMap;

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use rust_decimal::Decimal;

use crate::{
    BookId, UserId,
    account::{Account, BorrowRecord},
    config::DEFAULT_LOAN_PERIOD_DAYS,
    error::LibraryError,
};

/// Accounts of every member, keyed by member id
#[derive(Debug, Clone)]
pub struct AccountLedger {
    /// Accounts in member id order
    accounts: BTreeMap<UserId, Account>,
    /// Time from borrowing to the due date
    loan_period: TimeDelta,
}

impl Default for AccountLedger {
    fn default() -> Self {
        Self::with_loan_period(TimeDelta::days(DEFAULT_LOAN_PERIOD_DAYS))
    }
}

impl AccountLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_loan_period(loan_period: TimeDelta) -> Self {
        Self { accounts: BTreeMap::new(), loan_period }
    }

    #[must_use]
    pub fn loan_period(&self) -> TimeDelta {
        self.loan_period
    }

    /// Open an empty account, replacing any previous one for the member
    pub fn open(&mut self, user_id: UserId) {
        self.accounts.insert(user_id, Account::new(user_id));
    }

    /// Install a fully built account, as done by the loader
    pub(crate) fn insert(&mut self, account: Account) {
        self.accounts.insert(account.user_id(), account);
    }

    pub fn close(&mut self, user_id: UserId) -> Option<Account> {
        self.accounts.remove(&user_id)
    }

    #[must_use]
    pub fn find(&self, user_id: UserId) -> Option<&Account> {
        self.accounts.get(&user_id)
    }

    /// Look up an account for mutation
    fn account_mut(&mut self, user_id: UserId) -> Result<&mut Account, LibraryError> {
        self.accounts.get_mut(&user_id).ok_or(LibraryError::AccountNotFound(user_id))
    }

    /// Start a loan due one loan period after `now`. Both timestamps are
    /// kept to whole seconds, the precision of the account files.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::AccountNotFound` for an unknown member.
    pub fn record_borrow(
        &mut self,
        user_id: UserId,
        book_id: BookId,
        now: DateTime<Utc>,
    ) -> Result<BorrowRecord, LibraryError> {
        let now = now.trunc_subsecs(0);
        let due_at = now.checked_add_signed(self.loan_period).unwrap_or(DateTime::<Utc>::MAX_UTC);
        let record = BorrowRecord { book_id, borrowed_at: now, due_at };
        self.account_mut(user_id)?.push_borrow(record);
        Ok(record)
    }

    /// Close the member's active loan for `book_id`.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::AccountNotFound` or `LibraryError::NoActiveLoan`.
    pub fn record_return(
        &mut self,
        user_id: UserId,
        book_id: BookId,
    ) -> Result<BorrowRecord, LibraryError> {
        self.account_mut(user_id)?.close_loan(book_id).ok_or(LibraryError::NoActiveLoan(book_id))
    }

    /// # Errors
    ///
    /// Returns `LibraryError::AccountNotFound` for an unknown member.
    pub fn add_fine(&mut self, user_id: UserId, amount: Decimal) -> Result<(), LibraryError> {
        self.account_mut(user_id)?.add_fine(amount);
        Ok(())
    }

    /// Pay towards the balance, which stops at zero. Returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::AccountNotFound` for an unknown member.
    pub fn pay_fine(&mut self, user_id: UserId, amount: Decimal) -> Result<Decimal, LibraryError> {
        let account = self.account_mut(user_id)?;
        account.pay_fine(amount);
        Ok(account.total_fine())
    }

    /// # Errors
    ///
    /// Returns `LibraryError::AccountNotFound` for an unknown member.
    pub fn total_fine(&self, user_id: UserId) -> Result<Decimal, LibraryError> {
        self.find(user_id).map(Account::total_fine).ok_or(LibraryError::AccountNotFound(user_id))
    }

    /// The member and loan currently holding `book_id`, if any
    #[must_use]
    pub fn holder_of(&self, book_id: BookId) -> Option<(UserId, &BorrowRecord)> {
        self.accounts
            .values()
            .find_map(|account| account.active_loan(book_id).map(|loan| (account.user_id(), loan)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }
}
