use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::{BookId, UserId};

/// One loan of one book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BorrowRecord {
    /// Book on loan
    pub book_id: BookId,
    /// When the loan started
    pub borrowed_at: DateTime<Utc>,
    /// Fixed when the loan starts
    pub due_at: DateTime<Utc>,
}

impl BorrowRecord {
    /// Whole hours past the due date at `now`, or zero if not late
    #[must_use]
    pub fn overdue_hours(&self, now: DateTime<Utc>) -> i64 {
        if now > self.due_at { now.signed_duration_since(self.due_at).num_hours() } else { 0 }
    }
}

/// A member's loans and fine balance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Owner of the account
    user_id: UserId,
    /// Loans not yet returned, in borrow order
    current: Vec<BorrowRecord>,
    /// Returned loans, in return order
    history: Vec<BorrowRecord>,
    /// Unpaid fines, never negative
    total_fine: Decimal,
}

impl Account {
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self { user_id, current: Vec::new(), history: Vec::new(), total_fine: Decimal::ZERO }
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Active loans in borrow order
    #[must_use]
    pub fn current_borrows(&self) -> &[BorrowRecord] {
        &self.current
    }

    /// Returned loans in return order
    #[must_use]
    pub fn borrow_history(&self) -> &[BorrowRecord] {
        &self.history
    }

    #[must_use]
    pub fn total_fine(&self) -> Decimal {
        self.total_fine
    }

    /// The unreturned loan of `book_id`, if any
    #[must_use]
    pub fn active_loan(&self, book_id: BookId) -> Option<&BorrowRecord> {
        self.current.iter().find(|record| record.book_id == book_id)
    }

    #[must_use]
    pub fn has_borrowed(&self, book_id: BookId) -> bool {
        self.active_loan(book_id).is_some()
    }

    /// Append an active loan
    pub(crate) fn push_borrow(&mut self, record: BorrowRecord) {
        self.current.push(record);
    }

    /// Append a returned loan
    pub(crate) fn push_history(&mut self, record: BorrowRecord) {
        self.history.push(record);
    }

    /// Move the active loan for `book_id` into the history
    pub(crate) fn close_loan(&mut self, book_id: BookId) -> Option<BorrowRecord> {
        let pos = self.current.iter().position(|record| record.book_id == book_id)?;
        let record = self.current.remove(pos);
        self.history.push(record);
        Some(record)
    }

    /// Add to the balance
    pub(crate) fn add_fine(&mut self, amount: Decimal) {
        self.total_fine = self.total_fine.saturating_add(amount);
    }

    /// Reduce the balance, never below zero. Over-payment is absorbed.
    pub(crate) fn pay_fine(&mut self, amount: Decimal) {
        self.total_fine = self.total_fine.saturating_sub(amount).max(Decimal::ZERO);
    }
}

#[cfg(test)]
#[allow(clippy::arithmetic_side_effects)]
mod tests {
    use chrono::{TimeDelta, TimeZone};

    use super::*;

    fn record(book_id: BookId) -> BorrowRecord {
        let borrowed_at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).single().unwrap_or_default();
        BorrowRecord { book_id, borrowed_at, due_at: borrowed_at + TimeDelta::days(30) }
    }

    #[test]
    fn test_overdue_hours_truncate() {
        let loan = record(1);
        assert_eq!(loan.overdue_hours(loan.due_at), 0);
        assert_eq!(loan.overdue_hours(loan.due_at - TimeDelta::hours(5)), 0);
        assert_eq!(loan.overdue_hours(loan.due_at + TimeDelta::minutes(59)), 0);
        assert_eq!(loan.overdue_hours(loan.due_at + TimeDelta::minutes(61)), 1);
        assert_eq!(loan.overdue_hours(loan.due_at + TimeDelta::hours(26)), 26);
    }

    #[test]
    fn test_close_loan_moves_record() {
        let mut account = Account::new(1);
        account.push_borrow(record(10));
        account.push_borrow(record(11));

        let closed = account.close_loan(10);
        assert_eq!(closed.map(|r| r.book_id), Some(10));
        assert_eq!(account.current_borrows().len(), 1);
        assert_eq!(account.borrow_history().len(), 1);
        assert!(account.close_loan(10).is_none());
    }

    #[test]
    fn test_fine_payment_clamps_at_zero() {
        let mut account = Account::new(1);
        account.add_fine(Decimal::from(50));
        account.pay_fine(Decimal::from(20));
        assert_eq!(account.total_fine(), Decimal::from(30));
        account.pay_fine(Decimal::from(100));
        assert_eq!(account.total_fine(), Decimal::ZERO);
    }
}
