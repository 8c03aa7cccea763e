//! Flat-file storage for the whole library.
//!
//! Layout under the data directory, one pipe-delimited record per line with
//! no quoting or escaping:
//!
//! - `books.txt`: `id|title|author|publisher|year|isbn|available(0/1)`
//! - `users/{students,professors,librarians}.txt`: `id|name|password|department`
//! - `accounts/<id>.txt`: `BORROW|book|borrow_epoch|due_epoch`,
//!   `HISTORY|book|borrow_epoch|due_epoch` and one `FINE|amount`
//! - `reservations.txt`: `book|member|member...`, queue order
//!
//! Every save rewrites every file. Each file is written beside its target
//! and renamed into place.

use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use chrono::{DateTime, TimeDelta, Utc};
use csv::{QuoteStyle, ReaderBuilder, StringRecord, WriterBuilder};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::{
    BookId, UserId,
    account::{Account, BorrowRecord},
    book::Book,
    catalog::Catalog,
    error::StorageError,
    ledger::AccountLedger,
    member::{Member, Membership, Role},
};

/// Field separator of every data file
const DELIMITER: u8 = b'|';

/// Tag of an active loan line in an account file
const BORROW_TAG: &str = "BORROW";
/// Tag of a returned loan line in an account file
const HISTORY_TAG: &str = "HISTORY";
/// Tag of the fine balance line in an account file
const FINE_TAG: &str = "FINE";

/// Stores rebuilt by [`FlatFileStore::load`]
#[derive(Debug)]
pub struct LoadedState {
    /// Books with availability and reservation queues restored
    pub catalog: Catalog,
    /// Members of every role
    pub members: Membership,
    /// One account per member
    pub ledger: AccountLedger,
}

/// A data directory holding the library's flat files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatFileStore {
    /// Data directory
    root: PathBuf,
}

impl FlatFileStore {
    /// A store rooted at `root`, which need not exist yet
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self { root: root.to_path_buf() }
    }

    /// The data directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the book file
    fn books_path(&self) -> PathBuf {
        self.root.join("books.txt")
    }

    /// Directory of the per-role member files
    fn users_dir(&self) -> PathBuf {
        self.root.join("users")
    }

    /// Path of the member file for one role
    fn role_path(&self, role: Role) -> PathBuf {
        let file = match role {
            Role::Student => "students.txt",
            Role::Professor => "professors.txt",
            Role::Librarian => "librarians.txt",
        };
        self.users_dir().join(file)
    }

    /// Directory of the per-member account files
    fn accounts_dir(&self) -> PathBuf {
        self.root.join("accounts")
    }

    /// Path of one member's account file
    fn account_path(&self, user_id: UserId) -> PathBuf {
        self.accounts_dir().join(format!("{user_id}.txt"))
    }

    /// Path of the reservation queue file
    fn reservations_path(&self) -> PathBuf {
        self.root.join("reservations.txt")
    }

    // ---- save ----------------------------------------------------------

    /// Write a full snapshot of the library.
    ///
    /// # Errors
    ///
    /// Returns a `StorageError` for the first file that cannot be written.
    /// Files written before the failure keep their new contents.
    pub fn save(
        &self,
        catalog: &Catalog,
        members: &Membership,
        ledger: &AccountLedger,
    ) -> Result<(), StorageError> {
        create_dir(&self.root)?;
        create_dir(&self.users_dir())?;
        create_dir(&self.accounts_dir())?;

        write_records(&self.books_path(), catalog.iter().map(book_record))?;

        for role in Role::ALL {
            write_records(&self.role_path(role), members.with_role(role).map(member_record))?;
        }

        for account in ledger.iter() {
            write_records(&self.account_path(account.user_id()), account_records(account))?;
        }
        self.remove_stale_accounts(ledger)?;

        write_records(
            &self.reservations_path(),
            catalog.iter().filter(|book| book.is_reserved()).map(reservation_record),
        )?;

        debug!(
            root = %self.root.display(),
            books = catalog.len(),
            members = members.len(),
            "library state saved"
        );
        Ok(())
    }

    /// Delete account files of members without an account
    fn remove_stale_accounts(&self, ledger: &AccountLedger) -> Result<(), StorageError> {
        let dir = self.accounts_dir();
        let entries = fs::read_dir(&dir).map_err(|source| io_error(&dir, source))?;
        for entry in entries {
            let path = entry.map_err(|source| io_error(&dir, source))?.path();
            let Some(user_id) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<UserId>().ok())
            else {
                continue;
            };
            if path.extension().is_some_and(|ext| ext == "txt") && ledger.find(user_id).is_none() {
                fs::remove_file(&path).map_err(|source| io_error(&path, source))?;
                debug!(member = user_id, "removed stale account file");
            }
        }
        Ok(())
    }

    // ---- load ----------------------------------------------------------

    /// Rebuild the library from disk.
    ///
    /// Books load first, then members role by role, each followed by a
    /// replay of their account file. Replaying an active loan marks its
    /// book as on loan whatever the book file says. Members without an
    /// account file get an empty account. Reservations load last. Missing
    /// files count as empty; malformed lines are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns a `StorageError` if a file exists but cannot be read.
    pub fn load(&self, loan_period: TimeDelta) -> Result<LoadedState, StorageError> {
        let mut catalog = Catalog::new();
        let mut members = Membership::new();
        let mut ledger = AccountLedger::with_loan_period(loan_period);

        let books_path = self.books_path();
        for (line, record) in read_records(&books_path)? {
            let Some(book) = parse_book(&record) else {
                warn!(file = %books_path.display(), line, "malformed book line skipped");
                continue;
            };
            let id = book.id();
            if catalog.add(book).is_err() {
                warn!(file = %books_path.display(), line, book = id, "duplicate book id skipped");
            }
        }
        info!(books = catalog.len(), "books loaded");

        for role in Role::ALL {
            let path = self.role_path(role);
            for (line, record) in read_records(&path)? {
                let Some(member) = parse_member(&record, role) else {
                    warn!(file = %path.display(), line, "malformed member line skipped");
                    continue;
                };
                let id = member.id();
                if members.add(member).is_err() {
                    warn!(file = %path.display(), line, member = id, "duplicate member id skipped");
                    continue;
                }
                let account = self.load_account(id, &mut catalog)?;
                ledger.insert(account);
                debug!(member = id, %role, "member loaded");
            }
        }
        info!(members = members.len(), "members loaded");

        let path = self.reservations_path();
        for (line, record) in read_records(&path)? {
            let mut fields = record.iter();
            let Some(book_id) = fields.next().and_then(|field| parse_field::<BookId>(field)) else {
                warn!(file = %path.display(), line, "malformed reservation line skipped");
                continue;
            };
            let Some(book) = catalog.find_mut(book_id) else {
                warn!(file = %path.display(), line, book = book_id, "reservations for unknown book skipped");
                continue;
            };
            for user_id in fields.filter_map(parse_field::<UserId>) {
                if members.find(user_id).is_none() {
                    warn!(book = book_id, member = user_id, "reservation of unknown member skipped");
                    continue;
                }
                if !book.reserve(user_id) {
                    warn!(book = book_id, member = user_id, "reservation could not be restored");
                }
            }
        }

        Ok(LoadedState { catalog, members, ledger })
    }

    /// Replay one member's account file, marking borrowed books unavailable
    fn load_account(&self, user_id: UserId, catalog: &mut Catalog) -> Result<Account, StorageError> {
        let path = self.account_path(user_id);
        let mut account = Account::new(user_id);

        for (line, record) in read_records(&path)? {
            match record.get(0) {
                Some(BORROW_TAG) => {
                    let Some(loan) = parse_loan(&record) else {
                        warn!(file = %path.display(), line, "malformed loan line skipped");
                        continue;
                    };
                    account.push_borrow(loan);
                    if let Some(book) = catalog.find_mut(loan.book_id) {
                        book.set_available(false);
                    }
                }
                Some(HISTORY_TAG) => {
                    let Some(loan) = parse_loan(&record) else {
                        warn!(file = %path.display(), line, "malformed history line skipped");
                        continue;
                    };
                    account.push_history(loan);
                }
                Some(FINE_TAG) => {
                    let Some(amount) = record.get(1).and_then(parse_field::<Decimal>) else {
                        warn!(file = %path.display(), line, "malformed fine line skipped");
                        continue;
                    };
                    account.add_fine(amount);
                }
                _ => warn!(file = %path.display(), line, "unknown account line skipped"),
            }
        }
        Ok(account)
    }
}

// ---- records -----------------------------------------------------------

/// Fields of a book line
fn book_record(book: &Book) -> Vec<String> {
    vec![
        book.id().to_string(),
        book.title().to_string(),
        book.author().to_string(),
        book.publisher().to_string(),
        book.year().to_string(),
        book.isbn().to_string(),
        String::from(if book.is_available() { "1" } else { "0" }),
    ]
}

/// Fields of a member line
fn member_record(member: &Member) -> Vec<String> {
    vec![
        member.id().to_string(),
        member.name().to_string(),
        member.password().to_string(),
        member.department().to_string(),
    ]
}

/// Fields of a loan line under the given tag
fn loan_record(tag: &str, loan: &BorrowRecord) -> Vec<String> {
    vec![
        tag.to_string(),
        loan.book_id.to_string(),
        loan.borrowed_at.timestamp().to_string(),
        loan.due_at.timestamp().to_string(),
    ]
}

/// All lines of an account file: active loans, history, then the fine
fn account_records(account: &Account) -> impl Iterator<Item = Vec<String>> + '_ {
    let current = account.current_borrows().iter().map(|loan| loan_record(BORROW_TAG, loan));
    let history = account.borrow_history().iter().map(|loan| loan_record(HISTORY_TAG, loan));
    let fine = std::iter::once(vec![FINE_TAG.to_string(), account.total_fine().to_string()]);
    current.chain(history).chain(fine)
}

/// Fields of a reservation line
fn reservation_record(book: &Book) -> Vec<String> {
    std::iter::once(book.id().to_string())
        .chain(book.reservations().map(|user_id| user_id.to_string()))
        .collect()
}

/// Parse one field, tolerating surrounding whitespace
fn parse_field<T: FromStr>(field: &str) -> Option<T> {
    field.trim().parse().ok()
}

/// Build a book from a seven-field line
fn parse_book(record: &StringRecord) -> Option<Book> {
    if record.len() != 7 {
        return None;
    }
    let mut book = Book::new(
        parse_field(record.get(0)?)?,
        record.get(1)?,
        record.get(2)?,
        record.get(3)?,
        parse_field(record.get(4)?)?,
        record.get(5)?,
    );
    book.set_available(record.get(6)? == "1");
    Some(book)
}

/// Build a member from a four-field line
fn parse_member(record: &StringRecord, role: Role) -> Option<Member> {
    if record.len() != 4 {
        return None;
    }
    Some(Member::new(
        parse_field(record.get(0)?)?,
        record.get(1)?,
        record.get(2)?,
        record.get(3)?,
        role,
    ))
}

/// Parse the book and both timestamps of a tagged loan line
fn parse_loan(record: &StringRecord) -> Option<BorrowRecord> {
    if record.len() != 4 {
        return None;
    }
    Some(BorrowRecord {
        book_id: parse_field(record.get(1)?)?,
        borrowed_at: parse_epoch(record.get(2)?)?,
        due_at: parse_epoch(record.get(3)?)?,
    })
}

/// Parse Unix epoch seconds
fn parse_epoch(field: &str) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(parse_field(field)?, 0)
}

// ---- files -------------------------------------------------------------

/// Wrap an I/O error with the path it happened on
fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io { path: path.to_path_buf(), source }
}

/// Wrap a record error with the path it happened on
fn record_error(path: &Path, source: csv::Error) -> StorageError {
    StorageError::Record { path: path.to_path_buf(), source }
}

/// Create a directory and its parents if missing
fn create_dir(path: &Path) -> Result<(), StorageError> {
    fs::create_dir_all(path).map_err(|source| io_error(path, source))
}

/// Read every non-empty line of a file with its 1-based line number.
/// A missing file reads as empty. Lines that are not valid UTF-8 are
/// skipped with a warning.
fn read_records(path: &Path) -> Result<Vec<(u64, StringRecord)>, StorageError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = ReaderBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_path(path)
        .map_err(|source| record_error(path, source))?;

    let mut records = Vec::new();
    for result in reader.byte_records() {
        let raw = result.map_err(|source| record_error(path, source))?;
        let line = raw.position().map_or(0, csv::Position::line);
        match StringRecord::from_byte_record(raw) {
            Ok(record) => records.push((line, record)),
            Err(err) => {
                warn!(file = %path.display(), line, error = %err.utf8_error(), "line with invalid UTF-8 skipped");
            }
        }
    }
    Ok(records)
}

/// Replace a file with the given records, via a temporary sibling and a
/// rename so a failed write never leaves a truncated file behind
fn write_records<I>(path: &Path, records: I) -> Result<(), StorageError>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut writer = WriterBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(false)
        .flexible(true)
        .quote_style(QuoteStyle::Never)
        .from_path(&tmp)
        .map_err(|source| record_error(&tmp, source))?;

    for record in records {
        writer.write_record(&record).map_err(|source| record_error(&tmp, source))?;
    }
    writer.flush().map_err(|source| io_error(&tmp, source))?;
    drop(writer);

    fs::rename(&tmp, path).map_err(|source| io_error(path, source))
}

#[cfg(test)]
mod tests;
