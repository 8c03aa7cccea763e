#![allow(clippy::unwrap_used, clippy::expect_used, clippy::arithmetic_side_effects)]

use std::fs;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use rust_decimal::Decimal;

use crate::{
    book::Book,
    member::{Member, Role},
    persistence::FlatFileStore,
    system::Library,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, 10, 30, 15).unwrap()
}

fn loan_period() -> TimeDelta {
    TimeDelta::days(30)
}

/// Open a library backed by a fresh directory
fn open(dir: &tempfile::TempDir) -> Library {
    Library::load(FlatFileStore::new(dir.path()), loan_period()).expect("load library")
}

/// Populate a library with loans, history, fines and reservations
fn populate(library: &mut Library) {
    library.add_member(Member::new(1, "Alice", "pw1", "Physics", Role::Student)).unwrap();
    library.add_member(Member::new(2, "Bob", "pw2", "", Role::Student)).unwrap();
    library.add_member(Member::new(3, "Carol", "pw3", "Maths", Role::Professor)).unwrap();
    library.add_member(Member::new(4, "Dave", "pw4", "Front desk", Role::Librarian)).unwrap();

    library.add_book(Book::new(10, "Dune", "Frank Herbert", "Chilton", 1965, "0441013597")).unwrap();
    library.add_book(Book::new(11, "Emma", "Jane Austen", "Murray", 1815, "0141439580")).unwrap();
    library.add_book(Book::new(12, "Ulysses", "James Joyce", "Shakespeare", 1922, "0679722769")).unwrap();

    // Bob returns late and owes 26 * 10
    library.borrow(2, 12, t0()).unwrap();
    library.return_book(2, 12, t0() + TimeDelta::days(31) + TimeDelta::hours(2)).unwrap();

    library.borrow(1, 10, t0()).unwrap();
    library.borrow(3, 11, t0() + TimeDelta::seconds(7)).unwrap();
    library.reserve(2, 10).unwrap();
    library.reserve(4, 10).unwrap();
}

#[test]
fn test_round_trip_restores_everything() {
    let dir = tempfile::tempdir().unwrap();
    let mut library = open(&dir);
    populate(&mut library);
    drop(library);

    let reloaded = open(&dir);

    let availability: Vec<_> =
        reloaded.catalog().iter().map(|book| (book.id(), book.is_available())).collect();
    assert_eq!(availability, vec![(10, false), (11, false), (12, true)]);

    let dune = reloaded.book(10).unwrap();
    assert_eq!(dune.title(), "Dune");
    assert_eq!(dune.author(), "Frank Herbert");
    assert_eq!(dune.year(), 1965);
    assert_eq!(dune.reservations().collect::<Vec<_>>(), vec![2, 4]);

    let bob = reloaded.member(2).unwrap();
    assert_eq!(bob.name(), "Bob");
    assert_eq!(bob.department(), "");
    assert_eq!(bob.role(), Role::Student);
    assert!(reloaded.authenticate(2, "pw2"));
    assert_eq!(reloaded.member(4).unwrap().role(), Role::Librarian);
    assert_eq!(reloaded.member(4).unwrap().department(), "Front desk");

    let alice = reloaded.account(1).unwrap();
    let loan = alice.active_loan(10).unwrap();
    assert_eq!(loan.borrowed_at, t0());
    assert_eq!(loan.due_at, t0() + TimeDelta::days(30));

    let carol = reloaded.account(3).unwrap();
    assert_eq!(carol.active_loan(11).unwrap().borrowed_at, t0() + TimeDelta::seconds(7));

    let bob = reloaded.account(2).unwrap();
    assert_eq!(bob.total_fine(), Decimal::from(260));
    assert!(bob.current_borrows().is_empty());
    assert_eq!(bob.borrow_history().len(), 1);

    assert!(reloaded.account(4).unwrap().current_borrows().is_empty());
}

#[test]
fn test_reloaded_library_keeps_circulating() {
    let dir = tempfile::tempdir().unwrap();
    let mut library = open(&dir);
    populate(&mut library);
    drop(library);

    let mut reloaded = open(&dir);
    let outcome = reloaded.return_book(1, 10, t0() + TimeDelta::days(1)).unwrap();
    assert_eq!(outcome.handed_off_to, Some(2));
    drop(reloaded);

    let again = open(&dir);
    assert!(again.account(2).unwrap().has_borrowed(10));
    assert_eq!(again.book(10).unwrap().reservations().collect::<Vec<_>>(), vec![4]);
}

#[test]
fn test_file_layout() {
    let dir = tempfile::tempdir().unwrap();
    let mut library = open(&dir);
    populate(&mut library);

    let books = fs::read_to_string(dir.path().join("books.txt")).unwrap();
    assert_eq!(
        books,
        "10|Dune|Frank Herbert|Chilton|1965|0441013597|0\n\
         11|Emma|Jane Austen|Murray|1815|0141439580|0\n\
         12|Ulysses|James Joyce|Shakespeare|1922|0679722769|1\n"
    );

    let students = fs::read_to_string(dir.path().join("users/students.txt")).unwrap();
    assert_eq!(students, "1|Alice|pw1|Physics\n2|Bob|pw2|\n");
    let librarians = fs::read_to_string(dir.path().join("users/librarians.txt")).unwrap();
    assert_eq!(librarians, "4|Dave|pw4|Front desk\n");

    let borrowed = t0().timestamp();
    let due = (t0() + TimeDelta::days(30)).timestamp();
    let alice = fs::read_to_string(dir.path().join("accounts/1.txt")).unwrap();
    assert_eq!(alice, format!("BORROW|10|{borrowed}|{due}\nFINE|0\n"));

    let bob = fs::read_to_string(dir.path().join("accounts/2.txt")).unwrap();
    assert_eq!(bob, format!("HISTORY|12|{borrowed}|{due}\nFINE|260\n"));

    let reservations = fs::read_to_string(dir.path().join("reservations.txt")).unwrap();
    assert_eq!(reservations, "10|2|4\n");
}

#[test]
fn test_active_loans_override_book_flag() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("users")).unwrap();
    fs::create_dir_all(root.join("accounts")).unwrap();

    // The book file claims both books are on the shelf
    fs::write(root.join("books.txt"), "1|Dune|Herbert|Chilton|1965|x|1\n2|Emma|Austen|Murray|1815|y|0\n")
        .unwrap();
    fs::write(root.join("users/students.txt"), "7|Ada|pw|Maths\n").unwrap();
    fs::write(root.join("accounts/7.txt"), "BORROW|1|1700000000|1702592000\nFINE|12.5\n").unwrap();

    let library = open(&dir);
    assert!(!library.book(1).unwrap().is_available());
    // Without a loan the stored flag stands
    assert!(!library.book(2).unwrap().is_available());

    let account = library.account(7).unwrap();
    assert_eq!(account.total_fine(), Decimal::new(125, 1));
    let loan = account.active_loan(1).unwrap();
    assert_eq!(loan.borrowed_at.timestamp(), 1_700_000_000);
    assert_eq!(loan.due_at.timestamp(), 1_702_592_000);
}

#[test]
fn test_missing_account_file_gives_empty_account() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("users")).unwrap();
    fs::write(dir.path().join("users/professors.txt"), "5|Eve|pw|Biology\n").unwrap();

    let library = open(&dir);
    let account = library.account(5).unwrap();
    assert!(account.current_borrows().is_empty());
    assert!(account.borrow_history().is_empty());
    assert_eq!(account.total_fine(), Decimal::ZERO);
}

#[test]
fn test_missing_directory_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = FlatFileStore::new(&dir.path().join("not-yet-created"));
    let library = Library::load(store, loan_period()).unwrap();
    assert!(library.catalog().is_empty());
    assert!(library.members().is_empty());
}

#[test]
fn test_malformed_lines_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("users")).unwrap();
    fs::create_dir_all(root.join("accounts")).unwrap();

    fs::write(root.join("books.txt"), "1|Dune|Herbert|Chilton|1965|x|1\nnot a book\n2|Emma|Austen|Murray|year|y|1\n")
        .unwrap();
    fs::write(root.join("users/students.txt"), "7|Ada|pw|Maths\n8|Short\n").unwrap();
    fs::write(root.join("accounts/7.txt"), "BORROW|1|oops|1\nHISTORY|1|1700000000|1702592000\nFINE|4\n").unwrap();

    let library = open(&dir);
    assert_eq!(library.catalog().len(), 1);
    assert_eq!(library.members().len(), 1);
    assert!(library.book(1).unwrap().is_available());

    let account = library.account(7).unwrap();
    assert!(account.current_borrows().is_empty());
    assert_eq!(account.borrow_history().len(), 1);
    assert_eq!(account.total_fine(), Decimal::from(4));
}

#[test]
fn test_removed_member_account_file_is_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let mut library = open(&dir);
    populate(&mut library);
    assert!(dir.path().join("accounts/2.txt").exists());

    library.remove_member(2).unwrap();
    assert!(!dir.path().join("accounts/2.txt").exists());

    // Re-adding the id starts from a clean account after a reload
    library.add_member(Member::new(2, "Bob", "pw2", "", Role::Student)).unwrap();
    drop(library);
    let reloaded = open(&dir);
    assert_eq!(reloaded.account(2).unwrap().total_fine(), Decimal::ZERO);
}

#[test]
fn test_failed_save_keeps_memory_state() {
    let dir = tempfile::tempdir().unwrap();
    // A plain file where the data directory should be makes every save fail
    let blocked = dir.path().join("blocked");
    fs::write(&blocked, "").unwrap();

    let mut library = Library::load(FlatFileStore::new(&blocked), loan_period()).unwrap();
    library.add_member(Member::new(1, "Alice", "pw", "", Role::Student)).unwrap();
    library.add_book(Book::new(10, "Dune", "Herbert", "Chilton", 1965, "x")).unwrap();
    library.borrow(1, 10, t0()).unwrap();

    assert!(library.account(1).unwrap().has_borrowed(10));
    assert!(library.save().is_err());
}

#[test]
fn test_no_temporary_files_left_behind() {
    let dir = tempfile::tempdir().unwrap();
    let mut library = open(&dir);
    populate(&mut library);

    for sub in ["", "users", "accounts"] {
        for entry in fs::read_dir(dir.path().join(sub)).unwrap() {
            let path = entry.unwrap().path();
            assert!(
                path.extension().is_none_or(|ext| ext != "tmp"),
                "left over {}",
                path.display()
            );
        }
    }
}

#[test]
fn test_invalid_utf8_line_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let mut books = b"1|Dune|Herbert|Chilton|1965|x|1\n2|Em".to_vec();
    books.push(0xFF);
    books.extend_from_slice(b"ma|Austen|Murray|1815|y|1\n3|Hamlet|Shakespeare|Folger|1603|z|1\n");
    fs::write(dir.path().join("books.txt"), books).unwrap();

    let library = open(&dir);
    let ids: Vec<_> = library.catalog().iter().map(Book::id).collect();
    assert_eq!(ids, vec![1, 3]);
}

#[test]
fn test_reservations_of_unknown_members_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("users")).unwrap();
    fs::create_dir_all(root.join("accounts")).unwrap();

    fs::write(root.join("books.txt"), "10|Dune|Herbert|Chilton|1965|x|0\n").unwrap();
    fs::write(root.join("users/students.txt"), "1|Ada|pw|Maths\n4|Cy|pw|Art\n").unwrap();
    fs::write(root.join("accounts/1.txt"), "BORROW|10|1700000000|1702592000\nFINE|0\n").unwrap();
    fs::write(root.join("reservations.txt"), "10|2|4\n").unwrap();

    let library = open(&dir);
    assert_eq!(library.book(10).unwrap().reservations().collect::<Vec<_>>(), vec![4]);
}
