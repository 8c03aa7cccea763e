use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, bail};
use chrono::{SubsecRound, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use library_circulation::{
    Book, BookId, Capability, Library, LibraryConfig, Member, Role, UserId,
};
use rust_decimal::Decimal;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line front end for the library circulation engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory, overriding the configuration file
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Id of the member running the command
    #[arg(short, long, global = true)]
    user: Option<UserId>,

    /// Password of the member running the command
    #[arg(short, long, global = true)]
    password: Option<String>,

    /// Operation to run
    #[command(subcommand)]
    command: Command,
}

/// Role names accepted on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
enum RoleArg {
    /// Student member
    Student,
    /// Professor member
    Professor,
    /// Librarian member
    Librarian,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Student => Self::Student,
            RoleArg::Professor => Self::Professor,
            RoleArg::Librarian => Self::Librarian,
        }
    }
}

/// Library operations
#[derive(Subcommand, Debug)]
enum Command {
    /// Add a book to the catalog (needs book management rights)
    AddBook {
        /// Catalog id
        id: BookId,
        /// Title
        title: String,
        /// Author
        author: String,
        /// Publisher
        publisher: String,
        /// Publication year
        year: i32,
        /// ISBN
        isbn: String,
    },
    /// Remove a book from the catalog (needs book management rights)
    RemoveBook {
        /// Catalog id
        id: BookId,
    },
    /// Register a member (needs user management rights)
    AddMember {
        /// Member id
        id: UserId,
        /// Display name
        name: String,
        /// Login password for the new member
        new_password: String,
        /// Role of the new member
        #[arg(value_enum)]
        role: RoleArg,
        /// Department
        #[arg(long, default_value = "")]
        department: String,
    },
    /// Remove a member and their account (needs user management rights)
    RemoveMember {
        /// Member id
        id: UserId,
    },
    /// Change your department
    SetDepartment {
        /// New department
        department: String,
    },
    /// Search titles; no query lists every book
    Search {
        /// Case-insensitive title fragment
        #[arg(default_value = "")]
        query: String,
    },
    /// Borrow a book
    Borrow {
        /// Catalog id
        book: BookId,
    },
    /// Return a book
    Return {
        /// Catalog id
        book: BookId,
    },
    /// Reserve a book that is on loan
    Reserve {
        /// Catalog id
        book: BookId,
    },
    /// Cancel one of your reservations
    CancelReservation {
        /// Catalog id
        book: BookId,
    },
    /// Pay towards your fines
    PayFine {
        /// Amount paid
        amount: Decimal,
    },
    /// Show your loans, history and fines
    Account,
    /// List the books you have reserved
    Reserved,
    /// List every active loan (needs book management rights)
    Loans {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "library_circulation=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

/// Load the library, run one command, and save on the way out
fn run(args: &Args) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => LibraryConfig::from_file(path)?,
        None => LibraryConfig::default(),
    };
    if let Some(dir) = &args.data_dir {
        config.data_dir.clone_from(dir);
    }

    let mut library = Library::open(&config).context("loading library")?;
    execute(&mut library, args)?;
    library.save().context("saving library")?;
    Ok(())
}

/// Authenticate the acting member from the global flags
fn login(library: &Library, args: &Args) -> anyhow::Result<UserId> {
    let (Some(user), Some(password)) = (args.user, args.password.as_deref()) else {
        bail!("this command needs --user and --password");
    };
    if !library.authenticate(user, password) {
        bail!("invalid member id or password");
    }
    Ok(user)
}

/// Log in and check that the acting member holds `capability`
fn login_with(library: &Library, args: &Args, capability: Capability) -> anyhow::Result<UserId> {
    let user = login(library, args)?;
    library.authorize(user, capability)?;
    Ok(user)
}

/// Dispatch one command
fn execute(library: &mut Library, args: &Args) -> anyhow::Result<()> {
    let now = Utc::now().trunc_subsecs(0);

    match &args.command {
        Command::AddBook { id, title, author, publisher, year, isbn } => {
            login_with(library, args, Capability::ManageBooks)?;
            library.add_book(Book::new(*id, title, author, publisher, *year, isbn))?;
            println!("{}", format!("Added book {id}: {title}").green());
        }
        Command::RemoveBook { id } => {
            login_with(library, args, Capability::ManageBooks)?;
            let book = library.remove_book(*id)?;
            println!("{}", format!("Removed book {id}: {}", book.title()).green());
        }
        Command::AddMember { id, name, new_password, role, department } => {
            login_with(library, args, Capability::ManageUsers)?;
            let role = Role::from(*role);
            library.add_member(Member::new(*id, name, new_password, department, role))?;
            println!("{}", format!("Added {role} {id}: {name}").green());
        }
        Command::RemoveMember { id } => {
            login_with(library, args, Capability::ManageUsers)?;
            let member = library.remove_member(*id)?;
            println!("{}", format!("Removed member {id}: {}", member.name()).green());
        }
        Command::SetDepartment { department } => {
            let user = login(library, args)?;
            library.update_department(user, department)?;
            println!("{}", format!("Department set to {department}").green());
        }
        Command::Search { query } => {
            let books = library.search(query);
            if books.is_empty() {
                println!("{}", "No books found.".yellow());
            }
            for book in books {
                print_book(library, book);
            }
        }
        Command::Borrow { book } => {
            let user = login(library, args)?;
            let loan = library.borrow(user, *book, now)?;
            println!(
                "{}",
                format!("Borrowed book {book}, due {}", loan.due_at.format("%Y-%m-%d %H:%M")).green()
            );
        }
        Command::Return { book } => {
            let user = login(library, args)?;
            let outcome = library.return_book(user, *book, now)?;
            println!("{}", format!("Returned book {book}").green());
            if outcome.fine > Decimal::ZERO {
                println!("{}", format!("Late return fine: {:.2}", outcome.fine).red());
            }
            if let Some(next) = outcome.handed_off_to {
                println!("Book passed on to reservation holder {next}");
            }
        }
        Command::Reserve { book } => {
            let user = login(library, args)?;
            library.reserve(user, *book)?;
            println!("{}", format!("Reserved book {book}").green());
        }
        Command::CancelReservation { book } => {
            let user = login(library, args)?;
            library.cancel_reservation(user, *book)?;
            println!("{}", format!("Cancelled reservation for book {book}").green());
        }
        Command::PayFine { amount } => {
            let user = login(library, args)?;
            let balance = library.pay_fine(user, *amount)?;
            println!("{}", format!("Paid {amount:.2}, remaining balance {balance:.2}").green());
        }
        Command::Account => {
            let user = login(library, args)?;
            print_account(library, user);
        }
        Command::Reserved => {
            let user = login(library, args)?;
            let books = library.reserved_books(user);
            if books.is_empty() {
                println!("{}", "You have no reservations.".yellow());
            }
            for book in books {
                print_book(library, book);
            }
        }
        Command::Loans { json } => {
            login_with(library, args, Capability::ManageBooks)?;
            let loans = library.borrowed_books();
            if *json {
                println!("{}", serde_json::to_string_pretty(&loans)?);
            } else if loans.is_empty() {
                println!("{}", "No books are on loan.".yellow());
            } else {
                for loan in loans {
                    println!(
                        "{:>6}  {:<30}  {:>6} {:<20}  due {}",
                        loan.book_id,
                        loan.title,
                        loan.user_id,
                        loan.member_name,
                        loan.due_at.format("%Y-%m-%d")
                    );
                }
            }
        }
    }
    Ok(())
}

/// Print one catalog entry with its shelf status
fn print_book(library: &Library, book: &Book) {
    println!(
        "{} {} by {} ({}, {}) ISBN {}",
        format!("[{}]", book.id()).bold(),
        book.title().cyan(),
        book.author(),
        book.publisher(),
        book.year(),
        book.isbn()
    );
    if let Some(status) = library.book_status(book.id()) {
        println!("    {}", status.get_description());
    }
}

/// Print a member's loans, history and fine balance
fn print_account(library: &Library, user: UserId) {
    let Some(account) = library.account(user) else {
        println!("{}", "No account found.".yellow());
        return;
    };

    println!("{}", "Current loans".bold());
    if account.current_borrows().is_empty() {
        println!("    none");
    }
    for loan in account.current_borrows() {
        let title = library.book(loan.book_id).map_or("(removed)", Book::title);
        println!("    {:>6}  {title}  due {}", loan.book_id, loan.due_at.format("%Y-%m-%d %H:%M"));
    }

    println!("{}", "History".bold());
    for loan in account.borrow_history() {
        let title = library.book(loan.book_id).map_or("(removed)", Book::title);
        println!("    {:>6}  {title}  borrowed {}", loan.book_id, loan.borrowed_at.format("%Y-%m-%d"));
    }

    let fine = account.total_fine();
    if fine > Decimal::ZERO {
        println!("{}", format!("Outstanding fine: {fine:.2}").red());
    } else {
        println!("{}", "No outstanding fines.".green());
    }
}
