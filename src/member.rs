use std::{collections::BTreeMap, fmt};

use rust_decimal::Decimal;

use crate::{UserId, error::LibraryError};

/// A member's role, fixed when the member is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    /// Borrows a few books and pays hourly fines
    Student,
    /// Borrows more, is never fined, and may manage books
    Professor,
    /// Manages books and members but never borrows
    Librarian,
}

/// Something a role may or may not be allowed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Take books out on loan
    Borrow,
    /// Add and remove catalog entries
    ManageBooks,
    /// Register and remove members
    ManageUsers,
}

/// Borrowing rules attached to a role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// Maximum concurrent loans
    pub max_books: usize,
    /// Nominal loan length in days. Due dates use the library-wide loan
    /// period instead.
    pub max_days: u32,
    /// Fine charged per whole hour a return is late
    pub fine_rate_per_hour: Decimal,
    /// Grants [`Capability::Borrow`]
    pub can_borrow: bool,
    /// Grants [`Capability::ManageBooks`]
    pub can_manage_books: bool,
    /// Grants [`Capability::ManageUsers`]
    pub can_manage_users: bool,
}

impl Policy {
    /// Whether this policy grants `capability`
    #[must_use]
    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::Borrow => self.can_borrow,
            Capability::ManageBooks => self.can_manage_books,
            Capability::ManageUsers => self.can_manage_users,
        }
    }
}

/// Students are fined for every late hour
static STUDENT: Policy = Policy {
    max_books: 3,
    max_days: 15,
    fine_rate_per_hour: Decimal::TEN,
    can_borrow: true,
    can_manage_books: false,
    can_manage_users: false,
};

/// Professors borrow more and are never fined
static PROFESSOR: Policy = Policy {
    max_books: 5,
    max_days: 30,
    fine_rate_per_hour: Decimal::ZERO,
    can_borrow: true,
    can_manage_books: true,
    can_manage_users: false,
};

/// Librarians manage the library but cannot borrow
static LIBRARIAN: Policy = Policy {
    max_books: 0,
    max_days: 0,
    fine_rate_per_hour: Decimal::ZERO,
    can_borrow: false,
    can_manage_books: true,
    can_manage_users: true,
};

impl Role {
    /// Every role, in the order their member files are loaded
    pub const ALL: [Self; 3] = [Self::Student, Self::Professor, Self::Librarian];

    /// The fixed borrowing rules of this role
    #[must_use]
    pub fn policy(self) -> &'static Policy {
        match self {
            Self::Student => &STUDENT,
            Self::Professor => &PROFESSOR,
            Self::Librarian => &LIBRARIAN,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Student => "Student",
            Self::Professor => "Professor",
            Self::Librarian => "Librarian",
        };
        f.write_str(name)
    }
}

/// A registered library user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Unique member id
    id: UserId,
    /// Display name
    name: String,
    /// Login password, compared as plain text
    password: String,
    /// Department, the only mutable field
    department: String,
    /// Role, which fixes the member's policy
    role: Role,
}

impl Member {
    #[must_use]
    pub fn new(id: UserId, name: &str, password: &str, department: &str, role: Role) -> Self {
        Self {
            id,
            name: name.to_string(),
            password: password.to_string(),
            department: department.to_string(),
            role,
        }
    }

    #[must_use]
    pub fn id(&self) -> UserId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    #[must_use]
    pub fn department(&self) -> &str {
        &self.department
    }

    pub fn set_department(&mut self, department: &str) {
        self.department = department.to_string();
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Shorthand for the role's policy
    #[must_use]
    pub fn policy(&self) -> &'static Policy {
        self.role.policy()
    }

    /// Exact, case-sensitive comparison
    #[must_use]
    pub fn verify_password(&self, password: &str) -> bool {
        self.password == password
    }
}

/// Registered members keyed by id
#[derive(Debug, Default, Clone)]
pub struct Membership {
    /// Members in id order
    members: BTreeMap<UserId, Member>,
}

impl Membership {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a member.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::DuplicateMember` if the id is taken.
    pub fn add(&mut self, member: Member) -> Result<(), LibraryError> {
        let id = member.id();
        if self.members.contains_key(&id) {
            return Err(LibraryError::DuplicateMember(id));
        }
        self.members.insert(id, member);
        Ok(())
    }

    pub fn remove(&mut self, user_id: UserId) -> Option<Member> {
        self.members.remove(&user_id)
    }

    #[must_use]
    pub fn find(&self, user_id: UserId) -> Option<&Member> {
        self.members.get(&user_id)
    }

    /// Look up a member for mutation
    pub(crate) fn find_mut(&mut self, user_id: UserId) -> Option<&mut Member> {
        self.members.get_mut(&user_id)
    }

    /// True only for a known member with exactly this password
    #[must_use]
    pub fn authenticate(&self, user_id: UserId, password: &str) -> bool {
        self.find(user_id).is_some_and(|member| member.verify_password(password))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    /// Members holding the given role, in id order
    pub fn with_role(&self, role: Role) -> impl Iterator<Item = &Member> {
        self.members.values().filter(move |member| member.role() == role)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
