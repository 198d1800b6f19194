//! Access flags and generation roles
//!
//! Roles are attached to fields and methods when a unit is ingested and are
//! queried as plain data by the mirror builders and the verifier.

use std::fmt;

/// Access flag bits for units, fields, methods and nested-unit entries
pub mod access {
    /// Visible everywhere
    pub const PUBLIC: u16 = 0x0001;
    /// Visible only inside the declaring unit
    pub const PRIVATE: u16 = 0x0002;
    /// Visible to subtypes
    pub const PROTECTED: u16 = 0x0004;
    /// Belongs to the unit, not to instances
    pub const STATIC: u16 = 0x0008;
    /// Cannot be overridden or subclassed
    pub const FINAL: u16 = 0x0010;
    /// Implemented by the host runtime
    pub const NATIVE: u16 = 0x0100;
    /// Interface unit
    pub const INTERFACE: u16 = 0x0200;
    /// Abstract unit or method
    pub const ABSTRACT: u16 = 0x0400;
    /// Generated by the compiler, not present in source
    pub const SYNTHETIC: u16 = 0x1000;
}

/// Semantic role a member plays in test generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Role {
    /// Produces a test input
    Generator = 0,
    /// Produces the next case from a previous one
    Next = 1,
    /// Enumerates edge cases
    EdgeCase = 2,
    /// Enumerates simple cases
    SimpleCase = 3,
    /// Shared support logic
    Helper = 4,
    /// Custom result verifier
    Verify = 5,
    /// Guard deciding whether a case applies
    Precondition = 6,
}

impl Role {
    /// All roles in bit order
    pub const ALL: [Role; 7] = [
        Role::Generator,
        Role::Next,
        Role::EdgeCase,
        Role::SimpleCase,
        Role::Helper,
        Role::Verify,
        Role::Precondition,
    ];

    /// Tag name as written on the declaration
    pub fn name(self) -> &'static str {
        match self {
            Role::Generator => "Generator",
            Role::Next => "Next",
            Role::EdgeCase => "EdgeCase",
            Role::SimpleCase => "SimpleCase",
            Role::Helper => "Helper",
            Role::Verify => "Verify",
            Role::Precondition => "Precondition",
        }
    }

    /// Parse a tag name
    pub fn from_name(name: &str) -> Option<Role> {
        Role::ALL.into_iter().find(|role| role.name() == name)
    }
}

/// Set of roles carried by one member
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Roles(u8);

impl Roles {
    /// No roles
    pub const NONE: Roles = Roles(0);
    /// Generator
    pub const GENERATOR: Roles = Roles(1 << Role::Generator as u8);
    /// Next
    pub const NEXT: Roles = Roles(1 << Role::Next as u8);
    /// EdgeCase
    pub const EDGE_CASE: Roles = Roles(1 << Role::EdgeCase as u8);
    /// SimpleCase
    pub const SIMPLE_CASE: Roles = Roles(1 << Role::SimpleCase as u8);
    /// Helper
    pub const HELPER: Roles = Roles(1 << Role::Helper as u8);
    /// Verify
    pub const VERIFY: Roles = Roles(1 << Role::Verify as u8);
    /// Precondition
    pub const PRECONDITION: Roles = Roles(1 << Role::Precondition as u8);

    /// Roles whose members stay bound to the reference when mirrored
    pub const GENERATION: Roles = Roles(
        Self::HELPER.0 | Self::GENERATOR.0 | Self::NEXT.0 | Self::EDGE_CASE.0 | Self::SIMPLE_CASE.0,
    );

    /// Raw bits
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Build from raw bits, dropping unknown ones
    pub const fn from_bits_truncate(bits: u8) -> Roles {
        Roles(bits & 0x7F)
    }

    /// Check if no role is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Check if every role in `other` is set
    pub const fn contains(self, other: Roles) -> bool {
        self.0 & other.0 == other.0
    }

    /// Check if any role in `other` is set
    pub const fn intersects(self, other: Roles) -> bool {
        self.0 & other.0 != 0
    }

    /// Check for a single role
    pub fn has(self, role: Role) -> bool {
        self.0 & (1 << role as u8) != 0
    }

    /// Union
    pub const fn union(self, other: Roles) -> Roles {
        Roles(self.0 | other.0)
    }

    /// Add one role
    pub fn insert(&mut self, role: Role) {
        self.0 |= 1 << role as u8;
    }

    /// Iterate the roles that are set
    pub fn iter(self) -> impl Iterator<Item = Role> {
        Role::ALL.into_iter().filter(move |role| self.has(*role))
    }
}

impl From<Role> for Roles {
    fn from(role: Role) -> Self {
        Roles(1 << role as u8)
    }
}

impl std::ops::BitOr for Roles {
    type Output = Roles;

    fn bitor(self, rhs: Roles) -> Roles {
        self.union(rhs)
    }
}

impl FromIterator<Role> for Roles {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        let mut roles = Roles::NONE;
        for role in iter {
            roles.insert(role);
        }
        roles
    }
}

impl fmt::Debug for Roles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(Role::name)).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_set() {
        assert!(Roles::GENERATION.has(Role::Helper));
        assert!(Roles::GENERATION.has(Role::SimpleCase));
        assert!(!Roles::GENERATION.has(Role::Verify));
        assert!(!Roles::GENERATION.has(Role::Precondition));
    }

    #[test]
    fn test_collect_and_query() {
        let roles: Roles = [Role::Helper, Role::Verify].into_iter().collect();
        assert!(roles.intersects(Roles::GENERATION));
        assert!(roles.contains(Roles::VERIFY));
        assert!(!roles.contains(Roles::GENERATION));
        assert_eq!(format!("{roles:?}"), "{\"Helper\", \"Verify\"}");
    }

    #[test]
    fn test_role_names() {
        for role in Role::ALL {
            assert_eq!(Role::from_name(role.name()), Some(role));
        }
        assert_eq!(Role::from_name("Test"), None);
        assert_eq!(Roles::from_bits_truncate(0xFF).bits(), 0x7F);
    }
}
