//! Compact scope names for injection selector filtering.
//!
//! Dotted names like `constant.numeric.hex.matlab` are packed into a single
//! u128: up to 8 atoms of 16 bits each, MSB-first, storing atom_index + 1
//! (0 marks an unused slot). Prefix tests then reduce to a mask-and-compare.

use std::collections::HashMap;
use std::fmt;
use std::sync::{LazyLock, Mutex, MutexGuard};

const MAX_ATOMS_IN_SCOPE: usize = 8;

/// A dotted scope name packed into a single u128, truncated to 8 atoms.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub(crate) struct Scope {
    atoms: u128,
}

impl Scope {
    pub fn new(scope_str: &str) -> Scope {
        lock_atom_table().parse(scope_str.trim())
    }

    #[inline]
    fn missing_atoms(self) -> u32 {
        self.atoms.trailing_zeros() / 16
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.atoms == 0
    }

    /// Whether `self` is a dotted prefix of `other`.
    #[inline]
    pub fn is_prefix_of(self, other: Scope) -> bool {
        let missing = self.missing_atoms();
        if missing == MAX_ATOMS_IN_SCOPE as u32 {
            return true;
        }

        let mask = u128::MAX << (missing * 16);
        (self.atoms ^ other.atoms) & mask == 0
    }

    /// Rebuild the dotted string form. Expensive, display only.
    pub fn build_string(self) -> String {
        let table = lock_atom_table();
        let mut parts = Vec::new();
        for i in 0..MAX_ATOMS_IN_SCOPE {
            let shift = (MAX_ATOMS_IN_SCOPE - 1 - i) * 16;
            match ((self.atoms >> shift) & 0xFFFF) as u16 {
                0 => break,
                n => parts.push(table.atoms[(n - 1) as usize].clone()),
            }
        }
        parts.join(".")
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scope(\"{}\")", self.build_string())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.build_string())
    }
}

/// Process-wide interner mapping atom strings to indices
#[derive(Debug, Default)]
struct AtomTable {
    atoms: Vec<String>,
    index: HashMap<String, usize>,
}

impl AtomTable {
    fn atom_to_number(&mut self, atom: &str) -> u128 {
        let idx = if let Some(&idx) = self.index.get(atom) {
            idx
        } else {
            let idx = self.atoms.len();
            assert!(idx < u16::MAX as usize - 1, "scope atom table overflow");
            self.atoms.push(atom.to_owned());
            self.index.insert(atom.to_owned(), idx);
            idx
        };
        (idx + 1) as u128
    }

    fn parse(&mut self, scope_str: &str) -> Scope {
        if scope_str.is_empty() {
            return Scope::default();
        }

        let mut atoms = 0u128;
        for (i, part) in scope_str
            .split('.')
            .take(MAX_ATOMS_IN_SCOPE)
            .enumerate()
        {
            let shift = (MAX_ATOMS_IN_SCOPE - 1 - i) * 16;
            atoms |= self.atom_to_number(part) << shift;
        }

        Scope { atoms }
    }
}

static ATOM_TABLE: LazyLock<Mutex<AtomTable>> = LazyLock::new(|| Mutex::new(AtomTable::default()));

fn lock_atom_table() -> MutexGuard<'static, AtomTable> {
    ATOM_TABLE.lock().expect("Failed to lock scope atom table")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_the_interner() {
        let scope = Scope::new("constant.numeric.hex.matlab");
        assert_eq!(scope.build_string(), "constant.numeric.hex.matlab");
    }

    #[test]
    fn empty_scope() {
        let scope = Scope::new("");
        assert!(scope.is_empty());
        assert_eq!(scope.build_string(), "");
    }

    #[test]
    fn prefix_matching() {
        let prefix = Scope::new("constant.numeric");
        let full = Scope::new("constant.numeric.hex.matlab");
        let other = Scope::new("storage.type.number");

        assert!(prefix.is_prefix_of(full));
        assert!(prefix.is_prefix_of(prefix));
        assert!(!prefix.is_prefix_of(other));
        assert!(!full.is_prefix_of(prefix));
        assert!(Scope::new("").is_prefix_of(full));
    }

    #[test]
    fn atom_prefix_is_not_a_dotted_prefix() {
        // "const" is a string prefix of "constant" but not a scope prefix
        let a = Scope::new("const");
        let b = Scope::new("constant.numeric");
        assert!(!a.is_prefix_of(b));
    }

    #[test]
    fn truncates_past_eight_atoms() {
        let long = Scope::new("a.b.c.d.e.f.g.h.i.j");
        assert_eq!(long.build_string(), "a.b.c.d.e.f.g.h");
    }
}
