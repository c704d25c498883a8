//! A table of the names that occupy the program-wide (global) namespace.
//!
//! File-local symbols from different translation units are free to share an
//! assembler name, as the linker never sees them side-by-side. Public symbols,
//! however, must be unique, and so the graph tracks them in a bidirectional
//! table that allows both name-to-symbol lookup and the reverse.

use bimap::BiMap;

use crate::symbol::SymbolId;

/// A bidirectional mapping between global names and the symbols that own them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NameTable {
    /// The underlying bidirectional hash-map.
    table: BiMap<String, SymbolId>,
}

impl NameTable {
    /// Creates a new, empty, name table.
    #[must_use]
    pub fn new() -> Self {
        let table = BiMap::new();
        Self { table }
    }

    /// Claims `name` for the symbol `id`.
    ///
    /// Returns `false`, leaving the table unchanged, if the name is already
    /// owned by a different symbol or `id` already owns a different name.
    pub fn insert(&mut self, name: &str, id: SymbolId) -> bool {
        if self.table.get_by_left(name) == Some(&id) {
            return true;
        }
        self.table.insert_no_overwrite(name.to_string(), id).is_ok()
    }

    /// Gets the symbol that owns `name`, if any.
    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<SymbolId> {
        self.table.get_by_left(name).copied()
    }

    /// Gets the global name owned by `id`, if any.
    #[must_use]
    pub fn name_of(&self, id: SymbolId) -> Option<&str> {
        self.table.get_by_right(&id).map(String::as_str)
    }

    /// Returns `true` if some symbol owns `name`.
    #[must_use]
    pub fn contains_name(&self, name: &str) -> bool {
        self.table.contains_left(name)
    }

    /// Releases whatever name is owned by `id`, returning it.
    pub fn remove_id(&mut self, id: SymbolId) -> Option<String> {
        self.table.remove_by_right(&id).map(|(name, _)| name)
    }

    /// Gets the number of names in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the table contains no names.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod test {
    use crate::{intern::NameTable, symbol::SymbolId};

    #[test]
    fn names_are_claimed_once() {
        let mut names = NameTable::new();
        assert!(names.insert("main", SymbolId(0)));
        assert!(names.insert("main", SymbolId(0)));
        assert!(!names.insert("main", SymbolId(1)));
        assert!(!names.insert("other", SymbolId(0)));

        assert_eq!(names.id_of("main"), Some(SymbolId(0)));
        assert_eq!(names.name_of(SymbolId(0)), Some("main"));
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn removing_releases_the_name() {
        let mut names = NameTable::new();
        names.insert("counter", SymbolId(2));

        assert_eq!(names.remove_id(SymbolId(2)), Some("counter".to_string()));
        assert!(!names.contains_name("counter"));
        assert!(names.insert("counter", SymbolId(5)));
    }
}
