//! Command name table with exact-then-unique-prefix resolution.
//!
//! The live table sits behind an `Arc` that is swapped whole. Readers take a
//! snapshot and resolve against it, so a dispatch that started before a plugin
//! reload keeps seeing a consistent table while the loader prepares the next
//! one on a private copy and publishes it in a single step.

use super::CommandHandler;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Outcome of resolving a typed command word.
#[derive(Clone)]
pub enum Resolution {
    Found {
        name: String,
        handler: Arc<dyn CommandHandler>,
    },
    /// More than one registered name starts with the typed word (sorted).
    Ambiguous(Vec<String>),
    NotFound,
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Found { name, .. } => f.debug_struct("Found").field("name", name).finish(),
            Self::Ambiguous(candidates) => f.debug_tuple("Ambiguous").field(candidates).finish(),
            Self::NotFound => f.write_str("NotFound"),
        }
    }
}

/// Name → handler mapping. Names are unique and case-sensitive; inserting an
/// existing name replaces its handler.
#[derive(Clone, Default)]
pub struct CommandTable {
    entries: BTreeMap<String, Arc<dyn CommandHandler>>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the handler that was replaced, if any.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn CommandHandler>,
    ) -> Option<Arc<dyn CommandHandler>> {
        self.entries.insert(name.into(), handler)
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.entries.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn CommandHandler>> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names in lexicographic order.
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn CommandHandler>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact match first; otherwise the unique registered name starting with
    /// `typed`. Several prefix matches yield [`Resolution::Ambiguous`].
    pub fn resolve(&self, typed: &str) -> Resolution {
        if typed.is_empty() {
            return Resolution::NotFound;
        }
        if let Some(handler) = self.entries.get(typed) {
            return Resolution::Found {
                name: typed.to_string(),
                handler: Arc::clone(handler),
            };
        }

        let mut candidates = self
            .entries
            .range::<str, _>((std::ops::Bound::Included(typed), std::ops::Bound::Unbounded))
            .take_while(|(name, _)| name.starts_with(typed));

        match (candidates.next(), candidates.next()) {
            (None, _) => Resolution::NotFound,
            (Some((name, handler)), None) => Resolution::Found {
                name: name.clone(),
                handler: Arc::clone(handler),
            },
            (Some((first, _)), Some((second, _))) => {
                let mut names = vec![first.clone(), second.clone()];
                names.extend(candidates.map(|(name, _)| name.clone()));
                Resolution::Ambiguous(names)
            }
        }
    }
}

/// Shared, swappable command table.
pub struct CommandRegistry {
    table: RwLock<Arc<CommandTable>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(Arc::new(CommandTable::new())),
        }
    }

    /// Insert or replace a single command (last writer wins).
    pub fn register(&self, name: impl Into<String>, handler: Arc<dyn CommandHandler>) {
        let mut table = self.table.write();
        Arc::make_mut(&mut *table).insert(name, handler);
    }

    /// Remove `name`. Returns whether it was present.
    pub fn unregister(&self, name: &str) -> bool {
        let mut table = self.table.write();
        if !table.contains(name) {
            return false;
        }
        Arc::make_mut(&mut *table).remove(name).is_some()
    }

    pub fn resolve(&self, typed: &str) -> Resolution {
        self.snapshot().resolve(typed)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.read().contains(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.table.read().names()
    }

    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }

    /// The current table. Later mutations never affect a taken snapshot.
    pub fn snapshot(&self) -> Arc<CommandTable> {
        Arc::clone(&self.table.read())
    }

    /// Replace the whole table in one step.
    pub fn publish(&self, table: CommandTable) {
        *self.table.write() = Arc::new(table);
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}
