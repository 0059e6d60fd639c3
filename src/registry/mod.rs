//! # Type Registry
//!
//! Maps node/group/computer classes to their polymorphic discriminator
//! strings and backing relational tables, and enumerates the fixed set of
//! edge tables the emitter joins through.
//!
//! Read-only after [`Registry::build`]; the query builder never mutates it,
//! so it is freely `Arc`-shareable across independently-owned builders (see
//! the crate's concurrency notes).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The sentinel discriminators that never get a `type LIKE` filter injected.
pub const SENTINEL_COMPUTER: &str = "computer";
pub const SENTINEL_GROUP: &str = "group";
pub const SENTINEL_NODE: &str = "node";

/// The name of a relational table backing a discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef(pub String);

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        TableRef(name.into())
    }
}

/// Identity of a node/group/computer class as the host application names it
/// (e.g. `"StructureData"`). Opaque to the compiler beyond registry lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassTag(pub String);

impl ClassTag {
    pub fn new(name: impl Into<String>) -> Self {
        ClassTag(name.into())
    }
}

/// The fixed edge tables the emitter is allowed to join through.
#[derive(Debug, Clone)]
pub struct EdgeTables {
    /// `(input_id, output_id)`
    pub link: TableRef,
    /// `(parent_id, child_id)`
    pub closure_path: TableRef,
    /// `(dbnode_id, dbgroup_id)`
    pub group_nodes: TableRef,
}

impl Default for EdgeTables {
    fn default() -> Self {
        EdgeTables {
            link: TableRef::new("db_dblink"),
            closure_path: TableRef::new("db_dbpath"),
            group_nodes: TableRef::new("db_dbgroup_dbnodes"),
        }
    }
}

/// Read-only mapping from class to discriminator/table, plus the edge table
/// set. Construct via [`RegistryBuilder`].
#[derive(Debug, Clone)]
pub struct Registry {
    discriminators: HashMap<ClassTag, String>,
    group_classes: HashMap<ClassTag, ()>,
    node_table: TableRef,
    group_table: TableRef,
    computer_table: TableRef,
    edge_tables: EdgeTables,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// The polymorphic discriminator for `class`, or `None` if unknown (the
    /// caller falls back to the bare node table plus a `type LIKE` filter on
    /// whatever string it was given directly).
    pub fn discriminator(&self, class: &ClassTag) -> Option<&str> {
        self.discriminators.get(class).map(String::as_str)
    }

    pub fn is_group_class(&self, class: &ClassTag) -> bool {
        self.group_classes.contains_key(class)
    }

    /// Last non-empty dot-segment of the discriminator; the default label
    /// for a class-typed vertex.
    pub fn label_hint(discriminator: &str) -> &str {
        discriminator
            .trim_end_matches('.')
            .rsplit('.')
            .find(|segment| !segment.is_empty())
            .unwrap_or(discriminator)
    }

    /// Resolve a discriminator string (e.g. `"data.structure."`, `"group"`,
    /// `"computer"`, or bare `"node"`) to its backing table.
    pub fn table_for(&self, discriminator: &str) -> &TableRef {
        match discriminator {
            SENTINEL_GROUP => &self.group_table,
            SENTINEL_COMPUTER => &self.computer_table,
            _ => &self.node_table,
        }
    }

    pub fn edge_tables(&self) -> &EdgeTables {
        &self.edge_tables
    }
}

/// Builder for [`Registry`]. Registrations are accumulated then frozen by
/// [`RegistryBuilder::build`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    discriminators: HashMap<ClassTag, String>,
    group_classes: HashMap<ClassTag, ()>,
    node_table: Option<TableRef>,
    group_table: Option<TableRef>,
    computer_table: Option<TableRef>,
    edge_tables: Option<EdgeTables>,
}

impl RegistryBuilder {
    pub fn node_class(mut self, class: ClassTag, discriminator: impl Into<String>) -> Self {
        self.discriminators.insert(class, discriminator.into());
        self
    }

    pub fn group_class(mut self, class: ClassTag) -> Self {
        self.group_classes.insert(class, ());
        self
    }

    pub fn node_table(mut self, table: TableRef) -> Self {
        self.node_table = Some(table);
        self
    }

    pub fn group_table(mut self, table: TableRef) -> Self {
        self.group_table = Some(table);
        self
    }

    pub fn computer_table(mut self, table: TableRef) -> Self {
        self.computer_table = Some(table);
        self
    }

    pub fn edge_tables(mut self, tables: EdgeTables) -> Self {
        self.edge_tables = Some(tables);
        self
    }

    pub fn build(self) -> Registry {
        Registry {
            discriminators: self.discriminators,
            group_classes: self.group_classes,
            node_table: self.node_table.unwrap_or_else(|| TableRef::new("db_dbnode")),
            group_table: self.group_table.unwrap_or_else(|| TableRef::new("db_dbgroup")),
            computer_table: self
                .computer_table
                .unwrap_or_else(|| TableRef::new("db_dbcomputer")),
            edge_tables: self.edge_tables.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_hint_takes_last_nonempty_segment() {
        assert_eq!(Registry::label_hint("data.structure."), "structure");
        assert_eq!(Registry::label_hint("node"), "node");
        assert_eq!(Registry::label_hint("data."), "data");
    }

    #[test]
    fn unregistered_class_has_no_discriminator() {
        let registry = Registry::builder().build();
        assert_eq!(registry.discriminator(&ClassTag::new("Unknown")), None);
    }

    #[test]
    fn group_and_computer_route_to_their_own_tables() {
        let registry = Registry::builder().build();
        assert_eq!(registry.table_for(SENTINEL_GROUP).0, "db_dbgroup");
        assert_eq!(registry.table_for(SENTINEL_COMPUTER).0, "db_dbcomputer");
        assert_eq!(registry.table_for("data.structure.").0, "db_dbnode");
    }
}
