// SPDX-License-Identifier: Apache-2.0

//! Foreign-key constraints as reported by live introspection

use serde::{Deserialize, Serialize};

use crate::table::Table;

/// One side of a foreign-key constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FkEndpoint {
    pub table: Table,
    pub columns: Vec<String>,
}

/// A foreign-key constraint touching the introspected table
///
/// `from` holds the referencing columns, `to` the referenced ones. The
/// introspected table may sit on either side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableFkRelationship {
    pub constraint_name: String,
    pub from: FkEndpoint,
    pub to: FkEndpoint,
}

impl TableFkRelationship {
    pub fn new(
        constraint_name: impl Into<String>,
        from: (Table, Vec<String>),
        to: (Table, Vec<String>),
    ) -> Self {
        Self {
            constraint_name: constraint_name.into(),
            from: FkEndpoint {
                table: from.0,
                columns: from.1,
            },
            to: FkEndpoint {
                table: to.0,
                columns: to.1,
            },
        }
    }

    /// Referencing column → referenced column, in constraint order.
    pub fn column_pairs(&self) -> impl Iterator<Item = (&String, &String)> {
        self.from.columns.iter().zip(self.to.columns.iter())
    }
}
