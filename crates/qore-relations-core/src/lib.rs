// SPDX-License-Identifier: Apache-2.0

//! Relationship metadata model
//!
//! Types for declared relationship metadata, introspected foreign keys and
//! the normalized descriptors shown by the console, plus the adapter that
//! turns the first two into the third. Nothing here performs I/O.

pub mod adapt;
pub mod error;
pub mod introspection;
pub mod metadata;
pub mod relationship;
pub mod table;

pub use adapt::adapt_relationships;
pub use error::{RelationsError, RelationsResult};
pub use introspection::{FkEndpoint, TableFkRelationship};
pub use metadata::{find_table, MetadataExport, MetadataTable};
pub use relationship::{Relationship, RelationshipKind, RelationshipType};
pub use table::Table;
