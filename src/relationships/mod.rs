// SPDX-License-Identifier: Apache-2.0

//! Relationship listing for the console's relationships panel.

pub mod readers;
pub mod service;

pub use readers::{FkConstraintReader, MetadataReader};
pub use service::{
    compose_relationships, InvalidatedReads, RelationshipService, RelationshipsResult,
};
