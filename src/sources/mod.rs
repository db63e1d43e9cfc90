// SPDX-License-Identifier: Apache-2.0

//! Upstream data sources: declared metadata and live introspection.

pub mod introspection;
pub mod metadata;

pub use introspection::DataSource;
pub use metadata::MetadataApi;
