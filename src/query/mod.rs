// SPDX-License-Identifier: Apache-2.0

//! Keyed async read cache with stale windows and request deduplication.

pub mod cache;
pub mod keys;

pub use cache::{QueryCache, QueryState};
pub use keys::{QueryKey, QueryKeys, QueryOptions, DEFAULT_GC_TIME, DEFAULT_STALE_TIME};
