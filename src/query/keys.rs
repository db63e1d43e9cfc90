// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::time::Duration;

use crate::Table;

/// How long a successful read is served without refetching
pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(5 * 60);

/// How long an entry nobody reads stays cached
pub const DEFAULT_GC_TIME: Duration = Duration::from_secs(5 * 60);

/// Cache key: an ordered list of parts
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

/// Key builders for every cached read
pub struct QueryKeys;

impl QueryKeys {
    pub fn export_metadata() -> QueryKey {
        QueryKey::new(["export_metadata"])
    }

    pub fn fk_constraints(table: &Table, data_source_name: &str) -> QueryKey {
        QueryKey::new([
            data_source_name.to_string(),
            table.cache_fragment(),
            "fk_constraints".to_string(),
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    pub stale_time: Duration,
    /// Mark the entry stale when the console window regains focus
    pub refetch_on_window_focus: bool,
    /// Idle period after which an unread entry is evicted
    pub gc_time: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            stale_time: Duration::ZERO,
            refetch_on_window_focus: true,
            gc_time: DEFAULT_GC_TIME,
        }
    }
}
