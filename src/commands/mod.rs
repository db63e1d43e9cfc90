// SPDX-License-Identifier: Apache-2.0

// Command Module

pub mod metrics;
pub mod relationships;
