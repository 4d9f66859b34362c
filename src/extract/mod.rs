// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Field extraction and row expansion
//!
//! Turns one hierarchical record into the rows it contributes to a table:
//! every declared field is evaluated to a list of candidate values, and the
//! rows are the cartesian product of those lists.

mod expand;
mod field;
mod path;
mod transform;

pub use expand::Expansion;
pub use field::{ColumnValue, FieldError, FieldSpec};
