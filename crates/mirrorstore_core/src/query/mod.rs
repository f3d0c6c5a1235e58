//! MongoDB-style query evaluation over entity tables.
//!
//! A query object splits into a match clause (field conditions and the
//! `$and`/`$or`/`$not` combinators) and a filter clause (`$sort`,
//! `$limit`, `$skip`, `$select`). [`find`] runs the full pipeline;
//! [`count`] evaluates the match clause alone; [`get`] is a direct id
//! lookup. All three validate operators up front, so a bad query is
//! rejected even when no record would ever be evaluated against it.

mod execute;
mod operators;
mod types;

pub use execute::{count, find, get};
pub use operators::{compare_values, deep_equals, matches_clause};
pub use types::{FindFilters, FindResult, Params, ResultEnvelope, SortDirection};

pub(crate) use operators::is_known_extra_operator;
