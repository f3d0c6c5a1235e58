//! The find, count, and get pipeline over a table snapshot.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::config::CollectionConfig;
use crate::error::CoreResult;
use crate::query::operators::{compare_values, field_value, matches_clause, validate_clause};
use crate::query::types::{
    parse_select, FindFilters, FindResult, Params, ResultEnvelope, SortDirection,
};
use crate::record::{project, Record, RecordKey};
use crate::table::EntityTable;

/// A parsed query: the match clause with filter and server-only keys
/// removed, plus the extracted filters.
#[derive(Debug, Clone, Default)]
pub(crate) struct ParsedQuery {
    pub(crate) clause: Map<String, Value>,
    pub(crate) filters: FindFilters,
}

/// Strips server-only keys, extracts filters, and validates operators.
pub(crate) fn parse_params(params: &Params, config: &CollectionConfig) -> CoreResult<ParsedQuery> {
    let mut query = params.query.clone().unwrap_or_default();
    for key in &config.server_only_params {
        query.remove(key);
    }
    let filters = FindFilters::extract(&mut query)?;
    validate_clause(&query, &config.extra_operators)?;
    Ok(ParsedQuery {
        clause: query,
        filters,
    })
}

/// Runs a find against a table snapshot.
///
/// The pipeline filters, counts the candidates, sorts, then either
/// returns the whole sorted sequence bare (negative-limit sentinel) or
/// slices the `[skip, skip + limit)` window into a paginated envelope.
/// Projection applies last and always retains the id field.
pub fn find(
    table: &EntityTable,
    config: &CollectionConfig,
    params: &Params,
) -> CoreResult<FindResult> {
    let parsed = parse_params(params, config)?;
    Ok(execute(table, config, parsed))
}

/// Counts matching records, ignoring pagination and projection filters.
pub fn count(table: &EntityTable, config: &CollectionConfig, params: &Params) -> CoreResult<usize> {
    let parsed = parse_params(params, config)?;
    Ok(table
        .records()
        .filter(|record| matches_clause(record, &parsed.clause))
        .count())
}

/// Looks up one record by id. Unknown and non-identifying ids are a
/// miss, never an error; `$select` projection applies when present.
pub fn get(
    table: &EntityTable,
    config: &CollectionConfig,
    id: &Value,
    params: &Params,
) -> CoreResult<Option<Record>> {
    let select = match params.query.as_ref().and_then(|query| query.get("$select")) {
        Some(value) => Some(parse_select(value)?),
        None => None,
    };
    let Some(key) = RecordKey::from_value(id) else {
        return Ok(None);
    };
    let Some(record) = table.get(&key) else {
        return Ok(None);
    };
    Ok(Some(match select {
        Some(fields) => project(record, &fields, &config.id_field),
        None => record.clone(),
    }))
}

pub(crate) fn execute(
    table: &EntityTable,
    config: &CollectionConfig,
    parsed: ParsedQuery,
) -> FindResult {
    let ParsedQuery { clause, filters } = parsed;
    let mut candidates: Vec<&Record> = table
        .records()
        .filter(|record| matches_clause(record, &clause))
        .collect();
    let total = candidates.len();

    if !filters.sort.is_empty() {
        sort_records(&mut candidates, &filters.sort);
    }

    if let Some(limit) = filters.limit {
        if limit < 0 {
            // fetch-everything sentinel: no slicing, no envelope
            let data = project_all(candidates, filters.select.as_deref(), &config.id_field);
            return FindResult::Records(data);
        }
    }

    let skip = filters.skip.unwrap_or(0);
    let window = if filters.skip.is_none() && filters.limit.is_none() {
        candidates
    } else {
        let start = (skip as usize).min(candidates.len());
        let end = match filters.limit {
            Some(limit) => start.saturating_add(limit as usize).min(candidates.len()),
            None => candidates.len(),
        };
        candidates[start..end].to_vec()
    };

    let data = project_all(window, filters.select.as_deref(), &config.id_field);
    FindResult::Page(ResultEnvelope {
        total,
        limit: filters.limit.unwrap_or(0),
        skip,
        data,
    })
}

/// Stable multi-field sort; records with equal sort keys keep their
/// insertion order.
fn sort_records(records: &mut [&Record], sort: &[(String, SortDirection)]) {
    records.sort_by(|a, b| {
        for (field, direction) in sort {
            let left = field_value(a, field).unwrap_or(&Value::Null);
            let right = field_value(b, field).unwrap_or(&Value::Null);
            let ordering = match direction {
                SortDirection::Ascending => compare_values(left, right),
                SortDirection::Descending => compare_values(left, right).reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn project_all(records: Vec<&Record>, select: Option<&[String]>, id_field: &str) -> Vec<Record> {
    match select {
        Some(fields) => records
            .into_iter()
            .map(|record| project(record, fields, id_field))
            .collect(),
        None => records.into_iter().cloned().collect(),
    }
}
