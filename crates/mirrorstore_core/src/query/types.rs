//! Query parameter and result types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, CoreResult};
use crate::record::Record;

/// Parameters carried by find, get, and count operations.
///
/// `query` holds field conditions, the `$and`/`$or`/`$not` combinators,
/// and the filter keys `$sort`, `$limit`, `$skip`, and `$select`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Params {
    /// The query object; `None` matches everything.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Map<String, Value>>,
}

impl Params {
    /// Parameters that match everything.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds parameters from a JSON query object.
    ///
    /// Rejects non-object query values.
    pub fn from_query(query: Value) -> CoreResult<Self> {
        match query {
            Value::Object(map) => Ok(Self { query: Some(map) }),
            _ => Err(CoreError::invalid_query("query must be an object")),
        }
    }
}

/// Sort direction for one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    /// Smallest values first.
    Ascending,
    /// Largest values first.
    Descending,
}

impl SortDirection {
    fn from_value(value: &Value) -> CoreResult<Self> {
        match coerce_i64(value) {
            Some(n) if n < 0 => Ok(Self::Descending),
            Some(_) => Ok(Self::Ascending),
            None => Err(CoreError::invalid_query("sort direction must be 1 or -1")),
        }
    }
}

/// Filter clause extracted from a query: ordering, pagination, and
/// projection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindFilters {
    /// Ordered sort fields.
    pub sort: Vec<(String, SortDirection)>,
    /// Requested limit. A negative value selects the bare, unpaginated
    /// result shape.
    pub limit: Option<i64>,
    /// Number of matching records to skip.
    pub skip: Option<u64>,
    /// Projection fields.
    pub select: Option<Vec<String>>,
}

impl FindFilters {
    /// Removes the filter keys from `query` and parses them.
    pub(crate) fn extract(query: &mut Map<String, Value>) -> CoreResult<Self> {
        let sort = match query.remove("$sort") {
            Some(value) => normalize_sort(&value)?,
            None => Vec::new(),
        };
        let limit = match query.remove("$limit") {
            Some(value) => Some(coerce_i64(&value).ok_or_else(|| {
                CoreError::invalid_query("$limit must be an integer")
            })?),
            None => None,
        };
        let skip = match query.remove("$skip") {
            Some(value) => {
                let n = coerce_i64(&value)
                    .ok_or_else(|| CoreError::invalid_query("$skip must be an integer"))?;
                // negative skips clamp to zero
                Some(n.max(0) as u64)
            }
            None => None,
        };
        let select = match query.remove("$select") {
            Some(value) => Some(parse_select(&value)?),
            None => None,
        };
        Ok(Self {
            sort,
            limit,
            skip,
            select,
        })
    }
}

/// Parses a `$select` value into a field list.
pub(crate) fn parse_select(value: &Value) -> CoreResult<Vec<String>> {
    let fields = value
        .as_array()
        .ok_or_else(|| CoreError::invalid_query("$select must be an array of field names"))?;
    fields
        .iter()
        .map(|field| {
            field
                .as_str()
                .map(str::to_owned)
                .ok_or_else(|| CoreError::invalid_query("$select entries must be strings"))
        })
        .collect()
}

/// Normalizes a `$sort` value into an ordered field list.
///
/// Accepts the object form `{field: 1|-1}` and the array form
/// `[[field, 1|-1], ...]`. Key order in the object form follows the
/// underlying map; the array form pins multi-key precedence explicitly.
pub(crate) fn normalize_sort(value: &Value) -> CoreResult<Vec<(String, SortDirection)>> {
    match value {
        Value::Object(fields) => fields
            .iter()
            .map(|(field, direction)| {
                Ok((field.clone(), SortDirection::from_value(direction)?))
            })
            .collect(),
        Value::Array(entries) => entries
            .iter()
            .map(|entry| {
                let pair = entry
                    .as_array()
                    .filter(|pair| pair.len() == 2)
                    .ok_or_else(|| {
                        CoreError::invalid_query("$sort entries must be [field, direction] pairs")
                    })?;
                let field = pair[0].as_str().ok_or_else(|| {
                    CoreError::invalid_query("$sort entries must name a field")
                })?;
                Ok((field.to_owned(), SortDirection::from_value(&pair[1])?))
            })
            .collect(),
        _ => Err(CoreError::invalid_query(
            "$sort must be an object or an array",
        )),
    }
}

/// Coerces a numeric filter value, accepting numeric strings as sent by
/// query-string transports.
pub(crate) fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Paginated result shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    /// Filtered candidate count before pagination.
    pub total: usize,
    /// Applied limit, 0 when none was given.
    #[serde(default)]
    pub limit: i64,
    /// Applied skip, 0 when none was given.
    #[serde(default)]
    pub skip: u64,
    /// The page of records.
    pub data: Vec<Record>,
}

/// Result of a find: a paginated envelope, or the bare sequence selected
/// by the negative-limit sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FindResult {
    /// Paginated envelope.
    Page(ResultEnvelope),
    /// Bare record sequence.
    Records(Vec<Record>),
}

impl FindResult {
    /// The records, regardless of shape.
    pub fn records(&self) -> &[Record] {
        match self {
            Self::Page(envelope) => &envelope.data,
            Self::Records(records) => records,
        }
    }

    /// Consumes the result into its records, regardless of shape.
    pub fn into_records(self) -> Vec<Record> {
        match self {
            Self::Page(envelope) => envelope.data,
            Self::Records(records) => records,
        }
    }

    /// Envelope total when paginated.
    pub fn total(&self) -> Option<usize> {
        match self {
            Self::Page(envelope) => Some(envelope.total),
            Self::Records(_) => None,
        }
    }

    /// Envelope reference when paginated.
    pub fn as_page(&self) -> Option<&ResultEnvelope> {
        match self {
            Self::Page(envelope) => Some(envelope),
            Self::Records(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn extract_strips_filter_keys() {
        let mut query = query_map(json!({
            "a": 1,
            "$sort": {"a": 1},
            "$limit": 10,
            "$skip": 2,
            "$select": ["a"],
        }));
        let filters = FindFilters::extract(&mut query).unwrap();
        assert_eq!(query, query_map(json!({"a": 1})));
        assert_eq!(filters.sort.len(), 1);
        assert_eq!(filters.limit, Some(10));
        assert_eq!(filters.skip, Some(2));
        assert_eq!(filters.select, Some(vec!["a".to_owned()]));
    }

    #[test]
    fn numeric_filters_coerce_from_strings() {
        let mut query = query_map(json!({"$limit": "25", "$skip": "5"}));
        let filters = FindFilters::extract(&mut query).unwrap();
        assert_eq!(filters.limit, Some(25));
        assert_eq!(filters.skip, Some(5));
    }

    #[test]
    fn unparseable_numeric_filters_are_rejected() {
        let mut query = query_map(json!({"$limit": "ten"}));
        let err = FindFilters::extract(&mut query).unwrap_err();
        assert!(matches!(err, CoreError::InvalidQuery { .. }));

        let mut query = query_map(json!({"$skip": {"n": 1}}));
        assert!(FindFilters::extract(&mut query).is_err());
    }

    #[test]
    fn negative_skip_clamps_to_zero() {
        let mut query = query_map(json!({"$skip": -3}));
        let filters = FindFilters::extract(&mut query).unwrap();
        assert_eq!(filters.skip, Some(0));
    }

    #[test]
    fn sort_object_form() {
        let sort = normalize_sort(&json!({"a": 1, "b": -1})).unwrap();
        assert_eq!(
            sort,
            vec![
                ("a".to_owned(), SortDirection::Ascending),
                ("b".to_owned(), SortDirection::Descending),
            ]
        );
    }

    #[test]
    fn sort_array_form_pins_precedence() {
        let sort = normalize_sort(&json!([["b", -1], ["a", 1]])).unwrap();
        assert_eq!(
            sort,
            vec![
                ("b".to_owned(), SortDirection::Descending),
                ("a".to_owned(), SortDirection::Ascending),
            ]
        );
    }

    #[test]
    fn sort_rejects_malformed_values() {
        assert!(normalize_sort(&json!("a")).is_err());
        assert!(normalize_sort(&json!([["a"]])).is_err());
        assert!(normalize_sort(&json!({"a": "up"})).is_err());
    }

    #[test]
    fn find_result_shapes() {
        let page = FindResult::Page(ResultEnvelope {
            total: 3,
            limit: 2,
            skip: 1,
            data: vec![],
        });
        assert_eq!(page.total(), Some(3));
        assert!(page.records().is_empty());

        let bare = FindResult::Records(vec![]);
        assert_eq!(bare.total(), None);
        assert!(bare.as_page().is_none());
    }

    #[test]
    fn envelope_deserializes_with_defaulted_metadata() {
        let envelope: ResultEnvelope =
            serde_json::from_value(json!({"total": 2, "data": []})).unwrap();
        assert_eq!(envelope.total, 2);
        assert_eq!(envelope.limit, 0);
        assert_eq!(envelope.skip, 0);
    }

    #[test]
    fn find_result_deserializes_both_shapes() {
        let page: FindResult =
            serde_json::from_value(json!({"total": 1, "limit": 10, "skip": 0, "data": [{"id": 1}]}))
                .unwrap();
        assert!(matches!(page, FindResult::Page(_)));

        let bare: FindResult = serde_json::from_value(json!([{"id": 1}, {"id": 2}])).unwrap();
        assert!(matches!(bare, FindResult::Records(ref records) if records.len() == 2));
    }
}
