//! Proptest strategies for records and queries.

use mirrorstore_core::Record;
use proptest::prelude::*;
use serde_json::{json, Value};

/// Scalar JSON values as they appear in record fields.
pub fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        (-1000i64..1000).prop_map(Value::from),
        "[a-z]{0,8}".prop_map(Value::from),
    ]
}

/// A record with the given integer id and a small scalar field set.
pub fn arb_record(id: i64) -> impl Strategy<Value = Record> {
    (arb_scalar(), arb_scalar(), 0i64..50).prop_map(move |(x, y, a)| {
        match json!({"id": id, "a": a, "x": x, "y": y}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    })
}

/// Up to `max` records with distinct sequential ids.
pub fn arb_records(max: usize) -> impl Strategy<Value = Vec<Record>> {
    (0..=max).prop_flat_map(|len| {
        (0..len as i64)
            .map(arb_record)
            .collect::<Vec<_>>()
    })
}

/// Field subsets drawn from the generated record shape, for projection
/// tests.
pub fn arb_select() -> impl Strategy<Value = Vec<String>> {
    prop::collection::hash_set(
        prop_oneof![Just("a"), Just("x"), Just("y"), Just("missing")],
        0..4,
    )
    .prop_map(|fields| fields.into_iter().map(str::to_owned).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_records_carry_their_id(record in arb_record(7)) {
            prop_assert_eq!(&record["id"], &json!(7));
        }

        #[test]
        fn generated_batches_have_distinct_ids(records in arb_records(20)) {
            let mut ids: Vec<i64> = records
                .iter()
                .filter_map(|r| r["id"].as_i64())
                .collect();
            let len = ids.len();
            prop_assert_eq!(len, records.len());
            ids.dedup();
            prop_assert_eq!(ids.len(), len);
        }
    }
}
