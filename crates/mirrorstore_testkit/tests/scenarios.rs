//! Store flows against the in-memory remote.

use std::sync::Arc;
use std::time::Duration;

use mirrorstore_client::{Action, LiveOptions, LiveState, QueryMethod, Read, ReadOutput, RemoteError, Store};
use mirrorstore_core::Params;
use mirrorstore_testkit::prelude::*;
use serde_json::{json, Value};

fn params(query: Value) -> Params {
    Params::from_query(query).unwrap()
}

fn setup() -> (Store, Arc<InMemoryRemote>) {
    let store = Store::default();
    let remote = Arc::new(InMemoryRemote::new());
    let config = things_config();
    remote.serve(&config);
    remote.seed("things", &things());
    store.register(config, Arc::clone(&remote) as _).unwrap();
    (store, remote)
}

#[tokio::test]
async fn find_mirrors_the_served_collection() {
    let (store, remote) = setup();

    let result = store
        .dispatch(
            "things",
            Action::Find {
                params: params(json!({"a": 1, "$sort": {"id": -1}})),
            },
        )
        .await
        .unwrap()
        .into_find()
        .unwrap();

    let ids: Vec<Value> = result.records().iter().map(|r| r["id"].clone()).collect();
    assert_eq!(ids, vec![json!(3), json!(1)]);
    assert_eq!(result.total(), Some(2));
    // only the matching records were mirrored locally
    assert_eq!(store.cache().record_count("things").unwrap(), 2);
    assert_eq!(remote.calls().find, 1);
}

#[tokio::test]
async fn get_reads_through_once_per_miss() {
    let (store, remote) = setup();

    let fetched = store
        .dispatch(
            "things",
            Action::Get {
                id: json!(2),
                params: Params::empty(),
            },
        )
        .await
        .unwrap()
        .into_record()
        .unwrap();
    assert_eq!(fetched["a"], json!(2));
    assert_eq!(remote.calls().get, 1);

    // second get is served from the cache
    store
        .dispatch(
            "things",
            Action::Get {
                id: json!(2),
                params: Params::empty(),
            },
        )
        .await
        .unwrap();
    assert_eq!(remote.calls().get, 1);
}

#[tokio::test]
async fn create_mirrors_the_server_assigned_id() {
    let (store, remote) = setup();

    let created = store
        .dispatch(
            "things",
            Action::Create {
                data: record(json!({"a": 9})),
                params: Params::empty(),
            },
        )
        .await
        .unwrap()
        .into_record()
        .unwrap();

    let id = created["id"].clone();
    assert!(id.is_string());
    assert_eq!(remote.stored("things"), 4);

    // the mirrored instance is addressable under the assigned id
    let ReadOutput::Record(Some(_)) = store
        .read(
            "things",
            Read::Get {
                id,
                params: Params::empty(),
            },
        )
        .unwrap()
    else {
        panic!("created record must be cached");
    };
}

#[tokio::test]
async fn update_and_remove_round_trip() {
    let (store, remote) = setup();

    let updated = store
        .dispatch(
            "things",
            Action::Update {
                id: json!(1),
                data: record(json!({"a": 10})),
                params: Params::empty(),
            },
        )
        .await
        .unwrap()
        .into_record()
        .unwrap();
    assert_eq!(updated["a"], json!(10));

    let removed = store
        .dispatch(
            "things",
            Action::Remove {
                id: json!(1),
                params: Params::empty(),
            },
        )
        .await
        .unwrap()
        .into_record();
    assert!(removed.is_none());
    assert_eq!(remote.stored("things"), 2);
}

#[tokio::test]
async fn injected_failure_surfaces_and_recovers() {
    let (store, remote) = setup();
    remote.fail_next(RemoteError::unavailable("flaky network"));

    let err = store
        .dispatch(
            "things",
            Action::Find {
                params: Params::empty(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "remote service unavailable: flaky network");
    assert_eq!(store.cache().record_count("things").unwrap(), 0);

    let result = store
        .dispatch(
            "things",
            Action::Find {
                params: Params::empty(),
            },
        )
        .await
        .unwrap()
        .into_find()
        .unwrap();
    assert_eq!(result.records().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn slow_responses_cannot_overwrite_newer_queries() {
    let (store, remote) = setup();
    remote.set_latency(Duration::from_millis(50));

    let live = store
        .live("things", LiveOptions::find(params(json!({"a": 1}))))
        .unwrap();
    // replace the query before the first response lands
    live.set_query(QueryMethod::find(params(json!({"a": 2}))));

    tokio::time::sleep(Duration::from_millis(200)).await;

    let snapshot = live.snapshot();
    assert_eq!(snapshot.state, LiveState::Ready);
    // pagination reflects the replacement query's result set
    assert_eq!(snapshot.pagination.total, 1);
    // items are derived with the current query over the full cache
    let ids: Vec<Value> = snapshot.items.iter().map(|r| r["id"].clone()).collect();
    assert_eq!(ids, vec![json!(2)]);
    // the superseded response was still fetched and reconciled
    assert_eq!(remote.calls().find, 2);
    assert_eq!(store.cache().record_count("things").unwrap(), 3);
}

#[tokio::test]
async fn messages_collection_seeds_defaults_through_the_flow() {
    let store = Store::default();
    let remote = Arc::new(InMemoryRemote::new());
    let config = messages_config();
    remote.serve(&config);
    store.register(config, Arc::clone(&remote) as _).unwrap();

    // the server response lacks the read flag; the cache seeds it
    let created = store
        .dispatch(
            "messages",
            Action::Create {
                data: record(json!({"text": "hello"})),
                params: Params::empty(),
            },
        )
        .await
        .unwrap()
        .into_record()
        .unwrap();
    assert_eq!(created["read"], json!(false));
    assert_eq!(created["text"], json!("hello"));
}
