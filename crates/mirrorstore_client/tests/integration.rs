//! End-to-end flows over a store backed by a scripted remote.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mirrorstore_client::{
    Action, FindResponse, LiveOptions, LiveState, MockRemoteService, Mutation, QueryMethod, Read,
    ReadOutput, RemoteError, Store,
};
use mirrorstore_core::{CollectionConfig, FindResult, Params, Record, ResultEnvelope};
use serde_json::{json, Value};

fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

fn params(query: Value) -> Params {
    Params::from_query(query).unwrap()
}

fn store() -> (Store, Arc<MockRemoteService>) {
    let store = Store::default();
    let mock = Arc::new(MockRemoteService::new());
    store
        .register(
            CollectionConfig::new("things").with_id_field("id"),
            Arc::clone(&mock) as _,
        )
        .unwrap();
    (store, mock)
}

/// Seeds the canonical three-record collection: a=1, a=2, a=1.
fn seed(store: &Store) {
    store
        .commit(
            "things",
            Mutation::Update(vec![
                record(json!({"id": 1, "a": 1})),
                record(json!({"id": 2, "a": 2})),
                record(json!({"id": 3, "a": 1})),
            ]),
        )
        .unwrap();
}

fn read_ids(store: &Store, query: Value) -> Vec<Value> {
    let params = params(query);
    let output = store.read("things", Read::Find { params }).unwrap();
    let ReadOutput::Find(result) = output else {
        panic!("expected a find result");
    };
    result.records().iter().map(|r| r["id"].clone()).collect()
}

#[tokio::test]
async fn create_patch_remove_flow() {
    let (store, mock) = store();
    mock.push_create(Ok(record(json!({"id": 1, "text": "hi", "done": false}))));
    mock.push_patch(Ok(record(json!({"id": 1, "done": true}))));
    mock.push_remove(Ok(record(json!({"id": 1}))));

    let created = store
        .dispatch(
            "things",
            Action::Create {
                data: record(json!({"text": "hi"})),
                params: Params::empty(),
            },
        )
        .await
        .unwrap()
        .into_record()
        .unwrap();
    assert_eq!(created["id"], json!(1));
    assert_eq!(store.cache().record_count("things").unwrap(), 1);

    let patched = store
        .dispatch(
            "things",
            Action::Patch {
                id: json!(1),
                data: record(json!({"done": true})),
                params: Params::empty(),
            },
        )
        .await
        .unwrap()
        .into_record()
        .unwrap();
    // merged instance keeps fields the patch response did not carry
    assert_eq!(patched["text"], json!("hi"));
    assert_eq!(patched["done"], json!(true));

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
    assert_eq!(store.cache().record_count("things").unwrap(), 0);
}

#[tokio::test]
async fn find_reconciles_and_rederives_locally() {
    let (store, mock) = store();
    seed(&store);
    // the server page carries a record the cache has not seen
    mock.push_find(Ok(FindResponse::Page(ResultEnvelope {
        total: 4,
        limit: 10,
        skip: 0,
        data: vec![record(json!({"id": 4, "a": 1}))],
    })));

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

    let FindResult::Page(page) = result else {
        panic!("expected a page");
    };
    // server metadata wins for the envelope
    assert_eq!(page.total, 4);
    assert_eq!(page.limit, 10);
    // data is recomputed locally: seeded a=1 records plus the fetched one
    let ids: Vec<Value> = page.data.iter().map(|r| r["id"].clone()).collect();
    assert_eq!(ids, vec![json!(4), json!(3), json!(1)]);
}

#[tokio::test]
async fn remote_failures_leave_the_cache_as_confirmed() {
    let (store, mock) = store();
    seed(&store);
    mock.push_update(Err(RemoteError::unavailable("connection refused")));

    let err = store
        .dispatch(
            "things",
            Action::Update {
                id: json!(1),
                data: record(json!({"a": 99})),
                params: Params::empty(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "remote service unavailable: connection refused"
    );

    let ReadOutput::Record(Some(unchanged)) = store
        .read(
            "things",
            Read::Get {
                id: json!(1),
                params: Params::empty(),
            },
        )
        .unwrap()
    else {
        panic!("expected the record to survive");
    };
    assert_eq!(unchanged["a"], json!(1));
}

#[test]
fn local_reads_cover_the_query_surface() {
    let (store, _mock) = store();
    seed(&store);

    assert_eq!(
        read_ids(&store, json!({"a": 1, "$sort": {"id": -1}})),
        vec![json!(3), json!(1)]
    );
    assert_eq!(
        read_ids(&store, json!({"$sort": {"a": 1}, "$skip": 1, "$limit": 1})),
        vec![json!(3)]
    );

    // the negative-limit sentinel returns the bare shape
    let ReadOutput::Find(bare) = store
        .read(
            "things",
            Read::Find {
                params: params(json!({"$limit": -1, "$sort": {"a": -1}})),
            },
        )
        .unwrap()
    else {
        panic!("expected a find result");
    };
    assert!(matches!(bare, FindResult::Records(_)));

    let ReadOutput::Count(n) = store
        .read(
            "things",
            Read::Count {
                params: params(json!({"a": 1, "$limit": 1})),
            },
        )
        .unwrap()
    else {
        panic!("expected a count");
    };
    assert_eq!(n, 2);
}

#[tokio::test(start_paused = true)]
async fn live_query_initial_fetch_publishes_ready() {
    let (store, mock) = store();
    mock.push_find(Ok(FindResponse::Records(vec![
        record(json!({"id": 1, "a": 1})),
        record(json!({"id": 2, "a": 2})),
    ])));

    let live = store
        .live("things", LiveOptions::find(Params::empty()))
        .unwrap();
    assert_eq!(live.state(), LiveState::Initializing);

    let mut rx = live.watch();
    while live.state() != LiveState::Ready {
        rx.changed().await.unwrap();
    }
    let snapshot = live.snapshot();
    assert_eq!(snapshot.items.len(), 2);
    assert_eq!(snapshot.collection, "things");
}

#[tokio::test(start_paused = true)]
async fn superseded_fetch_is_reconciled_but_never_published() {
    let (store, mock) = store();
    // the first query's response arrives late; the replacement is fast
    mock.push_find_after(
        Duration::from_millis(100),
        Ok(FindResponse::Page(ResultEnvelope {
            total: 1,
            limit: 0,
            skip: 0,
            data: vec![record(json!({"id": 1, "a": 1, "stale": true}))],
        })),
    );
    mock.push_find(Ok(FindResponse::Page(ResultEnvelope {
        total: 7,
        limit: 5,
        skip: 0,
        data: vec![record(json!({"id": 2, "a": 2}))],
    })));

    let live = store
        .live("things", LiveOptions::find(Params::empty()))
        .unwrap();
    live.set_query(QueryMethod::find(Params::empty()));

    // let both fetches complete, including the delayed one
    tokio::time::sleep(Duration::from_millis(200)).await;

    let snapshot = live.snapshot();
    assert_eq!(snapshot.state, LiveState::Ready);
    // pagination metadata comes from the replacement fetch only
    assert_eq!(snapshot.pagination.total, 7);
    assert_eq!(snapshot.pagination.limit, 5);
    // the stale response still reached the cache and re-derivation
    assert_eq!(store.cache().record_count("things").unwrap(), 2);
    assert_eq!(snapshot.items.len(), 2);
    assert_eq!(mock.calls().find, 2);
}

#[tokio::test(start_paused = true)]
async fn live_items_follow_committed_mutations_without_refetching() {
    let (store, mock) = store();
    mock.push_find(Ok(FindResponse::Records(vec![record(
        json!({"id": 1, "a": 1}),
    )])));

    let live = store
        .live("things", LiveOptions::find(params(json!({"a": 1}))))
        .unwrap();
    let mut rx = live.watch();
    while live.state() != LiveState::Ready {
        rx.changed().await.unwrap();
    }
    assert_eq!(live.snapshot().items.len(), 1);

    store
        .commit(
            "things",
            Mutation::Update(vec![
                record(json!({"id": 5, "a": 1})),
                record(json!({"id": 6, "a": 2})),
            ]),
        )
        .unwrap();

    // the matching commit joins the items; the non-matching one does not
    let items = live.snapshot().items;
    let ids: Vec<Value> = items.iter().map(|r| r["id"].clone()).collect();
    assert_eq!(ids, vec![json!(1), json!(5)]);
    assert_eq!(mock.calls().find, 1);
}

#[tokio::test(start_paused = true)]
async fn live_get_wraps_one_record_and_errors_are_not_terminal() {
    let (store, mock) = store();
    mock.push_get(Err(RemoteError::not_found("no thing 9")));
    mock.push_get(Ok(record(json!({"id": 9, "a": 9}))));

    let live = store
        .live("things", LiveOptions::get(json!(9), Params::empty()))
        .unwrap();
    let mut rx = live.watch();
    while live.state() != LiveState::Error {
        rx.changed().await.unwrap();
    }
    let failed = live.snapshot();
    assert!(failed.items.is_empty());
    assert!(failed.error.as_ref().is_some_and(|e| e.is_not_found()));

    // the query stays usable after a failure
    live.refetch();
    while live.state() != LiveState::Ready {
        rx.changed().await.unwrap();
    }
    let snapshot = live.snapshot();
    assert_eq!(snapshot.items.len(), 1);
    assert_eq!(snapshot.items[0]["id"], json!(9));
    assert!(snapshot.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn hook_failures_are_swallowed() {
    let (store, mock) = store();
    mock.push_find(Ok(FindResponse::Records(vec![
        record(json!({"id": 1})),
        record(json!({"id": 2})),
    ])));

    let ran = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ran);
    let live = store
        .live(
            "things",
            LiveOptions::find(Params::empty()).with_hook(move |item| {
                counter.fetch_add(1, Ordering::SeqCst);
                if item["id"] == json!(2) {
                    Err("refusing item 2".into())
                } else {
                    Ok(())
                }
            }),
        )
        .unwrap();

    let mut rx = live.watch();
    while live.state() != LiveState::Ready {
        rx.changed().await.unwrap();
    }
    assert_eq!(ran.load(Ordering::SeqCst), 2);
    assert_eq!(live.snapshot().items.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_live_query_detaches_from_the_feed() {
    let (store, mock) = store();
    mock.push_find(Ok(FindResponse::Records(vec![])));

    let live = store
        .live("things", LiveOptions::find(Params::empty()))
        .unwrap();
    let mut rx = live.watch();
    while live.state() != LiveState::Ready {
        rx.changed().await.unwrap();
    }
    drop(live);

    // commits after the drop must not publish to the stale channel
    store
        .commit(
            "things",
            Mutation::Update(vec![record(json!({"id": 1}))]),
        )
        .unwrap();
    assert!(rx.has_changed().is_err() || !rx.has_changed().unwrap());
}
