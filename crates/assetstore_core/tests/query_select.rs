mod common;

use assetstore_core::{MediaPackageId, SnapshotPayload, StoreError, FIRST_VERSION};
use common::{agent_property, open_store, populate, tag_agent, OWNER};

#[test]
fn taken_snapshot_is_selectable_as_latest() {
    let store = open_store();
    let id = MediaPackageId::generate();
    let payload = SnapshotPayload::new("file:///packages/new.xml").archived(true);
    let taken = store.take_snapshot(&id, OWNER, &payload).unwrap();
    assert_eq!(taken.version, FIRST_VERSION);

    let q = store.create_query(OWNER);
    let selected = q
        .select(q.snapshot())
        .where_(q.media_package_id(&id).and(q.version().is_latest()))
        .run()
        .unwrap();

    assert_eq!(selected, vec![taken]);
    assert_eq!(selected[0].payload_ref, "file:///packages/new.xml");
    assert!(selected[0].archived);
}

#[test]
fn latest_is_evaluated_per_package() {
    let store = open_store();
    let ids = populate(&store, OWNER, 2, 3);
    store
        .take_snapshot(&ids[1], OWNER, &SnapshotPayload::new("file:///extra.xml"))
        .unwrap();

    let q = store.create_query(OWNER);
    let latest = q
        .select(q.snapshot())
        .where_(q.version().is_latest())
        .run()
        .unwrap();
    let keys: Vec<(String, u32)> = latest
        .iter()
        .map(|snapshot| (snapshot.media_package_id.to_string(), snapshot.version))
        .collect();
    assert_eq!(
        keys,
        vec![("mp-0".to_string(), 3), ("mp-1".to_string(), 4)]
    );
}

#[test]
fn count_matches_select_length() {
    let store = open_store();
    let ids = populate(&store, OWNER, 3, 2);
    tag_agent(&store, &ids[2], "agent-7");

    let q = store.create_query(OWNER);
    assert_eq!(q.count(q.snapshot()).run().unwrap(), 6);

    let not_tagged = !q.property(&agent_property()).exists();
    let selected = q
        .select(q.snapshot())
        .where_(not_tagged.clone())
        .run()
        .unwrap();
    assert_eq!(selected.len(), 4);
    assert_eq!(
        q.count(q.snapshot()).where_(not_tagged).run().unwrap(),
        selected.len()
    );
}

#[test]
fn version_equality_and_queries_do_not_mutate() {
    let store = open_store();
    let ids = populate(&store, OWNER, 1, 3);

    let q = store.create_query(OWNER);
    let second = q
        .select(q.snapshot())
        .where_(q.version().eq(2))
        .run()
        .unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].media_package_id, ids[0]);

    assert_eq!(q.count(q.snapshot()).run().unwrap(), 3);
}

#[test]
fn versions_are_never_reused_after_delete() {
    let store = open_store();
    let ids = populate(&store, OWNER, 1, 2);

    let q = store.create_query(OWNER);
    q.delete(q.snapshot())
        .where_(q.version().is_latest())
        .run()
        .unwrap();

    let next = store
        .take_snapshot(&ids[0], OWNER, &SnapshotPayload::new("file:///again.xml"))
        .unwrap();
    assert_eq!(next.version, 3);
    assert!(store.get_snapshot(&ids[0], 2).unwrap().is_none());
    assert!(store.get_snapshot(&ids[0], 1).unwrap().is_some());
}

#[test]
fn empty_owner_and_blank_payload_are_rejected() {
    let store = open_store();
    let q = store.create_query("");
    assert!(matches!(
        q.select(q.snapshot()).run(),
        Err(StoreError::InvalidQuery(_))
    ));

    let error = store
        .take_snapshot(&MediaPackageId::new("mp"), OWNER, &SnapshotPayload::new("  "))
        .unwrap_err();
    assert!(matches!(error, StoreError::Repo(_)));
}

#[test]
fn closed_store_rejects_operations() {
    let store = open_store();
    populate(&store, OWNER, 1, 1);
    store.close().unwrap();
    assert!(!store.is_open());

    let q = store.create_query(OWNER);
    assert!(matches!(
        q.count(q.snapshot()).run(),
        Err(StoreError::Closed)
    ));
    store.close().unwrap();
}
