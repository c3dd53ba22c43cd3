mod common;

use assetstore_core::{
    AssetEvent, AssetEventKind, AssetStore, CascadeEventPolicy, MediaPackageId, SnapshotPayload,
    StoreConfig,
};
use common::{agent_property, open_store, populate, tag_agent, RecordingHandler, OWNER};
use std::sync::Arc;

struct Fixture {
    store: AssetStore,
    first: Arc<RecordingHandler>,
    second: Arc<RecordingHandler>,
    ids: Vec<MediaPackageId>,
}

fn fixture(entities: usize, versions: usize) -> Fixture {
    fixture_with(open_store(), entities, versions)
}

fn fixture_with(store: AssetStore, entities: usize, versions: usize) -> Fixture {
    let first = RecordingHandler::new("first");
    let second = RecordingHandler::new("second");
    store.add_event_handler(first.clone()).unwrap();
    store.add_event_handler(second.clone()).unwrap();
    let ids = populate(&store, OWNER, entities, versions);
    Fixture {
        store,
        first,
        second,
        ids,
    }
}

impl Fixture {
    fn assert_counts(&self, created: usize, snapshot_deleted: usize, entity_deleted: usize) {
        for handler in [&self.first, &self.second] {
            assert_eq!(handler.count(AssetEventKind::EntityCreated), created);
            assert_eq!(
                handler.count(AssetEventKind::SnapshotDeleted),
                snapshot_deleted
            );
            assert_eq!(handler.count(AssetEventKind::EntityDeleted), entity_deleted);
        }
    }
}

#[test]
fn snapshot_creation_notifies_every_handler_once_per_version() {
    let fx = fixture(3, 2);
    fx.assert_counts(6, 0, 0);
    assert_eq!(fx.first.events(), fx.second.events());
}

#[test]
fn deleting_single_snapshot_emits_entity_deleted() {
    let fx = fixture(1, 1);
    let q = fx.store.create_query(OWNER);
    let outcome = q.delete(q.snapshot()).run().unwrap();

    assert_eq!(outcome.removed, 1);
    fx.assert_counts(1, 0, 1);
}

#[test]
fn deleting_all_versions_by_id_emits_one_entity_deleted() {
    let fx = fixture(2, 1);
    let q = fx.store.create_query(OWNER);
    q.delete(q.snapshot())
        .where_(q.media_package_id(&fx.ids[0]))
        .run()
        .unwrap();
    fx.assert_counts(2, 0, 1);

    let fx = fixture(3, 2);
    let q = fx.store.create_query(OWNER);
    let outcome = q
        .delete(q.snapshot())
        .where_(q.media_package_id(&fx.ids[0]))
        .run()
        .unwrap();
    assert_eq!(outcome.removed, 2);
    assert_eq!(
        outcome.events,
        vec![AssetEvent::EntityDeleted {
            media_package_id: fx.ids[0].clone()
        }]
    );
    fx.assert_counts(6, 0, 1);
}

#[test]
fn deleting_latest_of_one_package_emits_snapshot_deleted() {
    let fx = fixture(3, 2);
    let q = fx.store.create_query(OWNER);
    let outcome = q
        .delete(q.snapshot())
        .where_(q.media_package_id(&fx.ids[0]).and(q.version().is_latest()))
        .run()
        .unwrap();

    assert_eq!(
        outcome.events,
        vec![AssetEvent::SnapshotDeleted {
            media_package_id: fx.ids[0].clone(),
            version: 2
        }]
    );
    fx.assert_counts(6, 1, 0);
}

#[test]
fn deleting_latest_of_two_packages_emits_two_snapshot_deleted() {
    let fx = fixture(3, 2);
    let q = fx.store.create_query(OWNER);
    q.delete(q.snapshot())
        .where_(
            q.media_package_id(&fx.ids[0])
                .or(q.media_package_id(&fx.ids[1]))
                .and(q.version().is_latest()),
        )
        .run()
        .unwrap();
    fx.assert_counts(6, 2, 0);
}

#[test]
fn deleting_latest_everywhere_emits_one_snapshot_deleted_per_package() {
    let fx = fixture(3, 2);
    let q = fx.store.create_query(OWNER);
    let outcome = q
        .delete(q.snapshot())
        .where_(q.version().is_latest())
        .run()
        .unwrap();

    assert_eq!(outcome.removed, 3);
    assert!(outcome.affected.iter().all(|entity| !entity.is_exhausted()));
    fx.assert_counts(6, 3, 0);

    let q = fx.store.create_query(OWNER);
    assert_eq!(q.count(q.snapshot()).run().unwrap(), 3);
}

#[test]
fn deleting_by_property_exhausts_tagged_packages() {
    let fx = fixture(3, 2);
    for id in &fx.ids {
        tag_agent(&fx.store, id, "agent-1");
    }
    let q = fx.store.create_query(OWNER);
    q.delete(q.snapshot())
        .where_(q.property(&agent_property()).eq("agent-1"))
        .run()
        .unwrap();
    fx.assert_counts(6, 0, 3);

    let fx = fixture(2, 9);
    for id in &fx.ids {
        tag_agent(&fx.store, id, "agent-1");
    }
    let q = fx.store.create_query(OWNER);
    let outcome = q
        .delete(q.snapshot())
        .where_(q.prop("org.opencastproject.capture", "agent").exists())
        .run()
        .unwrap();
    assert_eq!(outcome.removed, 18);
    fx.assert_counts(18, 0, 2);
}

#[test]
fn deleting_by_property_touches_only_matching_packages() {
    let fx = fixture(5, 3);
    tag_agent(&fx.store, &fx.ids[1], "agent-1");
    tag_agent(&fx.store, &fx.ids[3], "agent-1");
    tag_agent(&fx.store, &fx.ids[4], "agent-2");

    let q = fx.store.create_query(OWNER);
    let outcome = q
        .delete(q.snapshot())
        .where_(q.prop("org.opencastproject.capture", "agent").eq("agent-1"))
        .run()
        .unwrap();

    assert_eq!(outcome.removed, 6);
    assert_eq!(
        outcome.events,
        vec![
            AssetEvent::EntityDeleted {
                media_package_id: fx.ids[1].clone()
            },
            AssetEvent::EntityDeleted {
                media_package_id: fx.ids[3].clone()
            },
        ]
    );
    fx.assert_counts(15, 0, 2);

    let q = fx.store.create_query(OWNER);
    assert_eq!(q.count(q.snapshot()).run().unwrap(), 9);
    for id in [&fx.ids[0], &fx.ids[2], &fx.ids[4]] {
        let q = fx.store.create_query(OWNER);
        let remaining = q
            .count(q.snapshot())
            .where_(q.media_package_id(id))
            .run()
            .unwrap();
        assert_eq!(remaining, 3);
    }
}

#[test]
fn property_mismatch_deletes_nothing() {
    let fx = fixture(2, 2);
    tag_agent(&fx.store, &fx.ids[0], "agent-1");
    let q = fx.store.create_query(OWNER);
    let outcome = q
        .delete(q.snapshot())
        .where_(q.property(&agent_property()).eq("agent-2"))
        .run()
        .unwrap();

    assert_eq!(outcome.removed, 0);
    assert!(outcome.events.is_empty());
    fx.assert_counts(4, 0, 0);
}

#[test]
fn repeated_delete_emits_nothing_the_second_time() {
    let fx = fixture(3, 2);
    let q = fx.store.create_query(OWNER);
    q.delete(q.snapshot())
        .where_(q.media_package_id(&fx.ids[1]))
        .run()
        .unwrap();

    let q = fx.store.create_query(OWNER);
    let again = q
        .delete(q.snapshot())
        .where_(q.media_package_id(&fx.ids[1]))
        .run()
        .unwrap();
    assert_eq!(again.removed, 0);
    fx.assert_counts(6, 0, 1);
}

#[test]
fn partial_then_final_delete_emits_entity_deleted_last() {
    let fx = fixture(1, 2);
    let q = fx.store.create_query(OWNER);
    q.delete(q.snapshot())
        .where_(q.version().eq(1))
        .run()
        .unwrap();
    fx.assert_counts(2, 1, 0);

    let q = fx.store.create_query(OWNER);
    q.delete(q.snapshot()).run().unwrap();
    fx.assert_counts(2, 1, 1);
}

#[test]
fn other_owners_are_untouched() {
    let fx = fixture(2, 2);
    fx.store
        .take_snapshot(
            &MediaPackageId::new("foreign"),
            "other-owner",
            &SnapshotPayload::new("file:///foreign.xml"),
        )
        .unwrap();
    fx.first.clear();
    fx.second.clear();

    let q = fx.store.create_query("other-owner");
    let outcome = q.delete(q.snapshot()).run().unwrap();
    assert_eq!(outcome.removed, 1);
    fx.assert_counts(0, 0, 1);

    let q = fx.store.create_query(OWNER);
    assert_eq!(q.count(q.snapshot()).run().unwrap(), 4);
}

#[test]
fn expand_policy_reports_every_version_before_entity_deleted() {
    let store =
        AssetStore::open(StoreConfig::in_memory().event_policy(CascadeEventPolicy::Expand))
            .unwrap();
    let fx = fixture_with(store, 3, 2);
    let q = fx.store.create_query(OWNER);
    let outcome = q
        .delete(q.snapshot())
        .where_(q.media_package_id(&fx.ids[2]))
        .run()
        .unwrap();

    let id = fx.ids[2].clone();
    assert_eq!(
        outcome.events,
        vec![
            AssetEvent::SnapshotDeleted {
                media_package_id: id.clone(),
                version: 1
            },
            AssetEvent::SnapshotDeleted {
                media_package_id: id.clone(),
                version: 2
            },
            AssetEvent::EntityDeleted {
                media_package_id: id
            },
        ]
    );
    fx.assert_counts(6, 2, 1);
}

#[test]
fn invalid_owner_is_rejected_before_mutation() {
    let fx = fixture(1, 1);
    let q = fx.store.create_query("   ");
    let error = q.delete(q.snapshot()).run().unwrap_err();
    assert!(matches!(error, assetstore_core::StoreError::InvalidQuery(_)));
    fx.assert_counts(1, 0, 0);
}

#[test]
fn deleting_latest_of_single_version_packages_exhausts_them() {
    let fx = fixture(3, 1);
    let q = fx.store.create_query(OWNER);
    q.delete(q.snapshot())
        .where_(q.version().is_latest())
        .run()
        .unwrap();
    fx.assert_counts(3, 0, 3);
}

#[test]
fn deleting_each_package_by_id_emits_one_event_per_package() {
    let fx = fixture(4, 3);
    for id in &fx.ids {
        let q = fx.store.create_query(OWNER);
        q.delete(q.snapshot())
            .where_(q.media_package_id(id))
            .run()
            .unwrap();
    }
    fx.assert_counts(12, 0, 4);
    assert_eq!(fx.first.events().len(), 12 + 4);
}
