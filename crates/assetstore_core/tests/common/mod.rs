#![allow(dead_code)]

use assetstore_core::{
    AssetEvent, AssetEventHandler, AssetEventKind, AssetStore, HandlerError, MediaPackageId,
    Property, PropertyName, SnapshotPayload, StoreConfig,
};
use parking_lot::Mutex;
use std::sync::Arc;

pub const OWNER: &str = "test-owner";

/// Handler that records every event it receives.
pub struct RecordingHandler {
    name: String,
    events: Mutex<Vec<AssetEvent>>,
    fail_on: Option<AssetEventKind>,
}

impl RecordingHandler {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            events: Mutex::new(Vec::new()),
            fail_on: None,
        })
    }

    pub fn failing_on(name: &str, kind: AssetEventKind) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            events: Mutex::new(Vec::new()),
            fail_on: Some(kind),
        })
    }

    pub fn events(&self) -> Vec<AssetEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, kind: AssetEventKind) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| event.kind() == kind)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl AssetEventHandler for RecordingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, event: &AssetEvent) -> Result<(), HandlerError> {
        self.events.lock().push(event.clone());
        if self.fail_on == Some(event.kind()) {
            return Err(HandlerError::new("downstream rejected event"));
        }
        Ok(())
    }
}

pub fn open_store() -> AssetStore {
    AssetStore::open(StoreConfig::in_memory()).unwrap()
}

pub fn agent_property() -> PropertyName {
    PropertyName::new("org.opencastproject.capture", "agent")
}

/// Creates `entities` packages with `versions` snapshots each and returns their ids.
pub fn populate(
    store: &AssetStore,
    owner: &str,
    entities: usize,
    versions: usize,
) -> Vec<MediaPackageId> {
    (0..entities)
        .map(|index| {
            let id = MediaPackageId::new(format!("mp-{index}"));
            for version in 0..versions {
                store
                    .take_snapshot(
                        &id,
                        owner,
                        &SnapshotPayload::new(format!("file:///packages/{index}/{version}.xml")),
                    )
                    .unwrap();
            }
            id
        })
        .collect()
}

pub fn tag_agent(store: &AssetStore, id: &MediaPackageId, agent: &str) {
    let property: Property = agent_property().property(id, agent);
    assert!(store.set_property(&property).unwrap());
}
