use domain::{SourceKind, Tag};
use scada_storage::{InMemoryTagStore, TagStore};

#[tokio::test]
async fn tag_store_lists_by_id_and_tracks_updates() {
    let store = InMemoryTagStore::with_tags(vec![
        Tag::new(2, "b", SourceKind::Simulated),
        Tag::new(1, "a", SourceKind::ModbusTcp),
    ]);
    let tags = store.list_tags().await.expect("list");
    assert_eq!(tags.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 2]);

    let mut disabled = Tag::new(2, "b", SourceKind::Simulated);
    disabled.enabled = false;
    store.upsert(disabled).expect("upsert");
    assert!(store.remove(1).expect("remove"));

    let tags = store.list_tags().await.expect("list");
    assert_eq!(tags.len(), 1);
    assert!(!tags[0].enabled);
}
