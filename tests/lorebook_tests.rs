// Lore engine behavior through the service and store.

use fabula_core::models::{ChatMessage, LorePlacement, NewLorebookEntry};
use fabula_core::storage::LorebookStore;
use fabula_core::test_helpers::{new_entry, new_lorebook, test_app};

#[tokio::test]
async fn test_no_active_lorebook_is_feature_absent() {
    let app = test_app();
    let active = app.state.lorebooks.load_active(Some(1)).await.unwrap();
    assert!(active.is_none());
}

#[tokio::test]
async fn test_triggered_entries_end_to_end() {
    let app = test_app();
    let lorebook = app
        .store
        .create_lorebook(new_lorebook(None, "Shared world"))
        .await
        .unwrap();

    app.store
        .create_entry(new_entry(lorebook.id, &["dragon"], "Dragons are ancient.", 200))
        .await
        .unwrap();
    app.store
        .create_entry(new_entry(lorebook.id, &["dragon"], "Dragons breathe fire.", 50))
        .await
        .unwrap();
    app.store
        .create_entry(NewLorebookEntry {
            lorebook_id: lorebook.id,
            content: "The realm is called Veyra.".to_string(),
            is_constant: true,
            insertion_order: 10,
            ..NewLorebookEntry::default()
        })
        .await
        .unwrap();
    let mut disabled = new_entry(lorebook.id, &["dragon"], "Stale dragon lore.", 5);
    disabled.is_enabled = false;
    app.store.create_entry(disabled).await.unwrap();

    let history = vec![
        ChatMessage::user("I heard dragons live beyond the pass"),
        ChatMessage::assistant("They do."),
    ];
    let triggered = app
        .state
        .lorebooks
        .triggered_entries(lorebook.id, &history)
        .await
        .unwrap();

    let contents: Vec<&str> = triggered.iter().map(|e| e.content.as_str()).collect();
    assert_eq!(
        contents,
        vec![
            "The realm is called Veyra.",
            "Dragons breathe fire.",
            "Dragons are ancient.",
        ]
    );
}

#[tokio::test]
async fn test_no_matches_yields_constant_entries_only() {
    let app = test_app();
    let lorebook = app
        .store
        .create_lorebook(new_lorebook(None, "World"))
        .await
        .unwrap();
    app.store
        .create_entry(new_entry(lorebook.id, &["dragon"], "Keyed entry.", 100))
        .await
        .unwrap();
    app.store
        .create_entry(NewLorebookEntry {
            lorebook_id: lorebook.id,
            content: "Always present.".to_string(),
            is_constant: true,
            ..NewLorebookEntry::default()
        })
        .await
        .unwrap();

    let history = vec![ChatMessage::user("nothing relevant here")];
    let triggered = app
        .state
        .lorebooks
        .triggered_entries(lorebook.id, &history)
        .await
        .unwrap();
    assert_eq!(triggered.len(), 1);
    assert_eq!(triggered[0].content, "Always present.");
}

#[tokio::test]
async fn test_selective_entry_via_secondary_key() {
    let app = test_app();
    let lorebook = app
        .store
        .create_lorebook(new_lorebook(None, "World"))
        .await
        .unwrap();
    app.store
        .create_entry(NewLorebookEntry {
            lorebook_id: lorebook.id,
            keys: vec!["queen".to_string()],
            secondary_keys: vec!["castle".to_string()],
            content: "Queen Maren rules from Highspire.".to_string(),
            is_selective: true,
            ..NewLorebookEntry::default()
        })
        .await
        .unwrap();

    let history = vec![ChatMessage::user("we ride for the castle at dawn")];
    let triggered = app
        .state
        .lorebooks
        .triggered_entries(lorebook.id, &history)
        .await
        .unwrap();
    assert_eq!(triggered.len(), 1);
}

#[tokio::test]
async fn test_placement_survives_round_trip() {
    let app = test_app();
    let lorebook = app
        .store
        .create_lorebook(new_lorebook(None, "World"))
        .await
        .unwrap();
    let created = app
        .store
        .create_entry(NewLorebookEntry {
            lorebook_id: lorebook.id,
            content: "Tail lore.".to_string(),
            is_constant: true,
            placement: LorePlacement::AfterCharacter,
            ..NewLorebookEntry::default()
        })
        .await
        .unwrap();

    let fetched = app.store.list_entries(lorebook.id).await.unwrap();
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].id, created.id);
    assert_eq!(fetched[0].placement, LorePlacement::AfterCharacter);
}
