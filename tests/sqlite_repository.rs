use std::sync::Arc;

use tempfile::tempdir;

use quillpad::{
    autosave::{events::SaveOutcome, handle::open_work},
    codec,
    config::EditorConfig,
    persist::{
        PersistError, WorkRepository,
        local::{LocalStore, Preferences, SqliteLocalStore},
        sqlite::SqliteRepository,
    },
    types::{FunctionType, SortOrder},
    work::{ArchiveCategory, TemplateContent, WorkDraft},
};

fn draft(content: &str) -> WorkDraft {
    WorkDraft {
        title: "Night Train".to_string(),
        kind: "novel".to_string(),
        content: content.to_string(),
    }
}

#[tokio::test]
async fn works_survive_reopen_through_the_autosave_actor() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("quillpad.db");

    let id = {
        let repo = Arc::new(SqliteRepository::open(&path).expect("open"));
        let work = repo.create_work(draft("an old plain draft")).await.expect("create");

        let editor = open_work(repo.clone(), work.id, &EditorConfig::default())
            .await
            .expect("open work");
        let chapters = editor.chapters().await.expect("chapters");
        assert_eq!(chapters[0].content, "an old plain draft");

        editor.edit_title(0, "Platform").await.expect("edit");
        editor.add_chapter().await.expect("add chapter");
        editor.edit_content(1, "Second stop.").await.expect("edit");
        assert!(matches!(
            editor.save_now().await.expect("save"),
            SaveOutcome::Written { .. }
        ));
        editor.shutdown().await.expect("shutdown");
        work.id
    };

    let repo = SqliteRepository::open(&path).expect("reopen");
    let stored = repo.get_work_by_id(id).await.expect("get").expect("row");
    let chapters = codec::parse(&stored.content).expect("parse");
    assert_eq!(chapters.len(), 2);
    assert_eq!(chapters[0].title, "Platform");
    assert_eq!(chapters[0].content, "an old plain draft");
    assert_eq!(chapters[1].content, "Second stop.");
}

#[tokio::test]
async fn updating_a_missing_work_fails() {
    let repo = SqliteRepository::open_in_memory().expect("open");
    let mut work = repo.create_work(draft("")).await.expect("create");
    work.id += 100;

    let err = repo.update_work(&work).await.expect_err("missing");
    assert!(matches!(err, PersistError::MissingWork(id) if id == work.id));
    assert!(repo.get_work_by_id(work.id).await.expect("get").is_none());
}

#[tokio::test]
async fn templates_are_classified_on_read() {
    let repo = SqliteRepository::open_in_memory().expect("open");
    let plain = repo
        .insert_template("Continue", "Keep writing in the same voice.", FunctionType::Writing)
        .await
        .expect("insert");
    let secret = repo
        .insert_template("House style", "U2FsdGVkX19vcGFxdWU=", FunctionType::Writing)
        .await
        .expect("insert");
    repo.insert_template("Tighten", "Cut filler.", FunctionType::Polishing)
        .await
        .expect("insert");

    let writing = repo.templates_for(FunctionType::Writing).await.expect("templates");
    assert_eq!(writing.len(), 2);
    assert_eq!(
        writing[0].content,
        TemplateContent::Plain("Keep writing in the same voice.".to_string())
    );
    assert_eq!(writing[1].content, TemplateContent::EncryptedRef(secret.id));
    assert_eq!(writing[0].id, plain.id);

    let analysis = repo.templates_for(FunctionType::Analysis).await.expect("templates");
    assert!(analysis.is_empty());
}

#[tokio::test]
async fn archives_are_scoped_to_their_work() {
    let repo = SqliteRepository::open_in_memory().expect("open");
    let a = repo.create_work(draft("")).await.expect("create");
    let b = repo.create_work(draft("")).await.expect("create");

    repo.insert_archive(a.id, "Lin", "Conductor.", ArchiveCategory::Character)
        .await
        .expect("insert");
    repo.insert_archive(a.id, "Harbin", "Cold.", ArchiveCategory::Other("setting".to_string()))
        .await
        .expect("insert");
    repo.insert_archive(b.id, "Elsewhere", "-", ArchiveCategory::Introduction)
        .await
        .expect("insert");

    let archives = repo.archives_for_work(a.id).await.expect("archives");
    assert_eq!(archives.len(), 2);
    assert_eq!(archives[0].category, ArchiveCategory::Character);
    assert_eq!(archives[1].category, ArchiveCategory::Other("setting".to_string()));
}

#[tokio::test]
async fn key_assignment_prefers_least_used_key_and_counts_usage() {
    let repo = SqliteRepository::open_in_memory().expect("open");
    let first = repo.insert_pool_key("key-a").await.expect("insert");
    let second = repo.insert_pool_key("key-b").await.expect("insert");

    assert!(!repo.increment_key_usage("ann").await.expect("usage"));

    let ann = repo.assign_key("ann").await.expect("assign").expect("assignment");
    assert_eq!(ann.key_id, first.id);
    assert!(repo.increment_key_usage("ann").await.expect("usage"));
    assert!(repo.increment_key_usage("ann").await.expect("usage"));

    let bo = repo.assign_key("bo").await.expect("assign").expect("assignment");
    assert_eq!(bo.key_id, second.id);

    // assignment is sticky
    let again = repo.assign_key("ann").await.expect("assign").expect("assignment");
    assert_eq!(again.id, ann.id);

    let stored = repo.key_assignment("ann").await.expect("get").expect("assignment");
    assert_eq!(stored.usage_count, 2);
    assert!(stored.last_used.is_some());

    let pool = repo.key_pool().await.expect("pool");
    assert_eq!(pool[0].usage_count, 2);
    assert_eq!(pool[1].usage_count, 0);
}

#[test]
fn sqlite_local_store_backs_preferences() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("local.db");

    {
        let store = Arc::new(SqliteLocalStore::open(&path).expect("open"));
        let prefs = Preferences::new(store.clone());
        prefs.set_sidebar_collapsed(true).expect("set");
        prefs.set_chapter_order(7, SortOrder::Descending).expect("set");
        assert!(prefs.toggle_page_width_mode().expect("toggle"));
        store.set("scratch", "1").expect("set");
        store.remove("scratch").expect("remove");
    }

    let store = Arc::new(SqliteLocalStore::open(&path).expect("reopen"));
    let prefs = Preferences::new(store.clone());
    assert!(prefs.sidebar_collapsed().expect("get"));
    assert!(prefs.page_width_mode().expect("get"));
    assert_eq!(prefs.chapter_order(7).expect("get"), SortOrder::Descending);
    assert_eq!(prefs.chapter_order(8).expect("get"), SortOrder::Ascending);
    assert_eq!(store.get("scratch").expect("get"), None);
}
