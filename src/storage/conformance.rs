//! Behavioural tests shared by every driver.
//!
//! Each function takes a freshly initialized, empty store. Drivers run the
//! whole set through [`conformance_suite!`]:
//!
//! ```ignore
//! crate::storage::conformance::conformance_suite!(memory_storage());
//! ```

use super::{CleanupKind, Storage};
use crate::error::Error;

use std::thread::sleep;
use std::time::Duration;
use uuid::Uuid;

// Keeps creation timestamps strictly increasing on fast backends.
fn tick() {
    sleep(Duration::from_millis(2));
}

pub fn create_thread_is_idempotent(store: &dyn Storage) {
    let first = store.create_thread("/path/").unwrap();
    let second = store.create_thread("/path/").unwrap();
    assert_eq!(first, second);

    let thread = store.get_thread("/path/").unwrap();
    assert_eq!(thread.id, first);
    assert_eq!(thread.path, "/path/");
    assert_eq!(store.get_all_threads().unwrap().len(), 1);
}

pub fn get_thread_not_found(store: &dyn Storage) {
    let err = store.get_thread("/nope/").unwrap_err();
    assert!(matches!(err, Error::ThreadNotFound { ref path } if path == "/nope/"));
    assert!(err.is_not_found());
}

pub fn create_comment_creates_thread(store: &dyn Storage) {
    let id = store.create_comment("hi", "bob", "/test", true, None).unwrap();

    let thread = store.get_thread("/test").unwrap();
    let comments = store.get_comments_by_thread("/test").unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].id, id);
    assert_eq!(comments[0].thread_id, thread.id);
    assert_eq!(comments[0].body, "hi");
    assert_eq!(comments[0].author, "bob");
    assert_eq!(comments[0].reply_to, None);
    assert_eq!(comments[0].deleted_at, None);
}

pub fn create_comment_reuses_thread(store: &dyn Storage) {
    let thread_id = store.create_thread("/existing/").unwrap();
    let id = store
        .create_comment("body", "author", "/existing/", true, None)
        .unwrap();
    assert_eq!(store.get_comment(id).unwrap().thread_id, thread_id);
    assert_eq!(store.get_all_threads().unwrap().len(), 1);
}

pub fn reply_to_missing_comment_fails(store: &dyn Storage) {
    let missing = Uuid::new_v4();
    let err = store
        .create_comment("body", "author", "/new/", true, Some(missing))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRelationship { reply_to } if reply_to == missing));
}

pub fn reply_is_stored(store: &dyn Storage) {
    let parent = store.create_comment("parent", "a", "/r/", true, None).unwrap();
    let reply = store
        .create_comment("reply", "b", "/r/", true, Some(parent))
        .unwrap();
    assert_eq!(store.get_comment(reply).unwrap().reply_to, Some(parent));
}

pub fn reply_to_reply_is_flattened(store: &dyn Storage) {
    let top = store.create_comment("top", "a", "/flat/", true, None).unwrap();
    let reply = store
        .create_comment("reply", "b", "/flat/", true, Some(top))
        .unwrap();
    let nested = store
        .create_comment("nested", "c", "/flat/", true, Some(reply))
        .unwrap();

    let stored = store.get_comment(nested).unwrap();
    assert_eq!(stored.reply_to, Some(top));
    assert_ne!(stored.reply_to, Some(reply));
}

pub fn reply_across_threads_fails(store: &dyn Storage) {
    let elsewhere = store.create_comment("a", "a", "/one/", true, None).unwrap();
    store.create_thread("/two/").unwrap();

    let err = store
        .create_comment("b", "b", "/two/", true, Some(elsewhere))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRelationship { reply_to } if reply_to == elsewhere));
    assert!(store.get_comments_by_thread("/two/").unwrap().is_empty());
}

pub fn get_comment_not_found(store: &dyn Storage) {
    let id = Uuid::new_v4();
    let err = store.get_comment(id).unwrap_err();
    assert!(matches!(err, Error::CommentNotFound { id: missing } if missing == id));
}

pub fn comments_by_missing_thread_fails(store: &dyn Storage) {
    let err = store.get_comments_by_thread("/ghost/").unwrap_err();
    assert!(matches!(err, Error::ThreadNotFound { .. }));
}

pub fn comments_by_empty_thread_is_empty(store: &dyn Storage) {
    store.create_thread("/empty/").unwrap();
    assert!(store.get_comments_by_thread("/empty/").unwrap().is_empty());
}

pub fn unconfirmed_hidden_from_thread_listing(store: &dyn Storage) {
    let id = store
        .create_comment("pending", "eve", "/moderated/", false, None)
        .unwrap();

    assert!(store.get_comments_by_thread("/moderated/").unwrap().is_empty());
    let all = store.get_all_comments().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, id);
    assert!(!all[0].confirmed);
}

pub fn comments_listed_oldest_first(store: &dyn Storage) {
    let mut ids = Vec::new();
    for i in 0..4 {
        ids.push(
            store
                .create_comment(&format!("c{i}"), "a", "/ordered/", true, None)
                .unwrap(),
        );
        tick();
    }
    store.create_comment("hidden", "a", "/ordered/", false, None).unwrap();

    let listed: Vec<Uuid> = store
        .get_comments_by_thread("/ordered/")
        .unwrap()
        .iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(listed, ids);
}

pub fn update_comment_replaces_fields(store: &dyn Storage) {
    let id = store.create_comment("old", "alice", "/u/", false, None).unwrap();
    store.update_comment(id, "new", "bob", true).unwrap();

    let comment = store.get_comment(id).unwrap();
    assert_eq!(comment.body, "new");
    assert_eq!(comment.author, "bob");
    assert!(comment.confirmed);

    // Same values again must not look like a missing row.
    store.update_comment(id, "new", "bob", true).unwrap();
}

pub fn update_comment_not_found(store: &dyn Storage) {
    let err = store
        .update_comment(Uuid::new_v4(), "b", "a", true)
        .unwrap_err();
    assert!(matches!(err, Error::CommentNotFound { .. }));
}

pub fn delete_comment_cascades_to_replies(store: &dyn Storage) {
    let parent = store.create_comment("p", "a", "/d/", true, None).unwrap();
    let reply = store.create_comment("r", "b", "/d/", true, Some(parent)).unwrap();
    let sibling = store.create_comment("s", "c", "/d/", true, None).unwrap();

    store.delete_comment(parent).unwrap();

    assert!(store.get_comment(parent).unwrap().deleted_at.is_some());
    assert!(store.get_comment(reply).unwrap().deleted_at.is_some());
    assert!(store.get_comment(sibling).unwrap().deleted_at.is_none());

    let visible = store.get_comments_by_thread("/d/").unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, sibling);

    let all = store.get_all_comments().unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all.iter().filter(|c| c.deleted_at.is_some()).count(), 2);
}

pub fn delete_comment_not_found(store: &dyn Storage) {
    let err = store.delete_comment(Uuid::new_v4()).unwrap_err();
    assert!(matches!(err, Error::CommentNotFound { .. }));
}

pub fn restore_clears_deleted_at(store: &dyn Storage) {
    let id = store.create_comment("x", "a", "/restore/", true, None).unwrap();
    store.delete_comment(id).unwrap();
    assert!(store.get_comments_by_thread("/restore/").unwrap().is_empty());

    store.restore_deleted_comment(id).unwrap();
    assert!(store.get_comment(id).unwrap().deleted_at.is_none());
    assert_eq!(store.get_comments_by_thread("/restore/").unwrap().len(), 1);

    // Restoring a live comment is a no-op.
    store.restore_deleted_comment(id).unwrap();
}

pub fn restore_not_found(store: &dyn Storage) {
    let err = store.restore_deleted_comment(Uuid::new_v4()).unwrap_err();
    assert!(matches!(err, Error::CommentNotFound { .. }));
}

pub fn hard_delete_removes_replies(store: &dyn Storage) {
    let parent = store.create_comment("p", "a", "/hd/", true, None).unwrap();
    let reply = store.create_comment("r", "b", "/hd/", true, Some(parent)).unwrap();
    let other = store.create_comment("o", "c", "/hd/", true, None).unwrap();

    store.hard_delete_comment(parent).unwrap();

    assert!(matches!(store.get_comment(parent), Err(Error::CommentNotFound { .. })));
    assert!(matches!(store.get_comment(reply), Err(Error::CommentNotFound { .. })));
    assert!(store.get_comment(other).is_ok());
    assert_eq!(store.get_all_comments().unwrap().len(), 1);
}

pub fn hard_delete_not_found(store: &dyn Storage) {
    let err = store.hard_delete_comment(Uuid::new_v4()).unwrap_err();
    assert!(matches!(err, Error::CommentNotFound { .. }));
}

pub fn all_threads_listed_oldest_first(store: &dyn Storage) {
    let mut ids = Vec::new();
    for path in ["/c/", "/a/", "/b/"] {
        ids.push(store.create_thread(path).unwrap());
        tick();
    }
    let listed: Vec<Uuid> = store.get_all_threads().unwrap().iter().map(|t| t.id).collect();
    assert_eq!(listed, ids);
}

pub fn all_comments_include_hidden(store: &dyn Storage) {
    let confirmed = store.create_comment("c", "a", "/all/", true, None).unwrap();
    tick();
    let pending = store.create_comment("p", "a", "/all/", false, None).unwrap();
    tick();
    let deleted = store.create_comment("d", "a", "/other/", true, None).unwrap();
    store.delete_comment(deleted).unwrap();

    let all = store.get_all_comments().unwrap();
    let ids: Vec<Uuid> = all.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![confirmed, pending, deleted]);
    assert!(all[2].deleted_at.is_some());
}

pub fn cleanup_unconfirmed_keeps_confirmed(store: &dyn Storage) {
    let pending = store.create_comment("p", "a", "/clean/", false, None).unwrap();
    let approved = store.create_comment("c", "b", "/clean/", true, None).unwrap();
    tick();

    let removed = store.clean_up_stale_data(CleanupKind::Unconfirmed, 0).unwrap();
    assert_eq!(removed, 1);
    assert!(matches!(store.get_comment(pending), Err(Error::CommentNotFound { .. })));

    let visible = store.get_comments_by_thread("/clean/").unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, approved);
}

pub fn cleanup_unconfirmed_respects_threshold(store: &dyn Storage) {
    store.create_comment("p", "a", "/age/", false, None).unwrap();

    assert_eq!(store.clean_up_stale_data(CleanupKind::Unconfirmed, 100).unwrap(), 0);
    assert_eq!(store.get_all_comments().unwrap().len(), 1);

    assert_eq!(store.clean_up_stale_data(CleanupKind::Unconfirmed, -100).unwrap(), 1);
    assert!(store.get_all_comments().unwrap().is_empty());
}

pub fn cleanup_unconfirmed_skips_deleted(store: &dyn Storage) {
    let id = store.create_comment("p", "a", "/skip/", false, None).unwrap();
    store.delete_comment(id).unwrap();

    assert_eq!(store.clean_up_stale_data(CleanupKind::Unconfirmed, -100).unwrap(), 0);
    assert!(store.get_comment(id).is_ok());
}

pub fn cleanup_deleted_respects_threshold(store: &dyn Storage) {
    let deleted = store.create_comment("d", "a", "/del/", true, None).unwrap();
    let live = store.create_comment("l", "a", "/del/", true, None).unwrap();
    store.delete_comment(deleted).unwrap();

    assert_eq!(store.clean_up_stale_data(CleanupKind::Deleted, 100).unwrap(), 0);
    assert!(store.get_comment(deleted).is_ok());

    assert_eq!(store.clean_up_stale_data(CleanupKind::Deleted, -100).unwrap(), 1);
    assert!(matches!(store.get_comment(deleted), Err(Error::CommentNotFound { .. })));
    assert!(store.get_comment(live).is_ok());
}

pub fn cleanup_deleted_handles_cascaded_replies(store: &dyn Storage) {
    let parent = store.create_comment("p", "a", "/cascade/", true, None).unwrap();
    store.create_comment("r1", "b", "/cascade/", true, Some(parent)).unwrap();
    store.create_comment("r2", "c", "/cascade/", true, Some(parent)).unwrap();
    store.delete_comment(parent).unwrap();

    assert_eq!(store.clean_up_stale_data(CleanupKind::Deleted, -100).unwrap(), 3);
    assert!(store.get_all_comments().unwrap().is_empty());
    assert_eq!(store.get_all_threads().unwrap().len(), 1);
}

pub fn cleanup_saturates_extreme_thresholds(store: &dyn Storage) {
    let pending = store.create_comment("p", "a", "/far/", false, None).unwrap();
    let deleted = store.create_comment("d", "a", "/far/", true, None).unwrap();
    store.delete_comment(deleted).unwrap();

    for kind in [CleanupKind::Unconfirmed, CleanupKind::Deleted] {
        assert_eq!(store.clean_up_stale_data(kind, i64::MAX).unwrap(), 0);
        assert_eq!(store.clean_up_stale_data(kind, 10_000_000_000_000).unwrap(), 0);
    }
    assert!(store.get_comment(pending).is_ok());
    assert!(store.get_comment(deleted).is_ok());

    assert_eq!(store.clean_up_stale_data(CleanupKind::Unconfirmed, i64::MIN).unwrap(), 1);
    assert_eq!(store.clean_up_stale_data(CleanupKind::Deleted, i64::MIN).unwrap(), 1);
    assert!(store.get_all_comments().unwrap().is_empty());
}

pub fn import_preserves_ids_and_timestamps(store: &dyn Storage) {
    use crate::model::{Comment, Thread};

    let mut thread = Thread::new("/imported/".to_string());
    thread.created_at = chrono::DateTime::from_timestamp(1_500_000_000, 0).unwrap();
    let mut parent = Comment::new(thread.id, "old", "carol", true, None);
    parent.created_at = chrono::DateTime::from_timestamp(1_500_000_100, 0).unwrap();
    let mut reply = Comment::new(thread.id, "older reply", "dave", false, Some(parent.id));
    reply.created_at = chrono::DateTime::from_timestamp(1_500_000_200, 0).unwrap();
    reply.deleted_at = Some(chrono::DateTime::from_timestamp(1_500_000_300, 0).unwrap());

    store.import_thread(&thread).unwrap();
    store.import_comment(&parent).unwrap();
    store.import_comment(&reply).unwrap();

    assert_eq!(store.get_thread("/imported/").unwrap(), thread);
    assert_eq!(store.get_all_comments().unwrap(), vec![parent.clone(), reply]);
    assert_eq!(store.get_comments_by_thread("/imported/").unwrap(), vec![parent]);
}

pub fn import_thread_into_existing_path_fails(store: &dyn Storage) {
    use crate::model::Thread;

    let comment = store.create_comment("kept", "a", "/dup/", true, None).unwrap();
    let original = store.get_thread("/dup/").unwrap();

    assert!(store.import_thread(&Thread::new("/dup/".to_string())).is_err());
    assert!(store.import_thread(&original).is_err());

    assert_eq!(store.get_thread("/dup/").unwrap(), original);
    let listed = store.get_comments_by_thread("/dup/").unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, comment);
}

pub fn import_existing_comment_fails(store: &dyn Storage) {
    let id = store.create_comment("first", "a", "/dup-comment/", true, None).unwrap();
    let mut copy = store.get_comment(id).unwrap();
    copy.body = "second".to_string();

    assert!(store.import_comment(&copy).is_err());
    assert_eq!(store.get_comment(id).unwrap().body, "first");
}

pub fn reports_dialect(store: &dyn Storage) {
    assert!(!store.dialect().is_empty());
}

/// Expand every conformance test as a `#[test]` against `$make`.
macro_rules! conformance_suite {
    ($make:expr) => {
        $crate::storage::conformance::conformance_suite!(@tests $make;
            create_thread_is_idempotent,
            get_thread_not_found,
            create_comment_creates_thread,
            create_comment_reuses_thread,
            reply_to_missing_comment_fails,
            reply_is_stored,
            reply_to_reply_is_flattened,
            reply_across_threads_fails,
            get_comment_not_found,
            comments_by_missing_thread_fails,
            comments_by_empty_thread_is_empty,
            unconfirmed_hidden_from_thread_listing,
            comments_listed_oldest_first,
            update_comment_replaces_fields,
            update_comment_not_found,
            delete_comment_cascades_to_replies,
            delete_comment_not_found,
            restore_clears_deleted_at,
            restore_not_found,
            hard_delete_removes_replies,
            hard_delete_not_found,
            all_threads_listed_oldest_first,
            all_comments_include_hidden,
            cleanup_unconfirmed_keeps_confirmed,
            cleanup_unconfirmed_respects_threshold,
            cleanup_unconfirmed_skips_deleted,
            cleanup_deleted_respects_threshold,
            cleanup_deleted_handles_cascaded_replies,
            cleanup_saturates_extreme_thresholds,
            import_preserves_ids_and_timestamps,
            import_thread_into_existing_path_fails,
            import_existing_comment_fails,
            reports_dialect,
        );
    };
    (@tests $make:expr; $($name:ident),+ $(,)?) => {
        $(
            #[test]
            fn $name() {
                let store = $make;
                $crate::storage::conformance::$name(&store);
            }
        )+
    };
}

pub(crate) use conformance_suite;
