use super::*;
use chrono::{Duration, TimeZone};
use tempfile::TempDir;

fn create_test_store() -> (FileStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let store = FileStore::open(temp_dir.path()).unwrap();
    (store, temp_dir)
}

fn new_feed(name: &str, url: &str) -> NewFeed {
    NewFeed {
        name: name.to_string(),
        url: url.to_string(),
        user_name: "lane".to_string(),
    }
}

fn new_post(feed_id: Uuid, url: &str, published_at: DateTime<Utc>) -> NewPost {
    NewPost {
        feed_id,
        title: format!("Post at {}", url),
        url: url.to_string(),
        description: Some("body".to_string()),
        published_at,
    }
}

#[test]
fn test_create_feed_rejects_duplicate_urls() {
    let (store, _temp_dir) = create_test_store();

    let feed = store.create_feed(new_feed("Blog", "https://blog.example/rss")).unwrap();
    assert_eq!(feed.last_fetched_at, None);
    assert_eq!(feed.id, id_for_url("https://blog.example/rss"));

    let result = store.create_feed(new_feed("Again", "https://blog.example/rss"));
    assert!(matches!(result, Err(StoreError::Duplicate { .. })));
    assert_eq!(store.list_feeds().unwrap().len(), 1);
}

#[test]
fn test_next_feed_prefers_never_fetched() {
    let (store, _temp_dir) = create_test_store();
    let fetched = store.create_feed(new_feed("B", "https://b.example/rss")).unwrap();
    let never = store.create_feed(new_feed("A", "https://a.example/rss")).unwrap();

    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    store.mark_feed_fetched(fetched.id, t0).unwrap();

    let next = store.next_feed_to_fetch().unwrap().unwrap();
    assert_eq!(next.id, never.id);
}

#[test]
fn test_next_feed_picks_oldest_fetch() {
    let (store, _temp_dir) = create_test_store();
    let recent = store.create_feed(new_feed("Recent", "https://recent.example/rss")).unwrap();
    let stale = store.create_feed(new_feed("Stale", "https://stale.example/rss")).unwrap();

    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    store.mark_feed_fetched(stale.id, t0).unwrap();
    store.mark_feed_fetched(recent.id, t0 + Duration::hours(1)).unwrap();

    assert_eq!(store.next_feed_to_fetch().unwrap().unwrap().id, stale.id);
}

#[test]
fn test_next_feed_on_empty_store() {
    let (store, _temp_dir) = create_test_store();

    assert!(store.next_feed_to_fetch().unwrap().is_none());
}

#[test]
fn test_mark_feed_fetched_updates_timestamps() {
    let (store, _temp_dir) = create_test_store();
    let feed = store.create_feed(new_feed("Blog", "https://blog.example/rss")).unwrap();

    let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
    store.mark_feed_fetched(feed.id, now).unwrap();

    let stored = store.get_feed_by_url("https://blog.example/rss").unwrap().unwrap();
    assert_eq!(stored.last_fetched_at, Some(now));
    assert_eq!(stored.updated_at, now);
    assert_eq!(stored.created_at, feed.created_at);
}

#[test]
fn test_mark_unknown_feed() {
    let (store, _temp_dir) = create_test_store();

    let result = store.mark_feed_fetched(Uuid::nil(), Utc::now());
    assert!(matches!(result, Err(StoreError::FeedNotFound(_))));
}

#[test]
fn test_create_post_is_unique_by_link() {
    let (store, _temp_dir) = create_test_store();
    let feed = store.create_feed(new_feed("Blog", "https://blog.example/rss")).unwrap();
    let published = Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap();

    let post = store.create_post(new_post(feed.id, "http://a/1", published)).unwrap();
    assert_eq!(post.published_at, published);

    let mut second = new_post(feed.id, "http://a/1", Utc::now());
    second.title = "Overwrite attempt".to_string();
    let result = store.create_post(second);
    assert!(matches!(result, Err(StoreError::Duplicate { ref url }) if url == "http://a/1"));

    // The first write wins and is never overwritten.
    let posts = store.list_posts_for_user("lane", 10).unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].title, "Post at http://a/1");
    assert_eq!(posts[0].published_at, published);
}

#[test]
fn test_list_posts_newest_first_with_limit() {
    let (store, _temp_dir) = create_test_store();
    let feed = store.create_feed(new_feed("Blog", "https://blog.example/rss")).unwrap();
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    for day in 0..5 {
        let url = format!("https://blog.example/{}", day);
        store.create_post(new_post(feed.id, &url, base + Duration::days(day))).unwrap();
    }

    let posts = store.list_posts_for_user("lane", 2).unwrap();
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].url, "https://blog.example/4");
    assert_eq!(posts[1].url, "https://blog.example/3");
}

#[test]
fn test_list_posts_only_for_owned_feeds() {
    let (store, _temp_dir) = create_test_store();
    let mine = store.create_feed(new_feed("Mine", "https://mine.example/rss")).unwrap();
    let theirs = store
        .create_feed(NewFeed {
            name: "Theirs".to_string(),
            url: "https://theirs.example/rss".to_string(),
            user_name: "kahya".to_string(),
        })
        .unwrap();

    store.create_post(new_post(mine.id, "https://mine.example/1", Utc::now())).unwrap();
    store.create_post(new_post(theirs.id, "https://theirs.example/1", Utc::now())).unwrap();

    let posts = store.list_posts_for_user("lane", 10).unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].feed_id, mine.id);
}

#[test]
fn test_leaves_no_temporary_files() {
    let (store, temp_dir) = create_test_store();
    let feed = store.create_feed(new_feed("Blog", "https://blog.example/rss")).unwrap();
    store.mark_feed_fetched(feed.id, Utc::now()).unwrap();
    store.create_post(new_post(feed.id, "http://a/1", Utc::now())).unwrap();
    let _ = store.create_post(new_post(feed.id, "http://a/1", Utc::now()));

    for dir in ["feeds", "posts"] {
        for entry in fs::read_dir(temp_dir.path().join(dir)).unwrap() {
            let path = entry.unwrap().path();
            assert_eq!(path.extension().unwrap(), "json", "leftover file {}", path.display());
        }
    }
}

#[test]
fn test_skips_corrupt_records() {
    let (store, temp_dir) = create_test_store();
    store.create_feed(new_feed("Blog", "https://blog.example/rss")).unwrap();
    fs::write(temp_dir.path().join("feeds").join("broken.json"), "{not json").unwrap();

    assert_eq!(store.list_feeds().unwrap().len(), 1);
}
