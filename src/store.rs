use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;
use crate::error::StoreError;
use crate::models::{id_for_url, Feed, NewFeed, NewPost, Post};

/// Storage collaborator used by the ingestion core and the CLI.
pub trait Store: Send + Sync {
    /// The feed with the oldest `last_fetched_at`, never-fetched feeds first.
    fn next_feed_to_fetch(&self) -> Result<Option<Feed>, StoreError>;

    /// Sets `last_fetched_at` and `updated_at` to `now`.
    fn mark_feed_fetched(&self, feed_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError>;

    /// Inserts a post. Fails with `StoreError::Duplicate` if the link exists.
    fn create_post(&self, post: NewPost) -> Result<Post, StoreError>;

    fn create_feed(&self, feed: NewFeed) -> Result<Feed, StoreError>;

    fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>, StoreError>;

    fn list_feeds(&self) -> Result<Vec<Feed>, StoreError>;

    /// Newest posts first, limited to feeds owned by `user_name`.
    fn list_posts_for_user(&self, user_name: &str, limit: usize) -> Result<Vec<Post>, StoreError>;
}

/// JSON-file store. One file per feed under `feeds/` and one per post under
/// `posts/`, each named after the UUID derived from its URL.
pub struct FileStore {
    feeds_dir: PathBuf,
    posts_dir: PathBuf,
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

impl FileStore {
    /// Opens the store, creating the directory layout if needed.
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_dir = base_dir.into();
        let feeds_dir = base_dir.join("feeds");
        let posts_dir = base_dir.join("posts");

        fs::create_dir_all(&feeds_dir)?;
        fs::create_dir_all(&posts_dir)?;

        Ok(Self { feeds_dir, posts_dir })
    }

    fn feed_path(&self, id: Uuid) -> PathBuf {
        self.feeds_dir.join(format!("{}.json", id))
    }

    fn post_path(&self, id: Uuid) -> PathBuf {
        self.posts_dir.join(format!("{}.json", id))
    }

    fn read_feed(&self, id: Uuid) -> Result<Option<Feed>, StoreError> {
        match fs::read(self.feed_path(id)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl Store for FileStore {
    fn next_feed_to_fetch(&self) -> Result<Option<Feed>, StoreError> {
        let feeds: Vec<Feed> = read_records(&self.feeds_dir)?;

        // None sorts before Some, so never-fetched feeds come first.
        Ok(feeds
            .into_iter()
            .min_by(|a, b| {
                (a.last_fetched_at, a.created_at, &a.url)
                    .cmp(&(b.last_fetched_at, b.created_at, &b.url))
            }))
    }

    fn mark_feed_fetched(&self, feed_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut feed = self
            .read_feed(feed_id)?
            .ok_or(StoreError::FeedNotFound(feed_id))?;

        feed.last_fetched_at = Some(now);
        feed.updated_at = now;

        replace_record(&self.feed_path(feed_id), &feed)
    }

    fn create_post(&self, post: NewPost) -> Result<Post, StoreError> {
        let now = Utc::now();
        let post = Post {
            id: id_for_url(&post.url),
            title: post.title,
            url: post.url,
            description: post.description,
            published_at: post.published_at,
            feed_id: post.feed_id,
            created_at: now,
            updated_at: now,
        };

        create_record(&self.post_path(post.id), &post, &post.url)?;
        Ok(post)
    }

    fn create_feed(&self, feed: NewFeed) -> Result<Feed, StoreError> {
        let now = Utc::now();
        let feed = Feed {
            id: id_for_url(&feed.url),
            url: feed.url,
            name: feed.name,
            user_name: feed.user_name,
            created_at: now,
            updated_at: now,
            last_fetched_at: None,
        };

        create_record(&self.feed_path(feed.id), &feed, &feed.url)?;
        Ok(feed)
    }

    fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>, StoreError> {
        self.read_feed(id_for_url(url))
    }

    fn list_feeds(&self) -> Result<Vec<Feed>, StoreError> {
        let mut feeds: Vec<Feed> = read_records(&self.feeds_dir)?;
        feeds.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.url.cmp(&b.url)));
        Ok(feeds)
    }

    fn list_posts_for_user(&self, user_name: &str, limit: usize) -> Result<Vec<Post>, StoreError> {
        let owned: Vec<Uuid> = self
            .list_feeds()?
            .into_iter()
            .filter(|feed| feed.user_name == user_name)
            .map(|feed| feed.id)
            .collect();

        let mut posts: Vec<Post> = read_records(&self.posts_dir)?;
        posts.retain(|post| owned.contains(&post.feed_id));
        posts.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        posts.truncate(limit);

        Ok(posts)
    }
}

/// Writes `value` to a uniquely named temporary file next to `path`.
fn write_temp<T: Serialize>(path: &Path, value: &T) -> Result<PathBuf, StoreError> {
    let tmp = path.with_extension(format!(
        "{}.{}.tmp",
        std::process::id(),
        TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
    Ok(tmp)
}

/// Publishes a fully written record under `path` unless one already exists.
/// Linking fails atomically when the target exists, so two writers racing on
/// the same key cannot both succeed.
fn create_record<T: Serialize>(path: &Path, value: &T, url: &str) -> Result<(), StoreError> {
    let tmp = write_temp(path, value)?;
    let linked = fs::hard_link(&tmp, path);
    let _ = fs::remove_file(&tmp);

    match linked {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            Err(StoreError::Duplicate { url: url.to_string() })
        }
        Err(e) => Err(e.into()),
    }
}

fn replace_record<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let tmp = write_temp(path, value)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

fn read_records<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>, StoreError> {
    let mut records = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().map_or(true, |ext| ext != "json") {
            continue;
        }

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            // Removed between listing and reading.
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice(&bytes) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable record"),
        }
    }

    Ok(records)
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
