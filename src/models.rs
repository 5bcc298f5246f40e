use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A registered feed. `url` is unique and also determines `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    pub id: Uuid,
    pub url: String,
    pub name: String,
    pub user_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewFeed {
    pub name: String,
    pub url: String,
    pub user_name: String,
}

/// A stored item. `url` is unique across all posts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: DateTime<Utc>,
    pub feed_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub feed_id: Uuid,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: DateTime<Utc>,
}

/// A parsed RSS channel. Lives only for the duration of one ingestion cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub title: String,
    pub link: String,
    pub description: String,
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Item {
    pub title: String,
    pub link: String,
    pub description: String,
    /// Raw `pubDate` text, resolved later by `timestamp::resolve_published_at`.
    pub pub_date: String,
}

/// Identity derived from a URL, so the same link always maps to the same record.
pub fn id_for_url(url: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, url.as_bytes())
}
