use tracing::{debug, warn};
use crate::error::StoreError;
use crate::models::{Document, Feed, NewPost};
use crate::store::Store;
use crate::timestamp::resolve_published_at;

/// Per-document ingestion counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub created: usize,
    pub duplicates: usize,
    pub failed: usize,
}

/// Stores every item of `document` as a post of `feed`, in document order.
///
/// Append-only: a link that already exists is counted as a duplicate and
/// skipped. Any other write failure is logged and the remaining items are
/// still processed.
pub fn ingest_document<S: Store + ?Sized>(store: &S, feed: &Feed, document: &Document) -> IngestReport {
    let mut report = IngestReport::default();

    for item in &document.items {
        let post = NewPost {
            feed_id: feed.id,
            title: item.title.clone(),
            url: item.link.clone(),
            description: Some(item.description.clone()).filter(|d| !d.is_empty()),
            published_at: resolve_published_at(&item.pub_date),
        };

        match store.create_post(post) {
            Ok(_) => report.created += 1,
            Err(StoreError::Duplicate { url }) => {
                debug!(feed = %feed.url, link = %url, "Skipping already ingested item");
                report.duplicates += 1;
            }
            Err(e) => {
                warn!(
                    feed = %feed.url,
                    title = %item.title,
                    link = %item.link,
                    error = %e,
                    "Failed to store item"
                );
                report.failed += 1;
            }
        }
    }

    report
}
