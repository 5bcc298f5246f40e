use chrono::Utc;
use regex::Regex;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};
use crate::error::{CycleError, FetchError, SetupError};
use crate::fetcher::{shutdown_requested, Deadline, Fetch};
use crate::models::Feed;
use crate::normalizer::parse_document;
use crate::store::Store;
use crate::writer::{ingest_document, IngestReport};

const INTERVAL_PART: &str = r"(\d+(?:\.\d+)?)(ns|us|µs|ms|s|m|h)";

/// Parses a duration such as `500ms`, `30s`, `1m` or `1h30m`.
/// Zero, negative and unit-less values are rejected.
pub fn parse_interval(text: &str) -> Result<Duration, SetupError> {
    let invalid = || SetupError::InvalidInterval(text.to_string());

    let whole = Regex::new(&format!("^(?:{})+$", INTERVAL_PART)).map_err(|_| invalid())?;
    let part = Regex::new(INTERVAL_PART).map_err(|_| invalid())?;

    let text = text.trim();
    if !whole.is_match(text) {
        return Err(invalid());
    }

    let mut nanos = 0.0_f64;
    for cap in part.captures_iter(text) {
        let value: f64 = cap[1].parse().map_err(|_| invalid())?;
        let scale = match &cap[2] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };
        nanos += value * scale;
    }

    let nanos = nanos.round();
    if nanos < 1.0 || nanos >= u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(Duration::from_nanos(nanos as u64))
}

#[derive(Debug)]
pub enum TickOutcome {
    /// No feeds registered.
    Idle,
    Ingested { feed: Feed, report: IngestReport },
}

/// Owns the store, the fetcher and the shutdown signal for the ingestion loop.
pub struct Scheduler<S, F> {
    store: S,
    fetcher: F,
    interval: Duration,
    fetch_timeout: Duration,
    shutdown: watch::Receiver<bool>,
}

impl<S: Store, F: Fetch> Scheduler<S, F> {
    pub fn new(
        store: S,
        fetcher: F,
        interval: Duration,
        fetch_timeout: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, SetupError> {
        if interval.is_zero() {
            return Err(SetupError::InvalidInterval(format!("{:?}", interval)));
        }

        Ok(Self { store, fetcher, interval, fetch_timeout, shutdown })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs one ingestion cycle for the least recently fetched feed.
    ///
    /// The feed is marked fetched before the request goes out, so a feed that
    /// keeps failing still yields its turn to the others.
    pub async fn tick(&self) -> Result<TickOutcome, CycleError> {
        let Some(feed) = self.store.next_feed_to_fetch()? else {
            debug!("No feeds to fetch");
            return Ok(TickOutcome::Idle);
        };

        self.store.mark_feed_fetched(feed.id, Utc::now())?;

        info!(feed = %feed.url, name = %feed.name, "Fetching feed");
        let deadline = Deadline::new(self.fetch_timeout, self.shutdown.clone());
        let body = self.fetcher.fetch(&feed.url, &deadline).await?;

        let document = parse_document(&body).map_err(|source| CycleError::Parse {
            url: feed.url.clone(),
            source,
        })?;

        let report = ingest_document(&self.store, &feed, &document);
        info!(
            feed = %feed.url,
            items = document.items.len(),
            created = report.created,
            duplicates = report.duplicates,
            failed = report.failed,
            "Ingested feed"
        );

        Ok(TickOutcome::Ingested { feed, report })
    }

    /// Ticks on a fixed interval until shutdown is requested. The first tick
    /// runs immediately; a slow cycle delays the next one instead of queueing.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval = ?self.interval, "Collecting feeds");

        loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(&self.shutdown) => break,
                _ = ticker.tick() => {}
            }

            match self.tick().await {
                Ok(_) => {}
                Err(CycleError::Fetch(e @ FetchError::Cancelled { .. })) => debug!(error = %e, "Fetch cancelled"),
                Err(e) => error!(error = %e, "Feed cycle failed"),
            }
        }

        info!("Ingestion loop stopped");
    }
}

/// Validates `interval` and runs the ingestion loop until shutdown.
/// Only an invalid interval is an error; cycle failures are logged.
pub async fn run_ingestion_loop<S: Store, F: Fetch>(
    interval: &str,
    store: S,
    fetcher: F,
    fetch_timeout: Duration,
    shutdown: watch::Receiver<bool>,
) -> Result<(), SetupError> {
    let interval = parse_interval(interval)?;
    let scheduler = Scheduler::new(store, fetcher, interval, fetch_timeout, shutdown)?;
    scheduler.run().await;
    Ok(())
}
