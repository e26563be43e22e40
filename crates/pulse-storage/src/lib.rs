//! JSON document persistence, cross-process locking, HTTP fetch utilities,
//! and the dated-bucket retention manager for Pulse.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::{DateTime, Datelike, Local, Months, NaiveDate, Timelike};
use pulse_core::PostRecord;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "pulse-storage";

// ---------------------------------------------------------------------------
// Atomic JSON store

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("serializing document for {path}: {source}")]
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("writing {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// One JSON document on disk, written with a temp-file-then-rename pattern so
/// the destination is always either the old content or the new content in
/// full.
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the document. `None` when the file is absent; read or
    /// parse failures are logged and also yield `None`.
    pub async fn load<T: DeserializeOwned>(&self) -> Option<T> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "failed to read store file");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(path = %self.path.display(), %err, "store file is not valid JSON");
                None
            }
        }
    }

    pub async fn load_or<T: DeserializeOwned>(&self, default: T) -> T {
        self.load().await.unwrap_or(default)
    }

    /// Serialize `value` pretty-printed and atomically replace the document.
    pub async fn save<T: Serialize>(&self, value: &T) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Serialize {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|source| StoreError::Io {
                        path: self.path.clone(),
                        source,
                    })?;
            }
        }

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "store".to_string());
        let temp_path = self
            .path
            .with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

        let write_result = async {
            let mut file = fs::OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&temp_path)
                .await?;
            file.write_all(&bytes).await?;
            file.flush().await?;
            drop(file);
            fs::rename(&temp_path, &self.path).await
        }
        .await;

        match write_result {
            Ok(()) => Ok(()),
            Err(source) => {
                let _ = fs::remove_file(&temp_path).await;
                Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Advisory file lock

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Error)]
pub enum LockError {
    #[error("timed out after {waited:?} waiting for lock {path}")]
    Timeout { path: PathBuf, waited: Duration },
    #[error("creating lock file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Cooperative mutual exclusion between processes sharing one store file,
/// implemented as a sibling `<name>.lock` file created with `create_new`.
/// Effective only among processes that acquire it; dropping the guard
/// releases the lock.
#[derive(Debug)]
pub struct FileLock {
    lock_path: PathBuf,
}

impl FileLock {
    pub async fn acquire(target: &Path, timeout: Duration) -> Result<Self, LockError> {
        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "store".to_string());
        let lock_path = target.with_file_name(format!("{file_name}.lock"));

        if let Some(parent) = lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|source| LockError::Io {
                        path: lock_path.clone(),
                        source,
                    })?;
            }
        }

        let started = Instant::now();
        loop {
            match fs::OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&lock_path)
                .await
            {
                Ok(_file) => return Ok(Self { lock_path }),
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    if started.elapsed() >= timeout {
                        return Err(LockError::Timeout {
                            path: lock_path,
                            waited: started.elapsed(),
                        });
                    }
                    tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
                }
                Err(source) => {
                    return Err(LockError::Io {
                        path: lock_path,
                        source,
                    })
                }
            }
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.lock_path);
    }
}

// ---------------------------------------------------------------------------
// HTTP fetching

pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148",
    "Mozilla/5.0 (Linux; Android 14; SM-S921N) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Mobile Safari/537.36",
];

pub const REFERERS: &[&str] = &[
    "https://www.google.com/",
    "https://search.naver.com/",
    "https://www.bing.com/",
];

pub const ACCEPT_LANGUAGES: &[&str] = &[
    "ko-KR,ko;q=0.9,en-US;q=0.8",
    "ko,en-US;q=0.9,en;q=0.8",
    "en-US,en;q=0.9,ko;q=0.8",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    /// Random pre-request sleep bounds in milliseconds, inclusive.
    pub jitter_ms: (u64, u64),
    pub backoff: BackoffPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            jitter_ms: (500, 2500),
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

/// Plain GET fetcher with rotating browser-like headers and a randomized
/// delay before each request. One request per call; retries only on
/// transient conditions.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    jitter_ms: (u64, u64),
    backoff: BackoffPolicy,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .build()
            .context("building reqwest client")?;
        Ok(Self {
            client,
            jitter_ms: config.jitter_ms,
            backoff: config.backoff,
        })
    }

    fn pick_headers() -> (&'static str, &'static str, &'static str) {
        use rand::seq::SliceRandom;
        let mut rng = rand::thread_rng();
        (
            USER_AGENTS.choose(&mut rng).copied().unwrap_or(USER_AGENTS[0]),
            REFERERS.choose(&mut rng).copied().unwrap_or(REFERERS[0]),
            ACCEPT_LANGUAGES
                .choose(&mut rng)
                .copied()
                .unwrap_or(ACCEPT_LANGUAGES[0]),
        )
    }

    fn jitter(&self) -> Duration {
        use rand::Rng;
        let (min, max) = self.jitter_ms;
        if max <= min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    pub async fn fetch_text(&self, source_id: &str, url: &str) -> Result<String, FetchError> {
        let jitter = self.jitter();
        if !jitter.is_zero() {
            tokio::time::sleep(jitter).await;
        }

        let mut last_request_error: Option<reqwest::Error> = None;

        for attempt in 0..=self.backoff.max_retries {
            let (user_agent, referer, accept_language) = Self::pick_headers();
            debug!(source_id, url, attempt, "sending GET");

            let resp_result = self
                .client
                .get(url)
                .header("User-Agent", user_agent)
                .header("Referer", referer)
                .header("Accept-Language", accept_language)
                .send()
                .await;

            match resp_result {
                Ok(resp) => {
                    let status = resp.status();
                    let final_url = resp.url().to_string();

                    if status.is_success() {
                        return Ok(resp.text().await?);
                    }

                    if classify_status(status) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }

                    return Err(FetchError::HttpStatus {
                        status: status.as_u16(),
                        url: final_url,
                    });
                }
                Err(err) => {
                    if classify_reqwest_error(&err) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        last_request_error = Some(err);
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    return Err(FetchError::Request(err));
                }
            }
        }

        Err(FetchError::Request(
            last_request_error.expect("retry loop captures a request error"),
        ))
    }
}

// ---------------------------------------------------------------------------
// Seen-links cache

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SeenDoc {
    #[serde(default)]
    seen: Vec<String>,
}

/// Persisted set of already-alerted posts, keyed by a sha256 digest of the
/// post URL (or source + title when the post has no URL). Keeps a bug post
/// from alerting more than once across invocations.
///
/// The whole check-deliver-record cycle runs inside one
/// [`SeenLinksSession`] that holds the advisory lock, so overlapping crawls
/// cannot both treat the same post as fresh or save over each other's keys.
#[derive(Debug)]
pub struct SeenLinks {
    store: JsonStore,
    lock_timeout: Duration,
}

impl SeenLinks {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            store: JsonStore::new(path),
            lock_timeout: RetentionManager::DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn key_for(post: &PostRecord) -> String {
        let material = match &post.url {
            Some(url) => url.clone(),
            None => format!("{}|{}", post.source, post.title),
        };
        let mut hasher = Sha256::new();
        hasher.update(material.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Take the lock and load the current key set. The lock is held until
    /// the session is committed or dropped.
    pub async fn begin(&self) -> Result<SeenLinksSession, LockError> {
        let guard = FileLock::acquire(self.store.path(), self.lock_timeout).await?;
        let doc: SeenDoc = self.store.load_or(SeenDoc::default()).await;
        Ok(SeenLinksSession {
            store: self.store.clone(),
            keys: doc.seen.into_iter().collect(),
            dirty: false,
            _guard: guard,
        })
    }
}

/// One locked pass over the seen-links cache.
#[derive(Debug)]
pub struct SeenLinksSession {
    store: JsonStore,
    keys: HashSet<String>,
    dirty: bool,
    _guard: FileLock,
}

impl SeenLinksSession {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The posts whose key is not in the set, deduplicated within the
    /// batch. Marks nothing; call [`SeenLinksSession::record`] for the
    /// posts that were actually handled.
    pub fn filter_new(&self, posts: &[PostRecord]) -> Vec<PostRecord> {
        let mut fresh = Vec::new();
        let mut batch = HashSet::new();
        for post in posts {
            let key = SeenLinks::key_for(post);
            if !self.keys.contains(&key) && batch.insert(key) {
                fresh.push(post.clone());
            }
        }
        fresh
    }

    pub fn record(&mut self, posts: &[PostRecord]) {
        for post in posts {
            if self.keys.insert(SeenLinks::key_for(post)) {
                self.dirty = true;
            }
        }
    }

    /// Save the key set and release the lock. A session dropped without
    /// commit releases the lock with the file untouched.
    pub async fn commit(self) -> Result<(), StoreError> {
        if !self.dirty {
            return Ok(());
        }
        let mut seen: Vec<String> = self.keys.iter().cloned().collect();
        seen.sort();
        self.store.save(&SeenDoc { seen }).await
    }
}

// ---------------------------------------------------------------------------
// Dated-bucket retention manager

const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

/// Persisted retention document. Day buckets not yet archived live in
/// `current_data`; finished days are grouped by month under `archives`.
/// A date-key is present in exactly one of the two after a rollover.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetentionDoc {
    #[serde(default)]
    pub current_data: BTreeMap<String, Vec<PostRecord>>,
    #[serde(default)]
    pub archives: BTreeMap<String, BTreeMap<String, Vec<PostRecord>>>,
    #[serde(default)]
    pub last_daily_process: Option<DateTime<Local>>,
    #[serde(default)]
    pub last_monthly_process: Option<DateTime<Local>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetentionStats {
    pub months: usize,
    pub days: usize,
    pub records: usize,
}

/// When the periodic maintenance actions become eligible within a day/month.
/// The watermarks in the document keep them from running twice per period.
#[derive(Debug, Clone, Copy)]
pub struct MaintenanceSchedule {
    /// Daily rollover runs at or after this local hour.
    pub rollover_hour: u32,
    /// Monthly prune runs at or after this day of month.
    pub prune_day: u32,
}

impl Default for MaintenanceSchedule {
    fn default() -> Self {
        Self {
            rollover_hour: 6,
            prune_day: 1,
        }
    }
}

/// Owns one retention document, buckets incoming posts by calendar day,
/// rolls finished days into per-month archives, and prunes months older
/// than the two-month retention window.
///
/// Every mutating operation is a locked read-modify-write cycle: it takes
/// the [`FileLock`], re-reads the document so updates written by another
/// invocation since `open` are folded in, applies the change, and saves
/// before releasing. Save failure is logged and the in-memory state kept.
#[derive(Debug)]
pub struct RetentionManager {
    store: JsonStore,
    lock_timeout: Duration,
    schedule: MaintenanceSchedule,
    doc: RetentionDoc,
}

impl RetentionManager {
    pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let store = JsonStore::new(path);
        let doc = store.load_or(RetentionDoc::default()).await;
        Self {
            store,
            lock_timeout: Self::DEFAULT_LOCK_TIMEOUT,
            schedule: MaintenanceSchedule::default(),
            doc,
        }
    }

    pub fn with_schedule(mut self, schedule: MaintenanceSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn document(&self) -> &RetentionDoc {
        &self.doc
    }

    pub fn date_key(date: NaiveDate) -> String {
        date.format(DATE_KEY_FORMAT).to_string()
    }

    fn month_key_of(date_key: &str) -> &str {
        date_key.get(..7).unwrap_or(date_key)
    }

    /// One locked read-modify-write cycle. Without the re-read under the
    /// lock, two invocations that both opened the same file would each save
    /// over the other's posts. When the lock cannot be taken the mutation
    /// still applies to the in-memory copy, unsaved.
    async fn mutate<F>(&mut self, apply: F)
    where
        F: FnOnce(&mut RetentionDoc) -> bool,
    {
        match FileLock::acquire(self.store.path(), self.lock_timeout).await {
            Ok(guard) => {
                self.doc = self.store.load_or(RetentionDoc::default()).await;
                if apply(&mut self.doc) {
                    if let Err(err) = self.store.save(&self.doc).await {
                        warn!(%err, "failed to persist retention document");
                    }
                }
                drop(guard);
            }
            Err(err) => {
                warn!(%err, "retention lock unavailable; keeping change in memory only");
                apply(&mut self.doc);
            }
        }
    }

    fn apply_add(doc: &mut RetentionDoc, posts: Vec<PostRecord>, now: DateTime<Local>) {
        let today = Self::date_key(now.date_naive());
        let bucket = doc.current_data.entry(today).or_default();
        for mut post in posts {
            post.processed_time = now;
            bucket.push(post);
        }
    }

    fn apply_rollover(doc: &mut RetentionDoc, now: DateTime<Local>) {
        let today = Self::date_key(now.date_naive());

        let finished: Vec<String> = doc
            .current_data
            .keys()
            .filter(|key| key.as_str() < today.as_str())
            .cloned()
            .collect();

        for day_key in finished {
            if let Some(posts) = doc.current_data.remove(&day_key) {
                let month_key = Self::month_key_of(&day_key).to_string();
                debug!(%day_key, %month_key, count = posts.len(), "archiving day bucket");
                doc.archives
                    .entry(month_key)
                    .or_default()
                    .insert(day_key, posts);
            }
        }

        doc.current_data.entry(today).or_default();
        doc.last_daily_process = Some(now);
    }

    fn apply_prune(doc: &mut RetentionDoc, now: DateTime<Local>) {
        let first_of_month = now
            .date_naive()
            .with_day(1)
            .unwrap_or_else(|| now.date_naive());
        let current = Self::month_key_of(&Self::date_key(first_of_month)).to_string();
        let previous = first_of_month
            .checked_sub_months(Months::new(1))
            .map(|d| Self::month_key_of(&Self::date_key(d)).to_string());

        let retain: HashSet<String> = std::iter::once(current).chain(previous).collect();

        let before = doc.archives.len();
        doc.archives.retain(|month_key, _| retain.contains(month_key));
        let dropped = before - doc.archives.len();
        if dropped > 0 {
            debug!(dropped, "pruned month buckets outside retention window");
        }

        doc.last_monthly_process = Some(now);
    }

    fn daily_due(doc: &RetentionDoc, schedule: &MaintenanceSchedule, now: DateTime<Local>) -> bool {
        now.hour() >= schedule.rollover_hour
            && doc
                .last_daily_process
                .map(|t| t.date_naive() < now.date_naive())
                .unwrap_or(true)
    }

    fn monthly_due(
        doc: &RetentionDoc,
        schedule: &MaintenanceSchedule,
        now: DateTime<Local>,
    ) -> bool {
        now.day() >= schedule.prune_day
            && doc
                .last_monthly_process
                .map(|t| (t.year(), t.month()) != (now.year(), now.month()))
                .unwrap_or(true)
    }

    /// Append classified posts into today's bucket, stamping each with the
    /// current instant. Empty input is a no-op and does not touch the disk.
    pub async fn add(&mut self, posts: Vec<PostRecord>) {
        self.add_at(posts, Local::now()).await;
    }

    pub async fn add_at(&mut self, posts: Vec<PostRecord>, now: DateTime<Local>) {
        if posts.is_empty() {
            return;
        }
        self.mutate(|doc| {
            Self::apply_add(doc, posts, now);
            true
        })
        .await;
    }

    /// Move every finished day (any date-key before today) into its month
    /// archive and make sure today's bucket exists. Idempotent within a day:
    /// a second call finds nothing left to move.
    pub async fn rollover_daily(&mut self) {
        self.rollover_daily_at(Local::now()).await;
    }

    pub async fn rollover_daily_at(&mut self, now: DateTime<Local>) {
        self.mutate(|doc| {
            Self::apply_rollover(doc, now);
            true
        })
        .await;
    }

    /// Delete every month bucket outside the retention window: the current
    /// calendar month and the one immediately before it, computed by exact
    /// month arithmetic (January's predecessor is December of the prior
    /// year), never by a fixed day-count offset.
    pub async fn prune_months(&mut self) {
        self.prune_months_at(Local::now()).await;
    }

    pub async fn prune_months_at(&mut self, now: DateTime<Local>) {
        self.mutate(|doc| {
            Self::apply_prune(doc, now);
            true
        })
        .await;
    }

    /// Run the daily rollover at most once per calendar day and the monthly
    /// prune at most once per calendar month, each gated to its scheduled
    /// hour / day-of-month. The due checks run against the re-read document
    /// inside one locked cycle, so overlapping invocations see each other's
    /// watermarks and do not re-trigger.
    pub async fn auto_maintenance(&mut self) {
        self.auto_maintenance_at(Local::now()).await;
    }

    pub async fn auto_maintenance_at(&mut self, now: DateTime<Local>) {
        let schedule = self.schedule;
        self.mutate(|doc| {
            let mut changed = false;
            if Self::daily_due(doc, &schedule, now) {
                Self::apply_rollover(doc, now);
                changed = true;
            }
            if Self::monthly_due(doc, &schedule, now) {
                Self::apply_prune(doc, now);
                changed = true;
            }
            changed
        })
        .await;
    }

    /// Posts for one date-key, looked up in the rolling window first and
    /// then in the month archive the key would belong to.
    pub fn get_daily(&self, date_key: &str) -> Vec<PostRecord> {
        if let Some(posts) = self.doc.current_data.get(date_key) {
            return posts.clone();
        }
        self.doc
            .archives
            .get(Self::month_key_of(date_key))
            .and_then(|month| month.get(date_key))
            .cloned()
            .unwrap_or_default()
    }

    /// Posts for the inclusive date range, ascending. Malformed bounds are
    /// logged and yield an empty result.
    pub fn get_range(&self, start: &str, end: &str) -> Vec<PostRecord> {
        let (Ok(start_date), Ok(end_date)) = (
            NaiveDate::parse_from_str(start, DATE_KEY_FORMAT),
            NaiveDate::parse_from_str(end, DATE_KEY_FORMAT),
        ) else {
            warn!(start, end, "malformed date range");
            return Vec::new();
        };

        let mut out = Vec::new();
        for date in start_date.iter_days().take_while(|d| *d <= end_date) {
            out.extend(self.get_daily(&Self::date_key(date)));
        }
        out
    }

    pub fn stats(&self) -> RetentionStats {
        let archived_days: usize = self.doc.archives.values().map(|m| m.len()).sum();
        let archived_records: usize = self
            .doc
            .archives
            .values()
            .flat_map(|m| m.values())
            .map(|posts| posts.len())
            .sum();
        let current_records: usize = self.doc.current_data.values().map(|p| p.len()).sum();
        RetentionStats {
            months: self.doc.archives.len(),
            days: self.doc.current_data.len() + archived_days,
            records: current_records + archived_records,
        }
    }
}
