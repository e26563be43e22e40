//! Crawl orchestration: environment config, run modes, alerting, reports,
//! and the optional cron scheduler.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use pulse_core::{classify, Category, PostRecord};
use pulse_notify::{
    format_sentiment_summary, CategorySection, DailyReport, WebhookNotifier,
};
use pulse_sources::{fetch_source, SourceGroup, SourceRegistry};
use pulse_storage::{
    FetchConfig, HttpFetcher, RetentionManager, RetentionStats, SeenLinks,
};
use serde::Serialize;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "pulse-pipeline";

pub const SENTIMENT_FILE: &str = "sentiment.json";
pub const SEEN_LINKS_FILE: &str = "seen_links.json";

/// Which source group(s) a single invocation crawls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Fast cycle: bug boards only.
    Bug,
    /// General community feeds only.
    Global,
    /// Both groups in one pass.
    All,
}

impl RunMode {
    pub fn groups(&self) -> &'static [SourceGroup] {
        match self {
            RunMode::Bug => &[SourceGroup::BugBoard],
            RunMode::Global => &[SourceGroup::Global],
            RunMode::All => &[SourceGroup::BugBoard, SourceGroup::Global],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Bug => "bug",
            RunMode::Global => "global",
            RunMode::All => "all",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub sources_file: PathBuf,
    pub bug_webhook: Option<String>,
    pub sentiment_webhook: Option<String>,
    pub report_webhook: Option<String>,
    pub http_timeout_secs: u64,
    pub jitter_ms: (u64, u64),
    pub scheduler_enabled: bool,
    pub crawl_cron_bug: String,
    pub crawl_cron_global: String,
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "True")
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self {
            data_dir: env_opt("PULSE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            sources_file: env_opt("PULSE_SOURCES_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./sources.yaml")),
            bug_webhook: env_opt("PULSE_WEBHOOK_BUG"),
            sentiment_webhook: env_opt("PULSE_WEBHOOK_SENTIMENT"),
            report_webhook: env_opt("PULSE_WEBHOOK_REPORT"),
            http_timeout_secs: env_u64("PULSE_HTTP_TIMEOUT_SECS", 10),
            jitter_ms: (
                env_u64("PULSE_JITTER_MS_MIN", 500),
                env_u64("PULSE_JITTER_MS_MAX", 2500),
            ),
            scheduler_enabled: std::env::var("PULSE_SCHEDULER_ENABLED")
                .map(|v| parse_bool(&v))
                .unwrap_or(false),
            crawl_cron_bug: env_opt("PULSE_CRAWL_CRON_BUG")
                .unwrap_or_else(|| "0 */10 * * * *".to_string()),
            crawl_cron_global: env_opt("PULSE_CRAWL_CRON_GLOBAL")
                .unwrap_or_else(|| "0 0 * * * *".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    pub bug: usize,
    pub positive: usize,
    pub negative: usize,
    pub other: usize,
}

impl CategoryCounts {
    pub fn tally(posts: &[PostRecord]) -> Self {
        let mut counts = Self::default();
        for post in posts {
            match post.category {
                Category::Bug => counts.bug += 1,
                Category::Positive => counts.positive += 1,
                Category::Negative => counts.negative += 1,
                Category::Other => counts.other += 1,
            }
        }
        counts
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CrawlSummary {
    pub run_id: Uuid,
    pub mode: String,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub sources: usize,
    pub fetched: usize,
    pub counts: CategoryCounts,
    pub alerted: usize,
}

pub struct Pipeline {
    config: PipelineConfig,
    registry: SourceRegistry,
    http: HttpFetcher,
    notifier: WebhookNotifier,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let registry = SourceRegistry::load_or_builtin(&config.sources_file);
        let timeout = Duration::from_secs(config.http_timeout_secs);
        let http = HttpFetcher::new(FetchConfig {
            timeout,
            jitter_ms: config.jitter_ms,
            ..FetchConfig::default()
        })?;
        let notifier = WebhookNotifier::new(timeout)?;
        Ok(Self {
            config,
            registry,
            http,
            notifier,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn sentiment_path(&self) -> PathBuf {
        self.config.data_dir.join(SENTIMENT_FILE)
    }

    fn seen_links_path(&self) -> PathBuf {
        self.config.data_dir.join(SEEN_LINKS_FILE)
    }

    /// One crawl cycle: fetch the mode's sources, classify, retain, run
    /// retention maintenance, and alert on previously-unseen bug posts.
    pub async fn run_crawl_once(&self, mode: RunMode) -> Result<CrawlSummary> {
        let run_id = Uuid::new_v4();
        let started_at = Local::now();
        let specs = self.registry.for_groups(mode.groups());
        info!(%run_id, mode = mode.as_str(), sources = specs.len(), "crawl started");

        let mut records: Vec<PostRecord> = Vec::new();
        for spec in &specs {
            let raws = fetch_source(&self.http, spec).await;
            info!(source_id = %spec.source_id, count = raws.len(), "source fetched");
            let now = Local::now();
            for raw in raws {
                let category = classify(&raw.title);
                records.push(PostRecord::from_raw(raw, category, now));
            }
        }

        let counts = CategoryCounts::tally(&records);

        let mut retention = RetentionManager::open(self.sentiment_path()).await;
        retention.add(records.clone()).await;
        retention.auto_maintenance().await;

        let alerted = self.alert_new_bugs(&records).await;
        self.maybe_send_sentiment_summary(mode, counts).await;

        let finished_at = Local::now();
        let summary = CrawlSummary {
            run_id,
            mode: mode.as_str().to_string(),
            started_at,
            finished_at,
            sources: specs.len(),
            fetched: records.len(),
            counts,
            alerted,
        };
        info!(
            %run_id,
            fetched = summary.fetched,
            bugs = counts.bug,
            alerted,
            "crawl finished"
        );
        Ok(summary)
    }

    /// Alert on bug posts not alerted before. The seen-links session holds
    /// the cache lock for the whole check-deliver-record cycle, and a post
    /// is recorded as seen only after its alert was delivered, so a failed
    /// or skipped delivery leaves it eligible for the next cycle.
    async fn alert_new_bugs(&self, records: &[PostRecord]) -> usize {
        let bug_posts: Vec<PostRecord> = records
            .iter()
            .filter(|p| p.category == Category::Bug)
            .cloned()
            .collect();
        if bug_posts.is_empty() {
            return 0;
        }

        let seen = SeenLinks::new(self.seen_links_path());
        let mut session = match seen.begin().await {
            Ok(session) => session,
            Err(err) => {
                warn!(%err, "seen-links cache is locked; deferring bug alerts to the next cycle");
                return 0;
            }
        };
        let fresh = session.filter_new(&bug_posts);
        if fresh.is_empty() {
            return 0;
        }

        let Some(url) = &self.config.bug_webhook else {
            warn!("configuration: PULSE_WEBHOOK_BUG not set; skipping bug alert");
            return 0;
        };
        match self.notifier.send_bug_alert(url, &fresh).await {
            Ok(()) => {
                session.record(&fresh);
                if let Err(err) = session.commit().await {
                    warn!(%err, "failed to persist seen-links cache");
                }
                fresh.len()
            }
            Err(err) => {
                warn!(%err, "bug alert delivery failed; posts stay eligible for the next cycle");
                0
            }
        }
    }

    async fn maybe_send_sentiment_summary(&self, mode: RunMode, counts: CategoryCounts) {
        if !mode.groups().contains(&SourceGroup::Global) {
            return;
        }
        if counts.positive + counts.negative == 0 {
            return;
        }
        match &self.config.sentiment_webhook {
            Some(url) => {
                let msg = format_sentiment_summary(counts.positive, counts.negative, counts.other);
                if let Err(err) = self.notifier.post_content(url, &msg).await {
                    warn!(%err, "sentiment summary delivery failed");
                }
            }
            None => {
                warn!("configuration: PULSE_WEBHOOK_SENTIMENT not set; skipping sentiment summary")
            }
        }
    }

    /// Send today's per-category report to the report webhook.
    pub async fn run_daily_report(&self) -> Result<()> {
        let retention = RetentionManager::open(self.sentiment_path()).await;
        let today = RetentionManager::date_key(Local::now().date_naive());
        let report = build_daily_report(&retention, &today);

        match &self.config.report_webhook {
            Some(url) => {
                if let Err(err) = self.notifier.send_daily_report(url, &report).await {
                    warn!(%err, "daily report delivery failed");
                }
            }
            None => warn!("configuration: PULSE_WEBHOOK_REPORT not set; skipping daily report"),
        }
        Ok(())
    }

    pub async fn stats(&self) -> RetentionStats {
        RetentionManager::open(self.sentiment_path()).await.stats()
    }
}

/// Group one day's retained posts into per-category report sections, in
/// fixed category order.
pub fn build_daily_report(retention: &RetentionManager, date_key: &str) -> DailyReport {
    let posts = retention.get_daily(date_key);
    let sections = Category::ALL
        .iter()
        .map(|&category| CategorySection {
            category,
            posts: posts
                .iter()
                .filter(|p| p.category == category)
                .cloned()
                .collect(),
        })
        .collect();
    DailyReport {
        date_key: date_key.to_string(),
        sections,
    }
}

/// Build the cron scheduler when enabled: a fast bug-board job and a full
/// crawl job, each running one crawl cycle.
pub async fn build_scheduler(pipeline: Arc<Pipeline>) -> Result<Option<JobScheduler>> {
    if !pipeline.config.scheduler_enabled {
        return Ok(None);
    }

    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let jobs = [
        (pipeline.config.crawl_cron_bug.clone(), RunMode::Bug),
        (pipeline.config.crawl_cron_global.clone(), RunMode::All),
    ];
    for (cron, mode) in jobs {
        let pipeline = pipeline.clone();
        let job = Job::new_async(cron.as_str(), move |_uuid, _l| {
            let pipeline = pipeline.clone();
            Box::pin(async move {
                match pipeline.run_crawl_once(mode).await {
                    Ok(summary) => info!(
                        run_id = %summary.run_id,
                        mode = %summary.mode,
                        fetched = summary.fetched,
                        "scheduled crawl finished"
                    ),
                    Err(err) => error!(%err, "scheduled crawl failed"),
                }
            })
        })
        .with_context(|| format!("creating scheduler job for cron {cron}"))?;
        sched.add(job).await.context("adding scheduler job")?;
    }
    Ok(Some(sched))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn post(title: &str, category: Category) -> PostRecord {
        PostRecord {
            title: title.to_string(),
            url: None,
            source: "test-board".to_string(),
            category,
            processed_time: Local.with_ymd_and_hms(2025, 7, 16, 9, 0, 0).single().unwrap(),
        }
    }

    #[test]
    fn run_mode_selects_groups() {
        assert_eq!(RunMode::Bug.groups(), &[SourceGroup::BugBoard]);
        assert_eq!(RunMode::Global.groups(), &[SourceGroup::Global]);
        assert_eq!(
            RunMode::All.groups(),
            &[SourceGroup::BugBoard, SourceGroup::Global]
        );
    }

    #[test]
    fn tally_counts_every_category() {
        let posts = vec![
            post("a", Category::Bug),
            post("b", Category::Bug),
            post("c", Category::Positive),
            post("d", Category::Other),
        ];
        let counts = CategoryCounts::tally(&posts);
        assert_eq!(counts.bug, 2);
        assert_eq!(counts.positive, 1);
        assert_eq!(counts.negative, 0);
        assert_eq!(counts.other, 1);
    }

    #[test]
    fn parse_bool_accepts_common_truthy_spellings() {
        assert!(parse_bool("1"));
        assert!(parse_bool("true"));
        assert!(parse_bool("True"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("yes"));
    }

    #[tokio::test]
    async fn missing_bug_webhook_does_not_mark_posts_seen() {
        let dir = tempdir().unwrap();
        let config = PipelineConfig {
            data_dir: dir.path().to_path_buf(),
            sources_file: dir.path().join("sources.yaml"),
            bug_webhook: None,
            sentiment_webhook: None,
            report_webhook: None,
            http_timeout_secs: 1,
            jitter_ms: (0, 0),
            scheduler_enabled: false,
            crawl_cron_bug: "0 */10 * * * *".to_string(),
            crawl_cron_global: "0 0 * * * *".to_string(),
        };
        let pipeline = Pipeline::new(config).unwrap();

        let bugs = vec![post("오류 제보", Category::Bug)];
        assert_eq!(pipeline.alert_new_bugs(&bugs).await, 0);
        // Nothing was delivered, so nothing may be suppressed.
        assert!(!dir.path().join(SEEN_LINKS_FILE).exists());

        let seen = SeenLinks::new(dir.path().join(SEEN_LINKS_FILE));
        let session = seen.begin().await.unwrap();
        assert_eq!(session.filter_new(&bugs).len(), 1);
    }

    #[tokio::test]
    async fn daily_report_sections_follow_category_order() {
        let dir = tempdir().unwrap();
        let mut retention = RetentionManager::open(dir.path().join(SENTIMENT_FILE)).await;
        let now = Local.with_ymd_and_hms(2025, 7, 16, 9, 0, 0).single().unwrap();
        retention
            .add_at(
                vec![
                    post("오류 제보", Category::Bug),
                    post("꿀잼", Category::Positive),
                    post("공지", Category::Other),
                ],
                now,
            )
            .await;

        let report = build_daily_report(&retention, "2025-07-16");
        assert_eq!(report.sections.len(), 4);
        assert_eq!(report.sections[0].category, Category::Bug);
        assert_eq!(report.sections[0].posts.len(), 1);
        assert_eq!(report.sections[1].posts.len(), 1);
        assert_eq!(report.sections[2].posts.len(), 0);
        assert_eq!(report.sections[3].posts.len(), 1);
    }
}
