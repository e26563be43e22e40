//! Webhook notifications: bug alerts, sentiment summaries, daily reports.
//!
//! Messages are posted as `{"content": "<text>"}`; HTTP 200 and 204 count as
//! delivered. Delivery failure is a typed error the orchestrator logs and
//! ignores, so a dead webhook never aborts a crawl.

use std::time::Duration;

use anyhow::Context;
use pulse_core::{Category, PostRecord};
use thiserror::Error;
use tracing::{info, warn};

pub const CRATE_NAME: &str = "pulse-notify";

/// At most this many posts are listed per message section; the rest are
/// summarized as an overflow count.
pub const MAX_ITEMS_PER_SECTION: usize = 5;

/// Hard cap on outgoing message length (Discord-style webhook limit).
pub const MAX_CONTENT_CHARS: usize = 2000;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook returned http status {status}")]
    HttpStatus { status: u16 },
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct CategorySection {
    pub category: Category,
    pub posts: Vec<PostRecord>,
}

#[derive(Debug, Clone)]
pub struct DailyReport {
    pub date_key: String,
    pub sections: Vec<CategorySection>,
}

#[derive(Debug)]
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building webhook client")?;
        Ok(Self { client })
    }

    pub async fn post_content(&self, webhook_url: &str, content: &str) -> Result<(), NotifyError> {
        let body = serde_json::json!({ "content": truncate_content(content) });
        let resp = self.client.post(webhook_url).json(&body).send().await?;
        let status = resp.status();
        if status.as_u16() == 200 || status.as_u16() == 204 {
            info!(status = status.as_u16(), "webhook delivered");
            Ok(())
        } else {
            warn!(status = status.as_u16(), "webhook rejected message");
            Err(NotifyError::HttpStatus {
                status: status.as_u16(),
            })
        }
    }

    pub async fn send_bug_alert(
        &self,
        webhook_url: &str,
        posts: &[PostRecord],
    ) -> Result<(), NotifyError> {
        self.post_content(webhook_url, &format_bug_alert(posts)).await
    }

    pub async fn send_daily_report(
        &self,
        webhook_url: &str,
        report: &DailyReport,
    ) -> Result<(), NotifyError> {
        self.post_content(webhook_url, &format_daily_report(report))
            .await
    }
}

fn section_label(category: Category) -> &'static str {
    match category {
        Category::Bug => "🐞 버그",
        Category::Positive => "👍 긍정",
        Category::Negative => "👎 부정",
        Category::Other => "📄 기타",
    }
}

fn push_post_lines(out: &mut String, posts: &[PostRecord]) {
    for post in posts.iter().take(MAX_ITEMS_PER_SECTION) {
        let title = if post.title.trim().is_empty() {
            "(제목 없음)"
        } else {
            post.title.trim()
        };
        match &post.url {
            Some(url) => out.push_str(&format!("- {title}\n  <{url}>\n")),
            None => out.push_str(&format!("- {title}\n")),
        }
    }
    if posts.len() > MAX_ITEMS_PER_SECTION {
        out.push_str(&format!("…외 {}건\n", posts.len() - MAX_ITEMS_PER_SECTION));
    }
}

pub fn format_bug_alert(posts: &[PostRecord]) -> String {
    let mut out = format!("🚨 버그 의심 글 {}건 감지\n", posts.len());
    push_post_lines(&mut out, posts);
    out
}

pub fn format_daily_report(report: &DailyReport) -> String {
    let mut out = format!("📊 {} 커뮤니티 동향 리포트\n", report.date_key);
    for section in &report.sections {
        out.push_str(&format!(
            "\n{} {}건\n",
            section_label(section.category),
            section.posts.len()
        ));
        push_post_lines(&mut out, &section.posts);
    }
    out
}

pub fn format_sentiment_summary(positive: usize, negative: usize, other: usize) -> String {
    format!(
        "🌡️ 커뮤니티 반응: 긍정 {positive}건 / 부정 {negative}건 / 기타 {other}건"
    )
}

/// Trim to the webhook's content limit on a character boundary.
fn truncate_content(content: &str) -> &str {
    match content.char_indices().nth(MAX_CONTENT_CHARS) {
        Some((idx, _)) => &content[..idx],
        None => content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};

    fn post(title: &str, url: Option<&str>) -> PostRecord {
        PostRecord {
            title: title.to_string(),
            url: url.map(str::to_string),
            source: "test-board".to_string(),
            category: Category::Bug,
            processed_time: Local.with_ymd_and_hms(2025, 7, 16, 9, 0, 0).single().unwrap(),
        }
    }

    #[test]
    fn bug_alert_lists_posts_with_links() {
        let msg = format_bug_alert(&[
            post("오류 제보", Some("https://b.example.com/1")),
            post("crash on login", None),
        ]);
        assert!(msg.starts_with("🚨 버그 의심 글 2건"));
        assert!(msg.contains("- 오류 제보\n  <https://b.example.com/1>"));
        assert!(msg.contains("- crash on login"));
    }

    #[test]
    fn bug_alert_caps_listing_and_reports_overflow() {
        let posts: Vec<PostRecord> = (0..8).map(|i| post(&format!("bug {i}"), None)).collect();
        let msg = format_bug_alert(&posts);
        assert!(msg.contains("bug 4"));
        assert!(!msg.contains("bug 5"));
        assert!(msg.contains("…외 3건"));
    }

    #[test]
    fn daily_report_renders_every_section() {
        let report = DailyReport {
            date_key: "2025-07-16".to_string(),
            sections: vec![
                CategorySection {
                    category: Category::Bug,
                    posts: vec![post("오류", None)],
                },
                CategorySection {
                    category: Category::Positive,
                    posts: Vec::new(),
                },
            ],
        };
        let msg = format_daily_report(&report);
        assert!(msg.contains("2025-07-16"));
        assert!(msg.contains("🐞 버그 1건"));
        assert!(msg.contains("👍 긍정 0건"));
    }

    #[test]
    fn empty_titles_get_a_placeholder() {
        let msg = format_bug_alert(&[post("   ", None)]);
        assert!(msg.contains("(제목 없음)"));
    }

    #[test]
    fn content_is_truncated_on_char_boundary() {
        let long = "가".repeat(MAX_CONTENT_CHARS + 50);
        let cut = truncate_content(&long);
        assert_eq!(cut.chars().count(), MAX_CONTENT_CHARS);
    }
}
