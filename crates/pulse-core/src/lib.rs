//! Core domain model and keyword classification for Pulse.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const CRATE_NAME: &str = "pulse-core";

/// Sentiment bucket assigned to a community post title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Bug,
    Positive,
    Negative,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Bug => "bug",
            Category::Positive => "positive",
            Category::Negative => "negative",
            Category::Other => "other",
        }
    }

    pub const ALL: [Category; 4] = [
        Category::Bug,
        Category::Positive,
        Category::Negative,
        Category::Other,
    ];
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unclassified post as produced by a source adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPost {
    pub title: String,
    pub url: Option<String>,
    pub source: String,
}

/// Classified post as retained in the sentiment store.
///
/// `processed_time` is stamped by the retention manager at the moment the
/// record is accepted, not by the fetcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub title: String,
    pub url: Option<String>,
    pub source: String,
    pub category: Category,
    pub processed_time: DateTime<Local>,
}

impl PostRecord {
    pub fn from_raw(raw: RawPost, category: Category, processed_time: DateTime<Local>) -> Self {
        Self {
            title: raw.title,
            url: raw.url,
            source: raw.source,
            category,
            processed_time,
        }
    }
}

// Keyword lists are bilingual (Korean + English) because the communities the
// crawler watches mix both. Matching is substring containment on the
// lower-cased title, so a keyword may match inside a longer word.

const BUG_KEYWORDS: &[&str] = &[
    "버그",
    "오류",
    "튕김",
    "팅김",
    "렉걸",
    "먹통",
    "크래시",
    "글리치",
    "bug",
    "error",
    "crash",
    "freeze",
    "glitch",
    "lag",
    "broken",
];

/// Overrides a bug keyword: the post is talking about a fix, not a problem.
const FIXED_KEYWORDS: &[&str] = &[
    "수정",
    "해결",
    "고침",
    "고쳐",
    "패치됨",
    "fixed",
    "resolved",
    "patched",
    "solved",
];

const POSITIVE_KEYWORDS: &[&str] = &[
    "좋아",
    "재밌",
    "꿀잼",
    "혜자",
    "갓겜",
    "감사",
    "최고",
    "fun",
    "great",
    "awesome",
    "love",
    "amazing",
    "best",
];

const NEGATIVE_KEYWORDS: &[&str] = &[
    "노잼",
    "망겜",
    "쓰레기",
    "실망",
    "접는다",
    "접음",
    "환불",
    "별로",
    "boring",
    "terrible",
    "awful",
    "hate",
    "worst",
    "refund",
    "uninstall",
];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Classify a post title by keyword matching.
///
/// Priority: bug (unless an already-fixed override keyword is present),
/// then positive, then negative, then other. Case-insensitive.
pub fn classify(title: &str) -> Category {
    let lowered = title.to_lowercase();
    if lowered.trim().is_empty() {
        return Category::Other;
    }
    if contains_any(&lowered, BUG_KEYWORDS) && !contains_any(&lowered, FIXED_KEYWORDS) {
        return Category::Bug;
    }
    if contains_any(&lowered, POSITIVE_KEYWORDS) {
        return Category::Positive;
    }
    if contains_any(&lowered, NEGATIVE_KEYWORDS) {
        return Category::Negative;
    }
    Category::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_title_is_other() {
        assert_eq!(classify(""), Category::Other);
        assert_eq!(classify("   "), Category::Other);
    }

    #[test]
    fn bug_keyword_classifies_as_bug() {
        assert_eq!(classify("전투 중 오류 발생합니다"), Category::Bug);
        assert_eq!(classify("game keeps crashing on login"), Category::Bug);
    }

    #[test]
    fn fixed_override_beats_bug_keyword() {
        // A post mentioning both the problem and its fix is not a bug report.
        let category = classify("오류 수정 패치 안내");
        assert_ne!(category, Category::Bug);
    }

    #[test]
    fn classification_is_case_insensitive() {
        assert_eq!(classify("ERROR in battle"), classify("error in battle"));
        assert_eq!(classify("ERROR in battle"), Category::Bug);
    }

    #[test]
    fn substring_matching_is_intentional() {
        // "buggy" contains "bug"; word boundaries are not applied.
        assert_eq!(classify("this update is buggy"), Category::Bug);
    }

    #[test]
    fn positive_and_negative_titles() {
        assert_eq!(classify("이번 이벤트 꿀잼이네요"), Category::Positive);
        assert_eq!(classify("this patch is terrible"), Category::Negative);
    }

    #[test]
    fn unmatched_title_is_other() {
        assert_eq!(classify("공지사항 안내"), Category::Other);
    }

    #[test]
    fn bug_wins_over_negative() {
        assert_eq!(classify("terrible lag in arena"), Category::Bug);
    }
}
