//! レビューの抽出と重複排除

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{attr, first_match, lines_of, parse_rating, text_of, truncate_chars};
use crate::selectors::compiled;

pub const DEFAULT_REVIEWER: &str = "Amazon Customer";
/// これより短い本文のレビューは採用しない
const MIN_REVIEW_TEXT_CHARS: usize = 20;
/// レビュー要素とみなす本文の最低長
const MIN_BODY_CHARS: usize = 10;

static TITLE_STAR_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\d+(?:[.,]\d+)?\s+out of \d+ stars|\d+つ星のうち\d+(?:[.,]\d+)?)\s*")
        .expect("valid title prefix regex")
});

/// CSVに出力するレビュー1件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub asin: String,
    pub rating: Option<f32>,
    pub title: String,
    pub text: String,
    pub reviewer: String,
    pub date: String,
    pub page: u32,
}

/// ページから抽出したレビュー（識別子付き）
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReview {
    pub id: String,
    pub rating: Option<f32>,
    pub title: String,
    pub text: String,
    pub reviewer: String,
    pub date: String,
}

impl ParsedReview {
    pub fn into_review(self, asin: &str, page: u32) -> Review {
        Review {
            asin: asin.to_string(),
            rating: self.rating,
            title: self.title,
            text: self.text,
            reviewer: self.reviewer,
            date: self.date,
            page,
        }
    }
}

/// レビューページのHTMLからレビューを抽出
///
/// 本文が短すぎるものは除外する。重複排除は [`ReviewCollector`] で行う。
pub fn parse_reviews(html: &str) -> Vec<ParsedReview> {
    let document = Html::parse_document(html);
    review_elements(&document)
        .into_iter()
        .filter_map(|el| extract_review(&el))
        .collect()
}

fn review_elements(document: &Html) -> Vec<ElementRef<'_>> {
    for selector in compiled::REVIEW_CONTAINERS.iter() {
        let found: Vec<_> = document.select(selector).collect();
        if !found.is_empty() {
            return found.into_iter().filter(is_review_element).collect();
        }
    }

    // 構造が変わった場合: 本文と星評価を含む最も内側の div
    let Some(div) = compiled::DIV.as_ref() else {
        return Vec::new();
    };
    let candidates: Vec<_> = document.select(div).filter(is_review_element).collect();
    candidates
        .iter()
        .filter(|outer| {
            !candidates
                .iter()
                .any(|inner| inner.id() != outer.id() && inner.ancestors().any(|a| a.id() == outer.id()))
        })
        .copied()
        .collect()
}

fn is_review_element(el: &ElementRef<'_>) -> bool {
    let (Some(body_sel), Some(star_sel)) = (
        compiled::REVIEW_BODY_MARKER.as_ref(),
        compiled::REVIEW_STAR_MARKER.as_ref(),
    ) else {
        return false;
    };

    let Some(body) = first_match(el, body_sel) else {
        return false;
    };
    if first_match(el, star_sel).is_none() {
        return false;
    }
    text_of(&body).chars().count() > MIN_BODY_CHARS
}

fn extract_review(el: &ElementRef<'_>) -> Option<ParsedReview> {
    let text = review_text(el);
    if text.chars().count() < MIN_REVIEW_TEXT_CHARS {
        return None;
    }

    let rating = compiled::REVIEW_RATING
        .iter()
        .filter_map(|s| first_match(el, s))
        .map(|e| text_of(&e))
        .find(|t| !t.is_empty())
        .and_then(|t| parse_rating(&t));

    let title = compiled::REVIEW_TITLE
        .iter()
        .filter_map(|s| first_match(el, s))
        .map(|e| text_of(&e))
        .find(|t| !t.is_empty())
        .map(|t| TITLE_STAR_PREFIX.replace(&t, "").trim().to_string())
        .unwrap_or_default();

    let reviewer = compiled::REVIEW_AUTHOR
        .as_ref()
        .and_then(|s| first_match(el, s))
        .map(|e| text_of(&e))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_REVIEWER.to_string());

    let date = compiled::REVIEW_DATE
        .as_ref()
        .and_then(|s| first_match(el, s))
        .map(|e| text_of(&e))
        .unwrap_or_default();

    let id = review_id(el).unwrap_or_else(|| review_fingerprint(&title, rating, &text));

    Some(ParsedReview {
        id,
        rating,
        title,
        text,
        reviewer,
        date,
    })
}

fn review_text(el: &ElementRef<'_>) -> String {
    if let Some(text) = compiled::REVIEW_BODY
        .iter()
        .filter_map(|s| first_match(el, s))
        .map(|e| text_of(&e))
        .find(|t| !t.is_empty())
    {
        return text;
    }

    // 本文が見つからない場合は最も長い行を本文とみなす
    lines_of(el)
        .into_iter()
        .max_by_key(|l| l.chars().count())
        .unwrap_or_default()
}

fn review_id(el: &ElementRef<'_>) -> Option<String> {
    if let Some(id) = attr(el, "data-review-id") {
        return Some(id);
    }
    if let Some(id) = compiled::REVIEW_ID_CARRIER
        .as_ref()
        .and_then(|s| first_match(el, s))
        .and_then(|e| attr(&e, "data-review-id"))
    {
        return Some(id);
    }
    if let Some(id) = attr(el, "id") {
        return Some(id);
    }
    compiled::REVIEW_ID_FALLBACK
        .as_ref()
        .and_then(|s| first_match(el, s))
        .and_then(|e| attr(&e, "id"))
}

/// 識別子を持たないレビュー用のフィンガープリント（16桁の16進）
pub fn review_fingerprint(title: &str, rating: Option<f32>, text: &str) -> String {
    let rating = rating.map(|r| format!("{:.1}", r)).unwrap_or_default();
    let combined = format!(
        "{}|{}|{}",
        truncate_chars(title, 20),
        rating,
        truncate_chars(text, 100)
    );
    let digest = format!("{:x}", Sha256::digest(combined.as_bytes()));
    digest[..16].to_string()
}

/// ページをまたいでレビューを重複排除しながら集める
#[derive(Debug, Default)]
pub struct ReviewCollector {
    seen: HashSet<String>,
}

impl ReviewCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 未出のレビューだけを `Review` に変換して返す
    pub fn accept_page(&mut self, parsed: Vec<ParsedReview>, asin: &str, page: u32) -> Vec<Review> {
        parsed
            .into_iter()
            .filter(|r| self.seen.insert(r.id.clone()))
            .map(|r| r.into_review(asin, page))
            .collect()
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}
