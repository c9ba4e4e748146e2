//! HTML解析（ブラウザ非依存）
//!
//! ブラウザから取得したページHTMLを `scraper` で解析する。
//! ブラウザ操作と切り離してあるため、保存したHTMLでテストできる。

mod page;
mod product;
mod review;

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Selector};

pub use page::{
    current_page_number, has_review_containers, is_captcha_page, is_login_page,
    is_two_factor_page, keyword_filter_applied, login_succeeded, PageSnapshot,
};
pub use product::{
    blocking_reason, parse_product_page, parse_search_results, ProductInfo, DEFAULT_PRICE,
    DEFAULT_RATING, DEFAULT_REVIEW_COUNT, DEFAULT_TITLE, UNKNOWN_ASIN,
};
pub use review::{
    parse_reviews, review_fingerprint, ParsedReview, Review, ReviewCollector, DEFAULT_REVIEWER,
};

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:[.,]\d+)?)").expect("valid number regex"));
static COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d[\d,.]*)\s*([KkMm])?\b").expect("valid count regex"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// 要素のテキスト（空白を1つに詰める）
pub(crate) fn text_of(el: &ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

/// 要素のテキストを行単位で取得
pub(crate) fn lines_of(el: &ElementRef<'_>) -> Vec<String> {
    el.text()
        .flat_map(|t| t.lines())
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

pub(crate) fn collapse_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").into_owned()
}

pub(crate) fn attr(el: &ElementRef<'_>, name: &str) -> Option<String> {
    el.value()
        .attr(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// 最初に一致した子孫要素
pub(crate) fn first_match<'a>(el: &ElementRef<'a>, selector: &Selector) -> Option<ElementRef<'a>> {
    el.select(selector).next()
}

/// テキスト中の最初の数値（小数点は `.` と `,` の両方を許容）
pub(crate) fn first_number(text: &str) -> Option<f32> {
    NUMBER
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().replace(',', ".").parse::<f32>().ok())
}

/// 1〜5の範囲の評価値を取り出す
pub(crate) fn parse_rating(text: &str) -> Option<f32> {
    // amazon.co.jp: "5つ星のうち3.8"
    let text = match text.find("のうち") {
        Some(idx) => &text[idx..],
        None => text,
    };
    first_number(text).filter(|v| (1.0..=5.0).contains(v))
}

/// 件数表記を数値化（"1,234" / "(3.9K)" / "1.2M ratings"）
pub(crate) fn parse_count(text: &str) -> Option<u64> {
    let trimmed = text.trim().trim_start_matches('(').trim_end_matches(')');
    let caps = COUNT.captures(trimmed)?;
    let digits = caps.get(1)?.as_str();
    match caps.get(2).map(|m| m.as_str().to_ascii_uppercase()) {
        Some(suffix) => {
            let value: f64 = digits.replace(',', ".").parse().ok()?;
            let multiplier = if suffix == "K" { 1_000.0 } else { 1_000_000.0 };
            Some((value * multiplier).round() as u64)
        }
        None => {
            let plain: String = digits.chars().filter(|c| c.is_ascii_digit()).collect();
            plain.parse().ok()
        }
    }
}

pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rating() {
        assert_eq!(parse_rating("4.5 out of 5 stars"), Some(4.5));
        assert_eq!(parse_rating("4,3 von 5 Sternen"), Some(4.3));
        assert_eq!(parse_rating("5つ星のうち3.8"), Some(3.8));
        assert_eq!(parse_rating("0 out of 5"), None);
        assert_eq!(parse_rating("no digits"), None);
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("3,943 ratings"), Some(3943));
        assert_eq!(parse_count("(3.9K)"), Some(3900));
        assert_eq!(parse_count("1.2M global ratings"), Some(1_200_000));
        assert_eq!(parse_count("12"), Some(12));
        assert_eq!(parse_count("12 more"), Some(12));
        assert_eq!(parse_count("Customer reviews"), None);
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \n\n b\tc "), "a b c");
    }
}
