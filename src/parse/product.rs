//! 商品情報の抽出（検索結果・商品ページ）

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};

use super::page::{is_captcha_title, is_sign_in_location, PageSnapshot};
use super::{attr, collapse_whitespace, first_match, parse_count, parse_rating, text_of, truncate_chars};
use crate::query::{extract_asin_from_url, is_asin};
use crate::selectors::compiled;

pub const UNKNOWN_ASIN: &str = "UNKNOWN";
pub const DEFAULT_TITLE: &str = "Title not found";
pub const DEFAULT_PRICE: &str = "Price not available";
pub const DEFAULT_RATING: &str = "No rating";
pub const DEFAULT_REVIEW_COUNT: &str = "0";
const MISSING: &str = "N/A";

const SEARCH_TITLE_MAX_CHARS: usize = 120;
const PRODUCT_TITLE_MAX_CHARS: usize = 150;
const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥', '￥'];

static SOURCE_ASIN_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"(?i)"ASIN"\s*:\s*"([A-Z0-9]{10})""#,
        r#"(?i)ASIN["']?\s*:\s*["']?([A-Z0-9]{10})"#,
        r#"(?i)var asin = "([A-Z0-9]{10})""#,
        r#"(?i)data-asin="([A-Z0-9]{10})""#,
        r#"(?i)input[^>]*name="ASIN"[^>]*value="([A-Z0-9]{10})""#,
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});
static TITLE_ASIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z0-9]{10})\b").expect("valid title asin regex"));
static PRICE_NOISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\d.,$€£¥￥\s]").expect("valid price regex"));
static BODY_PRICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[$€£¥￥]\s*\d+[.,]?\d*").expect("valid body price regex"));

/// 商品情報
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductInfo {
    /// 検索結果上の位置（1始まり）
    pub index: usize,
    pub asin: String,
    pub title: String,
    pub price: String,
    pub rating: String,
    pub reviews_count: String,
    /// 抽出に失敗した項目の記録
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extraction_errors: Vec<String>,
}

impl Default for ProductInfo {
    fn default() -> Self {
        Self {
            index: 1,
            asin: UNKNOWN_ASIN.to_string(),
            title: DEFAULT_TITLE.to_string(),
            price: DEFAULT_PRICE.to_string(),
            rating: DEFAULT_RATING.to_string(),
            reviews_count: DEFAULT_REVIEW_COUNT.to_string(),
            extraction_errors: Vec::new(),
        }
    }
}

impl ProductInfo {
    pub fn has_valid_asin(&self) -> bool {
        is_asin(&self.asin)
    }

    /// 一覧表示用の短いタイトル
    pub fn short_title(&self, max_chars: usize) -> String {
        if self.title.chars().count() > max_chars {
            format!("{}...", truncate_chars(&self.title, max_chars))
        } else {
            self.title.clone()
        }
    }

    /// 空欄を `N/A` で埋める
    fn finalize(&mut self) {
        for field in [
            &mut self.asin,
            &mut self.title,
            &mut self.price,
            &mut self.rating,
            &mut self.reviews_count,
        ] {
            if field.trim().is_empty() {
                *field = MISSING.to_string();
            }
        }
    }
}

/// 検索結果ページから商品一覧を抽出
pub fn parse_search_results(html: &str, max_results: usize) -> Vec<ProductInfo> {
    let Some(result_selector) = compiled::SEARCH_RESULT.as_ref() else {
        return Vec::new();
    };
    let document = Html::parse_document(html);

    document
        .select(result_selector)
        .take(max_results)
        .enumerate()
        .filter_map(|(i, card)| {
            let asin = attr(&card, "data-asin").filter(|a| a.len() == 10)?;
            Some(ProductInfo {
                index: i + 1,
                asin,
                title: search_title(&card).unwrap_or_else(|| DEFAULT_TITLE.to_string()),
                price: search_price(&card).unwrap_or_else(|| DEFAULT_PRICE.to_string()),
                rating: search_rating(&card).unwrap_or_else(|| DEFAULT_RATING.to_string()),
                reviews_count: search_review_count(&card)
                    .unwrap_or_else(|| DEFAULT_REVIEW_COUNT.to_string()),
                extraction_errors: Vec::new(),
            })
        })
        .collect()
}

fn search_title(card: &ElementRef<'_>) -> Option<String> {
    let from_span = compiled::H2_SPAN
        .as_ref()
        .and_then(|s| first_match(card, s))
        .map(|el| text_of(&el))
        .filter(|t| !t.is_empty());

    let title = from_span.or_else(|| {
        let h2 = compiled::H2.as_ref().and_then(|s| first_match(card, s))?;
        attr(&h2, "aria-label").or_else(|| Some(text_of(&h2)).filter(|t| !t.is_empty()))
    })?;

    Some(truncate_chars(&title, SEARCH_TITLE_MAX_CHARS))
}

fn search_price(card: &ElementRef<'_>) -> Option<String> {
    compiled::SEARCH_PRICE
        .iter()
        .filter_map(|s| first_match(card, s))
        .map(|el| text_of(&el))
        .find(|t| !t.is_empty())
}

fn search_rating(card: &ElementRef<'_>) -> Option<String> {
    for selector in compiled::SEARCH_RATING.iter() {
        let Some(el) = first_match(card, selector) else {
            continue;
        };
        let text = attr(&el, "aria-label")
            .or_else(|| Some(text_of(&el)).filter(|t| !t.is_empty()))
            .unwrap_or_else(|| el.inner_html());

        let bare_number = !text.is_empty() && text.replace('.', "").chars().all(|c| c.is_ascii_digit());
        if !(text.contains("out of") || text.contains("のうち") || bare_number) {
            continue;
        }
        if let Some(value) = parse_rating(&text) {
            return Some(format_rating(value));
        }
    }
    None
}

fn search_review_count(card: &ElementRef<'_>) -> Option<String> {
    for selector in compiled::SEARCH_REVIEW_COUNT.iter() {
        let Some(el) = first_match(card, selector) else {
            continue;
        };

        // aria-label に完全な件数が入っていることが多い
        if let Some(label) = attr(&el, "aria-label").filter(|l| l.contains("ratings")) {
            if let Some(count) = parse_count(&label) {
                return Some(count.to_string());
            }
        }

        let text = text_of(&el);
        let inner = text.trim_start_matches('(').trim_end_matches(')');
        let has_suffix = inner.contains(['K', 'M']);
        if has_suffix || (!inner.is_empty() && inner.chars().all(|c| c.is_ascii_digit() || c == ',')) {
            if let Some(count) = parse_count(inner) {
                return Some(count.to_string());
            }
        }
    }
    None
}

/// 商品ページから商品情報を抽出
///
/// ブロック判定は遷移後のURL（`page.url`）、ASINは要求したURLで行う。
pub fn parse_product_page(page: &PageSnapshot, requested_url: &str) -> ProductInfo {
    let mut info = ProductInfo::default();

    if let Some(reason) = blocking_reason(&page.url, &page.title) {
        info.extraction_errors.push(reason.to_string());
        return info;
    }

    let document = Html::parse_document(&page.html);
    let root = document.root_element();

    match product_asin(&page.html, requested_url, &root) {
        Some(asin) => info.asin = asin,
        None => info.extraction_errors.push("ASIN not found".to_string()),
    }

    match product_title(&root) {
        Some(title) => info.title = title,
        None => info
            .extraction_errors
            .push("Title not found with any selector".to_string()),
    }

    match product_price(&root) {
        Some(price) => info.price = price,
        None => info
            .extraction_errors
            .push("Price not found with any method".to_string()),
    }

    match product_rating(&root) {
        Some(rating) => info.rating = rating,
        None => info
            .extraction_errors
            .push("Rating not found with any selector".to_string()),
    }

    match product_review_count(&root) {
        Some(count) => info.reviews_count = count,
        None => info
            .extraction_errors
            .push("Review count not found with any method".to_string()),
    }

    info.finalize();
    info
}

/// ログイン・CAPTCHA ページへ飛ばされた場合の理由
pub fn blocking_reason(current_url: &str, page_title: &str) -> Option<&'static str> {
    if is_sign_in_location(current_url, page_title) {
        Some("Login required")
    } else if is_captcha_title(page_title) {
        Some("CAPTCHA/robot detection")
    } else {
        None
    }
}

fn product_asin(html: &str, url: &str, root: &ElementRef<'_>) -> Option<String> {
    if let Some(asin) = extract_asin_from_url(url) {
        return Some(asin);
    }

    if let Some(asin) = compiled::PRODUCT_ASIN_INPUT
        .as_ref()
        .and_then(|s| first_match(root, s))
        .and_then(|el| attr(&el, "value"))
        .filter(|v| v.len() == 10)
    {
        return Some(asin.to_ascii_uppercase());
    }

    if let Some(asin) = SOURCE_ASIN_PATTERNS
        .iter()
        .find_map(|re| re.captures(html))
        .and_then(|c| c.get(1))
    {
        return Some(asin.as_str().to_ascii_uppercase());
    }

    // ページタイトル（数字を含む10文字の英数字のみ）
    let title = compiled::TITLE
        .as_ref()
        .and_then(|s| first_match(root, s))
        .map(|el| text_of(&el))?;
    TITLE_ASIN
        .captures_iter(&title)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .find(|s| s.chars().any(|c| c.is_ascii_digit()))
        .map(str::to_string)
}

fn product_title(root: &ElementRef<'_>) -> Option<String> {
    compiled::PRODUCT_TITLE
        .iter()
        .filter_map(|s| first_match(root, s))
        .map(|el| text_of(&el))
        .find(|t| t.chars().count() > 3)
        .map(|t| truncate_chars(&t, PRODUCT_TITLE_MAX_CHARS))
}

fn product_price(root: &ElementRef<'_>) -> Option<String> {
    for selector in compiled::PRODUCT_PRICE.iter() {
        let Some(el) = first_match(root, selector) else {
            continue;
        };
        let text = text_of(&el);
        if !text.contains(CURRENCY_SYMBOLS) {
            continue;
        }
        let cleaned = collapse_whitespace(&PRICE_NOISE.replace_all(&text, ""));
        if !cleaned.is_empty() {
            return Some(cleaned);
        }
    }

    // 本文中の最初の金額表記
    let body = compiled::BODY
        .as_ref()
        .and_then(|s| first_match(root, s))
        .map(|el| text_of(&el))?;
    BODY_PRICE.find(&body).map(|m| m.as_str().to_string())
}

fn product_rating(root: &ElementRef<'_>) -> Option<String> {
    compiled::PRODUCT_RATING
        .iter()
        .filter_map(|s| first_match(root, s))
        .filter_map(|el| {
            let text = attr(&el, "aria-label")
                .or_else(|| Some(text_of(&el)).filter(|t| !t.is_empty()))
                .unwrap_or_else(|| el.inner_html());
            parse_rating(&text)
        })
        .next()
        .map(format_rating)
}

fn product_review_count(root: &ElementRef<'_>) -> Option<String> {
    compiled::PRODUCT_REVIEW_COUNT
        .iter()
        .filter_map(|s| first_match(root, s))
        .filter_map(|el| {
            let text = attr(&el, "aria-label")
                .or_else(|| Some(text_of(&el)).filter(|t| !t.is_empty()))?;
            parse_count(&text).filter(|count| *count > 0)
        })
        .next()
        .map(|count| count.to_string())
}

fn format_rating(value: f32) -> String {
    format!("{:.1}", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_HTML: &str = r##"
    <html><body>
      <div data-component-type="s-search-result" data-asin="B000000001">
        <h2 aria-label="Wireless Earbuds, Bluetooth 5.3"><span>Wireless Earbuds, Bluetooth 5.3</span></h2>
        <span class="a-price"><span class="a-offscreen">$29.99</span></span>
        <span class="a-icon-alt">4.4 out of 5 stars</span>
        <a aria-label="3,943 ratings" href="#"><span>(3.9K)</span></a>
      </div>
      <div data-component-type="s-search-result" data-asin="">
        <h2><span>Sponsored widget</span></h2>
      </div>
      <div data-component-type="s-search-result" data-asin="B000000003">
        <h2 aria-label="Budget Earbuds"></h2>
        <span class="a-size-base s-underline-text">(12.5K)</span>
      </div>
    </body></html>
    "##;

    #[test]
    fn test_parse_search_results() {
        let products = parse_search_results(SEARCH_HTML, 10);
        assert_eq!(products.len(), 2);

        let first = &products[0];
        assert_eq!(first.index, 1);
        assert_eq!(first.asin, "B000000001");
        assert_eq!(first.title, "Wireless Earbuds, Bluetooth 5.3");
        assert_eq!(first.price, "$29.99");
        assert_eq!(first.rating, "4.4");
        assert_eq!(first.reviews_count, "3943");

        // 位置は元の並びを保持
        let second = &products[1];
        assert_eq!(second.index, 3);
        assert_eq!(second.title, "Budget Earbuds");
        assert_eq!(second.price, DEFAULT_PRICE);
        assert_eq!(second.rating, DEFAULT_RATING);
        assert_eq!(second.reviews_count, "12500");
    }

    #[test]
    fn test_parse_search_results_respects_limit() {
        let products = parse_search_results(SEARCH_HTML, 1);
        assert_eq!(products.len(), 1);
    }

    const PRODUCT_HTML: &str = r#"
    <html><head><title>Amazon.com: Kettle</title></head><body>
      <span id="productTitle">  Electric Kettle 1.7L Stainless Steel  </span>
      <span class="a-price"><span class="a-offscreen">$34.99</span></span>
      <span data-hook="rating-out-of-text">4.6 out of 5</span>
      <span id="acrCustomerReviewText">12,408 ratings</span>
    </body></html>
    "#;

    #[test]
    fn test_parse_product_page() {
        let url = "https://www.amazon.com/Kettle/dp/B0KETTLE01/ref=x";
        let info = parse_product_page(
            &PageSnapshot::new(url, "Amazon.com: Kettle", PRODUCT_HTML),
            url,
        );
        assert_eq!(info.asin, "B0KETTLE01");
        assert_eq!(info.title, "Electric Kettle 1.7L Stainless Steel");
        assert_eq!(info.price, "$34.99");
        assert_eq!(info.rating, "4.6");
        assert_eq!(info.reviews_count, "12408");
        assert!(info.extraction_errors.is_empty(), "{:?}", info.extraction_errors);
    }

    #[test]
    fn test_parse_product_page_asin_from_form() {
        let html = r#"<html><body><input name="ASIN" value="b0form0001"><h1 id="title">Some Gadget</h1></body></html>"#;
        let url = "https://www.amazon.com/some-gadget";
        let info = parse_product_page(&PageSnapshot::new(url, "Gadget", html), url);
        assert_eq!(info.asin, "B0FORM0001");
        assert_eq!(info.title, "Some Gadget");
        assert_eq!(info.price, DEFAULT_PRICE);
        assert!(info
            .extraction_errors
            .iter()
            .any(|e| e.starts_with("Price not found")));
    }

    #[test]
    fn test_parse_product_page_price_from_body() {
        let html = r#"<html><body><span id="productTitle">Desk Lamp</span><p>Now only £ 19.50 today</p></body></html>"#;
        let url = "https://www.amazon.co.uk/dp/B0LAMP0001";
        let info = parse_product_page(&PageSnapshot::new(url, "Lamp", html), url);
        assert_eq!(info.price, "£ 19.50");
    }

    #[test]
    fn test_blocked_product_page() {
        let url = "https://www.amazon.com/errors/validateCaptcha";
        let info = parse_product_page(&PageSnapshot::new(url, "Robot Check", "<html></html>"), url);
        assert_eq!(info.asin, UNKNOWN_ASIN);
        assert_eq!(info.extraction_errors, vec!["CAPTCHA/robot detection".to_string()]);

        let url = "https://www.amazon.com/ap/signin?x";
        let info = parse_product_page(&PageSnapshot::new(url, "", "<html></html>"), url);
        assert_eq!(info.extraction_errors, vec!["Login required".to_string()]);
    }

    #[test]
    fn test_product_lookup_redirected_to_sign_in() {
        let landed = PageSnapshot::new(
            "https://www.amazon.com/ap/signin?openid.return_to=%2Fdp%2FB07ZQ3V5KB",
            "Amazon Sign-In",
            r#"<html><body><form name="signIn"><input type="email" id="ap_email"></form></body></html>"#,
        );
        let info = parse_product_page(&landed, "https://www.amazon.com/dp/B07ZQ3V5KB");
        assert_eq!(info.asin, UNKNOWN_ASIN);
        assert_eq!(info.extraction_errors, vec!["Login required".to_string()]);
    }

    #[test]
    fn test_product_lookup_hits_robot_check() {
        let landed = PageSnapshot::new(
            "https://www.amazon.com/errors/validateCaptcha?amzn=x",
            "Robot Check",
            "<html></html>",
        );
        let info = parse_product_page(&landed, "https://www.amazon.com/dp/B07ZQ3V5KB");
        assert_eq!(info.extraction_errors, vec!["CAPTCHA/robot detection".to_string()]);
        assert_eq!(blocking_reason("https://www.amazon.com/dp/B07ZQ3V5KB", "Kettle"), None);
    }

    #[test]
    fn test_short_title() {
        let info = ProductInfo {
            title: "abcdefghij".into(),
            ..Default::default()
        };
        assert_eq!(info.short_title(4), "abcd...");
        assert_eq!(info.short_title(20), "abcdefghij");
    }
}
