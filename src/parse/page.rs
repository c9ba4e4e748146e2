//! ページ種別の判定（ログイン・2段階認証・CAPTCHA）とページ番号

use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;

use super::{first_match, text_of};
use crate::selectors::compiled;

static PAGE_NUMBER_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"pageNumber=(\d+)").expect("valid page number regex"));
static OTP_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\botp\b").expect("valid otp regex"));

/// ある時点のページ状態
#[derive(Debug, Clone, Default)]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    pub html: String,
}

impl PageSnapshot {
    pub fn new(url: impl Into<String>, title: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            html: html.into(),
        }
    }

    pub fn is_login_page(&self) -> bool {
        is_login_page(&self.url, &self.title, &self.html)
    }

    pub fn is_two_factor_page(&self) -> bool {
        is_two_factor_page(&self.title, &self.html)
    }

    pub fn is_captcha_page(&self) -> bool {
        is_captcha_page(&self.title)
    }

    pub fn login_succeeded(&self) -> bool {
        login_succeeded(&self.url, &self.title, &self.html)
    }

    /// 商品ページ（ログイン不要で閲覧できるページ）
    pub fn is_product_page(&self) -> bool {
        self.url.to_lowercase().contains("dp/")
    }

    pub fn page_number(&self) -> u32 {
        current_page_number(&self.url, &self.html)
    }
}

pub(crate) fn is_sign_in_location(url: &str, title: &str) -> bool {
    url.to_lowercase().contains("/ap/signin") || title.to_lowercase().contains("sign in")
}

pub(crate) fn is_captcha_title(title: &str) -> bool {
    let title = title.to_lowercase();
    title.contains("captcha") || title.contains("robot")
}

/// レビュー要素を含むページか
pub fn has_review_containers(html: &str) -> bool {
    let document = Html::parse_document(html);
    compiled::REVIEW_CONTAINERS
        .iter()
        .take(2)
        .any(|s| document.select(s).next().is_some())
}

/// ログインページか
///
/// レビューが表示されていればログインページではない。
pub fn is_login_page(url: &str, title: &str, html: &str) -> bool {
    if has_review_containers(html) {
        return false;
    }

    let title_lower = title.to_lowercase();
    if is_sign_in_location(url, title)
        || title_lower.contains("amazon sign-in")
        || (title_lower.contains("login") && title_lower.contains("amazon"))
    {
        return true;
    }

    let document = Html::parse_document(html);
    compiled::SIGN_IN_FORM
        .as_ref()
        .is_some_and(|s| document.select(s).next().is_some())
}

/// 2段階認証の入力画面か
pub fn is_two_factor_page(title: &str, html: &str) -> bool {
    let document = Html::parse_document(html);
    if compiled::TWO_FACTOR_INPUT
        .iter()
        .any(|s| document.select(s).next().is_some())
    {
        return true;
    }

    let source = html.to_lowercase();
    let has_amazon = source.contains("amazon");
    (has_amazon
        && (source.contains("two-step verification")
            || source.contains("2-step verification")
            || source.contains("verification code")
            || source.contains("enter the code")))
        || (OTP_WORD.is_match(&source) && source.contains("verification"))
        || title.to_lowercase().contains("authentication code")
}

pub fn is_captcha_page(title: &str) -> bool {
    is_captcha_title(title)
}

/// ログイン後の遷移先が想定通りか
pub fn login_succeeded(url: &str, title: &str, html: &str) -> bool {
    let url_lower = url.to_lowercase();
    let title_lower = title.to_lowercase();

    url_lower.contains("product-reviews")
        || url_lower.contains("dp/")
        || (url_lower.contains("product") && title_lower.contains("amazon"))
        || title_lower.contains("customer reviews")
        || !is_login_page(url, title, html)
}

/// 現在のレビューページ番号（不明なら1）
pub fn current_page_number(url: &str, html: &str) -> u32 {
    if let Some(n) = PAGE_NUMBER_PARAM
        .captures(url)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
    {
        return n;
    }

    let document = Html::parse_document(html);
    compiled::PAGE_NUMBER
        .as_ref()
        .and_then(|s| first_match(&document.root_element(), s))
        .map(|el| text_of(&el))
        .and_then(|t| t.parse().ok())
        .unwrap_or(1)
}

/// レビューのキーワード絞り込みが反映されたか
pub fn keyword_filter_applied(url: &str, html: &str, keyword: &str) -> bool {
    url.contains("filterByKeyword") || html.to_lowercase().contains(&keyword.to_lowercase())
}
