//! 検索入力の判定とURL構築

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ScraperError;

pub const MIN_QUERY_CHARS: usize = 2;
pub const MAX_QUERY_CHARS: usize = 200;

static ASIN_URL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)/dp/([A-Z0-9]{10})",
        r"(?i)/gp/product/([A-Z0-9]{10})",
        r"(?i)/product/([A-Z0-9]{10})",
        r"(?i)/([A-Z0-9]{10})(?:[/?]|$)",
        r"(?i)/ASIN/([A-Z0-9]{10})",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// 入力種別の指定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchKind {
    /// 入力内容から自動判定
    #[default]
    Auto,
    Keyword,
    Asin,
    Url,
}

impl FromStr for SearchKind {
    type Err = ScraperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(SearchKind::Auto),
            "keyword" => Ok(SearchKind::Keyword),
            "asin" => Ok(SearchKind::Asin),
            "url" => Ok(SearchKind::Url),
            other => Err(ScraperError::InvalidInput(format!("不明な検索種別: {}", other))),
        }
    }
}

/// 検索クエリ
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchQuery {
    Keyword(String),
    Asin(String),
    Url(String),
}

impl SearchQuery {
    /// 入力を自動判定してクエリを作成
    pub fn parse(input: &str, domain: &str) -> Result<Self, ScraperError> {
        Self::parse_as(input, SearchKind::Auto, domain)
    }

    /// 種別を指定してクエリを作成
    pub fn parse_as(input: &str, kind: SearchKind, domain: &str) -> Result<Self, ScraperError> {
        let term = input.trim();
        let len = term.chars().count();
        if len == 0 {
            return Err(ScraperError::InvalidInput("検索語を入力してください".into()));
        }
        if len < MIN_QUERY_CHARS {
            return Err(ScraperError::InvalidInput(format!(
                "検索語は{}文字以上必要です",
                MIN_QUERY_CHARS
            )));
        }
        if len > MAX_QUERY_CHARS {
            return Err(ScraperError::InvalidInput(format!(
                "検索語は{}文字未満にしてください",
                MAX_QUERY_CHARS
            )));
        }

        match kind {
            SearchKind::Auto => Ok(Self::detect(term, domain)),
            SearchKind::Keyword => Ok(SearchQuery::Keyword(term.to_string())),
            SearchKind::Asin => {
                let asin = term.to_ascii_uppercase();
                if is_asin(&asin) {
                    Ok(SearchQuery::Asin(asin))
                } else {
                    Err(ScraperError::InvalidInput(format!("ASINの形式が不正です: {}", term)))
                }
            }
            SearchKind::Url => Ok(SearchQuery::Url(normalize_url(term))),
        }
    }

    fn detect(term: &str, domain: &str) -> Self {
        if is_asin(term) {
            return SearchQuery::Asin(term.to_string());
        }
        let www_prefix = format!("www.{}", domain);
        if term.starts_with("http://") || term.starts_with("https://") || term.starts_with(&www_prefix)
        {
            return SearchQuery::Url(normalize_url(term));
        }
        SearchQuery::Keyword(term.to_string())
    }

    pub fn as_str(&self) -> &str {
        match self {
            SearchQuery::Keyword(s) | SearchQuery::Asin(s) | SearchQuery::Url(s) => s,
        }
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchQuery::Keyword(k) => write!(f, "keyword \"{}\"", k),
            SearchQuery::Asin(a) => write!(f, "ASIN {}", a),
            SearchQuery::Url(u) => write!(f, "URL {}", u),
        }
    }
}

/// 10文字の英大文字・数字ならASIN
pub fn is_asin(s: &str) -> bool {
    s.len() == 10
        && s.chars().all(|c| c.is_ascii_alphanumeric())
        && s.to_ascii_uppercase() == s
}

fn normalize_url(term: &str) -> String {
    if term.starts_with("http://") || term.starts_with("https://") {
        term.to_string()
    } else {
        format!("https://{}", term)
    }
}

/// 商品URLからASINを抽出
pub fn extract_asin_from_url(url: &str) -> Option<String> {
    ASIN_URL_PATTERNS
        .iter()
        .find_map(|re| re.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_ascii_uppercase())
}

pub fn home_url(domain: &str) -> String {
    format!("https://www.{}", domain)
}

pub fn product_url(domain: &str, asin: &str) -> String {
    format!("https://www.{}/dp/{}", domain, asin)
}

pub fn reviews_url(domain: &str, asin: &str) -> String {
    format!("https://www.{}/product-reviews/{}/", domain, asin)
}

pub fn keyword_search_url(domain: &str, keyword: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(keyword.as_bytes()).collect();
    format!("https://www.{}/s?k={}", domain, encoded)
}
