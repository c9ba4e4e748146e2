//! Amazonページ用CSSセレクタ
//!
//! ページ構造が変わった場合はここを更新する。
//! リストは優先順で、先に一致したものを採用する。

use std::sync::LazyLock;

use scraper::Selector;

// 商品ページ
pub const PRODUCT_TITLE: &[&str] = &[
    "#productTitle",
    "span#productTitle",
    "h1#title",
    "h1.a-size-large",
    ".product-title-word-break",
    "h1[data-automation-id=\"product-title\"]",
    ".a-size-large.product-title-word-break",
    "h1[data-feature-name=\"productTitle\"]",
];

pub const PRODUCT_PRICE: &[&str] = &[
    "span.a-price:not(.a-text-price) span.a-offscreen",
    "span.a-price span.a-offscreen",
    ".a-price .a-offscreen",
    "#price_inside_buybox",
    "#priceblock_ourprice",
    "#priceblock_dealprice",
    "#priceblock_saleprice",
    ".a-price .a-price-whole",
    "span.a-color-price",
    "span[data-price-type=\"listPrice\"] .a-offscreen",
    "span[data-price-type=\"price\"] .a-offscreen",
];

pub const PRODUCT_RATING: &[&str] = &[
    "span[data-hook=\"rating-out-of-text\"]",
    "i.a-icon-star span.a-icon-alt",
    "#acrPopover",
    ".a-icon-alt",
    "a[aria-label*=\"out of 5 stars\"]",
    "span[aria-label*=\"out of 5 stars\"]",
];

pub const PRODUCT_REVIEW_COUNT: &[&str] = &[
    "#acrCustomerReviewText",
    "span[data-hook=\"total-review-count\"]",
    "#customerReviews",
    "a[href*=\"product-reviews\"]",
    "span[data-hook=\"rating-out-of-text\"]",
    "span[aria-label*=\"ratings\"]",
    "a[aria-label*=\"ratings\"]",
];

pub const PRODUCT_ASIN_INPUT: &str = "input[name=\"ASIN\"]";

// 検索結果
pub const SEARCH_RESULT: &str = "div[data-component-type=\"s-search-result\"]";

pub const SEARCH_PRICE: &[&str] = &[
    "span.a-price:not(.a-text-price) span.a-offscreen",
    "span.a-price span.a-offscreen",
    ".a-price .a-offscreen",
];

pub const SEARCH_RATING: &[&str] = &[
    "span.a-size-small.a-color-base",
    "span.a-icon-alt",
    "a[aria-label*=\"out of 5 stars\"]",
    "i span.a-icon-alt",
    ".a-icon-star-mini span.a-icon-alt",
];

pub const SEARCH_REVIEW_COUNT: &[&str] = &[
    "a[aria-label*=\"ratings\"]",
    "span.a-size-mini.puis-normal-weight-text.s-underline-text",
    "span.a-size-base.s-underline-text",
    "span[aria-label*=\"ratings\"]",
];

// レビューページ
pub const REVIEW_CONTAINERS: &[&str] = &[
    "div[data-hook=\"review\"]",
    "div[data-hook=\"cr-review\"]",
    "section[data-hook=\"review\"]",
];

pub const REVIEW_RATING: &[&str] = &[
    "i[data-hook=\"cmps-review-star-rating\"] span.a-icon-alt",
    "i[data-hook=\"review-star-rating\"] span.a-icon-alt",
    "span.a-icon-alt",
    "i.a-icon-star span.a-icon-alt",
];

pub const REVIEW_TITLE: &[&str] = &[
    "a[data-hook=\"review-title\"]",
    "span[data-hook=\"review-title\"]",
    "a.review-title",
];

pub const REVIEW_BODY: &[&str] = &[
    "span[data-hook=\"review-body\"]",
    "div[data-hook=\"review-body\"]",
    "div.a-expander-content.reviewText",
    "div.review-text-content",
];

pub const REVIEW_BODY_MARKER: &str = "span[data-hook=\"review-body\"]";
pub const REVIEW_STAR_MARKER: &str = "i[class*=\"star\"], span.a-icon-alt";
pub const REVIEW_AUTHOR: &str = "span.a-profile-name";
pub const REVIEW_DATE: &str = "span[data-hook=\"review-date\"]";
pub const REVIEW_ID_CARRIER: &str = "[data-review-id]";
pub const REVIEW_ID_FALLBACK: &str = "[id*=\"review\"]";
pub const PAGE_NUMBER: &str = "li.a-selected span";

// ログインページ
pub const EMAIL_INPUT: &[&str] = &[
    "input[name=\"email\"]",
    "input[name=\"username\"]",
    "input[type=\"email\"]",
    "input[placeholder*=\"email\"]",
    "input[placeholder*=\"Email\"]",
    "#ap_email",
];

pub const PASSWORD_INPUT: &[&str] = &[
    "input[name=\"password\"]",
    "input[type=\"password\"]",
    "#ap_password",
];

pub const LOGIN_BUTTON: &[&str] = &[
    "input[type=\"submit\"]",
    "button[type=\"submit\"]",
    "#continue",
    "#signInSubmit",
    "span[id=\"continue\"]",
    "span[id=\"signInSubmit\"]",
    "input[aria-labelledby=\"continue\"]",
    "button[aria-labelledby=\"signInSubmit\"]",
];

pub const SIGN_IN_FORM: &str =
    "form[name=\"signIn\"], #ap_email, #ap_password, input[name=\"password\"]";

pub const TWO_FACTOR_INPUT: &[&str] = &[
    "input[placeholder*=\"code\"]",
    "input[placeholder*=\"OTP\"]",
    "input[name*=\"code\"]",
    "input[name*=\"otp\"]",
    "input[id*=\"code\"]",
    "input[id*=\"otp\"]",
];

// ナビゲーション
pub const CONTINUE_SHOPPING_BUTTON: &str = "button[alt=\"Continue shopping\"]";
pub const SEARCH_BOX: &[&str] = &["input[name=\"field-keywords\"]", "#twotabsearchtextbox"];

pub const NEXT_PAGE_BUTTON: &[&str] = &[
    "li.a-last a",
    "a[data-hook=\"next-page\"]",
    ".a-pagination .a-last a",
    "li.a-last > a",
    "a[aria-label=\"Next page\"]",
];

// レビュー絞り込み
pub const REVIEW_SEARCH_INPUT: &[&str] = &[
    "input[id=\"filterByKeywordTextBox\"]",
    "input[placeholder*=\"Search customer reviews\"]",
    "input[placeholder*=\"search customer reviews\"]",
    "input[type=\"search\"][maxlength=\"300\"]",
];

pub const REVIEW_FILTER_SUBMIT: &[&str] = &[
    "input.a-button-input[aria-labelledby=\"a-autoid-1-announce\"]",
    "input[type=\"submit\"][class*=\"a-button-input\"]",
    "input[type=\"submit\"]",
];

/// セレクタ文字列をパース（不正なものは除外）
pub fn compile(list: &[&str]) -> Vec<Selector> {
    list.iter().filter_map(|s| Selector::parse(s).ok()).collect()
}

pub fn compile_one(selector: &str) -> Option<Selector> {
    Selector::parse(selector).ok()
}

/// パース済みセレクタ
pub mod compiled {
    use super::*;

    pub static PRODUCT_TITLE: LazyLock<Vec<Selector>> = LazyLock::new(|| compile(super::PRODUCT_TITLE));
    pub static PRODUCT_PRICE: LazyLock<Vec<Selector>> = LazyLock::new(|| compile(super::PRODUCT_PRICE));
    pub static PRODUCT_RATING: LazyLock<Vec<Selector>> =
        LazyLock::new(|| compile(super::PRODUCT_RATING));
    pub static PRODUCT_REVIEW_COUNT: LazyLock<Vec<Selector>> =
        LazyLock::new(|| compile(super::PRODUCT_REVIEW_COUNT));
    pub static PRODUCT_ASIN_INPUT: LazyLock<Option<Selector>> =
        LazyLock::new(|| compile_one(super::PRODUCT_ASIN_INPUT));

    pub static SEARCH_RESULT: LazyLock<Option<Selector>> =
        LazyLock::new(|| compile_one(super::SEARCH_RESULT));
    pub static SEARCH_PRICE: LazyLock<Vec<Selector>> = LazyLock::new(|| compile(super::SEARCH_PRICE));
    pub static SEARCH_RATING: LazyLock<Vec<Selector>> = LazyLock::new(|| compile(super::SEARCH_RATING));
    pub static SEARCH_REVIEW_COUNT: LazyLock<Vec<Selector>> =
        LazyLock::new(|| compile(super::SEARCH_REVIEW_COUNT));

    pub static REVIEW_CONTAINERS: LazyLock<Vec<Selector>> =
        LazyLock::new(|| compile(super::REVIEW_CONTAINERS));
    pub static REVIEW_RATING: LazyLock<Vec<Selector>> = LazyLock::new(|| compile(super::REVIEW_RATING));
    pub static REVIEW_TITLE: LazyLock<Vec<Selector>> = LazyLock::new(|| compile(super::REVIEW_TITLE));
    pub static REVIEW_BODY: LazyLock<Vec<Selector>> = LazyLock::new(|| compile(super::REVIEW_BODY));
    pub static REVIEW_BODY_MARKER: LazyLock<Option<Selector>> =
        LazyLock::new(|| compile_one(super::REVIEW_BODY_MARKER));
    pub static REVIEW_STAR_MARKER: LazyLock<Option<Selector>> =
        LazyLock::new(|| compile_one(super::REVIEW_STAR_MARKER));
    pub static REVIEW_AUTHOR: LazyLock<Option<Selector>> =
        LazyLock::new(|| compile_one(super::REVIEW_AUTHOR));
    pub static REVIEW_DATE: LazyLock<Option<Selector>> = LazyLock::new(|| compile_one(super::REVIEW_DATE));
    pub static REVIEW_ID_CARRIER: LazyLock<Option<Selector>> =
        LazyLock::new(|| compile_one(super::REVIEW_ID_CARRIER));
    pub static REVIEW_ID_FALLBACK: LazyLock<Option<Selector>> =
        LazyLock::new(|| compile_one(super::REVIEW_ID_FALLBACK));
    pub static PAGE_NUMBER: LazyLock<Option<Selector>> = LazyLock::new(|| compile_one(super::PAGE_NUMBER));

    pub static SIGN_IN_FORM: LazyLock<Option<Selector>> =
        LazyLock::new(|| compile_one(super::SIGN_IN_FORM));
    pub static TWO_FACTOR_INPUT: LazyLock<Vec<Selector>> =
        LazyLock::new(|| compile(super::TWO_FACTOR_INPUT));

    pub static DIV: LazyLock<Option<Selector>> = LazyLock::new(|| compile_one("div"));
    pub static H2: LazyLock<Option<Selector>> = LazyLock::new(|| compile_one("h2"));
    pub static H2_SPAN: LazyLock<Option<Selector>> = LazyLock::new(|| compile_one("h2 span"));
    pub static TITLE: LazyLock<Option<Selector>> = LazyLock::new(|| compile_one("title"));
    pub static BODY: LazyLock<Option<Selector>> = LazyLock::new(|| compile_one("body"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_selectors_parse() {
        let lists: &[&[&str]] = &[
            PRODUCT_TITLE,
            PRODUCT_PRICE,
            PRODUCT_RATING,
            PRODUCT_REVIEW_COUNT,
            SEARCH_PRICE,
            SEARCH_RATING,
            SEARCH_REVIEW_COUNT,
            REVIEW_CONTAINERS,
            REVIEW_RATING,
            REVIEW_TITLE,
            REVIEW_BODY,
            EMAIL_INPUT,
            PASSWORD_INPUT,
            LOGIN_BUTTON,
            TWO_FACTOR_INPUT,
            SEARCH_BOX,
            NEXT_PAGE_BUTTON,
            REVIEW_SEARCH_INPUT,
            REVIEW_FILTER_SUBMIT,
        ];
        for list in lists {
            for s in list.iter() {
                assert!(Selector::parse(s).is_ok(), "invalid selector: {}", s);
            }
        }
        for s in [
            SEARCH_RESULT,
            REVIEW_BODY_MARKER,
            REVIEW_STAR_MARKER,
            REVIEW_ID_CARRIER,
            REVIEW_ID_FALLBACK,
            SIGN_IN_FORM,
            CONTINUE_SHOPPING_BUTTON,
        ] {
            assert!(Selector::parse(s).is_ok(), "invalid selector: {}", s);
        }
    }
}
