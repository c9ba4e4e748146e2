//! レビューのCSV出力
//!
//! Excel で文字化けしないよう UTF-8 BOM 付きで書き出す。

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;

use chrono::{Local, NaiveDateTime};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::ScraperError;
use crate::parse::Review;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const MAX_KEYWORD_CHARS: usize = 20;
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("valid keyword regex"));

/// ファイル名に使えるキーワード（記号を除去、空白は `_`、20文字まで）
pub fn safe_keyword(keyword: &str) -> String {
    NON_WORD
        .replace_all(keyword.trim(), "")
        .replace(' ', "_")
        .chars()
        .take(MAX_KEYWORD_CHARS)
        .collect()
}

/// `amazon_reviews_<keyword>_<ASIN>_<timestamp>.csv`
pub fn review_filename(asin: &str, keyword: Option<&str>, at: &NaiveDateTime) -> String {
    let stamp = at.format(TIMESTAMP_FORMAT);
    match keyword.map(safe_keyword).filter(|k| !k.is_empty()) {
        Some(k) => format!("amazon_reviews_{}_{}_{}.csv", k, asin, stamp),
        None => format!("amazon_reviews_{}_{}.csv", asin, stamp),
    }
}

/// レビューをCSVに保存し、保存先のパスを返す
pub fn save_reviews_csv(
    reviews: &[Review],
    asin: &str,
    keyword: Option<&str>,
    output_dir: &Path,
) -> Result<PathBuf, ScraperError> {
    if reviews.is_empty() {
        return Err(ScraperError::NoReviews(format!(
            "ASIN {} のレビューが取得できませんでした",
            asin
        )));
    }

    std::fs::create_dir_all(output_dir)?;
    let filename = review_filename(asin, keyword, &Local::now().naive_local());
    let path = output_dir.join(filename);

    let mut file = File::create(&path)?;
    file.write_all(UTF8_BOM)?;

    let mut writer = csv::Writer::from_writer(file);
    for review in reviews {
        writer.serialize(review)?;
    }
    writer.flush()?;

    info!("Saved {} reviews to {:?}", reviews.len(), path);
    Ok(path)
}

/// 評価の集計
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewStats {
    pub total: usize,
    pub average_rating: Option<f64>,
    /// 評価（"4.0" 形式）ごとの件数
    pub distribution: BTreeMap<String, usize>,
}

impl ReviewStats {
    pub fn from_reviews(reviews: &[Review]) -> Self {
        let ratings: Vec<f32> = reviews.iter().filter_map(|r| r.rating).collect();
        let average_rating = if ratings.is_empty() {
            None
        } else {
            Some(ratings.iter().map(|&r| f64::from(r)).sum::<f64>() / ratings.len() as f64)
        };

        let mut distribution = BTreeMap::new();
        for r in &ratings {
            *distribution.entry(format!("{:.1}", r)).or_insert(0) += 1;
        }

        Self {
            total: reviews.len(),
            average_rating,
            distribution,
        }
    }

    /// 表示用の行
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![format!("Total reviews: {}", self.total)];
        if let Some(avg) = self.average_rating {
            lines.push(format!("Average rating: {:.2}", avg));
            lines.push("Rating distribution:".to_string());
            for (rating, count) in &self.distribution {
                lines.push(format!("  {} stars: {} reviews", rating, count));
            }
        }
        lines
    }
}

/// OS の既定アプリでファイルを開く
pub fn open_in_default_app(path: &Path) -> Result<(), ScraperError> {
    if !path.exists() {
        return Err(ScraperError::FileIO(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} が見つかりません", path.display()),
        )));
    }

    for (program, args) in open_commands(path) {
        match Command::new(program).args(&args).spawn() {
            Ok(_) => {
                debug!("Opened {:?} with {}", path, program);
                return Ok(());
            }
            Err(e) => debug!("{} failed: {}", program, e),
        }
    }

    Err(ScraperError::FileIO(std::io::Error::other(format!(
        "{} を開けるアプリケーションが見つかりません",
        path.display()
    ))))
}

#[cfg(target_os = "windows")]
fn open_commands(path: &Path) -> Vec<(&'static str, Vec<String>)> {
    let target = path.display().to_string();
    vec![("cmd", vec!["/C".into(), "start".into(), String::new(), target])]
}

#[cfg(target_os = "macos")]
fn open_commands(path: &Path) -> Vec<(&'static str, Vec<String>)> {
    vec![("open", vec![path.display().to_string()])]
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn open_commands(path: &Path) -> Vec<(&'static str, Vec<String>)> {
    let target = path.display().to_string();
    ["xdg-open", "libreoffice", "soffice"]
        .into_iter()
        .map(|p| (p, vec![target.clone()]))
        .collect()
}
