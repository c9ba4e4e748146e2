use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("ブラウザ初期化エラー: {0}")]
    BrowserInit(String),

    #[error("ナビゲーションエラー: {0}")]
    Navigation(String),

    #[error("ログインエラー: {0}")]
    Login(String),

    #[error("タイムアウト: {0}")]
    Timeout(String),

    #[error("要素が見つかりません: {0}")]
    ElementNotFound(String),

    #[error("JavaScript実行エラー: {0}")]
    JavaScript(String),

    #[error("アクセスがブロックされました: {0}")]
    Blocked(String),

    #[error("入力エラー: {0}")]
    InvalidInput(String),

    #[error("設定エラー: {0}")]
    Config(String),

    #[error("レビューなし: {0}")]
    NoReviews(String),

    #[error("処理がキャンセルされました")]
    Cancelled,

    #[error("CSV書き込みエラー: {0}")]
    Csv(#[from] csv::Error),

    #[error("ファイル操作エラー: {0}")]
    FileIO(#[from] std::io::Error),
}

impl ScraperError {
    /// リトライで回復し得るエラーか
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScraperError::Navigation(_)
                | ScraperError::Timeout(_)
                | ScraperError::ElementNotFound(_)
                | ScraperError::JavaScript(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ScraperError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ScraperError::Timeout("x".into()).is_retryable());
        assert!(ScraperError::Navigation("x".into()).is_retryable());
        assert!(!ScraperError::Login("x".into()).is_retryable());
        assert!(!ScraperError::Cancelled.is_retryable());
        assert!(ScraperError::Cancelled.is_cancelled());
    }
}
