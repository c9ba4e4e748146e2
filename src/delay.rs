//! ランダム待機設定
//!
//! ページ遷移・入力・ログインの各段階で一定範囲のランダム待機を入れ、
//! 対象サイトへのアクセス頻度を抑える。

use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ScraperError;

/// 待機の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayKind {
    PageLoad,
    Interaction,
    PageTransition,
    Login,
    LoginComplete,
    TwoFactor,
    Retry,
}

/// 待機時間の範囲（秒）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayRange {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl DelayRange {
    pub const fn new(min_secs: f64, max_secs: f64) -> Self {
        Self { min_secs, max_secs }
    }

    pub fn sample(&self) -> Duration {
        let (lo, hi) = if self.min_secs <= self.max_secs {
            (self.min_secs, self.max_secs)
        } else {
            (self.max_secs, self.min_secs)
        };
        let secs = if hi <= 0.0 {
            0.0
        } else {
            rand::thread_rng().gen_range(lo.max(0.0)..=hi)
        };
        Duration::from_secs_f64(secs)
    }
}

/// 段階ごとの待機設定
#[derive(Debug, Clone, PartialEq)]
pub struct DelayConfig {
    pub page_load: DelayRange,
    pub interaction: DelayRange,
    pub page_transition: DelayRange,
    pub login: DelayRange,
    pub login_complete: DelayRange,
    pub two_factor: DelayRange,
    pub retry: DelayRange,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            page_load: DelayRange::new(3.0, 6.0),
            interaction: DelayRange::new(1.0, 2.0),
            page_transition: DelayRange::new(3.0, 7.0),
            login: DelayRange::new(2.0, 4.0),
            login_complete: DelayRange::new(3.0, 6.0),
            two_factor: DelayRange::new(8.0, 15.0),
            retry: DelayRange::new(5.0, 10.0),
        }
    }
}

impl DelayConfig {
    /// 待機なし（テスト用）
    pub fn none() -> Self {
        let zero = DelayRange::new(0.0, 0.0);
        Self {
            page_load: zero,
            interaction: zero,
            page_transition: zero,
            login: zero,
            login_complete: zero,
            two_factor: zero,
            retry: zero,
        }
    }

    pub fn range(&self, kind: DelayKind) -> DelayRange {
        match kind {
            DelayKind::PageLoad => self.page_load,
            DelayKind::Interaction => self.interaction,
            DelayKind::PageTransition => self.page_transition,
            DelayKind::Login => self.login,
            DelayKind::LoginComplete => self.login_complete,
            DelayKind::TwoFactor => self.two_factor,
            DelayKind::Retry => self.retry,
        }
    }

    pub fn sample(&self, kind: DelayKind) -> Duration {
        self.range(kind).sample()
    }

    /// ランダム時間待機する。キャンセルされた場合は `ScraperError::Cancelled`
    pub async fn pause(
        &self,
        kind: DelayKind,
        cancel: &CancellationToken,
    ) -> Result<Duration, ScraperError> {
        let delay = self.sample(kind);
        debug!("Pausing {:?} for {:.1}s", kind, delay.as_secs_f64());
        pause_for(delay, cancel).await?;
        Ok(delay)
    }
}

/// 指定時間待機（キャンセル可能）
pub async fn pause_for(delay: Duration, cancel: &CancellationToken) -> Result<(), ScraperError> {
    if cancel.is_cancelled() {
        return Err(ScraperError::Cancelled);
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(ScraperError::Cancelled),
        _ = sleep(delay) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_within_range() {
        let config = DelayConfig::default();
        for _ in 0..50 {
            let d = config.sample(DelayKind::PageTransition).as_secs_f64();
            assert!((3.0..=7.0).contains(&d), "out of range: {}", d);
        }
    }

    #[test]
    fn test_swapped_bounds_are_tolerated() {
        let d = DelayRange::new(2.0, 1.0).sample().as_secs_f64();
        assert!((1.0..=2.0).contains(&d));
    }

    #[test]
    fn test_none_is_zero() {
        let config = DelayConfig::none();
        assert_eq!(config.sample(DelayKind::TwoFactor), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_pause_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = DelayConfig::default()
            .pause(DelayKind::Retry, &cancel)
            .await;
        assert!(matches!(result, Err(ScraperError::Cancelled)));
    }

    #[tokio::test]
    async fn test_pause_cancel_interrupts_sleep() {
        let cancel = CancellationToken::new();
        let child = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            child.cancel();
        });
        let start = std::time::Instant::now();
        let result = pause_for(Duration::from_secs(30), &cancel).await;
        assert!(matches!(result, Err(ScraperError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
