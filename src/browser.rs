//! chromiumoxide によるブラウザセッション

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::ScraperConfig;
use crate::error::ScraperError;
use crate::parse::PageSnapshot;

const POLL_INTERVAL_MS: u64 = 500;
/// ページ読み込み完了の最大待機（秒）
const READY_STATE_WAIT_SECS: u64 = 30;

/// 可視かつ有効な最初の要素のセレクタを返すスクリプト
///
/// `clear` は値を消した要素に入力先の印を付ける。
const FIRST_VISIBLE_JS: &str = r#"
    (function(selectors, action) {
        if (action === 'clear') {
            document.querySelectorAll('[data-review-scraper-input]')
                .forEach(e => e.removeAttribute('data-review-scraper-input'));
        }
        for (const sel of selectors) {
            let candidates = [];
            try { candidates = document.querySelectorAll(sel); } catch (e) { continue; }
            for (const el of candidates) {
                const style = window.getComputedStyle(el);
                const rect = el.getBoundingClientRect();
                const visible = style.display !== 'none' &&
                                style.visibility !== 'hidden' &&
                                (rect.width > 0 || rect.height > 0);
                if (!visible || el.disabled) continue;
                if (action === 'click') el.click();
                if (action === 'clear') {
                    el.focus();
                    el.value = '';
                    el.setAttribute('data-review-scraper-input', '1');
                }
                return sel;
            }
        }
        return '';
    })
"#;

const INPUT_MARKER: &str = "[data-review-scraper-input]";

/// 「次へ」ボタンを探してスクロールし、印を付けるスクリプト
const MARK_NEXT_JS: &str = r#"
    (function(selectors) {
        document.querySelectorAll('[data-review-scraper-next]')
            .forEach(e => e.removeAttribute('data-review-scraper-next'));
        let found = null, label = null;
        for (const sel of selectors) {
            const el = document.querySelector(sel);
            if (el && el.offsetParent !== null) { found = el; label = sel; break; }
        }
        if (!found) {
            for (const a of document.querySelectorAll('a')) {
                if (a.textContent.indexOf('Next') >= 0 && a.offsetParent !== null) {
                    found = a; label = 'a:text(Next)'; break;
                }
            }
        }
        if (!found) return '';
        found.setAttribute('data-review-scraper-next', '1');
        found.scrollIntoView({behavior: 'smooth', block: 'center'});
        return label;
    })
"#;

const NEXT_MARKER: &str = "[data-review-scraper-next]";

/// 一時ユーザーデータディレクトリ。破棄時に削除する
#[derive(Debug)]
struct UserDataDir(PathBuf);

impl Drop for UserDataDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.0) {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!("Failed to remove {:?}: {}", self.0, e);
            }
        }
    }
}

// フィールドは宣言順に破棄される。ディレクトリ削除はブラウザ終了後
pub struct BrowserSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    user_data_dir: UserDataDir,
}

impl BrowserSession {
    /// ブラウザを起動して空のページを開く
    pub async fn launch(config: &ScraperConfig) -> Result<Self, ScraperError> {
        info!("Launching browser (headless: {})...", config.headless);

        // ユニークなユーザーデータディレクトリを生成
        let unique_id = format!(
            "{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );
        let user_data_dir = std::env::temp_dir().join(format!("review-scraper-{}", unique_id));

        let mut builder = BrowserConfig::builder()
            .user_data_dir(&user_data_dir)
            .window_size(1280, 900)
            .request_timeout(config.timeout);

        if let Some(path) = &config.chrome_path {
            builder = builder.chrome_executable(path);
        }

        if !config.headless {
            builder = builder.with_head();
        }

        builder = builder.no_sandbox().arg("--disable-dev-shm-usage");

        if config.debug {
            builder = builder.arg("--enable-logging=stderr").arg("--v=1");
        }

        let browser_config = builder
            .build()
            .map_err(|e| ScraperError::BrowserInit(format!("ブラウザ設定エラー: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScraperError::BrowserInit(e.to_string()))?;

        // ブラウザイベントハンドラをバックグラウンドで実行
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                debug!("Browser event: {:?}", event);
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScraperError::BrowserInit(e.to_string()))?;

        info!("Browser ready");
        Ok(Self {
            browser,
            page,
            handler_task,
            user_data_dir: UserDataDir(user_data_dir),
        })
    }

    /// URLへ移動し、読み込み完了を待つ
    pub async fn goto(&self, url: &str) -> Result<(), ScraperError> {
        debug!("Navigating to {}", url);
        self.page
            .goto(url)
            .await
            .map_err(|e| ScraperError::Navigation(format!("{}: {}", url, e)))?;
        self.wait_ready().await;
        Ok(())
    }

    pub async fn reload(&self) -> Result<(), ScraperError> {
        self.page
            .reload()
            .await
            .map_err(|e| ScraperError::Navigation(e.to_string()))?;
        self.wait_ready().await;
        Ok(())
    }

    /// document.readyState が complete になるまで待機（タイムアウト時は続行）
    async fn wait_ready(&self) {
        let start = Instant::now();
        while start.elapsed() < Duration::from_secs(READY_STATE_WAIT_SECS) {
            let state = self
                .page
                .evaluate("document.readyState")
                .await
                .ok()
                .and_then(|v| v.into_value::<String>().ok())
                .unwrap_or_default();
            if state == "complete" {
                return;
            }
            sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
        warn!("Page not ready after {:?}, proceeding anyway", start.elapsed());
    }

    pub async fn current_url(&self) -> Result<String, ScraperError> {
        self.page
            .url()
            .await
            .map(|u| u.unwrap_or_default())
            .map_err(|e| ScraperError::Navigation(e.to_string()))
    }

    pub async fn title(&self) -> Result<String, ScraperError> {
        self.page
            .get_title()
            .await
            .map(|t| t.unwrap_or_default())
            .map_err(|e| ScraperError::Navigation(e.to_string()))
    }

    pub async fn content(&self) -> Result<String, ScraperError> {
        self.page
            .content()
            .await
            .map_err(|e| ScraperError::Navigation(e.to_string()))
    }

    /// 現在のURL・タイトル・HTMLをまとめて取得
    pub async fn snapshot(&self) -> Result<PageSnapshot, ScraperError> {
        Ok(PageSnapshot {
            url: self.current_url().await?,
            title: self.title().await?,
            html: self.content().await?,
        })
    }

    /// セレクタに一致する要素が現れるまで待機
    pub async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<bool, ScraperError> {
        let script = format!("document.querySelector({}) !== null", js_string(selector)?);
        let start = Instant::now();
        loop {
            let found = self
                .page
                .evaluate(script.as_str())
                .await
                .map_err(|e| ScraperError::JavaScript(e.to_string()))?
                .into_value::<bool>()
                .unwrap_or(false);
            if found {
                return Ok(true);
            }
            if start.elapsed() >= timeout {
                return Ok(false);
            }
            sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
    }

    async fn run_first_visible(&self, selectors: &[&str], action: &str) -> Result<Option<String>, ScraperError> {
        let list = serde_json::to_string(selectors)
            .map_err(|e| ScraperError::JavaScript(e.to_string()))?;
        let script = format!("{}({}, {})", FIRST_VISIBLE_JS, list, js_string(action)?);
        self.page
            .evaluate(script.as_str())
            .await
            .map_err(|e| ScraperError::JavaScript(e.to_string()))?
            .into_value::<String>()
            .map(|s| Some(s).filter(|s| !s.is_empty()))
            .map_err(|e| ScraperError::JavaScript(e.to_string()))
    }

    /// 可視の最初の要素のセレクタ
    pub async fn first_visible(&self, selectors: &[&str]) -> Result<Option<String>, ScraperError> {
        self.run_first_visible(selectors, "none").await
    }

    /// 可視の要素が現れるまで待機
    pub async fn wait_for_visible(
        &self,
        selectors: &[&str],
        timeout: Duration,
    ) -> Result<Option<String>, ScraperError> {
        let start = Instant::now();
        loop {
            if let Some(found) = self.first_visible(selectors).await? {
                return Ok(Some(found));
            }
            if start.elapsed() >= timeout {
                return Ok(None);
            }
            sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
    }

    /// 可視の最初の要素をクリックし、そのセレクタを返す
    pub async fn click_first_visible(&self, selectors: &[&str]) -> Result<Option<String>, ScraperError> {
        self.run_first_visible(selectors, "click").await
    }

    /// 可視の入力欄をクリアしてから文字列を入力
    pub async fn fill(&self, selector: &str, text: &str) -> Result<(), ScraperError> {
        self.run_first_visible(&[selector], "clear")
            .await?
            .ok_or_else(|| ScraperError::ElementNotFound(format!("{} (visible)", selector)))?;
        self.page
            .find_element(INPUT_MARKER)
            .await
            .map_err(|e| ScraperError::ElementNotFound(format!("{}: {}", selector, e)))?
            .click()
            .await
            .map_err(|e| ScraperError::JavaScript(format!("{}: {}", selector, e)))?
            .type_str(text)
            .await
            .map_err(|e| ScraperError::JavaScript(format!("{}: {}", selector, e)))?;
        Ok(())
    }

    /// 直前に [`fill`](Self::fill) した入力欄で Enter を押す
    pub async fn press_enter(&self) -> Result<(), ScraperError> {
        self.page
            .find_element(INPUT_MARKER)
            .await
            .map_err(|e| ScraperError::ElementNotFound(format!("filled input: {}", e)))?
            .press_key("Enter")
            .await
            .map_err(|e| ScraperError::JavaScript(format!("filled input: {}", e)))?;
        Ok(())
    }

    /// 要素があればクリック（無ければ false）
    pub async fn click_if_present(&self, selector: &str) -> Result<bool, ScraperError> {
        match self.page.find_element(selector).await {
            Ok(el) => {
                el.click()
                    .await
                    .map_err(|e| ScraperError::JavaScript(format!("{}: {}", selector, e)))?;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    /// 「次へ」ボタンを探して画面内にスクロールする
    pub async fn locate_next_button(&self, selectors: &[&str]) -> Result<Option<String>, ScraperError> {
        let list = serde_json::to_string(selectors)
            .map_err(|e| ScraperError::JavaScript(e.to_string()))?;
        let script = format!("{}({})", MARK_NEXT_JS, list);
        self.page
            .evaluate(script.as_str())
            .await
            .map_err(|e| ScraperError::JavaScript(e.to_string()))?
            .into_value::<String>()
            .map(|s| Some(s).filter(|s| !s.is_empty()))
            .map_err(|e| ScraperError::JavaScript(e.to_string()))
    }

    /// [`locate_next_button`](Self::locate_next_button) で見つけたボタンをクリック
    pub async fn click_next_button(&self) -> Result<(), ScraperError> {
        self.page
            .find_element(NEXT_MARKER)
            .await
            .map_err(|e| ScraperError::ElementNotFound(format!("next page: {}", e)))?
            .click()
            .await
            .map_err(|e| ScraperError::Navigation(format!("next page: {}", e)))?;
        Ok(())
    }

    /// デバッグ用スクリーンショットをログに出力
    pub async fn log_screenshot(&self, label: &str) {
        match self
            .page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
        {
            Ok(png) => {
                use base64::Engine;
                let encoded = base64::engine::general_purpose::STANDARD.encode(&png);
                debug!("{} screenshot: data:image/png;base64,{}", label, encoded);
            }
            Err(e) => debug!("Failed to capture screenshot: {}", e),
        }
    }

    pub async fn close(mut self) -> Result<(), ScraperError> {
        info!("Closing browser...");
        if let Err(e) = self.browser.close().await {
            debug!("Browser close returned error: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            debug!("Browser wait returned error: {}", e);
        }
        self.handler_task.abort();
        info!("Browser closed");
        Ok(())
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

/// JavaScript 文字列リテラルとして埋め込む
fn js_string(s: &str) -> Result<String, ScraperError> {
    serde_json::to_string(s).map_err(|e| ScraperError::JavaScript(e.to_string()))
}
