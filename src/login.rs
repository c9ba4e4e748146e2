//! Amazon ログイン処理
//!
//! 認証情報があれば自動ログインを試み、失敗した場合や認証情報が無い場合は
//! ブラウザが表示されていれば手動ログインに切り替える。

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::browser::BrowserSession;
use crate::config::{Credentials, ScraperConfig};
use crate::delay::DelayKind;
use crate::error::ScraperError;
use crate::events::EventSink;
use crate::selectors;

const FIELD_WAIT: Duration = Duration::from_secs(5);

/// ユーザーへの確認（2段階認証・手動ログイン）
#[async_trait]
pub trait UserPrompt: Send + Sync {
    /// メッセージを表示し、ユーザーが操作を終えるまで待つ
    async fn confirm(&self, message: &str) -> Result<(), ScraperError>;
}

/// 対話できない環境用。常にエラーを返す
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrompt;

#[async_trait]
impl UserPrompt for NoPrompt {
    async fn confirm(&self, message: &str) -> Result<(), ScraperError> {
        Err(ScraperError::Login(format!(
            "ユーザー操作が必要ですが、対話できません: {}",
            message
        )))
    }
}

const HEADLESS_LOGIN_MESSAGE: &str =
    "ヘッドレスモードでは手動ログインできません。認証情報を設定するか HEADLESS=false にしてください";

/// ログインページで次に行うこと
#[derive(Debug, PartialEq)]
enum LoginStep<'c> {
    Attempt {
        number: u32,
        credentials: &'c Credentials,
    },
    /// ブラウザ上での手動ログイン
    Manual,
    /// ヘッドレスのため手動ログインできない
    Unavailable,
}

/// 自動ログインは `max_retries` 回まで。その後は手動ログインに切り替える
fn next_login_step(attempts_made: u32, config: &ScraperConfig) -> LoginStep<'_> {
    if let Some(credentials) = &config.credentials {
        if attempts_made < config.max_retries.max(1) {
            return LoginStep::Attempt {
                number: attempts_made + 1,
                credentials,
            };
        }
    }
    if config.headless {
        LoginStep::Unavailable
    } else {
        LoginStep::Manual
    }
}

/// ユーザー操作を待つ。停止要求があれば中断する
pub async fn confirm_or_cancel(
    prompt: &dyn UserPrompt,
    message: &str,
    cancel: &CancellationToken,
) -> Result<(), ScraperError> {
    tokio::select! {
        result = prompt.confirm(message) => result,
        _ = cancel.cancelled() => Err(ScraperError::Cancelled),
    }
}

/// ログイン処理
pub struct LoginFlow<'a> {
    session: &'a BrowserSession,
    config: &'a ScraperConfig,
    prompt: &'a dyn UserPrompt,
    sink: &'a EventSink,
    cancel: &'a CancellationToken,
}

impl<'a> LoginFlow<'a> {
    pub fn new(
        session: &'a BrowserSession,
        config: &'a ScraperConfig,
        prompt: &'a dyn UserPrompt,
        sink: &'a EventSink,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            session,
            config,
            prompt,
            sink,
            cancel,
        }
    }

    async fn pause(&self, kind: DelayKind) -> Result<(), ScraperError> {
        self.config.delays.pause(kind, self.cancel).await?;
        Ok(())
    }

    async fn confirm(&self, message: &str) -> Result<(), ScraperError> {
        confirm_or_cancel(self.prompt, message, self.cancel).await
    }

    /// 対象URLへ移動し、必要であればログインする
    pub async fn ensure_logged_in(&self, target_url: &str) -> Result<(), ScraperError> {
        self.session.goto(target_url).await?;
        self.pause(DelayKind::PageLoad).await?;

        let snapshot = self.session.snapshot().await?;
        if !snapshot.is_login_page() || snapshot.is_product_page() {
            debug!("No login required for {}", target_url);
            return Ok(());
        }

        self.sink.status("Login required...");

        let mut attempts_made = 0;
        loop {
            match next_login_step(attempts_made, self.config) {
                LoginStep::Attempt {
                    number,
                    credentials,
                } => {
                    if number > 1 {
                        self.pause(DelayKind::Retry).await?;
                        self.session.reload().await?;
                        self.pause(DelayKind::Interaction).await?;
                    }
                    info!("Login attempt {}/{}", number, self.config.max_retries.max(1));
                    match self.attempt(credentials).await {
                        Ok(true) => {
                            self.sink.status("Login successful");
                            return Ok(());
                        }
                        Ok(false) => warn!("Login attempt {} did not succeed", number),
                        Err(e) if e.is_cancelled() => return Err(e),
                        Err(e) => warn!("Login attempt {} failed: {}", number, e),
                    }
                    attempts_made = number;
                }
                LoginStep::Manual => {
                    self.report_fallback(attempts_made);
                    return self.manual_login(target_url).await;
                }
                LoginStep::Unavailable => {
                    self.report_fallback(attempts_made);
                    return Err(ScraperError::Login(HEADLESS_LOGIN_MESSAGE.into()));
                }
            }
        }
    }

    fn report_fallback(&self, attempts_made: u32) {
        if attempts_made > 0 {
            self.sink.error("Automatic login failed");
        } else {
            self.sink.status("No credentials configured");
        }
    }

    /// 1回分の自動ログイン。成功判定まで行う
    async fn attempt(&self, credentials: &Credentials) -> Result<bool, ScraperError> {
        let session = self.session;

        let email_field = session
            .wait_for_visible(selectors::EMAIL_INPUT, FIELD_WAIT)
            .await?
            .ok_or_else(|| ScraperError::ElementNotFound("email field".into()))?;
        session.fill(&email_field, &credentials.email).await?;
        self.pause(DelayKind::Interaction).await?;

        // メールとパスワードが別画面の場合は「続行」を押す
        if session.first_visible(selectors::PASSWORD_INPUT).await?.is_none()
            && session.click_first_visible(selectors::LOGIN_BUTTON).await?.is_some()
        {
            self.pause(DelayKind::Login).await?;
        }

        let password_field = session
            .wait_for_visible(selectors::PASSWORD_INPUT, FIELD_WAIT)
            .await?
            .ok_or_else(|| ScraperError::ElementNotFound("password field".into()))?;
        session.fill(&password_field, &credentials.password).await?;
        self.pause(DelayKind::Interaction).await?;

        session
            .click_first_visible(selectors::LOGIN_BUTTON)
            .await?
            .ok_or_else(|| ScraperError::ElementNotFound("sign-in button".into()))?;
        self.pause(DelayKind::Login).await?;

        let snapshot = session.snapshot().await?;
        if snapshot.is_two_factor_page() {
            self.sink.status("Two-factor authentication required");
            self.confirm("2段階認証コードをブラウザに入力し、完了したら Enter を押してください")
                .await?;
            self.pause(DelayKind::TwoFactor).await?;

            if session.snapshot().await?.is_login_page() {
                return Ok(false);
            }
        }

        self.pause(DelayKind::LoginComplete).await?;
        let snapshot = session.snapshot().await?;
        debug!("After login: url={}, title={}", snapshot.url, snapshot.title);
        Ok(snapshot.login_succeeded())
    }

    async fn manual_login(&self, target_url: &str) -> Result<(), ScraperError> {
        self.sink.status("Waiting for manual login...");
        self.confirm("ブラウザでログインを完了したら Enter を押してください")
            .await?;

        self.session.goto(target_url).await?;
        self.pause(DelayKind::PageLoad).await?;

        if self.session.snapshot().await?.is_login_page() {
            return Err(ScraperError::Login("手動ログイン後もログインページのままです".into()));
        }
        self.sink.status("Manual login confirmed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn attempt_number(step: LoginStep<'_>) -> Option<u32> {
        match step {
            LoginStep::Attempt { number, .. } => Some(number),
            _ => None,
        }
    }

    #[test]
    fn test_login_retries_then_manual() {
        let config = ScraperConfig::default()
            .with_credentials("a@b.c", "hunter2")
            .with_max_retries(2)
            .with_headless(false);

        assert_eq!(attempt_number(next_login_step(0, &config)), Some(1));
        assert_eq!(attempt_number(next_login_step(1, &config)), Some(2));
        assert_eq!(next_login_step(2, &config), LoginStep::Manual);
    }

    #[test]
    fn test_login_headless_fallback_is_unavailable() {
        let config = ScraperConfig::default()
            .with_credentials("a@b.c", "hunter2")
            .with_max_retries(1)
            .with_headless(true);
        assert_eq!(attempt_number(next_login_step(0, &config)), Some(1));
        assert_eq!(next_login_step(1, &config), LoginStep::Unavailable);
    }

    #[test]
    fn test_login_without_credentials() {
        let config = ScraperConfig::default().with_headless(false);
        assert!(config.credentials.is_none());
        assert_eq!(next_login_step(0, &config), LoginStep::Manual);

        let config = config.with_headless(true);
        assert_eq!(next_login_step(0, &config), LoginStep::Unavailable);
    }

    /// キャンセルされるまで戻らない
    struct BlockingPrompt {
        entered: Arc<AtomicBool>,
    }

    #[async_trait]
    impl UserPrompt for BlockingPrompt {
        async fn confirm(&self, _message: &str) -> Result<(), ScraperError> {
            self.entered.store(true, Ordering::SeqCst);
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_confirm_stops_on_cancel() {
        let entered = Arc::new(AtomicBool::new(false));
        let prompt = BlockingPrompt {
            entered: entered.clone(),
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = confirm_or_cancel(&prompt, "2FA", &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(entered.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_no_prompt_refuses() {
        let err = NoPrompt.confirm("enter code").await.unwrap_err();
        assert!(matches!(err, ScraperError::Login(_)));
        assert!(err.to_string().contains("enter code"));
    }
}
