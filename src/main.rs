//! review-scraper: Amazon 商品検索・レビュー取得 CLI
//!
//! 取得はバックグラウンドタスクで行い、進捗イベントを表示する。Ctrl-C で停止。

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use console::Term;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use amazon_review_scraper::config::{write_env_template, Credentials};
use amazon_review_scraper::job::{MAX_PAGES, MIN_PAGES};
use amazon_review_scraper::{
    open_in_default_app, AmazonScraper, EventSink, JobHandle, JobOutcome, Marketplace,
    ProductInfo, ReviewJob, ScrapeEvent, Scraper, ScraperConfig, ScraperError, SearchKind,
    SearchQuery, UserPrompt,
};

const DEFAULT_PAGES: u32 = 5;
const DEFAULT_MAX_RESULTS: usize = 10;

#[derive(Parser)]
#[command(name = "review-scraper", version, about = "Amazon商品検索・レビュースクレイパー")]
struct Cli {
    /// マーケットプレイス（us, de, ca, jp, au, br, mx, nl またはドメイン）
    #[arg(long, global = true)]
    marketplace: Option<Marketplace>,

    /// ブラウザを表示する（手動ログイン・2段階認証に必要）
    #[arg(long, global = true)]
    show_browser: bool,

    /// CSVの保存先（既定: デスクトップ）
    #[arg(long, global = true, env = "OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// デバッグログとスクリーンショット
    #[arg(long, global = true)]
    debug: bool,

    /// 起動時にログイン情報を入力する（.env に無い場合）
    #[arg(long, global = true)]
    login: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 商品を検索して一覧を表示
    Search {
        /// キーワード・ASIN・商品URL
        query: String,
        /// 入力種別: auto, keyword, asin, url
        #[arg(short, long, default_value = "auto")]
        kind: SearchKind,
        /// 表示する最大件数
        #[arg(short = 'n', long, default_value_t = DEFAULT_MAX_RESULTS)]
        max_results: usize,
        /// JSONで出力
        #[arg(long)]
        json: bool,
    },

    /// ASIN を指定してレビューを取得
    Scrape {
        asin: String,
        /// 取得ページ数（1〜20）
        #[arg(short, long, default_value_t = DEFAULT_PAGES)]
        pages: u32,
        /// レビューの絞り込みキーワード
        #[arg(short, long)]
        keyword: Option<String>,
        /// 保存後にCSVを開く
        #[arg(long)]
        open: bool,
    },

    /// 検索 → 商品選択 → レビュー取得を対話形式で実行
    Interactive {
        /// 保存後にCSVを開く
        #[arg(long)]
        open: bool,
    },

    /// .env.template を作成
    InitEnv {
        #[arg(default_value = ".env.template")]
        path: PathBuf,
    },
}

/// 標準入力（プロセス全体で1つの読み取り口を共有する）
///
/// 読み取り途中で中断されても、入力済みの行は次の読み取りで受け取れる。
static STDIN_LINES: LazyLock<Mutex<Lines<BufReader<Stdin>>>> =
    LazyLock::new(|| Mutex::new(BufReader::new(tokio::io::stdin()).lines()));

/// 標準入力で Enter を待つ
struct StdinPrompt;

#[async_trait]
impl UserPrompt for StdinPrompt {
    async fn confirm(&self, message: &str) -> Result<(), ScraperError> {
        println!("\n>>> {}", message);
        read_line("Enter で続行: ").await.map(|_| ())
    }
}

/// 1行読む。入力終端は空行として扱う
async fn read_line(prompt: &str) -> Result<String, ScraperError> {
    print!("{}", prompt);
    std::io::stdout().flush()?;
    let line = STDIN_LINES.lock().await.next_line().await?;
    Ok(line.map(|l| l.trim().to_string()).unwrap_or_default())
}

/// パスワードをエコーせずに読む
async fn read_password(prompt: &str) -> Result<String, ScraperError> {
    print!("{}", prompt);
    std::io::stdout().flush()?;
    tokio::task::spawn_blocking(|| Term::stdout().read_secure_line())
        .await
        .map_err(|e| ScraperError::FileIO(std::io::Error::other(e.to_string())))?
        .map_err(ScraperError::from)
}

/// メールアドレスとパスワードを入力させる（このセッションのみ有効）
async fn prompt_credentials() -> Result<Option<Credentials>, ScraperError> {
    println!("Amazon のログイン情報を入力してください（保存はしません）");
    let email = read_line("メールアドレス> ").await?;
    if email.is_empty() {
        return Ok(None);
    }
    let password = read_password("パスワード> ").await?;
    Ok(session_credentials(&email, &password))
}

fn session_credentials(email: &str, password: &str) -> Option<Credentials> {
    let (email, password) = (email.trim(), password.trim_end_matches(['\r', '\n']));
    (!email.is_empty() && !password.is_empty()).then(|| Credentials::new(email, password))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.debug { "amazon_review_scraper=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    if let Commands::InitEnv { path } = &cli.command {
        if write_env_template(path)? {
            println!("{} を作成しました。値を記入して .env に名前を変更してください", path.display());
        } else {
            println!("{} は既に存在します", path.display());
        }
        return Ok(());
    }

    let mut config = build_config(&cli)?;
    if !config.has_credentials() {
        println!("認証情報が未設定です（AMAZON_EMAIL / AMAZON_PASSWORD）。");
        let ask = match &cli.command {
            Commands::Search { .. } => false,
            Commands::Interactive { .. } if !cli.login => {
                read_line("ログイン情報を今入力しますか? [y/N] ")
                    .await?
                    .eq_ignore_ascii_case("y")
            }
            _ => cli.login,
        };
        if ask {
            match prompt_credentials().await? {
                Some(credentials) => config.credentials = Some(credentials),
                None => println!("ログイン情報なしで続行します"),
            }
        } else {
            println!("ログインが必要な場合は --login で入力するか、--show-browser で手動ログインしてください。");
        }
    }

    match cli.command {
        Commands::Search {
            query,
            kind,
            max_results,
            json,
        } => run_search(config, &query, kind, max_results, json).await,
        Commands::Scrape {
            asin,
            pages,
            keyword,
            open,
        } => {
            let mut job = ReviewJob::new(asin.trim().to_ascii_uppercase(), pages);
            if let Some(k) = keyword {
                job = job.with_review_keyword(k);
            }
            job.validate()?;
            run_scrape(config, job, open).await
        }
        Commands::Interactive { open } => run_interactive(config, open).await,
        Commands::InitEnv { .. } => Ok(()),
    }
}

fn build_config(cli: &Cli) -> Result<ScraperConfig> {
    let mut config = ScraperConfig::from_env().context("設定の読み込みに失敗しました")?;
    if let Some(marketplace) = cli.marketplace {
        config = config.with_marketplace(marketplace);
    }
    if cli.show_browser {
        config = config.with_headless(false);
    }
    if let Some(dir) = &cli.output_dir {
        config = config.with_output_dir(dir);
    }
    Ok(config.with_debug(cli.debug))
}

fn new_scraper(config: &ScraperConfig, sink: &EventSink) -> AmazonScraper {
    AmazonScraper::new(config.clone())
        .with_event_sink(sink.clone())
        .with_prompt(Arc::new(StdinPrompt))
}

/// イベントを表示するタスク
fn spawn_printer(mut rx: UnboundedReceiver<ScrapeEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                ScrapeEvent::Status(msg) => println!("  {}", msg),
                ScrapeEvent::Error(msg) => eprintln!("  エラー: {}", msg),
                ScrapeEvent::Progress { page, total } => println!("[{}/{}]", page, total),
                ScrapeEvent::FileSaved(path) => println!("CSV保存: {}", path.display()),
                // 一覧は呼び出し側で表示する
                ScrapeEvent::Results(_) => {}
            }
        }
    })
}

fn print_products(products: &[ProductInfo]) {
    if products.is_empty() {
        println!("商品が見つかりませんでした");
        return;
    }
    println!();
    println!(
        "{:>3}  {:<10}  {:<12}  {:<8}  {:>8}  TITLE",
        "#", "ASIN", "PRICE", "RATING", "REVIEWS"
    );
    for p in products {
        println!(
            "{:>3}  {:<10}  {:<12}  {:<8}  {:>8}  {}",
            p.index,
            p.asin,
            p.price,
            p.rating,
            p.reviews_count,
            p.short_title(60)
        );
        for err in &p.extraction_errors {
            println!("       ! {}", err);
        }
    }
    println!();
}

async fn run_search(
    config: ScraperConfig,
    input: &str,
    kind: SearchKind,
    max_results: usize,
    json: bool,
) -> Result<()> {
    let query = SearchQuery::parse_as(input, kind, &config.domain)?;
    let (sink, rx) = EventSink::channel();
    let printer = spawn_printer(rx);

    let mut scraper = new_scraper(&config, &sink);
    scraper.initialize().await?;
    let result = scraper.search(&query, max_results).await;
    scraper.close().await?;
    drop(scraper);
    drop(sink);
    let _ = printer.await;

    let products = result?;
    if json {
        println!("{}", serde_json::to_string_pretty(&products)?);
    } else {
        print_products(&products);
    }
    Ok(())
}

/// ジョブを開始し、完了か Ctrl-C まで待つ
async fn run_job(
    scraper: AmazonScraper,
    job: ReviewJob,
    output_dir: PathBuf,
    sink: EventSink,
) -> Result<JobOutcome, ScraperError> {
    println!("レビュー取得中... (Ctrl-C で停止)");
    let handle = JobHandle::spawn(scraper, job, output_dir, sink);
    handle
        .wait_or_stop(async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
            println!("\n停止しています...");
        })
        .await
}

fn report_outcome(result: Result<JobOutcome, ScraperError>, open: bool) -> Result<()> {
    match result {
        Ok(outcome) => {
            println!();
            println!("保存先: {}", outcome.csv_path.display());
            for line in outcome.stats.summary_lines() {
                println!("{}", line);
            }
            if open {
                if let Err(e) = open_in_default_app(&outcome.csv_path) {
                    eprintln!("CSVを開けませんでした: {}", e);
                }
            }
            Ok(())
        }
        Err(ScraperError::Cancelled) => {
            println!("停止しました（CSVは保存していません）");
            Ok(())
        }
        Err(e @ ScraperError::NoReviews(_)) => {
            println!("レビューが見つかりませんでした: {}", e);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn run_scrape(config: ScraperConfig, job: ReviewJob, open: bool) -> Result<()> {
    let (sink, rx) = EventSink::channel();
    let printer = spawn_printer(rx);

    let mut scraper = new_scraper(&config, &sink);
    scraper.initialize().await?;
    let result = run_job(scraper, job, config.output_dir.clone(), sink).await;
    let _ = printer.await;
    report_outcome(result, open)
}

async fn run_interactive(config: ScraperConfig, open: bool) -> Result<()> {
    println!("Amazon レビュースクレイパー ({})", config.domain);
    println!("キーワード・ASIN・商品URLを入力してください（空行で終了）");

    let (sink, rx) = EventSink::channel();
    let printer = spawn_printer(rx);

    let mut scraper = new_scraper(&config, &sink);
    scraper.initialize().await?;

    loop {
        let input = read_line("\n検索> ").await?;
        if input.is_empty() {
            break;
        }

        let query = match SearchQuery::parse(&input, &config.domain) {
            Ok(q) => q,
            Err(e) => {
                eprintln!("{}", e);
                continue;
            }
        };

        let products = match scraper.search(&query, DEFAULT_MAX_RESULTS).await {
            Ok(p) => p,
            Err(e) => {
                eprintln!("検索に失敗しました: {}", e);
                continue;
            }
        };
        print_products(&products);

        let Some(product) = choose_product(&products).await? else {
            continue;
        };
        let job = ask_job(&product.asin).await?;

        // 取得が終わるとブラウザは閉じられる
        let result = run_job(scraper, job, config.output_dir.clone(), sink.clone()).await;
        report_outcome(result, open)?;

        if read_line("\n続けて検索しますか? [y/N] ").await?.to_lowercase() != "y" {
            drop(sink);
            let _ = printer.await;
            return Ok(());
        }
        scraper = new_scraper(&config, &sink);
        scraper.initialize().await?;
    }

    scraper.close().await?;
    drop(scraper);
    drop(sink);
    let _ = printer.await;
    Ok(())
}

async fn choose_product(products: &[ProductInfo]) -> Result<Option<ProductInfo>> {
    let candidates: Vec<&ProductInfo> = products.iter().filter(|p| p.has_valid_asin()).collect();
    if candidates.is_empty() {
        if !products.is_empty() {
            println!("有効なASINを持つ商品がありません");
        }
        return Ok(None);
    }
    if candidates.len() == 1 {
        let ok = read_line(&format!("{} のレビューを取得しますか? [Y/n] ", candidates[0].asin)).await?;
        return Ok((ok.is_empty() || ok.eq_ignore_ascii_case("y")).then(|| candidates[0].clone()));
    }

    loop {
        let answer = read_line("番号を選択（空行で再検索）> ").await?;
        if answer.is_empty() {
            return Ok(None);
        }
        match answer.parse::<usize>() {
            Ok(n) => match candidates.iter().find(|p| p.index == n) {
                Some(p) => return Ok(Some((*p).clone())),
                None => println!("一覧にない番号です"),
            },
            Err(_) => println!("番号を入力してください"),
        }
    }
}

async fn ask_job(asin: &str) -> Result<ReviewJob> {
    let pages = loop {
        let answer = read_line(&format!(
            "ページ数 [{}〜{}, 既定 {}]> ",
            MIN_PAGES, MAX_PAGES, DEFAULT_PAGES
        ))
        .await?;
        if answer.is_empty() {
            break DEFAULT_PAGES;
        }
        match answer.parse::<u32>() {
            Ok(n) if (MIN_PAGES..=MAX_PAGES).contains(&n) => break n,
            _ => println!("{}〜{} の数値を入力してください", MIN_PAGES, MAX_PAGES),
        }
    };

    loop {
        let keyword = read_line("レビュー絞り込みキーワード（任意）> ").await?;
        let job = ReviewJob::new(asin, pages).with_review_keyword(keyword);
        match job.validate() {
            Ok(()) => return Ok(job),
            Err(e) => println!("{}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_scrape_command() {
        let cli = Cli::try_parse_from([
            "review-scraper",
            "--marketplace",
            "jp",
            "scrape",
            "B0TEST0001",
            "--pages",
            "3",
            "--keyword",
            "battery",
        ])
        .unwrap();
        assert_eq!(cli.marketplace, Some(Marketplace::Japan));
        match cli.command {
            Commands::Scrape {
                asin,
                pages,
                keyword,
                open,
            } => {
                assert_eq!(asin, "B0TEST0001");
                assert_eq!(pages, 3);
                assert_eq!(keyword.as_deref(), Some("battery"));
                assert!(!open);
            }
            _ => panic!("expected scrape"),
        }
    }

    #[test]
    fn test_parse_login_flag() {
        let cli = Cli::try_parse_from(["review-scraper", "scrape", "B0TEST0001", "--login"]).unwrap();
        assert!(cli.login);
        let cli = Cli::try_parse_from(["review-scraper", "interactive"]).unwrap();
        assert!(!cli.login);
    }

    #[test]
    fn test_session_credentials() {
        let creds = session_credentials("  me@example.com ", "p@ss word\n").unwrap();
        assert_eq!(creds.email, "me@example.com");
        assert_eq!(creds.password, "p@ss word");
        assert!(session_credentials("me@example.com", "").is_none());
        assert!(session_credentials(" ", "secret").is_none());
    }

    #[test]
    fn test_parse_search_kind() {
        let cli = Cli::try_parse_from(["review-scraper", "search", "B0TEST0001", "--kind", "asin"])
            .unwrap();
        match cli.command {
            Commands::Search { kind, .. } => assert_eq!(kind, SearchKind::Asin),
            _ => panic!("expected search"),
        }
    }
}
