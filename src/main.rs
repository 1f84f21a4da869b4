use std::io::{self, BufRead, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sekai_qa::config::QaConfig;
use sekai_qa::model::entry::IdentityPolicy;
use sekai_qa::protocol::{self, Output, Session};
use sekai_qa::services::pipeline::{ScanRequest, Scanner};
use sekai_qa::services::suggest::provider::ProviderConfig;

#[derive(Parser)]
#[command(name = "sekai-qa")]
#[command(author, version, about = "Translation QA for visual novel scripts", long_about = None)]
struct Cli {
    /// JSON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Never contact the suggestion provider
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer JSON-lines requests on stdin (default)
    Serve,
    /// Scan two script trees and print events as JSON lines
    Scan(ScanArgs),
}

#[derive(Args)]
struct ScanArgs {
    /// Directory with the untranslated scripts
    source: PathBuf,

    /// Directory with the translated scripts
    translated: PathBuf,

    #[arg(short, long)]
    target_lang: Option<String>,

    #[arg(short, long)]
    workers: Option<usize>,

    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Identity policy for repeated markers: last_wins or sequence
    #[arg(long)]
    policy: Option<String>,

    /// Suggestion provider (openai, deepseek)
    #[arg(long)]
    provider: Option<String>,

    #[arg(long)]
    model: Option<String>,

    #[arg(long, env = "SEKAI_QA_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

impl ScanArgs {
    fn apply(&self, mut cfg: QaConfig) -> Result<QaConfig> {
        if let Some(t) = &self.target_lang {
            cfg.target_language = t.clone();
        }
        if let Some(w) = self.workers {
            cfg.workers = w;
        }
        if let Some(b) = self.batch_size {
            cfg.batch_size = b;
        }
        if let Some(p) = &self.policy {
            cfg.identity_policy = IdentityPolicy::from(p.as_str());
        }

        if let (Some(provider), Some(model)) = (&self.provider, &self.model) {
            cfg.provider = Some(ProviderConfig {
                provider: provider.clone(),
                api_key: String::new(),
                model: model.clone(),
                timeout_secs: cfg.provider.as_ref().map_or(20, |p| p.timeout_secs),
            });
        }
        if let (Some(key), Some(p)) = (&self.api_key, cfg.provider.as_mut()) {
            p.api_key = key.clone();
        }

        cfg.normalized().context("invalid scan options")
    }
}

fn init_logging() {
    // stdout carries protocol output only
    let filter = EnvFilter::try_from_env("SEKAI_QA_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn stdout_sink() -> Output {
    Arc::new(|line: String| {
        let mut stdout = io::stdout().lock();
        let _ = writeln!(stdout, "{line}");
        let _ = stdout.flush();
    })
}

fn serve(cfg: QaConfig, offline: bool) -> Result<()> {
    let out = stdout_sink();
    let session = Session::new(cfg, offline, out.clone());
    tracing::info!("sekai-qa ready");

    for line in io::stdin().lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => continue,
        };

        if line.trim().is_empty() {
            continue;
        }

        let result = panic::catch_unwind(AssertUnwindSafe(|| protocol::handle(&session, &line)));

        let response = match result {
            Ok(resp) => resp,
            Err(_) => Some(
                serde_json::json!({
                    "status": "error",
                    "message": "internal core error"
                })
                .to_string(),
            ),
        };

        if let Some(response) = response {
            out(response);
        }
    }

    session.shutdown();
    Ok(())
}

fn scan(cfg: QaConfig, args: &ScanArgs, offline: bool) -> Result<ExitCode> {
    let cfg = args.apply(cfg)?;
    let req = ScanRequest {
        source_dir: args.source.clone(),
        translated_dir: args.translated.clone(),
        target_lang: cfg.target_language.clone(),
    };

    let scanner = Scanner::new(Arc::new(cfg.build_suggester(offline)), cfg.scan_options());
    let out = stdout_sink();
    let summary = scanner
        .run(&req, |event| match serde_json::to_string(&event) {
            Ok(line) => out(line),
            Err(e) => tracing::error!("failed to encode event: {e}"),
        })
        .with_context(|| format!("scan of {} failed", args.source.display()))?;

    Ok(if summary.failed() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn run(cli: Cli) -> Result<ExitCode> {
    let cfg = QaConfig::load_or_default(cli.config.as_deref()).with_context(|| {
        format!(
            "failed to load config {}",
            cli.config.as_deref().map(|p| p.display().to_string()).unwrap_or_default()
        )
    })?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(cfg, cli.offline).map(|_| ExitCode::SUCCESS),
        Commands::Scan(args) => scan(cfg, &args, cli.offline),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
