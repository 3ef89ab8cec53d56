use std::time::Duration;

use clap::{error::ErrorKind, Parser};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::watch;
use tracing::warn;

use crate::cli::args::CliArgs;
use crate::cli::validation;
use crate::config::{self, ConfigFile};
use crate::logging;
use crate::output::{CsvReportSink, DEFAULT_OUTPUT_DIR};
use crate::runner::{
    default_process_count, Options, Runner, ScanSession, TargetSource, WordlistSource,
    DEFAULT_THREADS_PER_TARGET, DEFAULT_TIMEOUT_SECONDS,
};

fn print_banner() {
    const BANNER: &str = r#"
       ___                         __
  ____/ (_)________  _________  / /_  ___
 / __  / / ___/ __ \/ ___/ __ \/ __ \/ _ \
/ /_/ / / /  / /_/ / /  / /_/ / /_/ /  __/
\__,_/_/_/  / .___/_/   \____/_.___/\___/
           /_/
       multi-target directory discovery
    "#;
    print!("{}", BANNER.bold().cyan());
    println!();
}

fn format_kv_line(label: &str, value: &str) {
    println!(":: {:<10}: {}", label, value);
}

fn format_bool(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

#[derive(Debug, Clone)]
struct RunConfig {
    options: Options,
    output_dir: String,
    no_color: bool,
}

impl RunConfig {
    fn session(&self) -> &ScanSession {
        &self.options.session
    }
}

fn build_run_config(args: CliArgs, cfg: ConfigFile) -> Result<RunConfig, String> {
    validation::validate(&args)?;

    let no_color = args.no_color || cfg.no_color.unwrap_or(false);
    let verbose = args.verbose || cfg.verbose.unwrap_or(false);

    let threads_per_target = args
        .threads
        .or(cfg.threads)
        .unwrap_or(DEFAULT_THREADS_PER_TARGET);
    let timeout_seconds = args
        .timeout
        .or(cfg.timeout)
        .unwrap_or(DEFAULT_TIMEOUT_SECONDS);
    let process_count = args
        .processes
        .or(cfg.processes)
        .unwrap_or_else(default_process_count);
    let proxy = args.proxy.or(cfg.proxy).filter(|p| !p.trim().is_empty());

    // an explicit target on the command line replaces every target from the file
    let targets = if !args.url.is_empty() {
        TargetSource::Urls(args.url)
    } else if let Some(path) = args.url_file {
        TargetSource::FilePath(config::expand_tilde_string(&path))
    } else if let Some(urls) = cfg.urls.filter(|u| !u.is_empty()) {
        TargetSource::Urls(urls)
    } else if let Some(path) = cfg.url_file {
        TargetSource::FilePath(config::expand_tilde_string(&path))
    } else {
        return Err(
            "no targets provided, use --url or --url-file (or set urls/url_file in the config)"
                .to_string(),
        );
    };

    let wordlist = args
        .wordlist
        .or(cfg.wordlist)
        .ok_or_else(|| "no wordlist provided, use --wordlist".to_string())?;
    let wordlist = WordlistSource::FilePath(config::expand_tilde_string(&wordlist));

    let output_dir = config::expand_tilde_string(
        args.output_dir
            .or(cfg.output_dir)
            .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string())
            .as_str(),
    );

    let session = ScanSession {
        timeout_seconds,
        threads_per_target,
        process_count,
        proxy,
        verbose,
    };
    session.validate().map_err(|e| e.to_string())?;

    Ok(RunConfig {
        options: Options {
            targets,
            wordlist,
            session,
        },
        output_dir,
        no_color,
    })
}

fn print_summary(run: &RunConfig, targets: usize, words: usize) {
    let session = run.session();
    format_kv_line("Targets", &targets.to_string());
    format_kv_line("Wordlist", &format!("{words} entries"));
    format_kv_line("Threads", &session.threads_per_target.to_string());
    format_kv_line("Processes", &session.process_count.to_string());
    format_kv_line("Timeout", &format!("{}s", session.timeout_seconds));
    format_kv_line("Proxy", session.proxy.as_deref().unwrap_or("none"));
    format_kv_line("Output", &run.output_dir);
    format_kv_line("Verbose", format_bool(session.verbose));
    println!();
}

fn build_progress_bar() -> Result<ProgressBar, String> {
    let pb = ProgressBar::new(1);
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.enable_steady_tick(Duration::from_millis(200));
    pb.set_style(
        ProgressStyle::with_template(
            ":: Progress: [{pos}/{len}] :: {per_sec} :: Duration: [{elapsed_precise}] :: {msg}",
        )
        .map_err(|e| format!("failed to build progress bar style: {e}"))?
        .progress_chars(r#"#>-"#),
    );
    Ok(pb)
}

async fn run_async(run: RunConfig) -> Result<(), String> {
    if run.no_color {
        colored::control::set_override(false);
    }
    print_banner();

    let pb = build_progress_bar()?;
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping scans and writing partial results");
            let _ = cancel_tx.send(true);
        }
    });

    let runner = Runner::new(run.options.clone())
        .map_err(|e| e.to_string())?
        .with_progress(pb.clone())
        .with_cancel(cancel_rx);
    let (targets, wordlist) = runner.prepare().await.map_err(|e| e.to_string())?;
    print_summary(&run, targets.len(), wordlist.len());

    let mut sink = CsvReportSink::new(&run.output_dir, pb.clone());
    let summary = runner
        .run_prepared(&targets, &wordlist, &mut sink)
        .await
        .map_err(|e| e.to_string())?;
    interrupt.abort();
    pb.finish_and_clear();

    for (target, err) in &summary.failures {
        eprintln!(
            "{} {}: {}",
            "[!] no report for".bold().red(),
            target.as_str().bold().white(),
            err
        );
    }
    let status = if summary.cancelled() {
        "Interrupted".bold().yellow()
    } else {
        "Completed".bold().green()
    };
    println!(
        "\n{} :: {} probes across {} targets, reports in {}",
        status,
        summary.probes(),
        summary.results.len(),
        sink.dir().display()
    );
    Ok(())
}

pub fn run_cli() -> Result<(), String> {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{e}");
                return Ok(());
            }
            _ => return Err(e.to_string()),
        },
    };

    let cfg = match args.config.as_deref() {
        Some(path) => config::load_config(&config::expand_tilde(path), false)?,
        None => match config::default_config_path() {
            Some(path) => config::load_config(&path, true)?,
            None => ConfigFile::default(),
        },
    };

    let run = build_run_config(args, cfg)?;
    logging::init(run.session().verbose, run.no_color);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(run.session().process_count)
        .build()
        .map_err(|e| format!("failed to build runtime: {e}"))?;

    rt.block_on(run_async(run))?;
    Ok(())
}
