mod cli;

use tagforged::{
    config,
    events::JobObserver,
    queue::{Job, JobQueue, JobStatus, FFMPEG},
};
use tagforged_av::{command, probe_tool};
use tagforged_common::{AudioFormat, Quality};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "tagforged=debug,tagforged_av=debug,tagforged_common=debug".to_string()
        } else {
            "tagforged=info,tagforged_av=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Convert {
            files,
            format,
            output_dir,
            quality,
            delete_source,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(convert(
                files,
                &format,
                &output_dir,
                &quality,
                delete_source,
                cli.config.as_deref(),
            ))
        }
        Commands::CheckTools => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(check_tools(cli.config.as_deref()))
        }
        Commands::Formats => {
            list_formats();
            Ok(())
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
    }
}

/// Prints one line per finished job.
struct ConsoleReporter;

impl JobObserver for ConsoleReporter {
    fn on_job_completed(&self, job: &Job) {
        println!("✓ {} -> {}", job.source_path.display(), job.target_path.display());
    }

    fn on_job_failed(&self, job: &Job, error: &str) {
        println!("✗ {}: {}", job.source_path.display(), error);
    }

    fn on_job_cancelled(&self, job: &Job) {
        println!("- {}: cancelled", job.source_path.display());
    }
}

async fn convert(
    files: Vec<PathBuf>,
    format: &str,
    output_dir: &Path,
    quality: &str,
    delete_source: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let queue = JobQueue::builder().config(&config).build().await;
    queue.events().observe(Arc::new(ConsoleReporter));

    for file in &files {
        if !file.exists() {
            anyhow::bail!("Input file does not exist: {:?}", file);
        }
        queue
            .submit(file, format, output_dir, quality, delete_source)
            .with_context(|| format!("Failed to queue {:?}", file))?;
    }

    queue.start().context("Cannot start conversions")?;

    tokio::select! {
        _ = queue.wait() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, cancelling current conversion");
            queue.stop_and_wait().await;
        }
    }

    let finished = queue.history(files.len());
    let failed = finished
        .iter()
        .filter(|j| j.status == JobStatus::Failed)
        .count();
    let completed = finished
        .iter()
        .filter(|j| j.status == JobStatus::Completed)
        .count();

    println!("\n{} of {} conversions completed", completed, files.len());
    if failed > 0 {
        anyhow::bail!("{} conversion(s) failed", failed);
    }
    if completed < files.len() {
        anyhow::bail!("Conversion was interrupted");
    }

    Ok(())
}

async fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    println!("Checking external tools...\n");

    let tool = probe_tool(
        FFMPEG,
        config.tools.ffmpeg_path.as_deref(),
        "-version",
        config.tools.probe_timeout(),
    )
    .await;

    let status = if tool.available { "✓" } else { "✗" };
    print!("{} {}", status, tool.name);
    if let Some(ref version) = tool.version {
        print!(" ({})", version);
    }
    if let Some(ref path) = tool.path {
        print!(" - {}", path.display());
    }
    if let Some(ref error) = tool.error {
        print!(" - {}", error);
    }
    println!();

    println!();
    if tool.available {
        println!("All required tools are available!");
    } else {
        println!("ffmpeg is missing. Install it to enable conversions.");
    }

    Ok(())
}

fn list_formats() {
    for format in AudioFormat::ALL {
        let kind = if format.is_lossy() { "lossy" } else { "lossless" };
        println!("{} ({})", format, kind);
        for quality in Quality::ALL {
            println!(
                "  {:<8} {}",
                quality.as_str(),
                command::codec_args(format, quality).join(" ")
            );
        }
    }
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    match &config.tools.ffmpeg_path {
        Some(path) => println!("  ffmpeg: {}", path.display()),
        None => println!("  ffmpeg: from PATH"),
    }
    println!("  Poll interval: {} ms", config.queue.poll_interval_ms);
    println!(
        "  Progress: +{} per tick, up to {}",
        config.queue.progress_step, config.queue.progress_ceiling
    );
    match config.queue.job_timeout_secs {
        Some(secs) => println!("  Job timeout: {} s", secs),
        None => println!("  Job timeout: none"),
    }
    println!("  History limit: {}", config.queue.history_limit);

    Ok(())
}
