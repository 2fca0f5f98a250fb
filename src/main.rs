mod cli;

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use tc_core::Config;
use tc_toolchain::{DownloadProgress, ProgressFn, Toolchain};
use tc_transform::{
    geometry, AspectRatio, Dimensions, MediaProbe, TranscoderLocator, TransformExecutor,
    TransformJob,
};
use tokio_util::sync::CancellationToken;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "trendclip=trace,tc_toolchain=trace,tc_transform=trace,tc_core=debug".to_string()
        } else {
            "trendclip=debug,tc_toolchain=debug,tc_transform=debug,tc_core=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load_or_default(cli.config.as_deref());
    config.apply_env_overrides();
    for warning in config.validate() {
        tracing::warn!("Config: {warning}");
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cli, config))
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; cancelling");
            ctrl_c.cancel();
        }
    });

    let toolchain = Toolchain::from_config(&config.toolchain)?.with_cancellation(cancel.clone());

    match cli.command {
        Commands::Heal { json } => heal(&toolchain.with_progress(download_logger()), json).await,
        Commands::CheckTools { json } => check_tools(&toolchain, json).await,
        Commands::Path { name } => match toolchain.path_of(&name).await {
            Some(path) => {
                println!("{}", path.display());
                Ok(())
            }
            None => anyhow::bail!("{name} is not available; run `trendclip heal`"),
        },
        Commands::Transform {
            input,
            output,
            duration,
            aspect,
        } => {
            let aspect = match aspect {
                Some(a) => a,
                None => default_aspect(&config)?,
            };
            let job = TransformJob::new(input, output)
                .with_duration(duration.unwrap_or(config.transform.duration_secs))
                .with_aspect(aspect);
            job.validate()?;

            let executor = TransformExecutor::new(healed(toolchain).await?, &config.transform);
            let produced = executor.run(&job, &cancel).await?;
            println!("{}", produced.display());
            Ok(())
        }
        Commands::Plan {
            input,
            size,
            aspect,
            json,
        } => {
            let aspect = match aspect {
                Some(a) => a,
                None => default_aspect(&config)?,
            };
            let long_edge = config.transform.long_edge;
            plan(&toolchain, input.as_deref(), size, aspect, long_edge, json).await
        }
        Commands::Thumbnail { input, output, at } => {
            tc_transform::check_paths(&input, &output)?;
            let executor = TransformExecutor::new(healed(toolchain).await?, &config.transform);
            let produced = executor.create_thumbnail(&input, &output, at, &cancel).await?;
            println!("{}", produced.display());
            Ok(())
        }
        Commands::ExtractAudio { input, output } => {
            tc_transform::check_paths(&input, &output)?;
            let executor = TransformExecutor::new(healed(toolchain).await?, &config.transform);
            let produced = executor.extract_audio(&input, &output, &cancel).await?;
            println!("{}", produced.display());
            Ok(())
        }
        Commands::Duration { input } => {
            if !input.exists() {
                anyhow::bail!("File does not exist: {:?}", input);
            }
            let executor = TransformExecutor::new(healed(toolchain).await?, &config.transform);
            let secs = executor.media_duration(&input).await?;
            println!("{secs:.3}");
            Ok(())
        }
        Commands::EnvScript { path } => {
            toolchain.write_env_script(&path).await?;
            println!("Wrote {}", path.display());
            Ok(())
        }
        Commands::Digest { file, algorithm } => {
            let hex = tc_toolchain::digest(&file, algorithm)
                .with_context(|| format!("hashing {}", file.display()))?;
            println!("{algorithm}:{hex}  {}", file.display());
            Ok(())
        }
        Commands::Validate => validate_config(cli.config.as_deref(), &config),
    }
}

fn default_aspect(config: &Config) -> Result<AspectRatio> {
    config
        .transform
        .target_aspect
        .parse()
        .context("transform.target_aspect")
}

/// Install or repair the transcoder before handing the toolchain to an
/// executor, whose locator only resolves.
async fn healed(toolchain: Toolchain) -> Result<Arc<Toolchain>> {
    toolchain.ensure(tc_core::TRANSCODER).await?;
    Ok(Arc::new(toolchain))
}

/// Log each tool's download at every quarter of its size.
fn download_logger() -> ProgressFn {
    let reported: Mutex<HashMap<String, u64>> = Mutex::new(HashMap::new());
    Arc::new(move |tool: &str, progress: DownloadProgress| {
        let Some(fraction) = progress.fraction() else {
            return;
        };
        let quarter = (fraction * 4.0).floor() as u64;
        let mut reported = match reported.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let last = reported.entry(tool.to_string()).or_insert(0);
        if quarter > *last {
            *last = quarter;
            tracing::info!(
                "{tool}: {}% of {} bytes downloaded",
                quarter * 25,
                progress.total_bytes.unwrap_or_default()
            );
        }
    })
}

async fn heal(toolchain: &Toolchain, json: bool) -> Result<()> {
    let outcomes = toolchain.heal_all().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
    } else {
        for outcome in &outcomes {
            let status = if outcome.success { "✓" } else { "✗" };
            println!("{status} {} - {}", outcome.name, outcome.detail);
        }
    }

    let failed = outcomes.iter().filter(|o| !o.success).count();
    if failed > 0 {
        anyhow::bail!("{failed} of {} tools could not be healed", outcomes.len());
    }
    Ok(())
}

async fn check_tools(toolchain: &Toolchain, json: bool) -> Result<()> {
    let states = toolchain.check_all().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&states)?);
        return Ok(());
    }

    println!("Checking managed tools in {}\n", toolchain.tools_dir().display());
    let mut all_ok = true;
    for state in &states {
        let status = if state.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, state.name);
        if let Some(ref version) = state.version {
            print!(" ({})", version);
        }
        if let Some(ref path) = state.path {
            print!(" - {}", path.display());
        }
        if let Some(source) = state.source {
            print!(" [{source}]");
        }
        println!();
    }

    println!();
    if all_ok {
        println!("All tools are available!");
    } else {
        println!("Some tools are missing. Run `trendclip heal` to install them.");
    }
    Ok(())
}

async fn plan(
    toolchain: &Toolchain,
    input: Option<&Path>,
    size: Option<Dimensions>,
    aspect: AspectRatio,
    long_edge: u32,
    json: bool,
) -> Result<()> {
    let planned = match (size, input) {
        (Some(size), _) => geometry::plan(size, aspect, long_edge)?,
        (None, Some(input)) => {
            if !input.exists() {
                anyhow::bail!("File does not exist: {:?}", input);
            }
            toolchain.ensure(tc_core::TRANSCODER).await?;
            let tools = toolchain.locate().await?;
            let probe = MediaProbe::new(tools.ffprobe);
            geometry::plan_for_source(&probe, input, aspect, long_edge).await
        }
        (None, None) => anyhow::bail!("either an input file or --size is required"),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&planned)?);
    } else {
        if let Some(source) = planned.source {
            println!("Source: {source}");
        } else {
            println!("Source: unknown (full-frame fallback)");
        }
        println!("Crop:   {}", planned.crop.filter());
        println!("Output: {} ({aspect})", planned.output);
        println!("Filter: {}", planned.filter_chain());
    }
    Ok(())
}

fn validate_config(path: Option<&Path>, config: &Config) -> Result<()> {
    match path {
        Some(p) => {
            let contents = std::fs::read_to_string(p)
                .with_context(|| format!("reading {}", p.display()))?;
            Config::from_json(&contents)?;
            println!("✓ {} parses", p.display());
        }
        None => println!("No config file specified, using defaults"),
    }

    println!("  Base dir:      {}", config.toolchain.base_dir.display());
    println!("  Verification:  {:?}", config.toolchain.verification);
    println!("  Target aspect: {}", config.transform.target_aspect);
    println!("  Duration:      {}s", config.transform.duration_secs);

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("✓ No warnings");
    } else {
        for warning in &warnings {
            println!("! {warning}");
        }
    }
    Ok(())
}
