mod cli;

use trackmix::{
    config, probe,
    queue::{MixQueue, MixRequest},
    selection::TrackSelection,
    state::{JobStatus, JobStore},
};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, TrackSpec};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tm_av::{MkvmergeMuxer, MuxFlags, ToolRegistry};
use tm_core::events::EventBus;
use tm_core::{format_size, ProbedFile, TrackKind};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "trackmix=trace,tm_av=trace,tm_core=debug".to_string()
        } else {
            "trackmix=debug,tm_av=debug,tm_core=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Probe { file, kind, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_file(&file, kind, json, cli.config.as_deref()))
        }
        Commands::Mix {
            output,
            video,
            audio,
            subtitle,
        } => {
            let specs: Vec<(TrackKind, TrackSpec)> = video
                .into_iter()
                .map(|s| (TrackKind::Video, s))
                .chain(audio.into_iter().map(|s| (TrackKind::Audio, s)))
                .chain(subtitle.into_iter().map(|s| (TrackKind::Subtitle, s)))
                .collect();
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(mix(output, specs, cli.config.as_deref()))
        }
        Commands::Jobs { json } => list_jobs(cli.config.as_deref(), json),
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("trackmix {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn probe_file(
    file: &Path,
    kind: Option<TrackKind>,
    json: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let tools = ToolRegistry::discover(&config.tools);
    let prober = probe::build_prober(&config, &tools);

    let probed = match kind {
        Some(kind) => probe::probe_kind(prober.as_ref(), file, kind).await,
        None => prober.probe(file).await,
    }
    .with_context(|| format!("Failed to probe {:?}", file))?;

    if json {
        let json_str = serde_json::to_string_pretty(&probed)?;
        println!("{}", json_str);
        return Ok(());
    }

    println!("File: {}", probed.path.display());
    if let Some(ref container) = probed.container {
        println!("Container: {}", container);
    }
    if let Some(size) = probed.size {
        println!("Size: {}", format_size(size));
    }

    for kind in TrackKind::ALL {
        let tracks: Vec<_> = probed.tracks_of(kind).collect();
        if tracks.is_empty() {
            continue;
        }
        println!("\n{} tracks: {}", kind, tracks.len());
        for track in tracks {
            print!("  [{}] {}", track.track_id, track.codec);
            if let Some(ref attributes) = track.attributes {
                print!(" {}", attributes);
            }
            match (&track.lang, &track.language_name) {
                (Some(lang), Some(name)) => print!(" ({}, {})", lang, name),
                (Some(lang), None) => print!(" ({})", lang),
                _ => {}
            }
            if let Some(ref name) = track.track_name {
                print!(" \"{}\"", name);
            }
            if track.is_default == Some(true) {
                print!(" [default]");
            }
            if track.is_forced == Some(true) {
                print!(" [forced]");
            }
            println!();
        }
    }

    Ok(())
}

async fn mix(output: PathBuf, specs: Vec<(TrackKind, TrackSpec)>, config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let tools = ToolRegistry::discover(&config.tools);

    // Probe every source once, in the order first named.
    let mut paths: Vec<PathBuf> = Vec::new();
    for (_, spec) in &specs {
        if !paths.contains(&spec.path) {
            paths.push(spec.path.clone());
        }
    }
    let prober = probe::build_prober(&config, &tools);
    let mut selection = TrackSelection::new();
    for (path, result) in probe::probe_all(prober, paths).await {
        let probed: ProbedFile = result.with_context(|| format!("Failed to probe {:?}", path))?;
        selection.load(probed);
    }

    for (kind, spec) in &specs {
        for (track_id, lang) in &spec.tracks {
            let track = selection
                .file(&spec.path)
                .and_then(|f| f.track(track_id))
                .with_context(|| format!("No track {} in {:?}", track_id, spec.path))?;
            if track.kind != *kind {
                anyhow::bail!(
                    "Track {} in {:?} is {}, not {}",
                    track_id,
                    spec.path,
                    track.kind,
                    kind
                );
            }
            selection.select(&spec.path, track_id)?;
            if let Some(lang) = lang {
                selection.set_lang_override(&spec.path, track_id, lang)?;
            }
        }
    }

    let muxer = MkvmergeMuxer::from_registry(&tools, MuxFlags::from(&config.mix))
        .context("mkvmerge is required for mixing")?;
    let store = Arc::new(JobStore::from_config(&config.queue, Arc::new(EventBus::default()))?);
    let queue = MixQueue::start(&config, store, Arc::new(muxer));

    let id = queue.submit(MixRequest::new(output, selection.to_mix_inputs()))?;
    println!("Queued job #{}", id);

    let record = tokio::select! {
        record = queue.wait(id) => record?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, cancelling job #{}", id);
            queue.cancel(id)?;
            queue.wait(id).await?
        }
    };
    queue.shutdown().await;

    let message = record.message.unwrap_or_default();
    match record.status {
        JobStatus::Success => {
            println!("✓ {}", message);
            Ok(())
        }
        status => anyhow::bail!("Job #{} {}: {}", id, status, message),
    }
}

fn list_jobs(config_path: Option<&Path>, json: bool) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let Some(ref state_path) = config.queue.state_path else {
        println!("No job history configured (set queue.state_path)");
        return Ok(());
    };

    // A running `mix` may own the history; read it without taking over.
    let store = JobStore::open_read_only(
        state_path,
        config.queue.history_limit,
        Arc::new(EventBus::default()),
    )?;
    let records = store.list_newest_first();

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No jobs");
        return Ok(());
    }

    for record in &records {
        print!(
            "#{:<5} {:<10} {}",
            record.id().get(),
            record.status.as_str(),
            record.job.output_path.display()
        );
        if let Some(ref message) = record.message {
            print!("  {}", message);
        }
        println!();
    }

    let counts = store.counts();
    let summary: Vec<String> = JobStatus::ALL
        .iter()
        .map(|&status| format!("{} {}", counts.get(status), status))
        .collect();
    println!("\n{} jobs: {}", counts.total(), summary.join(", "));
    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = config::load_config_or_default(config_path)?;
    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install them to enable all features.");
    }

    Ok(())
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

    println!("  Mix workers: {}", config.queue.max_concurrent_mix_jobs);
    match config.queue.job_timeout() {
        Some(timeout) => println!("  Job timeout: {}s", timeout.as_secs()),
        None => println!("  Job timeout: none"),
    }
    println!("  History limit: {}", config.queue.history_limit);
    match config.queue.state_path {
        Some(ref p) => println!("  State file: {}", p.display()),
        None => println!("  State file: (in memory)"),
    }
    println!("  Probe cache: {}", config.probe.cache);
    for (kind, lang) in &config.mix.default_languages {
        println!("  Default {} language: {}", kind, lang);
    }

    Ok(())
}
