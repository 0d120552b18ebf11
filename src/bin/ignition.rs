//! Ignition command-line driver.
//!
//! Builds an engine from configuration, runs the autonomous loop on one
//! stimulus and prints the workspace summary. Ctrl-C cancels the loop
//! cooperatively; the cycle in flight is not broadcast.
//!
//! # Environment Variables
//!
//! See [`ignition::config`]. In addition:
//!
//! - `RUST_LOG` - tracing filter (default: "info,ignition=debug")
//!
//! # Usage
//!
//! ```bash
//! ignition "The cat is on the mat." --cycles 3
//! ignition "Find the 1" --image photo.jpg --monitor --target-certainty 90
//! ```
//!
//! Vision personas are dropped when the stimulus has no image. With an
//! image they stay registered for the whole run, so from the second cycle
//! on (where the stimulus is the previous winner's text) they answer
//! text-only prompts like every other persona.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;

use ignition::{
    CancelToken, EngineBuilder, IgnitionConfig, LlmMonitor, LoopBounds, MediaRef,
    OpenAICompatibleTransport, PersonaRegistry, Stimulus,
};

/// Global-workspace ignition engine
#[derive(Debug, Parser)]
#[command(name = "ignition")]
#[command(about = "Run competing analyzers on a stimulus and print the workspace", long_about = None)]
#[command(version)]
struct Args {
    /// Text stimulus, or the caption when an image is attached
    stimulus: Option<String>,

    /// Number of cycles (default: engine.max_cycles)
    #[arg(short = 'n', long)]
    cycles: Option<usize>,

    /// Attach an image file to the stimulus
    #[arg(short, long, conflicts_with = "image_url")]
    image: Option<PathBuf>,

    /// Attach a remote image to the stimulus
    #[arg(long)]
    image_url: Option<String>,

    /// YAML configuration file
    #[arg(short, long, env = "IGNITION_CONFIG")]
    config: Option<PathBuf>,

    /// Directory of persona YAML files
    #[arg(short, long)]
    personas: Option<PathBuf>,

    /// Enable the metacognitive monitor
    #[arg(short, long)]
    monitor: bool,

    /// Stop once the monitor reports this certainty in percent (implies --monitor)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    target_certainty: Option<u8>,

    /// Print the final entry as JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    fn monitor_enabled(&self) -> bool {
        self.monitor || self.target_certainty.is_some()
    }
}

fn guess_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

fn build_stimulus(args: &Args) -> anyhow::Result<Stimulus> {
    let text = args.stimulus.clone();
    let media = match (&args.image, &args.image_url) {
        (Some(path), None) => {
            let data = std::fs::read(path)
                .with_context(|| format!("cannot read image {}", path.display()))?;
            Some(MediaRef::inline(guess_mime(path), data))
        }
        (None, Some(url)) => Some(MediaRef::url(url.clone())),
        _ => None,
    };
    match (media, text) {
        (Some(media), caption) => Ok(Stimulus::media(media, caption)),
        (None, Some(text)) => Ok(Stimulus::text(text)),
        (None, None) => bail!("no stimulus given (see --help)"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ignition=debug".into()),
        )
        .init();

    let args = Args::parse();
    let stimulus = build_stimulus(&args)?;

    let mut config = match &args.config {
        Some(path) => IgnitionConfig::from_yaml_file(path)?,
        None => IgnitionConfig::default(),
    };
    config.apply_env()?;
    if let Some(cycles) = args.cycles {
        config.engine.max_cycles = Some(cycles);
    }
    if args.target_certainty.is_some() {
        config.engine.target_certainty = args.target_certainty;
    }
    config.engine.validate()?;

    let mut registry = if config.personas.is_empty() {
        PersonaRegistry::with_builtins()
    } else {
        let mut registry = PersonaRegistry::new();
        for persona in config.personas.clone() {
            registry.register(persona)?;
        }
        registry
    };
    if let Some(dir) = &args.personas {
        let loaded = registry.load_directory(dir)?;
        tracing::info!("loaded {} personas from {}", loaded, dir.display());
    }
    // Vision personas only take part when there is something to look at.
    if stimulus.media_ref().is_none() {
        registry.retain(|persona| !persona.vision);
    }

    let transport = Arc::new(OpenAICompatibleTransport::from_config(&config.transport)?);
    let mut builder = EngineBuilder::from_config(&config.engine)
        .analyzers(registry.build_analyzers(transport.clone(), &config.transport));
    if args.monitor_enabled() {
        builder = builder.monitor(Arc::new(LlmMonitor::new(
            transport,
            config.transport.text_model.clone(),
        )));
    }
    let mut engine = builder.build()?;

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            tracing::warn!("interrupt received, cancelling");
            cancel.cancel();
        })
        .context("cannot install Ctrl-C handler")?;
    }

    tracing::info!(
        "session {}: {} analyzers [{}], stimulus {:?}",
        engine.session_id(),
        engine.analyzers().len(),
        registry.ids().join(", "),
        stimulus.as_text()
    );

    let bounds = LoopBounds::from_config(&config.engine).cancel_on(cancel);
    let summary = engine.run(stimulus, bounds).await?;

    tracing::info!(
        "{} cycles, stopped: {}",
        summary.cycles_run,
        summary.stop_reason
    );
    if args.json {
        match summary.workspace.current() {
            Some(entry) => println!("{}", serde_json::to_string_pretty(entry.as_ref())?),
            None => println!("null"),
        }
    } else {
        println!("{}", summary.workspace.summary());
    }
    Ok(())
}
