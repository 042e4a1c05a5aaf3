use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use pyroscope::pyroscope::PyroscopeAgentRunning;
use pyroscope::PyroscopeAgent;
use pyroscope_pprofrs::{pprof_backend, PprofConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use plate_watch::config::{load_config, AppConfig};
use plate_watch::display::{DisplayFanout, DisplaySink, NullDisplay, VideoFileSink, WindowSink};
use plate_watch::matcher::RegistryMatcher;
use plate_watch::metrics::PipelineMetrics;
use plate_watch::notify::{
    ComplianceDispatcher, LocationIqProvider, LocationProvider, LogNotifier, Notifier,
    StaticLocation, TwilioNotifier,
};
use plate_watch::pipeline::{LoopState, PipelineLoop};
use plate_watch::plate_detection::contour_localizer::ContourLocalizer;
use plate_watch::plate_detection::rtp_sink::RtpSink;
use plate_watch::plate_detection::tesseract_ocr::TesseractOcr;
use plate_watch::plate_detection::text_extractor::TextExtractor;
use plate_watch::plate_detection::video_reader::VideoReader;
use plate_watch::registry::CsvRegistry;

/// Watch a camera or video for registered plates and send compliance notices.
#[derive(Parser, Debug)]
#[command(name = "plate_watch")]
#[command(version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Video file or stream URL, overrides the configured source
    #[arg(short, long)]
    source: Option<String>,

    /// Capture device index, used when no source URI is set
    #[arg(short, long)]
    device: Option<i32>,

    /// Registry CSV
    #[arg(short, long)]
    registry: Option<PathBuf>,

    /// Stop after this many frames
    #[arg(long)]
    max_ticks: Option<u64>,
}

fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if let Some(source) = &args.source {
        config.source.uri = Some(source.clone());
    }
    if let Some(device) = args.device {
        config.source.device = device;
        if args.source.is_none() {
            config.source.uri = None;
        }
    }
    if let Some(registry) = &args.registry {
        config.registry.path = registry.clone();
    }
    if args.max_ticks.is_some() {
        config.pipeline.max_ticks = args.max_ticks;
    }
}

fn start_profiler(config: &AppConfig) -> Result<Option<PyroscopeAgent<PyroscopeAgentRunning>>> {
    let Some(url) = &config.telemetry.pyroscope_url else {
        return Ok(None);
    };
    let agent = PyroscopeAgent::builder(url.as_str(), "plate_watch")
        .backend(pprof_backend(PprofConfig::new().sample_rate(100)))
        .build()
        .context("Failed to build pyroscope agent")?;
    let running = agent.start().context("Failed to start pyroscope agent")?;
    info!(%url, "profiling enabled");
    Ok(Some(running))
}

fn build_display(config: &AppConfig) -> Result<Box<dyn DisplaySink>> {
    let mut fanout = DisplayFanout::default();
    if let Some(window) = &config.display.window {
        fanout.push(Box::new(
            WindowSink::new(window).context("Failed to open display window")?,
        ));
    }
    if let Some(path) = &config.display.record_path {
        let fps = config.source.max_fps.unwrap_or(20) as f64;
        fanout.push(Box::new(VideoFileSink::new(path, fps)));
    }
    if let Some(rtp) = &config.display.rtp {
        fanout.push(Box::new(
            RtpSink::new(rtp).context("Failed to start RTP stream")?,
        ));
    }

    if fanout.is_empty() {
        Ok(Box::new(NullDisplay))
    } else {
        Ok(Box::new(fanout))
    }
}

fn build_dispatcher(config: &AppConfig, metrics: &PipelineMetrics) -> ComplianceDispatcher {
    let notifier: Box<dyn Notifier> = match &config.notify.twilio {
        Some(twilio) => Box::new(TwilioNotifier::new(twilio.clone())),
        None => {
            warn!("no twilio credentials configured, notices will only be logged");
            Box::new(LogNotifier)
        }
    };
    let location: Box<dyn LocationProvider> = match &config.location.api_key {
        Some(key) => Box::new(LocationIqProvider::new(&config.location, key.clone())),
        None => Box::new(StaticLocation::from_config(&config.location)),
    };

    ComplianceDispatcher::new(notifier, location, config.notify.country_prefix.clone())
        .with_metrics(metrics.clone())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AppConfig::default(),
    };
    apply_overrides(&mut config, &args);

    let profiler = start_profiler(&config)?;
    let metrics = PipelineMetrics::new().context("Failed to register metrics")?;

    let ocr = TesseractOcr::new(&config.ocr).context("Failed to initialise OCR")?;
    let matcher = RegistryMatcher::new(config.matcher.threshold).with_policy(config.matcher.policy);
    let registry = CsvRegistry::new(&config.registry.path);
    info!(
        registry = %registry.path().display(),
        threshold = matcher.threshold(),
        policy = ?matcher.policy(),
        "plate_watch starting"
    );

    let mut pipeline = PipelineLoop::new(
        Box::new(ContourLocalizer::new(config.localizer.clone())),
        TextExtractor::new(Box::new(ocr)),
        Box::new(registry),
        matcher,
        build_display(&config)?,
        Box::new(build_dispatcher(&config, &metrics)),
        metrics.clone(),
    )
    .with_max_ticks(config.pipeline.max_ticks);

    if config.pipeline.restart_after_match && !config.restarts_after_match() {
        warn!("restart_after_match is ignored for video files");
    }

    loop {
        let source = VideoReader::open(&config.source).context("Failed to open frame source")?;
        let state = pipeline.run(source).clone();

        match &state {
            LoopState::MatchFound(event) => {
                info!(
                    plate = %event.record.plate,
                    read = %event.plate_text,
                    score = event.score,
                    color = %event.color.label,
                    "stopped on match"
                );
                if config.restarts_after_match() {
                    pipeline.reset();
                    continue;
                }
            }
            LoopState::StreamEnded => info!(ticks = pipeline.ticks(), "stream ended"),
            LoopState::SourceError(reason) => warn!(%reason, "stopped on source error"),
            LoopState::Running => {}
        }
        break;
    }

    if let Some(path) = &config.telemetry.metrics_path {
        std::fs::write(path, metrics.render()?)
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
    }

    if let Some(running) = profiler {
        let ready = running.stop().context("Failed to stop pyroscope agent")?;
        ready.shutdown();
    }

    info!("Done");
    Ok(())
}
