use prometheus::Encoder;
use prometheus::Histogram;
use prometheus::HistogramOpts;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;

use crate::PlateError;
use crate::Result;

/// Pipeline counters, registered on a registry owned by this struct.
#[derive(Clone)]
pub struct PipelineMetrics {
    registry: Registry,
    pub frames: IntCounter,
    pub plates_localized: IntCounter,
    pub ocr_seconds: Histogram,
    pub matches: IntCounter,
    /// Labelled by `outcome`: sent, failed or skipped
    pub notifications: IntCounterVec,
}

impl PipelineMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("plate_watch".to_string()), None)?;

        let frames = IntCounter::new("frames_total", "Frames pulled from the source")?;
        let plates_localized = IntCounter::new(
            "plates_localized_total",
            "Frames with a quadrilateral plate candidate",
        )?;
        let ocr_seconds = Histogram::with_opts(
            HistogramOpts::new("extraction_seconds", "Mask, crop and OCR time per frame")
                .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        )?;
        let matches = IntCounter::new("matches_total", "Registry matches")?;
        let notifications = IntCounterVec::new(
            Opts::new("notifications_total", "Compliance notices by outcome"),
            &["outcome"],
        )?;

        registry.register(Box::new(frames.clone()))?;
        registry.register(Box::new(plates_localized.clone()))?;
        registry.register(Box::new(ocr_seconds.clone()))?;
        registry.register(Box::new(matches.clone()))?;
        registry.register(Box::new(notifications.clone()))?;

        Ok(Self {
            registry,
            frames,
            plates_localized,
            ocr_seconds,
            matches,
            notifications,
        })
    }

    /// Prometheus text exposition of every metric.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        exposition_text(buffer)
    }
}

fn exposition_text(buffer: Vec<u8>) -> Result<String> {
    String::from_utf8(buffer)
        .map_err(|e| PlateError::Metrics(prometheus::Error::Msg(e.to_string())))
}
