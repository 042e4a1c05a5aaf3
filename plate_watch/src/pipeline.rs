//! Per-frame state machine.
//!
//! Every tick pulls one frame, localizes and reads the plate, and looks the
//! text up in a fresh registry snapshot. The loop stops on the first match,
//! at the end of the stream, or when the source fails.

use std::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::display::DisplaySink;
use crate::display::DisplayUpdate;
use crate::matcher::RegistryMatcher;
use crate::metrics::PipelineMetrics;
use crate::plate_detection::color_classifier::classify;
use crate::plate_detection::color_classifier::ColorReport;
use crate::plate_detection::contour_localizer::PlateLocalizer;
use crate::plate_detection::normalize::normalize;
use crate::plate_detection::normalize::NormalizedPlate;
use crate::plate_detection::text_extractor::Extraction;
use crate::plate_detection::text_extractor::TextExtractor;
use crate::plate_detection::text_extractor::PLATE_NOT_FOUND;
use crate::plate_detection::video_reader::FrameSource;
use crate::plate_detection::CandidateRegion;
use crate::plate_detection::Frame;
use crate::registry::PlateRecord;
use crate::registry::PlateRegistry;
use crate::Result;

/// Everything known about a matched plate.
#[derive(Debug, Clone)]
pub struct MatchEvent {
    pub record: PlateRecord,
    pub color: ColorReport,
    pub score: u8,
    pub frame_index: u64,
    /// OCR text after normalization
    pub plate_text: NormalizedPlate,
}

/// Receives the single match that ends a run.
pub trait MatchSink {
    fn on_match(&mut self, event: &MatchEvent);
}

#[derive(Debug, Clone)]
pub enum LoopState {
    Running,
    MatchFound(MatchEvent),
    StreamEnded,
    SourceError(String),
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LoopState::Running)
    }
}

/// What one frame produced before the registry lookup.
struct TickOutcome {
    extraction: Extraction,
    region: Option<CandidateRegion>,
    plate: NormalizedPlate,
}

pub struct PipelineLoop {
    localizer: Box<dyn PlateLocalizer>,
    extractor: TextExtractor,
    registry: Box<dyn PlateRegistry>,
    matcher: RegistryMatcher,
    display: Box<dyn DisplaySink>,
    match_sink: Box<dyn MatchSink>,
    metrics: PipelineMetrics,
    max_ticks: Option<u64>,
    ticks: u64,
    state: LoopState,
}

impl PipelineLoop {
    pub fn new(
        localizer: Box<dyn PlateLocalizer>,
        extractor: TextExtractor,
        registry: Box<dyn PlateRegistry>,
        matcher: RegistryMatcher,
        display: Box<dyn DisplaySink>,
        match_sink: Box<dyn MatchSink>,
        metrics: PipelineMetrics,
    ) -> Self {
        Self {
            localizer,
            extractor,
            registry,
            matcher,
            display,
            match_sink,
            metrics,
            max_ticks: None,
            ticks: 0,
            state: LoopState::Running,
        }
    }

    /// Stop as `StreamEnded` after this many frames.
    pub fn with_max_ticks(mut self, max_ticks: Option<u64>) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Back to `Running` with the tick count cleared, for another run.
    pub fn reset(&mut self) {
        self.state = LoopState::Running;
        self.ticks = 0;
    }

    /// Processes one frame. Does nothing once the loop has stopped.
    pub fn tick(&mut self, source: &mut dyn FrameSource) -> &LoopState {
        if self.state.is_terminal() {
            return &self.state;
        }
        if self.max_ticks.is_some_and(|max| self.ticks >= max) {
            info!(ticks = self.ticks, "tick limit reached");
            self.state = LoopState::StreamEnded;
            return &self.state;
        }

        let frame = match source.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!(ticks = self.ticks, "stream ended");
                self.state = LoopState::StreamEnded;
                return &self.state;
            }
            Err(e) => {
                warn!(error = %e, "frame source failed");
                self.state = LoopState::SourceError(e.to_string());
                return &self.state;
            }
        };
        self.ticks += 1;
        self.metrics.frames.inc();

        let outcome = match self.read_plate(&frame) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(frame = frame.index, error = %e, "frame processing failed");
                TickOutcome {
                    extraction: Extraction::unreadable(frame.image.try_clone().unwrap_or_default()),
                    region: None,
                    plate: NormalizedPlate::default(),
                }
            }
        };

        if let Some(event) = self.lookup(&frame, &outcome) {
            self.metrics.matches.inc();
            self.match_sink.on_match(&event);
            self.state = LoopState::MatchFound(event);
            return &self.state;
        }

        let text = if outcome.region.is_none() {
            PLATE_NOT_FOUND.to_string()
        } else {
            outcome.extraction.text.trim().to_string()
        };
        let update = DisplayUpdate {
            frame_index: frame.index,
            annotated: outcome.extraction.annotated,
            text,
            region: outcome.region,
        };
        if let Err(e) = self.display.show(&update) {
            warn!(frame = frame.index, error = %e, "display failed");
        }

        &self.state
    }

    /// Ticks until the loop stops. The source is dropped before returning.
    pub fn run<S: FrameSource>(&mut self, mut source: S) -> &LoopState {
        while !self.tick(&mut source).is_terminal() {}
        drop(source);
        &self.state
    }

    fn read_plate(&mut self, frame: &Frame) -> Result<TickOutcome> {
        trace!(frame = frame.index, width = frame.width(), height = frame.height(), "tick");
        let region = self.localizer.localize(&frame.image)?;
        if region.is_some() {
            self.metrics.plates_localized.inc();
        }

        let started = Instant::now();
        let extraction = self.extractor.extract(&frame.image, region.as_ref())?;
        self.metrics
            .ocr_seconds
            .observe(started.elapsed().as_secs_f64());

        let plate = normalize(&extraction.text);
        debug!(frame = frame.index, raw = %extraction.text.trim(), %plate, "plate text");

        Ok(TickOutcome {
            extraction,
            region,
            plate,
        })
    }

    fn lookup(&self, frame: &Frame, outcome: &TickOutcome) -> Option<MatchEvent> {
        if outcome.plate.is_empty() {
            return None;
        }

        let records = match self.registry.snapshot() {
            Ok(records) => records,
            Err(e) => {
                warn!(frame = frame.index, error = %e, "registry unavailable this frame");
                return None;
            }
        };
        let result = self.matcher.match_plate(&outcome.plate, &records)?;

        let color = match &outcome.extraction.plate_crop {
            Some(crop) => classify(crop).unwrap_or_else(|e| {
                warn!(frame = frame.index, error = %e, "color classification failed");
                ColorReport::unknown()
            }),
            None => ColorReport::unknown(),
        };

        Some(MatchEvent {
            record: result.record,
            color,
            score: result.score,
            frame_index: frame.index,
            plate_text: outcome.plate.clone(),
        })
    }
}
