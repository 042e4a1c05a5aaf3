use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use opencv::core::{Point, Rect, Scalar, CV_8UC3};
use opencv::imgproc::{rectangle, LINE_8};
use opencv::prelude::Mat;

use plate_watch::display::{DisplaySink, DisplayUpdate};
use plate_watch::matcher::RegistryMatcher;
use plate_watch::metrics::PipelineMetrics;
use plate_watch::notify::{ComplianceDispatcher, Notifier, StaticLocation, CHALLAN_LINK};
use plate_watch::pipeline::{LoopState, MatchEvent, MatchSink, PipelineLoop};
use plate_watch::plate_detection::color_classifier::ColorLabel;
use plate_watch::plate_detection::contour_localizer::{ContourLocalizer, PlateLocalizer};
use plate_watch::plate_detection::tesseract_ocr::OcrEngine;
use plate_watch::plate_detection::text_extractor::{TextExtractor, PLATE_NOT_FOUND};
use plate_watch::plate_detection::video_reader::FrameSource;
use plate_watch::plate_detection::{CandidateRegion, Frame};
use plate_watch::registry::{Compliance, InMemoryRegistry, PlateRecord, PlateRegistry};
use plate_watch::{PlateError, Result};

fn blank(rows: i32, cols: i32) -> Mat {
    Mat::new_rows_cols_with_default(rows, cols, CV_8UC3, Scalar::all(0.0)).unwrap()
}

/// Dark frame with a yellow plate-sized block in the middle.
fn plate_frame() -> Mat {
    let mut frame = blank(240, 320);
    rectangle(
        &mut frame,
        Rect::new(100, 100, 120, 40),
        Scalar::new(0.0, 255.0, 255.0, 0.0),
        -1,
        LINE_8,
        0,
    )
    .unwrap();
    frame
}

fn plate_region() -> CandidateRegion {
    CandidateRegion::new([
        Point::new(100, 100),
        Point::new(219, 100),
        Point::new(219, 139),
        Point::new(100, 139),
    ])
}

struct QueueSource {
    frames: VecDeque<Mat>,
    next_index: u64,
    fail_when_empty: bool,
    released: Rc<RefCell<bool>>,
}

impl QueueSource {
    fn new(frames: Vec<Mat>) -> Self {
        Self {
            frames: frames.into(),
            next_index: 0,
            fail_when_empty: false,
            released: Rc::new(RefCell::new(false)),
        }
    }

    fn failing_after(frames: Vec<Mat>) -> Self {
        Self {
            fail_when_empty: true,
            ..Self::new(frames)
        }
    }
}

impl FrameSource for QueueSource {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        match self.frames.pop_front() {
            Some(image) => {
                let frame = Frame::new(self.next_index, image);
                self.next_index += 1;
                Ok(Some(frame))
            }
            None if self.fail_when_empty => {
                Err(PlateError::Stream("camera unplugged".to_string()))
            }
            None => Ok(None),
        }
    }
}

impl Drop for QueueSource {
    fn drop(&mut self) {
        *self.released.borrow_mut() = true;
    }
}

/// Always finds the same region.
struct FixedLocalizer(Option<CandidateRegion>);

impl PlateLocalizer for FixedLocalizer {
    fn localize(&mut self, _frame: &Mat) -> Result<Option<CandidateRegion>> {
        Ok(self.0)
    }
}

/// Returns scripted readings in order, then empty text.
struct ScriptedOcr(VecDeque<&'static str>);

impl ScriptedOcr {
    fn new(readings: &[&'static str]) -> Self {
        Self(readings.iter().copied().collect())
    }
}

impl OcrEngine for ScriptedOcr {
    fn recognize(&mut self, _grey: &Mat) -> Result<String> {
        Ok(self.0.pop_front().unwrap_or_default().to_string())
    }
}

#[derive(Clone, Default)]
struct DisplayLog(Rc<RefCell<Vec<String>>>);

impl DisplaySink for DisplayLog {
    fn show(&mut self, update: &DisplayUpdate) -> Result<()> {
        self.0.borrow_mut().push(update.text.clone());
        Ok(())
    }
}

#[derive(Clone, Default)]
struct MatchLog(Rc<RefCell<Vec<MatchEvent>>>);

impl MatchSink for MatchLog {
    fn on_match(&mut self, event: &MatchEvent) {
        self.0.borrow_mut().push(event.clone());
    }
}

#[derive(Clone, Default)]
struct Outbox(Rc<RefCell<Vec<(String, String)>>>);

impl Notifier for Outbox {
    fn send(&mut self, message: &str, destination: &str) -> Result<()> {
        self.0
            .borrow_mut()
            .push((message.to_string(), destination.to_string()));
        Ok(())
    }
}

struct BrokenRegistry;

impl PlateRegistry for BrokenRegistry {
    fn snapshot(&self) -> Result<Vec<PlateRecord>> {
        Err(PlateError::Registry("file locked".to_string()))
    }
}

fn record(plate: &str, challan: Compliance) -> PlateRecord {
    PlateRecord {
        plate: plate.to_string(),
        puc: Compliance::Yes,
        challan,
        insurance_valid: Compliance::Yes,
        contact_number: "9876543210".to_string(),
    }
}

fn pipeline(
    localizer: Box<dyn PlateLocalizer>,
    readings: &[&'static str],
    registry: Box<dyn PlateRegistry>,
    display: DisplayLog,
    sink: Box<dyn MatchSink>,
) -> PipelineLoop {
    PipelineLoop::new(
        localizer,
        TextExtractor::new(Box::new(ScriptedOcr::new(readings))),
        registry,
        RegistryMatcher::default(),
        Box::new(display),
        sink,
        PipelineMetrics::new().unwrap(),
    )
}

#[test]
fn exact_plate_all_compliant_matches_without_notice() {
    let outbox = Outbox::default();
    let dispatcher = ComplianceDispatcher::new(
        Box::new(outbox.clone()),
        Box::new(StaticLocation::new("Aurangabad")),
        "+91",
    );
    let display = DisplayLog::default();
    let mut pipeline = pipeline(
        Box::new(FixedLocalizer(Some(plate_region()))),
        &["MH12AB1234\n"],
        Box::new(InMemoryRegistry::new(vec![record("MH12AB1234", Compliance::Yes)])),
        display.clone(),
        Box::new(dispatcher),
    );

    let state = pipeline.run(QueueSource::new(vec![plate_frame()])).clone();

    let LoopState::MatchFound(event) = &state else {
        panic!("expected a match, got {state:?}");
    };
    assert_eq!(event.score, 100);
    assert_eq!(event.frame_index, 0);
    assert_eq!(event.plate_text.as_str(), "MH12AB1234");
    assert_eq!(event.color.label, ColorLabel::Yellow);
    assert!(outbox.0.borrow().is_empty());
    assert!(display.0.borrow().is_empty());
}

#[test]
fn pending_challan_sends_payment_link() {
    let outbox = Outbox::default();
    let dispatcher = ComplianceDispatcher::new(
        Box::new(outbox.clone()),
        Box::new(StaticLocation::new("Aurangabad")),
        "+91",
    );
    let mut pipeline = pipeline(
        Box::new(FixedLocalizer(Some(plate_region()))),
        &["MH12AB1234"],
        Box::new(InMemoryRegistry::new(vec![record("MH12AB1234", Compliance::No)])),
        DisplayLog::default(),
        Box::new(dispatcher),
    );

    let state = pipeline.run(QueueSource::new(vec![plate_frame()]));
    assert!(matches!(state, LoopState::MatchFound(_)));

    let sent = outbox.0.borrow();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].0.contains(CHALLAN_LINK));
    assert_eq!(sent[0].1, "+919876543210");
}

#[test]
fn ocr_confusion_still_matches() {
    let matches = MatchLog::default();
    let mut pipeline = pipeline(
        Box::new(FixedLocalizer(Some(plate_region()))),
        &["MH12A81234"],
        Box::new(InMemoryRegistry::new(vec![record("MH12AB1234", Compliance::Yes)])),
        DisplayLog::default(),
        Box::new(matches.clone()),
    );

    let state = pipeline.run(QueueSource::new(vec![plate_frame()]));

    let LoopState::MatchFound(event) = state else {
        panic!("expected a match");
    };
    assert!(event.score >= 80);
    assert_eq!(event.record.plate, "MH12AB1234");
    assert_eq!(matches.0.borrow().len(), 1);
}

#[test]
fn missing_plate_shows_sentinel_and_keeps_going() {
    let display = DisplayLog::default();
    let matches = MatchLog::default();
    let mut pipeline = pipeline(
        Box::new(ContourLocalizer::new(Default::default())),
        &[],
        Box::new(InMemoryRegistry::new(vec![record("MH12AB1234", Compliance::Yes)])),
        display.clone(),
        Box::new(matches.clone()),
    );
    let mut source = QueueSource::new(vec![blank(240, 320), blank(240, 320)]);

    assert!(matches!(pipeline.tick(&mut source), LoopState::Running));
    assert!(matches!(pipeline.tick(&mut source), LoopState::Running));
    assert!(matches!(pipeline.tick(&mut source), LoopState::StreamEnded));

    assert_eq!(*display.0.borrow(), vec![PLATE_NOT_FOUND, PLATE_NOT_FOUND]);
    assert!(matches.0.borrow().is_empty());
    assert_eq!(pipeline.ticks(), 2);
}

#[test]
fn match_on_later_frame_after_misses() {
    let display = DisplayLog::default();
    let mut pipeline = pipeline(
        Box::new(FixedLocalizer(Some(plate_region()))),
        &["", "ZZ99", "KA01HH9999"],
        Box::new(InMemoryRegistry::new(vec![record("KA01HH9999", Compliance::Yes)])),
        display.clone(),
        Box::new(MatchLog::default()),
    );

    let state = pipeline.run(QueueSource::new((0..5).map(|_| plate_frame()).collect()));

    let LoopState::MatchFound(event) = state else {
        panic!("expected a match");
    };
    assert_eq!(event.frame_index, 2);
    assert_eq!(*display.0.borrow(), vec!["", "ZZ99"]);
}

#[test]
fn earlier_registry_row_wins() {
    let mut pipeline = pipeline(
        Box::new(FixedLocalizer(Some(plate_region()))),
        &["MH12AB1234"],
        Box::new(InMemoryRegistry::new(vec![
            record("MH12AB1239", Compliance::Yes),
            record("MH12AB1234", Compliance::Yes),
        ])),
        DisplayLog::default(),
        Box::new(MatchLog::default()),
    );

    let state = pipeline.run(QueueSource::new(vec![plate_frame()]));

    let LoopState::MatchFound(event) = state else {
        panic!("expected a match");
    };
    assert_eq!(event.record.plate, "MH12AB1239");
    assert_eq!(event.score, 90);
}

#[test]
fn read_failure_is_terminal_and_releases_source() {
    let source = QueueSource::failing_after(vec![blank(240, 320)]);
    let released = source.released.clone();
    let mut pipeline = pipeline(
        Box::new(FixedLocalizer(None)),
        &[],
        Box::new(InMemoryRegistry::default()),
        DisplayLog::default(),
        Box::new(MatchLog::default()),
    );

    let state = pipeline.run(source);

    let LoopState::SourceError(reason) = state else {
        panic!("expected a source error, got {state:?}");
    };
    assert!(reason.contains("camera unplugged"));
    assert!(*released.borrow());
}

#[test]
fn stream_end_releases_source() {
    let source = QueueSource::new(vec![]);
    let released = source.released.clone();
    let mut pipeline = pipeline(
        Box::new(FixedLocalizer(None)),
        &[],
        Box::new(InMemoryRegistry::default()),
        DisplayLog::default(),
        Box::new(MatchLog::default()),
    );

    assert!(matches!(pipeline.run(source), LoopState::StreamEnded));
    assert!(*released.borrow());
}

#[test]
fn terminal_state_ignores_further_ticks() {
    let mut pipeline = pipeline(
        Box::new(FixedLocalizer(None)),
        &[],
        Box::new(InMemoryRegistry::default()),
        DisplayLog::default(),
        Box::new(MatchLog::default()),
    );
    let mut source = QueueSource::failing_after(vec![]);
    assert!(matches!(pipeline.tick(&mut source), LoopState::SourceError(_)));

    let mut fresh = QueueSource::new(vec![blank(240, 320)]);
    assert!(matches!(pipeline.tick(&mut fresh), LoopState::SourceError(_)));
    assert_eq!(fresh.frames.len(), 1);

    pipeline.reset();
    assert!(matches!(pipeline.tick(&mut fresh), LoopState::Running));
}

#[test]
fn tick_limit_ends_the_stream() {
    let display = DisplayLog::default();
    let mut pipeline = pipeline(
        Box::new(FixedLocalizer(None)),
        &[],
        Box::new(InMemoryRegistry::default()),
        display.clone(),
        Box::new(MatchLog::default()),
    )
    .with_max_ticks(Some(3));

    let state = pipeline.run(QueueSource::new((0..10).map(|_| blank(60, 80)).collect()));

    assert!(matches!(state, LoopState::StreamEnded));
    assert_eq!(pipeline.ticks(), 3);
    assert_eq!(display.0.borrow().len(), 3);
}

#[test]
fn unreadable_registry_degrades_to_no_match() {
    let display = DisplayLog::default();
    let matches = MatchLog::default();
    let mut pipeline = pipeline(
        Box::new(FixedLocalizer(Some(plate_region()))),
        &["MH12AB1234"],
        Box::new(BrokenRegistry),
        display.clone(),
        Box::new(matches.clone()),
    );

    let state = pipeline.run(QueueSource::new(vec![plate_frame()]));

    assert!(matches!(state, LoopState::StreamEnded));
    assert_eq!(*display.0.borrow(), vec!["MH12AB1234"]);
    assert!(matches.0.borrow().is_empty());
}
