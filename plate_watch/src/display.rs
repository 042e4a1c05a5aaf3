//! Where annotated frames go after each tick.

use opencv::core::Size;
use opencv::highgui;
use opencv::prelude::Mat;
use opencv::prelude::MatTraitConst;
use opencv::prelude::VideoWriterTrait;
use opencv::prelude::VideoWriterTraitConst;
use opencv::videoio::VideoWriter;
use std::path::PathBuf;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::plate_detection::bounding_box_render::render_overlay;
use crate::plate_detection::CandidateRegion;
use crate::PlateError;
use crate::Result;

/// Everything a sink needs to draw one frame.
#[derive(Debug)]
pub struct DisplayUpdate {
    pub frame_index: u64,
    pub annotated: Mat,
    pub text: String,
    pub region: Option<CandidateRegion>,
}

pub trait DisplaySink {
    fn show(&mut self, update: &DisplayUpdate) -> Result<()>;
}

/// Drops every frame. Used when no output is configured.
#[derive(Debug, Default)]
pub struct NullDisplay;

impl DisplaySink for NullDisplay {
    fn show(&mut self, update: &DisplayUpdate) -> Result<()> {
        debug!(frame = update.frame_index, text = %update.text, "frame processed");
        Ok(())
    }
}

/// HighGUI window.
pub struct WindowSink {
    name: String,
}

impl WindowSink {
    pub fn new(name: &str) -> Result<Self> {
        highgui::named_window(name, highgui::WINDOW_AUTOSIZE)?;
        Ok(Self {
            name: name.to_string(),
        })
    }
}

impl DisplaySink for WindowSink {
    fn show(&mut self, update: &DisplayUpdate) -> Result<()> {
        let image = render_overlay(update)?;
        if image.empty() {
            return Ok(());
        }
        highgui::imshow(&self.name, &image)?;
        highgui::wait_key(1)?;
        Ok(())
    }
}

impl Drop for WindowSink {
    fn drop(&mut self) {
        if let Err(e) = highgui::destroy_window(&self.name) {
            warn!(window = %self.name, error = %e, "could not close window");
        }
    }
}

/// Writes rendered frames to an MJPG file. The writer opens on the first
/// frame, once the frame size is known.
pub struct VideoFileSink {
    path: PathBuf,
    fps: f64,
    writer: Option<VideoWriter>,
}

impl VideoFileSink {
    pub fn new(path: impl Into<PathBuf>, fps: f64) -> Self {
        Self {
            path: path.into(),
            fps,
            writer: None,
        }
    }

    fn writer_for(&mut self, image: &Mat) -> Result<&mut VideoWriter> {
        if self.writer.is_none() {
            let fourcc = VideoWriter::fourcc('M', 'J', 'P', 'G')?;
            let location = self.path.to_string_lossy().to_string();
            let writer = VideoWriter::new(
                &location,
                fourcc,
                self.fps,
                Size::new(image.cols(), image.rows()),
                true,
            )?;
            if !writer.is_opened()? {
                return Err(PlateError::Stream(format!(
                    "could not open recording {location}"
                )));
            }
            info!(path = %location, "recording started");
            self.writer = Some(writer);
        }
        self.writer
            .as_mut()
            .ok_or_else(|| PlateError::Stream("recording writer missing".to_string()))
    }
}

impl DisplaySink for VideoFileSink {
    fn show(&mut self, update: &DisplayUpdate) -> Result<()> {
        let image = render_overlay(update)?;
        if image.empty() {
            return Ok(());
        }
        self.writer_for(&image)?.write(&image)?;
        Ok(())
    }
}

impl Drop for VideoFileSink {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.release() {
                warn!(path = %self.path.display(), error = %e, "recording release failed");
            }
        }
    }
}

/// Sends each update to every inner sink. One failing sink does not starve
/// the others; the first error is returned after all have run.
#[derive(Default)]
pub struct DisplayFanout {
    sinks: Vec<Box<dyn DisplaySink>>,
}

impl DisplayFanout {
    pub fn new(sinks: Vec<Box<dyn DisplaySink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Box<dyn DisplaySink>) {
        self.sinks.push(sink);
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl DisplaySink for DisplayFanout {
    fn show(&mut self, update: &DisplayUpdate) -> Result<()> {
        let mut first_error = None;
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.show(update) {
                warn!(frame = update.frame_index, error = %e, "display sink failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
