use opencv::prelude::Mat;
use opencv::prelude::MatTraitConst;
use opencv::prelude::VideoCaptureTrait;
use opencv::prelude::VideoCaptureTraitConst;
use opencv::videoio::VideoCapture;
use opencv::videoio::CAP_ANY;
use tracing::info;
use tracing::warn;

use super::Frame;
use crate::config::SourceConfig;
use crate::utils::FpsLimiter;
use crate::PlateError;
use crate::Result;

/// Produces frames one at a time.
///
/// `Ok(None)` means the stream ended normally; `Err` is a read failure.
/// Sources release their device when dropped.
pub trait FrameSource {
    fn read_frame(&mut self) -> Result<Option<Frame>>;
}

pub struct VideoReader {
    capture: VideoCapture,
    description: String,
    /// Files end; a device that stops delivering has failed.
    is_file: bool,
    next_index: u64,
    fps_limiter: Option<FpsLimiter>,
}

impl VideoReader {
    pub fn open(config: &SourceConfig) -> Result<Self> {
        let (capture, description, is_file) = match &config.uri {
            Some(uri) => (VideoCapture::from_file(uri, CAP_ANY)?, uri.clone(), true),
            None => (
                VideoCapture::new(config.device, CAP_ANY)?,
                format!("device {}", config.device),
                false,
            ),
        };

        if !capture.is_opened()? {
            return Err(PlateError::Stream(format!("could not open {description}")));
        }
        info!(source = %description, "frame source opened");

        Ok(Self {
            capture,
            description,
            is_file,
            next_index: 0,
            fps_limiter: config.max_fps.map(FpsLimiter::new),
        })
    }
}

impl FrameSource for VideoReader {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(limiter) = self.fps_limiter.as_mut() {
            limiter.wait();
        }

        let mut image = Mat::default();
        let grabbed = self.capture.read(&mut image)?;

        if !grabbed || image.empty() {
            if self.is_file {
                info!(source = %self.description, frames = self.next_index, "end of stream");
                return Ok(None);
            }
            return Err(PlateError::Stream(format!(
                "could not read frame {} from {}",
                self.next_index, self.description
            )));
        }

        let frame = Frame::new(self.next_index, image);
        self.next_index += 1;
        Ok(Some(frame))
    }
}

impl Drop for VideoReader {
    fn drop(&mut self) {
        info!(source = %self.description, "releasing frame source");
        if let Err(e) = self.capture.release() {
            warn!(error = %e, "frame source release failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_fails_to_open() {
        let config = SourceConfig {
            uri: Some("/nonexistent/clip.mp4".to_string()),
            ..SourceConfig::default()
        };
        assert!(VideoReader::open(&config).is_err());
    }
}
