use crossbeam::channel::bounded;
use crossbeam::channel::Receiver;
use crossbeam::channel::Sender;
use crossbeam::channel::TrySendError;
use gstreamer::parse_launch;
use gstreamer::prelude::*;
use gstreamer::Buffer;
use gstreamer::Caps;
use gstreamer::ClockTime;
use gstreamer_video::VideoCapsBuilder;
use gstreamer_video::VideoFormat;
use opencv::core::Size;
use opencv::imgproc::resize;
use opencv::imgproc::INTER_LINEAR;
use opencv::prelude::Mat;
use opencv::prelude::MatTraitConst;
use opencv::prelude::MatTraitConstManual;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::RtpConfig;
use crate::display::DisplaySink;
use crate::display::DisplayUpdate;
use crate::plate_detection::bounding_box_render::render_overlay;
use crate::PlateError;
use crate::Result;

/// Frames queued for the encoder before new ones are dropped.
const QUEUE_DEPTH: usize = 4;

/// Bounded handoff to the appsrc streaming thread.
///
/// The need-data callback blocks on the receiving end, so the sender must be
/// closed before the pipeline is stopped or the state change never returns.
struct FrameQueue<T> {
    sender: Option<Sender<T>>,
}

impl<T> FrameQueue<T> {
    fn new(depth: usize) -> (Self, Receiver<T>) {
        let (sender, receiver) = bounded(depth);
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// `Ok(true)` when queued, `Ok(false)` when the queue is full.
    fn push(&self, item: T) -> Result<bool> {
        let Some(sender) = &self.sender else {
            return Err(PlateError::Stream("rtp queue closed".to_string()));
        };
        match sender.try_send(item) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => Ok(false),
            Err(TrySendError::Disconnected(_)) => {
                Err(PlateError::Stream("rtp appsrc went away".to_string()))
            }
        }
    }

    /// Wakes a receiver parked in `recv`.
    fn close(&mut self) {
        self.sender.take();
    }
}

/// Streams rendered frames as H264 over RTP/UDP.
pub struct RtpSink {
    pipeline: gstreamer::Pipeline,
    size: Size,
    frame_duration: ClockTime,
    frames: u64,
    queue: FrameQueue<Buffer>,
}

pub fn create_caps(width: i32, height: i32, fps: u32) -> Caps {
    VideoCapsBuilder::new()
        .width(width)
        .height(height)
        .framerate(gstreamer::Fraction::new(fps as i32, 1))
        .format(VideoFormat::Bgr)
        .build()
}

fn stream_error(context: &str, e: impl std::fmt::Display) -> PlateError {
    PlateError::Stream(format!("{context}: {e}"))
}

impl RtpSink {
    pub fn new(config: &RtpConfig) -> Result<Self> {
        gstreamer::init().map_err(|e| stream_error("gstreamer init", e))?;

        let fps = config.fps.max(1);
        let pipeline_str = format!(
            "appsrc name=src ! videoconvert ! x264enc tune=zerolatency bitrate=500 speed-preset=superfast ! rtph264pay ! udpsink host={} port={}",
            config.host, config.port
        );

        let pipeline = parse_launch(&pipeline_str)
            .map_err(|e| stream_error(&format!("cannot create pipeline {pipeline_str}"), e))?
            .dynamic_cast::<gstreamer::Pipeline>()
            .map_err(|_| PlateError::Stream("launch line is not a pipeline".to_string()))?;

        let app_src = pipeline
            .by_name("src")
            .and_dynamic_cast::<gstreamer_app::AppSrc>()
            .map_err(|_| PlateError::Stream("pipeline has no appsrc".to_string()))?;

        app_src.set_caps(Some(&create_caps(config.width, config.height, fps)));
        app_src.set_format(gstreamer::Format::Time);

        let (queue, buffer_r) = FrameQueue::new(QUEUE_DEPTH);
        Self::init(&app_src, buffer_r);

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| stream_error("unable to set the pipeline to Playing", e))?;
        info!(host = %config.host, port = config.port, fps, "rtp stream started");

        Ok(Self {
            pipeline,
            size: Size::new(config.width, config.height),
            frame_duration: ClockTime::from_nseconds(1_000_000_000 / fps as u64),
            frames: 0,
            queue,
        })
    }

    fn init(app_src: &gstreamer_app::AppSrc, receiver: Receiver<Buffer>) {
        // The appsrc pulls: every need-data waits for the next queued frame.
        app_src.set_callbacks(
            gstreamer_app::AppSrcCallbacks::builder()
                .need_data(move |appsrc, _| match receiver.recv() {
                    Ok(buffer) => {
                        if let Err(e) = appsrc.push_buffer(buffer) {
                            warn!(error = ?e, "cannot push buffer to appsrc");
                        }
                    }
                    Err(_) => {
                        let _ = appsrc.end_of_stream();
                    }
                })
                .build(),
        );
    }

    fn fit(&self, image: Mat) -> Result<Mat> {
        if image.cols() == self.size.width && image.rows() == self.size.height {
            return Ok(image);
        }
        let mut resized = Mat::default();
        resize(&image, &mut resized, self.size, 0.0, 0.0, INTER_LINEAR)?;
        Ok(resized)
    }
}

impl DisplaySink for RtpSink {
    fn show(&mut self, update: &DisplayUpdate) -> Result<()> {
        let image = render_overlay(update)?;
        if image.empty() {
            return Ok(());
        }
        let image = self.fit(image)?;

        let mut buffer = Buffer::from_mut_slice(image.data_bytes()?.to_vec());
        {
            let pts = self.frame_duration * self.frames;
            let buffer = buffer
                .get_mut()
                .ok_or_else(|| PlateError::Stream("gst buffer is not writable".to_string()))?;
            buffer.set_duration(self.frame_duration);
            buffer.set_pts(pts);
            buffer.set_dts(pts);
        }

        if self.queue.push(buffer)? {
            self.frames += 1;
            debug!(frame = update.frame_index, "rtp frame queued");
        } else {
            debug!(frame = update.frame_index, "rtp encoder busy, frame dropped");
        }
        Ok(())
    }
}

impl Drop for RtpSink {
    fn drop(&mut self) {
        self.queue.close();
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            warn!(error = %e, "could not stop rtp pipeline");
        }
    }
}
