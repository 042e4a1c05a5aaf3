pub mod bounding_box_render;
pub mod color_classifier;
pub mod contour_localizer;
pub mod normalize;
pub mod rtp_sink;
pub mod tesseract_ocr;
pub mod text_extractor;
pub mod video_reader;

use opencv::core::Point;
use opencv::core::Rect;
use opencv::prelude::Mat;
use opencv::prelude::MatTraitConst;

/// One BGR frame pulled from a frame source.
pub struct Frame {
    pub index: u64,
    pub image: Mat,
}

impl Frame {
    pub fn new(index: u64, image: Mat) -> Self {
        Self { index, image }
    }

    pub fn width(&self) -> i32 {
        self.image.cols()
    }

    pub fn height(&self) -> i32 {
        self.image.rows()
    }
}

/// Quadrilateral believed to bound a plate, in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateRegion {
    polygon: [Point; 4],
    bounding_box: Rect,
}

impl CandidateRegion {
    pub fn new(polygon: [Point; 4]) -> Self {
        let min_x = polygon.iter().map(|p| p.x).min().unwrap_or(0);
        let min_y = polygon.iter().map(|p| p.y).min().unwrap_or(0);
        let max_x = polygon.iter().map(|p| p.x).max().unwrap_or(0);
        let max_y = polygon.iter().map(|p| p.y).max().unwrap_or(0);

        Self {
            polygon,
            bounding_box: Rect::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1),
        }
    }

    pub fn polygon(&self) -> &[Point; 4] {
        &self.polygon
    }

    /// Inclusive bounding box of the four vertices.
    pub fn bounding_box(&self) -> Rect {
        self.bounding_box
    }
}
