use opencv::core::Point;
use opencv::core::Size;
use opencv::core::Vector;
use opencv::core::BORDER_DEFAULT;
use opencv::imgproc::approx_poly_dp;
use opencv::imgproc::canny;
use opencv::imgproc::contour_area;
use opencv::imgproc::cvt_color;
use opencv::imgproc::find_contours;
use opencv::imgproc::gaussian_blur;
use opencv::imgproc::resize;
use opencv::imgproc::CHAIN_APPROX_SIMPLE;
use opencv::imgproc::COLOR_BGR2GRAY;
use opencv::imgproc::INTER_AREA;
use opencv::imgproc::RETR_TREE;
use opencv::prelude::Mat;
use opencv::prelude::MatTraitConst;
use tracing::debug;
use tracing::trace;

use super::CandidateRegion;
use crate::config::LocalizerConfig;
use crate::Result;

/// Finds the region of a frame most likely to hold a plate.
pub trait PlateLocalizer {
    fn localize(&mut self, frame: &Mat) -> Result<Option<CandidateRegion>>;
}

/// Takes the largest edge contours and accepts the first one that
/// simplifies to a quadrilateral.
pub struct ContourLocalizer {
    config: LocalizerConfig,
}

impl ContourLocalizer {
    pub fn new(config: LocalizerConfig) -> Self {
        Self { config }
    }

    /// Returns the resized frame and the working/original scale factor.
    fn working_copy(&self, frame: &Mat) -> Result<(Mat, f64)> {
        let scale = self.config.working_width as f64 / frame.cols() as f64;
        let height = ((frame.rows() as f64 * scale).round() as i32).max(1);

        let mut resized = Mat::default();
        resize(
            frame,
            &mut resized,
            Size::new(self.config.working_width, height),
            0.0,
            0.0,
            INTER_AREA,
        )?;
        Ok((resized, scale))
    }

    fn edges(&self, image: &Mat) -> Result<Mat> {
        let mut grey = Mat::default();
        cvt_color(image, &mut grey, COLOR_BGR2GRAY, 0)?;

        let kernel = self.config.blur_kernel;
        let mut blurred = Mat::default();
        gaussian_blur(
            &grey,
            &mut blurred,
            Size::new(kernel, kernel),
            0.0,
            0.0,
            BORDER_DEFAULT,
        )?;

        let mut edged = Mat::default();
        canny(
            &blurred,
            &mut edged,
            self.config.canny_low,
            self.config.canny_high,
            3,
            false,
        )?;
        Ok(edged)
    }

    /// Top-k contours by enclosed area, largest first. Ties keep discovery order.
    fn largest_contours(&self, edged: &Mat) -> Result<Vec<Vector<Point>>> {
        let mut contours = Vector::<Vector<Point>>::new();
        find_contours(
            edged,
            &mut contours,
            RETR_TREE,
            CHAIN_APPROX_SIMPLE,
            Point::new(0, 0),
        )?;

        let mut by_area = Vec::with_capacity(contours.len());
        for contour in contours {
            let area = contour_area(&contour, false)?;
            by_area.push((area, contour));
        }
        by_area.sort_by(|a, b| b.0.total_cmp(&a.0));
        by_area.truncate(self.config.top_k);

        Ok(by_area.into_iter().map(|(_, contour)| contour).collect())
    }
}

impl PlateLocalizer for ContourLocalizer {
    fn localize(&mut self, frame: &Mat) -> Result<Option<CandidateRegion>> {
        if frame.empty() || frame.cols() == 0 {
            return Ok(None);
        }

        let (working, scale) = self.working_copy(frame)?;
        let edged = self.edges(&working)?;
        let candidates = self.largest_contours(&edged)?;

        for (rank, contour) in candidates.iter().enumerate() {
            let mut approx = Vector::<Point>::new();
            approx_poly_dp(contour, &mut approx, self.config.approx_epsilon, true)?;
            trace!(rank, vertices = approx.len(), "contour approximated");

            if approx.len() != 4 {
                continue;
            }

            let max_x = frame.cols() - 1;
            let max_y = frame.rows() - 1;
            let to_frame = |p: Point| {
                Point::new(
                    ((p.x as f64 / scale).round() as i32).clamp(0, max_x),
                    ((p.y as f64 / scale).round() as i32).clamp(0, max_y),
                )
            };
            let region = CandidateRegion::new([
                to_frame(approx.get(0)?),
                to_frame(approx.get(1)?),
                to_frame(approx.get(2)?),
                to_frame(approx.get(3)?),
            ]);
            debug!(rank, bbox = ?region.bounding_box(), "plate candidate found");
            return Ok(Some(region));
        }

        debug!(inspected = candidates.len(), "no quadrilateral contour");
        Ok(None)
    }
}
