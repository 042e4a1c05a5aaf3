use opencv::core::bitwise_and;
use opencv::core::find_non_zero;
use opencv::core::Point;
use opencv::core::Scalar;
use opencv::core::Vector;
use opencv::core::CV_8UC1;
use opencv::imgproc::bounding_rect;
use opencv::imgproc::cvt_color;
use opencv::imgproc::fill_poly;
use opencv::imgproc::COLOR_BGR2GRAY;
use opencv::imgproc::LINE_8;
use opencv::prelude::Mat;
use opencv::prelude::MatTraitConst;
use tracing::warn;

use super::tesseract_ocr::OcrEngine;
use super::CandidateRegion;
use crate::Result;

/// Text shown on the display when no plate region was located.
pub const PLATE_NOT_FOUND: &str = "License plate not found";

/// Output of one extraction pass.
pub struct Extraction {
    /// Raw OCR output, empty when nothing was read
    pub text: String,
    /// Frame with everything outside the plate polygon blacked out
    pub annotated: Mat,
    /// Color crop of the plate bounding box
    pub plate_crop: Option<Mat>,
}

impl Extraction {
    /// An extraction that read nothing and shows the frame as is.
    pub fn unreadable(frame: Mat) -> Self {
        Self {
            text: String::new(),
            annotated: frame,
            plate_crop: None,
        }
    }
}

pub struct TextExtractor {
    ocr: Box<dyn OcrEngine>,
}

impl TextExtractor {
    pub fn new(ocr: Box<dyn OcrEngine>) -> Self {
        Self { ocr }
    }

    pub fn extract(&mut self, frame: &Mat, region: Option<&CandidateRegion>) -> Result<Extraction> {
        let Some(region) = region else {
            return Ok(Extraction::unreadable(frame.try_clone()?));
        };

        let mask = plate_mask(frame, region)?;
        let mut annotated = Mat::default();
        bitwise_and(frame, frame, &mut annotated, &mask)?;

        let mut plate_pixels = Vector::<Point>::new();
        find_non_zero(&mask, &mut plate_pixels)?;
        if plate_pixels.is_empty() {
            return Ok(Extraction {
                text: String::new(),
                annotated,
                plate_crop: None,
            });
        }
        let bounds = bounding_rect(&plate_pixels)?;

        let mut grey = Mat::default();
        cvt_color(frame, &mut grey, COLOR_BGR2GRAY, 0)?;
        let grey_crop = grey.apply_1(bounds)?.try_clone()?;
        let color_crop = frame.apply_1(bounds)?.try_clone()?;

        let text = match self.ocr.recognize(&grey_crop) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "ocr failed, treating plate as unreadable");
                String::new()
            }
        };

        Ok(Extraction {
            text,
            annotated,
            plate_crop: Some(color_crop),
        })
    }
}

/// Filled polygon mask, 255 inside the plate and 0 elsewhere.
fn plate_mask(frame: &Mat, region: &CandidateRegion) -> Result<Mat> {
    let mut mask =
        Mat::new_rows_cols_with_default(frame.rows(), frame.cols(), CV_8UC1, Scalar::all(0.0))?;
    let polygon = Vector::<Vector<Point>>::from_iter([Vector::<Point>::from_iter(
        region.polygon().iter().copied(),
    )]);
    fill_poly(
        &mut mask,
        &polygon,
        Scalar::all(255.0),
        LINE_8,
        0,
        Point::new(0, 0),
    )?;
    Ok(mask)
}
