//! Plate background color from HSV pixel counts.
//!
//! Bands use OpenCV's 8-bit HSV convention (hue 0..180). Red straddles the
//! hue origin and is the union of two sub-ranges. Red plates carry white text
//! and borders, so Red is ranked by the red-or-white pixel count rather than
//! the plain red count.

use opencv::core::bitwise_or;
use opencv::core::count_non_zero;
use opencv::core::in_range;
use opencv::core::Scalar;
use opencv::imgproc::cvt_color;
use opencv::imgproc::COLOR_BGR2HSV;
use opencv::prelude::Mat;
use opencv::prelude::MatTraitConst;
use serde::Serialize;
use std::fmt;
use tracing::debug;

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ColorLabel {
    Yellow,
    Green,
    Black,
    Blue,
    White,
    Red,
    Unknown,
}

impl ColorLabel {
    /// What the plate color says about the vehicle.
    pub fn description(&self) -> &'static str {
        match self {
            ColorLabel::Yellow => "Yellow (Taxi)",
            ColorLabel::Green => "Green (Electric Vehicle)",
            ColorLabel::Black => "Black (Rental Vehicle)",
            ColorLabel::Blue => "Blue (Diplomat Vehicle)",
            ColorLabel::White => "White (Private Vehicle)",
            ColorLabel::Red => "Red (Temporary Registration)",
            ColorLabel::Unknown => "No Color Detected",
        }
    }
}

impl fmt::Display for ColorLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Inclusive HSV range.
#[derive(Debug, Clone, Copy)]
struct HsvBand {
    lower: (f64, f64, f64),
    upper: (f64, f64, f64),
}

const fn band(lower: (f64, f64, f64), upper: (f64, f64, f64)) -> HsvBand {
    HsvBand { lower, upper }
}

const YELLOW: HsvBand = band((20.0, 100.0, 100.0), (30.0, 255.0, 255.0));
const GREEN: HsvBand = band((40.0, 100.0, 100.0), (80.0, 255.0, 255.0));
const BLACK: HsvBand = band((0.0, 0.0, 0.0), (180.0, 255.0, 30.0));
const BLUE: HsvBand = band((90.0, 50.0, 50.0), (140.0, 255.0, 255.0));
const WHITE: HsvBand = band((0.0, 0.0, 180.0), (180.0, 20.0, 255.0));
const RED_LOW: HsvBand = band((0.0, 100.0, 100.0), (10.0, 255.0, 255.0));
const RED_HIGH: HsvBand = band((160.0, 100.0, 100.0), (180.0, 255.0, 255.0));

/// Pixel count per band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BandCounts {
    pub yellow: i32,
    pub green: i32,
    pub black: i32,
    pub blue: i32,
    pub white: i32,
    /// Plain red pixels
    pub red: i32,
    /// Pixels that are red or white
    pub red_with_white: i32,
}

impl BandCounts {
    /// Scores in ranking order; Red is scored by the composite count.
    pub fn ranking(&self) -> [(ColorLabel, i32); 6] {
        [
            (ColorLabel::Yellow, self.yellow),
            (ColorLabel::Green, self.green),
            (ColorLabel::Black, self.black),
            (ColorLabel::Blue, self.blue),
            (ColorLabel::White, self.white),
            (ColorLabel::Red, self.red_with_white),
        ]
    }

    /// Highest score wins, earlier labels win ties, all-zero is Unknown.
    pub fn dominant(&self) -> ColorLabel {
        let mut best = (ColorLabel::Unknown, 0);
        for (label, score) in self.ranking() {
            if score > best.1 {
                best = (label, score);
            }
        }
        best.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColorReport {
    pub label: ColorLabel,
    pub counts: BandCounts,
}

impl ColorReport {
    pub fn unknown() -> Self {
        Self {
            label: ColorLabel::Unknown,
            counts: BandCounts::default(),
        }
    }
}

fn band_mask(hsv: &Mat, band: HsvBand) -> Result<Mat> {
    let (lh, ls, lv) = band.lower;
    let (uh, us, uv) = band.upper;
    let mut mask = Mat::default();
    in_range(
        hsv,
        &Scalar::new(lh, ls, lv, 0.0),
        &Scalar::new(uh, us, uv, 0.0),
        &mut mask,
    )?;
    Ok(mask)
}

fn union(a: &Mat, b: &Mat) -> Result<Mat> {
    let mut out = Mat::default();
    bitwise_or(a, b, &mut out, &Mat::default())?;
    Ok(out)
}

/// Classifies a BGR plate crop.
pub fn classify(crop: &Mat) -> Result<ColorReport> {
    if crop.empty() {
        return Ok(ColorReport::unknown());
    }

    let mut hsv = Mat::default();
    cvt_color(crop, &mut hsv, COLOR_BGR2HSV, 0)?;

    let white = band_mask(&hsv, WHITE)?;
    let red = union(&band_mask(&hsv, RED_LOW)?, &band_mask(&hsv, RED_HIGH)?)?;
    let red_with_white = union(&red, &white)?;

    let counts = BandCounts {
        yellow: count_non_zero(&band_mask(&hsv, YELLOW)?)?,
        green: count_non_zero(&band_mask(&hsv, GREEN)?)?,
        black: count_non_zero(&band_mask(&hsv, BLACK)?)?,
        blue: count_non_zero(&band_mask(&hsv, BLUE)?)?,
        white: count_non_zero(&white)?,
        red: count_non_zero(&red)?,
        red_with_white: count_non_zero(&red_with_white)?,
    };
    let label = counts.dominant();
    debug!(?counts, %label, "plate color classified");

    Ok(ColorReport { label, counts })
}
