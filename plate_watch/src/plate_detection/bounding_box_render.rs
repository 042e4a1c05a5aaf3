use opencv::core::Point;
use opencv::core::Rect;
use opencv::core::Scalar;
use opencv::core::Vector;
use opencv::imgproc::polylines;
use opencv::imgproc::put_text;
use opencv::imgproc::FONT_HERSHEY_PLAIN;
use opencv::imgproc::LINE_8;
use opencv::imgproc::rectangle;
use opencv::imgproc::LineTypes;
use opencv::prelude::Mat;
use opencv::prelude::MatTraitConst;

use crate::display::DisplayUpdate;
use crate::Result;

const HEADER_HEIGHT: i32 = 28;

/// Draws the plate outline and a text banner over a copy of the frame.
pub fn render_overlay(update: &DisplayUpdate) -> Result<Mat> {
    let mut image = update.annotated.try_clone()?;
    if image.empty() {
        return Ok(image);
    }

    let color = Scalar::from((255.0, 0.0, 0.0));
    let color_outline = Scalar::from((0.0, 255.0, 0.0));
    let thickness = 2;

    if let Some(region) = &update.region {
        let outline = Vector::<Vector<Point>>::from_iter([Vector::<Point>::from_iter(
            region.polygon().iter().copied(),
        )]);
        polylines(
            &mut image,
            &outline,
            true,
            color_outline,
            thickness,
            LineTypes::LINE_4 as i32,
            0,
        )?;
    }

    let header = Rect::new(0, 0, image.cols(), HEADER_HEIGHT.min(image.rows()));
    rectangle(
        &mut image,
        header,
        color,
        -1,
        LineTypes::LINE_4 as i32,
        0,
    )?;
    put_text(
        &mut image,
        &update.text,
        Point::new(6, HEADER_HEIGHT - 8),
        FONT_HERSHEY_PLAIN,
        1.5,
        Scalar::from((255.0, 255.0, 255.0)),
        2,
        LINE_8,
        false,
    )?;

    Ok(image)
}
