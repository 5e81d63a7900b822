/// Draw the last-interaction marker on a screenshot.
///
/// The marker is a green crosshair with a ring around it, so the model can
/// check whether its previous click landed on the intended element.
use crate::errors::{DeskBenchError, DeskBenchResult};
use crate::perception::types::ScreenPoint;

const MARKER_COLOUR: [u8; 4] = [0, 200, 0, 255];
const CROSS_HALF: i32 = 10;
const LINE_WIDTH: i32 = 3;
const RING_RADIUS: i32 = CROSS_HALF * 2;

/// Decode `src_bytes`, draw the marker at `point` and return PNG bytes.
pub fn mark_png(src_bytes: &[u8], point: ScreenPoint) -> DeskBenchResult<Vec<u8>> {
    let img = image::load_from_memory(src_bytes)
        .map_err(|e| DeskBenchError::CaptureFailure(format!("marker load: {e}")))?;
    let mut canvas = img.to_rgba8();
    draw_marker(&mut canvas, point);
    encode_png(canvas)
}

pub fn draw_marker(canvas: &mut image::RgbaImage, point: ScreenPoint) {
    let ScreenPoint { x, y } = point;
    let half_w = LINE_WIDTH / 2;

    // Crosshair
    for d in -CROSS_HALF..=CROSS_HALF {
        for t in -half_w..=half_w {
            put(canvas, x + d, y + t);
            put(canvas, x + t, y + d);
        }
    }

    // Ring
    let outer = RING_RADIUS + half_w;
    let inner = RING_RADIUS - half_w;
    let (outer_sq, inner_sq) = (outer * outer, inner * inner);
    for dy in -outer..=outer {
        for dx in -outer..=outer {
            let dist_sq = dx * dx + dy * dy;
            if dist_sq <= outer_sq && dist_sq >= inner_sq {
                put(canvas, x + dx, y + dy);
            }
        }
    }
}

pub fn encode_png(canvas: image::RgbaImage) -> DeskBenchResult<Vec<u8>> {
    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(canvas)
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .map_err(|e| DeskBenchError::CaptureFailure(format!("PNG encode: {e}")))?;
    Ok(out)
}

fn put(canvas: &mut image::RgbaImage, x: i32, y: i32) {
    let (Ok(x), Ok(y)) = (u32::try_from(x), u32::try_from(y)) else {
        return;
    };
    if let Some(px) = canvas.get_pixel_mut_checked(x, y) {
        blend(px, MARKER_COLOUR);
    }
}

/// Source-over blend of `colour` onto an opaque pixel.
fn blend(px: &mut image::Rgba<u8>, colour: [u8; 4]) {
    let alpha = f32::from(colour[3]) / 255.0;
    for (dst, src) in px.0.iter_mut().zip(colour).take(3) {
        *dst = (f32::from(*dst) + (f32::from(src) - f32::from(*dst)) * alpha).round() as u8;
    }
    px.0[3] = u8::MAX;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(w: u32, h: u32) -> image::RgbaImage {
        image::RgbaImage::from_pixel(w, h, image::Rgba([10, 10, 10, 255]))
    }

    #[test]
    fn marker_paints_centre_and_ring() {
        let mut canvas = blank(100, 100);
        draw_marker(&mut canvas, ScreenPoint::new(50, 50));
        assert_eq!(canvas.get_pixel(50, 50).0, MARKER_COLOUR);
        assert_eq!(canvas.get_pixel(60, 50).0, MARKER_COLOUR);
        assert_eq!(canvas.get_pixel(50, 30).0, MARKER_COLOUR);
        assert_eq!(canvas.get_pixel(70, 50).0, MARKER_COLOUR);
        // Between the cross arm end and the ring.
        assert_eq!(canvas.get_pixel(65, 65).0, [10, 10, 10, 255]);
    }

    #[test]
    fn marker_near_edge_is_clipped() {
        let mut canvas = blank(16, 16);
        draw_marker(&mut canvas, ScreenPoint::new(0, 0));
        assert_eq!(canvas.get_pixel(0, 0).0, MARKER_COLOUR);
    }

    #[test]
    fn mark_png_keeps_dimensions() {
        let src = encode_png(blank(64, 48)).expect("encode");
        let marked = mark_png(&src, ScreenPoint::new(32, 24)).expect("mark");
        let decoded = image::load_from_memory(&marked).expect("decode").to_rgba8();
        assert_eq!(decoded.dimensions(), (64, 48));
        assert_eq!(decoded.get_pixel(32, 24).0, MARKER_COLOUR);
    }

    #[test]
    fn mark_png_rejects_garbage() {
        let err = mark_png(b"not an image", ScreenPoint::new(1, 1)).expect_err("garbage");
        assert!(matches!(err, DeskBenchError::CaptureFailure(_)));
    }
}
