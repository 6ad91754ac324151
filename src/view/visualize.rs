//! False-color renderings of per-pixel maps for display

use image::{Rgba, RgbaImage};

use super::image::ImageMap;

fn interpolate(val: f32, y0: f32, x0: f32, y1: f32, x1: f32) -> f32 {
    (val - x0) * (y1 - y0) / (x1 - x0) + y0
}

fn base(val: f32) -> f32 {
    if val <= -0.75 {
        0.0
    } else if val <= -0.25 {
        interpolate(val, 0.0, -0.75, 1.0, -0.25)
    } else if val <= 0.25 {
        1.0
    } else if val <= 0.75 {
        interpolate(val, 1.0, 0.25, 0.0, 0.75)
    } else {
        0.0
    }
}

/// Jet colormap for `val` in [-1, 1]: blue at -1, red at 1
pub fn jet(val: f32) -> Rgba<u8> {
    let to_u8 = |f: f32| (f.clamp(0.0, 1.0) * 255.0) as u8;
    Rgba([to_u8(base(val - 0.5)), to_u8(base(val)), to_u8(base(val + 0.5)), 255])
}

/// Color-map every valid (> 0) value between the map's own min and max.
/// `near_is_hot` puts small values at the red end.
fn colorize(map: &ImageMap<f32>, near_is_hot: bool) -> RgbaImage {
    let (lo, hi) = map
        .data()
        .iter()
        .filter(|v| **v > 0.0)
        .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = if hi > lo { hi - lo } else { 1.0 };

    let mut out = RgbaImage::new(map.width(), map.height());
    for (x, y, px) in out.enumerate_pixels_mut() {
        let v = *map.get(x, y);
        *px = if v > 0.0 {
            let t = (v - lo) / span;
            let t = if near_is_hot { 1.0 - t } else { t };
            jet(t * 2.0 - 1.0)
        } else {
            Rgba([0, 0, 0, 255])
        };
    }
    out
}

/// Metric depth as false color, near = red, far = blue, invalid = black
pub fn depth_to_rgba(depth: &ImageMap<f32>) -> RgbaImage {
    colorize(depth, true)
}

/// Depth uncertainty as false color, low = blue, high = red
pub fn uncertainty_to_rgba(uncertainty: &ImageMap<f32>) -> RgbaImage {
    colorize(uncertainty, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jet_endpoints() {
        assert_eq!(jet(-1.0), Rgba([0, 0, 127, 255]));
        assert_eq!(jet(0.0), Rgba([127, 255, 127, 255]));
        assert_eq!(jet(1.0), Rgba([127, 0, 0, 255]));
    }

    #[test]
    fn test_depth_near_is_red_invalid_is_black() {
        let depth = ImageMap::from_vec(3, 1, vec![1.0, 0.0, 3.0]).unwrap();
        let img = depth_to_rgba(&depth);
        let near = img.get_pixel(0, 0).0;
        let far = img.get_pixel(2, 0).0;
        assert!(near[0] > near[2]);
        assert!(far[2] > far[0]);
        assert_eq!(img.get_pixel(1, 0).0, [0, 0, 0, 255]);
    }
}
