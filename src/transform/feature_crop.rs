//! Feature-aware crop placement
//!
//! Scores every candidate crop window by the edge energy it contains and
//! returns the best one. Large images are scored on a downscaled grayscale
//! copy, and window sums come from a summed-area table so the search is
//! linear in the number of candidate positions. Ties go to the window closest
//! to the center, so featureless images crop exactly like a center crop.

use image::{imageops, DynamicImage, GrayImage};

/// Longest side of the grayscale copy used for scoring
const ANALYSIS_SIZE: u32 = 256;

/// Top-left corner of the `crop_w` x `crop_h` window with the most detail
pub fn crop_origin(img: &DynamicImage, crop_w: u32, crop_h: u32) -> (u32, u32) {
    let (width, height) = (img.width(), img.height());
    if crop_w >= width && crop_h >= height {
        return (0, 0);
    }

    let factor = ((width.max(height) + ANALYSIS_SIZE - 1) / ANALYSIS_SIZE).max(1);
    let gray = img.to_luma8();
    let gray = if factor > 1 {
        imageops::resize(
            &gray,
            (width / factor).max(1),
            (height / factor).max(1),
            imageops::FilterType::Triangle,
        )
    } else {
        gray
    };

    let (sw, sh) = gray.dimensions();
    let win_w = (crop_w / factor).clamp(1, sw);
    let win_h = (crop_h / factor).clamp(1, sh);
    let table = SummedArea::new(&edge_energy(&gray), sw, sh);

    let center_x = i64::from(sw - win_w) / 2;
    let center_y = i64::from(sh - win_h) / 2;
    let mut best = (0u64, i64::MAX, 0u32, 0u32);

    for y in 0..=(sh - win_h) {
        for x in 0..=(sw - win_w) {
            let score = table.sum(x, y, win_w, win_h);
            let dx = i64::from(x) - center_x;
            let dy = i64::from(y) - center_y;
            let distance = dx * dx + dy * dy;
            if score > best.0 || (score == best.0 && distance < best.1) {
                best = (score, distance, x, y);
            }
        }
    }

    let x = (best.2 * factor).min(width.saturating_sub(crop_w));
    let y = (best.3 * factor).min(height.saturating_sub(crop_h));
    (x, y)
}

/// Per-pixel gradient magnitude (|gx| + |gy|) with clamped borders
fn edge_energy(gray: &GrayImage) -> Vec<u32> {
    let (w, h) = gray.dimensions();
    let at = |x: u32, y: u32| i32::from(gray.get_pixel(x, y)[0]);

    let mut energy = Vec::with_capacity((w * h) as usize);
    for y in 0..h {
        for x in 0..w {
            let gx = at((x + 1).min(w - 1), y) - at(x.saturating_sub(1), y);
            let gy = at(x, (y + 1).min(h - 1)) - at(x, y.saturating_sub(1));
            energy.push(gx.unsigned_abs() + gy.unsigned_abs());
        }
    }
    energy
}

struct SummedArea {
    stride: usize,
    values: Vec<u64>,
}

impl SummedArea {
    fn new(energy: &[u32], w: u32, h: u32) -> Self {
        let stride = w as usize + 1;
        let mut values = vec![0u64; stride * (h as usize + 1)];
        for y in 0..h as usize {
            let mut row = 0u64;
            for x in 0..w as usize {
                row += u64::from(energy[y * w as usize + x]);
                values[(y + 1) * stride + x + 1] = values[y * stride + x + 1] + row;
            }
        }
        Self { stride, values }
    }

    fn sum(&self, x: u32, y: u32, w: u32, h: u32) -> u64 {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + w as usize, y0 + h as usize);
        let at = |x: usize, y: usize| self.values[y * self.stride + x];
        at(x1, y1) + at(x0, y0) - at(x0, y1) - at(x1, y0)
    }
}
