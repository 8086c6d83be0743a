//! Block-averaging pixelation
//!
//! The image is cut into square blocks whose side is a percentage of the
//! image width. Every pixel of a block takes the per-channel integer mean of
//! the source pixels the block covers; blocks on the right and bottom edges
//! are clipped to the image bounds. Bands of block rows are averaged in
//! parallel with rayon.

use image::RgbaImage;
use rayon::prelude::*;

/// Side of a pixelation block in pixels, `floor(width * pixelation / 100)`
pub fn block_size(width: u32, pixelation: u8) -> u32 {
    (u64::from(width) * u64::from(pixelation) / 100) as u32
}

/// Pixelate `src` into a fresh image.
///
/// A block size of zero leaves the image unchanged.
pub fn pixelate(src: &RgbaImage, pixelation: u8) -> RgbaImage {
    let (width, height) = src.dimensions();
    let block = block_size(width, pixelation);
    if block == 0 || height == 0 {
        return src.clone();
    }

    let row_stride = width as usize * 4;
    let band_len = row_stride * block as usize;
    let source = src.as_raw();

    let mut out = RgbaImage::new(width, height);
    out.par_chunks_mut(band_len)
        .enumerate()
        .for_each(|(band_index, band)| {
            let y0 = band_index as u32 * block;
            let rows = (band.len() / row_stride) as u32;

            let mut x0 = 0;
            while x0 < width {
                let cols = block.min(width - x0);
                let mean = block_mean(source, row_stride, x0, y0, cols, rows);

                for dy in 0..rows as usize {
                    let start = dy * row_stride + x0 as usize * 4;
                    let end = start + cols as usize * 4;
                    for pixel in band[start..end].chunks_exact_mut(4) {
                        pixel.copy_from_slice(&mean);
                    }
                }
                x0 += block;
            }
        });

    out
}

fn block_mean(source: &[u8], row_stride: usize, x0: u32, y0: u32, cols: u32, rows: u32) -> [u8; 4] {
    let mut sums = [0u64; 4];
    for y in y0..y0 + rows {
        let start = y as usize * row_stride + x0 as usize * 4;
        let end = start + cols as usize * 4;
        for pixel in source[start..end].chunks_exact(4) {
            for (sum, channel) in sums.iter_mut().zip(pixel) {
                *sum += u64::from(*channel);
            }
        }
    }

    let count = u64::from(cols) * u64::from(rows);
    let mut mean = [0u8; 4];
    for (m, sum) in mean.iter_mut().zip(sums) {
        *m = (sum / count) as u8;
    }
    mean
}
