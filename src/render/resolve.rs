use glam::Vec3;
use rayon::prelude::*;

/// Box-downsamples the supersampled HDR framebuffer into an 8-bit RGBA
/// image, one work item per output row. Each subpixel is clamped to [0, 1]
/// and scaled to byte range before averaging; alpha is always 0.
///
/// With `factor` 1 this is a straight clamp-and-quantize.
pub(crate) fn resolve_to_rgba(
    framebuffer: &[Vec3],
    output: &mut [u8],
    out_width: usize,
    out_height: usize,
    factor: usize,
) {
    if out_width == 0 || out_height == 0 {
        return;
    }
    debug_assert_eq!(output.len(), out_width * out_height * 4);
    debug_assert_eq!(framebuffer.len(), out_width * out_height * factor * factor);

    let ss_width = out_width * factor;
    let inv_samples = 1.0 / (factor * factor) as f32;

    output
        .par_chunks_mut(out_width * 4)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..out_width {
                let mut sum = Vec3::ZERO;
                for sy in 0..factor {
                    let base = (y * factor + sy) * ss_width + x * factor;
                    for sx in 0..factor {
                        sum += framebuffer[base + sx].clamp(Vec3::ZERO, Vec3::ONE) * 255.0;
                    }
                }
                let color = sum * inv_samples;
                let offset = x * 4;
                row[offset] = color.x.round() as u8;
                row[offset + 1] = color.y.round() as u8;
                row[offset + 2] = color.z.round() as u8;
                row[offset + 3] = 0;
            }
        });
}
