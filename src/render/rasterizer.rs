use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use glam::{Vec2, Vec4Swizzles};
use rayon::prelude::*;

use crate::scene::PrimitiveKind;

use super::{Fragment, FragmentBuffer, Primitive, RenderConfig};

// --- Depth encoding ---

/// Window depth packed as an integer key so the depth test is a plain
/// integer compare under the pixel lock. Smaller is nearer. The saturating
/// conversion keeps out-of-range depths ordered instead of overflowing.
pub(crate) fn depth_key(z: f32) -> i32 {
    (z as f64 * i32::MAX as f64).round() as i32
}

// --- Per-pixel spinlock ---

// 0 = free, 1 = held. A work item holds at most one pixel lock at a time
// and always releases before moving on, so contention cannot deadlock.

fn lock_pixel(mutex: &AtomicU32) {
    while mutex
        .compare_exchange_weak(0, 1, Ordering::Acquire, Ordering::Relaxed)
        .is_err()
    {
        std::hint::spin_loop();
    }
}

fn unlock_pixel(mutex: &AtomicU32) {
    mutex.store(0, Ordering::Release);
}

// --- Coverage ---

/// Twice the signed area of triangle (a, b, c).
fn edge_function(a: Vec2, b: Vec2, c: Vec2) -> f32 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

// --- Rasterizer ---

/// Scan-converts every primitive into the fragment buffer, resolving depth
/// per pixel under the mutex discipline: acquire the pixel's spinlock,
/// strict `<` test on the integer depth key, publish {depth, fragment},
/// release. Coverage is sampled at integer pixel corners (col, row).
pub(crate) fn rasterize_primitives(
    primitives: &[Primitive],
    depth: &[AtomicI32],
    mutex: &[AtomicU32],
    fragments: &FragmentBuffer,
    width: usize,
    height: usize,
    config: &RenderConfig,
) {
    if width == 0 || height == 0 || primitives.is_empty() {
        return;
    }

    primitives.par_iter().for_each(|primitive| {
        rasterize_one(primitive, depth, mutex, fragments, width, height, config);
    });
}

fn rasterize_one(
    primitive: &Primitive,
    depth: &[AtomicI32],
    mutex: &[AtomicU32],
    fragments: &FragmentBuffer,
    width: usize,
    height: usize,
    config: &RenderConfig,
) {
    // Upload rejects every other topology.
    debug_assert_eq!(primitive.kind, PrimitiveKind::Triangles);

    let t0 = primitive.v[0].pos;
    let t1 = primitive.v[1].pos;
    let t2 = primitive.v[2].pos;

    // A vertex with clip w = 0 divides to non-finite window coordinates.
    if !(t0.is_finite() && t1.is_finite() && t2.is_finite()) {
        return;
    }

    let p0 = t0.xy();
    let p1 = t1.xy();
    let p2 = t2.xy();

    let area = edge_function(p0, p1, p2);
    if area == 0.0 {
        return;
    }
    let inv_area = 1.0 / area;

    // Pixel bounding box clipped to the viewport; empty boxes (degenerate
    // or fully off-screen triangles) are skipped before the cast.
    let min_xf = p0.x.min(p1.x).min(p2.x).floor().max(0.0);
    let max_xf = p0.x.max(p1.x).max(p2.x).ceil().min(width as f32 - 1.0);
    let min_yf = p0.y.min(p1.y).min(p2.y).floor().max(0.0);
    let max_yf = p0.y.max(p1.y).max(p2.y).ceil().min(height as f32 - 1.0);
    if min_xf > max_xf || min_yf > max_yf {
        return;
    }
    let (min_x, max_x) = (min_xf as usize, max_xf as usize);
    let (min_y, max_y) = (min_yf as usize, max_yf as usize);

    for row in min_y..=max_y {
        for col in min_x..=max_x {
            let sample = Vec2::new(col as f32, row as f32);
            let l0 = edge_function(p1, p2, sample) * inv_area;
            let l1 = edge_function(p2, p0, sample) * inv_area;
            let l2 = edge_function(p0, p1, sample) * inv_area;
            if !(0.0..=1.0).contains(&l0)
                || !(0.0..=1.0).contains(&l1)
                || !(0.0..=1.0).contains(&l2)
            {
                continue;
            }

            let z = l0 * t0.z + l1 * t1.z + l2 * t2.z;
            let new_depth = depth_key(z);
            let index = row * width + col;

            // Interpolation is pure, so it runs outside the critical
            // section; occluded fragments waste the work but keep the
            // locked region down to the compare and two stores.
            let fragment = interpolate_fragment(primitive, l0, l1, l2, z, config);

            lock_pixel(&mutex[index]);
            if new_depth < depth[index].load(Ordering::Relaxed) {
                depth[index].store(new_depth, Ordering::Relaxed);
                // SAFETY: pixel `index`'s spinlock is held until the
                // release store below.
                unsafe { fragments.write(index, fragment) };
            }
            unlock_pixel(&mutex[index]);
        }
    }
}

// --- Attribute interpolation ---

fn interpolate_fragment(
    primitive: &Primitive,
    l0: f32,
    l1: f32,
    l2: f32,
    z: f32,
    config: &RenderConfig,
) -> Fragment {
    let [v0, v1, v2] = &primitive.v;

    // Perspective correction divides each attribute by its vertex clip w
    // and renormalizes by 1 / sum(lambda / w).
    let (k0, k1, k2) = if config.perspective_correct {
        let b0 = l0 / v0.pos.w;
        let b1 = l1 / v1.pos.w;
        let b2 = l2 / v2.pos.w;
        let sum = b0 + b1 + b2;
        let scale = if sum.abs() > f32::EPSILON { 1.0 / sum } else { 0.0 };
        (b0 * scale, b1 * scale, b2 * scale)
    } else {
        (l0, l1, l2)
    };

    let col = k0 * v0.col + k1 * v1.col + k2 * v2.col;
    let eye_pos = k0 * v0.eye_pos + k1 * v1.eye_pos + k2 * v2.eye_pos;
    let eye_nor = (k0 * v0.eye_nor + k1 * v1.eye_nor + k2 * v2.eye_nor).normalize_or_zero();
    let texcoord = k0 * v0.texcoord + k1 * v1.texcoord + k2 * v2.texcoord;

    let mut fragment = Fragment {
        eye_pos,
        eye_nor,
        col,
        depth: z,
        ..Fragment::default()
    };

    if config.texturing {
        if let Some(tex) = v0.tex {
            let tex_width = v0.tex_width;
            let tex_height = v0.tex_height;
            let uv_pixel = Vec2::new(
                texcoord.x * tex_width as f32,
                texcoord.y * tex_height as f32,
            );
            // Nearest addressing floors to a texel, clamped into bounds so
            // uv = (1, 1) stays on the last texel row/column.
            let tx = (uv_pixel.x.floor() as i64).clamp(0, tex_width as i64 - 1);
            let ty = (uv_pixel.y.floor() as i64).clamp(0, tex_height as i64 - 1);
            fragment.tex = Some(tex);
            fragment.tex_start = ((ty * tex_width as i64 + tx) * 3) as usize;
            fragment.tex_uv = uv_pixel;
        }
    }

    fragment
}
