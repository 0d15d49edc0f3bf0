use glam::{Vec2, Vec3};
use rayon::prelude::*;

use super::pipeline::Texture;
use super::{DebugVis, Fragment, RenderConfig};

/// Fixed eye-space point light shared by every fragment.
const LIGHT_POS: Vec3 = Vec3::new(0.5, 0.2, 0.7);
const AMBIENT: f32 = 0.1;

/// Shades every pixel of the supersampled framebuffer from its fragment.
/// Exactly one work item writes each pixel.
pub(crate) fn shade_fragments(
    framebuffer: &mut [Vec3],
    fragments: &[Fragment],
    textures: &[Texture],
    config: &RenderConfig,
) {
    framebuffer
        .par_iter_mut()
        .zip(fragments.par_iter())
        .for_each(|(pixel, fragment)| {
            *pixel = shade_one(fragment, textures, config);
        });
}

fn shade_one(fragment: &Fragment, textures: &[Texture], config: &RenderConfig) -> Vec3 {
    match config.debug {
        DebugVis::Depth => return Vec3::splat((1.0 - fragment.depth).abs()),
        DebugVis::Normals => return fragment.eye_nor,
        DebugVis::Off => {}
    }

    let base = base_color(fragment, textures, config);
    let light_dir = (LIGHT_POS - fragment.eye_pos).normalize_or_zero();
    let lambert = light_dir.dot(fragment.eye_nor).max(0.0) + AMBIENT;
    base * lambert
}

fn base_color(fragment: &Fragment, textures: &[Texture], config: &RenderConfig) -> Vec3 {
    if !config.texturing {
        return fragment.col;
    }
    let Some(tex) = fragment.tex else {
        return Vec3::ZERO;
    };
    let texture = &textures[tex as usize];
    if config.bilinear {
        sample_bilinear(texture, fragment.tex_uv)
    } else {
        sample_nearest(texture, fragment.tex_start)
    }
}

/// Reads one texel whose byte offset the rasterizer already clamped into
/// bounds.
pub(crate) fn sample_nearest(texture: &Texture, start: usize) -> Vec3 {
    Vec3::new(
        texture.pixels[start] as f32,
        texture.pixels[start + 1] as f32,
        texture.pixels[start + 2] as f32,
    ) / 255.0
}

/// Blends the four texels around `uv_pixel`, sampling at texel centers.
/// Coordinates clamp to the texture edges, so samples at or past the
/// border stay in bounds.
pub(crate) fn sample_bilinear(texture: &Texture, uv_pixel: Vec2) -> Vec3 {
    let u = uv_pixel.x - 0.5;
    let v = uv_pixel.y - 0.5;
    let fu = u - u.floor();
    let fv = v - v.floor();
    let x0 = u.floor() as i64;
    let y0 = v.floor() as i64;

    let c00 = texel(texture, x0, y0);
    let c10 = texel(texture, x0 + 1, y0);
    let c01 = texel(texture, x0, y0 + 1);
    let c11 = texel(texture, x0 + 1, y0 + 1);

    let top = c00 * (1.0 - fu) + c10 * fu;
    let bottom = c01 * (1.0 - fu) + c11 * fu;
    top * (1.0 - fv) + bottom * fv
}

fn texel(texture: &Texture, x: i64, y: i64) -> Vec3 {
    let x = x.clamp(0, texture.width as i64 - 1) as usize;
    let y = y.clamp(0, texture.height as i64 - 1) as usize;
    let start = (y * texture.width as usize + x) * 3;
    Vec3::new(
        texture.pixels[start] as f32,
        texture.pixels[start + 1] as f32,
        texture.pixels[start + 2] as f32,
    ) / 255.0
}
