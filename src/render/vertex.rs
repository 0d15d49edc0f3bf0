use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use rayon::prelude::*;

use super::pipeline::DeviceGroup;
use super::VertexOut;

/// Debug tint cycle: half-magnitude R, G, B by vertex index mod 3.
const TINT: [Vec3; 3] = [
    Vec3::new(0.5, 0.0, 0.0),
    Vec3::new(0.0, 0.5, 0.0),
    Vec3::new(0.0, 0.0, 0.5),
];

/// Transforms every vertex of `group` into its `vertex_out` scratch array.
///
/// Window mapping: x in [0, width] and y in [0, height] for vertices inside
/// the frustum, y flipped so row 0 is the top. z is the negated NDC depth
/// and w keeps the pre-divide clip w. Out-of-frustum vertices land outside
/// the viewport and are excluded later by bounding-box clipping.
pub(crate) fn transform_group(
    group: &mut DeviceGroup,
    mvp: Mat4,
    mv: Mat4,
    mv_normal: Mat3,
    width: usize,
    height: usize,
) {
    let half_w = width as f32 * 0.5;
    let half_h = height as f32 * 0.5;

    let positions = &group.positions;
    let normals = group.normals.as_deref();
    let texcoords = group.texcoords.as_deref();
    let tex = group.texture;
    let tex_width = group.tex_width;
    let tex_height = group.tex_height;

    group
        .vertex_out
        .par_iter_mut()
        .enumerate()
        .for_each(|(vid, out)| {
            let position = positions[vid].extend(1.0);
            let eye_pos = (mv * position).truncate();

            let clip = mvp * position;
            let ndc = clip / clip.w;
            let pos = Vec4::new(
                half_w * (ndc.x + 1.0),
                half_h * (1.0 - ndc.y),
                -ndc.z,
                clip.w,
            );

            let eye_nor = match normals {
                Some(normals) => (mv_normal * normals[vid]).normalize_or_zero(),
                None => (mv_normal * Vec3::ONE).normalize_or_zero(),
            };

            let texcoord = match texcoords {
                Some(texcoords) => texcoords[vid],
                None => Vec2::ZERO,
            };

            *out = VertexOut {
                pos,
                eye_pos,
                eye_nor,
                col: TINT[vid % 3],
                texcoord,
                tex,
                tex_width,
                tex_height,
            };
        });
}
