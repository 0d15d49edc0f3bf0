use glam::{Mat4, Quat, Vec2, Vec3};
use rand::Rng;
use std::f32::consts::TAU;

use crate::math::hsv_to_rgb;
use crate::scene::{GroupDescription, PrimitiveKind, SceneDescription, TextureDescription};

// --- Demo scene generators ---

fn checker_texture(size: u32, cell: u32, a: [u8; 3], b: [u8; 3]) -> TextureDescription {
    let mut pixels = Vec::with_capacity((size * size * 3) as usize);
    for y in 0..size {
        for x in 0..size {
            let color = if ((x / cell) + (y / cell)) % 2 == 0 { a } else { b };
            pixels.extend_from_slice(&color);
        }
    }
    TextureDescription {
        pixels,
        width: size,
        height: size,
    }
}

fn solid_texture(color: [u8; 3]) -> TextureDescription {
    TextureDescription {
        pixels: color.to_vec(),
        width: 1,
        height: 1,
    }
}

/// Ground quad under the rest of the scene. Texcoords stay in [0, 1]
/// because sampling clamps rather than wraps; the checker texture itself
/// carries the tiling.
fn checker_floor() -> GroupDescription {
    let half = 7.0;
    let y = -1.4;
    GroupDescription {
        kind: PrimitiveKind::Triangles,
        indices: vec![0, 1, 2, 0, 2, 3],
        positions: vec![
            Vec3::new(-half, y, -half),
            Vec3::new(half, y, -half),
            Vec3::new(half, y, half),
            Vec3::new(-half, y, half),
        ],
        normals: Some(vec![Vec3::Y; 4]),
        texcoords: Some(vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ]),
        texture: Some(checker_texture(256, 16, [235, 235, 235], [40, 44, 52])),
        model: Mat4::IDENTITY,
    }
}

fn knot_point(t: f32, p: f32, q: f32, major: f32, minor: f32) -> Vec3 {
    // Laid in the XZ plane so the default camera sees the full loop.
    Vec3::new(
        (major + minor * (q * t).cos()) * (p * t).cos(),
        minor * (q * t).sin(),
        (major + minor * (q * t).cos()) * (p * t).sin(),
    )
}

/// Tube swept along a (2, 3) torus knot: `rings` samples of the center
/// curve, `sides` vertices around each ring, quads split into triangles
/// with wraparound indexing.
fn knotted_tube(rings: usize, sides: usize) -> GroupDescription {
    let p = 2.0;
    let q = 3.0;
    let major = 1.5;
    let minor = 0.45;
    let tube_radius = 0.22;

    let mut positions = Vec::with_capacity(rings * sides);
    let mut normals = Vec::with_capacity(rings * sides);
    let mut texcoords = Vec::with_capacity(rings * sides);

    for ring in 0..rings {
        let t = ring as f32 / rings as f32 * TAU;
        let center = knot_point(t, p, q, major, minor);

        // Frame from a numeric tangent; the reference vector only needs to
        // stay non-parallel to it.
        let dt = 1e-3;
        let tangent = (knot_point(t + dt, p, q, major, minor)
            - knot_point(t - dt, p, q, major, minor))
        .normalize();
        let side = tangent.cross(Vec3::Y).normalize();
        let up = side.cross(tangent).normalize();

        for s in 0..sides {
            let phi = s as f32 / sides as f32 * TAU;
            let radial = side * phi.cos() + up * phi.sin();
            positions.push(center + radial * tube_radius);
            normals.push(radial);
            texcoords.push(Vec2::new(
                ring as f32 / rings as f32,
                s as f32 / sides as f32,
            ));
        }
    }

    let mut indices = Vec::with_capacity(rings * sides * 6);
    for ring in 0..rings {
        let next_ring = (ring + 1) % rings;
        for s in 0..sides {
            let next_s = (s + 1) % sides;
            let a = (ring * sides + s) as u16;
            let b = (next_ring * sides + s) as u16;
            let c = (next_ring * sides + next_s) as u16;
            let d = (ring * sides + next_s) as u16;
            indices.extend_from_slice(&[a, b, c, a, c, d]);
        }
    }

    GroupDescription {
        kind: PrimitiveKind::Triangles,
        indices,
        positions,
        normals: Some(normals),
        texcoords: Some(texcoords),
        texture: Some(checker_texture(128, 8, [255, 150, 60], [120, 40, 150])),
        model: Mat4::IDENTITY,
    }
}

/// Flat-shaded unit tetrahedron: four faces with their own vertices so
/// each face keeps a constant normal.
fn tetrahedron() -> (Vec<Vec3>, Vec<Vec3>, Vec<u16>) {
    let corners = [
        Vec3::new(1.0, 1.0, 1.0),
        Vec3::new(1.0, -1.0, -1.0),
        Vec3::new(-1.0, 1.0, -1.0),
        Vec3::new(-1.0, -1.0, 1.0),
    ];
    let faces = [[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]];

    let mut positions = Vec::with_capacity(12);
    let mut normals = Vec::with_capacity(12);
    let mut indices = Vec::with_capacity(12);

    for face in faces {
        let [a, b, c] = face.map(|i| corners[i]);
        let normal = (b - a).cross(c - a).normalize();
        for corner in [a, b, c] {
            indices.push(positions.len() as u16);
            positions.push(corner);
            normals.push(normal);
        }
    }

    (positions, normals, indices)
}

fn scattered_tetrahedra(count: usize) -> Vec<GroupDescription> {
    let mut rng = rand::rng();
    let (positions, normals, indices) = tetrahedron();

    (0..count)
        .map(|_| {
            let angle = rng.random_range(0.0_f32..TAU);
            let radius = rng.random_range(2.6_f32..5.5_f32);
            let translation = Vec3::new(
                radius * angle.cos(),
                rng.random_range(-0.9_f32..1.6_f32),
                radius * angle.sin(),
            );
            let rotation = Quat::from_axis_angle(
                Vec3::new(
                    rng.random_range(-1.0_f32..1.0_f32),
                    rng.random_range(-1.0_f32..1.0_f32),
                    rng.random_range(-1.0_f32..1.0_f32),
                )
                .normalize_or_zero(),
                rng.random_range(0.0_f32..TAU),
            );
            let scale = Vec3::splat(rng.random_range(0.16_f32..0.34_f32));

            let hue = rng.random_range(0.0_f32..360.0_f32);
            GroupDescription {
                kind: PrimitiveKind::Triangles,
                indices: indices.clone(),
                positions: positions.clone(),
                normals: Some(normals.clone()),
                texcoords: None,
                texture: Some(solid_texture(hsv_to_rgb(hue, 0.75, 0.95))),
                model: Mat4::from_scale_rotation_translation(scale, rotation, translation),
            }
        })
        .collect()
}

pub fn generate_demo_scene() -> SceneDescription {
    let mut groups = vec![checker_floor(), knotted_tube(220, 14)];
    groups.extend(scattered_tetrahedra(28));
    SceneDescription { groups }
}
