use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::scene::{GroupDescription, PrimitiveKind, SceneDescription, TextureDescription};

use super::pipeline::{Pipeline, Texture};
use super::rasterizer::{self, depth_key};
use super::{resolve, shading};
use super::{
    DebugVis, Fragment, FragmentBuffer, Primitive, RenderConfig, Supersampling, VertexOut,
};

fn make_pipeline(width: usize, height: usize) -> Pipeline {
    Pipeline::new(width, height, RenderConfig::default())
        .expect("pipeline allocation should succeed")
}

fn window_vertex(x: f32, y: f32, z: f32, w: f32) -> VertexOut {
    VertexOut {
        pos: Vec4::new(x, y, z, w),
        eye_nor: Vec3::Z,
        ..VertexOut::default()
    }
}

fn window_triangle(v: [VertexOut; 3]) -> Primitive {
    Primitive {
        kind: PrimitiveKind::Triangles,
        v,
    }
}

fn tinted(mut vertex: VertexOut, col: Vec3) -> VertexOut {
    vertex.col = col;
    vertex
}

struct RasterOutput {
    depth: Vec<i32>,
    mutex: Vec<u32>,
    fragments: Vec<Fragment>,
}

/// Drives the rasterizer stage directly over freshly cleared buffers.
fn run_rasterizer(
    primitives: &[Primitive],
    width: usize,
    height: usize,
    config: &RenderConfig,
) -> RasterOutput {
    let len = width * height;
    let depth: Vec<AtomicI32> = (0..len).map(|_| AtomicI32::new(i32::MAX)).collect();
    let mutex: Vec<AtomicU32> = (0..len).map(|_| AtomicU32::new(0)).collect();
    let mut fragments = FragmentBuffer::with_len(len).expect("fragment buffer should allocate");

    rasterizer::rasterize_primitives(
        primitives, &depth, &mutex, &fragments, width, height, config,
    );

    RasterOutput {
        depth: depth.iter().map(|d| d.load(Ordering::Relaxed)).collect(),
        mutex: mutex.iter().map(|m| m.load(Ordering::Relaxed)).collect(),
        fragments: fragments.as_slice().to_vec(),
    }
}

fn white_texture() -> TextureDescription {
    TextureDescription {
        pixels: vec![255, 255, 255],
        width: 1,
        height: 1,
    }
}

/// One camera-facing triangle in NDC; identity matrices make its window
/// depth the negated NDC z.
fn ndc_group(z_ndc: f32, texture: Option<TextureDescription>) -> GroupDescription {
    GroupDescription {
        kind: PrimitiveKind::Triangles,
        indices: vec![0, 1, 2],
        positions: vec![
            Vec3::new(-0.8, -0.8, z_ndc),
            Vec3::new(0.8, -0.8, z_ndc),
            Vec3::new(0.0, 0.8, z_ndc),
        ],
        normals: Some(vec![Vec3::Z; 3]),
        texcoords: Some(vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0)]),
        texture,
        model: Mat4::IDENTITY,
    }
}

// --- End-to-end frames ---

#[test]
fn empty_scene_resolves_to_black() {
    let mut pipeline = make_pipeline(4, 4);
    pipeline
        .upload_scene(&SceneDescription::default())
        .expect("empty scene should upload");

    let mut image = vec![0xAAu8; 4 * 4 * 4];
    pipeline
        .rasterize(&mut image, Mat4::IDENTITY, Mat4::IDENTITY)
        .expect("empty frame should render");

    assert_eq!(image.len(), 64);
    assert!(image.iter().all(|&byte| byte == 0));
}

#[test]
fn rasterize_twice_is_byte_identical() {
    let mut pipeline = make_pipeline(16, 16);
    let scene = SceneDescription {
        groups: vec![
            ndc_group(-0.5, Some(white_texture())),
            ndc_group(-0.2, Some(white_texture())),
        ],
    };
    pipeline.upload_scene(&scene).expect("scene should upload");

    let mut first = vec![0u8; 16 * 16 * 4];
    let mut second = vec![0u8; 16 * 16 * 4];
    pipeline
        .rasterize(&mut first, Mat4::IDENTITY, Mat4::IDENTITY)
        .expect("first frame should render");
    pipeline
        .rasterize(&mut second, Mat4::IDENTITY, Mat4::IDENTITY)
        .expect("second frame should render");

    assert!(first.iter().any(|&byte| byte != 0), "frame should be lit");
    assert_eq!(first, second);
}

#[test]
fn wrong_output_size_is_reported() {
    let mut pipeline = make_pipeline(8, 8);
    let mut image = vec![0u8; 8 * 8 * 4 - 1];
    let err = pipeline
        .rasterize(&mut image, Mat4::IDENTITY, Mat4::IDENTITY)
        .expect_err("undersized output should be rejected");
    assert!(matches!(err, super::RenderError::OutputMismatch { .. }));
}

#[test]
fn supersampled_pipeline_keeps_output_resolution() {
    let config = RenderConfig {
        supersampling: Supersampling::X2,
        ..RenderConfig::default()
    };
    let mut pipeline = Pipeline::new(4, 4, config).expect("pipeline should allocate");
    assert_eq!(pipeline.width, 8);
    assert_eq!(pipeline.height, 8);
    assert_eq!(pipeline.output_width(), 4);

    let mut image = vec![0u8; 4 * 4 * 4];
    pipeline
        .rasterize(&mut image, Mat4::IDENTITY, Mat4::IDENTITY)
        .expect("supersampled frame should render");
    assert!(image.iter().all(|&byte| byte == 0));
}

#[test]
fn resize_to_same_dimensions_is_a_no_op() {
    let mut pipeline = make_pipeline(8, 8);
    let depth_ptr = pipeline.depth.as_ptr();
    pipeline.resize(8, 8).expect("same-size resize should succeed");
    assert_eq!(depth_ptr, pipeline.depth.as_ptr());

    pipeline.resize(4, 2).expect("resize should succeed");
    assert_eq!(pipeline.output_width(), 4);
    assert_eq!(pipeline.depth.len(), 8);
    assert_eq!(pipeline.fragments.len(), 8);
}

// --- Coverage and depth resolution ---

#[test]
fn triangle_covers_exactly_the_expected_pixels() {
    let primitive = window_triangle([
        window_vertex(2.0, 2.0, 0.5, 1.0),
        window_vertex(6.0, 2.0, 0.5, 1.0),
        window_vertex(4.0, 6.0, 0.5, 1.0),
    ]);
    let out = run_rasterizer(&[primitive], 8, 8, &RenderConfig::default());

    // Coverage sampled at integer pixel corners.
    let covered: &[(usize, usize)] = &[
        (2, 2), (3, 2), (4, 2), (5, 2), (6, 2),
        (3, 3), (4, 3), (5, 3),
        (3, 4), (4, 4), (5, 4),
        (4, 5),
        (4, 6),
    ];

    let expected_key = depth_key(0.5);
    for row in 0..8 {
        for col in 0..8 {
            let index = row * 8 + col;
            if covered.contains(&(col, row)) {
                assert_eq!(out.depth[index], expected_key, "pixel ({col},{row})");
            } else {
                assert_eq!(out.depth[index], i32::MAX, "pixel ({col},{row})");
            }
        }
    }
}

#[test]
fn nearer_triangle_wins_regardless_of_submission_order() {
    let shape = |z: f32, col: Vec3| {
        window_triangle([
            tinted(window_vertex(1.0, 1.0, z, 1.0), col),
            tinted(window_vertex(7.0, 1.0, z, 1.0), col),
            tinted(window_vertex(4.0, 7.0, z, 1.0), col),
        ])
    };
    let near = shape(0.3, Vec3::X);
    let far = shape(0.7, Vec3::Z);

    for primitives in [[near, far], [far, near]] {
        let out = run_rasterizer(&primitives, 8, 8, &RenderConfig::default());
        let mut covered = 0usize;
        for (index, &key) in out.depth.iter().enumerate() {
            if key == i32::MAX {
                continue;
            }
            covered += 1;
            assert_eq!(key, depth_key(0.3), "pixel {index} should keep the near depth");
            let col = out.fragments[index].col;
            assert!(
                (col - Vec3::X).length() < 1e-5,
                "pixel {index} should keep the near tint, got {col}"
            );
        }
        assert!(covered > 0, "triangles should cover some pixels");
    }
}

#[test]
fn mutexes_are_free_after_contended_rasterization() {
    let mut primitives = Vec::new();
    for layer in 0..6 {
        let z = 0.1 + layer as f32 * 0.1;
        primitives.push(window_triangle([
            window_vertex(0.0, 0.0, z, 1.0),
            window_vertex(15.0, 0.0, z, 1.0),
            window_vertex(8.0, 15.0, z, 1.0),
        ]));
    }
    let out = run_rasterizer(&primitives, 16, 16, &RenderConfig::default());
    assert!(out.mutex.iter().all(|&m| m == 0));
}

#[test]
fn degenerate_and_offscreen_triangles_write_nothing() {
    let collinear = window_triangle([
        window_vertex(1.0, 1.0, 0.5, 1.0),
        window_vertex(3.0, 3.0, 0.5, 1.0),
        window_vertex(5.0, 5.0, 0.5, 1.0),
    ]);
    let offscreen = window_triangle([
        window_vertex(-10.0, 2.0, 0.5, 1.0),
        window_vertex(-4.0, 2.0, 0.5, 1.0),
        window_vertex(-7.0, 6.0, 0.5, 1.0),
    ]);
    // The window position a clip w of zero divides to.
    let non_finite = window_triangle([
        window_vertex(f32::INFINITY, f32::INFINITY, 0.5, 0.0),
        window_vertex(2.0, 2.0, 0.5, 1.0),
        window_vertex(4.0, 2.0, 0.5, 1.0),
    ]);

    let out = run_rasterizer(
        &[collinear, offscreen, non_finite],
        8,
        8,
        &RenderConfig::default(),
    );
    assert!(out.depth.iter().all(|&key| key == i32::MAX));
}

#[test]
fn depth_keys_preserve_ordering_and_saturate() {
    assert_eq!(depth_key(0.0), 0);
    assert_eq!(depth_key(1.0), i32::MAX);
    assert_eq!(depth_key(2.0), i32::MAX);
    assert!(depth_key(0.25) < depth_key(0.5));
    assert!(depth_key(-0.5) < 0);
}

// --- Attribute interpolation ---

#[test]
fn perspective_correction_shifts_the_midpoint_texcoord() {
    let textured = |x: f32, y: f32, w: f32, texcoord: Vec2| VertexOut {
        pos: Vec4::new(x, y, 0.5, w),
        eye_nor: Vec3::Z,
        texcoord,
        tex: Some(0),
        tex_width: 4,
        tex_height: 4,
        ..VertexOut::default()
    };
    let primitive = window_triangle([
        textured(0.0, 0.0, 1.0, Vec2::new(0.0, 0.0)),
        textured(8.0, 0.0, 1.0, Vec2::new(1.0, 0.0)),
        textured(0.0, 8.0, 2.0, Vec2::new(0.0, 1.0)),
    ]);

    // Midpoint of the w=1 / w=2 edge, at pixel (0, 4).
    let index = 4 * 8;

    let correct = run_rasterizer(&[primitive], 8, 8, &RenderConfig::default());
    let uv = correct.fragments[index].tex_uv;
    assert!(
        (uv.y - 4.0 / 3.0).abs() < 1e-4,
        "perspective-correct v should be 1/3 of the texture, got {uv}"
    );

    let affine_config = RenderConfig {
        perspective_correct: false,
        ..RenderConfig::default()
    };
    let affine = run_rasterizer(&[primitive], 8, 8, &affine_config);
    let uv = affine.fragments[index].tex_uv;
    assert!(
        (uv.y - 2.0).abs() < 1e-4,
        "affine v should be the plain midpoint, got {uv}"
    );
}

#[test]
fn interpolated_normals_are_renormalized() {
    let with_normal = |x: f32, y: f32, nor: Vec3| VertexOut {
        pos: Vec4::new(x, y, 0.5, 1.0),
        eye_nor: nor,
        ..VertexOut::default()
    };
    let primitive = window_triangle([
        with_normal(1.0, 1.0, Vec3::X),
        with_normal(7.0, 1.0, Vec3::Y),
        with_normal(4.0, 7.0, Vec3::Z),
    ]);
    let out = run_rasterizer(&[primitive], 8, 8, &RenderConfig::default());

    let mut checked = 0usize;
    for (index, &key) in out.depth.iter().enumerate() {
        if key == i32::MAX {
            continue;
        }
        checked += 1;
        let length = out.fragments[index].eye_nor.length();
        assert!(
            (length - 1.0).abs() < 1e-4,
            "fragment {index} normal length {length}"
        );
    }
    assert!(checked > 0);
}

// --- Texture sampling ---

fn quad_texture() -> Texture {
    // [red, green; blue, white]
    Texture {
        pixels: vec![255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255],
        width: 2,
        height: 2,
    }
}

#[test]
fn bilinear_center_blends_all_four_texels() {
    let texture = quad_texture();
    // uv (0.5, 0.5) of a 2x2 texture lands between all four texel centers.
    let color = shading::sample_bilinear(&texture, Vec2::new(1.0, 1.0));
    assert!((color - Vec3::splat(0.5)).length() < 1e-5, "got {color}");
}

#[test]
fn nearest_center_snaps_to_one_texel() {
    let primitive = {
        let textured = |x: f32, y: f32| VertexOut {
            pos: Vec4::new(x, y, 0.5, 1.0),
            eye_nor: Vec3::Z,
            texcoord: Vec2::new(0.5, 0.5),
            tex: Some(0),
            tex_width: 2,
            tex_height: 2,
            ..VertexOut::default()
        };
        window_triangle([textured(1.0, 1.0), textured(7.0, 1.0), textured(4.0, 7.0)])
    };
    let out = run_rasterizer(&[primitive], 8, 8, &RenderConfig::default());

    let covered = out
        .depth
        .iter()
        .position(|&key| key != i32::MAX)
        .expect("triangle should cover pixels");
    // uv (0.5, 0.5) floors to texel (1, 1): white.
    assert_eq!(out.fragments[covered].tex_start, 9);
    let color = shading::sample_nearest(&quad_texture(), out.fragments[covered].tex_start);
    assert!((color - Vec3::ONE).length() < 1e-5, "got {color}");
}

#[test]
fn sampling_past_the_border_clamps() {
    let texture = quad_texture();
    // uv (1, 1) in texture space is one past the last texel.
    let color = shading::sample_bilinear(&texture, Vec2::new(2.0, 2.0));
    assert!((color - Vec3::ONE).length() < 1e-5, "got {color}");
}

// --- Shading and resolve ---

#[test]
fn debug_visualizations_override_lighting() {
    let fragment = Fragment {
        depth: 0.25,
        eye_nor: Vec3::Y,
        ..Fragment::default()
    };
    let mut framebuffer = [Vec3::ZERO];

    let depth_config = RenderConfig {
        debug: DebugVis::Depth,
        ..RenderConfig::default()
    };
    shading::shade_fragments(&mut framebuffer, &[fragment], &[], &depth_config);
    assert!((framebuffer[0] - Vec3::splat(0.75)).length() < 1e-5);

    let normal_config = RenderConfig {
        debug: DebugVis::Normals,
        ..RenderConfig::default()
    };
    shading::shade_fragments(&mut framebuffer, &[fragment], &[], &normal_config);
    assert!((framebuffer[0] - Vec3::Y).length() < 1e-5);
}

#[test]
fn resolve_box_averages_subpixels() {
    let framebuffer = [
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(0.0, 1.0, 0.0),
        Vec3::new(0.0, 0.0, 1.0),
        Vec3::new(1.0, 1.0, 1.0),
    ];
    let mut output = [0u8; 4];
    resolve::resolve_to_rgba(&framebuffer, &mut output, 1, 1, 2);
    assert_eq!(output, [128, 128, 128, 0]);
}

#[test]
fn resolve_clamps_out_of_range_components() {
    let framebuffer = [Vec3::new(2.0, -1.0, 0.5)];
    let mut output = [0u8; 4];
    resolve::resolve_to_rgba(&framebuffer, &mut output, 1, 1, 1);
    assert_eq!(output, [255, 0, 128, 0]);
}

// --- Upload and assembly ---

#[test]
fn upload_rejects_bad_groups_unless_tolerated() {
    let mut bad = ndc_group(-0.5, None);
    bad.indices[1] = 9;
    let scene = SceneDescription {
        groups: vec![bad, ndc_group(-0.5, None)],
    };

    let mut pipeline = make_pipeline(8, 8);
    let err = pipeline
        .upload_scene(&scene)
        .expect_err("out-of-range index should fail the upload");
    assert!(matches!(
        err,
        super::RenderError::InvalidScene { group: 0, .. }
    ));

    let tolerant = RenderConfig {
        tolerate_invalid_groups: true,
        ..RenderConfig::default()
    };
    let mut pipeline = Pipeline::new(8, 8, tolerant).expect("pipeline should allocate");
    let uploaded = pipeline
        .upload_scene(&scene)
        .expect("tolerant upload should skip the bad group");
    assert_eq!(uploaded, 1);

    let mut image = vec![0u8; 8 * 8 * 4];
    pipeline
        .rasterize(&mut image, Mat4::IDENTITY, Mat4::IDENTITY)
        .expect("frame should render after a skipped group");
}

#[test]
fn strip_groups_are_rejected() {
    let mut strip = ndc_group(-0.5, None);
    strip.kind = PrimitiveKind::TriangleStrip;
    let scene = SceneDescription { groups: vec![strip] };

    let mut pipeline = make_pipeline(8, 8);
    let err = pipeline
        .upload_scene(&scene)
        .expect_err("strip topology should be rejected");
    assert!(matches!(err, super::RenderError::InvalidScene { .. }));
}

#[test]
fn assembly_gathers_vertices_by_index() {
    let group = GroupDescription {
        kind: PrimitiveKind::Triangles,
        indices: vec![0, 1, 2, 0, 2, 3],
        positions: vec![
            Vec3::new(-0.6, -0.6, -0.5),
            Vec3::new(0.6, -0.6, -0.5),
            Vec3::new(0.6, 0.6, -0.5),
            Vec3::new(-0.6, 0.6, -0.5),
        ],
        normals: Some(vec![Vec3::Z; 4]),
        texcoords: None,
        texture: None,
        model: Mat4::IDENTITY,
    };
    let scene = SceneDescription {
        groups: vec![group],
    };

    let mut pipeline = make_pipeline(8, 8);
    pipeline.upload_scene(&scene).expect("scene should upload");
    let mut image = vec![0u8; 8 * 8 * 4];
    pipeline
        .rasterize(&mut image, Mat4::IDENTITY, Mat4::IDENTITY)
        .expect("frame should render");

    assert_eq!(pipeline.primitives.len(), 2);
    let group = &pipeline.groups[0];
    for (pid, expected) in [[0usize, 1, 2], [0, 2, 3]].iter().enumerate() {
        for (slot, &vid) in expected.iter().enumerate() {
            assert_eq!(
                pipeline.primitives[pid].v[slot].pos,
                group.vertex_out[vid].pos,
                "primitive {pid} slot {slot}"
            );
        }
    }
}
