use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use glam::{Mat3, Mat4, Vec2, Vec3};
use log::{debug, info, warn};

use crate::scene::{GroupDescription, PrimitiveKind, SceneDescription};

use super::{assembly, rasterizer, resolve, shading, vertex};
use super::{FragmentBuffer, Primitive, RenderConfig, RenderError, TextureId, VertexOut};

/// Device-resident diffuse texture: tightly packed 8-bit RGB.
pub(crate) struct Texture {
    pub(crate) pixels: Vec<u8>,
    pub(crate) width: u32,
    pub(crate) height: u32,
}

/// Device-resident geometry for one primitive group, plus its per-frame
/// vertex scratch. Immutable after upload except for `vertex_out`.
pub(crate) struct DeviceGroup {
    pub(crate) kind: PrimitiveKind,
    pub(crate) indices: Vec<u16>,
    pub(crate) positions: Vec<Vec3>,
    pub(crate) normals: Option<Vec<Vec3>>,
    pub(crate) texcoords: Option<Vec<Vec2>>,
    pub(crate) texture: Option<TextureId>,
    pub(crate) tex_width: u32,
    pub(crate) tex_height: u32,
    pub(crate) model: Mat4,
    /// Inverse-transpose of the model's upper-left 3x3, fixed at upload.
    pub(crate) normal_model: Mat3,
    pub(crate) vertex_out: Vec<VertexOut>,
    pub(crate) primitive_count: usize,
}

/// The rasterization pipeline: owns every device buffer and runs the
/// per-frame dispatch sequence (vertex transform, primitive assembly,
/// rasterization, fragment shading, resolve).
///
/// Internal buffers are sized to the supersampled resolution and reused
/// across frames; `Drop` releases everything.
pub struct Pipeline {
    pub(crate) config: RenderConfig,
    pub(crate) out_width: usize,
    pub(crate) out_height: usize,
    /// Supersampled dimensions.
    pub(crate) width: usize,
    pub(crate) height: usize,
    pub(crate) groups: Vec<DeviceGroup>,
    pub(crate) textures: Vec<Texture>,
    pub(crate) primitives: Vec<Primitive>,
    pub(crate) depth: Vec<AtomicI32>,
    pub(crate) mutex: Vec<AtomicU32>,
    pub(crate) fragments: FragmentBuffer,
    pub(crate) framebuffer: Vec<Vec3>,
}

impl Pipeline {
    /// Allocates a pipeline rendering `width x height` output pixels.
    pub fn new(width: usize, height: usize, config: RenderConfig) -> Result<Self, RenderError> {
        let mut pipeline = Self {
            config,
            out_width: 0,
            out_height: 0,
            width: 0,
            height: 0,
            groups: Vec::new(),
            textures: Vec::new(),
            primitives: Vec::new(),
            depth: Vec::new(),
            mutex: Vec::new(),
            fragments: FragmentBuffer::default(),
            framebuffer: Vec::new(),
        };
        pipeline.resize(width, height)?;
        Ok(pipeline)
    }

    pub fn output_width(&self) -> usize {
        self.out_width
    }

    pub fn output_height(&self) -> usize {
        self.out_height
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Swaps the configuration, reallocating the per-pixel buffers when the
    /// supersampling factor changed.
    pub fn set_config(&mut self, config: RenderConfig) -> Result<(), RenderError> {
        let realloc = config.supersampling != self.config.supersampling;
        self.config = config;
        if realloc {
            let (width, height) = (self.out_width, self.out_height);
            self.resize(width, height)?;
        }
        Ok(())
    }

    /// Reallocates the per-pixel buffers for a new output resolution.
    /// Calling with the current dimensions is a no-op.
    pub fn resize(&mut self, width: usize, height: usize) -> Result<(), RenderError> {
        let factor = self.config.supersampling.factor();
        let ss_width = width * factor;
        let ss_height = height * factor;
        if self.out_width == width
            && self.out_height == height
            && self.width == ss_width
            && self.height == ss_height
        {
            return Ok(());
        }

        let len = ss_width * ss_height;
        self.depth = alloc_with("depth buffer", len, || AtomicI32::new(i32::MAX))?;
        self.mutex = alloc_with("mutex buffer", len, || AtomicU32::new(0))?;
        self.fragments = FragmentBuffer::with_len(len).map_err(|_| {
            RenderError::AllocationFailure {
                stage: "fragment buffer",
                bytes: len * std::mem::size_of::<super::Fragment>(),
            }
        })?;
        self.framebuffer = alloc_with("framebuffer", len, || Vec3::ZERO)?;

        self.out_width = width;
        self.out_height = height;
        self.width = ss_width;
        self.height = ss_height;
        debug!("pipeline buffers sized to {ss_width}x{ss_height} ({width}x{height} output)");
        Ok(())
    }

    /// Validates and uploads a scene, replacing any previous one. Returns
    /// the number of device groups created. With
    /// `config.tolerate_invalid_groups`, bad groups are skipped with a
    /// warning instead of failing the upload.
    pub fn upload_scene(&mut self, scene: &SceneDescription) -> Result<usize, RenderError> {
        self.clear_scene();

        let mut skipped = 0usize;
        for (gid, group) in scene.groups.iter().enumerate() {
            match self.upload_group(gid, group) {
                Ok(()) => {}
                Err(err @ RenderError::InvalidScene { .. })
                    if self.config.tolerate_invalid_groups =>
                {
                    warn!("skipping scene group {gid}: {err}");
                    skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }

        let total: usize = self.groups.iter().map(|g| g.primitive_count).sum();
        self.primitives = alloc_with("primitive buffer", total, Primitive::default)?;

        info!(
            "uploaded scene: {} groups ({} skipped), {} triangles, {} textures",
            self.groups.len(),
            skipped,
            total,
            self.textures.len()
        );
        Ok(self.groups.len())
    }

    fn upload_group(&mut self, gid: usize, desc: &GroupDescription) -> Result<(), RenderError> {
        if let Err(reason) = desc.validate() {
            return Err(RenderError::InvalidScene { group: gid, reason });
        }
        debug!(
            "group {gid}: {} with {} triangles over {} vertices",
            desc.kind.name(),
            desc.triangle_count(),
            desc.positions.len()
        );

        let (texture, tex_width, tex_height) = match &desc.texture {
            Some(texture) => {
                let id = self.textures.len() as TextureId;
                self.textures.push(Texture {
                    pixels: copy_buffer("texture upload", &texture.pixels)?,
                    width: texture.width,
                    height: texture.height,
                });
                (Some(id), texture.width, texture.height)
            }
            None => (None, 0, 0),
        };

        let vertex_out = alloc_with("vertex scratch", desc.positions.len(), VertexOut::default)?;
        let normals = match &desc.normals {
            Some(normals) => Some(copy_buffer("normal upload", normals)?),
            None => None,
        };
        let texcoords = match &desc.texcoords {
            Some(texcoords) => Some(copy_buffer("texcoord upload", texcoords)?),
            None => None,
        };

        self.groups.push(DeviceGroup {
            kind: desc.kind,
            primitive_count: desc.triangle_count(),
            indices: copy_buffer("index upload", &desc.indices)?,
            positions: copy_buffer("position upload", &desc.positions)?,
            normals,
            texcoords,
            texture,
            tex_width,
            tex_height,
            model: desc.model,
            normal_model: Mat3::from_mat4(desc.model).inverse().transpose(),
            vertex_out,
        });
        Ok(())
    }

    /// Releases the device-resident scene; per-pixel buffers stay allocated.
    pub fn clear_scene(&mut self) {
        self.groups.clear();
        self.textures.clear();
        self.primitives.clear();
    }

    /// Renders one frame into `output` (`width * height * 4` RGBA bytes,
    /// alpha always 0). `view_proj` and `view` are the camera matrices; the
    /// driver composes each group's model matrix into its MVP and MV, and
    /// the eye-space normal matrix from the group's precomputed one.
    ///
    /// A `DispatchFailure` discards the frame; the next call starts from
    /// freshly cleared buffers.
    pub fn rasterize(
        &mut self,
        output: &mut [u8],
        view_proj: Mat4,
        view: Mat4,
    ) -> Result<(), RenderError> {
        let expected = self.out_width * self.out_height * 4;
        if output.len() != expected {
            return Err(RenderError::OutputMismatch {
                expected,
                actual: output.len(),
            });
        }

        self.clear_frame();
        debug_assert_eq!(self.fragments.len(), self.width * self.height);

        let width = self.width;
        let height = self.height;
        let view_normal = Mat3::from_mat4(view).inverse().transpose();

        // Vertex transform then assembly, group by group; rayon's fork-join
        // returns are the barrier the assembly gather relies on. The begin
        // offset walks the flat primitive array across groups.
        let groups = &mut self.groups;
        let primitives = &mut self.primitives;
        dispatch("vertex transform and primitive assembly", || {
            let mut begin = 0usize;
            for group in groups.iter_mut() {
                let mvp = view_proj * group.model;
                let mv = view * group.model;
                let mv_normal = view_normal * group.normal_model;
                vertex::transform_group(group, mvp, mv, mv_normal, width, height);

                let end = begin + group.primitive_count;
                assembly::assemble_group(&mut primitives[begin..end], group);
                begin = end;
            }
        })?;

        dispatch("rasterizer", || {
            rasterizer::rasterize_primitives(
                &self.primitives,
                &self.depth,
                &self.mutex,
                &self.fragments,
                width,
                height,
                &self.config,
            );
        })?;
        debug_assert!(self.mutex.iter().all(|m| m.load(Ordering::Relaxed) == 0));

        let fragments = self.fragments.as_slice();
        let framebuffer = &mut self.framebuffer;
        let textures = &self.textures;
        let config = &self.config;
        dispatch("fragment shader", || {
            shading::shade_fragments(framebuffer, fragments, textures, config);
        })?;

        let framebuffer = &self.framebuffer;
        let out_width = self.out_width;
        let out_height = self.out_height;
        let factor = self.config.supersampling.factor();
        dispatch("resolve", || {
            resolve::resolve_to_rgba(framebuffer, output, out_width, out_height, factor);
        })
    }

    /// Start-of-frame clears: fragments zeroed, depth to the far key, and
    /// the mutex buffer re-armed in case a discarded frame left locks held.
    fn clear_frame(&mut self) {
        for cell in self.depth.iter_mut() {
            *cell.get_mut() = i32::MAX;
        }
        for cell in self.mutex.iter_mut() {
            *cell.get_mut() = 0;
        }
        self.fragments.clear();
    }
}

/// Runs one dispatch, converting a kernel panic into a `DispatchFailure`
/// so the host can drop the frame and keep going.
fn dispatch(stage: &'static str, f: impl FnOnce()) -> Result<(), RenderError> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|_| RenderError::DispatchFailure { stage })
}

fn alloc_with<T>(
    stage: &'static str,
    len: usize,
    fill: impl FnMut() -> T,
) -> Result<Vec<T>, RenderError> {
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(len).map_err(|_| {
        RenderError::AllocationFailure {
            stage,
            bytes: len * std::mem::size_of::<T>(),
        }
    })?;
    buffer.resize_with(len, fill);
    Ok(buffer)
}

fn copy_buffer<T: Copy>(stage: &'static str, data: &[T]) -> Result<Vec<T>, RenderError> {
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(data.len()).map_err(|_| {
        RenderError::AllocationFailure {
            stage,
            bytes: data.len() * std::mem::size_of::<T>(),
        }
    })?;
    buffer.extend_from_slice(data);
    Ok(buffer)
}
