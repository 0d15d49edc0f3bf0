pub mod assembly;
pub mod error;
pub mod pipeline;
pub mod rasterizer;
pub mod resolve;
pub mod shading;
#[cfg(test)]
mod tests;
pub mod vertex;

use std::cell::UnsafeCell;
use std::collections::TryReserveError;

use glam::{Vec2, Vec3, Vec4};

pub use error::RenderError;
pub use pipeline::Pipeline;

use crate::scene::PrimitiveKind;

/// Index into the pipeline's texture table. The Rust rendition of the
/// source material's non-owning texture pointer.
pub type TextureId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Supersampling {
    Off,
    X2,
    X4,
}

impl Supersampling {
    pub fn factor(self) -> usize {
        match self {
            Self::Off => 1,
            Self::X2 => 2,
            Self::X4 => 4,
        }
    }

    pub fn next(self) -> Self {
        match self {
            Self::Off => Self::X2,
            Self::X2 => Self::X4,
            Self::X4 => Self::Off,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::X2 => "2x",
            Self::X4 => "4x",
        }
    }
}

/// Debug visualizations override the lit output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugVis {
    Off,
    /// Grayscale `|1 - z|` of the winning window depth.
    Depth,
    /// Eye-space normal written as a color.
    Normals,
}

impl DebugVis {
    pub fn next(self) -> Self {
        match self {
            Self::Off => Self::Depth,
            Self::Depth => Self::Normals,
            Self::Normals => Self::Off,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Off => "lit",
            Self::Depth => "depth",
            Self::Normals => "normals",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RenderConfig {
    pub supersampling: Supersampling,
    /// Sample the diffuse texture; when off, fragments keep their vertex tint.
    pub texturing: bool,
    /// Bilinear filtering instead of nearest-texel lookup.
    pub bilinear: bool,
    /// Perspective-correct attribute interpolation (affine when off).
    pub perspective_correct: bool,
    pub debug: DebugVis,
    /// Skip invalid groups at upload instead of failing the whole scene.
    pub tolerate_invalid_groups: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            supersampling: Supersampling::Off,
            texturing: true,
            bilinear: false,
            perspective_correct: true,
            debug: DebugVis::Off,
            tolerate_invalid_groups: false,
        }
    }
}

/// Per-vertex, per-frame output of the vertex stage.
///
/// `pos` is window x/y in pixels and window depth in z; w keeps the
/// pre-divide clip w so the rasterizer can interpolate perspectively.
#[derive(Debug, Clone, Copy, Default)]
pub struct VertexOut {
    pub pos: Vec4,
    pub eye_pos: Vec3,
    pub eye_nor: Vec3,
    pub col: Vec3,
    pub texcoord: Vec2,
    pub tex: Option<TextureId>,
    pub tex_width: u32,
    pub tex_height: u32,
}

/// An assembled triangle. All primitives from all groups live in one flat
/// array, indexed by a per-group begin offset.
#[derive(Debug, Clone, Copy, Default)]
pub struct Primitive {
    pub kind: PrimitiveKind,
    pub v: [VertexOut; 3],
}

/// What the rasterizer publishes for a pixel its winning triangle covers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fragment {
    pub eye_pos: Vec3,
    pub eye_nor: Vec3,
    pub col: Vec3,
    /// Winning window depth, for the depth visualization.
    pub depth: f32,
    pub tex: Option<TextureId>,
    /// Byte offset of the nearest texel in the texture's RGB array.
    pub tex_start: usize,
    /// Pixel-space uv for bilinear filtering.
    pub tex_uv: Vec2,
}

/// Dense per-pixel fragment storage shared across rasterizer work items.
///
/// Cells are interior-mutable; a cell may only be written while the
/// corresponding pixel's spinlock in the mutex buffer is held, which makes
/// the unsynchronized `UnsafeCell` access race-free.
pub(crate) struct FragmentBuffer {
    cells: Vec<UnsafeCell<Fragment>>,
}

// SAFETY: concurrent access to a cell is serialized by the per-pixel
// spinlock discipline documented on `write`.
unsafe impl Sync for FragmentBuffer {}

impl FragmentBuffer {
    pub(crate) fn with_len(len: usize) -> Result<Self, TryReserveError> {
        let mut cells = Vec::new();
        cells.try_reserve_exact(len)?;
        cells.resize_with(len, || UnsafeCell::new(Fragment::default()));
        Ok(Self { cells })
    }

    pub(crate) fn len(&self) -> usize {
        self.cells.len()
    }

    pub(crate) fn clear(&mut self) {
        for cell in &mut self.cells {
            *cell.get_mut() = Fragment::default();
        }
    }

    /// Publishes the fragment for pixel `index`.
    ///
    /// SAFETY: the caller must hold pixel `index`'s spinlock. No other
    /// work item reads or writes the cell until the caller's release store.
    pub(crate) unsafe fn write(&self, index: usize, fragment: Fragment) {
        *self.cells[index].get() = fragment;
    }

    /// Exclusive access proves no rasterizer work item is running.
    pub(crate) fn as_slice(&mut self) -> &[Fragment] {
        // SAFETY: UnsafeCell<Fragment> has the same layout as Fragment and
        // &mut self guarantees there are no concurrent writers.
        unsafe {
            std::slice::from_raw_parts(self.cells.as_ptr().cast::<Fragment>(), self.cells.len())
        }
    }
}

impl Default for FragmentBuffer {
    fn default() -> Self {
        Self { cells: Vec::new() }
    }
}
