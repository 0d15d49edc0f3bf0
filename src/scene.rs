use glam::{Mat4, Vec2, Vec3};

/// Primitive topology of a group's index list.
///
/// The full set of tags is representable so loaders can describe whatever
/// the asset contains, but only `Triangles` survives upload; everything
/// else is rejected with a diagnostic naming the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimitiveKind {
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
    Lines,
    Points,
}

impl PrimitiveKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Triangles => "TRIANGLES",
            Self::TriangleStrip => "TRIANGLE_STRIP",
            Self::TriangleFan => "TRIANGLE_FAN",
            Self::Lines => "LINES",
            Self::Points => "POINTS",
        }
    }
}

/// Tightly packed 8-bit RGB texels, row-major, no padding.
#[derive(Debug, Clone)]
pub struct TextureDescription {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Host-side description of one primitive group: geometry sharing a single
/// material and model matrix, as produced by an external asset loader.
#[derive(Debug, Clone)]
pub struct GroupDescription {
    pub kind: PrimitiveKind,
    pub indices: Vec<u16>,
    pub positions: Vec<Vec3>,
    pub normals: Option<Vec<Vec3>>,
    pub texcoords: Option<Vec<Vec2>>,
    pub texture: Option<TextureDescription>,
    pub model: Mat4,
}

impl GroupDescription {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Checks the structural expectations the pipeline relies on. Returns
    /// the first violation found.
    pub(crate) fn validate(&self) -> Result<(), &'static str> {
        if self.kind != PrimitiveKind::Triangles {
            return Err("only TRIANGLES groups are supported");
        }
        if self.indices.is_empty() {
            return Err("triangle group has no indices");
        }
        if self.indices.len() % 3 != 0 {
            return Err("triangle index count is not a multiple of 3");
        }
        if self.positions.is_empty() {
            return Err("group has no vertex positions");
        }
        if self
            .indices
            .iter()
            .any(|&index| index as usize >= self.positions.len())
        {
            return Err("index out of range of vertex positions");
        }
        if let Some(normals) = &self.normals {
            if normals.len() != self.positions.len() {
                return Err("normal count does not match vertex count");
            }
        }
        if let Some(texcoords) = &self.texcoords {
            if texcoords.len() != self.positions.len() {
                return Err("texcoord count does not match vertex count");
            }
        }
        if let Some(texture) = &self.texture {
            if texture.width == 0 || texture.height == 0 {
                return Err("texture has a zero dimension");
            }
            let expected = texture.width as usize * texture.height as usize * 3;
            if texture.pixels.len() != expected {
                return Err("texture byte length does not match 3 * width * height");
            }
        }
        Ok(())
    }
}

/// A parsed scene: the pipeline's upload input.
#[derive(Debug, Clone, Default)]
pub struct SceneDescription {
    pub groups: Vec<GroupDescription>,
}

impl SceneDescription {
    pub fn triangle_count(&self) -> usize {
        self.groups.iter().map(GroupDescription::triangle_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle_group() -> GroupDescription {
        GroupDescription {
            kind: PrimitiveKind::Triangles,
            indices: vec![0, 1, 2],
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            normals: None,
            texcoords: None,
            texture: None,
            model: Mat4::IDENTITY,
        }
    }

    #[test]
    fn valid_group_passes() {
        assert!(triangle_group().validate().is_ok());
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let mut group = triangle_group();
        group.indices[2] = 3;
        assert!(group.validate().is_err());
    }

    #[test]
    fn ragged_index_count_is_rejected() {
        let mut group = triangle_group();
        group.indices.push(0);
        assert!(group.validate().is_err());
    }

    #[test]
    fn non_triangle_kinds_are_rejected() {
        for kind in [
            PrimitiveKind::TriangleStrip,
            PrimitiveKind::TriangleFan,
            PrimitiveKind::Lines,
            PrimitiveKind::Points,
        ] {
            let mut group = triangle_group();
            group.kind = kind;
            assert!(group.validate().is_err(), "{} should be rejected", kind.name());
        }
    }

    #[test]
    fn mis_sized_attributes_are_rejected() {
        let mut group = triangle_group();
        group.normals = Some(vec![Vec3::Z; 2]);
        assert!(group.validate().is_err());

        let mut group = triangle_group();
        group.texcoords = Some(vec![Vec2::ZERO; 4]);
        assert!(group.validate().is_err());

        let mut group = triangle_group();
        group.texture = Some(TextureDescription {
            pixels: vec![0; 11],
            width: 2,
            height: 2,
        });
        assert!(group.validate().is_err());
    }
}
