use rayon::prelude::*;

use super::pipeline::DeviceGroup;
use super::Primitive;

/// Gathers transformed vertices into the group's slice of the flat
/// primitive array: primitive `pid` takes `vertex_out[indices[3*pid + k]]`
/// for k = 0..3. Work items write disjoint slots, so no synchronization.
///
/// `primitives` must be the group's sub-slice, beginning at the group's
/// begin offset and exactly `triangle_count` long; the frame driver keeps
/// the running offset across groups.
pub(crate) fn assemble_group(primitives: &mut [Primitive], group: &DeviceGroup) {
    debug_assert_eq!(primitives.len() * 3, group.indices.len());

    let indices = &group.indices;
    let vertex_out = &group.vertex_out;
    let kind = group.kind;

    primitives
        .par_iter_mut()
        .enumerate()
        .for_each(|(pid, primitive)| {
            primitive.kind = kind;
            for slot in 0..3 {
                let index = indices[3 * pid + slot] as usize;
                primitive.v[slot] = vertex_out[index];
            }
        });
}
