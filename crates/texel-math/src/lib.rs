// SPDX-License-Identifier: CEPL-1.0
//! Per-frame transform data shared between the CPU and the vertex shader.

pub use glam::{Mat4, Vec3};

/// Degrees per second the model spins about +Z.
pub const SPIN_DEGREES_PER_SEC: f32 = 90.0;
pub const FOV_Y_DEGREES: f32 = 45.0;
pub const Z_NEAR: f32 = 0.1;
pub const Z_FAR: f32 = 10.0;

/// Uniform block consumed by `set = 0, binding = 0` of the mesh vertex shader.
///
/// Three column-major `mat4`s back to back; every member sits on a 16-byte
/// boundary so the layout is identical under std140.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct UniformBlock {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
}

const _: () = assert!(std::mem::size_of::<UniformBlock>() == 192);

impl UniformBlock {
    pub fn new(model: Mat4, view: Mat4, proj: Mat4) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            proj: proj.to_cols_array_2d(),
        }
    }

    /// Block for a frame drawn `elapsed_secs` after start into a
    /// `width`x`height` target.
    pub fn animated(elapsed_secs: f32, width: u32, height: u32) -> Self {
        Self::new(
            model_at(elapsed_secs),
            camera_view(),
            projection(aspect_ratio(width, height)),
        )
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

pub fn model_at(elapsed_secs: f32) -> Mat4 {
    Mat4::from_rotation_z(elapsed_secs * SPIN_DEGREES_PER_SEC.to_radians())
}

pub fn camera_view() -> Mat4 {
    Mat4::look_at_rh(Vec3::splat(2.0), Vec3::ZERO, Vec3::Z)
}

/// Right-handed perspective with a [0, 1] depth range and Y flipped for
/// Vulkan clip space.
pub fn projection(aspect: f32) -> Mat4 {
    let mut proj = Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), aspect, Z_NEAR, Z_FAR);
    proj.y_axis.y *= -1.0;
    proj
}

pub fn aspect_ratio(width: u32, height: u32) -> f32 {
    if width == 0 || height == 0 {
        1.0
    } else {
        width as f32 / height as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn block_is_three_packed_mat4s() {
        assert_eq!(std::mem::size_of::<UniformBlock>(), 3 * 64);
        assert_eq!(std::mem::offset_of!(UniformBlock, view), 64);
        assert_eq!(std::mem::offset_of!(UniformBlock, proj), 128);
        let block = UniformBlock::animated(0.0, 800, 600);
        assert_eq!(block.as_bytes().len(), 192);
    }

    #[test]
    fn model_spins_quarter_turn_per_second() {
        assert_eq!(model_at(0.0), Mat4::IDENTITY);
        let rotated = model_at(1.0).transform_vector3(Vec3::X);
        assert!(close(rotated, Vec3::Y), "got {rotated:?}");
    }

    #[test]
    fn view_moves_eye_to_origin() {
        let eye = camera_view().transform_point3(Vec3::splat(2.0));
        assert!(close(eye, Vec3::ZERO), "got {eye:?}");
    }

    #[test]
    fn projection_flips_y_and_maps_far_plane_to_one() {
        let proj = projection(1.0);
        assert!(proj.y_axis.y < 0.0);

        let far = proj.project_point3(Vec3::new(0.0, 0.0, -Z_FAR));
        assert!((far.z - 1.0).abs() < 1e-4, "far z = {}", far.z);
        let near = proj.project_point3(Vec3::new(0.0, 0.0, -Z_NEAR));
        assert!(near.z.abs() < 1e-4, "near z = {}", near.z);
    }

    #[test]
    fn degenerate_extent_uses_square_aspect() {
        assert_eq!(aspect_ratio(0, 600), 1.0);
        assert_eq!(aspect_ratio(800, 0), 1.0);
        assert!((aspect_ratio(800, 600) - 4.0 / 3.0).abs() < f32::EPSILON);
    }
}
