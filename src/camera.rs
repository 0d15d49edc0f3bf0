use glam::{Mat4, Vec3};

#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    pub fn new(position: Vec3, yaw: f32, pitch: f32) -> Self {
        let mut camera = Self {
            position,
            forward: Vec3::NEG_Z,
            right: Vec3::X,
            up: Vec3::Y,
            yaw,
            pitch,
            fov: std::f32::consts::PI / 3.0,
            near: 0.1,
            far: 100.0,
        };
        camera.update_vectors();
        camera
    }

    pub fn update_vectors(&mut self) {
        let forward = Vec3::new(
            self.yaw.cos() * self.pitch.cos(),
            self.pitch.sin(),
            self.yaw.sin() * self.pitch.cos(),
        )
        .normalize();

        let right = forward.cross(Vec3::Y);
        self.forward = forward;
        self.right = if right.length_squared() < 1e-6 {
            Vec3::X
        } else {
            right.normalize()
        };
        self.up = self.right.cross(forward).normalize();
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward, self.up)
    }

    /// Projection for the pipeline's depth convention: `perspective_rh`
    /// lands NDC depth in [0, 1] and the vertex stage negates it, so a
    /// post-projection z flip keeps window depth in [0, 1], near to far.
    pub fn projection(&self, width: usize, height: usize) -> Mat4 {
        let aspect = width.max(1) as f32 / height.max(1) as f32;
        Mat4::from_scale(Vec3::new(1.0, 1.0, -1.0))
            * Mat4::perspective_rh(self.fov, aspect, self.near, self.far)
    }

    pub fn view_proj(&self, width: usize, height: usize) -> Mat4 {
        self.projection(width, height) * self.view()
    }
}

pub fn look_at_target(camera: &mut Camera, target: Vec3) {
    let to_target = target - camera.position;
    if to_target.length_squared() < 1e-8 {
        return;
    }
    let to_target = to_target.normalize();
    camera.yaw = to_target.z.atan2(to_target.x);
    camera.pitch = to_target.y.clamp(-1.0, 1.0).asin();
    camera.update_vectors();
}

pub fn look_at_origin(camera: &mut Camera) {
    look_at_target(camera, Vec3::ZERO);
}
