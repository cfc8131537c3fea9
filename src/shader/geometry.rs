//! Per-pass quad layout, projection and uniform inputs.
//!
//! This is the part of a shader pass that does not depend on a graphics
//! API. Backends embed a [`PassGeometry`] and upload its state when drawing.

use super::types::{DestQuad, Float2};
use crate::frame::QuadVertex;

/// Triangles of the pass quad.
pub const QUAD_INDICES: [u16; 6] = [0, 1, 3, 1, 2, 3];

/// Uniform block `Inputs` as laid out under std140.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InputUniforms {
    pub mvp: [[f32; 4]; 4],
    pub output_size: [f32; 2],
    pub texture_size: [f32; 2],
    pub input_size: [f32; 2],
    pub frame_count: i32,
    pub frame_direction: f32,
}

/// Sizes, quad and projection of one shader pass.
#[derive(Debug, Clone)]
pub struct PassGeometry {
    input_size: Float2,
    output_size: Float2,
    viewport_size: Float2,
    frame_count_mod: u32,
    frame_count: u64,
    vertices: [QuadVertex; 4],
    mvp: [[f32; 4]; 4],
}

impl PassGeometry {
    pub fn new(viewport_size: Float2, frame_count_mod: u32) -> Self {
        Self {
            input_size: Float2::ZERO,
            output_size: Float2::ZERO,
            viewport_size,
            frame_count_mod,
            frame_count: 0,
            vertices: [QuadVertex::default(); 4],
            mvp: IDENTITY,
        }
    }

    /// Records the size this pass reads and the size it renders.
    pub fn set_sizes(&mut self, prev_size: Float2, next_size: Float2) {
        self.input_size = prev_size;
        self.output_size = next_size;
    }

    /// Lays out the quad for this frame.
    ///
    /// Intermediate passes fill their own render target, so the quad is
    /// centered and sized to the pass output. The last pass is placed on
    /// the caller's destination corners.
    pub fn prepare(&mut self, dest: &DestQuad, is_last_pass: bool, frame_count: u64) {
        self.frame_count = frame_count;

        let half_w = self.output_size.x / 2.0;
        let half_h = self.output_size.y / 2.0;

        // bottom-left, bottom-right, top-right, top-left; pixel space is y-down
        let corners: [[f32; 2]; 4] = if is_last_pass {
            [
                [dest[3].x - half_w, dest[3].y - half_h],
                [dest[2].x - half_w, dest[2].y - half_h],
                [dest[1].x - half_w, dest[1].y - half_h],
                [dest[0].x - half_w, dest[0].y - half_h],
            ]
        } else {
            [
                [-half_w, half_h],
                [half_w, half_h],
                [half_w, -half_h],
                [-half_w, -half_h],
            ]
        };

        const TEX_COORDS: [[f32; 2]; 4] = [[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]];

        for (vertex, (corner, tex)) in self
            .vertices
            .iter_mut()
            .zip(corners.iter().zip(TEX_COORDS.iter()))
        {
            vertex.position = [corner[0], corner[1], 0.0];
            vertex.tex_coords = *tex;
            vertex.color = [0.0; 3];
        }
    }

    /// Recomputes the pixel-space to clip-space projection.
    pub fn update_mvp(&mut self) {
        let x_scale = if self.output_size.x != 0.0 { 2.0 / self.output_size.x } else { 0.0 };
        let y_scale = if self.output_size.y != 0.0 { -2.0 / self.output_size.y } else { 0.0 };

        self.mvp = [
            [x_scale, 0.0, 0.0, 0.0],
            [0.0, y_scale, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
    }

    /// Frame count as the shader sees it.
    pub fn frame_count(&self, frame_count: u64) -> u64 {
        if self.frame_count_mod != 0 {
            frame_count % u64::from(self.frame_count_mod)
        } else {
            frame_count
        }
    }

    /// Uniform data for the given frame.
    pub fn input_data(&self, frame_count: u64) -> InputUniforms {
        InputUniforms {
            mvp: self.mvp,
            // The viewport resolution, not this pass's output resolution.
            output_size: self.viewport_size.to_array(),
            texture_size: self.input_size.to_array(),
            input_size: self.input_size.to_array(),
            frame_count: i32::try_from(self.frame_count(frame_count)).unwrap_or(i32::MAX),
            // Time always flows forward
            frame_direction: 1.0,
        }
    }

    /// Uniform data for the frame recorded by the last [`prepare`](Self::prepare).
    pub fn current_input_data(&self) -> InputUniforms {
        self.input_data(self.frame_count)
    }

    pub fn vertices(&self) -> &[QuadVertex; 4] {
        &self.vertices
    }

    pub fn mvp(&self) -> &[[f32; 4]; 4] {
        &self.mvp
    }

    pub fn input_size(&self) -> Float2 {
        self.input_size
    }

    pub fn output_size(&self) -> Float2 {
        self.output_size
    }

    pub fn viewport_size(&self) -> Float2 {
        self.viewport_size
    }
}

const IDENTITY: [[f32; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

#[cfg(test)]
mod tests {
    use super::*;

    fn project(geometry: &PassGeometry, v: &QuadVertex) -> [f32; 2] {
        let m = geometry.mvp();
        [v.position[0] * m[0][0], v.position[1] * m[1][1]]
    }

    #[test]
    fn test_frame_count_modulo() {
        let geometry = PassGeometry::new(Float2::new(640.0, 480.0), 10);
        assert_eq!(geometry.input_data(23).frame_count, 3);

        let geometry = PassGeometry::new(Float2::new(640.0, 480.0), 0);
        assert_eq!(geometry.input_data(23).frame_count, 23);
    }

    #[test]
    fn test_frame_count_saturates_instead_of_wrapping() {
        let geometry = PassGeometry::new(Float2::new(640.0, 480.0), 0);
        assert_eq!(geometry.input_data(u64::from(u32::MAX) + 5).frame_count, i32::MAX);

        let geometry = PassGeometry::new(Float2::new(640.0, 480.0), u32::MAX);
        assert_eq!(geometry.input_data(u64::from(u32::MAX) - 1).frame_count, i32::MAX);
    }

    #[test]
    fn test_frame_direction_is_forward() {
        let geometry = PassGeometry::new(Float2::new(640.0, 480.0), 0);
        assert_eq!(geometry.input_data(0).frame_direction, 1.0);
    }

    #[test]
    fn test_intermediate_quad_fills_clip_space() {
        let mut geometry = PassGeometry::new(Float2::new(1920.0, 1080.0), 0);
        geometry.set_sizes(Float2::new(128.0, 256.0), Float2::new(256.0, 512.0));
        geometry.update_mvp();
        geometry.prepare(&[Float2::ZERO; 4], false, 0);

        let clip: Vec<[f32; 2]> = geometry.vertices().iter().map(|v| project(&geometry, v)).collect();
        assert_eq!(clip[0], [-1.0, -1.0]);
        assert_eq!(clip[1], [1.0, -1.0]);
        assert_eq!(clip[2], [1.0, 1.0]);
        assert_eq!(clip[3], [-1.0, 1.0]);
        assert_eq!(geometry.vertices()[0].tex_coords, [0.0, 1.0]);
        assert_eq!(geometry.vertices()[3].tex_coords, [0.0, 0.0]);
    }

    #[test]
    fn test_last_pass_uses_destination_corners() {
        let mut geometry = PassGeometry::new(Float2::new(256.0, 128.0), 0);
        geometry.set_sizes(Float2::new(160.0, 144.0), Float2::new(256.0, 128.0));
        geometry.update_mvp();
        let dest = [
            Float2::new(64.0, 0.0),
            Float2::new(192.0, 0.0),
            Float2::new(192.0, 128.0),
            Float2::new(64.0, 128.0),
        ];
        geometry.prepare(&dest, true, 0);

        // bottom-left vertex comes from dest[3], offset by half the output
        assert_eq!(geometry.vertices()[0].position, [-64.0, 64.0, 0.0]);
        assert_eq!(geometry.vertices()[3].position, [-64.0, -64.0, 0.0]);

        let clip: Vec<[f32; 2]> = geometry.vertices().iter().map(|v| project(&geometry, v)).collect();
        assert_eq!(clip[0], [-0.5, -1.0]);
        assert_eq!(clip[2], [0.5, 1.0]);
    }

    #[test]
    fn test_uniform_block_is_std140_sized() {
        assert_eq!(std::mem::size_of::<InputUniforms>(), 96);
    }

    #[test]
    fn test_input_data_reports_sizes() {
        let mut geometry = PassGeometry::new(Float2::new(1920.0, 1080.0), 0);
        geometry.set_sizes(Float2::new(160.0, 144.0), Float2::new(640.0, 576.0));
        let data = geometry.input_data(5);
        assert_eq!(data.output_size, [1920.0, 1080.0]);
        assert_eq!(data.input_size, [160.0, 144.0]);
        assert_eq!(data.texture_size, [160.0, 144.0]);
    }
}
