//! Video frames and quad vertices.

use bytemuck::{Pod, Zeroable};
use std::path::Path;

/// Pixel layouts a frame can arrive in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// RGB with 8 bits per channel (24 bits per pixel)
    Rgb,
    /// RGBA with 8 bits per channel (32 bits per pixel)
    Rgba,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb => 3,
            PixelFormat::Rgba => 4,
        }
    }
}

/// One emulator video frame.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel format of the frame data
    pub format: PixelFormat,
    /// Raw pixel data, rows tightly packed
    pub data: Vec<u8>,
}

impl VideoFrame {
    /// Creates a black frame.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let size = (width as usize) * (height as usize) * format.bytes_per_pixel();
        Self {
            width,
            height,
            format,
            data: vec![0; size],
        }
    }

    pub fn from_data(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format,
            data,
        }
    }

    /// Color bars over a checkerboard, sized like a typical console frame.
    pub fn test_pattern(width: u32, height: u32) -> Self {
        const BARS: [[u8; 3]; 8] = [
            [255, 255, 255],
            [255, 255, 0],
            [0, 255, 255],
            [0, 255, 0],
            [255, 0, 255],
            [255, 0, 0],
            [0, 0, 255],
            [0, 0, 0],
        ];
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                let pixel = if y < height * 3 / 4 {
                    BARS[(x * 8 / width.max(1)) as usize]
                } else if (x / 8 + y / 8) % 2 == 0 {
                    [192, 192, 192]
                } else {
                    [64, 64, 64]
                };
                data.extend_from_slice(&pixel);
            }
        }
        Self::from_data(width, height, PixelFormat::Rgb, data)
    }

    /// Decodes an image file into an RGBA frame.
    pub fn load(path: &Path) -> Result<Self, image::ImageError> {
        let image = image::open(path)?.to_rgba8();
        let (width, height) = image.dimensions();
        Ok(Self::from_data(width, height, PixelFormat::Rgba, image.into_raw()))
    }

    /// Writes the frame as an image file; the format follows the extension.
    pub fn save(&self, path: &Path) -> Result<(), image::ImageError> {
        let rgba = self.to_rgba();
        image::save_buffer(path, &rgba.data, rgba.width, rgba.height, image::ColorType::Rgba8)
    }

    /// Bytes per tightly packed row.
    pub fn stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Converts this frame to RGBA format.
    pub fn to_rgba(&self) -> VideoFrame {
        if self.format == PixelFormat::Rgba {
            return self.clone();
        }

        let pixel_count = (self.width * self.height) as usize;
        let mut rgba_data = Vec::with_capacity(pixel_count * 4);
        for rgb in self.data.chunks_exact(3) {
            rgba_data.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
        }

        VideoFrame {
            width: self.width,
            height: self.height,
            format: PixelFormat::Rgba,
            data: rgba_data,
        }
    }

    /// Builds an RGBA frame from rows padded to `padded_bytes_per_row`, as
    /// returned by GPU buffer copies.
    pub fn from_padded_rows(width: u32, height: u32, padded_bytes_per_row: usize, padded: &[u8]) -> Self {
        let row = width as usize * 4;
        let mut data = Vec::with_capacity(row * height as usize);
        for y in 0..height as usize {
            let start = y * padded_bytes_per_row;
            data.extend_from_slice(&padded[start..start + row]);
        }
        Self::from_data(width, height, PixelFormat::Rgba, data)
    }
}

/// Vertex of a shader pass quad.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 3],
    pub tex_coords: [f32; 2],
    pub color: [f32; 3],
}

impl QuadVertex {
    /// Vertices for a full-screen quad in clip space.
    pub const VERTICES: &'static [QuadVertex] = &[
        QuadVertex { position: [-1.0, -1.0, 0.0], tex_coords: [0.0, 1.0], color: [0.0; 3] },
        QuadVertex { position: [1.0, -1.0, 0.0], tex_coords: [1.0, 1.0], color: [0.0; 3] },
        QuadVertex { position: [1.0, 1.0, 0.0], tex_coords: [1.0, 0.0], color: [0.0; 3] },
        QuadVertex { position: [-1.0, 1.0, 0.0], tex_coords: [0.0, 0.0], color: [0.0; 3] },
    ];

    /// Indices for the full-screen quad (two triangles).
    pub const INDICES: &'static [u16] = &[0, 1, 2, 2, 3, 0];

    /// Locations 0 (`VertexCoord`), 1 (`TexCoord`) and 2 (`COLOR`).
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
            wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2, 2 => Float32x3];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRIBUTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_to_rgba_conversion() {
        let rgb_data = vec![255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255];
        let frame = VideoFrame::from_data(2, 2, PixelFormat::Rgb, rgb_data);
        let rgba_frame = frame.to_rgba();

        assert_eq!(rgba_frame.format, PixelFormat::Rgba);
        assert_eq!(rgba_frame.data.len(), 16);
        assert_eq!(&rgba_frame.data[0..4], &[255, 0, 0, 255]);
        assert_eq!(&rgba_frame.data[4..8], &[0, 255, 0, 255]);
    }

    #[test]
    fn test_pattern_starts_with_white_bar() {
        let frame = VideoFrame::test_pattern(256, 224);
        assert_eq!(frame.data.len(), 256 * 224 * 3);
        assert_eq!(&frame.data[0..3], &[255, 255, 255]);
        let last_bar = (255 * 3) as usize;
        assert_eq!(&frame.data[last_bar..last_bar + 3], &[0, 0, 0]);
    }

    #[test]
    fn test_padded_rows_are_trimmed() {
        let mut padded = vec![0u8; 2 * 256];
        padded[0..8].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        padded[256..264].copy_from_slice(&[9, 10, 11, 12, 13, 14, 15, 16]);

        let frame = VideoFrame::from_padded_rows(2, 2, 256, &padded);
        assert_eq!(frame.data, (1..=16).collect::<Vec<u8>>());
        assert_eq!(frame.stride(), 8);
    }

    #[test]
    fn test_vertex_layout_matches_struct() {
        assert_eq!(std::mem::size_of::<QuadVertex>(), 32);
        let layout = QuadVertex::layout();
        assert_eq!(layout.array_stride, 32);
        assert_eq!(layout.attributes[1].offset, 12);
        assert_eq!(layout.attributes[2].offset, 20);
    }
}
