use super::texture::WgpuShaderTexture;
use super::{create_sampler, DeviceCaps};
use crate::shader::{FilterType, ShaderError, ShaderLut, ShaderLutDesc, WrapType};
use image::RgbaImage;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A lookup texture uploaded to the GPU with its own sampler.
pub struct WgpuShaderLut {
    id: String,
    path: PathBuf,
    texture: WgpuShaderTexture,
    sampler: wgpu::Sampler,
}

impl WgpuShaderLut {
    pub fn load(device: &wgpu::Device, queue: &wgpu::Queue, caps: DeviceCaps, lut: &ShaderLutDesc) -> Result<Self, ShaderError> {
        let image = image::open(&lut.path)
            .map_err(|source| ShaderError::LutImage {
                path: lut.path.clone(),
                source,
            })?
            .to_rgba8();

        let levels = if lut.mipmap { mip_chain(image) } else { vec![image] };
        let (width, height) = levels[0].dimensions();
        debug!("LUT {} ({:?}): {}x{}, {} mip level(s)", lut.id, lut.path, width, height, levels.len());

        Ok(Self {
            id: lut.id.clone(),
            path: lut.path.clone(),
            texture: upload(device, queue, &lut.id, &levels),
            sampler: create_sampler(device, caps, lut.filter, lut.wrap),
        })
    }

    /// Opaque white 1x1 stand-in for a LUT a shader samples but that
    /// couldn't be loaded.
    pub fn placeholder(device: &wgpu::Device, queue: &wgpu::Queue, caps: DeviceCaps, id: &str) -> Self {
        let white = RgbaImage::from_pixel(1, 1, image::Rgba([255, 255, 255, 255]));
        Self {
            id: id.to_string(),
            path: PathBuf::new(),
            texture: upload(device, queue, id, &[white]),
            sampler: create_sampler(device, caps, FilterType::Nearest, WrapType::Edge),
        }
    }

    pub fn texture(&self) -> &WgpuShaderTexture {
        &self.texture
    }

    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }
}

impl ShaderLut for WgpuShaderLut {
    fn id(&self) -> &str {
        &self.id
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

fn upload(device: &wgpu::Device, queue: &wgpu::Queue, id: &str, levels: &[RgbaImage]) -> WgpuShaderTexture {
    let (width, height) = levels[0].dimensions();
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(&format!("LUT {}", id)),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: levels.len() as u32,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    for (level, image) in levels.iter().enumerate() {
        let (w, h) = image.dimensions();
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: level as u32,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            image.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(w * 4),
                rows_per_image: Some(h),
            },
            wgpu::Extent3d {
                width: w,
                height: h,
                depth_or_array_layers: 1,
            },
        );
    }

    WgpuShaderTexture::new(texture)
}

/// Base image followed by successively halved levels down to 1x1.
fn mip_chain(base: RgbaImage) -> Vec<RgbaImage> {
    let mut levels = vec![base];
    loop {
        let (w, h) = levels[levels.len() - 1].dimensions();
        if w == 1 && h == 1 {
            break;
        }
        let next = image::imageops::resize(
            &levels[levels.len() - 1],
            (w / 2).max(1),
            (h / 2).max(1),
            image::imageops::FilterType::Triangle,
        );
        levels.push(next);
    }
    levels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_chain_reaches_one_texel() {
        let levels = mip_chain(RgbaImage::new(8, 2));
        let sizes: Vec<(u32, u32)> = levels.iter().map(|l| l.dimensions()).collect();
        assert_eq!(sizes, vec![(8, 2), (4, 1), (2, 1), (1, 1)]);
    }

    #[test]
    fn test_mip_chain_averages() {
        let base = RgbaImage::from_pixel(4, 4, image::Rgba([200, 100, 50, 255]));
        let levels = mip_chain(base);
        assert_eq!(levels.len(), 3);
        assert_eq!(levels[2].get_pixel(0, 0).0, [200, 100, 50, 255]);
    }
}
