use anyhow::{Result, anyhow};
use rayon::prelude::*;

/// Packed 8-bit layouts that map pixel-for-pixel onto RGBA.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PackedLayout {
    Rgb,
    Bgr,
    Gray,
}

impl PackedLayout {
    fn channels(self) -> usize {
        match self {
            PackedLayout::Rgb | PackedLayout::Bgr => 3,
            PackedLayout::Gray => 1,
        }
    }
}

pub fn packed_to_rgba(data: &[u8], width: u32, height: u32, layout: PackedLayout) -> Result<Vec<u8>> {
    let pixels = width as usize * height as usize;
    let channels = layout.channels();
    if data.len() < pixels * channels {
        return Err(anyhow!(
            "{layout:?} buffer too small: got {}, expected {}",
            data.len(),
            pixels * channels
        ));
    }

    let mut rgba = vec![0u8; pixels * 4];
    rgba.par_chunks_mut(4)
        .zip(data[..pixels * channels].par_chunks_exact(channels))
        .for_each(|(dst, src)| {
            let [r, g, b] = match layout {
                PackedLayout::Rgb => [src[0], src[1], src[2]],
                PackedLayout::Bgr => [src[2], src[1], src[0]],
                PackedLayout::Gray => [src[0]; 3],
            };
            dst.copy_from_slice(&[r, g, b, 255]);
        });
    Ok(rgba)
}

/// Drops the alpha channel; `dst` must hold three bytes per source pixel.
pub fn rgba_to_rgb_into(rgba: &[u8], dst: &mut [u8]) {
    dst.par_chunks_exact_mut(3)
        .zip(rgba.par_chunks_exact(4))
        .for_each(|(out, px)| out.copy_from_slice(&px[..3]));
}

#[cfg(feature = "camera-nokhwa")]
pub use camera_formats::{RgbaFrame, convert_camera_frame};

#[cfg(feature = "camera-nokhwa")]
mod camera_formats {
    use anyhow::{Result, anyhow};
    use nokhwa::{Buffer, utils::FrameFormat};
    use yuv::{
        YuvBiPlanarImage, YuvConversionMode, YuvPackedImage, YuvRange, YuvStandardMatrix,
        yuv_nv12_to_rgba, yuyv422_to_rgba,
    };
    use zune_jpeg::{
        JpegDecoder,
        zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
    };

    use super::{PackedLayout, packed_to_rgba};

    #[derive(Debug)]
    pub struct RgbaFrame {
        pub rgba: Vec<u8>,
        pub width: u32,
        pub height: u32,
    }

    pub fn convert_camera_frame(buffer: &Buffer) -> Result<RgbaFrame> {
        let resolution = buffer.resolution();
        let (width, height) = (resolution.width_x, resolution.height_y);
        let data = buffer.buffer();

        let rgba = match buffer.source_frame_format() {
            FrameFormat::NV12 => nv12_to_rgba(data, width, height)?,
            FrameFormat::YUYV => yuyv_to_rgba(data, width, height)?,
            FrameFormat::MJPEG => mjpeg_to_rgba(data, width, height)?,
            FrameFormat::RAWRGB => packed_to_rgba(data, width, height, PackedLayout::Rgb)?,
            FrameFormat::RAWBGR => packed_to_rgba(data, width, height, PackedLayout::Bgr)?,
            FrameFormat::GRAY => packed_to_rgba(data, width, height, PackedLayout::Gray)?,
        };

        Ok(RgbaFrame {
            rgba,
            width,
            height,
        })
    }

    fn nv12_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
        let luma_len = width as usize * height as usize;
        let chroma_len = luma_len / 2;
        if data.len() < luma_len + chroma_len {
            return Err(anyhow!(
                "NV12 buffer too small: got {}, expected {}",
                data.len(),
                luma_len + chroma_len
            ));
        }

        let image = YuvBiPlanarImage {
            y_plane: &data[..luma_len],
            y_stride: width,
            uv_plane: &data[luma_len..luma_len + chroma_len],
            uv_stride: width,
            width,
            height,
        };
        let mut rgba = vec![0u8; luma_len * 4];
        yuv_nv12_to_rgba(
            &image,
            &mut rgba,
            width * 4,
            YuvRange::Full,
            YuvStandardMatrix::Bt709,
            YuvConversionMode::Balanced,
        )
        .map_err(|err| anyhow!("NV12 to RGBA failed: {err:?}"))?;
        Ok(rgba)
    }

    fn yuyv_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
        let pixels = width as usize * height as usize;
        if data.len() < pixels * 2 {
            return Err(anyhow!(
                "YUYV buffer too small: got {}, expected {}",
                data.len(),
                pixels * 2
            ));
        }

        let packed = YuvPackedImage {
            yuy: data,
            yuy_stride: width * 2,
            width,
            height,
        };
        let mut rgba = vec![0u8; pixels * 4];
        yuyv422_to_rgba(
            &packed,
            &mut rgba,
            width * 4,
            YuvRange::Full,
            YuvStandardMatrix::Bt709,
        )
        .map_err(|err| anyhow!("YUYV422 to RGBA failed: {err:?}"))?;
        Ok(rgba)
    }

    fn mjpeg_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
        let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGBA);
        let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), options);
        let rgba = decoder
            .decode()
            .map_err(|err| anyhow!("MJPEG decode failed: {err:?}"))?;

        let (w, h) = decoder
            .info()
            .map(|info| (info.width as u32, info.height as u32))
            .unwrap_or((width, height));
        if (w, h) != (width, height) {
            return Err(anyhow!("MJPEG frame is {w}x{h}, camera reported {width}x{height}"));
        }
        let expected = usize::try_from(w as u64 * h as u64 * 4)
            .map_err(|_| anyhow!("MJPEG dimensions do not fit usize"))?;
        if rgba.len() < expected {
            return Err(anyhow!(
                "MJPEG decode produced too few bytes: got {}, expected {expected}",
                rgba.len()
            ));
        }
        Ok(rgba)
    }
}
