use anyhow::{anyhow, Result};

/// Buffer layouts a capture device may hand back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    /// Packed 4:2:2, `Y0 U Y1 V` per pixel pair.
    Yuyv,
    /// Planar Y followed by interleaved UV at quarter resolution.
    Nv12,
}

impl PixelFormat {
    pub(crate) fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(PixelFormat::Rgb24),
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"NV12" => Some(PixelFormat::Nv12),
            _ => None,
        }
    }

    /// Bytes in one tightly packed frame.
    ///
    /// Chroma is subsampled, so odd sizes round up: a YUYV row holds whole pixel pairs
    /// and NV12 carries one UV pair per started 2x2 block.
    pub(crate) fn frame_len(self, width: u32, height: u32) -> Result<usize> {
        let (w, h) = (width as usize, height as usize);
        let len = match self {
            PixelFormat::Rgb24 => w.checked_mul(h).and_then(|p| p.checked_mul(3)),
            PixelFormat::Yuyv => yuyv_stride(w).checked_mul(h),
            PixelFormat::Nv12 => w.checked_mul(h).and_then(|luma| {
                uv_stride(w)
                    .checked_mul(h.div_ceil(2))
                    .and_then(|chroma| luma.checked_add(chroma))
            }),
        };
        len.ok_or_else(|| anyhow!("frame dimensions overflow"))
    }
}

/// Bytes per YUYV row: four per (possibly partial) pixel pair.
fn yuyv_stride(width: usize) -> usize {
    width.div_ceil(2) * 4
}

/// Bytes per NV12 chroma row: one U and one V per (possibly partial) pixel pair.
fn uv_stride(width: usize) -> usize {
    width.div_ceil(2) * 2
}

/// Convert one captured buffer to packed RGB.
///
/// Devices may pad buffers; anything past the expected length is ignored.
pub(crate) fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    let expected = format.frame_len(width, height)?;
    if pixels.len() < expected {
        return Err(anyhow!(
            "{:?} frame too short: expected {}, got {}",
            format,
            expected,
            pixels.len()
        ));
    }
    let pixels = &pixels[..expected];
    match format {
        PixelFormat::Rgb24 => Ok(pixels.to_vec()),
        PixelFormat::Yuyv => Ok(yuyv_to_rgb(pixels, width, height)),
        PixelFormat::Nv12 => Ok(nv12_to_rgb(pixels, width, height)),
    }
}

fn yuyv_to_rgb(pixels: &[u8], width: u32, height: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let stride = yuyv_stride(w);
    let mut rgb = vec![0u8; w * h * 3];
    for j in 0..h {
        for i in 0..w {
            let pair = j * stride + (i / 2) * 4;
            let y = pixels[pair + if i % 2 == 0 { 0 } else { 2 }];
            let u = pixels[pair + 1];
            let v = pixels[pair + 3];
            let offset = (j * w + i) * 3;
            rgb[offset..offset + 3].copy_from_slice(&yuv_to_rgb(y, u, v));
        }
    }
    rgb
}

fn nv12_to_rgb(pixels: &[u8], width: u32, height: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let y_plane = w * h;
    let stride = uv_stride(w);
    let mut rgb = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let uv_index = y_plane + (j / 2) * stride + (i / 2) * 2;
            let offset = (j * w + i) * 3;
            rgb[offset..offset + 3].copy_from_slice(&yuv_to_rgb(
                pixels[j * w + i],
                pixels[uv_index],
                pixels[uv_index + 1],
            ));
        }
    }
    rgb
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;

    let r = y + 1.402_f32 * v;
    let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
    let b = y + 1.772_f32 * u;
    [clamp_to_u8(r), clamp_to_u8(g), clamp_to_u8(b)]
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nv12_conversion_produces_gray() -> Result<()> {
        let y_plane = vec![128u8; 4];
        let uv_plane = vec![128u8; 2];
        let nv12 = [y_plane, uv_plane].concat();

        let rgb = normalize_to_rgb(&nv12, 2, 2, PixelFormat::Nv12)?;
        assert_eq!(rgb, vec![128u8; 12]);

        Ok(())
    }

    #[test]
    fn yuyv_pairs_share_chroma() -> Result<()> {
        // Two pixels, luma 16 and 235, neutral chroma.
        let yuyv = [16u8, 128, 235, 128];
        let rgb = normalize_to_rgb(&yuyv, 2, 1, PixelFormat::Yuyv)?;
        assert_eq!(rgb, vec![16, 16, 16, 235, 235, 235]);
        Ok(())
    }

    #[test]
    fn padded_buffers_are_truncated_short_ones_rejected() -> Result<()> {
        let mut padded = vec![1u8; 9];
        padded.extend_from_slice(&[0u8; 7]);
        assert_eq!(normalize_to_rgb(&padded, 1, 3, PixelFormat::Rgb24)?, vec![1u8; 9]);
        assert!(normalize_to_rgb(&[0u8; 8], 1, 3, PixelFormat::Rgb24).is_err());
        Ok(())
    }

    #[test]
    fn odd_yuyv_width_uses_a_padded_last_pair() -> Result<()> {
        // 3x1: two pairs, the second one half used.
        assert!(normalize_to_rgb(&[128u8; 6], 3, 1, PixelFormat::Yuyv).is_err());
        let yuyv = [16u8, 128, 235, 128, 90, 128, 0, 128];
        let rgb = normalize_to_rgb(&yuyv, 3, 1, PixelFormat::Yuyv)?;
        assert_eq!(rgb, vec![16, 16, 16, 235, 235, 235, 90, 90, 90]);
        Ok(())
    }

    #[test]
    fn odd_nv12_height_has_a_full_last_chroma_row() -> Result<()> {
        // 2x3: six luma bytes, two chroma rows of one UV pair each.
        assert!(normalize_to_rgb(&[128u8; 9], 2, 3, PixelFormat::Nv12).is_err());
        let rgb = normalize_to_rgb(&[128u8; 10], 2, 3, PixelFormat::Nv12)?;
        assert_eq!(rgb, vec![128u8; 18]);

        // Odd width as well: 3x3 rounds chroma up to 2x2 pairs.
        assert_eq!(PixelFormat::Nv12.frame_len(3, 3)?, 9 + 8);
        let rgb = normalize_to_rgb(&[128u8; 17], 3, 3, PixelFormat::Nv12)?;
        assert_eq!(rgb.len(), 27);
        Ok(())
    }

    #[test]
    fn fourcc_lookup() {
        assert_eq!(PixelFormat::from_fourcc(b"YUYV"), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(b"MJPG"), None);
    }
}
