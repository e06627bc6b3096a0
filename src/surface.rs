//! Render target and committed frames.

use std::io::Cursor;

use anyhow::{Context, Result};

use crate::document::PageSize;
use crate::error::RenderError;

/// Largest surface side in pixels.
pub const MAX_SIDE: u32 = 16_384;

/// Pixel dimensions of a page drawn at `scale` (1 pt = 1 px at scale 1.0).
///
/// Each side is at least 1 px so degenerate pages still produce a surface.
pub fn scaled_viewport(size: PageSize, scale: f32) -> (u32, u32) {
    let w = (size.width * scale).round().max(1.0) as u32;
    let h = (size.height * scale).round().max(1.0) as u32;
    (w, h)
}

/// `scaled_viewport` for `page`, refusing sizes with a side over `MAX_SIDE`.
pub fn checked_viewport(size: PageSize, scale: f32, page: u32) -> Result<(u32, u32), RenderError> {
    let (w, h) = scaled_viewport(size, scale);
    if w > MAX_SIDE || h > MAX_SIDE {
        return Err(RenderError::Backend {
            page,
            reason: format!("{w}x{h} px exceeds the {MAX_SIDE} px limit"),
        });
    }
    Ok((w, h))
}

/// RGBA drawable surface. Every render resizes it to the exact viewport and
/// overwrites all of its pixels.
#[derive(Debug, Default)]
pub struct Surface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Surface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resize to `width × height` and clear to white.
    pub fn prepare(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        let len = width as usize * height as usize * 4;
        self.pixels.clear();
        self.pixels.resize(len, 0xFF);
    }

    /// Copy an RGBA bitmap into the surface at the origin, clipped to the
    /// surface bounds. Mismatched sizes are never stretched.
    pub fn blit_rgba(&mut self, src: &[u8], src_width: u32, src_height: u32) {
        let cols = src_width.min(self.width) as usize;
        let rows = src_height.min(self.height) as usize;
        let src_stride = src_width as usize * 4;
        let dst_stride = self.width as usize * 4;
        for row in 0..rows {
            let s = row * src_stride;
            let d = row * dst_stride;
            let Some(src_row) = src.get(s..s + cols * 4) else {
                break;
            };
            self.pixels[d..d + cols * 4].copy_from_slice(src_row);
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Snapshot the current contents as a frame for `token`.
    pub fn snapshot(&self, token: u64, page: u32, scale: f32) -> Frame {
        Frame {
            token,
            page,
            scale,
            width: self.width,
            height: self.height,
            rgba: self.pixels.clone(),
        }
    }
}

/// A finished render, tagged with the request token that produced it.
#[derive(Clone, PartialEq)]
pub struct Frame {
    pub token: u64,
    pub page: u32,
    pub scale: f32,
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("token", &self.token)
            .field("page", &self.page)
            .field("scale", &self.scale)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.rgba.len())
            .finish()
    }
}

impl Frame {
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let img = image::RgbaImage::from_raw(self.width, self.height, self.rgba.clone())
            .context("[BUG] frame buffer does not match its dimensions")?;
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png)
            .context("PNG encoding failed")?;
        Ok(out.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_scales_and_rounds() {
        let a4 = PageSize { width: 595.0, height: 842.0 };
        assert_eq!(scaled_viewport(a4, 1.0), (595, 842));
        assert_eq!(scaled_viewport(a4, 0.5), (298, 421));
        assert_eq!(scaled_viewport(a4, 2.0), (1190, 1684));
    }

    #[test]
    fn viewport_never_zero() {
        let tiny = PageSize { width: 0.4, height: 0.0 };
        assert_eq!(scaled_viewport(tiny, 0.5), (1, 1));
    }

    #[test]
    fn prepare_resizes_and_clears() {
        let mut s = Surface::new();
        s.prepare(4, 2);
        s.pixels_mut()[0] = 0;
        s.prepare(3, 3);
        assert_eq!((s.width(), s.height()), (3, 3));
        assert_eq!(s.pixels().len(), 3 * 3 * 4);
        assert!(s.pixels().iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn blit_clips_larger_source() {
        let mut s = Surface::new();
        s.prepare(2, 2);
        let src = vec![7u8; 3 * 3 * 4];
        s.blit_rgba(&src, 3, 3);
        assert!(s.pixels().iter().all(|&b| b == 7));
    }

    #[test]
    fn blit_leaves_uncovered_area_clear() {
        let mut s = Surface::new();
        s.prepare(2, 2);
        let src = vec![0u8; 4]; // 1x1 black pixel
        s.blit_rgba(&src, 1, 1);
        assert_eq!(&s.pixels()[0..4], &[0, 0, 0, 0]);
        assert!(s.pixels()[4..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn oversized_viewport_is_refused() {
        let poster = PageSize { width: 14_400.0, height: 14_400.0 };
        assert_eq!(checked_viewport(poster, 1.0, 4), Ok((14_400, 14_400)));
        match checked_viewport(poster, 3.0, 4) {
            Err(RenderError::Backend { page: 4, reason }) => assert!(reason.contains("16384"), "{reason}"),
            other => panic!("unexpected {other:?}"),
        }
        let a4 = PageSize { width: 595.0, height: 842.0 };
        assert_eq!(checked_viewport(a4, 3.0, 1), Ok((1785, 2526)));
    }

    #[test]
    fn frame_encodes_png() {
        let mut s = Surface::new();
        s.prepare(8, 8);
        let png = s.snapshot(1, 1, 1.0).encode_png().unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
