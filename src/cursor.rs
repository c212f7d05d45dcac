//! Cursor images for the nested window.
//!
//! Applications hand us ARGB cursor images through [`CursorImage`]. While no
//! application cursor is shown over the window, the host pointer uses the
//! fallback arrow from [`CursorImage::fallback`].

/// Fallback cursor hotspot (where the click point is relative to top-left).
pub const CURSOR_HOTSPOT: (u32, u32) = (1, 1);

const CURSOR_SIZE: u32 = 24;

const OPAQUE_BLACK: u32 = 0xff00_0000;
const OPAQUE_WHITE: u32 = 0xffff_ffff;

/// A cursor image in premultiplied ARGB8888, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorImage {
    pub width: u32,
    pub height: u32,
    pub hotspot: (u32, u32),
    pub pixels: Vec<u32>,
}

impl CursorImage {
    pub fn new(width: u32, height: u32, hotspot: (u32, u32), pixels: Vec<u32>) -> Option<Self> {
        if pixels.len() != (width as usize) * (height as usize) || width == 0 || height == 0 {
            return None;
        }
        Some(Self {
            width,
            height,
            hotspot,
            pixels,
        })
    }

    /// A left_ptr style arrow: white fill with a black outline.
    pub fn fallback() -> Self {
        let size = CURSOR_SIZE;
        let mut pixels = vec![0u32; (size * size) as usize];
        for y in 0..size {
            // Arrow body spans the lower-left triangle, tail below two thirds.
            let width = if y < size * 2 / 3 { y / 2 + 1 } else { 0 };
            for x in 0..width {
                let edge = x == 0 || x + 1 == width || y + 1 == size * 2 / 3;
                pixels[(y * size + x + CURSOR_HOTSPOT.0) as usize] =
                    if edge { OPAQUE_BLACK } else { OPAQUE_WHITE };
            }
        }
        Self {
            width: size,
            height: size,
            hotspot: CURSOR_HOTSPOT,
            pixels,
        }
    }

    pub fn stride(&self) -> u32 {
        self.width * 4
    }

    /// Pixels as little-endian bytes, the layout of an ARGB8888 shm buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.pixels.iter().flat_map(|p| p.to_le_bytes()).collect()
    }
}
