//! Raw buffer decoding to 8-bit grayscale and the mirror flip.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("{format:?} buffer holds {actual} bytes, a {width}x{height} frame needs {needed}")]
    ShortBuffer {
        format: PixelFormat,
        width: u32,
        height: u32,
        needed: usize,
        actual: usize,
    },
}

/// Pixel layouts the camera may settle on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed 4:2:2, `[Y0 U Y1 V]` per pixel pair.
    Yuyv,
    Grey,
    /// 16-bit little-endian luminance.
    Y16,
}

impl PixelFormat {
    /// Map a V4L2 fourcc. Some drivers pad `Y16` with a NUL instead of a space.
    pub fn from_fourcc(code: &[u8; 4]) -> Option<Self> {
        match code {
            b"YUYV" => Some(Self::Yuyv),
            b"GREY" => Some(Self::Grey),
            b"Y16 " | b"Y16\0" => Some(Self::Y16),
            _ => None,
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Grey => 1,
            Self::Yuyv | Self::Y16 => 2,
        }
    }

    /// Decode one row-major buffer into `width * height` luminance bytes.
    /// Trailing driver padding beyond the frame is ignored.
    pub fn to_gray(self, buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
        let pixels = width as usize * height as usize;
        let needed = pixels * self.bytes_per_pixel();
        if buf.len() < needed {
            return Err(FrameError::ShortBuffer {
                format: self,
                width,
                height,
                needed,
                actual: buf.len(),
            });
        }
        let buf = &buf[..needed];
        Ok(match self {
            Self::Grey => buf.to_vec(),
            // Luma sits on even bytes.
            Self::Yuyv => buf.iter().step_by(2).copied().collect(),
            // Keep the high byte.
            Self::Y16 => buf.chunks_exact(2).map(|px| px[1]).collect(),
        })
    }
}

/// One decoded grayscale frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// `width * height` bytes, row-major.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Driver sequence number.
    pub sequence: u32,
}

impl Frame {
    /// Swap left and right so the picture reads like a mirror.
    pub fn mirror(&mut self) {
        let width = self.width as usize;
        if width == 0 {
            return;
        }
        self.data
            .chunks_exact_mut(width)
            .for_each(|row| row.reverse());
    }
}
