//! V4L2 webcam access via the `v4l` crate.

use crate::frame::{Frame, FrameError, PixelFormat};
use std::io;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const REQUESTED_WIDTH: u32 = 640;
const REQUESTED_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 4;
const EBUSY: i32 = 16;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("no camera at {0}")]
    NotFound(String),
    #[error("camera {0} is busy; close other programs using it")]
    Busy(String),
    #[error("failed to open {path}: {source}")]
    Open { path: String, source: io::Error },
    #[error("{0} is not a video capture device")]
    NotCapture(String),
    #[error("format negotiation failed: {0}")]
    Format(String),
    #[error("failed to start streaming: {0}")]
    Stream(io::Error),
    #[error("frame read failed: {0}")]
    Read(String),
}

impl From<FrameError> for CameraError {
    fn from(e: FrameError) -> Self {
        CameraError::Read(e.to_string())
    }
}

/// A capture device found by [`Camera::list_devices`].
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub index: u32,
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// `/dev/video<index>`.
pub fn device_path(index: u32) -> String {
    format!("/dev/video{index}")
}

/// An open camera. The device is released when this is dropped.
pub struct Camera {
    device: Device,
    path: String,
    width: u32,
    height: u32,
    format: PixelFormat,
    mirror: bool,
}

impl Camera {
    /// Open `/dev/video<index>` and negotiate a grayscale-decodable format.
    /// With `mirror`, every frame is flipped left to right.
    pub fn open(index: u32, mirror: bool) -> Result<Self, CameraError> {
        let path = device_path(index);
        if !Path::new(&path).exists() {
            return Err(CameraError::NotFound(path));
        }

        let device = Device::new(index as usize).map_err(|source| {
            busy_or(&path, source, |source| CameraError::Open {
                path: path.clone(),
                source,
            })
        })?;

        let caps = device.query_caps().map_err(|source| CameraError::Open {
            path: path.clone(),
            source,
        })?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::NotCapture(path));
        }

        let (width, height, format) = negotiate(&device)?;
        tracing::info!(
            device = %path,
            card = %caps.card,
            width,
            height,
            format = ?format,
            "camera opened"
        );

        Ok(Self {
            device,
            path,
            width,
            height,
            format,
            mirror,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Start memory-mapped streaming.
    pub fn stream(&self) -> Result<FrameStream<'_>, CameraError> {
        // Drivers usually report a busy device at buffer allocation, not at open.
        let stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| busy_or(&self.path, e, CameraError::Stream))?;
        Ok(FrameStream {
            camera: self,
            stream,
        })
    }

    /// Capture-capable V4L2 nodes, by index.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices: Vec<DeviceInfo> = v4l::context::enum_devices()
            .into_iter()
            .filter_map(|node| {
                let device = Device::with_path(node.path()).ok()?;
                let caps = device.query_caps().ok()?;
                if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                    return None;
                }
                Some(DeviceInfo {
                    index: node.index() as u32,
                    path: node.path().display().to_string(),
                    name: node.name().unwrap_or(caps.card),
                    driver: caps.driver,
                    bus: caps.bus,
                })
            })
            .collect();
        devices.sort_by_key(|d| d.index);
        devices
    }
}

/// `Busy` for EBUSY, otherwise whatever `other` builds.
fn busy_or(path: &str, err: io::Error, other: impl FnOnce(io::Error) -> CameraError) -> CameraError {
    if err.raw_os_error() == Some(EBUSY) {
        CameraError::Busy(path.to_string())
    } else {
        other(err)
    }
}

/// Ask for YUYV at 640x480 and accept whatever decodable format the driver picks.
fn negotiate(device: &Device) -> Result<(u32, u32, PixelFormat), CameraError> {
    let mut wanted = device
        .format()
        .map_err(|e| CameraError::Format(format!("cannot read current format: {e}")))?;
    wanted.fourcc = FourCC::new(b"YUYV");
    wanted.width = REQUESTED_WIDTH;
    wanted.height = REQUESTED_HEIGHT;

    let actual = device
        .set_format(&wanted)
        .map_err(|e| CameraError::Format(format!("driver rejected format: {e}")))?;
    let format = PixelFormat::from_fourcc(&actual.fourcc.repr).ok_or_else(|| {
        CameraError::Format(format!(
            "driver chose {}, which is not YUYV, GREY or Y16",
            actual.fourcc
        ))
    })?;
    Ok((actual.width, actual.height, format))
}

/// An active capture stream borrowing its [`Camera`].
pub struct FrameStream<'a> {
    camera: &'a Camera,
    stream: MmapStream<'a>,
}

impl FrameStream<'_> {
    /// Block for the next buffer and decode it.
    pub fn next_frame(&mut self) -> Result<Frame, CameraError> {
        let camera = self.camera;
        let (buf, meta) = self
            .stream
            .next()
            .map_err(|e| CameraError::Read(format!("dequeue failed: {e}")))?;

        let mut frame = Frame {
            data: camera.format.to_gray(buf, camera.width, camera.height)?,
            width: camera.width,
            height: camera.height,
            sequence: meta.sequence,
        };
        if camera.mirror {
            frame.mirror();
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_path() {
        assert_eq!(device_path(0), "/dev/video0");
        assert_eq!(device_path(12), "/dev/video12");
    }

    #[test]
    fn test_open_missing_device() {
        let err = Camera::open(u32::MAX, true).err().unwrap();
        assert!(matches!(err, CameraError::NotFound(path) if path.ends_with(&u32::MAX.to_string())));
    }

    #[test]
    fn test_busy_mapping() {
        let busy = busy_or("/dev/video0", io::Error::from_raw_os_error(EBUSY), CameraError::Stream);
        assert!(matches!(busy, CameraError::Busy(path) if path == "/dev/video0"));

        let other = busy_or("/dev/video0", io::Error::from_raw_os_error(22), CameraError::Stream);
        assert!(matches!(other, CameraError::Stream(_)));
    }

    #[test]
    fn test_frame_errors_are_read_failures() {
        let err: CameraError = PixelFormat::Grey.to_gray(&[], 2, 2).unwrap_err().into();
        assert!(matches!(err, CameraError::Read(_)));
    }
}
