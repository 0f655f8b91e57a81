//! facegate-hw: V4L2 camera capture.
//!
//! Opens a webcam by index, negotiates a format that decodes to 8-bit
//! grayscale, and streams frames with an optional mirror flip.

pub mod camera;
pub mod frame;

pub use camera::{device_path, Camera, CameraError, DeviceInfo, FrameStream};
pub use frame::{Frame, FrameError, PixelFormat};
