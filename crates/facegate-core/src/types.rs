use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Dense, zero-based integer standing in for an identity inside the classifier.
pub type Label = u32;

/// A face region reported by a detector, in frame pixel coordinates.
///
/// Detectors may report boxes that poke outside the frame, so the origin is signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Intersect with a `frame_width` × `frame_height` frame.
    ///
    /// Returns `(x, y, width, height)` in unsigned frame coordinates, or `None`
    /// when nothing of the region lies inside the frame.
    pub fn clamp_to(&self, frame_width: u32, frame_height: u32) -> Option<(u32, u32, u32, u32)> {
        let x0 = i64::from(self.x).max(0);
        let y0 = i64::from(self.y).max(0);
        let x1 = (i64::from(self.x) + i64::from(self.width)).min(i64::from(frame_width));
        let y1 = (i64::from(self.y) + i64::from(self.height)).min(i64::from(frame_height));

        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
    }

    /// Copy the grayscale pixels under this region. `None` for an empty crop.
    pub fn crop(&self, frame: &GrayImage) -> Option<GrayImage> {
        let (x, y, w, h) = self.clamp_to(frame.width(), frame.height())?;
        Some(image::imageops::crop_imm(frame, x, y, w, h).to_image())
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Output of a classifier prediction. Lower `distance` means a closer match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: Label,
    pub distance: f64,
}

/// Per-face accept/reject outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
}

/// One detected face region's outcome within a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub region: Region,
    pub label: Label,
    /// Registry name for `label`; `None` renders as "Unknown".
    pub identity: Option<String>,
    pub distance: f64,
    pub decision: Decision,
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        self.decision == Decision::Accept
    }

    pub fn identity_or_unknown(&self) -> &str {
        self.identity.as_deref().unwrap_or(UNKNOWN_IDENTITY)
    }

    /// Overlay caption drawn next to the face in the live view.
    pub fn caption(&self) -> String {
        match self.decision {
            Decision::Accept => format!("Logged In: {}", self.identity_or_unknown()),
            Decision::Reject => "Login Failed".to_string(),
        }
    }
}

/// Marker shown when a predicted label has no registry entry.
pub const UNKNOWN_IDENTITY: &str = "Unknown";

/// Aggregated login outcome for a whole frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// No face in the frame.
    Scanning,
    /// At least one face was accepted; carries the first accepted identity.
    Welcome(String),
    /// Faces were found but none was accepted.
    LoginFailed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Scanning => write!(f, "Scanning for face..."),
            Status::Welcome(name) => write!(f, "Welcome, {name}!"),
            Status::LoginFailed => write!(f, "Login Failed"),
        }
    }
}
