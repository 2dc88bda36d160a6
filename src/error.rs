//! Typed failures surfaced by the localization core.

/// Errors returned by the frame store, detector, localizer and tool surface.
///
/// `Decode` never leaves the frame store in normal operation: feed handles log
/// it and keep the previous frame.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum LocateError {
    #[error("frame decode failed: {0}")]
    Decode(String),
    #[error("no camera frame available yet")]
    NoFrame,
    #[error("detection service error: {0}")]
    DetectionService(String),
    #[error("invalid bounding box: {0}")]
    InvalidBoundingBox(String),
    #[error("invalid grid geometry: {0}")]
    InvalidGeometry(String),
    #[error("unknown tool '{0}'")]
    UnknownTool(String),
    #[error("malformed tool call: {0}")]
    InvalidCall(String),
}

impl LocateError {
    /// Stable identifier used in tool responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::NoFrame => "no_frame",
            Self::DetectionService(_) => "detection_service",
            Self::InvalidBoundingBox(_) => "invalid_bounding_box",
            Self::InvalidGeometry(_) => "invalid_geometry",
            Self::UnknownTool(_) => "unknown_tool",
            Self::InvalidCall(_) => "invalid_call",
        }
    }
}
