//! Robot detection against an external grounding-detection service.
//!
//! The service is a black box: it takes a JPEG and a text prompt and returns
//! normalized boxes. `BoxDetector` is the seam tool code talks to.

mod backend;
mod http;
mod response;

pub use backend::{detect_latest, BoxDetector, FixedBoxDetector};
pub use http::{encode_jpeg, HttpDetector, HttpDetectorConfig, DEFAULT_ENDPOINT, DEFAULT_PROMPT};
pub use response::{parse_detection_response, DetectionEntry};
