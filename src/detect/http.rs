use std::io::Read;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use image::codecs::jpeg::JpegEncoder;

use super::backend::BoxDetector;
use super::response::parse_detection_response;
use crate::bbox::NormalizedBox;
use crate::error::LocateError;
use crate::frame::Frame;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8081/predict";
pub const DEFAULT_PROMPT: &str = "Turtlebot3";
const DEFAULT_JPEG_QUALITY: u8 = 90;
const MAX_RESPONSE_BYTES: u64 = 1024 * 1024;

/// Configuration for the HTTP detection backend.
#[derive(Clone, Debug, PartialEq)]
pub struct HttpDetectorConfig {
    /// Full URL of the predict endpoint.
    pub endpoint: String,
    /// Text prompt naming the object to find.
    pub prompt: String,
    /// Caller-chosen request timeout. `None` leaves the call unbounded.
    pub timeout: Option<Duration>,
    pub jpeg_quality: u8,
}

impl Default for HttpDetectorConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            prompt: DEFAULT_PROMPT.to_string(),
            timeout: None,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Detection backend that POSTs the frame to a grounding-detection server.
///
/// Request: multipart form with `file` (JPEG) and `prompt`.
/// Response: `[{"boxes": [[xmin, ymin, xmax, ymax], ...], ...}, ...]`.
pub struct HttpDetector {
    config: HttpDetectorConfig,
    agent: ureq::Agent,
}

impl HttpDetector {
    pub fn new(config: HttpDetectorConfig) -> Self {
        let mut builder = ureq::AgentBuilder::new();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        Self {
            config,
            agent: builder.build(),
        }
    }

    pub fn config(&self) -> &HttpDetectorConfig {
        &self.config
    }

    fn post(&self, jpeg: &[u8]) -> Result<Vec<u8>, LocateError> {
        let form = MultipartForm::new()
            .text("prompt", &self.config.prompt)
            .file("file", "image.jpg", "image/jpeg", jpeg);
        let response = self
            .agent
            .post(&self.config.endpoint)
            .set("Content-Type", &form.content_type())
            .send_bytes(&form.finish())
            .map_err(|err| match err {
                ureq::Error::Status(code, response) => LocateError::DetectionService(format!(
                    "{} returned HTTP {} {}",
                    self.config.endpoint,
                    code,
                    response.status_text()
                )),
                ureq::Error::Transport(transport) => LocateError::DetectionService(format!(
                    "request to {} failed: {}",
                    self.config.endpoint, transport
                )),
            })?;

        let mut body = Vec::new();
        response
            .into_reader()
            .take(MAX_RESPONSE_BYTES)
            .read_to_end(&mut body)
            .map_err(|e| LocateError::DetectionService(format!("read response body: {}", e)))?;
        Ok(body)
    }
}

impl BoxDetector for HttpDetector {
    fn name(&self) -> &'static str {
        "http"
    }

    fn detect(&mut self, frame: &Frame) -> Result<NormalizedBox, LocateError> {
        let jpeg = encode_jpeg(frame, self.config.jpeg_quality)?;
        log::info!(
            "requesting '{}' detection from {} ({} byte frame)",
            self.config.prompt,
            self.config.endpoint,
            jpeg.len()
        );
        let body = self.post(&jpeg)?;
        let bbox = parse_detection_response(&body)?;
        log::info!("detected box {:?}", bbox.to_array());
        Ok(bbox)
    }
}

/// Compress a frame as JPEG.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, LocateError> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
        .encode_image(frame.image())
        .map_err(|e| LocateError::DetectionService(format!("encode frame as jpeg: {}", e)))?;
    Ok(bytes)
}

/// Minimal multipart/form-data body builder.
struct MultipartForm {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartForm {
    fn new() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        Self {
            boundary: format!("------------------------gridloc{:x}", nanos),
            body: Vec::new(),
        }
    }

    fn text(mut self, name: &str, value: &str) -> Self {
        self.part_header(name, None, None);
        self.body.extend_from_slice(value.as_bytes());
        self.body.extend_from_slice(b"\r\n");
        self
    }

    fn file(mut self, name: &str, filename: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.part_header(name, Some(filename), Some(content_type));
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    fn part_header(&mut self, name: &str, filename: Option<&str>, content_type: Option<&str>) {
        let mut header = format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"",
            self.boundary, name
        );
        if let Some(filename) = filename {
            header.push_str(&format!("; filename=\"{}\"", filename));
        }
        header.push_str("\r\n");
        if let Some(content_type) = content_type {
            header.push_str(&format!("Content-Type: {}\r\n", content_type));
        }
        header.push_str("\r\n");
        self.body.extend_from_slice(header.as_bytes());
    }

    fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    fn finish(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        self.body
    }
}
