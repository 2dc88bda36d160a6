//! Camera frame acquisition.
//!
//! - `Frame`: decoded, cropped RGB snapshot. Shared read-only as `Arc<Frame>`.
//! - `FrameStore`: owner of the latest frame. Runs a worker thread that is the
//!   only place frame state lives; writers and readers talk to it over a channel.
//! - `FrameFeed`: cloneable writer handle for the feed thread. Decodes payloads
//!   on the caller's thread and never propagates decode failures.
//!
//! A rejected payload leaves the previously stored frame in place.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::LocateError;

/// Upper bound on the base64 text of a single frame message.
pub const MAX_FRAME_PAYLOAD_BYTES: usize = 5 * 1024 * 1024;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// Decoded and cropped camera frame.
#[derive(Debug)]
pub struct Frame {
    image: RgbImage,
    sequence: u64,
    received_at: Instant,
}

impl Frame {
    /// Wrap an already-cropped image. Frames from the store get their sequence
    /// number assigned by the store; standalone frames use 0.
    pub fn from_image(image: RgbImage) -> Self {
        Self::with_sequence(image, 0)
    }

    fn with_sequence(image: RgbImage, sequence: u64) -> Self {
        Self {
            image,
            sequence,
            received_at: Instant::now(),
        }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Store-assigned sequence number, starting at 1.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn age(&self) -> Duration {
        self.received_at.elapsed()
    }
}

// ----------------------------------------------------------------------------
// Region of interest
// ----------------------------------------------------------------------------

/// Source-pixel rectangle kept from every feed frame. `right`/`bottom` are exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRegion {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl Default for CropRegion {
    fn default() -> Self {
        Self {
            left: 195,
            top: 5,
            right: 805,
            bottom: 595,
        }
    }
}

impl CropRegion {
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Crop `image` to this region, clipped to the image bounds.
    pub fn apply(&self, image: &RgbImage) -> Result<RgbImage, LocateError> {
        let right = self.right.min(image.width());
        let bottom = self.bottom.min(image.height());
        if self.left >= right || self.top >= bottom {
            return Err(LocateError::Decode(format!(
                "frame {}x{} does not overlap crop region ({},{})-({},{})",
                image.width(),
                image.height(),
                self.left,
                self.top,
                self.right,
                self.bottom
            )));
        }
        let view = image::imageops::crop_imm(
            image,
            self.left,
            self.top,
            right - self.left,
            bottom - self.top,
        );
        Ok(view.to_image())
    }
}

// ----------------------------------------------------------------------------
// Payload decoding
// ----------------------------------------------------------------------------

/// Transport envelope of one feed message, as published by a compressed-image bridge.
#[derive(Debug, Deserialize)]
pub struct FeedMessage {
    /// Base64 of the encoded image bytes.
    pub data: String,
    /// Codec hint such as `jpeg` or `png`. Decoding sniffs the bytes instead.
    #[serde(default)]
    pub format: Option<String>,
}

/// Decode the base64 `data` field of a feed message into a cropped RGB image.
pub fn decode_frame_data(data: &str, crop: &CropRegion) -> Result<RgbImage, LocateError> {
    let data = data.trim();
    if data.is_empty() {
        return Err(LocateError::Decode("empty frame payload".into()));
    }
    if data.len() > MAX_FRAME_PAYLOAD_BYTES {
        return Err(LocateError::Decode(format!(
            "frame payload of {} bytes exceeds limit of {}",
            data.len(),
            MAX_FRAME_PAYLOAD_BYTES
        )));
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| LocateError::Decode(format!("base64: {}", e)))?;
    let image = image::load_from_memory(&bytes)
        .map_err(|e| LocateError::Decode(format!("image: {}", e)))?
        .into_rgb8();
    crop.apply(&image)
}

// ----------------------------------------------------------------------------
// FrameStore
// ----------------------------------------------------------------------------

enum StoreCommand {
    Publish(RgbImage),
    Rejected,
    Snapshot(Sender<Option<Arc<Frame>>>),
    Stats(Sender<FrameStoreStats>),
}

/// Counters kept by the store worker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStoreStats {
    pub frames_accepted: u64,
    pub frames_rejected: u64,
    pub latest_sequence: Option<u64>,
}

/// Owner of the latest camera frame.
///
/// Construct one per camera and hand `feed()` handles to whatever receives the
/// video subscription. Dropping the store and every feed stops the worker.
pub struct FrameStore {
    commands: Sender<StoreCommand>,
    crop: CropRegion,
}

impl FrameStore {
    pub fn spawn(crop: CropRegion) -> Self {
        let (commands, inbox) = mpsc::channel();
        std::thread::Builder::new()
            .name("frame-store".into())
            .spawn(move || run_store(inbox))
            .map(|_| ())
            .unwrap_or_else(|err| {
                // Without a worker every snapshot reports "no frame".
                log::error!("failed to start frame store worker: {}", err);
            });
        Self { commands, crop }
    }

    pub fn crop(&self) -> CropRegion {
        self.crop
    }

    /// Writer handle for the feed thread.
    pub fn feed(&self) -> FrameFeed {
        FrameFeed {
            commands: self.commands.clone(),
            crop: self.crop,
        }
    }

    /// Latest stored frame, or `None` before the first good feed message.
    pub fn current_frame(&self) -> Option<Arc<Frame>> {
        let (reply, response) = mpsc::channel();
        if self.commands.send(StoreCommand::Snapshot(reply)).is_err() {
            log::error!("frame store worker is gone");
            return None;
        }
        response.recv().ok().flatten()
    }

    /// Like `current_frame`, but a missing frame is a `NoFrame` error.
    pub fn require_frame(&self) -> Result<Arc<Frame>, LocateError> {
        self.current_frame().ok_or(LocateError::NoFrame)
    }

    pub fn stats(&self) -> FrameStoreStats {
        let (reply, response) = mpsc::channel();
        if self.commands.send(StoreCommand::Stats(reply)).is_err() {
            return FrameStoreStats::default();
        }
        response.recv().unwrap_or_default()
    }
}

fn run_store(inbox: Receiver<StoreCommand>) {
    let mut latest: Option<Arc<Frame>> = None;
    let mut stats = FrameStoreStats::default();
    for command in inbox {
        match command {
            StoreCommand::Publish(image) => {
                let sequence = stats.latest_sequence.map_or(1, |seq| seq + 1);
                latest = Some(Arc::new(Frame::with_sequence(image, sequence)));
                stats.frames_accepted += 1;
                stats.latest_sequence = Some(sequence);
            }
            StoreCommand::Rejected => stats.frames_rejected += 1,
            StoreCommand::Snapshot(reply) => {
                let _ = reply.send(latest.clone());
            }
            StoreCommand::Stats(reply) => {
                let _ = reply.send(stats);
            }
        }
    }
    log::debug!(
        "frame store stopped after {} frames",
        stats.frames_accepted
    );
}

/// Feed-side handle of a `FrameStore`.
#[derive(Clone)]
pub struct FrameFeed {
    commands: Sender<StoreCommand>,
    crop: CropRegion,
}

impl FrameFeed {
    /// Handle the base64 `data` of one feed message.
    ///
    /// Returns whether the frame was accepted. Failures are logged and the
    /// previous frame stays current.
    pub fn on_frame_message(&self, data: &str) -> bool {
        match decode_frame_data(data, &self.crop) {
            Ok(image) => self.send(StoreCommand::Publish(image)),
            Err(err) => {
                log::warn!("dropping camera frame: {}", err);
                self.send(StoreCommand::Rejected);
                false
            }
        }
    }

    /// Handle a raw transport payload: a JSON object with a `data` field.
    pub fn on_feed_payload(&self, payload: &[u8]) -> bool {
        match serde_json::from_slice::<FeedMessage>(payload) {
            Ok(message) => {
                if let Some(format) = message.format.as_deref() {
                    log::trace!("feed message format {}", format);
                }
                self.on_frame_message(&message.data)
            }
            Err(err) => {
                log::warn!("dropping feed message: {}", LocateError::Decode(err.to_string()));
                self.send(StoreCommand::Rejected);
                false
            }
        }
    }

    fn send(&self, command: StoreCommand) -> bool {
        let accepted = matches!(command, StoreCommand::Publish(_));
        if self.commands.send(command).is_err() {
            log::debug!("frame store closed; discarding feed message");
            return false;
        }
        accepted
    }
}
