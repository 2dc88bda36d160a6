use crate::bbox::NormalizedBox;
use crate::error::LocateError;
use crate::frame::{Frame, FrameStore};

/// Detection backend trait.
///
/// Implementations receive one cropped frame and return the first box the
/// backend reports for the robot. Failures are not retried here.
pub trait BoxDetector: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<NormalizedBox, LocateError>;
}

impl<D: BoxDetector + ?Sized> BoxDetector for Box<D> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn detect(&mut self, frame: &Frame) -> Result<NormalizedBox, LocateError> {
        (**self).detect(frame)
    }
}

/// Detect on the store's current frame. Fails with `NoFrame` before the feed
/// has delivered a usable image.
pub fn detect_latest<D: BoxDetector + ?Sized>(
    detector: &mut D,
    store: &FrameStore,
) -> Result<NormalizedBox, LocateError> {
    let frame = store.require_frame()?;
    log::debug!(
        "running {} detector on frame #{} ({}x{}, {} ms old)",
        detector.name(),
        frame.sequence(),
        frame.width(),
        frame.height(),
        frame.age().as_millis()
    );
    detector.detect(&frame)
}

/// Backend that always reports the same box. For offline runs and tests.
pub struct FixedBoxDetector {
    bbox: NormalizedBox,
    calls: u64,
}

impl FixedBoxDetector {
    pub fn new(bbox: NormalizedBox) -> Self {
        Self { bbox, calls: 0 }
    }

    /// Number of frames this backend has been asked about.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl BoxDetector for FixedBoxDetector {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<NormalizedBox, LocateError> {
        self.calls += 1;
        Ok(self.bbox)
    }
}
