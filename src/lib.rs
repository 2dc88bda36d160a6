//! Grid Locator
//!
//! Locates a mobile robot on a fixed floor grid from an overhead camera.
//!
//! # Architecture
//!
//! video feed → `FrameStore` → `BoxDetector` (on demand) → `NormalizedBox`
//! → `GridLocalizer` → `GridCoordinate`
//!
//! # Module Structure
//!
//! - `frame`: feed payload decoding, cropping and the latest-frame store
//! - `detect`: detection backends (HTTP grounding-detection service, fixed stub)
//! - `grid`: grid geometry and nearest-centroid localization
//! - `tools`: JSON tool surface for agents
//! - `transport`: MQTT camera feed subscription
//! - `config`: file + environment configuration

pub mod bbox;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod grid;
pub mod tools;
pub mod transport;

pub use bbox::{NormalizedBox, PixelBox};
pub use config::{FeedSettings, LocatorConfig};
pub use detect::{BoxDetector, FixedBoxDetector, HttpDetector, HttpDetectorConfig};
pub use error::LocateError;
pub use frame::{CropRegion, Frame, FrameFeed, FrameStore, FrameStoreStats};
pub use grid::{GridCentroid, GridCoordinate, GridGeometry, GridLocalizer};
pub use tools::{LocatorTools, ToolCall, ToolResponse};
pub use transport::FeedSubscriber;
