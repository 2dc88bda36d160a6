//! Feed → store → detector → localizer pipeline tests.

use std::io::Cursor;
use std::sync::Arc;
use std::thread;

use base64::Engine;
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::json;

use grid_locator::tools::{DETECTION_TOOL, LOCATION_TOOL};
use grid_locator::{
    CropRegion, FixedBoxDetector, FrameStore, GridGeometry, GridLocalizer, LocateError,
    LocatorTools, NormalizedBox, ToolCall, ToolResponse,
};

/// A camera-sized JPEG with a bright marker block just inside the crop origin.
fn camera_frame_base64(width: u32, height: u32) -> String {
    let mut image = RgbImage::from_pixel(width, height, Rgb([40, 40, 40]));
    for y in 5..height.min(100) {
        for x in 195..width.min(300) {
            image.put_pixel(x, y, Rgb([250, 250, 250]));
        }
    }
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Jpeg).unwrap();
    base64::engine::general_purpose::STANDARD.encode(bytes.into_inner())
}

fn tools_with_box(bbox: NormalizedBox) -> LocatorTools<FixedBoxDetector> {
    LocatorTools::new(
        FrameStore::spawn(CropRegion::default()),
        FixedBoxDetector::new(bbox),
        Arc::new(GridLocalizer::new(GridGeometry::default()).unwrap()),
    )
}

#[test]
fn feed_frames_are_cropped_to_the_grid_region() {
    let store = FrameStore::spawn(CropRegion::default());
    assert!(store.feed().on_frame_message(&camera_frame_base64(1000, 600)));

    let frame = store.current_frame().expect("frame stored");
    assert_eq!((frame.width(), frame.height()), (610, 590));
    // The marker block starts at the crop origin.
    let Rgb([r, _, _]) = *frame.image().get_pixel(40, 40);
    assert!(r > 200, "expected marker pixel, got {}", r);
}

#[test]
fn corrupt_messages_keep_the_previous_frame() {
    let store = FrameStore::spawn(CropRegion::default());
    let feed = store.feed();
    assert!(feed.on_frame_message(&camera_frame_base64(1000, 600)));
    let before = store.current_frame().unwrap();

    let full = camera_frame_base64(1000, 600);
    let truncated = &full[..200];
    for bad in ["", "@@@@", truncated] {
        assert!(!feed.on_frame_message(bad));
    }
    // Decodes fine but is smaller than the crop origin.
    assert!(!feed.on_frame_message(&camera_frame_base64(100, 4)));
    assert!(!feed.on_feed_payload(br#"{"format": "jpeg"}"#));

    let after = store.current_frame().unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(store.stats().frames_rejected, 5);
}

#[test]
fn newer_frames_replace_older_ones() {
    let store = FrameStore::spawn(CropRegion::default());
    let feed = store.feed();
    for _ in 0..3 {
        assert!(feed.on_frame_message(&camera_frame_base64(900, 620)));
    }
    assert_eq!(store.current_frame().unwrap().sequence(), 3);
}

#[test]
fn concurrent_feed_and_readers() {
    let store = FrameStore::spawn(CropRegion::default());
    let payload = camera_frame_base64(820, 600);
    let feed = store.feed();
    let writer = thread::spawn(move || {
        for _ in 0..10 {
            feed.on_frame_message(&payload);
        }
    });
    let mut last_seen = 0;
    for _ in 0..50 {
        if let Some(frame) = store.current_frame() {
            assert!(frame.sequence() >= last_seen);
            last_seen = frame.sequence();
        }
    }
    writer.join().unwrap();
    assert_eq!(store.current_frame().unwrap().sequence(), 10);
}

#[test]
fn detection_requires_a_frame() {
    let mut tools = tools_with_box(NormalizedBox::new(0.83, 0.69, 1.0, 0.99));
    assert_eq!(tools.detect().unwrap_err(), LocateError::NoFrame);
}

#[test]
fn tool_calls_end_to_end() {
    let mut tools = tools_with_box(NormalizedBox::new(0.83, 0.69, 1.0, 0.99));
    assert!(tools
        .store()
        .feed()
        .on_frame_message(&camera_frame_base64(1000, 600)));

    let detect: ToolCall = serde_json::from_value(json!({ "tool": DETECTION_TOOL })).unwrap();
    let bbox = tools.invoke(&detect).unwrap();
    assert_eq!(bbox, json!([0.83, 0.69, 1.0, 0.99]));

    // Agents often hand the box back as strings.
    let as_strings: Vec<String> = bbox
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.to_string())
        .collect();
    let locate: ToolCall = serde_json::from_value(json!({
        "tool": LOCATION_TOOL,
        "input": { "bbox": as_strings }
    }))
    .unwrap();
    let response = ToolResponse::from_result(tools.invoke(&locate));
    assert_eq!(
        serde_json::to_value(response).unwrap(),
        json!({ "ok": true, "output": "(4,5)" })
    );
}

#[test]
fn location_tool_rejects_bad_boxes() {
    let mut tools = tools_with_box(NormalizedBox::new(0.0, 0.0, 0.1, 0.1));
    for input in [
        json!({ "bbox": [0.1, 0.2, 0.3] }),
        json!({ "bbox": ["a", "b", "c", "d"] }),
        json!({ "bbox": [0.9, 0.1, 0.1, 0.2] }),
        json!({}),
    ] {
        let call: ToolCall =
            serde_json::from_value(json!({ "tool": LOCATION_TOOL, "input": input })).unwrap();
        let err = tools.invoke(&call).unwrap_err();
        assert_eq!(err.kind(), "invalid_bounding_box", "input {}", input);
    }
}
