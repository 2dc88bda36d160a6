use serde::Deserialize;

use crate::bbox::NormalizedBox;
use crate::error::LocateError;

/// One result entry returned by the detection service.
///
/// The service answers with a JSON array of these; only `boxes` is required.
#[derive(Debug, Deserialize)]
pub struct DetectionEntry {
    pub boxes: Vec<Vec<f64>>,
    #[serde(default)]
    pub scores: Vec<f64>,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Extract `boxes[0]` of the first entry from a detection response body.
pub fn parse_detection_response(body: &[u8]) -> Result<NormalizedBox, LocateError> {
    let entries: Vec<DetectionEntry> = serde_json::from_slice(body)
        .map_err(|e| LocateError::DetectionService(format!("malformed response: {}", e)))?;
    let entry = entries
        .first()
        .ok_or_else(|| LocateError::DetectionService("response contains no results".into()))?;
    let first = entry
        .boxes
        .first()
        .ok_or_else(|| LocateError::DetectionService("no boxes detected".into()))?;
    let bbox = NormalizedBox::from_slice(first).map_err(|_| {
        LocateError::DetectionService(format!(
            "box has {} coordinates, expected 4",
            first.len()
        ))
    })?;
    if !bbox.is_finite() {
        return Err(LocateError::DetectionService(format!(
            "box has non-finite coordinates {:?}",
            first
        )));
    }
    if let Some(score) = entry.scores.first() {
        log::debug!(
            "detection score {:.3} label {}",
            score,
            entry.labels.first().map(String::as_str).unwrap_or("-")
        );
    }
    Ok(bbox)
}
