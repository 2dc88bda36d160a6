//! Agent-facing tool surface.
//!
//! Two tools are exposed:
//! - `robot_detection`: no input; returns the robot's normalized bounding box.
//! - `grid_location`: takes that box and returns the grid cell as `"(row,col)"`.
//!
//! Calls and responses are plain JSON so any agent runtime can drive them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::bbox::NormalizedBox;
use crate::detect::{detect_latest, BoxDetector};
use crate::error::LocateError;
use crate::frame::FrameStore;
use crate::grid::GridLocalizer;

pub const DETECTION_TOOL: &str = "robot_detection";
pub const LOCATION_TOOL: &str = "grid_location";

/// One coordinate as an agent may send it: a number or a numeric string.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BoxValue {
    Number(f64),
    Text(String),
}

impl BoxValue {
    fn to_f64(&self) -> Result<f64, LocateError> {
        match self {
            Self::Number(value) => Ok(*value),
            Self::Text(text) => text.trim().parse::<f64>().map_err(|_| {
                LocateError::InvalidBoundingBox(format!("'{}' is not a number", text))
            }),
        }
    }
}

/// Parse a 4-value bounding box from agent input.
pub fn parse_box_values(values: &[BoxValue]) -> Result<NormalizedBox, LocateError> {
    let coords = values
        .iter()
        .map(BoxValue::to_f64)
        .collect::<Result<Vec<_>, _>>()?;
    NormalizedBox::from_slice(&coords)
}

/// Input of the location tool.
#[derive(Debug, Deserialize)]
pub struct LocationInput {
    pub bbox: Vec<BoxValue>,
}

/// A named tool invocation: `{"tool": "...", "input": {...}}`.
#[derive(Debug, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub input: Value,
}

/// Wire form of a tool result.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ToolResponse {
    Ok { ok: bool, output: Value },
    Err { ok: bool, error: ToolErrorBody },
}

#[derive(Debug, Serialize)]
pub struct ToolErrorBody {
    pub kind: String,
    pub message: String,
}

impl ToolResponse {
    pub fn from_result(result: Result<Value, LocateError>) -> Self {
        match result {
            Ok(output) => Self::Ok { ok: true, output },
            Err(err) => Self::Err {
                ok: false,
                error: ToolErrorBody {
                    kind: err.kind().to_string(),
                    message: err.to_string(),
                },
            },
        }
    }
}

/// Tool description handed to an agent when it enumerates tools.
#[derive(Clone, Debug, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

/// The detection and location tools bound to one camera and one grid.
pub struct LocatorTools<D> {
    store: FrameStore,
    detector: D,
    localizer: Arc<GridLocalizer>,
}

impl<D: BoxDetector> LocatorTools<D> {
    pub fn new(store: FrameStore, detector: D, localizer: Arc<GridLocalizer>) -> Self {
        Self {
            store,
            detector,
            localizer,
        }
    }

    pub fn store(&self) -> &FrameStore {
        &self.store
    }

    pub fn localizer(&self) -> &GridLocalizer {
        &self.localizer
    }

    /// Detect the robot in the latest camera frame.
    pub fn detect(&mut self) -> Result<NormalizedBox, LocateError> {
        log::info!("{} called", DETECTION_TOOL);
        detect_latest(&mut self.detector, &self.store)
    }

    /// Locate a detected box on the grid, formatted as `"(row,col)"`.
    pub fn locate(&self, bbox: &[BoxValue]) -> Result<String, LocateError> {
        log::info!("{} called", LOCATION_TOOL);
        let bbox = parse_box_values(bbox)?;
        let cell = self.localizer.locate_normalized(bbox)?;
        Ok(cell.to_string())
    }

    /// Dispatch a tool call by name.
    pub fn invoke(&mut self, call: &ToolCall) -> Result<Value, LocateError> {
        match call.tool.as_str() {
            DETECTION_TOOL => Ok(json!(self.detect()?)),
            LOCATION_TOOL => {
                let input: LocationInput = serde_json::from_value(call.input.clone())
                    .map_err(|e| LocateError::InvalidBoundingBox(e.to_string()))?;
                Ok(json!(self.locate(&input.bbox)?))
            }
            other => Err(LocateError::UnknownTool(other.to_string())),
        }
    }

    /// Descriptions of the exposed tools.
    pub fn describe(&self) -> Vec<ToolSpec> {
        let geometry = self.localizer.geometry();
        vec![
            ToolSpec {
                name: DETECTION_TOOL,
                description: "Detects the robot in the overhead camera image and returns its \
                              bounding box [xmin, ymin, xmax, ymax] in normalized coordinates. \
                              Does not tell where on the grid the robot is. No input needed.",
                input_schema: json!({ "type": "object", "properties": {} }),
            },
            ToolSpec {
                name: LOCATION_TOOL,
                description: match (geometry.rows, geometry.cols) {
                    (4, 5) => "Locates the robot on the 4x5 grid from a bounding box and returns \
                               the cell as (row,col), both starting at 1.",
                    _ => "Locates the robot on the grid from a bounding box and returns the \
                          cell as (row,col), both starting at 1.",
                },
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "bbox": {
                            "type": "array",
                            "items": { "type": ["number", "string"] },
                            "minItems": 4,
                            "maxItems": 4,
                            "description": "Bounding box of the robot, e.g. [0.83, 0.69, 1.0, 0.99]"
                        }
                    },
                    "required": ["bbox"]
                }),
            },
        ]
    }
}
