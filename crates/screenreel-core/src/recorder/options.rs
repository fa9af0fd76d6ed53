//! Recording options: the user-facing form and the resolved wire form
//! handed to the worker process.

use crate::{RecorderError, Result};

use std::{panic::Location, path::Path, path::PathBuf};

use error_location::ErrorLocation;
use serde::{Deserialize, Serialize};

/// Crop rectangle in screen points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropArea {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Rectangle width.
    pub width: f64,
    /// Rectangle height.
    pub height: f64,
}

/// User-facing recording options.
#[derive(Debug, Clone)]
pub struct RecorderOptions {
    /// Frames per second to capture.
    pub fps: u32,
    /// Optional crop rectangle; full screen when absent.
    pub crop_area: Option<CropArea>,
    /// Render the cursor into the recording.
    pub show_cursor: bool,
    /// Highlight clicks; forces `show_cursor` on.
    pub highlight_clicks: bool,
    /// Target screen id; 0 selects the primary screen.
    pub screen_id: u32,
    /// Audio input device id; no audio track when absent.
    pub audio_device_id: Option<String>,
    /// Codec name from the capability table (see
    /// [`video_codecs`](crate::video_codecs)).
    pub video_codec: String,
}

impl Default for RecorderOptions {
    fn default() -> Self {
        Self {
            fps: 30,
            crop_area: None,
            show_cursor: true,
            highlight_clicks: false,
            screen_id: 0,
            audio_device_id: None,
            video_codec: "h264".to_owned(),
        }
    }
}

impl RecorderOptions {
    /// Decode options from a JSON object, validating the crop-area shape.
    ///
    /// Unknown fields are ignored; absent fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the JSON is malformed or `cropArea` is
    /// present without all four numeric fields.
    #[track_caller]
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| {
            RecorderError::Validation {
                reason: format!("options are not valid JSON: {e}"),
                location: ErrorLocation::from(Location::caller()),
            }
        })?;

        let defaults = Self::default();
        let crop_area = match value.get("cropArea") {
            None | Some(serde_json::Value::Null) => None,
            Some(crop) => Some(parse_crop_area(crop)?),
        };

        Ok(Self {
            fps: value
                .get("fps")
                .and_then(serde_json::Value::as_u64)
                .map_or(defaults.fps, |fps| fps as u32),
            crop_area,
            show_cursor: value
                .get("showCursor")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(defaults.show_cursor),
            highlight_clicks: value
                .get("highlightClicks")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(defaults.highlight_clicks),
            screen_id: value
                .get("screenId")
                .and_then(serde_json::Value::as_u64)
                .map_or(defaults.screen_id, |id| id as u32),
            audio_device_id: value
                .get("audioDeviceId")
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned),
            video_codec: value
                .get("videoCodec")
                .and_then(serde_json::Value::as_str)
                .map_or(defaults.video_codec, str::to_owned),
        })
    }

    /// Reject option values no worker should ever see.
    ///
    /// Runs before any subprocess is spawned, so a failure has no side
    /// effects.
    #[track_caller]
    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(crop) = &self.crop_area {
            let fields = [crop.x, crop.y, crop.width, crop.height];
            if fields.iter().any(|field| !field.is_finite()) {
                return Err(RecorderError::Validation {
                    reason: "Invalid `cropArea` option object".to_owned(),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        }
        Ok(())
    }

    /// Resolve into the wire form for one session.
    ///
    /// `highlight_clicks` implies a visible cursor regardless of the literal
    /// `show_cursor` value.
    pub(crate) fn resolved(&self, destination: &Path, codec_tag: &str) -> WorkerOptions {
        WorkerOptions {
            destination: destination.to_path_buf(),
            frames_per_second: self.fps,
            crop_rect: self
                .crop_area
                .map(|crop| [[crop.x, crop.y], [crop.width, crop.height]]),
            show_cursor: self.show_cursor || self.highlight_clicks,
            highlight_clicks: self.highlight_clicks,
            screen_id: self.screen_id,
            audio_device_id: self.audio_device_id.clone(),
            video_codec: Some(codec_tag.to_owned()),
        }
    }
}

fn parse_crop_area(crop: &serde_json::Value) -> Result<CropArea> {
    let field = |name: &str| -> Result<f64> {
        crop.get(name)
            .and_then(serde_json::Value::as_f64)
            .ok_or_else(|| RecorderError::Validation {
                reason: "Invalid `cropArea` option object".to_owned(),
                location: ErrorLocation::from(Location::caller()),
            })
    };

    Ok(CropArea {
        x: field("x")?,
        y: field("y")?,
        width: field("width")?,
        height: field("height")?,
    })
}

/// Resolved options passed to the worker process as JSON.
///
/// Field names are the wire contract; the codec travels as its four-cc tag
/// and the crop rectangle as `[[x, y], [width, height]]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerOptions {
    /// Output file path allocated by the controller.
    pub destination: PathBuf,
    /// Frames per second to capture.
    pub frames_per_second: u32,
    /// Crop rectangle as `[[x, y], [width, height]]`, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop_rect: Option<[[f64; 2]; 2]>,
    /// Render the cursor into the recording.
    pub show_cursor: bool,
    /// Highlight clicks.
    pub highlight_clicks: bool,
    /// Target screen id; 0 selects the primary screen.
    pub screen_id: u32,
    /// Audio input device id; no audio track when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_device_id: Option<String>,
    /// Four-cc tag of the resolved video codec.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,
}
