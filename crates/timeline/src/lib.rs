use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

mod playlist;
pub use playlist::*;
mod timecode;
pub use timecode::*;

#[derive(Debug, Error, PartialEq)]
pub enum TimelineError {
    #[error("playlist is empty")]
    Empty,
    #[error("invalid clip at index {index}: {reason}")]
    InvalidClip { index: usize, reason: String },
    #[error("position {position}ms outside timeline [0, {total}ms]")]
    OutOfRange { position: Millis, total: Millis },
    #[error("parse error: {0}")]
    Parse(String),
}

pub type Millis = i64; // global timeline position, always whole milliseconds

pub const MILLIS_PER_SEC: f64 = 1000.0;

pub fn secs_to_millis(secs: f64) -> Millis {
    (secs * MILLIS_PER_SEC).round() as Millis
}

pub fn millis_to_secs(millis: Millis) -> f64 {
    millis as f64 / MILLIS_PER_SEC
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClipId(pub String);

impl ClipId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ClipId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A recorded clip that lives on the camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub id: ClipId,
    pub duration_secs: f64,
    /// Trim point inside the recorded file.
    #[serde(default)]
    pub start_offset_secs: f64,
    #[serde(default)]
    pub muted: bool,
}

impl Clip {
    pub fn new(id: impl Into<String>, duration_secs: f64) -> Self {
        Self {
            id: ClipId::new(id),
            duration_secs,
            start_offset_secs: 0.0,
            muted: false,
        }
    }

    pub fn with_start_offset(mut self, start_offset_secs: f64) -> Self {
        self.start_offset_secs = start_offset_secs;
        self
    }

    pub fn muted(mut self, muted: bool) -> Self {
        self.muted = muted;
        self
    }

    pub fn duration_millis(&self) -> Millis {
        secs_to_millis(self.duration_secs)
    }

    fn validate(&self, index: usize) -> Result<(), TimelineError> {
        if !self.duration_secs.is_finite() || self.duration_millis() <= 0 {
            return Err(TimelineError::InvalidClip {
                index,
                reason: format!("non-positive duration {}s", self.duration_secs),
            });
        }
        if !self.start_offset_secs.is_finite() || self.start_offset_secs < 0.0 {
            return Err(TimelineError::InvalidClip {
                index,
                reason: format!("invalid start offset {}s", self.start_offset_secs),
            });
        }
        Ok(())
    }
}

/// Parse a playlist stored as a JSON array of clips.
pub fn parse_playlist(json: &str) -> Result<Vec<Clip>, TimelineError> {
    serde_json::from_str(json).map_err(|e| TimelineError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_duration_rounds_to_millis() {
        let clip = Clip::new("a", 2.0004);
        assert_eq!(clip.duration_millis(), 2000);
        let clip = Clip::new("b", 0.0005);
        assert_eq!(clip.duration_millis(), 1);
    }

    #[test]
    fn test_parse_playlist_defaults() {
        let json = r#"[
            { "id": "VID_0001", "duration_secs": 10.0 },
            { "id": "VID_0002", "duration_secs": 8.5, "start_offset_secs": 1.5, "muted": true }
        ]"#;
        let clips = parse_playlist(json).unwrap();
        assert_eq!(clips.len(), 2);
        assert_eq!(clips[0].id.as_str(), "VID_0001");
        assert_eq!(clips[0].start_offset_secs, 0.0);
        assert!(!clips[0].muted);
        assert_eq!(clips[1].start_offset_secs, 1.5);
        assert!(clips[1].muted);
    }

    #[test]
    fn test_parse_playlist_rejects_garbage() {
        assert!(matches!(
            parse_playlist("{ not json"),
            Err(TimelineError::Parse(_))
        ));
    }

    #[test]
    fn test_clip_validation() {
        assert!(Clip::new("ok", 1.0).validate(0).is_ok());
        assert!(Clip::new("zero", 0.0).validate(0).is_err());
        assert!(Clip::new("neg", -3.0).validate(0).is_err());
        assert!(Clip::new("nan", f64::NAN).validate(0).is_err());
        assert!(Clip::new("trim", 1.0)
            .with_start_offset(-0.5)
            .validate(2)
            .is_err());
    }
}
