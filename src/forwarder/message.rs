//! Wire shape for forwarded frames

use serde::{Deserialize, Serialize};

use crate::types::SampleFrame;
use crate::{Result, StreamError};

/// One forwarded frame: `{"sequence": 12, "channels": [10.5, -3.2, ...]}`.
///
/// Channel values are microvolts in channel-index order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardMessage {
    pub sequence: u32,
    pub channels: Vec<f64>,
}

impl From<&SampleFrame> for ForwardMessage {
    fn from(frame: &SampleFrame) -> Self {
        Self { sequence: frame.sequence(), channels: frame.microvolts() }
    }
}

impl ForwardMessage {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| StreamError::Parse {
            context: "forward message".to_string(),
            details: e.to_string(),
        })
    }

    /// JSON followed by a newline, the framing used by [`JsonLinesSink`](super::JsonLinesSink).
    pub fn to_json_line(&self) -> Result<String> {
        let mut line = self.to_json()?;
        line.push('\n');
        Ok(line)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text.trim_end()).map_err(|e| StreamError::Parse {
            context: "forward message".to_string(),
            details: e.to_string(),
        })
    }
}
