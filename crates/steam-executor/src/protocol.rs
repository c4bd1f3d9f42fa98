//! The JSON messages exchanged with Steam over the control channel.
//!
//! Every message is a flat JSON object carrying its identifier in `_id`
//! and its kind in `_type`. A reply reuses the identifier of the message it
//! answers with the [`RESPONSE_SUFFIX`] appended.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ExecutorError, ExecutorResult};

pub const RESPONSE_SUFFIX: &str = "_response";

/// Returns the identifier Steam uses when replying to the message with the given identifier.
pub fn response_id(request_id: &str) -> String {
    format!("{request_id}{RESPONSE_SUFFIX}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_type")]
pub enum SteamMessage {
    #[serde(rename = "startXGBoostCluster")]
    StartCluster {
        #[serde(rename = "_id")]
        id: String,
    },
    #[serde(rename = "xgboostClusterStartNotification")]
    StartNotification {
        #[serde(rename = "_id")]
        id: String,
        status: StartStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        uri: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    #[serde(rename = "stopXGBoostClusterNotification")]
    StopNotification {
        #[serde(rename = "_id")]
        id: String,
    },
    #[serde(rename = "stopXGBoostClusterConfirmation")]
    StopConfirmation {
        #[serde(rename = "_id")]
        id: String,
        #[serde(with = "string_bool")]
        allowed: bool,
    },
}

impl SteamMessage {
    pub fn from_json(text: &str) -> ExecutorResult<Self> {
        serde_json::from_str(text).map_err(|e| ExecutorError::InvalidMessage(e.to_string()))
    }

    pub fn to_json(&self) -> ExecutorResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn id(&self) -> &str {
        match self {
            SteamMessage::StartCluster { id }
            | SteamMessage::StartNotification { id, .. }
            | SteamMessage::StopNotification { id }
            | SteamMessage::StopConfirmation { id, .. } => id,
        }
    }

    /// The `_type` of the message on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            SteamMessage::StartCluster { .. } => "startXGBoostCluster",
            SteamMessage::StartNotification { .. } => "xgboostClusterStartNotification",
            SteamMessage::StopNotification { .. } => "stopXGBoostClusterNotification",
            SteamMessage::StopConfirmation { .. } => "stopXGBoostClusterConfirmation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartStatus {
    Starting,
    Started,
    Failed,
}

impl fmt::Display for StartStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartStatus::Starting => write!(f, "starting"),
            StartStatus::Started => write!(f, "started"),
            StartStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Steam encodes boolean flags as the strings `"true"` and `"false"`.
mod string_bool {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &bool, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(if *value { "true" } else { "false" })
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        match value.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "invalid boolean string: {other}"
            ))),
        }
    }
}
