//! Messages JSON envoyés au récepteur Cast.

use serde::Serialize;

pub const MEDIA_NAMESPACE: &str = "urn:x-cast:com.google.cast.media";

#[derive(Debug, Clone, Serialize)]
pub struct CastMessage {
    pub namespace: &'static str,
    pub payload: LoadPayload,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadPayload {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub media: MediaInfo,
    pub request_id: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInfo {
    pub content_id: String,
    pub stream_type: &'static str,
    pub content_type: String,
}

impl CastMessage {
    /// Demande de chargement d'un média en lecture bufferisée
    pub fn load(content_id: &str, content_type: &str, request_id: u32) -> Self {
        Self {
            namespace: MEDIA_NAMESPACE,
            payload: LoadPayload {
                kind: "LOAD",
                media: MediaInfo {
                    content_id: content_id.to_string(),
                    stream_type: "BUFFERED",
                    content_type: content_type.to_string(),
                },
                request_id,
            },
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
