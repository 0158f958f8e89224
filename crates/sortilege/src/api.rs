//! HTTP request and response bodies, plus the error-to-status mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use voicecast::{ChannelInfo, SessionStatus, TargetDescriptor, VoiceError};

pub const DEFAULT_FILE_NAME: &str = "sortilege.mp3";

/// Body of `POST /play`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayBody {
    /// `current`, `list` or `custom`
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_discord_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_channel_input: Option<String>,
    pub audio_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

fn required<'a>(field: &'a Option<String>, name: &str, mode: &str) -> Result<&'a str, ApiError> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("{} is required for mode {}", name, mode)))
}

impl PlayBody {
    /// Build the delivery target from the mode-specific field.
    pub fn target(&self) -> Result<TargetDescriptor, ApiError> {
        let mode = self
            .mode
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| ApiError::BadRequest("mode is required".to_string()))?;

        match mode {
            "current" => Ok(TargetDescriptor::Current {
                user_id: required(&self.user_discord_id, "userDiscordId", mode)?.parse()?,
            }),
            "list" => Ok(TargetDescriptor::List {
                channel_id: required(&self.voice_channel_id, "voiceChannelId", mode)?.parse()?,
            }),
            "custom" => Ok(TargetDescriptor::Custom {
                raw_input: required(&self.voice_channel_input, "voiceChannelInput", mode)?
                    .to_string(),
            }),
            other => Err(ApiError::BadRequest(format!(
                "unknown mode {:?}, expected current, list or custom",
                other
            ))),
        }
    }

    /// Decode the audio payload, refusing anything over `max_bytes`.
    pub fn audio(&self, max_bytes: usize) -> Result<Bytes, ApiError> {
        let encoded = self
            .audio_base64
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| ApiError::BadRequest("audioBase64 is required".to_string()))?;

        // Decoded size is at most 3/4 of the encoded length.
        if encoded.len() / 4 * 3 > max_bytes + 2 {
            return Err(ApiError::PayloadTooLarge { limit: max_bytes });
        }

        let audio = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| ApiError::BadRequest(format!("audioBase64 is not valid base64: {}", e)))?;

        if audio.len() > max_bytes {
            return Err(ApiError::PayloadTooLarge { limit: max_bytes });
        }
        Ok(Bytes::from(audio))
    }

    pub fn file_name(&self) -> &str {
        self.file_name
            .as_deref()
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_FILE_NAME)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayResponse {
    pub success: bool,
    pub channel_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuildQuery {
    pub guild_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEntry {
    pub id: String,
    pub name: String,
}

impl From<ChannelInfo> for ChannelEntry {
    fn from(info: ChannelInfo) -> Self {
        Self {
            id: info.id.to_string(),
            name: info.name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceChannelsResponse {
    pub channels: Vec<ChannelEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub uptime_secs: u64,
    pub version: &'static str,
    pub session: SessionStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotStatus {
    pub is_ready: bool,
    pub user: Option<String>,
    pub guilds: usize,
}

impl From<&SessionStatus> for BotStatus {
    fn from(status: &SessionStatus) -> Self {
        Self {
            is_ready: status.ready,
            user: status.identity.clone(),
            guilds: status.guild_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotStatusResponse {
    pub success: bool,
    pub status: BotStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotStartResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}

/// Everything a handler can fail with.
#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    BadRequest(String),
    PayloadTooLarge { limit: usize },
    /// An extractor rejected the request before the handler ran.
    Rejected { status: StatusCode, message: String },
    Voice(VoiceError),
}

impl From<VoiceError> for ApiError {
    fn from(err: VoiceError) -> Self {
        ApiError::Voice(err)
    }
}

impl From<axum::extract::rejection::JsonRejection> for ApiError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        ApiError::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

/// HTTP status for a delivery error.
pub fn voice_status(err: &VoiceError) -> StatusCode {
    match err {
        VoiceError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
        VoiceError::ChannelNotFound(_) | VoiceError::GuildNotFound(_) => StatusCode::NOT_FOUND,
        VoiceError::UserNotInVoice { .. } | VoiceError::GuildBusy(_) => StatusCode::CONFLICT,
        VoiceError::InvalidTarget(_) => StatusCode::BAD_REQUEST,
        VoiceError::ConnectTimeout(_) | VoiceError::JoinTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        VoiceError::TranscodeError(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Rejected { status, .. } => *status,
            ApiError::Voice(e) => voice_status(e),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "unauthorized",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::PayloadTooLarge { .. } => "payload_too_large",
            ApiError::Rejected { .. } => "invalid_body",
            ApiError::Voice(e) => e.kind(),
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Unauthorized => "Unauthorized".to_string(),
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::PayloadTooLarge { limit } => {
                format!("audio exceeds the {} byte limit", limit)
            }
            ApiError::Rejected { message, .. } => message.clone(),
            ApiError::Voice(e) => e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message(),
            kind: self.kind().to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(mode: &str) -> PlayBody {
        PlayBody {
            mode: Some(mode.to_string()),
            audio_base64: Some("T2dnUw==".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_mode_fields_are_required() {
        for mode in ["current", "list", "custom"] {
            let err = body(mode).target().unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST, "mode {}", mode);
        }
        assert_eq!(PlayBody::default().target().unwrap_err().status(), StatusCode::BAD_REQUEST);
        assert_eq!(body("shout").target().unwrap_err().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_targets() {
        let mut b = body("custom");
        b.voice_channel_input = Some("General".into());
        assert_eq!(
            b.target().unwrap(),
            TargetDescriptor::Custom {
                raw_input: "General".into()
            }
        );

        let mut b = body("list");
        b.voice_channel_id = Some("not-a-snowflake".into());
        assert_eq!(b.target().unwrap_err().kind(), "invalid_target");
    }

    #[test]
    fn test_audio_decoding() {
        assert_eq!(&body("custom").audio(1024).unwrap()[..], b"OggS");

        let mut b = body("custom");
        b.audio_base64 = Some("@@not base64@@".into());
        assert_eq!(b.audio(1024).unwrap_err().status(), StatusCode::BAD_REQUEST);

        assert_eq!(
            body("custom").audio(3).unwrap_err().status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[test]
    fn test_default_file_name() {
        assert_eq!(body("custom").file_name(), DEFAULT_FILE_NAME);
    }

    #[test]
    fn test_error_statuses() {
        assert_eq!(voice_status(&VoiceError::NotReady), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            voice_status(&VoiceError::TranscodeError("x".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            voice_status(&VoiceError::MissingGuild),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
