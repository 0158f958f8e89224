//! HTTP bot server.
//!
//! Accepts play requests, hands them to [`VoiceDelivery`] and answers as soon
//! as playback has started.

use anyhow::{Context, Result};
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use sortconf::SortConfig;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use voicecast::{guild_or_default, FfmpegTranscoder, PlaybackRequest, VoiceDelivery};

use crate::api::{
    ApiError, BotStartResponse, BotStatus, BotStatusResponse, GuildQuery, HealthResponse,
    PlayBody, PlayResponse, VoiceChannelsResponse,
};

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub delivery: Arc<VoiceDelivery>,
    pub api_token: Option<String>,
    pub default_guild: Option<String>,
    pub max_audio_bytes: usize,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(delivery: Arc<VoiceDelivery>, config: &SortConfig) -> Self {
        Self {
            delivery,
            api_token: config.discord.api_token().map(str::to_string),
            default_guild: config.discord.default_guild().map(str::to_string),
            max_audio_bytes: config.limits.max_audio_bytes,
            start_time: Instant::now(),
        }
    }

    /// Require `Authorization: Bearer <api token>`. With no token configured
    /// every request is refused.
    fn authorize(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        let Some(token) = self.api_token.as_deref() else {
            return Err(ApiError::Unauthorized);
        };
        let presented = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        match presented {
            Some(p) if p == token => Ok(()),
            _ => Err(ApiError::Unauthorized),
        }
    }
}

pub async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        uptime_secs: state.start_time.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION"),
        session: state.delivery.status(),
    })
}

pub async fn handle_play(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<PlayBody>, axum::extract::rejection::JsonRejection>,
) -> Result<Json<PlayResponse>, ApiError> {
    state.authorize(&headers)?;
    let Json(body) = body?;

    let target = body.target()?;
    let audio = body.audio(state.max_audio_bytes)?;
    let guild = guild_or_default(body.guild_id.as_deref(), state.default_guild.as_deref())?;

    let receipt = state
        .delivery
        .play_in_guild(guild, target, PlaybackRequest::new(audio, body.file_name()))
        .await
        .inspect_err(|e| warn!("play in guild {} failed: {}", guild, e))?;

    Ok(Json(PlayResponse {
        success: true,
        channel_id: receipt.channel.to_string(),
    }))
}

pub async fn handle_voice_channels(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<GuildQuery>,
) -> Result<Json<VoiceChannelsResponse>, ApiError> {
    state.authorize(&headers)?;
    let guild = guild_or_default(query.guild_id.as_deref(), state.default_guild.as_deref())?;
    let channels = state.delivery.voice_channels(guild).await?;

    Ok(Json(VoiceChannelsResponse {
        channels: channels.into_iter().map(Into::into).collect(),
    }))
}

pub async fn handle_bot_status(State(state): State<AppState>) -> Json<BotStatusResponse> {
    Json(BotStatusResponse {
        success: true,
        status: BotStatus::from(&state.delivery.status()),
    })
}

pub async fn handle_bot_start(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(e) = state.authorize(&headers) {
        return e.into_response();
    }

    match state.delivery.start().await {
        Ok(status) => Json(BotStartResponse {
            success: true,
            message: Some(format!(
                "Bot connected as {}",
                status.identity.as_deref().unwrap_or("unknown user")
            )),
            error: None,
        })
        .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(BotStartResponse {
                success: false,
                message: None,
                error: Some(e.to_string()),
            }),
        )
            .into_response(),
    }
}

pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/play", post(handle_play))
        .route("/voice-channels", get(handle_voice_channels))
        .route("/bot/status", get(handle_bot_status))
        .route("/bot/start", post(handle_bot_start))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the bot server until SIGINT or SIGTERM.
pub async fn run(config: SortConfig) -> Result<()> {
    info!("🔮 Sortilege bot server starting");
    info!("   Bind: {}", config.bind.addr());

    if config.discord.api_token().is_none() {
        warn!("   ⚠️  No API token configured, every authenticated route will answer 401");
    }

    let (gateway, driver) = voicecast::discord::backend(config.voice.reconnect_probe());
    let transcoder = Arc::new(FfmpegTranscoder::from_config(&config.voice));
    let delivery = Arc::new(VoiceDelivery::from_config(
        &config.voice,
        gateway,
        driver,
        transcoder,
        config.discord.credential().map(str::to_string),
    ));

    if config.discord.credential().is_some() {
        let delivery = Arc::clone(&delivery);
        tokio::spawn(async move {
            match delivery.start().await {
                Ok(status) => info!(
                    "   ✅ Discord session ready as {}",
                    status.identity.as_deref().unwrap_or("unknown user")
                ),
                Err(e) => warn!("   ⚠️  Discord session not started: {}", e),
            }
        });
    } else {
        warn!("   ⚠️  No Discord bot token configured, playback will fail until one is set");
    }

    let state = AppState::new(delivery, &config);
    let app = router(state, config.limits.max_body_bytes);

    let addr = config.bind.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("🔮 Sortilege ready!");
    info!("   Play: POST http://{}/play", addr);
    info!("   Health: GET http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("Could not install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
