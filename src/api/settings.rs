//! Wyoming settings endpoints
//!
//! Settings mutation is validated against the backends' enumerations and
//! applied as one atomic snapshot swap; a failed validation mutates nothing.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use super::ApiState;
use crate::config::Settings;
use crate::workers::VoiceInfo;

/// Partial settings update; absent fields keep their current values
#[derive(Debug, Deserialize)]
pub struct SettingsUpdate {
    pub voice: Option<String>,
    pub language: Option<String>,
    pub sentence_pause: Option<f64>,
    pub synthesis_timeout: Option<f64>,
}

/// Mutation outcome
#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub status: &'static str,
    pub message: String,
}

/// Get the current settings snapshot
async fn get_settings(State(state): State<Arc<ApiState>>) -> Json<Settings> {
    Json((*state.settings.snapshot().await).clone())
}

/// Apply a settings update after validating voice and language
async fn post_settings(
    State(state): State<Arc<ApiState>>,
    Json(update): Json<SettingsUpdate>,
) -> (StatusCode, Json<SettingsResponse>) {
    if let Some(voice) = &update.voice {
        let known = state.synthesizer.voices().await;
        if !known.iter().any(|v| &v.id == voice) {
            return (
                StatusCode::BAD_REQUEST,
                Json(SettingsResponse {
                    status: "error",
                    message: format!("unknown voice: {voice}"),
                }),
            );
        }
    }
    if let Some(language) = &update.language {
        let known = state.transcriber.languages().await;
        if !known.iter().any(|l| l.eq_ignore_ascii_case(language)) {
            return (
                StatusCode::BAD_REQUEST,
                Json(SettingsResponse {
                    status: "error",
                    message: format!("unknown language: {language}"),
                }),
            );
        }
    }
    if let Some(pause) = update.sentence_pause {
        if !(0.0..=10.0).contains(&pause) {
            return (
                StatusCode::BAD_REQUEST,
                Json(SettingsResponse {
                    status: "error",
                    message: format!("sentence_pause out of range: {pause}"),
                }),
            );
        }
    }
    if let Some(timeout) = update.synthesis_timeout {
        if timeout <= 0.0 {
            return (
                StatusCode::BAD_REQUEST,
                Json(SettingsResponse {
                    status: "error",
                    message: format!("synthesis_timeout must be positive: {timeout}"),
                }),
            );
        }
    }

    let mut settings = (*state.settings.snapshot().await).clone();
    if let Some(voice) = update.voice {
        settings.voice = Some(voice);
    }
    if let Some(language) = update.language {
        settings.language = Some(language);
    }
    if let Some(pause) = update.sentence_pause {
        settings.sentence_pause = pause;
    }
    if let Some(timeout) = update.synthesis_timeout {
        settings.synthesis_timeout = timeout;
    }
    state.settings.apply(settings).await;
    tracing::info!("wyoming settings updated");

    (
        StatusCode::OK,
        Json(SettingsResponse {
            status: "ok",
            message: "settings updated".to_string(),
        }),
    )
}

/// List the synthesizer's voices
async fn list_voices(State(state): State<Arc<ApiState>>) -> Json<Vec<VoiceInfo>> {
    Json(state.synthesizer.voices().await)
}

/// List the transcriber's languages
async fn list_languages(State(state): State<Arc<ApiState>>) -> Json<Vec<String>> {
    Json(state.transcriber.languages().await)
}

/// Build settings router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/wyoming/settings", get(get_settings).post(post_settings))
        .route("/api/wyoming/tts/voices", get(list_voices))
        .route("/api/wyoming/stt/languages", get(list_languages))
        .with_state(state)
}
