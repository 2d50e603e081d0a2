use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, put};
use axum::Router;
use serde::Deserialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::config::MAX_WATERING_PERCENT;
use crate::state::SharedState;

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/status", get(api_status))
        .route("/api/weather", put(api_weather))
        .with_state(state)
}

async fn api_status(State(state): State<SharedState>) -> impl IntoResponse {
    let st = state.read().await;
    Json(st.to_status())
}

/// Partial update; omitted fields keep their current value.
#[derive(Debug, Deserialize)]
struct WeatherUpdate {
    rain_delay: Option<bool>,
    cold_weather_lockout: Option<bool>,
    watering_percent: Option<u32>,
}

async fn api_weather(
    State(state): State<SharedState>,
    Json(update): Json<WeatherUpdate>,
) -> Response {
    if let Some(pct) = update.watering_percent {
        if pct > MAX_WATERING_PERCENT {
            return (
                StatusCode::BAD_REQUEST,
                format!("watering_percent {pct} out of range [0, {MAX_WATERING_PERCENT}]"),
            )
                .into_response();
        }
    }

    let mut st = state.write().await;
    let mut weather = st.weather;
    if let Some(v) = update.rain_delay {
        weather.rain_delay = v;
    }
    if let Some(v) = update.cold_weather_lockout {
        weather.cold_weather_lockout = v;
    }
    if let Some(v) = update.watering_percent {
        weather.watering_percent = v;
    }
    st.set_weather(weather);
    tracing::info!(?weather, "weather overrides updated");

    Json(weather).into_response()
}

// ---------------------------------------------------------------------------
// Server entry-point
// ---------------------------------------------------------------------------

pub async fn serve(state: SharedState, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind web port {port}"))?;

    tracing::info!("status api listening on http://{addr}");

    axum::serve(listener, router(state))
        .await
        .context("web server error")
}

// ===========================================================================
// Tests
// ===========================================================================
