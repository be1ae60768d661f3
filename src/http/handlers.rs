//! Demo endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{Days, Local, NaiveDate};
use rand::Rng;
use serde::Serialize;

use crate::config::ConfigStore;
use crate::performance::HandlerFailed;

const SUMMARIES: [&str; 10] = [
    "Freezing",
    "Bracing",
    "Chilly",
    "Cool",
    "Mild",
    "Warm",
    "Balmy",
    "Hot",
    "Sweltering",
    "Scorching",
];

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ConfigStore>,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub name: String,
    pub environment: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeatherForecast {
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    pub temperature_c: i32,
    pub temperature_f: i32,
    pub summary: &'static str,
}

impl WeatherForecast {
    fn random(date: NaiveDate, city: Option<&str>) -> Self {
        let mut rng = rand::thread_rng();
        let temperature_c = rng.gen_range(-20..55);
        Self {
            date,
            city: city.map(str::to_string),
            temperature_c,
            temperature_f: 32 + (f64::from(temperature_c) / 0.5556) as i32,
            summary: SUMMARIES[rng.gen_range(0..SUMMARIES.len())],
        }
    }
}

/// Handler error. Rendered as a 500 and marked as a failed handler.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("forecast service unavailable")]
    Unavailable,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response();
        response.extensions_mut().insert(HandlerFailed);
        response
    }
}

pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    let app = state.store.app();
    Json(HealthStatus {
        status: "ok",
        name: app.name.clone(),
        environment: app.environment.clone(),
    })
}

pub async fn forecasts() -> Json<Vec<WeatherForecast>> {
    tracing::info!("Generating forecasts");
    Json(next_days(None))
}

pub async fn city_forecasts(Path(city): Path<String>) -> Json<Vec<WeatherForecast>> {
    tracing::info!(city = %city, "Generating forecasts for {{city}}");
    Json(next_days(Some(&city)))
}

pub async fn fail() -> Result<Json<Vec<WeatherForecast>>, ApiError> {
    let error = ApiError::Unavailable;
    tracing::error!(error = %error, "Forecast request failed");
    Err(error)
}

pub async fn panicking() -> Json<Vec<WeatherForecast>> {
    panic!("forecast handler panicked");
}

/// Forecasts after an artificial delay, for exercising request timeouts.
pub async fn delayed(Path(millis): Path<u64>) -> Json<Vec<WeatherForecast>> {
    tracing::info!(delay_ms = millis, "Delaying forecasts by {{delay_ms}} ms");
    tokio::time::sleep(std::time::Duration::from_millis(millis)).await;
    Json(next_days(None))
}

fn next_days(city: Option<&str>) -> Vec<WeatherForecast> {
    let today = Local::now().date_naive();
    (1..=5)
        .filter_map(|offset| today.checked_add_days(Days::new(offset)))
        .map(|date| WeatherForecast::random(date, city))
        .collect()
}
