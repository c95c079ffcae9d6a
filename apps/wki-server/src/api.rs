use axum::{extract::State, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use wki_heuristics::{categorize, parts_hint, priority_from_text};
use wki_model::minutes_to_hours;

use crate::orchestrator::TriggerOutcome;
use crate::AppState;

const SUGGESTION_NOTE: &str = "Externe KI: Vorschlaege aus Trainingsdaten.";
const ESTIMATE_SOURCE: &str = "externes Modell";

#[derive(Debug, Deserialize)]
pub(crate) struct DescriptionRequest {
    beschreibung: String,
    #[serde(default)]
    fahrzeug: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EstimateRequest {
    #[serde(default)]
    arbeiten: Vec<String>,
}

fn epoch_secs(ts: Option<DateTime<Utc>>) -> i64 {
    ts.map_or(0, |t| t.timestamp())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn vehicle_notes(fahrzeug: Option<&str>) -> Vec<String> {
    fahrzeug
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(|f| vec![format!("Fahrzeug: {f}")])
        .unwrap_or_default()
}

pub(crate) async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.orchestrator().status();
    let snapshot = state.store().read();
    Json(json!({
        "status": "ok",
        "device": state.device(),
        "backend_url": state.locator().resolve(),
        "backend_discovery": state.locator().discovery_enabled(),
        "backend_search_active": state.locator().is_browsing(),
        "model_samples": snapshot.as_ref().map_or(0, |s| s.sample_count()),
        "trained_at": epoch_secs(snapshot.as_ref().map(|s| s.trained_at())),
        "last_id": status.cursor,
        "lookback_days": state.config().lookback_days,
        "training_in_progress": status.in_progress,
        "training_phase": status.phase,
        "last_train_request_at": epoch_secs(status.last_request_at),
        "last_train_finished_at": epoch_secs(status.last_finished_at),
        "last_outcome": status.last_outcome,
        "cached_records": status.cached_records,
        "service_port": state.config().port(),
    }))
}

pub(crate) async fn suggest_arbeiten(
    State(state): State<AppState>,
    Json(req): Json<DescriptionRequest>,
) -> impl IntoResponse {
    let view = state.inference().view();
    let priority = priority_from_text(&req.beschreibung);
    let arbeiten: Vec<Value> = view
        .suggest_similar_tasks(&req.beschreibung)
        .into_iter()
        .map(|task| {
            let estimate = view.predict_duration(&task);
            json!({
                "name": task,
                "beschreibung": task,
                "dauer_stunden": estimate.hours(),
                "prioritaet": priority,
                "kategorie": categorize(&task),
            })
        })
        .collect();
    let total: f64 = arbeiten
        .iter()
        .filter_map(|a| a["dauer_stunden"].as_f64())
        .sum();
    let parts: Vec<String> = parts_hint(&req.beschreibung)
        .into_iter()
        .map(|p| p.name)
        .collect();

    Json(json!({
        "success": true,
        "data": {
            "arbeiten": arbeiten,
            "gesamtdauer_stunden": round2(total),
            "empfehlung": SUGGESTION_NOTE,
            "hinweise": vehicle_notes(req.fahrzeug.as_deref()),
            "teile_vermutung": parts,
        }
    }))
}

pub(crate) async fn estimate_zeit(
    State(state): State<AppState>,
    Json(req): Json<EstimateRequest>,
) -> impl IntoResponse {
    let view = state.inference().view();
    let mut total = 0.0;
    let zeiten: Vec<Value> = req
        .arbeiten
        .iter()
        .map(|arbeit| {
            let estimate = view.predict_duration(arbeit);
            let hours = minutes_to_hours(estimate.minutes);
            total += hours;
            json!({
                "arbeit": arbeit,
                "dauer_stunden": hours,
                "quelle": estimate.source.as_str(),
            })
        })
        .collect();

    Json(json!({
        "success": true,
        "data": {
            "zeiten": zeiten,
            "gesamtdauer": round2(total),
            "quelle": ESTIMATE_SOURCE,
            "modell_samples": view.sample_count(),
        }
    }))
}

pub(crate) async fn teile_bedarf(Json(req): Json<DescriptionRequest>) -> impl IntoResponse {
    Json(json!({
        "success": true,
        "data": {
            "teile": parts_hint(&req.beschreibung),
            "hinweise": vehicle_notes(req.fahrzeug.as_deref()),
        }
    }))
}

pub(crate) async fn retrain(State(state): State<AppState>) -> impl IntoResponse {
    let outcome = state.orchestrator().trigger();
    info!(target: "wki::http", started = outcome.started(), "retrain requested");
    let snapshot = state.store().read();
    let message = match outcome {
        TriggerOutcome::Started => "Training gestartet",
        TriggerOutcome::AlreadyRunning => "Training läuft bereits",
    };
    Json(json!({
        "success": true,
        "started": outcome.started(),
        "message": message,
        "trained_at": epoch_secs(snapshot.as_ref().map(|s| s.trained_at())),
        "samples": snapshot.as_ref().map_or(0, |s| s.sample_count()),
    }))
}
