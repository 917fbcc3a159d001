//! Health and metrics endpoints.

use crate::state::{AppMetrics, AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// ## Endpoint: `GET /health` and `GET /api/v1/health`
///
/// Reports uptime, process memory, request totals and the size of the two
/// in-memory registries (translation routes and conversations).
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = &state.config;
    let services = &state.services;

    let cached_routes = services.translation.cached_routes().await;
    let active_conversations = services.dialog.session_count().await;

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "metrics": overall_metrics(&metrics),
        "memory": get_memory_info(),
        "translation": {
            "cached_routes": cached_routes,
            "model_template": config.translation.model_template,
            "pivot_language": config.translation.pivot_language,
            "device": config.models.device
        },
        "dialog": {
            "active_conversations": active_conversations,
            "max_turns": config.dialog.max_turns
        },
        "models": {
            "quiz": config.models.quiz_model,
            "dialog": config.models.dialog_model,
            "speech_to_text": config.models.stt_model,
            "vocoder": config.models.tts_vocoder,
            "similarity": config.models.similarity_model
        }
    }))
}

/// ## Endpoint: `GET /api/v1/metrics`
pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let mut endpoint_stats: Vec<_> = metrics
        .endpoint_metrics
        .iter()
        .map(|(endpoint, metric)| {
            json!({
                "endpoint": endpoint,
                "request_count": metric.request_count,
                "error_count": metric.error_count,
                "error_rate": metric.error_rate(),
                "average_duration_ms": metric.average_duration_ms(),
                "total_duration_ms": metric.total_duration_ms
            })
        })
        .collect();
    endpoint_stats.sort_by(|a, b| a["endpoint"].as_str().cmp(&b["endpoint"].as_str()));

    let mut overall = overall_metrics(&metrics);
    overall["requests_per_second"] = json!(if uptime_seconds > 0 {
        metrics.request_count as f64 / uptime_seconds as f64
    } else {
        0.0
    });

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": overall,
        "endpoints": endpoint_stats,
        "memory": get_memory_info()
    }))
}

fn overall_metrics(metrics: &AppMetrics) -> serde_json::Value {
    json!({
        "total_requests": metrics.request_count,
        "total_errors": metrics.error_count,
        "error_rate": metrics.error_rate(),
        "in_flight": metrics.in_flight
    })
}

/// Resident and virtual memory of this process, from `/proc` where available.
fn get_memory_info() -> serde_json::Value {
    match read_proc_memory() {
        Some((resident, virtual_size)) => json!({
            "resident_memory_bytes": resident,
            "virtual_memory_bytes": virtual_size,
            "available": true
        }),
        None => json!({
            "resident_memory_bytes": 0,
            "virtual_memory_bytes": 0,
            "available": false,
            "note": "Memory info not available on this platform"
        }),
    }
}

fn read_proc_memory() -> Option<(u64, u64)> {
    let status = std::fs::read_to_string(format!("/proc/{}/status", std::process::id())).ok()?;
    Some((proc_field_bytes(&status, "VmRSS:"), proc_field_bytes(&status, "VmSize:")))
}

/// Parse a `Name:   1234 kB` line into bytes.
fn proc_field_bytes(status: &str, field: &str) -> u64 {
    status
        .lines()
        .find_map(|line| line.strip_prefix(field))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse::<u64>().ok())
        .map_or(0, |kb| kb * 1024)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing;
    use actix_web::{test as actix_test, App};

    #[test]
    fn parses_proc_status_fields() {
        let status = "Name:\tlearn\nVmSize:\t  2048 kB\nVmRSS:\t   512 kB\n";
        assert_eq!(proc_field_bytes(status, "VmRSS:"), 512 * 1024);
        assert_eq!(proc_field_bytes(status, "VmSize:"), 2048 * 1024);
        assert_eq!(proc_field_bytes(status, "VmSwap:"), 0);
    }

    #[actix_web::test]
    async fn health_reports_registries() {
        let dir = tempfile::tempdir().unwrap();
        let state = web::Data::new(testing::state(dir.path()));
        state
            .services
            .translation
            .translate_text("dog", "en", "vi")
            .await
            .unwrap();

        let app = actix_test::init_service(
            App::new()
                .app_data(state.clone())
                .route("/health", web::get().to(health_check)),
        )
        .await;

        let body: serde_json::Value =
            actix_test::call_and_read_body_json(&app, actix_test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["translation"]["cached_routes"], 1);
        assert_eq!(body["dialog"]["active_conversations"], 0);
    }
}
