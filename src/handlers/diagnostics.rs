use crate::{models::{DiagnosticsResponse, ErrorResponse}, state::AppState};
use axum::{extract::State, http::StatusCode, Json};
use std::sync::{Mutex, OnceLock};
use sysinfo::System;
use tracing::{info, warn};

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

#[derive(Debug, Default, Clone, Copy)]
struct HostSample {
    cpu_usage: f32,
    memory_used: u64,
    memory_free: u64,
    memory_total: u64,
}

/// Host-wide CPU and memory figures. The first call primes the monitor, so
/// its CPU reading is zero.
fn sample_host() -> HostSample {
    let monitor = SYSTEM_MONITOR.get_or_init(|| Mutex::new(System::new_all()));
    let Ok(mut sys) = monitor.lock() else {
        warn!("System monitor lock poisoned, reporting empty host sample");
        return HostSample::default();
    };
    sys.refresh_cpu();
    sys.refresh_memory();
    HostSample {
        cpu_usage: sys.global_cpu_info().cpu_usage(),
        memory_used: sys.used_memory(),
        memory_free: sys.free_memory(),
        memory_total: sys.total_memory(),
    }
}

/// Relay occupancy plus host load
pub async fn diagnostics(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<DiagnosticsResponse>), (StatusCode, Json<ErrorResponse>)> {
    let Some(stats) = state.hub.stats().await else {
        return Err(ErrorResponse::reply(StatusCode::SERVICE_UNAVAILABLE, "Relay hub is not running"));
    };
    let host = sample_host();

    info!(
        "Diagnostics: CPU: {:.2}%, Mem: {}/{} MB, Conn: {}, Rooms: {}, Awareness clients: {}",
        host.cpu_usage,
        host.memory_used / 1024 / 1024,
        host.memory_total / 1024 / 1024,
        stats.connections,
        stats.rooms,
        stats.awareness_clients
    );

    Ok((
        StatusCode::OK,
        Json(DiagnosticsResponse {
            service: state.config.service_name.clone(),
            environment: state.config.environment.clone(),
            n_conn: stats.connections as u32,
            n_rooms: stats.rooms as u32,
            n_awareness_clients: stats.awareness_clients as u32,
            cpu_usage: host.cpu_usage,
            memory_alloc: host.memory_used,
            memory_total: host.memory_total,
            memory_free: host.memory_free,
        }),
    ))
}
