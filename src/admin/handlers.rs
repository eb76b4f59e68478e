use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::admin::AdminState;
use crate::resilience::CircuitSnapshot;
use crate::targets::{Credentials, TlsMode};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub targets: usize,
}

/// Target summary for introspection. Never includes credential material.
#[derive(Serialize)]
pub struct TargetStatus {
    pub id: String,
    pub address: String,
    pub scheme: &'static str,
    pub enabled: bool,
    pub credential_kind: &'static str,
    pub tls_mode: &'static str,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        targets: state.app.registry.len(),
    })
}

pub async fn get_targets(State(state): State<AdminState>) -> Json<Vec<TargetStatus>> {
    let targets = state
        .app
        .registry
        .list()
        .iter()
        .map(|t| TargetStatus {
            id: t.id.clone(),
            address: t.address.clone(),
            scheme: t.scheme.as_str(),
            enabled: t.enabled,
            credential_kind: match t.credentials {
                Credentials::Basic { .. } => "basic",
                Credentials::Session { .. } => "session",
            },
            tls_mode: match t.tls.mode {
                TlsMode::SystemRoots => "system",
                TlsMode::CustomCa { .. } => "custom_ca",
                TlsMode::InsecureSkipVerify => "insecure_skip_verify",
            },
        })
        .collect();

    Json(targets)
}

pub async fn get_circuits(State(state): State<AdminState>) -> Json<Vec<CircuitSnapshot>> {
    Json(state.app.circuits.snapshot())
}
