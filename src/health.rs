use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

use crate::modules::{
    confinement::supervisor::ConfinementSupervisor, presence::store::PresenceStore,
};

#[derive(Clone, Debug)]
pub struct HealthState {
    pub presence: Arc<PresenceStore>,
    pub supervisor: Arc<ConfinementSupervisor>,
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn root_handler() -> &'static str {
    "warden is running"
}

async fn health_handler(State(state): State<HealthState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "confined": state.supervisor.active().await.len(),
        "tracked": state.presence.len().await,
    }))
}

/// Serves the liveness endpoint until the process exits. Bind failures are
/// logged and leave the bot running.
pub async fn serve(port: u16, state: HealthState) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind health endpoint on {}: {}", addr, e);
            return;
        }
    };

    info!("Health endpoint listening on {}", addr);
    if let Err(e) = axum::serve(listener, router(state)).await {
        error!("Health endpoint stopped: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::confinement::transport::mock::MockTransport;
    use chrono::Utc;

    #[tokio::test]
    async fn health_reports_counts() {
        let presence = Arc::new(PresenceStore::new(chrono::Duration::hours(12)));
        let transport = Arc::new(MockTransport::default());
        let supervisor = ConfinementSupervisor::new(transport, presence.clone(), "holding");
        presence.record_connect(1, "alice".into(), Utc::now()).await;

        let Json(body) = health_handler(State(HealthState {
            presence,
            supervisor,
        }))
        .await;

        assert_eq!(body["status"], "ok");
        assert_eq!(body["confined"], 0);
        assert_eq!(body["tracked"], 1);
    }
}
