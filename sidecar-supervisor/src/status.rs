//! Fallback status responder.
//!
//! Reports the health of this process, not of the supervised service, so
//! every route answers 200 even after the service failed to start.

use std::future::Future;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;

use sidecar_core::{MountStatus, Phase, ResolvedCommand, StartError};

use crate::context::SupervisorContext;
use crate::error::{io_err, SupervisorError};
use crate::settings::StatusSettings;

#[derive(Clone)]
struct AppState {
    settings: StatusSettings,
    ctx: SupervisorContext,
}

/// JSON body served on every path except `/healthz`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    pub ok: bool,
    pub message: String,
    pub version: String,
    pub mode: String,
    pub phase: Phase,
    pub probe: Option<ResolvedCommand>,
    pub mount: Option<MountStatus>,
    pub start_error: Option<StartError>,
    pub last_exit_code: Option<i32>,
    pub pid: u32,
    /// Seconds since the run started.
    pub uptime: i64,
    pub started_at: DateTime<Utc>,
}

pub async fn status_payload(settings: &StatusSettings, ctx: &SupervisorContext) -> StatusPayload {
    let diag = ctx.snapshot().await;
    StatusPayload {
        ok: true,
        message: settings.message.clone(),
        version: settings.version.clone(),
        mode: diag.mode,
        phase: diag.phase,
        probe: diag.probe,
        mount: diag.mount,
        start_error: diag.start_error,
        last_exit_code: diag.last_exit_code,
        pid: std::process::id(),
        uptime: (Utc::now() - diag.started_at).num_seconds().max(0),
        started_at: diag.started_at,
    }
}

pub fn router(settings: StatusSettings, ctx: SupervisorContext) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .fallback(status)
        .with_state(AppState { settings, ctx })
}

async fn healthz() -> &'static str {
    "ok"
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(status_payload(&state.settings, &state.ctx).await)
}

/// Bind the configured address and serve until SIGINT or SIGTERM.
pub async fn serve(settings: StatusSettings, ctx: SupervisorContext) -> Result<(), SupervisorError> {
    let addr = settings.addr();
    let listener = TcpListener::bind(&addr).await.map_err(|e| io_err(&addr, e))?;
    tracing::info!(addr = %addr, "status responder listening");
    serve_on(listener, settings, ctx, shutdown_signal()).await
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve_on(
    listener: TcpListener,
    settings: StatusSettings,
    ctx: SupervisorContext,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), SupervisorError> {
    let addr = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| settings.addr());
    axum::serve(listener, router(settings, ctx))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| io_err(addr, e))?;
    tracing::info!("status responder stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "ctrl-c handler failed");
            std::future::pending::<()>().await;
        }
    };
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use crate::error::SupervisorError;

    use super::*;

    async fn get(addr: std::net::SocketAddr, path: &str) -> (String, String) {
        let mut stream = TcpStream::connect(addr).await.expect("connect");
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.expect("write");
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.expect("read");
        let (head, body) = raw.split_once("\r\n\r\n").expect("http response");
        (head.to_string(), body.to_string())
    }

    fn settings() -> StatusSettings {
        StatusSettings {
            host: "127.0.0.1".into(),
            port: 0,
            message: "gateway offline".into(),
            version: "1.2.3".into(),
        }
    }

    #[tokio::test]
    async fn healthz_and_status_payload() {
        let ctx = SupervisorContext::new("service");
        ctx.record_failure(&SupervisorError::ChildExit { code: 137 }).await;

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(serve_on(listener, settings(), ctx, async {
            let _ = stop_rx.await;
        }));

        let (head, body) = get(addr, "/healthz").await;
        assert!(head.starts_with("HTTP/1.1 200"), "{head}");
        assert_eq!(body, "ok");

        let (head, body) = get(addr, "/anything/else").await;
        assert!(head.starts_with("HTTP/1.1 200"), "{head}");
        assert!(head.to_ascii_lowercase().contains("application/json"));
        let payload: serde_json::Value = serde_json::from_str(&body).expect("json body");
        assert_eq!(payload["ok"], true);
        assert_eq!(payload["message"], "gateway offline");
        assert_eq!(payload["version"], "1.2.3");
        assert_eq!(payload["mode"], "service");
        assert_eq!(payload["phase"], "failed");
        assert_eq!(payload["lastExitCode"], 137);
        assert_eq!(payload["startError"]["kind"], "child_exit");
        assert_eq!(payload["pid"], std::process::id());
        assert!(payload["startedAt"].is_string());

        stop_tx.send(()).expect("server still running");
        server.await.expect("join").expect("serve");
    }
}
