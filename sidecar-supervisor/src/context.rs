use std::sync::Arc;

use tokio::sync::RwLock;

use sidecar_core::{Diagnostics, MountStatus, Phase, ResolvedCommand, StartError};

use crate::error::SupervisorError;

/// Diagnostics shared between the supervisor and the fallback status responder.
///
/// Each field has exactly one writer: the probe trail is written by command
/// resolution, the mount status by the mount lifecycle, and the error/exit
/// fields by the supervisor. The responder only takes snapshots.
#[derive(Debug, Clone)]
pub struct SupervisorContext {
    inner: Arc<RwLock<Diagnostics>>,
}

impl SupervisorContext {
    pub fn new(mode: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Diagnostics::new(mode))),
        }
    }

    pub async fn snapshot(&self) -> Diagnostics {
        self.inner.read().await.clone()
    }

    pub async fn set_phase(&self, phase: Phase) {
        self.inner.write().await.phase = phase;
    }

    pub async fn record_probe(&self, resolved: ResolvedCommand) {
        self.inner.write().await.probe = Some(resolved);
    }

    pub async fn record_mount(&self, status: MountStatus) {
        self.inner.write().await.mount = Some(status);
    }

    /// Move to `Failed`, keeping the error message and cause chain.
    pub async fn record_failure(&self, err: &SupervisorError) {
        let mut diag = self.inner.write().await;
        diag.phase = Phase::Failed;
        diag.start_error = Some(StartError::from_error(err.kind(), err));
        if let SupervisorError::ChildExit { code } = err {
            diag.last_exit_code = Some(*code);
        }
    }

    pub async fn record_exit(&self, code: i32) {
        let mut diag = self.inner.write().await;
        diag.phase = Phase::Exited;
        diag.last_exit_code = Some(code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn child_exit_failure_records_code_and_message() {
        let ctx = SupervisorContext::new("service");
        ctx.record_failure(&SupervisorError::ChildExit { code: 2 }).await;

        let snapshot = ctx.snapshot().await;
        assert_eq!(snapshot.phase, Phase::Failed);
        assert_eq!(snapshot.last_exit_code, Some(2));
        let start_error = snapshot.start_error.expect("start error");
        assert_eq!(start_error.kind, "child_exit");
        assert_eq!(start_error.message, "service exited with code 2");
    }

    #[test]
    fn clones_share_state() {
        let ctx = SupervisorContext::new("probe");
        let reader = ctx.clone();
        tokio_test::block_on(ctx.set_phase(Phase::Launching));
        assert_eq!(tokio_test::block_on(reader.snapshot()).phase, Phase::Launching);
    }
}
