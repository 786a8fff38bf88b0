use std::future::Future;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::backend::{SpeechFailure, SpeechSink};

struct Active {
    token: CancellationToken,
    handle: JoinHandle<()>,
    speaking: Arc<AtomicBool>,
}

/// Holds the single running utterance task of a process-based backend.
#[derive(Default)]
pub(crate) struct ProcessSlot {
    active: Option<Active>,
}

impl ProcessSlot {
    /// Tears down the running job, then starts `job` in its place.
    pub async fn replace<F, Fut>(&mut self, job: F)
    where
        F: FnOnce(CancellationToken, Arc<AtomicBool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.teardown().await;
        self.spawn(job);
    }

    /// Starts `job` without waiting for the previous one to wind down.
    ///
    /// Only safe when the previous job is already cancelled and silent.
    pub fn spawn<F, Fut>(&mut self, job: F)
    where
        F: FnOnce(CancellationToken, Arc<AtomicBool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if let Some(previous) = self.active.take() {
            previous.token.cancel();
        }
        let token = CancellationToken::new();
        let speaking = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(job(token.clone(), Arc::clone(&speaking)));
        self.active = Some(Active {
            token,
            handle,
            speaking,
        });
    }

    pub async fn teardown(&mut self) {
        if let Some(active) = self.active.take() {
            active.token.cancel();
            if let Err(err) = active.handle.await {
                warn!(%err, "speech task ended abnormally");
            }
        }
    }

    pub fn cancel(&mut self) {
        if let Some(active) = &self.active {
            active.token.cancel();
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.speaking.load(Ordering::SeqCst))
    }
}

impl Drop for ProcessSlot {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.token.cancel();
            active.handle.abort();
        }
    }
}

/// Runs `command` to completion, reporting start, end, and failures through `sink`.
///
/// Cancellation kills the process and reports nothing. A process that dies
/// from a signal it did not get from us counts as an interruption.
pub(crate) async fn run_to_end(
    mut command: Command,
    sink: SpeechSink,
    speaking: Arc<AtomicBool>,
    token: CancellationToken,
) {
    let program = command.as_std().get_program().to_string_lossy().into_owned();
    let spawned = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn();
    let mut child = match spawned {
        Ok(child) => child,
        Err(err) => {
            sink.failed(SpeechFailure::Error(format!("could not start {program}: {err}")));
            return;
        }
    };

    speaking.store(true, Ordering::SeqCst);
    sink.started();
    debug!(%program, pid = ?child.id(), "speech process started");

    tokio::select! {
        status = child.wait() => {
            speaking.store(false, Ordering::SeqCst);
            match status {
                Ok(status) if status.success() => sink.finished(),
                Ok(status) if status.code().is_none() => sink.failed(SpeechFailure::Interrupted),
                Ok(status) => sink.failed(SpeechFailure::Error(format!("{program} exited with {status}"))),
                Err(err) => sink.failed(SpeechFailure::Error(err.to_string())),
            }
        }
        _ = token.cancelled() => {
            if let Err(err) = child.kill().await {
                warn!(%program, %err, "could not stop speech process");
            }
            speaking.store(false, Ordering::SeqCst);
        }
    }
}
