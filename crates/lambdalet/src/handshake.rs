//! Readiness handshake: one-shot SIGUSR2 from worker to supervisor.
//!
//! The worker is spawned with the supervisor's pid and signals it once its
//! listener socket is bound. Readiness is binary; the signal carries no
//! payload. There is deliberately no timeout here: a worker that never
//! signals is detected through its own exit, never a timer.

use std::io;

use tokio::signal::unix::{Signal, SignalKind, signal};

/// The signal a worker sends once its listener is open.
pub const READY_SIGNAL: SignalKind = SignalKind::user_defined2();

/// One-shot readiness listener.
///
/// Must be registered before the worker is spawned so the signal cannot be
/// lost. Consumed by `wait`, which drops the stream on fire, so no listener
/// leaks across respawns.
pub struct ReadySignal {
    stream: Signal,
}

impl ReadySignal {
    pub fn register() -> io::Result<Self> {
        Ok(Self {
            stream: signal(READY_SIGNAL)?,
        })
    }

    /// Wait for the first delivery, then deregister.
    ///
    /// If the signal stream closes without a delivery the future stays
    /// pending; the supervisor's child-exit arm is the failure path.
    pub async fn wait(mut self) {
        if self.stream.recv().await.is_none() {
            // Stream closed: no signal can ever arrive, so park instead of
            // reporting a readiness that never happened.
            std::future::pending::<()>().await;
        }
    }
}

/// Signal delivery is process-wide, so tests that send or await SIGUSR2
/// must not interleave: a stand-in worker from one test would trip another
/// test's listener. Every such test holds this lock for its duration.
#[cfg(test)]
pub(crate) fn signal_test_guard() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn fires_on_sigusr2() {
        let _signals = signal_test_guard();
        let ready = ReadySignal::register().unwrap();

        let pid = std::process::id();
        tokio::process::Command::new("sh")
            .arg("-c")
            .arg(format!("kill -USR2 {pid}"))
            .status()
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), ready.wait())
            .await
            .expect("readiness signal never arrived");
    }
}
