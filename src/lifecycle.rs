//! Running the assembled service until told to stop
//!
//! The service serves on a background task. The controller waits for either
//! a termination signal or that task ending on its own, then stops the
//! service exactly once whichever came first.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::logging::Logger;
use crate::service::RunnableService;

/// How long the background task gets to wind down once stopped
const STOP_GRACE_PERIOD: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownTrigger {
    /// The operating environment asked us to terminate
    Signal(String),
    /// The service stopped serving without being asked to
    ServiceExited,
}

impl fmt::Display for ShutdownTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownTrigger::Signal(signal) => write!(f, "signal {}", signal),
            ShutdownTrigger::ServiceExited => f.write_str("service exited"),
        }
    }
}

#[derive(Debug)]
pub struct Shutdown {
    pub trigger: ShutdownTrigger,
    pub stop_result: Result<()>,
}

pub struct Lifecycle {
    log: Logger,
    state: Mutex<LifecycleState>,
    cancellation: CancellationToken,
    stopped: AtomicBool,
}

impl Lifecycle {
    pub fn new(log: Logger) -> Self {
        Self {
            log,
            state: Mutex::new(LifecycleState::Starting),
            cancellation: CancellationToken::new(),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> LifecycleState {
        match self.state.lock() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn transition(&self, next: LifecycleState) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        debug!(parent: self.log.span(), from = ?*state, to = ?next, "Lifecycle transition");
        *state = next;
    }

    /// Token fired once shutdown has been requested, from any source
    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Start `service` and block until `termination` resolves or the service exits
    pub async fn run<F>(&self, service: Arc<dyn RunnableService>, termination: F) -> Shutdown
    where
        F: Future<Output = String> + Send,
    {
        self.transition(LifecycleState::Starting);

        let background = tokio::spawn({
            let service = Arc::clone(&service);
            let log = self.log.clone();
            let exited = self.cancellation.clone().drop_guard();
            async move {
                let _exited = exited;
                info!(parent: log.span(), url = %service.url(), "Starting HTTP service");
                if let Err(e) = service.start().await {
                    error!(parent: log.span(), error = %e, "Failed to start HTTP server");
                }
            }
        });

        self.transition(LifecycleState::Running);

        let trigger = tokio::select! {
            signal = termination => {
                info!(parent: self.log.span(), signal = %signal, "Caught signal");
                ShutdownTrigger::Signal(signal)
            }
            _ = self.cancellation.cancelled() => ShutdownTrigger::ServiceExited,
        };
        self.cancellation.cancel();

        self.transition(LifecycleState::Stopping);
        let stop_result = self.stop_once(service.as_ref()).await.unwrap_or(Ok(()));
        match &stop_result {
            Ok(()) => info!(parent: self.log.span(), "HTTP server stopped with success"),
            Err(e) => error!(parent: self.log.span(), error = %e, "Failed to stop HTTP server"),
        }

        if tokio::time::timeout(STOP_GRACE_PERIOD, background)
            .await
            .is_err()
        {
            warn!(parent: self.log.span(), "HTTP service didn't wind down in time");
        }

        self.transition(LifecycleState::Stopped);
        Shutdown {
            trigger,
            stop_result,
        }
    }

    /// Stop the service unless it already has been
    async fn stop_once(&self, service: &dyn RunnableService) -> Option<Result<()>> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(service.stop().await)
    }
}

/// Run `service` until `termination` resolves or the service exits
pub async fn run<F>(service: Arc<dyn RunnableService>, log: Logger, termination: F) -> Shutdown
where
    F: Future<Output = String> + Send,
{
    Lifecycle::new(log).run(service, termination).await
}

/// Wait for SIGINT, SIGTERM or SIGQUIT and return the signal name
#[cfg(unix)]
pub async fn wait_for_termination() -> String {
    use tokio::signal::unix::{signal, SignalKind};

    match (signal(SignalKind::terminate()), signal(SignalKind::quit())) {
        (Ok(mut terminate), Ok(mut quit)) => {
            tokio::select! {
                _ = interrupted() => "SIGINT".to_string(),
                _ = terminate.recv() => "SIGTERM".to_string(),
                _ = quit.recv() => "SIGQUIT".to_string(),
            }
        }
        _ => {
            warn!("Couldn't listen to SIGTERM and SIGQUIT, only SIGINT will stop the service");
            interrupted().await;
            "SIGINT".to_string()
        }
    }
}

/// Wait for ctrl+c
#[cfg(not(unix))]
pub async fn wait_for_termination() -> String {
    interrupted().await;
    "SIGINT".to_string()
}

async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Couldn't listen to SIGINT: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::oneshot;

    /// Serves until stopped, or fails straight away
    struct FakeService {
        fail_start: bool,
        fail_stop: bool,
        stopped: CancellationToken,
        stops: AtomicUsize,
    }

    impl FakeService {
        fn new(fail_start: bool, fail_stop: bool) -> Arc<Self> {
            Arc::new(Self {
                fail_start,
                fail_stop,
                stopped: CancellationToken::new(),
                stops: AtomicUsize::new(0),
            })
        }

        fn stops(&self) -> usize {
            self.stops.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RunnableService for FakeService {
        async fn start(&self) -> Result<()> {
            if self.fail_start {
                return Err(Error::Server("address already in use".into()));
            }
            self.stopped.cancelled().await;
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.stopped.cancel();
            if self.fail_stop {
                return Err(Error::Server("couldn't close listener".into()));
            }
            Ok(())
        }

        fn url(&self) -> String {
            "http://127.0.0.1:1789".to_string()
        }
    }

    #[tokio::test]
    async fn test_signal_stops_service_once() {
        let service = FakeService::new(false, false);
        let lifecycle = Lifecycle::new(Logger::root("test"));
        let (tx, rx) = oneshot::channel::<()>();

        tx.send(()).unwrap();
        let shutdown = lifecycle
            .run(service.clone(), async move {
                rx.await.ok();
                "SIGTERM".to_string()
            })
            .await;

        assert_eq!(shutdown.trigger, ShutdownTrigger::Signal("SIGTERM".into()));
        assert!(shutdown.stop_result.is_ok());
        assert_eq!(service.stops(), 1);
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
        assert!(lifecycle.cancellation().is_cancelled());
    }

    #[tokio::test]
    async fn test_runs_until_terminated() {
        let service = FakeService::new(false, false);
        let lifecycle = Lifecycle::new(Logger::root("test"));
        let (tx, rx) = oneshot::channel::<()>();

        let mut running = tokio_test::task::spawn(lifecycle.run(service.clone(), async move {
            rx.await.ok();
            "SIGINT".to_string()
        }));
        tokio_test::assert_pending!(running.poll());
        assert_eq!(lifecycle.state(), LifecycleState::Running);
        assert_eq!(service.stops(), 0);

        tx.send(()).unwrap();
        let shutdown = running.await;
        assert_eq!(shutdown.trigger, ShutdownTrigger::Signal("SIGINT".into()));
        assert_eq!(service.stops(), 1);
    }

    #[tokio::test]
    async fn test_start_failure_triggers_shutdown() {
        let service = FakeService::new(true, false);

        let shutdown = run(
            service.clone(),
            Logger::root("test"),
            std::future::pending::<String>(),
        )
        .await;

        assert_eq!(shutdown.trigger, ShutdownTrigger::ServiceExited);
        assert_eq!(service.stops(), 1);
    }

    #[tokio::test]
    async fn test_stop_failure_is_reported() {
        let service = FakeService::new(false, true);

        let shutdown = run(service.clone(), Logger::root("test"), async {
            "SIGINT".to_string()
        })
        .await;

        assert!(matches!(shutdown.stop_result, Err(Error::Server(_))));
        assert_eq!(service.stops(), 1);
    }

    #[tokio::test]
    async fn test_stop_guard() {
        let service = FakeService::new(false, false);
        let lifecycle = Lifecycle::new(Logger::root("test"));

        assert!(lifecycle.stop_once(service.as_ref()).await.is_some());
        assert!(lifecycle.stop_once(service.as_ref()).await.is_none());
        assert_eq!(service.stops(), 1);
    }

    #[test]
    fn test_trigger_display() {
        assert_eq!(
            ShutdownTrigger::Signal("SIGQUIT".into()).to_string(),
            "signal SIGQUIT"
        );
        assert_eq!(ShutdownTrigger::ServiceExited.to_string(), "service exited");
    }
}
