use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// A long-running worker process: takes the shared cancellation token and
/// runs until cancelled or failed.
pub type Process = Box<
    dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
        + Send,
>;

/// Cleanup function executed after all processes stopped.
pub type Closer = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send>;

/// Runs named worker processes concurrently with graceful shutdown.
///
/// All processes share one cancellation token. A SIGINT/SIGTERM or the
/// first failing process cancels the rest; closers run afterwards under a
/// timeout regardless of outcome, and the process exits with a code
/// reflecting the first error.
pub struct Runner {
    processes: Vec<(String, Process)>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    cancellation_token: CancellationToken,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    pub fn new() -> Self {
        Self {
            processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn with_named_process(mut self, name: impl Into<String>, process: Process) -> Self {
        self.processes.push((name.into(), process));
        self
    }

    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Runs everything to completion and exits the process.
    pub async fn run(self) {
        let token = self.cancellation_token;
        let mut workers = JoinSet::new();

        for (name, process) in self.processes {
            let process_token = token.clone();
            workers.spawn(async move {
                let result = process(process_token).await;
                (name, result)
            });
        }

        spawn_signal_handlers(token.clone());

        let mut first_error = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((name, Ok(()))) => {
                    debug!(process = %name, "worker process completed");
                }
                Ok((name, Err(e))) => {
                    if !token.is_cancelled() {
                        error!(process = %name, error = ?e, "worker process failed");
                        first_error = Some(e);
                        token.cancel();
                    } else {
                        error!(process = %name, error = ?e, "worker process failed during shutdown");
                    }
                }
                Err(e) => {
                    error!("worker process panicked: {}", e);
                    if !token.is_cancelled() {
                        token.cancel();
                    }
                }
            }
        }

        if !self.closers.is_empty() {
            info!("Running closers with timeout of {:?}", self.closer_timeout);

            match tokio::time::timeout(self.closer_timeout, run_closers(self.closers)).await {
                Ok(()) => info!("All closers completed"),
                Err(_) => error!("Closers timed out after {:?}", self.closer_timeout),
            }
        }

        if let Some(e) = first_error {
            error!("Application exiting with error: {:#}", e);
            std::process::exit(1);
        } else {
            info!("Application exiting normally");
            std::process::exit(0);
        }
    }
}

fn spawn_signal_handlers(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal");
                ctrl_c_token.cancel();
            }
            Err(e) => {
                error!("Error setting up signal handler: {}", e);
            }
        }
    });

    #[cfg(unix)]
    {
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    info!("Received SIGTERM signal");
                    token.cancel();
                }
                Err(e) => {
                    error!("Error setting up SIGTERM handler: {}", e);
                }
            }
        });
    }
}

async fn run_closers(closers: Vec<Closer>) {
    let mut closer_set = JoinSet::new();

    for closer in closers {
        closer_set.spawn(async move { closer().await });
    }

    while let Some(joined) = closer_set.join_next().await {
        match joined {
            Ok(Ok(())) => debug!("closer completed"),
            Ok(Err(e)) => error!("closer error: {:#}", e),
            Err(e) => error!("closer panicked: {}", e),
        }
    }
}
