// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Print orchestrator — the driver's façade and concurrency gate.
//
// Owns the transport, the circuit breaker, and the current settings
// snapshot. Exactly one print job may be outstanding at a time; there is
// deliberately no queue. Jobs run on a worker task and hand the caller a
// cancellable, awaitable handle.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use preiswerk_core::config::DriverConfig;
use preiswerk_core::error::{DriverError, Result};
use preiswerk_core::types::{
    BaudRate, CircuitState, DeviceStatus, JobId, LabelRequest, PrinterSettings, RecoveryStrategy,
};

use crate::breaker::{CircuitBreaker, CircuitError};
use crate::classify;
use crate::encoder;
use crate::retry::{self, ErrorConfig};
use crate::transport::{SerialTransport, Transport};

/// Bounded attempt count for errors we cannot classify.
const IMMEDIATE_RETRIES: u32 = 2;

type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

/// A running (or finished) print job.
///
/// Cancellation is cooperative: no new command is written once signalled,
/// but a write already in flight completes.
pub struct PrintJobHandle {
    pub id: JobId,
    pub started_at: DateTime<Utc>,
    token: CancellationToken,
    task: JoinHandle<Result<()>>,
}

impl PrintJobHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the job to finish and take its outcome.
    pub async fn wait(self) -> Result<()> {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => Err(DriverError::Cancelled),
            Err(e) => Err(DriverError::Internal(e.to_string())),
        }
    }
}

/// Façade over transport + encoder + breaker + classifier + retry engine.
pub struct PrintOrchestrator {
    transport: SharedTransport,
    breaker: Arc<CircuitBreaker>,
    config: DriverConfig,
    settings: StdMutex<PrinterSettings>,
    printing: Arc<AtomicBool>,
    active_job: StdMutex<Option<CancellationToken>>,
}

impl PrintOrchestrator {
    /// Orchestrator over a real serial transport.
    pub fn new(settings: PrinterSettings, config: DriverConfig) -> Self {
        let transport: Box<dyn Transport> = Box::new(SerialTransport::new(&config));
        Self::with_transport(transport, settings, config)
    }

    /// Inject a transport — tests substitute a mock here.
    pub fn with_transport(
        transport: Box<dyn Transport>,
        settings: PrinterSettings,
        config: DriverConfig,
    ) -> Self {
        Self {
            transport: Arc::new(Mutex::new(transport)),
            breaker: Arc::new(CircuitBreaker::from_config(&config)),
            config,
            settings: StdMutex::new(settings),
            printing: Arc::new(AtomicBool::new(false)),
            active_job: StdMutex::new(None),
        }
    }

    pub fn list_ports(&self) -> Vec<String> {
        SerialTransport::list_ports()
    }

    /// Open the transport using the current settings snapshot.
    pub async fn open(&self) -> Result<()> {
        let settings = self.settings_snapshot();
        settings.validate()?;
        let mut transport = self.transport.lock().await;
        transport.open(&settings.port, settings.baud)
    }

    /// Point the settings at a different port and open it.
    pub async fn open_port(&self, port: &str, baud: BaudRate) -> Result<()> {
        {
            let mut settings = lock_or_recover(&self.settings);
            settings.port = port.to_string();
            settings.baud = baud;
        }
        self.open().await
    }

    pub async fn close(&self) {
        self.transport.lock().await.close();
    }

    pub async fn is_open(&self) -> bool {
        self.transport.lock().await.is_open()
    }

    /// Ask the device how it is doing.
    ///
    /// The serial exchange is synchronous and holds the transport lock, so
    /// the caller's thread can stall for up to the configured read timeout
    /// when the device stays silent.
    pub async fn query_status(&self) -> DeviceStatus {
        self.transport.lock().await.query_status()
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Operator escape hatch for a breaker stuck open.
    pub fn reset_circuit(&self) {
        self.breaker.reset();
    }

    /// The snapshot the next job will print with.
    pub fn settings(&self) -> PrinterSettings {
        self.settings_snapshot()
    }

    /// Replace the settings. Takes effect on the next operation only; a
    /// job already running keeps the snapshot it started with.
    pub fn set_settings(&self, settings: PrinterSettings) -> Result<()> {
        settings.validate()?;
        *lock_or_recover(&self.settings) = settings;
        Ok(())
    }

    /// Print a single sticker.
    pub fn print_one(&self, request: LabelRequest) -> Result<PrintJobHandle> {
        self.print_many(request, 1)
    }

    /// Print `count` independent rounds of the same sticker as one
    /// exclusive job.
    ///
    /// A count of zero (negative counts are treated as zero) performs the
    /// connectivity check and finishes without sending anything. Fails
    /// with [`DriverError::AlreadyPrinting`] — without touching the
    /// transport — while another job is outstanding.
    #[instrument(skip(self, request), fields(item = %request.item))]
    pub fn print_many(&self, request: LabelRequest, count: i32) -> Result<PrintJobHandle> {
        request.validate()?;
        let settings = self.settings_snapshot();
        settings.validate()?;

        if self
            .printing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(DriverError::AlreadyPrinting);
        }

        let rounds = count.max(0) as u32;
        let id = JobId::new();
        let token = CancellationToken::new();
        *lock_or_recover(&self.active_job) = Some(token.clone());

        let worker = JobWorker {
            transport: Arc::clone(&self.transport),
            breaker: Arc::clone(&self.breaker),
            config: self.config.clone(),
            settings,
            request,
            rounds,
            token: token.clone(),
        };

        info!(job = %id, rounds, "print job accepted");
        let gate = JobGate(Arc::clone(&self.printing));
        let task = tokio::spawn(async move {
            let _gate = gate;
            let outcome = worker.run().await;
            match &outcome {
                Ok(()) => info!(job = %id, "print job finished"),
                Err(e) => warn!(job = %id, error = %e, "print job failed"),
            }
            outcome
        });

        Ok(PrintJobHandle {
            id,
            started_at: Utc::now(),
            token,
            task,
        })
    }

    /// Convenience wrapper that submits and waits in one call.
    pub async fn print_and_wait(&self, request: LabelRequest, count: i32) -> Result<()> {
        self.print_many(request, count)?.wait().await
    }

    /// Signal the outstanding job to stop. Cooperative, not preemptive.
    pub fn cancel(&self) {
        if let Some(token) = lock_or_recover(&self.active_job).as_ref() {
            info!("cancelling outstanding print job");
            token.cancel();
        }
    }

    /// Explicit recovery entry point: drop the link and re-establish it
    /// with the last-known settings.
    pub async fn handle_error(&self) -> Result<()> {
        let settings = self.settings_snapshot();
        warn!(port = %settings.port, "recovering transport after error");
        let mut transport = self.transport.lock().await;
        transport.close();
        transport.open(&settings.port, settings.baud)
    }

    fn settings_snapshot(&self) -> PrinterSettings {
        lock_or_recover(&self.settings).clone()
    }
}

/// Resets the job gate when the worker finishes, panics included.
struct JobGate(Arc<AtomicBool>);

impl Drop for JobGate {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A poisoned lock here just means another thread panicked mid-update;
/// the guarded values stay structurally valid, so keep going.
fn lock_or_recover<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// One print job, moved onto its worker task.
struct JobWorker {
    transport: SharedTransport,
    breaker: Arc<CircuitBreaker>,
    config: DriverConfig,
    settings: PrinterSettings,
    request: LabelRequest,
    rounds: u32,
    token: CancellationToken,
}

impl JobWorker {
    async fn run(&self) -> Result<()> {
        {
            let transport = self.transport.lock().await;
            if !transport.is_open() {
                return Err(DriverError::NotConnected);
            }
        }

        for round in 1..=self.rounds {
            if self.token.is_cancelled() {
                return Err(DriverError::Cancelled);
            }
            self.print_round().await?;
            debug!(round, total = self.rounds, "label printed");
        }
        Ok(())
    }

    /// One render→send round, with classification-driven recovery.
    async fn print_round(&self) -> Result<()> {
        let err = match self.attempt().await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        match classify::recovery_for(&err) {
            RecoveryStrategy::FailFast | RecoveryStrategy::ManualIntervention => Err(err),
            RecoveryStrategy::Reconnect => {
                warn!(error = %err, "link lost — reconnecting");
                self.reconnect().await?;
                self.attempt().await
            }
            RecoveryStrategy::RetryImmediate => {
                self.retry_round(ErrorConfig::immediate(IMMEDIATE_RETRIES))
                    .await
            }
            RecoveryStrategy::RetryWithBackoff => {
                self.retry_round(ErrorConfig::backoff(
                    self.config.max_retries,
                    self.config.initial_delay,
                ))
                .await
            }
        }
    }

    async fn retry_round(&self, config: ErrorConfig) -> Result<()> {
        retry::run(
            &config,
            Some(&self.breaker),
            &self.token,
            // The breaker is its own backoff, and a cancelled job stops.
            |e| !matches!(e, DriverError::CircuitOpen { .. } | DriverError::Cancelled),
            || self.attempt().boxed(),
        )
        .await
    }

    /// Render the label and push every command through the breaker-guarded
    /// transport.
    async fn attempt(&self) -> Result<()> {
        let commands = encoder::render(&self.request, &self.settings)?;

        let guarded = self
            .breaker
            .execute(|| async {
                let mut transport = self.transport.lock().await;
                for command in &commands {
                    let mut line = command.clone().into_bytes();
                    line.extend_from_slice(b"\r\n");
                    transport.send(&line, &self.token).await?;
                }
                Ok::<_, DriverError>(())
            })
            .await;

        guarded.map_err(|e| match e {
            CircuitError::Open { retry_after } => DriverError::CircuitOpen { retry_after },
            CircuitError::Inner(inner) => inner,
        })
    }

    async fn reconnect(&self) -> Result<()> {
        let mut transport = self.transport.lock().await;
        transport.close();
        transport.open(&self.settings.port, self.settings.baud)
    }
}
