//! Payment request submission and status polling
//!
//! [`PaymentPoller`] submits a payment request through a [`PaymentGateway`],
//! then runs one timer-owning task that polls the request's status until it
//! reaches a terminal outcome or is cancelled.
//!
//! At most one polling task is active per poller. Every submit bumps a
//! generation counter and cancels the previous task before the new initiate
//! call is made; state written on behalf of an older generation is discarded.

use crate::config::PollConfig;
use crate::gateway::PaymentGateway;
use crate::types::{CheckoutId, PaymentRequest, PaymentStatus};
use crate::{Result, StkPayError};
use std::future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Message reported when initiation fails without a usable backend message
pub const SUBMIT_FAILED_MESSAGE: &str = "Failed to send STK push";

/// Message reported when the payer confirms
pub const PAYMENT_CONFIRMED_MESSAGE: &str = "Payment confirmed";

/// Message reported when the backend reports the payment as failed
pub const PAYMENT_FAILED_MESSAGE: &str = "Payment failed";

/// Message reported when the optional wait ceiling elapses
pub const PAYMENT_TIMED_OUT_MESSAGE: &str = "Payment confirmation timed out";

const NOTIFICATION_CAPACITY: usize = 16;

/// Observable state of the poller
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PaymentState {
    #[default]
    Idle,
    Initiated {
        checkout_id: CheckoutId,
    },
    Pending {
        checkout_id: CheckoutId,
    },
    Success {
        checkout_id: CheckoutId,
    },
    Failed {
        checkout_id: Option<CheckoutId>,
        reason: String,
    },
}

impl PaymentState {
    fn from_status(status: PaymentStatus, checkout_id: CheckoutId, reason: &str) -> Self {
        match status {
            PaymentStatus::Initiated => Self::Initiated { checkout_id },
            PaymentStatus::Pending => Self::Pending { checkout_id },
            PaymentStatus::Success => Self::Success { checkout_id },
            PaymentStatus::Failed => Self::Failed {
                checkout_id: Some(checkout_id),
                reason: reason.to_string(),
            },
        }
    }

    /// Lifecycle status, `None` while idle
    pub fn status(&self) -> Option<PaymentStatus> {
        match self {
            Self::Idle => None,
            Self::Initiated { .. } => Some(PaymentStatus::Initiated),
            Self::Pending { .. } => Some(PaymentStatus::Pending),
            Self::Success { .. } => Some(PaymentStatus::Success),
            Self::Failed { .. } => Some(PaymentStatus::Failed),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_some_and(|s| s.is_terminal())
    }

    pub fn checkout_id(&self) -> Option<&CheckoutId> {
        match self {
            Self::Idle => None,
            Self::Initiated { checkout_id }
            | Self::Pending { checkout_id }
            | Self::Success { checkout_id } => Some(checkout_id),
            Self::Failed { checkout_id, .. } => checkout_id.as_ref(),
        }
    }
}

/// Severity of a user notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Error,
}

/// Transient message for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

struct ActivePoll {
    checkout_id: CheckoutId,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct Shared<G> {
    gateway: G,
    config: PollConfig,
    state: watch::Sender<PaymentState>,
    notifications: broadcast::Sender<Notification>,
    generation: AtomicU64,
}

impl<G> Shared<G> {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Publish a state on behalf of `generation`. Returns false when superseded.
    fn publish(&self, generation: u64, next: PaymentState) -> bool {
        let mut accepted = false;
        self.state.send_if_modified(|state| {
            if !self.is_current(generation) {
                return false;
            }
            accepted = true;
            if *state == next {
                return false;
            }
            *state = next;
            true
        });
        accepted
    }

    fn notify(&self, notification: Notification) {
        // No receivers is fine: nobody is watching.
        let _ = self.notifications.send(notification);
    }
}

/// Submits payment requests and polls them to a terminal outcome
pub struct PaymentPoller<G> {
    shared: Arc<Shared<G>>,
    active: Mutex<Option<ActivePoll>>,
}

impl<G> std::fmt::Debug for PaymentPoller<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentPoller")
            .field("state", &*self.shared.state.borrow())
            .field("config", &self.shared.config)
            .finish()
    }
}

impl<G: PaymentGateway + 'static> PaymentPoller<G> {
    /// Create a poller, rejecting an invalid config
    pub fn new(gateway: G, config: PollConfig) -> Result<Self> {
        config.validate()?;
        let (state, _) = watch::channel(PaymentState::Idle);
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Ok(Self {
            shared: Arc::new(Shared {
                gateway,
                config,
                state,
                notifications,
                generation: AtomicU64::new(0),
            }),
            active: Mutex::new(None),
        })
    }

    /// Snapshot of the current state
    pub fn state(&self) -> PaymentState {
        self.shared.state.borrow().clone()
    }

    /// Receiver that observes every state change
    pub fn subscribe(&self) -> watch::Receiver<PaymentState> {
        self.shared.state.subscribe()
    }

    /// Receiver for user notifications emitted from now on
    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.shared.notifications.subscribe()
    }

    pub fn config(&self) -> &PollConfig {
        &self.shared.config
    }

    /// Whether a polling task is still running
    pub fn is_polling(&self) -> bool {
        self.lock_active()
            .as_ref()
            .is_some_and(|active| !active.task.is_finished())
    }

    /// Checkout id of the running polling task, if any
    pub fn active_checkout(&self) -> Option<CheckoutId> {
        self.lock_active()
            .as_ref()
            .filter(|active| !active.task.is_finished())
            .map(|active| active.checkout_id.clone())
    }

    /// Validate raw form input and submit it.
    ///
    /// Invalid input is reported as a notification and leaves the state untouched.
    pub async fn submit(&self, recipient_phone: &str, amount: &str) -> Result<CheckoutId> {
        let request = match PaymentRequest::parse(recipient_phone, amount) {
            Ok(request) => request,
            Err(e) => {
                self.shared.notify(Notification::error(e.user_message()));
                return Err(e);
            }
        };
        self.submit_request(request).await
    }

    /// Submit a payment request, superseding any request still being polled
    pub async fn submit_request(&self, request: PaymentRequest) -> Result<CheckoutId> {
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.cancel_active();

        info!(
            generation,
            phone = request.recipient_phone(),
            amount = %request.amount(),
            "Submitting payment request"
        );

        let handle = match self.shared.gateway.initiate(&request).await {
            Ok(handle) => handle,
            Err(e) => {
                let reason = submit_failure_reason(&e);
                warn!(generation, "Payment request initiation failed: {}", e);
                if self.shared.publish(
                    generation,
                    PaymentState::Failed {
                        checkout_id: None,
                        reason: reason.clone(),
                    },
                ) {
                    self.shared.notify(Notification::error(reason));
                }
                return Err(e);
            }
        };

        let checkout_id = handle.checkout_id;
        let mut active = self.lock_active();
        if !self.shared.is_current(generation) {
            debug!(generation, %checkout_id, "Initiated request was superseded before polling started");
            return Err(StkPayError::Superseded);
        }

        self.shared.publish(
            generation,
            PaymentState::Initiated {
                checkout_id: checkout_id.clone(),
            },
        );

        let cancel = CancellationToken::new();
        let task = tokio::spawn(poll_until_settled(
            Arc::clone(&self.shared),
            generation,
            checkout_id.clone(),
            cancel.clone(),
        ));
        *active = Some(ActivePoll {
            checkout_id: checkout_id.clone(),
            cancel,
            task,
        });

        info!(generation, %checkout_id, "Payment request initiated, polling for status");
        Ok(checkout_id)
    }

    /// Stop polling. The state is left as last observed.
    pub fn cancel(&self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.cancel_active();
    }

    fn cancel_active(&self) {
        if let Some(active) = self.lock_active().take() {
            if !active.task.is_finished() {
                debug!(checkout_id = %active.checkout_id, "Cancelling status polling");
            }
            active.cancel.cancel();
        }
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<ActivePoll>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<G> Drop for PaymentPoller<G> {
    fn drop(&mut self) {
        let active = self.active.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(active) = active.take() {
            active.cancel.cancel();
        }
    }
}

fn submit_failure_reason(error: &StkPayError) -> String {
    match error {
        StkPayError::Backend { message, .. }
        | StkPayError::Auth { message }
        | StkPayError::Forbidden { message }
        | StkPayError::Validation { message }
            if !message.is_empty() =>
        {
            message.clone()
        }
        _ => SUBMIT_FAILED_MESSAGE.to_string(),
    }
}

/// Poll `checkout_id` on a fixed interval until a terminal status, a
/// failure the retry policy gives up on, the wait ceiling, or cancellation.
async fn poll_until_settled<G: PaymentGateway>(
    shared: Arc<Shared<G>>,
    generation: u64,
    checkout_id: CheckoutId,
    cancel: CancellationToken,
) {
    let config = shared.config.clone();
    let started = Instant::now();
    let mut ticker = time::interval_at(started + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let deadline = config.max_wait.map(|wait| started + wait);
    let expiry = async move {
        match deadline {
            Some(deadline) => time::sleep_until(deadline).await,
            None => future::pending::<()>().await,
        }
    };
    tokio::pin!(expiry);

    let mut current = PaymentStatus::Initiated;
    let mut consecutive_failures = 0u32;
    let mut polls = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(generation, %checkout_id, polls, "Status polling cancelled");
                return;
            }
            _ = &mut expiry => {
                give_up(&shared, generation, &checkout_id, PAYMENT_TIMED_OUT_MESSAGE);
                return;
            }
            _ = ticker.tick() => {}
        }

        polls += 1;
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(generation, %checkout_id, polls, "Status polling cancelled mid-request");
                return;
            }
            _ = &mut expiry => {
                give_up(&shared, generation, &checkout_id, PAYMENT_TIMED_OUT_MESSAGE);
                return;
            }
            result = shared.gateway.status(&checkout_id) => result,
        };

        match result {
            Ok(status) => {
                consecutive_failures = 0;
                if !current.can_advance_to(status) {
                    warn!(
                        generation,
                        %checkout_id,
                        "Ignoring backward status transition {} -> {}",
                        current,
                        status
                    );
                    continue;
                }
                current = status;
                debug!(generation, %checkout_id, %status, polls, "Status polled");

                let accepted = shared.publish(
                    generation,
                    PaymentState::from_status(status, checkout_id.clone(), PAYMENT_FAILED_MESSAGE),
                );
                if !accepted {
                    return;
                }

                match status {
                    PaymentStatus::Success => {
                        info!(generation, %checkout_id, polls, "Payment confirmed");
                        shared.notify(Notification::success(PAYMENT_CONFIRMED_MESSAGE));
                        return;
                    }
                    PaymentStatus::Failed => {
                        info!(generation, %checkout_id, polls, "Payment failed");
                        shared.notify(Notification::error(PAYMENT_FAILED_MESSAGE));
                        return;
                    }
                    PaymentStatus::Initiated | PaymentStatus::Pending => {}
                }
            }
            Err(e) => {
                consecutive_failures += 1;
                if config.retry_policy.allows_retry(consecutive_failures, &e) {
                    warn!(
                        generation,
                        %checkout_id,
                        consecutive_failures,
                        "Status poll failed, retrying: {}",
                        e
                    );
                    continue;
                }
                warn!(generation, %checkout_id, "Status poll failed: {}", e);
                give_up(&shared, generation, &checkout_id, &e.user_message());
                return;
            }
        }
    }
}

fn give_up<G>(shared: &Shared<G>, generation: u64, checkout_id: &CheckoutId, reason: &str) {
    let failed = PaymentState::Failed {
        checkout_id: Some(checkout_id.clone()),
        reason: reason.to_string(),
    };
    if shared.publish(generation, failed) {
        shared.notify(Notification::error(reason));
    }
}
