//! A single request/response exchange with the encoder.
//!
//! A transaction sends one frame and, for reads, waits for the matching reply:
//!
//! ```text
//! Idle ──send──► AwaitingResponse ──reply──► Success
//!  │                   │  ▲
//!  │ (write)           │  └── Retry ◄── deadline passed, attempts left
//!  ▼                   └──► Exhausted    deadline passed, no attempts left
//! Success
//! ```
//!
//! Replies are recognized by shape only, so a transaction must be the sole user of the
//! connection until it resolves. [`EncoderClient`](crate::EncoderClient) enforces this
//! by taking `&mut self` for every operation.

use std::time::Duration;

use log::{debug, error, trace, warn};
use tokio::{select, time::Instant};
use tokio_util::sync::CancellationToken;

use arm_encoder_protocol::{
    CanFrame, Decode, HostCommand, ReadRequest, RegisterId, RegisterReply, RegisterValue,
    StandardId, WriteRequest,
};

use crate::{deadline_after, CheckHeader, Connection, RequestError};

/// Per-attempt deadline and retry budget of a read.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransactionConfig {
    /// How long each attempt waits for a reply.
    pub timeout: Duration,
    /// Attempts made after the first one times out.
    pub retries: usize,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            retries: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Direction {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TransactionState {
    Idle,
    AwaitingResponse { attempt: usize, deadline: Instant },
    Retry { attempt: usize },
    Success,
    Exhausted,
}

/// How a transaction resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The frame went out. Reads carry the decoded reply; writes carry nothing.
    Success(Option<RegisterValue>),
    /// No reply arrived within any attempt, or the wait was cancelled.
    Exhausted,
}

impl Resolution {
    pub fn into_value(self) -> Option<RegisterValue> {
        match self {
            Resolution::Success(value) => value,
            Resolution::Exhausted => None,
        }
    }
}

/// One read or write of one register.
#[derive(Debug, Clone)]
pub struct RequestTransaction {
    register: RegisterId,
    direction: Direction,
    frame: CanFrame,
    config: TransactionConfig,
    state: TransactionState,
    attempts: usize,
}

impl RequestTransaction {
    pub fn read(target: StandardId, register: RegisterId, config: TransactionConfig) -> Self {
        Self::new(
            register,
            Direction::Read,
            ReadRequest::new(register).to_frame(target),
            config,
        )
    }

    /// A write. Writes are not acknowledged, so they resolve once the frame is sent.
    pub fn write(target: StandardId, request: WriteRequest) -> Self {
        Self::new(
            request.register(),
            Direction::Write,
            request.to_frame(target),
            TransactionConfig::default(),
        )
    }

    fn new(
        register: RegisterId,
        direction: Direction,
        frame: CanFrame,
        config: TransactionConfig,
    ) -> Self {
        Self {
            register,
            direction,
            frame,
            config,
            state: TransactionState::Idle,
            attempts: 0,
        }
    }

    pub fn register(&self) -> RegisterId {
        self.register
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Number of times the request frame has been sent.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Drives the transaction until it resolves.
    ///
    /// Cancelling `cancel` while waiting resolves the transaction as [`Resolution::Exhausted`].
    ///
    /// # Errors
    ///
    /// Transport failures are returned immediately and are not retried. A reply that has
    /// the right shape but cannot be decoded for this register is a
    /// [`RequestError::Decode`].
    pub async fn run<C: Connection>(
        &mut self,
        connection: &mut C,
        cancel: &CancellationToken,
    ) -> Result<Resolution, RequestError<C::Error>> {
        loop {
            match self.state {
                TransactionState::Idle | TransactionState::Retry { .. } => {
                    self.attempts += 1;
                    trace!("sent frame: {:?}", self.frame);
                    connection
                        .send(self.frame)
                        .await
                        .map_err(RequestError::Transport)?;

                    if self.direction == Direction::Write {
                        self.state = TransactionState::Success;
                        return Ok(Resolution::Success(None));
                    }

                    self.state = TransactionState::AwaitingResponse {
                        attempt: self.attempts,
                        deadline: deadline_after(self.config.timeout),
                    };
                }
                TransactionState::AwaitingResponse { attempt, deadline } => {
                    if let Some(value) = self.await_reply(connection, deadline, cancel).await? {
                        self.state = TransactionState::Success;
                        return Ok(Resolution::Success(Some(value)));
                    }

                    if cancel.is_cancelled() {
                        debug!("Read of {} cancelled.", self.register);
                        self.state = TransactionState::Exhausted;
                    } else if attempt <= self.config.retries {
                        warn!(
                            "No reply to read of {} within {:?} (attempt {}). Retrying...",
                            self.register, self.config.timeout, attempt
                        );
                        self.state = TransactionState::Retry { attempt };
                    } else {
                        error!(
                            "No reply to read of {} after {} attempts.",
                            self.register, attempt
                        );
                        self.state = TransactionState::Exhausted;
                    }
                }
                TransactionState::Success | TransactionState::Exhausted => {
                    return Ok(Resolution::Exhausted);
                }
            }
        }
    }

    /// Waits for a reply until `deadline`, discarding every frame that is not one.
    async fn await_reply<C: Connection>(
        &self,
        connection: &mut C,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<Option<RegisterValue>, RequestError<C::Error>> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            let received = select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                received = connection.recv(remaining) => received.map_err(RequestError::Transport)?,
            };

            let Some(frame) = received else {
                continue;
            };
            trace!("received frame: {:?}", frame);

            if !RegisterReply::has_valid_header(frame.data()) {
                debug!("Discarding frame that is not a register reply: {:?}", frame);
                continue;
            }

            let reply = RegisterReply::decode(&mut frame.data())?;
            return Ok(Some(reply.decode_value(self.register)?));
        }
    }
}
