//! Connection state and current-session tracking.
//!
//! The connection state and the current session live behind independent
//! primitives: an atomic for the state, a lock for the session slot. Neither
//! is held while the other is taken, and no lock is held while calling into a
//! session.
//!
//! Every connect attempt gets a number. Failures are reported against that
//! number so a late failure cannot disturb a newer attempt.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{PoisonError, RwLock};

use tracing::{debug, trace};

use stompkit_core::{ConnectionState, Error, Result, SessionRef};

/// Connection state plus the session currently in use.
#[derive(Debug, Default)]
pub struct SessionState {
    state: AtomicU8,
    attempt: AtomicU64,
    current: RwLock<Option<SessionRef>>,
}

impl SessionState {
    /// Create a disconnected state with no session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether a connect attempt is outstanding.
    pub fn is_connecting(&self) -> bool {
        self.state() == ConnectionState::Connecting
    }

    /// Atomically move `from -> to`.
    ///
    /// Returns false if the state was not `from`, or the move is not part of
    /// the lifecycle.
    pub fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        if !from.can_transition_to(to) {
            return false;
        }
        let moved = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if moved {
            trace!("Connection state: {} -> {}", from, to);
        }
        moved
    }

    /// Enter `Connecting`.
    ///
    /// Returns the number of the new attempt, or
    /// [`Error::ConnectInProgress`] if another attempt is outstanding.
    pub fn begin_connect(&self) -> Result<u64> {
        loop {
            let from = self.state();
            if from == ConnectionState::Connecting {
                return Err(Error::ConnectInProgress);
            }
            if self.transition(from, ConnectionState::Connecting) {
                return Ok(self.attempt.fetch_add(1, Ordering::AcqRel) + 1);
            }
        }
    }

    /// Number of the most recent connect attempt, 0 if none was made.
    pub fn last_attempt(&self) -> u64 {
        self.attempt.load(Ordering::Acquire)
    }

    /// Leave `Connecting` after attempt `attempt` failed.
    ///
    /// Falls back to `Connected` if a live session is still installed. Has no
    /// effect if the attempt was already superseded or settled.
    pub fn connect_failed(&self, attempt: u64) {
        if self.last_attempt() != attempt {
            trace!("Ignoring failure of superseded connect attempt {}", attempt);
            return;
        }
        let fallback = if self.has_live_session() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };
        if self.transition(ConnectionState::Connecting, fallback) {
            debug!("Connect attempt failed, state is now {}", fallback);
        }
    }

    /// Enter `Connected` from any state.
    pub fn mark_connected(&self) {
        let previous = self
            .state
            .swap(ConnectionState::Connected as u8, Ordering::AcqRel);
        trace!(
            "Connection state: {} -> connected",
            ConnectionState::from_u8(previous)
        );
    }

    /// Enter `Disconnected` from `Connected`.
    ///
    /// An outstanding connect attempt is left alone.
    pub fn mark_disconnected(&self) {
        self.transition(ConnectionState::Connected, ConnectionState::Disconnected);
    }

    /// Enter `Disconnected` from any state.
    ///
    /// An outstanding attempt is retired: its later failure is ignored.
    pub fn reset(&self) {
        self.attempt.fetch_add(1, Ordering::AcqRel);
        self.state
            .store(ConnectionState::Disconnected as u8, Ordering::Release);
    }

    /// The session currently in use, live or not.
    pub fn current(&self) -> Option<SessionRef> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The current session if its connection is still usable.
    pub fn live_session(&self) -> Option<SessionRef> {
        self.current().filter(|session| session.is_connected())
    }

    /// Whether the current session is still usable.
    pub fn has_live_session(&self) -> bool {
        self.live_session().is_some()
    }

    /// Install `next` as the current session and enter `Connected`.
    ///
    /// Returns the session it replaced. The state is set after the slot so a
    /// disconnect reported while the previous session was being retired does
    /// not outlive the new session.
    pub fn adopt(&self, next: SessionRef) -> Option<SessionRef> {
        let previous = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(next);
        self.mark_connected();
        previous
    }
}
