//! Connection lifecycle state.

use std::sync::atomic::{AtomicU8, Ordering};

use strum::Display;
use tokio::sync::watch;

/// Lifecycle of the single duplex connection owned by a session.
///
/// `Idle → Connecting → Open → Closed`. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
}

impl ConnectionState {
    fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Connecting => 1,
            Self::Open => 2,
            Self::Closed => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Connecting,
            2 => Self::Open,
            _ => Self::Closed,
        }
    }

    fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Connecting)
                | (Self::Connecting, Self::Open)
                | (Self::Idle | Self::Connecting | Self::Open, Self::Closed)
        )
    }
}

/// Shared state cell.
///
/// Readers on time-sensitive paths use the atomic; async observers subscribe
/// to the watch channel.
#[derive(Debug)]
pub(crate) struct StateCell {
    current: AtomicU8,
    notify: watch::Sender<ConnectionState>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        let (notify, _) = watch::channel(ConnectionState::Idle);
        Self {
            current: AtomicU8::new(ConnectionState::Idle.as_u8()),
            notify,
        }
    }

    pub(crate) fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.current.load(Ordering::Acquire))
    }

    pub(crate) fn is_open(&self) -> bool {
        self.get() == ConnectionState::Open
    }

    /// Apply a transition. Returns `false` when it is not allowed from the
    /// current state.
    pub(crate) fn transition(&self, next: ConnectionState) -> bool {
        let mut current = self.current.load(Ordering::Acquire);
        loop {
            if !ConnectionState::from_u8(current).can_transition_to(next) {
                return false;
            }
            match self.current.compare_exchange(
                current,
                next.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        self.notify.send_replace(next);
        true
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.notify.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_lifecycle_order() {
        let cell = StateCell::new();
        assert_eq!(cell.get(), ConnectionState::Idle);
        assert!(!cell.transition(ConnectionState::Open));
        assert!(cell.transition(ConnectionState::Connecting));
        assert!(cell.transition(ConnectionState::Open));
        assert!(cell.is_open());
        assert!(cell.transition(ConnectionState::Closed));
    }

    #[test]
    fn closed_is_terminal() {
        let cell = StateCell::new();
        assert!(cell.transition(ConnectionState::Closed));
        assert!(!cell.transition(ConnectionState::Connecting));
        assert!(!cell.transition(ConnectionState::Closed));
        assert_eq!(cell.get(), ConnectionState::Closed);
    }

    #[test]
    fn subscribers_observe_latest_state() {
        let cell = StateCell::new();
        let receiver = cell.subscribe();
        cell.transition(ConnectionState::Connecting);
        assert_eq!(*receiver.borrow(), ConnectionState::Connecting);
    }
}
