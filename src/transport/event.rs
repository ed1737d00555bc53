//! Handles returned by every asynchronous send/recv (§3 "Event").
//!
//! An [`Event`] starts pending and transitions to ready exactly once. The
//! actual work it represents (a socket write, a matched recv) runs on a
//! task independent of whether anyone ever calls [`Event::wait`] — dropping
//! a pending `Event` is "detached completion": the oneshot sender on the
//! worker side simply finds no receiver and the send is a no-op, but the
//! work it was reporting on has already happened or will anyway.

use tokio::sync::oneshot;

use crate::error::TransportFailure;

enum State<T> {
    Pending(oneshot::Receiver<Result<T, TransportFailure>>),
    Ready(Result<T, TransportFailure>),
}

/// A movable, non-`Copy` handle to an in-flight send or recv.
pub struct Event<T> {
    state: State<T>,
}

impl<T> Event<T> {
    pub(crate) fn pending(receiver: oneshot::Receiver<Result<T, TransportFailure>>) -> Self {
        Self {
            state: State::Pending(receiver),
        }
    }

    pub(crate) fn ready(result: Result<T, TransportFailure>) -> Self {
        Self {
            state: State::Ready(result),
        }
    }

    /// Non-blocking poll: `true` once the operation has completed, whether
    /// or not the result has been observed yet.
    pub fn ready_now(&mut self) -> bool {
        if let State::Pending(receiver) = &mut self.state {
            if let Ok(result) = receiver.try_recv() {
                self.state = State::Ready(result);
            }
        }
        matches!(self.state, State::Ready(_))
    }

    /// Blocks (asynchronously) until the operation completes, consuming the
    /// event and returning its outcome.
    pub async fn wait(self) -> Result<T, TransportFailure> {
        match self.state {
            State::Ready(result) => result,
            State::Pending(receiver) => receiver.await.unwrap_or(Err(TransportFailure::Cancelled)),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn ready_event_resolves_immediately() {
        let event = Event::ready(Ok(42));
        assert_eq!(event.wait().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn pending_event_resolves_after_sender_fires() {
        let (tx, rx) = oneshot::channel();
        let mut event = Event::pending(rx);
        assert!(!event.ready_now());
        tx.send(Ok(7)).unwrap();
        tokio::task::yield_now().await;
        assert!(event.ready_now());
        assert_eq!(event.wait().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn dropped_sender_surfaces_as_cancelled() {
        let (tx, rx) = oneshot::channel::<Result<u8, TransportFailure>>();
        let event = Event::pending(rx);
        drop(tx);
        assert_matches!(event.wait().await, Err(TransportFailure::Cancelled));
    }
}
