use crate::{error::CursorError, latch::SharedFetch};
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

/// A pending or already-settled page fetch.
///
/// Awaiting it resolves once the fetch has been merged into the row set.
/// Clones all wait on the same fetch; dropping a handle never cancels it.
#[derive(Clone)]
#[must_use = "a fetch handle does nothing unless awaited or inspected"]
pub struct FetchHandle {
    state: HandleState,
}

#[derive(Clone)]
pub(crate) enum HandleState {
    Settled(Option<Result<(), CursorError>>),
    InFlight(SharedFetch),
}

impl FetchHandle {
    pub(crate) fn settled(result: Result<(), CursorError>) -> Self {
        Self {
            state: HandleState::Settled(Some(result)),
        }
    }

    pub(crate) fn in_flight(fetch: SharedFetch) -> Self {
        Self {
            state: HandleState::InFlight(fetch),
        }
    }

    pub(crate) fn into_state(self) -> HandleState {
        self.state
    }

    /// Whether the outcome is already known without waiting.
    pub fn is_settled(&self) -> bool {
        match &self.state {
            HandleState::Settled(_) => true,
            HandleState::InFlight(fetch) => fetch.peek().is_some(),
        }
    }
}

impl Future for FetchHandle {
    type Output = Result<(), CursorError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            HandleState::Settled(result) => Poll::Ready(result.take().unwrap_or(Ok(()))),
            HandleState::InFlight(fetch) => Pin::new(fetch).poll(cx),
        }
    }
}

impl std::fmt::Debug for FetchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            HandleState::Settled(_) => "settled",
            HandleState::InFlight(_) => "in-flight",
        };
        f.debug_struct("FetchHandle").field("state", &state).finish()
    }
}
