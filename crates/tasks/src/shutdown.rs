//! Cloneable shutdown signal.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::future::{FusedFuture, Shared};
use futures_util::FutureExt;
use tokio::sync::oneshot;

/// Create a connected [`Signal`] / [`Shutdown`] pair.
pub fn signal() -> (Signal, Shutdown) {
    let (tx, rx) = oneshot::channel();
    (Signal(tx), Shutdown(rx.shared()))
}

/// Fires the shutdown. Dropping it without firing also resolves every [`Shutdown`].
#[derive(Debug)]
pub struct Signal(oneshot::Sender<()>);

impl Signal {
    pub fn fire(self) {
        let _ = self.0.send(());
    }
}

/// Resolves once the paired [`Signal`] fires or is dropped.
#[derive(Debug, Clone)]
#[must_use = "futures do nothing unless polled"]
pub struct Shutdown(Shared<oneshot::Receiver<()>>);

impl Shutdown {
    /// Non-blocking check, usable from synchronous code.
    pub fn is_fired(&self) -> bool {
        self.0.is_terminated() || self.0.clone().now_or_never().is_some()
    }
}

impl Future for Shutdown {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.0.is_terminated() || this.0.poll_unpin(cx).is_ready() {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}
