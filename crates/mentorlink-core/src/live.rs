//! Live views: cancellable streams of whole query snapshots.
//!
//! A [`Subscription`] runs its query once up front and again after every
//! relevant [`Change`], delivering each result set whole. Bursts of changes
//! that arrive while a query runs are coalesced into one re-query.

use std::{
  future::Future,
  pin::Pin,
  task::{Context, Poll},
};

use futures_util::Stream;
use tokio::{
  sync::{
    broadcast::error::{RecvError, TryRecvError},
    mpsc,
  },
  task::JoinHandle,
};

use crate::{
  Result,
  store::{Change, MatchStore},
};

/// A live, ordered sequence of snapshots.
///
/// Dropping the subscription or calling [`Subscription::cancel`] stops it;
/// no snapshot is yielded after cancellation, even one already queued.
pub struct Subscription<T> {
  rx:        mpsc::Receiver<Result<Vec<T>>>,
  task:      JoinHandle<()>,
  cancelled: bool,
}

impl<T: Send + 'static> Subscription<T> {
  /// Start a live view over `store`'s change feed.
  ///
  /// The change receiver is taken before the first query runs, so a write
  /// racing the initial snapshot still triggers a re-query.
  pub fn spawn<S, I, Q, F>(store: &S, buffer: usize, interest: I, query: Q) -> Self
  where
    S: MatchStore,
    I: Fn(&Change) -> bool + Send + 'static,
    Q: Fn() -> F + Send + 'static,
    F: Future<Output = Result<Vec<T>>> + Send + 'static,
  {
    let mut changes = store.changes();
    let (tx, rx) = mpsc::channel(buffer.max(1));

    let task = tokio::spawn(async move {
      if tx.send(query().await).await.is_err() {
        return;
      }

      loop {
        match changes.recv().await {
          Ok(change) if !interest(&change) => continue,
          Ok(_) => {}
          Err(RecvError::Lagged(missed)) => {
            tracing::debug!(missed, "live view lagged; re-querying");
          }
          Err(RecvError::Closed) => break,
        }

        // Coalesce whatever else is already queued.
        loop {
          match changes.try_recv() {
            Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
          }
        }

        if tx.send(query().await).await.is_err() {
          break;
        }
      }

      tracing::debug!("live view stopped");
    });

    Self { rx, task, cancelled: false }
  }
}

impl<T> Subscription<T> {
  /// Stop the view. Pending snapshots are discarded.
  pub fn cancel(&mut self) {
    self.cancelled = true;
    self.task.abort();
    self.rx.close();
  }

  pub fn is_cancelled(&self) -> bool { self.cancelled }

  /// Wait for the next snapshot. `None` once cancelled or the feed ends.
  pub async fn next_snapshot(&mut self) -> Option<Result<Vec<T>>> {
    if self.cancelled {
      return None;
    }
    self.rx.recv().await
  }
}

impl<T> Stream for Subscription<T> {
  type Item = Result<Vec<T>>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    let this = self.get_mut();
    if this.cancelled {
      return Poll::Ready(None);
    }
    this.rx.poll_recv(cx)
  }
}

impl<T> Drop for Subscription<T> {
  fn drop(&mut self) { self.task.abort(); }
}
