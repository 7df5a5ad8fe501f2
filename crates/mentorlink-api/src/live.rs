//! Server-sent events over live subscriptions.
//!
//! Each snapshot becomes one `snapshot` event carrying the whole result set
//! as JSON. A failed re-query becomes an `error` event; the stream stays
//! open and the next change triggers another attempt. The subscription is
//! dropped, and its task stopped, when the client disconnects.

use std::convert::Infallible;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::{Stream, StreamExt as _};
use mentorlink_core::Subscription;
use serde::Serialize;

pub fn sse<T>(subscription: Subscription<T>) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
  T: Serialize + Send + 'static,
{
  let events = subscription.map(|snapshot| {
    let event = match snapshot {
      Ok(items) => Event::default()
        .event("snapshot")
        .json_data(&items)
        .unwrap_or_else(|e| Event::default().event("error").data(e.to_string())),
      Err(e) => Event::default().event("error").data(e.to_string()),
    };
    Ok(event)
  });
  Sse::new(events).keep_alive(KeepAlive::default())
}
