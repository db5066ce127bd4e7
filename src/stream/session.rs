// Copyright (C) 2024-2026 The laplace Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt as _;
use futures::StreamExt as _;

use serde::de::DeserializeOwned;
use serde::de::IgnoredAny;
use serde_json::from_slice as from_json;

use tokio::select;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::info_span;
use tracing::trace;
use tracing::warn;
use tracing_futures::Instrument as _;
use tracing_futures::WithSubscriber as _;

use crate::client::Connector;
use crate::stream::decode::decode;
use crate::stream::frame::Frames;
use crate::stream::Envelope;
use crate::stream::Feed;
use crate::transport::ByteStream;
use crate::Error;
use crate::StreamError;

/// The maximum number of bytes read from the body of an error response.
const MAX_ERROR_BODY: usize = 64 * 1024;
/// The time we wait for the body of an error response to arrive.
const ERROR_BODY_TIMEOUT: Duration = Duration::from_millis(500);


/// Render the payload of a panic for logging purposes.
fn panic_message(panic: &(dyn Any + Send)) -> &str {
  if let Some(message) = panic.downcast_ref::<&str>() {
    message
  } else if let Some(message) = panic.downcast_ref::<String>() {
    message
  } else {
    "<unknown>"
  }
}


/// Run a background task, containing and logging any panic it raises.
pub(crate) async fn contain<F>(task: &'static str, future: F)
where
  F: Future<Output = ()>,
{
  if let Err(panic) = AssertUnwindSafe(future).catch_unwind().await {
    error!(task, panic = panic_message(&*panic), "background task panicked");
  }
}


/// Read the body of a response reporting a failure.
///
/// Reading stops at the end of the body, once it holds a complete JSON
/// value, after `MAX_ERROR_BODY` bytes, or after `ERROR_BODY_TIMEOUT`,
/// whichever comes first. A failure to read leaves us with whatever was
/// received until then.
async fn error_body(mut body: ByteStream) -> Vec<u8> {
  let mut data = Vec::<u8>::new();
  let read = async {
    while let Some(Ok(bytes)) = body.next().await {
      data.extend_from_slice(&bytes);
      if data.len() >= MAX_ERROR_BODY || from_json::<IgnoredAny>(&data).is_ok() {
        break
      }
    }
  };

  if timeout(ERROR_BODY_TIMEOUT, read).await.is_err() {
    debug!("timed out reading error response body");
  }
  data.truncate(MAX_ERROR_BODY);
  data
}


/// One live upstream connection along with the task reading from it.
#[derive(Debug)]
pub(crate) struct Session {
  /// The token the read task observes.
  token: CancellationToken,
  /// The read task.
  task: JoinHandle<()>,
}

impl Session {
  /// Open a connection streaming the given symbols of feed `F`.
  ///
  /// On success, the returned receiver is fed with one envelope per
  /// event until the session is stopped, `parent` is cancelled, or the
  /// upstream ends. A failure HTTP status is reported as an error and
  /// no session is left behind.
  pub(crate) async fn start<F>(
    connector: &Connector,
    symbols: &[String],
    parent: &CancellationToken,
  ) -> Result<(Self, mpsc::Receiver<Envelope<F::Event>>), Error>
  where
    F: Feed,
  {
    let request = connector.request::<F>(symbols)?;
    let uri = request.uri().clone();
    let span = info_span!(
      "session",
      feed = debug(F::kind()),
      region = debug(F::region()),
      uri = display(request.uri()),
    );

    let response = connector
      .transport
      .open(request)
      .instrument(span.clone())
      .await?;

    let status = response.status();
    if !status.is_success() {
      let body = error_body(response.into_body()).await;
      let err = Error::from_response(status, body);
      span.in_scope(|| info!(status = debug(&status), "subscription rejected"));
      return Err(err)
    }
    span.in_scope(|| info!("subscription successful"));

    let (sender, receiver) = mpsc::channel(connector.capacity);
    let token = parent.child_token();
    let frames = Frames::new(response.into_body(), connector.max_line_length);

    let (kind, region) = (F::kind(), F::region());
    let reader = read::<F::Event>(frames, sender, token.clone());
    let task = async move {
      // The span is created here so that it belongs to the dispatcher
      // the task reports to.
      let span = info_span!(
        "session",
        feed = debug(kind),
        region = debug(region),
        uri = display(&uri),
      );
      contain("session", reader).instrument(span).await
    }
    .with_subscriber(connector.dispatch.clone());
    let task = tokio::spawn(task);

    Ok((Self { token, task }, receiver))
  }

  /// Cancel the session and wait for its read task to finish, at which
  /// point the connection has been released.
  pub(crate) async fn stop(self) {
    self.token.cancel();
    // Panics are contained inside the task and it is never aborted.
    let _result = self.task.await;
  }
}


/// Pump decoded envelopes from `frames` into `sender`.
///
/// The channel closes when this function returns, and the connection is
/// released along with `frames`.
async fn read<T>(mut frames: Frames, sender: mpsc::Sender<Envelope<T>>, token: CancellationToken)
where
  T: DeserializeOwned,
{
  loop {
    let frame = select! {
      biased;
      () = token.cancelled() => {
        debug!("session cancelled");
        break
      },
      frame = frames.next() => frame,
    };

    let (envelope, last) = match frame {
      Some(Ok(payload)) => {
        trace!(payload = display(String::from_utf8_lossy(&payload)));
        let envelope = decode::<T>(&payload);
        if let Err(err) = &envelope {
          debug!(error = display(err), "failed to decode event");
        }
        (envelope, false)
      },
      Some(Err(err)) => {
        warn!(error = display(&err), "failed to read from event stream");
        (Err(StreamError::Read(err)), true)
      },
      None => {
        info!("upstream closed the event stream");
        break
      },
    };

    select! {
      biased;
      () = token.cancelled() => {
        debug!("session cancelled");
        break
      },
      result = sender.send(envelope) => {
        if result.is_err() {
          debug!("envelope receiver is gone");
          break
        }
      },
    }

    if last {
      break
    }
  }

  // Release the connection before the channel reports the end.
  drop(frames);
  drop(sender);
}
