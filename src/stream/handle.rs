// Copyright (C) 2024-2026 The laplace Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::future::pending;
use std::sync::Arc;

use futures::stream::unfold;
use futures::Stream;

use tokio::select;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tracing::debug;
use tracing::info_span;
use tracing_futures::Instrument as _;
use tracing_futures::WithSubscriber as _;

use crate::client::Connector;
use crate::stream::session::contain;
use crate::stream::session::Session;
use crate::stream::Envelope;
use crate::stream::Feed;
use crate::Error;


/// The receiving end of a price stream.
///
/// All `Receiver` objects obtained from the same [`PriceStream`] share
/// one channel: each envelope is delivered to exactly one of them. The
/// channel stays the same across subscription changes and ends (i.e.,
/// `recv` returns `None`) only once the stream is closed.
pub struct Receiver<T> {
  inner: Arc<Mutex<mpsc::Receiver<Envelope<T>>>>,
  /// The token of the stream the receiver belongs to.
  token: CancellationToken,
}

impl<T> Receiver<T> {
  fn new(receiver: mpsc::Receiver<Envelope<T>>, token: CancellationToken) -> Self {
    Self {
      inner: Arc::new(Mutex::new(receiver)),
      token,
    }
  }

  /// Receive the next envelope.
  ///
  /// Each envelope has to be checked for an error: after a
  /// [`StreamError::Read`][crate::StreamError::Read] no more events will
  /// arrive until the next subscription.
  pub async fn recv(&self) -> Option<Envelope<T>> {
    let mut receiver = self.inner.lock().await;
    select! {
      biased;
      envelope = receiver.recv() => envelope,
      () = self.token.cancelled() => {
        // The sending end may never have been handed to a forwarding
        // task. Only what is buffered already is delivered from here on.
        receiver.close();
        receiver.recv().await
      },
    }
  }

  /// Convert the receiver into a [`Stream`] of envelopes.
  pub fn into_stream(self) -> impl Stream<Item = Envelope<T>> {
    unfold(self, |receiver| async move {
      let envelope = receiver.recv().await?;
      Some((envelope, receiver))
    })
  }
}

impl<T> Clone for Receiver<T> {
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
      token: self.token.clone(),
    }
  }
}

impl<T> Debug for Receiver<T> {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("Receiver").finish_non_exhaustive()
  }
}


/// The sending end for handing the receiver of a new session to the
/// forwarding task.
type Switch<T> = mpsc::UnboundedSender<mpsc::Receiver<Envelope<T>>>;


/// The mutable state of a `PriceStream`.
struct State<T> {
  /// The active session, if any.
  session: Option<Session>,
  /// The symbols the active session streams.
  symbols: Vec<String>,
  /// The sending end of the output channel, until it is handed to the
  /// forwarding task.
  output: Option<mpsc::Sender<Envelope<T>>>,
  /// The means of switching the forwarding task to a new session.
  switch: Option<Switch<T>>,
  /// The forwarding task, once started.
  forwarder: Option<JoinHandle<()>>,
  closed: bool,
}


/// A resubscribable stream of prices of feed `F`.
///
/// A `PriceStream` owns at most one connection at a time. Subscribing
/// to a new list of symbols replaces the connection, while the channel
/// envelopes are received through (see [`PriceStream::receive`]) stays
/// the same.
///
/// After [`PriceStream::subscribe`] returned, envelopes belonging to the
/// previous subscription may still be received, but no more than the
/// configured channel capacity plus one, and none after the first
/// envelope of the new subscription.
///
/// A failure of an established connection is reported as a single
/// error envelope; there is no automatic reconnect.
pub struct PriceStream<F>
where
  F: Feed,
{
  connector: Arc<Connector>,
  /// The token governing all tasks of this stream.
  token: CancellationToken,
  state: RwLock<State<F::Event>>,
  receiver: Receiver<F::Event>,
}

impl<F> PriceStream<F>
where
  F: Feed,
{
  pub(crate) fn new(connector: Arc<Connector>) -> Self {
    Self::with_token(connector, CancellationToken::new())
  }

  pub(crate) fn with_token(connector: Arc<Connector>, token: CancellationToken) -> Self {
    let (output, receiver) = mpsc::channel(connector.capacity);
    let state = State {
      session: None,
      symbols: Vec::new(),
      output: Some(output),
      switch: None,
      forwarder: None,
      closed: false,
    };

    Self {
      receiver: Receiver::new(receiver, token.clone()),
      connector,
      token,
      state: RwLock::new(state),
    }
  }

  /// Subscribe to the given symbols, replacing the current
  /// subscription, if any.
  ///
  /// An empty list of symbols subscribes to all symbols of the feed.
  ///
  /// # Errors
  /// - [`Error::Closed`] if the stream has been closed
  /// - any error reported while establishing the connection; the stream
  ///   is left without a subscription in that case
  pub async fn subscribe<S>(&self, symbols: S) -> Result<(), Error>
  where
    S: IntoIterator,
    S::Item: Into<String>,
  {
    let symbols = symbols.into_iter().map(Into::into).collect::<Vec<String>>();

    let mut state = self.state.write().await;
    if state.closed || self.token.is_cancelled() {
      return Err(Error::Closed)
    }

    if let Some(session) = state.session.take() {
      debug!(symbols = debug(&state.symbols), "stopping previous session");
      session.stop().await;
    }
    state.symbols.clear();

    let (session, receiver) = Session::start::<F>(&self.connector, &symbols, &self.token).await?;
    let switch = self.switch(&mut state)?;

    if switch.send(receiver).is_err() {
      // The forwarding task is gone and the output channel with it.
      session.stop().await;
      state.closed = true;
      return Err(Error::Closed)
    }

    state.session = Some(session);
    state.symbols = symbols;
    Ok(())
  }

  /// Retrieve the means of switching the forwarding task to a new
  /// session, starting the task if it is not yet running.
  fn switch(&self, state: &mut State<F::Event>) -> Result<Switch<F::Event>, Error> {
    if let Some(switch) = &state.switch {
      return Ok(switch.clone())
    }

    let output = state.output.take().ok_or(Error::Closed)?;
    let (switch, switches) = mpsc::unbounded_channel();
    let (kind, region) = (F::kind(), F::region());
    let forwarder = forward(output, switches, self.token.clone());
    let task = async move {
      let span = info_span!("forward", feed = debug(kind), region = debug(region));
      contain("forwarder", forwarder).instrument(span).await
    }
    .with_subscriber(self.connector.dispatch.clone());

    state.forwarder = Some(tokio::spawn(task));
    state.switch = Some(switch.clone());
    Ok(switch)
  }

  /// Retrieve the receiving end of the stream.
  ///
  /// Every call refers to the same underlying channel, regardless of
  /// any subscription changes in between.
  #[inline]
  pub fn receive(&self) -> Receiver<F::Event> {
    self.receiver.clone()
  }

  /// Retrieve the symbols currently subscribed to.
  ///
  /// The list is empty if there is no active subscription.
  pub async fn symbols(&self) -> Vec<String> {
    self.state.read().await.symbols.clone()
  }

  /// Check whether the stream has been closed.
  pub async fn is_closed(&self) -> bool {
    self.state.read().await.closed || self.token.is_cancelled()
  }

  /// Close the stream.
  ///
  /// The connection is released, and receivers observe the end of the
  /// stream once they drained the envelopes still buffered. Closing an
  /// already closed stream has no effect.
  pub async fn close(&self) -> Result<(), Error> {
    let mut state = self.state.write().await;
    if state.closed {
      return Ok(())
    }
    state.closed = true;

    if let Some(session) = state.session.take() {
      session.stop().await;
    }
    self.token.cancel();
    state.switch = None;
    state.output = None;
    state.symbols.clear();

    if let Some(forwarder) = state.forwarder.take() {
      // Panics are contained inside the task and it is never aborted.
      let _result = forwarder.await;
    }
    debug!("price stream closed");
    Ok(())
  }
}

impl<F> Debug for PriceStream<F>
where
  F: Feed,
{
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("PriceStream")
      .field("feed", &F::kind())
      .field("region", &F::region())
      .finish_non_exhaustive()
  }
}

impl<F> Drop for PriceStream<F>
where
  F: Feed,
{
  fn drop(&mut self) {
    self.token.cancel();
  }
}


/// Wait for the next envelope of the current session, if any.
async fn next<T>(current: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
  match current {
    Some(receiver) => receiver.recv().await,
    None => pending().await,
  }
}


/// Forward envelopes from the current session into the output channel.
///
/// Switching to a new session takes priority over forwarding: an
/// envelope of the previous session that could not be delivered yet is
/// dropped. The output channel closes when this function returns, which
/// happens only once `token` is cancelled.
async fn forward<T>(
  output: mpsc::Sender<Envelope<T>>,
  mut switches: mpsc::UnboundedReceiver<mpsc::Receiver<Envelope<T>>>,
  token: CancellationToken,
) {
  let mut current = None;

  loop {
    let envelope = select! {
      biased;
      () = token.cancelled() => break,
      switch = switches.recv() => match switch {
        Some(receiver) => {
          debug!("switching to new session");
          current = Some(receiver);
          continue
        },
        None => break,
      },
      envelope = next(&mut current) => match envelope {
        Some(envelope) => envelope,
        None => {
          debug!("session ended");
          current = None;
          continue
        },
      },
    };

    select! {
      biased;
      () = token.cancelled() => break,
      switch = switches.recv() => match switch {
        Some(receiver) => {
          debug!("switching to new session; dropping pending envelope");
          current = Some(receiver);
        },
        None => break,
      },
      result = output.send(envelope) => {
        if result.is_err() {
          debug!("all receivers are gone");
          break
        }
      },
    }
  }
}
