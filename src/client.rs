// Copyright (C) 2019-2026 The laplace Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::Arc;

use http::header::ACCEPT;
use http::header::AUTHORIZATION;
use http::header::CACHE_CONTROL;
use http::header::CONNECTION;
use http::Request;

use serde::Serialize;
use serde_urlencoded::to_string as to_query;

use tokio_util::sync::CancellationToken;

use tracing::dispatcher::get_default;
use tracing::Dispatch;

use uuid::Uuid;

use crate::api_info::ApiInfo;
use crate::stream::Feed;
use crate::stream::PriceStream;
use crate::stream::Region;
use crate::transport::HyperTransport;
use crate::transport::Transport;
use crate::util::string_slice_to_str;
use crate::Error;

/// The default capacity of the channels envelopes travel through.
const DEFAULT_CHANNEL_CAPACITY: usize = 16;
/// The default maximum length of a line in an event stream.
const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;


/// The query parameters of a streaming request.
#[derive(Debug, Serialize)]
struct StreamQuery<'s> {
  /// The symbols to stream prices for; empty for all.
  #[serde(rename = "filter", serialize_with = "string_slice_to_str")]
  symbols: &'s [String],
  /// The region the symbols belong to.
  #[serde(rename = "region")]
  region: Region,
  /// An identifier the API uses to tell streams apart.
  #[serde(rename = "stream")]
  stream: Uuid,
}


/// Everything needed to open streaming connections, shared by a
/// `Client` and all the price streams it created.
#[derive(Debug)]
pub(crate) struct Connector {
  pub(crate) api_info: ApiInfo,
  pub(crate) transport: Arc<dyn Transport>,
  /// The capacity of the per-session and the output channels.
  pub(crate) capacity: usize,
  pub(crate) max_line_length: usize,
  /// The dispatcher background tasks report to.
  pub(crate) dispatch: Dispatch,
}

impl Connector {
  /// Create a streaming `Request` for the given symbols of a feed.
  pub(crate) fn request<F>(&self, symbols: &[String]) -> Result<Request<()>, Error>
  where
    F: Feed,
  {
    let query = StreamQuery {
      symbols,
      region: F::region(),
      stream: Uuid::new_v4(),
    };

    // The feed's path is relative to whatever path the base URL has.
    let mut url = self.api_info.base_url.clone();
    let _ = url
      .path_segments_mut()
      .map_err(|()| Error::Str("base URL cannot have a path".into()))?
      .pop_if_empty()
      .extend(F::kind().path().split('/').filter(|segment| !segment.is_empty()));
    url.set_query(Some(&to_query(&query)?));

    let request = Request::get(url.as_str())
      .header(ACCEPT, "text/event-stream")
      .header(CACHE_CONTROL, "no-cache")
      .header(CONNECTION, "keep-alive")
      // Add required authentication information.
      .header(AUTHORIZATION, format!("Bearer {}", self.api_info.api_key))
      .body(())?;
    Ok(request)
  }
}


/// A builder for creating customized `Client` objects.
#[derive(Debug)]
pub struct Builder {
  transport: Option<Arc<dyn Transport>>,
  max_idle: usize,
  capacity: usize,
  max_line_length: usize,
  dispatch: Option<Dispatch>,
}

impl Builder {
  /// Adjust the maximum number of idle connections per host.
  ///
  /// Only used when no custom transport is set.
  #[inline]
  pub fn max_idle_per_host(&mut self, max_idle: usize) -> &mut Self {
    self.max_idle = max_idle;
    self
  }

  /// Use a custom [`Transport`] for opening connections.
  #[inline]
  pub fn transport(&mut self, transport: Arc<dyn Transport>) -> &mut Self {
    self.transport = Some(transport);
    self
  }

  /// Adjust the number of envelopes that can be buffered between the
  /// connection and the consumer of a price stream.
  ///
  /// This is also the upper bound of envelopes of a previous
  /// subscription that may still be received after switching to a new
  /// one.
  #[inline]
  pub fn channel_capacity(&mut self, capacity: usize) -> &mut Self {
    self.capacity = capacity.max(1);
    self
  }

  /// Adjust the maximum length of a line of an event stream, in bytes.
  #[inline]
  pub fn max_line_length(&mut self, max_line_length: usize) -> &mut Self {
    self.max_line_length = max_line_length;
    self
  }

  /// Set the `tracing` dispatcher that background tasks report to.
  ///
  /// By default the dispatcher current at the time `build` is called
  /// is used.
  #[inline]
  pub fn dispatch(&mut self, dispatch: Dispatch) -> &mut Self {
    self.dispatch = Some(dispatch);
    self
  }

  /// Build the final `Client` object.
  pub fn build(&self, api_info: ApiInfo) -> Client {
    let transport = self
      .transport
      .clone()
      .unwrap_or_else(|| Arc::new(HyperTransport::new(self.max_idle)));
    let dispatch = self
      .dispatch
      .clone()
      .unwrap_or_else(|| get_default(Dispatch::clone));

    let connector = Connector {
      api_info,
      transport,
      capacity: self.capacity,
      max_line_length: self.max_line_length,
      dispatch,
    };

    Client {
      connector: Arc::new(connector),
    }
  }
}

impl Default for Builder {
  #[inline]
  fn default() -> Self {
    Self {
      transport: None,
      max_idle: usize::MAX,
      capacity: DEFAULT_CHANNEL_CAPACITY,
      max_line_length: DEFAULT_MAX_LINE_LENGTH,
      dispatch: None,
    }
  }
}


/// A `Client` is the entity used by clients of this module for
/// interacting with the Laplace API.
#[derive(Debug)]
pub struct Client {
  connector: Arc<Connector>,
}

impl Client {
  /// Instantiate a new `Builder` which allows for creating a customized `Client`.
  #[inline]
  pub fn builder() -> Builder {
    Builder::default()
  }

  /// Create a new `Client` using the given API information.
  #[inline]
  pub fn new(api_info: ApiInfo) -> Self {
    Builder::default().build(api_info)
  }

  /// Create a price stream for the feed `F` that is not yet subscribed
  /// to any symbols.
  #[inline]
  pub fn stream<F>(&self) -> PriceStream<F>
  where
    F: Feed,
  {
    PriceStream::new(self.connector.clone())
  }

  /// Create a price stream for the feed `F` that gets closed once
  /// `token` is cancelled.
  ///
  /// Cancelling `token` releases the connection and ends the stream
  /// for all receivers, just like [`PriceStream::close`] does, but
  /// without waiting for it. The stream rejects further subscriptions
  /// afterwards.
  #[inline]
  pub fn stream_with_cancellation<F>(&self, token: &CancellationToken) -> PriceStream<F>
  where
    F: Feed,
  {
    PriceStream::with_token(self.connector.clone(), token.child_token())
  }

  /// Create a price stream for the feed `F` and subscribe it to the
  /// given symbols.
  ///
  /// An empty list of symbols subscribes to all symbols of the feed.
  pub async fn subscribe<F, S>(&self, symbols: S) -> Result<PriceStream<F>, Error>
  where
    F: Feed,
    S: IntoIterator,
    S::Item: Into<String>,
  {
    let stream = self.stream::<F>();
    stream.subscribe(symbols).await?;
    Ok(stream)
  }

  /// Retrieve the `ApiInfo` object used by this `Client` instance.
  #[inline]
  pub fn api_info(&self) -> &ApiInfo {
    &self.connector.api_info
  }
}
