// Copyright (C) 2019-2026 The laplace Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;

use async_trait::async_trait;

use futures::stream::BoxStream;
use futures::StreamExt as _;
use futures::TryStreamExt as _;

use http::header::AUTHORIZATION;
use http::HeaderMap;
use http::HeaderValue;
use http::Request;
use http::Response;
use http_body_util::BodyExt as _;
use http_body_util::Empty;

use hyper::body::Bytes;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HttpClient;
use hyper_util::rt::TokioExecutor;

use tracing::debug;
use tracing::field::debug;
use tracing::field::DebugValue;
use tracing::trace;

use crate::Error;


/// The body of a streaming response: a sequence of byte chunks.
///
/// Dropping the stream releases the underlying connection.
pub type ByteStream = BoxStream<'static, Result<Bytes, Error>>;


/// A type providing a debug representation of HTTP headers, with
/// sensitive data being masked out.
struct DebugHeaders<'h> {
  headers: &'h HeaderMap<HeaderValue>,
}

impl Debug for DebugHeaders<'_> {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    static MASKED: HeaderValue = HeaderValue::from_static("<masked>");

    f.debug_map()
      .entries(self.headers.iter().map(|(k, v)| {
        if k == AUTHORIZATION {
          (k, &MASKED)
        } else {
          (k, v)
        }
      }))
      .finish()
  }
}


/// A type providing a debug representation of an HTTP request, with
/// sensitive data being masked out.
struct DebugRequest<'r> {
  request: &'r Request<()>,
}

impl Debug for DebugRequest<'_> {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    // Note that we do not print the URL, because we assume it is
    // already included as an identifier in the span of the usage site.
    f.debug_struct("Request")
      .field("method", self.request.method())
      .field("version", &self.request.version())
      .field(
        "headers",
        &DebugHeaders {
          headers: self.request.headers(),
        },
      )
      .finish()
  }
}


/// Emit a debug representation of an HTTP request.
fn debug_request(request: &Request<()>) -> DebugValue<DebugRequest<'_>> {
  debug(DebugRequest { request })
}


/// The capability of opening a streaming HTTP request.
///
/// Implementations report transport level failures as errors. The
/// response status is evaluated by the caller, before any of the body
/// is consumed.
#[async_trait]
pub trait Transport: Debug + Send + Sync {
  /// Issue the request and return the response with a streaming body.
  async fn open(&self, request: Request<()>) -> Result<Response<ByteStream>, Error>;
}


#[cfg(feature = "native-tls")]
type Connector = hyper_tls::HttpsConnector<HttpConnector>;
#[cfg(not(feature = "native-tls"))]
type Connector = HttpConnector;

#[cfg(feature = "native-tls")]
fn connector() -> Connector {
  hyper_tls::HttpsConnector::new()
}

#[cfg(not(feature = "native-tls"))]
fn connector() -> Connector {
  HttpConnector::new()
}


/// A [`Transport`] backed by a `hyper` connection pool.
#[derive(Debug)]
pub struct HyperTransport {
  client: HttpClient<Connector, Empty<Bytes>>,
}

impl HyperTransport {
  /// Create a new `HyperTransport` keeping at most `max_idle` idle
  /// connections per host around.
  pub fn new(max_idle: usize) -> Self {
    let mut builder = HttpClient::builder(TokioExecutor::new());
    let _ = builder.pool_max_idle_per_host(max_idle);

    Self {
      client: builder.build(connector()),
    }
  }
}

impl Default for HyperTransport {
  #[inline]
  fn default() -> Self {
    Self::new(usize::MAX)
  }
}

#[async_trait]
impl Transport for HyperTransport {
  async fn open(&self, request: Request<()>) -> Result<Response<ByteStream>, Error> {
    debug!("requesting");
    trace!(request = debug_request(&request));

    let request = request.map(|()| Empty::new());
    let response = self.client.request(request).await?;
    debug!(status = debug(&response.status()));
    trace!(response = debug(&response));

    let response = response.map(|body| {
      body
        .into_data_stream()
        .map_err(Error::from)
        .boxed()
    });
    Ok(response)
  }
}


#[cfg(test)]
pub(crate) mod test {
  use super::*;

  use std::pin::Pin;
  use std::sync::atomic::AtomicBool;
  use std::sync::atomic::Ordering;
  use std::sync::Arc;
  use std::sync::Mutex;
  use std::task::Context;
  use std::task::Poll;
  use std::time::Duration;

  use futures::stream::iter;
  use futures::stream::pending;
  use futures::stream::unfold;
  use futures::Stream;
  use futures::StreamExt as _;

  use http::StatusCode;
  use http::Uri;

  use url::form_urlencoded::parse as parse_query;


  type Handler = dyn Fn(&Request<()>) -> Result<Response<ByteStream>, Error> + Send + Sync;


  /// A byte stream reporting when it got dropped.
  struct Tracked {
    inner: ByteStream,
    released: Arc<AtomicBool>,
  }

  impl Stream for Tracked {
    type Item = Result<Bytes, Error>;

    fn poll_next(mut self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
      self.inner.poll_next_unpin(ctx)
    }
  }

  impl Drop for Tracked {
    fn drop(&mut self) {
      self.released.store(true, Ordering::SeqCst);
    }
  }


  /// A connection opened through a [`FakeTransport`].
  #[derive(Clone, Debug)]
  pub(crate) struct Connection {
    pub(crate) uri: Uri,
    pub(crate) headers: HeaderMap,
    released: Arc<AtomicBool>,
  }

  impl Connection {
    /// Check whether the response body of this connection was dropped.
    pub(crate) fn is_released(&self) -> bool {
      self.released.load(Ordering::SeqCst)
    }

    /// Retrieve the value of a query parameter of the request.
    pub(crate) fn query(&self, key: &str) -> Option<String> {
      let query = self.uri.query().unwrap_or_default();
      parse_query(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
    }
  }


  /// A `Transport` serving canned responses and recording every
  /// connection it opened.
  pub(crate) struct FakeTransport {
    handler: Box<Handler>,
    connections: Mutex<Vec<Connection>>,
  }

  impl FakeTransport {
    pub(crate) fn new<H>(handler: H) -> Arc<Self>
    where
      H: Fn(&Request<()>) -> Result<Response<ByteStream>, Error> + Send + Sync + 'static,
    {
      Arc::new(Self {
        handler: Box::new(handler),
        connections: Mutex::new(Vec::new()),
      })
    }

    /// A transport answering every request with the given status and
    /// body.
    pub(crate) fn with_status(status: StatusCode, body: &'static str) -> Arc<Self> {
      Self::new(move |_| respond(status, lines([body])))
    }

    pub(crate) fn connections(&self) -> Vec<Connection> {
      self.connections.lock().unwrap().clone()
    }
  }

  impl Debug for FakeTransport {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
      f.debug_struct("FakeTransport").finish_non_exhaustive()
    }
  }

  #[async_trait]
  impl Transport for FakeTransport {
    async fn open(&self, request: Request<()>) -> Result<Response<ByteStream>, Error> {
      let response = (self.handler)(&request)?;
      let released = Arc::new(AtomicBool::new(false));
      let connection = Connection {
        uri: request.uri().clone(),
        headers: request.headers().clone(),
        released: released.clone(),
      };
      self.connections.lock().unwrap().push(connection);

      Ok(response.map(|inner| Tracked { inner, released }.boxed()))
    }
  }


  /// Create a response with the given status and body.
  pub(crate) fn respond(status: StatusCode, body: ByteStream) -> Result<Response<ByteStream>, Error> {
    Ok(Response::builder().status(status).body(body)?)
  }

  /// A finite body consisting of the given chunks.
  pub(crate) fn lines<I>(chunks: I) -> ByteStream
  where
    I: IntoIterator<Item = &'static str>,
    I::IntoIter: Send + 'static,
  {
    iter(chunks.into_iter().map(|chunk| Ok(Bytes::from_static(chunk.as_bytes())))).boxed()
  }

  /// A body consisting of the given chunks that never ends.
  pub(crate) fn lines_then_idle<I>(chunks: I) -> ByteStream
  where
    I: IntoIterator<Item = &'static str>,
    I::IntoIter: Send + 'static,
  {
    lines(chunks).chain(pending()).boxed()
  }

  /// An endless body reporting a price event for each of the symbols
  /// every few milliseconds.
  pub(crate) fn ticking(symbols: Vec<String>) -> ByteStream {
    unfold(0u64, move |seq| {
      let chunk = symbols
        .iter()
        .map(|symbol| format!("data: {{\"s\":\"{symbol}\",\"n\":{seq}}}\n"))
        .collect::<String>();
      async move {
        tokio::time::sleep(Duration::from_millis(2)).await;
        Some((Ok(Bytes::from(format!(": heartbeat\n{chunk}"))), seq + 1))
      }
    })
    .boxed()
  }

  /// Extract the symbols a streaming request asks for.
  pub(crate) fn requested_symbols(request: &Request<()>) -> Vec<String> {
    let query = request.uri().query().unwrap_or_default();
    parse_query(query.as_bytes())
      .find(|(k, _)| k == "filter")
      .map(|(_, v)| {
        v.split(',')
          .filter(|s| !s.is_empty())
          .map(str::to_owned)
          .collect()
      })
      .unwrap_or_default()
  }
}
