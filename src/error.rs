// Copyright (C) 2019-2026 The laplace Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::str::from_utf8;

use dotenvy::Error as DotenvError;
use http::Error as HttpError;
use http::StatusCode as HttpStatusCode;
use hyper::Error as HyperError;
use hyper_util::client::legacy::Error as HyperClientError;
use serde::Deserialize;
use serde_json::from_slice as from_json;
use serde_json::Error as JsonError;
use serde_urlencoded::ser::Error as UrlEncodeError;
use thiserror::Error;
use url::ParseError;

use crate::Str;


/// The raw body of an HTTP response that could not be interpreted.
#[derive(Clone, Debug, Error, PartialEq)]
pub struct HttpBody(Vec<u8>);

impl HttpBody {
  /// Retrieve the raw bytes of the body.
  #[inline]
  pub fn as_bytes(&self) -> &[u8] {
    &self.0
  }
}

impl Display for HttpBody {
  fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
    match from_utf8(&self.0) {
      Ok(s) => fmt.write_str(s)?,
      Err(b) => write!(fmt, "{:?}", b)?,
    }
    Ok(())
  }
}


/// An error message as reported by the Laplace API.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct ErrorMessage {
  /// The human readable message.
  #[serde(rename = "message")]
  pub message: String,
  /// A machine readable error code, if provided.
  #[serde(rename = "error_code", default)]
  pub error_code: String,
}

impl Display for ErrorMessage {
  fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
    if self.error_code.is_empty() {
      fmt.write_str(&self.message)
    } else {
      write!(fmt, "{} ({})", self.message, self.error_code)
    }
  }
}


/// A well-known failure condition the API may report.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum ApiErrorKind {
  /// The account has no access to the requested endpoint.
  #[error("you do not have access to this endpoint")]
  NoEndpointAccess,
  /// A usage limit was exceeded.
  #[error("limit exceeded")]
  LimitExceeded,
  /// The endpoint is currently not active.
  #[error("endpoint is not active")]
  EndpointInactive,
  /// The API key was rejected.
  #[error("invalid token")]
  InvalidToken,
  /// An object ID supplied with the request was invalid.
  #[error("invalid object id")]
  InvalidId,
}

impl ApiErrorKind {
  /// Map an HTTP status and the accompanying message to a known error
  /// kind, if there is one.
  pub(crate) fn classify(status: HttpStatusCode, message: &str) -> Option<Self> {
    match status {
      HttpStatusCode::FORBIDDEN => {
        if message.contains("limit exceeded") {
          Some(Self::LimitExceeded)
        } else if message == "you don't have access to this endpoint" {
          Some(Self::NoEndpointAccess)
        } else if message == "endpoint is not active" {
          Some(Self::EndpointInactive)
        } else {
          None
        }
      },
      HttpStatusCode::BAD_REQUEST if message == "invalid id" => Some(Self::InvalidId),
      HttpStatusCode::UNAUTHORIZED if message == "invalid token" => Some(Self::InvalidToken),
      _ => None,
    }
  }
}


/// The error type as used by this crate.
#[derive(Debug, Error)]
pub enum Error {
  /// A `.env` file could not be loaded.
  #[error("failed to load environment file")]
  Dotenv(
    #[from]
    #[source]
    DotenvError,
  ),
  /// An HTTP related error.
  #[error("encountered an HTTP related error")]
  Http(
    #[from]
    #[source]
    HttpError,
  ),
  /// We encountered an HTTP status code that represents a failure and
  /// the body could not be interpreted as an API error message.
  #[error("encountered an unexpected HTTP status: {0}")]
  HttpStatus(HttpStatusCode, #[source] HttpBody),
  /// The API rejected a request with an error message.
  #[error("the API reported an error (HTTP status {status}): {message}")]
  Api {
    /// The HTTP status the API responded with.
    status: HttpStatusCode,
    /// The message accompanying the status.
    message: ErrorMessage,
    /// The well-known failure condition, if the message maps to one.
    #[source]
    kind: Option<ApiErrorKind>,
  },
  /// An error reported by the `hyper` crate.
  #[error("the hyper crate reported an error")]
  Hyper(
    #[from]
    #[source]
    HyperError,
  ),
  /// An error reported by the `hyper` connection pool.
  #[error("failed to issue HTTP request")]
  HyperClient(
    #[from]
    #[source]
    HyperClientError,
  ),
  /// A JSON conversion error.
  #[error("a JSON conversion failed")]
  Json(
    #[from]
    #[source]
    JsonError,
  ),
  /// An error directly originating in this crate.
  #[error("{0}")]
  Str(Str),
  /// An URL parsing error.
  #[error("failed to parse the URL")]
  Url(
    #[from]
    #[source]
    ParseError,
  ),
  /// Failed to encode a URL query.
  #[error("failed to encode URL query")]
  UrlEncode(
    #[from]
    #[source]
    UrlEncodeError,
  ),
  /// The price stream was closed and can no longer be used.
  #[error("the price stream has been closed")]
  Closed,
}

impl Error {
  /// Create an error from a failure HTTP status and the response body.
  pub(crate) fn from_response(status: HttpStatusCode, body: Vec<u8>) -> Self {
    match from_json::<ErrorMessage>(&body) {
      Ok(message) => {
        let kind = ApiErrorKind::classify(status, &message.message);
        Self::Api {
          status,
          message,
          kind,
        }
      },
      Err(_) => Self::HttpStatus(status, HttpBody(body)),
    }
  }

  /// Retrieve the well-known API failure condition this error
  /// represents, if any.
  #[inline]
  pub fn api_kind(&self) -> Option<ApiErrorKind> {
    match self {
      Self::Api { kind, .. } => *kind,
      _ => None,
    }
  }

  /// Retrieve the HTTP status this error was caused by, if any.
  pub fn status(&self) -> Option<HttpStatusCode> {
    match self {
      Self::Api { status, .. } | Self::HttpStatus(status, ..) => Some(*status),
      _ => None,
    }
  }
}


/// An error delivered in place of an event on a price stream.
#[derive(Debug, Error)]
pub enum StreamError {
  /// An event payload could not be decoded. The stream stays intact.
  #[error("failed to decode event payload: {payload}")]
  Decode {
    /// The payload as it was received, with invalid UTF-8 sequences
    /// replaced.
    payload: String,
    /// The underlying decoding error.
    #[source]
    source: JsonError,
  },
  /// Reading from the event stream failed. No more events will be
  /// delivered for the subscription that reported it.
  #[error("failed to read from the event stream")]
  Read(#[source] Error),
}
