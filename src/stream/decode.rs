// Copyright (C) 2024-2026 The laplace Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use serde::de::DeserializeOwned;
use serde_json::from_slice as from_json;

use crate::StreamError;


/// The unit delivered through a price stream: either a decoded event or
/// the error that took its place.
pub type Envelope<T> = Result<T, StreamError>;


/// Decode a single event payload.
///
/// A malformed payload, including one that is not valid UTF-8, yields
/// an error envelope carrying the payload; it has no effect on the
/// stream it was received on.
pub(crate) fn decode<T>(payload: &[u8]) -> Envelope<T>
where
  T: DeserializeOwned,
{
  from_json::<T>(payload).map_err(|source| StreamError::Decode {
    payload: String::from_utf8_lossy(payload).into_owned(),
    source,
  })
}
