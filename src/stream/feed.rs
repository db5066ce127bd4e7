// Copyright (C) 2022-2026 The laplace Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use serde::de::DeserializeOwned;
use serde::Serialize;


/// The market region a feed covers.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, Serialize)]
#[non_exhaustive]
pub enum Region {
  /// Borsa Istanbul (BIST) equities.
  #[serde(rename = "tr")]
  Tr,
  /// US equities.
  #[serde(rename = "us")]
  Us,
}


/// The timeliness of the prices a feed delivers.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum FeedKind {
  /// Real time prices.
  Live,
  /// Prices delayed according to the exchange's licensing terms.
  ///
  /// This feed is available without a real time data entitlement.
  Delayed,
}

impl FeedKind {
  /// The path of the endpoint serving this kind of feed.
  pub(crate) fn path(self) -> &'static str {
    match self {
      Self::Live => "/api/v1/stock/price/live",
      Self::Delayed => "/api/v1/stock/price/delayed",
    }
  }
}


/// A trait representing a particular price feed that can be streamed.
pub trait Feed {
  /// The events being reported through the stream.
  type Event: DeserializeOwned + Send + 'static;

  /// The kind of feed.
  fn kind() -> FeedKind;

  /// The region the feed covers.
  fn region() -> Region;
}
