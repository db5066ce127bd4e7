// Copyright (C) 2024-2026 The laplace Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use serde::Deserialize;

use crate::stream::Feed;
use crate::stream::FeedKind;
use crate::stream::Region;


/// A real time price update for a BIST equity.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[non_exhaustive]
pub struct BistLivePrice {
  /// The symbol the update is for.
  #[serde(rename = "s")]
  pub symbol: String,
  /// The change relative to the previous day's close, in percent.
  #[serde(rename = "ch")]
  pub daily_percent_change: f64,
  /// The most recent price.
  #[serde(rename = "p")]
  pub close_price: f64,
}


/// A real time quote update for a US equity.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[non_exhaustive]
pub struct UsLivePrice {
  /// The symbol the update is for.
  #[serde(rename = "s")]
  pub symbol: String,
  /// The bid price.
  #[serde(rename = "bp")]
  pub bid_price: f64,
  /// The ask price.
  #[serde(rename = "ap")]
  pub ask_price: f64,
}


/// A delayed price update for a BIST equity.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[non_exhaustive]
pub struct BistDelayedPrice {
  /// The symbol the update is for.
  #[serde(rename = "s")]
  pub symbol: String,
  /// The change relative to the previous day's close, in percent.
  #[serde(rename = "ch")]
  pub daily_percent_change: f64,
  /// The price.
  #[serde(rename = "p")]
  pub close_price: f64,
  /// The time stamp of the price, as reported by the API.
  #[serde(rename = "d")]
  pub date: i64,
}


/// A delayed price update for a US equity.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[non_exhaustive]
pub struct UsDelayedPrice {
  /// The symbol the update is for.
  #[serde(rename = "s")]
  pub symbol: String,
  /// The price.
  #[serde(rename = "p")]
  pub price: f64,
  /// The time stamp of the price, as reported by the API.
  #[serde(rename = "d")]
  pub date: i64,
}


macro_rules! feed {
  ( $(#[$docs:meta])* $name:ident, $event:ty, $kind:ident, $region:ident ) => {
    $(#[$docs])*
    #[derive(Debug)]
    pub enum $name {}

    impl Feed for $name {
      type Event = $event;

      #[inline]
      fn kind() -> FeedKind {
        FeedKind::$kind
      }

      #[inline]
      fn region() -> Region {
        Region::$region
      }
    }
  };
}

feed! {
  /// The real time price feed for BIST equities.
  BistLive, BistLivePrice, Live, Tr
}

feed! {
  /// The real time quote feed for US equities.
  UsLive, UsLivePrice, Live, Us
}

feed! {
  /// The delayed price feed for BIST equities.
  BistDelayed, BistDelayedPrice, Delayed, Tr
}

feed! {
  /// The delayed price feed for US equities.
  UsDelayed, UsDelayedPrice, Delayed, Us
}
