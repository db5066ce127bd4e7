// Copyright (C) 2019-2026 The laplace Developers
// SPDX-License-Identifier: GPL-3.0-or-later

#![allow(clippy::unreadable_literal)]
#![warn(
  bad_style,
  dead_code,
  future_incompatible,
  improper_ctypes,
  late_bound_lifetime_arguments,
  missing_copy_implementations,
  missing_debug_implementations,
  missing_docs,
  no_mangle_generic_items,
  non_shorthand_field_patterns,
  nonstandard_style,
  overflowing_literals,
  path_statements,
  patterns_in_fns_without_body,
  proc_macro_derive_resolution_fallback,
  renamed_and_removed_lints,
  rust_2018_compatibility,
  rust_2018_idioms,
  stable_features,
  trivial_bounds,
  trivial_numeric_casts,
  type_alias_bounds,
  tyvar_behind_raw_pointer,
  unconditional_recursion,
  unreachable_code,
  unreachable_patterns,
  unstable_features,
  unstable_name_collisions,
  unused,
  unused_comparisons,
  unused_import_braces,
  unused_lifetimes,
  unused_results,
  while_true,
)]
#![warn(rustdoc::broken_intra_doc_links)]

//! A crate for streaming market data from the Laplace API.
//!
//! Prices are delivered as Server-Sent-Events. A [`Client`] creates
//! [`PriceStream`][stream::PriceStream] objects for one of the feeds
//! in the [`stream`] module, each of which can be subscribed to a list
//! of symbols and later be resubscribed to a different list, without
//! the consumer having to switch channels:
//!
//! ```no_run
//! # use laplace::ApiInfo;
//! # use laplace::Client;
//! # use laplace::stream::BistLive;
//! # #[tokio::main]
//! # async fn main() -> Result<(), laplace::Error> {
//! let client = Client::new(ApiInfo::from_env()?);
//! let stream = client.subscribe::<BistLive, _>(["AKBNK", "THYAO"]).await?;
//! let receiver = stream.receive();
//!
//! if let Some(Ok(price)) = receiver.recv().await {
//!   println!("{}: {}", price.symbol, price.close_price);
//! }
//!
//! stream.subscribe(["TUPRS"]).await?;
//! stream.close().await?;
//! # Ok(())
//! # }
//! ```

mod api_info;
mod client;
mod error;
mod transport;
mod util;

/// A module for streaming prices.
pub mod stream;

use std::borrow::Cow;

pub use crate::api_info::ApiInfo;
pub use crate::client::Builder;
pub use crate::client::Client;
pub use crate::error::ApiErrorKind;
pub use crate::error::Error;
pub use crate::error::ErrorMessage;
pub use crate::error::HttpBody;
pub use crate::error::StreamError;
pub use crate::transport::ByteStream;
pub use crate::transport::HyperTransport;
pub use crate::transport::Transport;

pub use tokio_util::sync::CancellationToken;

type Str = Cow<'static, str>;
