// Copyright (C) 2024-2026 The laplace Developers
// SPDX-License-Identifier: GPL-3.0-or-later

mod decode;
mod feed;
mod frame;
mod handle;
mod price;
mod session;

pub use decode::Envelope;
pub use feed::Feed;
pub use feed::FeedKind;
pub use feed::Region;
pub use handle::PriceStream;
pub use handle::Receiver;
pub use price::BistDelayed;
pub use price::BistDelayedPrice;
pub use price::BistLive;
pub use price::BistLivePrice;
pub use price::UsDelayed;
pub use price::UsDelayedPrice;
pub use price::UsLive;
pub use price::UsLivePrice;
