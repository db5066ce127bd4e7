// Copyright (C) 2020-2026 The laplace Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use serde::Serializer;


/// Serialize a slice of strings into a comma-separated string combining
/// the individual strings.
///
/// An empty slice results in an empty string, not in an omitted value:
/// the API interprets an empty symbol filter as "all symbols".
pub(crate) fn string_slice_to_str<S>(slice: &[String], serializer: S) -> Result<S::Ok, S::Error>
where
  S: Serializer,
{
  // `serde_urlencoded` seemingly does not know how to handle a `Vec`.
  // So we concatenate the elements ourselves, separating each by comma.
  serializer.serialize_str(&slice.join(","))
}
