// Copyright (C) 2019-2026 The laplace Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use std::env::var_os;
use std::ffi::OsString;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::path::Path;

use dotenvy::dotenv;
use dotenvy::from_path_override;

use url::Url;

use crate::Error;

/// The default base URL of the Laplace API.
pub(crate) const API_BASE_URL: &str = "https://laplace.finfree.app";

/// The environment variable representing the base URL of the API.
const ENV_API_URL: &str = "LAPLACE_API_BASE_URL";
/// The environment variable representing the API key.
const ENV_API_KEY: &str = "LAPLACE_API_KEY";


/// An object encapsulating the information used for working with the
/// Laplace API.
#[derive(Clone, PartialEq)]
pub struct ApiInfo {
  /// The base URL for the API.
  pub(crate) base_url: Url,
  /// The key to use for authentication.
  pub(crate) api_key: String,
}

impl ApiInfo {
  /// Create an `ApiInfo` from the required data.
  ///
  /// # Errors
  /// - [`Error::Url`](crate::Error::Url) If `base_url` cannot be parsed
  ///   into a [`url::Url`](url::Url).
  /// - [`Error::Str`](crate::Error::Str) If `api_key` is empty.
  pub fn from_parts(base_url: impl AsRef<str>, api_key: impl ToString) -> Result<Self, Error> {
    let api_info = Self {
      base_url: Url::parse(base_url.as_ref())?,
      api_key: api_key.to_string(),
    };
    api_info.validate()?;
    Ok(api_info)
  }

  /// Create an `ApiInfo` object with information from the environment.
  ///
  /// The following information is used:
  /// - the API base URL is retrieved from the LAPLACE_API_BASE_URL
  ///   variable, falling back to the public endpoint if it is unset or
  ///   empty
  /// - the API key is retrieved from the LAPLACE_API_KEY variable
  pub fn from_env() -> Result<Self, Error> {
    let base_url = var_os(ENV_API_URL)
      .filter(|url| !url.is_empty())
      .unwrap_or_else(|| OsString::from(API_BASE_URL))
      .into_string()
      .map_err(|_| {
        Error::Str(format!("{} environment variable is not a valid string", ENV_API_URL).into())
      })?;
    let base_url = Url::parse(&base_url)?;

    let api_key = var_os(ENV_API_KEY)
      .ok_or_else(|| Error::Str(format!("{} environment variable not found", ENV_API_KEY).into()))?
      .into_string()
      .map_err(|_| {
        Error::Str(format!("{} environment variable is not a valid string", ENV_API_KEY).into())
      })?;

    let api_info = Self { base_url, api_key };
    api_info.validate()?;
    Ok(api_info)
  }

  /// Create an `ApiInfo` object with information from the environment,
  /// after loading variables from a `.env` file.
  ///
  /// If `path` is provided, the file has to exist and its variables
  /// take precedence over those already set. Otherwise, a `.env` file
  /// in the current directory or one of its parents is loaded if there
  /// is one, without overriding any variable already set.
  ///
  /// See [`ApiInfo::from_env`] for the variables used.
  pub fn from_dotenv(path: Option<&Path>) -> Result<Self, Error> {
    match path {
      Some(path) => from_path_override(path)?,
      None => match dotenv() {
        Ok(_path) => (),
        Err(err) if err.not_found() => (),
        Err(err) => return Err(err.into()),
      },
    }
    Self::from_env()
  }

  fn validate(&self) -> Result<(), Error> {
    if self.api_key.is_empty() {
      return Err(Error::Str("API key is required".into()))
    }
    if self.base_url.cannot_be_a_base() {
      return Err(Error::Str(format!("{} cannot be used as a base URL", self.base_url).into()))
    }
    Ok(())
  }

  /// Retrieve the base URL of the API.
  #[inline]
  pub fn base_url(&self) -> &Url {
    &self.base_url
  }
}

// The API key never ends up in logs.
impl Debug for ApiInfo {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("ApiInfo")
      .field("base_url", &self.base_url.as_str())
      .field("api_key", &"<masked>")
      .finish()
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  use std::env::remove_var;
  use std::env::set_var;
  use std::env::temp_dir;
  use std::fs::remove_file;
  use std::fs::write;

  use serial_test::serial;

  use uuid::Uuid;


  /// Check that an empty API key is rejected.
  #[test]
  fn reject_empty_key() {
    let err = ApiInfo::from_parts(API_BASE_URL, "").unwrap_err();
    assert_eq!(err.to_string(), "API key is required");
  }

  /// Check that an invalid URL is reported as such.
  #[test]
  fn reject_invalid_url() {
    let err = ApiInfo::from_parts("not a url", "key").unwrap_err();
    assert!(matches!(err, Error::Url(..)), "{err:?}");
  }

  /// Make sure that the API key does not show up in debug output.
  #[test]
  fn debug_masks_key() {
    let api_info = ApiInfo::from_parts(API_BASE_URL, "super-secret").unwrap();
    let string = format!("{api_info:?}");
    assert!(!string.contains("super-secret"), "{string}");
    assert!(string.contains("<masked>"), "{string}");
  }

  /// Check that we pick up the environment, with a default base URL.
  #[test]
  #[serial]
  fn from_environment() {
    remove_var(ENV_API_URL);
    set_var(ENV_API_KEY, "env-key");

    let api_info = ApiInfo::from_env().unwrap();
    assert_eq!(api_info.base_url().as_str(), "https://laplace.finfree.app/");
    assert_eq!(api_info.api_key, "env-key");

    set_var(ENV_API_URL, "http://localhost:8080");
    let api_info = ApiInfo::from_env().unwrap();
    assert_eq!(api_info.base_url().as_str(), "http://localhost:8080/");

    remove_var(ENV_API_URL);
    remove_var(ENV_API_KEY);
  }

  /// Check that an empty base URL variable is treated as if it was not
  /// set.
  #[test]
  #[serial]
  fn empty_base_url() {
    set_var(ENV_API_URL, "");
    set_var(ENV_API_KEY, "env-key");

    let api_info = ApiInfo::from_env().unwrap();
    assert_eq!(api_info.base_url().as_str(), "https://laplace.finfree.app/");

    remove_var(ENV_API_URL);
    remove_var(ENV_API_KEY);
  }

  /// Check that variables from an explicitly provided `.env` file are
  /// picked up and override the environment.
  #[test]
  #[serial]
  fn from_dotenv_file() {
    let path = temp_dir().join(format!("laplace-{}.env", Uuid::new_v4()));
    write(&path, "LAPLACE_API_KEY=file-key\nLAPLACE_API_BASE_URL=\n").unwrap();
    set_var(ENV_API_KEY, "env-key");

    let result = ApiInfo::from_dotenv(Some(&path));
    let () = remove_file(&path).unwrap();
    let api_info = result.unwrap();
    assert_eq!(api_info.api_key, "file-key");
    assert_eq!(api_info.base_url().as_str(), "https://laplace.finfree.app/");

    remove_var(ENV_API_URL);
    remove_var(ENV_API_KEY);
  }

  /// Check that an explicitly provided `.env` file has to exist.
  #[test]
  #[serial]
  fn from_missing_dotenv_file() {
    let path = temp_dir().join(format!("laplace-{}.env", Uuid::new_v4()));
    let err = ApiInfo::from_dotenv(Some(&path)).unwrap_err();
    assert!(matches!(err, Error::Dotenv(..)), "{err:?}");
  }

  /// Check that URLs that cannot carry a path are rejected.
  #[test]
  fn reject_cannot_be_a_base_url() {
    let err = ApiInfo::from_parts("mailto:api@laplace.example", "key").unwrap_err();
    assert!(matches!(err, Error::Str(..)), "{err:?}");
  }

  /// Check that a missing API key is reported.
  #[test]
  #[serial]
  fn missing_key() {
    remove_var(ENV_API_KEY);
    let err = ApiInfo::from_env().unwrap_err();
    assert_eq!(err.to_string(), "LAPLACE_API_KEY environment variable not found");
  }
}
