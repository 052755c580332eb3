//! Authority-bound OAuth 2.0 token acquisition.
//!
//! An [`AuthenticationContext`](flows::AuthenticationContext) resolves access tokens from its
//! cache first, redeems cached (or family) refresh tokens next, and only then falls back to an
//! interactive provider or a broker application. Concurrent calls for the same key share one
//! resolution.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

/// Emits a `tracing` event when the `tracing` feature is enabled; compiles to nothing otherwise.
macro_rules! flow_event {
	($level:ident, $($arg:tt)+) => {
		#[cfg(feature = "tracing")]
		{
			tracing::$level!($($arg)+);
		}
	};
}

pub mod auth;
pub mod broker;
pub mod cache;
pub mod clock;
pub mod config;
pub mod correlation;
pub mod endpoint;
pub mod error;
pub mod flows;
pub mod interactive;
pub mod obs;
pub mod result;
pub mod store;

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap, HashSet},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
