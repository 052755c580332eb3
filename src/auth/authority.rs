//! Validated authority (identity provider instance + tenant) and its derived endpoints.

// self
use crate::{_prelude::*, error::ConfigError};

/// Normalized AAD/ADFS-style authority, e.g. `https://login.example.com/tenant`.
///
/// Authorities are validated once at construction: HTTPS only, a non-empty tenant path,
/// no query or fragment. The canonical form is lowercase without a trailing slash so it
/// can be compared byte-for-byte inside cache keys.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Authority {
	canonical: String,
	token_endpoint: Url,
	authorize_endpoint: Url,
}
impl Authority {
	const TOKEN_PATH: &'static str = "oauth2/token";
	const AUTHORIZE_PATH: &'static str = "oauth2/authorize";

	/// Parses and normalizes an authority string.
	pub fn new(value: impl AsRef<str>) -> Result<Self, ConfigError> {
		let raw = value.as_ref();
		let invalid = |reason| ConfigError::InvalidAuthority { authority: raw.to_owned(), reason };
		let url = Url::parse(raw.trim()).map_err(|_| invalid("not a valid URL"))?;

		if url.scheme() != "https" {
			return Err(invalid("the scheme must be https"));
		}
		if url.query().is_some() || url.fragment().is_some() {
			return Err(invalid("query and fragment components are not allowed"));
		}

		let host = url.host_str().ok_or_else(|| invalid("a host is required"))?;
		let path = url.path().trim_matches('/');

		if path.is_empty() {
			return Err(invalid("a tenant path segment is required"));
		}

		let port = url.port().map(|port| format!(":{port}")).unwrap_or_default();
		let canonical = format!("https://{host}{port}/{path}").to_ascii_lowercase();
		let token_endpoint = Url::parse(&format!("{canonical}/{}", Self::TOKEN_PATH))
			.map_err(|source| ConfigError::InvalidUrl { field: "token endpoint", source })?;
		let authorize_endpoint = Url::parse(&format!("{canonical}/{}", Self::AUTHORIZE_PATH))
			.map_err(|source| ConfigError::InvalidUrl { field: "authorize endpoint", source })?;

		Ok(Self { canonical, token_endpoint, authorize_endpoint })
	}

	/// Returns the canonical authority string.
	pub fn as_str(&self) -> &str {
		&self.canonical
	}

	/// Tenant (last path segment) the authority is bound to.
	pub fn tenant(&self) -> &str {
		self.canonical.rsplit('/').next().unwrap_or_default()
	}

	/// Token endpoint derived from the authority.
	pub fn token_endpoint(&self) -> &Url {
		&self.token_endpoint
	}

	/// Authorization endpoint derived from the authority.
	pub fn authorize_endpoint(&self) -> &Url {
		&self.authorize_endpoint
	}
}
impl AsRef<str> for Authority {
	fn as_ref(&self) -> &str {
		&self.canonical
	}
}
impl From<Authority> for String {
	fn from(value: Authority) -> Self {
		value.canonical
	}
}
impl TryFrom<String> for Authority {
	type Error = ConfigError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}
impl FromStr for Authority {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}
impl Debug for Authority {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Authority({})", self.canonical)
	}
}
impl Display for Authority {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.canonical)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn authority_is_normalized() {
		let authority = Authority::new("https://Login.Example.com/Tenant/")
			.expect("Mixed-case authority should normalize.");

		assert_eq!(authority.as_str(), "https://login.example.com/tenant");
		assert_eq!(authority.tenant(), "tenant");
		assert_eq!(
			authority.token_endpoint().as_str(),
			"https://login.example.com/tenant/oauth2/token"
		);
		assert_eq!(
			authority.authorize_endpoint().as_str(),
			"https://login.example.com/tenant/oauth2/authorize"
		);
	}

	#[test]
	fn authority_rules_are_enforced() {
		for raw in [
			"http://login.example.com/tenant",
			"https://login.example.com",
			"https://login.example.com/",
			"https://login.example.com/tenant?x=1",
			"https://login.example.com/tenant#frag",
			"not a url",
		] {
			assert!(
				matches!(Authority::new(raw), Err(ConfigError::InvalidAuthority { .. })),
				"Authority `{raw}` should be rejected."
			);
		}
	}

	#[test]
	fn authority_keeps_explicit_port() {
		let authority = Authority::new("https://127.0.0.1:8443/adfs")
			.expect("Authority with explicit port should be valid.");

		assert_eq!(authority.as_str(), "https://127.0.0.1:8443/adfs");
		assert_eq!(authority.token_endpoint().port(), Some(8443));
	}

	#[test]
	fn serde_round_trip_revalidates() {
		let authority: Authority = serde_json::from_str("\"https://login.example.com/contoso\"")
			.expect("Authority should deserialize.");

		assert_eq!(authority.token_endpoint().path(), "/contoso/oauth2/token");
		assert!(serde_json::from_str::<Authority>("\"http://login.example.com/contoso\"").is_err());
	}
}
