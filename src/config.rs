//! Context-wide options and broker configuration.

// self
use crate::{_prelude::*, auth::FamilyId, clock::ExpiryPolicy, error::ConfigError};

/// How the user may be asked for credentials.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CredentialsType {
	/// Let the context choose; a configured broker is preferred.
	#[default]
	Auto,
	/// Always use the embedded interactive provider, never the broker.
	Embedded,
}

/// When the resolver is allowed, or forced, to interact with the user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PromptBehavior {
	/// Use cached or refreshed tokens first; prompt only if that fails.
	#[default]
	Auto,
	/// Always prompt, ignoring the cache.
	Always,
	/// Re-authenticate, letting the provider reuse its session if it can.
	RefreshSession,
	/// Always prompt and demand fresh credentials.
	ForcePrompt,
}
impl PromptBehavior {
	/// Returns `true` for policies that skip the cache and refresh stages.
	pub const fn bypasses_cache(self) -> bool {
		!matches!(self, Self::Auto)
	}

	/// Value of the `prompt` authorization parameter, if any.
	pub const fn prompt_param(self) -> Option<&'static str> {
		match self {
			Self::Auto => None,
			Self::Always | Self::ForcePrompt => Some("login"),
			Self::RefreshSession => Some("refresh_session"),
		}
	}
}

/// Options shared by every resolution made through one context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextOptions {
	/// Tolerance applied to access token expiry.
	pub expiry_skew: Duration,
	/// Client family whose members may reuse each other's refresh tokens.
	///
	/// `None` disables cross-client family reuse.
	pub family_id: Option<FamilyId>,
	/// Credentials type used when a request does not specify one.
	pub default_credentials_type: CredentialsType,
}
impl ContextOptions {
	/// Expiry policy derived from the configured skew.
	pub fn expiry_policy(&self) -> ExpiryPolicy {
		ExpiryPolicy::new(self.expiry_skew)
	}
}
impl Default for ContextOptions {
	fn default() -> Self {
		Self {
			expiry_skew: ExpiryPolicy::DEFAULT_SKEW,
			family_id: None,
			default_credentials_type: CredentialsType::Auto,
		}
	}
}

/// Broker application identity and hand-off parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerConfig {
	/// Identity (bundle or package id) the broker reports as the response source.
	pub application_id: String,
	/// URL used to invoke the broker application.
	pub invocation_url: Url,
	/// Redirect URI this application registered for broker responses.
	pub redirect_uri: Url,
	/// Bounded wait for the broker round trip.
	#[serde(default = "BrokerConfig::default_timeout")]
	pub timeout: Duration,
}
impl BrokerConfig {
	/// Default broker round-trip window.
	pub const DEFAULT_TIMEOUT: Duration = Duration::minutes(3);

	/// Creates a configuration with the default timeout.
	pub fn new(application_id: impl Into<String>, invocation_url: Url, redirect_uri: Url) -> Self {
		Self {
			application_id: application_id.into(),
			invocation_url,
			redirect_uri,
			timeout: Self::DEFAULT_TIMEOUT,
		}
	}

	/// Overrides the round-trip window.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Checks the configuration before it is handed to a bridge.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.application_id.trim().is_empty() {
			return Err(ConfigError::InvalidBroker { reason: "the application id is empty" });
		}
		if self.redirect_uri.host_str().is_none_or(str::is_empty) {
			return Err(ConfigError::InvalidBroker { reason: "the redirect URI needs a host" });
		}
		if self.timeout <= Duration::ZERO {
			return Err(ConfigError::InvalidBroker { reason: "the timeout must be positive" });
		}

		Ok(())
	}

	fn default_timeout() -> Duration {
		Self::DEFAULT_TIMEOUT
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn broker() -> BrokerConfig {
		BrokerConfig::new(
			"com.example.broker",
			Url::parse("msauth://broker").expect("Invocation URL fixture should parse."),
			Url::parse("x-app://com.example.app/auth").expect("Redirect URI fixture should parse."),
		)
	}

	#[test]
	fn options_default_to_five_minute_skew() {
		let options: ContextOptions =
			serde_json::from_str("{}").expect("Empty options should deserialize with defaults.");

		assert_eq!(options, ContextOptions::default());
		assert_eq!(options.expiry_policy().skew, Duration::minutes(5));
		assert_eq!(options.default_credentials_type, CredentialsType::Auto);
	}

	#[test]
	fn prompt_parameters_follow_policy() {
		assert_eq!(PromptBehavior::Auto.prompt_param(), None);
		assert_eq!(PromptBehavior::Always.prompt_param(), Some("login"));
		assert_eq!(PromptBehavior::ForcePrompt.prompt_param(), Some("login"));
		assert_eq!(PromptBehavior::RefreshSession.prompt_param(), Some("refresh_session"));
		assert!(!PromptBehavior::Auto.bypasses_cache());
		assert!(PromptBehavior::RefreshSession.bypasses_cache());
	}

	#[test]
	fn broker_configuration_is_validated() {
		broker().validate().expect("Broker fixture should be valid.");

		assert!(matches!(
			BrokerConfig { application_id: " ".into(), ..broker() }.validate(),
			Err(ConfigError::InvalidBroker { .. })
		));
		assert!(matches!(
			broker().with_timeout(Duration::ZERO).validate(),
			Err(ConfigError::InvalidBroker { .. })
		));
		assert_eq!(broker().timeout, Duration::minutes(3));
	}
}
