//! User identity: requested identifiers and identity information returned by the authority.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::Value;
// self
use crate::_prelude::*;

/// How strictly a cached or returned identity must match the requested identifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserIdentifierKind {
	/// Exact match on the immutable unique identifier (object id).
	UniqueId,
	/// Match on the displayable id when the cached identity has one, otherwise on the unique id.
	#[default]
	OptionalDisplayableId,
	/// Exact (case-insensitive) match on the displayable id.
	RequiredDisplayableId,
}

/// Identifier a caller supplies to pin a resolution to a particular user.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserIdentifier {
	/// Identifier value (object id or UPN depending on `kind`).
	pub value: String,
	/// Matching mode.
	pub kind: UserIdentifierKind,
}
impl UserIdentifier {
	/// Creates an identifier with an explicit matching mode.
	pub fn new(value: impl Into<String>, kind: UserIdentifierKind) -> Self {
		Self { value: value.into(), kind }
	}

	/// Requires an exact unique id match.
	pub fn unique_id(value: impl Into<String>) -> Self {
		Self::new(value, UserIdentifierKind::UniqueId)
	}

	/// Prefers a displayable id match but tolerates identities without one.
	pub fn optional_displayable(value: impl Into<String>) -> Self {
		Self::new(value, UserIdentifierKind::OptionalDisplayableId)
	}

	/// Requires an exact displayable id match.
	pub fn required_displayable(value: impl Into<String>) -> Self {
		Self::new(value, UserIdentifierKind::RequiredDisplayableId)
	}

	/// Returns `true` when `info` satisfies this identifier under its matching mode.
	pub fn matches(&self, info: Option<&UserInformation>) -> bool {
		match self.kind {
			UserIdentifierKind::UniqueId =>
				info.and_then(|i| i.unique_id.as_deref()).is_some_and(|id| id == self.value),
			UserIdentifierKind::RequiredDisplayableId => info
				.and_then(|i| i.displayable_id.as_deref())
				.is_some_and(|id| id.eq_ignore_ascii_case(&self.value)),
			UserIdentifierKind::OptionalDisplayableId => match info {
				None => true,
				Some(i) => match (i.displayable_id.as_deref(), i.unique_id.as_deref()) {
					(Some(displayable), _) => displayable.eq_ignore_ascii_case(&self.value),
					(None, Some(unique)) => unique == self.value,
					(None, None) => true,
				},
			},
		}
	}

	/// Returns `true` when a mismatch on a returned identity must fail the resolution.
	pub fn is_strict(&self) -> bool {
		!matches!(self.kind, UserIdentifierKind::OptionalDisplayableId)
	}

	/// Hint to prepopulate the login form with, if the identifier is displayable.
	pub fn login_hint(&self) -> Option<&str> {
		match self.kind {
			UserIdentifierKind::UniqueId => None,
			_ => Some(&self.value),
		}
	}
}

/// Identity information associated with a token.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInformation {
	/// Immutable unique identifier (object id or subject).
	pub unique_id: Option<String>,
	/// Human-readable identifier (UPN or email).
	pub displayable_id: Option<String>,
	/// Tenant the identity belongs to.
	pub tenant_id: Option<String>,
	/// Raw identity claims as returned in the id token.
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub claims: BTreeMap<String, Value>,
}
impl UserInformation {
	/// Decodes the (unsigned-trust) payload of an OpenID id token.
	///
	/// Returns `None` when the token is not a three-part JWT or the payload is not a JSON
	/// object. Signature validation is the authority's concern; the payload is only used to
	/// label cache entries.
	pub fn from_id_token(id_token: &str) -> Option<Self> {
		let mut parts = id_token.split('.');
		let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
			(Some(_), Some(payload), Some(_), None) => payload,
			_ => return None,
		};
		let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
		let mut de = serde_json::Deserializer::from_slice(&bytes);
		let claims: BTreeMap<String, Value> = serde_path_to_error::deserialize(&mut de)
			.inspect_err(|_e| {
				flow_event!(debug, path = %_e.path(), "Ignoring malformed id token payload.");
			})
			.ok()?;

		Some(Self::from_claims(claims))
	}

	/// Builds identity information from a decoded claim set.
	pub fn from_claims(claims: BTreeMap<String, Value>) -> Self {
		let claim = |names: &[&str]| {
			names
				.iter()
				.find_map(|name| claims.get(*name).and_then(Value::as_str))
				.filter(|value| !value.is_empty())
				.map(str::to_owned)
		};
		let unique_id = claim(&["oid", "sub"]);
		let displayable_id = claim(&["upn", "email", "unique_name"]);
		let tenant_id = claim(&["tid"]);

		Self { unique_id, displayable_id, tenant_id, claims }
	}

	/// Stable key used to partition cache entries per user.
	pub fn cache_key(&self) -> Option<String> {
		self.unique_id
			.clone()
			.or_else(|| self.displayable_id.as_ref().map(|id| id.to_ascii_lowercase()))
	}
}
