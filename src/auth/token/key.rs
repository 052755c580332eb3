//! Composite cache key (authority/resource/client/user).

// self
use crate::{
	_prelude::*,
	auth::{Authority, ClientId, ResourceId},
};

/// Identifies a single cache slot.
///
/// A `resource` of `None` marks the multi-resource (family) refresh token slot shared by every
/// resource requested under the same authority, client, and user.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenCacheKey {
	/// Authority that issued the tokens.
	pub authority: Authority,
	/// Resource the access token targets; `None` for the family slot.
	pub resource: Option<ResourceId>,
	/// Client the tokens were issued to.
	pub client_id: ClientId,
	/// User partition (see [`UserInformation::cache_key`](crate::auth::UserInformation::cache_key)).
	pub user: Option<String>,
	/// Client credentials (app-only) partition; never matched by user-delegated lookups.
	#[serde(default)]
	pub app_only: bool,
}
impl TokenCacheKey {
	/// Creates a key for the provided tuple.
	pub fn new(
		authority: Authority,
		resource: Option<ResourceId>,
		client_id: ClientId,
		user: Option<String>,
	) -> Self {
		Self { authority, resource, client_id, user, app_only: false }
	}

	/// Creates the app-only key for a client credentials token.
	pub fn app_only(authority: Authority, resource: ResourceId, client_id: ClientId) -> Self {
		Self { authority, resource: Some(resource), client_id, user: None, app_only: true }
	}

	/// Returns the resource-less sibling of this key.
	pub fn family_slot(&self) -> Self {
		Self { resource: None, ..self.clone() }
	}

	/// Returns `true` for the resource-less (family) slot.
	pub fn is_family_slot(&self) -> bool {
		self.resource.is_none()
	}
}
impl Display for TokenCacheKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(
			f,
			"{}|{}|{}|{}",
			self.authority,
			self.resource.as_deref().unwrap_or("*"),
			self.client_id,
			if self.app_only { "app" } else { self.user.as_deref().unwrap_or("-") },
		)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn family_slot_drops_only_the_resource() {
		let key = TokenCacheKey::new(
			Authority::new("https://login.example.com/tenant").expect("Authority should be valid."),
			Some(ResourceId::new("https://graph.example.com").expect("Resource should be valid.")),
			ClientId::new("client-1").expect("Client should be valid."),
			Some("obj-1".into()),
		);
		let family = key.family_slot();

		assert!(family.is_family_slot());
		assert!(!key.is_family_slot());
		assert_eq!(family.client_id, key.client_id);
		assert_eq!(family.user, key.user);
		assert_eq!(family.to_string(), "https://login.example.com/tenant|*|client-1|obj-1");
	}

	#[test]
	fn app_only_keys_do_not_collide_with_user_less_keys() {
		let authority =
			Authority::new("https://login.example.com/tenant").expect("Authority should be valid.");
		let resource =
			ResourceId::new("https://graph.example.com").expect("Resource should be valid.");
		let client = ClientId::new("client-1").expect("Client should be valid.");
		let app = TokenCacheKey::app_only(authority.clone(), resource.clone(), client.clone());
		let delegated = TokenCacheKey::new(authority, Some(resource), client, None);

		assert_ne!(app, delegated);
		assert!(app.to_string().ends_with("|client-1|app"));
	}
}
