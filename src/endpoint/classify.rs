//! Heuristics that map token endpoint failures onto [`ServerErrorKind`].
//!
//! Structured OAuth fields win, then hints in the description or body, then the HTTP
//! status code.

// self
use crate::{
	_prelude::*,
	error::{ServerError, ServerErrorKind, TransientError},
};

const BODY_PREVIEW_LIMIT: usize = 256;

/// Raw facts about a failed token endpoint response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EndpointFailure {
	/// HTTP status code.
	pub status: Option<u16>,
	/// OAuth `error` field.
	pub oauth_error: Option<String>,
	/// OAuth `error_description` field.
	pub error_description: Option<String>,
	/// Preview of a non-JSON body.
	pub body_preview: Option<String>,
	/// Retry-After hint.
	pub retry_after: Option<Duration>,
}
impl EndpointFailure {
	/// Adds a truncated body preview.
	pub fn with_body_preview(mut self, body: &str) -> Self {
		self.body_preview = Some(truncate_preview(body));

		self
	}

	/// Classifies the failure.
	pub fn kind(&self) -> ServerErrorKind {
		classify(
			self.status,
			self.oauth_error.as_deref(),
			self.error_description.as_deref(),
			self.body_preview.as_deref(),
		)
	}

	/// Converts the failure into the crate error the resolver expects.
	///
	/// Transient conditions become [`TransientError::TokenEndpoint`]; every other kind is an
	/// identity provider rejection.
	pub fn into_error(self) -> Error {
		let kind = self.kind();

		if kind == ServerErrorKind::Transient {
			let message = self
				.error_description
				.or(self.oauth_error)
				.or(self.body_preview)
				.unwrap_or_else(|| "temporarily unavailable".into());

			return TransientError::TokenEndpoint {
				message,
				status: self.status,
				retry_after: self.retry_after,
			}
			.into();
		}

		let code = self.oauth_error.unwrap_or_else(|| match self.status {
			Some(status) => format!("http_{status}"),
			None => "unknown_error".into(),
		});
		let mut error = ServerError::new(kind, code);

		error.description = self.error_description;
		error.status = self.status;

		error.into()
	}
}

/// Classifies a failure from its status code, OAuth fields, and body text.
pub fn classify(
	status: Option<u16>,
	oauth_error: Option<&str>,
	error_description: Option<&str>,
	body: Option<&str>,
) -> ServerErrorKind {
	oauth_error
		.and_then(match_exact_value)
		.or_else(|| classify_text(error_description))
		.or_else(|| classify_text(body))
		.unwrap_or_else(|| classify_status(status))
}

fn match_exact_value(value: &str) -> Option<ServerErrorKind> {
	let value = value.to_ascii_lowercase();

	match value.as_str() {
		"invalid_grant" | "access_denied" => Some(ServerErrorKind::InvalidGrant),
		"invalid_client" | "unauthorized_client" => Some(ServerErrorKind::InvalidClient),
		"invalid_scope" | "invalid_resource" | "insufficient_scope" =>
			Some(ServerErrorKind::InvalidScope),
		"interaction_required" | "login_required" | "consent_required" =>
			Some(ServerErrorKind::InteractionRequired),
		"temporarily_unavailable" | "server_error" => Some(ServerErrorKind::Transient),
		"invalid_request" | "unsupported_grant_type" => Some(ServerErrorKind::Other),
		_ => None,
	}
}

fn classify_text(text: Option<&str>) -> Option<ServerErrorKind> {
	let lowered = text?.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("interaction_required") || text.contains("login_required") =>
			Some(ServerErrorKind::InteractionRequired),
		text if text.contains("invalid_grant") => Some(ServerErrorKind::InvalidGrant),
		text if text.contains("invalid_client") => Some(ServerErrorKind::InvalidClient),
		text if text.contains("invalid_scope") || text.contains("invalid_resource") =>
			Some(ServerErrorKind::InvalidScope),
		text if text.contains("temporarily_unavailable") || text.contains("retry") =>
			Some(ServerErrorKind::Transient),
		_ => None,
	}
}

fn classify_status(status: Option<u16>) -> ServerErrorKind {
	match status {
		Some(400 | 404 | 410) => ServerErrorKind::InvalidGrant,
		Some(401) => ServerErrorKind::InvalidClient,
		Some(403) => ServerErrorKind::InvalidScope,
		Some(408 | 429) => ServerErrorKind::Transient,
		Some(code) if code >= 500 => ServerErrorKind::Transient,
		Some(_) => ServerErrorKind::Other,
		None => ServerErrorKind::Transient,
	}
}

fn truncate_preview(body: &str) -> String {
	if body.chars().count() <= BODY_PREVIEW_LIMIT {
		return body.to_owned();
	}

	let mut buf: String = body.chars().take(BODY_PREVIEW_LIMIT).collect();

	buf.push('…');

	buf
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::result::ErrorKind;

	#[test]
	fn structured_fields_take_priority() {
		assert_eq!(
			classify(Some(500), Some("invalid_grant"), None, None),
			ServerErrorKind::InvalidGrant
		);
		assert_eq!(
			classify(Some(400), Some("interaction_required"), None, None),
			ServerErrorKind::InteractionRequired
		);
		assert_eq!(
			classify(Some(400), Some("weird_code"), Some("AADSTS70008: invalid_grant"), None),
			ServerErrorKind::InvalidGrant
		);
	}

	#[test]
	fn status_is_the_last_resort() {
		assert_eq!(classify(Some(401), None, None, None), ServerErrorKind::InvalidClient);
		assert_eq!(classify(Some(503), None, None, None), ServerErrorKind::Transient);
		assert_eq!(classify(Some(418), None, None, None), ServerErrorKind::Other);
		assert_eq!(
			classify(Some(502), None, None, Some("please retry later")),
			ServerErrorKind::Transient
		);
	}

	#[test]
	fn failures_convert_into_the_public_taxonomy() {
		let rejected = EndpointFailure {
			status: Some(400),
			oauth_error: Some("invalid_grant".into()),
			error_description: Some("refresh token expired".into()),
			..Default::default()
		}
		.into_error();

		assert!(rejected.is_invalid_grant());
		assert_eq!(rejected.kind(), ErrorKind::ServerError);

		let throttled = EndpointFailure {
			status: Some(429),
			retry_after: Some(Duration::seconds(5)),
			..Default::default()
		}
		.into_error();

		assert_eq!(throttled.kind(), ErrorKind::NetworkError);
		assert!(matches!(
			throttled,
			Error::Transient(TransientError::TokenEndpoint { status: Some(429), .. })
		));
	}

	#[test]
	fn body_preview_is_truncated() {
		let failure = EndpointFailure::default().with_body_preview(&"x".repeat(1_000));

		assert_eq!(failure.body_preview.map(|b| b.chars().count()), Some(BODY_PREVIEW_LIMIT + 1));
	}
}
