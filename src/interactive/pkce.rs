// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::auth::TokenSecret;

const STATE_LEN: usize = 32;
const VERIFIER_LEN: usize = 64;

/// RFC 7636 challenge method.
pub(crate) const METHOD: &str = "S256";

/// PKCE verifier and its S256 challenge.
#[derive(Clone, Debug)]
pub(crate) struct PkcePair {
	pub(crate) verifier: TokenSecret,
	pub(crate) challenge: String,
}
impl PkcePair {
	pub(crate) fn generate() -> Self {
		let verifier = random_string(VERIFIER_LEN);
		let challenge = challenge_for(&verifier);

		Self { verifier: TokenSecret::new(verifier), challenge }
	}
}

/// Random opaque `state` value.
pub(crate) fn generate_state() -> String {
	random_string(STATE_LEN)
}

fn random_string(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}

fn challenge_for(verifier: &str) -> String {
	URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}
