//! Identity primitives: authorities, identifiers, user identity, and cached token items.

pub mod authority;
pub mod id;
pub mod token;
pub mod user;

pub use authority::*;
pub use id::*;
pub use token::{item::*, key::*, secret::*};
pub use user::*;
