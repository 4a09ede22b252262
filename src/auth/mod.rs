//! Bearer-token request authentication.
//!
//! Access tokens are verified statelessly with the access secret. In strict
//! mode the session ledger is also consulted so revoked tokens are refused
//! before they expire.

mod authenticator;
mod bearer;
mod errors;
mod extractors;
mod ip;
mod state;

pub use authenticator::Authenticator;
pub use bearer::{authorization_header, bearer_token};
pub use errors::{ApiAuthError, denial};
pub use extractors::{Auth, OptionalAuth};
pub use ip::{HasHeadersAndExtensions, extract_client_ip};
pub use state::HasAuthBackend;
