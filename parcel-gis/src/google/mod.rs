//! Third-party file provider authentication
//!
//! ```text
//! CredentialSource ──load──> ServiceCredential ──build_assertion──> JWT
//!                                                      │
//!                      TokenIssuer::issue  <───────────┘
//!                            │ jwt-bearer grant
//!                            v
//!                       bearer token (one sync run)
//! ```

pub mod credential;
pub mod token;

pub use credential::{CredentialSource, ServiceCredential, CREDENTIAL_ENV};
pub use token::{TokenError, TokenIssuer, DEFAULT_TOKEN_URI, DRIVE_READONLY_SCOPE};
