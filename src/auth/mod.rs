//! Bearer token authentication.
//!
//! One middleware ([`authorize`]) gates every call. Access, refresh and
//! password reset tokens are signed with distinct secrets, and each protected
//! method names the purpose of the token it accepts. Handlers take the
//! verified claims through the extractors in this module.

mod bearer;
mod errors;
mod extractors;
mod gate;
mod ip;

pub use bearer::parse_bearer;
pub use errors::GateError;
pub use extractors::{AccessAuth, RefreshAuth, ResetAuth};
pub use gate::{BearerToken, Gate, GateConfig, VerifiedClaims, authorize};
pub use ip::{ClientMeta, extract_client_ip};
