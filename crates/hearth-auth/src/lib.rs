//! # hearth-auth
//!
//! Bearer-token session issuance and the shared/user/admin mode machine:
//! [`AuthMode`] for login/validate/refresh/downgrade/upgrade, [`Signer`]
//! for keyed-MAC token signing, [`RateLimiter`] for the upgrade throttle,
//! and [`rbac`] for the capability matrix.

mod auth_mode;
mod claims;
mod rate_limit;
pub mod rbac;
mod signer;

pub use auth_mode::{AuthMode, AuthModeConfig, Credentials, LoginIdentity};
pub use claims::Claims;
pub use rate_limit::RateLimiter;
pub use signer::{HmacSigner, Signer, SignerError};
