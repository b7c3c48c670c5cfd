//! Password login with the guest bypass, opaque session tokens and guest
//! account provisioning.

pub mod password;
pub mod service;
pub mod session_token;

pub use service::{
    AuthService, AuthenticatedUser, DEFAULT_GUEST_PASSWORD, DEFAULT_SESSION_TTL_DAYS,
    IssuedSession, RegisterUser,
};
pub use session_token::{SessionToken, hash_token};
