//! Authentication primitives.
//!
//! - [`jwt`] -- HS256 access-token verification ([`jwt::TokenVerifier`]).

pub mod jwt;
