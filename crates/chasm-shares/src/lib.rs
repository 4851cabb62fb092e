//! chasm-shares: the content primitives the coordinator is built on
//!
//! # Overview
//! - `fingerprint`: SHA-256 content digests, URL-safe base64 encoded
//! - `scheme`: the `ShareScheme` capability and the default XOR n-of-n scheme

pub mod fingerprint;
pub mod scheme;

pub use fingerprint::{fingerprint, fingerprint_file, fingerprint_matches};
pub use scheme::{ShareScheme, XorScheme};
