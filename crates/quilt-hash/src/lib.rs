//! Hashing primitives for Quilt package manifests.
//!
//! A package's identity (its *top hash*) is a SHA-256 digest over a canonical
//! JSON rendering of the manifest header followed by every entry row. The
//! canonical form must match, byte for byte, what the Python
//! `quilt3` client produces:
//!
//! - object keys sorted, `,` and `:` separators, no whitespace;
//! - every character outside printable ASCII escaped as `\uXXXX`;
//! - floats printed with the shortest round-trip digits in Python's `repr`
//!   layout (`1.0`, `0.0001`, `1e-05`, `1e+20`).
//!
//! [`ContentHasher`] streams blob content, [`TopHasher`] accumulates the
//! running manifest digest.

pub mod canonical;
pub mod float;
pub mod hasher;

pub use canonical::{canonical_bytes, write_canonical, CanonicalError};
pub use float::format_float;
pub use hasher::{sha256_hex, ContentHasher, TopHasher};
