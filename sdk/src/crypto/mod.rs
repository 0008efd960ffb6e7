//! Encryption of user fields before they are written to the database.
//!
//! Two policies exist, and every call site names the one it uses:
//!
//! - [`FieldPolicy::Opaque`] (usernames, note titles and bodies, todo titles):
//!   AES-256-GCM with a fresh random 96-bit IV per call. The stored form is
//!   `base64(iv).base64(ciphertext).base64(tag)`. Encrypting the same value
//!   twice gives different results, and decryption fails closed if the tag
//!   doesn't verify.
//! - [`FieldPolicy::Deterministic`] (email addresses): AES-256-CBC with an
//!   all-zero IV and PKCS#7 padding, stored as a single base64 blob. The same
//!   email always encrypts to the same blob, so the database can enforce
//!   uniqueness and look users up by email without ever seeing it in plain
//!   text. This leaks equality of emails and carries no integrity check.
//!   Changing the scheme would break lookups of existing rows.
//!
//! Both policies use the same 32-byte [`FieldKey`](toolbelt_protocol::FieldKey)
//! and standard base64 with padding, which keeps stored rows readable by
//! earlier deployments.

mod cipher;

pub use cipher::{FieldCipher, FieldPolicy};
