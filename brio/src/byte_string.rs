// SPDX-License-Identifier: Apache-2.0

use std::ops::Deref;
use std::sync::Arc;

/// An immutable, cheaply-cloned byte sequence.
///
/// Cloning is a reference-count bump, not a copy. Operations that would
/// leave the bytes unchanged — such as [`to_ascii_lowercase`] on a string
/// with no uppercase ASCII — return the identical instance instead of a new
/// allocation, observable through [`ByteString::is_identical`].
///
/// [`to_ascii_lowercase`]: ByteString::to_ascii_lowercase
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct ByteString(Arc<[u8]>);

impl ByteString {
	/// Wraps an owned byte vector.
	pub fn new(bytes: Vec<u8>) -> Self { Self(bytes.into()) }

	/// Returns the byte slice.
	pub fn as_slice(&self) -> &[u8] { &self.0 }

	/// Returns `true` if `self` and `other` point at the same allocation.
	pub fn is_identical(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.0, &other.0)
	}

	/// Lowercases ASCII bytes in `[0x41, 0x5A]`, leaving all other bytes
	/// untouched. Returns the identical instance if nothing changed.
	pub fn to_ascii_lowercase(&self) -> Self {
		if self.0.iter().any(u8::is_ascii_uppercase) {
			let mut owned = self.0.to_vec();
			owned.make_ascii_lowercase();
			Self::new(owned)
		} else {
			self.clone()
		}
	}
}

impl Deref for ByteString {
	type Target = [u8];
	fn deref(&self) -> &[u8] { &self.0 }
}

impl From<Vec<u8>> for ByteString {
	fn from(value: Vec<u8>) -> Self { Self::new(value) }
}

impl From<&[u8]> for ByteString {
	fn from(value: &[u8]) -> Self { Self(value.into()) }
}

impl PartialEq<[u8]> for ByteString {
	fn eq(&self, other: &[u8]) -> bool { &*self.0 == other }
}

impl PartialEq<&str> for ByteString {
	fn eq(&self, other: &&str) -> bool { &*self.0 == other.as_bytes() }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn lowercase_identity_when_already_lower() {
		let s = ByteString::from(&b"already-lower"[..]);
		let lower = s.to_ascii_lowercase();
		assert!(s.is_identical(&lower));
	}

	#[test]
	fn lowercase_changes_uppercase_ascii_only() {
		let s = ByteString::from(&b"abCD"[..]);
		let lower = s.to_ascii_lowercase();
		assert!(!s.is_identical(&lower));
		assert_eq!(lower.as_slice(), b"abcd");
	}

	#[test]
	fn lowercase_preserves_non_alpha_bytes() {
		let s = ByteString::from(&b"Host: 1.2.3.4!"[..]);
		let lower = s.to_ascii_lowercase();
		assert_eq!(lower.as_slice(), b"host: 1.2.3.4!");
	}
}
