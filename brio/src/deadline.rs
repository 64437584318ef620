// SPDX-License-Identifier: Apache-2.0

use std::time::{Duration, Instant};
use crate::error::{Error, Result};

/// A monotonic expiry point, threaded explicitly through every I/O call in
/// this crate instead of relying on thread interruption for cancellation.
#[derive(Copy, Clone, Debug)]
pub struct Deadline(Option<Instant>);

impl Deadline {
	/// A deadline that never expires.
	pub const NONE: Self = Self(None);

	/// A deadline `duration` from now.
	pub fn after(duration: Duration) -> Self {
		Self(Instant::now().checked_add(duration))
	}

	/// A deadline at the given instant.
	pub fn at(instant: Instant) -> Self { Self(Some(instant)) }

	/// Returns `true` if this deadline has already passed.
	pub fn has_elapsed(&self) -> bool {
		matches!(self.0, Some(at) if Instant::now() >= at)
	}

	/// Fails with [`Error::Timeout`] if this deadline has passed.
	pub fn throw_if_reached(&self) -> Result {
		if self.has_elapsed() {
			log::debug!("deadline expired");
			Err(Error::Timeout)
		} else {
			Ok(())
		}
	}
}

impl Default for Deadline {
	fn default() -> Self { Self::NONE }
}
