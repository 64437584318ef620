// Copyright 2023 Strixpyrr
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::PoisonError;
use thiserror::Error;

/// Which checksum a [`ChecksumMismatch`](Error::ChecksumMismatch) failed on.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ChecksumKind {
	/// The gzip header CRC (`FHCRC`).
	Fhcrc,
	/// The gzip trailer body CRC-32.
	Crc,
	/// The gzip trailer ISIZE (uncompressed length mod 2³²).
	Isize,
}

impl std::fmt::Display for ChecksumKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			Self::Fhcrc => "FHCRC",
			Self::Crc => "CRC",
			Self::Isize => "ISIZE",
		})
	}
}

/// The single error type for every fallible operation in this crate.
///
/// None of these are recoverable within the core itself: a failing operation
/// leaves its stream usable only for further failures of the same kind (or
/// [`Eof`](Self::Eof)), never a masked success.
#[derive(Error, Debug)]
pub enum Error {
	/// Upstream was exhausted before the requested bytes arrived.
	#[error("end of stream")]
	Eof,
	/// A deadline was reached during a blocking operation.
	#[error("deadline exceeded")]
	Timeout,
	/// A framing invariant was violated.
	#[error("malformed input: {0}")]
	MalformedInput(&'static str),
	/// A checksum comparison failed.
	#[error("{0} checksum mismatch")]
	ChecksumMismatch(ChecksumKind),
	/// A wrapped error from an external byte stream.
	#[error("io error")]
	Io(#[from] std::io::Error),
	/// The segment pool's lock was poisoned by a panicking holder.
	#[error("segment pool lock poisoned")]
	Pool,
}

impl Error {
	/// Converts a [`std::io::Error`] the way upstream streams report EOF: as
	/// [`Error::Eof`] rather than [`Error::Io`], since every `Source` in this
	/// crate treats end-of-stream as a first-class, non-exceptional outcome.
	pub(crate) fn from_io(error: std::io::Error) -> Self {
		if error.kind() == std::io::ErrorKind::UnexpectedEof {
			Self::Eof
		} else {
			Self::Io(error)
		}
	}
}

impl<T> From<PoisonError<T>> for Error {
	fn from(_: PoisonError<T>) -> Self { Self::Pool }
}

/// Shorthand for `Result<T, Error>`.
pub type Result<T = ()> = std::result::Result<T, Error>;
