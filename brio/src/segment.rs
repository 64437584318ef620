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

use std::cmp::min;

/// The fixed capacity of every [`Segment`], in bytes.
///
/// Changing this is an ABI-incompatible change; whole-segment moves between
/// buffers are only possible at this boundary.
pub const SEG: usize = 2048;

/// A fixed-capacity byte chunk with a live range `[pos, limit)`.
///
/// Segments are always moved by value between a [`Buffer`](crate::Buffer)'s
/// internal deque and the [`SegmentPool`](crate::pool::SegmentPool) — never
/// shared by reference, so there is no copy-on-write bookkeeping to carry.
pub struct Segment {
	data: Box<[u8; SEG]>,
	pos: usize,
	limit: usize,
}

impl Segment {
	/// Returns a new, empty segment backed by a fresh zeroed allocation.
	pub(crate) fn new() -> Self {
		Self {
			data: Box::new([0; SEG]),
			pos: 0,
			limit: 0,
		}
	}

	/// Resets this segment to empty, for return to the pool.
	pub(crate) fn reset(&mut self) {
		self.pos = 0;
		self.limit = 0;
	}

	/// The number of bytes available for reading.
	pub fn readable(&self) -> usize { self.limit - self.pos }

	/// The number of bytes of spare capacity available for writing.
	pub fn writable(&self) -> usize { SEG - self.limit }

	/// Returns `true` if there are no bytes to read.
	pub fn is_empty(&self) -> bool { self.pos == self.limit }

	/// The byte range currently readable.
	pub fn data(&self) -> &[u8] { &self.data[self.pos..self.limit] }

	/// The byte range currently writable.
	pub fn writable_data_mut(&mut self) -> &mut [u8] {
		&mut self.data[self.limit..SEG]
	}

	/// The whole backing array, for adapters that need direct slice access
	/// at an explicit offset (e.g. reading straight from a socket at `limit`).
	pub(crate) fn raw_mut(&mut self) -> &mut [u8; SEG] { &mut self.data }

	pub(crate) fn pos(&self) -> usize { self.pos }
	pub(crate) fn limit(&self) -> usize { self.limit }

	/// Advances `pos` by `n` after bytes have been consumed by a reader.
	pub(crate) fn consume(&mut self, n: usize) {
		debug_assert!(self.pos + n <= self.limit);
		self.pos += n;
	}

	/// Advances `limit` by `n` after bytes have been written by a writer.
	pub(crate) fn add(&mut self, n: usize) {
		debug_assert!(self.limit + n <= SEG);
		self.limit += n;
	}

	/// Appends as much of `bytes` as fits, returning the number written.
	pub(crate) fn push_slice(&mut self, bytes: &[u8]) -> usize {
		let n = min(self.writable(), bytes.len());
		self.data[self.limit..self.limit + n].copy_from_slice(&bytes[..n]);
		self.add(n);
		n
	}

	/// Copies at most `n` readable bytes from the front of `self` into the
	/// back of `dst`, consuming them from `self`. Used to realize a splice
	/// split at a non-segment boundary with a single bounded copy (see
	/// `Buffer::read_into`).
	pub(crate) fn move_into(&mut self, dst: &mut Self, n: usize) -> usize {
		let n = min(n, self.readable());
		let n = dst.push_slice(&self.data[self.pos..self.pos + n]);
		self.consume(n);
		n
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fresh_segment_is_empty_and_fully_writable() {
		let seg = Segment::new();
		assert!(seg.is_empty());
		assert_eq!(seg.readable(), 0);
		assert_eq!(seg.writable(), SEG);
	}

	#[test]
	fn push_slice_advances_limit() {
		let mut seg = Segment::new();
		let n = seg.push_slice(b"hello");
		assert_eq!(n, 5);
		assert_eq!(seg.data(), b"hello");
		assert_eq!(seg.writable(), SEG - 5);
	}

	#[test]
	fn push_slice_truncates_to_available_capacity() {
		let mut seg = Segment::new();
		let big = vec![1u8; SEG + 10];
		let n = seg.push_slice(&big);
		assert_eq!(n, SEG);
		assert_eq!(seg.writable(), 0);
	}

	#[test]
	fn consume_advances_pos() {
		let mut seg = Segment::new();
		seg.push_slice(b"hello world");
		seg.consume(6);
		assert_eq!(seg.data(), b"world");
	}

	#[test]
	fn move_into_copies_and_consumes() {
		let mut a = Segment::new();
		let mut b = Segment::new();
		a.push_slice(b"abcdef");
		let moved = a.move_into(&mut b, 3);
		assert_eq!(moved, 3);
		assert_eq!(a.data(), b"def");
		assert_eq!(b.data(), b"abc");
	}
}
