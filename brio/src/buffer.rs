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
use std::collections::VecDeque;
use crate::byte_string::ByteString;
use crate::error::{Error, Result};
use crate::pool::SegmentPool;
use crate::segment::{Segment, SEG};

/// An ordered byte sequence held as a deque of pooled [`Segment`]s.
///
/// The front of the deque holds the oldest byte, the back the newest.
/// Operations on a single `Buffer` are not thread-safe; synchronize
/// externally when sharing one across threads.
pub struct Buffer {
	segments: VecDeque<Segment>,
	byte_count: usize,
	pool: &'static SegmentPool,
}

impl Default for Buffer {
	fn default() -> Self { Self::new() }
}

impl Buffer {
	/// Creates an empty buffer backed by the process-wide default pool.
	pub fn new() -> Self { Self::with_pool(SegmentPool::default_pool()) }

	/// Creates an empty buffer backed by a specific pool, for callers that
	/// need an isolated pool rather than the process-wide default.
	pub fn with_pool(pool: &'static SegmentPool) -> Self {
		Self {
			segments: VecDeque::new(),
			byte_count: 0,
			pool,
		}
	}

	/// The number of bytes currently held.
	pub fn byte_count(&self) -> usize { self.byte_count }

	/// Returns `true` if the buffer holds no bytes.
	pub fn is_empty(&self) -> bool { self.byte_count == 0 }

	/// Recycles every segment back to the pool, leaving the buffer empty.
	pub fn clear(&mut self) {
		for seg in self.segments.drain(..) {
			self.pool.recycle(seg);
		}
		self.byte_count = 0;
	}

	/// Closes the buffer, recycling its segments. Idempotent.
	pub fn close(&mut self) { self.clear(); }

	// -- random access --

	/// Returns the byte at absolute index `i`, without consuming it.
	pub fn get(&self, i: usize) -> Option<u8> {
		if i >= self.byte_count { return None }
		let mut idx = i;
		for seg in &self.segments {
			let data = seg.data();
			if idx < data.len() {
				return Some(data[idx]);
			}
			idx -= data.len();
		}
		None
	}

	/// Returns the smallest absolute index `i >= start` where `buffer[i] ==
	/// byte`, or `None` if not found.
	pub fn index_of(&self, byte: u8, start: usize) -> Option<usize> {
		if start >= self.byte_count { return None }
		let mut abs = 0;
		let mut skip = start;
		for seg in &self.segments {
			let data = seg.data();
			if skip >= data.len() {
				skip -= data.len();
				abs += data.len();
				continue;
			}
			if let Some(pos) = data[skip..].iter().position(|&b| b == byte) {
				return Some(abs + skip + pos);
			}
			abs += data.len();
			skip = 0;
		}
		None
	}

	// -- primitive reads --

	/// Advances the front of the buffer by `n` bytes, recycling emptied
	/// segments. Fails with [`Error::Eof`] if fewer than `n` bytes remain.
	pub fn skip(&mut self, mut n: usize) -> Result {
		if n > self.byte_count { return Err(Error::Eof) }
		while n > 0 {
			let (consumed, emptied) = {
				let seg = self.segments.front_mut().expect("byte_count accounted for this segment");
				let c = min(seg.readable(), n);
				seg.consume(c);
				(c, seg.is_empty())
			};
			n -= consumed;
			self.byte_count -= consumed;
			if emptied {
				let seg = self.segments.pop_front().expect("just consumed its front segment");
				self.pool.recycle(seg);
			}
		}
		Ok(())
	}

	/// Reads and consumes `n` bytes into an immutable [`ByteString`].
	pub fn read_byte_string(&mut self, n: usize) -> Result<ByteString> {
		if n > self.byte_count { return Err(Error::Eof) }
		let mut out = Vec::with_capacity(n);
		let mut remaining = n;
		while remaining > 0 {
			let emptied = {
				let seg = self.segments.front_mut().expect("byte_count accounted for this segment");
				let c = min(seg.readable(), remaining);
				out.extend_from_slice(&seg.data()[..c]);
				seg.consume(c);
				self.byte_count -= c;
				remaining -= c;
				seg.is_empty()
			};
			if emptied {
				let seg = self.segments.pop_front().expect("just consumed its front segment");
				self.pool.recycle(seg);
			}
		}
		Ok(ByteString::new(out))
	}

	fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
		if N > self.byte_count { return Err(Error::Eof) }
		let mut arr = [0u8; N];
		let mut off = 0;
		while off < N {
			let emptied = {
				let seg = self.segments.front_mut().expect("byte_count accounted for this segment");
				let n = min(seg.readable(), N - off);
				arr[off..off + n].copy_from_slice(&seg.data()[..n]);
				seg.consume(n);
				self.byte_count -= n;
				off += n;
				seg.is_empty()
			};
			if emptied {
				let seg = self.segments.pop_front().expect("just consumed its front segment");
				self.pool.recycle(seg);
			}
		}
		Ok(arr)
	}

	pub fn read_u8(&mut self) -> Result<u8> { Ok(self.read_array::<1>()?[0]) }
	pub fn read_i8(&mut self) -> Result<i8> { Ok(self.read_u8()? as i8) }

	pub fn read_u16(&mut self) -> Result<u16> { Ok(u16::from_be_bytes(self.read_array()?)) }
	pub fn read_u16_le(&mut self) -> Result<u16> { Ok(u16::from_le_bytes(self.read_array()?)) }
	pub fn read_i16(&mut self) -> Result<i16> { Ok(self.read_u16()? as i16) }
	pub fn read_i16_le(&mut self) -> Result<i16> { Ok(self.read_u16_le()? as i16) }

	pub fn read_u32(&mut self) -> Result<u32> { Ok(u32::from_be_bytes(self.read_array()?)) }
	pub fn read_u32_le(&mut self) -> Result<u32> { Ok(u32::from_le_bytes(self.read_array()?)) }
	pub fn read_i32(&mut self) -> Result<i32> { Ok(self.read_u32()? as i32) }
	pub fn read_i32_le(&mut self) -> Result<i32> { Ok(self.read_u32_le()? as i32) }

	pub fn read_u64(&mut self) -> Result<u64> { Ok(u64::from_be_bytes(self.read_array()?)) }
	pub fn read_u64_le(&mut self) -> Result<u64> { Ok(u64::from_le_bytes(self.read_array()?)) }
	pub fn read_i64(&mut self) -> Result<i64> { Ok(self.read_u64()? as i64) }
	pub fn read_i64_le(&mut self) -> Result<i64> { Ok(self.read_u64_le()? as i64) }

	/// Moves `n` bytes from the front of `self` into the back of `dst`.
	/// Whole segments are moved by value (zero-copy); a segment straddling
	/// the boundary is split with a single bounded byte copy. Fails with
	/// [`Error::Eof`] if fewer than `n` bytes are available.
	pub fn read_into(&mut self, dst: &mut Buffer, n: usize) -> Result<usize> {
		if n > self.byte_count { return Err(Error::Eof) }
		let mut remaining = n;
		while remaining > 0 {
			let front_readable = self.segments.front().expect("byte_count accounted for this segment").readable();
			if front_readable <= remaining {
				let seg = self.segments.pop_front().expect("just inspected the front segment");
				self.byte_count -= front_readable;
				remaining -= front_readable;
				dst.push_whole_segment(seg);
			} else {
				// Split: copy `remaining` bytes out of the front segment,
				// leave the rest in place.
				let bytes = {
					let seg = self.segments.front_mut().expect("just inspected the front segment");
					seg.data()[..remaining].to_vec()
				};
				dst.write_slice(&bytes)?;
				let seg = self.segments.front_mut().expect("still present, only partially consumed");
				seg.consume(remaining);
				self.byte_count -= remaining;
				remaining = 0;
			}
		}
		Ok(n)
	}

	/// Pushes a whole segment onto the back, compacting into the current
	/// back segment's spare capacity when it fits, to avoid accumulating
	/// small fragments.
	fn push_whole_segment(&mut self, seg: Segment) {
		let compact_into_back = self.segments
			.back()
			.map(|back| back.writable() >= seg.readable())
			.unwrap_or(false);

		if compact_into_back {
			let mut seg = seg;
			let readable = seg.readable();
			let back = self.segments.back_mut().expect("checked above");
			let n = seg.move_into(back, readable);
			self.byte_count += n;
			self.pool.recycle(seg);
		} else {
			self.byte_count += seg.readable();
			self.segments.push_back(seg);
		}
	}

	// -- primitive writes --

	/// Returns the back segment if it has at least `min_needed` bytes of
	/// spare capacity, otherwise appends and returns a fresh one from the
	/// pool. Postcondition: `SEG - limit >= min_needed` for `min_needed <=
	/// SEG`.
	fn writable_segment(&mut self, min_needed: usize) -> &mut Segment {
		let need_new = match self.segments.back() {
			Some(seg) => seg.writable() < min_needed,
			None => true,
		};
		if need_new {
			self.segments.push_back(self.pool.take());
		}
		self.segments.back_mut().expect("just ensured a back segment exists")
	}

	fn write_array<const N: usize>(&mut self, bytes: [u8; N]) -> Result {
		let seg = self.writable_segment(N);
		let n = seg.push_slice(&bytes);
		debug_assert_eq!(n, N, "writable_segment should guarantee room for N bytes");
		self.byte_count += N;
		Ok(())
	}

	pub fn write_u8(&mut self, value: u8) -> Result { self.write_array([value]) }
	pub fn write_i8(&mut self, value: i8) -> Result { self.write_u8(value as u8) }

	pub fn write_u16(&mut self, value: u16) -> Result { self.write_array(value.to_be_bytes()) }
	pub fn write_u16_le(&mut self, value: u16) -> Result { self.write_array(value.to_le_bytes()) }
	pub fn write_i16(&mut self, value: i16) -> Result { self.write_u16(value as u16) }
	pub fn write_i16_le(&mut self, value: i16) -> Result { self.write_u16_le(value as u16) }

	pub fn write_u32(&mut self, value: u32) -> Result { self.write_array(value.to_be_bytes()) }
	pub fn write_u32_le(&mut self, value: u32) -> Result { self.write_array(value.to_le_bytes()) }
	pub fn write_i32(&mut self, value: i32) -> Result { self.write_u32(value as u32) }
	pub fn write_i32_le(&mut self, value: i32) -> Result { self.write_u32_le(value as u32) }

	pub fn write_u64(&mut self, value: u64) -> Result { self.write_array(value.to_be_bytes()) }
	pub fn write_u64_le(&mut self, value: u64) -> Result { self.write_array(value.to_le_bytes()) }
	pub fn write_i64(&mut self, value: i64) -> Result { self.write_u64(value as u64) }
	pub fn write_i64_le(&mut self, value: i64) -> Result { self.write_u64_le(value as u64) }

	/// Appends `bytes` to the back of the buffer, claiming segments from the
	/// pool as needed.
	pub fn write_slice(&mut self, mut bytes: &[u8]) -> Result {
		while !bytes.is_empty() {
			let seg = self.writable_segment(1);
			let n = seg.push_slice(bytes);
			self.byte_count += n;
			bytes = &bytes[n..];
		}
		Ok(())
	}

	/// Appends `s` as UTF-8 (no BOM).
	pub fn write_str(&mut self, s: &str) -> Result { self.write_slice(s.as_bytes()) }

	// -- adapter-facing internals --

	/// Reserves a segment with at least `min_needed` bytes of spare
	/// capacity and returns it, for adapters that write into the raw
	/// backing array directly (e.g. reading from a socket at `limit`).
	pub(crate) fn reserve_for_write(&mut self, min_needed: usize) -> &mut Segment {
		self.writable_segment(min_needed)
	}

	/// Records that `n` bytes were written directly into the back
	/// segment's spare capacity by an adapter.
	pub(crate) fn note_written(&mut self, n: usize) { self.byte_count += n; }

	/// The front segment, for adapters that feed a decompressor directly
	/// from its readable range.
	pub(crate) fn front_segment_mut(&mut self) -> Option<&mut Segment> {
		self.segments.front_mut()
	}

	/// Records that `n` bytes were consumed directly from the front
	/// segment's readable range by an adapter, recycling it if now empty.
	pub(crate) fn note_consumed(&mut self, n: usize) {
		self.byte_count -= n;
		if let Some(true) = self.segments.front().map(Segment::is_empty) {
			let seg = self.segments.pop_front().expect("front segment just checked");
			self.pool.recycle(seg);
		}
	}

	/// The last `n` bytes of the back segment, for framers (gzip) that need
	/// to scan bytes an adapter just appended without copying them.
	pub(crate) fn back_segment_tail(&self, n: usize) -> &[u8] {
		let data = self.segments.back().expect("a write just happened").data();
		&data[data.len() - n..]
	}
}

impl Drop for Buffer {
	fn drop(&mut self) { self.close(); }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn write_then_read_round_trip() {
		let mut buf = Buffer::new();
		let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
		buf.write_slice(&data).unwrap();
		assert_eq!(buf.byte_count(), 4096);
		let read = buf.read_byte_string(4096).unwrap();
		assert_eq!(read.as_slice(), &data[..]);
		assert_eq!(buf.byte_count(), 0);
	}

	#[test]
	fn partitioned_read_matches_partition() {
		let mut buf = Buffer::new();
		buf.write_str("hello world").unwrap();
		let a = buf.read_byte_string(5).unwrap();
		let b = buf.read_byte_string(6).unwrap();
		assert_eq!(a.as_slice(), b"hello");
		assert_eq!(b.as_slice(), b" world");
	}

	#[test]
	fn index_of_finds_space_and_reports_none_past_it() {
		let mut buf = Buffer::new();
		buf.write_str("hello world\n").unwrap();
		assert_eq!(buf.index_of(b' ', 0), Some(5));
		assert_eq!(buf.index_of(b' ', 6), None);
	}

	#[test]
	fn splice_moves_whole_and_partial_segments() {
		let mut a = Buffer::new();
		let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
		a.write_slice(&data).unwrap();

		let mut b = Buffer::new();
		a.read_into(&mut b, 3000).unwrap();

		assert_eq!(a.byte_count(), 1096);
		assert_eq!(b.byte_count(), 3000);
		assert_eq!(b.get(0), Some(0x00));
		assert_eq!(b.get(2999), Some(data[2999]));
		assert_eq!(a.get(0), Some(data[3000]));
	}

	#[test]
	fn integer_round_trip() {
		let mut buf = Buffer::new();
		buf.write_u32(0xdead_beef).unwrap();
		buf.write_u32_le(0xdead_beef).unwrap();
		assert_eq!(buf.read_u32().unwrap(), 0xdead_beef);
		assert_eq!(buf.read_u32_le().unwrap(), 0xdead_beef);
	}

	#[test]
	fn read_past_end_fails_eof() {
		let mut buf = Buffer::new();
		buf.write_u8(1).unwrap();
		assert!(matches!(buf.read_u16(), Err(Error::Eof)));
	}

	#[test]
	fn writable_segment_honors_min_needed_postcondition() {
		let mut buf = Buffer::new();
		buf.write_u8(1).unwrap();
		let seg = buf.writable_segment(100);
		assert!(seg.writable() >= 100);
	}

	#[test]
	fn skip_recycles_emptied_segments() {
		let mut buf = Buffer::new();
		let data = vec![7u8; SEG * 3];
		buf.write_slice(&data).unwrap();
		buf.skip(SEG * 2 + 5).unwrap();
		assert_eq!(buf.byte_count(), SEG - 5);
	}
}
