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
use std::io::{Read, Write};
use crate::buffer::Buffer;
use crate::byte_string::ByteString;
use crate::deadline::Deadline;
use crate::error::{Error, Result};
use crate::segment::SEG;

/// A pull source of bytes. Every call takes an explicit [`Deadline`] rather
/// than relying on thread interruption for timeouts or cancellation.
pub trait Source {
	/// Reads up to `byte_count` bytes into the back of `sink`, returning the
	/// number actually read. `Ok(0)` signals end of stream.
	fn read(&mut self, sink: &mut Buffer, byte_count: usize, deadline: Deadline) -> Result<usize>;

	/// Releases any resources held by this source.
	fn close(&mut self) -> Result;
}

/// A push destination for bytes.
pub trait Sink {
	/// Writes exactly `byte_count` bytes from the front of `source`. Fails
	/// with [`Error::Eof`] if `source` holds fewer bytes, without consuming
	/// any of them.
	fn write(&mut self, source: &mut Buffer, byte_count: usize, deadline: Deadline) -> Result;

	/// Pushes any buffering downstream toward its final destination.
	fn flush(&mut self, deadline: Deadline) -> Result;

	/// Flushes and releases any resources held by this sink.
	fn close(&mut self) -> Result;
}

impl Source for Buffer {
	fn read(&mut self, sink: &mut Buffer, byte_count: usize, deadline: Deadline) -> Result<usize> {
		deadline.throw_if_reached()?;
		if self.is_empty() { return Ok(0) }
		let n = min(byte_count, self.byte_count());
		self.read_into(sink, n)
	}

	fn close(&mut self) -> Result {
		self.clear();
		Ok(())
	}
}

impl Sink for Buffer {
	// Buffer-to-buffer writes are all-or-nothing: `read_into` checks that
	// enough bytes are available before moving or copying any of them.
	fn write(&mut self, source: &mut Buffer, byte_count: usize, deadline: Deadline) -> Result {
		deadline.throw_if_reached()?;
		source.read_into(self, byte_count)?;
		Ok(())
	}

	fn flush(&mut self, deadline: Deadline) -> Result { deadline.throw_if_reached() }

	fn close(&mut self) -> Result { Ok(()) }
}

/// Adapts a [`std::io::Read`] into a [`Source`].
///
/// The deadline is only checked before each underlying `read` call; the
/// standard library gives no portable way to abort a blocking read already
/// in flight, so a source that blocks past its deadline still blocks.
pub struct StreamSource<R> {
	inner: R,
}

impl<R: Read> StreamSource<R> {
	pub fn new(inner: R) -> Self { Self { inner } }
}

impl<R: Read> Source for StreamSource<R> {
	fn read(&mut self, sink: &mut Buffer, byte_count: usize, deadline: Deadline) -> Result<usize> {
		deadline.throw_if_reached()?;
		if byte_count == 0 { return Ok(0) }

		let seg = sink.reserve_for_write(1);
		let want = min(byte_count, seg.writable());
		let limit = seg.limit();
		let buf = &mut seg.raw_mut()[limit..limit + want];

		match self.inner.read(buf) {
			Ok(0) => Ok(0),
			Ok(n) => {
				seg.add(n);
				sink.note_written(n);
				Ok(n)
			}
			Err(e) => Err(Error::from_io(e)),
		}
	}

	fn close(&mut self) -> Result { Ok(()) }
}

/// Adapts a [`std::io::Write`] into a [`Sink`].
pub struct StreamSink<W> {
	inner: W,
}

impl<W: Write> StreamSink<W> {
	pub fn new(inner: W) -> Self { Self { inner } }
}

impl<W: Write> Sink for StreamSink<W> {
	fn write(&mut self, source: &mut Buffer, byte_count: usize, deadline: Deadline) -> Result {
		deadline.throw_if_reached()?;
		if byte_count > source.byte_count() { return Err(Error::Eof) }

		let mut remaining = byte_count;
		while remaining > 0 {
			deadline.throw_if_reached()?;
			let n = {
				let seg = source.front_segment_mut().expect("byte_count guarantees a front segment");
				let want = min(seg.readable(), remaining);
				self.inner.write(&seg.data()[..want]).map_err(Error::from_io)?
			};
			if n == 0 { return Err(Error::Eof) }
			source.note_consumed(n);
			remaining -= n;
		}
		Ok(())
	}

	fn flush(&mut self, deadline: Deadline) -> Result {
		deadline.throw_if_reached()?;
		self.inner.flush().map_err(Error::from_io)
	}

	fn close(&mut self) -> Result { self.flush(Deadline::NONE) }
}

/// A [`Source`] paired with its own read-ahead [`Buffer`], for callers that
/// want classical buffered-reader ergonomics (`require`, then consume via
/// the buffer's primitive reads) on top of the pull interface.
pub struct BufferedSource<S> {
	source: S,
	buffer: Buffer,
}

impl<S: Source> BufferedSource<S> {
	pub fn new(source: S) -> Self {
		Self { source, buffer: Buffer::new() }
	}

	/// Direct access to the read-ahead buffer.
	pub fn buffer_mut(&mut self) -> &mut Buffer { &mut self.buffer }

	/// Non-consuming access to the upstream source, for callers that need
	/// to inspect its state (e.g. a window's remaining byte count) without
	/// taking ownership back.
	pub fn source_ref(&self) -> &S { &self.source }

	/// Mutable access to the upstream source, for callers that need to
	/// drive it directly (e.g. adding budget to a windowed source nested
	/// underneath an inflater).
	pub(crate) fn source_mut(&mut self) -> &mut S { &mut self.source }

	/// Pulls from the upstream source until at least `n` bytes are buffered,
	/// failing with [`Error::Eof`] if the source runs out first.
	pub fn require(&mut self, n: usize, deadline: Deadline) -> Result {
		while self.buffer.byte_count() < n {
			deadline.throw_if_reached()?;
			let read = self.source.read(&mut self.buffer, SEG, deadline)?;
			if read == 0 { return Err(Error::Eof) }
		}
		Ok(())
	}

	/// Returns `true` if the source is exhausted and no buffered bytes
	/// remain.
	pub fn exhausted(&mut self, deadline: Deadline) -> Result<bool> {
		if !self.buffer.is_empty() { return Ok(false) }
		Ok(self.source.read(&mut self.buffer, SEG, deadline)? == 0)
	}

	pub fn close(&mut self) -> Result {
		self.buffer.clear();
		self.source.close()
	}

	pub fn into_source(self) -> S { self.source }

	/// Splits this reader into its upstream source and whatever bytes are
	/// still buffered ahead of it, for callers that parsed a prefix (e.g. a
	/// header) with the buffered convenience API and now need to hand both
	/// pieces to a different consumer without losing read-ahead bytes.
	pub fn into_parts(self) -> (S, Buffer) { (self.source, self.buffer) }
}

/// A [`Sink`] paired with its own write-behind [`Buffer`].
pub struct BufferedSink<S> {
	sink: S,
	buffer: Buffer,
}

impl<S: Sink> BufferedSink<S> {
	pub fn new(sink: S) -> Self {
		Self { sink, buffer: Buffer::new() }
	}

	/// Direct access to the write-behind buffer.
	pub fn buffer_mut(&mut self) -> &mut Buffer { &mut self.buffer }

	/// Pushes every buffered byte to the underlying sink.
	pub fn emit(&mut self, deadline: Deadline) -> Result {
		let n = self.buffer.byte_count();
		if n > 0 {
			self.sink.write(&mut self.buffer, n, deadline)?;
		}
		Ok(())
	}

	pub fn flush(&mut self, deadline: Deadline) -> Result {
		self.emit(deadline)?;
		self.sink.flush(deadline)
	}

	pub fn close(&mut self, deadline: Deadline) -> Result {
		self.flush(deadline)?;
		self.sink.close()
	}
}

/// Reads exactly `n` bytes as a [`ByteString`], buffering ahead from
/// `reader`'s upstream source as needed.
pub fn read_byte_string<S: Source>(reader: &mut BufferedSource<S>, n: usize, deadline: Deadline) -> Result<ByteString> {
	reader.require(n, deadline)?;
	reader.buffer_mut().read_byte_string(n)
}

/// Like [`read_byte_string`], lowercasing the result. For wire fields that
/// are case-insensitive ASCII, such as header names.
pub fn read_lowercase_byte_string<S: Source>(reader: &mut BufferedSource<S>, n: usize, deadline: Deadline) -> Result<ByteString> {
	Ok(read_byte_string(reader, n, deadline)?.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn buffer_to_buffer_splice_via_sink_trait() {
		let mut a = Buffer::new();
		a.write_str("hello world").unwrap();
		let mut b = Buffer::new();
		Sink::write(&mut b, &mut a, 5, Deadline::NONE).unwrap();
		assert_eq!(b.byte_count(), 5);
		assert_eq!(a.byte_count(), 6);
	}

	#[test]
	fn write_more_than_available_is_all_or_nothing() {
		let mut a = Buffer::new();
		a.write_str("hi").unwrap();
		let mut b = Buffer::new();
		assert!(matches!(Sink::write(&mut b, &mut a, 5, Deadline::NONE), Err(Error::Eof)));
		assert_eq!(a.byte_count(), 2, "source must be untouched on failure");
		assert_eq!(b.byte_count(), 0);
	}

	#[test]
	fn stream_source_reads_from_a_cursor() {
		let data = vec![9u8; 5000];
		let src = StreamSource::new(std::io::Cursor::new(data.clone()));
		let mut buffered = BufferedSource::new(src);
		buffered.require(5000, Deadline::NONE).unwrap();
		let out = buffered.buffer_mut().read_byte_string(5000).unwrap();
		assert_eq!(out.as_slice(), &data[..]);
	}

	#[test]
	fn stream_sink_writes_to_a_vec() {
		let mut out = Vec::new();
		{
			let sink = StreamSink::new(&mut out);
			let mut buffered = BufferedSink::new(sink);
			buffered.buffer_mut().write_str("payload").unwrap();
			buffered.close(Deadline::NONE).unwrap();
		}
		assert_eq!(out, b"payload");
	}

	#[test]
	fn expired_deadline_fails_before_any_io() {
		let d = Deadline::at(std::time::Instant::now() - std::time::Duration::from_secs(1));
		let mut a = Buffer::new();
		a.write_str("x").unwrap();
		let mut b = Buffer::new();
		assert!(matches!(Sink::write(&mut b, &mut a, 1, d), Err(Error::Timeout)));
	}
}
