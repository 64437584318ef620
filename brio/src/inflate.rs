// SPDX-License-Identifier: Apache-2.0

use std::cmp::min;
use flate2::{Decompress, FlushDecompress, Status};
use crate::buffer::Buffer;
use crate::deadline::Deadline;
use crate::error::{Error, Result};
use crate::segment::SEG;
use crate::streams::Source;

/// A [`Source`] that inflates a raw DEFLATE stream pulled from an upstream
/// source.
///
/// The compressed bytes are held in this struct's own [`Buffer`] rather than
/// consumed straight off the upstream source; an outer framer that needs the
/// bytes immediately following the deflate stream (gzip's trailer, for
/// example) can keep reading from that same buffer once inflation finishes,
/// instead of re-requesting bytes the upstream already delivered.
pub struct InflaterSource<S> {
	source: S,
	compressed: Buffer,
	inflater: Decompress,
	done: bool,
}

impl<S: Source> InflaterSource<S> {
	/// A plain raw-deflate source with no preset dictionary.
	pub fn new(source: S) -> Self {
		Self {
			source,
			compressed: Buffer::new(),
			inflater: Decompress::new(false),
			done: false,
		}
	}

	/// A raw-deflate source seeded with a preset dictionary, set before any
	/// bytes are decompressed. Raw (headerless) deflate streams carry no
	/// in-band signal requesting a dictionary, so it must be supplied
	/// up front rather than in response to the decoder.
	pub fn with_dictionary(source: S, dictionary: &[u8]) -> Result<Self> {
		let mut inflater = Decompress::new(false);
		inflater
			.set_dictionary(dictionary)
			.map_err(|_| Error::MalformedInput("preset dictionary rejected by inflater"))?;
		Ok(Self {
			source,
			compressed: Buffer::new(),
			inflater,
			done: false,
		})
	}

	/// `true` once the deflate stream has been fully consumed.
	pub fn is_done(&self) -> bool { self.done }

	/// The shared compressed-byte buffer, for an outer framer reading bytes
	/// beyond the end of the deflate stream.
	pub(crate) fn compressed_buffer_mut(&mut self) -> &mut Buffer { &mut self.compressed }

	/// The upstream source, for an outer framer that needs to pull further
	/// bytes directly once this buffer has been drained.
	pub(crate) fn source_mut(&mut self) -> &mut S { &mut self.source }

	/// Non-consuming access to the upstream source.
	pub fn source_ref(&self) -> &S { &self.source }

	fn refill(&mut self, deadline: Deadline) -> Result<bool> {
		if !self.compressed.is_empty() { return Ok(true) }
		let n = self.source.read(&mut self.compressed, SEG, deadline)?;
		Ok(n > 0)
	}
}

impl<S: Source> Source for InflaterSource<S> {
	fn read(&mut self, sink: &mut Buffer, byte_count: usize, deadline: Deadline) -> Result<usize> {
		deadline.throw_if_reached()?;
		if self.done || byte_count == 0 { return Ok(0) }

		loop {
			let had_input = self.refill(deadline)?;

			let seg = sink.reserve_for_write(1);
			let want = min(byte_count, seg.writable());
			let limit = seg.limit();

			let before_in = self.inflater.total_in();
			let before_out = self.inflater.total_out();

			let flush = if had_input { FlushDecompress::None } else { FlushDecompress::Finish };

			let status = {
				let in_buf: &[u8] = match self.compressed.front_segment_mut() {
					Some(s) => s.data(),
					None => &[],
				};
				let out_buf = &mut seg.raw_mut()[limit..limit + want];
				self.inflater
					.decompress(in_buf, out_buf, flush)
					.map_err(|_| Error::MalformedInput("invalid deflate stream"))?
			};

			let consumed = (self.inflater.total_in() - before_in) as usize;
			let produced = (self.inflater.total_out() - before_out) as usize;

			if consumed > 0 { self.compressed.note_consumed(consumed); }
			if produced > 0 {
				seg.add(produced);
				sink.note_written(produced);
			}

			match status {
				Status::StreamEnd => {
					self.done = true;
					return Ok(produced);
				}
				_ if produced > 0 => return Ok(produced),
				_ if consumed > 0 => continue,
				_ if had_input => return Err(Error::MalformedInput("inflater made no progress")),
				_ => return Err(Error::MalformedInput("truncated deflate stream")),
			}
		}
	}

	fn close(&mut self) -> Result {
		self.compressed.clear();
		self.source.close()
	}
}
