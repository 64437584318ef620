// SPDX-License-Identifier: Apache-2.0

use std::cmp::min;
use crate::buffer::Buffer;
use crate::byte_string::ByteString;
use crate::deadline::Deadline;
use crate::error::{Error, Result};
use crate::inflate::InflaterSource;
use crate::streams::{read_lowercase_byte_string, BufferedSource, Source};

/// The upper bound on name/value pairs in a single SPDY/3 header block,
/// guarding against a malicious or corrupt length field forcing an
/// unbounded allocation.
pub const MAX_PAIRS: usize = 1024;

/// The zlib preset dictionary defined by the SPDY/3 draft specification,
/// seeded with common HTTP header names and values so short header blocks
/// compress well without carrying their own dictionary.
pub const SPDY3_DICTIONARY: &[u8] = b"\x00\x00\x00\x07options\x00\x00\x00\x04head\x00\x00\x00\x04post\x00\x00\x00\x03put\x00\x00\x00\x06delete\x00\x00\x00\x05trace\x00\x00\x00\x06accept\x00\x00\x00\x0eaccept-charset\x00\x00\x00\x0faccept-encoding\x00\x00\x00\x0faccept-language\x00\x00\x00\x0daccept-ranges\x00\x00\x00\x03age\x00\x00\x00\x05allow\x00\x00\x00\x0dauthorization\x00\x00\x00\x0dcache-control\x00\x00\x00\x0aconnection\x00\x00\x00\x0ccontent-base\x00\x00\x00\x10content-encoding\x00\x00\x00\x10content-language\x00\x00\x00\x0econtent-length\x00\x00\x00\x10content-location\x00\x00\x00\x0bcontent-md5\x00\x00\x00\x0dcontent-range\x00\x00\x00\x0ccontent-type\x00\x00\x00\x04date\x00\x00\x00\x04etag\x00\x00\x00\x06expect\x00\x00\x00\x07expires\x00\x00\x00\x04from\x00\x00\x00\x04host\x00\x00\x00\x08if-match\x00\x00\x00\x11if-modified-since\x00\x00\x00\x0dif-none-match\x00\x00\x00\x08if-range\x00\x00\x00\x13if-unmodified-since\x00\x00\x00\x0dlast-modified\x00\x00\x00\x08location\x00\x00\x00\x0cmax-forwards\x00\x00\x00\x06pragma\x00\x00\x00\x12proxy-authenticate\x00\x00\x00\x13proxy-authorization\x00\x00\x00\x05range\x00\x00\x00\x07referer\x00\x00\x00\x0bretry-after\x00\x00\x00\x06server\x00\x00\x00\x02te\x00\x00\x00\x07trailer\x00\x00\x00\x11transfer-encoding\x00\x00\x00\x07upgrade\x00\x00\x00\x0auser-agent\x00\x00\x00\x04vary\x00\x00\x00\x03via\x00\x00\x00\x07warning\x00\x00\x00\x10www-authenticate\x00\x00\x00\x06method\x00\x00\x00\x03get\x00\x00\x00\x06status\x00\x00\x00\x07version\x00\x00\x00\x03url\x00\x00\x00\x06public\x00\x00\x00\x0aset-cookie\x00\x00\x00\x0akeep-alive\x00\x00\x00\x06origin100101201202205206300301302303304305306307402405406407408409410411412413414415416417502504505203 Non-Authoritative Information204 No Content301 Moved Permanently400 Bad Request401 Unauthorized403 Forbidden404 Not Found500 Internal Server Error501 Not Implemented503 Service UnavailableJan Feb Mar Apr May Jun Jul Aug Sept Oct Nov Dec 00:00:00 Mon, Tue, Wed, Thu, Fri, Sat, Sun, GMTchunked,text/html,image/png,image/jpg,image/gif,application/xml,application/xhtml+xml,text/plain,text/javascript,public,max-age=gzip,deflate,sdchcharset=utf-8charset=iso-8859-1,utf-,*,enq=0.";

/// A bounded view over an upstream source, draining a leftover buffer
/// first before pulling fresh bytes, and yielding EOF once its declared
/// budget is exhausted regardless of how much more data the upstream
/// source actually holds. The budget starts at zero and grows with each
/// call to [`NameValueBlockReader::read_name_value_block`].
pub struct CompressedWindowSource<S> {
	pending: Buffer,
	inner: S,
	remaining: usize,
}

impl<S: Source> CompressedWindowSource<S> {
	pub fn new(pending: Buffer, inner: S) -> Self {
		Self { pending, inner, remaining: 0 }
	}

	/// Widens the remaining budget by `length` bytes.
	pub fn add_budget(&mut self, length: usize) { self.remaining += length; }

	/// Compressed bytes declared but not yet consumed.
	pub fn remaining(&self) -> usize { self.remaining }
}

impl<S: Source> Source for CompressedWindowSource<S> {
	fn read(&mut self, sink: &mut Buffer, byte_count: usize, deadline: Deadline) -> Result<usize> {
		if self.remaining == 0 { return Ok(0) }
		let want = min(byte_count, self.remaining);

		let n = if !self.pending.is_empty() {
			let take = min(want, self.pending.byte_count());
			self.pending.read_into(sink, take)?;
			take
		} else {
			self.inner.read(sink, want, deadline)?
		};

		self.remaining -= n;
		Ok(n)
	}

	fn close(&mut self) -> Result {
		self.pending.clear();
		self.inner.close()
	}
}

/// Decodes SPDY/3 compressed name/value header blocks: a
/// zlib-dictionary-seeded deflate stream over a 32-bit pair count followed
/// by that many 32-bit-length-prefixed name/value byte strings. Names are
/// lowercased on read, matching the wire convention that header names are
/// case-insensitive ASCII. A single reader may decode several blocks over
/// its lifetime (e.g. one per HEADERS-like frame on the same stream), each
/// widening the compressed budget by that frame's declared length.
pub struct NameValueBlockReader<S> {
	reader: BufferedSource<InflaterSource<CompressedWindowSource<S>>>,
}

impl<S: Source> NameValueBlockReader<S> {
	/// `pending` is any compressed bytes already read ahead of this block
	/// (e.g. while parsing the surrounding frame header) that belong to it.
	pub fn new(pending: Buffer, source: S) -> Result<Self> {
		let windowed = CompressedWindowSource::new(pending, source);
		let inflater = InflaterSource::with_dictionary(windowed, SPDY3_DICTIONARY)?;
		Ok(Self { reader: BufferedSource::new(inflater) })
	}

	fn add_budget(&mut self, length: usize) {
		self.reader.source_mut().source_mut().add_budget(length);
	}

	/// Compressed bytes declared for the block(s) read so far but not yet
	/// consumed; must be zero once
	/// [`read_name_value_block`](Self::read_name_value_block) returns
	/// successfully.
	pub fn compressed_remaining(&self) -> usize {
		self.reader.source_ref().source_ref().remaining()
	}

	fn read_length_prefixed(&mut self, deadline: Deadline) -> Result<ByteString> {
		self.reader.require(4, deadline)?;
		let len = self.reader.buffer_mut().read_u32()? as usize;
		self.reader.require(len, deadline)?;
		self.reader.buffer_mut().read_byte_string(len)
	}

	/// Drains any bytes still owed within the compressed window after the
	/// pairs have been read, then asserts the window is exactly exhausted.
	///
	/// This must pull through `self.reader` (the inflater), not read the
	/// compressed window directly: a reader spanning several
	/// `Z_SYNC_FLUSH`-terminated blocks keeps one deflate context alive
	/// across calls, and bypassing the decompressor here would leave its
	/// internal bit position desynced from the window for every block read
	/// afterward.
	fn finish_reading(&mut self, deadline: Deadline) -> Result {
		self.reader.buffer_mut().clear();
		while self.compressed_remaining() > 0 {
			if self.reader.exhausted(deadline)? { break; }
			self.reader.buffer_mut().clear();
		}
		if self.compressed_remaining() != 0 {
			log::warn!("spdy name/value block: {} compressed bytes left over after reading pairs", self.compressed_remaining());
			return Err(Error::MalformedInput("trailing bytes after name/value block"));
		}
		Ok(())
	}

	/// Reads one block's worth of pairs: `length` is the number of
	/// compressed bytes this block occupies in the surrounding frame, added
	/// to the running budget before decoding starts.
	pub fn read_name_value_block(&mut self, length: usize, deadline: Deadline) -> Result<Vec<(ByteString, ByteString)>> {
		self.add_budget(length);

		self.reader.require(4, deadline)?;
		let num_pairs = self.reader.buffer_mut().read_u32()? as usize;
		if num_pairs > MAX_PAIRS {
			log::warn!("spdy name/value block: {num_pairs} pairs exceeds the cap of {MAX_PAIRS}");
			return Err(Error::MalformedInput("name/value block declares too many pairs"));
		}

		let mut pairs = Vec::with_capacity(num_pairs);
		for _ in 0..num_pairs {
			self.reader.require(4, deadline)?;
			let name_len = self.reader.buffer_mut().read_u32()? as usize;
			let name = read_lowercase_byte_string(&mut self.reader, name_len, deadline)?;
			if name.is_empty() {
				log::warn!("spdy name/value block: empty header name");
				return Err(Error::MalformedInput("empty header name"));
			}
			let value = self.read_length_prefixed(deadline)?;
			pairs.push((name, value));
		}

		self.finish_reading(deadline)?;
		Ok(pairs)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn encode_block(pairs: &[(&str, &str)]) -> Vec<u8> {
		let mut plain = Vec::new();
		plain.extend_from_slice(&(pairs.len() as u32).to_be_bytes());
		for (name, value) in pairs {
			plain.extend_from_slice(&(name.len() as u32).to_be_bytes());
			plain.extend_from_slice(name.as_bytes());
			plain.extend_from_slice(&(value.len() as u32).to_be_bytes());
			plain.extend_from_slice(value.as_bytes());
		}
		compress_with_dictionary(SPDY3_DICTIONARY, &plain)
	}

	fn compress_with_dictionary(dict: &[u8], data: &[u8]) -> Vec<u8> {
		use flate2::{Compress, Compression, FlushCompress};
		let mut compressor = Compress::new(Compression::default(), false);
		compressor.set_dictionary(dict).unwrap();
		let mut out = vec![0u8; data.len() + 1024];
		compressor.compress(data, &mut out, FlushCompress::Finish).unwrap();
		let n = compressor.total_out() as usize;
		out.truncate(n);
		out
	}

	/// Compresses two plaintext payloads through one persistent deflate
	/// context, `Z_SYNC_FLUSH`-terminated between them, the way two blocks on
	/// the same SPDY/3 stream share one decompressor.
	fn compress_two_blocks_with_sync_flush(dict: &[u8], plain1: &[u8], plain2: &[u8]) -> (Vec<u8>, Vec<u8>) {
		use flate2::{Compress, Compression, FlushCompress};
		let mut compressor = Compress::new(Compression::default(), false);
		compressor.set_dictionary(dict).unwrap();

		let mut out = vec![0u8; plain1.len() + plain2.len() + 4096];
		compressor.compress(plain1, &mut out, FlushCompress::Sync).unwrap();
		let after_block1 = compressor.total_out() as usize;
		let block1 = out[..after_block1].to_vec();

		compressor.compress(plain2, &mut out[after_block1..], FlushCompress::Finish).unwrap();
		let after_block2 = compressor.total_out() as usize;
		let block2 = out[after_block1..after_block2].to_vec();

		(block1, block2)
	}

	#[test]
	fn decodes_pairs_and_lowercases_names() {
		let compressed = encode_block(&[("Host", "example.com"), ("Accept", "*/*")]);

		let mut src = Buffer::new();
		src.write_slice(&compressed).unwrap();

		let mut reader = NameValueBlockReader::new(Buffer::new(), src).unwrap();
		let pairs = reader.read_name_value_block(compressed.len(), Deadline::NONE).unwrap();

		assert_eq!(pairs.len(), 2);
		assert_eq!(pairs[0].0.as_slice(), b"host");
		assert_eq!(pairs[0].1.as_slice(), b"example.com");
		assert_eq!(pairs[1].0.as_slice(), b"accept");
		assert_eq!(reader.compressed_remaining(), 0);
	}

	#[test]
	fn rejects_pair_count_over_the_cap() {
		let mut plain = Vec::new();
		plain.extend_from_slice(&((MAX_PAIRS as u32) + 1).to_be_bytes());
		let compressed = compress_with_dictionary(SPDY3_DICTIONARY, &plain);

		let mut src = Buffer::new();
		src.write_slice(&compressed).unwrap();

		let mut reader = NameValueBlockReader::new(Buffer::new(), src).unwrap();
		assert!(matches!(
			reader.read_name_value_block(compressed.len(), Deadline::NONE),
			Err(Error::MalformedInput(_))
		));
	}

	#[test]
	fn two_blocks_share_one_decompressor_across_a_sync_flush() {
		fn encode_plain(pairs: &[(&str, &str)]) -> Vec<u8> {
			let mut plain = Vec::new();
			plain.extend_from_slice(&(pairs.len() as u32).to_be_bytes());
			for (name, value) in pairs {
				plain.extend_from_slice(&(name.len() as u32).to_be_bytes());
				plain.extend_from_slice(name.as_bytes());
				plain.extend_from_slice(&(value.len() as u32).to_be_bytes());
				plain.extend_from_slice(value.as_bytes());
			}
			plain
		}

		let plain1 = encode_plain(&[("Host", "example.com")]);
		let plain2 = encode_plain(&[("Accept", "*/*")]);
		let (block1, block2) = compress_two_blocks_with_sync_flush(SPDY3_DICTIONARY, &plain1, &plain2);

		let mut src = Buffer::new();
		src.write_slice(&block1).unwrap();
		src.write_slice(&block2).unwrap();

		let mut reader = NameValueBlockReader::new(Buffer::new(), src).unwrap();

		let first = reader.read_name_value_block(block1.len(), Deadline::NONE).unwrap();
		assert_eq!(first[0].0.as_slice(), b"host");
		assert_eq!(first[0].1.as_slice(), b"example.com");
		assert_eq!(reader.compressed_remaining(), 0);

		// If `finish_reading` bypassed the inflater to drain the first
		// block's residue, the decompressor's bit position would now be
		// desynced from the window and this second block would fail to
		// decode correctly.
		let second = reader.read_name_value_block(block2.len(), Deadline::NONE).unwrap();
		assert_eq!(second[0].0.as_slice(), b"accept");
		assert_eq!(second[0].1.as_slice(), b"*/*");
		assert_eq!(reader.compressed_remaining(), 0);
	}

	#[test]
	fn leftover_bytes_from_framing_count_toward_the_block() {
		let compressed = encode_block(&[("a", "b")]);
		let split = compressed.len() / 2;

		let mut pending = Buffer::new();
		pending.write_slice(&compressed[..split]).unwrap();
		let mut src = Buffer::new();
		src.write_slice(&compressed[split..]).unwrap();

		let mut reader = NameValueBlockReader::new(pending, src).unwrap();
		let pairs = reader.read_name_value_block(compressed.len(), Deadline::NONE).unwrap();
		assert_eq!(pairs, vec![(ByteString::from(&b"a"[..]), ByteString::from(&b"b"[..]))]);
	}
}
