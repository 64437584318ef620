// SPDX-License-Identifier: Apache-2.0

use crate::buffer::Buffer;
use crate::deadline::Deadline;
use crate::error::{ChecksumKind, Error, Result};
use crate::inflate::InflaterSource;
use crate::segment::SEG;
use crate::streams::{BufferedSource, Source};

const ID1: u8 = 0x1f;
const ID2: u8 = 0x8b;
const CM_DEFLATE: u8 = 8;

const FHCRC: u8 = 2;
const FEXTRA: u8 = 4;
const FNAME: u8 = 8;
const FCOMMENT: u8 = 16;

enum State {
	Header,
	Body,
	Trailer,
	Done,
}

/// A [`Source`] decoding an RFC 1952 gzip member: header, a raw-deflate
/// body, and a trailer holding the CRC-32 and size of the uncompressed
/// data.
pub struct GzipSource<S> {
	state: State,
	reader: Option<BufferedSource<S>>,
	inflater: Option<InflaterSource<S>>,
	crc: crc32fast::Hasher,
	bytes_out: u64,
}

impl<S: Source> GzipSource<S> {
	pub fn new(source: S) -> Self {
		Self {
			state: State::Header,
			reader: Some(BufferedSource::new(source)),
			inflater: None,
			crc: crc32fast::Hasher::new(),
			bytes_out: 0,
		}
	}

	fn parse_header(&mut self, deadline: Deadline) -> Result {
		let reader = self.reader.as_mut().expect("Header state keeps a reader");
		reader.require(10, deadline)?;

		let mut header_bytes = Vec::with_capacity(10);
		let mut read_u8 = |reader: &mut BufferedSource<S>| -> Result<u8> {
			let b = reader.buffer_mut().read_u8()?;
			header_bytes.push(b);
			Ok(b)
		};

		let id1 = read_u8(reader)?;
		let id2 = read_u8(reader)?;
		if id1 != ID1 || id2 != ID2 {
			log::warn!("gzip header: bad magic {id1:#04x} {id2:#04x}");
			return Err(Error::MalformedInput("not a gzip stream"));
		}
		let cm = read_u8(reader)?;
		if cm != CM_DEFLATE {
			log::warn!("gzip header: unsupported compression method {cm}");
			return Err(Error::MalformedInput("unsupported gzip compression method"));
		}
		let flg = read_u8(reader)?;
		for _ in 0..4 { read_u8(reader)?; } // MTIME
		read_u8(reader)?; // XFL
		read_u8(reader)?; // OS

		if flg & FEXTRA != 0 {
			reader.require(2, deadline)?;
			let lo = read_u8(reader)?;
			let hi = read_u8(reader)?;
			let xlen = u16::from_le_bytes([lo, hi]) as usize;
			reader.require(xlen, deadline)?;
			for _ in 0..xlen { read_u8(reader)?; }
		}
		if flg & FNAME != 0 {
			loop {
				reader.require(1, deadline)?;
				if read_u8(reader)? == 0 { break; }
			}
		}
		if flg & FCOMMENT != 0 {
			loop {
				reader.require(1, deadline)?;
				if read_u8(reader)? == 0 { break; }
			}
		}
		if flg & FHCRC != 0 {
			reader.require(2, deadline)?;
			let expected = reader.buffer_mut().read_u16_le()?;
			let actual = (crc32fast::hash(&header_bytes) & 0xffff) as u16;
			if actual != expected {
				log::warn!("gzip header: FHCRC mismatch, expected {expected:#06x} got {actual:#06x}");
				return Err(Error::ChecksumMismatch(ChecksumKind::Fhcrc));
			}
		}

		let reader = self.reader.take().expect("checked above");
		let (source, mut leftover) = reader.into_parts();
		let mut inflater = InflaterSource::new(source);
		let n = leftover.byte_count();
		leftover.read_into(inflater.compressed_buffer_mut(), n)?;
		self.inflater = Some(inflater);
		Ok(())
	}

	fn parse_trailer(&mut self, deadline: Deadline) -> Result {
		let inflater = self.inflater.as_mut().expect("Trailer state keeps an inflater");
		while inflater.compressed_buffer_mut().byte_count() < 8 {
			let read = inflater.source_mut().read(inflater.compressed_buffer_mut(), SEG, deadline)?;
			if read == 0 { return Err(Error::Eof); }
		}

		let expected_crc = inflater.compressed_buffer_mut().read_u32_le()?;
		let expected_isize = inflater.compressed_buffer_mut().read_u32_le()?;

		let crc = std::mem::replace(&mut self.crc, crc32fast::Hasher::new());
		let actual_crc = crc.finalize();
		if actual_crc != expected_crc {
			log::warn!("gzip trailer: CRC-32 mismatch, expected {expected_crc:#010x} got {actual_crc:#010x}");
			return Err(Error::ChecksumMismatch(ChecksumKind::Crc));
		}
		let actual_isize = (self.bytes_out % (1u64 << 32)) as u32;
		if actual_isize != expected_isize {
			log::warn!("gzip trailer: ISIZE mismatch, expected {expected_isize} got {actual_isize}");
			return Err(Error::ChecksumMismatch(ChecksumKind::Isize));
		}
		Ok(())
	}
}

impl<S: Source> Source for GzipSource<S> {
	fn read(&mut self, sink: &mut Buffer, byte_count: usize, deadline: Deadline) -> Result<usize> {
		deadline.throw_if_reached()?;
		loop {
			match self.state {
				State::Header => {
					self.parse_header(deadline)?;
					self.state = State::Body;
				}
				State::Body => {
					let inflater = self.inflater.as_mut().expect("Body state keeps an inflater");
					let n = inflater.read(sink, byte_count, deadline)?;
					if n > 0 {
						self.crc.update(sink.back_segment_tail(n));
						self.bytes_out += n as u64;
						return Ok(n);
					}
					self.state = State::Trailer;
				}
				State::Trailer => {
					self.parse_trailer(deadline)?;
					self.state = State::Done;
				}
				State::Done => return Ok(0),
			}
		}
	}

	fn close(&mut self) -> Result {
		if let Some(mut r) = self.reader.take() {
			r.close()
		} else if let Some(inflater) = self.inflater.as_mut() {
			inflater.close()
		} else {
			Ok(())
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn gzip_bytes(data: &[u8]) -> Vec<u8> {
		use flate2::write::GzEncoder;
		use flate2::Compression;
		use std::io::Write;
		let mut enc = GzEncoder::new(Vec::new(), Compression::default());
		enc.write_all(data).unwrap();
		enc.finish().unwrap()
	}

	#[test]
	fn round_trips_a_real_gzip_member() {
		let original = b"the quick brown fox jumps over the lazy dog\n".repeat(50);
		let framed = gzip_bytes(&original);

		let mut src = Buffer::new();
		src.write_slice(&framed).unwrap();

		let mut gzip = GzipSource::new(src);
		let mut out = Buffer::new();
		loop {
			let n = gzip.read(&mut out, SEG, Deadline::NONE).unwrap();
			if n == 0 { break; }
		}
		let decoded = out.read_byte_string(out.byte_count()).unwrap();
		assert_eq!(decoded.as_slice(), &original[..]);
	}

	#[test]
	fn rejects_bad_magic() {
		let mut src = Buffer::new();
		src.write_slice(&[0, 0, 8, 0, 0, 0, 0, 0, 0, 0]).unwrap();
		let mut gzip = GzipSource::new(src);
		let mut out = Buffer::new();
		assert!(matches!(gzip.read(&mut out, SEG, Deadline::NONE), Err(Error::MalformedInput(_))));
	}

	#[test]
	fn corrupted_trailer_crc_is_detected() {
		let original = vec![42u8; 10_000];
		let mut framed = gzip_bytes(&original);
		let len = framed.len();
		framed[len - 8] ^= 0xff; // flip a bit in the CRC-32 trailer field

		let mut src = Buffer::new();
		src.write_slice(&framed).unwrap();

		let mut gzip = GzipSource::new(src);
		let mut out = Buffer::new();
		let result = loop {
			match gzip.read(&mut out, SEG, Deadline::NONE) {
				Ok(0) => break Ok(()),
				Ok(_) => continue,
				Err(e) => break Err(e),
			}
		};
		assert!(matches!(result, Err(Error::ChecksumMismatch(ChecksumKind::Crc))));
	}
}
