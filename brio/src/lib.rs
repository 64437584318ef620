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

//! ## How it works
//!
//! Data is written to and read from reusable bits of memory called
//! *segments*. When a segment is consumed, it's returned to a *pool*. To
//! write data, segments are claimed from this pool; when the pool is
//! exhausted, segments are allocated up to a set byte-capacity limit. The
//! default pool is process-wide and thread-safe, behind a single mutex
//! guarding both its free list and its byte accounting together.
//!
//! ### Segments
//!
//! Segments are fixed-capacity chunks of memory with a live `[pos, limit)`
//! range. A [`Buffer`] holds them in order in a deque, acting as a
//! continuous byte sequence. Moving data between two buffers moves whole
//! segments by value whenever possible — no allocation, no copy — and
//! falls back to a single bounded byte copy only when a move lands on a
//! non-segment boundary.
//!
//! ### Streaming I/O
//!
//! [`streams::Source`] and [`streams::Sink`] are deadline-aware pull/push
//! interfaces over a [`Buffer`]. Every call takes a [`Deadline`] explicitly;
//! there is no thread-interruption-based cancellation. [`gzip::GzipSource`]
//! and [`spdy::NameValueBlockReader`] are built on top of
//! [`inflate::InflaterSource`], which shares its internal compressed-byte
//! buffer with whichever framer wraps it so trailing bytes read ahead of
//! need aren't lost.

mod buffer;
mod byte_string;
mod deadline;
mod error;
pub mod gzip;
pub mod inflate;
mod pool;
mod segment;
pub mod spdy;
pub mod streams;

pub use buffer::Buffer;
pub use byte_string::ByteString;
pub use deadline::Deadline;
pub use error::{ChecksumKind, Error, Result};
pub use pool::{SegmentPool, POOL_MAX};
pub use segment::{Segment, SEG};
