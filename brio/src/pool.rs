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

use std::sync::{Mutex, OnceLock};
use crate::segment::{Segment, SEG};

/// The minimum capacity of the default, process-wide [`SegmentPool`].
pub const POOL_MAX: usize = 64 * SEG;

struct State {
	free: Vec<Segment>,
	free_bytes: usize,
}

/// A thread-safe, bounded free list of [`Segment`]s.
///
/// `take` and `recycle` are the only operations; both are a single mutex
/// acquisition, expected to be lightly contended since segments are cheap
/// to produce when the pool runs dry.
pub struct SegmentPool {
	state: Mutex<State>,
	capacity: usize,
}

impl SegmentPool {
	/// Creates a new, empty pool holding at most `capacity` bytes worth of
	/// free segments.
	pub fn with_capacity(capacity: usize) -> Self {
		Self {
			state: Mutex::new(State { free: Vec::new(), free_bytes: 0 }),
			capacity,
		}
	}

	/// Returns the process-wide default pool, created on first use.
	pub fn default_pool() -> &'static Self {
		static POOL: OnceLock<SegmentPool> = OnceLock::new();
		POOL.get_or_init(|| Self::with_capacity(POOL_MAX))
	}

	/// Bytes currently held as free segments. Exposed for tests and callers
	/// that want to observe pool conservation under churn.
	pub fn free_bytes(&self) -> usize {
		self.state.lock().unwrap_or_else(|e| e.into_inner()).free_bytes
	}

	/// Claims a detached, empty segment, allocating a fresh one if the pool
	/// is empty.
	pub fn take(&self) -> Segment {
		let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
		match state.free.pop() {
			Some(seg) => {
				state.free_bytes -= SEG;
				seg
			}
			None => {
				drop(state);
				log::trace!("segment pool exhausted, allocating a new segment");
				Segment::new()
			}
		}
	}

	/// Returns `segment` to the pool, clearing it first. Dropped instead if
	/// the pool is already at capacity.
	pub fn recycle(&self, mut segment: Segment) {
		segment.reset();

		let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
		if state.free_bytes + SEG > self.capacity {
			log::trace!("segment pool at capacity, dropping a recycled segment");
			return;
		}
		state.free_bytes += SEG;
		state.free.push(segment);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn take_allocates_when_empty() {
		let pool = SegmentPool::with_capacity(POOL_MAX);
		let seg = pool.take();
		assert!(seg.is_empty());
	}

	#[test]
	fn recycle_then_take_reuses_segment() {
		let pool = SegmentPool::with_capacity(POOL_MAX);
		let seg = pool.take();
		pool.recycle(seg);
		let reused = pool.take();
		assert!(reused.is_empty());
	}

	#[test]
	fn recycle_drops_past_capacity() {
		let pool = SegmentPool::with_capacity(SEG);
		pool.recycle(Segment::new());
		// Pool is now full; this one should be dropped, not stored.
		pool.recycle(Segment::new());
		let _ = pool.take();
		let _ = pool.take();
		// Neither take should panic even though only one segment was kept.
	}

	#[test]
	fn free_bytes_tracks_recycled_segments() {
		let pool = SegmentPool::with_capacity(4 * SEG);
		assert_eq!(pool.free_bytes(), 0);
		let a = pool.take();
		let b = pool.take();
		pool.recycle(a);
		assert_eq!(pool.free_bytes(), SEG);
		pool.recycle(b);
		assert_eq!(pool.free_bytes(), 2 * SEG);
		let _ = pool.take();
		assert_eq!(pool.free_bytes(), SEG);
	}
}
