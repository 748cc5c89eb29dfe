//! Splitting id spans and id lists into units of concurrent work.

use std::fmt;

/// A contiguous range of source ids fetched as one batch.
///
/// The range is half-open (`start <= id < end`) except for the last chunk of
/// a span, which is closed (`start <= id <= end`) so that the maximum id is
/// harvested too.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdChunk {
    pub start: i32,
    pub end: i32,
    pub closed: bool,
}

impl IdChunk {
    /// Half-open chunk `[start, end)`.
    pub fn new(start: i32, end: i32) -> Self {
        Self {
            start,
            end,
            closed: false,
        }
    }

    /// Closed chunk `[start, end]`.
    pub fn closed(start: i32, end: i32) -> Self {
        Self {
            start,
            end,
            closed: true,
        }
    }

    pub fn contains(&self, id: i32) -> bool {
        id >= self.start && (id < self.end || (self.closed && id == self.end))
    }

    /// Largest id the chunk can contain.
    pub fn last_id(&self) -> i32 {
        if self.closed { self.end } else { self.end - 1 }
    }

    /// Number of ids the chunk can contain.
    pub fn width(&self) -> usize {
        (i64::from(self.last_id()) - i64::from(self.start) + 1).max(0) as usize
    }
}

impl fmt::Display for IdChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let close = if self.closed { ']' } else { ')' };
        write!(f, "[{},{}{}", self.start, self.end, close)
    }
}

/// Plans the chunks covering `[min_id, max_id]` in steps of `chunk_size`.
///
/// Produces `ceil((max_id - min_id) / chunk_size)` chunks. An empty or
/// single-id span (`min_id >= max_id`) yields no chunks.
pub fn plan_id_chunks(min_id: i32, max_id: i32, chunk_size: usize) -> Vec<IdChunk> {
    if min_id >= max_id {
        return Vec::new();
    }
    let step = chunk_size.max(1) as i64;
    let max = i64::from(max_id);
    let mut chunks = Vec::new();
    let mut current = i64::from(min_id);

    while current < max {
        let next = (current + step).min(max);
        // Bounded by max_id, so the narrowing conversions cannot overflow.
        let chunk = if next == max {
            IdChunk::closed(current as i32, max_id)
        } else {
            IdChunk::new(current as i32, next as i32)
        };
        chunks.push(chunk);
        current = next;
    }

    chunks
}

/// Splits an id list into consecutive sub-lists of at most `chunk_size` ids.
pub fn chunk_ids(ids: &[i32], chunk_size: usize) -> Vec<Vec<i32>> {
    ids.chunks(chunk_size.max(1)).map(<[i32]>::to_vec).collect()
}

/// Narrows an observation id span so that only the `cap` most recent ids are
/// harvested.
pub fn cap_span_from_end(min_id: i32, max_id: i32, cap: Option<usize>) -> (i32, i32) {
    match cap {
        Some(cap) => {
            let floor = i64::from(max_id) - cap as i64;
            let min = i64::from(min_id).max(floor) as i32;
            (min, max_id)
        }
        None => (min_id, max_id),
    }
}

/// Narrows an id span so that only the `cap` oldest ids are harvested.
pub fn cap_span_from_start(min_id: i32, max_id: i32, cap: Option<usize>) -> (i32, i32) {
    match cap {
        Some(cap) => {
            let ceiling = i64::from(min_id) + cap as i64;
            let max = i64::from(max_id).min(ceiling) as i32;
            (min_id, max)
        }
        None => (min_id, max_id),
    }
}
