use crate::core::{Result, StreamError};
use crate::range::ByteRange;

pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

/// How the fetch granularity for a request is chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkPolicy {
    /// Same granularity for every request.
    Fixed(u64),
    /// `2^ceil(log2(length / 1024))` KiB, with the exponent clamped to
    /// `[min_exp, max_exp]`. Only used when configured.
    Adaptive { min_exp: u32, max_exp: u32 },
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        ChunkPolicy::Fixed(DEFAULT_CHUNK_SIZE)
    }
}

impl ChunkPolicy {
    /// Granularity for a request spanning `requested_length` (`until - from`).
    pub fn chunk_size(&self, requested_length: u64) -> u64 {
        match *self {
            ChunkPolicy::Fixed(size) => size.max(1),
            ChunkPolicy::Adaptive { min_exp, max_exp } => {
                // ceil(log2(len / 1024)) == ceil(log2(len)) - 10, and anything
                // below 1 KiB lands under every exponent bound
                let exp = match requested_length {
                    0 | 1 => i64::MIN,
                    len => (64 - (len - 1).leading_zeros()) as i64 - 10,
                };
                let max_exp = max_exp.max(min_exp);
                let exp = exp.clamp(min_exp as i64, max_exp as i64).min(53) as u32;
                (1u64 << exp) * 1024
            }
        }
    }
}

/// Aligned backend reads that reconstruct one requested byte range.
///
/// Window `i` starts at `offset + i * chunk_size`. The first window loses
/// `first_part_cut` leading bytes and only the first `last_part_cut` bytes
/// of the last window are kept.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkPlan {
    pub chunk_size: u64,
    pub offset: u64,
    pub part_count: u32,
    pub first_part_cut: u64,
    pub last_part_cut: u64,
    pub total_size: u64,
}

impl ChunkPlan {
    /// Fails when the range needs more windows than a plan can count, which
    /// only happens with a tiny granularity on a very large file.
    pub fn new(range: ByteRange, total_size: u64, policy: ChunkPolicy) -> Result<Self> {
        let ByteRange { from, until } = range;
        debug_assert!(from <= until && until < total_size);

        let requested_length = until - from;
        let chunk_size = policy.chunk_size(requested_length);
        let offset = from - from % chunk_size;
        let first_part_cut = from - offset;
        let last_part_cut = until % chunk_size + 1;
        // windows from the one holding `from` through the one holding `until`
        let windows = until / chunk_size - from / chunk_size + 1;
        let part_count = u32::try_from(windows).map_err(|_| {
            StreamError::Config(format!(
                "range {from}-{until} needs {windows} windows of {chunk_size} bytes"
            ))
        })?;

        Ok(Self {
            chunk_size,
            offset,
            part_count,
            first_part_cut,
            last_part_cut,
            total_size,
        })
    }

    /// Backend offset and length of window `index`.
    pub fn window(&self, index: u32) -> (u64, u64) {
        let start = self.offset + index as u64 * self.chunk_size;
        let length = self.chunk_size.min(self.total_size.saturating_sub(start));
        (start, length)
    }

    pub fn is_last(&self, index: u32) -> bool {
        index + 1 == self.part_count
    }

    /// First byte delivered to the client.
    pub fn first_byte(&self) -> u64 {
        self.offset + self.first_part_cut
    }

    /// Last byte delivered to the client.
    pub fn last_byte(&self) -> u64 {
        self.offset + (self.part_count as u64 - 1) * self.chunk_size + self.last_part_cut - 1
    }

    pub fn content_length(&self) -> u64 {
        self.last_byte() - self.first_byte() + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    fn plan(from: u64, until: u64, total: u64) -> ChunkPlan {
        ChunkPlan::new(ByteRange::new(from, until), total, ChunkPolicy::default()).unwrap()
    }

    /// Rebuild the delivered byte offsets window by window.
    fn reconstruct(p: &ChunkPlan) -> (u64, u64) {
        let mut first = None;
        let mut last = 0;
        for i in 0..p.part_count {
            let (start, length) = p.window(i);
            let end = if p.is_last(i) {
                start + p.last_part_cut
            } else {
                start + length
            };
            let begin = if i == 0 { start + p.first_part_cut } else { start };
            first.get_or_insert(begin);
            last = end - 1;
        }
        (first.unwrap(), last)
    }

    #[test]
    fn mid_file_range_across_three_windows() {
        let p = plan(500_000, 2_500_000, 3_000_000);
        assert_eq!(p.chunk_size, MIB);
        assert_eq!(p.offset, 0);
        assert_eq!(p.first_part_cut, 500_000);
        assert_eq!(p.last_part_cut, 403_849);
        assert_eq!(p.part_count, 3);
        assert_eq!(p.content_length(), 2_000_001);
        assert_eq!(reconstruct(&p), (500_000, 2_500_000));
    }

    #[test]
    fn whole_file() {
        for total in [1, 500, MIB - 1, MIB, MIB + 1, 3 * MIB, 3_000_000] {
            let p = plan(0, total - 1, total);
            assert_eq!(p.part_count as u64, total.div_ceil(MIB), "total {total}");
            assert_eq!(p.first_part_cut, 0);
            assert_eq!(p.last_part_cut, (total - 1) % MIB + 1);
            assert_eq!(reconstruct(&p), (0, total - 1));
        }
    }

    #[test]
    fn inside_one_window() {
        let p = plan(MIB + 10, MIB + 20, 4 * MIB);
        assert_eq!(p.part_count, 1);
        assert_eq!(p.offset, MIB);
        assert_eq!(p.first_part_cut, 10);
        assert_eq!(p.last_part_cut, 21);
        assert_eq!(p.content_length(), 11);
    }

    #[test]
    fn single_byte() {
        let p = plan(42, 42, 100);
        assert_eq!(p.part_count, 1);
        assert_eq!(p.content_length(), 1);
    }

    #[test]
    fn short_range_straddling_a_boundary() {
        let p = plan(MIB - 100, MIB + 100, 2 * MIB);
        assert_eq!(p.part_count, 2);
        assert_eq!(reconstruct(&p), (MIB - 100, MIB + 100));
    }

    #[test]
    fn last_window_is_clipped_to_file_size() {
        let p = plan(0, 2 * MIB + 9, 2 * MIB + 10);
        assert_eq!(p.window(2), (2 * MIB, 10));
        assert_eq!(p.window(0), (0, MIB));
    }

    #[test]
    fn idempotent() {
        assert_eq!(plan(123, 4_567_890, 5_000_000), plan(123, 4_567_890, 5_000_000));
    }

    #[test]
    fn reconstructs_every_range_of_a_small_file() {
        let total = 37;
        for chunk in [1, 4, 7, 36, 37, 64] {
            for from in 0..total {
                for until in from..total {
                    let p = ChunkPlan::new(
                        ByteRange::new(from, until),
                        total,
                        ChunkPolicy::Fixed(chunk),
                    )
                    .unwrap();
                    assert_eq!(p.offset % chunk, 0);
                    assert!(p.offset <= from);
                    assert_eq!(reconstruct(&p), (from, until), "chunk {chunk}");
                }
            }
        }
    }

    #[test]
    fn adaptive_policy_scales_and_clamps() {
        let policy = ChunkPolicy::Adaptive {
            min_exp: 2,
            max_exp: 10,
        };
        assert_eq!(policy.chunk_size(0), 4 * 1024);
        assert_eq!(policy.chunk_size(100 * 1024), 128 * 1024);
        assert_eq!(policy.chunk_size(u64::MAX), 1024 * 1024);
        // lengths that are not a whole power of two KiB round up
        assert_eq!(policy.chunk_size(5000), 8 * 1024);
        assert_eq!(policy.chunk_size(100 * 1024 + 1), 128 * 1024);
        assert_eq!(policy.chunk_size(1024 * 1024 + 1), 1024 * 1024);

        let unbounded = ChunkPolicy::Adaptive {
            min_exp: 0,
            max_exp: 20,
        };
        assert_eq!(unbounded.chunk_size(1), 1024);
        assert_eq!(unbounded.chunk_size(1024), 1024);
        assert_eq!(unbounded.chunk_size(1500), 2 * 1024);
        assert_eq!(unbounded.chunk_size(3 * 1024 + 1), 4 * 1024);
    }

    #[test]
    fn too_many_windows_is_rejected() {
        let total = (1u64 << 32) + 10;
        let err = ChunkPlan::new(
            ByteRange::new(0, total - 1),
            total,
            ChunkPolicy::Fixed(1),
        )
        .unwrap_err();
        assert!(matches!(err, StreamError::Config(_)));

        let p = ChunkPlan::new(ByteRange::new(0, total - 1), total, ChunkPolicy::Fixed(2)).unwrap();
        assert_eq!(p.content_length(), total);
    }

    #[test]
    fn fixed_policy_ignores_length() {
        let policy = ChunkPolicy::default();
        assert_eq!(policy.chunk_size(1), MIB);
        assert_eq!(policy.chunk_size(10 * MIB), MIB);
    }
}
