use std::{mem, ops};

use crate::TracerConfig;

// Maps (batch, bounce) onto the flat ray & intersection arrays.
//
// [ bounce 0: batch 0 | batch 1 | ... ][ bounce 1: batch 0 | batch 1 | ... ] ...
//
// Every segment holds `batch_size` elements, a ray keeps its lane
// index within the batch across all of its bounce segments
#[derive(Clone, Copy)]
#[derive(Debug, PartialEq, Eq)]
pub struct BufferLayout {
    batch_size: usize,
    batch_count: usize,
    light_path_length: usize,
}

impl BufferLayout {
    pub fn new(config: &TracerConfig) -> Self {
        Self {
            batch_size: config.batch_size(),
            batch_count: config.batch_count(),
            light_path_length: config.light_path_length(),
        }
    }

    pub fn batch_size(&self) -> usize { self.batch_size }

    pub fn batch_count(&self) -> usize { self.batch_count }

    pub fn light_path_length(&self) -> usize { self.light_path_length }

    pub fn rays_per_bounce(&self) -> usize {
        self.batch_size * self.batch_count
    }

    pub fn len(&self) -> usize {
        self.rays_per_bounce() * self.light_path_length
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Element offset of a batch segment
    pub fn offset(&self, batch: usize, bounce: usize) -> usize {
        debug_assert!(batch < self.batch_count);
        debug_assert!(bounce < self.light_path_length);

        self.batch_size * batch + self.rays_per_bounce() * bounce
    }

    pub fn segment(&self, batch: usize, bounce: usize) -> ops::Range<usize> {
        let offset = self.offset(batch, bounce);

        offset..(offset + self.batch_size)
    }

    // Where the scatter kernel of `bounce` writes, if anywhere
    pub fn next(&self, batch: usize, bounce: usize) -> Option<usize> {
        let next = bounce + 1;

        (next < self.light_path_length).then(|| self.offset(batch, next))
    }

    pub fn bounce_segment(&self, bounce: usize) -> ops::Range<usize> {
        let offset = self.rays_per_bounce() * bounce;

        offset..(offset + self.rays_per_bounce())
    }

    // Byte offset of a batch segment in a buffer of `T` records
    pub fn byte_offset<T>(&self, batch: usize, bounce: usize) -> u64 {
        (self.offset(batch, bounce) * mem::size_of::<T>()) as u64
    }

    // Inverse of `offset`: (batch, bounce, lane) for a flat index
    pub fn locate(&self, idx: usize) -> (usize, usize, usize) {
        let bounce = idx / self.rays_per_bounce();
        let within = idx % self.rays_per_bounce();

        (within / self.batch_size, bounce, within % self.batch_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom;

    fn layout(size: usize, count: usize, length: usize) -> BufferLayout {
        BufferLayout::new(&TracerConfig::new(size, count, length).unwrap())
    }

    #[test]
    fn scenario_segments() {
        let layout = layout(4, 1, 2);

        assert_eq!(layout.len(), 8);
        assert_eq!(layout.segment(0, 0), 0..4);
        assert_eq!(layout.segment(0, 1), 4..8);
        assert_eq!(layout.next(0, 0), Some(4));
        assert_eq!(layout.next(0, 1), None);
    }

    #[test]
    fn offsets_follow_the_formula() {
        let layout = layout(9, 3, 4);

        for batch in 0..3 {
            for bounce in 0..4 {
                assert_eq!(layout.offset(batch, bounce), 9 * batch + 27 * bounce);
                assert_eq!(
                    layout.byte_offset::<geom::Ray>(batch, bounce),
                    (32 * (9 * batch + 27 * bounce)) as u64,
                );
            }
        }
    }

    #[test]
    fn segments_are_disjoint_and_cover_the_buffer() {
        let layout = layout(4, 3, 3);

        let mut covered = vec![0u8; layout.len()];
        for batch in 0..3 {
            for bounce in 0..3 {
                for idx in layout.segment(batch, bounce) {
                    covered[idx] += 1;
                }
            }
        }

        // Each element belongs to exactly one segment
        assert!(covered.iter().all(|&count| count == 1));
    }

    #[test]
    fn segments_stay_inside_their_bounce() {
        let layout = layout(16, 4, 2);

        for bounce in 0..2 {
            let outer = layout.bounce_segment(bounce);

            for batch in 0..4 {
                let inner = layout.segment(batch, bounce);

                assert!(outer.start <= inner.start && inner.end <= outer.end);
            }
        }
    }

    #[test]
    fn locate_inverts_offset() {
        let layout = layout(4, 2, 3);

        for batch in 0..2 {
            for bounce in 0..3 {
                for lane in 0..4 {
                    let idx = layout.offset(batch, bounce) + lane;

                    assert_eq!(layout.locate(idx), (batch, bounce, lane));
                }
            }
        }
    }
}
