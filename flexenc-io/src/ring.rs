use crate::{Error, Result};

/// Circular receive buffer. One slot is kept free, so a ring of capacity `C`
/// holds at most `C - 1` units and `head == tail` always means empty.
#[derive(Debug, Clone)]
pub struct RingBuffer<W> {
    buf: Box<[W]>,
    head: usize,
    tail: usize,
}

impl<W: Copy + Default> RingBuffer<W> {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity < 2 {
            return Err(Error::InvalidArgument("ring buffer needs at least two slots"));
        }
        Ok(Self {
            buf: vec![W::default(); capacity].into_boxed_slice(),
            head: 0,
            tail: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn len(&self) -> usize {
        if self.tail > self.head {
            self.head + self.capacity() - self.tail
        } else {
            self.head - self.tail
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity() - 1
    }

    fn advance(&self, idx: usize) -> usize {
        if idx + 1 == self.capacity() { 0 } else { idx + 1 }
    }

    /// Store `unit` at head. When full, the oldest unit is evicted first and
    /// returned.
    pub fn push_overwriting(&mut self, unit: W) -> Option<W> {
        let evicted = if self.is_full() {
            let old = self.buf[self.tail];
            self.tail = self.advance(self.tail);
            Some(old)
        } else {
            None
        };
        self.buf[self.head] = unit;
        self.head = self.advance(self.head);
        evicted
    }

    pub fn pop(&mut self) -> Option<W> {
        if self.is_empty() {
            return None;
        }
        let unit = self.buf[self.tail];
        self.tail = self.advance(self.tail);
        Some(unit)
    }

    /// Move up to `out.len()` units into `out`, returning how many were moved.
    pub fn drain_into(&mut self, out: &mut [W]) -> usize {
        let mut n = 0;
        while n < out.len() {
            match self.pop() {
                Some(unit) => out[n] = unit,
                None => break,
            }
            n += 1;
        }
        n
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    #[test]
    fn too_small() {
        assert!(RingBuffer::<u16>::new(0).is_err());
        assert!(RingBuffer::<u16>::new(1).is_err());
        assert!(RingBuffer::<u16>::new(2).is_ok());
    }

    #[test]
    fn wraps_and_reserves_a_slot() {
        let mut ring = RingBuffer::<u16>::new(4).unwrap();
        for unit in 0..3 {
            assert_eq!(ring.push_overwriting(unit), None);
        }
        assert!(ring.is_full());
        assert_eq!(ring.len(), 3);

        assert_eq!(ring.push_overwriting(3), Some(0));
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.pop(), Some(1));
        assert_eq!(ring.pop(), Some(2));
        assert_eq!(ring.pop(), Some(3));
        assert_eq!(ring.pop(), None);
        assert!(ring.is_empty());
    }

    #[test]
    fn matches_model_under_random_ops() {
        let mut seed = 0x9e37_79b9u32;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            seed
        };

        for capacity in 2..9 {
            let mut ring = RingBuffer::<u16>::new(capacity).unwrap();
            let mut model = VecDeque::new();
            for step in 0..2000u16 {
                if next() % 3 == 0 {
                    assert_eq!(ring.pop(), model.pop_front());
                } else {
                    let evicted = ring.push_overwriting(step);
                    if model.len() == capacity - 1 {
                        assert_eq!(evicted, model.pop_front());
                    } else {
                        assert_eq!(evicted, None);
                    }
                    model.push_back(step);
                    if evicted.is_some() {
                        // oldest survivor is the second-oldest before the push
                        assert_eq!(ring.buf[ring.tail], model[0]);
                    }
                }
                assert_eq!(ring.len(), model.len());
                assert!(ring.len() <= capacity - 1);
            }
        }
    }

    #[test]
    fn drain_partial() {
        let mut ring = RingBuffer::<u8>::new(8).unwrap();
        for unit in [1, 2, 3] {
            ring.push_overwriting(unit);
        }
        let mut out = [0; 2];
        assert_eq!(ring.drain_into(&mut out), 2);
        assert_eq!(out, [1, 2]);
        let mut out = [0; 4];
        assert_eq!(ring.drain_into(&mut out), 1);
        assert_eq!(out[0], 3);
    }
}
