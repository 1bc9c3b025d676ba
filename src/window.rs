//! The sender's retransmission store: a fixed-capacity set of frames keyed
//! by sequence number. Slot order carries no meaning; `seq == 0` marks an
//! empty slot since sequence 0 is never transmitted.

use crate::frame::FRAME_LEN;

#[derive(Clone)]
struct WindowSlot {
    seq: u32,
    frame: [u8; FRAME_LEN],
}

/// Fixed-capacity associative store of in-flight, unacknowledged frames.
#[derive(Clone)]
pub struct Window {
    slots: Vec<WindowSlot>,
}

impl Window {
    pub fn new(capacity: usize) -> Self {
        Window {
            slots: vec![
                WindowSlot {
                    seq: 0,
                    frame: [0u8; FRAME_LEN],
                };
                capacity
            ],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Stores `frame` (whose seq is `seq`) in the first empty slot.
    ///
    /// # Panics
    /// Panics if the window is full — callers must check `count() < capacity()`
    /// before calling; a sender that is window-closed must never save.
    pub fn save(&mut self, seq: u32, frame: [u8; FRAME_LEN]) {
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.seq == 0)
            .expect("save called on a full window");
        slot.seq = seq;
        slot.frame = frame;
    }

    /// Cumulative delete: empties every slot whose seq is `<= n`. Implements
    /// the semantics of an RR(n+1) or implicit SREJ(n+1) ack.
    pub fn delete_le(&mut self, n: u32) {
        for slot in &mut self.slots {
            if slot.seq != 0 && slot.seq <= n {
                slot.seq = 0;
                slot.frame = [0u8; FRAME_LEN];
            }
        }
    }

    /// The wire bytes of the non-empty slot with the lowest seq, along with
    /// that seq. `None` if the window is empty.
    pub fn lowest_unacked(&self) -> Option<(u32, [u8; FRAME_LEN])> {
        self.slots
            .iter()
            .filter(|s| s.seq != 0)
            .min_by_key(|s| s.seq)
            .map(|s| (s.seq, s.frame))
    }

    pub fn count(&self) -> usize {
        self.slots.iter().filter(|s| s.seq != 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Flag, Frame};

    fn wire(seq: u32) -> [u8; FRAME_LEN] {
        Frame::new(seq, Flag::Data, b"x").encode()
    }

    #[test]
    fn monotonicity_after_save_and_cumulative_delete() {
        let mut w = Window::new(8);
        let seqs = [2u32, 3, 5, 7, 11];
        for &s in &seqs {
            w.save(s, wire(s));
        }
        assert_eq!(w.count(), seqs.len());

        w.delete_le(5); // acks 2,3,5
        assert_eq!(w.count(), 2);
        let (lowest, _) = w.lowest_unacked().unwrap();
        assert_eq!(lowest, 7);
    }

    #[test]
    fn delete_le_is_idempotent_on_empty_window() {
        let mut w = Window::new(4);
        w.delete_le(100);
        assert_eq!(w.count(), 0);
        assert!(w.lowest_unacked().is_none());
    }

    #[test]
    fn save_reuses_freed_slots() {
        let mut w = Window::new(2);
        w.save(2, wire(2));
        w.save(3, wire(3));
        assert_eq!(w.count(), 2);
        w.delete_le(2);
        assert_eq!(w.count(), 1);
        w.save(4, wire(4));
        assert_eq!(w.count(), 2);
        let (lowest, _) = w.lowest_unacked().unwrap();
        assert_eq!(lowest, 3);
    }

    #[test]
    #[should_panic]
    fn save_on_full_window_panics() {
        let mut w = Window::new(1);
        w.save(2, wire(2));
        w.save(3, wire(3));
    }
}
