//! Frame containers.
//!
//! - `Frame`: one RGB raster pulled from a source, cheap to clone.
//! - `FrameSlot`: depth-1 hand-off between a producer and a consumer thread.
//!   A new value replaces an unconsumed one, so the consumer always acts on
//!   the freshest frame and never builds a backlog.

use anyhow::{anyhow, Result};
use image::RgbImage;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;

/// One raster frame. Pixels are shared, never copied between stages.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Monotonic index assigned by the source.
    pub id: u64,
    image: Arc<RgbImage>,
    captured_at: Instant,
}

impl Frame {
    pub fn new(id: u64, image: RgbImage) -> Self {
        Self {
            id,
            image: Arc::new(image),
            captured_at: Instant::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn area(&self) -> f64 {
        self.width() as f64 * self.height() as f64
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Milliseconds since capture.
    pub fn age_ms(&self) -> u128 {
        self.captured_at.elapsed().as_millis()
    }
}

// ----------------------------------------------------------------------------
// FrameSlot: depth-1, drop-oldest
// ----------------------------------------------------------------------------

struct SlotState<T> {
    value: Option<T>,
    closed: bool,
    replaced: u64,
}

/// Single-value mailbox. Cloning shares the same slot.
pub struct FrameSlot<T> {
    inner: Arc<(Mutex<SlotState<T>>, Condvar)>,
}

impl<T> Clone for FrameSlot<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> FrameSlot<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new((
                Mutex::new(SlotState {
                    value: None,
                    closed: false,
                    replaced: 0,
                }),
                Condvar::new(),
            )),
        }
    }

    /// Store a value, dropping any value not yet taken.
    ///
    /// Returns true when an older value was replaced.
    pub fn push(&self, value: T) -> Result<bool> {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock().map_err(|_| anyhow!("frame slot lock poisoned"))?;
        if state.closed {
            return Err(anyhow!("frame slot closed"));
        }
        let replaced = state.value.replace(value).is_some();
        if replaced {
            state.replaced += 1;
        }
        cvar.notify_one();
        Ok(replaced)
    }

    /// Block until a value is available. `None` once the slot is closed and drained.
    pub fn take(&self) -> Result<Option<T>> {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock().map_err(|_| anyhow!("frame slot lock poisoned"))?;
        loop {
            if let Some(value) = state.value.take() {
                return Ok(Some(value));
            }
            if state.closed {
                return Ok(None);
            }
            state = cvar
                .wait(state)
                .map_err(|_| anyhow!("frame slot lock poisoned"))?;
        }
    }

    /// Mark end-of-stream. A pending value can still be taken.
    pub fn close(&self) {
        let (lock, cvar) = &*self.inner;
        if let Ok(mut state) = lock.lock() {
            state.closed = true;
        }
        cvar.notify_all();
    }

    /// Number of values dropped because a newer one arrived first.
    pub fn replaced(&self) -> u64 {
        let (lock, _) = &*self.inner;
        lock.lock().map(|state| state.replaced).unwrap_or(0)
    }
}

impl<T> Default for FrameSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn frame_reports_dimensions() {
        let frame = Frame::new(3, RgbImage::new(64, 48));
        assert_eq!(frame.id, 3);
        assert_eq!(frame.width(), 64);
        assert_eq!(frame.height(), 48);
        assert_eq!(frame.area(), 3072.0);
    }

    #[test]
    fn slot_keeps_only_latest() -> Result<()> {
        let slot = FrameSlot::new();
        assert!(!slot.push(1)?);
        assert!(slot.push(2)?);
        assert!(slot.push(3)?);
        assert_eq!(slot.take()?, Some(3));
        assert_eq!(slot.replaced(), 2);
        Ok(())
    }

    #[test]
    fn closed_slot_drains_then_ends() -> Result<()> {
        let slot = FrameSlot::new();
        slot.push("last")?;
        slot.close();
        assert!(slot.push("late").is_err());
        assert_eq!(slot.take()?, Some("last"));
        assert_eq!(slot.take()?, None);
        Ok(())
    }

    #[test]
    fn take_blocks_until_producer_pushes() -> Result<()> {
        let slot = FrameSlot::new();
        let producer = slot.clone();
        let handle = thread::spawn(move || {
            producer.push(42u32).unwrap();
            producer.close();
        });
        assert_eq!(slot.take()?, Some(42));
        handle.join().unwrap();
        assert_eq!(slot.take()?, None);
        Ok(())
    }
}
