//! Pooled scratch images for multi-pass effects.
//!
//! A [`FrameBufferPool`] hands out [`ScratchBuffer`] handles for intermediate
//! images and takes them back when a pass is done with them. Released images stay
//! in the pool and are reused by the next request with an identical
//! [`ImageDesc`], so a pipeline that runs every frame stops allocating after its
//! first frame.
//!
//! Pipelines never talk to the pool directly during a pass. They open a
//! [`ScratchScope`], which remembers every buffer acquired through it and
//! releases whatever is still held when it goes out of scope. That makes every
//! exit path of a pipeline (the final composite, a debug early-out, or an error
//! bubbling up through `?`) return its buffers.
//!
//! ```text
//!   acquire ──▶ in flight ──release──▶ free ──(idle > max_idle_frames)──▶ dropped
//!                  ▲                     │
//!                  └──── acquire (same desc) ◀┘
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use thiserror::Error;

use crate::frame::{FrameImage, ImageDesc};

static NEXT_POOL_ID: AtomicU32 = AtomicU32::new(1);

/// Free images unused for this many frames are dropped by [`FrameBufferPool::end_frame`].
pub const DEFAULT_MAX_IDLE_FRAMES: u64 = 8;

/// The image memory allocator behind a pool failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct AllocError(pub String);

/// Something that can create backend images.
pub trait ImageAllocator {
    /// The image handle type this allocator produces.
    type Image: FrameImage;

    /// Creates a new image matching `desc`.
    fn allocate(&mut self, desc: &ImageDesc) -> Result<Self::Image, AllocError>;
}

/// Errors reported by the buffer pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The allocator could not provide a new image.
    #[error("failed to allocate {desc} scratch buffer: {reason}")]
    AllocationFailure { desc: ImageDesc, reason: String },
    /// Double release, or release of a buffer this pool never handed out.
    #[error("invalid release of {0}: not in flight in this pool")]
    InvalidRelease(BufferId),
    /// Lookup of a buffer that is not currently in flight.
    #[error("{0} is not in flight in this pool")]
    UnknownBuffer(BufferId),
}

/// Identity of one acquisition from one pool.
///
/// Every [`FrameBufferPool::acquire`] mints a fresh id, even when it reuses a
/// pooled image, so a stale handle can never alias a later acquisition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferId {
    pool: u32,
    serial: u64,
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer #{} of pool {}", self.serial, self.pool)
    }
}

/// Handle to an in-flight scratch image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScratchBuffer {
    id: BufferId,
    desc: ImageDesc,
}

impl ScratchBuffer {
    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn desc(&self) -> ImageDesc {
        self.desc
    }
}

/// Snapshot of pool occupancy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Images currently owned by the pool, free or in flight.
    pub allocated: usize,
    /// Images waiting for reuse.
    pub free: usize,
    /// Images handed out and not yet released.
    pub in_flight: usize,
}

struct Slot<I> {
    desc: ImageDesc,
    image: I,
    last_used: u64,
}

/// A pool of reusable scratch images.
pub struct FrameBufferPool<I> {
    id: u32,
    next_serial: u64,
    free: Vec<Slot<I>>,
    in_flight: HashMap<BufferId, Slot<I>>,
    frame: u64,
    max_idle_frames: u64,
}

impl<I> FrameBufferPool<I> {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            next_serial: 0,
            free: Vec::new(),
            in_flight: HashMap::new(),
            frame: 0,
            max_idle_frames: DEFAULT_MAX_IDLE_FRAMES,
        }
    }

    /// Sets how many frames a free image may sit unused before it is dropped.
    pub fn with_max_idle_frames(mut self, frames: u64) -> Self {
        self.max_idle_frames = frames;
        self
    }

    /// Hands out an image matching `desc`, reusing a free one when possible.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::AllocationFailure`] when no free image matches and
    /// the allocator fails (or `desc` has a zero dimension).
    pub fn acquire<A>(&mut self, allocator: &mut A, desc: ImageDesc) -> Result<ScratchBuffer, PoolError>
    where
        A: ImageAllocator<Image = I>,
    {
        let slot = match self.free.iter().position(|slot| slot.desc == desc) {
            Some(index) => self.free.swap_remove(index),
            None => {
                if !desc.is_valid() {
                    return Err(PoolError::AllocationFailure {
                        desc,
                        reason: "zero-sized image".to_string(),
                    });
                }
                let image = allocator
                    .allocate(&desc)
                    .map_err(|e| PoolError::AllocationFailure {
                        desc,
                        reason: e.0,
                    })?;
                log::debug!(
                    "Pool {} grew to {} images ({desc})",
                    self.id,
                    self.free.len() + self.in_flight.len() + 1
                );
                Slot {
                    desc,
                    image,
                    last_used: self.frame,
                }
            }
        };

        let id = BufferId {
            pool: self.id,
            serial: self.next_serial,
        };
        self.next_serial += 1;
        self.in_flight.insert(id, slot);
        Ok(ScratchBuffer { id, desc })
    }

    /// Returns a buffer to the pool.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidRelease`] if the buffer was already released
    /// or belongs to another pool. The pool is left unchanged in that case.
    pub fn release(&mut self, buffer: ScratchBuffer) -> Result<(), PoolError> {
        match self.in_flight.remove(&buffer.id) {
            Some(mut slot) => {
                slot.last_used = self.frame;
                self.free.push(slot);
                Ok(())
            }
            None => {
                log::error!("Invalid release of {} ({})", buffer.id, buffer.desc);
                Err(PoolError::InvalidRelease(buffer.id))
            }
        }
    }

    /// The image behind an in-flight buffer.
    pub fn image(&self, buffer: ScratchBuffer) -> Option<&I> {
        self.in_flight.get(&buffer.id).map(|slot| &slot.image)
    }

    /// Whether `buffer` is currently handed out by this pool.
    pub fn is_in_flight(&self, buffer: ScratchBuffer) -> bool {
        self.in_flight.contains_key(&buffer.id)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.free.len() + self.in_flight.len(),
            free: self.free.len(),
            in_flight: self.in_flight.len(),
        }
    }

    /// Marks the end of a frame and drops free images that have gone stale.
    pub fn end_frame(&mut self) {
        self.frame += 1;
        let frame = self.frame;
        let max_idle = self.max_idle_frames;
        let before = self.free.len();
        self.free.retain(|slot| frame - slot.last_used <= max_idle);
        let dropped = before - self.free.len();
        if dropped > 0 {
            log::debug!("Pool {} dropped {dropped} idle images", self.id);
        }
    }

    /// Drops every free image. In-flight buffers are unaffected.
    pub fn clear(&mut self) {
        self.free.clear();
    }
}

impl<I> Default for FrameBufferPool<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> fmt::Debug for FrameBufferPool<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBufferPool")
            .field("id", &self.id)
            .field("frame", &self.frame)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Owner of the scratch buffers acquired during one pipeline invocation.
///
/// Buffers can be released early with [`release`](Self::release); anything
/// still held when the scope is dropped goes back to the pool.
pub struct ScratchScope<'p, I> {
    pool: &'p mut FrameBufferPool<I>,
    held: Vec<ScratchBuffer>,
}

impl<'p, I> ScratchScope<'p, I> {
    pub fn new(pool: &'p mut FrameBufferPool<I>) -> Self {
        Self {
            pool,
            held: Vec::new(),
        }
    }

    /// Acquires a buffer from the pool and takes ownership of it.
    ///
    /// # Errors
    ///
    /// Propagates [`PoolError::AllocationFailure`] from the pool.
    pub fn acquire<A>(&mut self, allocator: &mut A, desc: ImageDesc) -> Result<ScratchBuffer, PoolError>
    where
        A: ImageAllocator<Image = I>,
    {
        let buffer = self.pool.acquire(allocator, desc)?;
        self.held.push(buffer);
        Ok(buffer)
    }

    /// The image behind a buffer held by this scope.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::UnknownBuffer`] if the buffer is not held here.
    pub fn image(&self, buffer: ScratchBuffer) -> Result<&I, PoolError> {
        if !self.held.contains(&buffer) {
            return Err(PoolError::UnknownBuffer(buffer.id));
        }
        self.pool
            .image(buffer)
            .ok_or(PoolError::UnknownBuffer(buffer.id))
    }

    /// Releases a held buffer before the scope ends.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidRelease`] if the buffer is not held here.
    pub fn release(&mut self, buffer: ScratchBuffer) -> Result<(), PoolError> {
        let Some(index) = self.held.iter().position(|held| *held == buffer) else {
            log::error!("Invalid release of {}: not held by this scope", buffer.id);
            return Err(PoolError::InvalidRelease(buffer.id));
        };
        self.held.swap_remove(index);
        self.pool.release(buffer)
    }

    /// Number of buffers currently held.
    pub fn held(&self) -> usize {
        self.held.len()
    }
}

impl<I> Drop for ScratchScope<'_, I> {
    fn drop(&mut self) {
        for buffer in self.held.drain(..) {
            let released = self.pool.release(buffer);
            debug_assert!(released.is_ok(), "scratch scope lost track of {}", buffer.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ImageFormat;

    #[derive(Clone, Debug, PartialEq)]
    struct TestImage {
        serial: u32,
        desc: ImageDesc,
    }

    impl FrameImage for TestImage {
        fn desc(&self) -> ImageDesc {
            self.desc
        }
    }

    #[derive(Default)]
    struct TestAllocator {
        allocations: u32,
        fail: bool,
    }

    impl ImageAllocator for TestAllocator {
        type Image = TestImage;

        fn allocate(&mut self, desc: &ImageDesc) -> Result<TestImage, AllocError> {
            if self.fail {
                return Err(AllocError("out of memory".to_string()));
            }
            self.allocations += 1;
            Ok(TestImage {
                serial: self.allocations,
                desc: *desc,
            })
        }
    }

    fn desc(w: u32, h: u32) -> ImageDesc {
        ImageDesc::new(w, h, ImageFormat::Rgba16Float)
    }

    #[test]
    fn release_then_acquire_reuses_the_image() {
        let mut alloc = TestAllocator::default();
        let mut pool = FrameBufferPool::new();

        let a = pool.acquire(&mut alloc, desc(64, 32)).unwrap();
        let serial = pool.image(a).unwrap().serial;
        pool.release(a).unwrap();

        let b = pool.acquire(&mut alloc, desc(64, 32)).unwrap();
        assert_eq!(alloc.allocations, 1);
        assert_eq!(pool.stats().allocated, 1);
        assert_eq!(pool.image(b).unwrap().serial, serial);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn in_flight_images_are_never_shared() {
        let mut alloc = TestAllocator::default();
        let mut pool = FrameBufferPool::new();

        let a = pool.acquire(&mut alloc, desc(16, 16)).unwrap();
        let b = pool.acquire(&mut alloc, desc(16, 16)).unwrap();
        assert_ne!(pool.image(a).unwrap().serial, pool.image(b).unwrap().serial);
        assert_eq!(pool.stats().in_flight, 2);
    }

    #[test]
    fn different_desc_allocates_fresh() {
        let mut alloc = TestAllocator::default();
        let mut pool = FrameBufferPool::new();

        let a = pool.acquire(&mut alloc, desc(16, 16)).unwrap();
        pool.release(a).unwrap();
        pool.acquire(&mut alloc, desc(16, 16).with_format(ImageFormat::R16Float))
            .unwrap();
        assert_eq!(alloc.allocations, 2);
        assert_eq!(pool.stats().free, 1);
    }

    #[test]
    fn double_release_is_rejected() {
        let mut alloc = TestAllocator::default();
        let mut pool = FrameBufferPool::new();

        let a = pool.acquire(&mut alloc, desc(8, 8)).unwrap();
        pool.release(a).unwrap();
        assert_eq!(pool.release(a), Err(PoolError::InvalidRelease(a.id())));
        assert_eq!(pool.stats().free, 1);
    }

    #[test]
    fn release_into_foreign_pool_is_rejected() {
        let mut alloc = TestAllocator::default();
        let mut pool_a = FrameBufferPool::new();
        let mut pool_b: FrameBufferPool<TestImage> = FrameBufferPool::new();

        let a = pool_a.acquire(&mut alloc, desc(8, 8)).unwrap();
        assert!(matches!(pool_b.release(a), Err(PoolError::InvalidRelease(_))));
        assert!(pool_a.is_in_flight(a));
    }

    #[test]
    fn allocation_failure_is_reported() {
        let mut alloc = TestAllocator {
            fail: true,
            ..Default::default()
        };
        let mut pool = FrameBufferPool::new();

        let err = pool.acquire(&mut alloc, desc(8, 8)).unwrap_err();
        assert!(matches!(err, PoolError::AllocationFailure { .. }));
        assert_eq!(pool.stats(), PoolStats::default());
    }

    #[test]
    fn zero_sized_request_fails() {
        let mut alloc = TestAllocator::default();
        let mut pool = FrameBufferPool::new();
        assert!(pool.acquire(&mut alloc, desc(0, 8)).is_err());
        assert_eq!(alloc.allocations, 0);
    }

    #[test]
    fn idle_images_are_dropped_after_max_idle_frames() {
        let mut alloc = TestAllocator::default();
        let mut pool = FrameBufferPool::new().with_max_idle_frames(2);

        let a = pool.acquire(&mut alloc, desc(8, 8)).unwrap();
        pool.release(a).unwrap();
        pool.end_frame();
        pool.end_frame();
        assert_eq!(pool.stats().free, 1);
        pool.end_frame();
        assert_eq!(pool.stats().free, 0);
    }

    #[test]
    fn scope_releases_everything_on_drop() {
        let mut alloc = TestAllocator::default();
        let mut pool = FrameBufferPool::new();

        {
            let mut scope = ScratchScope::new(&mut pool);
            let a = scope.acquire(&mut alloc, desc(8, 8)).unwrap();
            scope.acquire(&mut alloc, desc(4, 4)).unwrap();
            scope.release(a).unwrap();
            assert_eq!(scope.held(), 1);
        }
        assert_eq!(pool.stats().in_flight, 0);
        assert_eq!(pool.stats().free, 2);
    }

    #[test]
    fn scope_rejects_buffers_it_does_not_hold() {
        let mut alloc = TestAllocator::default();
        let mut pool = FrameBufferPool::new();
        let outside = pool.acquire(&mut alloc, desc(8, 8)).unwrap();

        let mut scope = ScratchScope::new(&mut pool);
        assert!(matches!(scope.image(outside), Err(PoolError::UnknownBuffer(_))));
        assert!(matches!(scope.release(outside), Err(PoolError::InvalidRelease(_))));
    }
}
