//! Shared-memory buffer pools.
//!
//! A pool is one anonymous memfd mapped once and sliced into a fixed number
//! of `wl_buffer`s. Ownership of each slice ping-pongs between us and the
//! compositor: we may write a slot only while it is marked released, and the
//! backing mapping may be unmapped only once the compositor has released
//! every buffer and every protocol handle has been destroyed. That
//! distributed reference count is modelled by [`PoolCore`], separate from
//! the protocol glue, with the actual unmap tied to dropping the
//! [`memmap2::MmapMut`].

use std::fs::File;
use std::os::fd::AsFd;

use memmap2::MmapMut;
use rustix::fs::{ftruncate, memfd_create, MemfdFlags};
use wayland_client::{
    protocol::{wl_buffer, wl_buffer::WlBuffer, wl_shm, wl_shm::WlShm},
    Connection, Dispatch, QueueHandle,
};

use crate::display::WaylandDisplay;
use crate::error::PoolError;

/// Number of buffers per pool. Three is enough to keep one frame on screen,
/// one queued, and one being drawn.
pub const POOL_DEPTH: usize = 3;

const BYTES_PER_PIXEL: i32 = 4;

/// Stable identifier for a pool, used as `wl_buffer` user data together with
/// the slot index. Pools are looked up by id, never by proxy identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolId(pub(crate) u32);

/// Byte layout of one pool, derived from the logical size and the output
/// scale. Dimensions are physical pixels (logical times scale).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PoolLayout {
    width: i32,
    height: i32,
    stride: i32,
    slot_size: usize,
    total: usize,
}

impl PoolLayout {
    fn compute(width: i32, height: i32, scale: i32) -> Result<PoolLayout, PoolError> {
        let physical_width = width
            .checked_mul(scale)
            .filter(|w| *w > 0)
            .ok_or(PoolError::StrideOverflow(width))?;
        let physical_height = height
            .checked_mul(scale)
            .filter(|h| *h > 0)
            .ok_or(PoolError::StrideOverflow(width))?;
        let stride = physical_width
            .checked_mul(BYTES_PER_PIXEL)
            .ok_or(PoolError::StrideOverflow(width))?;
        let slot_size = (stride as usize)
            .checked_mul(physical_height as usize)
            .ok_or(PoolError::StrideOverflow(width))?;
        // wl_shm_pool sizes are i32 on the wire.
        let total = slot_size
            .checked_mul(POOL_DEPTH)
            .filter(|t| *t <= i32::MAX as usize)
            .ok_or(PoolError::StrideOverflow(width))?;
        Ok(PoolLayout {
            width: physical_width,
            height: physical_height,
            stride,
            slot_size,
            total,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    /// The compositor is not holding this buffer.
    released: bool,
    /// The protocol handle has not been destroyed yet.
    handle_alive: bool,
}

/// What the protocol layer must do after a release notification.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ReleaseAction {
    /// Nothing; the slot is simply available again.
    None,
    /// The pool is pending free: destroy this slot's handle. `unmap` is set
    /// when it was the last live handle and the backing may now go away.
    DestroyHandle { unmap: bool },
}

/// Per-buffer state machine plus the pool-level pending-free flag.
#[derive(Debug)]
pub(crate) struct PoolCore {
    slots: [Slot; POOL_DEPTH],
    pending_free: bool,
}

impl PoolCore {
    fn new() -> Self {
        PoolCore {
            slots: [Slot {
                released: true,
                handle_alive: true,
            }; POOL_DEPTH],
            pending_free: false,
        }
    }

    /// First slot we own, or `None` when the compositor holds all of them.
    /// `None` is the back-pressure signal: wait for the next release or
    /// frame callback instead of allocating more.
    fn acquire(&self) -> Option<usize> {
        if self.pending_free {
            return None;
        }
        self.slots
            .iter()
            .position(|slot| slot.released && slot.handle_alive)
    }

    fn present(&mut self, slot: usize) {
        if let Some(slot) = self.slots.get_mut(slot) {
            slot.released = false;
        }
    }

    fn release(&mut self, slot: usize) -> ReleaseAction {
        if slot >= POOL_DEPTH {
            return ReleaseAction::None;
        }
        self.slots[slot].released = true;
        if self.pending_free && self.slots[slot].handle_alive {
            self.slots[slot].handle_alive = false;
            ReleaseAction::DestroyHandle {
                unmap: self.all_handles_dead(),
            }
        } else {
            ReleaseAction::None
        }
    }

    /// Marks the pool for destruction. Returns the slots whose handles can
    /// be destroyed right away; the rest follow as releases arrive.
    fn begin_free(&mut self) -> Vec<usize> {
        self.pending_free = true;
        let mut destroy = Vec::new();
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if slot.released && slot.handle_alive {
                slot.handle_alive = false;
                destroy.push(idx);
            }
        }
        destroy
    }

    fn all_handles_dead(&self) -> bool {
        self.slots.iter().all(|slot| !slot.handle_alive)
    }
}

/// A triple-buffered shared-memory pool bound to the compositor.
#[derive(Debug)]
pub struct BufferPool {
    core: PoolCore,
    buffers: [Option<WlBuffer>; POOL_DEPTH],
    map: MmapMut,
    slot_size: usize,
    /// Buffer size in physical pixels (logical size times output scale).
    pub width: i32,
    pub height: i32,
    pub stride: i32,
}

impl BufferPool {
    /// Allocates the backing memory and the protocol-side buffers.
    ///
    /// `width`/`height` are logical; the buffers are created at
    /// `width * scale` by `height * scale`.
    pub(crate) fn create(
        shm: &WlShm,
        qh: &QueueHandle<WaylandDisplay>,
        id: PoolId,
        width: i32,
        height: i32,
        scale: i32,
    ) -> Result<BufferPool, PoolError> {
        let layout = PoolLayout::compute(width, height, scale)?;

        let fd = memfd_create("beacon-shm", MemfdFlags::CLOEXEC)?;
        ftruncate(&fd, layout.total as u64)?;
        let file = File::from(fd);
        // Safety: the file is a freshly created memfd that nothing else has
        // a reference to; it cannot be truncated behind our back.
        let map = unsafe { MmapMut::map_mut(&file)? };

        let wl_pool = shm.create_pool(file.as_fd(), layout.total as i32, qh, ());
        let mut buffers: [Option<WlBuffer>; POOL_DEPTH] = Default::default();
        for (slot, entry) in buffers.iter_mut().enumerate() {
            *entry = Some(wl_pool.create_buffer(
                (slot * layout.slot_size) as i32,
                layout.width,
                layout.height,
                layout.stride,
                wl_shm::Format::Argb8888,
                qh,
                (id, slot),
            ));
        }
        // The buffers keep the server-side pool alive.
        wl_pool.destroy();

        tracing::debug!(
            pool = id.0,
            width = layout.width,
            height = layout.height,
            stride = layout.stride,
            bytes = layout.total,
            "created buffer pool"
        );

        Ok(BufferPool {
            core: PoolCore::new(),
            buffers,
            map,
            slot_size: layout.slot_size,
            width: layout.width,
            height: layout.height,
            stride: layout.stride,
        })
    }

    /// Next buffer we are allowed to draw into, or `None` when the
    /// compositor owns all of them (retry after the next frame callback).
    pub fn acquire(&mut self) -> Option<usize> {
        self.core.acquire()
    }

    /// Pixel bytes of an acquired slot, ARGB8888 at [`Self::stride`].
    /// `None` for a slot index the pool does not have.
    pub fn canvas(&mut self, slot: usize) -> Option<&mut [u8]> {
        if slot >= POOL_DEPTH {
            return None;
        }
        let start = slot * self.slot_size;
        self.map.get_mut(start..start + self.slot_size)
    }

    /// Hands the slot to the compositor; returns the handle to attach.
    pub(crate) fn mark_presented(&mut self, slot: usize) -> Option<&WlBuffer> {
        let buffer = self.buffers.get(slot)?.as_ref()?;
        self.core.present(slot);
        Some(buffer)
    }

    /// Applies a release notification. Returns `true` when the pool was
    /// pending free and this was the last outstanding handle, i.e. the
    /// caller must drop the pool now (dropping unmaps the backing).
    pub(crate) fn handle_release(&mut self, slot: usize) -> bool {
        match self.core.release(slot) {
            ReleaseAction::None => false,
            ReleaseAction::DestroyHandle { unmap } => {
                if let Some(buffer) = self.buffers[slot].take() {
                    buffer.destroy();
                }
                unmap
            }
        }
    }

    /// Starts tearing the pool down. Handles the compositor has already
    /// released are destroyed immediately; returns `true` when none remain
    /// and the caller must drop the pool now. Otherwise the remaining
    /// destructions happen lazily as release notifications arrive.
    pub(crate) fn begin_free(&mut self) -> bool {
        for slot in self.core.begin_free() {
            if let Some(buffer) = self.buffers[slot].take() {
                buffer.destroy();
            }
        }
        self.core.all_handles_dead()
    }
}

impl Dispatch<WlBuffer, (PoolId, usize)> for WaylandDisplay {
    fn event(
        state: &mut WaylandDisplay,
        _proxy: &WlBuffer,
        event: wl_buffer::Event,
        &(id, slot): &(PoolId, usize),
        _conn: &Connection,
        _qh: &QueueHandle<WaylandDisplay>,
    ) {
        if let wl_buffer::Event::Release = event {
            let freeable = match state.pools.get_mut(&id) {
                Some(pool) => pool.handle_release(slot),
                None => return,
            };
            if freeable {
                // Last outstanding handle: unmap by dropping the pool.
                state.pools.remove(&id);
                tracing::debug!(pool = id.0, "buffer pool reclaimed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_applies_back_pressure() {
        let mut core = PoolCore::new();
        for expected in 0..POOL_DEPTH {
            let slot = core.acquire().unwrap();
            assert_eq!(slot, expected);
            core.present(slot);
        }
        // All three owned by the compositor.
        assert_eq!(core.acquire(), None);

        assert_eq!(core.release(1), ReleaseAction::None);
        assert_eq!(core.acquire(), Some(1));
    }

    #[test]
    fn free_with_all_released_unmaps_immediately() {
        let mut core = PoolCore::new();
        assert_eq!(core.begin_free(), vec![0, 1, 2]);
        assert!(core.all_handles_dead());
    }

    #[test]
    fn free_defers_unmap_until_last_release() {
        let mut core = PoolCore::new();
        for slot in 0..POOL_DEPTH {
            core.present(slot);
        }
        core.release(0);

        // Only the released slot's handle can be destroyed up front.
        assert_eq!(core.begin_free(), vec![0]);
        assert!(!core.all_handles_dead());

        // Each late release destroys exactly its own handle; the unmap
        // happens with the final one.
        assert_eq!(core.release(1), ReleaseAction::DestroyHandle { unmap: false });
        assert!(!core.all_handles_dead());
        assert_eq!(core.release(2), ReleaseAction::DestroyHandle { unmap: true });
        assert!(core.all_handles_dead());
    }

    #[test]
    fn release_after_free_is_not_double_destroyed() {
        let mut core = PoolCore::new();
        core.present(0);
        core.begin_free();
        assert_eq!(core.release(0), ReleaseAction::DestroyHandle { unmap: false });
        // A duplicate notification must not try to destroy the handle again.
        assert_eq!(core.release(0), ReleaseAction::None);
    }

    #[test]
    fn no_acquire_while_pending_free() {
        let mut core = PoolCore::new();
        core.begin_free();
        assert_eq!(core.acquire(), None);
    }

    #[test]
    fn layout_scales_logical_dimensions() {
        let layout = PoolLayout::compute(100, 20, 2).unwrap();
        assert_eq!((layout.width, layout.height), (200, 40));
        assert_eq!(layout.stride, 800);
        assert_eq!(layout.slot_size, 800 * 40);
        assert_eq!(layout.total, 800 * 40 * POOL_DEPTH);
    }

    #[test]
    fn layout_rejects_degenerate_and_oversized_pools() {
        assert!(PoolLayout::compute(0, 20, 1).is_err());
        assert!(PoolLayout::compute(100, -1, 1).is_err());
        // width * scale overflows i32
        assert!(PoolLayout::compute(i32::MAX, 2, 2).is_err());
        // per-dimension math fits but the total exceeds the wire limit
        assert!(PoolLayout::compute(i32::MAX / 4, i32::MAX / 4, 1).is_err());
    }

    #[test]
    fn out_of_range_slots_are_ignored() {
        let mut core = PoolCore::new();
        core.present(POOL_DEPTH);
        assert_eq!(core.release(POOL_DEPTH), ReleaseAction::None);
        // The real slots are untouched.
        assert_eq!(core.acquire(), Some(0));
    }

    #[test]
    fn canvas_and_present_reject_out_of_range_slots() {
        let layout = PoolLayout::compute(4, 4, 1).unwrap();
        let mut pool = BufferPool {
            core: PoolCore::new(),
            buffers: Default::default(),
            map: MmapMut::map_anon(layout.total).unwrap(),
            slot_size: layout.slot_size,
            width: layout.width,
            height: layout.height,
            stride: layout.stride,
        };
        assert_eq!(pool.canvas(0).map(|c| c.len()), Some(layout.slot_size));
        assert!(pool.canvas(POOL_DEPTH).is_none());
        assert!(pool.mark_presented(POOL_DEPTH).is_none());
    }
}
