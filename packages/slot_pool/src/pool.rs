use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::cell::Cell;
use std::fmt;
use std::num::NonZero;
use std::ptr::NonNull;
use std::thread;

use tracing::debug;

use crate::{DropPolicy, SlotPoolBuilder};

/// Occupancy flag of a single slot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum SlotState {
    Available,
    Used,
}

/// A fixed number of equally sized slots, each tracked as available or used.
///
/// The pool is pure byte storage plus bookkeeping. It has no knowledge of the types stored in
/// its slots and contains no allocation logic of its own. To allocate objects from the pool,
/// wrap it in a [`SlotAllocator`][crate::SlotAllocator], which borrows the pool. Any number of
/// allocators may borrow the same pool at the same time and the borrow checker guarantees that
/// the pool outlives all of them (and every [`SharedHandle`][crate::SharedHandle] created
/// through them).
///
/// The storage is a single zero-initialized allocation of `capacity * slot_size` bytes, made
/// when the pool is created and released when the pool is dropped. The capacity never changes.
///
/// # Examples
///
/// ```
/// use slot_pool::{SlotAllocator, SlotPool};
///
/// let pool = SlotPool::new(4, size_of::<u32>());
/// let allocator = SlotAllocator::<u32>::new(&pool)?;
///
/// let slot = allocator.allocate(size_of::<u32>())?;
/// assert_eq!(pool.len(), 1);
///
/// allocator.deallocate(slot, size_of::<u32>())?;
/// assert!(pool.is_empty());
/// # Ok::<(), slot_pool::AllocError>(())
/// ```
///
/// # Thread safety
///
/// The pool is thread-mobile ([`Send`]) but not thread-safe ([`Sync`]). Occupancy flags are
/// updated without synchronization, so every allocator derived from a pool lives on the
/// thread that owns the pool.
pub struct SlotPool {
    capacity: NonZero<usize>,

    /// Size and alignment of one slot. The size is also the stride between slots.
    slot_layout: Layout,

    /// Layout of the entire storage block, used for both allocation and deallocation.
    storage_layout: Layout,

    storage: NonNull<u8>,

    /// One flag per slot, in slot index order.
    occupancy: Box<[Cell<SlotState>]>,

    drop_policy: DropPolicy,
}

impl SlotPool {
    /// Creates a pool of `capacity` slots of `slot_size` bytes each, with the default
    /// [`DropPolicy`].
    ///
    /// The slots are aligned to the largest power of two that divides `slot_size`, which
    /// satisfies the alignment of every type whose size is exactly `slot_size`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` or `slot_size` is zero.
    #[must_use]
    pub fn new(capacity: usize, slot_size: usize) -> Self {
        Self::builder()
            .capacity(capacity)
            .slot_size(slot_size)
            .build()
    }

    /// Returns a builder for creating a pool with custom configuration.
    #[inline]
    pub fn builder() -> SlotPoolBuilder {
        SlotPoolBuilder::new()
    }

    #[must_use]
    pub(crate) fn new_inner(
        capacity: NonZero<usize>,
        slot_layout: Layout,
        drop_policy: DropPolicy,
    ) -> Self {
        assert!(slot_layout.size() > 0, "SlotPool must have non-zero slot size");

        let storage_size = slot_layout
            .size()
            .checked_mul(capacity.get())
            .expect("SlotPool storage size overflows usize");

        let storage_layout = Layout::from_size_align(storage_size, slot_layout.align())
            .expect("SlotPool storage layout must be valid for a flat array of slots");

        // SAFETY: The layout is valid and non-zero-sized because both the slot size and the
        // capacity are non-zero.
        let storage = NonNull::new(unsafe { alloc_zeroed(storage_layout) }).expect(
            "we do not intend to handle allocation failure as a real possibility - OOM is panic",
        );

        let occupancy = (0..capacity.get())
            .map(|_| Cell::new(SlotState::Available))
            .collect();

        debug!(
            capacity = capacity.get(),
            slot_size = slot_layout.size(),
            slot_align = slot_layout.align(),
            "created slot pool"
        );

        let pool = Self {
            capacity,
            slot_layout,
            storage_layout,
            storage,
            occupancy,
            drop_policy,
        };

        #[cfg(debug_assertions)]
        pool.integrity_check();

        pool
    }

    /// The number of slots in the pool.
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// The size of one slot in bytes.
    #[must_use]
    #[inline]
    pub fn slot_size(&self) -> usize {
        self.slot_layout.size()
    }

    /// The memory layout of one slot.
    #[must_use]
    #[inline]
    pub fn slot_layout(&self) -> Layout {
        self.slot_layout
    }

    /// The policy applied when the pool is dropped with used slots.
    #[must_use]
    #[inline]
    pub fn drop_policy(&self) -> DropPolicy {
        self.drop_policy
    }

    /// The number of used slots.
    ///
    /// This scans the occupancy flags, so it takes time proportional to the capacity.
    #[must_use]
    pub fn len(&self) -> usize {
        self.occupancy
            .iter()
            .filter(|state| state.get() == SlotState::Used)
            .count()
    }

    /// Whether every slot is available.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.occupancy
            .iter()
            .all(|state| state.get() == SlotState::Available)
    }

    /// Occupancy flags, one per slot in index order.
    pub(crate) fn occupancy(&self) -> &[Cell<SlotState>] {
        &self.occupancy
    }

    /// The first byte of the storage block.
    pub(crate) fn storage(&self) -> NonNull<u8> {
        self.storage
    }

    /// The first byte of the slot at `index`.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of bounds.
    pub(crate) fn slot_ptr(&self, index: usize) -> NonNull<u8> {
        assert!(
            index < self.capacity.get(),
            "slot {index} index out of bounds in pool of capacity {}",
            self.capacity
        );

        // Cannot overflow because the storage layout was computed with a checked multiplication
        // of the same factors and index < capacity.
        let offset = index.wrapping_mul(self.slot_layout.size());

        // SAFETY: The offset is within the storage block because index < capacity.
        unsafe { self.storage.add(offset) }
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    pub(crate) fn integrity_check(&self) {
        assert_eq!(
            self.occupancy.len(),
            self.capacity.get(),
            "occupancy has {} flags in pool of capacity {}",
            self.occupancy.len(),
            self.capacity
        );

        assert_eq!(
            Some(self.storage_layout.size()),
            self.slot_layout.size().checked_mul(self.capacity.get()),
            "storage of {} bytes does not match {} slots of {} bytes",
            self.storage_layout.size(),
            self.capacity,
            self.slot_layout.size()
        );
    }
}

impl fmt::Debug for SlotPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotPool")
            .field("capacity", &self.capacity)
            .field("slot_layout", &self.slot_layout)
            .field("used", &self.len())
            .field("drop_policy", &self.drop_policy)
            .finish_non_exhaustive()
    }
}

impl Drop for SlotPool {
    fn drop(&mut self) {
        let was_empty = self.is_empty();

        // SAFETY: The layout matches the one used for the allocation in `new_inner()`.
        unsafe {
            dealloc(self.storage.as_ptr(), self.storage_layout);
        }

        // If we are already panicking, we do not want to panic again because that will
        // simply obscure whatever the original panic was.
        if self.drop_policy == DropPolicy::MustNotDropUsedSlots && !thread::panicking() {
            assert!(
                was_empty,
                "dropped a slot pool with used slots under a policy that says it must be empty when dropped"
            );
        }
    }
}

// SAFETY: The pool owns its storage exclusively and never dereferences it, so nothing ties it
// to the thread that created it. Occupancy flags are `Cell`s, which keeps the pool `!Sync`.
unsafe impl Send for SlotPool {}
