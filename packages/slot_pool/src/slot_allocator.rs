use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};

use tracing::{debug, trace};

use crate::allocator::check_declared_size;
use crate::error::Result;
use crate::{AllocError, HeapAllocator, ObjectAllocator, SlotPool, SlotState};

/// Allocates objects of type `T` from the slots of a borrowed [`SlotPool`].
///
/// The allocator is a lightweight handle: it references the pool without owning it. Copying
/// an allocator copies the reference, so all copies (and all other allocators created for the
/// same pool) share the same slots. There is no way to make an existing allocator refer to a
/// different pool.
///
/// Allocation scans the occupancy flags in index order and takes the first available slot,
/// so it takes time proportional to the capacity. Deallocation validates the pointer and the
/// slot state before changing anything, so a failed call never modifies the pool.
///
/// Rebinding yields a [`HeapAllocator`], since the pool only holds slots sized for `T`.
///
/// # Examples
///
/// ```
/// use slot_pool::{AllocError, SlotAllocator, SlotPool};
///
/// let pool = SlotPool::new(1, size_of::<i32>());
/// let allocator = SlotAllocator::<i32>::new(&pool)?;
///
/// let first = allocator.allocate(size_of::<i32>())?;
/// assert_eq!(
///     allocator.allocate(size_of::<i32>()),
///     Err(AllocError::OutOfMemory)
/// );
///
/// allocator.deallocate(first, size_of::<i32>())?;
/// let reused = allocator.allocate(size_of::<i32>())?;
/// assert_eq!(first, reused);
/// # allocator.deallocate(reused, size_of::<i32>())?;
/// # Ok::<(), AllocError>(())
/// ```
pub struct SlotAllocator<'p, T> {
    pool: &'p SlotPool,

    _element: PhantomData<fn() -> T>,
}

impl<'p, T> SlotAllocator<'p, T> {
    /// Creates an allocator for `T` that draws from `pool`.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::SizeMismatch`] if the size of `T` is not the slot size of the pool.
    ///
    /// # Panics
    ///
    /// Panics if the alignment of `T` is stricter than the slot alignment of the pool.
    pub fn new(pool: &'p SlotPool) -> Result<Self> {
        if size_of::<T>() != pool.slot_size() {
            return Err(AllocError::SizeMismatch {
                declared: size_of::<T>(),
                expected: pool.slot_size(),
            });
        }

        assert!(
            align_of::<T>() <= pool.slot_layout().align(),
            "alignment {} of {} is stricter than the slot alignment {} of the pool",
            align_of::<T>(),
            type_name::<T>(),
            pool.slot_layout().align()
        );

        Ok(Self {
            pool,
            _element: PhantomData,
        })
    }

    /// The pool this allocator draws from.
    #[must_use]
    #[inline]
    pub fn pool(&self) -> &'p SlotPool {
        self.pool
    }

    /// Whether both allocators draw from the same pool.
    #[must_use]
    #[inline]
    pub fn is_same_pool<U>(&self, other: &SlotAllocator<'_, U>) -> bool {
        ptr::eq(self.pool, other.pool)
    }

    /// The number of used slots in the pool.
    ///
    /// This counts slots used through any allocator of the pool and takes time proportional
    /// to the capacity.
    #[must_use]
    pub fn size(&self) -> usize {
        self.pool.len()
    }

    /// The total number of slots in the pool.
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    /// Marks the first available slot as used and returns a pointer to its storage.
    ///
    /// The storage is not initialized by this call. Slots that were never used contain zero
    /// bytes; reused slots contain whatever the previous object left behind.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::SizeMismatch`] if `declared_size` is not the size of `T` and
    /// [`AllocError::OutOfMemory`] if every slot is used. The pool is unchanged on error.
    pub fn allocate(&self, declared_size: usize) -> Result<NonNull<T>> {
        self.acquire_slot(declared_size)
    }

    /// Marks the slot that `ptr` points to as available again.
    ///
    /// Any object in the slot must already have been destroyed; this call only updates the
    /// occupancy flag.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::SizeMismatch`] if `declared_size` is not the size of `T`,
    /// [`AllocError::OutOfBounds`] if `ptr` does not point to the start of a slot of this pool
    /// and [`AllocError::DoubleFree`] if the slot is already available. The pool is unchanged
    /// on error.
    pub fn deallocate(&self, ptr: NonNull<T>, declared_size: usize) -> Result<()> {
        self.release_slot(ptr, declared_size)
    }

    fn acquire_slot(&self, declared_size: usize) -> Result<NonNull<T>> {
        check_declared_size::<T>(declared_size)?;

        let Some(index) = self
            .pool
            .occupancy()
            .iter()
            .position(|state| state.get() == SlotState::Available)
        else {
            debug!(
                element = type_name::<T>(),
                capacity = self.pool.capacity(),
                "slot pool is out of memory"
            );
            return Err(AllocError::OutOfMemory);
        };

        self.pool
            .occupancy()
            .get(index)
            .expect("position() only returns in-bounds indexes")
            .set(SlotState::Used);

        trace!(element = type_name::<T>(), index, "allocated slot");

        Ok(self.pool.slot_ptr(index).cast::<T>())
    }

    // Validates everything before touching the occupancy flag.
    fn release_slot(&self, ptr: NonNull<T>, declared_size: usize) -> Result<()> {
        check_declared_size::<T>(declared_size)?;

        let index = self.slot_index(ptr)?;

        let state = self
            .pool
            .occupancy()
            .get(index)
            .expect("slot_index() only returns in-bounds indexes");

        if state.get() == SlotState::Available {
            debug!(element = type_name::<T>(), index, "rejected double free");
            return Err(AllocError::DoubleFree { index });
        }

        state.set(SlotState::Available);

        trace!(element = type_name::<T>(), index, "released slot");

        Ok(())
    }

    /// Translates a pointer into the index of the slot it points to.
    fn slot_index(&self, ptr: NonNull<T>) -> Result<usize> {
        let address = ptr.as_ptr().addr();
        let out_of_bounds = || {
            debug!(
                element = type_name::<T>(),
                address, "rejected pointer outside of the pool"
            );
            AllocError::OutOfBounds { address }
        };

        let offset = address
            .checked_sub(self.pool.storage().as_ptr().addr())
            .ok_or_else(out_of_bounds)?;

        let slot_size = self.pool.slot_size();

        if offset.checked_rem(slot_size) != Some(0) {
            return Err(out_of_bounds());
        }

        let index = offset
            .checked_div(slot_size)
            .expect("slot size is non-zero, guaranteed by the pool");

        if index >= self.pool.capacity() {
            return Err(out_of_bounds());
        }

        Ok(index)
    }
}

impl<T> ObjectAllocator for SlotAllocator<'_, T> {
    type Value = T;
    type Rebind<U> = HeapAllocator<U>;

    #[inline]
    fn rebind<U>(&self) -> HeapAllocator<U> {
        HeapAllocator::new()
    }

    #[inline]
    fn allocate(&self, declared_size: usize) -> Result<NonNull<T>> {
        self.acquire_slot(declared_size)
    }

    /// Validates the pointer fully, so this never causes undefined behavior by itself.
    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<T>, declared_size: usize) -> Result<()> {
        self.release_slot(ptr, declared_size)
    }
}

impl<T> Clone for SlotAllocator<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SlotAllocator<'_, T> {}

impl<T> fmt::Debug for SlotAllocator<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("pool", self.pool)
            .finish()
    }
}
