use std::alloc::{Layout, alloc, dealloc};
use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

use tracing::debug;

use crate::allocator::check_declared_size;
use crate::error::Result;
use crate::{AllocError, ObjectAllocator};

/// An [`ObjectAllocator`] backed by ordinary dynamic allocation through the global allocator.
///
/// This is the default allocator of [`SharedHandle`][crate::SharedHandle] and the allocator
/// that [`SlotAllocator`][crate::SlotAllocator] rebinds to for element types other than its
/// own, such as the reference count of a shared handle.
///
/// The allocator is stateless: every instance is interchangeable with every other instance
/// for the same element type.
///
/// # Examples
///
/// ```
/// use slot_pool::{HeapAllocator, ObjectAllocator};
///
/// let allocator = HeapAllocator::<u64>::new();
/// let ptr = allocator.allocate(size_of::<u64>())?;
///
/// // SAFETY: The storage was just allocated and holds no object yet.
/// unsafe { allocator.construct(ptr, 42) };
///
/// // SAFETY: The object was just constructed and the storage is not released yet.
/// unsafe {
///     assert_eq!(ptr.read(), 42);
///     allocator.destroy(ptr);
///     allocator.deallocate(ptr, size_of::<u64>())?;
/// }
/// # Ok::<(), slot_pool::AllocError>(())
/// ```
pub struct HeapAllocator<T> {
    _element: PhantomData<fn() -> T>,
}

impl<T> HeapAllocator<T> {
    /// Creates a new heap allocator for `T`.
    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self {
            _element: PhantomData,
        }
    }
}

impl<T> ObjectAllocator for HeapAllocator<T> {
    type Value = T;
    type Rebind<U> = HeapAllocator<U>;

    #[inline]
    fn rebind<U>(&self) -> HeapAllocator<U> {
        HeapAllocator::new()
    }

    fn allocate(&self, declared_size: usize) -> Result<NonNull<T>> {
        check_declared_size::<T>(declared_size)?;

        let layout = Layout::new::<T>();

        if layout.size() == 0 {
            return Ok(NonNull::dangling());
        }

        // SAFETY: The layout is valid and not zero-sized (checked above).
        let ptr = unsafe { alloc(layout) };

        NonNull::new(ptr.cast::<T>()).ok_or_else(|| {
            debug!(
                element = type_name::<T>(),
                size = layout.size(),
                "global allocator is out of memory"
            );
            AllocError::OutOfMemory
        })
    }

    unsafe fn deallocate(&self, ptr: NonNull<T>, declared_size: usize) -> Result<()> {
        check_declared_size::<T>(declared_size)?;

        let layout = Layout::new::<T>();

        if layout.size() == 0 {
            return Ok(());
        }

        // SAFETY: The caller guarantees that the pointer came from `allocate()`, which used
        // the same layout, and that it has not been released yet.
        unsafe {
            dealloc(ptr.as_ptr().cast(), layout);
        }

        Ok(())
    }
}

impl<T> Clone for HeapAllocator<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for HeapAllocator<T> {}

impl<T> Default for HeapAllocator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for HeapAllocator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>()).finish()
    }
}
