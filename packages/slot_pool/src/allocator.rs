use std::mem::MaybeUninit;
use std::ptr::NonNull;

use crate::AllocError;
use crate::error::Result;

/// An allocator of storage for objects of one type, [`Self::Value`].
///
/// This is the contract through which ownership-aware containers such as
/// [`SharedHandle`][crate::SharedHandle] obtain and release storage. Storage management
/// (`allocate`, `deallocate`) is separate from object lifecycle management (`construct`,
/// `destroy`): the latter never touch allocator state and operate on storage the caller
/// already holds.
///
/// Every operation takes the element size the caller believes it is working with and fails
/// with [`AllocError::SizeMismatch`] if that is not the size of [`Self::Value`].
///
/// # Rebinding
///
/// [`rebind()`][Self::rebind] derives an allocator for an unrelated element type `U`. The rebound
/// allocator is not required to draw from the same storage as the original. For example,
/// [`SlotAllocator`][crate::SlotAllocator] rebinds to [`HeapAllocator`][crate::HeapAllocator],
/// because its pool only holds slots of one size.
pub trait ObjectAllocator {
    /// The element type this allocator allocates storage for.
    type Value;

    /// The allocator obtained when rebinding to element type `U`.
    type Rebind<U>: ObjectAllocator<Value = U>;

    /// Derives an allocator for element type `U`.
    #[must_use]
    fn rebind<U>(&self) -> Self::Rebind<U>;

    /// Allocates uninitialized storage for one element.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::SizeMismatch`] if `declared_size` is not the size of
    /// [`Self::Value`] and [`AllocError::OutOfMemory`] if no storage is available. The
    /// allocator state is unchanged when an error is returned.
    fn allocate(&self, declared_size: usize) -> Result<NonNull<Self::Value>>;

    /// Releases storage previously returned by [`allocate()`][Self::allocate].
    ///
    /// The storage must not contain a live object anymore. Use [`destroy()`][Self::destroy]
    /// first if it does.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::SizeMismatch`] if `declared_size` is not the size of
    /// [`Self::Value`]. Allocators that can validate the pointer also return
    /// [`AllocError::OutOfBounds`] or [`AllocError::DoubleFree`]. The allocator state is
    /// unchanged when an error is returned.
    ///
    /// # Safety
    ///
    /// Allocators that cannot validate the pointer rely on the caller: `ptr` must have been
    /// returned by `allocate()` of this allocator (or one it was cloned or rebound from) and
    /// must not have been released since.
    unsafe fn deallocate(&self, ptr: NonNull<Self::Value>, declared_size: usize) -> Result<()>;

    /// Moves `value` into the storage at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must point to allocated storage for one element that does not currently contain
    /// a live object.
    unsafe fn construct(&self, ptr: NonNull<Self::Value>, value: Self::Value) {
        // SAFETY: Forwarding safety requirements to the caller.
        unsafe {
            ptr.write(value);
        }
    }

    /// Initializes the storage at `ptr` in place.
    ///
    /// This can be more efficient than constructing the value separately and then moving it
    /// into the storage, especially for large types.
    ///
    /// # Safety
    ///
    /// `ptr` must point to allocated storage for one element that does not currently contain
    /// a live object. The closure must fully initialize the `MaybeUninit` before returning.
    unsafe fn construct_with<F>(&self, ptr: NonNull<Self::Value>, f: F)
    where
        F: FnOnce(&mut MaybeUninit<Self::Value>),
    {
        // SAFETY: The caller guarantees that the storage is allocated and unused, so we have
        // exclusive access to it. `MaybeUninit<T>` has the same layout as `T`.
        let uninit = unsafe { ptr.cast::<MaybeUninit<Self::Value>>().as_mut() };

        f(uninit);
    }

    /// Runs the destructor of the object at `ptr`, leaving the storage allocated.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live object that nothing else will use afterwards.
    unsafe fn destroy(&self, ptr: NonNull<Self::Value>) {
        // SAFETY: Forwarding safety requirements to the caller.
        unsafe {
            ptr.drop_in_place();
        }
    }
}

/// Verifies that the caller-declared element size matches the size of `T`.
pub(crate) fn check_declared_size<T>(declared_size: usize) -> Result<()> {
    let expected = size_of::<T>();

    if declared_size == expected {
        Ok(())
    } else {
        Err(AllocError::SizeMismatch {
            declared: declared_size,
            expected,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::HeapAllocator;

    #[test]
    fn declared_size_must_match() {
        assert_eq!(check_declared_size::<u32>(4), Ok(()));
        assert_eq!(
            check_declared_size::<u32>(8),
            Err(AllocError::SizeMismatch {
                declared: 8,
                expected: 4
            })
        );
    }

    #[test]
    fn construct_and_destroy_run_value_lifecycle() {
        struct Tracker<'a> {
            dropped: &'a Cell<u32>,
        }

        impl Drop for Tracker<'_> {
            fn drop(&mut self) {
                self.dropped.set(self.dropped.get() + 1);
            }
        }

        let dropped = Cell::new(0);
        let allocator = HeapAllocator::<Tracker<'_>>::new();

        let ptr = allocator.allocate(size_of::<Tracker<'_>>()).unwrap();

        // SAFETY: Freshly allocated storage without a live object.
        unsafe {
            allocator.construct(ptr, Tracker { dropped: &dropped });
        }
        assert_eq!(dropped.get(), 0);

        // SAFETY: The object is live and not used afterwards.
        unsafe {
            allocator.destroy(ptr);
        }
        assert_eq!(dropped.get(), 1);

        // SAFETY: Allocated above and not released yet.
        unsafe { allocator.deallocate(ptr, size_of::<Tracker<'_>>()) }.unwrap();
    }

    #[test]
    fn construct_with_initializes_in_place() {
        let allocator = HeapAllocator::<[u64; 4]>::new();
        let ptr = allocator.allocate(size_of::<[u64; 4]>()).unwrap();

        // SAFETY: Freshly allocated storage without a live object; the closure initializes it.
        unsafe {
            allocator.construct_with(ptr, |uninit| {
                uninit.write([1, 2, 3, 4]);
            });
        }

        // SAFETY: Initialized above.
        assert_eq!(unsafe { ptr.read() }, [1, 2, 3, 4]);

        // SAFETY: Allocated above and not released yet; `[u64; 4]` needs no destructor.
        unsafe { allocator.deallocate(ptr, size_of::<[u64; 4]>()) }.unwrap();
    }
}
