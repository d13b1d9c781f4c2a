use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ops::Deref;
use std::ptr::NonNull;
use std::thread;

use tracing::{error, trace};

use crate::error::Result;
use crate::{AllocError, HeapAllocator, ObjectAllocator};

/// A reference-counted handle that shares ownership of a `T` whose storage comes from an
/// [`ObjectAllocator`].
///
/// A handle is either empty or owning. An owning handle holds a pointer to the payload and a
/// pointer to a separately allocated reference count (the control block), which is obtained
/// from the allocator rebound to `usize`. Cloning a handle increments the count; dropping or
/// resetting a handle decrements it. When the count reaches zero, the payload is destroyed and
/// its storage returned to the allocator, after which the control block is destroyed and
/// released.
///
/// The allocator is only used when the first handle is created and when the last one is
/// released. Copies and moves only touch the pointer pair and the count.
///
/// # Error handling
///
/// Failures reported by the allocator during acquisition or release are returned to the
/// caller of [`new_in()`][Self::new_in], [`from_raw_in()`][Self::from_raw_in],
/// [`reset()`][Self::reset], [`assign()`][Self::assign] and [`move_from()`][Self::move_from].
/// A failed release still leaves the handle empty. Release failures that occur where no error
/// can be returned (in `Drop` or `Clone::clone_from`) indicate corrupted allocator state and
/// cause a panic.
///
/// # Examples
///
/// ```
/// use slot_pool::{SharedHandle, SlotAllocator, SlotPool};
///
/// let pool = SlotPool::new(4, size_of::<i32>());
/// let allocator = SlotAllocator::<i32>::new(&pool)?;
///
/// let p = SharedHandle::new_in(5, allocator)?;
/// let mut q = p.clone();
///
/// assert_eq!(p.count(), 2);
/// assert_eq!(*p, 5);
/// assert_eq!(*q, 5);
///
/// q.reset()?;
/// assert_eq!(p.count(), 1);
///
/// drop(p);
/// assert!(pool.is_empty());
/// # Ok::<(), slot_pool::AllocError>(())
/// ```
///
/// # Thread safety
///
/// The reference count is not atomic, so handles are neither [`Send`] nor [`Sync`].
pub struct SharedHandle<T, A = HeapAllocator<T>>
where
    A: ObjectAllocator<Value = T>,
{
    owned: Option<Owned<T>>,
    allocator: A,

    // We drop `T` values when the last handle is released.
    _owns: PhantomData<T>,
}

/// The pointer pair of an owning handle.
struct Owned<T> {
    payload: NonNull<T>,
    control: NonNull<usize>,
}

impl<T> Clone for Owned<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Owned<T> {}

impl<T> Owned<T> {
    fn count(self) -> usize {
        // SAFETY: The control block stays alive as long as any handle owns this pair.
        unsafe { self.control.read() }
    }

    fn set_count(self, count: usize) {
        // SAFETY: The control block stays alive as long as any handle owns this pair.
        unsafe {
            self.control.write(count);
        }
    }

    fn acquire(self) {
        self.set_count(
            self.count()
                .checked_add(1)
                .expect("reference count overflow is not a realistic scenario"),
        );
    }
}

impl<T> SharedHandle<T> {
    /// Moves `value` into storage from the global allocator and returns the first handle to it.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::OutOfMemory`] if the global allocator cannot provide storage.
    pub fn new(value: T) -> Result<Self> {
        Self::new_in(value, HeapAllocator::new())
    }

    /// Creates an empty handle.
    #[must_use]
    pub fn empty() -> Self {
        Self::null_in(HeapAllocator::new())
    }
}

impl<T, A> SharedHandle<T, A>
where
    A: ObjectAllocator<Value = T>,
{
    /// Creates an empty handle that will use `allocator` if it ever takes ownership.
    #[must_use]
    pub fn null_in(allocator: A) -> Self {
        Self {
            owned: None,
            allocator,
            _owns: PhantomData,
        }
    }

    /// Takes over shared ownership of an object that the caller already constructed.
    ///
    /// A `None` pointer produces an empty handle. Otherwise, a control block with a count of
    /// one is allocated through the allocator rebound to `usize`. The handle never allocates
    /// or constructs the payload itself; it only takes over its eventual destruction.
    ///
    /// # Errors
    ///
    /// Returns the allocator's error if the control block cannot be allocated. In that case,
    /// the caller keeps ownership of the object.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live `T` in storage obtained from `allocator` (or an allocator
    /// sharing its storage), and nothing else may own or release that object.
    pub unsafe fn from_raw_in(ptr: Option<NonNull<T>>, allocator: A) -> Result<Self> {
        let Some(payload) = ptr else {
            return Ok(Self::null_in(allocator));
        };

        let control = Self::allocate_control(&allocator)?;

        Ok(Self {
            owned: Some(Owned { payload, control }),
            allocator,
            _owns: PhantomData,
        })
    }

    /// Allocates storage from `allocator`, moves `value` into it and returns the first handle
    /// to it.
    ///
    /// # Errors
    ///
    /// Returns the allocator's error if either the payload or the control block cannot be
    /// allocated. If the control block fails, the payload is destroyed and its storage
    /// returned, so the allocator ends up in the same state as before the call.
    pub fn new_in(value: T, allocator: A) -> Result<Self> {
        let payload = allocator.allocate(size_of::<T>())?;

        // SAFETY: The storage was just allocated for a `T` and holds no object yet.
        unsafe {
            allocator.construct(payload, value);
        }

        match Self::allocate_control(&allocator) {
            Ok(control) => Ok(Self {
                owned: Some(Owned { payload, control }),
                allocator,
                _owns: PhantomData,
            }),
            Err(error) => {
                // SAFETY: We constructed the object above and nothing else has seen it.
                unsafe {
                    allocator.destroy(payload);
                }

                // SAFETY: The storage came from this allocator just above.
                unsafe { allocator.deallocate(payload, size_of::<T>()) }
                    .expect("storage allocated by this call can always be returned");

                Err(error)
            }
        }
    }

    fn allocate_control(allocator: &A) -> Result<NonNull<usize>> {
        let control_allocator = allocator.rebind::<usize>();

        let control = control_allocator.allocate(size_of::<usize>())?;

        // SAFETY: The storage was just allocated for a `usize` and holds no object yet.
        unsafe {
            control_allocator.construct(control, 1);
        }

        Ok(control)
    }

    /// The number of handles sharing the object, or zero if the handle is empty.
    #[must_use]
    pub fn count(&self) -> usize {
        self.owned.map_or(0, Owned::count)
    }

    /// A pointer to the object, or `None` if the handle is empty.
    #[must_use]
    pub fn get(&self) -> Option<NonNull<T>> {
        self.owned.map(|owned| owned.payload)
    }

    /// Whether the handle is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.owned.is_none()
    }

    /// A reference to the object, or `None` if the handle is empty.
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        // SAFETY: The object stays alive while this handle owns it and exclusive references
        // can only be created through `get_mut()`, which requires `&mut self`.
        self.owned.map(|owned| unsafe { owned.payload.as_ref() })
    }

    /// An exclusive reference to the object, if this is the only handle to it.
    #[must_use]
    pub fn get_mut(&mut self) -> Option<&mut T> {
        let owned = self.owned?;

        if owned.count() != 1 {
            return None;
        }

        // SAFETY: This is the only handle to the object and we hold `&mut self`, so no other
        // reference to the object can exist.
        unsafe { owned.payload.as_ptr().as_mut() }
    }

    /// The allocator this handle releases the object through.
    #[must_use]
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Whether both handles share the same object. Two empty handles are considered equal.
    ///
    /// Identity is decided by the control block, which is unique per shared object. Payload
    /// pointers are not unique: distinct zero-sized objects may all live at the same address.
    #[must_use]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.owned.map(|owned| owned.control) == other.owned.map(|owned| owned.control)
    }

    /// Gives up this handle's share of the object, leaving the handle empty.
    ///
    /// If this was the last handle, the object is destroyed, its storage is returned to the
    /// allocator and the control block is destroyed and released.
    ///
    /// # Errors
    ///
    /// Returns the first error reported by the allocator while releasing the object or the
    /// control block. The release still runs to completion and the handle is empty afterwards.
    pub fn reset(&mut self) -> Result<()> {
        let Some(owned) = self.owned.take() else {
            return Ok(());
        };

        self.release(owned)
    }

    fn release(&self, owned: Owned<T>) -> Result<()> {
        let remaining = owned
            .count()
            .checked_sub(1)
            .expect("an owning handle always has a count of at least one");

        if remaining > 0 {
            owned.set_count(remaining);
            return Ok(());
        }

        trace!(element = type_name::<T>(), "releasing last reference");

        // SAFETY: This was the last handle, so the object is alive and nothing else uses it.
        unsafe {
            self.allocator.destroy(owned.payload);
        }

        // SAFETY: The storage came from this allocator (or one sharing its storage) when the
        // first handle was created and has not been released since.
        let payload_result = unsafe { self.allocator.deallocate(owned.payload, size_of::<T>()) };

        let control_allocator = self.allocator.rebind::<usize>();

        // SAFETY: The control block was constructed when the first handle was created and the
        // count just reached zero, so nothing else uses it.
        unsafe {
            control_allocator.destroy(owned.control);
        }

        // SAFETY: The control block came from the same rebound allocator type.
        let control_result =
            unsafe { control_allocator.deallocate(owned.control, size_of::<usize>()) };

        payload_result.and(control_result)
    }

    /// Exchanges the objects (and allocators) of two handles. Reference counts are unchanged.
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
    }

    /// Makes this handle share the object of `source`, releasing its current share first.
    ///
    /// If both handles already share the same object (or are both empty), nothing happens.
    /// The new share is acquired before the old one is released, so the count of an object
    /// referenced by both never drops to zero in between.
    ///
    /// # Errors
    ///
    /// Returns the allocator's error if releasing the previous object fails. This handle
    /// shares the object of `source` afterwards regardless.
    pub fn assign(&mut self, source: &Self) -> Result<()>
    where
        A: Clone,
    {
        if Self::ptr_eq(self, source) {
            return Ok(());
        }

        let mut previous = mem::replace(self, source.clone());
        previous.reset()
    }

    /// Moves the object of `source` into this handle, leaving `source` empty.
    ///
    /// If both handles already share the same object (or are both empty), nothing happens.
    /// Otherwise this handle first releases its own object, as [`reset()`][Self::reset] does.
    ///
    /// # Errors
    ///
    /// Returns the allocator's error if releasing the previous object fails. In that case,
    /// this handle is empty and `source` is unchanged.
    pub fn move_from(&mut self, source: &mut Self) -> Result<()> {
        if Self::ptr_eq(self, source) {
            return Ok(());
        }

        self.reset()?;
        self.swap(source);

        Ok(())
    }

    /// Moves the object out into a new handle, leaving this handle empty.
    #[must_use]
    pub fn take(&mut self) -> Self
    where
        A: Clone,
    {
        Self {
            owned: self.owned.take(),
            allocator: self.allocator.clone(),
            _owns: PhantomData,
        }
    }
}

/// Handles a release failure at a point where it cannot be returned to the caller.
fn release_failed(error: AllocError) {
    error!(%error, "failed to release shared object");

    // If we are already panicking, we do not want to panic again because that will
    // simply obscure whatever the original panic was.
    if !thread::panicking() {
        panic!("failed to release shared object: {error}");
    }
}

impl<T, A> Clone for SharedHandle<T, A>
where
    A: ObjectAllocator<Value = T> + Clone,
{
    fn clone(&self) -> Self {
        if let Some(owned) = self.owned {
            owned.acquire();
        }

        Self {
            owned: self.owned,
            allocator: self.allocator.clone(),
            _owns: PhantomData,
        }
    }

    fn clone_from(&mut self, source: &Self) {
        if let Err(error) = self.assign(source) {
            release_failed(error);
        }
    }
}

impl<T, A> Deref for SharedHandle<T, A>
where
    A: ObjectAllocator<Value = T>,
{
    type Target = T;

    /// # Panics
    ///
    /// Panics if the handle is empty.
    fn deref(&self) -> &T {
        let Some(value) = self.value() else {
            panic!("dereferenced an empty SharedHandle<{}>", type_name::<T>());
        };

        value
    }
}

impl<T, A> Default for SharedHandle<T, A>
where
    A: ObjectAllocator<Value = T> + Default,
{
    fn default() -> Self {
        Self::null_in(A::default())
    }
}

impl<T, A> Drop for SharedHandle<T, A>
where
    A: ObjectAllocator<Value = T>,
{
    fn drop(&mut self) {
        if let Err(error) = self.reset() {
            release_failed(error);
        }
    }
}

impl<T, A> fmt::Debug for SharedHandle<T, A>
where
    T: fmt::Debug,
    A: ObjectAllocator<Value = T> + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedHandle")
            .field("value", &self.value())
            .field("count", &self.count())
            .field("allocator", &self.allocator)
            .finish()
    }
}
