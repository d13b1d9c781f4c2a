//! A fixed-capacity slot pool for objects of one size, an allocator contract that can draw from
//! it, and a reference-counted shared handle whose storage comes from such an allocator.
//!
//! This crate provides three layers that build on each other:
//!
//! 1. [`SlotPool`] owns one contiguous, zero-initialized region of `capacity * slot_size` bytes
//!    together with one occupancy flag per slot. The capacity and slot size are fixed when the
//!    pool is created; the pool never grows.
//! 2. [`ObjectAllocator`] is the contract through which containers obtain and release storage
//!    for one element type. Two implementations are provided: [`SlotAllocator`], which borrows
//!    a pool and hands out its slots, and [`HeapAllocator`], which uses the global allocator.
//! 3. [`SharedHandle`] shares ownership of one object between any number of handles, keeping
//!    the object alive until the last handle is released. The object comes from any
//!    [`ObjectAllocator`]; the reference count lives in a separately allocated control block.
//!
//! # Key Features
//!
//! - **Validated release**: Releasing a pointer that is not the start of a slot of the pool, or a
//!   slot that is already available, is reported as an error instead of corrupting the pool.
//! - **No partial updates**: Every failing operation leaves the pool exactly as it was.
//! - **Typed errors**: All allocation failures are reported through [`AllocError`].
//! - **Flexible drop policies**: Configure whether a pool may be dropped while slots are in use.
//!
//! # Examples
//!
//! ## Allocating slots
//!
//! ```rust
//! use slot_pool::{AllocError, SlotAllocator, SlotPool};
//!
//! let pool = SlotPool::new(2, size_of::<u64>());
//! let allocator = SlotAllocator::<u64>::new(&pool)?;
//!
//! let a = allocator.allocate(size_of::<u64>())?;
//! let b = allocator.allocate(size_of::<u64>())?;
//! assert_eq!(
//!     allocator.allocate(size_of::<u64>()),
//!     Err(AllocError::OutOfMemory)
//! );
//!
//! allocator.deallocate(a, size_of::<u64>())?;
//! assert!(matches!(
//!     allocator.deallocate(a, size_of::<u64>()),
//!     Err(AllocError::DoubleFree { index: 0 })
//! ));
//! # allocator.deallocate(b, size_of::<u64>())?;
//! # Ok::<(), AllocError>(())
//! ```
//!
//! ## Sharing an object stored in a pool
//!
//! ```rust
//! use slot_pool::{SharedHandle, SlotAllocator, SlotPool};
//!
//! let pool = SlotPool::new(8, size_of::<[u32; 4]>());
//! let allocator = SlotAllocator::<[u32; 4]>::new(&pool)?;
//!
//! let first = SharedHandle::new_in([1, 2, 3, 4], allocator)?;
//! let second = first.clone();
//!
//! assert_eq!(second.count(), 2);
//! assert_eq!(first[2], 3);
//! assert_eq!(pool.len(), 1);
//!
//! drop(first);
//! drop(second);
//! assert!(pool.is_empty());
//! # Ok::<(), slot_pool::AllocError>(())
//! ```
//!
//! # Thread safety
//!
//! The pool can be moved between threads ([`Send`]) but not shared between them, since the
//! occupancy flags are not synchronized. Allocators borrow the pool and shared handles use a
//! non-atomic reference count, so both stay on the thread that uses the pool.

mod allocator;
mod builder;
mod drop_policy;
mod error;
mod heap_allocator;
mod pool;
mod shared;
mod slot_allocator;

pub use allocator::ObjectAllocator;
pub use builder::*;
pub use drop_policy::*;
pub use error::AllocError;
pub use heap_allocator::*;
pub use pool::SlotPool;
pub(crate) use pool::SlotState;
pub use shared::*;
pub use slot_allocator::*;
