use thiserror::Error;

/// Errors that can occur when allocating or releasing storage through an
/// [`ObjectAllocator`][crate::ObjectAllocator].
///
/// Every variant is an allocation failure raised synchronously at the call site. None of them
/// are retried internally and none of them leave the pool in a partially updated state: all
/// checks complete before any slot is marked as used or available.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum AllocError {
    /// The caller declared an element size that does not match the size of the element type
    /// the allocator is bound to.
    #[error("declared element size {declared} does not match the allocator's element size {expected}")]
    SizeMismatch {
        /// The size the caller declared.
        declared: usize,

        /// The size of the element type the allocator is bound to.
        expected: usize,
    },

    /// No storage is available for another element.
    #[error("out of memory: no available slot remains")]
    OutOfMemory,

    /// The caller attempted to release a slot that is already available.
    #[error("attempted double free of slot {index}")]
    DoubleFree {
        /// Index of the slot that was already available.
        index: usize,
    },

    /// The caller attempted to release an address that does not refer to a slot of the pool.
    #[error("address {address:#x} is out of bounds of the pool's storage")]
    OutOfBounds {
        /// The address that was passed in.
        address: usize,
    },
}

/// A specialized `Result` type for allocation operations, returning the crate's
/// [`AllocError`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, AllocError>;

#[cfg(test)]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(AllocError: Send, Sync, Debug, Copy, std::error::Error);

    #[test]
    fn size_mismatch_mentions_both_sizes() {
        let message = AllocError::SizeMismatch {
            declared: 3,
            expected: 4,
        }
        .to_string();

        assert!(message.contains('3'));
        assert!(message.contains('4'));
    }

    #[test]
    fn out_of_bounds_formats_address_as_hex() {
        let message = AllocError::OutOfBounds { address: 0xdead }.to_string();

        assert!(message.contains("0xdead"));
    }

    #[test]
    fn double_free_is_error() {
        let result: Result<()> = Err(AllocError::DoubleFree { index: 7 });

        assert_eq!(result, Err(AllocError::DoubleFree { index: 7 }));
    }
}
