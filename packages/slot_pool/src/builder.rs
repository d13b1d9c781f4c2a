use std::alloc::Layout;
use std::cell::Cell;
use std::marker::PhantomData;
use std::num::NonZero;

use crate::{DropPolicy, SlotPool};

/// Builder for creating an instance of [`SlotPool`].
///
/// The capacity and the slot layout are mandatory, whereas other settings are optional.
/// The slot layout can be given as a size only (`.slot_size()`), as an explicit
/// [`Layout`] (`.slot_layout()`) or derived from a type (`.slot_layout_of::<T>()`).
///
/// # Examples
///
/// ```
/// use slot_pool::SlotPool;
///
/// let pool = SlotPool::builder().capacity(16).slot_layout_of::<u64>().build();
///
/// assert_eq!(pool.capacity(), 16);
/// assert_eq!(pool.slot_size(), 8);
/// ```
///
/// # Thread safety
///
/// The builder is thread-mobile ([`Send`]) and can be safely transferred between threads,
/// allowing pool configuration to happen on different threads than where the pool is used.
/// However, it is not thread-safe ([`Sync`]) as it contains mutable configuration state.
#[derive(Debug)]
#[must_use]
pub struct SlotPoolBuilder {
    capacity: Option<NonZero<usize>>,
    slot_layout: Option<Layout>,
    drop_policy: DropPolicy,

    // Prevents Sync while allowing Send - builders are thread-mobile but not thread-safe
    _not_sync: PhantomData<Cell<()>>,
}

impl SlotPoolBuilder {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            capacity: None,
            slot_layout: None,
            drop_policy: DropPolicy::default(),
            _not_sync: PhantomData,
        }
    }

    /// Sets the number of slots in the pool.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[inline]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(NonZero::new(capacity).expect("SlotPool must have non-zero capacity"));
        self
    }

    /// Sets the size of one slot in bytes.
    ///
    /// The slot alignment becomes the largest power of two that divides `size`, which is
    /// sufficient for any type whose size equals `size`.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    #[inline]
    pub fn slot_size(mut self, size: usize) -> Self {
        assert!(size > 0, "SlotPool must have non-zero slot size");

        // `size` is non-zero, so it has at most `usize::BITS - 1` trailing zeros.
        let align = 1_usize << size.trailing_zeros();

        self.slot_layout = Some(
            Layout::from_size_align(size, align)
                .expect("power of two dividing the size is always a valid alignment"),
        );
        self
    }

    /// Sets the memory layout of one slot.
    ///
    /// The layout is padded to its alignment so that consecutive slots stay aligned.
    ///
    /// # Panics
    ///
    /// Panics if the layout has a size of zero.
    #[inline]
    pub fn slot_layout(mut self, layout: Layout) -> Self {
        assert!(layout.size() > 0, "SlotPool must have non-zero slot size");
        self.slot_layout = Some(layout.pad_to_align());
        self
    }

    /// Sets the memory layout of one slot based on a type.
    ///
    /// # Panics
    ///
    /// Panics if `T` is a zero-sized type.
    #[inline]
    pub fn slot_layout_of<T>(self) -> Self {
        self.slot_layout(Layout::new::<T>())
    }

    /// Sets the [drop policy][DropPolicy] for the pool. This governs how to treat used slots
    /// when the pool is dropped.
    #[inline]
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Builds the pool with the specified configuration.
    ///
    /// # Panics
    ///
    /// Panics if the capacity or the slot layout has not been set.
    #[must_use]
    #[inline]
    pub fn build(self) -> SlotPool {
        let capacity = self
            .capacity
            .expect("capacity must be set using .capacity() before calling .build()");

        let slot_layout = self.slot_layout.expect(
            "slot layout must be set using .slot_size(), .slot_layout() or .slot_layout_of::<T>() before calling .build()",
        );

        SlotPool::new_inner(capacity, slot_layout, self.drop_policy)
    }
}

#[cfg(test)]
mod tests {
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(SlotPoolBuilder: Send, std::fmt::Debug);
    assert_not_impl_any!(SlotPoolBuilder: Sync);

    #[test]
    fn builder_new_creates_default_state() {
        let builder = SlotPoolBuilder::new();

        assert!(builder.capacity.is_none());
        assert!(builder.slot_layout.is_none());
        assert_eq!(builder.drop_policy, DropPolicy::default());
    }

    #[test]
    fn slot_layout_of_sets_layout_correctly() {
        let builder = SlotPoolBuilder::new().slot_layout_of::<u64>();

        assert_eq!(builder.slot_layout, Some(Layout::new::<u64>()));
    }

    #[test]
    fn slot_layout_is_padded() {
        let layout = Layout::from_size_align(6, 4).unwrap();
        let builder = SlotPoolBuilder::new().slot_layout(layout);

        assert_eq!(builder.slot_layout.map(|l| l.size()), Some(8));
    }

    #[test]
    fn slot_size_derives_alignment() {
        let builder = SlotPoolBuilder::new().slot_size(48);

        assert_eq!(
            builder.slot_layout,
            Some(Layout::from_size_align(48, 16).unwrap())
        );
    }

    #[test]
    fn drop_policy_sets_policy_correctly() {
        let builder = SlotPoolBuilder::new().drop_policy(DropPolicy::MustNotDropUsedSlots);
        assert_eq!(builder.drop_policy, DropPolicy::MustNotDropUsedSlots);

        let builder = SlotPoolBuilder::new().drop_policy(DropPolicy::MayDropUsedSlots);
        assert_eq!(builder.drop_policy, DropPolicy::MayDropUsedSlots);
    }

    #[test]
    fn build_applies_all_settings() {
        let pool = SlotPoolBuilder::new()
            .capacity(5)
            .slot_layout_of::<u32>()
            .drop_policy(DropPolicy::MustNotDropUsedSlots)
            .build();

        assert_eq!(pool.capacity(), 5);
        assert_eq!(pool.slot_layout(), Layout::new::<u32>());
        assert_eq!(pool.drop_policy(), DropPolicy::MustNotDropUsedSlots);
    }

    #[test]
    #[should_panic]
    fn build_without_capacity_panics() {
        _ = SlotPoolBuilder::new().slot_size(4).build();
    }

    #[test]
    #[should_panic]
    fn build_without_layout_panics() {
        _ = SlotPoolBuilder::new().capacity(4).build();
    }

    #[test]
    #[should_panic]
    fn zero_capacity_panics() {
        _ = SlotPoolBuilder::new().capacity(0);
    }

    #[test]
    #[should_panic]
    fn zero_sized_type_panics() {
        _ = SlotPoolBuilder::new().slot_layout_of::<()>();
    }
}
