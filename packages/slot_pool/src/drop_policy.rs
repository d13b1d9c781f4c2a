/// Determines what happens when a [`SlotPool`][crate::SlotPool] is dropped while some of its
/// slots are still marked as used.
///
/// The pool never runs destructors of the objects stored in its slots because it does not know
/// their types. By default, it simply releases the storage.
///
/// # Examples
///
/// ```
/// use slot_pool::{DropPolicy, SlotPool};
///
/// let pool = SlotPool::builder()
///     .capacity(8)
///     .slot_layout_of::<u64>()
///     .drop_policy(DropPolicy::MustNotDropUsedSlots)
///     .build();
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum DropPolicy {
    /// The pool releases its storage even if some slots are still used. This is the default.
    #[default]
    MayDropUsedSlots,

    /// The pool will panic if any slot is still used when the pool is dropped.
    ///
    /// This is useful to detect leaked objects, e.g. a shared handle that was forgotten
    /// instead of being dropped.
    MustNotDropUsedSlots,
}
