//! Demonstrates basic slot allocation with `SlotPool` and `SlotAllocator`.
//!
//! This example shows how slots are handed out in index order, how an exhausted pool reports
//! failure and how invalid releases are rejected without changing the pool.

use slot_pool::{AllocError, DropPolicy, SlotAllocator, SlotPool};

fn main() -> Result<(), AllocError> {
    println!("=== SlotPool Basic Example ===");
    println!();

    let pool = SlotPool::builder()
        .capacity(3)
        .slot_layout_of::<u64>()
        .drop_policy(DropPolicy::MustNotDropUsedSlots)
        .build();

    println!("Created pool:");
    println!("  Capacity: {} slots", pool.capacity());
    println!("  Slot size: {} bytes", pool.slot_size());
    println!("  Slot alignment: {} bytes", pool.slot_layout().align());
    println!();

    let allocator = SlotAllocator::<u64>::new(&pool)?;

    let mut slots = Vec::new();

    loop {
        match allocator.allocate(size_of::<u64>()) {
            Ok(ptr) => {
                println!("Allocated slot at {ptr:p}, {} slot(s) used", pool.len());
                slots.push(ptr);
            }
            Err(error) => {
                println!("Allocation failed: {error}");
                break;
            }
        }
    }

    println!();

    let first = slots.remove(0);
    allocator.deallocate(first, size_of::<u64>())?;
    println!("Released slot at {first:p}, {} slot(s) used", pool.len());

    match allocator.deallocate(first, size_of::<u64>()) {
        Ok(()) => println!("Unexpected: released the same slot twice"),
        Err(error) => println!("Second release rejected: {error}"),
    }

    let reused = allocator.allocate(size_of::<u64>())?;
    println!("Allocated slot at {reused:p} again (reused: {})", reused == first);
    slots.push(reused);

    println!();

    for ptr in slots {
        allocator.deallocate(ptr, size_of::<u64>())?;
    }

    println!("Released all slots, pool is empty: {}", pool.is_empty());

    Ok(())
}
