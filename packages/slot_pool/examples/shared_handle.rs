//! Demonstrates sharing an object stored in a `SlotPool` through `SharedHandle`.
//!
//! This example shows how cloning and resetting handles changes the reference count while the
//! object keeps occupying a single slot until the last handle is gone.

use slot_pool::{AllocError, SharedHandle, SlotAllocator, SlotPool};

#[derive(Debug)]
struct Sensor {
    id: u32,
    reading: f64,
}

fn main() -> Result<(), AllocError> {
    println!("=== SharedHandle Example ===");
    println!();

    let pool = SlotPool::builder()
        .capacity(4)
        .slot_layout_of::<Sensor>()
        .build();
    let allocator = SlotAllocator::<Sensor>::new(&pool)?;

    let mut first = SharedHandle::new_in(
        Sensor {
            id: 1,
            reading: 0.0,
        },
        allocator,
    )?;

    if let Some(sensor) = first.get_mut() {
        sensor.reading = 21.5;
    }

    println!("Created {first:?}");
    println!("  Used slots: {}", pool.len());

    let second = first.clone();
    let third = second.clone();

    println!();
    println!("After two clones:");
    println!("  Count: {}", first.count());
    println!("  Same object: {}", SharedHandle::ptr_eq(&first, &third));
    println!("  Used slots: {}", pool.len());

    first.reset()?;

    println!();
    println!("After resetting the first handle:");
    println!("  First is empty: {}", first.is_empty());
    println!("  Count: {}", second.count());
    println!("  Sensor {} reads {}", second.id, second.reading);

    drop(second);
    drop(third);

    println!();
    println!("After dropping the remaining handles:");
    println!("  Used slots: {}", pool.len());

    Ok(())
}
