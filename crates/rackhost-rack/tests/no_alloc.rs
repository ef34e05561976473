//! Proves the processing path never touches the allocator.
//!
//! A counting global allocator records allocations made by the current
//! thread while armed. Structural changes are queued beforehand so the
//! measured block also applies them.

#![allow(unsafe_code)]

use rackhost_core::{AudioBlock, EventBuffer, MidiEvent, PlaybackSettings};
use rackhost_rack::{ChannelLayout, ProcessorContainer, rack};
use rackhost_registry::ModuleRegistry;
use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::sync::Arc;

struct CountingAllocator;

thread_local! {
    static ARMED: Cell<bool> = const { Cell::new(false) };
    static COUNT: Cell<usize> = const { Cell::new(0) };
}

fn record() {
    let _ = ARMED.try_with(|armed| {
        if armed.get() {
            let _ = COUNT.try_with(|c| c.set(c.get() + 1));
        }
    });
}

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        record();
        unsafe { System.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        record();
        unsafe { System.dealloc(ptr, layout) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        record();
        unsafe { System.realloc(ptr, layout, new_size) }
    }
}

#[global_allocator]
static GLOBAL: CountingAllocator = CountingAllocator;

fn count_allocations(f: impl FnOnce()) -> usize {
    COUNT.with(|c| c.set(0));
    ARMED.with(|a| a.set(true));
    f();
    ARMED.with(|a| a.set(false));
    COUNT.with(Cell::get)
}

#[test]
fn process_is_allocation_free() {
    let registry = Arc::new(ModuleRegistry::with_builtins());
    let (mut controller, mut processor) = rack(registry, PlaybackSettings::new(48_000.0, 512, 2));

    let ids: Vec<_> = (0..5)
        .map(|_| controller.add_instance("equalizer").unwrap())
        .collect();
    controller.add_instance("gain").unwrap();
    controller.add_instance("delay").unwrap();
    controller.params(ids[0]).unwrap().set(4, 6.0);
    controller.remove_instance(ids[2]).unwrap();
    let reversed: Vec<_> = controller.order().into_iter().rev().collect();
    controller.reorder(&reversed).unwrap();

    let mut buffer: Vec<f32> = (0..2 * 512).map(|i| ((i as f32) * 0.01).sin()).collect();
    let mut wide = vec![0.25f64; 2 * 512];
    let mut events = EventBuffer::with_capacity(4);
    events.push(MidiEvent {
        frame: 0,
        data: [0x90, 60, 100],
    });

    let allocations = count_allocations(|| {
        processor.process_f32(&mut AudioBlock::new(&mut buffer, 2), None, &events);
        processor.process_f64(&mut AudioBlock::new(&mut wide, 2), None, &events);
    });
    assert_eq!(allocations, 0, "processing allocated {allocations} times");
    assert_eq!(processor.len(), 6);

    let mut container = ProcessorContainer::new(processor, ChannelLayout::new(1, 2));
    let input = vec![0.5f32; 512];
    let mut output = vec![0.0f32; 2 * 512];
    let allocations = count_allocations(|| container.process_duplex(&input, &mut output));
    assert_eq!(allocations, 0);

    controller.collect_garbage();
    assert_eq!(controller.len(), 6);
}
