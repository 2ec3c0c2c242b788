//! Bounded bump storage for the arguments of one bulk dispatch.
//!
//! Capacity is fixed when the pool is created. Every slot remembers the type
//! it was built with and how to drop it, so teardown is driven by the pool:
//! [`Pool::truncate`] and [`Pool::clear`] destruct in construction order and
//! dropping the pool destructs whatever is still alive.
//!
//! The pool is `!Send` and `!Sync`; it lives for the extent of one call.

use std::any::TypeId;
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ptr::{self, NonNull};

/// Index of a built value, in construction order.
pub type SlotIndex = usize;

struct Slot {
    offset: usize,
    type_id: TypeId,
    type_name: &'static str,
    drop_fn: unsafe fn(*mut u8),
}

unsafe fn drop_slot<T>(ptr: *mut u8) {
    // SAFETY: the caller passes a pointer to a live, initialized `T`.
    unsafe { ptr::drop_in_place(ptr.cast::<T>()) }
}

/// Sizing of a pool, computed once from the types it may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLayout {
    /// Bytes available to values, padding included.
    pub capacity: usize,
    pub max_elements: usize,
    /// Largest alignment any value may ask for.
    pub max_align: usize,
}

impl PoolLayout {
    /// Room for one value per position, each position sized for its largest
    /// candidate and rounded up to `max_align`.
    pub fn for_positions(largest_sizes: &[usize], max_align: usize) -> Self {
        assert!(max_align.is_power_of_two(), "alignment must be a power of two");
        let capacity = largest_sizes
            .iter()
            .map(|size| size.div_ceil(max_align) * max_align)
            .sum();
        PoolLayout {
            capacity,
            max_elements: largest_sizes.len(),
            max_align,
        }
    }
}

pub struct Pool {
    /// Owned allocation of `chunk_len` bytes, released in `Drop`. Kept raw
    /// so pointers into distinct slots stay valid side by side.
    chunk: NonNull<u8>,
    chunk_len: usize,
    /// Offset of the first `max_align`-aligned byte of `chunk`.
    base: usize,
    /// Next free offset, relative to `base`.
    cursor: usize,
    layout: PoolLayout,
    slots: Vec<Slot>,
    _not_send_sync: PhantomData<*mut u8>,
}

impl Pool {
    pub fn new(layout: PoolLayout) -> Self {
        assert!(
            layout.max_align.is_power_of_two(),
            "alignment must be a power of two"
        );
        let chunk: Box<[u8]> = vec![0u8; layout.capacity + layout.max_align].into_boxed_slice();
        let chunk_len = chunk.len();
        let chunk = NonNull::from(Box::leak(chunk)).cast::<u8>();
        let start = chunk.as_ptr() as usize;
        let base = start.next_multiple_of(layout.max_align) - start;
        Self {
            chunk,
            chunk_len,
            base,
            cursor: 0,
            layout,
            slots: Vec::with_capacity(layout.max_elements),
            _not_send_sync: PhantomData,
        }
    }

    /// Moves `value` into the pool and returns its slot.
    ///
    /// # Panics
    /// Panics if the element or byte limits would be exceeded, or if `T`
    /// needs a larger alignment than the pool was laid out for. Both mean
    /// the pool layout does not match the types being built.
    pub fn build<T: 'static>(&mut self, value: T) -> SlotIndex {
        assert!(
            self.slots.len() < self.layout.max_elements,
            "pool element limit ({}) exceeded building {}",
            self.layout.max_elements,
            std::any::type_name::<T>()
        );
        let align = mem::align_of::<T>();
        let size = mem::size_of::<T>();
        assert!(
            align <= self.layout.max_align,
            "{} needs alignment {align}, pool provides {}",
            std::any::type_name::<T>(),
            self.layout.max_align
        );
        let offset = self.cursor.next_multiple_of(align);
        assert!(
            offset + size <= self.layout.capacity,
            "pool capacity ({} bytes) exceeded building {}",
            self.layout.capacity,
            std::any::type_name::<T>()
        );

        // SAFETY: `base + offset + size` lies within `chunk`, the address is
        // aligned for `T` (base is `max_align`-aligned and offset is a
        // multiple of `align`) and the region is not used by any live slot.
        unsafe {
            let ptr = self.chunk.as_ptr().add(self.base + offset);
            ptr.cast::<T>().write(value);
        }
        self.cursor = offset + size;
        self.slots.push(Slot {
            offset,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            drop_fn: drop_slot::<T>,
        });
        self.slots.len() - 1
    }

    fn typed_offset<T: 'static>(&self, index: SlotIndex) -> Option<usize> {
        let slot = self.slots.get(index)?;
        (slot.type_id == TypeId::of::<T>()).then_some(self.base + slot.offset)
    }

    pub fn get<T: 'static>(&self, index: SlotIndex) -> Option<&T> {
        let offset = self.typed_offset::<T>(index)?;
        // SAFETY: the offset was bounds checked when the slot was built and
        // the slot holds a live `T` until it is destructed, which needs
        // `&mut self`.
        Some(unsafe { &*self.chunk.as_ptr().add(offset).cast::<T>() })
    }

    pub fn get_mut<T: 'static>(&mut self, index: SlotIndex) -> Option<&mut T> {
        let ptr = self.slot_ptr_checked::<T>(index)?;
        // SAFETY: as in `get`, and `&mut self` makes the borrow exclusive.
        Some(unsafe { &mut *ptr })
    }

    fn slot_ptr_checked<T: 'static>(&mut self, index: SlotIndex) -> Option<*mut T> {
        let offset = self.typed_offset::<T>(index)?;
        // SAFETY: the offset was bounds checked when the slot was built.
        Some(unsafe { self.chunk.as_ptr().add(offset).cast::<T>() })
    }

    /// Raw pointer to the `T` in slot `index`, for handing out several
    /// mutable borrows of distinct slots at once.
    ///
    /// # Panics
    /// Panics if the slot does not exist or holds another type.
    pub(crate) fn slot_ptr<T: 'static>(&mut self, index: SlotIndex) -> *mut T {
        match self.slot_ptr_checked::<T>(index) {
            Some(ptr) => ptr,
            None => panic!(
                "pool slot {index} does not hold a {}",
                std::any::type_name::<T>()
            ),
        }
    }

    pub fn type_name_at(&self, index: SlotIndex) -> Option<&'static str> {
        self.slots.get(index).map(|s| s.type_name)
    }

    /// Destructs every slot from `len` on, in construction order.
    pub fn truncate(&mut self, len: usize) {
        if len >= self.slots.len() {
            return;
        }
        let doomed: Vec<Slot> = self.slots.drain(len..).collect();
        self.cursor = doomed.first().map_or(self.cursor, |s| s.offset);
        for slot in doomed {
            // SAFETY: each drained slot holds a live value of the type its
            // `drop_fn` was instantiated with, and is never touched again.
            unsafe { (slot.drop_fn)(self.chunk.as_ptr().add(self.base + slot.offset)) }
        }
    }

    pub fn clear(&mut self) {
        self.truncate(0);
        self.cursor = 0;
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn bytes_used(&self) -> usize {
        self.cursor
    }

    pub fn layout(&self) -> PoolLayout {
        self.layout
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.clear();
        let chunk = ptr::slice_from_raw_parts_mut(self.chunk.as_ptr(), self.chunk_len);
        // SAFETY: `chunk` came from `Box::leak` in `new` with this length and
        // every value living in it has just been destructed.
        drop(unsafe { Box::from_raw(chunk) });
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("slots", &self.slots.iter().map(|s| s.type_name).collect::<Vec<_>>())
            .field("bytes_used", &self.cursor)
            .field("capacity", &self.layout.capacity)
            .finish()
    }
}
