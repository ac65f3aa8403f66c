//! Dispatch table slots and the foreign call convention
//!
//! Every callable slot in a firmware dispatch table is three words:
//!
//! ```text
//! +0x00  adjustor  i32   added to `self` before the call
//! +0x04  unused    u32
//! +0x08  function  ptr
//! ```
//!
//! The adjustor lives in the table, not in the callee, so callers always do
//! the same two steps: shift `self` by the slot's adjustor, then call the
//! function with the shifted pointer followed by the remaining arguments.
//! [`foreign_call!`](crate::foreign_call) is that routine; it is used for
//! firmware functions and our own trampolines alike.

use std::ffi::c_void;
use std::ptr;

/// One callable slot of a dispatch table
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Slot<F> {
    pub adjustor: i32,
    unused: u32,
    pub func: F,
}

impl<F: Copy> Slot<F> {
    pub const fn new(adjustor: i32, func: F) -> Self {
        Self {
            adjustor,
            unused: 0,
            func,
        }
    }

    /// Shift `this` by the slot's adjustor, in bytes
    #[inline]
    pub fn adjust<T>(&self, this: *mut T) -> *mut T {
        this.cast::<u8>()
            .wrapping_offset(self.adjustor as isize)
            .cast()
    }
}

/// A slot whose function is never called by us
///
/// Reserved slots are copied and compared, never interpreted.
pub type RawSlot = Slot<*const c_void>;

impl RawSlot {
    pub const VACANT: RawSlot = Slot::new(0, ptr::null());

    /// Raw words of the slot, for byte-exact comparisons
    pub fn words(&self) -> (i32, u32, usize) {
        (self.adjustor, self.unused, self.func as usize)
    }
}

/// Slot repurposed to point back at the owner of a shadow table
///
/// Firmware tables keep this slot zeroed and never read it, so a shadow can
/// store the address of its owning wrapper here. Trampolines only receive the
/// firmware object, and the object only knows its table; this slot closes
/// the loop back to the wrapper.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct IdentitySlot {
    owner: *const c_void,
    reserved: [u32; 2],
}

impl IdentitySlot {
    pub const VACANT: IdentitySlot = IdentitySlot {
        owner: ptr::null(),
        reserved: [0; 2],
    };

    pub fn owner(&self) -> *const c_void {
        self.owner
    }

    pub fn set_owner<W>(&mut self, owner: *const W) {
        self.owner = owner.cast();
    }

    pub fn is_vacant(&self) -> bool {
        self.owner.is_null()
    }
}

const _: () = assert!(std::mem::size_of::<IdentitySlot>() == std::mem::size_of::<RawSlot>());
#[cfg(target_pointer_width = "32")]
const _: () = assert!(std::mem::size_of::<RawSlot>() == 12);

/// Call the function in a slot using the firmware convention
///
/// `$slot` is a place of type [`Slot<F>`], `$this` the unadjusted self
/// pointer. The expansion calls an `unsafe` function and has to be wrapped
/// in an `unsafe` block by the caller, who vouches that the slot holds a live
/// function matching `F` and that `$this` points at an object of the class
/// the slot belongs to.
///
/// ```compile_fail
/// use romshadow_gui::{foreign_call, Slot};
///
/// unsafe extern "C" fn read(p: *mut u32) -> u32 {
///     *p
/// }
///
/// let slot = Slot::new(0, read as unsafe extern "C" fn(*mut u32) -> u32);
/// let mut value = 7u32;
/// let _ = foreign_call!(slot, &mut value as *mut u32);
/// ```
#[macro_export]
macro_rules! foreign_call {
    ($slot:expr, $this:expr $(, $arg:expr)* $(,)?) => {{
        let slot = &$slot;
        let this = slot.adjust($this);
        $crate::tracing::trace!(adjustor = slot.adjustor, "foreign call");
        (slot.func)(this $(, $arg)*)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[repr(C)]
    struct Outer {
        head: [u8; 8],
        inner: u32,
    }

    type RecordFn = unsafe extern "C" fn(*mut Outer, u32) -> u32;

    thread_local! {
        static SEEN: Cell<usize> = const { Cell::new(0) };
    }

    unsafe extern "C" fn record(this: *mut Outer, add: u32) -> u32 {
        SEEN.with(|s| s.set(this as usize));
        *(this as *const u32) + add
    }

    #[test]
    fn test_adjust_applies_signed_offset() {
        let slot = Slot::new(-4, ptr::null::<c_void>());
        let base = 0x1000usize as *mut u8;
        assert_eq!(slot.adjust(base) as usize, 0xFFC);

        let slot = Slot::new(0x10, ptr::null::<c_void>());
        assert_eq!(slot.adjust(base) as usize, 0x1010);
    }

    #[test]
    fn test_foreign_call_passes_adjusted_self() {
        let mut outer = Outer {
            head: [0; 8],
            inner: 40,
        };
        let base: *mut Outer = &mut outer;
        let slot = Slot::new(8, record as RecordFn);

        let result = unsafe { foreign_call!(slot, base, 2) };

        assert_eq!(result, 42);
        assert_eq!(SEEN.with(|s| s.get()), base as usize + 8);
    }

    #[test]
    fn test_identity_slot_round_trip() {
        let owner = 0xBEEFu32;
        let mut slot = IdentitySlot::VACANT;
        assert!(slot.is_vacant());
        slot.set_owner(&owner as *const u32);
        assert_eq!(slot.owner(), &owner as *const u32 as *const c_void);
    }
}
