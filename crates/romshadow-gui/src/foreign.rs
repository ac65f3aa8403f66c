//! Handles to firmware objects
//!
//! The firmware initializes its objects in place, in a block the caller
//! reserves. [`ForeignRef`] owns that block and the address the initializer
//! handed back. The block lives on the heap, so the address stays fixed for
//! the handle's lifetime even when the handle itself moves: shadow tables and
//! the firmware both keep raw pointers to it.

use std::ffi::c_void;
use std::mem::MaybeUninit;
use std::ptr::NonNull;

use crate::error::{Result, ShadowError};
use crate::layout::ForeignClass;

/// Owning handle to one initialized firmware object
///
/// Neither `Clone` nor `Copy`: two handles to one block would each free it,
/// and only one of them could be the owner recorded in a shadow table.
///
/// ```compile_fail
/// use romshadow_gui::{dialog::DialogObject, ForeignRef};
///
/// fn duplicate(object: &ForeignRef<DialogObject>) -> ForeignRef<DialogObject> {
///     object.clone()
/// }
/// ```
pub struct ForeignRef<C: ForeignClass> {
    object: NonNull<C>,
    storage: NonNull<MaybeUninit<C>>,
}

impl<C: ForeignClass> ForeignRef<C> {
    /// Reserve a block for `C` and let `init` construct the object in it
    ///
    /// `init` receives the uninitialized block and returns the object the
    /// firmware built, which is normally the same address.
    ///
    /// # Safety
    /// `init` must fully initialize an object of class `C` at the returned
    /// address, or return null.
    pub unsafe fn init(init: impl FnOnce(*mut c_void) -> *mut C) -> Result<Self> {
        let storage = NonNull::from(Box::leak(Box::new(MaybeUninit::<C>::uninit())));

        match NonNull::new(init(storage.as_ptr().cast())) {
            Some(object) => {
                tracing::debug!("{} initialized at {:p}", C::NAME, object);
                Ok(Self {
                    object,
                    storage,
                })
            }
            None => {
                drop(Box::from_raw(storage.as_ptr()));
                Err(ShadowError::NullObject { class: C::NAME })
            }
        }
    }

    /// The object address, reinterpreted as `T`
    ///
    /// No checks are made; the layout the caller picks is the only source
    /// of truth for what lives there.
    #[inline]
    pub fn get_as<T>(&self) -> *mut T {
        self.object.as_ptr().cast()
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut C {
        self.object.as_ptr()
    }

    #[inline]
    pub fn as_non_null(&self) -> NonNull<C> {
        self.object
    }
}

impl<C: ForeignClass> Drop for ForeignRef<C> {
    fn drop(&mut self) {
        tracing::trace!("releasing {} block at {:p}", C::NAME, self.storage);
        #[cfg(not(feature = "rom"))]
        crate::sim::release(self.object.as_ptr().cast_const().cast());
        // SAFETY: storage came from Box::leak in `init` and is released once
        unsafe { drop(Box::from_raw(self.storage.as_ptr())) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::RawSlot;

    #[repr(C)]
    struct Gadget {
        table: *mut GadgetTable,
        value: u32,
    }

    #[repr(C)]
    struct GadgetTable {
        slots: [RawSlot; 1],
    }

    crate::dispatch_layout!(GadgetTable, name = "GadgetTable", slots = 1);
    crate::foreign_class!(Gadget, name = "Gadget", table = table: GadgetTable, size = std::mem::size_of::<Gadget>());

    #[test]
    fn test_init_in_place() {
        let object = unsafe {
            ForeignRef::<Gadget>::init(|block| {
                let gadget = block.cast::<Gadget>();
                gadget.write(Gadget {
                    table: std::ptr::null_mut(),
                    value: 7,
                });
                gadget
            })
        }
        .unwrap();

        assert_eq!(unsafe { (*object.as_ptr()).value }, 7);
        assert_eq!(object.get_as::<u8>() as usize, object.as_ptr() as usize);
    }

    #[test]
    fn test_null_initializer_is_an_error() {
        let result = unsafe { ForeignRef::<Gadget>::init(|_| std::ptr::null_mut()) };
        assert!(matches!(result, Err(ShadowError::NullObject { class: "Gadget" })));
    }
}
