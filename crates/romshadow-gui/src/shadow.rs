//! Shadow dispatch tables
//!
//! Firmware tables live in ROM, so a slot cannot be patched in place. Instead
//! the whole table is copied into writable memory, selected slots of the copy
//! are pointed at trampolines, the identity slot records the owning wrapper,
//! and the object's table pointer is switched over to the copy.
//!
//! ```text
//!  object                 shadow (heap)               ROM
//! +--------+  before     +------------------+        +------------------+
//! | vtable |-----------> | identity: owner  |        | identity: 0      |
//! +--------+  link       | reserved ...     |  copy  | reserved ...     |
//!                        | on_event: tramp. | <----- | on_event: rom fn |
//!                        | refresh: rom fn  |        | refresh: rom fn  |
//!                        +------------------+        +------------------+
//! ```
//!
//! Unlinking puts the ROM pointer back before the copy is freed, so the
//! firmware is never left dispatching through released memory.

use std::ptr::{self, NonNull};

use crate::error::{Result, ShadowError};
use crate::layout::{ForeignClass, ShadowLayout};
use crate::slot::Slot;

/// Writable copy of one object's dispatch table
///
/// Exactly one shadow exists per shadowed object. It is not `Clone`: a copy
/// would unlink the object a second time on drop.
///
/// ```compile_fail
/// use romshadow_gui::{dialog::DialogObject, Shadow};
///
/// fn duplicate(shadow: &Shadow<DialogObject>) -> Shadow<DialogObject> {
///     shadow.clone()
/// }
/// ```
pub struct Shadow<C: ForeignClass>
where
    C::Table: ShadowLayout,
{
    object: NonNull<C>,
    table: NonNull<C::Table>,
    original: NonNull<C::Table>,
    linked: bool,
}

impl<C: ForeignClass> Shadow<C>
where
    C::Table: ShadowLayout,
{
    /// Copy the object's current table into a new, unlinked shadow
    ///
    /// # Safety
    /// `object` must point at an initialized object of class `C` that
    /// outlives the returned shadow.
    pub unsafe fn copy_of(object: NonNull<C>) -> Result<Self> {
        let original = NonNull::new(C::table(object.as_ptr()))
            .ok_or(ShadowError::NullTable { class: C::NAME })?;

        // Byte-for-byte: reserved slots are carried over without being looked at
        let copy = Box::new(ptr::read(original.as_ptr()));
        let table = NonNull::from(Box::leak(copy));

        tracing::debug!(
            "copied {} table {:p} -> {:p} for object {:p}",
            C::NAME,
            original,
            table,
            object
        );

        Ok(Self {
            object,
            table,
            original,
            linked: false,
        })
    }

    /// Record the wrapper that owns this shadow in the identity slot
    ///
    /// Only allowed before [`link`](Self::link); once linked the firmware
    /// may be reading the slot.
    pub fn set_owner<W>(&mut self, owner: *const W) -> Result<()> {
        if self.linked {
            return Err(ShadowError::AlreadyLinked { class: C::NAME });
        }
        // SAFETY: the copy is owned by us and the firmware cannot see it until linked
        unsafe { self.table.as_mut().identity_mut().set_owner(owner) };
        Ok(())
    }

    /// Point one slot of the copy at a trampoline
    ///
    /// The adjustor of the shadow slot is cleared so the trampoline receives
    /// the object itself; the ROM slot keeps its adjustor for forwarding.
    pub fn install<F: Copy>(
        &mut self,
        slot: impl FnOnce(&mut C::Table) -> &mut Slot<F>,
        trampoline: F,
    ) -> Result<()> {
        if self.linked {
            return Err(ShadowError::AlreadyLinked { class: C::NAME });
        }
        // SAFETY: unlinked, so nothing else reads the copy
        let slot = slot(unsafe { self.table.as_mut() });
        *slot = Slot::new(0, trampoline);
        Ok(())
    }

    /// Switch the object over to the shadow table
    pub fn link(&mut self) -> Result<()> {
        if self.linked {
            return Err(ShadowError::AlreadyLinked { class: C::NAME });
        }
        if self.table().identity().is_vacant() {
            return Err(ShadowError::MissingOwner { class: C::NAME });
        }
        // SAFETY: the object outlives the shadow (see `copy_of`)
        unsafe { C::set_table(self.object.as_ptr(), self.table.as_ptr()) };
        self.linked = true;
        tracing::debug!("linked {} object {:p} to shadow {:p}", C::NAME, self.object, self.table);
        Ok(())
    }

    /// Put the ROM table back
    pub fn unlink(&mut self) {
        if !self.linked {
            return;
        }
        // SAFETY: the object outlives the shadow (see `copy_of`)
        unsafe { C::set_table(self.object.as_ptr(), self.original.as_ptr()) };
        self.linked = false;
        tracing::debug!("unlinked {} object {:p}", C::NAME, self.object);
    }

    pub fn is_linked(&self) -> bool {
        self.linked
    }

    /// The shadow table as the firmware sees it
    pub fn table(&self) -> &C::Table {
        // SAFETY: owned allocation, only mutated through `&mut self`
        unsafe { self.table.as_ref() }
    }

    pub fn table_ptr(&self) -> *mut C::Table {
        self.table.as_ptr()
    }

    /// The table the object pointed at before shadowing
    pub fn original(&self) -> &C::Table {
        // SAFETY: ROM tables are never freed
        unsafe { self.original.as_ref() }
    }
}

impl<C: ForeignClass> Drop for Shadow<C>
where
    C::Table: ShadowLayout,
{
    fn drop(&mut self) {
        self.unlink();
        // SAFETY: allocated by Box::leak in `copy_of`, and no longer linked
        unsafe { drop(Box::from_raw(self.table.as_ptr())) };
    }
}

/// Recover the owner recorded in the table an object currently uses
///
/// This is the first thing every trampoline does. The result is only as
/// valid as the owner: nothing checks that it is still alive.
///
/// # Safety
/// `object` must point at an initialized object of class `C` whose table is
/// a linked shadow.
pub unsafe fn owner_of<C, W>(object: *const C) -> *const W
where
    C: ForeignClass,
    C::Table: ShadowLayout,
{
    let table = C::table(object);
    (*table).identity().owner().cast()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foreign_call;
    use crate::slot::{IdentitySlot, RawSlot};
    use std::cell::Cell;

    type PokeFn = unsafe extern "C" fn(*mut Widget, i32) -> i32;

    #[repr(C)]
    struct WidgetTable {
        identity: IdentitySlot,
        reserved0: [RawSlot; 2],
        poke: Slot<PokeFn>,
        reserved1: [RawSlot; 3],
    }

    crate::dispatch_layout!(WidgetTable, name = "WidgetTable", slots = 7, identity = identity);

    #[repr(C)]
    struct Widget {
        reserved: [u8; 16],
        table: *mut WidgetTable,
        value: i32,
    }

    crate::foreign_class!(Widget, name = "Widget", table = table: WidgetTable, size = std::mem::size_of::<Widget>());

    struct Owner {
        sentinel: i32,
        hits: Cell<u32>,
        shadow: Option<Shadow<Widget>>,
    }

    /// Stands in for the firmware implementation; expects `self` shifted by 4
    unsafe extern "C" fn rom_poke(this: *mut Widget, arg: i32) -> i32 {
        let widget = this.cast::<u8>().sub(4).cast::<Widget>();
        (*widget).value + arg
    }

    unsafe extern "C" fn poke_trampoline(this: *mut Widget, arg: i32) -> i32 {
        let owner = owner_of::<Widget, Owner>(this);
        (*owner).hits.set((*owner).hits.get() + 1);
        (*owner).sentinel + arg
    }

    unsafe extern "C" fn poke_forwarding(this: *mut Widget, arg: i32) -> i32 {
        let owner = owner_of::<Widget, Owner>(this);
        let original = (*owner).shadow.as_ref().unwrap().original();
        foreign_call!(original.poke, this, arg)
    }

    fn rom_table() -> Box<WidgetTable> {
        Box::new(WidgetTable {
            identity: IdentitySlot::VACANT,
            reserved0: [Slot::new(-8, 0x1111 as *const _), Slot::new(12, 0x2222 as *const _)],
            poke: Slot::new(4, rom_poke as PokeFn),
            reserved1: [Slot::new(0, 0x3333 as *const _); 3],
        })
    }

    fn widget(table: &mut WidgetTable, value: i32) -> Box<Widget> {
        Box::new(Widget {
            reserved: [0xA5; 16],
            table,
            value,
        })
    }

    fn owned(widget: &mut Widget, sentinel: i32, trampoline: PokeFn) -> Box<Owner> {
        let mut owner = Box::new(Owner {
            sentinel,
            hits: Cell::new(0),
            shadow: None,
        });
        let owner_ptr: *const Owner = &*owner;
        let mut shadow = unsafe { Shadow::copy_of(NonNull::from(widget)) }.unwrap();
        shadow.set_owner(owner_ptr).unwrap();
        shadow.install(|t| &mut t.poke, trampoline).unwrap();
        shadow.link().unwrap();
        owner.shadow = Some(shadow);
        owner
    }

    fn poke(widget: &mut Widget, arg: i32) -> i32 {
        let this: *mut Widget = widget;
        unsafe {
            let table = Widget::table(this);
            foreign_call!((*table).poke, this, arg)
        }
    }

    #[test]
    fn test_untouched_slots_are_copied_exactly() {
        let mut rom = rom_table();
        let mut w = widget(&mut rom, 1);
        let owner = owned(&mut w, 0, poke_trampoline);
        let shadow = owner.shadow.as_ref().unwrap();

        let (copy, orig) = (shadow.table(), shadow.original());
        for (a, b) in copy.reserved0.iter().zip(orig.reserved0.iter()) {
            assert_eq!(a.words(), b.words());
        }
        for (a, b) in copy.reserved1.iter().zip(orig.reserved1.iter()) {
            assert_eq!(a.words(), b.words());
        }
        assert_eq!(copy.poke.adjustor, 0);
        assert_eq!(orig.poke.adjustor, 4);
        assert!(orig.identity.is_vacant());
    }

    #[test]
    fn test_identity_round_trip() {
        let mut rom = rom_table();
        let mut w = widget(&mut rom, 1);
        let owner = owned(&mut w, 0, poke_trampoline);

        let recovered = unsafe { owner_of::<Widget, Owner>(&*w) };
        assert_eq!(recovered, &*owner as *const Owner);
    }

    #[test]
    fn test_no_cross_talk_between_instances() {
        let mut rom = rom_table();
        let mut wa = widget(&mut rom, 1);
        let mut wb = widget(&mut rom, 1);
        let a = owned(&mut wa, 1000, poke_trampoline);
        let b = owned(&mut wb, 2000, poke_trampoline);

        for i in 0..100 {
            if i % 3 == 0 {
                assert_eq!(poke(&mut wb, i), 2000 + i);
            } else {
                assert_eq!(poke(&mut wa, i), 1000 + i);
            }
        }
        assert_eq!(a.hits.get(), 66);
        assert_eq!(b.hits.get(), 34);
    }

    #[test]
    fn test_forwarding_preserves_default_behavior() {
        let mut rom = rom_table();
        let mut w = widget(&mut rom, 40);
        let before = poke(&mut w, 2);

        let _owner = owned(&mut w, 0, poke_forwarding);
        assert_ne!(w.table, &mut *rom as *mut WidgetTable);
        assert_eq!(poke(&mut w, 2), before);
        assert_eq!(before, 42);
    }

    #[test]
    fn test_drop_unlinks_before_release() {
        let mut rom = rom_table();
        let rom_ptr: *mut WidgetTable = &mut *rom;
        let mut w = widget(&mut rom, 1);

        let owner = owned(&mut w, 0, poke_trampoline);
        assert_ne!(w.table, rom_ptr);
        drop(owner);
        assert_eq!(w.table, rom_ptr);
        assert_eq!(w.reserved, [0xA5; 16]);
    }

    #[test]
    fn test_link_requires_owner() {
        let mut rom = rom_table();
        let mut w = widget(&mut rom, 1);
        let mut shadow = unsafe { Shadow::copy_of(NonNull::from(&mut *w)) }.unwrap();

        assert_eq!(shadow.link(), Err(ShadowError::MissingOwner { class: "Widget" }));
        assert!(!shadow.is_linked());
    }

    #[test]
    fn test_install_after_link_is_rejected() {
        let mut rom = rom_table();
        let mut w = widget(&mut rom, 1);
        let mut owner = owned(&mut w, 0, poke_trampoline);
        let shadow = owner.shadow.as_mut().unwrap();

        let err = shadow.install(|t| &mut t.poke, rom_poke as PokeFn).unwrap_err();
        assert_eq!(err, ShadowError::AlreadyLinked { class: "Widget" });
        assert_eq!(shadow.link(), Err(ShadowError::AlreadyLinked { class: "Widget" }));
    }

    #[test]
    fn test_owner_is_fixed_once_linked() {
        let mut rom = rom_table();
        let mut w = widget(&mut rom, 1);
        let mut owner = owned(&mut w, 5, poke_trampoline);
        let original_owner: *const Owner = &*owner;
        let impostor = 0x40usize as *const Owner;

        let shadow = owner.shadow.as_mut().unwrap();
        assert_eq!(shadow.set_owner(impostor), Err(ShadowError::AlreadyLinked { class: "Widget" }));

        let recovered = unsafe { owner_of::<Widget, Owner>(&*w) };
        assert_eq!(recovered, original_owner);
        assert_eq!(poke(&mut w, 1), 6);
    }

    #[test]
    fn test_null_table_is_rejected() {
        let mut w = Box::new(Widget {
            reserved: [0; 16],
            table: ptr::null_mut(),
            value: 0,
        });
        let result = unsafe { Shadow::copy_of(NonNull::from(&mut *w)) };
        assert!(matches!(result, Err(ShadowError::NullTable { class: "Widget" })));
    }
}
