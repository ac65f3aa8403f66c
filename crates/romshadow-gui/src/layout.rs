//! Layout descriptors for firmware classes and their dispatch tables
//!
//! A dispatch table is described once, as a `#[repr(C)]` struct of [`Slot`]s
//! and reserved [`RawSlot`] runs, and registered with [`dispatch_layout!`].
//! A firmware object is described as a `#[repr(C)]` struct with its known
//! fields at their fixed offsets and reserved byte arrays in between, and
//! registered with [`foreign_class!`]. Both macros emit `const` assertions
//! against the reference ABI sizes, so a wrong layout fails the build
//! instead of corrupting firmware memory.
//!
//! [`Slot`]: crate::slot::Slot
//! [`RawSlot`]: crate::slot::RawSlot
//! [`dispatch_layout!`]: crate::dispatch_layout
//! [`foreign_class!`]: crate::foreign_class

use std::fmt;
use std::mem::size_of;

use serde::Serialize;

use crate::slot::IdentitySlot;

/// Size of one table slot on the device (32-bit pointers)
pub const ABI_SLOT_SIZE: usize = 12;

/// A dispatch table layout
///
/// # Safety
/// The implementor must be `#[repr(C)]` and consist only of slots, in the
/// order the firmware lays them out.
pub unsafe trait DispatchLayout: Sized + 'static {
    const NAME: &'static str;
    const SLOTS: usize;
    /// `true` when the layout covers the whole firmware table and may be
    /// copied into a shadow. Prefix layouts are only good for reading.
    const SHADOWABLE: bool;
    /// Size of the table on the device
    const ABI_SIZE: usize = Self::SLOTS * ABI_SLOT_SIZE;
}

/// A complete table layout whose unused slot can hold an owner
///
/// # Safety
/// The identity slot must be one the firmware never reads.
pub unsafe trait ShadowLayout: DispatchLayout {
    fn identity(&self) -> &IdentitySlot;
    fn identity_mut(&mut self) -> &mut IdentitySlot;
}

/// A firmware class: an object layout plus the table it points to
///
/// # Safety
/// `table` and `set_table` must access the object's table pointer field and
/// nothing else.
pub unsafe trait ForeignClass: Sized {
    type Table: DispatchLayout;
    const NAME: &'static str;
    /// Object size on the device
    const ABI_SIZE: usize;

    /// Read the table pointer out of an object
    ///
    /// # Safety
    /// `this` must point at an initialized object of this class.
    unsafe fn table(this: *const Self) -> *mut Self::Table;

    /// Replace the table pointer of an object
    ///
    /// # Safety
    /// `this` must point at an initialized object of this class, and `table`
    /// must stay valid for as long as the firmware may dispatch through it.
    unsafe fn set_table(this: *mut Self, table: *mut Self::Table);
}

/// Register a dispatch table layout and verify its size
///
/// ```ignore
/// dispatch_layout!(DialogVTable, name = "Dialog", slots = 54, identity = identity);
/// ```
#[macro_export]
macro_rules! dispatch_layout {
    (@impl $table:ty, $name:literal, $slots:expr, $shadowable:expr) => {
        unsafe impl $crate::layout::DispatchLayout for $table {
            const NAME: &'static str = $name;
            const SLOTS: usize = $slots;
            const SHADOWABLE: bool = $shadowable;
        }

        const _: () = assert!(
            ::std::mem::size_of::<$table>()
                == $slots * ::std::mem::size_of::<$crate::slot::RawSlot>()
        );
        #[cfg(target_pointer_width = "32")]
        const _: () = assert!(::std::mem::size_of::<$table>() == $slots * $crate::layout::ABI_SLOT_SIZE);
    };
    ($table:ty, name = $name:literal, slots = $slots:expr) => {
        $crate::dispatch_layout!(@impl $table, $name, $slots, false);
    };
    ($table:ty, name = $name:literal, slots = $slots:expr, identity = $field:ident) => {
        $crate::dispatch_layout!(@impl $table, $name, $slots, true);

        unsafe impl $crate::layout::ShadowLayout for $table {
            fn identity(&self) -> &$crate::slot::IdentitySlot {
                &self.$field
            }

            fn identity_mut(&mut self) -> &mut $crate::slot::IdentitySlot {
                &mut self.$field
            }
        }
    };
}

/// Register a firmware object layout and verify its size
///
/// ```ignore
/// foreign_class!(DialogObject, name = "Dialog", table = vtable: DialogVTable, size = 0xA8);
/// ```
#[macro_export]
macro_rules! foreign_class {
    ($class:ty, name = $name:literal, table = $field:ident : $table:ty, size = $size:expr) => {
        unsafe impl $crate::layout::ForeignClass for $class {
            type Table = $table;
            const NAME: &'static str = $name;
            const ABI_SIZE: usize = $size;

            unsafe fn table(this: *const Self) -> *mut $table {
                ::std::ptr::addr_of!((*this).$field).read_unaligned()
            }

            unsafe fn set_table(this: *mut Self, table: *mut $table) {
                ::std::ptr::addr_of_mut!((*this).$field).write_unaligned(table)
            }
        }

        const _: () = assert!(::std::mem::size_of::<$class>() == $size);
    };
}

/// Size information for one table layout
#[derive(Debug, Clone, Serialize)]
pub struct TableInfo {
    pub name: &'static str,
    pub slots: usize,
    pub host_bytes: usize,
    pub abi_bytes: usize,
    pub shadowable: bool,
}

impl TableInfo {
    pub fn of<L: DispatchLayout>() -> Self {
        Self {
            name: L::NAME,
            slots: L::SLOTS,
            host_bytes: size_of::<L>(),
            abi_bytes: L::ABI_SIZE,
            shadowable: L::SHADOWABLE,
        }
    }
}

/// Size information for one firmware class
#[derive(Debug, Clone, Serialize)]
pub struct ClassInfo {
    pub name: &'static str,
    pub table: &'static str,
    pub host_bytes: usize,
    pub abi_bytes: usize,
}

impl ClassInfo {
    pub fn of<C: ForeignClass>() -> Self {
        Self {
            name: C::NAME,
            table: <C::Table as DispatchLayout>::NAME,
            host_bytes: size_of::<C>(),
            abi_bytes: C::ABI_SIZE,
        }
    }
}

/// Every layout this crate knows about
#[derive(Debug, Clone, Serialize)]
pub struct LayoutReport {
    pub pointer_bytes: usize,
    pub tables: Vec<TableInfo>,
    pub classes: Vec<ClassInfo>,
}

impl LayoutReport {
    pub fn collect() -> Self {
        use crate::dialog::{DialogObject, DialogVTable};
        use crate::text_box::{TextBoxObject, TextBoxVTable};

        Self {
            pointer_bytes: size_of::<usize>(),
            tables: vec![TableInfo::of::<DialogVTable>(), TableInfo::of::<TextBoxVTable>()],
            classes: vec![ClassInfo::of::<DialogObject>(), ClassInfo::of::<TextBoxObject>()],
        }
    }
}

impl fmt::Display for LayoutReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "host pointer size: {} bytes", self.pointer_bytes)?;
        writeln!(f)?;
        writeln!(
            f,
            "{:<12} {:>6} {:>10} {:>10}  {}",
            "table", "slots", "host", "device", "shadow"
        )?;
        for table in &self.tables {
            writeln!(
                f,
                "{:<12} {:>6} {:>#10x} {:>#10x}  {}",
                table.name,
                table.slots,
                table.host_bytes,
                table.abi_bytes,
                if table.shadowable { "yes" } else { "prefix only" }
            )?;
        }
        writeln!(f)?;
        writeln!(f, "{:<12} {:>12} {:>10} {:>10}", "class", "table", "host", "device")?;
        for class in &self.classes {
            writeln!(
                f,
                "{:<12} {:>12} {:>#10x} {:>#10x}",
                class.name, class.table, class.host_bytes, class.abi_bytes
            )?;
        }
        Ok(())
    }
}
