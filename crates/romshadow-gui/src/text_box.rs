//! Firmware text boxes
//!
//! Text boxes never override anything; their table is only called through.

use std::any::Any;
use std::cell::RefCell;
use std::ffi::{c_char, c_void, CStr, CString};
use std::mem::{offset_of, size_of};
use std::ptr;

use romshadow_common::text_box_flags::{DRAW_BOX, EDITABLE};

use crate::element::Element;
use crate::error::{Result, ShadowError};
use crate::foreign::ForeignRef;
use crate::layout::ForeignClass;
use crate::slot::{RawSlot, Slot};
use crate::{ffi, foreign_call};

pub type SetTextFn = unsafe extern "C" fn(*mut TextBoxObject, *const c_char);

/// Leading part of the text box table
///
/// The firmware table continues past `set_text`; this prefix is enough to
/// call through but can not be shadowed.
#[repr(C)]
pub struct TextBoxVTable {
    pub(crate) reserved0: [RawSlot; 32],
    pub set_text: Slot<SetTextFn>,
}

crate::dispatch_layout!(TextBoxVTable, name = "TextBoxTable", slots = 33);

/// Size of a text box object on the device
pub const TEXT_BOX_OBJECT_SIZE: usize = 0xA0;
const TEXT_BOX_TABLE_OFFSET: usize = 0x4C;
pub(crate) const TEXT_BOX_TAIL: usize =
    TEXT_BOX_OBJECT_SIZE - TEXT_BOX_TABLE_OFFSET - 4 - 2 * size_of::<*const c_void>();

#[repr(C, packed(4))]
pub struct TextBoxObject {
    pub(crate) reserved0: [u8; TEXT_BOX_TABLE_OFFSET],
    pub(crate) vtable: *mut TextBoxVTable,
    pub(crate) reserved1: [u8; 4],
    pub(crate) text: *const c_char,
    pub(crate) reserved2: [u8; TEXT_BOX_TAIL],
}

crate::foreign_class!(TextBoxObject, name = "TextBox", table = vtable: TextBoxVTable, size = TEXT_BOX_OBJECT_SIZE);

const _: () = assert!(offset_of!(TextBoxObject, vtable) == TEXT_BOX_TABLE_OFFSET);
#[cfg(target_pointer_width = "32")]
const _: () = {
    assert!(offset_of!(TextBoxObject, text) == 0x54);
    assert!(TEXT_BOX_TAIL == 0x48);
};

/// Flags used when none are given
pub const DEFAULT_FLAGS: i32 = DRAW_BOX | EDITABLE;

pub struct TextBox {
    object: ForeignRef<TextBoxObject>,
    // The firmware may keep pointing at the last string it was given
    text: RefCell<Option<CString>>,
}

impl TextBox {
    /// Empty, editable text box
    pub fn new(x: i32, y: i32, width: i32, max_length: i32, count_by_bytes: bool) -> Result<Self> {
        Self::create(x, y, width, None, max_length, count_by_bytes, DEFAULT_FLAGS)
    }

    /// Editable text box with initial contents
    pub fn with_text(
        x: i32,
        y: i32,
        width: i32,
        text: &str,
        max_length: i32,
        count_by_bytes: bool,
    ) -> Result<Self> {
        Self::create(x, y, width, Some(text), max_length, count_by_bytes, DEFAULT_FLAGS)
    }

    pub fn create(
        x: i32,
        y: i32,
        width: i32,
        text: Option<&str>,
        max_length: i32,
        count_by_bytes: bool,
        flags: i32,
    ) -> Result<Self> {
        let text = text.map(to_cstring).transpose()?;
        let text_ptr = text.as_ref().map_or(ptr::null(), |t| t.as_ptr());

        // SAFETY: GUI_CreateTextBox initializes a full text box in the block
        let object = unsafe {
            ForeignRef::init(|block| {
                ffi::GUI_CreateTextBox(
                    block,
                    x,
                    y,
                    width,
                    text_ptr,
                    0,
                    flags,
                    max_length,
                    count_by_bytes,
                )
            })?
        };

        Ok(Self {
            object,
            text: RefCell::new(text),
        })
    }

    /// Current contents, as the firmware holds them
    pub fn text(&self) -> String {
        let object = self.object.as_ptr();
        // SAFETY: the text field is either null or a NUL-terminated string
        unsafe {
            let text = ptr::addr_of!((*object).text).read_unaligned();
            if text.is_null() {
                return String::new();
            }
            CStr::from_ptr(text).to_string_lossy().into_owned()
        }
    }

    pub fn set_text(&self, text: &str) -> Result<()> {
        let text = to_cstring(text)?;
        let object = self.object.as_ptr();
        // SAFETY: the object is alive and `text` is kept alive below
        unsafe {
            let table = TextBoxObject::table(object);
            foreign_call!((*table).set_text, object, text.as_ptr());
        }
        *self.text.borrow_mut() = Some(text);
        Ok(())
    }

    pub fn object_ptr(&self) -> *mut TextBoxObject {
        self.object.as_ptr()
    }
}

impl Element for TextBox {
    fn as_raw(&self) -> *mut c_void {
        self.object.get_as()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) fn to_cstring(text: &str) -> Result<CString> {
    CString::new(text).map_err(|_| ShadowError::InteriorNul(text.to_string()))
}
