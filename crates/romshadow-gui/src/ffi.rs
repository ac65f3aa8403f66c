//! Firmware entry points
//!
//! On the device these are resolved by the linker script to fixed ROM
//! addresses. Everywhere else they come from the simulator.

#![allow(non_snake_case)]

#[cfg(feature = "rom")]
use std::ffi::{c_char, c_void};

#[cfg(feature = "rom")]
use crate::dialog::DialogObject;
#[cfg(feature = "rom")]
use crate::text_box::TextBoxObject;

#[cfg(feature = "rom")]
extern "C" {
    /// Initialize a dialog in the 0xA8-byte block at `dialog`
    pub fn GUI_CreateDialog(
        dialog: *mut c_void,
        height: i32,
        alignment: i32,
        title: *const c_char,
        unknown2: i32,
        unknown3: i32,
        keyboard: i32,
    ) -> *mut DialogObject;

    /// Initialize a text box in the 0xA0-byte block at `text_box`
    pub fn GUI_CreateTextBox(
        text_box: *mut c_void,
        x: i32,
        y: i32,
        width: i32,
        text: *const c_char,
        unknown0: i32,
        flags: i32,
        max_length: i32,
        count_length_by_bytes: bool,
    ) -> *mut TextBoxObject;

    /// Display a message box with strings from the string table
    pub fn GUI_DisplayMessageBox(unknown: i32, title_string_id: i32, content_string_id: i32);

    /// Display a message box; blocks until it is dismissed
    pub fn GUI_DisplayMessageBox_Internal(
        unknown: i32,
        title_string: *const c_char,
        content_prefix: *const c_char,
        content_string: *const c_char,
        buttons: i32,
        disable_close_button: bool,
    ) -> *mut c_void;
}

#[cfg(not(feature = "rom"))]
pub use crate::sim::rom::{
    GUI_CreateDialog, GUI_CreateTextBox, GUI_DisplayMessageBox, GUI_DisplayMessageBox_Internal,
};
