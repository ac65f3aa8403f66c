//! Simulated ROM: dispatch tables and initializers
//!
//! The tables are immutable statics, like their firmware counterparts.
//! Reserved slots carry recognizable junk so copies can be checked slot by
//! slot.

#![allow(non_snake_case)]

use std::ffi::{c_char, c_void, CStr, CString};
use std::ptr;

use romshadow_common::{Alignment, Height, SCREEN_HEIGHT, SCREEN_WIDTH};

use super::{
    deliver, with_device, with_dialog, MessageBoxRecord, SimDialog, SimTextBox, EVENT_CLOSE, RESERVED_FILL,
};
use crate::dialog::{
    AddElementFn, DialogObject, DialogVTable, EventData, OnEventFn, RefreshFn, ShowDialogFn,
    DIALOG_TAIL,
};
use crate::slot::{IdentitySlot, RawSlot, Slot};
use crate::text_box::{SetTextFn, TextBoxObject, TextBoxVTable, TEXT_BOX_TAIL};

struct Rom<T>(T);

// Never written after link time
unsafe impl<T> Sync for Rom<T> {}

const fn reserved<const N: usize>(base: usize) -> [RawSlot; N] {
    let mut slots = [RawSlot::VACANT; N];
    let mut i = 0;
    while i < N {
        slots[i] = Slot::new(i as i32 * 4, (base + i * 4) as *const c_void);
        i += 1;
    }
    slots
}

static DIALOG_ROM: Rom<DialogVTable> = Rom(DialogVTable {
    identity: IdentitySlot::VACANT,
    reserved0: reserved::<1>(0x8001_0000),
    on_event: Slot::new(0, dialog_on_event as OnEventFn),
    reserved1: reserved::<1>(0x8002_0000),
    add_element: Slot::new(0, dialog_add_element as AddElementFn),
    reserved2: reserved::<4>(0x8003_0000),
    refresh: Slot::new(0, dialog_refresh as RefreshFn),
    reserved3: reserved::<23>(0x8004_0000),
    show_dialog: Slot::new(0, dialog_show as ShowDialogFn),
    reserved4: reserved::<20>(0x8005_0000),
});

static TEXT_BOX_ROM: Rom<TextBoxVTable> = Rom(TextBoxVTable {
    reserved0: reserved::<32>(0x8010_0000),
    set_text: Slot::new(0, text_box_set_text as SetTextFn),
});

fn dialog_rom() -> *mut DialogVTable {
    ptr::addr_of!(DIALOG_ROM.0).cast_mut()
}

fn text_box_rom() -> *mut TextBoxVTable {
    ptr::addr_of!(TEXT_BOX_ROM.0).cast_mut()
}

unsafe fn c_string(text: *const c_char) -> CString {
    if text.is_null() {
        CString::default()
    } else {
        CStr::from_ptr(text).to_owned()
    }
}

/// Initialize a dialog in `dialog`, sized from `height` and placed by `alignment`
///
/// # Safety
/// `dialog` must be null or point at a writable block of 0xA8 bytes, and
/// `title` must be null or a NUL-terminated string.
pub unsafe extern "C" fn GUI_CreateDialog(
    dialog: *mut c_void,
    height: i32,
    alignment: i32,
    title: *const c_char,
    _unknown2: i32,
    _unknown3: i32,
    keyboard: i32,
) -> *mut DialogObject {
    let (Some(height), Some(alignment)) = (Height::from_raw(height), Alignment::from_raw(alignment))
    else {
        tracing::warn!("GUI_CreateDialog: bad height {height} or alignment {alignment}");
        return ptr::null_mut();
    };
    if dialog.is_null() {
        return ptr::null_mut();
    }

    let rows = SCREEN_HEIGHT * height.percent() / 100;
    let top = match alignment {
        Alignment::Top => 0,
        Alignment::Center => (SCREEN_HEIGHT - rows) / 2,
        Alignment::Bottom => SCREEN_HEIGHT - rows,
    };

    let object = dialog.cast::<DialogObject>();
    object.write(DialogObject {
        reserved0: [RESERVED_FILL; 0x10],
        left_x: 0,
        top_y: top,
        right_x: SCREEN_WIDTH - 1,
        bottom_y: top + rows - 1,
        reserved1: [RESERVED_FILL; 0x34],
        vtable: dialog_rom(),
        reserved2: [RESERVED_FILL; DIALOG_TAIL],
    });

    let title = c_string(title).to_string_lossy().into_owned();
    tracing::trace!("GUI_CreateDialog {:p} {:?}", object, title);
    with_device(|device| {
        device.dialogs.insert(
            object as usize,
            SimDialog {
                title,
                keyboard,
                ..SimDialog::default()
            },
        )
    });
    object
}

/// Initialize a text box in `text_box`
///
/// # Safety
/// `text_box` must be null or point at a writable block of 0xA0 bytes, and
/// `text` must be null or a NUL-terminated string.
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn GUI_CreateTextBox(
    text_box: *mut c_void,
    _x: i32,
    _y: i32,
    _width: i32,
    text: *const c_char,
    _unknown0: i32,
    _flags: i32,
    max_length: i32,
    count_length_by_bytes: bool,
) -> *mut TextBoxObject {
    if text_box.is_null() {
        return ptr::null_mut();
    }

    let object = text_box.cast::<TextBoxObject>();
    let state = SimTextBox {
        text: c_string(text),
        max_length,
        count_by_bytes: count_length_by_bytes,
    };
    let text = state.text.as_ptr();

    object.write(TextBoxObject {
        reserved0: [RESERVED_FILL; 0x4C],
        vtable: text_box_rom(),
        reserved1: [RESERVED_FILL; 4],
        text,
        reserved2: [RESERVED_FILL; TEXT_BOX_TAIL],
    });

    with_device(|device| device.text_boxes.insert(object as usize, state));
    object
}

/// Display a message box whose strings come from the string table
///
/// The simulator has no string table; only the ids are recorded.
///
/// # Safety
/// No requirements; declared `unsafe` like its firmware counterpart.
pub unsafe extern "C" fn GUI_DisplayMessageBox(_unknown: i32, title_string_id: i32, content_string_id: i32) {
    tracing::trace!("GUI_DisplayMessageBox {title_string_id} {content_string_id}");
    with_device(|device| {
        device.message_boxes.push(MessageBoxRecord {
            string_ids: Some((title_string_id, content_string_id)),
            buttons: romshadow_common::BUTTON_OK,
            ..MessageBoxRecord::default()
        })
    });
}

/// Display a message box with the given strings and buttons
///
/// # Safety
/// Each string must be null or NUL-terminated.
pub unsafe extern "C" fn GUI_DisplayMessageBox_Internal(
    _unknown: i32,
    title_string: *const c_char,
    content_prefix: *const c_char,
    content_string: *const c_char,
    buttons: i32,
    disable_close_button: bool,
) -> *mut c_void {
    let record = MessageBoxRecord {
        title: c_string(title_string).to_string_lossy().into_owned(),
        prefix: c_string(content_prefix).to_string_lossy().into_owned(),
        content: c_string(content_string).to_string_lossy().into_owned(),
        string_ids: None,
        buttons,
        close_disabled: disable_close_button,
    };
    tracing::trace!("GUI_DisplayMessageBox_Internal {:?} buttons {:#x}", record.title, buttons);
    with_device(|device| device.message_boxes.push(record));
    ptr::null_mut()
}

unsafe extern "C" fn dialog_on_event(dialog: *mut DialogObject, event: *mut EventData) -> i32 {
    let kind = (*event).kind;
    with_dialog(dialog, |d| {
        d.default_events.push(kind);
        if kind == EVENT_CLOSE {
            d.closed = true;
        }
    });
    0
}

unsafe extern "C" fn dialog_add_element(dialog: *mut DialogObject, element: *mut c_void, _unknown0: i32) {
    with_dialog(dialog, |d| d.elements.push(element as usize));
}

unsafe extern "C" fn dialog_refresh(dialog: *mut DialogObject) {
    with_dialog(dialog, |d| d.refreshes += 1);
}

unsafe extern "C" fn dialog_show(dialog: *mut DialogObject) {
    with_dialog(dialog, |d| d.closed = false);

    loop {
        let next = with_dialog(dialog, |d| if d.closed { None } else { d.input.pop_front() }).flatten();
        let Some(event) = next else {
            if with_dialog(dialog, |d| !d.closed).unwrap_or(false) {
                tracing::warn!("dialog {:p} ran out of input before closing", dialog);
            }
            break;
        };

        // No borrow of the device is held here: the handler may call back in
        let status = deliver(dialog, event);

        let closed = with_dialog(dialog, |d| {
            d.statuses.push(status);
            d.closed
        })
        .unwrap_or(true);
        if closed {
            break;
        }
    }
}

unsafe extern "C" fn text_box_set_text(text_box: *mut TextBoxObject, text: *const c_char) {
    let text = c_string(text);
    let text = text.to_string_lossy();

    let updated = with_device(|device| {
        let state = device.text_boxes.get_mut(&(text_box as usize))?;
        let limit = usize::try_from(state.max_length).unwrap_or(0);
        let mut kept = String::new();
        for (count, ch) in text.chars().enumerate() {
            let over = if state.count_by_bytes {
                kept.len() + ch.len_utf8() > limit
            } else {
                count >= limit
            };
            if over {
                break;
            }
            kept.push(ch);
        }
        state.text = CString::new(kept).ok()?;
        Some(state.text.as_ptr())
    });

    if let Some(text) = updated {
        ptr::addr_of_mut!((*text_box).text).write_unaligned(text);
    }
}
