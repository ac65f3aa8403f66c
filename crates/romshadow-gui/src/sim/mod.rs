//! Host-side stand-in for the calculator firmware
//!
//! Provides the initializers and ROM dispatch tables the device would, so
//! dialogs can be built, shadowed, and shown on a development machine. Each
//! thread gets its own simulated device; tests running in parallel never see
//! each other's objects.
//!
//! Conventions of the simulator (the real firmware's are undocumented):
//! - the default `OnEvent` returns 0 and closes the dialog on [`EVENT_CLOSE`]
//! - `ShowDialog` pulls events queued with [`queue_input`] and stops once the
//!   dialog is closed or the queue runs dry
//! - every reserved byte of a new object is set to [`RESERVED_FILL`]

pub mod rom;

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::ffi::{c_void, CString};
use std::ptr;

use crate::dialog::{DialogObject, EventData};
use crate::foreign_call;
use crate::layout::ForeignClass;

/// Event type the default handler treats as "close"
pub const EVENT_CLOSE: u16 = 0x0010;

/// Byte written to every reserved region of a simulated object
pub const RESERVED_FILL: u8 = 0xA5;

#[derive(Debug, Default)]
pub(crate) struct SimDialog {
    pub(crate) title: String,
    pub(crate) keyboard: i32,
    pub(crate) elements: Vec<usize>,
    pub(crate) refreshes: u32,
    pub(crate) default_events: Vec<u16>,
    pub(crate) statuses: Vec<i32>,
    pub(crate) closed: bool,
    pub(crate) input: VecDeque<EventData>,
}

#[derive(Debug, Default)]
pub(crate) struct SimTextBox {
    pub(crate) text: CString,
    pub(crate) max_length: i32,
    pub(crate) count_by_bytes: bool,
}

/// A message box the simulated firmware was asked to display
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageBoxRecord {
    pub title: String,
    pub prefix: String,
    pub content: String,
    /// String table ids, for boxes displayed through `GUI_DisplayMessageBox`
    pub string_ids: Option<(i32, i32)>,
    pub buttons: i32,
    pub close_disabled: bool,
}

#[derive(Default)]
pub(crate) struct Device {
    pub(crate) dialogs: HashMap<usize, SimDialog>,
    pub(crate) text_boxes: HashMap<usize, SimTextBox>,
    pub(crate) message_boxes: Vec<MessageBoxRecord>,
}

thread_local! {
    static DEVICE: RefCell<Device> = RefCell::new(Device::default());
}

/// Run `f` against this thread's device
///
/// Must not be held across a call back into user code: dispatch re-enters
/// the firmware.
pub(crate) fn with_device<R>(f: impl FnOnce(&mut Device) -> R) -> R {
    DEVICE.with(|device| f(&mut device.borrow_mut()))
}

pub(crate) fn with_dialog<R>(dialog: *const DialogObject, f: impl FnOnce(&mut SimDialog) -> R) -> Option<R> {
    with_device(|device| device.dialogs.get_mut(&(dialog as usize)).map(f))
}

/// Forget every object created at `object`
///
/// Called when the block an object lives in is released, so a later object
/// at the same address starts from a clean slate.
pub(crate) fn release(object: *const c_void) {
    let key = object as usize;
    // The device may already be gone while the thread shuts down
    let _ = DEVICE.try_with(|device| {
        if let Ok(mut device) = device.try_borrow_mut() {
            device.dialogs.remove(&key);
            device.text_boxes.remove(&key);
        }
    });
}

/// What the simulated firmware knows about one dialog
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DialogSnapshot {
    pub title: String,
    pub keyboard: i32,
    /// Addresses of the elements added, in order
    pub elements: Vec<usize>,
    pub refreshes: u32,
    /// Event types that reached the default `OnEvent`
    pub default_events: Vec<u16>,
    /// Status returned for each event dispatched by `ShowDialog`
    pub statuses: Vec<i32>,
    pub closed: bool,
    /// Queued events not yet delivered
    pub pending: usize,
}

pub fn snapshot(dialog: *const DialogObject) -> Option<DialogSnapshot> {
    with_dialog(dialog, |d| DialogSnapshot {
        title: d.title.clone(),
        keyboard: d.keyboard,
        elements: d.elements.clone(),
        refreshes: d.refreshes,
        default_events: d.default_events.clone(),
        statuses: d.statuses.clone(),
        closed: d.closed,
        pending: d.input.len(),
    })
}

/// Message boxes displayed on this thread so far, oldest first
pub fn message_boxes() -> Vec<MessageBoxRecord> {
    with_device(|device| device.message_boxes.clone())
}

/// Queue input for the next `ShowDialog` of `dialog`
///
/// Returns `false` if the device never created that dialog.
pub fn queue_input(dialog: *const DialogObject, events: impl IntoIterator<Item = EventData>) -> bool {
    with_dialog(dialog, |d| d.input.extend(events)).is_some()
}

/// Dispatch one event to a dialog the way the firmware does
///
/// Calls whatever `OnEvent` the dialog's current table holds, so a
/// shadowed dialog ends up in its trampoline.
pub fn deliver(dialog: *mut DialogObject, event: EventData) -> i32 {
    let mut event = event;
    // SAFETY: callers pass a dialog created by this device and still alive
    unsafe {
        let table = DialogObject::table(dialog);
        foreign_call!((*table).on_event, dialog, ptr::addr_of_mut!(event))
    }
}

/// Build an input event, optionally referring to an element
pub fn event_for(kind: u16, aux: u16, element: Option<*mut c_void>) -> EventData {
    EventData {
        kind,
        aux,
        element: element.unwrap_or(ptr::null_mut()),
    }
}
