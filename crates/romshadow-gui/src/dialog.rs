//! Firmware dialogs with an overridable event handler
//!
//! A [`Dialog`] wraps the firmware dialog object and shadows its dispatch
//! table so that `OnEvent` lands in a [`DialogHandler`]. [`Dialog::show`]
//! blocks inside the firmware event loop; every input event re-enters our
//! code through the trampoline, on the same stack, until the firmware sees a
//! close event.
//!
//! ```text
//! Constructed --show--> Shown --first event--> EventLoopActive --close--> Closed
//! ```

use std::cell::{Cell, Ref, RefCell};
use std::ffi::{c_void, CString};
use std::marker::PhantomPinned;
use std::mem::{offset_of, size_of};
use std::pin::Pin;
use std::ptr;

use romshadow_common::{Alignment, Height, KeyboardState};

use crate::element::{Element, ElementId, ElementList};
use crate::error::{Result, ShadowError};
use crate::foreign::ForeignRef;
use crate::layout::ForeignClass;
use crate::shadow::{owner_of, Shadow};
use crate::slot::{IdentitySlot, RawSlot, Slot};
use crate::{ffi, foreign_call};

pub type OnEventFn = unsafe extern "C" fn(*mut DialogObject, *mut EventData) -> i32;
pub type AddElementFn = unsafe extern "C" fn(*mut DialogObject, *mut c_void, i32);
pub type RefreshFn = unsafe extern "C" fn(*mut DialogObject);
pub type ShowDialogFn = unsafe extern "C" fn(*mut DialogObject);

/// Dispatch table of the firmware dialog class
#[repr(C)]
#[derive(Clone, Copy)]
pub struct DialogVTable {
    /// Zero in ROM and never read by the firmware
    pub(crate) identity: IdentitySlot,
    pub(crate) reserved0: [RawSlot; 1],
    pub on_event: Slot<OnEventFn>,
    pub(crate) reserved1: [RawSlot; 1],
    /// The trailing argument is always 0
    pub add_element: Slot<AddElementFn>,
    pub(crate) reserved2: [RawSlot; 4],
    pub refresh: Slot<RefreshFn>,
    pub(crate) reserved3: [RawSlot; 23],
    pub show_dialog: Slot<ShowDialogFn>,
    pub(crate) reserved4: [RawSlot; 20],
}

crate::dispatch_layout!(DialogVTable, name = "DialogTable", slots = 54, identity = identity);

/// Size of a dialog object on the device
pub const DIALOG_OBJECT_SIZE: usize = 0xA8;
const DIALOG_TABLE_OFFSET: usize = 0x4C;
pub(crate) const DIALOG_TAIL: usize =
    DIALOG_OBJECT_SIZE - DIALOG_TABLE_OFFSET - size_of::<*mut DialogVTable>();

/// Firmware dialog object
///
/// Only the bounds and the table pointer are known. Everything else is
/// firmware state and is never touched.
#[repr(C, packed(4))]
pub struct DialogObject {
    pub(crate) reserved0: [u8; 0x10],
    pub left_x: u16,
    pub top_y: u16,
    pub right_x: u16,
    pub bottom_y: u16,
    pub(crate) reserved1: [u8; 0x34],
    pub(crate) vtable: *mut DialogVTable,
    pub(crate) reserved2: [u8; DIALOG_TAIL],
}

crate::foreign_class!(DialogObject, name = "Dialog", table = vtable: DialogVTable, size = DIALOG_OBJECT_SIZE);

const _: () = {
    assert!(offset_of!(DialogObject, left_x) == 0x10);
    assert!(offset_of!(DialogObject, bottom_y) == 0x16);
    assert!(offset_of!(DialogObject, vtable) == DIALOG_TABLE_OFFSET);
};
#[cfg(target_pointer_width = "32")]
const _: () = assert!(DIALOG_TAIL == 0x58);

/// Event record the firmware passes to `OnEvent`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct EventData {
    pub kind: u16,
    pub aux: u16,
    /// Firmware element the event refers to, if any
    pub element: *mut c_void,
}

#[cfg(target_pointer_width = "32")]
const _: () = assert!(size_of::<EventData>() == 8);

impl EventData {
    pub fn new(kind: u16) -> Self {
        Self {
            kind,
            aux: 0,
            element: ptr::null_mut(),
        }
    }
}

/// An input event as seen by a [`DialogHandler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub kind: u16,
    pub aux: u16,
    /// The element the event refers to, when it belongs to this dialog
    pub element: Option<ElementId>,
}

/// Screen rectangle covered by a dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub left: u16,
    pub top: u16,
    pub right: u16,
    pub bottom: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogState {
    Constructed,
    Shown,
    EventLoopActive,
    Closed,
}

/// Parameters for the dialog initializer
#[derive(Debug, Clone, Copy)]
pub struct DialogParams<'a> {
    pub height: Height,
    pub alignment: Alignment,
    pub title: &'a str,
    pub keyboard: KeyboardState,
}

impl<'a> DialogParams<'a> {
    pub fn new(height: Height, alignment: Alignment, title: &'a str) -> Self {
        Self {
            height,
            alignment,
            title,
            keyboard: KeyboardState::None,
        }
    }

    pub fn keyboard(mut self, keyboard: KeyboardState) -> Self {
        self.keyboard = keyboard;
        self
    }
}

/// User logic behind a dialog's `OnEvent`
pub trait DialogHandler: 'static {
    /// Handle one input event and return the status the firmware loop gets
    ///
    /// The default forwards to the firmware's own handler.
    fn on_event(&mut self, cx: &mut EventContext<'_>, event: &Event) -> i32 {
        let _ = event;
        cx.forward()
    }
}

/// Dialog without custom logic
impl DialogHandler for () {}

/// What a handler can do while an event is being dispatched
pub struct EventContext<'a> {
    object: *mut DialogObject,
    event: *mut EventData,
    original: &'a Slot<OnEventFn>,
    elements: &'a ElementList,
}

impl EventContext<'_> {
    /// Run the firmware's own `OnEvent` for this event
    pub fn forward(&mut self) -> i32 {
        // SAFETY: the ROM slot is valid for the object it was copied from
        unsafe { foreign_call!(*self.original, self.object, self.event) }
    }

    pub fn refresh(&self) {
        // SAFETY: the object is alive for the whole dispatch
        unsafe { refresh(self.object) }
    }

    pub fn bounds(&self) -> Bounds {
        // SAFETY: as above
        unsafe { bounds(self.object) }
    }

    /// Access one of the dialog's elements by type
    pub fn with_element<E: Element, R>(&self, id: ElementId, f: impl FnOnce(&E) -> R) -> Option<R> {
        self.elements.with(id, f)
    }

    pub fn object(&self) -> *mut DialogObject {
        self.object
    }
}

/// A firmware dialog whose `OnEvent` is routed to `H`
///
/// Always lives in a `Pin<Box<_>>`: its address is stored in the identity
/// slot of the shadow table and must not change. The dialog is `!Unpin`, so
/// it can not be moved back out of the box:
///
/// ```compile_fail
/// use romshadow_common::{Alignment, Height};
/// use romshadow_gui::{Dialog, DialogParams};
///
/// let dialog = Dialog::new(DialogParams::new(Height::Percent25, Alignment::Top, "t"), ()).unwrap();
/// let moved: Dialog<()> = *std::pin::Pin::into_inner(dialog);
/// ```
pub struct Dialog<H: DialogHandler> {
    // Field order is drop order: unlink the shadow, then free the object,
    // then the elements the firmware object pointed at.
    shadow: Shadow<DialogObject>,
    object: ForeignRef<DialogObject>,
    elements: ElementList,
    handler: RefCell<H>,
    state: Cell<DialogState>,
    _title: CString,
    _pin: PhantomPinned,
}

impl<H: DialogHandler> Dialog<H> {
    /// Build the firmware dialog and route its `OnEvent` to `handler`
    pub fn new(params: DialogParams<'_>, handler: H) -> Result<Pin<Box<Self>>> {
        let title = CString::new(params.title)
            .map_err(|_| ShadowError::InteriorNul(params.title.to_string()))?;

        // SAFETY: GUI_CreateDialog initializes a full dialog in the block
        let object = unsafe {
            ForeignRef::init(|block| {
                ffi::GUI_CreateDialog(
                    block,
                    params.height.raw(),
                    params.alignment.raw(),
                    title.as_ptr(),
                    0,
                    0,
                    params.keyboard.raw(),
                )
            })?
        };

        // SAFETY: the object is owned by the dialog and outlives the shadow
        let mut shadow = unsafe { Shadow::copy_of(object.as_non_null())? };
        shadow.install(|table| &mut table.on_event, on_event_trampoline::<H> as OnEventFn)?;

        let raw = Box::into_raw(Box::new(Self {
            shadow,
            object,
            elements: ElementList::default(),
            handler: RefCell::new(handler),
            state: Cell::new(DialogState::Constructed),
            _title: title,
            _pin: PhantomPinned,
        }));

        // The owner recorded in the identity slot and every later access
        // derive from `raw`; no reference to the whole dialog is taken here.
        // SAFETY: `raw` is a live allocation only this function knows about
        let linked = unsafe {
            let shadow = ptr::addr_of_mut!((*raw).shadow);
            (*shadow)
                .set_owner(raw.cast_const())
                .and_then(|()| (*shadow).link())
        };
        // SAFETY: `raw` came from Box::into_raw above and is not used again
        let dialog = unsafe { Box::into_pin(Box::from_raw(raw)) };
        linked?;

        tracing::debug!("dialog {:?} ready at {:p}", params.title, raw);
        Ok(dialog)
    }

    pub fn left_x(&self) -> u16 {
        self.bounds().left
    }

    pub fn top_y(&self) -> u16 {
        self.bounds().top
    }

    pub fn right_x(&self) -> u16 {
        self.bounds().right
    }

    pub fn bottom_y(&self) -> u16 {
        self.bounds().bottom
    }

    pub fn bounds(&self) -> Bounds {
        // SAFETY: the object lives as long as `self`
        unsafe { bounds(self.object.as_ptr()) }
    }

    /// Hand an element to the firmware dialog
    ///
    /// The dialog takes ownership so the element outlives every pointer the
    /// firmware keeps to it.
    pub fn add_element<E: Element>(&self, element: E) -> ElementId {
        let raw = element.as_raw();
        let id = self.elements.push(Box::new(element));
        let object = self.object.as_ptr();
        // SAFETY: the object and the element are both alive
        unsafe {
            let table = DialogObject::table(object);
            foreign_call!((*table).add_element, object, raw, 0);
        }
        tracing::debug!("added element {} ({:p})", id.index(), raw);
        id
    }

    pub fn with_element<E: Element, R>(&self, id: ElementId, f: impl FnOnce(&E) -> R) -> Option<R> {
        self.elements.with(id, f)
    }

    /// Firmware address of an element, as it appears in events
    pub fn element_ptr(&self, id: ElementId) -> Option<*mut c_void> {
        self.elements.raw(id)
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub fn refresh(&self) {
        // SAFETY: the object lives as long as `self`
        unsafe { refresh(self.object.as_ptr()) }
    }

    /// Show the dialog and run the firmware event loop until it closes
    pub fn show(&self) -> Result<()> {
        if matches!(self.state.get(), DialogState::Shown | DialogState::EventLoopActive) {
            return Err(ShadowError::EventLoopActive);
        }
        self.state.set(DialogState::Shown);
        tracing::debug!("showing dialog {:p}", self);

        let object = self.object.as_ptr();
        // SAFETY: the object lives as long as `self`, and the shadow it
        // dispatches through is linked
        unsafe {
            let table = DialogObject::table(object);
            foreign_call!((*table).show_dialog, object);
        }

        self.state.set(DialogState::Closed);
        tracing::debug!("dialog {:p} closed", self);
        Ok(())
    }

    pub fn state(&self) -> DialogState {
        self.state.get()
    }

    /// The handler, for reading back what it collected
    ///
    /// Panics if called from inside the handler itself.
    pub fn handler(&self) -> Ref<'_, H> {
        self.handler.borrow()
    }

    /// Firmware object behind this dialog
    pub fn object_ptr(&self) -> *mut DialogObject {
        self.object.as_ptr()
    }

    pub fn shadow(&self) -> &Shadow<DialogObject> {
        &self.shadow
    }

    fn dispatch(&self, object: *mut DialogObject, event: *mut EventData) -> i32 {
        if self.state.get() == DialogState::Shown {
            self.state.set(DialogState::EventLoopActive);
        }

        // SAFETY: the firmware passes a valid event record
        let raw = unsafe { *event };
        let view = Event {
            kind: raw.kind,
            aux: raw.aux,
            element: self.elements.find(raw.element),
        };
        tracing::trace!(kind = view.kind, aux = view.aux, "dialog event");

        let mut cx = EventContext {
            object,
            event,
            original: &self.shadow.original().on_event,
            elements: &self.elements,
        };
        // The firmware may dispatch again while the handler runs, e.g. from
        // inside `forward`. Nested events get the firmware's own handler.
        match self.handler.try_borrow_mut() {
            Ok(mut handler) => handler.on_event(&mut cx, &view),
            Err(_) => {
                tracing::trace!(kind = view.kind, "handler busy, nested event forwarded");
                cx.forward()
            }
        }
    }
}

impl<H: DialogHandler> Drop for Dialog<H> {
    fn drop(&mut self) {
        debug_assert_ne!(
            self.state.get(),
            DialogState::EventLoopActive,
            "dialog dropped inside its own event loop"
        );
        tracing::debug!("destroying dialog {:p}", self);
    }
}

/// `OnEvent` entry for dialogs handled by `H`
///
/// The firmware passes only its own object; the owning [`Dialog`] is found
/// through the identity slot of the table that object uses.
unsafe extern "C" fn on_event_trampoline<H: DialogHandler>(
    object: *mut DialogObject,
    event: *mut EventData,
) -> i32 {
    let dialog = &*owner_of::<DialogObject, Dialog<H>>(object);
    dialog.dispatch(object, event)
}

unsafe fn refresh(object: *mut DialogObject) {
    let table = DialogObject::table(object);
    foreign_call!((*table).refresh, object)
}

unsafe fn bounds(object: *const DialogObject) -> Bounds {
    Bounds {
        left: (*object).left_x,
        top: (*object).top_y,
        right: (*object).right_x,
        bottom: (*object).bottom_y,
    }
}
