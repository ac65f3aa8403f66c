//! Elements placed on a dialog

use std::any::Any;
use std::cell::RefCell;
use std::ffi::c_void;

/// A firmware GUI element that can be added to a dialog
pub trait Element: Any {
    /// Address of the firmware object
    fn as_raw(&self) -> *mut c_void;

    fn as_any(&self) -> &dyn Any;
}

/// Position of an element in the dialog that owns it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(pub(crate) usize);

impl ElementId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Elements owned by a dialog
///
/// The firmware keeps raw pointers to every element added to a dialog, so
/// the dialog keeps the elements alive for as long as it exists.
#[derive(Default)]
pub(crate) struct ElementList {
    elements: RefCell<Vec<Box<dyn Element>>>,
}

impl ElementList {
    pub(crate) fn push(&self, element: Box<dyn Element>) -> ElementId {
        let mut elements = self.elements.borrow_mut();
        elements.push(element);
        ElementId(elements.len() - 1)
    }

    /// Resolve a firmware element pointer from an event
    pub(crate) fn find(&self, raw: *mut c_void) -> Option<ElementId> {
        if raw.is_null() {
            return None;
        }
        self.elements
            .borrow()
            .iter()
            .position(|e| e.as_raw() == raw)
            .map(ElementId)
    }

    pub(crate) fn with<E: Element, R>(&self, id: ElementId, f: impl FnOnce(&E) -> R) -> Option<R> {
        let elements = self.elements.borrow();
        let element = elements.get(id.0)?.as_any().downcast_ref::<E>()?;
        Some(f(element))
    }

    pub(crate) fn raw(&self, id: ElementId) -> Option<*mut c_void> {
        self.elements.borrow().get(id.0).map(|e| e.as_raw())
    }

    pub(crate) fn len(&self) -> usize {
        self.elements.borrow().len()
    }
}
