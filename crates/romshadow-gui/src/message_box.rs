//! Firmware message boxes
//!
//! Unlike dialogs, message boxes need no caller-reserved block and no
//! shadow: the firmware builds, shows and destroys them in one call.

use std::ptr;

use romshadow_common::{BUTTON_ABORT, BUTTON_CANCEL, BUTTON_NO, BUTTON_OK, BUTTON_RETRY, BUTTON_YES};

use crate::error::{Result, ShadowError};
use crate::ffi;
use crate::text_box::to_cstring;

/// Every bit the firmware reads as a button
pub const BUTTON_MASK: i32 = BUTTON_OK | BUTTON_YES | BUTTON_NO | BUTTON_ABORT | BUTTON_RETRY | BUTTON_CANCEL;

/// The firmware lays out at most this many buttons
pub const MAX_BUTTONS: u32 = 3;

/// A message box with caller-supplied strings
#[derive(Debug, Clone)]
pub struct MessageBox<'a> {
    pub title: &'a str,
    /// Shown before the content
    pub prefix: Option<&'a str>,
    pub content: &'a str,
    /// `BUTTON_*` bits
    pub buttons: i32,
    pub close_button: bool,
}

impl<'a> MessageBox<'a> {
    /// Message box with an OK button and a close button
    pub fn new(title: &'a str, content: &'a str) -> Self {
        Self {
            title,
            prefix: None,
            content,
            buttons: BUTTON_OK,
            close_button: true,
        }
    }

    pub fn prefix(mut self, prefix: &'a str) -> Self {
        self.prefix = Some(prefix);
        self
    }

    pub fn buttons(mut self, buttons: i32) -> Self {
        self.buttons = buttons;
        self
    }

    pub fn close_button(mut self, enabled: bool) -> Self {
        self.close_button = enabled;
        self
    }

    /// Display the message box; returns once it is dismissed
    pub fn show(&self) -> Result<()> {
        let count = (self.buttons & BUTTON_MASK).count_ones();
        if count > MAX_BUTTONS {
            return Err(ShadowError::TooManyButtons { count });
        }
        if count == 0 && !self.close_button {
            return Err(ShadowError::Unclosable);
        }

        let title = to_cstring(self.title)?;
        let prefix = self.prefix.map(to_cstring).transpose()?;
        let content = to_cstring(self.content)?;

        tracing::debug!("message box {:?} buttons {:#x}", self.title, self.buttons);
        // SAFETY: every string is NUL-terminated and outlives the call
        unsafe {
            ffi::GUI_DisplayMessageBox_Internal(
                0,
                title.as_ptr(),
                prefix.as_ref().map_or(ptr::null(), |p| p.as_ptr()),
                content.as_ptr(),
                self.buttons,
                !self.close_button,
            );
        }
        Ok(())
    }
}

/// Display a message box whose title and content come from the firmware
/// string table
pub fn display_string_ids(title_string_id: i32, content_string_id: i32) {
    // SAFETY: takes plain integers only
    unsafe { ffi::GUI_DisplayMessageBox(0, title_string_id, content_string_id) }
}

#[cfg(all(test, not(feature = "rom")))]
mod tests {
    use super::*;
    use crate::sim;

    #[test]
    fn test_buttons_reach_firmware() {
        MessageBox::new("Quit?", "Unsaved changes will be lost")
            .prefix("Warning: ")
            .buttons(BUTTON_YES | BUTTON_NO | BUTTON_CANCEL)
            .close_button(false)
            .show()
            .unwrap();

        let record = sim::message_boxes().pop().unwrap();
        assert_eq!(record.title, "Quit?");
        assert_eq!(record.prefix, "Warning: ");
        assert_eq!(record.content, "Unsaved changes will be lost");
        assert_eq!(record.buttons, BUTTON_YES | BUTTON_NO | BUTTON_CANCEL);
        assert!(record.close_disabled);
    }

    #[test]
    fn test_button_limits() {
        let before = sim::message_boxes().len();

        let four = MessageBox::new("t", "c").buttons(BUTTON_OK | BUTTON_YES | BUTTON_NO | BUTTON_ABORT);
        assert_eq!(four.show(), Err(ShadowError::TooManyButtons { count: 4 }));

        let stuck = MessageBox::new("t", "c").buttons(0).close_button(false);
        assert_eq!(stuck.show(), Err(ShadowError::Unclosable));
        assert_eq!(sim::message_boxes().len(), before);

        // bit 4 only changes the title bar and is not a button
        MessageBox::new("t", "c").buttons(BUTTON_OK | (1 << 4)).show().unwrap();
        assert_eq!(sim::message_boxes().len(), before + 1);
    }

    #[test]
    fn test_string_table_box() {
        display_string_ids(12, 34);
        let record = sim::message_boxes().pop().unwrap();
        assert_eq!(record.string_ids, Some((12, 34)));
        assert_eq!(record.buttons, BUTTON_OK);
    }

    #[test]
    fn test_nul_in_content_is_rejected() {
        let before = sim::message_boxes().len();
        let result = MessageBox::new("t", "a\0b").show();
        assert!(matches!(result, Err(ShadowError::InteriorNul(_))));
        assert_eq!(sim::message_boxes().len(), before);
    }
}
