//! Override behavior of firmware GUI objects
//!
//! The calculator firmware implements its GUI classes in ROM, including
//! their dispatch tables. This crate lets Rust code intercept calls the
//! firmware makes through those tables:
//!
//! - [`ForeignRef`] owns the block a firmware object is initialized in
//! - [`Slot`] and [`foreign_call!`] implement the firmware calling
//!   convention (adjust `self`, then call)
//! - [`layout`] describes tables and objects, checked at compile time
//! - [`Shadow`] copies a table into writable memory, installs trampolines,
//!   and relinks the object to the copy
//! - [`Dialog`] puts it all together for the dialog class
//! - [`MessageBox`] is the one-call firmware message box
//!
//! ## Building for the device
//! ```bash
//! cargo build --release -p romshadow-gui --features rom
//! ```
//! Without `rom`, firmware entry points come from [`sim`].

pub mod dialog;
pub mod element;
pub mod error;
pub mod ffi;
pub mod foreign;
pub mod layout;
pub mod message_box;
pub mod shadow;
#[cfg(not(feature = "rom"))]
pub mod sim;
pub mod slot;
pub mod text_box;

#[doc(hidden)]
pub use tracing;

pub use dialog::{Dialog, DialogHandler, DialogParams, DialogState, Event, EventContext, EventData};
pub use element::{Element, ElementId};
pub use error::{Result, ShadowError};
pub use foreign::ForeignRef;
pub use layout::{DispatchLayout, ForeignClass, LayoutReport, ShadowLayout};
pub use message_box::MessageBox;
pub use shadow::{owner_of, Shadow};
pub use slot::{IdentitySlot, RawSlot, Slot};
pub use text_box::TextBox;
