use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ShadowError {
    #[error("Initializer for {class} returned a null object")]
    NullObject { class: &'static str },

    #[error("{class} object has no dispatch table")]
    NullTable { class: &'static str },

    #[error("Shadow table for {class} has no owner in its identity slot")]
    MissingOwner { class: &'static str },

    #[error("Shadow table for {class} is already linked")]
    AlreadyLinked { class: &'static str },

    #[error("Dialog event loop is already running")]
    EventLoopActive,

    #[error("Message box has {count} buttons, the firmware shows at most 3")]
    TooManyButtons { count: u32 },

    #[error("Message box has neither buttons nor a close button")]
    Unclosable,

    #[error("String passed to the firmware contains a NUL byte: {0:?}")]
    InteriorNul(String),
}

pub type Result<T> = std::result::Result<T, ShadowError>;
