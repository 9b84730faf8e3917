//! Outbound media helpers: media-kind detection and transient local copies of
//! remote resources.

pub mod error;
pub mod fetch;
pub mod mime;

pub use {
    error::{Error, Result},
    fetch::{TransientFetcher, TransientResource},
    mime::{MediaKind, classify, extension},
};
