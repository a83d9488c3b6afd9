//! Session layer
//!
//! Connection lifecycle, the browser-context registry, and page handles.

pub mod connection;
pub mod page;

pub use connection::{Connection, ContextState};
pub use page::{InteractiveSession, Page, ScreenshotFormat};
