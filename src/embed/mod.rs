pub mod frame;
pub mod loader;
pub mod surface;
pub mod webdriver;

pub use frame::{DocumentAccess, EmbeddedFrame, FrameError, FrameEvent, FrameReport};
pub use loader::{EmbedLoader, LoadState, LoadTicket};
