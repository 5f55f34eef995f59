use std::future::Future;
use thiserror::Error;
use tokio::sync::mpsc;

/// Signal raised by the embedded frame itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// The frame's document finished loading
    Loaded,
    /// Network or DNS level failure
    Failed(String),
}

/// A frame signal tagged with the load it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameReport {
    pub generation: u64,
    pub event: FrameEvent,
}

impl FrameReport {
    pub fn loaded(generation: u64) -> Self {
        Self {
            generation,
            event: FrameEvent::Loaded,
        }
    }

    pub fn failed(generation: u64, reason: impl Into<String>) -> Self {
        Self {
            generation,
            event: FrameEvent::Failed(reason.into()),
        }
    }
}

/// What introspecting the frame's document found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentAccess {
    /// Same-origin document is readable: the load is just slow
    Accessible,
    /// Access threw, the remote host forbids framing
    Blocked,
    /// No frame or no document at all
    Absent,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("no WebDriver server reachable (tried {0})")]
    Unreachable(String),

    #[error("WebDriver command failed: {0}")]
    Command(#[from] fantoccini::error::CmdError),

    #[error("unexpected frame probe result: {0}")]
    UnexpectedProbe(String),
}

/// Surface that displays the portfolio in a sandboxed embedded frame.
///
/// Implementations report load success or failure through `events`, tagged
/// with the `generation` they were navigated with.
pub trait EmbeddedFrame: Send {
    /// Points the frame at `url`. Returns once the navigation is issued.
    fn navigate(
        &mut self,
        url: &str,
        generation: u64,
        events: mpsc::UnboundedSender<FrameReport>,
    ) -> impl Future<Output = Result<(), FrameError>> + Send;

    /// Tries to read the frame's document.
    ///
    /// `Err` means the surface itself could not be asked, which says nothing
    /// about the remote host's framing policy.
    fn probe(&mut self) -> impl Future<Output = Result<DocumentAccess, FrameError>> + Send;

    /// Releases the frame; no reports are sent afterwards
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}
