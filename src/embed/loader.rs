use crate::embed::frame::{DocumentAccess, FrameEvent, FrameReport};
use crate::settle::SettleCell;
use serde::Serialize;
use std::time::Duration;

/// How long the frame gets to signal before it is probed for an embedding block
pub const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoadState {
    Loading,
    Loaded,
    /// The frame failed outright (network, DNS)
    LoadError,
    /// The remote host refuses to be framed; terminal, never retried
    EmbedBlocked,
}

/// Work the caller must start for a fresh load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub generation: u64,
    pub url: String,
    pub timeout: Duration,
}

/// Classifies the outcome of loading one URL into the embedded frame.
///
/// Frame signals and the timeout race; the first to arrive settles the load.
/// Every load gets a new generation so signals from a previous URL, or from
/// after [`EmbedLoader::cancel`], are ignored.
#[derive(Debug)]
pub struct EmbedLoader {
    timeout: Duration,
    generation: u64,
    active: bool,
    url: Option<String>,
    state: LoadState,
    outcome: SettleCell<LoadState>,
    failure: Option<String>,
}

impl Default for EmbedLoader {
    fn default() -> Self {
        Self::new(DEFAULT_EMBED_TIMEOUT)
    }
}

impl EmbedLoader {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            generation: 0,
            active: false,
            url: None,
            state: LoadState::Loading,
            outcome: SettleCell::new(),
            failure: None,
        }
    }

    /// Starts loading `url`, discarding anything known about the previous load
    pub fn begin(&mut self, url: &str) -> LoadTicket {
        self.generation += 1;
        self.active = true;
        self.url = Some(url.to_string());
        self.state = LoadState::Loading;
        self.outcome.reset();
        self.failure = None;

        ::log::debug!("Loading {} (generation {})", url, self.generation);
        LoadTicket {
            generation: self.generation,
            url: url.to_string(),
            timeout: self.timeout,
        }
    }

    /// Applies a frame signal. Returns the new state if it caused a transition.
    pub fn on_frame(&mut self, report: FrameReport) -> Option<LoadState> {
        if !self.is_current(report.generation) {
            ::log::trace!("Ignoring stale frame report {:?}", report);
            return None;
        }

        match report.event {
            FrameEvent::Loaded => self.resolve(LoadState::Loaded),
            FrameEvent::Failed(reason) => {
                let state = self.resolve(LoadState::LoadError)?;
                ::log::warn!("Portfolio failed to load: {}", reason);
                self.failure = Some(reason);
                Some(state)
            }
        }
    }

    /// Whether an expired timer for `generation` still needs a document probe
    pub fn needs_probe(&self, generation: u64) -> bool {
        self.is_current(generation) && !self.outcome.is_settled()
    }

    /// Applies the result of probing the frame after the timeout
    pub fn on_probe(&mut self, generation: u64, access: DocumentAccess) -> Option<LoadState> {
        if !self.is_current(generation) {
            return None;
        }

        match access {
            DocumentAccess::Accessible => {
                ::log::debug!("Frame still loading after timeout, document is readable");
                None
            }
            DocumentAccess::Blocked | DocumentAccess::Absent => {
                let state = self.resolve(LoadState::EmbedBlocked)?;
                ::log::warn!(
                    "Portfolio refuses to be embedded ({:?}): {}",
                    access,
                    self.url.as_deref().unwrap_or_default()
                );
                Some(state)
            }
        }
    }

    /// Makes every pending signal and timer of the current load inert
    pub fn cancel(&mut self) {
        self.active = false;
        self.generation += 1;
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Reason given by the frame for a [`LoadState::LoadError`]
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.active && generation == self.generation
    }

    fn resolve(&mut self, state: LoadState) -> Option<LoadState> {
        if !self.outcome.settle(state) {
            ::log::trace!("Load already settled, dropping {:?}", state);
            return None;
        }
        ::log::debug!("Load settled as {:?}", state);
        self.state = state;
        Some(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> (EmbedLoader, u64) {
        let mut loader = EmbedLoader::default();
        let ticket = loader.begin("https://jane.dev/");
        assert_eq!(ticket.timeout, DEFAULT_EMBED_TIMEOUT);
        (loader, ticket.generation)
    }

    #[test]
    fn test_load_beats_timer() {
        let (mut loader, generation) = started();
        assert_eq!(
            loader.on_frame(FrameReport::loaded(generation)),
            Some(LoadState::Loaded)
        );
        assert!(!loader.needs_probe(generation));
        assert_eq!(loader.on_probe(generation, DocumentAccess::Blocked), None);
        assert_eq!(loader.state(), LoadState::Loaded);
    }

    #[test]
    fn test_error_signal() {
        let (mut loader, generation) = started();
        assert_eq!(
            loader.on_frame(FrameReport::failed(generation, "dns")),
            Some(LoadState::LoadError)
        );
        assert_eq!(loader.failure(), Some("dns"));
        assert_eq!(loader.on_frame(FrameReport::loaded(generation)), None);
        assert_eq!(loader.state(), LoadState::LoadError);
    }

    #[test]
    fn test_silent_frame_is_blocked_not_stuck() {
        let (mut loader, generation) = started();
        assert!(loader.needs_probe(generation));
        assert_eq!(
            loader.on_probe(generation, DocumentAccess::Blocked),
            Some(LoadState::EmbedBlocked)
        );

        let (mut loader, generation) = started();
        assert_eq!(
            loader.on_probe(generation, DocumentAccess::Absent),
            Some(LoadState::EmbedBlocked)
        );
    }

    #[test]
    fn test_blocked_is_terminal() {
        let (mut loader, generation) = started();
        loader.on_probe(generation, DocumentAccess::Blocked);
        assert_eq!(loader.on_frame(FrameReport::loaded(generation)), None);
        assert_eq!(loader.state(), LoadState::EmbedBlocked);
    }

    #[test]
    fn test_readable_document_is_a_slow_load() {
        let (mut loader, generation) = started();
        assert_eq!(loader.on_probe(generation, DocumentAccess::Accessible), None);
        assert_eq!(loader.state(), LoadState::Loading);
        assert_eq!(
            loader.on_frame(FrameReport::loaded(generation)),
            Some(LoadState::Loaded)
        );
    }

    #[test]
    fn test_url_change_discards_previous_load() {
        let (mut loader, old) = started();
        loader.on_frame(FrameReport::failed(old, "refused"));

        let ticket = loader.begin("https://jane.dev/v2");
        assert_ne!(ticket.generation, old);
        assert_eq!(loader.state(), LoadState::Loading);
        assert_eq!(loader.failure(), None);

        assert_eq!(loader.on_probe(old, DocumentAccess::Blocked), None);
        assert!(!loader.needs_probe(old));
        assert_eq!(
            loader.on_frame(FrameReport::loaded(ticket.generation)),
            Some(LoadState::Loaded)
        );
    }

    #[test]
    fn test_cancel_makes_everything_inert() {
        let (mut loader, generation) = started();
        loader.cancel();
        assert!(!loader.needs_probe(generation));
        assert_eq!(loader.on_frame(FrameReport::loaded(generation)), None);
        assert_eq!(
            loader.on_probe(generation, DocumentAccess::Blocked),
            None
        );
        assert_eq!(loader.state(), LoadState::Loading);
    }

    #[test]
    fn test_reports_before_begin_are_ignored() {
        let mut loader = EmbedLoader::default();
        assert_eq!(loader.on_frame(FrameReport::loaded(0)), None);
    }
}
