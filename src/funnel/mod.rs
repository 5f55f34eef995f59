use crate::embed::frame::{DocumentAccess, FrameReport};
use crate::embed::loader::{EmbedLoader, LoadState};
use crate::narration::controller::{
    NarrationController, NarrationState, SpeechSignal, StartOutcome, Terminal,
};
use crate::package::PitchPackage;
use crate::settle::SettleCell;
use serde::Serialize;
use std::time::Duration;

#[cfg(test)]
mod tests;

/// Something that happened to a viewing session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// The viewer appeared; start loading the portfolio
    Mount,
    Frame(FrameReport),
    EmbedTimerFired { generation: u64 },
    FrameProbed { generation: u64, access: DocumentAccess },
    /// The viewer asked to hear the pitch
    Start,
    /// The viewer skipped the rest of the pitch
    Skip,
    Speech(SpeechSignal),
    SettleElapsed { lifecycle: u64 },
    /// The viewer closed the connect prompt
    Dismiss,
    /// The viewer went away
    Unmount,
}

/// Work the funnel asks its driver to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Navigate { generation: u64, url: String },
    ArmEmbedTimer { generation: u64, after: Duration },
    CancelEmbedTimer,
    ProbeFrame { generation: u64 },
    ScheduleSettle { lifecycle: u64, after: Duration },
    CancelSettle,
    ShowPrompt { lifecycle: u64, linkedin_url: String },
    HidePrompt,
    /// Release the frame
    Teardown,
}

/// What the viewer currently shows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Screen {
    Loading,
    /// Portfolio visible, pitch not playing
    Ready,
    Narrating,
    /// Narration over for now; may be restarted
    Finished,
    /// Offer to go back to the composer
    LoadFailed { reason: String },
    /// Offer to open the portfolio in a new tab instead
    EmbedBlocked { portfolio_url: String },
    Closed,
}

/// Snapshot of a session's runtime state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ViewerSession {
    pub load_state: LoadState,
    pub narration_state: NarrationState,
    pub prompt_shown: bool,
}

/// Decides what is on screen and shows the connect prompt exactly once per
/// narration lifecycle.
///
/// The funnel does no IO: [`Funnel::handle`] takes an [`Input`] and returns
/// the [`Effect`]s to carry out. Narration cannot start until the portfolio
/// has loaded, and a failed or blocked load never narrates.
#[derive(Debug)]
pub struct Funnel {
    package: PitchPackage,
    loader: EmbedLoader,
    narrator: NarrationController,
    pending_settle: Option<u64>,
    prompt: SettleCell<u64>,
    prompt_visible: bool,
    closed: bool,
}

impl Funnel {
    pub fn new(package: PitchPackage, loader: EmbedLoader, narrator: NarrationController) -> Self {
        Self {
            package,
            loader,
            narrator,
            pending_settle: None,
            prompt: SettleCell::new(),
            prompt_visible: false,
            closed: false,
        }
    }

    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        if self.closed {
            ::log::trace!("Session closed, ignoring {:?}", input);
            return Vec::new();
        }

        match input {
            Input::Mount => {
                let ticket = self.loader.begin(self.package.portfolio_url());
                vec![
                    Effect::Navigate {
                        generation: ticket.generation,
                        url: ticket.url,
                    },
                    Effect::ArmEmbedTimer {
                        generation: ticket.generation,
                        after: ticket.timeout,
                    },
                ]
            }
            Input::Frame(report) => match self.loader.on_frame(report) {
                Some(_) => vec![Effect::CancelEmbedTimer],
                None => Vec::new(),
            },
            Input::EmbedTimerFired { generation } => {
                if self.loader.needs_probe(generation) {
                    vec![Effect::ProbeFrame { generation }]
                } else {
                    Vec::new()
                }
            }
            Input::FrameProbed { generation, access } => {
                self.loader.on_probe(generation, access);
                Vec::new()
            }
            Input::Start => self.start(),
            Input::Skip => match self.narrator.stop() {
                Some(terminal) => self.on_terminal(terminal),
                None => Vec::new(),
            },
            Input::Speech(signal) => match self.narrator.on_signal(signal) {
                Some(terminal) => self.on_terminal(terminal),
                None => Vec::new(),
            },
            Input::SettleElapsed { lifecycle } => {
                if self.pending_settle != Some(lifecycle) {
                    return Vec::new();
                }
                self.pending_settle = None;
                self.show_prompt(lifecycle)
            }
            Input::Dismiss => {
                if !self.prompt_visible {
                    return Vec::new();
                }
                self.prompt_visible = false;
                vec![Effect::HidePrompt]
            }
            Input::Unmount => {
                ::log::debug!("Viewer unmounted");
                self.closed = true;
                self.narrator.shutdown();
                self.loader.cancel();
                self.pending_settle = None;
                self.prompt_visible = false;
                vec![Effect::CancelEmbedTimer, Effect::CancelSettle, Effect::Teardown]
            }
        }
    }

    fn start(&mut self) -> Vec<Effect> {
        if self.loader.state() != LoadState::Loaded {
            ::log::warn!(
                "Ignoring pitch start while portfolio is {:?}",
                self.loader.state()
            );
            return Vec::new();
        }
        if self.narrator.state() == NarrationState::Speaking || self.pending_settle.is_some() {
            ::log::debug!("Ignoring pitch start, narration already running");
            return Vec::new();
        }

        let mut effects = Vec::new();
        if self.prompt_visible {
            self.prompt_visible = false;
            effects.push(Effect::HidePrompt);
        }
        self.prompt.reset();

        match self.narrator.start(self.package.pitch_text()) {
            StartOutcome::Speaking(lifecycle) => {
                ::log::info!("Pitch narration {} started", lifecycle);
            }
            StartOutcome::Ended(terminal) => effects.extend(self.on_terminal(terminal)),
        }
        effects
    }

    fn on_terminal(&mut self, terminal: Terminal) -> Vec<Effect> {
        if terminal.settle.is_zero() {
            return self.show_prompt(terminal.lifecycle);
        }
        self.pending_settle = Some(terminal.lifecycle);
        vec![Effect::ScheduleSettle {
            lifecycle: terminal.lifecycle,
            after: terminal.settle,
        }]
    }

    fn show_prompt(&mut self, lifecycle: u64) -> Vec<Effect> {
        if lifecycle != self.narrator.lifecycle() || !self.prompt.settle(lifecycle) {
            ::log::trace!("Prompt for narration {} already handled", lifecycle);
            return Vec::new();
        }
        self.prompt_visible = true;
        ::log::info!("Showing connect prompt");
        vec![Effect::ShowPrompt {
            lifecycle,
            linkedin_url: self.package.linkedin_url().to_string(),
        }]
    }

    pub fn screen(&self) -> Screen {
        if self.closed {
            return Screen::Closed;
        }
        match self.loader.state() {
            LoadState::Loading => Screen::Loading,
            LoadState::LoadError => Screen::LoadFailed {
                reason: self
                    .loader
                    .failure()
                    .unwrap_or("Failed to load portfolio. Please check the URL.")
                    .to_string(),
            },
            LoadState::EmbedBlocked => Screen::EmbedBlocked {
                portfolio_url: self.package.portfolio_url().to_string(),
            },
            LoadState::Loaded => match self.narrator.state() {
                NarrationState::Idle => Screen::Ready,
                NarrationState::Speaking => Screen::Narrating,
                NarrationState::Ended => Screen::Finished,
            },
        }
    }

    pub fn session(&self) -> ViewerSession {
        ViewerSession {
            load_state: self.loader.state(),
            narration_state: self.narrator.state(),
            prompt_shown: self.prompt_visible,
        }
    }

    pub fn package(&self) -> &PitchPackage {
        &self.package
    }

    pub fn prompt_visible(&self) -> bool {
        self.prompt_visible
    }

    /// Number of narration lifecycles started so far
    pub fn narrations(&self) -> u64 {
        self.narrator.lifecycle()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
