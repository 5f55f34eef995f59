use crate::narration::engine::{SpeechEngine, SpeechOutcome, Utterance};
use crate::settle::SettleCell;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Pause between the end of speech and the terminal signal, so the screen
/// does not jump straight from "speaking" to the prompt
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NarrationState {
    Idle,
    Speaking,
    Ended,
}

/// Why a narration lifecycle ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EndCause {
    Completed,
    Failed(String),
    /// Stopped by the viewer
    Skipped,
    /// No speech engine in this environment
    Unavailable,
}

/// Engine outcome routed back to the controller that started the utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechSignal {
    pub lifecycle: u64,
    pub outcome: SpeechOutcome,
}

/// The single terminal signal of a narration lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Terminal {
    pub lifecycle: u64,
    pub cause: EndCause,
    /// Delay before anything downstream should react
    pub settle: Duration,
}

/// Result of an explicit start request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// Speech is playing; the terminal signal arrives through [`SpeechSignal`]s
    Speaking(u64),
    /// Narration could not run and ended on the spot
    Ended(Terminal),
}

/// Speaks the pitch once per explicit start and guarantees every start ends
/// in exactly one [`Terminal`], whether speech completes, errors or is skipped.
///
/// Engine callbacks are forwarded as [`SpeechSignal`]s on the channel given
/// at construction; the owner feeds them back through
/// [`NarrationController::on_signal`].
pub struct NarrationController {
    engine: Arc<dyn SpeechEngine>,
    signals: mpsc::UnboundedSender<SpeechSignal>,
    settle_delay: Duration,
    lifecycle: u64,
    state: NarrationState,
    terminal: SettleCell<EndCause>,
}

impl NarrationController {
    pub fn new(
        engine: Arc<dyn SpeechEngine>,
        signals: mpsc::UnboundedSender<SpeechSignal>,
    ) -> Self {
        Self {
            engine,
            signals,
            settle_delay: DEFAULT_SETTLE_DELAY,
            lifecycle: 0,
            state: NarrationState::Idle,
            terminal: SettleCell::new(),
        }
    }

    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    /// Begins a new lifecycle speaking `text`.
    ///
    /// Whatever the engine was saying is canceled first. Empty text or a
    /// missing engine are logged and end the lifecycle immediately.
    pub fn start(&mut self, text: &str) -> StartOutcome {
        self.engine.cancel();
        self.lifecycle += 1;
        self.terminal.reset();
        self.state = NarrationState::Idle;

        let text = text.trim();
        if text.is_empty() {
            ::log::error!("No pitch text available");
            return self.end_now(EndCause::Failed("empty pitch text".into()));
        }
        if !self.engine.is_available() {
            ::log::warn!("Speech synthesis not available, skipping narration");
            return self.end_now(EndCause::Unavailable);
        }

        self.state = NarrationState::Speaking;
        let lifecycle = self.lifecycle;
        let signals = self.signals.clone();
        self.engine.speak(
            Utterance::new(text),
            Box::new(move |outcome| {
                let _ = signals.send(SpeechSignal { lifecycle, outcome });
            }),
        );

        ::log::debug!("Narration {} speaking", lifecycle);
        StartOutcome::Speaking(lifecycle)
    }

    /// Cancels speech and ends the lifecycle right away.
    ///
    /// Does not wait for the engine, since canceling may not raise any event.
    pub fn stop(&mut self) -> Option<Terminal> {
        if self.state != NarrationState::Speaking {
            return None;
        }
        self.engine.cancel();
        self.finish(EndCause::Skipped, Duration::ZERO)
    }

    /// Normalizes an engine outcome into the terminal signal, once
    pub fn on_signal(&mut self, signal: SpeechSignal) -> Option<Terminal> {
        if signal.lifecycle != self.lifecycle {
            ::log::trace!("Ignoring speech signal from lifecycle {}", signal.lifecycle);
            return None;
        }

        let cause = match signal.outcome {
            SpeechOutcome::Completed => EndCause::Completed,
            SpeechOutcome::Failed(reason) => {
                ::log::error!("Speech synthesis error: {}", reason);
                EndCause::Failed(reason)
            }
            SpeechOutcome::Canceled => EndCause::Failed("speech was canceled".into()),
        };
        self.finish(cause, self.settle_delay)
    }

    /// Tears the controller down: speech stops and no terminal is emitted
    pub fn shutdown(&mut self) {
        if self.state == NarrationState::Speaking {
            self.engine.cancel();
        }
        self.terminal.settle(EndCause::Skipped);
        self.state = NarrationState::Ended;
        self.lifecycle += 1;
    }

    pub fn state(&self) -> NarrationState {
        self.state
    }

    pub fn lifecycle(&self) -> u64 {
        self.lifecycle
    }

    /// Ends a lifecycle that never reached the engine
    fn end_now(&mut self, cause: EndCause) -> StartOutcome {
        self.terminal.settle(cause.clone());
        self.state = NarrationState::Ended;
        ::log::debug!("Narration {} ended before speaking: {:?}", self.lifecycle, cause);
        StartOutcome::Ended(Terminal {
            lifecycle: self.lifecycle,
            cause,
            settle: Duration::ZERO,
        })
    }

    fn finish(&mut self, cause: EndCause, settle: Duration) -> Option<Terminal> {
        if !self.terminal.settle(cause.clone()) {
            ::log::trace!("Narration {} already ended", self.lifecycle);
            return None;
        }
        self.state = NarrationState::Ended;
        ::log::debug!("Narration {} ended: {:?}", self.lifecycle, cause);
        Some(Terminal {
            lifecycle: self.lifecycle,
            cause,
            settle,
        })
    }
}

impl Drop for NarrationController {
    fn drop(&mut self) {
        if self.state == NarrationState::Speaking {
            self.engine.cancel();
        }
    }
}

impl std::fmt::Debug for NarrationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NarrationController")
            .field("lifecycle", &self.lifecycle)
            .field("state", &self.state)
            .field("settle_delay", &self.settle_delay)
            .finish()
    }
}
