use super::*;
use crate::narration::controller::tests::ScriptedEngine;
use crate::narration::engine::{SpeechEngine, SpeechOutcome};
use std::sync::Arc;
use tokio::sync::mpsc;


pub(super) const PORTFOLIO: &str = "https://jane.design";
pub(super) const LINKEDIN: &str = "https://www.linkedin.com/in/jane";
pub(super) const PITCH: &str = "Hi, I'm Jane and I design calm interfaces.";

/// A funnel wired to a test engine, recording every effect it emits
pub(super) struct Harness {
    pub funnel: Funnel,
    pub engine: Arc<ScriptedEngine>,
    pub signals: mpsc::UnboundedReceiver<SpeechSignal>,
    pub effects: Vec<Effect>,
}

impl Harness {
    pub fn new() -> Self {
        let engine = Arc::new(ScriptedEngine::default());
        let (funnel, signals) = funnel_with(engine.clone());
        Self {
            funnel,
            engine,
            signals,
            effects: Vec::new(),
        }
    }

    /// Feeds one input and returns the effects it produced
    pub fn send(&mut self, input: Input) -> Vec<Effect> {
        let effects = self.funnel.handle(input);
        self.effects.extend(effects.iter().cloned());
        effects
    }

    /// Mounts and loads the portfolio successfully
    pub fn loaded() -> Self {
        let mut harness = Self::new();
        harness.send(Input::Mount);
        harness.send(Input::Frame(FrameReport::loaded(1)));
        harness
    }

    /// Ends the pending utterance and feeds its signal back
    pub fn speech_ends(&mut self, outcome: SpeechOutcome) -> Vec<Effect> {
        self.engine.finish(outcome);
        let mut effects = Vec::new();
        while let Ok(signal) = self.signals.try_recv() {
            effects.extend(self.send(Input::Speech(signal)));
        }
        effects
    }

    pub fn prompts(&self) -> Vec<u64> {
        self.effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::ShowPrompt { lifecycle, .. } => Some(*lifecycle),
                _ => None,
            })
            .collect()
    }
}

pub(super) fn package() -> PitchPackage {
    PitchPackage::new(PORTFOLIO, LINKEDIN, PITCH).unwrap()
}

pub(super) fn funnel_with(
    engine: Arc<dyn SpeechEngine>,
) -> (Funnel, mpsc::UnboundedReceiver<SpeechSignal>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let funnel = Funnel::new(
        package(),
        EmbedLoader::default(),
        NarrationController::new(engine, tx),
    );
    (funnel, rx)
}
