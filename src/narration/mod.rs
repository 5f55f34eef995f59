pub mod controller;
pub mod engine;

pub use controller::{
    EndCause, NarrationController, NarrationState, SpeechSignal, StartOutcome, Terminal,
};
pub use engine::{CommandEngine, NoSpeech, SpeechEngine, SpeechOutcome, Utterance};
