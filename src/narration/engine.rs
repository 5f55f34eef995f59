use std::path::Path;
use std::process::Stdio;
use std::sync::{Mutex, MutexGuard};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

/// Speaking rate relative to natural pace
pub const SPEECH_RATE: f32 = 0.9;

/// Voice pitch relative to the engine default
pub const SPEECH_PITCH: f32 = 1.1;

/// Output volume, 0.0 to 1.0
pub const SPEECH_VOLUME: f32 = 1.0;

/// Text to speak plus its fixed voice settings
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl Utterance {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            rate: SPEECH_RATE,
            pitch: SPEECH_PITCH,
            volume: SPEECH_VOLUME,
        }
    }
}

/// How an utterance ended, as reported by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechOutcome {
    Completed,
    Failed(String),
    Canceled,
}

/// Callback invoked exactly once when an utterance ends
pub type UtteranceDone = Box<dyn FnOnce(SpeechOutcome) + Send + 'static>;

/// A speech synthesis engine.
///
/// The engine is a process-wide resource: speaking a new utterance cancels
/// whatever was playing, whichever session started it.
pub trait SpeechEngine: Send + Sync {
    fn is_available(&self) -> bool;

    fn speak(&self, utterance: Utterance, on_done: UtteranceDone);

    /// Stops the active utterance. Its callback may or may not fire.
    fn cancel(&self);
}

/// Engine for environments without speech synthesis
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSpeech;

impl SpeechEngine for NoSpeech {
    fn is_available(&self) -> bool {
        false
    }

    fn speak(&self, _utterance: Utterance, on_done: UtteranceDone) {
        on_done(SpeechOutcome::Failed("speech synthesis is not available".into()));
    }

    fn cancel(&self) {}
}

/// Speaks through an external `espeak`-compatible program
#[derive(Debug)]
pub struct CommandEngine {
    program: String,
    active: Mutex<Option<oneshot::Sender<()>>>,
}

impl CommandEngine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            active: Mutex::new(None),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn active(&self) -> MutexGuard<'_, Option<oneshot::Sender<()>>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SpeechEngine for CommandEngine {
    fn is_available(&self) -> bool {
        let program = Path::new(&self.program);
        if program.components().count() > 1 {
            return program.is_file();
        }
        std::env::var_os("PATH")
            .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
            .unwrap_or(false)
    }

    fn speak(&self, utterance: Utterance, on_done: UtteranceDone) {
        self.cancel();

        let Ok(runtime) = Handle::try_current() else {
            on_done(SpeechOutcome::Failed("no async runtime to speak on".into()));
            return;
        };

        let (kill_tx, kill_rx) = oneshot::channel();
        *self.active() = Some(kill_tx);

        let mut command = Command::new(&self.program);
        command
            .args(espeak_args(&utterance))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        ::log::debug!(
            "Speaking {} chars with {}",
            utterance.text.chars().count(),
            self.program
        );
        runtime.spawn(async move {
            let outcome = run_utterance(command, utterance.text, kill_rx).await;
            ::log::debug!("Utterance ended: {:?}", outcome);
            on_done(outcome);
        });
    }

    fn cancel(&self) {
        if let Some(kill) = self.active().take() {
            let _ = kill.send(());
        }
    }
}

/// Maps the relative voice settings onto espeak's absolute scales
fn espeak_args(utterance: &Utterance) -> Vec<String> {
    let words_per_minute = (180.0 * utterance.rate).round() as u32;
    let pitch = (50.0 * utterance.pitch).round().clamp(0.0, 99.0) as u32;
    let amplitude = (100.0 * utterance.volume).round().clamp(0.0, 200.0) as u32;
    vec![
        "-s".into(),
        words_per_minute.to_string(),
        "-p".into(),
        pitch.to_string(),
        "-a".into(),
        amplitude.to_string(),
        "--stdin".into(),
    ]
}

async fn run_utterance(
    mut command: Command,
    text: String,
    kill_rx: oneshot::Receiver<()>,
) -> SpeechOutcome {
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => return SpeechOutcome::Failed(format!("failed to start speech: {e}")),
    };

    if let Some(mut stdin) = child.stdin.take() {
        if let Err(e) = stdin.write_all(text.as_bytes()).await {
            let _ = child.kill().await;
            return SpeechOutcome::Failed(format!("failed to send text to speech: {e}"));
        }
    }

    tokio::select! {
        status = child.wait() => match status {
            Ok(status) if status.success() => SpeechOutcome::Completed,
            Ok(status) => SpeechOutcome::Failed(format!("speech exited with {status}")),
            Err(e) => SpeechOutcome::Failed(e.to_string()),
        },
        _ = kill_rx => {
            if let Err(e) = child.kill().await {
                ::log::debug!("Speech process already gone: {}", e);
            }
            SpeechOutcome::Canceled
        }
    }
}
