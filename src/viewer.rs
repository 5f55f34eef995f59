use crate::embed::frame::{EmbeddedFrame, FrameReport};
use crate::embed::loader::{DEFAULT_EMBED_TIMEOUT, EmbedLoader};
use crate::funnel::{Effect, Funnel, Input, Screen, ViewerSession};
use crate::narration::controller::{DEFAULT_SETTLE_DELAY, NarrationController, SpeechSignal};
use crate::narration::engine::SpeechEngine;
use crate::package::PitchPackage;
use serde::Serialize;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Sleep;

/// Requests a viewer can make while a session is open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerCommand {
    Start,
    Skip,
    Dismiss,
    Close,
}

/// What the viewer should render, published whenever it changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewState {
    pub screen: Screen,
    /// LinkedIn profile offered by the connect prompt while it is visible
    pub prompt: Option<String>,
    pub session: ViewerSession,
}

impl ViewState {
    fn of(funnel: &Funnel) -> Self {
        Self {
            screen: funnel.screen(),
            prompt: funnel
                .prompt_visible()
                .then(|| funnel.package().linkedin_url().to_string()),
            session: funnel.session(),
        }
    }
}

/// Builder for a viewing session of one pitch package
pub struct Viewer {
    package: PitchPackage,
    embed_timeout: Duration,
    settle_delay: Duration,
}

impl Viewer {
    pub fn new(package: PitchPackage) -> Self {
        Self {
            package,
            embed_timeout: DEFAULT_EMBED_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    /// Set how long the portfolio may stay silent before it is probed
    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    /// Set the pause between the end of speech and the connect prompt
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Mounts the session on its own task and returns a handle to drive it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open<F>(self, frame: F, engine: Arc<dyn SpeechEngine>) -> ViewerHandle
    where
        F: EmbeddedFrame + 'static,
    {
        let (speech_tx, speech_rx) = mpsc::unbounded_channel();
        let narrator = NarrationController::new(engine, speech_tx).with_settle_delay(self.settle_delay);
        let funnel = Funnel::new(self.package, EmbedLoader::new(self.embed_timeout), narrator);

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_session(funnel, frame, command_rx, speech_rx, state_tx));

        ViewerHandle {
            commands: command_tx,
            states: state_rx,
            task,
        }
    }
}

/// Handle to an open viewing session.
///
/// Dropping the handle closes the session.
pub struct ViewerHandle {
    commands: mpsc::UnboundedSender<ViewerCommand>,
    states: mpsc::UnboundedReceiver<ViewState>,
    task: JoinHandle<()>,
}

impl ViewerHandle {
    /// Returns false once the session has closed
    pub fn send(&self, command: ViewerCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn start(&self) -> bool {
        self.send(ViewerCommand::Start)
    }

    pub fn skip(&self) -> bool {
        self.send(ViewerCommand::Skip)
    }

    pub fn dismiss(&self) -> bool {
        self.send(ViewerCommand::Dismiss)
    }

    /// Waits for the next change to the view. `None` once the session is gone.
    pub async fn next_state(&mut self) -> Option<ViewState> {
        self.states.recv().await
    }

    /// Closes the session and waits for it to wind down
    pub async fn close(self) {
        let _ = self.commands.send(ViewerCommand::Close);
        if let Err(e) = self.task.await {
            ::log::error!("Viewer task failed: {}", e);
        }
    }
}

type Timer = Option<(u64, Pin<Box<Sleep>>)>;

async fn run_session<F: EmbeddedFrame>(
    mut funnel: Funnel,
    mut frame: F,
    mut commands: mpsc::UnboundedReceiver<ViewerCommand>,
    mut speech: mpsc::UnboundedReceiver<SpeechSignal>,
    states: mpsc::UnboundedSender<ViewState>,
) {
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel();
    let mut embed_timer: Timer = None;
    let mut settle_timer: Timer = None;
    let mut queue = VecDeque::from([Input::Mount]);
    let mut published: Option<ViewState> = None;

    loop {
        while let Some(input) = queue.pop_front() {
            for effect in funnel.handle(input) {
                match effect {
                    Effect::Navigate { generation, url } => {
                        if let Err(e) = frame.navigate(&url, generation, frame_tx.clone()).await {
                            ::log::error!("Failed to open portfolio {}: {}", url, e);
                            queue.push_back(Input::Frame(FrameReport::failed(
                                generation,
                                e.to_string(),
                            )));
                        }
                    }
                    Effect::ArmEmbedTimer { generation, after } => {
                        embed_timer = Some((generation, Box::pin(tokio::time::sleep(after))));
                    }
                    Effect::CancelEmbedTimer => embed_timer = None,
                    Effect::ProbeFrame { generation } => match frame.probe().await {
                        Ok(access) => queue.push_back(Input::FrameProbed { generation, access }),
                        Err(e) => {
                            ::log::error!("Failed to probe portfolio frame: {}", e);
                            queue.push_back(Input::Frame(FrameReport::failed(
                                generation,
                                e.to_string(),
                            )));
                        }
                    },
                    Effect::ScheduleSettle { lifecycle, after } => {
                        settle_timer = Some((lifecycle, Box::pin(tokio::time::sleep(after))));
                    }
                    Effect::CancelSettle => settle_timer = None,
                    Effect::ShowPrompt { .. } | Effect::HidePrompt => {}
                    Effect::Teardown => frame.close().await,
                }
            }
        }

        let state = ViewState::of(&funnel);
        if published.as_ref() != Some(&state) {
            ::log::debug!("Viewer now {:?}", state.screen);
            let _ = states.send(state.clone());
            published = Some(state);
        }
        if funnel.is_closed() {
            return;
        }

        tokio::select! {
            command = commands.recv() => queue.push_back(match command {
                Some(ViewerCommand::Start) => Input::Start,
                Some(ViewerCommand::Skip) => Input::Skip,
                Some(ViewerCommand::Dismiss) => Input::Dismiss,
                Some(ViewerCommand::Close) | None => Input::Unmount,
            }),
            Some(report) = frame_rx.recv() => queue.push_back(Input::Frame(report)),
            Some(signal) = speech.recv() => queue.push_back(Input::Speech(signal)),
            generation = expired(&mut embed_timer) => {
                embed_timer = None;
                queue.push_back(Input::EmbedTimerFired { generation });
            }
            lifecycle = expired(&mut settle_timer) => {
                settle_timer = None;
                queue.push_back(Input::SettleElapsed { lifecycle });
            }
        }
    }
}

/// Resolves with the timer's tag once it fires; never resolves when unset
async fn expired(timer: &mut Timer) -> u64 {
    match timer {
        Some((tag, sleep)) => {
            sleep.as_mut().await;
            *tag
        }
        None => std::future::pending().await,
    }
}
