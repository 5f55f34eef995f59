use crate::embed::frame::{DocumentAccess, EmbeddedFrame, FrameError, FrameReport};
use crate::embed::surface;
use fantoccini::{Client, ClientBuilder};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// How often the host page is polled for the frame's load/error signal
const FRAME_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Common WebDriver endpoints tried when the configured one is unreachable
const FALLBACK_WEBDRIVER_URLS: [&str; 4] = [
    "http://localhost:9515", // ChromeDriver default
    "http://localhost:4723", // Appium default
    "http://localhost:9222", // Chrome debug port default
    "http://127.0.0.1:4444", // Try with IP instead of localhost
];

/// Embedded frame hosted in a real browser driven over WebDriver
pub struct WebDriverFrame {
    client: Client,
    title: String,
    watcher: Option<JoinHandle<()>>,
}

impl WebDriverFrame {
    /// Connects to `webdriver_url`, falling back to common local endpoints
    pub async fn connect(webdriver_url: &str, title: &str) -> Result<Self, FrameError> {
        let client = connect_to_webdriver(webdriver_url).await?;
        Ok(Self {
            client,
            title: title.to_string(),
            watcher: None,
        })
    }

    fn stop_watcher(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

impl EmbeddedFrame for WebDriverFrame {
    async fn navigate(
        &mut self,
        url: &str,
        generation: u64,
        events: mpsc::UnboundedSender<FrameReport>,
    ) -> Result<(), FrameError> {
        self.stop_watcher();

        self.client.goto("about:blank").await?;
        let page = surface::host_page(url, &self.title);
        self.client
            .execute(
                "document.open(); document.write(arguments[0]); document.close();",
                vec![Value::String(page)],
            )
            .await?;
        ::log::debug!("Host page written for {} (generation {})", url, generation);

        let client = self.client.clone();
        self.watcher = Some(tokio::spawn(watch_frame(client, generation, events)));
        Ok(())
    }

    async fn probe(&mut self) -> Result<DocumentAccess, FrameError> {
        let result = self.client.execute(&surface::probe_script(), vec![]).await?;
        document_access(&result)
    }

    async fn close(&mut self) {
        self.stop_watcher();
        if let Err(e) = self.client.clone().close().await {
            ::log::warn!("Failed to close WebDriver session: {}", e);
        }
    }
}

impl Drop for WebDriverFrame {
    fn drop(&mut self) {
        self.stop_watcher();
    }
}

/// Maps the probe script's answer onto [`DocumentAccess`]
fn document_access(result: &Value) -> Result<DocumentAccess, FrameError> {
    match result.as_str() {
        Some("accessible") => Ok(DocumentAccess::Accessible),
        Some("blocked") => Ok(DocumentAccess::Blocked),
        Some("absent") => Ok(DocumentAccess::Absent),
        _ => Err(FrameError::UnexpectedProbe(result.to_string())),
    }
}

/// Polls the host page until the frame records a load or error signal
async fn watch_frame(
    client: Client,
    generation: u64,
    events: mpsc::UnboundedSender<FrameReport>,
) {
    let script = surface::frame_state_script();
    loop {
        tokio::time::sleep(FRAME_POLL_INTERVAL).await;
        if events.is_closed() {
            return;
        }

        let report = match client.execute(&script, vec![]).await {
            Ok(Value::String(state)) if state == "loaded" => FrameReport::loaded(generation),
            Ok(Value::String(state)) if state == "error" => {
                FrameReport::failed(generation, "the frame reported a load error")
            }
            Ok(_) => continue,
            Err(e) => {
                ::log::error!("Lost the host page while watching the frame: {}", e);
                FrameReport::failed(generation, e.to_string())
            }
        };

        ::log::trace!("Frame watcher reporting {:?}", report);
        let _ = events.send(report);
        return;
    }
}

/// Connects to the WebDriver instance
async fn connect_to_webdriver(webdriver_url: &str) -> Result<Client, FrameError> {
    match ClientBuilder::native().connect(webdriver_url).await {
        Ok(client) => {
            ::log::debug!("Connected to WebDriver at {}", webdriver_url);
            return Ok(client);
        }
        Err(e) => {
            ::log::error!(
                "Failed to connect to WebDriver at {}: {}",
                webdriver_url,
                e
            );
        }
    }

    for url in FALLBACK_WEBDRIVER_URLS.iter() {
        if *url == webdriver_url {
            continue;
        }

        ::log::info!("Trying fallback WebDriver URL: {}", url);
        if let Ok(client) = ClientBuilder::native().connect(url).await {
            ::log::debug!("Connected to fallback WebDriver at {}", url);
            return Ok(client);
        }
    }

    ::log::error!(
        "Make sure a WebDriver server is running or set the WEBDRIVER_URL environment variable"
    );
    let mut tried = vec![webdriver_url];
    tried.extend(FALLBACK_WEBDRIVER_URLS.iter().filter(|u| **u != webdriver_url));
    Err(FrameError::Unreachable(tried.join(", ")))
}
