use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::controller::{Event, SessionController};
use crate::error::{Result, WfdError};
use crate::listener::DisplayClientListener;
use crate::playback::PlaybackFactory;
use crate::transport::TcpTransport;

/// Well-known RTSP control port of a Wi-Fi Display source.
pub const WIFI_DISPLAY_DEFAULT_PORT: u16 = 7236;

/// Source configuration.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// How often the reaper looks for dead connections.
    pub reaper_interval: Duration,
    /// Silence allowed during playback before the sink is probed, and the
    /// time it then has to answer.
    pub keepalive_timeout: Duration,
    /// `timeout=` advertised in the `Session` header.
    pub session_timeout_secs: u64,
    /// `wfd_video_formats` selected in M4.
    pub video_formats: String,
    /// `wfd_audio_codecs` selected in M4.
    pub audio_codecs: String,
    /// SDP session name (`s=`).
    pub sdp_session_name: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            reaper_interval: Duration::from_secs(1),
            keepalive_timeout: Duration::from_secs(30),
            session_timeout_secs: 30,
            // CEA 1280x720p30, constrained high profile level 3.2.
            video_formats: "28 00 02 02 00000020 00000000 00000000 00 0000 0000 00 none none"
                .to_string(),
            // AAC stereo 48 kHz.
            audio_codecs: "AAC 00000001 00".to_string(),
            sdp_session_name: "Wi-Fi Display".to_string(),
        }
    }
}

/// Resolve the interface string given to [`WifiDisplaySource::start`].
///
/// Accepts `ip`, `ip:port`, `host` or `host:port`; the port defaults to
/// [`WIFI_DISPLAY_DEFAULT_PORT`].
pub async fn resolve_interface(interface: &str) -> Result<SocketAddr> {
    let bind_error = |reason: String| WfdError::Bind {
        interface: interface.to_string(),
        reason,
    };

    let trimmed = interface.trim();
    if trimmed.is_empty() {
        return Err(bind_error("empty interface".to_string()));
    }
    if let Ok(addr) = trimmed.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = trimmed.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, WIFI_DISPLAY_DEFAULT_PORT));
    }

    let target = if trimmed.contains(':') {
        trimmed.to_string()
    } else {
        format!("{trimmed}:{WIFI_DISPLAY_DEFAULT_PORT}")
    };
    tokio::net::lookup_host(target)
        .await
        .map_err(|e| bind_error(e.to_string()))?
        .next()
        .ok_or_else(|| bind_error("no address found".to_string()))
}

struct Running {
    local_addr: SocketAddr,
    stop: oneshot::Sender<()>,
    actor: JoinHandle<()>,
    accept: JoinHandle<()>,
    transport: TcpTransport,
}

/// Wi-Fi Display source: RTSP control plane for one sink at a time.
///
/// `start` binds the listener and spawns two tasks: the accept loop and
/// the controller actor that owns all session state. `stop` shuts both
/// down and disconnects the client with [`DisconnectReason::Normal`].
///
/// [`DisconnectReason::Normal`]: crate::DisconnectReason::Normal
pub struct WifiDisplaySource {
    config: Arc<SourceConfig>,
    playback: Arc<dyn PlaybackFactory>,
    listener: Arc<dyn DisplayClientListener>,
    running: Mutex<Option<Running>>,
}

impl WifiDisplaySource {
    pub fn new(
        config: SourceConfig,
        playback: Arc<dyn PlaybackFactory>,
        listener: Arc<dyn DisplayClientListener>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            playback,
            listener,
            running: Mutex::new(None),
        }
    }

    /// Listen on `interface` and start serving. Returns the bound address.
    pub async fn start(&self, interface: &str) -> Result<SocketAddr> {
        if self.running.lock().is_some() {
            return Err(WfdError::AlreadyRunning);
        }

        let addr = resolve_interface(interface).await?;
        let listener = TcpListener::bind(addr).await.map_err(|e| WfdError::Bind {
            interface: interface.to_string(),
            reason: e.to_string(),
        })?;
        let local_addr = listener.local_addr()?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let transport = TcpTransport::new();
        let controller = SessionController::new(
            self.config.clone(),
            Box::new(transport.clone()),
            self.playback.clone(),
            self.listener.clone(),
            events_tx.clone(),
        );

        let mut running = self.running.lock();
        if running.is_some() {
            return Err(WfdError::AlreadyRunning);
        }
        let accept = tokio::spawn(transport.clone().accept_loop(listener, events_tx));
        let actor = tokio::spawn(run_controller(
            controller,
            events_rx,
            stop_rx,
            self.config.reaper_interval,
        ));
        *running = Some(Running {
            local_addr,
            stop: stop_tx,
            actor,
            accept,
            transport,
        });

        tracing::info!(addr = %local_addr, "Wi-Fi Display source listening");
        Ok(local_addr)
    }

    /// Stop serving. Does nothing if the source is not running.
    pub async fn stop(&self) {
        let running = self.running.lock().take();
        let Some(running) = running else {
            return;
        };

        tracing::info!(addr = %running.local_addr, "source stopping");
        running.accept.abort();
        // The actor disconnects the client before it exits.
        let _ = running.stop.send(());
        if let Err(e) = running.actor.await {
            tracing::error!(error = %e, "controller task failed");
        }
        running.transport.close_all();
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().map(|running| running.local_addr)
    }
}

impl Drop for WifiDisplaySource {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.accept.abort();
            // Dropping the stop sender ends the actor.
            drop(running.stop);
        }
    }
}

/// The controller actor. Serializes inbox events and timer firings onto
/// the one [`SessionController`].
///
/// Due timers run at the top of every iteration, ahead of the next inbox
/// event, so a sink flooding the inbox cannot hold off the reaper or the
/// keep-alive. The timer arms of the `select!` only wake the loop.
async fn run_controller(
    mut controller: SessionController,
    mut events: mpsc::UnboundedReceiver<Event>,
    mut stop: oneshot::Receiver<()>,
    reaper_interval: Duration,
) {
    let mut next_reap = Instant::now() + reaper_interval;

    loop {
        let now = Instant::now();
        if now >= next_reap {
            controller.reap();
            next_reap = now + reaper_interval;
        }
        if controller.keepalive_deadline().is_some_and(|deadline| deadline <= now) {
            controller.on_keepalive_timer(now);
        }

        let keepalive = controller.keepalive_deadline();
        tokio::select! {
            biased;

            _ = &mut stop => break,
            _ = tokio::time::sleep_until(next_reap) => {}
            _ = tokio::time::sleep_until(keepalive.unwrap_or(now)), if keepalive.is_some() => {}
            event = events.recv() => match event {
                Some(event) => controller.handle_event(event, Instant::now()),
                None => break,
            },
        }
    }

    controller.shutdown();
    tracing::debug!("controller stopped");
}
