//! Driver de découverte SSDP (renderers DLNA/UPnP).
//!
//! Le thread du driver possède le socket et la table des renderers. Les
//! descriptions sont récupérées sur des threads éphémères qui renvoient leur
//! résultat par un canal ; une fois le driver arrêté, ces résultats sont
//! perdus.

mod engine;
pub mod message;

pub use engine::{SearchSchedule, SsdpEngine};
pub use message::{
    MEDIA_RENDERER_TARGET, SSDP_MULTICAST_ADDR, SSDP_PORT, SsdpKind, SsdpResponse, build_msearch,
    parse_response,
};

use std::collections::BTreeMap;
use std::net::{SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use castitutils::{EventBus, network};
use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded, unbounded};
use tracing::{debug, info, warn};

use crate::description::DescriptionFetcher;
use crate::errors::{DescriptionError, DiscoveryError};
use crate::socket;
use crate::state::{DriverState, StateCell};

const MAX_TICK: Duration = Duration::from_millis(100);
const MIN_TICK: Duration = Duration::from_millis(1);
const RECV_BUFFER: usize = 4096;

/// Événements publiés par le driver SSDP
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RendererEvent {
    /// Noms de tous les renderers connus
    RenderersUpdated(Vec<String>),
    /// Nom -> URL de contrôle AVTransport
    RendererUrlsUpdated(BTreeMap<String, String>),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct SsdpSettings {
    pub search_target: String,
    pub search_interval: Duration,
    pub max_searches: u32,
    pub mx: u32,
    pub description_timeout: Duration,
    /// Destination des M-SEARCH (239.255.255.250:1900)
    pub group: SocketAddrV4,
}

impl Default for SsdpSettings {
    fn default() -> Self {
        Self {
            search_target: MEDIA_RENDERER_TARGET.to_string(),
            search_interval: Duration::from_secs(5),
            max_searches: 8,
            mx: 3,
            description_timeout: Duration::from_secs(5),
            group: SocketAddrV4::new(SSDP_MULTICAST_ADDR, SSDP_PORT),
        }
    }
}

type FetchResult = (String, Result<String, DescriptionError>);

/// Handle du driver SSDP ; même cycle de vie que
/// [`MdnsDiscovery`](crate::MdnsDiscovery).
pub struct SsdpDiscovery {
    settings: SsdpSettings,
    fetcher: Arc<dyn DescriptionFetcher>,
    bus: EventBus<RendererEvent>,
    state: StateCell,
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl SsdpDiscovery {
    pub fn new(settings: SsdpSettings, fetcher: Arc<dyn DescriptionFetcher>) -> Self {
        Self {
            settings,
            fetcher,
            bus: EventBus::new(),
            state: StateCell::new(),
            stop_tx: None,
            worker: None,
        }
    }

    pub fn subscribe(&self) -> Receiver<RendererEvent> {
        self.bus.subscribe()
    }

    pub fn state(&self) -> DriverState {
        self.state.get()
    }

    pub fn start(&mut self) -> Result<(), DiscoveryError> {
        if self.worker.is_some() {
            return Ok(());
        }
        self.state.set(DriverState::Binding);

        let (ready_tx, ready_rx) = bounded::<Result<(), DiscoveryError>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let settings = self.settings.clone();
        let fetcher = self.fetcher.clone();
        let bus = self.bus.clone();
        let state = self.state.clone();

        let worker = thread::Builder::new()
            .name("ssdp-discovery".into())
            .spawn(move || {
                let socket = match bind(&settings) {
                    Ok(socket) => socket,
                    Err(e) => {
                        warn!("❌ SSDP: {}", e);
                        state.set(DriverState::Stopped);
                        bus.broadcast(RendererEvent::Failed(e.to_string()));
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                state.set(DriverState::Listening);
                let _ = ready_tx.send(Ok(()));

                let engine = SsdpEngine::new(
                    &settings.search_target,
                    settings.search_interval,
                    settings.max_searches,
                    Instant::now(),
                );
                let worker = Worker {
                    socket,
                    engine,
                    settings,
                    fetcher,
                    bus,
                };
                worker.run(stop_rx);
                state.set(DriverState::Stopped);
                info!("SSDP discovery stopped");
            })
            .inspect_err(|_| self.state.set(DriverState::Stopped))?;

        let ready = ready_rx.recv().unwrap_or(Err(DiscoveryError::WorkerLost));
        match ready {
            Ok(()) => {
                self.stop_tx = Some(stop_tx);
                self.worker = Some(worker);
                Ok(())
            }
            Err(e) => {
                let _ = worker.join();
                Err(e)
            }
        }
    }

    /// Arrête le thread ; les descriptions encore en cours sont ignorées.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("SSDP worker panicked");
            }
        }
        if self.state.get() != DriverState::Idle {
            self.state.set(DriverState::Stopped);
        }
    }
}

impl Drop for SsdpDiscovery {
    fn drop(&mut self) {
        self.stop();
    }
}

fn bind(settings: &SsdpSettings) -> Result<UdpSocket, DiscoveryError> {
    let socket = socket::bind_reusable(0).map_err(|source| DiscoveryError::Bind {
        address: "0.0.0.0:0".to_string(),
        source,
    })?;

    // Adhésion facultative : les réponses aux M-SEARCH arrivent en unicast
    if settings.group.ip().is_multicast() {
        let interfaces: Vec<_> = network::usable_interfaces()
            .into_iter()
            .filter(|iface| iface.multicast)
            .collect();
        match socket::join_group(&socket, *settings.group.ip(), &interfaces) {
            Ok(joined) => debug!("SSDP: {} group membership(s)", joined),
            Err(e) => warn!("SSDP: cannot join {}, NOTIFY ignored: {}", settings.group.ip(), e),
        }
    }
    if let Ok(local) = socket.local_addr() {
        info!("✅ SSDP listening on {}", local);
    }
    Ok(socket)
}

struct Worker {
    socket: UdpSocket,
    engine: SsdpEngine,
    settings: SsdpSettings,
    fetcher: Arc<dyn DescriptionFetcher>,
    bus: EventBus<RendererEvent>,
}

impl Worker {
    fn run(mut self, stop_rx: Receiver<()>) {
        let (fetch_tx, fetch_rx) = unbounded::<FetchResult>();
        let msearch = build_msearch(
            self.settings.group,
            &self.settings.search_target,
            self.settings.mx,
        );
        let mut buf = vec![0u8; RECV_BUFFER];

        loop {
            match stop_rx.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            while let Ok((location, result)) = fetch_rx.try_recv() {
                for event in self
                    .engine
                    .handle_description(&location, result, SystemTime::now())
                {
                    self.bus.broadcast(event);
                }
            }

            if self.engine.poll_search(Instant::now()) {
                match self
                    .socket
                    .send_to(msearch.as_bytes(), SocketAddr::V4(self.settings.group))
                {
                    Ok(_) => debug!(
                        "SSDP: M-SEARCH #{} sent to {}",
                        self.engine.searches_sent(),
                        self.settings.group
                    ),
                    Err(e) => warn!("SSDP: failed to send M-SEARCH: {}", e),
                }
            }

            let tick = self
                .engine
                .next_wakeup()
                .map(|at| at.saturating_duration_since(Instant::now()))
                .unwrap_or(MAX_TICK)
                .clamp(MIN_TICK, MAX_TICK);
            if let Err(e) = self.socket.set_read_timeout(Some(tick)) {
                warn!("SSDP: cannot set read timeout: {}", e);
            }

            match self.socket.recv_from(&mut buf) {
                Ok((len, from)) => {
                    if let Some(location) = self.engine.handle_datagram(&buf[..len], from) {
                        self.spawn_fetch(location, fetch_tx.clone());
                    }
                }
                Err(e) if socket::is_timeout(&e) => {}
                Err(e) => {
                    debug!("SSDP: receive error: {}", e);
                    thread::sleep(MIN_TICK);
                }
            }
        }
    }

    fn spawn_fetch(&mut self, location: String, fetch_tx: Sender<FetchResult>) {
        let fetcher = self.fetcher.clone();
        let target = location.clone();
        let spawned = thread::Builder::new()
            .name("ssdp-describe".into())
            .spawn(move || {
                let result = fetcher.fetch(&target);
                // Le driver a pu s'arrêter entre-temps
                let _ = fetch_tx.send((target, result));
            });
        if let Err(e) = spawned {
            warn!("SSDP: cannot fetch {}: {}", location, e);
            self.engine.cancel_fetch(&location);
        }
    }
}
