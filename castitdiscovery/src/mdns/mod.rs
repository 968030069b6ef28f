//! Driver de découverte mDNS (récepteurs Cast).
//!
//! Un thread dédié possède le socket, l'ordonnanceur et la table
//! d'appareils. Le délai de lecture du socket sert de tick : timers et
//! datagrammes sont sérialisés sur ce thread.

mod engine;
mod scheduler;

pub use engine::MdnsEngine;
pub use scheduler::{QueryScheduler, ScheduledQuery, Stage};

use std::net::{SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use castitdns::{MDNS_IPV4_GROUP, MDNS_PORT, encode_query};
use castitutils::{EventBus, network};
use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded};
use tracing::{debug, info, warn};

use crate::classifier::{DEFAULT_SERVICE_TYPES, DeviceClassifier};
use crate::device::DiscoveredDevice;
use crate::errors::DiscoveryError;
use crate::socket;
use crate::state::{DriverState, StateCell};

/// Granularité maximale du tick
const MAX_TICK: Duration = Duration::from_millis(100);
const MIN_TICK: Duration = Duration::from_millis(1);
const RECV_BUFFER: usize = 9000;

/// Événements publiés par le driver mDNS
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MdnsEvent {
    /// Liste complète des noms d'appareils, après l'ajout d'au moins un
    DevicesUpdated(Vec<String>),
    /// Adresse IPv4 nouvelle ou modifiée
    DeviceResolved(DiscoveredDevice),
    /// Erreur fatale : le driver s'arrête
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct MdnsSettings {
    pub service_types: Vec<String>,
    pub query_interval: Duration,
    pub query_spacing: Duration,
    pub max_rounds: u32,
    /// Port local (5353)
    pub bind_port: u16,
    /// Destination des requêtes (224.0.0.251:5353)
    pub group: SocketAddrV4,
}

impl Default for MdnsSettings {
    fn default() -> Self {
        Self {
            service_types: DEFAULT_SERVICE_TYPES.iter().map(|s| s.to_string()).collect(),
            query_interval: Duration::from_secs(10),
            query_spacing: Duration::from_millis(250),
            max_rounds: 6,
            bind_port: MDNS_PORT,
            group: SocketAddrV4::new(MDNS_IPV4_GROUP, MDNS_PORT),
        }
    }
}

/// Handle du driver mDNS.
///
/// ```text
/// Idle --start--> Binding --ok--> Listening --stop--> Stopped
///                    \--bind error--> Stopped (Failed publié)
/// ```
pub struct MdnsDiscovery {
    settings: MdnsSettings,
    classifier: Arc<dyn DeviceClassifier>,
    bus: EventBus<MdnsEvent>,
    state: StateCell,
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl MdnsDiscovery {
    pub fn new(settings: MdnsSettings, classifier: Arc<dyn DeviceClassifier>) -> Self {
        Self {
            settings,
            classifier,
            bus: EventBus::new(),
            state: StateCell::new(),
            stop_tx: None,
            worker: None,
        }
    }

    /// Abonnement aux événements ; à faire avant `start` pour ne rien manquer
    pub fn subscribe(&self) -> Receiver<MdnsEvent> {
        self.bus.subscribe()
    }

    pub fn state(&self) -> DriverState {
        self.state.get()
    }

    /// Démarre le thread du driver et attend le résultat du bind.
    ///
    /// Sans effet si le driver tourne déjà ; un driver arrêté redémarre avec
    /// une table vide.
    pub fn start(&mut self) -> Result<(), DiscoveryError> {
        if self.worker.is_some() {
            return Ok(());
        }
        self.state.set(DriverState::Binding);

        let (ready_tx, ready_rx) = bounded::<Result<(), DiscoveryError>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let settings = self.settings.clone();
        let classifier = self.classifier.clone();
        let bus = self.bus.clone();
        let state = self.state.clone();

        let worker = thread::Builder::new()
            .name("mdns-discovery".into())
            .spawn(move || {
                let socket = match bind(&settings) {
                    Ok(socket) => socket,
                    Err(e) => {
                        warn!("❌ mDNS: {}", e);
                        state.set(DriverState::Stopped);
                        bus.broadcast(MdnsEvent::Failed(e.to_string()));
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                state.set(DriverState::Listening);
                let _ = ready_tx.send(Ok(()));

                let engine = MdnsEngine::new(
                    &settings,
                    classifier,
                    network::local_ipv4_addresses(),
                    Instant::now(),
                );
                run(socket, engine, settings.group, stop_rx, bus);
                state.set(DriverState::Stopped);
                info!("mDNS discovery stopped");
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

    /// Arrête le thread et ferme le socket. Idempotent.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("mDNS worker panicked");
            }
        }
        if self.state.get() != DriverState::Idle {
            self.state.set(DriverState::Stopped);
        }
    }
}

impl Drop for MdnsDiscovery {
    fn drop(&mut self) {
        self.stop();
    }
}

fn bind(settings: &MdnsSettings) -> Result<UdpSocket, DiscoveryError> {
    let socket =
        socket::bind_reusable(settings.bind_port).map_err(|source| DiscoveryError::Bind {
            address: format!("0.0.0.0:{}", settings.bind_port),
            source,
        })?;

    // Sans adhésion, aucune réponse multicast n'arrive : c'est fatal
    let group = *settings.group.ip();
    if !group.is_loopback() {
        let interfaces: Vec<_> = network::usable_interfaces()
            .into_iter()
            .filter(|iface| iface.multicast)
            .collect();
        let joined = socket::join_group(&socket, group, &interfaces).map_err(|source| {
            DiscoveryError::MulticastJoin {
                group: group.to_string(),
                source,
            }
        })?;
        info!(
            "✅ mDNS listening on port {} ({} group membership(s))",
            settings.bind_port, joined
        );
    }
    Ok(socket)
}

fn run(
    socket: UdpSocket,
    mut engine: MdnsEngine,
    group: SocketAddrV4,
    stop_rx: Receiver<()>,
    bus: EventBus<MdnsEvent>,
) {
    let mut buf = vec![0u8; RECV_BUFFER];
    loop {
        match stop_rx.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        let now = Instant::now();
        if let Some(query) = engine.poll_query(now) {
            match encode_query(&query.name, query.qtype) {
                Ok(packet) => match socket.send_to(&packet, SocketAddr::V4(group)) {
                    Ok(_) => debug!("mDNS: query {} {}", query.qtype, query.name),
                    Err(e) => warn!("mDNS: failed to send query for {}: {}", query.name, e),
                },
                Err(e) => warn!("mDNS: cannot encode query for {}: {}", query.name, e),
            }
        }

        let tick = engine
            .next_wakeup()
            .map(|at| at.saturating_duration_since(Instant::now()))
            .unwrap_or(MAX_TICK)
            .clamp(MIN_TICK, MAX_TICK);
        if let Err(e) = socket.set_read_timeout(Some(tick)) {
            warn!("mDNS: cannot set read timeout: {}", e);
        }

        match socket.recv_from(&mut buf) {
            Ok((len, from)) => {
                for event in engine.handle_datagram(&buf[..len], from, SystemTime::now()) {
                    bus.broadcast(event);
                }
            }
            Err(e) if socket::is_timeout(&e) => {}
            Err(e) => {
                debug!("mDNS: receive error: {}", e);
                thread::sleep(MIN_TICK);
            }
        }
    }
}
