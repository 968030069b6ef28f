//! Pilotage d'un récepteur Cast : lancement de l'application réceptrice
//! par HTTP, puis chargement du média par WebSocket (port 8008).

mod message;

pub use message::{CastMessage, LoadPayload, MEDIA_NAMESPACE, MediaInfo};

use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::thread;
use std::time::Duration;

use castitutils::EventBus;
use crossbeam_channel::Receiver;
use tracing::{debug, info, warn};
use tungstenite::{Message, WebSocket};
use ureq::Agent;

use crate::errors::ControlError;
use crate::events::ControlEvent;
use crate::mime::DEFAULT_CONTENT_TYPE;
use crate::responder::{MediaResponder, ResponderSettings};

pub const CONNECTED: &str = "Connected to cast device";
pub const DISCONNECTED: &str = "Disconnected from cast device";

#[derive(Debug, Clone)]
pub struct CastSettings {
    pub control_port: u16,
    /// Identifiant de l'application réceptrice lancée avant le LOAD
    pub receiver_app: String,
    pub websocket_path: String,
    pub connect_timeout: Duration,
}

impl Default for CastSettings {
    fn default() -> Self {
        Self {
            control_port: 8008,
            receiver_app: "CC1AD845".to_string(),
            websocket_path: "/v2/ipc".to_string(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

struct CastSession {
    device: String,
    socket: WebSocket<TcpStream>,
}

pub struct CastController {
    settings: CastSettings,
    responder_settings: ResponderSettings,
    responder: Option<MediaResponder>,
    session: Option<CastSession>,
    next_request_id: u32,
    bus: EventBus<ControlEvent>,
}

impl CastController {
    pub fn new(settings: CastSettings, responder_settings: ResponderSettings) -> Self {
        Self {
            settings,
            responder_settings,
            responder: None,
            session: None,
            next_request_id: 1,
            bus: EventBus::new(),
        }
    }

    pub fn subscribe(&self) -> Receiver<ControlEvent> {
        self.bus.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Lance l'application réceptrice puis charge `media_url`
    pub fn cast_media(&mut self, device_ip: &str, media_url: &str) -> Result<(), ControlError> {
        self.launch_receiver(device_ip);
        self.load_media(device_ip, media_url, DEFAULT_CONTENT_TYPE)
    }

    /// Sert `path` localement et le diffuse avec son type MIME
    pub fn cast_file(&mut self, device_ip: &str, path: &Path) -> Result<(), ControlError> {
        if !path.is_file() {
            let err = ControlError::NotFound(path.to_path_buf());
            self.bus.broadcast(ControlEvent::error(err.to_string()));
            return Err(err);
        }
        self.stop_responder();
        let responder = MediaResponder::start(path, &self.responder_settings).inspect_err(|e| {
            self.bus
                .broadcast(ControlEvent::error(format!("Cannot serve media: {}", e)))
        })?;
        let url = responder.url().to_string();
        let content_type = responder.content_type();
        self.responder = Some(responder);

        self.launch_receiver(device_ip);
        self.load_media(device_ip, &url, content_type)
    }

    /// POST `/apps/<receiver_app>` en arrière-plan, sans attendre ni
    /// vérifier la réponse.
    pub fn launch_receiver(&self, device_ip: &str) {
        let url = format!(
            "http://{}:{}/apps/{}",
            device_ip, self.settings.control_port, self.settings.receiver_app
        );
        let timeout = self.settings.connect_timeout;
        let spawned = thread::Builder::new()
            .name("cast-launch".into())
            .spawn(move || {
                let agent: Agent = Agent::config_builder()
                    .http_status_as_error(false)
                    .timeout_global(Some(timeout))
                    .build()
                    .into();
                match agent.post(&url).send_empty() {
                    Ok(response) => debug!("Receiver launch {} -> {}", url, response.status()),
                    Err(e) => warn!("Receiver launch {} failed: {}", url, e),
                }
            });
        if let Err(e) = spawned {
            warn!("Cannot launch receiver on {}: {}", device_ip, e);
        }
    }

    /// Envoie un LOAD sur la session WebSocket (ouverte au besoin)
    pub fn load_media(
        &mut self,
        device_ip: &str,
        media_url: &str,
        content_type: &str,
    ) -> Result<(), ControlError> {
        self.connect(device_ip).inspect_err(|e| {
            self.bus.broadcast(ControlEvent::error(e.to_string()))
        })?;

        let request_id = self.next_request_id;
        self.next_request_id += 1;
        let json = CastMessage::load(media_url, content_type, request_id).to_json()?;
        debug!("Cast LOAD #{}: {}", request_id, json);

        let sent = match self.session.as_mut() {
            Some(session) => session.socket.send(Message::text(json)).map_err(ControlError::from),
            None => Err(ControlError::WebSocket("no session".to_string())),
        };
        match sent {
            Ok(()) => {
                info!("▶️ Cast LOAD sent to {}: {}", device_ip, media_url);
                self.bus
                    .broadcast(ControlEvent::status(format!("Media loaded: {}", media_url)));
                Ok(())
            }
            Err(e) => {
                self.bus.broadcast(ControlEvent::error(e.to_string()));
                self.close_session();
                Err(e)
            }
        }
    }

    fn connect(&mut self, device_ip: &str) -> Result<(), ControlError> {
        if let Some(session) = &self.session {
            if session.device == device_ip {
                return Ok(());
            }
        }
        self.close_session();

        let port = self.settings.control_port;
        let addr = (device_ip, port)
            .to_socket_addrs()
            .map_err(|_| ControlError::Url(format!("{}:{}", device_ip, port)))?
            .next()
            .ok_or_else(|| ControlError::Url(format!("{}:{}", device_ip, port)))?;

        let stream = TcpStream::connect_timeout(&addr, self.settings.connect_timeout)?;
        stream.set_write_timeout(Some(self.settings.connect_timeout))?;
        stream.set_read_timeout(Some(self.settings.connect_timeout))?;

        let url = format!("ws://{}:{}{}", device_ip, port, self.settings.websocket_path);
        let (socket, _response) =
            tungstenite::client(url.as_str(), stream).map_err(|e| ControlError::WebSocket(e.to_string()))?;

        info!("🔗 Connected to cast device {}", url);
        self.session = Some(CastSession {
            device: device_ip.to_string(),
            socket,
        });
        self.bus.broadcast(ControlEvent::status(CONNECTED));
        Ok(())
    }

    fn close_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.socket.close(None) {
                debug!("Closing cast session: {}", e);
            }
            let _ = session.socket.flush();
            info!("Disconnected from cast device {}", session.device);
            self.bus.broadcast(ControlEvent::status(DISCONNECTED));
        }
    }

    fn stop_responder(&mut self) {
        if let Some(mut responder) = self.responder.take() {
            responder.stop();
        }
    }

    fn unsupported(&self, operation: &'static str) -> Result<(), ControlError> {
        let err = ControlError::Unsupported(operation);
        self.bus.broadcast(ControlEvent::error(err.to_string()));
        Err(err)
    }

    pub fn play(&self) -> Result<(), ControlError> {
        self.unsupported("play")
    }

    pub fn pause(&self) -> Result<(), ControlError> {
        self.unsupported("pause")
    }

    pub fn stop(&self) -> Result<(), ControlError> {
        self.unsupported("stop")
    }

    /// Ferme la session et le serveur local
    pub fn disconnect(&mut self) {
        self.close_session();
        self.stop_responder();
    }
}

impl Drop for CastController {
    fn drop(&mut self) {
        self.disconnect();
    }
}
