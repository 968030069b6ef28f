//! Pilotage d'un renderer DLNA par son service AVTransport.

use std::path::Path;
use std::time::Duration;

use castitutils::EventBus;
use crossbeam_channel::Receiver;
use tracing::{info, warn};

use crate::errors::ControlError;
use crate::events::ControlEvent;
use crate::responder::{MediaResponder, ResponderSettings};
use crate::soap::SoapClient;

pub const AVTRANSPORT_SERVICE: &str = "urn:schemas-upnp-org:service:AVTransport:1";

#[derive(Debug, Clone)]
pub struct DlnaSettings {
    pub soap_timeout: Duration,
}

impl Default for DlnaSettings {
    fn default() -> Self {
        Self {
            soap_timeout: Duration::from_secs(10),
        }
    }
}

pub struct DlnaController {
    soap: SoapClient,
    responder_settings: ResponderSettings,
    responder: Option<MediaResponder>,
    bus: EventBus<ControlEvent>,
}

impl DlnaController {
    pub fn new(settings: DlnaSettings, responder_settings: ResponderSettings) -> Self {
        Self {
            soap: SoapClient::new(settings.soap_timeout),
            responder_settings,
            responder: None,
            bus: EventBus::new(),
        }
    }

    pub fn subscribe(&self) -> Receiver<ControlEvent> {
        self.bus.subscribe()
    }

    /// Serveur local en cours, s'il y en a un
    pub fn responder(&self) -> Option<&MediaResponder> {
        self.responder.as_ref()
    }

    /// Sert `media_path` localement puis demande au renderer de le lire :
    /// `SetAVTransportURI`, puis `Play` si la première action a réussi.
    pub fn cast_media(&mut self, control_url: &str, media_path: &Path) -> Result<(), ControlError> {
        if !media_path.is_file() {
            let err = ControlError::NotFound(media_path.to_path_buf());
            self.bus.broadcast(ControlEvent::error(err.to_string()));
            return Err(err);
        }

        // Un seul fichier servi à la fois
        self.stop_responder();
        let responder = match MediaResponder::start(media_path, &self.responder_settings) {
            Ok(responder) => responder,
            Err(e) => {
                self.bus
                    .broadcast(ControlEvent::error(format!("Cannot serve media: {}", e)));
                return Err(e);
            }
        };
        let uri = responder.url().to_string();
        self.responder = Some(responder);

        info!("📡 Casting {} to {}", uri, control_url);
        self.set_av_transport_uri(control_url, &uri)?;
        self.play(control_url)
    }

    pub fn set_av_transport_uri(&self, control_url: &str, uri: &str) -> Result<(), ControlError> {
        self.action(
            control_url,
            "SetAVTransportURI",
            &[
                ("InstanceID", "0"),
                ("CurrentURI", uri),
                ("CurrentURIMetaData", ""),
            ],
        )
    }

    pub fn play(&self, control_url: &str) -> Result<(), ControlError> {
        self.action(control_url, "Play", &[("InstanceID", "0"), ("Speed", "1")])
    }

    fn action(
        &self,
        control_url: &str,
        action: &str,
        args: &[(&str, &str)],
    ) -> Result<(), ControlError> {
        match self
            .soap
            .invoke(control_url, AVTRANSPORT_SERVICE, action, args)
        {
            Ok(_) => {
                self.bus.broadcast(ControlEvent::status(format!(
                    "SOAP action {} successful",
                    action
                )));
                Ok(())
            }
            Err(e) => {
                warn!("SOAP action {} on {} failed: {}", action, control_url, e);
                self.bus.broadcast(ControlEvent::error(format!(
                    "SOAP action {} failed: {}",
                    action, e
                )));
                Err(e)
            }
        }
    }

    fn stop_responder(&mut self) {
        if let Some(mut responder) = self.responder.take() {
            responder.stop();
        }
    }

    /// Arrête le serveur local
    pub fn shutdown(&mut self) {
        self.stop_responder();
    }
}

impl Drop for DlnaController {
    fn drop(&mut self) {
        self.shutdown();
    }
}
