//! Extension pour construire les réglages de contrôle depuis castitconfig

use std::net::IpAddr;
use std::time::Duration;

use castitconfig::Config;
use tracing::warn;

use crate::cast::CastSettings;
use crate::dlna::DlnaSettings;
use crate::responder::ResponderSettings;

pub trait ControlConfigExt {
    /// `responder.bind_address` vide = choix automatique de l'interface
    fn responder_settings(&self) -> ResponderSettings;

    fn cast_settings(&self) -> CastSettings;

    fn dlna_settings(&self) -> DlnaSettings;
}

impl ControlConfigExt for Config {
    fn responder_settings(&self) -> ResponderSettings {
        let raw = self.get_responder_bind_address();
        let bind_address = match raw.trim() {
            "" => None,
            addr => match addr.parse::<IpAddr>() {
                Ok(ip) => Some(ip),
                Err(e) => {
                    warn!(value = %addr, "Invalid responder.bind_address ({}), using automatic choice", e);
                    None
                }
            },
        };
        ResponderSettings {
            bind_address,
            port: u16::try_from(self.get_responder_port()).unwrap_or_else(|_| {
                warn!("responder.port out of range, using an ephemeral port");
                0
            }),
        }
    }

    fn cast_settings(&self) -> CastSettings {
        let defaults = CastSettings::default();
        CastSettings {
            control_port: u16::try_from(
                self.get_u64(&["cast", "control_port"], defaults.control_port as u64),
            )
            .unwrap_or(defaults.control_port),
            receiver_app: self.get_string(&["cast", "receiver_app"], &defaults.receiver_app),
            websocket_path: self.get_string(&["cast", "websocket_path"], &defaults.websocket_path),
            connect_timeout: Duration::from_secs(self.get_u64(
                &["cast", "connect_timeout_secs"],
                defaults.connect_timeout.as_secs(),
            )),
        }
    }

    fn dlna_settings(&self) -> DlnaSettings {
        let defaults = DlnaSettings::default();
        DlnaSettings {
            soap_timeout: Duration::from_secs(
                self.get_u64(&["dlna", "soap_timeout_secs"], defaults.soap_timeout.as_secs()),
            ),
        }
    }
}
