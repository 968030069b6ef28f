//! # castitcontrol - Diffusion vers les appareils découverts
//!
//! - [`MediaResponder`] : serveur HTTP local qui expose un fichier
//! - [`CastController`] : récepteurs Cast (HTTP + WebSocket sur le port 8008)
//! - [`DlnaController`] : renderers DLNA (SOAP AVTransport)
//!
//! Chaque contrôleur publie ses étapes sous forme de [`ControlEvent`] et
//! retourne aussi le résultat de chaque opération.
//!
//! ```no_run
//! use std::path::Path;
//! use castitcontrol::{DlnaController, DlnaSettings, ResponderSettings};
//!
//! let mut dlna = DlnaController::new(DlnaSettings::default(), ResponderSettings::default());
//! let events = dlna.subscribe();
//! dlna.cast_media("http://192.168.1.50:8080/ctl", Path::new("movie.mp4"))?;
//! for event in events.try_iter() {
//!     println!("{event:?}");
//! }
//! # Ok::<(), castitcontrol::ControlError>(())
//! ```

pub mod cast;
pub mod config_ext;
pub mod dlna;
pub mod errors;
pub mod events;
pub mod mime;
pub mod responder;
pub mod soap;

pub use cast::{CastController, CastSettings};
pub use config_ext::ControlConfigExt;
pub use dlna::{AVTRANSPORT_SERVICE, DlnaController, DlnaSettings};
pub use errors::ControlError;
pub use events::ControlEvent;
pub use mime::content_type_for;
pub use responder::{MediaResponder, ResponderSettings};
