//! Serveur HTTP local exposant un fichier média aux appareils.
//!
//! Un seul fichier par instance, servi quel que soit le chemin demandé. Le
//! serveur axum tourne sur un runtime tokio mono-thread dans un thread
//! dédié ; l'arrêt passe par un oneshot.

use std::future::IntoFuture;
use std::net::{IpAddr, SocketAddr, TcpListener};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tokio::sync::oneshot;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::errors::ControlError;
use crate::mime::content_type_for;

/// Réglages du serveur local
#[derive(Debug, Clone, Default)]
pub struct ResponderSettings {
    /// Adresse annoncée et liée ; à défaut, l'IPv4 principale de la machine
    pub bind_address: Option<IpAddr>,
    /// 0 = port éphémère
    pub port: u16,
}

struct ServedFile {
    path: PathBuf,
    content_type: &'static str,
}

pub struct MediaResponder {
    file: Arc<ServedFile>,
    local_addr: SocketAddr,
    url: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl MediaResponder {
    /// Lie le port et démarre le serveur pour `path`.
    ///
    /// Le fichier n'est ouvert qu'à chaque requête : un fichier absent donne
    /// `404 Not Found`, pas une erreur ici.
    pub fn start(path: impl AsRef<Path>, settings: &ResponderSettings) -> Result<Self, ControlError> {
        let path = path.as_ref().to_path_buf();
        let ip = settings
            .bind_address
            .unwrap_or_else(|| IpAddr::V4(castitutils::primary_ipv4()));
        let address = SocketAddr::new(ip, settings.port);

        let listener = TcpListener::bind(address).map_err(|source| ControlError::Bind {
            address: address.to_string(),
            source,
        })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let file = Arc::new(ServedFile {
            content_type: content_type_for(&path),
            path,
        });
        let url = media_url(local_addr, &file.path);
        let app = Router::new().fallback(serve_media).with_state(file.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let worker = thread::Builder::new()
            .name("media-responder".into())
            .spawn(move || {
                runtime.block_on(async move {
                    let listener = match tokio::net::TcpListener::from_std(listener) {
                        Ok(listener) => listener,
                        Err(e) => {
                            warn!("Media responder cannot use its listener: {}", e);
                            return;
                        }
                    };
                    tokio::select! {
                        result = axum::serve(listener, app).into_future() => {
                            if let Err(e) = result {
                                warn!("Media responder stopped on error: {}", e);
                            }
                        }
                        _ = shutdown_rx => debug!("Media responder shutting down"),
                    }
                });
            })?;

        info!("✅ Serving {} at {}", file.path.display(), url);
        Ok(Self {
            file,
            local_addr,
            url,
            shutdown_tx: Some(shutdown_tx),
            worker: Some(worker),
        })
    }

    /// `http://<ip>:<port>/media/<nom encodé>`
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn content_type(&self) -> &'static str {
        self.file.content_type
    }

    pub fn path(&self) -> &Path {
        &self.file.path
    }

    /// Arrête le serveur et attend son thread. Idempotent.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Media responder thread panicked");
            }
            info!("Media responder on {} stopped", self.local_addr);
        }
    }
}

impl Drop for MediaResponder {
    fn drop(&mut self) {
        self.stop();
    }
}

fn media_url(addr: SocketAddr, path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("http://{}/media/{}", addr, urlencoding::encode(&name))
}

async fn serve_media(State(file): State<Arc<ServedFile>>, method: Method) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, "GET, HEAD")],
        )
            .into_response();
    }

    let handle = match tokio::fs::File::open(&file.path).await {
        Ok(handle) => handle,
        Err(e) => {
            warn!("Cannot open {}: {}", file.path.display(), e);
            return (StatusCode::NOT_FOUND, "File not found").into_response();
        }
    };
    let length = match handle.metadata().await {
        Ok(meta) => meta.len(),
        Err(e) => {
            warn!("Cannot stat {}: {}", file.path.display(), e);
            return (StatusCode::NOT_FOUND, "File not found").into_response();
        }
    };
    debug!("{} {} ({} bytes)", method, file.path.display(), length);

    let body = if method == Method::HEAD {
        Body::empty()
    } else {
        Body::from_stream(ReaderStream::new(handle))
    };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, file.content_type.to_string()),
            (header::CONTENT_LENGTH, length.to_string()),
            (header::CONNECTION, "close".to_string()),
        ],
        body,
    )
        .into_response()
}
