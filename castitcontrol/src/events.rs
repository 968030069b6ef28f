/// Événements des drivers de contrôle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    /// Étape réussie ou changement d'état de connexion
    Status(String),
    Error(String),
}

impl ControlEvent {
    pub fn status(message: impl Into<String>) -> Self {
        ControlEvent::Status(message.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        ControlEvent::Error(message.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ControlEvent::Error(_))
    }
}
