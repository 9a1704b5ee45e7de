use thiserror::Error;

/// Errores de dominio del bot. Los recuperables se convierten en mensajes
/// al usuario en la capa de comandos; ninguno tumba el proceso.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("No estoy conectado a ningún canal de voz")]
    NotConnected,

    #[error("No se encontraron resultados para `{0}`")]
    LookupFailed(String),

    #[error("No se pudo resolver el audio: {0}")]
    ResolutionFailed(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("Fallo de reproducción: {0}")]
    Playback(String),

    #[error("Sesión terminada por inactividad")]
    IdleTimeout,
}
