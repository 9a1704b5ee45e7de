pub mod instants;

use serenity::model::id::UserId;
use tracing::debug;

pub use instants::{InstantCandidate, InstantsClient};

use crate::{audio::track::QueuedSound, error::BotError};

/// Metadatos raspados de la página de un instant. Todo lo que la página no
/// muestre queda ausente; el uploader cae en "Anonymous" como hace la web.
#[derive(Debug, Clone)]
pub struct SoundDetails {
    pub title: Option<String>,
    pub description: Option<String>,
    pub like_count: Option<String>,
    pub uploader_name: String,
    pub uploader_url: Option<String>,
    pub view_count: Option<String>,
}

impl Default for SoundDetails {
    fn default() -> Self {
        Self {
            title: None,
            description: None,
            like_count: None,
            uploader_name: "Anonymous".to_string(),
            uploader_url: None,
            view_count: None,
        }
    }
}

/// Convierte una URL de audio más sus metadatos en un [`QueuedSound`] listo
/// para encolar. Comprueba que la URL responde antes de aceptarla; el
/// decodificado real lo hace songbird en reproducción.
pub struct SoundResolver {
    http: reqwest::Client,
}

impl SoundResolver {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    pub async fn resolve(
        &self,
        media_url: String,
        source_url: String,
        details: SoundDetails,
        requester: UserId,
    ) -> Result<QueuedSound, BotError> {
        let response = self
            .http
            .head(&media_url)
            .send()
            .await
            .map_err(|e| BotError::ResolutionFailed(format!("no se pudo acceder al audio: {e}")))?;

        if !response.status().is_success() {
            return Err(BotError::ResolutionFailed(format!(
                "el servidor respondió {} para `{}`",
                response.status(),
                media_url
            )));
        }

        debug!("Audio resuelto: {}", media_url);
        Ok(QueuedSound::new(media_url, source_url, details, requester))
    }
}

impl Default for SoundResolver {
    fn default() -> Self {
        Self::new()
    }
}
