use chrono::{DateTime, Utc};
use serenity::model::id::UserId;

use crate::sources::SoundDetails;

/// MyInstants no expone miniaturas propias; se usa la misma imagen fija
/// que el bot siempre ha mostrado.
pub const DEFAULT_THUMBNAIL: &str =
    "https://images-na.ssl-images-amazon.com/images/I/61LNAo2K9RL.png";

/// Un sonido resuelto y listo para reproducir, con sus metadatos de
/// presentación. Inmutable una vez construido; el stream de audio se crea
/// de forma perezosa a partir de `media_url` en cada reproducción.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedSound {
    /// URL directa al mp3 del instant.
    pub media_url: String,
    pub title: String,
    pub description: Option<String>,
    pub uploader_name: String,
    pub uploader_url: Option<String>,
    /// Página del instant en MyInstants.
    pub source_url: String,
    /// Contadores tal y como los muestra la página ("1,234 views").
    pub view_count: Option<String>,
    pub like_count: Option<String>,
    pub thumbnail_url: String,
    /// Usuario que lo encoló.
    pub requester: UserId,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedSound {
    pub fn new(
        media_url: String,
        source_url: String,
        details: SoundDetails,
        requester: UserId,
    ) -> Self {
        Self {
            title: details.title.unwrap_or_else(|| "Instant sin título".to_string()),
            description: details.description,
            uploader_name: details.uploader_name,
            uploader_url: details.uploader_url,
            view_count: details.view_count,
            like_count: details.like_count,
            thumbnail_url: DEFAULT_THUMBNAIL.to_string(),
            media_url,
            source_url,
            requester,
            enqueued_at: Utc::now(),
        }
    }
}

impl std::fmt::Display for QueuedSound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "**{}** de **{}**", self.title, self.uploader_name)
    }
}
