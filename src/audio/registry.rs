use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::{debug, info};

use crate::audio::{session::VoiceSession, voice::NowPlayingNotifier};

/// Registro guild → sesión de voz. Garantiza como mucho una sesión viva por
/// guild: crea en el primer uso y reemplaza de forma transparente las
/// sesiones caducadas, que nunca se devuelven a un llamante.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, Arc<VoiceSession>>,
    default_volume: f32,
}

impl SessionRegistry {
    pub fn new(default_volume: f32) -> Self {
        Self {
            sessions: DashMap::new(),
            default_volume,
        }
    }

    /// Devuelve la sesión viva del guild, creando una nueva si no existe o
    /// si la existente caducó por inactividad. El notificador solo se usa
    /// al crear: la sesión conserva el canal de texto que la originó.
    pub fn get_or_create(
        &self,
        guild_id: GuildId,
        notifier: Arc<dyn NowPlayingNotifier>,
    ) -> Arc<VoiceSession> {
        // La entrada mantiene el lock del shard hasta el final: dos
        // llamadas simultáneas para el mismo guild nunca crean dos
        // sesiones.
        match self.sessions.entry(guild_id) {
            Entry::Occupied(mut entry) => {
                if !entry.get().is_timed_out() {
                    return entry.get().clone();
                }
                debug!("Sesión caducada en guild {}, reemplazando", guild_id);
                let session = VoiceSession::spawn(guild_id, self.default_volume, notifier);
                entry.insert(session.clone());
                info!("🆕 Sesión de voz creada para guild {}", guild_id);
                session
            }
            Entry::Vacant(entry) => {
                let session = VoiceSession::spawn(guild_id, self.default_volume, notifier);
                entry.insert(session.clone());
                info!("🆕 Sesión de voz creada para guild {}", guild_id);
                session
            }
        }
    }

    /// Sesión existente sin crear una nueva. Las caducadas cuentan como
    /// inexistentes.
    pub fn get(&self, guild_id: GuildId) -> Option<Arc<VoiceSession>> {
        self.sessions
            .get(&guild_id)
            .map(|s| s.clone())
            .filter(|s| !s.is_timed_out())
    }

    /// Elimina la sesión del guild: detiene la reproducción, suelta la
    /// conexión y cancela su loop. Devuelve `false` si no había sesión.
    pub async fn remove(&self, guild_id: GuildId) -> bool {
        if let Some((_, session)) = self.sessions.remove(&guild_id) {
            session.stop().await;
            session.shutdown();
            info!("🗑️ Sesión de voz eliminada en guild {}", guild_id);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
