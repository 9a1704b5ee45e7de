//! # Bot Module
//!
//! Main Discord bot implementation.
//!
//! The bot is built around the [`InstantsBot`] struct which implements
//! Serenity's [`EventHandler`] trait. It owns:
//!
//! - The per-guild voice sessions through [`SessionRegistry`]
//! - The MyInstants lookup client and the sound resolver
//!
//! Command handling lives in [`handlers`]; the slash-command definitions in
//! [`commands`]. Everything voice-related is delegated to the sessions: the
//! handlers only look them up and invoke operations on them.

use anyhow::Result;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{
    audio::registry::SessionRegistry,
    config::Config,
    sources::{InstantsClient, SoundResolver},
};

/// Handler principal del bot: configuración, registro de sesiones y
/// clientes de MyInstants compartidos por todos los comandos.
pub struct InstantsBot {
    pub config: Arc<Config>,
    pub registry: Arc<SessionRegistry>,
    pub lookup: Arc<InstantsClient>,
    pub resolver: Arc<SoundResolver>,
}

impl InstantsBot {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(SessionRegistry::new(config.default_volume));
        let lookup = Arc::new(InstantsClient::new(
            config.instants_base_url.clone(),
            config.search_result_limit,
        ));

        Self {
            config,
            registry,
            lookup,
            resolver: Arc::new(SoundResolver::new()),
        }
    }

    /// Registra los comandos slash, globales o por guild según configuración.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::from(guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    /// Conecta el bot al canal de voz y devuelve el handler de songbird.
    pub async fn join_voice_channel(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<Mutex<songbird::Call>>> {
        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

        match manager.join(guild_id, channel_id).await {
            Ok(call) => {
                info!("🔊 Conectado al canal de voz en guild {}", guild_id);
                Ok(call)
            }
            Err(e) => {
                error!("Error al obtener handler de voz: {:?}", e);
                Err(anyhow::anyhow!("Error al conectar al canal de voz"))
            }
        }
    }
}

#[async_trait]
impl EventHandler for InstantsBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Limpieza cuando el bot es expulsado o desconectado a mano: la sesión
    /// del guild se elimina para que la siguiente orden cree una nueva.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id {
            return;
        }

        if old.is_some() && new.channel_id.is_none() {
            if let Some(guild_id) = new.guild_id {
                info!("🔌 Bot desconectado en guild {}", guild_id);
                self.registry.remove(guild_id).await;
            }
        }
    }
}
