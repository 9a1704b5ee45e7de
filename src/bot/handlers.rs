use anyhow::Result;
use serenity::{
    builder::{
        CreateInteractionResponse, CreateInteractionResponseFollowup,
        CreateInteractionResponseMessage,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    audio::{
        session::{SkipOutcome, VoiceSession},
        voice::{ChannelNotifier, SongbirdConnection},
    },
    bot::InstantsBot,
    error::BotError,
    ui::embeds,
};

const ITEMS_PER_PAGE: usize = 10;

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &InstantsBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    let result = match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await,
        "join" => handle_join(ctx, &command, bot, guild_id).await,
        "leave" => handle_leave(ctx, &command, bot, guild_id).await,
        "pause" => handle_pause(ctx, &command, bot, guild_id).await,
        "resume" => handle_resume(ctx, &command, bot, guild_id).await,
        "skip" => handle_skip(ctx, &command, bot, guild_id).await,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await,
        "now" => handle_now(ctx, &command, bot, guild_id).await,
        "shuffle" => handle_shuffle(ctx, &command, bot, guild_id).await,
        "remove" => handle_remove(ctx, &command, bot, guild_id).await,
        "loop" => handle_loop(ctx, &command, bot, guild_id).await,
        "volume" => handle_volume(ctx, &command, bot, guild_id).await,
        "help" => handle_help(ctx, &command).await,
        _ => {
            respond_ephemeral(ctx, &command, "❌ Comando no reconocido").await;
            Ok(())
        }
    };

    // Ningún error de comando tumba el bot: se registra y se avisa al
    // usuario si aún no se le había respondido.
    if let Err(e) = result {
        error!("Error manejando /{}: {:?}", command.data.name, e);
        respond_ephemeral(ctx, &command, &format!("❌ Ocurrió un error: {e}")).await;
    }

    Ok(())
}

// Handlers específicos para cada comando

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &InstantsBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "search")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Búsqueda no proporcionada"))?
        .to_string();

    let Ok(voice_channel_id) = get_user_voice_channel(ctx, guild_id, command.user.id) else {
        respond_ephemeral(ctx, command, "No estás conectado a ningún canal de voz.").await;
        return Ok(());
    };

    // Defer: buscar y resolver el instant puede tardar.
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let session = get_session(ctx, command, bot, guild_id);

    if !session.has_connection().await {
        let call = bot.join_voice_channel(ctx, guild_id, voice_channel_id).await?;
        session
            .attach_connection(Arc::new(SongbirdConnection::new(call)))
            .await;
    }

    if session.queue().len() >= bot.config.max_queue_size {
        followup_text(
            ctx,
            command,
            &format!(
                "La cola está llena (máximo {} sonidos)",
                bot.config.max_queue_size
            ),
        )
        .await;
        return Ok(());
    }

    // Búsqueda en MyInstants; sin resultados no es un error del bot.
    let candidate = match bot.lookup.first_match(&query).await {
        Ok(Some(candidate)) => candidate,
        Ok(None) => {
            followup_text(ctx, command, &BotError::LookupFailed(query).to_string()).await;
            return Ok(());
        }
        Err(e) => {
            warn!("Fallo de búsqueda en MyInstants: {:?}", e);
            followup_text(ctx, command, &BotError::LookupFailed(query).to_string()).await;
            return Ok(());
        }
    };

    let mut details = match bot.lookup.details(&candidate).await {
        Ok(details) => details,
        Err(e) => {
            warn!("Sin detalles para {}: {:?}", candidate.page_path, e);
            Default::default()
        }
    };
    if details.title.is_none() {
        details.title = Some(candidate.name.clone());
    }

    let sound = match bot
        .resolver
        .resolve(
            bot.lookup.media_url(&candidate),
            bot.lookup.page_url(&candidate),
            details,
            command.user.id,
        )
        .await
    {
        Ok(sound) => sound,
        Err(e) => {
            followup_text(ctx, command, &e.to_string()).await;
            return Ok(());
        }
    };

    let embed = embeds::enqueued_embed(&sound);
    session.queue().enqueue(sound);

    command
        .create_followup(
            &ctx.http,
            CreateInteractionResponseFollowup::new().embed(embed),
        )
        .await?;

    Ok(())
}

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &InstantsBot,
    guild_id: GuildId,
) -> Result<()> {
    let Ok(voice_channel_id) = get_user_voice_channel(ctx, guild_id, command.user.id) else {
        respond_ephemeral(ctx, command, "No estás conectado a ningún canal de voz.").await;
        return Ok(());
    };

    let session = get_session(ctx, command, bot, guild_id);
    let call = bot.join_voice_channel(ctx, guild_id, voice_channel_id).await?;
    session
        .attach_connection(Arc::new(SongbirdConnection::new(call)))
        .await;

    respond_text(ctx, command, "🔊 Conectado al canal de voz").await;
    Ok(())
}

async fn handle_leave(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &InstantsBot,
    guild_id: GuildId,
) -> Result<()> {
    let connected = match bot.registry.get(guild_id) {
        Some(session) => session.has_connection().await,
        None => false,
    };

    if !connected {
        respond_text(ctx, command, &BotError::NotConnected.to_string()).await;
        return Ok(());
    }

    respond_text(ctx, command, "👋 Saliendo del canal de voz").await;
    bot.registry.remove(guild_id).await;
    Ok(())
}

async fn handle_pause(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &InstantsBot,
    guild_id: GuildId,
) -> Result<()> {
    let session = get_session(ctx, command, bot, guild_id);

    match session.pause().await {
        Ok(true) => respond_text(ctx, command, "⏸️ Sonido pausado").await,
        Ok(false) => respond_text(ctx, command, "No hay nada sonando ahora mismo.").await,
        Err(e) => respond_text(ctx, command, &e.to_string()).await,
    }

    Ok(())
}

async fn handle_resume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &InstantsBot,
    guild_id: GuildId,
) -> Result<()> {
    let session = get_session(ctx, command, bot, guild_id);

    match session.resume().await {
        Ok(true) => respond_text(ctx, command, "▶️ Sonido reanudado").await,
        Ok(false) => respond_text(ctx, command, "No hay nada pausado.").await,
        Err(e) => respond_text(ctx, command, &e.to_string()).await,
    }

    Ok(())
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &InstantsBot,
    guild_id: GuildId,
) -> Result<()> {
    let session = get_session(ctx, command, bot, guild_id);

    let message = match session.vote_skip(command.user.id).await {
        SkipOutcome::Skipped => "⏭️ Saltando el sonido actual.".to_string(),
        SkipOutcome::VoteRecorded { votes, required } => {
            format!("Voto registrado, vamos **{votes}/{required}**")
        }
        SkipOutcome::AlreadyVoted => "Ya has votado por saltar este sonido.".to_string(),
        SkipOutcome::NotPlaying => "No hay nada sonando ahora mismo...".to_string(),
    };

    respond_text(ctx, command, &message).await;
    Ok(())
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &InstantsBot,
    guild_id: GuildId,
) -> Result<()> {
    let page = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "page")
        .and_then(|opt| opt.value.as_i64())
        .unwrap_or(1)
        .max(1) as usize;

    let session = get_session(ctx, command, bot, guild_id);

    if session.queue().is_empty() {
        respond_text(ctx, command, "La cola está vacía.").await;
        return Ok(());
    }

    let queue_page = session.queue().page(page, ITEMS_PER_PAGE);
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().embed(embeds::queue_embed(&queue_page)),
            ),
        )
        .await?;

    Ok(())
}

async fn handle_now(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &InstantsBot,
    guild_id: GuildId,
) -> Result<()> {
    let session = get_session(ctx, command, bot, guild_id);

    match session.current() {
        Some(sound) => {
            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .embed(embeds::now_playing_embed(&sound)),
                    ),
                )
                .await?;
        }
        None => respond_text(ctx, command, "❌ No hay nada reproduciéndose actualmente").await,
    }

    Ok(())
}

async fn handle_shuffle(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &InstantsBot,
    guild_id: GuildId,
) -> Result<()> {
    let session = get_session(ctx, command, bot, guild_id);

    if session.queue().is_empty() {
        respond_text(ctx, command, "La cola está vacía.").await;
        return Ok(());
    }

    session.queue().shuffle();
    respond_text(ctx, command, "🔀 Cola mezclada").await;
    Ok(())
}

async fn handle_remove(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &InstantsBot,
    guild_id: GuildId,
) -> Result<()> {
    let index = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "index")
        .and_then(|opt| opt.value.as_i64())
        .ok_or_else(|| anyhow::anyhow!("Posición no proporcionada"))?;

    let session = get_session(ctx, command, bot, guild_id);

    if session.queue().is_empty() {
        respond_text(ctx, command, "La cola está vacía.").await;
        return Ok(());
    }

    if index < 1 {
        respond_text(ctx, command, "La posición debe ser 1 o mayor.").await;
        return Ok(());
    }

    match session.queue().remove_at(index as usize - 1) {
        Ok(sound) => {
            respond_text(
                ctx,
                command,
                &format!("🗑️ Eliminado **{}** de la posición {index}", sound.title),
            )
            .await
        }
        Err(e) => respond_text(ctx, command, &e.to_string()).await,
    }

    Ok(())
}

async fn handle_loop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &InstantsBot,
    guild_id: GuildId,
) -> Result<()> {
    let session = get_session(ctx, command, bot, guild_id);

    let message = if session.toggle_loop() {
        "🔂 Repetición activada"
    } else {
        "➡️ Repetición desactivada"
    };

    respond_text(ctx, command, message).await;
    Ok(())
}

async fn handle_volume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &InstantsBot,
    guild_id: GuildId,
) -> Result<()> {
    let level = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "level")
        .and_then(|opt| opt.value.as_i64())
        .ok_or_else(|| anyhow::anyhow!("Nivel de volumen no proporcionado"))?;

    let session = get_session(ctx, command, bot, guild_id);

    // Fuera de 0-100 se rechaza con mensaje; nunca se recorta en silencio.
    match session.set_volume(level) {
        Ok(_) => respond_text(ctx, command, &format!("🔊 Volumen ajustado a {level}%")).await,
        Err(e) => respond_text(ctx, command, &e.to_string()).await,
    }

    Ok(())
}

async fn handle_help(ctx: &Context, command: &CommandInteraction) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embeds::help_embed())
                    .ephemeral(true),
            ),
        )
        .await?;

    Ok(())
}

// Funciones auxiliares

/// Sesión del guild, creada si hace falta con el canal de texto del comando
/// como destino de los avisos de "reproduciendo ahora".
fn get_session(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &InstantsBot,
    guild_id: GuildId,
) -> Arc<VoiceSession> {
    let notifier = Arc::new(ChannelNotifier::new(ctx.http.clone(), command.channel_id));
    bot.registry.get_or_create(guild_id, notifier)
}

fn get_user_voice_channel(
    ctx: &Context,
    guild_id: GuildId,
    user_id: UserId,
) -> Result<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow::anyhow!("Guild no encontrada en caché"))?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or_else(|| anyhow::anyhow!("Debes estar en un canal de voz"))?;

    Ok(channel_id)
}

async fn respond_text(ctx: &Context, command: &CommandInteraction, text: &str) {
    let response = CreateInteractionResponse::Message(
        CreateInteractionResponseMessage::new().content(text),
    );
    if let Err(e) = command.create_response(&ctx.http, response).await {
        error!("Error al responder a /{}: {:?}", command.data.name, e);
    }
}

async fn respond_ephemeral(ctx: &Context, command: &CommandInteraction, text: &str) {
    let response = CreateInteractionResponse::Message(
        CreateInteractionResponseMessage::new()
            .content(text)
            .ephemeral(true),
    );
    // Si el comando ya fue diferido, la respuesta va como followup.
    if command.create_response(&ctx.http, response).await.is_err() {
        let followup = CreateInteractionResponseFollowup::new()
            .content(text)
            .ephemeral(true);
        if let Err(e) = command.create_followup(&ctx.http, followup).await {
            error!("Error al responder a /{}: {:?}", command.data.name, e);
        }
    }
}

async fn followup_text(ctx: &Context, command: &CommandInteraction, text: &str) {
    let followup = CreateInteractionResponseFollowup::new().content(text);
    if let Err(e) = command.create_followup(&ctx.http, followup).await {
        error!("Error al responder a /{}: {:?}", command.data.name, e);
    }
}
