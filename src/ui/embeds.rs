use serenity::builder::{CreateEmbed, CreateEmbedFooter};

use crate::audio::{queue::QueuePage, track::QueuedSound};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Open Instants Bot";

/// Embed de "reproduciendo ahora" con los metadatos raspados del instant.
pub fn now_playing_embed(sound: &QueuedSound) -> CreateEmbed {
    let body = match &sound.description {
        Some(desc) => format!("```css\n{}\n```\n{}", sound.title, desc),
        None => format!("```css\n{}\n```", sound.title),
    };

    let mut embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(body)
        .color(colors::MUSIC_PURPLE)
        .field("👤 Pedido por", format!("<@{}>", sound.requester), true)
        .field("🔗 URL", format!("[Abrir]({})", sound.source_url), true)
        .thumbnail(&sound.thumbnail_url)
        .timestamp(sound.enqueued_at)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER));

    embed = match &sound.uploader_url {
        Some(url) => embed.field(
            "📤 Subido por",
            format!("[{}]({})", sound.uploader_name, url),
            true,
        ),
        None => embed.field("📤 Subido por", &sound.uploader_name, true),
    };

    if let Some(views) = &sound.view_count {
        embed = embed.field("👁️ Vistas", views, true);
    }
    if let Some(likes) = &sound.like_count {
        embed = embed.field("👍 Likes", likes, true);
    }

    embed
}

/// Listado paginado de la cola.
pub fn queue_embed(page: &QueuePage) -> CreateEmbed {
    let listing = if page.items.is_empty() {
        "*(nada en esta página)*".to_string()
    } else {
        page.items
            .iter()
            .enumerate()
            .map(|(i, sound)| {
                format!(
                    "`{}.` [**{}**]({})",
                    page.start_index + i + 1,
                    sound.title,
                    sound.source_url
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    CreateEmbed::default()
        .title("📋 Cola de sonidos")
        .description(format!("**{} sonidos:**\n\n{}", page.total_items, listing))
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(format!(
            "Viendo página {}/{}",
            page.current_page, page.total_pages
        )))
}

/// Confirmación de encolado.
pub fn enqueued_embed(sound: &QueuedSound) -> CreateEmbed {
    CreateEmbed::default()
        .description(format!("✅ Encolado: {}", sound))
        .color(colors::SUCCESS_GREEN)
}

/// Listado de comandos disponibles.
pub fn help_embed() -> CreateEmbed {
    let commands = [
        ("/play <búsqueda>", "Reproduce un sonido de MyInstants."),
        ("/join", "Conecta el bot a tu canal de voz."),
        ("/leave", "Desconecta el bot del canal de voz."),
        ("/now", "Muestra el sonido en reproducción."),
        ("/pause", "Pausa la reproducción actual."),
        ("/resume", "Reanuda la reproducción."),
        ("/skip", "Salta el sonido actual (o vota por saltarlo)."),
        ("/queue [página]", "Muestra la cola de reproducción."),
        ("/shuffle", "Mezcla la cola."),
        ("/remove <posición>", "Elimina un sonido de la cola."),
        ("/loop", "Activa/desactiva repetir el sonido actual."),
        ("/volume <0-100>", "Ajusta el volumen de reproducción."),
    ];

    let description = commands
        .iter()
        .map(|(cmd, desc)| format!("**{cmd}**: {desc}"))
        .collect::<Vec<_>>()
        .join("\n");

    CreateEmbed::default()
        .title("Lista de comandos")
        .description(description)
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}
