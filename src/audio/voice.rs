use async_trait::async_trait;
use serenity::{builder::CreateMessage, http::Http, model::id::ChannelId};
use songbird::{
    input::{HttpRequest, Input},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, warn};

use crate::{audio::track::QueuedSound, error::BotError, ui::embeds};

/// Señal de fin de pista: un canal de un solo uso por iteración del loop de
/// reproducción. La dispara el subsistema de audio al terminar la pista
/// (fin natural, stop o error); disparos posteriores se ignoran.
#[derive(Clone)]
pub struct TrackEndSignal {
    tx: Arc<parking_lot::Mutex<Option<oneshot::Sender<Option<String>>>>>,
}

/// Resuelve con `Some(reason)` si la pista terminó por un error de
/// reproducción, `None` si terminó con normalidad.
pub type TrackEndReceiver = oneshot::Receiver<Option<String>>;

impl TrackEndSignal {
    pub fn new() -> (Self, TrackEndReceiver) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Arc::new(parking_lot::Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    pub fn fire(&self, error: Option<String>) {
        if let Some(tx) = self.tx.lock().take() {
            // El receptor puede haberse descartado si la sesión se canceló.
            let _ = tx.send(error);
        }
    }
}

/// Conexión de voz de un guild, vista desde la sesión. Songbird la
/// implementa en producción; los tests usan una conexión simulada.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    /// Inicia la reproducción de `sound` con el volumen dado. `finished`
    /// debe dispararse exactamente una vez cuando la pista termine.
    async fn play(
        &self,
        sound: &QueuedSound,
        volume: f32,
        finished: TrackEndSignal,
    ) -> Result<(), BotError>;

    async fn pause(&self);
    async fn resume(&self);

    /// Detiene la pista actual. Dispara la señal de fin.
    async fn stop(&self);

    async fn is_playing(&self) -> bool;
    async fn is_paused(&self) -> bool;

    /// Cierra la conexión de voz. Idempotente.
    async fn disconnect(&self);
}

/// Implementación real sobre songbird.
pub struct SongbirdConnection {
    call: Arc<Mutex<Call>>,
    http: reqwest::Client,
    current: parking_lot::Mutex<Option<TrackHandle>>,
}

impl SongbirdConnection {
    pub fn new(call: Arc<Mutex<Call>>) -> Self {
        Self {
            call,
            http: reqwest::Client::new(),
            current: parking_lot::Mutex::new(None),
        }
    }

    fn current_track(&self) -> Option<TrackHandle> {
        self.current.lock().clone()
    }
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    async fn play(
        &self,
        sound: &QueuedSound,
        volume: f32,
        finished: TrackEndSignal,
    ) -> Result<(), BotError> {
        // El input se crea desde la URL en cada reproducción; songbird
        // decodifica con Symphonia internamente.
        let input: Input = HttpRequest::new(self.http.clone(), sound.media_url.clone()).into();

        let mut call = self.call.lock().await;
        let handle = call.play_input(input);

        let _ = handle.set_volume(volume);

        handle
            .add_event(
                Event::Track(TrackEvent::End),
                TrackEndNotifier {
                    signal: finished.clone(),
                },
            )
            .map_err(|e| BotError::Playback(format!("no se pudo registrar el evento End: {e}")))?;
        handle
            .add_event(
                Event::Track(TrackEvent::Error),
                TrackErrorNotifier { signal: finished },
            )
            .map_err(|e| {
                BotError::Playback(format!("no se pudo registrar el evento Error: {e}"))
            })?;

        *self.current.lock() = Some(handle);
        Ok(())
    }

    async fn pause(&self) {
        if let Some(track) = self.current_track() {
            let _ = track.pause();
        }
    }

    async fn resume(&self) {
        if let Some(track) = self.current_track() {
            let _ = track.play();
        }
    }

    async fn stop(&self) {
        // stop() provoca el evento End, que dispara la señal de fin.
        if let Some(track) = self.current.lock().take() {
            let _ = track.stop();
        }
    }

    async fn is_playing(&self) -> bool {
        if let Some(track) = self.current_track() {
            match track.get_info().await {
                Ok(info) => info.playing == PlayMode::Play,
                Err(_) => false,
            }
        } else {
            false
        }
    }

    async fn is_paused(&self) -> bool {
        if let Some(track) = self.current_track() {
            match track.get_info().await {
                Ok(info) => info.playing == PlayMode::Pause,
                Err(_) => false,
            }
        } else {
            false
        }
    }

    async fn disconnect(&self) {
        if let Some(track) = self.current.lock().take() {
            let _ = track.stop();
        }

        let mut call = self.call.lock().await;
        if let Err(e) = call.leave().await {
            warn!("Error al abandonar el canal de voz: {:?}", e);
        }
    }
}

/// Dispara la señal de fin cuando songbird notifica el final de la pista.
struct TrackEndNotifier {
    signal: TrackEndSignal,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        debug!("Pista terminada");
        self.signal.fire(None);
        None
    }
}

/// Propaga un fallo del dispositivo de audio como error de reproducción.
struct TrackErrorNotifier {
    signal: TrackEndSignal,
}

#[async_trait]
impl VoiceEventHandler for TrackErrorNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let reason = if let EventContext::Track(track_list) = ctx {
            track_list
                .first()
                .map(|(state, _)| format!("{:?}", state.playing))
                .unwrap_or_else(|| "error desconocido".to_string())
        } else {
            "error desconocido".to_string()
        };

        self.signal.fire(Some(reason));
        None
    }
}

/// Aviso de "reproduciendo ahora" hacia el canal de texto que originó la
/// sesión. El loop de reproducción lo invoca en cada pista.
#[async_trait]
pub trait NowPlayingNotifier: Send + Sync {
    async fn now_playing(&self, sound: &QueuedSound);
}

/// Notificador real: envía el embed al canal de texto vía la API de Discord.
pub struct ChannelNotifier {
    http: Arc<Http>,
    channel_id: ChannelId,
}

impl ChannelNotifier {
    pub fn new(http: Arc<Http>, channel_id: ChannelId) -> Self {
        Self { http, channel_id }
    }
}

#[async_trait]
impl NowPlayingNotifier for ChannelNotifier {
    async fn now_playing(&self, sound: &QueuedSound) {
        let message = CreateMessage::new().embed(embeds::now_playing_embed(sound));
        if let Err(e) = self.channel_id.send_message(&self.http, message).await {
            error!("Error al enviar el aviso de reproducción: {:?}", e);
        }
    }
}
