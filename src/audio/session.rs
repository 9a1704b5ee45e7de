use parking_lot::Mutex;
use serenity::model::id::{GuildId, UserId};
use std::{collections::HashSet, sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    audio::{
        queue::SoundQueue,
        track::QueuedSound,
        voice::{NowPlayingNotifier, TrackEndSignal, VoiceConnection},
    },
    error::BotError,
};

/// Tiempo sin pista nueva tras el cual la sesión se autodestruye. Solo
/// cuenta con el modo loop desactivado: repetir la pista actual mantiene la
/// sesión viva indefinidamente.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(180);

/// Votos de usuarios distintos necesarios para forzar un skip ajeno.
pub const SKIP_VOTE_QUORUM: usize = 3;

/// Resultado de un intento de skip por votación.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipOutcome {
    /// El skip se ejecutó (solicitante original o quórum alcanzado).
    Skipped,
    /// Voto registrado, todavía por debajo del quórum.
    VoteRecorded { votes: usize, required: usize },
    /// El votante ya había votado por esta pista.
    AlreadyVoted,
    /// No hay nada en reproducción.
    NotPlaying,
}

#[derive(Debug)]
struct SessionState {
    current: Option<QueuedSound>,
    loop_enabled: bool,
    volume: f32,
    skip_votes: HashSet<UserId>,
    timed_out: bool,
}

/// Sesión de voz de un guild: posee la cola, la pista actual y el único
/// loop de reproducción. Los comandos mutan cola y flags; el loop, que corre
/// como tarea propia desde la creación, observa la cola y maneja la
/// conexión de voz. Una vez marcada como caducada la sesión no se reutiliza:
/// el registro la reemplaza.
pub struct VoiceSession {
    guild_id: GuildId,
    queue: SoundQueue,
    state: Mutex<SessionState>,
    connection: tokio::sync::Mutex<Option<Arc<dyn VoiceConnection>>>,
    notifier: Arc<dyn NowPlayingNotifier>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl VoiceSession {
    /// Crea la sesión y arranca su loop de reproducción.
    pub fn spawn(
        guild_id: GuildId,
        default_volume: f32,
        notifier: Arc<dyn NowPlayingNotifier>,
    ) -> Arc<Self> {
        let session = Arc::new(Self {
            guild_id,
            queue: SoundQueue::new(),
            state: Mutex::new(SessionState {
                current: None,
                loop_enabled: false,
                volume: default_volume,
                skip_votes: HashSet::new(),
                timed_out: false,
            }),
            connection: tokio::sync::Mutex::new(None),
            notifier,
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        });

        let handle = tokio::spawn(Self::playback_loop(session.clone()));
        *session.task.lock() = Some(handle);

        session
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn queue(&self) -> &SoundQueue {
        &self.queue
    }

    pub async fn attach_connection(&self, conn: Arc<dyn VoiceConnection>) {
        *self.connection.lock().await = Some(conn);
    }

    pub async fn has_connection(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    pub fn current(&self) -> Option<QueuedSound> {
        self.state.lock().current.clone()
    }

    pub async fn is_playing(&self) -> bool {
        self.has_connection().await && self.current().is_some()
    }

    pub fn is_timed_out(&self) -> bool {
        self.state.lock().timed_out
    }

    pub fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    /// Fija el volumen a partir de un porcentaje 0-100. Fuera de rango se
    /// rechaza sin tocar el valor actual; se aplica a partir de la
    /// siguiente pista.
    pub fn set_volume(&self, percent: i64) -> Result<f32, BotError> {
        if !(0..=100).contains(&percent) {
            return Err(BotError::InvalidArgument(
                "El volumen debe estar entre 0 y 100".to_string(),
            ));
        }

        let volume = percent as f32 / 100.0;
        self.state.lock().volume = volume;
        Ok(volume)
    }

    pub fn loop_enabled(&self) -> bool {
        self.state.lock().loop_enabled
    }

    pub fn toggle_loop(&self) -> bool {
        let mut state = self.state.lock();
        state.loop_enabled = !state.loop_enabled;
        state.loop_enabled
    }

    /// Pausa la pista actual. `Ok(false)` si no había nada sonando.
    pub async fn pause(&self) -> Result<bool, BotError> {
        let conn = self
            .connection
            .lock()
            .await
            .clone()
            .ok_or(BotError::NotConnected)?;

        if conn.is_playing().await {
            conn.pause().await;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Reanuda una pista pausada. `Ok(false)` si no había nada pausado.
    pub async fn resume(&self) -> Result<bool, BotError> {
        let conn = self
            .connection
            .lock()
            .await
            .clone()
            .ok_or(BotError::NotConnected)?;

        if conn.is_paused().await {
            conn.resume().await;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Salta la pista actual: limpia los votos y detiene el stream, lo que
    /// dispara la señal de fin y hace avanzar el loop. Sin pista es no-op.
    pub async fn skip(&self) {
        self.state.lock().skip_votes.clear();

        if self.is_playing().await {
            if let Some(conn) = self.connection.lock().await.clone() {
                conn.stop().await;
            }
        }
    }

    /// Skip por votación: el solicitante original salta incondicionalmente;
    /// el resto acumula un voto por votante distinto hasta el quórum.
    pub async fn vote_skip(&self, voter: UserId) -> SkipOutcome {
        if !self.is_playing().await {
            return SkipOutcome::NotPlaying;
        }

        let requester = match self.current() {
            Some(sound) => sound.requester,
            None => return SkipOutcome::NotPlaying,
        };

        if voter == requester {
            self.skip().await;
            return SkipOutcome::Skipped;
        }

        let votes = {
            let mut state = self.state.lock();
            if !state.skip_votes.insert(voter) {
                return SkipOutcome::AlreadyVoted;
            }
            state.skip_votes.len()
        };

        if votes >= SKIP_VOTE_QUORUM {
            self.skip().await;
            SkipOutcome::Skipped
        } else {
            SkipOutcome::VoteRecorded {
                votes,
                required: SKIP_VOTE_QUORUM,
            }
        }
    }

    /// Vacía la cola y suelta la conexión de voz. No cancela el loop: eso
    /// corresponde a quien destruye la sesión (ver [`shutdown`]).
    ///
    /// [`shutdown`]: VoiceSession::shutdown
    pub async fn stop(&self) {
        self.queue.clear();
        self.release_connection().await;
    }

    /// Cancela el loop de reproducción. La ruta de cancelación suelta la
    /// conexión de forma idempotente si seguía abierta.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn release_connection(&self) {
        if let Some(conn) = self.connection.lock().await.take() {
            conn.disconnect().await;
        }
    }

    /// El loop de reproducción: espera una pista (con límite de inactividad
    /// si el loop de repetición está apagado), la reproduce y se suspende
    /// hasta la señal de fin. Termina exactamente una vez, por inactividad
    /// o por cancelación.
    async fn playback_loop(self: Arc<Self>) {
        loop {
            let (replay, loop_enabled) = {
                let state = self.state.lock();
                let replay = if state.loop_enabled {
                    state.current.clone()
                } else {
                    None
                };
                (replay, state.loop_enabled)
            };

            let sound = match replay {
                Some(sound) => sound,
                None if loop_enabled => {
                    // Con repetición activa la inactividad no caduca la
                    // sesión, haya o no pista que repetir.
                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            self.release_connection().await;
                            return;
                        }
                        sound = self.queue.pop_front_or_wait() => sound,
                    }
                }
                None => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            self.release_connection().await;
                            return;
                        }
                        popped = tokio::time::timeout(IDLE_TIMEOUT, self.queue.pop_front_or_wait()) => {
                            match popped {
                                Ok(sound) => sound,
                                Err(_) => {
                                    info!(
                                        "⏲️ Guild {}: {}",
                                        self.guild_id,
                                        BotError::IdleTimeout
                                    );
                                    self.stop().await;
                                    self.state.lock().timed_out = true;
                                    return;
                                }
                            }
                        }
                    }
                }
            };

            // Empieza una reproducción: votos fuera y pista como actual.
            let volume = {
                let mut state = self.state.lock();
                state.skip_votes.clear();
                state.current = Some(sound.clone());
                state.volume
            };

            let Some(conn) = self.connection.lock().await.clone() else {
                warn!(
                    "🔇 Pista descartada sin conexión de voz en guild {}: {}",
                    self.guild_id, sound.title
                );
                self.state.lock().current = None;
                continue;
            };

            let (signal, finished) = TrackEndSignal::new();
            if let Err(e) = conn.play(&sound, volume, signal).await {
                error!("Error al iniciar la reproducción: {e}");
                self.state.lock().current = None;
                continue;
            }

            info!("🎵 Reproduciendo en guild {}: {}", self.guild_id, sound.title);
            self.notifier.now_playing(&sound).await;

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.release_connection().await;
                    return;
                }
                result = finished => {
                    // Un error del dispositivo de audio se registra y se
                    // trata como fin de pista; el loop sigue vivo.
                    if let Ok(Some(reason)) = result {
                        warn!("⚠️ {}", BotError::Playback(reason));
                    }
                }
            }

            if !self.state.lock().loop_enabled {
                self.state.lock().current = None;
            }
        }
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::sources::SoundDetails;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    pub(crate) struct NoopNotifier;

    #[async_trait]
    impl NowPlayingNotifier for NoopNotifier {
        async fn now_playing(&self, _sound: &QueuedSound) {}
    }

    /// Conexión simulada: registra cada `play` y guarda la señal de fin
    /// para que el test decida cuándo y cómo termina la pista.
    pub(crate) struct MockConnection {
        plays: Mutex<Vec<(String, f32)>>,
        finished: Mutex<Option<TrackEndSignal>>,
        disconnects: AtomicUsize,
        started: Notify,
    }

    impl MockConnection {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                plays: Mutex::new(Vec::new()),
                finished: Mutex::new(None),
                disconnects: AtomicUsize::new(0),
                started: Notify::new(),
            })
        }

        pub(crate) async fn wait_for_plays(&self, n: usize) {
            loop {
                let started = self.started.notified();
                if self.plays.lock().len() >= n {
                    return;
                }
                started.await;
            }
        }

        pub(crate) fn plays(&self) -> Vec<(String, f32)> {
            self.plays.lock().clone()
        }

        pub(crate) fn finish(&self, error: Option<String>) {
            if let Some(signal) = self.finished.lock().take() {
                signal.fire(error);
            }
        }

        pub(crate) fn disconnects(&self) -> usize {
            self.disconnects.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl VoiceConnection for MockConnection {
        async fn play(
            &self,
            sound: &QueuedSound,
            volume: f32,
            finished: TrackEndSignal,
        ) -> Result<(), BotError> {
            self.plays.lock().push((sound.title.clone(), volume));
            *self.finished.lock() = Some(finished);
            self.started.notify_waiters();
            Ok(())
        }

        async fn pause(&self) {}
        async fn resume(&self) {}

        async fn stop(&self) {
            self.finish(None);
        }

        async fn is_playing(&self) -> bool {
            self.finished.lock().is_some()
        }

        async fn is_paused(&self) -> bool {
            false
        }

        async fn disconnect(&self) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            // Cerrar la conexión mata la pista en curso, igual que songbird.
            self.finish(None);
        }
    }

    pub(crate) fn sound_from(title: &str, requester: u64) -> QueuedSound {
        QueuedSound::new(
            format!("https://www.myinstants.com/media/sounds/{title}.mp3"),
            format!("https://www.myinstants.com/instant/{title}/"),
            SoundDetails {
                title: Some(title.to_string()),
                ..SoundDetails::default()
            },
            UserId::new(requester),
        )
    }

    async fn session_with_conn() -> (Arc<VoiceSession>, Arc<MockConnection>) {
        let session = VoiceSession::spawn(GuildId::new(99), 0.5, Arc::new(NoopNotifier));
        let conn = MockConnection::new();
        session.attach_connection(conn.clone()).await;
        (session, conn)
    }

    #[tokio::test(start_paused = true)]
    async fn test_plays_queued_sounds_in_order() {
        let (session, conn) = session_with_conn().await;

        session.queue().enqueue(sound_from("primero", 1));
        session.queue().enqueue(sound_from("segundo", 1));

        conn.wait_for_plays(1).await;
        assert_eq!(conn.plays()[0], ("primero".to_string(), 0.5));
        assert_eq!(session.current().unwrap().title, "primero");

        conn.finish(None);
        conn.wait_for_plays(2).await;
        assert_eq!(conn.plays()[1].0, "segundo");
    }

    #[tokio::test(start_paused = true)]
    async fn test_current_cleared_after_natural_end() {
        let (session, conn) = session_with_conn().await;

        session.queue().enqueue(sound_from("unico", 1));
        conn.wait_for_plays(1).await;

        conn.finish(None);
        // Dejar que el loop procese el fin y vuelva a esperar cola.
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(session.current(), None);
        assert!(!session.is_playing().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_tears_down_exactly_once() {
        let (session, conn) = session_with_conn().await;

        tokio::time::sleep(IDLE_TIMEOUT + Duration::from_secs(1)).await;

        assert!(session.is_timed_out());
        assert!(!session.has_connection().await);
        assert_eq!(conn.disconnects(), 1);

        // Mucho después sigue caducada y sin dobles desconexiones.
        tokio::time::sleep(IDLE_TIMEOUT * 2).await;
        assert_eq!(conn.disconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_mode_replays_and_suppresses_timeout() {
        let (session, conn) = session_with_conn().await;

        session.queue().enqueue(sound_from("eco", 1));
        conn.wait_for_plays(1).await;

        assert!(session.toggle_loop());
        conn.finish(None);
        conn.wait_for_plays(2).await;
        assert_eq!(conn.plays()[1].0, "eco");

        // Comportamiento aceptado: repetir la pista mantiene la sesión viva
        // más allá del límite de inactividad, porque la cola nunca se drena.
        tokio::time::sleep(IDLE_TIMEOUT * 3).await;
        assert!(!session.is_timed_out());
        assert_eq!(conn.disconnects(), 0);

        // Al desactivar la repetición, el siguiente fin arma el temporizador.
        assert!(!session.toggle_loop());
        conn.finish(None);
        tokio::time::sleep(IDLE_TIMEOUT + Duration::from_secs(1)).await;
        assert!(session.is_timed_out());
        assert_eq!(conn.disconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_mode_without_current_waits_without_timeout() {
        let (session, conn) = session_with_conn().await;

        session.toggle_loop();
        tokio::time::sleep(IDLE_TIMEOUT * 2).await;
        assert!(!session.is_timed_out());

        session.queue().enqueue(sound_from("tardio", 1));
        conn.wait_for_plays(1).await;
        assert_eq!(conn.plays()[0].0, "tardio");
    }

    #[tokio::test(start_paused = true)]
    async fn test_requester_skips_unconditionally() {
        let (session, conn) = session_with_conn().await;

        session.queue().enqueue(sound_from("a", 7));
        session.queue().enqueue(sound_from("b", 7));
        conn.wait_for_plays(1).await;

        let outcome = session.vote_skip(UserId::new(7)).await;
        assert_eq!(outcome, SkipOutcome::Skipped);

        conn.wait_for_plays(2).await;
        assert_eq!(conn.plays()[1].0, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_vote_quorum() {
        let (session, conn) = session_with_conn().await;

        session.queue().enqueue(sound_from("a", 1));
        session.queue().enqueue(sound_from("b", 1));
        conn.wait_for_plays(1).await;

        assert_eq!(
            session.vote_skip(UserId::new(2)).await,
            SkipOutcome::VoteRecorded { votes: 1, required: 3 }
        );
        // Voto repetido: rechazado sin mover el recuento.
        assert_eq!(
            session.vote_skip(UserId::new(2)).await,
            SkipOutcome::AlreadyVoted
        );
        assert_eq!(
            session.vote_skip(UserId::new(3)).await,
            SkipOutcome::VoteRecorded { votes: 2, required: 3 }
        );
        // Dos votantes distintos no bastan; el tercero ejecuta el skip.
        assert_eq!(session.vote_skip(UserId::new(4)).await, SkipOutcome::Skipped);

        conn.wait_for_plays(2).await;
        assert_eq!(conn.plays()[1].0, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_votes_reset_when_item_changes() {
        let (session, conn) = session_with_conn().await;

        session.queue().enqueue(sound_from("a", 1));
        session.queue().enqueue(sound_from("b", 1));
        conn.wait_for_plays(1).await;

        session.vote_skip(UserId::new(2)).await;
        conn.finish(None);
        conn.wait_for_plays(2).await;

        // Mismo votante, pista nueva: cuenta desde cero.
        assert_eq!(
            session.vote_skip(UserId::new(2)).await,
            SkipOutcome::VoteRecorded { votes: 1, required: 3 }
        );
    }

    #[tokio::test]
    async fn test_vote_skip_with_nothing_playing() {
        let (session, _conn) = session_with_conn().await;
        assert_eq!(
            session.vote_skip(UserId::new(2)).await,
            SkipOutcome::NotPlaying
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_volume_validation_and_application() {
        let (session, conn) = session_with_conn().await;

        assert_eq!(session.set_volume(50).unwrap(), 0.5);
        assert!(matches!(
            session.set_volume(150),
            Err(BotError::InvalidArgument(_))
        ));
        assert!(matches!(
            session.set_volume(-1),
            Err(BotError::InvalidArgument(_))
        ));
        // El rechazo no toca el valor vigente.
        assert_eq!(session.volume(), 0.5);

        session.set_volume(25).unwrap();
        session.queue().enqueue(sound_from("bajo", 1));
        conn.wait_for_plays(1).await;
        assert_eq!(conn.plays()[0], ("bajo".to_string(), 0.25));
    }

    #[tokio::test(start_paused = true)]
    async fn test_playback_error_is_logged_and_loop_continues() {
        let (session, conn) = session_with_conn().await;

        session.queue().enqueue(sound_from("roto", 1));
        session.queue().enqueue(sound_from("sano", 1));
        conn.wait_for_plays(1).await;

        conn.finish(Some("stream cortado".to_string()));
        conn.wait_for_plays(2).await;
        assert_eq!(conn.plays()[1].0, "sano");
        assert!(!session.is_timed_out());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_drains_queue_and_releases_connection() {
        let (session, conn) = session_with_conn().await;

        session.queue().enqueue(sound_from("a", 1));
        session.queue().enqueue(sound_from("b", 1));
        session.queue().enqueue(sound_from("c", 1));
        conn.wait_for_plays(1).await;

        session.stop().await;

        assert!(session.queue().is_empty());
        assert!(!session.has_connection().await);
        assert_eq!(conn.disconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_releases_connection_idempotently() {
        let (session, conn) = session_with_conn().await;

        session.queue().enqueue(sound_from("a", 1));
        conn.wait_for_plays(1).await;

        session.shutdown();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(conn.disconnects(), 1);
    }

    #[tokio::test]
    async fn test_pause_without_connection_fails() {
        let session = VoiceSession::spawn(GuildId::new(99), 0.5, Arc::new(NoopNotifier));
        assert!(matches!(session.pause().await, Err(BotError::NotConnected)));
        assert!(matches!(session.resume().await, Err(BotError::NotConnected)));
        session.shutdown();
    }
}
