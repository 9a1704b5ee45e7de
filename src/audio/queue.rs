use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::collections::VecDeque;
use tokio::sync::Notify;
use tracing::debug;

use crate::{audio::track::QueuedSound, error::BotError};

/// Cola de sonidos pendientes de un guild. Los productores (comandos)
/// encolan sin bloquear; el único consumidor es el loop de reproducción de
/// la sesión, que se suspende en `pop_front_or_wait` cuando está vacía.
#[derive(Debug, Default)]
pub struct SoundQueue {
    items: Mutex<VecDeque<QueuedSound>>,
    notify: Notify,
}

impl SoundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Añade al final de la cola. Nunca bloquea.
    pub fn enqueue(&self, sound: QueuedSound) {
        debug!("➕ Encolado: {}", sound.title);
        self.items.lock().push_back(sound);
        self.notify.notify_one();
    }

    /// Extrae el primer elemento, suspendiendo la tarea hasta que exista
    /// alguno. Cada elemento despierta exactamente a un consumidor: el
    /// permiso de `Notify` se pide antes de mirar la cola, así que un
    /// `enqueue` entre la comprobación y el `await` no se pierde.
    pub async fn pop_front_or_wait(&self) -> QueuedSound {
        loop {
            let notified = self.notify.notified();
            if let Some(sound) = self.items.lock().pop_front() {
                return sound;
            }
            notified.await;
        }
    }

    /// Vacía los pendientes. No afecta a un elemento ya extraído.
    pub fn clear(&self) {
        self.items.lock().clear();
    }

    /// Elimina el elemento en `index` (base 0).
    pub fn remove_at(&self, index: usize) -> Result<QueuedSound, BotError> {
        self.items.lock().remove(index).ok_or_else(|| {
            BotError::InvalidArgument(format!("No hay ningún sonido en la posición {}", index + 1))
        })
    }

    /// Permuta aleatoriamente los pendientes. El elemento en reproducción
    /// no pertenece a la cola y no se ve afectado.
    pub fn shuffle(&self) {
        let mut items = self.items.lock();
        items.make_contiguous().shuffle(&mut rand::thread_rng());
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Página 1-based de la cola. Una página fuera de rango devuelve una
    /// porción vacía, no un error.
    pub fn page(&self, page: usize, items_per_page: usize) -> QueuePage {
        debug_assert!(items_per_page > 0, "items_per_page debe ser mayor que 0");

        let items = self.items.lock();
        let total_items = items.len();
        let total_pages = if total_items == 0 {
            1
        } else {
            total_items.div_ceil(items_per_page)
        };

        let safe_page = page.max(1);
        let start = (safe_page - 1) * items_per_page;
        let end = (start + items_per_page).min(total_items);

        QueuePage {
            items: if start < total_items {
                items.iter().skip(start).take(end - start).cloned().collect()
            } else {
                Vec::new()
            },
            current_page: safe_page,
            total_pages,
            total_items,
            start_index: start,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuePage {
    pub items: Vec<QueuedSound>,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
    /// Posición global (base 0) del primer elemento de la página.
    pub start_index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SoundDetails;
    use pretty_assertions::assert_eq;
    use serenity::model::id::UserId;
    use std::{collections::HashSet, sync::Arc, time::Duration};

    fn sound(title: &str) -> QueuedSound {
        QueuedSound::new(
            format!("https://www.myinstants.com/media/sounds/{title}.mp3"),
            format!("https://www.myinstants.com/instant/{title}/"),
            SoundDetails {
                title: Some(title.to_string()),
                ..SoundDetails::default()
            },
            UserId::new(1),
        )
    }

    #[tokio::test]
    async fn test_pop_preserves_fifo_order() {
        let queue = SoundQueue::new();
        queue.enqueue(sound("a"));
        queue.enqueue(sound("b"));

        assert_eq!(queue.pop_front_or_wait().await.title, "a");
        assert_eq!(queue.pop_front_or_wait().await.title, "b");
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test]
    async fn test_pop_waits_for_enqueue() {
        let queue = Arc::new(SoundQueue::new());

        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop_front_or_wait().await.title })
        };

        // Dar tiempo a que el consumidor quede suspendido en la cola vacía.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!consumer.is_finished());

        queue.enqueue(sound("esperado"));
        let delivered = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("el consumidor no despertó")
            .unwrap();
        assert_eq!(delivered, "esperado");
    }

    #[tokio::test]
    async fn test_each_item_wakes_exactly_one_waiter() {
        let queue = Arc::new(SoundQueue::new());

        let mut waiters = Vec::new();
        for _ in 0..3 {
            let queue = queue.clone();
            waiters.push(tokio::spawn(
                async move { queue.pop_front_or_wait().await.title },
            ));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;

        queue.enqueue(sound("x"));
        queue.enqueue(sound("y"));
        queue.enqueue(sound("z"));

        let mut delivered = HashSet::new();
        for waiter in waiters {
            let title = tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .expect("un consumidor no despertó")
                .unwrap();
            // Sin entregas duplicadas.
            assert!(delivered.insert(title));
        }
        assert_eq!(delivered.len(), 3);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_remove_at_single_item_empties_queue() {
        let queue = SoundQueue::new();
        queue.enqueue(sound("solo"));

        let removed = queue.remove_at(0).unwrap();
        assert_eq!(removed.title, "solo");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_remove_at_out_of_range_fails() {
        let queue = SoundQueue::new();
        queue.enqueue(sound("a"));

        assert!(matches!(
            queue.remove_at(5),
            Err(BotError::InvalidArgument(_))
        ));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_remove_preserves_relative_order() {
        let queue = SoundQueue::new();
        for title in ["a", "b", "c", "d"] {
            queue.enqueue(sound(title));
        }

        queue.remove_at(1).unwrap();

        let page = queue.page(1, 10);
        let titles: Vec<_> = page.items.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "c", "d"]);
    }

    #[test]
    fn test_shuffle_keeps_same_items() {
        let queue = SoundQueue::new();
        for i in 0..20 {
            queue.enqueue(sound(&format!("s{i}")));
        }

        queue.shuffle();

        let page = queue.page(1, 20);
        let titles: HashSet<_> = page.items.iter().map(|s| s.title.clone()).collect();
        assert_eq!(page.total_items, 20);
        assert_eq!(titles.len(), 20);
    }

    #[test]
    fn test_clear_drops_all_pending() {
        let queue = SoundQueue::new();
        queue.enqueue(sound("a"));
        queue.enqueue(sound("b"));

        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pagination_last_partial_page() {
        let queue = SoundQueue::new();
        for i in 1..=25 {
            queue.enqueue(sound(&format!("s{i:02}")));
        }

        let page = queue.page(3, 10);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.total_items, 25);
        assert_eq!(page.items.len(), 5);
        assert_eq!(page.items[0].title, "s21");
        assert_eq!(page.items[4].title, "s25");
        assert_eq!(page.start_index, 20);
    }

    #[test]
    fn test_pagination_start_index_follows_page_size() {
        let queue = SoundQueue::new();
        for i in 1..=25 {
            queue.enqueue(sound(&format!("s{i:02}")));
        }

        // La numeración global sale del tamaño de página consultado, no
        // de ninguna constante fija.
        let page = queue.page(2, 7);
        assert_eq!(page.start_index, 7);
        assert_eq!(page.items[0].title, "s08");

        let page = queue.page(4, 7);
        assert_eq!(page.total_pages, 4);
        assert_eq!(page.start_index, 21);
        assert_eq!(page.items.len(), 4);
    }

    #[test]
    #[should_panic(expected = "items_per_page")]
    fn test_pagination_rejects_zero_page_size() {
        let queue = SoundQueue::new();
        queue.page(1, 0);
    }

    #[test]
    fn test_pagination_out_of_range_page_is_empty() {
        let queue = SoundQueue::new();
        for i in 0..5 {
            queue.enqueue(sound(&format!("s{i}")));
        }

        let page = queue.page(4, 10);
        assert!(page.items.is_empty());
        assert_eq!(page.total_pages, 1);
    }
}
