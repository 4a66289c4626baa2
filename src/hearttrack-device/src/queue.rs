use hearttrack_codec::{QueueImage, layout::QUEUE_REGION_OFFSET};
use hearttrack_types::{MeasurementResult, QueuedResult, Timestamp, is_wall_clock};

use crate::{Storage, StorageError};

/// Fixed-capacity ring of results awaiting delivery, mirrored in full to
/// storage after every mutation.
#[derive(Debug, Clone)]
pub struct DurableQueue {
    image: QueueImage,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Enqueued {
    pub slot: usize,
    /// Undelivered entry that had to make room.
    pub evicted: Option<QueuedResult>,
}

impl DurableQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            image: QueueImage::empty(capacity),
        }
    }

    pub fn load<S: Storage>(storage: &S, capacity: usize) -> Result<Self, StorageError> {
        let mut region = vec![0; QueueImage::region_len(capacity)];
        storage.read(QUEUE_REGION_OFFSET, &mut region)?;

        let load = QueueImage::decode(&region, capacity);
        if load.cursor_reset {
            warn!("Queue cursor out of range, reset to slot 0");
        }
        if load.repaired_slots > 0 {
            warn!("Dropped {} damaged queue slots", load.repaired_slots);
        }
        if load.stored_live_count != load.image.live_count {
            warn!(
                "Queue live count {} did not match slots, using {}",
                load.stored_live_count, load.image.live_count
            );
        }
        info!(
            "Loaded queue: {} pending of {} slots",
            load.image.live_count, capacity
        );

        Ok(Self { image: load.image })
    }

    pub fn capacity(&self) -> usize {
        self.image.entries.len()
    }

    pub fn entries(&self) -> &[QueuedResult] {
        &self.image.entries
    }

    pub fn cursor(&self) -> usize {
        self.image.cursor as usize
    }

    pub fn pending_count(&self) -> usize {
        self.image.live_count as usize
    }

    /// Takes the first free slot from the cursor onward. When every slot
    /// holds an undelivered result, the one with the oldest timestamp is
    /// overwritten.
    pub fn enqueue<S: Storage>(
        &mut self,
        result: &MeasurementResult,
        storage: &mut S,
    ) -> Option<Enqueued> {
        let capacity = self.capacity();
        if capacity == 0 {
            warn!("Queue has no slots, dropping result");
            return None;
        }

        let cursor = self.cursor();
        let free = (0..capacity)
            .map(|i| (cursor + i) % capacity)
            .find(|&slot| self.image.entries[slot].is_free());

        let (slot, evicted) = match free {
            Some(slot) => (slot, None),
            None => {
                let slot = self.oldest_pending_slot()?;
                (slot, Some(self.image.entries[slot]))
            }
        };

        if let Some(evicted) = evicted {
            warn!("Queue full, evicting result taken at {}", evicted.taken_at);
        }

        self.image.entries[slot] = QueuedResult::from(result);
        self.image.cursor = ((slot + 1) % capacity) as u32;
        self.recount();
        self.persist(storage);

        info!(
            "Stored result in slot {} ({} pending)",
            slot,
            self.pending_count()
        );
        Some(Enqueued { slot, evicted })
    }

    /// Oldest undelivered entry and its slot.
    pub fn oldest_pending(&self) -> Option<(usize, QueuedResult)> {
        self.oldest_pending_slot()
            .map(|slot| (slot, self.image.entries[slot]))
    }

    /// No-op if the slot no longer holds `entry`, e.g. after an eviction
    /// while the replay was in flight.
    pub fn mark_delivered<S: Storage>(
        &mut self,
        slot: usize,
        entry: &QueuedResult,
        storage: &mut S,
    ) -> bool {
        let Some(stored) = self.image.entries.get_mut(slot) else {
            return false;
        };
        if !stored.is_pending() || stored.taken_at != entry.taken_at {
            return false;
        }

        stored.delivered = true;
        self.recount();
        self.persist(storage);
        true
    }

    /// Replaces the uptime stamp of a pending entry with wall-clock time.
    /// No-op if the slot no longer holds a pending entry stamped `from`.
    pub fn restamp<S: Storage>(
        &mut self,
        slot: usize,
        from: Timestamp,
        to: Timestamp,
        storage: &mut S,
    ) -> bool {
        let Some(stored) = self.image.entries.get_mut(slot) else {
            return false;
        };
        if !stored.is_pending() || stored.taken_at != from {
            return false;
        }

        stored.taken_at = to;
        self.persist(storage);
        true
    }

    /// Drops undelivered entries older than `retention_secs`. Entries
    /// stamped with uptime have no age and are kept.
    pub fn purge_expired<S: Storage>(
        &mut self,
        now: Timestamp,
        retention_secs: u32,
        storage: &mut S,
    ) -> usize {
        let cutoff = now.saturating_sub(retention_secs);
        let mut purged = 0;
        for entry in &mut self.image.entries {
            if entry.is_pending() && is_wall_clock(entry.taken_at) && entry.taken_at < cutoff {
                entry.delivered = true;
                purged += 1;
            }
        }

        if purged > 0 {
            self.recount();
            self.persist(storage);
            info!("Dropped {} expired results", purged);
        }
        purged
    }

    fn oldest_pending_slot(&self) -> Option<usize> {
        self.image
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.is_pending())
            .min_by_key(|(_, entry)| entry.taken_at)
            .map(|(slot, _)| slot)
    }

    fn recount(&mut self) {
        self.image.live_count = self
            .image
            .entries
            .iter()
            .filter(|entry| entry.is_pending())
            .count() as u32;
    }

    fn persist<S: Storage>(&self, storage: &mut S) {
        if let Err(error) = storage.write(QUEUE_REGION_OFFSET, &self.image.encode()) {
            error!("Failed to persist queue: {}", error);
        }
    }
}
