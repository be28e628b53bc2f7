//! Lock-free notification channel from the engine thread to the display.
//!
//! Single producer, single consumer. A full buffer drops the notification;
//! the producer never blocks and the consumer never waits.

use crate::display::{Display, Notification, NotificationSink};
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};

pub const DEFAULT_CAPACITY: usize = 512;

/// Producer side, owned by the engine thread.
pub struct NotifyProducer {
    producer: HeapProd<Notification>,
    dropped: u64,
}

impl NotifyProducer {
    /// Returns `false` if the ring buffer is full.
    #[inline]
    pub fn push(&mut self, notification: Notification) -> bool {
        if self.producer.try_push(notification).is_ok() {
            return true;
        }
        self.dropped += 1;
        tracing::trace!(
            "Notification buffer full, dropped {:?} ({} total)",
            notification,
            self.dropped
        );
        false
    }

    /// Notifications lost to a full buffer since creation.
    #[inline]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl NotificationSink for NotifyProducer {
    #[inline]
    fn notify(&mut self, notification: Notification) {
        self.push(notification);
    }
}

/// Consumer side, owned by the display thread.
pub struct NotifyConsumer {
    consumer: HeapCons<Notification>,
}

impl NotifyConsumer {
    #[inline]
    pub fn pop(&mut self) -> Option<Notification> {
        self.consumer.try_pop()
    }

    /// Applies everything currently queued to `display`, returns the count.
    pub fn drain_into<D: Display + ?Sized>(&mut self, display: &mut D) -> usize {
        let mut applied = 0;
        while let Some(notification) = self.consumer.try_pop() {
            display.apply(&notification);
            applied += 1;
        }
        applied
    }

    #[inline]
    pub fn has_pending(&self) -> bool {
        !self.consumer.is_empty()
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.consumer.occupied_len()
    }
}

pub fn notification_channel() -> (NotifyProducer, NotifyConsumer) {
    notification_channel_with_capacity(DEFAULT_CAPACITY)
}

/// `capacity` is rounded up to a power of two (minimum 2).
pub fn notification_channel_with_capacity(capacity: usize) -> (NotifyProducer, NotifyConsumer) {
    let rb = HeapRb::new(capacity.max(2).next_power_of_two());
    let (producer, consumer) = rb.split();
    (
        NotifyProducer {
            producer,
            dropped: 0,
        },
        NotifyConsumer { consumer },
    )
}
