//! Counted completion barrier over image loads.
//!
//! Each image settles exactly once, by loading or by failing. Completion is
//! reached when the settled count equals the image count; repeated signals
//! for an image that already settled are ignored. There is no timeout: an
//! image that never settles holds its export forever.

use std::sync::{Arc, Mutex, PoisonError};

use image::DynamicImage;
use tokio::sync::watch;

/// How an image load finished
#[derive(Debug, Clone)]
pub enum ImageOutcome {
    Loaded(DynamicImage),
    Failed(String),
}

impl ImageOutcome {
    pub fn image(&self) -> Option<&DynamicImage> {
        match self {
            ImageOutcome::Loaded(image) => Some(image),
            ImageOutcome::Failed(_) => None,
        }
    }
}

#[derive(Debug)]
struct Shared {
    slots: Mutex<Vec<Option<ImageOutcome>>>,
    settled: watch::Sender<usize>,
}

/// Waiting side of the barrier
#[derive(Debug)]
pub struct Settlement {
    shared: Arc<Shared>,
    total: usize,
    receiver: watch::Receiver<usize>,
}

/// Settling side for one image. Clones settle the same image.
#[derive(Debug, Clone)]
pub struct SettlementHandle {
    index: usize,
    shared: Arc<Shared>,
}

impl Settlement {
    /// A barrier over `total` images and one handle per image
    pub fn new(total: usize) -> (Self, Vec<SettlementHandle>) {
        let (settled, receiver) = watch::channel(0);
        let shared = Arc::new(Shared {
            slots: Mutex::new(vec![None; total]),
            settled,
        });
        let handles = (0..total)
            .map(|index| SettlementHandle {
                index,
                shared: Arc::clone(&shared),
            })
            .collect();
        (
            Self {
                shared,
                total,
                receiver,
            },
            handles,
        )
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn settled(&self) -> usize {
        *self.receiver.borrow()
    }

    /// Resolve once every image has settled, yielding outcomes in image order
    pub async fn wait(mut self) -> Vec<ImageOutcome> {
        let total = self.total;
        // The sender lives in `shared`, so the channel cannot close under us
        let _ = self.receiver.wait_for(|settled| *settled >= total).await;

        let mut slots = self
            .shared
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        slots
            .iter_mut()
            .map(|slot| {
                slot.take()
                    .unwrap_or_else(|| ImageOutcome::Failed("image never settled".to_string()))
            })
            .collect()
    }
}

impl SettlementHandle {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Record the outcome. Returns false when this image had already settled.
    pub fn settle(&self, outcome: ImageOutcome) -> bool {
        let count = {
            let mut slots = self
                .shared
                .slots
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let Some(slot) = slots.get_mut(self.index) else {
                return false;
            };
            if slot.is_some() {
                log::debug!("Ignoring repeated settlement of image {}", self.index);
                return false;
            }
            *slot = Some(outcome);
            slots.iter().filter(|slot| slot.is_some()).count()
        };
        self.shared.settled.send_replace(count);
        true
    }
}
