/// Editing session: the live letter plus background image work
///
/// Image slots are updated optimistically (local preview first, hosted URL
/// later). Every write to a slot takes a fresh generation number; a late
/// result is applied only if its generation is still the newest for that slot.
use crate::codec::share_url;
use crate::compress::{compress_image_async, parse_data_url, sniff_mime, to_data_url, CompressOptions};
use crate::error::Result;
use crate::history::{LetterHistory, SavedLetterEntry};
use crate::hosting::{is_hosted, ImageHost};
use crate::letter::{ImageSlot, ImageSlotName, LetterDocument};
use crate::shortlink_client::{ShortLinkClient, ShortenOutcome};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// How an `attach_image` call ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachOutcome {
    /// The slot now points at a hosted URL
    Hosted(String),
    /// Upload failed; the slot keeps a local `data:` preview
    LocalOnly,
    /// The bytes were not an image and nothing usable could be shown;
    /// the slot kept whatever it had before
    Rejected,
    /// A newer write to the same slot happened while this one was in flight
    Superseded,
}

/// Result of "save and share"
#[derive(Debug, Clone)]
pub struct ShareResult {
    pub long_url: String,
    pub link: ShortenOutcome,
    pub entry: SavedLetterEntry,
}

#[derive(Clone)]
pub struct EditingSession {
    doc: Arc<RwLock<LetterDocument>>,
    generations: Arc<Mutex<HashMap<ImageSlotName, u64>>>,
}

impl EditingSession {
    pub fn new(doc: LetterDocument) -> Self {
        Self {
            doc: Arc::new(RwLock::new(doc)),
            generations: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Copy of the current document.
    pub async fn snapshot(&self) -> LetterDocument {
        self.doc.read().await.clone()
    }

    /// Apply a non-image edit (text, colours, fonts...).
    pub async fn update<F>(&self, edit: F)
    where
        F: FnOnce(&mut LetterDocument),
    {
        let mut doc = self.doc.write().await;
        edit(&mut *doc);
    }

    async fn next_generation(&self, slot: ImageSlotName) -> u64 {
        let mut generations = self.generations.lock().await;
        let generation = generations.entry(slot).or_insert(0);
        *generation += 1;
        *generation
    }

    async fn is_current(&self, slot: ImageSlotName, generation: u64) -> bool {
        self.generations.lock().await.get(&slot).copied() == Some(generation)
    }

    /// Write `value` into `slot` if `generation` is still the newest issued for it.
    async fn write_if_current(&self, slot: ImageSlotName, generation: u64, value: Option<ImageSlot>) -> bool {
        // Hold the generation lock across the write so a newer writer cannot slip in between.
        let generations = self.generations.lock().await;
        if generations.get(&slot).copied() != Some(generation) {
            debug!("Discarding stale write to {} (generation {})", slot, generation);
            return false;
        }
        let mut doc = self.doc.write().await;
        *doc.slot_mut(slot) = value;
        true
    }

    /// Background write of a new image representation. The slot keeps its
    /// `hidden` flag, which only the user changes.
    async fn write_image_if_current(
        &self,
        slot: ImageSlotName,
        generation: u64,
        source_ref: String,
        filename: &str,
    ) -> bool {
        let generations = self.generations.lock().await;
        if generations.get(&slot).copied() != Some(generation) {
            debug!("Discarding stale write to {} (generation {})", slot, generation);
            return false;
        }
        let mut doc = self.doc.write().await;
        let image = doc.slot_mut(slot);
        let hidden = image.as_ref().is_some_and(|i| i.hidden);
        *image = Some(ImageSlot {
            source_ref,
            filename: filename.to_string(),
            hidden,
        });
        true
    }

    /// Point `slot` at a hosted reference (e.g. a bundled stamp).
    pub async fn set_hosted_image(&self, slot: ImageSlotName, source_ref: &str, filename: &str) -> bool {
        let generation = self.next_generation(slot).await;
        self.write_if_current(slot, generation, Some(ImageSlot::new(source_ref, filename)))
            .await
    }

    /// Hide or show a slot without forgetting its reference.
    pub async fn set_hidden(&self, slot: ImageSlotName, hidden: bool) {
        let mut doc = self.doc.write().await;
        if let Some(image) = doc.slot_mut(slot).as_mut() {
            image.hidden = hidden;
        }
    }

    /// Remove a slot's image; in-flight uploads for it are discarded.
    pub async fn clear_image(&self, slot: ImageSlotName) {
        let generation = self.next_generation(slot).await;
        self.write_if_current(slot, generation, None).await;
    }

    /// "uploaded" vs "uploading" as the composer shows it.
    pub async fn is_slot_hosted(&self, slot: ImageSlotName) -> bool {
        self.doc
            .read()
            .await
            .slot(slot)
            .is_some_and(|image| is_hosted(&image.source_ref))
    }

    /// Attach a user-picked image to `slot`.
    ///
    /// The slot shows the best representation available at each step:
    /// original bytes, then the compressed preview, then the hosted URL.
    pub async fn attach_image(
        &self,
        slot: ImageSlotName,
        filename: &str,
        bytes: Vec<u8>,
        host: &dyn ImageHost,
        options: CompressOptions,
    ) -> AttachOutcome {
        let generation = self.next_generation(slot).await;
        let original_mime = sniff_mime(&bytes);
        let is_image = original_mime.starts_with("image/");

        if is_image
            && !self
                .write_image_if_current(slot, generation, to_data_url(original_mime, &bytes), filename)
                .await
        {
            return AttachOutcome::Superseded;
        }

        let upload_bytes = match compress_image_async(bytes.clone(), options).await {
            Ok(compressed) => {
                if !self
                    .write_image_if_current(slot, generation, compressed.to_data_url(), filename)
                    .await
                {
                    return AttachOutcome::Superseded;
                }
                compressed.bytes
            }
            Err(e) if is_image => {
                warn!("Compression of {} failed, keeping original: {}", filename, e);
                bytes
            }
            Err(e) => {
                warn!("{} is not a usable image, keeping previous {}: {}", filename, slot, e);
                return AttachOutcome::Rejected;
            }
        };

        if !self.is_current(slot, generation).await {
            return AttachOutcome::Superseded;
        }

        let Some(url) = host.upload(&upload_bytes, filename).await else {
            return if self.is_current(slot, generation).await {
                AttachOutcome::LocalOnly
            } else {
                AttachOutcome::Superseded
            };
        };

        if self.write_image_if_current(slot, generation, url.clone(), filename).await {
            info!("{} hosted at {}", slot, url);
            AttachOutcome::Hosted(url)
        } else {
            AttachOutcome::Superseded
        }
    }

    /// Retry the upload of every visible slot still holding a local `data:`
    /// preview, e.g. after the image host was unreachable at pick time.
    pub async fn upload_local_previews(&self, host: &dyn ImageHost) -> Vec<(ImageSlotName, AttachOutcome)> {
        let doc = self.snapshot().await;
        let mut outcomes = Vec::new();

        for slot in ImageSlotName::ALL {
            let Some(image) = doc.slot(slot).filter(|i| !i.hidden && !is_hosted(&i.source_ref)) else {
                continue;
            };
            let Some((_, bytes)) = parse_data_url(&image.source_ref) else {
                debug!("{} holds no inline preview to upload", slot);
                continue;
            };

            let generation = self.next_generation(slot).await;
            let outcome = match host.upload(&bytes, &image.filename).await {
                Some(url) => {
                    if self
                        .write_image_if_current(slot, generation, url.clone(), &image.filename)
                        .await
                    {
                        info!("{} hosted at {}", slot, url);
                        AttachOutcome::Hosted(url)
                    } else {
                        AttachOutcome::Superseded
                    }
                }
                None => AttachOutcome::LocalOnly,
            };
            outcomes.push((slot, outcome));
        }
        outcomes
    }

    /// Encode the current letter, shorten the link, and record it in history.
    pub async fn save_and_share(
        &self,
        page_url: &str,
        shortener: &ShortLinkClient,
        history: &LetterHistory,
    ) -> Result<ShareResult> {
        let doc = self.snapshot().await;
        for slot in ImageSlotName::ALL {
            if doc.slot(slot).is_some_and(|s| !s.hidden && !is_hosted(&s.source_ref)) {
                warn!("{} is not uploaded yet and will be missing from the shared letter", slot);
            }
        }

        let long_url = share_url(page_url, &doc);
        let link = shortener.shorten(&long_url).await;
        let entry = SavedLetterEntry::new(&doc, &long_url);
        history.add(entry.clone())?;

        Ok(ShareResult {
            long_url,
            link,
            entry,
        })
    }
}

impl Default for EditingSession {
    fn default() -> Self {
        Self::new(LetterDocument::default())
    }
}
