use std::collections::HashMap;

/// What the crawl already knows about one item
#[derive(Debug, Clone, PartialEq, Eq)]
struct SeenItem {
    /// SKU observed when the item was first recorded, or its id
    label: String,

    /// Recorded image URLs; position + 1 is the image ordinal
    urls: Vec<String>,
}

/// An image URL recorded for an item, with its position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedImage {
    pub url: String,

    /// 1-based position among all images ever recorded for the item
    pub ordinal: usize,
}

/// Result of offering an item to the [`SeenSet`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Nothing new: the id is blank, or every URL was recorded before
    Skipped,

    /// The item or some of its URLs were new
    Recorded {
        /// True the first time this id is recorded
        first_seen: bool,

        /// Download label fixed at first sight
        label: String,

        /// The URLs that were not recorded before, in listing order
        new_images: Vec<RecordedImage>,
    },
}

/// Deduplication authority for the whole run
///
/// Maps item id to the ordered URLs already written to the ledger. Entries
/// are only ever added, so an item's ordinals never change once assigned.
#[derive(Debug, Clone, Default)]
pub struct SeenSet {
    items: HashMap<String, SeenItem>,
    url_count: usize,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an item and reports which of its URLs are new
    ///
    /// # Arguments
    ///
    /// * `id` - Item id; blank ids are never recorded
    /// * `sku` - The item's SKU as returned this time
    /// * `urls` - Image URLs in listing order
    ///
    /// # Example
    ///
    /// ```
    /// use listing_archiver::state::{RecordOutcome, SeenSet};
    ///
    /// let mut seen = SeenSet::new();
    /// let urls = vec!["https://i.example.com/1.jpg".to_string()];
    /// assert!(matches!(seen.record("42", Some("MUG"), &urls), RecordOutcome::Recorded { .. }));
    /// assert_eq!(seen.record("42", Some("MUG"), &urls), RecordOutcome::Skipped);
    /// ```
    pub fn record(&mut self, id: &str, sku: Option<&str>, urls: &[String]) -> RecordOutcome {
        let id = id.trim();
        if id.is_empty() {
            return RecordOutcome::Skipped;
        }

        let first_seen = !self.items.contains_key(id);
        let entry = self.items.entry(id.to_string()).or_insert_with(|| SeenItem {
            label: sku
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(id)
                .to_string(),
            urls: Vec::new(),
        });

        let mut new_images = Vec::new();
        for url in urls {
            if url.is_empty() || entry.urls.contains(url) {
                continue;
            }
            entry.urls.push(url.clone());
            new_images.push(RecordedImage {
                url: url.clone(),
                ordinal: entry.urls.len(),
            });
        }
        self.url_count += new_images.len();

        if !first_seen && new_images.is_empty() {
            return RecordOutcome::Skipped;
        }

        RecordOutcome::Recorded {
            first_seen,
            label: entry.label.clone(),
            new_images,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    /// Download label for a recorded item
    pub fn label(&self, id: &str) -> Option<&str> {
        self.items.get(id).map(|item| item.label.as_str())
    }

    /// Every image recorded for `id`, in ordinal order
    pub fn recorded_images(&self, id: &str) -> Vec<RecordedImage> {
        self.items
            .get(id.trim())
            .map(|item| {
                item.urls
                    .iter()
                    .enumerate()
                    .map(|(i, url)| RecordedImage {
                        url: url.clone(),
                        ordinal: i + 1,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of image URLs recorded for `id`
    pub fn image_count(&self, id: &str) -> usize {
        self.items.get(id.trim()).map_or(0, |item| item.urls.len())
    }

    /// Number of unique items recorded
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of (item, URL) pairs recorded
    pub fn url_count(&self) -> usize {
        self.url_count
    }
}
