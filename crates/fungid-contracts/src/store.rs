use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::records::{DiaryUpdate, FieldDiary, HistoryEntry, ImageQuality};

/// History keeps only the most recent identifications.
pub const HISTORY_LIMIT: usize = 30;

/// Field-diary photos are bounded per entry.
pub const DIARY_PHOTO_LIMIT: usize = 3;

const HISTORY_KEY: &str = "history";
const COLLECTION_KEY: &str = "collection";
const QUALITY_KEY: &str = "image_quality";

/// Device-local persistence for the identification history (append-bounded
/// recency log) and the user-curated collection (unbounded, mutable).
///
/// One JSON object per store file. Every operation reads the full object,
/// mutates it, and writes the full object back; there is no incremental
/// persistence. History and Collection never share an entry by reference:
/// entries cross the boundary only through serialization, so mutating one
/// list can never alias the other.
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Most recent first, at most `HISTORY_LIMIT` entries.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.read_entries(HISTORY_KEY)
    }

    pub fn collection(&self) -> Vec<HistoryEntry> {
        self.read_entries(COLLECTION_KEY)
    }

    /// Inserts at the head, re-sorts descending by timestamp, truncates to
    /// the `HISTORY_LIMIT` most recent, and persists the full list.
    pub fn append_to_history(&self, entry: HistoryEntry) -> anyhow::Result<()> {
        let mut entries = self.read_entries(HISTORY_KEY);
        entries.insert(0, entry);
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(HISTORY_LIMIT);
        self.write_entries(HISTORY_KEY, &entries)
    }

    pub fn clear_history(&self) -> anyhow::Result<()> {
        self.write_entries(HISTORY_KEY, &[])
    }

    /// Copies the entry into the collection. The copy starts with an unset
    /// field diary regardless of the source; diary data belongs to the
    /// collection lifetime that begins here.
    pub fn add_to_collection(&self, entry: &HistoryEntry) -> anyhow::Result<()> {
        let mut copy = entry.clone();
        copy.diary = None;
        let mut entries = self.read_entries(COLLECTION_KEY);
        entries.push(copy);
        self.write_entries(COLLECTION_KEY, &entries)
    }

    /// Removes the entry with the given id. Removing an absent id is a
    /// no-op, not an error.
    pub fn remove_from_collection(&self, id: &str) -> anyhow::Result<()> {
        let mut entries = self.read_entries(COLLECTION_KEY);
        entries.retain(|entry| entry.id != id);
        self.write_entries(COLLECTION_KEY, &entries)
    }

    /// Merges the `Some` fields of the update into the matching collection
    /// entry's diary. History is never touched. Returns whether an entry
    /// matched.
    pub fn update_diary_fields(&self, id: &str, update: &DiaryUpdate) -> anyhow::Result<bool> {
        let mut entries = self.read_entries(COLLECTION_KEY);
        let Some(entry) = entries.iter_mut().find(|entry| entry.id == id) else {
            return Ok(false);
        };
        let diary = entry.diary.get_or_insert_with(FieldDiary::default);
        if let Some(notes) = &update.notes {
            diary.notes = Some(notes.clone());
        }
        if let Some(found_on) = &update.found_on {
            diary.found_on = Some(found_on.clone());
        }
        if let Some(location) = update.location {
            diary.location = Some(location);
        }
        if let Some(photos) = &update.photos {
            diary.photos = photos.clone();
            diary.photos.truncate(DIARY_PHOTO_LIMIT);
        }
        self.write_entries(COLLECTION_KEY, &entries)?;
        Ok(true)
    }

    pub fn image_quality(&self) -> Option<ImageQuality> {
        self.load()
            .get(QUALITY_KEY)
            .and_then(Value::as_str)
            .and_then(ImageQuality::parse)
    }

    pub fn set_image_quality(&self, quality: ImageQuality) -> anyhow::Result<()> {
        let mut payload = self.load();
        payload.insert(
            QUALITY_KEY.to_string(),
            Value::String(quality.as_str().to_string()),
        );
        self.save(&payload)
    }

    fn read_entries(&self, key: &str) -> Vec<HistoryEntry> {
        let rows = self
            .load()
            .get(key)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        rows.into_iter()
            .filter_map(|row| serde_json::from_value(row).ok())
            .collect()
    }

    fn write_entries(&self, key: &str, entries: &[HistoryEntry]) -> anyhow::Result<()> {
        let mut payload = self.load();
        payload.insert(key.to_string(), serde_json::to_value(entries)?);
        self.save(&payload)
    }

    fn load(&self) -> Map<String, Value> {
        read_json_object(&self.path).unwrap_or_default()
    }

    fn save(&self, payload: &Map<String, Value>) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(
            &self.path,
            serde_json::to_string_pretty(&Value::Object(payload.clone()))?,
        )?;
        Ok(())
    }
}

fn read_json_object(path: &Path) -> Option<Map<String, Value>> {
    let raw = std::fs::read_to_string(path).ok()?;
    let parsed: Value = serde_json::from_str(&raw).ok()?;
    parsed.as_object().cloned()
}
