use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fungid_contracts::errors::IdentifyError;
use fungid_contracts::events::EventWriter;
use fungid_contracts::records::{
    DiaryUpdate, GeoPoint, HistoryEntry, ImageQuality, ToxicityLevel,
};
use fungid_contracts::store::RecordStore;
use fungid_engine::images::{normalize_to_data_url, thumbnail_data_url, THUMBNAIL_MAX_DIM};
use fungid_engine::prompts::{Difficulty, Language};
use fungid_engine::{EngineConfig, IdentificationEngine};
use reqwest::blocking::Client as HttpClient;

#[derive(Debug, Parser)]
#[command(name = "fungid", version, about = "Mushroom identification from photos or names")]
struct Cli {
    /// Store file holding history and collection.
    #[arg(long, global = true, default_value = "fungid-store.json")]
    store: PathBuf,
    /// Append pipeline events to this JSONL file.
    #[arg(long, global = true)]
    events: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Identify the mushroom in a photograph.
    IdentifyImage(IdentifyImageArgs),
    /// Identify a mushroom from a name or description.
    IdentifyText(IdentifyTextArgs),
    /// Compare two previously identified mushrooms.
    Compare(CompareArgs),
    /// Show or clear the identification history.
    History(HistoryArgs),
    /// Manage the curated collection.
    Collection(CollectionArgs),
    /// Show or set the generated-image quality preference.
    Quality(QualityArgs),
}

#[derive(Debug, Parser)]
struct IdentifyImageArgs {
    /// Path to the photograph.
    photo: PathBuf,
    #[arg(long, default_value = "es")]
    language: String,
    #[arg(long, default_value = "intermediate")]
    difficulty: String,
    /// Overrides the stored image-quality preference.
    #[arg(long)]
    quality: Option<String>,
    #[arg(long, requires = "lon")]
    lat: Option<f64>,
    #[arg(long, requires = "lat")]
    lon: Option<f64>,
    /// Do not append the result to the history.
    #[arg(long)]
    no_save: bool,
}

#[derive(Debug, Parser)]
struct IdentifyTextArgs {
    /// Common or scientific name to look up.
    query: String,
    #[arg(long, default_value = "es")]
    language: String,
    #[arg(long, default_value = "intermediate")]
    difficulty: String,
    #[arg(long)]
    quality: Option<String>,
    #[arg(long)]
    no_save: bool,
}

#[derive(Debug, Parser)]
struct CompareArgs {
    /// Entry id of the first mushroom (collection is searched before history).
    id_a: String,
    /// Entry id of the second mushroom.
    id_b: String,
    #[arg(long, default_value = "es")]
    language: String,
}

#[derive(Debug, Parser)]
struct HistoryArgs {
    /// Clear the history instead of listing it.
    #[arg(long)]
    clear: bool,
}

#[derive(Debug, Parser)]
struct CollectionArgs {
    #[command(subcommand)]
    action: CollectionAction,
}

#[derive(Debug, Subcommand)]
enum CollectionAction {
    /// List collection entries.
    List,
    /// Copy a history entry into the collection.
    Add { id: String },
    /// Remove an entry from the collection.
    Remove { id: String },
    /// Update the field diary of a collection entry.
    Diary(DiaryArgs),
}

#[derive(Debug, Parser)]
struct DiaryArgs {
    id: String,
    #[arg(long)]
    notes: Option<String>,
    /// Date the mushroom was found (ISO format).
    #[arg(long)]
    found_on: Option<String>,
    #[arg(long, requires = "lon")]
    lat: Option<f64>,
    #[arg(long, requires = "lat")]
    lon: Option<f64>,
    /// Photo files to attach (at most three are kept).
    #[arg(long)]
    photo: Vec<PathBuf>,
}

#[derive(Debug, Parser)]
struct QualityArgs {
    /// `standard` or `high`; omit to print the current preference.
    value: Option<String>,
}

fn main() {
    match run() {
        Ok(()) => {}
        Err(err) => {
            eprintln!("fungid: {}", render_error(&err));
            std::process::exit(1);
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let store = RecordStore::new(&cli.store);
    match cli.command {
        Command::IdentifyImage(args) => identify_image(&store, cli.events.as_deref(), args),
        Command::IdentifyText(args) => identify_text(&store, cli.events.as_deref(), args),
        Command::Compare(args) => compare(&store, cli.events.as_deref(), args),
        Command::History(args) => history(&store, args),
        Command::Collection(args) => collection(&store, args),
        Command::Quality(args) => quality(&store, args),
    }
}

fn identify_image(store: &RecordStore, events: Option<&Path>, args: IdentifyImageArgs) -> Result<()> {
    let language = parse_language(&args.language)?;
    let difficulty = parse_difficulty(&args.difficulty)?;
    let quality = resolve_quality(store, args.quality.as_deref())?;
    let location = args.lat.zip(args.lon).map(|(latitude, longitude)| GeoPoint {
        latitude,
        longitude,
    });

    let bytes = fs::read(&args.photo)
        .with_context(|| format!("failed to read {}", args.photo.display()))?;
    let mime = mime_for_photo(&args.photo);

    let engine = build_engine(events)?;
    let outcome =
        engine.identify_from_image(&bytes, mime, location, language, difficulty, quality)?;

    let entry = engine.new_history_entry(
        outcome.record,
        outcome.sources,
        &args.photo.display().to_string(),
        outcome.map_image,
        false,
        outcome.map_failure.is_some(),
    );
    print_entry(&entry)?;
    if !args.no_save {
        store.append_to_history(entry)?;
    }
    Ok(())
}

fn identify_text(store: &RecordStore, events: Option<&Path>, args: IdentifyTextArgs) -> Result<()> {
    let query = args.query.trim();
    if query.is_empty() {
        bail!("the query is empty");
    }
    let language = parse_language(&args.language)?;
    let difficulty = parse_difficulty(&args.difficulty)?;
    let quality = resolve_quality(store, args.quality.as_deref())?;

    let engine = build_engine(events)?;
    let outcome = engine.identify_from_text(query, language, difficulty, quality)?;

    let subject_failed = outcome.subject_failure.is_some();
    let primary_source = outcome
        .subject_image
        .unwrap_or_else(fungid_engine::images::placeholder_image);
    let entry = engine.new_history_entry(
        outcome.record,
        outcome.sources,
        &primary_source,
        outcome.map_image,
        subject_failed,
        outcome.map_failure.is_some(),
    );
    print_entry(&entry)?;
    if !args.no_save {
        store.append_to_history(entry)?;
    }
    Ok(())
}

fn compare(store: &RecordStore, events: Option<&Path>, args: CompareArgs) -> Result<()> {
    let language = parse_language(&args.language)?;
    let a = find_entry(store, &args.id_a)?;
    let b = find_entry(store, &args.id_b)?;
    let engine = build_engine(events)?;
    let comparison = engine.compare(&a.record, &b.record, language)?;
    println!("{}", serde_json::to_string_pretty(&comparison)?);
    Ok(())
}

fn history(store: &RecordStore, args: HistoryArgs) -> Result<()> {
    if args.clear {
        store.clear_history()?;
        println!("history cleared");
        return Ok(());
    }
    let entries = store.history();
    if entries.is_empty() {
        println!("history is empty");
        return Ok(());
    }
    for entry in entries {
        print_entry_line(&entry);
    }
    Ok(())
}

fn collection(store: &RecordStore, args: CollectionArgs) -> Result<()> {
    match args.action {
        CollectionAction::List => {
            let entries = store.collection();
            if entries.is_empty() {
                println!("collection is empty");
                return Ok(());
            }
            for entry in entries {
                print_entry_line(&entry);
            }
            Ok(())
        }
        CollectionAction::Add { id } => {
            let entry = store
                .history()
                .into_iter()
                .find(|entry| entry.id == id)
                .with_context(|| format!("no history entry with id {id}"))?;
            store.add_to_collection(&entry)?;
            println!("added {id} to the collection");
            Ok(())
        }
        CollectionAction::Remove { id } => {
            store.remove_from_collection(&id)?;
            println!("removed {id} (if it was present)");
            Ok(())
        }
        CollectionAction::Diary(args) => diary(store, args),
    }
}

fn diary(store: &RecordStore, args: DiaryArgs) -> Result<()> {
    let photos = if args.photo.is_empty() {
        None
    } else {
        // Diary photos are canonicalized and thumbnailed exactly like the
        // primary image so exports never hit a dead reference.
        let http = HttpClient::new();
        Some(
            args.photo
                .iter()
                .map(|path| {
                    let normalized = normalize_to_data_url(&http, &path.display().to_string());
                    thumbnail_data_url(&normalized, THUMBNAIL_MAX_DIM)
                })
                .collect(),
        )
    };
    let update = DiaryUpdate {
        notes: args.notes,
        found_on: args.found_on,
        location: args.lat.zip(args.lon).map(|(latitude, longitude)| GeoPoint {
            latitude,
            longitude,
        }),
        photos,
    };
    if store.update_diary_fields(&args.id, &update)? {
        println!("diary updated for {}", args.id);
    } else {
        bail!("no collection entry with id {}", args.id);
    }
    Ok(())
}

fn quality(store: &RecordStore, args: QualityArgs) -> Result<()> {
    match args.value {
        None => {
            let current = store
                .image_quality()
                .unwrap_or(ImageQuality::Standard)
                .as_str();
            println!("{current}");
            Ok(())
        }
        Some(raw) => {
            let quality = ImageQuality::parse(&raw)
                .with_context(|| format!("unknown quality '{raw}' (use standard or high)"))?;
            store.set_image_quality(quality)?;
            println!("image quality set to {}", quality.as_str());
            Ok(())
        }
    }
}

fn build_engine(events: Option<&Path>) -> Result<IdentificationEngine> {
    let config = EngineConfig::from_env()?;
    let mut engine = IdentificationEngine::new(config);
    if let Some(path) = events {
        let session = format!("cli-{}", std::process::id());
        engine = engine.with_events(EventWriter::new(path, session));
    }
    Ok(engine)
}

fn find_entry(store: &RecordStore, id: &str) -> Result<HistoryEntry> {
    store
        .collection()
        .into_iter()
        .chain(store.history())
        .find(|entry| entry.id == id)
        .with_context(|| format!("no stored entry with id {id}"))
}

fn resolve_quality(store: &RecordStore, flag: Option<&str>) -> Result<ImageQuality> {
    match flag {
        Some(raw) => ImageQuality::parse(raw)
            .with_context(|| format!("unknown quality '{raw}' (use standard or high)")),
        None => Ok(store.image_quality().unwrap_or(ImageQuality::Standard)),
    }
}

fn parse_language(raw: &str) -> Result<Language> {
    Language::parse(raw).with_context(|| format!("unknown language '{raw}' (use es or en)"))
}

fn parse_difficulty(raw: &str) -> Result<Difficulty> {
    Difficulty::parse(raw).with_context(|| {
        format!("unknown difficulty '{raw}' (use beginner, intermediate, or expert)")
    })
}

fn mime_for_photo(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "heic" | "heif" => "image/heic",
        // Anything else is rejected by the engine before any network call.
        _ => "application/octet-stream",
    }
}

fn print_entry(entry: &HistoryEntry) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&entry.record)?);
    println!();
    print_entry_line(entry);
    if !entry.sources.is_empty() {
        println!("sources:");
        for source in &entry.sources {
            println!("  - {} <{}>", source.title, source.uri);
        }
    }
    if entry.subject_image_failed {
        println!("note: subject image generation failed; a placeholder is stored");
    }
    if entry.map_image_failed {
        println!("note: distribution map generation failed");
    }
    Ok(())
}

fn print_entry_line(entry: &HistoryEntry) {
    println!(
        "{}  {} ({})  toxicity: {}{}",
        entry.id,
        entry.record.common_name,
        entry.record.scientific_name,
        entry.record.toxicity.level.as_str(),
        toxicity_warning(entry.record.toxicity.level),
    );
}

fn toxicity_warning(level: ToxicityLevel) -> &'static str {
    match level {
        ToxicityLevel::Poisonous | ToxicityLevel::Lethal => "  !! do not consume",
        ToxicityLevel::Caution => "  (verify before consuming)",
        ToxicityLevel::Edible | ToxicityLevel::Inedible => "",
    }
}

fn render_error(err: &anyhow::Error) -> String {
    match err.downcast_ref::<IdentifyError>() {
        Some(kind) => user_message(kind).to_string(),
        None => format!("{err:#}"),
    }
}

/// User-facing message per error kind. The mapping lives here, at the UI
/// boundary; the engine only classifies.
fn user_message(err: &IdentifyError) -> &'static str {
    match err {
        IdentifyError::ConfigMissing => {
            "No API credential is configured. Set FUNGID_API_KEY (or GEMINI_API_KEY / GOOGLE_API_KEY) and retry."
        }
        IdentifyError::InvalidCredential(_) => {
            "The provider rejected the API credential. Check the configured key and retry."
        }
        IdentifyError::QuotaExceeded(_) => {
            "The identification service is in high demand right now. Try again in a few minutes."
        }
        IdentifyError::NetworkFailure(_) => {
            "Could not reach the identification service. Check the connection and retry."
        }
        IdentifyError::InvalidResponse(_) => {
            "The service returned an unexpected response. Try again."
        }
        IdentifyError::IdentificationFailed => {
            "Could not identify the mushroom. Try a clearer photo or a more specific name."
        }
        IdentifyError::ImageUploadInvalid(_) => "The selected file is not an image.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_guesses_cover_common_photo_extensions() {
        assert_eq!(mime_for_photo(Path::new("a/b/seta.JPG")), "image/jpeg");
        assert_eq!(mime_for_photo(Path::new("seta.png")), "image/png");
        assert_eq!(
            mime_for_photo(Path::new("informe.pdf")),
            "application/octet-stream"
        );
        assert_eq!(mime_for_photo(Path::new("sin_extension")), "application/octet-stream");
    }

    #[test]
    fn every_error_kind_has_a_user_message() {
        let errors = [
            IdentifyError::ConfigMissing,
            IdentifyError::InvalidCredential(String::new()),
            IdentifyError::QuotaExceeded(String::new()),
            IdentifyError::NetworkFailure(String::new()),
            IdentifyError::InvalidResponse(String::new()),
            IdentifyError::IdentificationFailed,
            IdentifyError::ImageUploadInvalid(String::new()),
        ];
        for err in errors {
            assert!(!user_message(&err).is_empty());
        }
    }
}
