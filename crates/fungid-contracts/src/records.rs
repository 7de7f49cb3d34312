use serde::{Deserialize, Serialize};

/// Placeholder substituted for an empty common or scientific name after
/// sanitization. Downstream code may rely on these fields being non-empty.
pub const UNKNOWN_NAME: &str = "Desconocido";

/// Placeholder the model is instructed to emit when a text field has no
/// usable content (for example a distribution description it cannot give).
pub const NOT_AVAILABLE: &str = "No disponible";

/// Default scientific name for a similar-mushroom entry that omitted one.
pub const SCIENTIFIC_NAME_FALLBACK: &str = "N/A";

/// True when a text field carries one of the recognized "nothing here"
/// placeholders rather than real content.
pub fn is_not_available(text: &str) -> bool {
    let normalized = text.trim().to_lowercase();
    normalized.is_empty()
        || normalized == "no disponible"
        || normalized == "not available"
        || normalized == "n/a"
        || normalized == "desconocido"
        || normalized == "unknown"
}

/// Severity scale for a mushroom's toxicity. The wire contract allows the
/// model to answer in English or Spanish; anything unrecognized collapses to
/// `Caution`, never to an arbitrary pass-through string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToxicityLevel {
    Edible,
    Inedible,
    Caution,
    Poisonous,
    Lethal,
}

impl Default for ToxicityLevel {
    fn default() -> Self {
        ToxicityLevel::Caution
    }
}

impl ToxicityLevel {
    /// Parses a wire value into a level. Only recognized spellings map to a
    /// level; numbers, objects, misspellings, and absence all yield `Caution`.
    pub fn from_wire(value: Option<&serde_json::Value>) -> Self {
        let Some(raw) = value.and_then(serde_json::Value::as_str) else {
            return ToxicityLevel::Caution;
        };
        match raw.trim().to_lowercase().as_str() {
            "edible" | "comestible" => ToxicityLevel::Edible,
            "inedible" | "no comestible" | "incomestible" => ToxicityLevel::Inedible,
            "caution" | "precaucion" | "precaución" => ToxicityLevel::Caution,
            "poisonous" | "toxic" | "venenoso" | "toxico" | "tóxico" => ToxicityLevel::Poisonous,
            "lethal" | "deadly poisonous" | "mortal" | "letal" => ToxicityLevel::Lethal,
            _ => ToxicityLevel::Caution,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToxicityLevel::Edible => "edible",
            ToxicityLevel::Inedible => "inedible",
            ToxicityLevel::Caution => "caution",
            ToxicityLevel::Poisonous => "poisonous",
            ToxicityLevel::Lethal => "lethal",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Toxicity {
    #[serde(rename = "descripcion", default)]
    pub description: String,
    #[serde(rename = "nivelToxicidad", default)]
    pub level: ToxicityLevel,
    #[serde(rename = "compuestosToxicos", default)]
    pub compounds: Vec<String>,
    #[serde(rename = "sintomas", default)]
    pub symptoms: String,
    #[serde(rename = "primerosAuxilios", default)]
    pub first_aid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "ingredientes", default)]
    pub ingredients: Vec<String>,
    #[serde(rename = "instrucciones")]
    pub instructions: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarMushroom {
    #[serde(rename = "nombreComun")]
    pub common_name: String,
    #[serde(rename = "nombreCientifico", default)]
    pub scientific_name: String,
    #[serde(rename = "diferenciaClave", default)]
    pub key_difference: String,
    /// Defaults to `true`: an unspecified lookalike is treated as toxic.
    #[serde(rename = "esToxico", default = "default_true")]
    pub is_toxic: bool,
}

fn default_true() -> bool {
    true
}

/// Canonical identification result. Every field is populated after
/// sanitization; list fields are empty rather than absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MushroomRecord {
    #[serde(rename = "nombreComun")]
    pub common_name: String,
    #[serde(rename = "nombreCientifico")]
    pub scientific_name: String,
    #[serde(rename = "sinonimos", default)]
    pub synonyms: Vec<String>,
    #[serde(rename = "descripcionGeneral", default)]
    pub description: String,
    #[serde(rename = "habitat", default)]
    pub habitat: String,
    #[serde(rename = "temporada", default)]
    pub season: String,
    #[serde(rename = "distribucionGeografica", default)]
    pub distribution: String,
    #[serde(rename = "usosCulinarios", default)]
    pub culinary_uses: Vec<String>,
    #[serde(rename = "toxicidad", default)]
    pub toxicity: Toxicity,
    #[serde(rename = "recetas", default)]
    pub recipes: Vec<Recipe>,
    #[serde(rename = "hongosSimilares", default)]
    pub similar: Vec<SimilarMushroom>,
}

/// Toxicity portion of a two-mushroom comparison.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToxicityComparison {
    #[serde(rename = "descripcion", default)]
    pub description: String,
    #[serde(rename = "nivelToxicidadA", default)]
    pub level_a: ToxicityLevel,
    #[serde(rename = "nivelToxicidadB", default)]
    pub level_b: ToxicityLevel,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MorphologyComparison {
    #[serde(rename = "habitat", default)]
    pub habitat: String,
    #[serde(rename = "apariencia", default)]
    pub appearance: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRecord {
    #[serde(rename = "resumenComparativo", default)]
    pub summary: String,
    #[serde(rename = "similitudesCulinarias", default)]
    pub culinary_similarities: Vec<String>,
    #[serde(rename = "diferenciasCulinarias", default)]
    pub culinary_differences: Vec<String>,
    #[serde(rename = "comparacionToxicidad", default)]
    pub toxicity: ToxicityComparison,
    #[serde(rename = "diferenciasMorfologicas", default)]
    pub morphology: MorphologyComparison,
}

/// Citation attached to a web-search-grounded model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundingSource {
    pub title: String,
    pub uri: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// User-authored supplement attached to a Collection entry only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldDiary {
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub found_on: Option<String>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub photos: Vec<String>,
}

/// Partial diary update; `Some` fields replace the stored value.
#[derive(Debug, Clone, Default)]
pub struct DiaryUpdate {
    pub notes: Option<String>,
    pub found_on: Option<String>,
    pub location: Option<GeoPoint>,
    pub photos: Option<Vec<String>>,
}

/// Resolution tier for generated imagery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageQuality {
    Standard,
    High,
}

impl ImageQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageQuality::Standard => "standard",
            ImageQuality::High => "high",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "standard" => Some(ImageQuality::Standard),
            "high" => Some(ImageQuality::High),
            _ => None,
        }
    }
}

/// Persisted unit of the history and collection stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub timestamp: u64,
    /// Stable data-URL encoding of the primary image. Never a transient
    /// object reference; export and re-render must not depend on a live
    /// session.
    pub image: String,
    pub record: MushroomRecord,
    #[serde(default)]
    pub sources: Vec<GroundingSource>,
    #[serde(default)]
    pub map_image: Option<String>,
    #[serde(default)]
    pub subject_image_failed: bool,
    #[serde(default)]
    pub map_image_failed: bool,
    #[serde(default)]
    pub diary: Option<FieldDiary>,
}

impl HistoryEntry {
    /// Builds the synthetic identifier: epoch milliseconds plus a slug of
    /// the scientific name. Two identifications of the same species within
    /// the same millisecond collide; this is a documented limitation of the
    /// scheme, not a guaranteed-unique key.
    pub fn synthetic_id(timestamp_ms: u64, scientific_name: &str) -> String {
        format!("{}-{}", timestamp_ms, slugify(scientific_name))
    }
}

fn slugify(name: &str) -> String {
    let mut slug = String::new();
    for ch in name.trim().to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
        } else if (ch.is_whitespace() || ch == '-' || ch == '_') && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let trimmed = slug.trim_matches('-');
    if trimmed.is_empty() {
        "sin-nombre".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn toxicity_level_parses_both_locales() {
        let cases = [
            (json!("comestible"), ToxicityLevel::Edible),
            (json!("Edible"), ToxicityLevel::Edible),
            (json!("no comestible"), ToxicityLevel::Inedible),
            (json!("VENENOSO"), ToxicityLevel::Poisonous),
            (json!("mortal"), ToxicityLevel::Lethal),
            (json!("deadly poisonous"), ToxicityLevel::Lethal),
        ];
        for (raw, expected) in cases {
            assert_eq!(ToxicityLevel::from_wire(Some(&raw)), expected);
        }
    }

    #[test]
    fn toxicity_level_defaults_to_caution_on_garbage() {
        assert_eq!(
            ToxicityLevel::from_wire(Some(&json!("DEADLY"))),
            ToxicityLevel::Caution
        );
        assert_eq!(
            ToxicityLevel::from_wire(Some(&json!(4))),
            ToxicityLevel::Caution
        );
        assert_eq!(
            ToxicityLevel::from_wire(Some(&json!({"nivel": "mortal"}))),
            ToxicityLevel::Caution
        );
        assert_eq!(ToxicityLevel::from_wire(None), ToxicityLevel::Caution);
    }

    #[test]
    fn synthetic_id_combines_stamp_and_slug() {
        assert_eq!(
            HistoryEntry::synthetic_id(1700000000123, "Amanita phalloides"),
            "1700000000123-amanita-phalloides"
        );
        assert_eq!(
            HistoryEntry::synthetic_id(7, "  ??? "),
            "7-sin-nombre"
        );
    }

    #[test]
    fn not_available_placeholders_are_recognized() {
        assert!(is_not_available("No disponible"));
        assert!(is_not_available(" not available "));
        assert!(is_not_available(""));
        assert!(!is_not_available("Europa templada y Norteamérica"));
    }

    #[test]
    fn similar_mushroom_toxicity_defaults_true_when_unspecified() {
        let entry: SimilarMushroom = serde_json::from_value(json!({
            "nombreComun": "Falsa oronja",
            "diferenciaClave": "Sombrero rojo con verrugas blancas",
        }))
        .unwrap();
        assert!(entry.is_toxic);
    }
}
