use fungid_contracts::records::{is_not_available, ImageQuality, MushroomRecord};

/// Locale of the generated prose. The key set of the requested JSON never
/// changes with the language; only the language of the field contents does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Spanish,
    English,
}

impl Language {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "es" | "spanish" | "español" | "espanol" => Some(Language::Spanish),
            "en" | "english" => Some(Language::English),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Spanish => "es",
            Language::English => "en",
        }
    }

    fn response_language(&self) -> &'static str {
        match self {
            Language::Spanish => "Spanish",
            Language::English => "English",
        }
    }
}

/// Detail-level selector. Affects only the register and verbosity of the
/// requested prose; the required key set is identical across tiers, so the
/// sanitizer treats every tier the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Expert,
}

impl Difficulty {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "beginner" | "principiante" => Some(Difficulty::Beginner),
            "intermediate" | "intermedio" => Some(Difficulty::Intermediate),
            "expert" | "experto" => Some(Difficulty::Expert),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Expert => "expert",
        }
    }

    fn register_clause(&self) -> &'static str {
        match self {
            Difficulty::Beginner => {
                "Write for a curious beginner: plain everyday language, no jargon, \
                 two or three short sentences per text field."
            }
            Difficulty::Intermediate => {
                "Write for an amateur forager: accessible language with the common \
                 technical terms explained in passing, moderate detail."
            }
            Difficulty::Expert => {
                "Write for a trained mycologist: precise terminology (hymenium, \
                 annulus, volva, spore print) and thorough morphological and \
                 ecological detail."
            }
        }
    }
}

const RECORD_SHAPE: &str = r#"{
  "nombreComun": string,
  "nombreCientifico": string,
  "sinonimos": [string],
  "descripcionGeneral": string,
  "habitat": string,
  "temporada": string,
  "distribucionGeografica": string,
  "usosCulinarios": [string],
  "toxicidad": {
    "descripcion": string,
    "nivelToxicidad": string,
    "compuestosToxicos": [string],
    "sintomas": string,
    "primerosAuxilios": string
  },
  "recetas": [{"nombre": string, "ingredientes": [string], "instrucciones": string}],
  "hongosSimilares": [{"nombreComun": string, "nombreCientifico": string, "diferenciaClave": string, "esToxico": boolean}]
}"#;

const COMPARISON_SHAPE: &str = r#"{
  "resumenComparativo": string,
  "similitudesCulinarias": [string],
  "diferenciasCulinarias": [string],
  "comparacionToxicidad": {"descripcion": string, "nivelToxicidadA": string, "nivelToxicidadB": string},
  "diferenciasMorfologicas": {"habitat": string, "apariencia": string}
}"#;

/// Builds the identification instruction. `context` names the subject: for
/// the image flow it describes the attached photograph, for the text flow it
/// quotes the user's query. Pure function of its arguments.
pub fn identify_prompt(context: &str, language: Language, difficulty: Difficulty) -> String {
    format!(
        "You are an expert mycologist. Identify {context}.\n\
         Respond with a single JSON object and nothing else, using exactly this shape \
         and exactly these keys:\n{shape}\n\
         Rules:\n\
         - \"nivelToxicidad\" must be exactly one of: \"edible\", \"inedible\", \
         \"caution\", \"poisonous\", \"lethal\".\n\
         - Every list key must be present; use an empty array [] instead of omitting it.\n\
         - Use the string \"No disponible\" for any text field you cannot fill.\n\
         - Write all field contents in {response_language}.\n\
         - {register}\n\
         If you cannot identify the mushroom, respond with exactly \
         {{\"error\": \"IDENTIFICATION_FAILED\"}} and nothing else.",
        context = context,
        shape = RECORD_SHAPE,
        response_language = language.response_language(),
        register = difficulty.register_clause(),
    )
}

/// Context string for the image-based flow, optionally carrying the
/// caller's coordinates as a locality hint.
pub fn photo_context(location: Option<(f64, f64)>) -> String {
    match location {
        Some((lat, lon)) => format!(
            "the mushroom in the attached photograph, taken near latitude {lat:.4}, \
             longitude {lon:.4}; weigh species plausible for that locality"
        ),
        None => "the mushroom in the attached photograph".to_string(),
    }
}

/// Context string for the text-based flow.
pub fn query_context(query: &str) -> String {
    format!("the mushroom known as \"{}\"", query.trim())
}

/// Builds the two-mushroom comparison instruction.
pub fn compare_prompt(a: &MushroomRecord, b: &MushroomRecord, language: Language) -> String {
    format!(
        "You are an expert mycologist. Compare mushroom A, {a_common} ({a_sci}), \
         with mushroom B, {b_common} ({b_sci}).\n\
         Respond with a single JSON object and nothing else, using exactly this shape \
         and exactly these keys:\n{shape}\n\
         Rules:\n\
         - \"nivelToxicidadA\" and \"nivelToxicidadB\" must each be exactly one of: \
         \"edible\", \"inedible\", \"caution\", \"poisonous\", \"lethal\".\n\
         - Every list key must be present; use an empty array [] instead of omitting it.\n\
         - Write all field contents in {response_language}.",
        a_common = a.common_name,
        a_sci = a.scientific_name,
        b_common = b.common_name,
        b_sci = b.scientific_name,
        shape = COMPARISON_SHAPE,
        response_language = language.response_language(),
    )
}

/// Prompt for the photorealistic subject rendering.
pub fn subject_image_prompt(record: &MushroomRecord) -> String {
    let habitat = if is_not_available(&record.habitat) {
        "its natural habitat".to_string()
    } else {
        record.habitat.clone()
    };
    format!(
        "Photorealistic field photograph of the mushroom {common} ({scientific}) \
         growing in {habitat}. Natural daylight, shallow depth of field, the whole \
         fruiting body visible including the stem base. No text, no watermark.",
        common = record.common_name,
        scientific = record.scientific_name,
        habitat = habitat,
    )
}

/// Prompt for the distribution-map rendering. Callers must skip the call
/// entirely when the distribution description is a placeholder.
pub fn distribution_map_prompt(record: &MushroomRecord) -> String {
    format!(
        "Clean minimalist world map on a light background highlighting in green the \
         regions where the mushroom {scientific} occurs: {distribution}. Flat \
         cartographic style, no labels, no text, no watermark.",
        scientific = record.scientific_name,
        distribution = record.distribution,
    )
}

/// Gemini image-size hint for a quality tier.
pub fn image_size_hint(quality: ImageQuality) -> &'static str {
    match quality {
        ImageQuality::Standard => "1K",
        ImageQuality::High => "2K",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED_KEYS: [&str; 11] = [
        "nombreComun",
        "nombreCientifico",
        "sinonimos",
        "descripcionGeneral",
        "habitat",
        "temporada",
        "distribucionGeografica",
        "usosCulinarios",
        "toxicidad",
        "recetas",
        "hongosSimilares",
    ];

    #[test]
    fn identify_prompt_enumerates_every_required_key() {
        for difficulty in [
            Difficulty::Beginner,
            Difficulty::Intermediate,
            Difficulty::Expert,
        ] {
            let prompt = identify_prompt("a test subject", Language::Spanish, difficulty);
            for key in REQUIRED_KEYS {
                assert!(prompt.contains(key), "{key} missing at {difficulty:?}");
            }
            for level in ["edible", "inedible", "caution", "poisonous", "lethal"] {
                assert!(prompt.contains(level));
            }
            assert!(prompt.contains("IDENTIFICATION_FAILED"));
            assert!(prompt.contains("empty array"));
        }
    }

    #[test]
    fn difficulty_changes_register_not_keys() {
        let beginner = identify_prompt("x", Language::English, Difficulty::Beginner);
        let expert = identify_prompt("x", Language::English, Difficulty::Expert);
        assert_ne!(beginner, expert);
        for key in REQUIRED_KEYS {
            assert_eq!(beginner.contains(key), expert.contains(key));
        }
    }

    #[test]
    fn prompts_are_deterministic() {
        let a = identify_prompt("x", Language::Spanish, Difficulty::Intermediate);
        let b = identify_prompt("x", Language::Spanish, Difficulty::Intermediate);
        assert_eq!(a, b);
    }

    #[test]
    fn photo_context_mentions_coordinates_when_present() {
        let with = photo_context(Some((42.1234, -3.9876)));
        assert!(with.contains("42.1234"));
        assert!(with.contains("-3.9876"));
        let without = photo_context(None);
        assert!(!without.contains("latitude"));
    }

    #[test]
    fn language_and_difficulty_parse_round_trip() {
        assert_eq!(Language::parse("ES"), Some(Language::Spanish));
        assert_eq!(Language::parse("english"), Some(Language::English));
        assert_eq!(Language::parse("fr"), None);
        assert_eq!(Difficulty::parse("experto"), Some(Difficulty::Expert));
        assert_eq!(Difficulty::parse("??"), None);
    }
}
