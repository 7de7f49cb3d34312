use fungid_contracts::records::{
    ComparisonRecord, MorphologyComparison, MushroomRecord, Recipe, SimilarMushroom, Toxicity,
    ToxicityComparison, ToxicityLevel, SCIENTIFIC_NAME_FALLBACK, UNKNOWN_NAME,
};
use serde_json::{Map, Value};

/// Sole trust boundary between untyped model output and the data model.
///
/// Returns `None` only when the payload is recognizably not an
/// identification: the model's own `error` signal, a non-object payload, or
/// both name fields empty after trimming. A single empty name is treated as
/// identified-with-defaults, not as failure. Any individual malformed field
/// falls back to its default instead of rejecting the record.
pub fn sanitize_mushroom(raw: &Value) -> Option<MushroomRecord> {
    let obj = raw.as_object()?;
    if has_error_signal(obj) {
        return None;
    }

    let common = text_of(obj.get("nombreComun"));
    let scientific = text_of(obj.get("nombreCientifico"));
    if common.is_empty() && scientific.is_empty() {
        return None;
    }

    Some(MushroomRecord {
        common_name: non_empty_or(common, UNKNOWN_NAME),
        scientific_name: non_empty_or(scientific, UNKNOWN_NAME),
        synonyms: string_list(obj.get("sinonimos")),
        description: text_of(obj.get("descripcionGeneral")),
        habitat: text_of(obj.get("habitat")),
        season: text_of(obj.get("temporada")),
        distribution: text_of(obj.get("distribucionGeografica")),
        culinary_uses: string_list(obj.get("usosCulinarios")),
        toxicity: sanitize_toxicity(obj.get("toxicidad")),
        recipes: sanitize_recipes(obj.get("recetas")),
        similar: sanitize_similar(obj.get("hongosSimilares")),
    })
}

/// Comparison results carry no identification to reject on; only a
/// non-object payload or an explicit error signal is refused. Every field
/// defaults on absence.
pub fn sanitize_comparison(raw: &Value) -> Option<ComparisonRecord> {
    let obj = raw.as_object()?;
    if has_error_signal(obj) {
        return None;
    }

    let toxicity = obj
        .get("comparacionToxicidad")
        .and_then(Value::as_object)
        .map(|tox| ToxicityComparison {
            description: text_of(tox.get("descripcion")),
            level_a: ToxicityLevel::from_wire(tox.get("nivelToxicidadA")),
            level_b: ToxicityLevel::from_wire(tox.get("nivelToxicidadB")),
        })
        .unwrap_or_default();

    let morphology = obj
        .get("diferenciasMorfologicas")
        .and_then(Value::as_object)
        .map(|morph| MorphologyComparison {
            habitat: text_of(morph.get("habitat")),
            appearance: text_of(morph.get("apariencia")),
        })
        .unwrap_or_default();

    Some(ComparisonRecord {
        summary: text_of(obj.get("resumenComparativo")),
        culinary_similarities: string_list(obj.get("similitudesCulinarias")),
        culinary_differences: string_list(obj.get("diferenciasCulinarias")),
        toxicity,
        morphology,
    })
}

fn has_error_signal(obj: &Map<String, Value>) -> bool {
    obj.get("error").map(|v| !v.is_null()).unwrap_or(false)
}

fn sanitize_toxicity(value: Option<&Value>) -> Toxicity {
    let Some(tox) = value.and_then(Value::as_object) else {
        return Toxicity::default();
    };
    Toxicity {
        description: text_of(tox.get("descripcion")),
        level: ToxicityLevel::from_wire(tox.get("nivelToxicidad")),
        compounds: string_list(tox.get("compuestosToxicos")),
        symptoms: text_of(tox.get("sintomas")),
        first_aid: text_of(tox.get("primerosAuxilios")),
    }
}

/// A recipe is only constructed when both its name and its instructions are
/// recognizably present.
fn sanitize_recipes(value: Option<&Value>) -> Vec<Recipe> {
    let Some(rows) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|row| {
            let recipe = row.as_object()?;
            let name = text_of(recipe.get("nombre"));
            let instructions = text_of(recipe.get("instrucciones"));
            if name.is_empty() || instructions.is_empty() {
                return None;
            }
            Some(Recipe {
                name,
                ingredients: string_list(recipe.get("ingredientes")),
                instructions,
            })
        })
        .collect()
}

/// Entries lacking both a common name and a key difference are discarded
/// entirely; partial entries must not reach the UI. Toxicity defaults to
/// `true` when unspecified, the safer assumption for a lookalike.
fn sanitize_similar(value: Option<&Value>) -> Vec<SimilarMushroom> {
    let Some(rows) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|row| {
            let entry = row.as_object()?;
            let common = text_of(entry.get("nombreComun"));
            let difference = text_of(entry.get("diferenciaClave"));
            if common.is_empty() && difference.is_empty() {
                return None;
            }
            Some(SimilarMushroom {
                common_name: non_empty_or(common, UNKNOWN_NAME),
                scientific_name: non_empty_or(
                    text_of(entry.get("nombreCientifico")),
                    SCIENTIFIC_NAME_FALLBACK,
                ),
                key_difference: difference,
                is_toxic: entry
                    .get("esToxico")
                    .and_then(Value::as_bool)
                    .unwrap_or(true),
            })
        })
        .collect()
}

/// Renders an arbitrary value as readable text for a string field. Structured
/// values are flattened (one line per key) rather than leaking an opaque
/// serialized representation to the UI.
fn text_of(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.trim().to_string(),
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::Bool(flag)) => flag.to_string(),
        Some(Value::Object(map)) => flatten_object(map),
        Some(Value::Array(rows)) => rows
            .iter()
            .map(|row| text_of(Some(row)))
            .filter(|line| !line.is_empty())
            .collect::<Vec<String>>()
            .join("\n"),
        _ => String::new(),
    }
}

fn flatten_object(map: &Map<String, Value>) -> String {
    map.iter()
        .map(|(key, value)| {
            let rendered = text_of(Some(value));
            if rendered.is_empty() {
                key.clone()
            } else {
                format!("{key}: {rendered}")
            }
        })
        .collect::<Vec<String>>()
        .join("\n")
}

/// List fields keep only non-empty string elements; a malformed element is
/// dropped on its own, never the whole list.
fn string_list(value: Option<&Value>) -> Vec<String> {
    let Some(rows) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn sanitizes_a_full_record() {
        let raw = json!({
            "nombreComun": " Níscalo ",
            "nombreCientifico": "Lactarius deliciosus",
            "sinonimos": ["Rovellón", "Rebollón"],
            "descripcionGeneral": "Sombrero anaranjado con zonas concéntricas.",
            "habitat": "Pinares",
            "temporada": "Otoño",
            "distribucionGeografica": "Mediterráneo occidental",
            "usosCulinarios": ["A la plancha", "Guisado"],
            "toxicidad": {
                "descripcion": "Comestible apreciado",
                "nivelToxicidad": "comestible",
                "compuestosToxicos": [],
                "sintomas": "No disponible",
                "primerosAuxilios": "No disponible"
            },
            "recetas": [{"nombre": "Níscalos al ajillo", "ingredientes": ["ajo"], "instrucciones": "Saltear."}],
            "hongosSimilares": [{"nombreComun": "Falso níscalo", "diferenciaClave": "Látex blanco", "esToxico": true}]
        });
        let record = sanitize_mushroom(&raw).unwrap();
        assert_eq!(record.common_name, "Níscalo");
        assert_eq!(record.toxicity.level, ToxicityLevel::Edible);
        assert_eq!(record.recipes.len(), 1);
        assert_eq!(record.similar.len(), 1);
    }

    #[test]
    fn sanitize_is_idempotent() {
        let raw = json!({
            "nombreComun": "",
            "nombreCientifico": "Amanita muscaria",
            "sinonimos": ["Matamoscas", 7, null],
            "habitat": {"bosque": "abedules", "suelo": "ácido"},
            "toxicidad": {"nivelToxicidad": "venenoso"},
            "hongosSimilares": [{"nombreComun": "Oronja", "esToxico": false}]
        });
        let first = sanitize_mushroom(&raw).unwrap();
        let reencoded = serde_json::to_value(&first).unwrap();
        let second = sanitize_mushroom(&reencoded).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn every_field_is_defaulted_never_absent() {
        let record = sanitize_mushroom(&json!({"nombreCientifico": "Boletus edulis"})).unwrap();
        assert_eq!(record.common_name, UNKNOWN_NAME);
        assert!(record.synonyms.is_empty());
        assert!(record.culinary_uses.is_empty());
        assert!(record.recipes.is_empty());
        assert!(record.similar.is_empty());
        assert_eq!(record.toxicity.level, ToxicityLevel::Caution);
        assert_eq!(record.toxicity.symptoms, "");
    }

    #[test]
    fn unrecognized_toxicity_level_collapses_to_caution() {
        let raw = json!({
            "nombreComun": "",
            "nombreCientifico": "Amanita phalloides",
            "toxicidad": {"nivelToxicidad": "DEADLY"}
        });
        let record = sanitize_mushroom(&raw).unwrap();
        assert_eq!(record.common_name, UNKNOWN_NAME);
        assert_eq!(record.toxicity.level, ToxicityLevel::Caution);
        assert_eq!(record.scientific_name, "Amanita phalloides");
    }

    #[test]
    fn toxicity_level_survives_number_and_object_inputs() {
        for bad in [json!(3), json!({"nivel": "mortal"}), json!(null)] {
            let raw = json!({
                "nombreCientifico": "X y",
                "toxicidad": {"nivelToxicidad": bad}
            });
            let record = sanitize_mushroom(&raw).unwrap();
            assert_eq!(record.toxicity.level, ToxicityLevel::Caution);
        }
    }

    #[test]
    fn structured_symptoms_flatten_to_one_line_per_key() {
        let raw = json!({
            "nombreCientifico": "Amanita phalloides",
            "toxicidad": {
                "sintomas": {
                    "fase inicial": "náuseas y vómitos",
                    "fase tardía": "fallo hepático"
                }
            }
        });
        let record = sanitize_mushroom(&raw).unwrap();
        let lines: Vec<&str> = record.toxicity.symptoms.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().any(|l| l.contains("fase inicial")));
        assert!(lines.iter().any(|l| l.contains("fallo hepático")));
    }

    #[test]
    fn list_fields_drop_non_string_elements_individually() {
        let raw = json!({
            "nombreCientifico": "Boletus edulis",
            "sinonimos": ["Porcini", 42, {"x": 1}, "", "Cep"],
        });
        let record = sanitize_mushroom(&raw).unwrap();
        assert_eq!(record.synonyms, vec!["Porcini", "Cep"]);
    }

    #[test]
    fn invalid_similar_entries_are_dropped_entirely() {
        let raw = json!({
            "nombreCientifico": "Cantharellus cibarius",
            "hongosSimilares": [
                {"nombreComun": "Rebozuelo anaranjado", "diferenciaClave": "Láminas verdaderas"},
                {"esToxico": false},
                {"nombreComun": "", "diferenciaClave": "Pie hueco"}
            ]
        });
        let record = sanitize_mushroom(&raw).unwrap();
        assert_eq!(record.similar.len(), 2);
        assert_eq!(record.similar[0].scientific_name, SCIENTIFIC_NAME_FALLBACK);
        // Unspecified toxicity defaults to the safe assumption.
        assert!(record.similar[0].is_toxic);
        assert_eq!(record.similar[1].common_name, UNKNOWN_NAME);
        assert_eq!(record.similar[1].key_difference, "Pie hueco");
    }

    #[test]
    fn recipes_require_name_and_instructions() {
        let raw = json!({
            "nombreCientifico": "Boletus edulis",
            "recetas": [
                {"nombre": "Risotto", "instrucciones": "Cocer el arroz."},
                {"nombre": "Sin instrucciones"},
                {"instrucciones": "Huérfana"},
                "no es un objeto"
            ]
        });
        let record = sanitize_mushroom(&raw).unwrap();
        assert_eq!(record.recipes.len(), 1);
        assert_eq!(record.recipes[0].name, "Risotto");
    }

    #[test]
    fn error_signal_rejects_the_payload() {
        assert!(sanitize_mushroom(&json!({"error": "IDENTIFICATION_FAILED"})).is_none());
        assert!(sanitize_mushroom(&json!({
            "error": "IDENTIFICATION_FAILED",
            "nombreCientifico": "Boletus edulis"
        }))
        .is_none());
    }

    #[test]
    fn both_names_empty_means_no_identification() {
        assert!(sanitize_mushroom(&json!({"nombreComun": " ", "nombreCientifico": ""})).is_none());
        assert!(sanitize_mushroom(&json!({"habitat": "bosque"})).is_none());
        assert!(sanitize_mushroom(&json!("just a string")).is_none());
    }

    #[test]
    fn comparison_defaults_and_levels() {
        let raw = json!({
            "resumenComparativo": "A es comestible, B es mortal.",
            "comparacionToxicidad": {
                "descripcion": "Riesgo muy distinto",
                "nivelToxicidadA": "edible",
                "nivelToxicidadB": "mortal"
            }
        });
        let comparison = sanitize_comparison(&raw).unwrap();
        assert_eq!(comparison.toxicity.level_a, ToxicityLevel::Edible);
        assert_eq!(comparison.toxicity.level_b, ToxicityLevel::Lethal);
        assert!(comparison.culinary_similarities.is_empty());
        assert_eq!(comparison.morphology.habitat, "");
        assert!(sanitize_comparison(&json!(["not", "an", "object"])).is_none());
    }
}
