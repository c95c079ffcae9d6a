//! Keyword heuristics for work descriptions: priority, category and a
//! rough guess at the replacement parts a job will need.
//!
//! All matching is substring-based on normalized text, so `"Bremsen
//! vorne"` and `"bremsbelag"` both hit the `brems` keys.

use serde::Serialize;
use wki_model::normalize_text;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Hoch,
    Mittel,
    Niedrig,
}

const URGENT: &[&str] = &["dringend", "sofort", "notfall"];
const SAFETY: &[&str] = &["brem", "lenk", "unfall"];
const SOON: &[&str] = &["bald", "zeitnah", "demnaechst"];

pub const FALLBACK_CATEGORY: &str = "Sonstiges";

/// First match wins, so order matters.
const CATEGORIES: &[(&str, &[&str])] = &[
    ("Inspektion", &["inspektion", "service", "wartung", "durchsicht"]),
    ("Bremsen", &["bremse", "brems"]),
    ("Motor", &["motor", "zahnriemen", "kupplung", "getriebe"]),
    ("Elektrik", &["licht", "elektrik", "batterie", "sensor"]),
    ("Klima", &["klima", "kuehl", "kalt", "heizung"]),
    ("Reifen", &["reifen", "rad", "felge"]),
    ("Karosserie", &["karosserie", "tuer", "stoss", "lack"]),
];

const PART_HINTS: &[(&[&str], &[&str])] = &[
    (&["brems", "bremse"], &["Bremsbelaege", "Bremsscheiben"]),
    (&["oel", "ol", "oil"], &["Motoroel", "Oelfilter"]),
    (&["klima", "kuehl", "klimaanlage"], &["Kaeltemittel", "Innenraumfilter"]),
    (&["batterie"], &["Batterie"]),
    (&["reifen"], &["Reifen", "Ventile"]),
    (&["zahnriemen"], &["Zahnriemen-Kit", "Wasserpumpe"]),
    (&["kerze", "zuendkerze"], &["Zuendkerzen"]),
    (&["luftfilter"], &["Luftfilter"]),
];

pub const PART_REASON: &str = "Schluesselwort erkannt";
pub const PART_CONFIDENCE: &str = "mittel";

/// One suggested replacement part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartHint {
    pub name: String,
    #[serde(rename = "grund")]
    pub reason: String,
    #[serde(rename = "sicherheit")]
    pub confidence: String,
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

pub fn priority_from_text(text: &str) -> Priority {
    let norm = normalize_text(text);
    if norm.is_empty() {
        return Priority::Mittel;
    }
    if contains_any(&norm, URGENT) || contains_any(&norm, SAFETY) {
        Priority::Hoch
    } else if contains_any(&norm, SOON) {
        Priority::Mittel
    } else {
        Priority::Niedrig
    }
}

pub fn categorize(text: &str) -> &'static str {
    let norm = normalize_text(text);
    CATEGORIES
        .iter()
        .find(|(_, keys)| contains_any(&norm, keys))
        .map_or(FALLBACK_CATEGORY, |(name, _)| name)
}

/// Parts whose keywords occur in `text`, deduplicated in table order.
pub fn parts_hint(text: &str) -> Vec<PartHint> {
    let norm = normalize_text(text);
    let mut out: Vec<PartHint> = Vec::new();
    for (keys, parts) in PART_HINTS {
        if !contains_any(&norm, keys) {
            continue;
        }
        for part in *parts {
            if out.iter().any(|hint| hint.name == *part) {
                continue;
            }
            out.push(PartHint {
                name: (*part).to_string(),
                reason: PART_REASON.to_string(),
                confidence: PART_CONFIDENCE.to_string(),
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urgency_and_safety_are_high() {
        assert_eq!(priority_from_text("Sofort ansehen"), Priority::Hoch);
        assert_eq!(priority_from_text("Bremsen quietschen"), Priority::Hoch);
        assert_eq!(priority_from_text("Lenkung schwergängig"), Priority::Hoch);
    }

    #[test]
    fn soon_and_empty_are_medium() {
        assert_eq!(priority_from_text("bald Reifen tauschen"), Priority::Mittel);
        assert_eq!(priority_from_text("   "), Priority::Mittel);
        assert_eq!(priority_from_text("Demnächst Ölwechsel"), Priority::Mittel);
    }

    #[test]
    fn everything_else_is_low() {
        assert_eq!(priority_from_text("Scheibenwischer tauschen"), Priority::Niedrig);
    }

    #[test]
    fn priority_serializes_lowercase() {
        let labels: Vec<_> = [Priority::Hoch, Priority::Mittel, Priority::Niedrig]
            .iter()
            .map(|p| serde_json::to_value(p).expect("serialize"))
            .collect();
        assert_eq!(labels, vec!["hoch", "mittel", "niedrig"]);
    }

    #[test]
    fn first_category_wins() {
        assert_eq!(categorize("Inspektion inkl. Bremsen"), "Inspektion");
        assert_eq!(categorize("Bremsbeläge hinten"), "Bremsen");
        assert_eq!(categorize("Kühlwasser nachfüllen"), "Klima");
        assert_eq!(categorize("Stoßstange lackieren"), "Karosserie");
        assert_eq!(categorize("Scheibenwischer"), FALLBACK_CATEGORY);
    }

    #[test]
    fn parts_are_deduplicated() {
        let hints = parts_hint("Bremse vorne, Bremsflüssigkeit und Ölwechsel");
        let names: Vec<&str> = hints.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Bremsbelaege", "Bremsscheiben", "Motoroel", "Oelfilter"]
        );
        assert!(hints.iter().all(|h| h.reason == PART_REASON));
    }

    #[test]
    fn part_hint_uses_wire_names() {
        let hint = &parts_hint("Batterie leer")[0];
        let json = serde_json::to_value(hint).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({"name": "Batterie", "grund": PART_REASON, "sicherheit": "mittel"})
        );
    }
}
