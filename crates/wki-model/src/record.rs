use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::text::normalize_text;

/// Backend status value for a finished job.
pub const STATUS_COMPLETED: &str = "abgeschlossen";

/// One completed job observation held in the training cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub id: u64,
    /// Opaque backend date token; kept for diagnostics only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<Value>,
    pub text: String,
    pub minutes: f64,
}

/// Job record as delivered by the scheduling backend.
///
/// Every field is loosely typed: the backend has shipped ids and durations
/// both as numbers and as strings, and one odd record must not fail a batch.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireRecord {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub datum: Value,
    #[serde(default)]
    pub arbeit: Value,
    #[serde(default)]
    pub tatsaechliche_zeit: Value,
    #[serde(default)]
    pub status: Value,
    #[serde(default)]
    pub ki_training_exclude: Value,
}

/// Reason a wire record was kept out of the training cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disqualified {
    Excluded,
    NotCompleted,
    MissingDescription,
    InvalidDuration,
}

impl WireRecord {
    /// Record identity, if the backend sent something integral.
    pub fn record_id(&self) -> Option<u64> {
        integral(&self.id)
    }

    pub fn is_excluded(&self) -> bool {
        truthy(&self.ki_training_exclude)
    }

    pub fn is_completed(&self) -> bool {
        self.status.as_str() == Some(STATUS_COMPLETED)
    }

    pub fn description(&self) -> Option<&str> {
        self.arbeit.as_str().filter(|s| !s.trim().is_empty())
    }

    /// Actual duration in minutes; only finite, strictly positive values count.
    pub fn minutes(&self) -> Option<f64> {
        let minutes = match &self.tatsaechliche_zeit {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        (minutes.is_finite() && minutes > 0.0).then_some(minutes)
    }

    /// Apply the inclusion rule and build the cached form of this record.
    pub fn qualify(&self, id: u64) -> Result<TrainingRecord, Disqualified> {
        if self.is_excluded() {
            return Err(Disqualified::Excluded);
        }
        if !self.is_completed() {
            return Err(Disqualified::NotCompleted);
        }
        let description = self.description().ok_or(Disqualified::MissingDescription)?;
        let minutes = self.minutes().ok_or(Disqualified::InvalidDuration)?;
        Ok(TrainingRecord {
            id,
            date: (!self.datum.is_null()).then(|| self.datum.clone()),
            text: normalize_text(description),
            minutes,
        })
    }
}

/// Metadata block returned next to a page of training records.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FetchMeta {
    #[serde(default)]
    pub max_id: Value,
}

impl FetchMeta {
    pub fn with_max_id(max_id: u64) -> Self {
        Self {
            max_id: Value::from(max_id),
        }
    }

    /// Highest record id the backend has seen, when reported.
    pub fn max_id(&self) -> Option<u64> {
        integral(&self.max_id).filter(|id| *id > 0)
    }
}

fn integral(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wire(value: Value) -> WireRecord {
        serde_json::from_value(value).expect("wire record")
    }

    #[test]
    fn qualifying_record_is_normalized() {
        let rec = wire(json!({
            "id": 7,
            "datum": "2024-03-01",
            "arbeit": "Batterie prüfen",
            "tatsaechliche_zeit": "45",
            "status": "abgeschlossen"
        }));
        let cached = rec.qualify(7).expect("qualifies");
        assert_eq!(cached.text, "batterie pruefen");
        assert_eq!(cached.minutes, 45.0);
        assert_eq!(cached.date, Some(json!("2024-03-01")));
    }

    #[test]
    fn each_rule_disqualifies() {
        let base = json!({"id": 1, "arbeit": "x y", "tatsaechliche_zeit": 10, "status": "abgeschlossen"});

        let mut excluded = base.clone();
        excluded["ki_training_exclude"] = json!(1);
        assert_eq!(wire(excluded).qualify(1), Err(Disqualified::Excluded));

        let mut open = base.clone();
        open["status"] = json!("offen");
        assert_eq!(wire(open).qualify(1), Err(Disqualified::NotCompleted));

        let mut blank = base.clone();
        blank["arbeit"] = json!("  ");
        assert_eq!(wire(blank).qualify(1), Err(Disqualified::MissingDescription));

        for bad in [json!(0), json!(-3), json!("abc"), Value::Null] {
            let mut rec = base.clone();
            rec["tatsaechliche_zeit"] = bad;
            assert_eq!(wire(rec).qualify(1), Err(Disqualified::InvalidDuration));
        }
    }

    #[test]
    fn ids_accept_numbers_and_numeric_strings() {
        assert_eq!(wire(json!({"id": 12})).record_id(), Some(12));
        assert_eq!(wire(json!({"id": " 12 "})).record_id(), Some(12));
        assert_eq!(wire(json!({"id": 12.0})).record_id(), Some(12));
        assert_eq!(wire(json!({"id": "x"})).record_id(), None);
        assert_eq!(wire(json!({})).record_id(), None);
    }

    #[test]
    fn exclude_flag_follows_truthiness() {
        assert!(!wire(json!({"ki_training_exclude": 0})).is_excluded());
        assert!(!wire(json!({"ki_training_exclude": false})).is_excluded());
        assert!(!wire(json!({"ki_training_exclude": null})).is_excluded());
        assert!(wire(json!({"ki_training_exclude": true})).is_excluded());
        assert!(wire(json!({"ki_training_exclude": "1"})).is_excluded());
    }
}
