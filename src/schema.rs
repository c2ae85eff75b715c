use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Group name every upstream log uses for its runs.
pub const DEFAULT_GROUP: &str = "Benchmark";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkSuiteLog {
    /// Epoch milliseconds as recorded by the writer. See
    /// [`BenchmarkSuiteLog::last_update`] for the value derived from the runs.
    pub last_update: u64,
    pub repo_url: String,
    pub entries: BTreeMap<String, Vec<Run>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub commit: CommitInfo,
    /// Epoch milliseconds of the CI execution, not of the commit.
    pub date: u64,
    pub tool: Tool,
    pub benches: Vec<Measurement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub author: Person,
    pub committer: Person,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distinct: Option<bool>,
    pub id: String,
    pub message: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree_id: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct Person {
    pub email: String,
    pub name: String,
    pub username: Option<String>,
    /// Key order as read. Uploader versions disagree on it, and keeping it
    /// leaves historical runs textually unchanged when a log is re-saved.
    key_order: Vec<PersonField>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PersonField {
    Email,
    Name,
    Username,
}

const DEFAULT_PERSON_ORDER: [PersonField; 3] =
    [PersonField::Email, PersonField::Name, PersonField::Username];

impl Person {
    pub fn new(name: impl Into<String>, email: impl Into<String>, username: Option<String>) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
            username,
            key_order: Vec::new(),
        }
    }
}

// Key order is layout, not identity.
impl PartialEq for Person {
    fn eq(&self, other: &Self) -> bool {
        self.email == other.email && self.name == other.name && self.username == other.username
    }
}

impl Eq for Person {}

impl Serialize for Person {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut order = self.key_order.clone();
        for field in DEFAULT_PERSON_ORDER {
            if !order.contains(&field) {
                order.push(field);
            }
        }
        order.retain(|f| *f != PersonField::Username || self.username.is_some());

        let mut map = serializer.serialize_map(Some(order.len()))?;
        for field in order {
            match field {
                PersonField::Email => map.serialize_entry("email", &self.email)?,
                PersonField::Name => map.serialize_entry("name", &self.name)?,
                PersonField::Username => map.serialize_entry("username", &self.username)?,
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Person {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PersonVisitor;

        impl<'de> Visitor<'de> for PersonVisitor {
            type Value = Person;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a person with `name` and `email`")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Person, A::Error> {
                let (mut email, mut name, mut username) = (None, None, None);
                let mut key_order = Vec::with_capacity(3);

                while let Some(key) = map.next_key::<String>()? {
                    let field = match key.as_str() {
                        "email" => {
                            email = Some(map.next_value::<String>()?);
                            PersonField::Email
                        }
                        "name" => {
                            name = Some(map.next_value::<String>()?);
                            PersonField::Name
                        }
                        "username" => {
                            username = map.next_value::<Option<String>>()?;
                            PersonField::Username
                        }
                        _ => {
                            map.next_value::<de::IgnoredAny>()?;
                            continue;
                        }
                    };
                    if !key_order.contains(&field) {
                        key_order.push(field);
                    }
                }

                Ok(Person {
                    email: email.ok_or_else(|| <A::Error as de::Error>::missing_field("email"))?,
                    name: name.ok_or_else(|| <A::Error as de::Error>::missing_field("name"))?,
                    username,
                    key_order,
                })
            }
        }

        deserializer.deserialize_map(PersonVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMeasurement", into = "RawMeasurement")]
pub struct Measurement {
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub range: Option<String>,
    pub extra: Option<String>,
    /// Spelling of `value` when the log stored it as a JSON string
    /// (`"0.00000"`). Written back as that string while it still matches.
    pub value_text: Option<String>,
}

// Wire shape of a measurement: `value` may be a number or a numeric string.
#[derive(Serialize, Deserialize)]
struct RawMeasurement {
    name: String,
    value: RawValue,
    unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    extra: Option<String>,
}

enum RawValue {
    Number(f64),
    Text(String),
}

fn parse_numeric(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

impl TryFrom<RawMeasurement> for Measurement {
    type Error = String;

    fn try_from(raw: RawMeasurement) -> Result<Self, Self::Error> {
        let (value, value_text) = match raw.value {
            RawValue::Number(v) => (v, None),
            RawValue::Text(text) => match parse_numeric(&text) {
                Some(v) => (v, Some(text)),
                None => return Err(format!("value {text:?} is not a number")),
            },
        };
        Ok(Measurement {
            name: raw.name,
            value,
            unit: raw.unit,
            range: raw.range,
            extra: raw.extra,
            value_text,
        })
    }
}

impl From<Measurement> for RawMeasurement {
    fn from(m: Measurement) -> Self {
        let value = match m.value_text {
            Some(text) if parse_numeric(&text) == Some(m.value) => RawValue::Text(text),
            _ => RawValue::Number(m.value),
        };
        RawMeasurement {
            name: m.name,
            value,
            unit: m.unit,
            range: m.range,
            extra: m.extra,
        }
    }
}

impl Serialize for RawValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RawValue::Number(v) => serialize_js_number(v, serializer),
            RawValue::Text(text) => serializer.serialize_str(text),
        }
    }
}

impl<'de> Deserialize<'de> for RawValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RawValueVisitor;

        impl<'de> Visitor<'de> for RawValueVisitor {
            type Value = RawValue;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a number or a numeric string")
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<RawValue, E> {
                Ok(RawValue::Number(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<RawValue, E> {
                Ok(RawValue::Number(v as f64))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<RawValue, E> {
                Ok(RawValue::Number(v as f64))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<RawValue, E> {
                Ok(RawValue::Text(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<RawValue, E> {
                Ok(RawValue::Text(v))
            }
        }

        deserializer.deserialize_any(RawValueVisitor)
    }
}

impl Measurement {
    pub fn new(name: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value,
            unit: unit.into(),
            range: None,
            extra: None,
            value_text: None,
        }
    }

    pub fn series_key(&self) -> SeriesKey {
        SeriesKey {
            name: self.name.clone(),
            unit: self.unit.clone(),
        }
    }
}

/// Identity of a time series. The same bench name under two units is two series.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeriesKey {
    pub name: String,
    pub unit: String,
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.unit)
    }
}

/// Whether lower or higher values mean improvement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    SmallerIsBetter,
    BiggerIsBetter,
}

/// Benchmark tool kind recorded on each run.
///
/// Unknown names are kept verbatim so logs written by newer uploaders still
/// round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tool {
    CustomSmallerIsBetter,
    CustomBiggerIsBetter,
    Cargo,
    Go,
    BenchmarkJs,
    BenchmarkLuau,
    Pytest,
    GoogleCpp,
    Catch2,
    Julia,
    Jmh,
    BenchmarkDotNet,
    Other(String),
}

impl Tool {
    pub fn as_str(&self) -> &str {
        match self {
            Tool::CustomSmallerIsBetter => "customSmallerIsBetter",
            Tool::CustomBiggerIsBetter => "customBiggerIsBetter",
            Tool::Cargo => "cargo",
            Tool::Go => "go",
            Tool::BenchmarkJs => "benchmarkjs",
            Tool::BenchmarkLuau => "benchmarkluau",
            Tool::Pytest => "pytest",
            Tool::GoogleCpp => "googlecpp",
            Tool::Catch2 => "catch2",
            Tool::Julia => "julia",
            Tool::Jmh => "jmh",
            Tool::BenchmarkDotNet => "benchmarkdotnet",
            Tool::Other(name) => name,
        }
    }

    pub fn polarity(&self) -> Polarity {
        match self {
            Tool::CustomBiggerIsBetter | Tool::BenchmarkJs | Tool::BenchmarkLuau | Tool::Pytest => {
                Polarity::BiggerIsBetter
            }
            _ => Polarity::SmallerIsBetter,
        }
    }
}

impl From<&str> for Tool {
    fn from(s: &str) -> Self {
        match s {
            "customSmallerIsBetter" => Tool::CustomSmallerIsBetter,
            "customBiggerIsBetter" => Tool::CustomBiggerIsBetter,
            "cargo" => Tool::Cargo,
            "go" => Tool::Go,
            "benchmarkjs" => Tool::BenchmarkJs,
            "benchmarkluau" => Tool::BenchmarkLuau,
            "pytest" => Tool::Pytest,
            "googlecpp" => Tool::GoogleCpp,
            "catch2" => Tool::Catch2,
            "julia" => Tool::Julia,
            "jmh" => Tool::Jmh,
            "benchmarkdotnet" => Tool::BenchmarkDotNet,
            other => Tool::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Tool {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Tool {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Tool::from(s.as_str()))
    }
}

/// Largest integer an f64 holds exactly (2^53).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

// Integral values go out as `0` rather than `0.0`, matching what the
// browser-side writer produces.
fn serialize_js_number<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.fract() == 0.0 && value.abs() < MAX_SAFE_INTEGER {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn person() -> serde_json::Value {
        json!({"email": "dev@example.com", "name": "dev", "username": "dev-gh"})
    }

    fn commit(distinct: Option<bool>) -> serde_json::Value {
        let mut c = json!({
            "author": person(),
            "committer": person(),
            "id": "07c91329ece3d6310f1a56cdead7b10e449fc66f",
            "message": "Fix flush\n\nCo-authored-by: someone <s@example.com>",
            "timestamp": "2025-03-07T23:48:22-08:00",
            "url": "https://github.com/example/repo/commit/07c91329ece3d6310f1a56cdead7b10e449fc66f"
        });
        if let Some(d) = distinct {
            c["distinct"] = json!(d);
        }
        c
    }

    #[test]
    fn test_distinct_presence_is_preserved() {
        let without: CommitInfo = serde_json::from_value(commit(None)).unwrap();
        let with: CommitInfo = serde_json::from_value(commit(Some(true))).unwrap();

        assert_eq!(without.distinct, None);
        assert_eq!(with.distinct, Some(true));
        assert_ne!(without, with);

        let out = serde_json::to_value(&without).unwrap();
        assert!(out.get("distinct").is_none());
        assert!(out.get("tree_id").is_none());
        let out = serde_json::to_value(&with).unwrap();
        assert_eq!(out["distinct"], json!(true));
    }

    #[test]
    fn test_tool_known_and_unknown() {
        let t: Tool = serde_json::from_value(json!("customBiggerIsBetter")).unwrap();
        assert_eq!(t, Tool::CustomBiggerIsBetter);
        assert_eq!(t.polarity(), Polarity::BiggerIsBetter);

        let t: Tool = serde_json::from_value(json!("customSmallerIsBetter")).unwrap();
        assert_eq!(t.polarity(), Polarity::SmallerIsBetter);

        let t: Tool = serde_json::from_value(json!("hyperfine")).unwrap();
        assert_eq!(t, Tool::Other("hyperfine".to_string()));
        assert_eq!(serde_json::to_value(&t).unwrap(), json!("hyperfine"));
    }

    #[test]
    fn test_integral_values_written_without_fraction() {
        let zero = Measurement::new("create_1000_files_in_10_threads", 0.0, "seconds");
        assert_eq!(
            serde_json::to_string(&zero).unwrap(),
            r#"{"name":"create_1000_files_in_10_threads","value":0,"unit":"seconds"}"#
        );

        let m = Measurement::new("write_1GB", 826.18, "MiB/s");
        assert_eq!(
            serde_json::to_string(&m).unwrap(),
            r#"{"name":"write_1GB","value":826.18,"unit":"MiB/s"}"#
        );
    }

    #[test]
    fn test_measurement_requires_value() {
        let err = serde_json::from_value::<Measurement>(json!({"name": "x", "unit": "seconds"}));
        assert!(err.is_err());
    }

    #[test]
    fn test_string_value_is_parsed_and_written_back_as_string() {
        let m: Measurement = serde_json::from_value(
            json!({"name": "list_100k_files", "value": "0.00000", "unit": "seconds"}),
        )
        .unwrap();
        assert_eq!(m.value, 0.0);
        assert_eq!(m.value_text.as_deref(), Some("0.00000"));
        assert_eq!(
            serde_json::to_string(&m).unwrap(),
            r#"{"name":"list_100k_files","value":"0.00000","unit":"seconds"}"#
        );
    }

    #[test]
    fn test_changed_value_drops_stale_text() {
        let mut m: Measurement = serde_json::from_value(
            json!({"name": "delete_100k_files", "value": "1.25000", "unit": "seconds"}),
        )
        .unwrap();
        m.value = 2.5;
        assert_eq!(
            serde_json::to_string(&m).unwrap(),
            r#"{"name":"delete_100k_files","value":2.5,"unit":"seconds"}"#
        );
    }

    #[test]
    fn test_non_numeric_string_value_is_rejected() {
        let err = serde_json::from_value::<Measurement>(
            json!({"name": "list_100k_files", "value": "n/a", "unit": "seconds"}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("is not a number"), "{err}");

        let err = serde_json::from_value::<Measurement>(
            json!({"name": "list_100k_files", "value": "NaN", "unit": "seconds"}),
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_person_key_order_is_kept() {
        let text = r#"{"name":"dev","username":"dev-gh","email":"dev@example.com"}"#;
        let p: Person = serde_json::from_str(text).unwrap();
        assert_eq!(serde_json::to_string(&p).unwrap(), text);
        assert_eq!(p, Person::new("dev", "dev@example.com", Some("dev-gh".to_string())));

        let fresh = Person::new("dev", "dev@example.com", None);
        assert_eq!(
            serde_json::to_string(&fresh).unwrap(),
            r#"{"email":"dev@example.com","name":"dev"}"#
        );
    }

    #[test]
    fn test_person_requires_email() {
        let err = serde_json::from_value::<Person>(json!({"name": "dev"})).unwrap_err();
        assert!(err.to_string().contains("missing field `email`"), "{err}");
    }

    #[test]
    fn test_series_key_includes_unit() {
        let a = Measurement::new("write_1GB", 0.94, "seconds");
        let b = Measurement::new("write_1GB", 826.18, "MiB/s");
        assert_ne!(a.series_key(), b.series_key());
        assert_eq!(a.series_key().to_string(), "write_1GB [seconds]");
    }
}
