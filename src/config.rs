//! Pipeline configuration: wire format, structural validation, and the typed
//! per-unit specs the supervisor builds workers from.
//!
//! The control bus carries configuration as loose `{type, args, kwargs}`
//! blocks. Those are kept verbatim for echoing back in acknowledgements;
//! validation converts them into tagged variants (`SourceSpec`, `FilterSpec`,
//! `OutputSpec`) so an unknown type tag or malformed argument is rejected when
//! the change request arrives, not when a worker is built.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::FilterAction;

/// One source/filter/output descriptor as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSpec {
    #[serde(rename = "type")]
    pub type_tag: String,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

/// The full dynamic configuration, replaced wholesale on every apply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub sources: Vec<UnitSpec>,
    pub filters: Vec<UnitSpec>,
    pub outputs: Vec<UnitSpec>,
}

/// Acknowledgement / bootstrap record exchanged on the state channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlMessage {
    pub success: bool,
    pub message: Option<String>,
    #[serde(rename = "currentConfig")]
    pub current_config: PipelineConfig,
}

// ============================================================================
// Errors
// ============================================================================

/// Why a change request was rejected. The message is echoed back on the state
/// channel, so the variants carry enough context to be actionable.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required field '{0}'")]
    MissingField(String),

    #[error("field '{0}' has the wrong shape: expected {1}")]
    WrongShape(String, &'static str),

    #[error("unknown {unit} type '{tag}'")]
    UnknownTag { unit: &'static str, tag: String },

    #[error("{unit} '{tag}': parameter '{param}': {message}")]
    BadParameter {
        unit: &'static str,
        tag: String,
        param: String,
        message: String,
    },

    #[error("duplicate filter name '{0}'")]
    DuplicateFilterName(String),
}

// ============================================================================
// Structural validation
// ============================================================================

/// Validate the raw JSON shape of a change request.
///
/// Must be an object with `sources`, `filters`, and `outputs` arrays, and
/// every entry must carry `type` (string), `args` (array), `kwargs` (object).
pub fn validate_structure(value: &Value) -> Result<(), ConfigError> {
    let obj = value
        .as_object()
        .ok_or(ConfigError::WrongShape("<root>".into(), "object"))?;

    for section in ["sources", "filters", "outputs"] {
        let entries = obj
            .get(section)
            .ok_or_else(|| ConfigError::MissingField(section.into()))?
            .as_array()
            .ok_or(ConfigError::WrongShape(section.into(), "array"))?;

        for (i, entry) in entries.iter().enumerate() {
            let block = entry
                .as_object()
                .ok_or(ConfigError::WrongShape(format!("{section}[{i}]"), "object"))?;
            block
                .get("type")
                .ok_or_else(|| ConfigError::MissingField(format!("{section}[{i}].type")))?
                .as_str()
                .ok_or(ConfigError::WrongShape(format!("{section}[{i}].type"), "string"))?;
            block
                .get("args")
                .ok_or_else(|| ConfigError::MissingField(format!("{section}[{i}].args")))?
                .as_array()
                .ok_or(ConfigError::WrongShape(format!("{section}[{i}].args"), "array"))?;
            block
                .get("kwargs")
                .ok_or_else(|| ConfigError::MissingField(format!("{section}[{i}].kwargs")))?
                .as_object()
                .ok_or(ConfigError::WrongShape(
                    format!("{section}[{i}].kwargs"),
                    "object",
                ))?;
        }
    }

    Ok(())
}

// ============================================================================
// Typed specs
// ============================================================================

/// Resolved source descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceSpec {
    /// Whole file, re-collected each tick. One domain per line.
    File { path: String },
    /// Paced replay of a domain file with jitter, for load and soak testing.
    StreamingFile {
        path: String,
        delay_ms: u64,
        jitter_ms: u64,
        entries_per_produce: usize,
        entries_per_produce_jitter: usize,
        repeat: bool,
    },
}

/// Resolved filter descriptor. Every filter carries a unique display name and
/// the action it emits on a positive match.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterSpec {
    SuffixList {
        name: String,
        action: FilterAction,
        path: String,
    },
    Pattern {
        name: String,
        action: FilterAction,
    },
    Syntax {
        name: String,
        action: FilterAction,
    },
    Probabilistic {
        name: String,
        action: FilterAction,
        rate_percent: f64,
    },
    RemoteList {
        name: String,
        action: FilterAction,
        feed_url: String,
        api_token: Option<String>,
        top_n: usize,
        cache_time_s: u64,
    },
}

impl FilterSpec {
    pub fn name(&self) -> &str {
        match self {
            FilterSpec::SuffixList { name, .. }
            | FilterSpec::Pattern { name, .. }
            | FilterSpec::Syntax { name, .. }
            | FilterSpec::Probabilistic { name, .. }
            | FilterSpec::RemoteList { name, .. } => name,
        }
    }
}

/// Resolved output descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputSpec {
    /// Console output with a bounded de-duplication cache.
    Stdout,
    /// JSON-lines append to a file.
    File { path: String },
}

/// A fully validated configuration, ready for the supervisor to build from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedConfig {
    pub sources: Vec<SourceSpec>,
    pub filters: Vec<FilterSpec>,
    pub outputs: Vec<OutputSpec>,
}

// ============================================================================
// Parameter extraction
// ============================================================================

/// Accessor over one unit's positional args and named kwargs.
///
/// Named parameters win; positional args are the fallback, mirroring how the
/// descriptors are conventionally written.
struct Params<'a> {
    unit: &'static str,
    tag: &'a str,
    args: &'a [Value],
    kwargs: &'a Map<String, Value>,
}

impl<'a> Params<'a> {
    fn new(unit: &'static str, spec: &'a UnitSpec) -> Self {
        Self {
            unit,
            tag: &spec.type_tag,
            args: &spec.args,
            kwargs: &spec.kwargs,
        }
    }

    fn bad(&self, param: &str, message: impl Into<String>) -> ConfigError {
        ConfigError::BadParameter {
            unit: self.unit,
            tag: self.tag.to_string(),
            param: param.to_string(),
            message: message.into(),
        }
    }

    fn lookup(&self, name: &str, position: usize) -> Option<&'a Value> {
        self.kwargs.get(name).or_else(|| self.args.get(position))
    }

    fn required_str(&self, name: &str, position: usize) -> Result<String, ConfigError> {
        let value = self
            .lookup(name, position)
            .ok_or_else(|| self.bad(name, "required"))?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.bad(name, "expected a string"))
    }

    fn opt_str(&self, name: &str) -> Result<Option<String>, ConfigError> {
        match self.kwargs.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v
                .as_str()
                .map(|s| Some(s.to_string()))
                .ok_or_else(|| self.bad(name, "expected a string")),
        }
    }

    fn u64_or(&self, name: &str, default: u64) -> Result<u64, ConfigError> {
        match self.kwargs.get(name) {
            None => Ok(default),
            Some(v) => v
                .as_u64()
                .ok_or_else(|| self.bad(name, "expected a non-negative integer")),
        }
    }

    fn f64_or(&self, name: &str, default: f64) -> Result<f64, ConfigError> {
        match self.kwargs.get(name) {
            None => Ok(default),
            Some(v) => v.as_f64().ok_or_else(|| self.bad(name, "expected a number")),
        }
    }

    fn bool_or(&self, name: &str, default: bool) -> Result<bool, ConfigError> {
        match self.kwargs.get(name) {
            None => Ok(default),
            Some(v) => v.as_bool().ok_or_else(|| self.bad(name, "expected a boolean")),
        }
    }

    /// `filter_name` kwarg, falling back to the first positional arg.
    fn filter_name(&self) -> Result<String, ConfigError> {
        self.required_str("filter_name", 0)
    }

    /// `filter_result_action` kwarg as an integer verdict, default `Drop`.
    fn filter_action(&self) -> Result<FilterAction, ConfigError> {
        match self.kwargs.get("filter_result_action") {
            None => Ok(FilterAction::Drop),
            Some(v) => {
                let raw = v
                    .as_u64()
                    .and_then(|n| u8::try_from(n).ok())
                    .ok_or_else(|| self.bad("filter_result_action", "expected 0, 1 or 2"))?;
                FilterAction::try_from(raw).map_err(|e| self.bad("filter_result_action", e))
            }
        }
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Convert a structurally valid wire config into typed specs.
///
/// Unknown type tags, malformed parameters, and colliding filter names are
/// configuration errors here, so a bad change request is rejected before it
/// can replace the active config. Worker construction failures (missing
/// files, unreachable feeds) remain a build-time concern and only skip the
/// affected unit.
pub fn resolve_config(config: &PipelineConfig) -> Result<ResolvedConfig, ConfigError> {
    let mut resolved = ResolvedConfig::default();

    for spec in &config.sources {
        resolved.sources.push(resolve_source(spec)?);
    }
    for spec in &config.filters {
        resolved.filters.push(resolve_filter(spec)?);
    }
    for spec in &config.outputs {
        resolved.outputs.push(resolve_output(spec)?);
    }

    // Filter names key the evidence map, so they must be unique.
    let mut names = std::collections::HashSet::new();
    for filter in &resolved.filters {
        if !names.insert(filter.name()) {
            return Err(ConfigError::DuplicateFilterName(filter.name().to_string()));
        }
    }

    Ok(resolved)
}

fn resolve_source(spec: &UnitSpec) -> Result<SourceSpec, ConfigError> {
    let p = Params::new("source", spec);
    match spec.type_tag.as_str() {
        "file" => Ok(SourceSpec::File {
            path: p.required_str("filename", 0)?,
        }),
        "streaming_file" => {
            let entries = p.u64_or("entries_per_produce", 1)?;
            if entries == 0 {
                return Err(p.bad("entries_per_produce", "must be at least 1"));
            }
            Ok(SourceSpec::StreamingFile {
                path: p.required_str("filename", 0)?,
                delay_ms: p.u64_or("delay_ms", 1000)?,
                jitter_ms: p.u64_or("jitter_ms", 100)?,
                entries_per_produce: entries as usize,
                entries_per_produce_jitter: p.u64_or("entries_per_produce_jitter", 0)? as usize,
                repeat: p.bool_or("repeat", false)?,
            })
        }
        tag => Err(ConfigError::UnknownTag {
            unit: "source",
            tag: tag.to_string(),
        }),
    }
}

fn resolve_filter(spec: &UnitSpec) -> Result<FilterSpec, ConfigError> {
    let p = Params::new("filter", spec);
    match spec.type_tag.as_str() {
        "suffix_list" => Ok(FilterSpec::SuffixList {
            name: p.filter_name()?,
            action: p.filter_action()?,
            path: p.required_str("filename", 1)?,
        }),
        "pattern" => Ok(FilterSpec::Pattern {
            name: p.filter_name()?,
            action: p.filter_action()?,
        }),
        "syntax" => Ok(FilterSpec::Syntax {
            name: p.filter_name()?,
            action: p.filter_action()?,
        }),
        "probabilistic" => {
            let rate = p.f64_or("drop_rate", 50.0)?;
            if !(0.0..=100.0).contains(&rate) {
                return Err(p.bad("drop_rate", "must be between 0 and 100"));
            }
            Ok(FilterSpec::Probabilistic {
                name: p.filter_name()?,
                action: p.filter_action()?,
                rate_percent: rate,
            })
        }
        "remote_list" => {
            let top_n = p.u64_or("top_n", 50)?;
            if top_n == 0 {
                return Err(p.bad("top_n", "must be greater than 0"));
            }
            Ok(FilterSpec::RemoteList {
                name: p.filter_name()?,
                action: p.filter_action()?,
                feed_url: p.required_str("feed_url", 1)?,
                api_token: p.opt_str("api_token")?,
                top_n: top_n as usize,
                cache_time_s: p.u64_or("cache_time_s", 86_400)?,
            })
        }
        tag => Err(ConfigError::UnknownTag {
            unit: "filter",
            tag: tag.to_string(),
        }),
    }
}

fn resolve_output(spec: &UnitSpec) -> Result<OutputSpec, ConfigError> {
    let p = Params::new("output", spec);
    match spec.type_tag.as_str() {
        "stdout" => Ok(OutputSpec::Stdout),
        "file" => Ok(OutputSpec::File {
            path: p.required_str("filename", 0)?,
        }),
        tag => Err(ConfigError::UnknownTag {
            unit: "output",
            tag: tag.to_string(),
        }),
    }
}

// ============================================================================
// Credential masking
// ============================================================================

/// Replace likely-secret values before a descriptor is logged.
///
/// Any kwarg whose key mentions `pass`, `token`, `secret`, or `key` has its
/// value masked. Only used for debug logging of unit initialization.
pub fn mask_credentials(kwargs: &Map<String, Value>) -> Map<String, Value> {
    let mut masked = Map::new();
    for (key, value) in kwargs {
        let lowered = key.to_ascii_lowercase();
        let sensitive = ["pass", "token", "secret", "key"]
            .iter()
            .any(|needle| lowered.contains(needle));
        if sensitive {
            masked.insert(key.clone(), Value::String("*********".into()));
        } else {
            masked.insert(key.clone(), value.clone());
        }
    }
    masked
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn unit(tag: &str, kwargs: Value) -> UnitSpec {
        UnitSpec {
            type_tag: tag.to_string(),
            args: Vec::new(),
            kwargs: kwargs.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn structure_requires_all_three_sections() {
        let missing = json!({"sources": [], "filters": []});
        let err = validate_structure(&missing).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(f) if f == "outputs"));

        let ok = json!({"sources": [], "filters": [], "outputs": []});
        assert!(validate_structure(&ok).is_ok());
    }

    #[test]
    fn structure_requires_type_args_kwargs_per_entry() {
        let bad = json!({
            "sources": [{"type": "file", "args": []}],
            "filters": [],
            "outputs": []
        });
        let err = validate_structure(&bad).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(f) if f == "sources[0].kwargs"));
    }

    #[test]
    fn unknown_tag_is_rejected_at_resolution() {
        let config = PipelineConfig {
            sources: vec![],
            filters: vec![unit("reputation_score", json!({"filter_name": "x"}))],
            outputs: vec![],
        };
        let err = resolve_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTag { unit: "filter", .. }));
    }

    #[test]
    fn filter_action_defaults_to_drop_and_parses_integers() {
        let spec = unit("pattern", json!({"filter_name": "stars"}));
        match resolve_filter(&spec).unwrap() {
            FilterSpec::Pattern { name, action } => {
                assert_eq!(name, "stars");
                assert_eq!(action, FilterAction::Drop);
            }
            other => panic!("unexpected spec {other:?}"),
        }

        let spec = unit(
            "pattern",
            json!({"filter_name": "stars", "filter_result_action": 2}),
        );
        match resolve_filter(&spec).unwrap() {
            FilterSpec::Pattern { action, .. } => assert_eq!(action, FilterAction::Store),
            other => panic!("unexpected spec {other:?}"),
        }
    }

    #[test]
    fn positional_args_back_fill_named_parameters() {
        let spec = UnitSpec {
            type_tag: "file".to_string(),
            args: vec![json!("domains.txt")],
            kwargs: Map::new(),
        };
        assert_eq!(
            resolve_source(&spec).unwrap(),
            SourceSpec::File {
                path: "domains.txt".to_string()
            }
        );
    }

    #[test]
    fn colliding_filter_names_are_rejected() {
        let config = PipelineConfig {
            sources: vec![],
            filters: vec![
                unit("pattern", json!({"filter_name": "dupe"})),
                unit("syntax", json!({"filter_name": "dupe"})),
            ],
            outputs: vec![],
        };
        let err = resolve_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateFilterName(name) if name == "dupe"));

        let config = PipelineConfig {
            sources: vec![],
            filters: vec![
                unit("pattern", json!({"filter_name": "stars"})),
                unit("syntax", json!({"filter_name": "shape"})),
            ],
            outputs: vec![],
        };
        assert!(resolve_config(&config).is_ok());
    }

    #[test]
    fn probabilistic_rate_is_range_checked() {
        let spec = unit(
            "probabilistic",
            json!({"filter_name": "chaos", "drop_rate": 150.0}),
        );
        assert!(resolve_filter(&spec).is_err());
    }

    #[test]
    fn credentials_are_masked_for_logging() {
        let kwargs = json!({
            "feed_url": "https://feed.example",
            "api_token": "super-secret",
            "top_n": 50
        });
        let masked = mask_credentials(kwargs.as_object().unwrap());
        assert_eq!(masked["api_token"], json!("*********"));
        assert_eq!(masked["feed_url"], json!("https://feed.example"));
        assert_eq!(masked["top_n"], json!(50));
    }
}
