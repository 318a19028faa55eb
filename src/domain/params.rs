// ============================================================
// Layer 3 — Architecture Parameters
// ============================================================
// The full, typed parameter object for one model.
//
// Parameters are assembled from three tiers, lowest priority first:
//
//   1. required defaults      (verbosity, batch size, epochs, ...)
//   2. architecture defaults  (layer widths, per-stage options)
//   3. caller overrides
//
// The merge happens on top-level keys: overriding `encode_params`
// replaces the whole stage mapping, and any option field missing
// from it then falls back to the option type's own default.
//
// After the merge the derived paths are filled in
// (`path` from `name`, then `meta_filename` and `tb_log_path` from
// `path`), the result is deserialized into typed structs and the
// artifact directories are created.
//
// On disk the parameters are one flat JSON object:
//   { "verb": true, "name": "autoenc", ..., "architecture":
//     "dense_autoencoder", "in_size": 10, "encode_params": {...} }

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::domain::layer_option::{ConvLayerOption, LayerOption};
use crate::domain::traits::Persistable;

// ─── Architecture tag ─────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    Baseline,
    DenseAutoencoder,
    ConvAutoencoder,
}

impl Architecture {
    pub fn as_str(self) -> &'static str {
        match self {
            Architecture::Baseline         => "baseline",
            Architecture::DenseAutoencoder => "dense_autoencoder",
            Architecture::ConvAutoencoder  => "conv_autoencoder",
        }
    }

    /// Architecture-specific defaults (tier 2 of the merge).
    pub fn defaults(self) -> Map<String, Value> {
        let value = match self {
            Architecture::Baseline => json!({
                "name": "newmodel",
                "in_size": 10,
                "out_size": 3,
                "output_params": { "activation": "sigmoid" }
            }),
            Architecture::DenseAutoencoder => json!({
                "name": "autoenc",
                "in_size": 10,
                "encode_nodes": [5, 5],
                "encode_params": { "dropout_rate": 0.1 },
                "bottleneck_dim": 3,
                "bottleneck_params": { "dropout_rate": null },
                "decode_nodes": [5, 5],
                "decode_params": { "dropout_rate": null },
                "output_params": {
                    "dropout_rate": null,
                    "activation": null,
                    "act_reg": null
                }
            }),
            Architecture::ConvAutoencoder => json!({
                "name": "conv_autoenc",
                "in_size": 40,
                "encode_nodes": [10],
                "encode_params": {
                    "dropout_rate": 0.1,
                    "kernel": 5,
                    "strides": 1,
                    "pool_size": 2
                },
                "bottleneck_dim": 3,
                "bottleneck_params": {
                    "dropout_rate": null,
                    "kernel": 5,
                    "strides": 1,
                    "pool_size": 1
                },
                "decode_nodes": [10],
                "decode_params": {
                    "dropout_rate": null,
                    "kernel": 5,
                    "strides": 1,
                    "pool_size": 2
                },
                "output_params": {
                    "dropout_rate": null,
                    "activation": null,
                    "act_reg": null,
                    "kernel": 1,
                    "strides": 1,
                    "pool_size": 1
                }
            }),
        };
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Architecture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace('-', "_").as_str() {
            "baseline"          => Ok(Architecture::Baseline),
            "dense_autoencoder" => Ok(Architecture::DenseAutoencoder),
            "conv_autoencoder"  => Ok(Architecture::ConvAutoencoder),
            other => Err(format!(
                "unknown architecture '{other}' \
                 (expected baseline, dense_autoencoder or conv_autoencoder)"
            )),
        }
    }
}

/// Required defaults (tier 1 of the merge). The path entries are
/// placeholders until `name` is known.
fn required_defaults() -> Map<String, Value> {
    let value = json!({
        "verb": true,
        "path": "",
        "meta_filename": "",
        "tb_log_path": "",
        "batch_size": 256,
        "num_epochs": 3,
        "learning_rate": 0.0001,
        "holdout_prop": 0.1
    });
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

// ─── Typed parameter structs ──────────────────────────────────────────────────
/// Cross-cutting fields every architecture carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiredParams {
    /// Tee the model log to stdout as well as the log file.
    pub verb:          bool,
    pub name:          String,
    /// Artifact directory (params, log, checkpoints).
    pub path:          PathBuf,
    /// Checkpoint metadata file, always `<path>/saver-meta`.
    pub meta_filename: PathBuf,
    /// Scalar-tracking directory, always `<path>/tb_log`.
    pub tb_log_path:   PathBuf,
    pub batch_size:    usize,
    pub num_epochs:    usize,
    pub learning_rate: f64,
    /// Fraction of the training rows withheld for holdout evaluation.
    pub holdout_prop:  f64,
}

impl RequiredParams {
    pub fn params_file(&self) -> PathBuf {
        self.path.join(format!("{}-params.json", self.name))
    }

    pub fn log_file(&self) -> PathBuf {
        self.path.join(format!("{}.log", self.name))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineParams {
    pub in_size:       usize,
    pub out_size:      usize,
    pub output_params: LayerOption,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseAutoencoderParams {
    pub in_size:           usize,
    pub encode_nodes:      Vec<usize>,
    pub encode_params:     LayerOption,
    pub bottleneck_dim:    usize,
    pub bottleneck_params: LayerOption,
    pub decode_nodes:      Vec<usize>,
    pub decode_params:     LayerOption,
    pub output_params:     LayerOption,
}

/// Input extent of a convolutional model: a bare length (one channel)
/// or an explicit per-sample shape (`[length, channels]` or
/// `[height, width, channels]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InSize {
    Length(usize),
    Shape(Vec<usize>),
}

impl InSize {
    /// Per-sample shape in caller layout (channels last).
    pub fn sample_shape(&self) -> Vec<usize> {
        match self {
            InSize::Length(n) => vec![*n, 1],
            InSize::Shape(dims) => dims.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvAutoencoderParams {
    pub in_size:           InSize,
    pub encode_nodes:      Vec<usize>,
    pub encode_params:     ConvLayerOption,
    pub bottleneck_dim:    usize,
    pub bottleneck_params: ConvLayerOption,
    pub decode_nodes:      Vec<usize>,
    pub decode_params:     ConvLayerOption,
    pub output_params:     ConvLayerOption,
}

/// Architecture-specific half of the parameters, tagged by `architecture`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "architecture", rename_all = "snake_case")]
pub enum ModelParams {
    Baseline(BaselineParams),
    DenseAutoencoder(DenseAutoencoderParams),
    ConvAutoencoder(ConvAutoencoderParams),
}

impl ModelParams {
    pub fn architecture(&self) -> Architecture {
        match self {
            ModelParams::Baseline(_)         => Architecture::Baseline,
            ModelParams::DenseAutoencoder(_) => Architecture::DenseAutoencoder,
            ModelParams::ConvAutoencoder(_)  => Architecture::ConvAutoencoder,
        }
    }

    /// `(stage, dropout_rate)` for every stage option of the model.
    pub fn dropout_rates(&self) -> Vec<(&'static str, Option<f64>)> {
        match self {
            ModelParams::Baseline(p) => vec![("output_params", p.output_params.dropout_rate)],
            ModelParams::DenseAutoencoder(p) => vec![
                ("encode_params",     p.encode_params.dropout_rate),
                ("bottleneck_params", p.bottleneck_params.dropout_rate),
                ("decode_params",     p.decode_params.dropout_rate),
                ("output_params",     p.output_params.dropout_rate),
            ],
            ModelParams::ConvAutoencoder(p) => vec![
                ("encode_params",     p.encode_params.dropout_rate),
                ("bottleneck_params", p.bottleneck_params.dropout_rate),
                ("decode_params",     p.decode_params.dropout_rate),
                ("output_params",     p.output_params.dropout_rate),
            ],
        }
    }
}

// ─── ArchitectureParams ───────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureParams {
    #[serde(flatten)]
    pub common: RequiredParams,
    #[serde(flatten)]
    pub model:  ModelParams,
}

impl ArchitectureParams {
    /// Merge defaults with `overrides` (a JSON object, or null for none),
    /// derive the artifact paths and create the artifact directories.
    pub fn construct(architecture: Architecture, overrides: Value) -> Result<Self> {
        let overrides = match overrides {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => bail!("model overrides must be a JSON object, got {other}"),
        };

        let mut merged = required_defaults();
        merged.extend(architecture.defaults());
        merged.insert("architecture".to_string(), json!(architecture));

        for (key, value) in &overrides {
            if !merged.contains_key(key) {
                bail!("unknown parameter '{key}' for architecture {architecture}");
            }
            if key == "architecture" && value != &json!(architecture) {
                bail!("parameter 'architecture' = {value} conflicts with {architecture}");
            }
        }
        merged.extend(overrides);

        derive_paths(&mut merged)?;

        let params: Self = serde_json::from_value(Value::Object(merged))
            .with_context(|| format!("Invalid parameters for {architecture}"))?;
        params.validate()?;
        params.ensure_dirs()?;
        Ok(params)
    }

    pub fn architecture(&self) -> Architecture {
        self.model.architecture()
    }

    pub fn name(&self) -> &str {
        &self.common.name
    }

    pub fn path(&self) -> &Path {
        &self.common.path
    }

    fn validate(&self) -> Result<()> {
        let c = &self.common;
        if c.name.is_empty() {
            bail!("model name must not be empty");
        }
        if c.batch_size == 0 {
            bail!("batch_size must be positive");
        }
        if !(0.0..1.0).contains(&c.holdout_prop) {
            bail!("holdout_prop must lie in [0, 1), got {}", c.holdout_prop);
        }
        if !(c.learning_rate > 0.0) {
            bail!("learning_rate must be positive, got {}", c.learning_rate);
        }
        for (stage, rate) in self.model.dropout_rates() {
            if let Some(rate) = rate {
                if !(0.0..=1.0).contains(&rate) {
                    bail!("{stage}.dropout_rate must lie in [0, 1], got {rate}");
                }
            }
        }
        Ok(())
    }

    /// Create the artifact and scalar-tracking directories. Existing
    /// directories are left alone.
    pub fn ensure_dirs(&self) -> Result<()> {
        make_dir(&self.common.path)?;
        make_dir(&self.common.tb_log_path)?;
        Ok(())
    }
}

impl Persistable for ArchitectureParams {
    fn save(&self) -> Result<PathBuf> {
        make_dir(&self.common.path)?;

        let file = self.common.params_file();
        tracing::info!("Saving parameter file {}", file.display());

        let json = serde_json::to_string_pretty(self)?;
        fs::write(&file, json)
            .with_context(|| format!("Cannot write parameters to '{}'", file.display()))?;
        Ok(file)
    }

    fn load(file: &Path) -> Result<Self> {
        let json = fs::read_to_string(file)
            .with_context(|| format!("Cannot read parameters from '{}'", file.display()))?;
        let params: Self = serde_json::from_str(&json)
            .with_context(|| format!("Malformed parameter file '{}'", file.display()))?;
        params.validate()?;
        params.ensure_dirs()?;
        Ok(params)
    }
}

/// `path` defaults to `<cwd>/<name>`; the two derived paths always
/// follow `path`.
fn derive_paths(merged: &mut Map<String, Value>) -> Result<()> {
    let name = merged
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .context("parameter 'name' must be a string")?;

    let path = match merged.get("path") {
        Some(Value::String(p)) if !p.is_empty() => PathBuf::from(p),
        Some(Value::String(_)) | Some(Value::Null) | None => {
            std::env::current_dir()?.join(&name)
        }
        Some(other) => bail!("parameter 'path' must be a string, got {other}"),
    };

    merged.insert("meta_filename".to_string(), serde_json::to_value(path.join("saver-meta"))?);
    merged.insert("tb_log_path".to_string(), serde_json::to_value(path.join("tb_log"))?);
    merged.insert("path".to_string(), serde_json::to_value(&path)?);
    Ok(())
}

/// Idempotent `mkdir -p`.
pub fn make_dir(path: &Path) -> Result<()> {
    tracing::info!("Save directory : {}", path.display());
    if path.is_dir() {
        tracing::debug!("Directory {} already exists", path.display());
        return Ok(());
    }
    fs::create_dir_all(path)
        .with_context(|| format!("Cannot create directory '{}'", path.display()))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::layer_option::Window;

    fn in_tmp(tmp: &tempfile::TempDir, extra: Value) -> Value {
        let mut overrides = json!({ "path": tmp.path().join("model") });
        if let (Value::Object(base), Value::Object(more)) = (&mut overrides, extra) {
            base.extend(more);
        }
        overrides
    }

    #[test]
    fn test_defaults_are_merged_in_priority_order() {
        let tmp = tempfile::tempdir().unwrap();
        let p = ArchitectureParams::construct(
            Architecture::DenseAutoencoder,
            in_tmp(&tmp, json!({ "batch_size": 10, "encode_nodes": [7] })),
        ).unwrap();

        assert_eq!(p.common.batch_size, 10);
        assert_eq!(p.common.num_epochs, 3);
        assert_eq!(p.name(), "autoenc");
        match &p.model {
            ModelParams::DenseAutoencoder(m) => {
                assert_eq!(m.encode_nodes, vec![7]);
                assert_eq!(m.decode_nodes, vec![5, 5]);
                assert_eq!(m.encode_params.dropout_rate, Some(0.1));
                assert_eq!(m.output_params.activation, None);
            }
            other => panic!("wrong architecture: {other:?}"),
        }
    }

    #[test]
    fn test_stage_override_replaces_whole_mapping() {
        let tmp = tempfile::tempdir().unwrap();
        let p = ArchitectureParams::construct(
            Architecture::DenseAutoencoder,
            in_tmp(&tmp, json!({ "encode_params": { "batchnorm": true } })),
        ).unwrap();
        let ModelParams::DenseAutoencoder(m) = &p.model else { panic!() };
        assert!(m.encode_params.batchnorm);
        // the architecture default dropout of 0.1 is gone with the mapping
        assert_eq!(m.encode_params.dropout_rate, None);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let err = ArchitectureParams::construct(
            Architecture::Baseline,
            in_tmp(&tmp, json!({ "encode_nodes": [3] })),
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_invalid_holdout_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let err = ArchitectureParams::construct(
            Architecture::Baseline,
            in_tmp(&tmp, json!({ "holdout_prop": 1.0 })),
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_dropout_rate_outside_unit_interval_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        for rate in [1.5, -0.1] {
            let err = ArchitectureParams::construct(
                Architecture::DenseAutoencoder,
                in_tmp(&tmp, json!({ "encode_params": { "dropout_rate": rate } })),
            );
            assert!(err.is_err(), "dropout_rate {rate} accepted");
        }
        let ok = ArchitectureParams::construct(
            Architecture::DenseAutoencoder,
            in_tmp(&tmp, json!({ "decode_params": { "dropout_rate": 1.0 } })),
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_derived_paths_follow_path() {
        let tmp = tempfile::tempdir().unwrap();
        let p = ArchitectureParams::construct(Architecture::Baseline, in_tmp(&tmp, json!({}))).unwrap();
        assert_eq!(p.common.meta_filename, tmp.path().join("model").join("saver-meta"));
        assert_eq!(p.common.tb_log_path, tmp.path().join("model").join("tb_log"));
        assert!(p.common.tb_log_path.is_dir());
    }

    #[test]
    fn test_path_defaults_to_name_under_cwd() {
        let mut merged = required_defaults();
        merged.insert("name".into(), json!("some_model"));
        derive_paths(&mut merged).unwrap();
        let path: PathBuf = serde_json::from_value(merged["path"].clone()).unwrap();
        assert_eq!(path, std::env::current_dir().unwrap().join("some_model"));

        merged.insert("path".into(), json!(""));
        merged.insert("name".into(), json!("renamed"));
        derive_paths(&mut merged).unwrap();
        let path: PathBuf = serde_json::from_value(merged["path"].clone()).unwrap();
        assert!(path.ends_with("renamed"));
    }

    #[test]
    fn test_construct_twice_on_same_path() {
        let tmp = tempfile::tempdir().unwrap();
        ArchitectureParams::construct(Architecture::Baseline, in_tmp(&tmp, json!({}))).unwrap();
        ArchitectureParams::construct(Architecture::Baseline, in_tmp(&tmp, json!({}))).unwrap();
    }

    #[test]
    fn test_save_load_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let p = ArchitectureParams::construct(
            Architecture::ConvAutoencoder,
            in_tmp(&tmp, json!({
                "in_size": [12, 2],
                "learning_rate": 0.003,
                "decode_params": { "kernel": [1, 3], "pool_size": 2,
                                   "act_reg": { "kind": "l1", "strength": 0.01 } }
            })),
        ).unwrap();

        let file = p.save().unwrap();
        assert!(file.ends_with("conv_autoenc-params.json"));

        let back = ArchitectureParams::load(&file).unwrap();
        assert_eq!(back, p);
        let ModelParams::ConvAutoencoder(m) = &back.model else { panic!() };
        assert_eq!(m.in_size, InSize::Shape(vec![12, 2]));
        assert_eq!(m.decode_params.kernel, Window::Pair([1, 3]));
    }

    #[test]
    fn test_saved_file_is_flat() {
        let tmp = tempfile::tempdir().unwrap();
        let p = ArchitectureParams::construct(Architecture::Baseline, in_tmp(&tmp, json!({}))).unwrap();
        let file = p.save().unwrap();
        let raw: Value = serde_json::from_str(&fs::read_to_string(file).unwrap()).unwrap();
        assert_eq!(raw["architecture"], json!("baseline"));
        assert_eq!(raw["batch_size"], json!(256));
        assert_eq!(raw["output_params"]["activation"], json!("sigmoid"));
    }

    #[test]
    fn test_architecture_parses_dashed_names() {
        assert_eq!("dense-autoencoder".parse::<Architecture>(), Ok(Architecture::DenseAutoencoder));
        assert!("resnet".parse::<Architecture>().is_err());
    }
}
