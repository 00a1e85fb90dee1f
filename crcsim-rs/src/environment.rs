use std::collections::HashMap;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{Result, SimError};

/// Run context handed to the model by the run protocol: the model input,
/// the named input files and where results should be written.
pub struct RunEnvironment<I = ()> {
    input_json: serde_json::Map<String, Value>,
    pub input: Option<I>,
    pub seed: u64,
    pub replicate: u64,
    pub files: HashMap<String, PathBuf>,
    output: Value,
}

impl RunEnvironment {
    pub fn from_json(data: Value) -> Self {
        let mut input_json = data
            .get("input")
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_default();

        let seed = input_json
            .remove("seed")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        let replicate = input_json
            .remove("replicate")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        let files = data
            .get("model")
            .and_then(|m| m.get("files"))
            .and_then(|f| f.as_object())
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), PathBuf::from(s))))
                    .collect()
            })
            .unwrap_or_default();

        let output = data.get("output").cloned().unwrap_or(Value::Null);

        Self {
            input_json,
            input: None,
            seed,
            replicate,
            files,
            output,
        }
    }

    pub fn from_reader(mut reader: impl Read) -> Result<Self> {
        let mut raw = String::new();
        reader.read_to_string(&mut raw)?;
        if raw.trim().is_empty() {
            return Err(SimError::Config("no run input on stdin".to_string()));
        }
        let data: Value = serde_json::from_str(&raw)?;
        Ok(Self::from_json(data))
    }

    pub fn from_stdin() -> Result<Self> {
        Self::from_reader(io::stdin())
    }

    /// Deserializes the input object, layered over `base` when given. Keys
    /// present in the run input win over the base document.
    pub fn with_input_type<I: DeserializeOwned>(
        self,
        base: Option<serde_json::Map<String, Value>>,
    ) -> Result<RunEnvironment<I>> {
        let mut merged = base.unwrap_or_default();
        merge_objects(&mut merged, &self.input_json);
        let input = serde_json::from_value(Value::Object(merged))?;
        Ok(RunEnvironment {
            input_json: self.input_json,
            input: Some(input),
            seed: self.seed,
            replicate: self.replicate,
            files: self.files,
            output: self.output,
        })
    }
}

fn merge_objects(base: &mut serde_json::Map<String, Value>, overlay: &serde_json::Map<String, Value>) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_objects(existing, incoming)
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

impl<I> RunEnvironment<I> {
    pub fn input_json(&self) -> &serde_json::Map<String, Value> {
        &self.input_json
    }

    pub fn file(&self, name: &str) -> Option<&Path> {
        self.files.get(name).map(PathBuf::as_path)
    }

    pub fn require_file(&self, name: &str) -> Result<&Path> {
        self.file(name)
            .ok_or_else(|| SimError::MissingData(format!("no input file named '{name}'")))
    }

    /// Hex SHA-256 of the run input, seed and replicate included.
    pub fn input_digest(&self) -> String {
        let mut canonical = self.input_json.clone();
        canonical.insert("seed".to_string(), Value::from(self.seed));
        canonical.insert("replicate".to_string(), Value::from(self.replicate));
        // serde_json maps are ordered by key, so this serialization is stable
        let encoded = Value::Object(canonical).to_string();
        hex::encode(Sha256::digest(encoded.as_bytes()))
    }

    pub fn output_dir(&self) -> Option<PathBuf> {
        let output = &self.output;

        if output.get("spec").and_then(|v| v.as_str()) == Some("filesystem") {
            return output
                .get("dir")
                .and_then(|v| v.as_str())
                .map(PathBuf::from);
        }

        if let Some(profiles) = output.get("profile").and_then(|v| v.as_object()) {
            let selected = profiles
                .get("default")
                .or_else(|| profiles.values().next());
            if let Some(profile) = selected
                && profile.get("spec").and_then(|v| v.as_str()) == Some("filesystem")
            {
                return profile
                    .get("dir")
                    .and_then(|v| v.as_str())
                    .map(PathBuf::from);
            }
        }

        None
    }

    pub fn write_csv(&self, filename: &str, headers: &[String], rows: &[Vec<String>]) -> Result<()> {
        match self.output_dir() {
            Some(dir) => {
                fs::create_dir_all(&dir)?;
                let file = fs::File::create(dir.join(filename))?;
                write_records(csv::Writer::from_writer(file), headers, rows)
            }
            None => write_records(csv::Writer::from_writer(io::stdout()), headers, rows),
        }
    }
}

fn write_records<W: Write>(
    mut wtr: csv::Writer<W>,
    headers: &[String],
    rows: &[Vec<String>],
) -> Result<()> {
    wtr.write_record(headers)?;
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}
