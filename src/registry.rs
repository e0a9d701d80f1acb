// 3.0 registry.rs: the deployment checkpoint. a flat JSON document of name -> address,
// plus a few seed-data arrays. the only durable state this crate owns.
// 3.1 set() is append-only and flushes before returning. a recorded name is never rewritten.

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::types::Address;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("failed to read registry {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("registry {} is not valid JSON: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("registry {} must hold a JSON object at the top level", path.display())]
    NotAnObject { path: PathBuf },

    #[error("registry entry {key} is malformed: {reason}")]
    Malformed { key: String, reason: String },

    #[error("registry entry {key} is already {existing}; refusing to overwrite with {attempted}")]
    Immutable {
        key: String,
        existing: Address,
        attempted: Address,
    },

    #[error("failed to flush registry {}: {source}", path.display())]
    Flush {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode registry: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Persisted name -> address map.
///
/// Loaded once per invocation. Every `set` rewrites the whole document through a
/// synced temp file and a rename, so a crash right after `set` returns keeps the entry.
#[derive(Debug)]
pub struct AddressRegistry {
    path: PathBuf,
    entries: Map<String, Value>,
    flushes: usize,
}

impl AddressRegistry {
    /// Reads the document at `path`. A missing or blank file is an empty registry.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            return Ok(Self::empty(path));
        }

        let raw = fs::read_to_string(&path).map_err(|source| RegistryError::Read {
            path: path.clone(),
            source,
        })?;

        if raw.trim().is_empty() {
            return Ok(Self::empty(path));
        }

        let document: Value = serde_json::from_str(&raw).map_err(|source| RegistryError::Parse {
            path: path.clone(),
            source,
        })?;

        match document {
            Value::Object(entries) => Ok(Self {
                path,
                entries,
                flushes: 0,
            }),
            _ => Err(RegistryError::NotAnObject { path }),
        }
    }

    fn empty(path: PathBuf) -> Self {
        Self {
            path,
            entries: Map::new(),
            flushes: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // number of writes to disk this process has made
    pub fn flush_count(&self) -> usize {
        self.flushes
    }

    /// Address recorded under `name`. Null and blank strings count as absent.
    pub fn get(&self, name: &str) -> Result<Option<Address>, RegistryError> {
        match self.entries.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(raw)) => Ok(Address::new(raw.as_str())),
            Some(other) => Err(RegistryError::Malformed {
                key: name.to_string(),
                reason: format!("expected an address string, found {}", json_kind(other)),
            }),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        matches!(self.get(name), Ok(Some(_)))
    }

    /// Records `name` and flushes. Re-recording the same address is a no-op;
    /// a different address is refused.
    pub fn set(&mut self, name: &str, address: &Address) -> Result<(), RegistryError> {
        if let Some(existing) = self.get(name)? {
            if &existing == address {
                return Ok(());
            }
            return Err(RegistryError::Immutable {
                key: name.to_string(),
                existing,
                attempted: address.clone(),
            });
        }

        let previous = self
            .entries
            .insert(name.to_string(), Value::String(address.as_str().to_string()));

        // memory must not run ahead of disk
        if let Err(e) = self.flush() {
            match previous {
                Some(value) => {
                    self.entries.insert(name.to_string(), value);
                }
                None => {
                    self.entries.shift_remove(name);
                }
            }
            return Err(e);
        }

        Ok(())
    }

    /// Literal array stored under `key` (seed data). Numbers come back with their
    /// original digits, so values past u64 are not rounded.
    pub fn series(&self, key: &str) -> Result<Option<Vec<String>>, RegistryError> {
        let items = match self.entries.get(key) {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(RegistryError::Malformed {
                    key: key.to_string(),
                    reason: format!("expected an array of literals, found {}", json_kind(other)),
                })
            }
        };

        items
            .iter()
            .map(|item| match item {
                Value::String(text) => Ok(text.clone()),
                Value::Number(number) => Ok(number.to_string()),
                other => Err(RegistryError::Malformed {
                    key: key.to_string(),
                    reason: format!("array holds {}", json_kind(other)),
                }),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    /// Every entry that currently holds an address, in document order.
    pub fn addresses(&self) -> Vec<(String, Address)> {
        self.entries
            .iter()
            .filter_map(|(key, value)| match value {
                Value::String(raw) => Address::new(raw.as_str()).map(|a| (key.clone(), a)),
                _ => None,
            })
            .collect()
    }

    /// The document exactly as it is written to disk.
    pub fn render(&self) -> Result<String, RegistryError> {
        let mut buf = Vec::new();
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.entries.serialize(&mut serializer)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn flush(&mut self) -> Result<(), RegistryError> {
        let rendered = self.render()?;
        let flush_err = |source: io::Error| RegistryError::Flush {
            path: self.path.clone(),
            source,
        };

        write_atomic(&self.path, rendered.as_bytes()).map_err(flush_err)?;
        self.flushes += 1;
        Ok(())
    }
}

/// Replaces `path` with `bytes` through a synced temp file and a rename.
/// Readers see either the old document or the new one, never a truncated mix.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        fs::create_dir_all(parent)?;
    }

    let mut temp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    let mut file = fs::File::create(&temp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&temp_path, path)?;

    // the rename itself has to survive a crash too
    if let Some(parent) = parent {
        sync_dir(parent)?;
    }
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        Address::new_unchecked(s)
    }

    #[test]
    fn missing_file_is_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AddressRegistry::load(dir.path().join("config.json")).unwrap();
        assert!(registry.is_empty());
        assert_eq!(registry.get("BrokerAddr").unwrap(), None);
    }

    #[test]
    fn set_flushes_before_returning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut registry = AddressRegistry::load(&path).unwrap();
        registry.set("BrokerAddr", &addr("0x01")).unwrap();
        assert_eq!(registry.flush_count(), 1);

        // a fresh load sees it without any explicit save
        let reloaded = AddressRegistry::load(&path).unwrap();
        assert_eq!(reloaded.get("BrokerAddr").unwrap(), Some(addr("0x01")));
        assert!(!dir.path().join("config.json.tmp").exists());
    }

    #[test]
    fn entries_are_immutable() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = AddressRegistry::load(dir.path().join("config.json")).unwrap();
        registry.set("SLDAddr", &addr("0x01")).unwrap();

        // same value: no-op, no extra flush
        registry.set("SLDAddr", &addr("0x01")).unwrap();
        assert_eq!(registry.flush_count(), 1);

        let result = registry.set("SLDAddr", &addr("0x02"));
        assert!(matches!(result, Err(RegistryError::Immutable { .. })));
        assert_eq!(registry.get("SLDAddr").unwrap(), Some(addr("0x01")));
    }

    #[test]
    fn blank_entries_count_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "RiskFundAddr": "0xfund", "BrokerAddr": "" }"#).unwrap();

        let mut registry = AddressRegistry::load(&path).unwrap();
        assert!(registry.contains("RiskFundAddr"));
        assert!(!registry.contains("BrokerAddr"));

        registry.set("BrokerAddr", &addr("0x09")).unwrap();
        assert_eq!(registry.get("BrokerAddr").unwrap(), Some(addr("0x09")));
    }

    #[test]
    fn keeps_document_order_and_four_space_indent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{\n    \"zeta\": \"0x1\",\n    \"alpha\": \"0x2\"\n}").unwrap();

        let mut registry = AddressRegistry::load(&path).unwrap();
        registry.set("mid", &addr("0x3")).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "{\n    \"zeta\": \"0x1\",\n    \"alpha\": \"0x2\",\n    \"mid\": \"0x3\"\n}"
        );
    }

    #[test]
    fn series_accepts_strings_and_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "ETHPriceTMs": ["1619827200", 1619913600], "Bad": [true] }"#).unwrap();

        let registry = AddressRegistry::load(&path).unwrap();
        assert_eq!(
            registry.series("ETHPriceTMs").unwrap(),
            Some(vec!["1619827200".to_string(), "1619913600".to_string()])
        );
        assert_eq!(registry.series("Missing").unwrap(), None);
        assert!(matches!(registry.series("Bad"), Err(RegistryError::Malformed { .. })));
        // an array is not an address
        assert!(matches!(registry.get("ETHPriceTMs"), Err(RegistryError::Malformed { .. })));
    }

    #[test]
    fn large_numbers_survive_load_set_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            "{\n    \"ETHPrices\": [2774740000000000000000, 2911130000000000000000],\n    \"ETHPriceTMs\": [1619827200, 1619913600]\n}",
        )
        .unwrap();

        let mut registry = AddressRegistry::load(&path).unwrap();
        let expected = Some(vec![
            "2774740000000000000000".to_string(),
            "2911130000000000000000".to_string(),
        ]);
        assert_eq!(registry.series("ETHPrices").unwrap(), expected);

        registry.set("BrokerAddr", &addr("0x01")).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("2774740000000000000000"));
        assert!(!written.contains("e+21"));

        let reloaded = AddressRegistry::load(&path).unwrap();
        assert_eq!(reloaded.series("ETHPrices").unwrap(), expected);
        assert_eq!(
            crate::seed::ETH_USD_HISTORY.resolve(&reloaded).unwrap()[0].value.to_string(),
            "2774740000000000000000"
        );
    }

    #[test]
    fn rejects_non_object_documents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(AddressRegistry::load(&path), Err(RegistryError::NotAnObject { .. })));

        fs::write(&path, "{ nope").unwrap();
        assert!(matches!(AddressRegistry::load(&path), Err(RegistryError::Parse { .. })));
    }

    #[test]
    fn failed_flush_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "plain file").unwrap();

        let mut registry = AddressRegistry::load(blocker.join("config.json")).unwrap();
        let result = registry.set("BrokerAddr", &addr("0x01"));

        assert!(matches!(result, Err(RegistryError::Flush { .. })));
        assert_eq!(registry.get("BrokerAddr").unwrap(), None);
        assert_eq!(registry.flush_count(), 0);
    }
}
