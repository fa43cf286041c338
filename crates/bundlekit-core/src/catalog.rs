//! File-based catalog (FBC) loading and model conversion
//!
//! A catalog is a tree of `.json` / `.yaml` files, each holding a stream of
//! documents. Every document carries a `schema` field; `olm.package`,
//! `olm.channel` and `olm.bundle` are understood, anything else is kept as
//! an opaque blob.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{CoreError, Result};
use crate::fs::BundleFs;

pub const SCHEMA_PACKAGE: &str = "olm.package";
pub const SCHEMA_CHANNEL: &str = "olm.channel";
pub const SCHEMA_BUNDLE: &str = "olm.bundle";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub schema: String,
    pub name: String,
    #[serde(default)]
    pub default_channel: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub schema: String,
    pub package: String,
    pub name: String,
    #[serde(default)]
    pub entries: Vec<ChannelEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelEntry {
    pub name: String,
    #[serde(default)]
    pub replaces: Option<String>,
    #[serde(default)]
    pub skips: Vec<String>,
    #[serde(default)]
    pub skip_range: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    pub schema: String,
    pub name: String,
    pub package: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub properties: Vec<JsonValue>,
}

/// A document with an unrecognized schema
#[derive(Debug, Clone)]
pub struct Meta {
    pub schema: String,
    pub package: Option<String>,
    pub blob: JsonValue,
}

/// All documents of a catalog, grouped by schema
#[derive(Debug, Clone, Default)]
pub struct DeclarativeConfig {
    pub packages: Vec<Package>,
    pub channels: Vec<Channel>,
    pub bundles: Vec<Bundle>,
    pub others: Vec<Meta>,
}

impl DeclarativeConfig {
    /// Load every catalog document found in a tree
    ///
    /// Files without a `.json`, `.yaml` or `.yml` extension are ignored.
    pub fn load_fs(fs: &BundleFs) -> Result<Self> {
        let mut cfg = DeclarativeConfig::default();

        for (path, data) in fs.iter() {
            let docs = if path.ends_with(".json") {
                parse_json_stream(data).map_err(|e| in_file(path, e))?
            } else if path.ends_with(".yaml") || path.ends_with(".yml") {
                parse_yaml_stream(data).map_err(|e| in_file(path, e))?
            } else {
                continue;
            };

            for doc in docs {
                cfg.add_document(doc).map_err(|e| in_file(path, e))?;
            }
        }

        Ok(cfg)
    }

    fn add_document(&mut self, doc: JsonValue) -> Result<()> {
        let schema = doc
            .get("schema")
            .and_then(JsonValue::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| invalid("document is missing a schema"))?
            .to_string();

        match schema.as_str() {
            SCHEMA_PACKAGE => self.packages.push(serde_json::from_value(doc)?),
            SCHEMA_CHANNEL => self.channels.push(serde_json::from_value(doc)?),
            SCHEMA_BUNDLE => self.bundles.push(serde_json::from_value(doc)?),
            _ => {
                let package = doc.get("package").and_then(JsonValue::as_str).map(str::to_string);
                self.others.push(Meta {
                    schema,
                    package,
                    blob: doc,
                });
            }
        }
        Ok(())
    }

    /// Convert into the validated in-memory model
    pub fn to_model(&self) -> Result<Model> {
        let mut packages: BTreeMap<String, ModelPackage> = BTreeMap::new();

        for pkg in &self.packages {
            if pkg.name.is_empty() {
                return Err(invalid("package name must be set"));
            }
            if packages.contains_key(&pkg.name) {
                return Err(invalid(format!("duplicate package {:?}", pkg.name)));
            }
            packages.insert(
                pkg.name.clone(),
                ModelPackage {
                    name: pkg.name.clone(),
                    default_channel: pkg.default_channel.clone().unwrap_or_default(),
                    channels: BTreeMap::new(),
                    bundles: BTreeSet::new(),
                },
            );
        }

        for bundle in &self.bundles {
            let pkg = packages.get_mut(&bundle.package).ok_or_else(|| {
                invalid(format!(
                    "unknown package {:?} for bundle {:?}",
                    bundle.package, bundle.name
                ))
            })?;
            if bundle.name.is_empty() {
                return Err(invalid(format!("bundle in package {:?} has no name", bundle.package)));
            }
            if !pkg.bundles.insert(bundle.name.clone()) {
                return Err(invalid(format!(
                    "duplicate bundle {:?} in package {:?}",
                    bundle.name, bundle.package
                )));
            }
        }

        for ch in &self.channels {
            let pkg = packages.get_mut(&ch.package).ok_or_else(|| {
                invalid(format!("unknown package {:?} for channel {:?}", ch.package, ch.name))
            })?;
            if ch.name.is_empty() {
                return Err(invalid(format!("channel in package {:?} has no name", ch.package)));
            }
            if pkg.channels.contains_key(&ch.name) {
                return Err(invalid(format!(
                    "duplicate channel {:?} in package {:?}",
                    ch.name, ch.package
                )));
            }
            for entry in &ch.entries {
                if !pkg.bundles.contains(&entry.name) {
                    return Err(invalid(format!(
                        "channel {:?} in package {:?} references unknown bundle {:?}",
                        ch.name, ch.package, entry.name
                    )));
                }
            }
            let head = channel_head(ch)?;
            pkg.channels.insert(
                ch.name.clone(),
                ModelChannel {
                    name: ch.name.clone(),
                    head,
                    bundles: ch.entries.iter().map(|e| e.name.clone()).collect(),
                },
            );
        }

        for pkg in packages.values() {
            if pkg.channels.is_empty() {
                return Err(invalid(format!("package {:?} has no channels", pkg.name)));
            }
            if pkg.default_channel.is_empty() {
                return Err(invalid(format!("package {:?} has no default channel", pkg.name)));
            }
            if !pkg.channels.contains_key(&pkg.default_channel) {
                return Err(invalid(format!(
                    "default channel {:?} not found in package {:?}",
                    pkg.default_channel, pkg.name
                )));
            }
            let in_channels: BTreeSet<&str> = pkg
                .channels
                .values()
                .flat_map(|ch| ch.bundles.iter().map(String::as_str))
                .collect();
            if let Some(orphan) = pkg.bundles.iter().find(|b| !in_channels.contains(b.as_str())) {
                return Err(invalid(format!(
                    "bundle {:?} of package {:?} not found in any channel entries",
                    orphan, pkg.name
                )));
            }
        }

        for meta in &self.others {
            if let Some(package) = &meta.package
                && !packages.contains_key(package)
            {
                return Err(invalid(format!(
                    "unknown package {:?} for {} document",
                    package, meta.schema
                )));
            }
        }

        Ok(Model { packages })
    }
}

/// Validated catalog model
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub packages: BTreeMap<String, ModelPackage>,
}

#[derive(Debug, Clone)]
pub struct ModelPackage {
    pub name: String,
    pub default_channel: String,
    pub channels: BTreeMap<String, ModelChannel>,
    pub bundles: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct ModelChannel {
    pub name: String,
    /// The single entry no other entry replaces or skips
    pub head: String,
    pub bundles: Vec<String>,
}

/// Find the one entry of a channel not superseded by any other entry
fn channel_head(ch: &Channel) -> Result<String> {
    if ch.entries.is_empty() {
        return Err(invalid(format!(
            "channel {:?} in package {:?} has no entries",
            ch.name, ch.package
        )));
    }

    let superseded: BTreeSet<&str> = ch
        .entries
        .iter()
        .flat_map(|e| e.replaces.iter().chain(e.skips.iter()))
        .map(String::as_str)
        .collect();

    let heads: Vec<&str> = ch
        .entries
        .iter()
        .map(|e| e.name.as_str())
        .filter(|name| !superseded.contains(name))
        .collect();

    match heads.as_slice() {
        [head] => Ok(head.to_string()),
        [] => Err(invalid(format!(
            "no channel head found in channel {:?} of package {:?}",
            ch.name, ch.package
        ))),
        many => Err(invalid(format!(
            "multiple channel heads found in channel {:?} of package {:?}: {}",
            ch.name,
            ch.package,
            many.join(", ")
        ))),
    }
}

fn parse_json_stream(data: &[u8]) -> Result<Vec<JsonValue>> {
    let mut docs = Vec::new();
    for doc in serde_json::Deserializer::from_slice(data).into_iter::<JsonValue>() {
        docs.push(doc?);
    }
    Ok(docs)
}

fn parse_yaml_stream(data: &[u8]) -> Result<Vec<JsonValue>> {
    let mut docs = Vec::new();
    for document in serde_yaml::Deserializer::from_slice(data) {
        let doc = JsonValue::deserialize(document)?;
        if !doc.is_null() {
            docs.push(doc);
        }
    }
    Ok(docs)
}

/// Prefix an error with the file it came from
fn in_file(path: &str, err: CoreError) -> CoreError {
    match err {
        CoreError::InvalidCatalog { message } => invalid(format!("{}: {}", path, message)),
        other => invalid(format!("{}: {}", path, other)),
    }
}

fn invalid(message: impl Into<String>) -> CoreError {
    CoreError::InvalidCatalog {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PACKAGE_JSON: &str = r#"
{"schema": "olm.package", "name": "etcd", "defaultChannel": "stable"}
{"schema": "olm.channel", "package": "etcd", "name": "stable", "entries": [
  {"name": "etcd.v0.9.0"},
  {"name": "etcd.v0.9.2", "replaces": "etcd.v0.9.0"}
]}
{"schema": "olm.bundle", "package": "etcd", "name": "etcd.v0.9.0", "image": "quay.io/etcd:v0.9.0"}
{"schema": "olm.bundle", "package": "etcd", "name": "etcd.v0.9.2", "image": "quay.io/etcd:v0.9.2"}
"#;

    fn catalog(files: &[(&str, &str)]) -> BundleFs {
        let mut fs = BundleFs::new();
        for (path, data) in files {
            fs.insert(path, *data).unwrap();
        }
        fs
    }

    #[test]
    fn test_load_and_convert_json() {
        let cfg = DeclarativeConfig::load_fs(&catalog(&[("etcd/catalog.json", PACKAGE_JSON)])).unwrap();
        assert_eq!(cfg.packages.len(), 1);
        assert_eq!(cfg.channels.len(), 1);
        assert_eq!(cfg.bundles.len(), 2);

        let model = cfg.to_model().unwrap();
        let etcd = &model.packages["etcd"];
        assert_eq!(etcd.default_channel, "stable");
        assert_eq!(etcd.channels["stable"].head, "etcd.v0.9.2");
    }

    #[test]
    fn test_load_yaml_documents() {
        let yaml = r#"---
schema: olm.package
name: foo
defaultChannel: alpha
---
schema: olm.channel
package: foo
name: alpha
entries:
  - name: foo.v1
---
schema: olm.bundle
package: foo
name: foo.v1
---
schema: olm.deprecations
package: foo
"#;
        let cfg = DeclarativeConfig::load_fs(&catalog(&[("foo/index.yaml", yaml), ("foo/README.md", "ignored")]))
            .unwrap();
        assert_eq!(cfg.others.len(), 1);
        assert_eq!(cfg.others[0].schema, "olm.deprecations");
        cfg.to_model().unwrap();
    }

    #[test]
    fn test_missing_schema() {
        let err = DeclarativeConfig::load_fs(&catalog(&[("a.json", r#"{"name": "x"}"#)])).unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"invalid catalog: a.json: document is missing a schema");
    }

    #[test]
    fn test_malformed_json() {
        assert!(DeclarativeConfig::load_fs(&catalog(&[("a.json", "{not json")])).is_err());
    }

    #[test]
    fn test_bundle_for_unknown_package() {
        let json = r#"{"schema": "olm.bundle", "package": "ghost", "name": "ghost.v1"}"#;
        let cfg = DeclarativeConfig::load_fs(&catalog(&[("a.json", json)])).unwrap();
        let err = cfg.to_model().unwrap_err();
        assert!(err.to_string().contains("unknown package \"ghost\""));
    }

    #[test]
    fn test_channel_references_unknown_bundle() {
        let json = r#"
{"schema": "olm.package", "name": "p", "defaultChannel": "c"}
{"schema": "olm.channel", "package": "p", "name": "c", "entries": [{"name": "p.v2"}]}
"#;
        let cfg = DeclarativeConfig::load_fs(&catalog(&[("a.json", json)])).unwrap();
        let err = cfg.to_model().unwrap_err();
        assert!(err.to_string().contains("references unknown bundle \"p.v2\""));
    }

    #[test]
    fn test_missing_default_channel() {
        let json = r#"
{"schema": "olm.package", "name": "p", "defaultChannel": "beta"}
{"schema": "olm.channel", "package": "p", "name": "alpha", "entries": [{"name": "p.v1"}]}
{"schema": "olm.bundle", "package": "p", "name": "p.v1"}
"#;
        let cfg = DeclarativeConfig::load_fs(&catalog(&[("a.json", json)])).unwrap();
        let err = cfg.to_model().unwrap_err();
        assert!(err.to_string().contains("default channel \"beta\" not found"));
    }

    #[test]
    fn test_multiple_channel_heads() {
        let json = r#"
{"schema": "olm.package", "name": "p", "defaultChannel": "c"}
{"schema": "olm.channel", "package": "p", "name": "c", "entries": [{"name": "p.v1"}, {"name": "p.v2"}]}
{"schema": "olm.bundle", "package": "p", "name": "p.v1"}
{"schema": "olm.bundle", "package": "p", "name": "p.v2"}
"#;
        let cfg = DeclarativeConfig::load_fs(&catalog(&[("a.json", json)])).unwrap();
        let err = cfg.to_model().unwrap_err();
        assert!(err.to_string().contains("multiple channel heads"));
    }

    #[test]
    fn test_duplicate_package_across_files() {
        let pkg = r#"{"schema": "olm.package", "name": "p", "defaultChannel": "c"}"#;
        let cfg = DeclarativeConfig::load_fs(&catalog(&[("a.json", pkg), ("b.json", pkg)])).unwrap();
        let err = cfg.to_model().unwrap_err();
        assert!(err.to_string().contains("duplicate package"));
    }

    #[test]
    fn test_bundle_outside_every_channel() {
        let json = r#"
{"schema": "olm.package", "name": "p", "defaultChannel": "c"}
{"schema": "olm.channel", "package": "p", "name": "c", "entries": [{"name": "p.v1"}]}
{"schema": "olm.bundle", "package": "p", "name": "p.v1"}
{"schema": "olm.bundle", "package": "p", "name": "p.v2"}
"#;
        let cfg = DeclarativeConfig::load_fs(&catalog(&[("a.json", json)])).unwrap();
        let err = cfg.to_model().unwrap_err();
        insta::assert_snapshot!(err.to_string(), @r#"invalid catalog: bundle "p.v2" of package "p" not found in any channel entries"#);
    }

    #[test]
    fn test_skips_supersede_entries() {
        let json = r#"
{"schema": "olm.package", "name": "p", "defaultChannel": "c"}
{"schema": "olm.channel", "package": "p", "name": "c", "entries": [
  {"name": "p.v1"}, {"name": "p.v2"}, {"name": "p.v3", "replaces": "p.v1", "skips": ["p.v2"]}
]}
{"schema": "olm.bundle", "package": "p", "name": "p.v1"}
{"schema": "olm.bundle", "package": "p", "name": "p.v2"}
{"schema": "olm.bundle", "package": "p", "name": "p.v3"}
"#;
        let cfg = DeclarativeConfig::load_fs(&catalog(&[("a.json", json)])).unwrap();
        let model = cfg.to_model().unwrap();
        assert_eq!(model.packages["p"].channels["c"].head, "p.v3");
    }
}
