//! Chart definition and loading
//!
//! A chart is a directory holding `Chart.yaml`, an optional `values.yaml`,
//! templates under `templates/`, CRDs under `crds/` and subcharts under
//! `charts/` (either unpacked directories or `.tgz` archives). Archived
//! charts carry exactly one top-level directory named after the chart.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::Read;

use crate::archive::read_tar_gz;
use crate::error::{CoreError, Result};
use crate::fs::BundleFs;
use crate::values::Values;

pub const API_VERSION_V1: &str = "v1";
pub const API_VERSION_V2: &str = "v2";

/// Contents of `Chart.yaml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    /// Chart API version (v1 or v2)
    #[serde(default)]
    pub api_version: String,

    /// Chart name (required)
    #[serde(default)]
    pub name: String,

    /// Chart version (required, SemVer)
    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Application version
    #[serde(default)]
    pub app_version: Option<String>,

    /// Kubernetes version constraint
    #[serde(default)]
    pub kube_version: Option<String>,

    /// `application` (default) or `library`
    #[serde(default, rename = "type")]
    pub chart_type: Option<String>,

    #[serde(default)]
    pub home: Option<String>,

    #[serde(default)]
    pub icon: Option<String>,

    #[serde(default)]
    pub sources: Vec<String>,

    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub maintainers: Vec<Maintainer>,

    /// Declared dependencies
    #[serde(default)]
    pub dependencies: Vec<ChartDependency>,

    #[serde(default)]
    pub deprecated: bool,

    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

/// Maintainer information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Maintainer {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Dependency declared in `Chart.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDependency {
    #[serde(default)]
    pub name: String,

    /// Version constraint
    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub repository: Option<String>,

    #[serde(default)]
    pub condition: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub alias: Option<String>,
}

/// A file belonging to a chart, named relative to the chart root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartFile {
    pub name: String,
    pub data: Vec<u8>,
}

/// A fully loaded chart
#[derive(Debug, Clone)]
pub struct Chart {
    pub metadata: ChartMetadata,

    /// Default values from `values.yaml`
    pub values: Values,

    /// Raw `values.schema.json`, if present
    pub schema: Option<Vec<u8>>,

    /// Files under `templates/`
    pub templates: Vec<ChartFile>,

    /// Files under `crds/`
    pub crds: Vec<ChartFile>,

    /// Every other non-metadata file
    pub files: Vec<ChartFile>,

    /// Subcharts loaded from `charts/`
    pub dependencies: Vec<Chart>,
}

impl Chart {
    /// Load a chart from a tar.gz stream
    pub fn load_archive<R: Read>(reader: R) -> Result<Self> {
        let fs = read_tar_gz(reader)?;
        Self::load_tree(&fs)
    }

    /// Load a chart from a tree whose root holds a single chart directory
    pub fn load_tree(fs: &BundleFs) -> Result<Self> {
        if fs.is_empty() {
            return Err(invalid("no files in chart archive"));
        }
        let base = match fs.base_dir() {
            Some(base) => base,
            None => {
                let entries: Vec<_> = fs.root_entries().into_iter().collect();
                return Err(invalid(format!(
                    "chart archive must contain exactly one top-level directory, found: {}",
                    entries.join(", ")
                )));
            }
        };
        Self::load_dir(&fs.subtree(base)?)
    }

    /// Load a chart from a tree rooted at the chart directory itself
    pub fn load_dir(fs: &BundleFs) -> Result<Self> {
        let chart_yaml = fs
            .get("Chart.yaml")
            .ok_or_else(|| invalid("Chart.yaml file is missing"))?;
        let metadata: ChartMetadata = serde_yaml::from_slice(chart_yaml)
            .map_err(|e| invalid(format!("cannot load Chart.yaml: {}", e)))?;

        let mut chart = Chart {
            metadata,
            values: Values::new(),
            schema: None,
            templates: Vec::new(),
            crds: Vec::new(),
            files: Vec::new(),
            dependencies: Vec::new(),
        };

        let mut subchart_dirs: BTreeMap<String, BundleFs> = BTreeMap::new();

        for (path, data) in fs.iter() {
            match path {
                "Chart.yaml" => {}
                "values.yaml" => {
                    let text = std::str::from_utf8(data)
                        .map_err(|e| invalid(format!("values.yaml is not valid UTF-8: {}", e)))?;
                    chart.values = Values::from_yaml(text)
                        .map_err(|e| invalid(format!("cannot load values.yaml: {}", e)))?;
                }
                "values.schema.json" => chart.schema = Some(data.to_vec()),
                _ if path.starts_with("templates/") => chart.templates.push(chart_file(path, data)),
                _ if path.starts_with("crds/") => chart.crds.push(chart_file(path, data)),
                _ if path.starts_with("charts/") => {
                    let rel = &path["charts/".len()..];
                    match rel.split_once('/') {
                        Some((name, inner)) => {
                            subchart_dirs.entry(name.to_string()).or_default().insert(inner, data)?;
                        }
                        None if rel.ends_with(".tgz") || rel.ends_with(".tar.gz") => {
                            let sub = Self::load_archive(data)
                                .map_err(|e| invalid(format!("error unpacking subchart {}: {}", rel, e)))?;
                            chart.dependencies.push(sub);
                        }
                        None => chart.files.push(chart_file(path, data)),
                    }
                }
                _ => chart.files.push(chart_file(path, data)),
            }
        }

        for (name, dir) in subchart_dirs {
            let sub = Self::load_dir(&dir)
                .map_err(|e| invalid(format!("error loading subchart {}: {}", name, e)))?;
            chart.dependencies.push(sub);
        }

        Ok(chart)
    }

    /// Chart name
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Whether this is a library chart
    pub fn is_library(&self) -> bool {
        self.metadata.chart_type.as_deref() == Some("library")
    }

    /// Validate metadata and templates, recursing into subcharts
    pub fn validate(&self) -> Result<()> {
        let md = &self.metadata;

        if md.api_version.is_empty() {
            return Err(invalid("chart.metadata.apiVersion is required"));
        }
        if md.api_version != API_VERSION_V1 && md.api_version != API_VERSION_V2 {
            return Err(invalid(format!(
                "chart.metadata.apiVersion {:?} is not supported",
                md.api_version
            )));
        }
        if md.name.is_empty() {
            return Err(invalid("chart.metadata.name is required"));
        }
        if md.name.contains('/') || md.name.contains('\\') {
            return Err(invalid(format!("chart.metadata.name {:?} is invalid", md.name)));
        }
        if md.version.is_empty() {
            return Err(invalid("chart.metadata.version is required"));
        }
        if semver::Version::parse(&md.version).is_err() {
            return Err(invalid(format!(
                "chart.metadata.version {:?} is invalid",
                md.version
            )));
        }
        match md.chart_type.as_deref() {
            None | Some("") | Some("application") | Some("library") => {}
            Some(other) => {
                return Err(invalid(format!(
                    "chart.metadata.type must be application or library, got {:?}",
                    other
                )));
            }
        }
        if let Some(dep) = md.dependencies.iter().find(|d| d.name.is_empty()) {
            return Err(invalid(format!(
                "dependencies must have a name (repository {:?})",
                dep.repository.as_deref().unwrap_or("")
            )));
        }

        for template in &self.templates {
            if std::str::from_utf8(&template.data).is_err() {
                return Err(invalid(format!("template {} is not valid UTF-8", template.name)));
            }
        }

        for sub in &self.dependencies {
            sub.validate()
                .map_err(|e| invalid(format!("subchart {}: {}", sub.name(), e)))?;
        }

        Ok(())
    }
}

fn chart_file(path: &str, data: &[u8]) -> ChartFile {
    ChartFile {
        name: path.to_string(),
        data: data.to_vec(),
    }
}

fn invalid(message: impl Into<String>) -> CoreError {
    CoreError::InvalidChart {
        message: message.into(),
    }
}
