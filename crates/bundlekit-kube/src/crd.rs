//! Bundle and BundleDeployment custom resources
//!
//! A `Bundle` declares where package content lives. A `BundleDeployment`
//! declares that a bundle built from its template should be installed, with
//! provisioner-specific configuration.

use kube::CustomResource;
use schemars::JsonSchema;
use schemars::r#gen::SchemaGenerator;
use schemars::schema::{InstanceType, Schema, SchemaObject};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const GROUP: &str = "core.bundlekit.io";

/// Label holding the kind of the object owning an unpack pod
pub const OWNER_KIND_LABEL: &str = "core.bundlekit.io/owner-kind";

/// Label holding the name of the object owning an unpack pod
pub const OWNER_NAME_LABEL: &str = "core.bundlekit.io/owner-name";

/// Kind of a bundle source
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum SourceType {
    /// Content assembled from immutable ConfigMaps
    ConfigMaps,
    /// Content read from a PersistentVolumeClaim by an unpack pod
    PersistentVolumeClaim,
    /// Content extracted from a container image by an unpack pod
    Image,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::ConfigMaps => "configMaps",
            SourceType::PersistentVolumeClaim => "persistentVolumeClaim",
            SourceType::Image => "image",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the content of a bundle comes from
///
/// Exactly the block named by `type` is expected to be set.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BundleSource {
    #[serde(rename = "type")]
    pub type_: SourceType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_maps: Option<Vec<ConfigMapSource>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim: Option<PersistentVolumeClaimSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageSource>,
}

impl BundleSource {
    pub fn config_maps(entries: Vec<ConfigMapSource>) -> Self {
        Self {
            type_: SourceType::ConfigMaps,
            config_maps: Some(entries),
            persistent_volume_claim: None,
            image: None,
        }
    }

    pub fn persistent_volume_claim(name: impl Into<String>) -> Self {
        Self {
            type_: SourceType::PersistentVolumeClaim,
            config_maps: None,
            persistent_volume_claim: Some(PersistentVolumeClaimSource { name: name.into() }),
            image: None,
        }
    }

    pub fn image(reference: impl Into<String>) -> Self {
        Self {
            type_: SourceType::Image,
            config_maps: None,
            persistent_volume_claim: None,
            image: Some(ImageSource {
                reference: reference.into(),
            }),
        }
    }
}

/// One ConfigMap and the directory its files land in
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapSource {
    pub config_map: ConfigMapRef,

    /// Destination directory relative to the bundle root
    #[serde(default)]
    pub path: String,
}

impl ConfigMapSource {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            config_map: ConfigMapRef { name: name.into() },
            path: path.into(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ConfigMapRef {
    pub name: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct PersistentVolumeClaimSource {
    pub name: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ImageSource {
    /// Image reference; resolved sources carry the digest the pod ran
    #[serde(rename = "ref")]
    pub reference: String,
}

/// Bundle declares a source of package content
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "core.bundlekit.io",
    version = "v1alpha1",
    kind = "Bundle",
    plural = "bundles",
    status = "BundleStatus",
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.source.type"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BundleSpec {
    /// Provisioner responsible for this bundle's content
    pub provisioner_class_name: String,

    pub source: BundleSource,
}

/// Acquisition phase recorded by the reconciler
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum BundlePhase {
    #[default]
    Pending,
    Unpacking,
    Unpacked,
    Failing,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BundleStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<BundlePhase>,

    /// The source the current content was actually unpacked from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_source: Option<BundleSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Template a BundleDeployment stamps bundles from
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BundleTemplate {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    pub spec: BundleSpec,
}

/// BundleDeployment declares that a bundle should be installed
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "core.bundlekit.io",
    version = "v1alpha1",
    kind = "BundleDeployment",
    plural = "bundledeployments",
    shortname = "bd",
    status = "BundleDeploymentStatus",
    printcolumn = r#"{"name":"Active Bundle","type":"string","jsonPath":".status.activeBundle"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BundleDeploymentSpec {
    /// Provisioner that installs the unpacked content
    pub provisioner_class_name: String,

    pub template: BundleTemplate,

    /// Provisioner-specific configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub config: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BundleDeploymentStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_bundle: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Schema for free-form objects the API server must keep as is
fn preserve_unknown_fields(_: &mut SchemaGenerator) -> Schema {
    let mut schema = SchemaObject {
        instance_type: Some(InstanceType::Object.into()),
        ..Default::default()
    };
    schema.extensions.insert(
        "x-kubernetes-preserve-unknown-fields".to_string(),
        serde_json::Value::Bool(true),
    );
    Schema::Object(schema)
}
