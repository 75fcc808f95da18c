/// Defines the pipeline and task configurations we read and write
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;

use crate::error::Result;
use crate::plan::Step;


#[derive(Serialize, Deserialize, Debug, Default, PartialEq)]
/// Represents an entire pipeline file. Every section may be absent, and is omitted when empty.
pub struct PipelineConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<GroupConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_types: Vec<ResourceType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jobs: Vec<JobConfig>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct GroupConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jobs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
/// A resource, as declared in a pipeline
pub struct ResourceConfig {
    /// unique within the pipeline; names the extracted file
    pub name: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub public: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_token: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub source: Mapping,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_every: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<Mapping>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(flatten)]
    /// Whatever else the resource declares
    pub extra: Mapping,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct ResourceType {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub source: Mapping,
    #[serde(default, skip_serializing_if = "is_false")]
    pub privileged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Mapping>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_every: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub unique_version_history: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<Mapping>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
/// Represents a Job. Serializes to:
/// ```yaml
/// name: unit
/// serial: true          # anything besides the plan and hooks is kept as-is
/// plan:
///   - get: repo
///     trigger: true
///   - task: unit
///     file: repo/ci/unit.yml
/// on_failure:
///   put: alert
/// ```
pub struct JobConfig {
    pub name: String,
    #[serde(default)]
    pub plan: Vec<Step>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_success: Option<Step>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_failure: Option<Step>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_error: Option<Step>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_abort: Option<Step>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ensure: Option<Step>,
    #[serde(flatten)]
    pub extra: Mapping,
}

impl JobConfig {
    /// The job-level hooks, each a step plan of its own
    pub fn hooks_mut(&mut self) -> [&mut Option<Step>; 5] {
        [
            &mut self.on_success,
            &mut self.on_failure,
            &mut self.on_error,
            &mut self.on_abort,
            &mut self.ensure,
        ]
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
/// A task file. Serializes to:
/// ```yaml
/// platform: linux
/// image_resource:
///   type: registry-image
///   source: {repository: rust}
/// inputs:
///   - name: repo
/// run:
///   path: repo/ci/unit.sh
/// ```
pub struct TaskConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rootfs_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_resource: Option<ImageResource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_limits: Option<Mapping>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Mapping>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<TaskInput>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<TaskOutput>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub caches: Vec<TaskCache>,
    pub run: TaskRun,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct ImageResource {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub source: Mapping,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Mapping>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<Mapping>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct TaskInput {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub optional: bool,
}

impl TaskInput {
    pub fn named(name: &str) -> Self {
        TaskInput {
            name: name.to_string(),
            path: None,
            optional: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct TaskOutput {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct TaskCache {
    pub path: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
/// What the task executes: `path` is resolved relative to the task's working directory
pub struct TaskRun {
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
/// The public face of a resource or resource type. Anything not declared here,
/// including the name, is dropped by [anonymize].
pub struct AnonymousResourceConfig {
    #[serde(default, skip_serializing_if = "is_false")]
    pub public: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_token: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub source: Mapping,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_every: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<Mapping>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Projects `resource` onto [AnonymousResourceConfig] by going through its canonical form
pub fn anonymize<T: Serialize>(resource: &T) -> Result<AnonymousResourceConfig> {
    let canonical = serde_yaml::to_string(resource)?;
    Ok(serde_yaml::from_str(&canonical)?)
}

fn is_false(b: &bool) -> bool {
    !*b
}
