/// Job step plans, and the walker that rewrites them
use std::fmt::{Display, Formatter};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_yaml::{Mapping, Value};
use thiserror::Error;


/// The keys that decide which kind of step a mapping is
const STEP_KEYS: &[&str] = &["get", "put", "task", "do", "aggregate", "in_parallel", "try"];

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("unknown step type:\n\n{0}")]
    UnknownStep(String),
    #[error("more than one step type ({}) in:\n\n{node}", .keys.join(", "))]
    AmbiguousStep { keys: Vec<String>, node: String },
    #[error("invalid value for `{key}` in step:\n\n{node}")]
    Malformed { key: String, node: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
/// Hooks a step can carry. Ordered innermost first.
pub enum HookKind {
    OnSuccess,
    OnFailure,
    OnError,
    OnAbort,
    Ensure,
}

impl HookKind {
    pub fn key(&self) -> &'static str {
        match self {
            HookKind::OnSuccess => "on_success",
            HookKind::OnFailure => "on_failure",
            HookKind::OnError => "on_error",
            HookKind::OnAbort => "on_abort",
            HookKind::Ensure => "ensure",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        match key {
            "on_success" => Some(HookKind::OnSuccess),
            "on_failure" => Some(HookKind::OnFailure),
            "on_error" => Some(HookKind::OnError),
            "on_abort" => Some(HookKind::OnAbort),
            "ensure" => Some(HookKind::Ensure),
            _ => None,
        }
    }
}

impl Display for HookKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

#[derive(Debug, Clone, PartialEq)]
/// A step of a job's plan. Serializes to a single mapping, e.g.:
/// ```yaml
/// task: unit             # the step kind
/// file: repo/ci/unit.yml
/// attempts: 3            # anything else is kept in `config`
/// on_failure:            # hooks wrap the rest of the mapping
///   put: alert
/// ```
///
/// `config` holds every key that does not select the step kind, verbatim.
pub enum Step {
    Get { name: String, config: Mapping },
    Put { name: String, config: Mapping },
    /// A task referenced by name, possibly with an inline `config`
    Task { name: String, config: Mapping },
    /// A task whose config lives in a file inside an artifact
    TaskFile {
        name: String,
        file: String,
        config: Mapping,
    },
    Do { steps: Vec<Step>, config: Mapping },
    Aggregate { steps: Vec<Step>, config: Mapping },
    /// `options` carries `limit` and `fail_fast` when the mapping form is used
    InParallel {
        steps: Vec<Step>,
        options: Mapping,
        config: Mapping,
    },
    Try { step: Box<Step>, config: Mapping },
    Hook {
        kind: HookKind,
        step: Box<Step>,
        hook: Box<Step>,
    },
}

impl Step {
    /// Short name of the step kind, as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            Step::Get { .. } => "get",
            Step::Put { .. } => "put",
            Step::Task { .. } => "task",
            Step::TaskFile { .. } => "task",
            Step::Do { .. } => "do",
            Step::Aggregate { .. } => "aggregate",
            Step::InParallel { .. } => "in_parallel",
            Step::Try { .. } => "try",
            Step::Hook { kind, .. } => kind.key(),
        }
    }

    /// The extra keys of the step; hooks have none of their own
    pub fn config(&self) -> Option<&Mapping> {
        match self {
            Step::Get { config, .. }
            | Step::Put { config, .. }
            | Step::Task { config, .. }
            | Step::TaskFile { config, .. }
            | Step::Do { config, .. }
            | Step::Aggregate { config, .. }
            | Step::InParallel { config, .. }
            | Step::Try { config, .. } => Some(config),
            Step::Hook { .. } => None,
        }
    }

    fn from_value(value: Value, key: &str, node: &Mapping) -> Result<Self, PlanError> {
        match value {
            Value::Mapping(m) => Step::from_mapping(m),
            _ => Err(malformed(key, node)),
        }
    }

    fn from_mapping(fields: Mapping) -> Result<Self, PlanError> {
        let node = fields.clone();
        let mut hooks: Vec<(HookKind, Value)> = Vec::new();
        let mut kinds: Vec<(String, Value)> = Vec::new();
        let mut file = None;
        let mut config = Mapping::new();
        for (key, value) in fields {
            let name = key.as_str().map(str::to_owned).unwrap_or_default();
            if let Some(kind) = HookKind::from_key(&name) {
                hooks.push((kind, value));
            } else if STEP_KEYS.contains(&name.as_str()) {
                kinds.push((name, value));
            } else if name == "file" {
                file = Some(value);
            } else {
                config.insert(key, value);
            }
        }

        if kinds.len() > 1 {
            return Err(PlanError::AmbiguousStep {
                keys: kinds.into_iter().map(|(k, _)| k).collect(),
                node: to_yaml(&node),
            });
        }
        let (key, value) = kinds
            .pop()
            .ok_or_else(|| PlanError::UnknownStep(to_yaml(&node)))?;

        // `file` only means something next to `task`
        if key != "task" {
            if let Some(file) = file.take() {
                config.insert("file".into(), file);
            }
        }

        let mut step = match key.as_str() {
            "get" => Step::Get {
                name: string(value, &key, &node)?,
                config,
            },
            "put" => Step::Put {
                name: string(value, &key, &node)?,
                config,
            },
            "task" => {
                let name = string(value, &key, &node)?;
                match file {
                    Some(file) => Step::TaskFile {
                        name,
                        file: string(file, "file", &node)?,
                        config,
                    },
                    None => Step::Task { name, config },
                }
            }
            "do" => Step::Do {
                steps: steps(value, &key, &node)?,
                config,
            },
            "aggregate" => Step::Aggregate {
                steps: steps(value, &key, &node)?,
                config,
            },
            "in_parallel" => match value {
                Value::Mapping(m) => {
                    let mut options = Mapping::new();
                    let mut inner = None;
                    for (k, v) in m {
                        if k.as_str() == Some("steps") {
                            inner = Some(v);
                        } else {
                            options.insert(k, v);
                        }
                    }
                    Step::InParallel {
                        steps: match inner {
                            Some(v) => steps(v, "in_parallel.steps", &node)?,
                            None => Vec::new(),
                        },
                        options,
                        config,
                    }
                }
                other => Step::InParallel {
                    steps: steps(other, &key, &node)?,
                    options: Mapping::new(),
                    config,
                },
            },
            "try" => Step::Try {
                step: Box::new(Step::from_value(value, &key, &node)?),
                config,
            },
            _ => return Err(PlanError::UnknownStep(to_yaml(&node))),
        };

        hooks.sort_by_key(|(kind, _)| *kind);
        for (kind, hook) in hooks {
            step = Step::Hook {
                kind,
                step: Box::new(step),
                hook: Box::new(Step::from_value(hook, kind.key(), &node)?),
            };
        }
        Ok(step)
    }

    fn to_mapping(&self) -> Mapping {
        match self {
            Step::Get { name, config } => keyed("get", Value::String(name.clone()), config),
            Step::Put { name, config } => keyed("put", Value::String(name.clone()), config),
            Step::Task { name, config } => keyed("task", Value::String(name.clone()), config),
            Step::TaskFile { name, file, config } => {
                let mut m = Mapping::new();
                m.insert("task".into(), Value::String(name.clone()));
                m.insert("file".into(), Value::String(file.clone()));
                for (k, v) in config {
                    m.insert(k.clone(), v.clone());
                }
                m
            }
            Step::Do { steps, config } => keyed("do", sequence(steps), config),
            Step::Aggregate { steps, config } => keyed("aggregate", sequence(steps), config),
            Step::InParallel {
                steps,
                options,
                config,
            } => {
                let value = if options.is_empty() {
                    sequence(steps)
                } else {
                    let mut m = Mapping::new();
                    m.insert("steps".into(), sequence(steps));
                    for (k, v) in options {
                        m.insert(k.clone(), v.clone());
                    }
                    Value::Mapping(m)
                };
                keyed("in_parallel", value, config)
            }
            Step::Try { step, config } => keyed("try", Value::Mapping(step.to_mapping()), config),
            Step::Hook { kind, step, hook } => {
                let mut m = step.to_mapping();
                m.insert(kind.key().into(), Value::Mapping(hook.to_mapping()));
                m
            }
        }
    }
}

fn keyed(key: &str, value: Value, config: &Mapping) -> Mapping {
    let mut m = Mapping::new();
    m.insert(key.into(), value);
    for (k, v) in config {
        m.insert(k.clone(), v.clone());
    }
    m
}

fn sequence(steps: &[Step]) -> Value {
    Value::Sequence(
        steps
            .iter()
            .map(|s| Value::Mapping(s.to_mapping()))
            .collect(),
    )
}

fn to_yaml(node: &Mapping) -> String {
    serde_yaml::to_string(node).unwrap_or_else(|_| format!("{:?}", node))
}

fn malformed(key: &str, node: &Mapping) -> PlanError {
    PlanError::Malformed {
        key: key.to_string(),
        node: to_yaml(node),
    }
}

fn string(value: Value, key: &str, node: &Mapping) -> Result<String, PlanError> {
    match value {
        Value::String(s) => Ok(s),
        _ => Err(malformed(key, node)),
    }
}

fn steps(value: Value, key: &str, node: &Mapping) -> Result<Vec<Step>, PlanError> {
    match value {
        Value::Sequence(items) => items
            .into_iter()
            .map(|item| Step::from_value(item, key, node))
            .collect(),
        _ => Err(malformed(key, node)),
    }
}

impl Serialize for Step {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_mapping().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Step {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = Mapping::deserialize(deserializer)?;
        Step::from_mapping(fields).map_err(D::Error::custom)
    }
}

/// Rewrites `step` bottom-up: children are walked and the node rebuilt from them before
/// `visit` sees the node itself. The first error from `visit` aborts the walk.
pub fn walk<F, E>(step: Step, visit: &mut F) -> Result<Step, E>
where
    F: FnMut(Step) -> Result<Step, E>,
{
    let step = match step {
        Step::Do { steps, config } => Step::Do {
            steps: walk_all(steps, visit)?,
            config,
        },
        Step::Aggregate { steps, config } => Step::Aggregate {
            steps: walk_all(steps, visit)?,
            config,
        },
        Step::InParallel {
            steps,
            options,
            config,
        } => Step::InParallel {
            steps: walk_all(steps, visit)?,
            options,
            config,
        },
        Step::Try { step, config } => Step::Try {
            step: Box::new(walk(*step, visit)?),
            config,
        },
        Step::Hook { kind, step, hook } => Step::Hook {
            kind,
            step: Box::new(walk(*step, visit)?),
            hook: Box::new(walk(*hook, visit)?),
        },
        leaf @ (Step::Get { .. } | Step::Put { .. } | Step::Task { .. } | Step::TaskFile { .. }) => {
            leaf
        }
    };
    visit(step)
}

/// [walk]s every step of a sequence, in order
pub fn walk_all<F, E>(steps: Vec<Step>, visit: &mut F) -> Result<Vec<Step>, E>
where
    F: FnMut(Step) -> Result<Step, E>,
{
    steps.into_iter().map(|s| walk(s, visit)).collect()
}
