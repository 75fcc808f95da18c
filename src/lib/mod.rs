use std::collections::HashSet;
use std::mem;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, info};
use serde::Serialize;

use crate::conf::{anonymize, JobConfig, PipelineConfig, TaskConfig, TaskInput};
use crate::error::{Error, Result};
use crate::plan::{walk, walk_all, Step};
use crate::project::Project;
use crate::render::{render, Templates};
use crate::utils::sync::{sync_file, SyncOutcome};
use crate::utils::{read_file, read_yaml};

pub mod conf;
pub mod error;
pub mod plan;
pub mod project;
pub mod render;
pub mod utils;


#[derive(Debug, Clone, PartialEq)]
/// Progress of an extraction
pub enum Event {
    Resource { name: String },
    ResourceType { name: String },
    Task { file: String, name: String },
    Script { path: String },
    Synced { path: PathBuf, outcome: SyncOutcome },
}

/// Receives the [Event]s of an extraction, in order
pub trait Reporter {
    fn report(&mut self, event: Event);
}

/// Forwards events to the `log` facade
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&mut self, event: Event) {
        match event {
            Event::Resource { name } => info!("converting resource {}", name),
            Event::ResourceType { name } => info!("converting resource type {}", name),
            Event::Task { file, name } => info!("converting task {} to {}", file, name),
            Event::Script { path } => info!("converting script {}", path),
            Event::Synced {
                path,
                outcome: SyncOutcome::Created,
            } => info!("wrote {}", path.display()),
            Event::Synced {
                path,
                outcome: SyncOutcome::Unchanged,
            } => debug!("{} is up to date", path.display()),
        }
    }
}

impl Reporter for Vec<Event> {
    fn report(&mut self, event: Event) {
        self.push(event);
    }
}

#[derive(Debug, Clone, PartialEq)]
/// A local directory standing in for an artifact that task files are referenced from
pub struct TaskArtifact {
    pub name: String,
    pub dir: PathBuf,
}

impl TaskArtifact {
    fn prefix(&self) -> String {
        format!("{}/", self.name)
    }
}

impl FromStr for TaskArtifact {
    type Err = String;

    /// Parses `name=dir`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = s.splitn(2, '=').collect();
        if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
            return Err(format!("Invalid artifact mapping (expected NAME=DIR): {}", s));
        }
        Ok(TaskArtifact {
            name: parts[0].to_string(),
            dir: PathBuf::from(parts[1]),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub project_name: String,
    pub project_path: PathBuf,
    pub pipeline_name: String,
    pub pipeline_config: PathBuf,
    /// Checked in order; a task file may match at most one of them
    pub task_artifacts: Vec<TaskArtifact>,
    pub templates_dir: Option<PathBuf>,
}

/// Splits a pipeline into a project
pub struct Extractor<'r> {
    project: Project,
    artifacts: Vec<TaskArtifact>,
    templates: Option<Templates>,
    reporter: &'r mut dyn Reporter,
}

impl<'r> Extractor<'r> {
    pub fn new(options: &ExtractOptions, reporter: &'r mut dyn Reporter) -> Result<Self> {
        let mut seen = HashSet::new();
        for artifact in &options.task_artifacts {
            if !seen.insert(&artifact.name) {
                return Err(Error::DuplicateArtifact(artifact.name.clone()));
            }
        }
        let templates = match &options.templates_dir {
            Some(dir) => Some(Templates::load(dir)?),
            None => None,
        };
        Ok(Extractor {
            project: Project::new(&options.project_name, &options.project_path),
            artifacts: options.task_artifacts.clone(),
            templates,
            reporter,
        })
    }

    /// Extracts resources, resource types and tasks out of the pipeline at `config_path`,
    /// then writes what is left of the pipeline as `pipeline_name`
    pub fn extract(&mut self, pipeline_name: &str, config_path: &Path) -> Result<()> {
        let mut config: PipelineConfig = read_yaml(config_path)?;

        for resource in mem::take(&mut config.resources) {
            self.reporter.report(Event::Resource {
                name: resource.name.clone(),
            });
            let path = self.project.resource_path(&resource.name);
            self.write(&path, "resource.tmpl", &anonymize(&resource)?)?;
        }

        for resource_type in mem::take(&mut config.resource_types) {
            self.reporter.report(Event::ResourceType {
                name: resource_type.name.clone(),
            });
            let path = self.project.resource_type_path(&resource_type.name);
            self.write(&path, "resource.tmpl", &anonymize(&resource_type)?)?;
        }

        config.jobs = mem::take(&mut config.jobs)
            .into_iter()
            .map(|job| self.extract_job(job))
            .collect::<Result<_>>()?;

        let path = self.project.pipeline_path(pipeline_name);
        self.write(&path, "pipeline.tmpl", &config)
    }

    fn extract_job(&mut self, mut job: JobConfig) -> Result<JobConfig> {
        debug!("walking job {}", job.name);
        job.plan = walk_all(mem::take(&mut job.plan), &mut |step| self.extract_task(step))?;
        for hook in job.hooks_mut() {
            if let Some(step) = hook.take() {
                *hook = Some(walk(step, &mut |step| self.extract_task(step))?);
            }
        }
        Ok(job)
    }

    /// Visits one step: a task loaded from an artifact we have locally is written to the
    /// project, and the step then refers to it by name
    fn extract_task(&mut self, step: Step) -> Result<Step> {
        let (name, file, config) = match step {
            Step::TaskFile { name, file, config } => (name, file, config),
            other => return Ok(other),
        };

        let matching: Vec<&TaskArtifact> = self
            .artifacts
            .iter()
            .filter(|a| file.starts_with(&a.prefix()))
            .collect();
        let artifact = match matching.as_slice() {
            [] => {
                debug!("no artifact mapping for {}, leaving task {} as is", file, name);
                return Ok(Step::TaskFile { name, file, config });
            }
            [artifact] => (*artifact).clone(),
            _ => {
                return Err(Error::AmbiguousArtifact {
                    artifacts: matching.iter().map(|a| a.name.clone()).collect(),
                    file,
                })
            }
        };
        let prefix = artifact.prefix();

        let task_name = Path::new(&file)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::InvalidTaskPath(file.clone()))?;
        self.reporter.report(Event::Task {
            file: file.clone(),
            name: task_name.clone(),
        });

        let mut task: TaskConfig = read_yaml(&artifact.dir.join(&file[prefix.len()..]))?;

        if let Some(script) = task.run.path.strip_prefix(prefix.as_str()).map(str::to_owned) {
            self.reporter.report(Event::Script {
                path: task.run.path.clone(),
            });
            let script_name = Path::new(&script)
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .ok_or_else(|| Error::InvalidScriptPath(task.run.path.clone()))?;
            let payload = read_file(&artifact.dir.join(&script))?;
            let dest = self.project.script_path(&script_name);
            let outcome = sync_file(&dest, &payload)?;
            self.reporter.report(Event::Synced {
                path: dest,
                outcome,
            });

            task.inputs.insert(0, TaskInput::named(&self.project.name));
            task.run.path = self.project.script_run_path(&script_name);
        }

        let path = self.project.task_path(&task_name);
        self.write(&path, "task.tmpl", &task)?;

        Ok(Step::Task {
            name: task_name,
            config,
        })
    }

    fn write<T: Serialize>(&mut self, path: &Path, template: &str, value: &T) -> Result<()> {
        let outcome = render(path, self.templates.as_ref(), template, value)?;
        self.reporter.report(Event::Synced {
            path: path.to_path_buf(),
            outcome,
        });
        Ok(())
    }
}

/// Runs a whole extraction as described by `options`
pub fn extract(options: &ExtractOptions, reporter: &mut dyn Reporter) -> Result<()> {
    let mut extractor = Extractor::new(options, reporter)?;
    extractor.extract(&options.pipeline_name, &options.pipeline_config)
}
