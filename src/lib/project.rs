/// Where extracted files live inside a project
use std::path::{Path, PathBuf};


#[derive(Debug, Clone)]
pub struct Project {
    /// Also the name of the artifact the project is mounted as in tasks
    pub name: String,
    pub root: PathBuf,
}

impl Project {
    pub fn new<P: AsRef<Path>>(name: &str, root: P) -> Self {
        Project {
            name: name.to_string(),
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn pipeline_path(&self, pipeline: &str) -> PathBuf {
        self.root.join("pipelines").join(format!("{}.yml", pipeline))
    }

    pub fn resource_path(&self, resource: &str) -> PathBuf {
        self.root.join("resources").join(format!("{}.yml", resource))
    }

    pub fn resource_type_path(&self, resource_type: &str) -> PathBuf {
        self.root
            .join("resource-types")
            .join(format!("{}.yml", resource_type))
    }

    pub fn task_path(&self, task: &str) -> PathBuf {
        self.root.join("tasks").join(format!("{}.yml", task))
    }

    pub fn script_path(&self, script: &str) -> PathBuf {
        self.root.join("tasks").join("scripts").join(script)
    }

    /// Path of a copied script as seen from inside a task, where the project is an input
    pub fn script_run_path(&self, script: &str) -> String {
        format!("{}/tasks/scripts/{}", self.name, script)
    }
}
