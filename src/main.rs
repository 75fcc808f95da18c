use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{App, Arg, ArgMatches};
use log::{debug, LevelFilter};

use extractproject::{extract, ExtractOptions, LogReporter, TaskArtifact};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> Result<()> {
    let matches = App::new("extract-project")
        .version(VERSION)
        .about("Splits a pipeline into a project of resources, tasks and pipelines")
        .arg(Arg::with_name("project-name").short("n").long("project-name").value_name("NAME").help("Name to give to the project, e.g. 'ci'").takes_value(true).required(true))
        .arg(Arg::with_name("project-path").short("j").long("project-path").value_name("DIR").help("Project path to convert into").takes_value(true).required(true))
        .arg(Arg::with_name("pipeline-name").short("p").long("pipeline-name").value_name("NAME").help("Name to give to the pipeline within the project").takes_value(true).required(true))
        .arg(Arg::with_name("pipeline-config").short("c").long("pipeline-config").value_name("FILE").help("Path to pipeline config").takes_value(true).required(true))
        .arg(Arg::with_name("task-artifact").short("t").long("task-artifact").value_name("NAME=DIR").help("Mapping from artifact name to local directory, used for converting tasks").takes_value(true).multiple(true).number_of_values(1).validator(|s| s.parse::<TaskArtifact>().map(|_| ())))
        .arg(Arg::with_name("config-templates").long("config-templates").value_name("DIR").help("Directory containing templates for pretty-printing configs").takes_value(true))
        .arg(Arg::with_name("verbose").short("v").long("verbose").help("Logs every file checked, not only the ones written"))
        .get_matches();

    let level = if matches.is_present("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let mut logger = pretty_env_logger::formatted_timed_builder();
    logger.filter_level(level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        logger.parse_filters(&filters);
    }
    logger.init();

    let options = read_options(&matches)?;
    debug!("options: {:#?}", options);
    extract(&options, &mut LogReporter).with_context(|| {
        format!(
            "could not extract {} into {}",
            options.pipeline_config.display(),
            options.project_path.display()
        )
    })
}

fn read_options(matches: &ArgMatches) -> Result<ExtractOptions> {
    let required = |name: &str| {
        matches
            .value_of(name)
            .map(str::to_string)
            .with_context(|| format!("missing --{}", name))
    };
    let task_artifacts = match matches.values_of("task-artifact") {
        Some(values) => values
            .map(|v| v.parse::<TaskArtifact>().map_err(anyhow::Error::msg))
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };
    Ok(ExtractOptions {
        project_name: required("project-name")?,
        project_path: PathBuf::from(required("project-path")?),
        pipeline_name: required("pipeline-name")?,
        pipeline_config: PathBuf::from(required("pipeline-config")?),
        task_artifacts,
        templates_dir: matches.value_of("config-templates").map(PathBuf::from),
    })
}
