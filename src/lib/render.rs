/// Pretty-printing of configs through optional handlebars templates
use std::path::Path;

use glob::{glob, Pattern};
use handlebars::{
    no_escape, Context, Handlebars, Helper, HelperResult, Output, RenderContext, RenderError,
};
use log::{debug, trace};
use serde::Serialize;
use serde_yaml::Value;

use crate::error::{Error, Result};
use crate::utils::sync::{sync_file, SyncOutcome};
use crate::utils::trim_newline;

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;
    use serde::Serialize;
    use tempdir::TempDir;

    use crate::conf::{anonymize, PipelineConfig, TaskConfig};
    use crate::error::Error;
    use crate::render::{render, Templates};
    use crate::utils::sync::SyncOutcome;
    use crate::utils::tests::{get_sample_resource_file, sample_path};

    fn task() -> TaskConfig {
        serde_yaml::from_str(&get_sample_resource_file("myrepo/ci/build.yml").unwrap()).unwrap()
    }

    fn templates_with(name: &str, body: &str) -> (TempDir, Templates) {
        let tmp_dir = TempDir::new("templates").expect("could not create temp dir");
        fs::write(tmp_dir.path().join(name), body).unwrap();
        let templates = Templates::load(tmp_dir.path()).expect("could not load templates");
        (tmp_dir, templates)
    }

    #[test]
    fn canonical_without_templates() {
        let _ = pretty_env_logger::try_init();
        let tmp_dir = TempDir::new("render").expect("could not create temp dir");
        let dest = tmp_dir.path().join("tasks/build.yml");
        let t = task();
        let outcome = render(&dest, None, "task.tmpl", &t).expect("could not render");
        assert_eq!(outcome, SyncOutcome::Created);
        assert_eq!(
            fs::read_to_string(&dest).unwrap(),
            serde_yaml::to_string(&t).unwrap()
        );
    }

    #[test]
    fn loads_every_tmpl_file() {
        let templates = Templates::load(&sample_path("templates")).expect("could not load");
        let mut names = templates.names();
        names.sort();
        assert_eq!(names, vec!["pipeline.tmpl", "resource.tmpl", "task.tmpl"]);
    }

    #[test]
    fn reordering_template_is_equivalent() {
        let _ = pretty_env_logger::try_init();
        let templates = Templates::load(&sample_path("templates")).expect("could not load");
        let tmp_dir = TempDir::new("render").expect("could not create temp dir");
        let dest = tmp_dir.path().join("build.yml");
        render(&dest, Some(&templates), "task.tmpl", &task()).expect("template should be equivalent");
        let written = fs::read_to_string(&dest).unwrap();
        assert!(written.starts_with("---\nplatform: linux\n"), "{}", written);
        let back: TaskConfig = serde_yaml::from_str(&written).unwrap();
        assert_eq!(back, task());
    }

    #[test]
    fn sample_templates_render_the_sample_pipeline() {
        let templates = Templates::load(&sample_path("templates")).expect("could not load");
        let tmp_dir = TempDir::new("render").expect("could not create temp dir");
        let pipeline: PipelineConfig =
            serde_yaml::from_str(&get_sample_resource_file("pipeline.yml").unwrap()).unwrap();
        for r in &pipeline.resources {
            let dest = tmp_dir.path().join(format!("{}.yml", r.name));
            render(&dest, Some(&templates), "resource.tmpl", &anonymize(r).unwrap())
                .expect("resource template should be equivalent");
        }
        render(&tmp_dir.path().join("pipeline.yml"), Some(&templates), "pipeline.tmpl", &pipeline)
            .expect("pipeline template should be equivalent");
    }

    #[derive(Serialize)]
    struct Thing {
        name: String,
        size: u32,
    }

    fn thing() -> Thing {
        Thing {
            name: "widget".to_string(),
            size: 3,
        }
    }

    #[test]
    fn whitespace_and_order_do_not_matter() {
        let (_tmp, templates) = templates_with("thing.tmpl", "size:   {{size}}\n\n\nname: {{name}}\n");
        let out = TempDir::new("render").expect("could not create temp dir");
        let dest = out.path().join("thing.yml");
        render(&dest, Some(&templates), "thing.tmpl", &thing()).expect("should be equivalent");
        assert_eq!(fs::read_to_string(&dest).unwrap(), "size:   3\n\n\nname: widget\n");
    }

    #[test]
    fn dropping_a_field_is_not_equivalent() {
        let (_tmp, templates) = templates_with(
            "task.tmpl",
            "platform: {{platform}}\nrun:\n  path: {{run.path}}\n",
        );
        let out = TempDir::new("render").expect("could not create temp dir");
        let dest = out.path().join("build.yml");
        let err = render(&dest, Some(&templates), "task.tmpl", &task())
            .expect_err("template drops fields");
        match &err {
            Error::NotEquivalent {
                path,
                canonical,
                generated,
                ..
            } => {
                assert_eq!(path, &dest);
                assert!(canonical.contains("image_resource"));
                assert!(!generated.contains("image_resource"));
            }
            other => panic!("got invalid error variant: {:?}", other),
        }
        assert!(err.to_string().contains("build.yml"));
        assert!(!dest.exists());
    }

    #[test]
    fn altering_a_value_is_not_equivalent() {
        let (_tmp, templates) = templates_with("thing.tmpl", "name: {{name}}\nsize: {{size}}1\n");
        let out = TempDir::new("render").expect("could not create temp dir");
        let err = render(&out.path().join("thing.yml"), Some(&templates), "thing.tmpl", &thing())
            .expect_err("template alters size");
        match err {
            Error::NotEquivalent {
                detail, generated, ..
            } => {
                assert_eq!(detail, "values differ");
                assert!(generated.contains("size: 31"));
            }
            other => panic!("got invalid error variant: {:?}", other),
        }
    }

    #[test]
    fn invalid_yaml_is_not_equivalent() {
        let (_tmp, templates) = templates_with("task.tmpl", "platform: [linux\n");
        let out = TempDir::new("render").expect("could not create temp dir");
        let err = render(&out.path().join("build.yml"), Some(&templates), "task.tmpl", &task())
            .expect_err("template output is not yaml");
        match err {
            Error::NotEquivalent { detail, .. } => assert!(detail.contains("invalid YAML")),
            other => panic!("got invalid error variant: {:?}", other),
        }
    }

    #[test]
    fn missing_template_is_an_error() {
        let (_tmp, templates) = templates_with("task.tmpl", "{{yaml 0 this}}\n");
        let out = TempDir::new("render").expect("could not create temp dir");
        let err = render(&out.path().join("x.yml"), Some(&templates), "resource.tmpl", &task())
            .expect_err("resource.tmpl was never loaded");
        assert!(matches!(err, Error::Template { .. }), "{:?}", err);
    }

    #[test]
    fn glob_characters_in_the_directory_are_literal() {
        let tmp_dir = TempDir::new("templates").expect("could not create temp dir");
        let literal = tmp_dir.path().join("tmpl[s]");
        let lookalike = tmp_dir.path().join("tmpls");
        fs::create_dir_all(&literal).unwrap();
        fs::create_dir_all(&lookalike).unwrap();
        fs::write(literal.join("task.tmpl"), "{{yaml 0 this}}\n").unwrap();
        fs::write(lookalike.join("pipeline.tmpl"), "{{yaml 0 this}}\n").unwrap();

        let templates = Templates::load(&literal).expect("could not load templates");
        assert_eq!(templates.names(), vec!["task.tmpl"]);
    }

    #[derive(Serialize)]
    struct WithParams {
        params: serde_yaml::Mapping,
    }

    #[test]
    fn non_string_keys_are_refused_by_templates() {
        let value = WithParams {
            params: serde_yaml::from_str("1: x").unwrap(),
        };
        let (_tmp, templates) = templates_with("t.tmpl", "params:\n  {{yaml 1 params}}\n");
        let out = TempDir::new("render").expect("could not create temp dir");
        let dest = out.path().join("t.yml");
        let err = render(&dest, Some(&templates), "t.tmpl", &value)
            .expect_err("templates cannot see the integer key");
        match &err {
            Error::Template { name, .. } => assert_eq!(name, "t.tmpl"),
            other => panic!("got invalid error variant: {:?}", other),
        }
        assert!(err.to_string().contains("string mapping keys"), "{}", err);
        assert!(!dest.exists());

        // the canonical form has no such restriction
        render(&dest, None, "t.tmpl", &value).expect("could not render canonically");
        assert_eq!(fs::read_to_string(&dest).unwrap(), "params:\n  1: x\n");
    }

    #[test]
    fn yaml_helper_indents_nested_blocks() {
        let (_tmp, templates) = templates_with("t.tmpl", "run:\n  {{yaml 1 run}}\n");
        let out = templates.render("t.tmpl", &task()).expect("could not render");
        assert!(out.starts_with("run:\n  "), "{}", out);
        let parsed: serde_yaml::Value = serde_yaml::from_str(&out).expect("invalid yaml");
        let expected: serde_yaml::Value =
            serde_yaml::from_str("run: {path: myrepo/ci/build.sh, args: [--release]}").unwrap();
        assert_eq!(parsed, expected);
    }
}

/// A set of named templates, loaded from `*.tmpl` files
pub struct Templates {
    registry: Handlebars<'static>,
}

impl Templates {
    /// Registers every `*.tmpl` file in `dir`, under its file name
    pub fn load(dir: &Path) -> Result<Self> {
        let templates_error = |message: String| Error::Templates {
            path: dir.to_path_buf(),
            message,
        };
        let mut registry = Handlebars::new();
        registry.register_escape_fn(no_escape);
        registry.register_helper("yaml", Box::new(yaml_helper));

        let pattern = Path::new(&Pattern::escape(&dir.to_string_lossy())).join("*.tmpl");
        let entries = glob(&pattern.to_string_lossy()).map_err(|e| templates_error(e.to_string()))?;
        for entry in entries {
            let path = entry.map_err(|e| templates_error(e.to_string()))?;
            let name = match path.file_name() {
                Some(name) => name.to_string_lossy().to_string(),
                None => continue,
            };
            debug!("loading template {} from {}", name, path.display());
            registry
                .register_template_file(&name, &path)
                .map_err(|e| templates_error(format!("{}: {}", name, e)))?;
        }
        Ok(Templates { registry })
    }

    /// Names of the loaded templates
    pub fn names(&self) -> Vec<String> {
        self.registry.get_templates().keys().cloned().collect()
    }

    /// Executes the template `name` against `value`. Templates only see string mapping keys,
    /// so values holding any other kind of key are refused.
    pub fn render<T: Serialize>(&self, name: &str, value: &T) -> Result<String> {
        if let Some(key) = non_string_key(&serde_yaml::to_value(value)?) {
            return Err(Error::Template {
                name: name.to_string(),
                source: RenderError::new(format!(
                    "templates only see string mapping keys, found {}",
                    key_repr(key)
                )),
            });
        }
        let context = serde_json::to_value(value).map_err(|e| Error::Template {
            name: name.to_string(),
            source: RenderError::new(format!("value cannot be passed to templates: {}", e)),
        })?;
        self.registry
            .render(name, &context)
            .map_err(|source| Error::Template {
                name: name.to_string(),
                source,
            })
    }
}

fn non_string_key(value: &Value) -> Option<&Value> {
    match value {
        Value::Mapping(m) => m.iter().find_map(|(k, v)| {
            if k.is_string() {
                non_string_key(v)
            } else {
                Some(k)
            }
        }),
        Value::Sequence(items) => items.iter().find_map(non_string_key),
        Value::Tagged(tagged) => non_string_key(&tagged.value),
        _ => None,
    }
}

fn key_repr(key: &Value) -> String {
    let mut repr = serde_yaml::to_string(key).unwrap_or_else(|_| format!("{:?}", key));
    trim_newline(&mut repr);
    repr
}

/// `{{yaml <indent> <value>}}`: `value` as yaml, every line after the first indented
/// by `indent` levels of two spaces
fn yaml_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let indent = h
        .param(0)
        .and_then(|p| p.value().as_u64())
        .ok_or_else(|| RenderError::new("yaml: first parameter must be an indent level"))?;
    let value = h
        .param(1)
        .map(|p| p.value())
        .ok_or_else(|| RenderError::new("yaml: missing value parameter"))?;
    let mut payload = serde_yaml::to_string(value)
        .map_err(|e| RenderError::new(format!("yaml: could not serialize value: {}", e)))?;
    trim_newline(&mut payload);

    let separator = format!("\n{}", "  ".repeat(indent as usize));
    out.write(&payload.lines().collect::<Vec<_>>().join(&separator))?;
    Ok(())
}

/// Writes `value` to `dest`, pretty-printed with the template `name` when templates are
/// given. The template output must parse to the same yaml as the canonical serialization,
/// otherwise nothing is written.
pub fn render<T: Serialize>(
    dest: &Path,
    templates: Option<&Templates>,
    name: &str,
    value: &T,
) -> Result<SyncOutcome> {
    let canonical = serde_yaml::to_string(value)?;

    let payload = match templates {
        None => canonical,
        Some(templates) => {
            let pretty = templates.render(name, value)?;
            trace!("rendered {} for {}:\n{}", name, dest.display(), pretty);
            let not_equivalent = |detail: String| Error::NotEquivalent {
                path: dest.to_path_buf(),
                detail,
                canonical: canonical.clone(),
                generated: pretty.clone(),
            };
            let expected: Value = serde_yaml::from_str(&canonical)?;
            let generated: Value = serde_yaml::from_str(&pretty)
                .map_err(|e| not_equivalent(format!("template rendered invalid YAML: {}", e)))?;
            if expected != generated {
                return Err(not_equivalent("values differ".to_string()));
            }
            pretty
        }
    };

    sync_file(dest, payload.as_bytes())
}
