//! Pipeline source parsing.

use crate::plan::{Control, ExecutionPlan, OnError, PlanStep};
use serde::Deserialize;
use std::collections::HashMap;
use strata_core::pipeline::{ControlSource, ON_ERROR_ABORT, ON_ERROR_CONTINUE, PipelineSource};
use strata_core::{Error, Result};
use strata_plugins::PluginKey;

/// Parse YAML (or JSON) pipeline source into an executable plan.
///
/// Plugin existence is not checked here; the engine resolves plugins when a
/// step runs.
pub fn parse(source: &str) -> Result<ExecutionPlan> {
    let doc: PipelineSource =
        serde_yaml::from_str(source).map_err(|e| Error::Parse(e.to_string()))?;
    build(doc)
}

/// Extract the declared pipeline name without building a plan.
pub fn get_name(source: &str) -> Result<String> {
    #[derive(Deserialize)]
    struct Header {
        name: String,
    }

    let header: Header = serde_yaml::from_str(source).map_err(|e| Error::Parse(e.to_string()))?;
    let name = header.name.trim();
    if name.is_empty() {
        return Err(Error::Parse("pipeline name is empty".to_string()));
    }
    Ok(name.to_string())
}

/// Build a plan from an already deserialized source document.
pub fn build(doc: PipelineSource) -> Result<ExecutionPlan> {
    if doc.name.trim().is_empty() {
        return Err(Error::Parse("pipeline name is empty".to_string()));
    }
    let pipeline_type = doc.pipeline_type.ok_or_else(|| {
        Error::Parse(format!(
            "pipeline '{}' is missing 'type' (ingestion, processing or output)",
            doc.name
        ))
    })?;
    if doc.steps.is_empty() {
        return Err(Error::Parse(format!("pipeline '{}' has no steps", doc.name)));
    }

    let mut index = HashMap::with_capacity(doc.steps.len());
    for (i, step) in doc.steps.iter().enumerate() {
        if step.name.trim().is_empty() {
            return Err(Error::Parse(format!("step #{i} has an empty name")));
        }
        if index.insert(step.name.clone(), i).is_some() {
            return Err(Error::Parse(format!("duplicate step name '{}'", step.name)));
        }
    }

    let resolve = |step: &str, target: &str| {
        index.get(target).copied().ok_or_else(|| {
            Error::Parse(format!(
                "step '{step}' references unknown step '{target}'"
            ))
        })
    };

    let mut steps = Vec::with_capacity(doc.steps.len());
    for source in doc.steps {
        let plugin = PluginKey::parse(&source.plugin)
            .map_err(|e| Error::Parse(format!("step '{}': {e}", source.name)))?;

        let config = match source.config {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            config @ serde_json::Value::Object(_) => config,
            _ => {
                return Err(Error::Parse(format!(
                    "step '{}': config must be a mapping",
                    source.name
                )));
            }
        };

        let control = source
            .control
            .as_ref()
            .map(|c| build_control(&source.name, c, &resolve))
            .transpose()?;

        let on_error = match source.on_error.as_deref() {
            None | Some(ON_ERROR_ABORT) => OnError::Abort,
            Some(ON_ERROR_CONTINUE) => OnError::Continue,
            Some(target) => OnError::Jump(resolve(&source.name, target)?),
        };

        let output = match source.output {
            Some(key) if key.trim().is_empty() => {
                return Err(Error::Parse(format!(
                    "step '{}': output key is empty",
                    source.name
                )));
            }
            Some(key) => key,
            None => source.name.clone(),
        };

        steps.push(PlanStep {
            name: source.name,
            plugin,
            config,
            output,
            control,
            on_error,
        });
    }

    Ok(ExecutionPlan {
        version: doc.version,
        name: doc.name,
        description: doc.description,
        pipeline_type,
        steps,
        index,
    })
}

fn build_control(
    step: &str,
    control: &ControlSource,
    resolve: &impl Fn(&str, &str) -> Result<usize>,
) -> Result<Control> {
    match (&control.goto, &control.if_expr) {
        (Some(_), Some(_)) => Err(Error::Parse(format!(
            "step '{step}': control cannot combine 'goto' and 'if'"
        ))),
        (Some(target), None) => {
            if control.then.is_some() || control.else_target.is_some() {
                return Err(Error::Parse(format!(
                    "step '{step}': 'then'/'else' require 'if'"
                )));
            }
            Ok(Control::Goto(resolve(step, target)?))
        }
        (None, Some(condition)) => Ok(Control::Branch {
            condition: condition.clone(),
            then: control
                .then
                .as_deref()
                .map(|t| resolve(step, t))
                .transpose()?,
            otherwise: control
                .else_target
                .as_deref()
                .map(|t| resolve(step, t))
                .transpose()?,
        }),
        (None, None) => Err(Error::Parse(format!(
            "step '{step}': control needs 'goto' or 'if'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const LOOP: &str = r#"
name: poll
type: ingestion
steps:
  - name: fetch
    plugin: http/fetch
    config:
      url: "https://example.com/items"
    output: page
    on_error: retry
  - name: check
    plugin: control/condition
    config:
      condition: "${{ page.status }} == 200"
    control:
      if: "${{ check }} == true"
      then: done
      else: retry
  - name: retry
    plugin: control/counter
    control:
      goto: fetch
  - name: done
    plugin: context/set
    config:
      value: ok
"#;

    #[test]
    fn test_parse_resolves_targets_to_indices() {
        let plan = parse(LOOP).unwrap();
        assert_eq!(plan.name(), "poll");
        assert_eq!(plan.len(), 4);

        let fetch = plan.step(0).unwrap();
        assert_eq!(fetch.output, "page");
        assert_eq!(fetch.on_error, OnError::Jump(2));
        assert_eq!(fetch.plugin, PluginKey::new("http", "fetch"));

        assert_eq!(
            plan.step(1).unwrap().control,
            Some(Control::Branch {
                condition: "${{ check }} == true".into(),
                then: Some(3),
                otherwise: Some(2),
            })
        );
        assert_eq!(plan.step(2).unwrap().control, Some(Control::Goto(0)));
        assert_eq!(plan.step(2).unwrap().output, "retry");
        assert_eq!(plan.index_of("done"), Some(3));
    }

    #[test]
    fn test_round_trip_through_source() {
        let plan = parse(LOOP).unwrap();
        let again = parse(&plan.to_yaml().unwrap()).unwrap();
        assert_eq!(plan, again);
    }

    #[test]
    fn test_structural_errors() {
        let missing_type = "name: x\nsteps:\n  - name: a\n    plugin: context/set\n";
        assert!(matches!(parse(missing_type), Err(Error::Parse(_))));

        let no_steps = "name: x\ntype: output\nsteps: []\n";
        assert!(matches!(parse(no_steps), Err(Error::Parse(_))));

        let bad_steps = "name: x\ntype: output\nsteps: 3\n";
        assert!(matches!(parse(bad_steps), Err(Error::Parse(_))));

        let unknown_target =
            "name: x\ntype: output\nsteps:\n  - name: a\n    plugin: context/set\n    control:\n      goto: nowhere\n";
        let err = parse(unknown_target).unwrap_err();
        assert!(err.to_string().contains("nowhere"));

        let duplicate = "name: x\ntype: output\nsteps:\n  - name: a\n    plugin: context/set\n  - name: a\n    plugin: context/set\n";
        assert!(parse(duplicate).is_err());

        let bad_plugin = "name: x\ntype: output\nsteps:\n  - name: a\n    plugin: set\n";
        assert!(parse(bad_plugin).is_err());
    }

    #[test]
    fn test_unregistered_plugin_parses() {
        let src = "name: x\ntype: processing\nsteps:\n  - name: a\n    plugin: custom/thing\n";
        assert!(parse(src).is_ok());
    }

    #[test]
    fn test_get_name_ignores_the_rest() {
        assert_eq!(get_name("name: nightly\nsteps: not-a-list\n").unwrap(), "nightly");
        assert!(get_name("steps: []\n").is_err());
        assert!(get_name("name: '  '\n").is_err());
    }
}
