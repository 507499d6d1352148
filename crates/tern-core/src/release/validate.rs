//! Checking a deployment against the environment it is released into.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::deploy::{AppDeploymentSpec, ComponentType, EnvVarDefinition};
use crate::error::Result;

/// Environment variables by name.
pub type EnvData = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProblemKind {
    VarNotFound,
    VarWrongType,
    DependencyNotFound,
    AdapterNotFound,
}

/// One reason a release would not activate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Problem {
    pub kind: ProblemKind,
    pub component: String,
    /// Variable or dependency name
    pub subject: String,
    pub message: String,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "component '{}': {}", self.component, self.message)
    }
}

/// Layer `overrides` on top of `base`; an override wins per variable.
pub fn merge_env(base: &EnvData, overrides: &EnvData) -> EnvData {
    let mut merged = base.clone();
    merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Read the `vars` map out of a resource `data` field.
pub fn vars_of(data: Option<&Value>) -> EnvData {
    data.and_then(|d| d.get("vars"))
        .and_then(Value::as_object)
        .map(|vars| vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}

/// Collect every problem preventing `spec` from running against `data`.
///
/// `adapter_exists` answers whether a dependency that is not part of the
/// deployment can be satisfied by an adapter of the given type.
pub fn validate(
    spec: &AppDeploymentSpec,
    data: &EnvData,
    adapter_exists: &dyn Fn(&str, ComponentType) -> Result<bool>,
) -> Result<Vec<Problem>> {
    let mut problems = Vec::new();

    for (component, def) in &spec.components {
        let schemas = std::iter::once(&def.env_var_schema)
            .chain(def.routes.iter().map(|r| &r.env_var_schema));
        for schema in schemas {
            for (var, var_def) in schema {
                if let Some(problem) = check_var(component, var, var_def, data)
                    && !problems.contains(&problem)
                {
                    problems.push(problem);
                }
            }
        }

        for (dep, dep_def) in &def.dependencies {
            if spec.components.contains_key(dep) {
                continue;
            }
            if dep_def.dep_type.is_adapter() {
                if !adapter_exists(dep, dep_def.dep_type)? {
                    problems.push(Problem {
                        kind: ProblemKind::AdapterNotFound,
                        component: component.clone(),
                        subject: dep.clone(),
                        message: format!("adapter '{dep}' does not exist"),
                    });
                }
            } else {
                problems.push(Problem {
                    kind: ProblemKind::DependencyNotFound,
                    component: component.clone(),
                    subject: dep.clone(),
                    message: format!("dependency '{dep}' is not part of the deployment"),
                });
            }
        }
    }

    Ok(problems)
}

fn check_var(component: &str, var: &str, def: &EnvVarDefinition, data: &EnvData) -> Option<Problem> {
    let problem = |kind, message| Problem {
        kind,
        component: component.to_string(),
        subject: var.to_string(),
        message,
    };
    match data.get(var) {
        None | Some(Value::Null) if def.required => Some(problem(
            ProblemKind::VarNotFound,
            format!("required variable '{var}' is not set"),
        )),
        Some(value) if !value.is_null() => {
            let expected = def.var_type.as_deref()?;
            let matches = match expected {
                "string" => value.is_string(),
                "number" => value.is_number(),
                "boolean" => value.is_boolean(),
                "array" | "arrayString" | "arrayNumber" => value.is_array(),
                _ => true,
            };
            (!matches).then(|| {
                problem(
                    ProblemKind::VarWrongType,
                    format!("variable '{var}' should be of type {expected}"),
                )
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::{ComponentDefinition, Dependency, RouteSpec};
    use serde_json::json;

    fn spec(components: BTreeMap<String, ComponentDefinition>) -> AppDeploymentSpec {
        serde_json::from_value(json!({
            "appName": "shop",
            "commit": "abc123f",
            "commitTime": "2024-01-01T00:00:00Z",
            "containerRegistry": "ghcr.io/acme",
            "components": components,
        }))
        .unwrap()
    }

    fn required(var_type: &str) -> EnvVarDefinition {
        EnvVarDefinition {
            var_type: Some(var_type.to_string()),
            required: true,
        }
    }

    #[test]
    fn override_layer_wins() {
        let base = EnvData::from([("a".into(), json!(1)), ("b".into(), json!(2))]);
        let overrides = EnvData::from([("b".into(), json!(3))]);
        let merged = merge_env(&base, &overrides);
        assert_eq!(merged["a"], json!(1));
        assert_eq!(merged["b"], json!(3));
    }

    #[test]
    fn reports_missing_vars_and_dependencies() {
        let mut frontend = ComponentDefinition::with_hash("1111111");
        frontend
            .env_var_schema
            .insert("title".into(), required("string"));
        frontend.routes.push(RouteSpec {
            id: 0,
            rule: "Path(`/`)".into(),
            priority: 0,
            env_var_schema: BTreeMap::from([("subPath".into(), required("string"))]),
        });
        frontend.dependencies.insert(
            "backend".into(),
            Dependency {
                dep_type: ComponentType::Component,
            },
        );
        frontend.dependencies.insert(
            "payments".into(),
            Dependency {
                dep_type: ComponentType::HttpAdapter,
            },
        );
        let spec = spec(BTreeMap::from([("frontend".into(), frontend)]));
        let data = EnvData::from([("title".into(), json!("Shop"))]);

        let problems = validate(&spec, &data, &|name, _| Ok(name == "payments")).unwrap();
        let kinds: Vec<_> = problems.iter().map(|p| (p.kind, p.subject.as_str())).collect();
        assert_eq!(
            kinds,
            vec![
                (ProblemKind::VarNotFound, "subPath"),
                (ProblemKind::DependencyNotFound, "backend"),
            ]
        );
    }

    #[test]
    fn wrong_type_is_a_problem() {
        let mut api = ComponentDefinition::with_hash("2222222");
        api.env_var_schema.insert("port".into(), required("number"));
        let spec = spec(BTreeMap::from([("api".into(), api)]));
        let data = EnvData::from([("port".into(), json!("8080"))]);
        let problems = validate(&spec, &data, &|_, _| Ok(false)).unwrap();
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].kind, ProblemKind::VarWrongType);
    }
}
