//! Programs understood by the in-process backend.
//!
//! A compile-and-save job submits a [`ModelProgram`] as JSON. An instantiation
//! job submits a generated scenario unit, which is reduced to a
//! [`ScenarioRequest`] and written out as a [`ControlFile`].

use super::solver::Sense;
use crate::core::{EquType, VarType};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

pub const IMAGE_VERSION: u32 = 1;
pub const ANY_DOMAIN: &str = "*";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetDecl {
    pub name: String,
    #[serde(default)]
    pub text: String,
    pub elements: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDecl {
    pub name: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub domain: Vec<String>,
    #[serde(default)]
    pub values: Vec<(Vec<String>, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDecl {
    pub name: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub domain: Vec<String>,
    #[serde(default)]
    pub var_type: VarType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquationDecl {
    pub name: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub domain: Vec<String>,
    #[serde(default)]
    pub equ_type: EquType,
}

/// A named model; an empty equation list means every declared equation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDecl {
    pub name: String,
    #[serde(default)]
    pub equations: Vec<String>,
}

/// Declarations and data of a compiled program.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelProgram {
    #[serde(default)]
    pub sets: Vec<SetDecl>,
    #[serde(default)]
    pub parameters: Vec<ParameterDecl>,
    #[serde(default)]
    pub variables: Vec<VariableDecl>,
    #[serde(default)]
    pub equations: Vec<EquationDecl>,
    #[serde(default)]
    pub models: Vec<ModelDecl>,
}

impl ModelProgram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: &str, elements: &[&str]) -> Self {
        self.sets.push(SetDecl {
            name: name.into(),
            text: String::new(),
            elements: elements.iter().map(|e| e.to_string()).collect(),
        });
        self
    }

    pub fn parameter(mut self, name: &str, domain: &[&str], values: &[(&[&str], f64)]) -> Self {
        self.parameters.push(ParameterDecl {
            name: name.into(),
            text: String::new(),
            domain: owned(domain),
            values: values.iter().map(|(k, v)| (owned(k), *v)).collect(),
        });
        self
    }

    pub fn scalar(self, name: &str, value: f64) -> Self {
        self.parameter(name, &[], &[(&[], value)])
    }

    pub fn variable(mut self, name: &str, domain: &[&str], var_type: VarType) -> Self {
        self.variables.push(VariableDecl {
            name: name.into(),
            text: String::new(),
            domain: owned(domain),
            var_type,
        });
        self
    }

    pub fn equation(mut self, name: &str, domain: &[&str], equ_type: EquType) -> Self {
        self.equations.push(EquationDecl {
            name: name.into(),
            text: String::new(),
            domain: owned(domain),
            equ_type,
        });
        self
    }

    pub fn model(mut self, name: &str, equations: &[&str]) -> Self {
        self.models.push(ModelDecl {
            name: name.into(),
            equations: owned(equations),
        });
        self
    }

    pub fn from_json(source: &str) -> Result<Self, String> {
        serde_json::from_str(source).map_err(|e| format!("Invalid program: {}", e))
    }

    pub fn to_json(&self) -> Result<String, String> {
        serde_json::to_string_pretty(self).map_err(|e| e.to_string())
    }

    pub fn find_set(&self, name: &str) -> Option<&SetDecl> {
        self.sets.iter().find(|s| s.name == name)
    }

    pub fn find_parameter(&self, name: &str) -> Option<&ParameterDecl> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn find_variable(&self, name: &str) -> Option<&VariableDecl> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn find_model(&self, name: &str) -> Option<&ModelDecl> {
        self.models.iter().find(|m| m.name.eq_ignore_ascii_case(name))
    }

    fn names(&self) -> impl Iterator<Item = &str> {
        self.sets
            .iter()
            .map(|s| s.name.as_str())
            .chain(self.parameters.iter().map(|p| p.name.as_str()))
            .chain(self.variables.iter().map(|v| v.name.as_str()))
            .chain(self.equations.iter().map(|e| e.name.as_str()))
            .chain(self.models.iter().map(|m| m.name.as_str()))
    }

    /// Checks names, domains and data keys.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for name in self.names() {
            if !seen.insert(name) {
                return Err(format!("Symbol {} declared more than once", name));
            }
        }

        let domains = self
            .parameters
            .iter()
            .map(|p| (&p.name, &p.domain))
            .chain(self.variables.iter().map(|v| (&v.name, &v.domain)))
            .chain(self.equations.iter().map(|e| (&e.name, &e.domain)));
        for (name, domain) in domains {
            for set in domain {
                if set != ANY_DOMAIN && self.find_set(set).is_none() {
                    return Err(format!("Unknown domain set {} for symbol {}", set, name));
                }
            }
        }

        for param in &self.parameters {
            for (keys, _) in &param.values {
                if !self.domain_accepts(&param.domain, keys) {
                    return Err(format!(
                        "Record ({}) is outside the domain of {}",
                        keys.join(", "),
                        param.name
                    ));
                }
            }
        }

        for model in &self.models {
            for equ in &model.equations {
                if !self.equations.iter().any(|e| &e.name == equ) {
                    return Err(format!("Unknown equation {} in model {}", equ, model.name));
                }
            }
        }
        Ok(())
    }

    pub fn domain_accepts(&self, domain: &[String], keys: &[String]) -> bool {
        domain.len() == keys.len()
            && domain.iter().zip(keys).all(|(set, label)| {
                set == ANY_DOMAIN
                    || self
                        .find_set(set)
                        .is_some_and(|s| s.elements.iter().any(|e| e == label))
            })
    }

    /// Every key tuple of `domain`, or `None` when it contains the universe.
    pub fn enumerate(&self, domain: &[String]) -> Option<Vec<Vec<String>>> {
        let mut tuples: Vec<Vec<String>> = vec![Vec::new()];
        for set in domain {
            let elements = &self.find_set(set)?.elements;
            tuples = tuples
                .into_iter()
                .flat_map(|prefix| {
                    elements.iter().map(move |e| {
                        let mut next = prefix.clone();
                        next.push(e.clone());
                        next
                    })
                })
                .collect();
        }
        Some(tuples)
    }

    /// Appends the declarations of `other`, as a job resuming this program would.
    pub fn extend(mut self, other: ModelProgram) -> Result<Self, String> {
        self.sets.extend(other.sets);
        self.parameters.extend(other.parameters);
        self.variables.extend(other.variables);
        self.equations.extend(other.equations);
        self.models.extend(other.models);
        self.validate()?;
        Ok(self)
    }
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Binary content of a checkpoint file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointImage {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub program: ModelProgram,
}

impl CheckpointImage {
    pub fn new(program: ModelProgram) -> Self {
        Self {
            version: IMAGE_VERSION,
            created_at: Utc::now(),
            program,
        }
    }
}

/// Shadow parameter feeding a model parameter through the scenario dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioParameter {
    pub name: String,
    pub shadow: String,
}

/// What an instantiation job leaves in the scratch directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlFile {
    pub version: u32,
    pub program: ModelProgram,
    pub model: String,
    pub model_type: String,
    pub sense: Sense,
    pub objective: String,
    pub scenario: Vec<ScenarioParameter>,
    pub scr_dir: PathBuf,
    pub log_option: i32,
    pub log_file: Option<PathBuf>,
    pub opt_file: i32,
    pub opt_file_name: PathBuf,
}

// ============================================================================
// Scenario unit parsing
// ============================================================================

lazy_static! {
    static ref SOLVE_RE: Regex = Regex::new(
        r"(?i)\bsolve\s+(\w+)\s+(?:use|using)\s+(\w+)\s+(min|max)\w*\s+(\w+)(?:\s+scenario\s+(\w+))?\s*;"
    )
    .expect("valid solve statement pattern");
    static ref DICT_PARAM_RE: Regex =
        Regex::new(r"'(\w+)'\.'param'\.'(\w+)'").expect("valid dictionary pattern");
}

/// Solve statement and scenario parameters of a generated unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioRequest {
    pub model: String,
    pub model_type: String,
    pub sense: Sense,
    pub objective: String,
    pub dictionary: Option<String>,
    pub parameters: Vec<ScenarioParameter>,
}

impl ScenarioRequest {
    pub fn parse(source: &str) -> Result<Self, String> {
        let caps = SOLVE_RE
            .captures(source)
            .ok_or_else(|| "No solve statement found".to_string())?;
        let sense = if caps[3].eq_ignore_ascii_case("max") {
            Sense::Maximize
        } else {
            Sense::Minimize
        };
        let parameters = DICT_PARAM_RE
            .captures_iter(source)
            .map(|c| ScenarioParameter {
                name: c[1].to_string(),
                shadow: c[2].to_string(),
            })
            .collect::<Vec<_>>();
        let dictionary = caps.get(5).map(|m| m.as_str().to_string());
        if dictionary.is_none() && !parameters.is_empty() {
            return Err("Scenario parameters declared but solve has no scenario dictionary".into());
        }
        Ok(Self {
            model: caps[1].to_string(),
            model_type: caps[2].to_lowercase(),
            sense,
            objective: caps[4].to_string(),
            dictionary,
            parameters,
        })
    }
}

/// Options for one solver read from an option file: one `key value` pair per line.
pub fn parse_option_lines(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('*'))
        .map(|l| match l.split_once(char::is_whitespace) {
            Some((k, v)) => (k.to_lowercase(), v.trim().to_string()),
            None => (l.to_lowercase(), String::new()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program() -> ModelProgram {
        ModelProgram::new()
            .set("i", &["a", "b"])
            .set("j", &["x"])
            .parameter("c", &["i", "j"], &[(&["a", "x"], 1.5)])
            .scalar("f", 90.0)
            .variable("v", &["i", "j"], VarType::Positive)
            .variable("z", &[], VarType::Free)
            .equation("cost", &[], EquType::E)
            .model("m", &["cost"])
    }

    #[test]
    fn test_validate_and_enumerate() {
        let p = program();
        p.validate().unwrap();
        let keys = p.enumerate(&["i".into(), "j".into()]).unwrap();
        assert_eq!(keys, vec![vec!["a", "x"], vec!["b", "x"]]);
        assert_eq!(p.enumerate(&[]).unwrap(), vec![Vec::<String>::new()]);
        assert!(p.enumerate(&["*".into()]).is_none());
    }

    #[test]
    fn test_validate_rejects_bad_programs() {
        let dup = program().scalar("c", 1.0);
        assert!(dup.validate().unwrap_err().contains("more than once"));

        let outside = program().parameter("d", &["i"], &[(&["zz"], 1.0)]);
        assert!(outside.validate().unwrap_err().contains("outside the domain"));

        let bad_model = program().model("n", &["nope"]);
        assert!(bad_model.validate().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let p = program();
        let json = p.to_json().unwrap();
        assert_eq!(ModelProgram::from_json(&json).unwrap(), p);
    }

    #[test]
    fn test_parse_scenario_unit() {
        let unit = "option limrow = 0, limcol = 0;\n\
                    Set s__(*) /'s0'/;\n\
                    Parameter s__bmult(s__); s__bmult(s__) = Eps;\n\
                    Set dict(*,*,*) /\n's__'.'scenario'.'',\n'bmult'.'param'.'s__bmult'/;\n\
                    transport.justScrDir=1;\n\
                    solve transport use lp min z scenario dict;\n";
        let req = ScenarioRequest::parse(unit).unwrap();
        assert_eq!(req.model, "transport");
        assert_eq!(req.model_type, "lp");
        assert_eq!(req.sense, Sense::Minimize);
        assert_eq!(req.objective, "z");
        assert_eq!(req.dictionary.as_deref(), Some("dict"));
        assert_eq!(
            req.parameters,
            vec![ScenarioParameter {
                name: "bmult".into(),
                shadow: "s__bmult".into()
            }]
        );
    }

    #[test]
    fn test_parse_plain_solve() {
        let req = ScenarioRequest::parse("solve m using NLP maximizing profit;").unwrap();
        assert_eq!(req.model_type, "nlp");
        assert_eq!(req.sense, Sense::Maximize);
        assert!(req.parameters.is_empty());
        assert!(ScenarioRequest::parse("display x;").is_err());
    }

    #[test]
    fn test_option_lines() {
        let opts = parse_option_lines("* comment\ndump /tmp/d.json\n\nIterLim 10\n");
        assert_eq!(opts.get("dump").map(String::as_str), Some("/tmp/d.json"));
        assert_eq!(opts.get("iterlim").map(String::as_str), Some("10"));
        assert_eq!(opts.len(), 2);
    }
}
