//! Compilation unit generated by `instantiate`.
//!
//! Every parameter modifier gets a shadow parameter over the one-element
//! scenario set `s__`, seeded with `Eps` so the dictionary always maps it, and
//! an entry in the scenario dictionary `dict`.

use super::modifier::Modifier;

const SCENARIO_SET: &str = "s__";
const DICTIONARY: &str = "dict";

/// Builds the source text of an instantiation job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioUnit {
    model_definition: String,
    parameters: Vec<(String, usize)>,
}

impl ScenarioUnit {
    /// `model_definition` is the tail of a solve statement, e.g. `transport use lp min z`.
    pub fn new(model_definition: impl Into<String>) -> Self {
        Self {
            model_definition: model_definition.into().trim().trim_end_matches(';').to_string(),
            parameters: Vec::new(),
        }
    }

    pub fn from_modifiers(model_definition: &str, modifiers: &[Modifier]) -> Self {
        modifiers
            .iter()
            .filter(|m| m.is_parameter())
            .fold(Self::new(model_definition), |unit, m| {
                unit.parameter(m.symbol().name(), m.symbol().dim())
            })
    }

    pub fn parameter(mut self, name: impl Into<String>, dim: usize) -> Self {
        self.parameters.push((name.into(), dim));
        self
    }

    /// First word of the model definition.
    pub fn model_name(&self) -> &str {
        self.model_definition
            .split_whitespace()
            .next()
            .unwrap_or_default()
    }

    pub fn has_scenario(&self) -> bool {
        !self.parameters.is_empty()
    }

    pub fn build(&self) -> String {
        let mut unit = String::from("option limrow = 0, limcol = 0;\n");

        if self.has_scenario() {
            unit.push_str(&format!("Set {}(*) /'s0'/;\n", SCENARIO_SET));
            for (name, dim) in &self.parameters {
                let universe = ",*".repeat(*dim);
                let scenario = format!(",{}", SCENARIO_SET).repeat(*dim);
                unit.push_str(&format!(
                    "Parameter {set}{name}({set}{universe}); {set}{name}({set}{scenario}) = Eps;\n",
                    set = SCENARIO_SET,
                ));
            }

            unit.push_str(&format!(
                "Set {}(*,*,*) /\n'{}'.'scenario'.''",
                DICTIONARY, SCENARIO_SET
            ));
            for (name, _) in &self.parameters {
                unit.push_str(&format!(",\n'{name}'.'param'.'{SCENARIO_SET}{name}'"));
            }
            unit.push_str("/;\n");
        }

        unit.push_str(&format!("{}.justScrDir=1;\n", self.model_name()));
        unit.push_str(&format!("solve {}", self.model_definition));
        if self.has_scenario() {
            unit.push_str(&format!(" scenario {}", DICTIONARY));
        }
        unit.push_str(";\n");
        unit
    }
}
