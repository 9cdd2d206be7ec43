//! Sequential Function Charts: a directed graph of steps and transitions.

use crate::ir::{Expr, Stmt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChartError {
    #[error("duplicate step '{0}'")]
    DuplicateStep(String),
    #[error("chart has no initial step")]
    NoInitialStep,
    #[error("chart has more than one initial step: {0:?}")]
    MultipleInitialSteps(Vec<String>),
    #[error("transition references unknown step '{0}'")]
    UnknownStep(String),
    #[error("step '{0}' is disconnected from the chart")]
    Disconnected(String),
    #[error("step '{0}' is not reachable from the initial step")]
    Unreachable(String),
    #[error("chart has no steps")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub initial: bool,
    /// Executed once when the step activates.
    pub actions: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub source: String,
    pub target: String,
    pub condition: Expr,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Chart {
    pub steps: Vec<Step>,
    pub transitions: Vec<Transition>,
}

impl Chart {
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn initial_step(&self) -> Option<&Step> {
        self.steps.iter().find(|s| s.initial)
    }

    /// Transitions leaving `step`, in declaration order.
    pub fn outgoing<'a>(&'a self, step: &'a str) -> impl Iterator<Item = &'a Transition> {
        self.transitions.iter().filter(move |t| t.source == step)
    }

    /// Structural validation: unique step names, exactly one initial step,
    /// transitions referencing existing steps, weak connectivity, and
    /// reachability of every step from the initial one.
    pub fn validate(&self) -> Result<(), Vec<ChartError>> {
        let mut errors = Vec::new();

        if self.steps.is_empty() {
            return Err(vec![ChartError::Empty]);
        }

        let mut names: HashSet<&str> = HashSet::new();
        for step in &self.steps {
            if !names.insert(step.name.as_str()) {
                errors.push(ChartError::DuplicateStep(step.name.clone()));
            }
        }

        let initials: Vec<&str> = self
            .steps
            .iter()
            .filter(|s| s.initial)
            .map(|s| s.name.as_str())
            .collect();
        match initials.len() {
            0 => errors.push(ChartError::NoInitialStep),
            1 => {}
            _ => errors.push(ChartError::MultipleInitialSteps(
                initials.iter().map(|s| s.to_string()).collect(),
            )),
        }

        let mut dangling = false;
        for t in &self.transitions {
            for step in [&t.source, &t.target] {
                if !names.contains(step.as_str()) {
                    errors.push(ChartError::UnknownStep(step.clone()));
                    dangling = true;
                }
            }
        }

        // Graph checks are only meaningful on a well-formed step set.
        if !dangling && initials.len() == 1 {
            let mut undirected: HashMap<&str, Vec<&str>> = HashMap::new();
            let mut directed: HashMap<&str, Vec<&str>> = HashMap::new();
            for t in &self.transitions {
                undirected
                    .entry(t.source.as_str())
                    .or_default()
                    .push(t.target.as_str());
                undirected
                    .entry(t.target.as_str())
                    .or_default()
                    .push(t.source.as_str());
                directed
                    .entry(t.source.as_str())
                    .or_default()
                    .push(t.target.as_str());
            }

            let start = self.steps[0].name.as_str();
            let connected = bfs(start, &undirected);
            for step in &self.steps {
                if !connected.contains(step.name.as_str()) {
                    errors.push(ChartError::Disconnected(step.name.clone()));
                }
            }

            let reachable = bfs(initials[0], &directed);
            for step in &self.steps {
                if !reachable.contains(step.name.as_str()) && step.name != initials[0] {
                    errors.push(ChartError::Unreachable(step.name.clone()));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn bfs<'a>(start: &'a str, edges: &HashMap<&'a str, Vec<&'a str>>) -> HashSet<&'a str> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    seen.insert(start);
    queue.push_back(start);
    while let Some(node) = queue.pop_front() {
        if let Some(next) = edges.get(node) {
            for &n in next {
                if seen.insert(n) {
                    queue.push_back(n);
                }
            }
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::Span;
    use crate::value::Value;

    fn cond() -> Expr {
        Expr::literal(Value::Bool(true), Span::dummy())
    }

    fn step(name: &str, initial: bool) -> Step {
        Step {
            name: name.to_string(),
            initial,
            actions: vec![],
        }
    }

    fn transition(source: &str, target: &str) -> Transition {
        Transition {
            source: source.to_string(),
            target: target.to_string(),
            condition: cond(),
        }
    }

    #[test]
    fn valid_ring_chart() {
        let chart = Chart {
            steps: vec![step("idle", true), step("fill", false), step("mix", false)],
            transitions: vec![
                transition("idle", "fill"),
                transition("fill", "mix"),
                transition("mix", "idle"),
            ],
        };
        assert!(chart.validate().is_ok());
    }

    #[test]
    fn missing_initial_rejected() {
        let chart = Chart {
            steps: vec![step("a", false)],
            transitions: vec![],
        };
        assert_eq!(chart.validate().unwrap_err(), vec![ChartError::NoInitialStep]);
    }

    #[test]
    fn unreachable_step_rejected() {
        let chart = Chart {
            steps: vec![step("a", true), step("b", false), step("c", false)],
            transitions: vec![transition("a", "b"), transition("c", "b")],
        };
        let errors = chart.validate().unwrap_err();
        assert!(errors.contains(&ChartError::Unreachable("c".to_string())));
    }

    #[test]
    fn dangling_transition_rejected() {
        let chart = Chart {
            steps: vec![step("a", true)],
            transitions: vec![transition("a", "ghost")],
        };
        let errors = chart.validate().unwrap_err();
        assert!(errors.contains(&ChartError::UnknownStep("ghost".to_string())));
    }
}
