//! Tasks, methods, and the planning domain record.

use serde::{Deserialize, Serialize};

use crate::error::{PlanError, Result};
use crate::literal::{FunctionComparison, FunctionEffect, Literal};

/// A typed task or method variable, e.g. `?r : robot`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedVar {
    pub name: String,
    pub sort: String,
}

impl TypedVar {
    pub fn new(name: impl Into<String>, sort: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sort: sort.into(),
        }
    }
}

/// A task precondition: a signed literal or a function comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precondition {
    Literal(Literal),
    Comparison(FunctionComparison),
}

/// A task effect: a signed literal or a function update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Literal(Literal),
    Function(FunctionEffect),
}

/// A primitive or abstract task from the planning domain.
///
/// Abstract tasks are the ones referenced by methods in
/// [`Domain::methods`]; primitive tasks execute directly. Variable renaming
/// during decomposition may append suffixed variables, so
/// `original_var_count` remembers how many variables the domain declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    pub vars: Vec<TypedVar>,
    #[serde(default)]
    pub preconditions: Vec<Precondition>,
    #[serde(default)]
    pub effects: Vec<Effect>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(skip)]
    pub original_var_count: usize,
}

impl Task {
    pub fn original_vars(&self) -> &[TypedVar] {
        let count = if self.original_var_count == 0 {
            self.vars.len()
        } else {
            self.original_var_count
        };
        &self.vars[..count.min(self.vars.len())]
    }
}

/// A reference to a task inside a method's task network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    pub task: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// A named decomposition of an abstract task into an ordered subtask list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Method {
    pub name: String,
    /// Abstract task this method decomposes.
    pub task: String,
    /// Arguments of the decomposed task, in task-variable order.
    #[serde(default)]
    pub task_args: Vec<String>,
    #[serde(default)]
    pub vars: Vec<TypedVar>,
    #[serde(default)]
    pub preconditions: Vec<Precondition>,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
}

/// A sort in the domain's type hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDef {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
}

/// The planning domain: sort hierarchy, predicate and function signatures,
/// primitive and abstract tasks, and methods. Immutable after ingestion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Domain {
    pub name: String,
    #[serde(default)]
    pub sorts: Vec<SortDef>,
    #[serde(default)]
    pub predicates: Vec<crate::literal::PredicateDef>,
    #[serde(default)]
    pub functions: Vec<crate::literal::PredicateDef>,
    #[serde(default)]
    pub primitive_tasks: Vec<Task>,
    #[serde(default)]
    pub abstract_tasks: Vec<Task>,
    #[serde(default)]
    pub methods: Vec<Method>,
}

impl Domain {
    pub fn primitive(&self, name: &str) -> Option<&Task> {
        self.primitive_tasks.iter().find(|t| t.name == name)
    }

    pub fn abstract_task(&self, name: &str) -> Option<&Task> {
        self.abstract_tasks.iter().find(|t| t.name == name)
    }

    pub fn methods_for(&self, task: &str) -> Vec<&Method> {
        self.methods.iter().filter(|m| m.task == task).collect()
    }

    /// Whether `sort` is `ancestor` or transitively derives from it.
    pub fn sort_derives_from(&self, sort: &str, ancestor: &str) -> bool {
        let mut current = sort;
        loop {
            if current == ancestor {
                return true;
            }
            match self
                .sorts
                .iter()
                .find(|s| s.name == current)
                .and_then(|s| s.parent.as_deref())
            {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// All sorts deriving from any of the given roots (the robot-related
    /// sort set used during lowering).
    pub fn sorts_derived_from(&self, roots: &[&str]) -> Vec<String> {
        let mut out: Vec<String> = roots.iter().map(|r| r.to_string()).collect();
        for sort in &self.sorts {
            if roots.iter().any(|r| self.sort_derives_from(&sort.name, r))
                && !out.contains(&sort.name)
            {
                out.push(sort.name.clone());
            }
        }
        out
    }

    /// Verify that every method decomposes a declared abstract task and that
    /// every subtask reference resolves. Run once after ingestion.
    pub fn validate(&self) -> Result<()> {
        for method in &self.methods {
            if self.abstract_task(&method.task).is_none() {
                return Err(PlanError::DomainInconsistency {
                    node: method.name.clone(),
                    detail: format!("method decomposes undefined abstract task [{}]", method.task),
                });
            }
            for subtask in &method.subtasks {
                let known = self.primitive(&subtask.task).is_some()
                    || self.abstract_task(&subtask.task).is_some();
                if !known {
                    return Err(PlanError::DomainInconsistency {
                        node: method.name.clone(),
                        detail: format!("subtask [{}] is not defined in the domain", subtask.task),
                    });
                }
            }
        }
        Ok(())
    }
}
