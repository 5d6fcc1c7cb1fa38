//! External covering-array generation.
//!
//! The generator is a black box behind `CoveringEngine`: the model goes out
//! as an input-parameter listing plus implication constraints, a
//! whitespace table of index assignments comes back. Calls block; any
//! timeout policy belongs to the caller. A failed generation is an expected
//! outcome ("no covering cases this round"), never a crash: the model
//! layer degrades to an empty case list.

use crate::error::OracleError;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

#[derive(Debug, Clone)]
pub struct Constraint {
    pub text: String,
    /// Variables the constraint mentions, state column first.
    pub vars: Vec<String>,
}

/// One submission: ordered parameter domains (as index lists) plus the
/// implication constraints tying parameter indices to the state column.
#[derive(Debug, Clone)]
pub struct CoveringRequest {
    pub system: String,
    pub parameters: Vec<(String, Vec<String>)>,
    pub constraints: Vec<Constraint>,
    pub strength: u8,
}

impl CoveringRequest {
    /// Render the request in the generator's model format.
    pub fn render(&self) -> String {
        let mut out = Vec::new();
        out.push("[System]".to_string());
        out.push(format!("Name: {}", self.system));
        out.push("[Parameter]".to_string());
        for (name, indices) in &self.parameters {
            out.push(format!("{name} (enum): {}", indices.join(",")));
        }
        if !self.constraints.is_empty() {
            out.push("[Constraint]".to_string());
            for constraint in &self.constraints {
                out.push(constraint.text.clone());
            }
        }
        out.join("\n")
    }
}

pub trait CoveringEngine {
    fn covering_array(&self, request: &CoveringRequest) -> Result<String, OracleError>;
}

/// Engine placeholder used when no generator is configured. Every call
/// fails, which the model layer turns into an empty test-case list.
#[derive(Debug, Default)]
pub struct NullEngine;

impl CoveringEngine for NullEngine {
    fn covering_array(&self, _request: &CoveringRequest) -> Result<String, OracleError> {
        Err(OracleError::NotConfigured)
    }
}

/// Subprocess adapter around the combinatorial generator jar.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    pub java_bin: String,
    pub jar_path: PathBuf,
    pub work_dir: PathBuf,
}

impl ProcessEngine {
    pub fn new(java_bin: impl Into<String>, jar_path: PathBuf, work_dir: PathBuf) -> Self {
        Self {
            java_bin: java_bin.into(),
            jar_path,
            work_dir,
        }
    }
}

impl CoveringEngine for ProcessEngine {
    fn covering_array(&self, request: &CoveringRequest) -> Result<String, OracleError> {
        let transport = |e: std::io::Error| OracleError::Transport(e.to_string());

        std::fs::create_dir_all(&self.work_dir).map_err(transport)?;
        let input = self.work_dir.join(format!("{}.model.txt", request.system));
        let output = self.work_dir.join(format!("{}.ca.txt", request.system));
        let mut file = std::fs::File::create(&input).map_err(transport)?;
        file.write_all(request.render().as_bytes()).map_err(transport)?;

        let status = Command::new(&self.java_bin)
            .arg(format!("-Ddoi={}", request.strength))
            .arg("-Doutput=csv")
            .arg("-jar")
            .arg(&self.jar_path)
            .arg(&input)
            .arg(&output)
            .current_dir(&self.work_dir)
            .status()
            .map_err(transport)?;
        if !status.success() {
            return Err(OracleError::Transport(format!(
                "generator exited with {status}"
            )));
        }

        let table = std::fs::read_to_string(&output).map_err(transport)?;
        if table.trim().is_empty() {
            return Err(OracleError::EmptyTable(request.system.clone()));
        }
        Ok(table)
    }
}
