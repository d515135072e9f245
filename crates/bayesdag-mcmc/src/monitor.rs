//! Output sinks invoked by the sampler at a fixed sampling frequency.

use std::any::Any;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

use bayesdag_core::{DagError, ErrorInfo, NodeId, Value};
use bayesdag_dag::Model;
use serde::{Deserialize, Serialize};

/// Narrow output interface driven by the sampler.
///
/// Monitors reference model nodes by identifier and are rewired by name
/// when a chain is replicated, exactly like moves.
pub trait Monitor: fmt::Debug + Send {
    /// Short name used in diagnostics.
    fn name(&self) -> &str;

    /// Nodes whose values are recorded, in column order.
    fn nodes(&self) -> Vec<NodeId>;

    /// Replaces the referenced nodes positionally.
    fn replace_nodes(&mut self, nodes: &[NodeId]);

    /// Replaces every reference to `old` by `new`.
    fn swap_node(&mut self, old: NodeId, new: NodeId) {
        let nodes: Vec<NodeId> = self
            .nodes()
            .into_iter()
            .map(|node| if node == old { new } else { node })
            .collect();
        self.replace_nodes(&nodes);
    }

    /// Clears recorded state ahead of a run of `expected_samples` generations.
    fn reset(&mut self, expected_samples: usize);

    /// Opens the output destination.
    fn open_output(&mut self) -> Result<(), DagError>;

    /// Writes column headers.
    fn write_header(&mut self, model: &Model) -> Result<(), DagError>;

    /// Records the state at `generation` if it falls on the sampling frequency.
    fn record(&mut self, generation: u64, model: &mut Model) -> Result<(), DagError>;

    /// Flushes and releases the output destination.
    fn close(&mut self) -> Result<(), DagError> {
        Ok(())
    }

    /// Clones the monitor behind a box. Open outputs are not shared.
    fn clone_box(&self) -> Box<dyn Monitor>;

    /// Downcasting hook.
    fn as_any(&self) -> &dyn Any;
}

impl Clone for Box<dyn Monitor> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

fn check_frequency(every: u64, monitor: &str) -> Result<(), DagError> {
    if every == 0 {
        return Err(DagError::Config(
            ErrorInfo::new(
                "invalid-sampling-frequency",
                "monitor sampling frequency must be at least one",
            )
            .with_context("monitor", monitor),
        ));
    }
    Ok(())
}

fn header(nodes: &[NodeId], model: &Model) -> Vec<String> {
    nodes.iter().map(|id| model.label(*id)).collect()
}

/// One recorded sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRow {
    /// Generation at which the sample was taken.
    pub generation: u64,
    /// Unheated log posterior.
    pub posterior: f64,
    /// Log likelihood (clamped nodes).
    pub likelihood: f64,
    /// Log prior (free stochastic nodes).
    pub prior: f64,
    /// Values of the monitored nodes, in column order.
    pub values: Vec<Value>,
}

/// Keeps samples in memory.
#[derive(Debug, Clone)]
pub struct TraceMonitor {
    nodes: Vec<NodeId>,
    every: u64,
    columns: Vec<String>,
    rows: Vec<TraceRow>,
}

impl TraceMonitor {
    /// Records `nodes` every `every` generations.
    pub fn new(nodes: &[NodeId], every: u64) -> Result<Self, DagError> {
        check_frequency(every, "trace")?;
        Ok(Self {
            nodes: nodes.to_vec(),
            every,
            columns: Vec::new(),
            rows: Vec::new(),
        })
    }

    /// Samples recorded so far.
    pub fn rows(&self) -> &[TraceRow] {
        &self.rows
    }

    /// Column labels captured by the last header write.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Real values of one monitored column across all rows.
    pub fn real_column(&self, column: &str) -> Option<Vec<f64>> {
        let position = self.columns.iter().position(|name| name == column)?;
        self.rows
            .iter()
            .map(|row| row.values[position].as_real().ok())
            .collect()
    }
}

impl Monitor for TraceMonitor {
    fn name(&self) -> &str {
        "trace"
    }

    fn nodes(&self) -> Vec<NodeId> {
        self.nodes.clone()
    }

    fn replace_nodes(&mut self, nodes: &[NodeId]) {
        self.nodes = nodes.to_vec();
    }

    fn reset(&mut self, expected_samples: usize) {
        self.rows.clear();
        self.rows
            .reserve(expected_samples / self.every.max(1) as usize + 1);
    }

    fn open_output(&mut self) -> Result<(), DagError> {
        Ok(())
    }

    fn write_header(&mut self, model: &Model) -> Result<(), DagError> {
        self.columns = header(&self.nodes, model);
        Ok(())
    }

    fn record(&mut self, generation: u64, model: &mut Model) -> Result<(), DagError> {
        if generation % self.every != 0 {
            return Ok(());
        }
        let components = model.ln_components()?;
        let mut values = Vec::with_capacity(self.nodes.len());
        for id in &self.nodes {
            values.push(model.value(*id)?.clone());
        }
        self.rows.push(TraceRow {
            generation,
            posterior: components.posterior(),
            likelihood: components.likelihood,
            prior: components.prior,
            values,
        });
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Monitor> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Writes delimited text through `csv`.
pub struct FileMonitor {
    path: PathBuf,
    delimiter: u8,
    nodes: Vec<NodeId>,
    every: u64,
    writer: Option<csv::Writer<File>>,
}

impl FileMonitor {
    /// Writes `nodes` to `path` every `every` generations, tab separated.
    pub fn new(path: impl AsRef<Path>, nodes: &[NodeId], every: u64) -> Result<Self, DagError> {
        check_frequency(every, "file")?;
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            delimiter: b'\t',
            nodes: nodes.to_vec(),
            every,
            writer: None,
        })
    }

    /// Overrides the field delimiter.
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Destination path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&mut self) -> Result<&mut csv::Writer<File>, DagError> {
        let path = self.path.display().to_string();
        self.writer.as_mut().ok_or_else(|| {
            DagError::Monitor(
                ErrorInfo::new("monitor-not-open", "output must be opened before writing")
                    .with_context("path", path),
            )
        })
    }

    fn write_fields(&mut self, fields: &[String]) -> Result<(), DagError> {
        let path = self.path.display().to_string();
        self.writer()?.write_record(fields).map_err(|err| {
            DagError::Monitor(
                ErrorInfo::new("monitor-write", err.to_string()).with_context("path", path),
            )
        })
    }
}

impl fmt::Debug for FileMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileMonitor")
            .field("path", &self.path)
            .field("nodes", &self.nodes)
            .field("every", &self.every)
            .field("open", &self.writer.is_some())
            .finish()
    }
}

impl Monitor for FileMonitor {
    fn name(&self) -> &str {
        "file"
    }

    fn nodes(&self) -> Vec<NodeId> {
        self.nodes.clone()
    }

    fn replace_nodes(&mut self, nodes: &[NodeId]) {
        self.nodes = nodes.to_vec();
    }

    fn reset(&mut self, _expected_samples: usize) {}

    fn open_output(&mut self) -> Result<(), DagError> {
        let writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_path(&self.path)
            .map_err(|err| {
                DagError::Monitor(
                    ErrorInfo::new("monitor-open", err.to_string())
                        .with_context("path", self.path.display().to_string()),
                )
            })?;
        self.writer = Some(writer);
        Ok(())
    }

    fn write_header(&mut self, model: &Model) -> Result<(), DagError> {
        let mut fields: Vec<String> = ["generation", "posterior", "likelihood", "prior"]
            .iter()
            .map(|name| name.to_string())
            .collect();
        fields.extend(header(&self.nodes, model));
        self.write_fields(&fields)
    }

    fn record(&mut self, generation: u64, model: &mut Model) -> Result<(), DagError> {
        if generation % self.every != 0 {
            return Ok(());
        }
        let components = model.ln_components()?;
        let mut fields = vec![
            generation.to_string(),
            components.posterior().to_string(),
            components.likelihood.to_string(),
            components.prior.to_string(),
        ];
        for id in &self.nodes {
            fields.push(model.value(*id)?.to_string());
        }
        self.write_fields(&fields)
    }

    fn close(&mut self) -> Result<(), DagError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(|err| {
                DagError::Monitor(
                    ErrorInfo::new("monitor-flush", err.to_string())
                        .with_context("path", self.path.display().to_string()),
                )
            })?;
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Monitor> {
        Box::new(FileMonitor {
            path: self.path.clone(),
            delimiter: self.delimiter,
            nodes: self.nodes.clone(),
            every: self.every,
            writer: None,
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
