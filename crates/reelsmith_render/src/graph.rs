//! Typed filter graph.
//!
//! Chains are pushed in order; every label a chain consumes must have been
//! produced by an earlier chain, and input indices must refer to a declared
//! input. The graph is only turned into ffmpeg's `-filter_complex` text once
//! it has been validated.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("chain reads input {index} but only {count} inputs are declared")]
    UnknownInput { index: usize, count: usize },

    #[error("stream [{0}] is consumed before it is produced")]
    Unproduced(String),

    #[error("stream [{0}] is consumed twice")]
    AlreadyConsumed(String),

    #[error("stream [{0}] is produced twice")]
    DuplicateLabel(String),

    #[error("chain producing {0:?} has no filters")]
    EmptyChain(Vec<String>),

    #[error("chain has no output label")]
    MissingOutput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Video,
    Audio,
}

/// A stream a chain reads: a raw input pad or a labelled intermediate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StreamRef {
    Input { index: usize, kind: StreamKind },
    Label(String),
}

impl StreamRef {
    pub fn video(index: usize) -> Self {
        StreamRef::Input {
            index,
            kind: StreamKind::Video,
        }
    }

    pub fn audio(index: usize) -> Self {
        StreamRef::Input {
            index,
            kind: StreamKind::Audio,
        }
    }

    pub fn label(name: impl Into<String>) -> Self {
        StreamRef::Label(name.into())
    }
}

impl fmt::Display for StreamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamRef::Input {
                index,
                kind: StreamKind::Video,
            } => write!(f, "[{index}:v]"),
            StreamRef::Input {
                index,
                kind: StreamKind::Audio,
            } => write!(f, "[{index}:a]"),
            StreamRef::Label(name) => write!(f, "[{name}]"),
        }
    }
}

/// One `;`-separated chain: inputs, comma-joined filters, output labels.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterChain {
    pub inputs: Vec<StreamRef>,
    pub filters: Vec<String>,
    pub outputs: Vec<String>,
}

impl FilterChain {
    pub fn new(inputs: impl IntoIterator<Item = StreamRef>) -> Self {
        Self {
            inputs: inputs.into_iter().collect(),
            filters: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn from_stream(input: StreamRef) -> Self {
        Self::new([input])
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filters.push(filter.into());
        self
    }

    pub fn output(mut self, label: impl Into<String>) -> Self {
        self.outputs.push(label.into());
        self
    }
}

impl fmt::Display for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for input in &self.inputs {
            write!(f, "{input}")?;
        }
        f.write_str(&self.filters.join(","))?;
        for output in &self.outputs {
            write!(f, "[{output}]")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FilterGraph {
    input_count: usize,
    chains: Vec<FilterChain>,
    produced: HashSet<String>,
    consumed: HashSet<String>,
}

impl FilterGraph {
    pub fn new(input_count: usize) -> Self {
        Self {
            input_count,
            chains: Vec::new(),
            produced: HashSet::new(),
            consumed: HashSet::new(),
        }
    }

    /// Validate and append a chain. On error the graph is left unchanged.
    pub fn push(&mut self, chain: FilterChain) -> Result<(), GraphError> {
        if chain.outputs.is_empty() {
            return Err(GraphError::MissingOutput);
        }
        if chain.filters.is_empty() {
            return Err(GraphError::EmptyChain(chain.outputs));
        }

        let mut reads = HashSet::new();
        for input in &chain.inputs {
            match input {
                StreamRef::Input { index, .. } if *index >= self.input_count => {
                    return Err(GraphError::UnknownInput {
                        index: *index,
                        count: self.input_count,
                    });
                }
                StreamRef::Input { .. } => {}
                StreamRef::Label(name) => {
                    if !self.produced.contains(name) {
                        return Err(GraphError::Unproduced(name.clone()));
                    }
                    if self.consumed.contains(name) || !reads.insert(name.clone()) {
                        return Err(GraphError::AlreadyConsumed(name.clone()));
                    }
                }
            }
        }

        let mut writes = HashSet::new();
        for output in &chain.outputs {
            if self.produced.contains(output) || !writes.insert(output.clone()) {
                return Err(GraphError::DuplicateLabel(output.clone()));
            }
        }

        self.consumed.extend(reads);
        self.produced.extend(writes);
        self.chains.push(chain);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// `-filter_complex` text.
    pub fn serialize(&self) -> String {
        self.chains
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(";")
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// An encoder input with the options that must precede its `-i`.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInput {
    pub path: PathBuf,
    pub options: Vec<String>,
}

/// Ordered encoder inputs; the position of each input is its stream index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputSet {
    inputs: Vec<MediaInput>,
}

impl InputSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: impl Into<PathBuf>) -> usize {
        self.add_with(path, std::iter::empty::<String>())
    }

    /// Looped indefinitely (`-stream_loop -1`).
    pub fn add_looped(&mut self, path: impl Into<PathBuf>) -> usize {
        self.add_with(path, ["-stream_loop", "-1"])
    }

    pub fn add_with<S: Into<String>>(
        &mut self,
        path: impl Into<PathBuf>,
        options: impl IntoIterator<Item = S>,
    ) -> usize {
        self.inputs.push(MediaInput {
            path: path.into(),
            options: options.into_iter().map(Into::into).collect(),
        });
        self.inputs.len() - 1
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn into_vec(self) -> Vec<MediaInput> {
        self.inputs
    }
}

/// Quote a path for use inside a filter option (`ass=`, `movie=`).
pub fn escape_filter_path(path: &Path) -> String {
    let s = path.to_string_lossy().replace('\\', "/");
    let s = s.replace(':', "\\:").replace('\'', "'\\''");
    format!("'{s}'")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
