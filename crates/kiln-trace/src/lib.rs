//! Debug trace exporter.
//!
//! When tracing is enabled, each compilation gets a fresh directory
//! holding the schedule snapshots (`ir_pre_fusion.txt`,
//! `ir_post_fusion.txt`) and any generated-code artifacts collaborators
//! hand over. The exporter announces a completed trace with a single
//! warning line so the directory is findable in production logs:
//!
//! ```text
//! debug trace: kiln_trace/model_0
//! ```
//!
//! Failures never remove the directory; whatever was written stays in
//! place for diagnosis.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use kiln_sched::{dump_schedule, ScheduleUnit};

/// File name of the pre-fusion schedule snapshot.
pub const IR_PRE_FUSION: &str = "ir_pre_fusion.txt";
/// File name of the post-fusion schedule snapshot.
pub const IR_POST_FUSION: &str = "ir_post_fusion.txt";
/// Artifact: human-readable rendering of the captured graph.
pub const FX_GRAPH_READABLE: &str = "fx_graph_readable.py";
/// Artifact: self-contained reproduction of the captured graph.
pub const FX_GRAPH_RUNNABLE: &str = "fx_graph_runnable.py";
/// Artifact: the graph after pre-scheduling transformations.
pub const FX_GRAPH_TRANSFORMED: &str = "fx_graph_transformed.py";
/// Artifact: the final generated code.
pub const OUTPUT_CODE: &str = "output_code.py";

/// Root directory used when the config does not override it.
pub const DEFAULT_TRACE_ROOT: &str = "kiln_trace";

const MAX_DIR_ATTEMPTS: usize = 1000;

/// Errors from trace directory or file writing.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// A trace directory could not be created.
    #[error("failed to create trace directory `{path}`")]
    CreateDir {
        /// The directory that could not be created.
        path: PathBuf,
        /// The underlying io error.
        #[source]
        source: io::Error,
    },

    /// A trace file could not be written.
    #[error("failed to write trace file `{path}`")]
    WriteFile {
        /// The file that could not be written.
        path: PathBuf,
        /// The underlying io error.
        #[source]
        source: io::Error,
    },
}

/// Whether and where to write debug traces.
#[derive(Clone, Debug, Default)]
pub struct TraceConfig {
    /// Master switch. When false, no directory is created and nothing
    /// is logged.
    pub enabled: bool,
    /// Root directory for traces; [`DEFAULT_TRACE_ROOT`] when `None`.
    pub dir: Option<PathBuf>,
}

impl TraceConfig {
    /// Tracing off.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Tracing on, rooted at `dir`.
    pub fn enabled_at(dir: impl Into<PathBuf>) -> Self {
        Self {
            enabled: true,
            dir: Some(dir.into()),
        }
    }

    /// Tracing on, rooted at [`DEFAULT_TRACE_ROOT`].
    pub fn enabled_default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

fn create_unique_dir(root: &Path, name: &str) -> Result<PathBuf, TraceError> {
    fs::create_dir_all(root).map_err(|source| TraceError::CreateDir {
        path: root.to_path_buf(),
        source,
    })?;
    for attempt in 0..MAX_DIR_ATTEMPTS {
        let candidate = if attempt == 0 {
            root.join(name)
        } else {
            root.join(format!("{name}_{attempt}"))
        };
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(source) => {
                return Err(TraceError::CreateDir {
                    path: candidate,
                    source,
                })
            }
        }
    }
    Err(TraceError::CreateDir {
        path: root.join(name),
        source: io::Error::new(
            io::ErrorKind::AlreadyExists,
            "all candidate directory names are taken",
        ),
    })
}

/// An open trace directory for one compilation.
#[derive(Debug)]
pub struct DebugContext {
    dir: PathBuf,
}

impl DebugContext {
    /// Open a fresh trace directory for the compilation `name`.
    ///
    /// Returns `None` without touching the filesystem when tracing is
    /// disabled. When the preferred directory name is taken, a numeric
    /// suffix is appended until a free one is found.
    pub fn create(config: &TraceConfig, name: &str) -> Result<Option<Self>, TraceError> {
        if !config.enabled {
            return Ok(None);
        }
        let root = config
            .dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TRACE_ROOT));
        let dir = create_unique_dir(&root, name)?;
        Ok(Some(Self { dir }))
    }

    /// The trace directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_file(&self, file_name: &str, contents: &str) -> Result<(), TraceError> {
        let path = self.dir.join(file_name);
        fs::write(&path, contents).map_err(|source| TraceError::WriteFile { path, source })
    }

    /// Write the pre-fusion schedule snapshot.
    pub fn save_ir_pre_fusion(&self, units: &[ScheduleUnit]) -> Result<(), TraceError> {
        self.write_file(IR_PRE_FUSION, &dump_schedule(units))
    }

    /// Write the post-fusion schedule snapshot.
    pub fn save_ir_post_fusion(&self, units: &[ScheduleUnit]) -> Result<(), TraceError> {
        self.write_file(IR_POST_FUSION, &dump_schedule(units))
    }

    /// Write a collaborator-produced artifact under `file_name`.
    pub fn save_artifact(&self, file_name: &str, contents: &str) -> Result<(), TraceError> {
        self.write_file(file_name, contents)
    }

    /// Close the trace and announce it. This is the only log line the
    /// exporter emits, and it is emitted exactly once per trace.
    pub fn finalize(self) -> PathBuf {
        log::warn!("debug trace: {}", self.dir.display());
        self.dir
    }
}

/// Run the full export sequence for one compilation: both snapshots,
/// all artifacts, then the completion warning. Returns the trace
/// directory, or `None` when tracing is disabled.
pub fn trace_compilation(
    config: &TraceConfig,
    name: &str,
    pre_fusion: &[ScheduleUnit],
    post_fusion: &[ScheduleUnit],
    artifacts: &[(String, String)],
) -> Result<Option<PathBuf>, TraceError> {
    let ctx = match DebugContext::create(config, name)? {
        Some(ctx) => ctx,
        None => return Ok(None),
    };
    ctx.save_ir_pre_fusion(pre_fusion)?;
    ctx.save_ir_post_fusion(post_fusion)?;
    for (file_name, contents) in artifacts {
        ctx.save_artifact(file_name, contents)?;
    }
    Ok(Some(ctx.finalize()))
}
