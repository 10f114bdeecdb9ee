use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use log::{debug, info};
use serde_json::{json, Value};

use crate::config::{DEFAULT_ENGINE_TIMEOUT_SECS, NO_DATA};
use crate::engine::{ModelKind, PointCloudEngine};
use crate::error::{ChmError, Result};

/// Drives the PDAL command line tool with declarative pipeline documents.
///
/// A pipeline document is a JSON array of stages. Before execution the tile
/// path is substituted into the reader stage and the output path into the
/// writer stage, then the document is handed to `pdal pipeline`. Each
/// invocation runs under a timeout; expiry kills the process.
#[derive(Debug)]
pub struct PdalEngine {
    dtm_template: Value,
    dsm_template: Value,
    pdal_path: PathBuf,
    timeout: Duration,
}

impl PdalEngine {
    /// Engine with the built-in DTM/DSM pipeline templates.
    pub fn new(resolution: f64) -> Self {
        PdalEngine {
            dtm_template: default_dtm_template(resolution),
            dsm_template: default_dsm_template(resolution),
            pdal_path: PathBuf::from("pdal"),
            timeout: Duration::from_secs(DEFAULT_ENGINE_TIMEOUT_SECS),
        }
    }

    /// Engine with templates loaded from JSON files.
    pub fn from_template_files(dtm: &Path, dsm: &Path) -> Result<Self> {
        Ok(PdalEngine {
            dtm_template: load_template(dtm)?,
            dsm_template: load_template(dsm)?,
            pdal_path: PathBuf::from("pdal"),
            timeout: Duration::from_secs(DEFAULT_ENGINE_TIMEOUT_SECS),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use a specific `pdal` executable instead of whatever is in PATH.
    pub fn with_pdal_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.pdal_path = path.into();
        self
    }

    fn run_pipeline(&self, doc: &Value, source: &Path, kind: ModelKind) -> Result<()> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let stem = format!("rscanopy_{}_{}_{}", kind.label(), std::process::id(), timestamp);
        let pipeline_path = std::env::temp_dir().join(format!("{}.json", stem));
        let stderr_path = std::env::temp_dir().join(format!("{}.log", stem));

        let text = serde_json::to_string_pretty(doc)
            .map_err(|e| ChmError::PipelineConfig(e.to_string()))?;
        std::fs::write(&pipeline_path, text)?;
        debug!("pipeline document written to {:?}", pipeline_path);

        let stderr_file = std::fs::File::create(&stderr_path)?;
        let mut child = Command::new(&self.pdal_path)
            .arg("pipeline")
            .arg(&pipeline_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr_file))
            .spawn()
            .map_err(|e| {
                let _ = std::fs::remove_file(&pipeline_path);
                let _ = std::fs::remove_file(&stderr_path);
                ChmError::EngineFailed {
                    engine: "pdal".to_string(),
                    path: source.to_path_buf(),
                    details: format!(
                        "failed to launch {:?}: {}. Make sure PDAL is installed and in PATH",
                        self.pdal_path, e
                    ),
                }
            })?;

        let started = Instant::now();
        let status = loop {
            match child.try_wait()? {
                Some(status) => break status,
                None => {
                    if started.elapsed() >= self.timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        let _ = std::fs::remove_file(&pipeline_path);
                        let _ = std::fs::remove_file(&stderr_path);
                        return Err(ChmError::EngineTimeout {
                            engine: "pdal".to_string(),
                            path: source.to_path_buf(),
                            seconds: self.timeout.as_secs(),
                        });
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
            }
        };

        let diagnostics = std::fs::read_to_string(&stderr_path).unwrap_or_default();
        let _ = std::fs::remove_file(&pipeline_path);
        let _ = std::fs::remove_file(&stderr_path);

        if !status.success() {
            return Err(ChmError::EngineFailed {
                engine: "pdal".to_string(),
                path: source.to_path_buf(),
                details: tail(&diagnostics, 20),
            });
        }
        Ok(())
    }
}

impl PointCloudEngine for PdalEngine {
    fn name(&self) -> &'static str {
        "pdal"
    }

    fn generate(&self, source: &Path, output: &Path, kind: ModelKind) -> Result<()> {
        let template = match kind {
            ModelKind::Terrain => &self.dtm_template,
            ModelKind::Surface => &self.dsm_template,
        };
        let doc = prepare_pipeline(template, source, output)?;
        info!("[{}] running pdal pipeline over {:?}", kind.label(), source);
        self.run_pipeline(&doc, source, kind)?;
        info!("[{}] wrote {:?}", kind.label(), output);
        Ok(())
    }
}

fn load_template(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)?;
    let doc: Value = serde_json::from_str(&text)
        .map_err(|e| ChmError::PipelineConfig(format!("template {:?}: {}", path, e)))?;
    // A dry substitution catches structural problems before any tile runs
    prepare_pipeline(&doc, Path::new("input.las"), Path::new("output.tif"))?;
    Ok(doc)
}

/// Substitute the tile and output paths into a pipeline template.
///
/// The reader stage is the first whose type starts with `readers.` (falling
/// back to the first stage); the writer stage is the last whose type starts
/// with `writers.` (falling back to the last stage).
fn prepare_pipeline(template: &Value, source: &Path, output: &Path) -> Result<Value> {
    let mut doc = template.clone();
    let stages = doc.as_array_mut().ok_or_else(|| {
        ChmError::PipelineConfig("pipeline document must be a JSON array of stages".to_string())
    })?;
    if stages.len() < 2 {
        return Err(ChmError::PipelineConfig(
            "pipeline needs at least a reader and a writer stage".to_string(),
        ));
    }
    let reader = stage_index(stages, "readers.").unwrap_or(0);
    let writer = last_stage_index(stages, "writers.").unwrap_or(stages.len() - 1);
    if reader == writer {
        return Err(ChmError::PipelineConfig(
            "could not tell the reader and writer stages apart".to_string(),
        ));
    }
    set_filename(&mut stages[reader], source)?;
    set_filename(&mut stages[writer], output)?;
    Ok(doc)
}

fn stage_type(stage: &Value) -> Option<&str> {
    stage.get("type").and_then(Value::as_str)
}

fn stage_index(stages: &[Value], prefix: &str) -> Option<usize> {
    stages
        .iter()
        .position(|s| stage_type(s).map_or(false, |t| t.starts_with(prefix)))
}

fn last_stage_index(stages: &[Value], prefix: &str) -> Option<usize> {
    stages
        .iter()
        .rposition(|s| stage_type(s).map_or(false, |t| t.starts_with(prefix)))
}

fn set_filename(stage: &mut Value, path: &Path) -> Result<()> {
    let obj = stage.as_object_mut().ok_or_else(|| {
        ChmError::PipelineConfig("pipeline stage must be a JSON object".to_string())
    })?;
    obj.insert(
        "filename".to_string(),
        Value::String(path.to_string_lossy().into_owned()),
    );
    Ok(())
}

/// Ground-classified terrain: keep class 2, max elevation per cell.
fn default_dtm_template(resolution: f64) -> Value {
    json!([
        { "type": "readers.las", "filename": "" },
        { "type": "filters.range", "limits": "Classification[2:2]" },
        {
            "type": "writers.gdal",
            "filename": "",
            "resolution": resolution,
            "output_type": "max",
            "nodata": NO_DATA,
            "data_type": "float32"
        }
    ])
}

/// Highest-return surface: first returns, max elevation per cell.
fn default_dsm_template(resolution: f64) -> Value {
    json!([
        { "type": "readers.las", "filename": "" },
        { "type": "filters.range", "limits": "returnnumber[1:1]" },
        {
            "type": "writers.gdal",
            "filename": "",
            "resolution": resolution,
            "output_type": "max",
            "nodata": NO_DATA,
            "data_type": "float32"
        }
    ])
}

fn tail(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}
