//! Pipeline orchestration.
//!
//! Runs the three phases of a project on a [`ThreadPool`]: palettes, then
//! converts, then outputs. Each phase waits for the previous one to finish,
//! so converts only see finished palettes and outputs only see finished
//! converts. A phase with a failed job stops the run.

use crate::convert::Convert;
use crate::output::{Items, Output};
use crate::palette::Palette;
use crate::pool::{default_jobs, ThreadPool};
use crate::quantize::{MedianCut, Quantizer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

/// The three pipeline phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Palettes,
    Converts,
    Outputs,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Palettes => write!(f, "palette generation"),
            Phase::Converts => write!(f, "image conversion"),
            Phase::Outputs => write!(f, "output generation"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// At least one job of the phase failed; details were logged
    #[error("{0} failed")]
    PhaseFailed(Phase),
}

/// Palettes, converts and outputs of one project.
#[derive(Debug, Clone, Default)]
pub struct Project {
    pub palettes: Vec<Palette>,
    pub converts: Vec<Convert>,
    pub outputs: Vec<Output>,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Default)]
pub struct PipelineResult {
    /// Every file written, sorted
    pub files: Vec<PathBuf>,
    pub durations: Vec<(Phase, Duration)>,
    pub total_duration: Duration,
}

impl PipelineResult {
    pub fn duration_of(&self, phase: Phase) -> Option<Duration> {
        self.durations.iter().find(|(p, _)| *p == phase).map(|(_, d)| *d)
    }
}

pub struct Pipeline {
    project: Project,
    jobs: usize,
    quantizer: Arc<dyn Quantizer>,
}

impl Pipeline {
    pub fn new(project: Project) -> Self {
        Self { project, jobs: default_jobs(), quantizer: Arc::new(MedianCut) }
    }

    /// Set the number of worker threads.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_quantizer(mut self, quantizer: Arc<dyn Quantizer>) -> Self {
        self.quantizer = quantizer;
        self
    }

    pub fn run(self) -> Result<PipelineResult, PipelineError> {
        let start = Instant::now();
        let Project { mut palettes, converts, outputs } = self.project;
        let pool = ThreadPool::new(self.jobs);
        let mut result = PipelineResult::default();

        for palette in palettes.iter_mut().filter(|p| p.is_automatic()) {
            let name = palette.name.clone();
            palette.set_automatic_images(
                converts
                    .iter()
                    .filter(|c| c.palette.as_deref() == Some(name.as_str()))
                    .flat_map(|c| c.source_paths()),
            );
        }

        // Palettes
        let phase_start = Instant::now();
        let quantizer = Arc::clone(&self.quantizer);
        let palettes = run_phase(&pool, Phase::Palettes, palettes, move |palette: &mut Palette| {
            palette.generate(&*quantizer).map_err(|e| format!("palette '{}': {}", palette.name, e))
        })?;
        let palettes: BTreeMap<String, Arc<Palette>> =
            palettes.into_iter().map(|p| (p.name.clone(), Arc::new(p))).collect();
        result.durations.push((Phase::Palettes, phase_start.elapsed()));

        // Converts
        let phase_start = Instant::now();
        let lookup = palettes.clone();
        let converts = run_phase(&pool, Phase::Converts, converts, move |convert: &mut Convert| {
            let palette = match &convert.palette {
                Some(name) => Some(lookup.get(name).cloned().ok_or_else(|| {
                    format!("convert '{}': unknown palette '{}'", convert.name, name)
                })?),
                None => None,
            };
            convert
                .generate(palette.as_deref())
                .map_err(|e| format!("convert '{}': {}", convert.name, e))
        })?;
        let converts: BTreeMap<String, Arc<Convert>> =
            converts.into_iter().map(|c| (c.name.clone(), Arc::new(c))).collect();
        result.durations.push((Phase::Converts, phase_start.elapsed()));

        // Outputs
        let phase_start = Instant::now();
        let written = Arc::new(Mutex::new(Vec::new()));
        for output in outputs {
            let palettes = palettes.clone();
            let converts = converts.clone();
            let written = Arc::clone(&written);
            pool.submit(move || match generate_output(&output, &palettes, &converts) {
                Ok(files) => {
                    written.lock().unwrap_or_else(|e| e.into_inner()).extend(files);
                    true
                }
                Err(e) => {
                    log::error!(
                        "{} output in '{}': {}",
                        output.format.name(),
                        output.directory.display(),
                        e
                    );
                    false
                }
            });
        }
        if !pool.wait_all() {
            return Err(PipelineError::PhaseFailed(Phase::Outputs));
        }
        result.durations.push((Phase::Outputs, phase_start.elapsed()));

        let mut files = written.lock().unwrap_or_else(|e| e.into_inner()).clone();
        files.sort();
        result.files = files;
        result.total_duration = start.elapsed();
        Ok(result)
    }
}

/// Run `job` over every item on the pool and hand the items back once the
/// phase has finished.
fn run_phase<T, F>(
    pool: &ThreadPool,
    phase: Phase,
    items: Vec<T>,
    job: F,
) -> Result<Vec<T>, PipelineError>
where
    T: Send + 'static,
    F: Fn(&mut T) -> Result<(), String> + Send + Sync + 'static,
{
    let job = Arc::new(job);
    let slots: Vec<Arc<Mutex<T>>> =
        items.into_iter().map(|item| Arc::new(Mutex::new(item))).collect();

    for slot in &slots {
        let slot = Arc::clone(slot);
        let job = Arc::clone(&job);
        pool.submit(move || {
            let mut item = slot.lock().unwrap_or_else(|e| e.into_inner());
            match job(&mut item) {
                Ok(()) => true,
                Err(message) => {
                    log::error!("{}", message);
                    false
                }
            }
        });
    }
    if !pool.wait_all() {
        return Err(PipelineError::PhaseFailed(phase));
    }

    Ok(slots
        .into_iter()
        .filter_map(|slot| match Arc::try_unwrap(slot) {
            Ok(mutex) => Some(mutex.into_inner().unwrap_or_else(|e| e.into_inner())),
            Err(_) => None,
        })
        .collect())
}

fn generate_output(
    output: &Output,
    palettes: &BTreeMap<String, Arc<Palette>>,
    converts: &BTreeMap<String, Arc<Convert>>,
) -> Result<Vec<PathBuf>, String> {
    let mut items = Items::default();
    for name in &output.palettes {
        let palette = palettes.get(name).ok_or_else(|| format!("unknown palette '{}'", name))?;
        items.palettes.push(palette);
    }
    for name in &output.converts {
        let convert = converts.get(name).ok_or_else(|| format!("unknown convert '{}'", name))?;
        items.converts.push(convert);
    }
    output.generate(&items).map_err(|e| e.to_string())
}
