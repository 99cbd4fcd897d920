/*!
# FileTracer - Directory Transformation

Writes an instrumented copy of a source tree. Files accepted by the
[`FileFilter`] go through the [`Tracer`]; everything else, and every file
the engine leaves unchanged, is copied verbatim so the output directory is
a complete replacement for the input.
*/

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::engine::Tracer;
use super::rules::RuleStats;
use crate::config::GentraceConfig;
use crate::filter::FileFilter;
use crate::{Result, TraceError};

/// Directory-level driver around a [`Tracer`]
pub struct FileTracer {
    tracer: Tracer,
    filter: FileFilter,
    write_maps: bool,
}

impl FileTracer {
    pub fn new(tracer: Tracer, filter: FileFilter) -> Self {
        Self {
            tracer,
            filter,
            write_maps: false,
        }
    }

    pub fn from_config(config: &GentraceConfig) -> Result<Self> {
        Ok(Self::new(
            Tracer::new(config.options.clone())?,
            FileFilter::new(&config.include, &config.exclude)?,
        ))
    }

    /// Write `<file>.map` next to every transformed file
    pub fn write_maps(mut self, enabled: bool) -> Self {
        self.write_maps = enabled;
        self
    }

    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    /// Transform every file below `source_dir` into `output_dir`
    pub fn transform_directory<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        source_dir: P,
        output_dir: Q,
    ) -> Result<FileTransformationSummary> {
        let source_path = source_dir.as_ref();
        let output_path = output_dir.as_ref();

        if !source_path.is_dir() {
            return Err(TraceError::Config(format!(
                "Source directory does not exist: {}",
                source_path.display()
            )));
        }
        fs::create_dir_all(output_path)?;

        let mut files = Vec::new();
        collect_files(source_path, source_path, output_path, &mut files)?;
        debug!(files = files.len(), source = %source_path.display(), "collected source files");

        let summary = files
            .par_iter()
            .map(|(path, file_id)| {
                let target = output_path.join(file_id);
                let mut summary = FileTransformationSummary::new();
                if let Err(e) = self.process_file(path, file_id, &target, &mut summary) {
                    warn!(file = %file_id, error = %e, "failed to process file");
                    summary.errors.push(format!("Error processing {}: {}", path.display(), e));
                }
                summary
            })
            .reduce(FileTransformationSummary::new, |mut total, file_summary| {
                total.merge(file_summary);
                total
            });

        info!(
            processed = summary.files_processed,
            transformed = summary.files_transformed,
            copied = summary.files_copied,
            errors = summary.errors.len(),
            "directory trace finished"
        );
        Ok(summary)
    }

    /// Transform or copy a single file to `output_file`
    pub fn transform_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        source_file: P,
        output_file: Q,
    ) -> Result<FileTransformationSummary> {
        let source_path = source_file.as_ref();
        let file_id = normalize_id(source_path);
        let mut summary = FileTransformationSummary::new();
        self.process_file(source_path, &file_id, output_file.as_ref(), &mut summary)?;
        Ok(summary)
    }

    fn process_file(
        &self,
        path: &Path,
        file_id: &str,
        target: &Path,
        summary: &mut FileTransformationSummary,
    ) -> Result<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        if !self.filter.should_process(file_id) {
            fs::copy(path, target)?;
            summary.files_copied += 1;
            return Ok(());
        }

        summary.files_processed += 1;
        let source = fs::read_to_string(path)?;
        let output = self.tracer.transform(&source, file_id)?;
        summary.record_stats(&output.stats);

        if !output.transformed {
            fs::copy(path, target)?;
            summary.files_copied += 1;
            return Ok(());
        }

        fs::write(target, &output.code)?;
        if let (true, Some(map)) = (self.write_maps, &output.map) {
            fs::write(map_path(target), map)?;
        }
        summary.files_transformed += 1;
        debug!(file = file_id, "transformed");
        Ok(())
    }
}

/// Summary of file transformation results
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FileTransformationSummary {
    /// Files accepted by the filter and handed to the engine
    pub files_processed: u64,
    pub files_transformed: u64,
    /// Files written unchanged, whether filtered out or left untouched
    pub files_copied: u64,
    pub errors: Vec<String>,
    /// Per-rule totals over every processed file
    pub rule_stats: Vec<RuleStats>,
}

impl FileTransformationSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, other: FileTransformationSummary) {
        self.files_processed += other.files_processed;
        self.files_transformed += other.files_transformed;
        self.files_copied += other.files_copied;
        self.errors.extend(other.errors);
        self.record_stats(&other.rule_stats);
    }

    pub fn record_stats(&mut self, stats: &[RuleStats]) {
        for stat in stats {
            match self.rule_stats.iter_mut().find(|s| s.rule_name == stat.rule_name) {
                Some(total) => total.merge(stat),
                None => self.rule_stats.push(stat.clone()),
            }
        }
    }

    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Walk `current_dir`, collecting `(path, relative id)` pairs in a stable order
fn collect_files(
    current_dir: &Path,
    source_root: &Path,
    output_root: &Path,
    files: &mut Vec<(PathBuf, String)>,
) -> Result<()> {
    let mut entries = fs::read_dir(current_dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();

    for path in entries {
        if path.is_dir() {
            // An output directory nested in the source tree is not input
            if path == output_root {
                continue;
            }
            collect_files(&path, source_root, output_root, files)?;
        } else if let Ok(relative) = path.strip_prefix(source_root) {
            let file_id = normalize_id(relative);
            files.push((path, file_id));
        }
    }

    Ok(())
}

fn normalize_id(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn map_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".map");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_merge() {
        let mut total = FileTransformationSummary::new();
        total.merge(FileTransformationSummary {
            files_processed: 2,
            files_transformed: 1,
            files_copied: 3,
            errors: vec!["Error processing a.ts: boom".to_string()],
            rule_stats: vec![RuleStats {
                rule_name: "StackFrameInstrumentation".to_string(),
                applications: 2,
                transformations: 1,
                total_time_us: 12,
            }],
        });
        total.merge(FileTransformationSummary {
            files_processed: 1,
            rule_stats: vec![RuleStats {
                rule_name: "StackFrameInstrumentation".to_string(),
                applications: 1,
                transformations: 1,
                total_time_us: 3,
            }],
            ..Default::default()
        });
        assert_eq!(total.files_processed, 3);
        assert_eq!(total.files_copied, 3);
        assert!(!total.success());
        assert_eq!(total.rule_stats.len(), 1);
        assert_eq!(total.rule_stats[0].applications, 3);
        assert_eq!(total.rule_stats[0].transformations, 2);
    }

    #[test]
    fn test_map_path() {
        assert_eq!(map_path(Path::new("out/src/main.ts")), PathBuf::from("out/src/main.ts.map"));
    }

    #[test]
    fn test_normalize_id() {
        assert_eq!(normalize_id(Path::new("src/app/main.ts")), "src/app/main.ts");
    }
}
