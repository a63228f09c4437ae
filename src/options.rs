use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
};

use strum::{Display, EnumString};

/// Language dialect of the program being compiled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
pub enum LangVersion {
    /// The legacy dialect. Actions and tables keep their source names and
    /// names may be used before their declaration.
    #[strum(serialize = "p4-14")]
    P4v1,
    #[default]
    #[strum(serialize = "p4-16")]
    P4v16,
}

#[derive(Debug, Clone)]
pub struct CompilerOptions {
    pub lang_version: LangVersion,
    /// Name of the compiled source, used to derive dump file names
    pub file: PathBuf,
    /// When set, intermediate snapshots are written into this directory
    pub dump_dir: Option<PathBuf>,
    /// Emit a note for every pass a pass manager runs
    pub trace_passes: bool,
    /// Upper bound on iterations of any repeated pass group
    pub max_fixpoint_iterations: usize,
}

impl CompilerOptions {
    pub const DEFAULT_MAX_FIXPOINT_ITERATIONS: usize = 64;

    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            lang_version: LangVersion::default(),
            file: file.into(),
            dump_dir: None,
            trace_passes: false,
            max_fixpoint_iterations: Self::DEFAULT_MAX_FIXPOINT_ITERATIONS,
        }
    }

    pub fn is_legacy(&self) -> bool {
        self.lang_version == LangVersion::P4v1
    }

    /// Path of the snapshot written for `suffix`, if dumping is enabled
    pub fn dump_path(&self, suffix: &str) -> Option<PathBuf> {
        let dir = self.dump_dir.as_deref()?;
        let stem = self
            .file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "program".to_owned());

        Some(dir.join(format!("{stem}{suffix}.p4")))
    }

    /// Opens the snapshot destination for `suffix`. `None` when dumping is
    /// disabled.
    pub fn dump_stream(&self, suffix: &str) -> Option<io::Result<File>> {
        self.dump_path(suffix).map(|path| create_file(&path))
    }
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self::new("program.p4")
    }
}

fn create_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    File::create(path)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn lang_version_round_trips_through_strings() {
        assert_eq!(LangVersion::from_str("p4-14").unwrap(), LangVersion::P4v1);
        assert_eq!(LangVersion::from_str("p4-16").unwrap(), LangVersion::P4v16);
        assert_eq!(LangVersion::P4v1.to_string(), "p4-14");
        assert!(LangVersion::from_str("p4-15").is_err());
    }

    #[test]
    fn dump_path_uses_file_stem_and_suffix() {
        let mut options = CompilerOptions::new("switch/basic.p4");
        assert_eq!(options.dump_path("-inline"), None);

        options.dump_dir = Some(PathBuf::from("/tmp/dumps"));
        assert_eq!(
            options.dump_path("-inline"),
            Some(PathBuf::from("/tmp/dumps/basic-inline.p4"))
        );
    }
}
