use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;
use crate::core::error::{Error, ErrorKind, Result};

/// Driver for the external SVM-rank learner and classifier
#[derive(Debug, Clone)]
pub struct SvmRank {
    pub learn_path: PathBuf,
    pub classify_path: PathBuf,
    pub c: f64,  // Trade-off between training error and margin
}

impl SvmRank {
    pub fn new(learn_path: PathBuf, classify_path: PathBuf, c: f64) -> Self {
        SvmRank { learn_path, classify_path, c }
    }

    /// `svm_rank_learn -c <c> <features> <model>`
    pub fn train(&self, features: &Path, model: &Path) -> Result<()> {
        let c = self.c.to_string();
        run(&self.learn_path, [OsStr::new("-c"), OsStr::new(&c), features.as_os_str(), model.as_os_str()])
    }

    /// `svm_rank_classify <features> <model> <predictions>`
    pub fn classify(&self, features: &Path, model: &Path, predictions: &Path) -> Result<()> {
        run(&self.classify_path, [features.as_os_str(), model.as_os_str(), predictions.as_os_str()])
    }
}

fn run<'a, I>(program: &Path, args: I) -> Result<()>
where
    I: IntoIterator<Item = &'a OsStr>,
{
    log::info!("Running {}", program.display());
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| Error::new(ErrorKind::External, format!("Failed to run {}: {}", program.display(), e)))?;

    for line in String::from_utf8_lossy(&output.stdout).lines() {
        log::debug!("{}: {}", program.display(), line);
    }
    for line in String::from_utf8_lossy(&output.stderr).lines() {
        log::warn!("{}: {}", program.display(), line);
    }

    if !output.status.success() {
        return Err(Error::new(ErrorKind::External, format!(
            "{} failed with status: {}", program.display(), output.status
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_is_an_external_error() {
        let svm = SvmRank::new(
            PathBuf::from("/nonexistent/svm_rank_learn"),
            PathBuf::from("/nonexistent/svm_rank_classify"),
            0.001,
        );
        let err = svm.train(Path::new("train.dat"), Path::new("model.dat")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::External);
    }
}
