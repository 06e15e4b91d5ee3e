//! External C toolchain configuration and invocation.
//!
//! Settings come from the environment with platform defaults, the same
//! surface the generated-code boundary promises: a compiler command,
//! flags, and a shared-library suffix in; a loadable artifact (or a build
//! error carrying the toolchain's diagnostics) out.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::Error;

#[derive(Clone, Debug)]
pub struct Toolchain {
    /// Compiler command, `$CC` or `cc`.
    pub cc: String,
    /// Optimization and warning flags, `$CFLAGS` or `-O2`.
    pub cflags: Vec<String>,
    /// Flags that make a shared object, `$SHARED_CFLAGS` or `-shared -fPIC`.
    pub shared_flags: Vec<String>,
    /// Artifact suffix, `$SHARED_LIBRARY_SUFFIX` or the platform default.
    pub suffix: String,
}

impl Toolchain {
    /// Resolve the toolchain from the environment.
    pub fn from_env() -> Self {
        let suffix_default = if cfg!(target_os = "macos") {
            ".dylib"
        } else {
            ".so"
        };
        Self {
            cc: std::env::var("CC").unwrap_or_else(|_| "cc".to_string()),
            cflags: split_flags(std::env::var("CFLAGS").unwrap_or_else(|_| "-O2".to_string())),
            shared_flags: split_flags(
                std::env::var("SHARED_CFLAGS").unwrap_or_else(|_| "-shared -fPIC".to_string()),
            ),
            suffix: std::env::var("SHARED_LIBRARY_SUFFIX")
                .unwrap_or_else(|_| suffix_default.to_string()),
        }
    }

    /// Whether the configured compiler can be invoked at all.
    pub fn available(&self) -> bool {
        Command::new(&self.cc)
            .arg("--version")
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    /// Compile `source` into a shared object under `dir`, returning the
    /// artifact path. Failures carry the full generated source and the
    /// toolchain's stderr.
    pub fn build(&self, source: &str, dir: &Path, stem: &str) -> Result<PathBuf, Error> {
        let c_path = dir.join(format!("{stem}.c"));
        let lib_path = dir.join(format!("{stem}{}", self.suffix));
        std::fs::write(&c_path, source)?;

        let mut command = Command::new(&self.cc);
        command
            .args(&self.cflags)
            .args(&self.shared_flags)
            .arg("-o")
            .arg(&lib_path)
            .arg(&c_path);
        let rendered = format!(
            "{} {} {} -o {} {}",
            self.cc,
            self.cflags.join(" "),
            self.shared_flags.join(" "),
            lib_path.display(),
            c_path.display()
        );
        log::debug!("invoking toolchain: {rendered}");

        let output = command.output().map_err(|err| Error::BuildFailure {
            command: rendered.clone(),
            stderr: err.to_string(),
            source: source.to_string(),
        })?;
        if !output.status.success() {
            return Err(Error::BuildFailure {
                command: rendered,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                source: source.to_string(),
            });
        }
        Ok(lib_path)
    }
}

fn split_flags(text: String) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}
