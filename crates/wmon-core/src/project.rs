//! Project information: where the firmware image, its ELF and the IDF
//! checkout live.
//!
//! Paths come from the session config when set there, otherwise from the
//! project's Makefiles.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, info, instrument};

use crate::collab::{CaptureSuspension, TerminalCapture};
use crate::config::SessionConfig;

pub const VAR_IDF_PATH: &str = "IDF_PATH";
pub const VAR_APP_ELF: &str = "APP_ELF";
pub const VAR_APP_BIN: &str = "APP_BIN";

/// Resolves variables defined by a build system.
pub trait BuildVariables {
    fn resolve(&self, files: &[PathBuf], names: &[&str]) -> Result<HashMap<String, String>>;
}

/// Resolves variables by asking `make` to print them.
pub struct MakeVariables {
    pub make: String,
    tag: String,
}

impl Default for MakeVariables {
    fn default() -> Self {
        Self {
            make: "make".to_string(),
            tag: format!("wmon_{}_", std::process::id()),
        }
    }
}

impl MakeVariables {
    /// Makefile that includes `files` and prints `<tag><NAME>$<value>` per
    /// variable from a uniquely named target.
    fn render(&self, files: &[PathBuf], names: &[&str]) -> String {
        let mut out = String::new();
        for file in files {
            out.push_str(&format!("include {}\n", file.display()));
        }
        out.push_str("MAKECMDGOALS =\n");
        out.push_str(&format!("{}:\n", self.tag));
        for name in names {
            out.push_str(&format!("\t$(info {}{}$$${{{}}})\n", self.tag, name, name));
        }
        out
    }

    fn parse(&self, output: &str) -> HashMap<String, String> {
        output
            .lines()
            .filter_map(|line| line.strip_prefix(&self.tag))
            .filter_map(|kv| kv.split_once('$'))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

impl BuildVariables for MakeVariables {
    #[instrument(skip(self))]
    fn resolve(&self, files: &[PathBuf], names: &[&str]) -> Result<HashMap<String, String>> {
        // make runs from the makefile's directory, so includes must not be
        // relative to ours.
        let files = files
            .iter()
            .map(std::path::absolute)
            .collect::<std::io::Result<Vec<_>>>()
            .context("resolving makefile paths")?;
        let first = files.first().ok_or_else(|| anyhow!("no makefiles given"))?;
        let dir = first.parent().unwrap_or(Path::new("."));

        let mut makefile = tempfile::Builder::new()
            .prefix(".vars.")
            .suffix(".mk")
            .tempfile_in(dir)
            .with_context(|| format!("creating temporary makefile in {}", dir.display()))?;
        makefile.write_all(self.render(&files, names).as_bytes())?;
        makefile.flush()?;

        let output = Command::new(&self.make)
            .arg("-f")
            .arg(makefile.path())
            .arg(&self.tag)
            .current_dir(dir)
            .output()
            .with_context(|| format!("running {}", self.make))?;
        if !output.status.success() {
            bail!(
                "{} failed ({}): {}",
                self.make,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        let values = self.parse(&String::from_utf8_lossy(&output.stdout));
        debug!(?values, "Resolved build variables");
        Ok(values)
    }
}

/// Paths needed to build, flash and debug the firmware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectInfo {
    pub path: PathBuf,
    pub idf_path: PathBuf,
    pub app_elf: PathBuf,
    pub app_bin: PathBuf,
}

impl ProjectInfo {
    /// Fill in every path, consulting `vars` only for what the config
    /// leaves unset.
    pub fn resolve(config: &SessionConfig, vars: &dyn BuildVariables) -> Result<Self> {
        let path = PathBuf::from(&config.project_path);
        let mut known: HashMap<&str, String> = [
            (VAR_IDF_PATH, config.idf_path.clone()),
            (VAR_APP_ELF, config.app_elf.clone()),
            (VAR_APP_BIN, config.app_bin.clone()),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
        .collect();

        let missing: Vec<&str> = [VAR_IDF_PATH, VAR_APP_ELF, VAR_APP_BIN]
            .into_iter()
            .filter(|k| !known.contains_key(k))
            .collect();
        if !missing.is_empty() {
            let files: Vec<PathBuf> = config.makefiles.iter().map(|m| path.join(m)).collect();
            let mut resolved = vars.resolve(&files, &missing)?;
            for name in missing {
                match resolved.remove(name) {
                    Some(value) if !value.is_empty() => {
                        known.insert(name, value);
                    }
                    _ => bail!("could not resolve variable ${}", name),
                }
            }
        }

        let mut take = |name: &str| PathBuf::from(known.remove(name).unwrap_or_default());
        let info = Self {
            idf_path: take(VAR_IDF_PATH),
            app_elf: take(VAR_APP_ELF),
            app_bin: take(VAR_APP_BIN),
            path,
        };
        info!(bin = %info.app_bin.display(), elf = %info.app_elf.display(), "Project resolved");
        Ok(info)
    }

    /// `make <app_bin>` in the project directory.
    pub fn build_command(&self) -> Command {
        let mut cmd = Command::new("make");
        cmd.arg(&self.app_bin).current_dir(&self.path);
        cmd
    }

    /// Compile the firmware image, with the terminal handed to `make`.
    pub fn build(&self, terminal: &dyn TerminalCapture) -> Result<()> {
        let _terminal = CaptureSuspension::acquire(terminal)?;
        let status = self.build_command().status().context("running make")?;
        if !status.success() {
            bail!("compilation failed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct FakeVars {
        values: HashMap<String, String>,
        asked: RefCell<Vec<String>>,
    }

    impl BuildVariables for FakeVars {
        fn resolve(&self, files: &[PathBuf], names: &[&str]) -> Result<HashMap<String, String>> {
            assert!(files[0].ends_with("Makefile"));
            self.asked
                .borrow_mut()
                .extend(names.iter().map(|n| n.to_string()));
            Ok(self.values.clone())
        }
    }

    fn fake(pairs: &[(&str, &str)]) -> FakeVars {
        FakeVars {
            values: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            asked: RefCell::new(Vec::new()),
        }
    }

    #[test]
    fn test_render_makefile() {
        let make = MakeVariables {
            make: "make".into(),
            tag: "T_".into(),
        };
        let text = make.render(&[PathBuf::from("/p/Makefile")], &["APP_BIN"]);
        assert_eq!(
            text,
            "include /p/Makefile\nMAKECMDGOALS =\nT_:\n\t$(info T_APP_BIN$$${APP_BIN})\n"
        );
    }

    #[test]
    fn test_parse_make_output() {
        let make = MakeVariables {
            make: "make".into(),
            tag: "T_".into(),
        };
        let values = make.parse("noise\nT_APP_BIN$/p/build/app.bin\nT_IDF_PATH$/opt/idf\n");
        assert_eq!(values["APP_BIN"], "/p/build/app.bin");
        assert_eq!(values["IDF_PATH"], "/opt/idf");
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_config_overrides_skip_make() {
        let config = SessionConfig {
            idf_path: Some("/opt/idf".into()),
            app_elf: Some("app.elf".into()),
            app_bin: Some("app.bin".into()),
            ..Default::default()
        };
        let vars = fake(&[]);
        let info = ProjectInfo::resolve(&config, &vars).unwrap();
        assert_eq!(info.app_bin, PathBuf::from("app.bin"));
        assert!(vars.asked.borrow().is_empty());
    }

    #[test]
    fn test_only_missing_variables_resolved() {
        let config = SessionConfig {
            idf_path: Some("/opt/idf".into()),
            ..Default::default()
        };
        let vars = fake(&[("APP_ELF", "b/app.elf"), ("APP_BIN", "b/app.bin")]);
        let info = ProjectInfo::resolve(&config, &vars).unwrap();
        assert_eq!(*vars.asked.borrow(), vec!["APP_ELF", "APP_BIN"]);
        assert_eq!(info.app_elf, PathBuf::from("b/app.elf"));
        assert_eq!(info.idf_path, PathBuf::from("/opt/idf"));
    }

    #[test]
    fn test_unresolved_variable_is_an_error() {
        let vars = fake(&[("APP_ELF", "x"), ("APP_BIN", "")]);
        let err = ProjectInfo::resolve(&SessionConfig::default(), &vars).unwrap_err();
        assert!(err.to_string().contains("$IDF_PATH"));
    }
}
