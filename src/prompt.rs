//! File/folder selection and user notices.
//!
//! The pipeline only talks to these traits; a dismissed prompt comes back as
//! `Ok(None)` and the orchestrator turns it into `PipelineError::Aborted`.

use anyhow::{Context, Result};
use std::{
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
};
use tracing::{error, info, warn};

/// Kind of file a prompt accepts, matched on extension (case-insensitive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFilter {
    pub label: &'static str,
    pub extension: &'static str,
}

impl FileFilter {
    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(self.extension))
    }
}

/// The three files the pipeline asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Registry,
    Sectors,
    Municipalities,
}

impl Input {
    pub fn prompt(self) -> &'static str {
        match self {
            Input::Registry => "Select the RUES registry file (.txt)",
            Input::Sectors => "Select the CIIU_PIB sector file (.csv)",
            Input::Municipalities => "Select the Municipios_Provincias file (.csv)",
        }
    }

    pub fn filter(self) -> FileFilter {
        match self {
            Input::Registry => FileFilter {
                label: "Text files",
                extension: "txt",
            },
            Input::Sectors | Input::Municipalities => FileFilter {
                label: "CSV files",
                extension: "csv",
            },
        }
    }
}

pub const OUTPUT_DIR_PROMPT: &str = "Select the folder for the output files";

pub trait PathSelector {
    /// `Ok(None)` means the user gave up on the prompt.
    fn select_input(&mut self, input: Input) -> Result<Option<PathBuf>>;
    fn select_output_dir(&mut self, prompt: &str) -> Result<Option<PathBuf>>;
}

pub trait Notifier {
    fn notify_completion(&mut self, message: &str);
    fn notify_error(&mut self, message: &str);
}

/// Reads paths line by line. An empty line or end of input aborts; a path that
/// does not exist or has the wrong extension is asked for again.
pub struct TerminalSelector<R, W> {
    input: R,
    output: W,
}

impl TerminalSelector<io::StdinLock<'static>, io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stderr())
    }
}

impl<R: BufRead, W: Write> TerminalSelector<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn ask(&mut self, prompt: &str) -> Result<Option<PathBuf>> {
        write!(self.output, "{} (empty to cancel): ", prompt)?;
        self.output.flush()?;
        let mut line = String::new();
        let n = self.input.read_line(&mut line).context("reading path from terminal")?;
        let answer = line.trim();
        if n == 0 || answer.is_empty() {
            return Ok(None);
        }
        Ok(Some(PathBuf::from(answer)))
    }
}

impl<R: BufRead, W: Write> PathSelector for TerminalSelector<R, W> {
    fn select_input(&mut self, input: Input) -> Result<Option<PathBuf>> {
        let filter = input.filter();
        loop {
            let Some(path) = self.ask(input.prompt())? else {
                return Ok(None);
            };
            if !path.is_file() {
                writeln!(self.output, "{} is not a file", path.display())?;
            } else if !filter.accepts(&path) {
                writeln!(
                    self.output,
                    "{} is not one of: {} (*.{})",
                    path.display(),
                    filter.label,
                    filter.extension
                )?;
            } else {
                return Ok(Some(path));
            }
        }
    }

    fn select_output_dir(&mut self, prompt: &str) -> Result<Option<PathBuf>> {
        loop {
            let Some(path) = self.ask(prompt)? else {
                return Ok(None);
            };
            if path.is_dir() {
                return Ok(Some(path));
            }
            writeln!(self.output, "{} is not a directory", path.display())?;
        }
    }
}

/// Paths given up front (CLI or config). Anything not preset is delegated to
/// `fallback`; without a fallback the prompt counts as dismissed.
#[derive(Default)]
pub struct PresetSelector {
    pub registry: Option<PathBuf>,
    pub sectors: Option<PathBuf>,
    pub municipalities: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub fallback: Option<Box<dyn PathSelector>>,
}

impl PathSelector for PresetSelector {
    fn select_input(&mut self, input: Input) -> Result<Option<PathBuf>> {
        let preset = match input {
            Input::Registry => self.registry.clone(),
            Input::Sectors => self.sectors.clone(),
            Input::Municipalities => self.municipalities.clone(),
        };
        match (preset, self.fallback.as_mut()) {
            (Some(path), _) => Ok(Some(path)),
            (None, Some(fallback)) => fallback.select_input(input),
            (None, None) => {
                warn!(?input, "no path configured and prompting disabled");
                Ok(None)
            }
        }
    }

    fn select_output_dir(&mut self, prompt: &str) -> Result<Option<PathBuf>> {
        match (self.output_dir.clone(), self.fallback.as_mut()) {
            (Some(path), _) => Ok(Some(path)),
            (None, Some(fallback)) => fallback.select_output_dir(prompt),
            (None, None) => {
                warn!("no output directory configured and prompting disabled");
                Ok(None)
            }
        }
    }
}

/// Prints notices to the terminal and mirrors them into the log.
#[derive(Debug, Default)]
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify_completion(&mut self, message: &str) {
        info!("{}", message);
        println!("{}", message);
    }

    fn notify_error(&mut self, message: &str) {
        error!("{}", message);
        eprintln!("Error: {}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::{fs, io::Cursor};
    use tempfile::tempdir;

    fn terminal(script: &str) -> TerminalSelector<Cursor<Vec<u8>>, Vec<u8>> {
        TerminalSelector::new(Cursor::new(script.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn empty_answer_or_eof_aborts() -> Result<()> {
        assert_eq!(terminal("\n").select_input(Input::Registry)?, None);
        assert_eq!(terminal("").select_output_dir(OUTPUT_DIR_PROMPT)?, None);
        Ok(())
    }

    #[test]
    fn reprompts_until_extension_matches() -> Result<()> {
        let dir = tempdir()?;
        let wrong = dir.path().join("rues.csv");
        let right = dir.path().join("RUES.TXT");
        fs::write(&wrong, "x")?;
        fs::write(&right, "x")?;

        let script = format!(
            "{}\n{}\n{}\n",
            dir.path().join("missing.txt").display(),
            wrong.display(),
            right.display()
        );
        let mut sel = terminal(&script);
        assert_eq!(sel.select_input(Input::Registry)?, Some(right));
        let shown = String::from_utf8(sel.output.clone())?;
        assert!(shown.contains("is not a file"));
        assert!(shown.contains("is not one of"));
        Ok(())
    }

    #[test]
    fn output_dir_must_be_a_directory() -> Result<()> {
        let dir = tempdir()?;
        let file = dir.path().join("f.txt");
        fs::write(&file, "x")?;
        let script = format!("{}\n{}\n", file.display(), dir.path().display());
        let mut sel = terminal(&script);
        assert_eq!(
            sel.select_output_dir(OUTPUT_DIR_PROMPT)?,
            Some(dir.path().to_path_buf())
        );
        Ok(())
    }

    #[test]
    fn preset_wins_and_missing_without_fallback_aborts() -> Result<()> {
        let mut sel = PresetSelector {
            registry: Some(PathBuf::from("rues.txt")),
            ..Default::default()
        };
        assert_eq!(sel.select_input(Input::Registry)?, Some(PathBuf::from("rues.txt")));
        assert_eq!(sel.select_input(Input::Sectors)?, None);
        assert_eq!(sel.select_output_dir(OUTPUT_DIR_PROMPT)?, None);
        Ok(())
    }

    #[test]
    fn preset_delegates_to_fallback() -> Result<()> {
        let dir = tempdir()?;
        let mut sel = PresetSelector {
            fallback: Some(Box::new(terminal(&format!("{}\n", dir.path().display())))),
            ..Default::default()
        };
        assert_eq!(
            sel.select_output_dir(OUTPUT_DIR_PROMPT)?,
            Some(dir.path().to_path_buf())
        );
        Ok(())
    }
}
