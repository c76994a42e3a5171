use crossterm::tty::IsTty;
use reedline::{Prompt, PromptEditMode, PromptHistorySearch, PromptHistorySearchStatus, Reedline, Signal};
use std::borrow::Cow;
use std::fs::OpenOptions;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::settings::SharedSettings;

/// Input that ends the loop; it is neither executed nor recorded
pub const SENTINEL: &str = "bye";

const TRANSCRIPT_TERMINATOR: &[u8] = b"\r\n";

/// Why a statement failed, as far as the loop is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Script,
    NullReference,
    Host,
}

pub type ExecutionResult = Result<(), ErrorKind>;

/// Runs one statement in a persistent session.
///
/// Implementations report their own failures to `out` and hand back a
/// placeholder value so the loop can carry on.
pub trait StatementExecutor {
    type Value;

    fn execute_statement(&mut self, line: &str, out: &mut dyn Write) -> (Self::Value, ExecutionResult);
}

/// Where REPL lines come from
pub trait LineSource {
    /// Show `prompt` and block for one line; None once input is exhausted
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>>;
}

/// Prompt on a writer, read from any buffered reader
pub struct PlainLines<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> PlainLines<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    #[cfg(test)]
    fn into_output(self) -> W {
        self.output
    }
}

impl<R: BufRead, W: Write> LineSource for PlainLines<R, W> {
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        write!(self.output, "{prompt}")?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let len = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(len);
        Ok(Some(line))
    }
}

/// Prompt that renders the current `$PROMPT` text verbatim
struct LychenPrompt<'a> {
    text: &'a str,
}

impl Prompt for LychenPrompt<'_> {
    fn render_prompt_left(&self) -> Cow<'_, str> {
        // Use ANSI reset code to ensure white/default terminal color
        Cow::Owned(format!("\x1b[0m{}", self.text))
    }

    fn render_prompt_right(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, _mode: PromptEditMode) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_history_search_indicator(
        &self,
        history_search: PromptHistorySearch,
    ) -> Cow<'_, str> {
        let prefix = match history_search.status {
            PromptHistorySearchStatus::Passing => "",
            PromptHistorySearchStatus::Failing => "failing ",
        };
        Cow::Owned(format!("({}reverse search) ", prefix))
    }
}

/// Line editor for interactive terminals
pub struct EditorLines {
    editor: Reedline,
}

impl EditorLines {
    pub fn new() -> Self {
        Self {
            editor: Reedline::create(),
        }
    }
}

impl LineSource for EditorLines {
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        let prompt = LychenPrompt { text: prompt };
        loop {
            match self.editor.read_line(&prompt)? {
                Signal::Success(line) => return Ok(Some(line)),
                Signal::CtrlC => {
                    // Ctrl+C - discard the line and prompt again
                    println!("^C");
                }
                Signal::CtrlD => return Ok(None),
            }
        }
    }
}

/// Editor when stdin is a terminal, plain reads otherwise (pipes, files)
pub fn stdin_source() -> Box<dyn LineSource> {
    if io::stdin().is_tty() {
        Box::new(EditorLines::new())
    } else {
        Box::new(PlainLines::new(io::stdin().lock(), io::stdout()))
    }
}

/// Append-only log of accepted REPL lines
pub struct Transcript {
    path: PathBuf,
}

impl Transcript {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opened, appended and closed per line
    pub fn append(&self, line: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(TRANSCRIPT_TERMINATOR)
    }
}

/// The interactive loop
pub struct Repl {
    settings: SharedSettings,
    transcript: Option<Transcript>,
}

impl Repl {
    pub fn new(settings: SharedSettings, transcript: Option<PathBuf>) -> Self {
        Self {
            settings,
            transcript: transcript.map(Transcript::new),
        }
    }

    /// Prompt, read, record, execute; until the sentinel or end of input.
    ///
    /// Statement values are discarded. Failures never end the loop.
    pub fn run<E: StatementExecutor>(
        &self,
        input: &mut dyn LineSource,
        executor: &mut E,
        out: &mut dyn Write,
    ) -> io::Result<()> {
        loop {
            // Re-read every time: scripts may change the prompt
            let prompt = self.settings.read().prompt();
            let Some(line) = input.read_line(&prompt)? else {
                debug!("end of input");
                break;
            };
            if line == SENTINEL {
                break;
            }

            // Recorded before execution so a crash still leaves the line behind
            if let Some(transcript) = &self.transcript
                && let Err(err) = transcript.append(&line)
            {
                warn!(path = %transcript.path().display(), error = %err, "transcript append failed");
            }

            let (_value, result) = executor.execute_statement(&line, out);
            if let Err(kind) = result {
                debug!(?kind, "statement failed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{PROMPT, SettingValue, Settings};
    use std::fs;
    use std::io::Cursor;

    /// Records every statement; lines starting with "fail" fail
    #[derive(Default)]
    struct Recorder {
        lines: Vec<String>,
    }

    impl StatementExecutor for Recorder {
        type Value = String;

        fn execute_statement(&mut self, line: &str, out: &mut dyn Write) -> (String, ExecutionResult) {
            self.lines.push(line.to_string());
            if line.starts_with("fail") {
                writeln!(out, "failed: {line}").unwrap();
                (String::new(), Err(ErrorKind::Script))
            } else {
                (line.to_uppercase(), Ok(()))
            }
        }
    }

    fn run_lines(repl: &Repl, input: &str) -> (Recorder, String, String) {
        let mut source = PlainLines::new(Cursor::new(input.to_string()), Vec::new());
        let mut recorder = Recorder::default();
        let mut out = Vec::new();
        repl.run(&mut source, &mut recorder, &mut out).unwrap();
        let prompts = String::from_utf8(source.into_output()).unwrap();
        (recorder, prompts, String::from_utf8(out).unwrap())
    }

    fn settings() -> SharedSettings {
        Settings::parse(["/REPL"]).into_shared()
    }

    #[test]
    fn sentinel_stops_without_executing() {
        let repl = Repl::new(settings(), None);
        let (recorder, prompts, _) = run_lines(&repl, "a = 1\nbye\nb = 2\n");
        assert_eq!(recorder.lines, vec!["a = 1"]);
        assert_eq!(prompts, "Lychen>Lychen>");
    }

    #[test]
    fn end_of_input_stops_the_loop() {
        let repl = Repl::new(settings(), None);
        let (recorder, _, _) = run_lines(&repl, "one\r\ntwo");
        assert_eq!(recorder.lines, vec!["one", "two"]);
    }

    #[test]
    fn failures_do_not_end_the_loop() {
        let repl = Repl::new(settings(), None);
        let (recorder, prompts, out) = run_lines(&repl, "fail now\nafter\nbye\n");
        assert_eq!(recorder.lines, vec!["fail now", "after"]);
        assert_eq!(prompts.matches("Lychen>").count(), 3);
        assert_eq!(out, "failed: fail now\n");
    }

    #[test]
    fn transcript_records_lines_with_crlf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.log");
        fs::write(&path, "earlier\r\n").unwrap();

        let repl = Repl::new(settings(), Some(path.clone()));
        run_lines(&repl, "x = 1\nfail here\nbye\n");
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "earlier\r\nx = 1\r\nfail here\r\n"
        );
    }

    #[test]
    fn sentinel_alone_leaves_transcript_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.log");
        fs::write(&path, "kept\r\n").unwrap();

        let repl = Repl::new(settings(), Some(path.clone()));
        let (recorder, _, _) = run_lines(&repl, "bye\n");
        assert!(recorder.lines.is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), "kept\r\n");

        let fresh = dir.path().join("never.log");
        let repl = Repl::new(settings(), Some(fresh.clone()));
        run_lines(&repl, "bye\n");
        assert!(!fresh.exists());
    }

    #[test]
    fn prompt_follows_settings() {
        let shared = settings();
        shared
            .write()
            .set(PROMPT, SettingValue::Text("py> ".to_string()));
        let repl = Repl::new(shared, None);
        let (_, prompts, _) = run_lines(&repl, "bye\n");
        assert_eq!(prompts, "py> ");
    }
}
