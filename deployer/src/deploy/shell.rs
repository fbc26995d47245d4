//! Shell flavours and build command classification

use std::path::Path;

/// Verbs whose executables are batch/script launchers and need an interpreter
const LAUNCHER_VERBS: &[&str] = &["npm", "npx", "yarn", "pnpm", "ng", "node-gyp"];

/// Interpreter that hosts a terminal group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellKind {
    /// `cmd.exe`
    Cmd,
    /// `bash` or `sh`
    Posix,
}

impl ShellKind {
    /// Shell used on the current platform
    pub fn native() -> Self {
        if cfg!(windows) {
            ShellKind::Cmd
        } else {
            ShellKind::Posix
        }
    }

    pub fn program(&self) -> &'static str {
        match self {
            ShellKind::Cmd => "cmd.exe",
            ShellKind::Posix => {
                if Path::new("/bin/bash").exists() {
                    "/bin/bash"
                } else {
                    "/bin/sh"
                }
            }
        }
    }

    /// Arguments that start a quiet session reading commands from stdin
    pub fn session_args(&self) -> &'static [&'static str] {
        match self {
            ShellKind::Cmd => &["/Q"],
            ShellKind::Posix => &[],
        }
    }

    pub fn line_ending(&self) -> &'static str {
        match self {
            ShellKind::Cmd => "\r\n",
            ShellKind::Posix => "\n",
        }
    }

    /// Line that writes the previous command's exit code into `marker`
    pub fn exit_code_line(&self, marker: &Path) -> String {
        let marker = marker.display();
        match self {
            // Parentheses keep a single-digit code from becoming a `N>` redirect
            ShellKind::Cmd => format!("(echo %errorlevel%)>\"{}\"", marker),
            ShellKind::Posix => format!("echo $? > '{}'", escape_single_quotes(&marker.to_string())),
        }
    }

    /// Wrap a command so it cannot read the session's own stdin
    ///
    /// Without this a command that reads input would consume the exit-code
    /// line queued behind it. The braces keep `cd` and `export` in the session.
    ///
    /// cmd.exe gets a leading `<NUL` (leading so `set` values keep no trailing
    /// blank). It is not applied to chained lines, where it would bind to the
    /// first command only, nor to `if`/`for`/`(` blocks. A command in those
    /// forms that prompts for input still reads the exit-code line and runs
    /// into its timeout.
    pub fn detach_stdin(&self, line: &str) -> String {
        match self {
            ShellKind::Cmd if cmd_accepts_redirect_prefix(line) => format!("<NUL {}", line),
            ShellKind::Cmd => line.to_string(),
            ShellKind::Posix => format!("{{ {}\n}} < /dev/null", line),
        }
    }

    /// Line that appends toolchain directories to PATH for the session
    pub fn path_line(&self, extra_paths: &[String]) -> Option<String> {
        if extra_paths.is_empty() {
            return None;
        }

        Some(match self {
            ShellKind::Cmd => format!("set \"PATH=%PATH%;{}\"", extra_paths.join(";")),
            ShellKind::Posix => format!(
                "export PATH=\"$PATH:{}\"",
                extra_paths
                    .iter()
                    .map(|p| p.replace('"', "\\\""))
                    .collect::<Vec<_>>()
                    .join(":")
            ),
        })
    }
}

fn cmd_accepts_redirect_prefix(line: &str) -> bool {
    let line = line.trim_start();
    if line.is_empty() || line.starts_with('(') || line.contains('&') || line.contains('|') {
        return false;
    }

    let first = line.split_whitespace().next().unwrap_or_default();
    !first.eq_ignore_ascii_case("if") && !first.eq_ignore_ascii_case("for")
}

fn escape_single_quotes(value: &str) -> String {
    value.replace('\'', "'\\''")
}

/// How a build command is handed to the terminal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// Plain executable; `args` is the untouched remainder of the line
    Direct { program: String, args: String },

    /// Needs the interpreter: chaining, pipes, or a launcher verb
    Interpreter { text: String },
}

impl Invocation {
    /// Classify a build command
    pub fn classify(text: &str) -> Self {
        let text = text.trim();

        let chained = text.contains("&&") || text.contains('&') || text.contains('|');
        let first = text.split_whitespace().next().unwrap_or_default();

        if chained || is_launcher(first) {
            return Invocation::Interpreter {
                text: text.to_string(),
            };
        }

        let args = text[first.len()..].trim_start();
        Invocation::Direct {
            program: first.to_string(),
            args: args.to_string(),
        }
    }

    /// Render the line written to a session's stdin
    pub fn render(&self, shell: ShellKind) -> String {
        match (self, shell) {
            (Invocation::Direct { program, args }, _) if args.is_empty() => program.clone(),
            (Invocation::Direct { program, args }, _) => format!("{} {}", program, args),
            // A bare `npm` inside a cmd session would not return control after
            // the launcher script ends
            (Invocation::Interpreter { text }, ShellKind::Cmd) => {
                let first = text.split_whitespace().next().unwrap_or_default();
                if is_launcher(first) {
                    format!("call {}", text)
                } else {
                    text.clone()
                }
            }
            (Invocation::Interpreter { text }, ShellKind::Posix) => text.clone(),
        }
    }
}

fn is_launcher(token: &str) -> bool {
    let token = token.to_lowercase();
    let stem = token
        .strip_suffix(".cmd")
        .or_else(|| token.strip_suffix(".bat"))
        .unwrap_or(&token);
    LAUNCHER_VERBS.contains(&stem)
}
