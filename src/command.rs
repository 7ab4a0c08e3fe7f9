//! Shell command lines.
//!
//! A command reaches the executor either as a literal line, which is handed
//! to the shell untouched, or as a list of tokens which is joined into one
//! line so that every token survives as a single shell word. Joining keeps
//! token boundaries for a literal re-invocation; it is not an isolation
//! mechanism against hostile input.
use std::fmt;

/// A single command line, ready to be interpreted by the system shell.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandLine(String);

impl CommandLine {
    /// Wraps a literal command line.
    pub fn new(line: impl Into<String>) -> Self {
        Self(line.into())
    }

    /// Joins tokens using the quoting rules of the current platform's shell.
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        #[cfg(windows)]
        let line = join_windows(args);
        #[cfg(not(windows))]
        let line = join_posix(args);

        Self(line)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CommandLine {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CommandLine {
    fn from(line: &str) -> Self {
        Self::new(line)
    }
}

impl From<String> for CommandLine {
    fn from(line: String) -> Self {
        Self::new(line)
    }
}

impl From<&CommandLine> for CommandLine {
    fn from(line: &CommandLine) -> Self {
        line.clone()
    }
}

impl<S: AsRef<str>> From<Vec<S>> for CommandLine {
    fn from(args: Vec<S>) -> Self {
        Self::from_args(args)
    }
}

impl<S: AsRef<str>> From<&[S]> for CommandLine {
    fn from(args: &[S]) -> Self {
        Self::from_args(args)
    }
}

impl<S: AsRef<str>, const N: usize> From<[S; N]> for CommandLine {
    fn from(args: [S; N]) -> Self {
        Self::from_args(args)
    }
}

/// Joins tokens for `sh -c`.
pub fn join_posix<I, S>(args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut line = String::new();

    for arg in args {
        if !line.is_empty() {
            line.push(' ');
        }
        quote_posix(arg.as_ref(), &mut line);
    }

    line
}

fn quote_posix(arg: &str, out: &mut String) {
    const SAFE: &[char] = &['@', '%', '+', '=', ':', ',', '.', '/', '-', '_'];

    let is_safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || SAFE.contains(&c));

    if is_safe {
        out.push_str(arg);
        return;
    }

    out.push('\'');
    for c in arg.chars() {
        if c == '\'' {
            // close, emit an escaped quote, reopen
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
}

/// Joins tokens following the MS C runtime argument parsing rules used by
/// `cmd /C`.
///
/// 1. Tokens containing whitespace, and empty tokens, are wrapped in double
///    quotes.
/// 2. A double quote is escaped with a backslash, and every backslash
///    directly preceding it is doubled.
/// 3. Backslashes at the end of a quoted token are doubled so the closing
///    quote stays a delimiter.
/// 4. Any other backslash is literal.
pub fn join_windows<I, S>(args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut line = String::new();
    let mut first = true;

    for arg in args {
        let arg = arg.as_ref();
        if !first {
            line.push(' ');
        }
        first = false;

        let quote = arg.is_empty() || arg.contains([' ', '\t']);
        if quote {
            line.push('"');
        }

        let mut backslashes = 0usize;
        for c in arg.chars() {
            match c {
                '\\' => backslashes += 1,
                '"' => {
                    line.extend(std::iter::repeat_n('\\', backslashes * 2));
                    backslashes = 0;
                    line.push_str("\\\"");
                }
                _ => {
                    line.extend(std::iter::repeat_n('\\', backslashes));
                    backslashes = 0;
                    line.push(c);
                }
            }
        }

        if quote {
            line.extend(std::iter::repeat_n('\\', backslashes * 2));
            line.push('"');
        } else {
            line.extend(std::iter::repeat_n('\\', backslashes));
        }
    }

    line
}
