//! Source file loading and error excerpts.
//!
//! Files are loaded once per absolute path and memoized for the process
//! lifetime; the loaded buffer is immutable and carries a precomputed
//! line index so byte offsets convert to 1-based line/column pairs in
//! O(log n). `spoof_file` makes an in-memory file for parsing strings
//! (spoofed names start with `<`, e.g. `<string>`).

use std::fmt::Write as _;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::hashing::Table;

#[derive(Debug)]
pub struct SourceFile {
    /// Absolute path (or a `<spoofed>` name).
    pub filename: PathBuf,
    /// The path as given on the command line, for error messages.
    pub relative_filename: String,
    /// The whole file, immutable for the process lifetime.
    pub text: String,
    /// Byte offset of the start of each line.
    line_offsets: Vec<usize>,
}

fn file_cache() -> &'static Mutex<Table<PathBuf, Arc<SourceFile>>> {
    static CACHE: OnceLock<Mutex<Table<PathBuf, Arc<SourceFile>>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(Table::new()))
}

impl SourceFile {
    fn build(filename: PathBuf, relative_filename: String, text: String) -> SourceFile {
        let mut line_offsets = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_offsets.push(i + 1);
            }
        }
        SourceFile {
            filename,
            relative_filename,
            text,
            line_offsets,
        }
    }

    /// Load a file, memoized by absolute path.
    pub fn load(path: &Path) -> std::io::Result<Arc<SourceFile>> {
        let absolute = path.canonicalize()?;
        let mut cache = file_cache().lock().expect("file cache lock poisoned");
        if let Some(file) = cache.get(&absolute) {
            return Ok(Arc::clone(file));
        }
        let text = std::fs::read_to_string(&absolute)?;
        let file = Arc::new(SourceFile::build(
            absolute.clone(),
            path.display().to_string(),
            text,
        ));
        cache.set(absolute, Arc::clone(&file));
        Ok(file)
    }

    /// Make an in-memory file. Spoofed files are not cached.
    pub fn spoof(name: &str, text: &str) -> Arc<SourceFile> {
        Arc::new(SourceFile::build(
            PathBuf::from(name),
            name.to_string(),
            text.to_string(),
        ))
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn line_count(&self) -> usize {
        self.line_offsets.len()
    }

    /// 1-based line number containing the byte offset.
    pub fn line_number(&self, offset: usize) -> usize {
        match self.line_offsets.binary_search(&offset.min(self.text.len())) {
            Ok(i) => i + 1,
            Err(i) => i,
        }
    }

    /// 1-based column (in bytes) of the offset within its line.
    pub fn line_column(&self, offset: usize) -> usize {
        let line = self.line_number(offset);
        offset.min(self.text.len()) - self.line_offsets[line - 1] + 1
    }

    /// The text of the 1-based line `n`, without its newline.
    pub fn line(&self, n: usize) -> Option<&str> {
        let start = *self.line_offsets.get(n.checked_sub(1)?)?;
        let end = self
            .line_offsets
            .get(n)
            .map(|next| next - 1)
            .unwrap_or(self.text.len());
        let line = &self.text[start..end];
        Some(line.strip_suffix('\r').unwrap_or(line))
    }

    /// Byte offset of the start of the 1-based line `n`.
    pub fn line_offset(&self, n: usize) -> Option<usize> {
        self.line_offsets.get(n.checked_sub(1)?).copied()
    }
}

/// Whether output should use ANSI colors: `COLOR=1` forces on,
/// a nonempty `NO_COLOR` forces off, otherwise follow the terminal.
pub fn use_color() -> bool {
    if std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty()) {
        return false;
    }
    match std::env::var("COLOR") {
        Ok(v) => v == "1",
        Err(_) => atty::is(atty::Stream::Stderr),
    }
}

/// Print a source excerpt with `start..end` highlighted, with
/// `context_lines` of context on both sides. This is the single error
/// renderer shared by the parser and the build orchestrator.
pub fn highlight_error(
    out: &mut dyn WriteColor,
    file: &SourceFile,
    start: usize,
    end: usize,
    context_lines: usize,
    color: bool,
) -> std::io::Result<()> {
    let end = end.clamp(start, file.text.len());
    let first_line = file.line_number(start).saturating_sub(context_lines).max(1);
    let last_line = (file.line_number(end) + context_lines).min(file.line_count());

    let max_width = terminal_size::terminal_size()
        .map(|(terminal_size::Width(w), _)| w as usize)
        .unwrap_or(80);
    let gutter_width = last_line.to_string().len();

    let mut highlight = ColorSpec::new();
    highlight.set_fg(Some(Color::Red)).set_bold(true).set_reverse(true);
    let mut dim = ColorSpec::new();
    dim.set_dimmed(true);

    for line_number in first_line..=last_line {
        let line = file.line(line_number).unwrap_or("");
        let line_start = file.line_offset(line_number).unwrap_or(0);

        if color {
            out.set_color(&dim)?;
        }
        write!(out, "{line_number:>gutter_width$}| ")?;
        if color {
            out.reset()?;
        }

        let mut budget = max_width.saturating_sub(gutter_width + 2).max(16);
        let mut emit = |out: &mut dyn WriteColor, piece: &str| -> std::io::Result<()> {
            let mut written = String::new();
            for ch in piece.chars() {
                if budget == 0 {
                    break;
                }
                written.push(ch);
                budget -= 1;
            }
            write!(out, "{written}")
        };

        // Split the line into before/highlighted/after pieces:
        let line_end = line_start + line.len();
        let hl_start = start.clamp(line_start, line_end) - line_start;
        let hl_end = end.clamp(line_start, line_end) - line_start;
        if start > line_end || end <= line_start {
            emit(out, line)?;
        } else {
            emit(out, &line[..hl_start])?;
            if color {
                out.set_color(&highlight)?;
            }
            emit(out, &line[hl_start..hl_end])?;
            if color {
                out.reset()?;
            }
            emit(out, &line[hl_end..])?;
        }
        writeln!(out)?;

        // Underline the range on single-line errors:
        if !color && line_number == file.line_number(start) && file.line_number(end) == line_number {
            let mut underline = String::new();
            let _ = write!(underline, "{:>gutter_width$}| ", "");
            underline.extend(std::iter::repeat(' ').take(hl_start));
            underline.extend(std::iter::repeat('^').take((hl_end - hl_start).max(1)));
            writeln!(out, "{underline}")?;
        }
    }
    Ok(())
}

/// Convenience wrapper that prints the excerpt to stderr.
pub fn highlight_error_stderr(file: &SourceFile, start: usize, end: usize, context_lines: usize) {
    let color = use_color();
    let choice = if color { ColorChoice::Always } else { ColorChoice::Never };
    let mut stderr = StandardStream::stderr(choice);
    let _ = highlight_error(&mut stderr, file, start, end, context_lines, color);
}

#[cfg(test)]
mod tests {
    use super::*;
    use termcolor::NoColor;

    #[test]
    fn line_numbers_and_columns() {
        let f = SourceFile::spoof("<test>", "one\ntwo\nthree\n");
        assert_eq!(f.line_number(0), 1);
        assert_eq!(f.line_number(3), 1);
        assert_eq!(f.line_number(4), 2);
        assert_eq!(f.line_number(8), 3);
        assert_eq!(f.line_column(4), 1);
        assert_eq!(f.line_column(6), 3);
        assert_eq!(f.line(1), Some("one"));
        assert_eq!(f.line(3), Some("three"));
        assert_eq!(f.line(5), None);
    }

    #[test]
    fn unterminated_last_line() {
        let f = SourceFile::spoof("<test>", "alpha\nbeta");
        assert_eq!(f.line(2), Some("beta"));
        assert_eq!(f.line_number(9), 2);
    }

    #[test]
    fn crlf_lines() {
        let f = SourceFile::spoof("<test>", "a\r\nb\r\n");
        assert_eq!(f.line(1), Some("a"));
        assert_eq!(f.line(2), Some("b"));
    }

    #[test]
    fn excerpt_underlines_the_range() {
        let f = SourceFile::spoof("<test>", "let x = oops\nnext line\n");
        let mut buf = NoColor::new(Vec::new());
        highlight_error(&mut buf, &f, 8, 12, 1, false).unwrap();
        let text = String::from_utf8(buf.into_inner()).unwrap();
        assert!(text.contains("let x = oops"));
        assert!(text.contains("^^^^"));
        assert!(text.contains("next line"));
    }

    #[test]
    fn load_is_memoized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memoized.tm");
        std::fs::write(&path, "x := 1\n").unwrap();
        let a = SourceFile::load(&path).unwrap();
        let b = SourceFile::load(&path).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
