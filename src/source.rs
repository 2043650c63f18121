use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Default extension tried when a path without one does not exist.
pub const EXTENSION: &str = "luna";

/// A named source buffer with line lookup for diagnostics.
pub struct Source {
    pub name: String,
    pub text: String,
    line_starts: Vec<usize>,
}

impl Source {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let mut line_starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Source { name: name.into(), text, line_starts }
    }

    /// Read `path`, falling back to `path.luna` for extensionless paths that
    /// do not exist.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let path = resolve(path);
        let text = std::fs::read_to_string(&path)?;
        Ok(Source::new(path.display().to_string(), text))
    }

    pub fn from_reader(name: impl Into<String>, mut reader: impl Read) -> io::Result<Self> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Ok(Source::new(name, text))
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Returns the full text of the given 1-based line number.
    pub fn line_text(&self, line: usize) -> &str {
        if line == 0 || line > self.line_starts.len() {
            return "";
        }
        let start = self.line_starts[line - 1];
        let end = match self.line_starts.get(line) {
            Some(next) => *next,
            None => self.text.len(),
        };
        self.text[start..end].trim_end_matches('\n').trim_end_matches('\r')
    }
}

fn resolve(path: &Path) -> PathBuf {
    if !path.exists() && path.extension().is_none() {
        let fallback = path.with_extension(EXTENSION);
        if fallback.exists() {
            log::debug!("{} not found, using {}", path.display(), fallback.display());
            return fallback;
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn line_text_multi() {
        let src = Source::new("t", "first\nsecond\r\nthird");
        assert_eq!(src.line_text(1), "first");
        assert_eq!(src.line_text(2), "second");
        assert_eq!(src.line_text(3), "third");
        assert_eq!(src.line_count(), 3);
    }

    #[test]
    fn line_text_out_of_bounds() {
        let src = Source::new("t", "hello");
        assert_eq!(src.line_text(0), "");
        assert_eq!(src.line_text(99), "");
    }

    #[test]
    fn trailing_newline() {
        let src = Source::new("t", "hello\n");
        assert_eq!(src.line_text(1), "hello");
        assert_eq!(src.line_text(2), "");
    }

    #[test]
    fn empty_source() {
        let src = Source::new("t", "");
        assert_eq!(src.line_text(1), "");
        assert_eq!(src.line_count(), 1);
    }

    #[test]
    fn from_reader() {
        let src = Source::from_reader("stdin", "1 + 2\n".as_bytes()).unwrap();
        assert_eq!(src.name, "stdin");
        assert_eq!(src.text, "1 + 2\n");
    }

    #[test]
    fn extension_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("prog.luna")).unwrap();
        write!(file, "40 + 2").unwrap();

        let src = Source::from_path(&dir.path().join("prog")).unwrap();
        assert_eq!(src.text, "40 + 2");
        assert!(src.name.ends_with("prog.luna"));

        assert!(Source::from_path(&dir.path().join("missing")).is_err());
    }
}
