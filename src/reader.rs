use std::{fs, io, path::Path, str::FromStr, str::SplitWhitespace};

use crate::driver::Error;

/// A cursor over the whitespace-delimited tokens of one input file.
///
/// Every token read is counted so that parse errors can point at the offending token.
#[derive(Debug)]
pub(crate) struct Tokens<'a> {
    file: String,
    inner: SplitWhitespace<'a>,
    index: usize,
}

impl<'a> Tokens<'a> {
    pub(crate) fn new(file: impl Into<String>, text: &'a str) -> Self {
        Self {
            file: file.into(),
            inner: text.split_whitespace(),
            index: 0,
        }
    }

    pub(crate) fn file(&self) -> &str {
        &self.file
    }

    /// Returns the next raw token, or `None` at the end of the input.
    pub(crate) fn try_next_str(&mut self) -> Option<&'a str> {
        let tok = self.inner.next()?;
        self.index += 1;
        Some(tok)
    }

    pub(crate) fn next_str(&mut self, expected: &'static str) -> Result<&'a str, Error> {
        self.try_next_str().ok_or_else(|| Error::Parse {
            file: self.file.clone(),
            token: self.index + 1,
            expected,
            found: None,
        })
    }

    pub(crate) fn next<T: FromStr>(&mut self, expected: &'static str) -> Result<T, Error> {
        let tok = self.next_str(expected)?;
        tok.parse().map_err(|_| Error::Parse {
            file: self.file.clone(),
            token: self.index,
            expected,
            found: Some(tok.to_owned()),
        })
    }
}

/// Reads a required input file; a missing file is reported as [`Error::Missing`].
pub(crate) fn read_required(path: &Path) -> Result<String, Error> {
    fs::read_to_string(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Error::Missing(path.to_path_buf()),
        _ => Error::Io(e),
    })
}

/// Reads an optional input file; `Ok(None)` means the file does not exist.
pub(crate) fn read_optional(path: &Path) -> Result<Option<String>, Error> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::Io(e)),
    }
}
