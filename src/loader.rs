use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use crate::env::TargetEnv;
use crate::error::Error;
use crate::find::find_dotenv;
use crate::model::{Encoding, EnvMap, LoadReport};
use crate::parser::{Binding, parse_str, warn_for_invalid_lines};
use crate::store::{StoreBuilder, build};
use crate::variables::ProcessEnv;

const DEFAULT_FILE: &str = ".env";

/// Load the nearest `.env` (searching parent directories) into the process
/// environment without overriding existing variables.
///
/// # Safety
///
/// Mutates the process environment; see [`TargetEnv::process`].
pub unsafe fn dotenv() -> Result<LoadReport, Error> {
    // SAFETY: forwarded to the caller.
    let target = unsafe { TargetEnv::process() };
    let mut loader = EnvLoader::new()
        .path(DEFAULT_FILE)
        .search_upward(true)
        .target(target);
    loader.load()
}

/// Load one dotenv file into the process environment.
///
/// Returns `true` when the file defined at least one variable. A missing
/// file is not an error and yields `false`.
///
/// # Safety
///
/// Mutates the process environment; see [`TargetEnv::process`].
pub unsafe fn load_dotenv(path: impl AsRef<Path>, override_existing: bool) -> Result<bool, Error> {
    // SAFETY: forwarded to the caller.
    let target = unsafe { TargetEnv::process() };
    let mut loader = EnvLoader::new()
        .path(path)
        .override_existing(override_existing)
        .target(target);
    Ok(loader.load()?.defined_any())
}

/// Like [`load_dotenv`], reading the dotenv text from a stream.
///
/// # Safety
///
/// Mutates the process environment; see [`TargetEnv::process`].
pub unsafe fn load_dotenv_from_reader<R: Read>(
    mut reader: R,
    override_existing: bool,
    encoding: Encoding,
) -> Result<bool, Error> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    let text = encoding.decode(&buf)?.into_owned();
    // SAFETY: forwarded to the caller.
    let target = unsafe { TargetEnv::process() };
    let mut loader = EnvLoader::new()
        .source_text(text)
        .override_existing(override_existing)
        .target(target);
    Ok(loader.load()?.defined_any())
}

/// Parse a dotenv file into an ordered map without touching the process
/// environment. File values shadow the process environment during
/// interpolation. A missing file yields an empty map.
pub fn dotenv_values(
    path: impl AsRef<Path>,
    interpolate: bool,
    encoding: Encoding,
) -> Result<EnvMap, Error> {
    let Some(text) = read_optional(path.as_ref(), encoding)? else {
        return Ok(EnvMap::new());
    };
    values_from_text(&text, interpolate)
}

/// Like [`dotenv_values`], reading the dotenv text from a stream.
pub fn dotenv_values_from_reader<R: Read>(
    mut reader: R,
    interpolate: bool,
    encoding: Encoding,
) -> Result<EnvMap, Error> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    let text = encoding.decode(&buf)?;
    values_from_text(&text, interpolate)
}

fn values_from_text(text: &str, interpolate: bool) -> Result<EnvMap, Error> {
    let bindings = warn_for_invalid_lines(parse_str(text));
    Ok(build(bindings, ProcessEnv, interpolate, true)?)
}

/// Look up one key in a dotenv file.
///
/// Fails with [`Error::FileNotFound`] when the file does not exist. Returns
/// `Ok(None)` when the key is absent or declared without a value.
pub fn get_key(
    path: impl AsRef<Path>,
    key: &str,
    encoding: Encoding,
) -> Result<Option<String>, Error> {
    let path = path.as_ref();
    let text = read_file(path, encoding)?;
    let bindings: Vec<Binding> = warn_for_invalid_lines(parse_str(&text)).collect();
    let declared = bindings
        .iter()
        .any(|binding| binding.key.as_deref() == Some(key));

    let values = build(bindings, ProcessEnv, true, true)?;
    let value = values.get(key).map(str::to_owned);
    if value.is_none() && !declared {
        tracing::warn!(key, path = %path.display(), "key {key} not found in {}", path.display());
    }
    Ok(value)
}

/// Read a whole dotenv file, mapping a missing file to
/// [`Error::FileNotFound`].
pub(crate) fn read_file(path: &Path, encoding: Encoding) -> Result<String, Error> {
    read_optional(path, encoding)?.ok_or_else(|| Error::file_not_found(path))
}

fn read_optional(path: &Path, encoding: Encoding) -> Result<Option<String>, Error> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(Error::Io(err)),
    };
    Ok(Some(encoding.decode(&bytes)?.into_owned()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    Path(PathBuf),
    Text(String),
}

/// Builder-style dotenv loader.
///
/// Sources are read in order; a later source wins on value while the first
/// appearance of a key fixes its position. The target doubles as the
/// ambient environment for interpolation.
#[derive(Debug, Clone)]
pub struct EnvLoader {
    sources: Vec<Source>,
    encoding: Encoding,
    override_existing: bool,
    interpolate: bool,
    required: bool,
    search_upward: bool,
    verbose: bool,
    target: TargetEnv,
}

impl EnvLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.sources.push(Source::Path(path.as_ref().to_path_buf()));
        self
    }

    pub fn paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.sources.extend(
            paths
                .into_iter()
                .map(|path| Source::Path(path.as_ref().to_path_buf())),
        );
        self
    }

    /// Add in-memory dotenv text as a source.
    pub fn source_text(mut self, text: impl Into<String>) -> Self {
        self.sources.push(Source::Text(text.into()));
        self
    }

    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn override_existing(mut self, override_existing: bool) -> Self {
        self.override_existing = override_existing;
        self
    }

    pub fn interpolate(mut self, interpolate: bool) -> Self {
        self.interpolate = interpolate;
        self
    }

    /// Fail with [`Error::FileNotFound`] instead of skipping missing files.
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Resolve relative paths by searching the current directory and its
    /// parents.
    pub fn search_upward(mut self, search_upward: bool) -> Self {
        self.search_upward = search_upward;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn target(mut self, target: TargetEnv) -> Self {
        self.target = target;
        self
    }

    pub fn target_env(&self) -> &TargetEnv {
        &self.target
    }

    pub fn into_target(self) -> TargetEnv {
        self.target
    }

    /// Resolve every source into an ordered map without applying it.
    pub fn parse_only(&self) -> Result<EnvMap, Error> {
        let (values, _) = self.collect_values()?;
        Ok(values)
    }

    pub fn load(&mut self) -> Result<LoadReport, Error> {
        let (values, files_read) = self.collect_values()?;
        let report = self.target.apply(values, self.override_existing);
        Ok(LoadReport {
            files_read,
            ..report
        })
    }

    fn collect_values(&self) -> Result<(EnvMap, usize), Error> {
        let mut builder = StoreBuilder::new(&self.target, self.interpolate, self.override_existing);
        let mut files_read = 0usize;

        for source in self.effective_sources() {
            let text = match source {
                Source::Text(text) => text,
                Source::Path(path) => {
                    let Some(text) = self.read_path(&path)? else {
                        continue;
                    };
                    files_read += 1;
                    text
                }
            };
            builder.extend(warn_for_invalid_lines(parse_str(&text)))?;
        }

        Ok((builder.finish(), files_read))
    }

    fn read_path(&self, path: &Path) -> Result<Option<String>, Error> {
        let resolved = if self.search_upward && path.is_relative() {
            find_dotenv(path, false)?
        } else {
            Some(path.to_path_buf())
        };

        let text = match resolved {
            Some(resolved) => read_optional(&resolved, self.encoding)?,
            None => None,
        };
        if text.is_none() {
            if self.required {
                return Err(Error::file_not_found(path));
            }
            if self.verbose {
                tracing::info!(path = %path.display(), "could not find dotenv file {}", path.display());
            }
        }
        Ok(text)
    }

    fn effective_sources(&self) -> Vec<Source> {
        if self.sources.is_empty() {
            vec![Source::Path(PathBuf::from(DEFAULT_FILE))]
        } else {
            self.sources.clone()
        }
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            encoding: Encoding::Utf8,
            override_existing: false,
            interpolate: true,
            required: false,
            search_upward: false,
            verbose: false,
            target: TargetEnv::snapshot_process(),
        }
    }
}
