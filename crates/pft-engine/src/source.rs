//! Reading source units from storage

use crate::classfile::{internal_name, ClassFile};
use crate::error::EngineError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Storage holding compiled units by name
pub trait UnitSource {
    /// Bytes of the unit with the given binary or internal name
    fn read_unit(&self, name: &str) -> Result<Vec<u8>, EngineError>;

    /// Read and parse a unit
    fn load_unit(&self, name: &str) -> Result<ClassFile, EngineError> {
        Ok(ClassFile::decode(&self.read_unit(name)?)?)
    }
}

impl<T: UnitSource + ?Sized> UnitSource for &T {
    fn read_unit(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        (**self).read_unit(name)
    }
}

/// Directories searched in order for `<internal name>.class`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassPath {
    roots: Vec<PathBuf>,
}

impl ClassPath {
    /// Empty class path
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a root directory
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.push(root);
        self
    }

    /// Append a root directory
    pub fn push(&mut self, root: impl Into<PathBuf>) {
        self.roots.push(root.into());
    }

    /// Root directories in search order
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    fn relative_path(name: &str) -> PathBuf {
        let internal = internal_name(name.strip_suffix(".class").unwrap_or(name));
        let mut path: PathBuf = internal.split('/').collect();
        path.set_extension("class");
        path
    }

    /// First existing file for the unit, if any
    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        let relative = Self::relative_path(name);
        self.roots
            .iter()
            .map(|root| root.join(&relative))
            .find(|path| path.is_file())
    }

    /// Write `bytes` as the unit `name` below `root`, creating directories
    pub fn store(root: &Path, name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = root.join(Self::relative_path(name));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        Ok(path)
    }
}

impl UnitSource for ClassPath {
    fn read_unit(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        let relative = Self::relative_path(name);
        for root in &self.roots {
            match fs::read(root.join(&relative)) {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(source) => {
                    return Err(EngineError::SourceIo {
                        name: internal_name(name),
                        source,
                    })
                }
            }
        }
        Err(EngineError::SourceNotFound(internal_name(name)))
    }
}
