use crate::error::ModelError;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Human-readable class names, one per line, indexed from zero.
#[derive(Debug, Clone, Default)]
pub struct ClassLabels {
    names: Vec<String>,
}

impl ClassLabels {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let to_err = |source| ModelError::Labels {
            path: path.to_path_buf(),
            source,
        };
        let reader = BufReader::new(File::open(path).map_err(to_err)?);
        let names = reader
            .lines()
            .map(|line| line.map(|name| name.trim().to_string()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(to_err)?;
        Ok(Self { names })
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn get(&self, class_index: usize) -> Option<&str> {
        self.names
            .get(class_index)
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
