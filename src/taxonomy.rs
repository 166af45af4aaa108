//! Class taxonomy — the process-global, immutable class-index lookup table.
//!
//! Treated as an external collaborator: loaded once at startup from a CSV
//! file and never mutated.
//! Index `i` in a score vector corresponds to class `i` in this sequence.

use std::path::Path;

use crate::error::{Error, Result};

/// Number of classes the acoustic model produces scores for.
pub const SCORE_VECTOR_LEN: usize = 521;

/// One `"group.class"` entry, pre-split on the first `.` for cheap lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDescriptor {
    pub full_name: String,
    pub group: String,
}

impl ClassDescriptor {
    fn parse(full_name: String) -> Self {
        let group = full_name
            .split_once('.')
            .map(|(g, _)| g.to_owned())
            .unwrap_or_else(|| full_name.clone());
        Self { full_name, group }
    }
}

/// Ordered, immutable class taxonomy.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    classes: Vec<ClassDescriptor>,
}

impl Taxonomy {
    /// Build a taxonomy directly from an ordered list of `"group.class"` names.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            classes: names
                .into_iter()
                .map(|n| ClassDescriptor::parse(n.into()))
                .collect(),
        }
    }

    /// Load a taxonomy from a two-column CSV file: `index,class_name`.
    ///
    /// Rows are sorted by `index` before being stored so lookups by class
    /// index are a plain slice index regardless of file ordering.
    pub fn load_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)?;

        let mut rows: Vec<(usize, String)> = Vec::new();
        for record in reader.records() {
            let record = record?;
            let index: usize = record
                .get(0)
                .ok_or_else(|| Error::ConfigInvalid("taxonomy row missing index column".into()))?
                .parse()
                .map_err(|_| Error::ConfigInvalid("taxonomy index column not an integer".into()))?;
            let class_name = record
                .get(1)
                .ok_or_else(|| Error::ConfigInvalid("taxonomy row missing class_name column".into()))?
                .to_owned();
            rows.push((index, class_name));
        }

        rows.sort_by_key(|(index, _)| *index);
        for (expected, (index, _)) in rows.iter().enumerate() {
            if *index != expected {
                return Err(Error::ConfigInvalid(format!(
                    "taxonomy indices must be contiguous from 0; found gap at {expected}"
                )));
            }
        }

        Ok(Self::from_names(rows.into_iter().map(|(_, name)| name)))
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Look up the descriptor for class index `i`.
    pub fn get(&self, index: usize) -> Option<&ClassDescriptor> {
        self.classes.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassDescriptor> {
        self.classes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn group_is_prefix_up_to_first_dot() {
        let tax = Taxonomy::from_names(["dog.bark", "vehicle.car_horn.long", "silence"]);
        assert_eq!(tax.get(0).unwrap().group, "dog");
        assert_eq!(tax.get(1).unwrap().group, "vehicle");
        assert_eq!(tax.get(2).unwrap().group, "silence");
    }

    #[test]
    fn load_csv_sorts_by_index_and_validates_contiguity() -> anyhow::Result<()> {
        let mut f = tempfile::NamedTempFile::new()?;
        writeln!(f, "index,class_name")?;
        writeln!(f, "1,music.guitar")?;
        writeln!(f, "0,dog.bark")?;
        f.flush()?;

        let tax = Taxonomy::load_csv(f.path())?;
        assert_eq!(tax.len(), 2);
        assert_eq!(tax.get(0).unwrap().full_name, "dog.bark");
        assert_eq!(tax.get(1).unwrap().full_name, "music.guitar");
        Ok(())
    }

    #[test]
    fn load_csv_rejects_index_gap() -> anyhow::Result<()> {
        let mut f = tempfile::NamedTempFile::new()?;
        writeln!(f, "index,class_name")?;
        writeln!(f, "0,dog.bark")?;
        writeln!(f, "2,music.guitar")?;
        f.flush()?;

        let err = Taxonomy::load_csv(f.path()).unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid(_)));
        Ok(())
    }
}
