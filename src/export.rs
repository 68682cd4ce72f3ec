//! CSV export of summary tables.
//!
//! Columns are models in insertion order, rows are attributes. The simple
//! table holds one entry per model; the strategy table holds one entry per
//! (model, data strategy) pair and prints the strategy as an extra leading
//! column.

use std::fs;
use std::io;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::config::DataStrategy;
use crate::error::{EvalError, Result};
use crate::records::ModelName;
use crate::summary::{Attribute, ExportEntry};

/// Model → entry table, columns in insertion order.
#[derive(Debug, Clone)]
pub struct ExportTable<A> {
    entries: Vec<(ModelName, ExportEntry<A>)>,
}

impl<A: Attribute> ExportTable<A> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Adds a model column; a model added twice keeps its column and takes the new entry.
    pub fn add_entry(&mut self, model: ModelName, entry: ExportEntry<A>) {
        if let Some(slot) = self.entries.iter_mut().find(|(m, _)| *m == model) {
            slot.1 = entry;
        } else {
            self.entries.push((model, entry));
        }
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelName> {
        self.entries.iter().map(|(m, _)| m)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Header row followed by one row per attribute.
    pub fn rows(&self) -> Result<Vec<Vec<String>>> {
        let mut rows = Vec::with_capacity(A::ALL.len() + 1);

        let mut header = vec![String::new()];
        header.extend(self.models().map(ToString::to_string));
        rows.push(header);

        for &attribute in A::ALL {
            let mut row = vec![attribute.label().to_string()];
            for (_, entry) in &self.entries {
                row.push(entry.cell(attribute)?);
            }
            rows.push(row);
        }

        Ok(rows)
    }

    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<()> {
        write_rows(writer, &self.rows()?)
    }

    /// Writes the table to `path`, replacing any previous version atomically.
    pub fn export(&self, path: &Path) -> Result<()> {
        let rows = self.rows()?;
        write_atomic(path, |file| write_rows(file, &rows))
    }
}

impl<A: Attribute> Default for ExportTable<A> {
    fn default() -> Self {
        Self::new()
    }
}

/// Model → (strategy → entry) table.
#[derive(Debug, Clone)]
pub struct StrategyExportTable<A: 'static> {
    attributes: &'static [A],
    models: Vec<(ModelName, Vec<(DataStrategy, ExportEntry<A>)>)>,
}

impl<A: Attribute> StrategyExportTable<A> {
    /// A table printing `attributes` for every strategy.
    #[must_use]
    pub const fn with_rows(attributes: &'static [A]) -> Self {
        Self {
            attributes,
            models: Vec::new(),
        }
    }

    #[must_use]
    pub const fn new() -> Self {
        Self::with_rows(A::ALL)
    }

    /// Adds an (initially empty) model column.
    pub fn add_model(&mut self, model: ModelName) {
        if !self.models.iter().any(|(m, _)| *m == model) {
            self.models.push((model, Vec::new()));
        }
    }

    pub fn add_entry(&mut self, model: &ModelName, strategy: DataStrategy, entry: ExportEntry<A>) {
        self.add_model(model.clone());
        let Some((_, strategies)) = self.models.iter_mut().find(|(m, _)| m == model) else {
            return;
        };
        if let Some(slot) = strategies.iter_mut().find(|(s, _)| *s == strategy) {
            slot.1 = entry;
        } else {
            strategies.push((strategy, entry));
        }
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelName> {
        self.models.iter().map(|(m, _)| m)
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    fn entry(&self, model: &ModelName, strategy: DataStrategy) -> Result<&ExportEntry<A>> {
        self.models
            .iter()
            .find(|(m, _)| m == model)
            .and_then(|(_, strategies)| strategies.iter().find(|(s, _)| *s == strategy))
            .map(|(_, entry)| entry)
            .ok_or_else(|| EvalError::MissingEntry {
                model: model.to_string(),
                strategy: strategy.to_string(),
            })
    }

    /// Header row, then one row per (strategy, attribute), strategies in the given order.
    pub fn rows(&self, strategies: &[DataStrategy]) -> Result<Vec<Vec<String>>> {
        let mut rows = Vec::with_capacity(strategies.len() * self.attributes.len() + 1);

        let mut header = vec![String::new(), String::new()];
        header.extend(self.models().map(ToString::to_string));
        rows.push(header);

        for &strategy in strategies {
            for &attribute in self.attributes {
                let mut row = vec![strategy.to_string(), attribute.label().to_string()];
                for (model, _) in &self.models {
                    row.push(self.entry(model, strategy)?.cell(attribute)?);
                }
                rows.push(row);
            }
        }

        Ok(rows)
    }

    pub fn write_csv<W: io::Write>(&self, writer: W, strategies: &[DataStrategy]) -> Result<()> {
        write_rows(writer, &self.rows(strategies)?)
    }

    pub fn export(&self, path: &Path, strategies: &[DataStrategy]) -> Result<()> {
        let rows = self.rows(strategies)?;
        write_atomic(path, |file| write_rows(file, &rows))
    }
}

impl<A: Attribute> Default for StrategyExportTable<A> {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn write_rows<W: io::Write>(writer: W, rows: &[Vec<String>]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Renders into a temporary file next to `path`, then moves it over `path`.
pub(crate) fn write_atomic<F>(path: &Path, render: F) -> Result<()>
where
    F: FnOnce(&mut NamedTempFile) -> Result<()>,
{
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let mut file = NamedTempFile::new_in(dir)?;
    render(&mut file)?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
