//! Tabular sample storage: features, target, 2-D coordinates.
//!
//! Feature values are stored flat row-major as f64 with an explicit column
//! schema validated at load time. A `Dataset` is immutable once built; the
//! whole benchmark reads it shared.

use serde::{Deserialize, Serialize};

use crate::error::{GeocvError, Result};

/// Named feature columns plus the target column name.
///
/// Validated once at load time so downstream code never string-matches
/// column names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub feature_names: Vec<String>,
    pub target_name: String,
}

impl Schema {
    fn validate(&self) -> Result<()> {
        if self.feature_names.is_empty() {
            return Err(GeocvError::InvalidDataset(
                "schema has no feature columns".into(),
            ));
        }
        if self.target_name.is_empty() {
            return Err(GeocvError::InvalidDataset("empty target column name".into()));
        }
        for (i, name) in self.feature_names.iter().enumerate() {
            if name.is_empty() {
                return Err(GeocvError::InvalidDataset(format!(
                    "feature column {i} has an empty name"
                )));
            }
            if self.feature_names[..i].contains(name) {
                return Err(GeocvError::InvalidDataset(format!(
                    "duplicate feature column name '{name}'"
                )));
            }
            if *name == self.target_name {
                return Err(GeocvError::InvalidDataset(format!(
                    "feature column '{name}' collides with the target column"
                )));
            }
        }
        Ok(())
    }
}

/// One sample as it appears on disk: location, features, target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleRow {
    pub x: f64,
    pub y: f64,
    pub features: Vec<f64>,
    pub target: f64,
}

/// On-disk dataset format consumed by the CLI tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetFile {
    pub schema: Schema,
    pub rows: Vec<SampleRow>,
}

/// Immutable in-memory sample collection.
///
/// `features` is row-major, `n_samples * n_features` long. Coordinate
/// order is (x, y) — lon/lat for geographic data, easting/northing for
/// projected data; partitioning only needs consistent planar distances.
#[derive(Debug, Clone)]
pub struct Dataset {
    schema: Schema,
    features: Vec<f64>,
    targets: Vec<f64>,
    coords: Vec<[f64; 2]>,
}

impl Dataset {
    /// Build a dataset from typed rows, validating the schema and every row.
    pub fn from_rows(schema: Schema, rows: &[SampleRow]) -> Result<Self> {
        schema.validate()?;
        if rows.is_empty() {
            return Err(GeocvError::InvalidDataset("no sample rows".into()));
        }

        let n_features = schema.feature_names.len();
        let mut features = Vec::with_capacity(rows.len() * n_features);
        let mut targets = Vec::with_capacity(rows.len());
        let mut coords = Vec::with_capacity(rows.len());

        for (i, row) in rows.iter().enumerate() {
            if row.features.len() != n_features {
                return Err(GeocvError::InvalidDataset(format!(
                    "row {i}: expected {n_features} features, got {}",
                    row.features.len()
                )));
            }
            if !row.x.is_finite() || !row.y.is_finite() {
                return Err(GeocvError::InvalidDataset(format!(
                    "row {i}: non-finite coordinates ({}, {})",
                    row.x, row.y
                )));
            }
            if !row.target.is_finite() {
                return Err(GeocvError::InvalidDataset(format!(
                    "row {i}: non-finite target {}",
                    row.target
                )));
            }
            if let Some(j) = row.features.iter().position(|v| !v.is_finite()) {
                return Err(GeocvError::InvalidDataset(format!(
                    "row {i}: non-finite value in feature '{}'",
                    schema.feature_names[j]
                )));
            }
            features.extend_from_slice(&row.features);
            targets.push(row.target);
            coords.push([row.x, row.y]);
        }

        Ok(Self { schema, features, targets, coords })
    }

    /// Build a dataset from the on-disk JSON representation.
    pub fn from_file(file: DatasetFile) -> Result<Self> {
        Self::from_rows(file.schema, &file.rows)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn n_samples(&self) -> usize {
        self.targets.len()
    }

    pub fn n_features(&self) -> usize {
        self.schema.feature_names.len()
    }

    pub fn coords(&self) -> &[[f64; 2]] {
        &self.coords
    }

    pub fn targets(&self) -> &[f64] {
        &self.targets
    }

    #[inline]
    pub fn target(&self, i: usize) -> f64 {
        self.targets[i]
    }

    /// Feature row of sample `i`.
    #[inline]
    pub fn feature_row(&self, i: usize) -> &[f64] {
        let d = self.n_features();
        &self.features[i * d..(i + 1) * d]
    }

    /// Copy the feature rows and targets at `indices` into fresh flat
    /// buffers, in index order. Used to build per-split design matrices.
    pub fn gather(&self, indices: &[usize]) -> (Vec<f64>, Vec<f64>) {
        let d = self.n_features();
        let mut x = Vec::with_capacity(indices.len() * d);
        let mut y = Vec::with_capacity(indices.len());
        for &i in indices {
            x.extend_from_slice(self.feature_row(i));
            y.push(self.targets[i]);
        }
        (x, y)
    }
}
