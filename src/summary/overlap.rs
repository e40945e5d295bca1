//! Overlap of significant gene sets across comparisons

use std::collections::BTreeSet;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::classify::{classify, Regulation};
use crate::error::{DiffExprError, Result};
use crate::testing::ComparisonResult;

/// Which significant genes enter a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    #[default]
    Any,
}

impl Direction {
    fn admits(self, call: Regulation) -> bool {
        match (self, call) {
            (_, Regulation::NotSignificant) => false,
            (Direction::Any, _) => true,
            (Direction::Up, r) => r == Regulation::Up,
            (Direction::Down, r) => r == Regulation::Down,
        }
    }
}

/// Significant gene sets of several comparisons.
#[derive(Debug, Clone)]
pub struct OverlapSet {
    names: Vec<String>,
    sets: Vec<BTreeSet<String>>,
    pub threshold: f64,
    pub direction: Direction,
}

impl OverlapSet {
    /// Collect the genes with `padj < threshold` in the requested direction
    /// from each comparison. Comparison names must be unique.
    pub fn new(results: &[ComparisonResult], threshold: f64, direction: Direction) -> Result<Self> {
        let mut names: Vec<String> = Vec::with_capacity(results.len());
        let mut sets = Vec::with_capacity(results.len());
        for result in results {
            if names.contains(&result.name) {
                return Err(DiffExprError::InvalidContrast {
                    reason: format!("comparison '{}' appears twice", result.name),
                });
            }
            let set = result
                .gene_ids
                .iter()
                .zip(result.padj.iter().zip(result.estimate.iter()))
                .filter(|(_, (&p, &lfc))| direction.admits(classify(p, lfc, threshold)))
                .map(|(id, _)| id.clone())
                .collect();
            names.push(result.name.clone());
            sets.push(set);
        }
        Ok(Self {
            names,
            sets,
            threshold,
            direction,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn set(&self, name: &str) -> Option<&BTreeSet<String>> {
        let idx = self.names.iter().position(|n| n == name)?;
        Some(&self.sets[idx])
    }

    /// Intersection sizes of every pair; the diagonal holds set sizes.
    pub fn pairwise(&self) -> Array2<usize> {
        let n = self.sets.len();
        let mut sizes = Array2::zeros((n, n));
        for i in 0..n {
            for j in i..n {
                let size = self.sets[i].intersection(&self.sets[j]).count();
                sizes[[i, j]] = size;
                sizes[[j, i]] = size;
            }
        }
        sizes
    }

    /// Intersection of the named sets. A name may repeat; an unknown name is
    /// an error. No names gives the empty set.
    pub fn intersection(&self, names: &[&str]) -> Result<BTreeSet<String>> {
        let mut chosen = Vec::with_capacity(names.len());
        for name in names {
            chosen.push(self.set(name).ok_or_else(|| DiffExprError::InvalidContrast {
                reason: format!("no comparison named '{}'", name),
            })?);
        }
        let Some((first, rest)) = chosen.split_first() else {
            return Ok(BTreeSet::new());
        };
        Ok(first
            .iter()
            .filter(|id| rest.iter().all(|s| s.contains(*id)))
            .cloned()
            .collect())
    }

    /// Genes significant in every comparison
    pub fn full_intersection(&self) -> BTreeSet<String> {
        let names: Vec<&str> = self.names.iter().map(String::as_str).collect();
        self.intersection(&names).unwrap_or_default()
    }
}
