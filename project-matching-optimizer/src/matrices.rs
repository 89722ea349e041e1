//! Coefficient matrices derived from preferences, hints and faculty pools.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::entities::{Catalog, Hint, MatchingDataset, ProjectId, Selector};
use crate::enumerate::Enumeration;
use crate::error::{OptimizerError, Result};
use crate::params::MatchingParams;
use crate::sparse::SparseMatrix;

#[derive(Debug, Clone)]
pub struct Matrices {
    /// `(selector, project)`: preference rank, 0 where the pair may not be assigned
    pub rank: SparseMatrix<u32>,
    /// `(selector, project)`: multiplicative bias on the objective, 1 by default
    pub weight: SparseMatrix<f64>,
    /// `(selector, project)` pairs that must be assigned
    pub required: BTreeSet<(usize, usize)>,
    /// selector submitted a ranking
    pub submitted: Vec<bool>,
    /// selector's rank row comes from a ranking or an offer, not the fallback
    pub has_ranking: Vec<bool>,
    /// `(supervisor, project)`: 1 where the supervisor may take the project
    pub supervisors: SparseMatrix<u32>,
    /// `(marker, project)`: how often the marker may mark the project
    pub markers: SparseMatrix<u32>,
    /// distinct markers each assignment of a project needs
    pub marker_valence: Vec<u32>,
}

fn hint_bias(hint: Hint, params: &MatchingParams) -> f64 {
    let hints = &params.hints;
    match hint {
        Hint::Encourage => hints.encourage_bias.abs(),
        Hint::Discourage => hints.discourage_bias.abs(),
        Hint::StrongEncourage => hints.strong_encourage_bias.abs(),
        Hint::StrongDiscourage => hints.strong_discourage_bias.abs(),
        Hint::Neutral | Hint::Require | Hint::Forbid => 1.0,
    }
}

/// Turn hard hints into soft ones when the attempt asks for it.
const fn effective_hint(hint: Hint, params: &MatchingParams) -> Hint {
    if !params.hints.use_hints {
        return Hint::Neutral;
    }
    match hint {
        Hint::Require if params.hints.require_to_encourage => Hint::StrongEncourage,
        Hint::Forbid if params.hints.forbid_to_discourage => Hint::StrongDiscourage,
        other => other,
    }
}

struct RowBuilder<'a> {
    enumeration: &'a Enumeration,
    catalog: &'a Catalog<'a>,
    params: &'a MatchingParams,
    rank: SparseMatrix<u32>,
    weight: SparseMatrix<f64>,
    required: BTreeSet<(usize, usize)>,
}

impl RowBuilder<'_> {
    fn programme_bias(&self, selector: &Selector, project: usize) -> Result<f64> {
        if self.params.ignore_programme_prefs {
            return Ok(1.0);
        }
        let Some(programme) = selector.programme else {
            return Ok(1.0);
        };
        let live = self
            .catalog
            .project(self.enumeration.projects.id(project))?;
        Ok(if live.programmes.contains(&programme) {
            self.params.programme_bias.abs()
        } else {
            1.0
        })
    }

    fn offer(&mut self, row: usize, selector: &Selector, offer: ProjectId) -> Result<()> {
        let infeasible = |reason: &str| OptimizerError::InfeasibleRequirement {
            selector: selector.id,
            project: offer,
            reason: reason.to_owned(),
        };
        let column = self
            .enumeration
            .projects
            .index_of(offer)
            .ok_or_else(|| infeasible("the offered project is not part of this attempt"))?;
        if self.enumeration.project_config[column] != self.enumeration.selector_config[row] {
            return Err(infeasible("the offered project belongs to another project class"));
        }
        self.rank.set(row, column, 1);
        self.required.insert((row, column));
        Ok(())
    }

    fn ranking(&mut self, row: usize, selector: &Selector) -> Result<()> {
        for choice in &selector.choices {
            let Some(column) = self.enumeration.projects.index_of(choice.project) else {
                warn!(
                    selector = %selector.id,
                    project = %choice.project,
                    "ranked project is not part of this attempt"
                );
                continue;
            };
            if self.enumeration.project_config[column] != self.enumeration.selector_config[row] {
                warn!(
                    selector = %selector.id,
                    project = %choice.project,
                    "ranked project belongs to another project class"
                );
                continue;
            }
            if choice.rank == 0 {
                return Err(OptimizerError::Integrity(format!(
                    "selector {} ranks project {} at 0",
                    selector.id, choice.project
                )));
            }

            let hint = effective_hint(choice.hint, self.params);
            match hint {
                Hint::Forbid => {
                    debug!(selector = %selector.id, project = %choice.project, "choice forbidden");
                    continue;
                }
                Hint::Require => {
                    self.required.insert((row, column));
                }
                _ => {}
            }

            let mut weight = hint_bias(hint, self.params);
            if choice.from_bookmark {
                weight *= self.params.bookmark_bias.abs();
            }
            weight *= self.programme_bias(selector, column)?;

            self.rank.set(row, column, choice.rank);
            self.weight.set(row, column, weight);
        }
        Ok(())
    }

    /// Nothing to go on, so any project of the selector's own class will do.
    fn fallback(&mut self, row: usize, selector: &Selector) -> Result<()> {
        let config = self.enumeration.selector_config[row];
        for (column, _) in self.enumeration.projects.iter() {
            if self.enumeration.project_config[column] != config {
                continue;
            }
            let weight = self.programme_bias(selector, column)?;
            self.rank.set(row, column, 1);
            self.weight.set(row, column, weight);
        }
        Ok(())
    }
}

fn validate_required(
    enumeration: &Enumeration,
    rank: &SparseMatrix<u32>,
    required: &BTreeSet<(usize, usize)>,
) -> Result<()> {
    let mut per_selector: BTreeMap<usize, u32> = BTreeMap::new();
    let mut per_project: BTreeMap<usize, u32> = BTreeMap::new();
    for &(row, column) in required {
        let infeasible = |reason: String| OptimizerError::InfeasibleRequirement {
            selector: enumeration.selectors.id(row),
            project: enumeration.projects.id(column),
            reason,
        };
        if rank.get(row, column) == 0 {
            return Err(infeasible("the pair is not assignable".to_owned()));
        }
        let selector_count = per_selector.entry(row).or_default();
        *selector_count += 1;
        if *selector_count > enumeration.multiplicity(row) {
            return Err(infeasible(format!(
                "the selector needs only {} project(s)",
                enumeration.multiplicity(row)
            )));
        }
        let project_count = per_project.entry(column).or_default();
        *project_count += 1;
        if enumeration.capacity_enforced[column] && *project_count > enumeration.capacity[column] {
            return Err(infeasible(format!(
                "the project only takes {} student(s)",
                enumeration.capacity[column]
            )));
        }
    }
    Ok(())
}

fn supervisor_matrix(enumeration: &Enumeration, catalog: &Catalog<'_>) -> Result<SparseMatrix<u32>> {
    let mut matrix = SparseMatrix::new(0);
    for (column, id) in enumeration.projects.iter() {
        let project = catalog.project(id)?;
        if project.generic {
            for member in &project.supervisor_pool {
                if let Some(row) = enumeration.supervisors.index_of(*member) {
                    matrix.set(row, column, 1);
                }
            }
            continue;
        }

        let eligible: BTreeSet<_> = project
            .owner
            .iter()
            .chain(&project.supervisor_pool)
            .copied()
            .collect();
        if eligible.len() > 1 {
            return Err(OptimizerError::Integrity(format!(
                "individual project {id} has {} eligible supervisors",
                eligible.len()
            )));
        }
        match eligible.first() {
            Some(owner) => match enumeration.supervisors.index_of(*owner) {
                Some(row) => matrix.set(row, column, 1),
                None => warn!(project = %id, owner = %owner, "project owner is not enrolled to supervise"),
            },
            None if enumeration.config(project.config).uses_supervisor => {
                return Err(OptimizerError::Integrity(format!(
                    "individual project {id} has no owner"
                )));
            }
            None => {}
        }
    }
    Ok(matrix)
}

fn marker_matrix(
    enumeration: &Enumeration,
    catalog: &Catalog<'_>,
    params: &MatchingParams,
) -> Result<(SparseMatrix<u32>, Vec<u32>)> {
    let multiplicity = params.max_marking_multiplicity.max(1);
    let mut matrix = SparseMatrix::new(0);
    let mut valence = Vec::with_capacity(enumeration.projects.len());
    for (column, id) in enumeration.projects.iter() {
        let project = catalog.project(id)?;
        let config = enumeration.config(project.config);
        valence.push(config.marker_valence());
        if !config.uses_marker {
            continue;
        }
        for assessor in &project.assessors {
            let Some(row) = enumeration.markers.index_of(*assessor) else {
                continue;
            };
            let enrolled = catalog
                .faculty(*assessor)?
                .enrollment(config.id)
                .is_some_and(|enrollment| enrollment.marking);
            if enrolled {
                matrix.set(row, column, multiplicity);
            }
        }
    }
    Ok((matrix, valence))
}

/// Build R, W, the required set, P, M and the marker valence.
pub fn build_matrices(
    dataset: &MatchingDataset,
    enumeration: &Enumeration,
    params: &MatchingParams,
) -> Result<Matrices> {
    let catalog = Catalog::new(dataset);
    let mut rows = RowBuilder {
        enumeration,
        catalog: &catalog,
        params,
        rank: SparseMatrix::new(0),
        weight: SparseMatrix::new(1.0),
        required: BTreeSet::new(),
    };

    let mut submitted = Vec::with_capacity(enumeration.selectors.len());
    let mut has_ranking = Vec::with_capacity(enumeration.selectors.len());
    for (row, id) in enumeration.selectors.iter() {
        let selector: &Selector = catalog.selector(id)?;
        if let Some(offer) = selector.accepted_offer {
            rows.offer(row, selector, offer)?;
            has_ranking.push(true);
        } else if selector.submitted {
            rows.ranking(row, selector)?;
            has_ranking.push(true);
        } else {
            rows.fallback(row, selector)?;
            has_ranking.push(false);
        }
        submitted.push(selector.submitted);
    }

    validate_required(enumeration, &rows.rank, &rows.required)?;
    let supervisors = supervisor_matrix(enumeration, &catalog)?;
    let (markers, marker_valence) = marker_matrix(enumeration, &catalog, params)?;

    Ok(Matrices {
        rank: rows.rank,
        weight: rows.weight,
        required: rows.required,
        submitted,
        has_ranking,
        supervisors,
        markers,
        marker_valence,
    })
}

impl Matrices {
    /// Rank of the pair if the selector expressed one.
    #[must_use]
    pub fn recorded_rank(&self, selector: usize, project: usize) -> Option<u32> {
        if !self.has_ranking[selector] {
            return None;
        }
        Some(self.rank.get(selector, project)).filter(|rank| *rank > 0)
    }
}
