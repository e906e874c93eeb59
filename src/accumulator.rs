// Copyright 2024-2025 Mikael Lund
//
// Licensed under the Apache license, version 2.0 (the "license");
// you may not use this file except in compliance with the license.
// You may obtain a copy of the license at
//
//     http://www.apache.org/licenses/license-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the license is distributed on an "as is" basis,
// without warranties or conditions of any kind, either express or implied.
// See the license for the specific language governing permissions and
// limitations under the license.

//! Combined per-step force accumulation.

use crate::{
    accumulate, DuplicateBuffers, Error, InverseMap, LevelBudget, Role, TermForces, Topology,
    Vector3,
};
use itertools::Itertools;

/// Owns every buffer of one force-evaluation pipeline: the inverse map and
/// term-contribution arenas for the bonded gather path, and the duplicated
/// partial-force lanes for the pairwise path.
///
/// Per step: [`begin_step`](Self::begin_step), let the evaluators fill
/// [`contributions_mut`](Self::contributions_mut) and
/// [`duplicates_mut`](Self::duplicates_mut), then [`apply`](Self::apply)
/// adds both reductions onto the caller-owned force buffer: pairwise merge
/// first, then the gather passes. The fixed evaluation order keeps repeated
/// runs bitwise reproducible.
#[derive(Clone, Debug)]
pub struct ForceAccumulator {
    map: InverseMap,
    contributions: TermForces,
    duplicates: DuplicateBuffers,
}

impl ForceAccumulator {
    /// Validate the topology against `budget` and allocate all buffers.
    ///
    /// Fails fast with [`Error::LevelOverflow`] when any particle's fan-in
    /// exceeds the provisioned levels; no evaluation can run afterwards with
    /// an overflowing configuration.
    pub fn new(
        topology: &Topology,
        budget: LevelBudget,
        duplication: usize,
    ) -> Result<Self, Error> {
        let map = InverseMap::build(topology, budget)?;
        let contributions = TermForces::for_topology(topology)?;
        let duplicates = DuplicateBuffers::new(duplication, topology.particle_count())?;

        log::debug!(
            "force accumulator ready: {} particles, {} terms in {} slots, levels {}, {} duplicate lanes of width {}",
            topology.particle_count(),
            topology.term_count(),
            map.slot_capacity(),
            Role::ALL
                .iter()
                .map(|role| format!("{}:{}", role, budget.get(*role)))
                .join(" "),
            duplicates.duplication(),
            duplicates.width(),
        );

        Ok(Self {
            map,
            contributions,
            duplicates,
        })
    }

    pub fn map(&self) -> &InverseMap {
        &self.map
    }

    /// Term-contribution arenas for the gather path
    pub fn contributions_mut(&mut self) -> &mut TermForces {
        &mut self.contributions
    }

    pub fn contributions(&self) -> &TermForces {
        &self.contributions
    }

    /// Duplicated partial-force lanes for the pairwise path
    pub fn duplicates_mut(&mut self) -> &mut DuplicateBuffers {
        &mut self.duplicates
    }

    pub fn duplicates(&self) -> &DuplicateBuffers {
        &self.duplicates
    }

    /// Zero all evaluator-written buffers for a new step
    pub fn begin_step(&mut self) {
        self.contributions.clear();
        self.duplicates.clear();
    }

    /// Add both reduction paths onto `forces`.
    ///
    /// Validates the buffer length before any write; existing forces are
    /// preserved and only added to.
    pub fn apply(&self, forces: &mut [Vector3]) -> Result<(), Error> {
        if forces.len() < self.map.particle_count() {
            return Err(Error::ShortBuffer {
                len: forces.len(),
                particle_count: self.map.particle_count(),
            });
        }
        self.duplicates.merge_into(forces)?;
        accumulate(&self.map, &self.contributions, forces)
    }

    /// Sum of everything the evaluators have written this step
    pub fn total(&self) -> Vector3 {
        self.contributions.total() + self.duplicates.total()
    }
}
