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

//! Bounded-capacity inverse index maps.
//!
//! The scatter/gather reduction needs, for every particle, the list of term
//! slots that contribute to it in each role. Instead of per-particle
//! adjacency lists, the map is an arena of dense *levels*: level *l* of a
//! role is an array indexed by particle id whose entry is the slot of the
//! *l*-th term referencing that particle in that role, or the sentinel slot
//! 0 when no such term exists. Every level then drives one uniform,
//! branch-free pass over all particles.
//!
//! The number of levels per role is provisioned up front as a
//! [`LevelBudget`] and validated against the actual fan-in when the map is
//! built. Overflow is a fatal setup error: growing the arena mid-run or
//! silently dropping a contribution would both be wrong, so neither is
//! attempted.

use crate::{Error, PerRole, Role, Topology};
use itertools::Itertools;

/// Entry pointing at the reserved always-zero slot
const SENTINEL: u32 = 0;

/// Provisioned inverse-map level count per role.
///
/// The level count bounds the fan-in a role can accommodate: a particle may
/// be referenced by at most that many terms in the role. Use
/// [`Topology::required_levels`] to compute the smallest budget that fits a
/// given topology; typical bonded topologies need three to five levels.
///
/// ## Examples
/// ~~~
/// use forcegather::{LevelBudget, Role};
/// let budget = LevelBudget::per_role(3, 5, 4, 2);
/// assert_eq!(budget.get(Role::J), 5);
/// assert!(budget.fits(&LevelBudget::uniform(2)));
/// assert!(!budget.fits(&LevelBudget::uniform(5)));
/// ~~~
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize, serde::Serialize),
    serde(deny_unknown_fields)
)]
pub struct LevelBudget {
    pub i: usize,
    pub j: usize,
    pub k: usize,
    pub l: usize,
}

impl LevelBudget {
    /// The same level count for every role
    pub const fn uniform(levels: usize) -> Self {
        Self::per_role(levels, levels, levels, levels)
    }

    /// Individual level counts in role order
    pub const fn per_role(i: usize, j: usize, k: usize, l: usize) -> Self {
        Self { i, j, k, l }
    }

    /// Build by calling `f` once per role
    pub fn from_fn(mut f: impl FnMut(Role) -> usize) -> Self {
        Self::per_role(f(Role::I), f(Role::J), f(Role::K), f(Role::L))
    }

    /// Level count provisioned for `role`
    pub const fn get(&self, role: Role) -> usize {
        match role {
            Role::I => self.i,
            Role::J => self.j,
            Role::K => self.k,
            Role::L => self.l,
        }
    }

    /// Whether every role of `required` fits within this budget
    pub fn fits(&self, required: &LevelBudget) -> bool {
        Role::ALL
            .into_iter()
            .all(|role| self.get(role) >= required.get(role))
    }
}

/// Precomputed inverse index tables for one topology.
///
/// Built once at setup and reused by every [`accumulate`](crate::accumulate)
/// call until the topology changes. The map is read-only during reduction.
///
/// Level arrays always span the full provisioned budget, so the per-step
/// work of a configuration is independent of which particles the terms
/// happen to touch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InverseMap {
    particle_count: usize,
    slot_capacity: usize,
    budget: LevelBudget,
    levels: PerRole<Vec<Vec<u32>>>,
}

impl InverseMap {
    /// Build the level arrays for `topology`, failing fast when the actual
    /// fan-in of any role exceeds the provisioned budget.
    pub fn build(topology: &Topology, budget: LevelBudget) -> Result<Self, Error> {
        let particle_count = topology.particle_count();
        let required = topology.required_levels();
        for role in Role::ALL {
            if required.get(role) > budget.get(role) {
                return Err(Error::LevelOverflow {
                    role,
                    required: required.get(role),
                    provisioned: budget.get(role),
                });
            }
        }

        let mut levels = PerRole::from_fn(|_| Vec::new());
        for role in Role::ALL {
            for _ in 0..budget.get(role) {
                let mut level: Vec<u32> = Vec::new();
                level.try_reserve_exact(particle_count)?;
                level.resize(particle_count, SENTINEL);
                levels[role].push(level);
            }
        }

        // Terms are assigned in slot order, so the l-th term referencing a
        // particle lands in level l. Slot 0 stays reserved for the sentinel.
        let mut cursor = PerRole::from_fn(|_| vec![0usize; particle_count]);
        for (index, term) in topology.terms().iter().enumerate() {
            let slot = (index + 1) as u32;
            for (role, particle) in term.occupied() {
                let level = cursor[role][particle];
                cursor[role][particle] += 1;
                levels[role][level][particle] = slot;
            }
        }

        log::debug!(
            "built inverse map: {} particles, {} terms, levels {}",
            particle_count,
            topology.term_count(),
            Role::ALL
                .iter()
                .map(|role| format!("{}:{}", role, budget.get(*role)))
                .join(" ")
        );

        Ok(Self {
            particle_count,
            slot_capacity: topology.slot_capacity(),
            budget,
            levels,
        })
    }

    pub fn particle_count(&self) -> usize {
        self.particle_count
    }

    /// Slot count of the term arrays this map indexes into
    pub fn slot_capacity(&self) -> usize {
        self.slot_capacity
    }

    pub fn budget(&self) -> LevelBudget {
        self.budget
    }

    /// Level arrays for `role`; each level spans every particle
    pub fn levels(&self, role: Role) -> &[Vec<u32>] {
        &self.levels[role]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Term;

    fn star_topology() -> Topology {
        // particle 0 is the role-I hub of three terms
        Topology::with_terms(
            5,
            [
                Term::pair(0, 1),
                Term::triplet(0, 2, 3),
                Term::pair(0, 4),
                Term::pair(2, 0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_every_reference_appears_exactly_once() {
        let topology = star_topology();
        let map = InverseMap::build(&topology, LevelBudget::uniform(3)).unwrap();

        for role in Role::ALL {
            // expected slots per particle in this role
            let mut expected: Vec<Vec<u32>> = vec![Vec::new(); 5];
            for (index, term) in topology.terms().iter().enumerate() {
                if let Some(particle) = term.participant(role) {
                    expected[particle].push((index + 1) as u32);
                }
            }

            for particle in 0..5 {
                let mut found: Vec<u32> = map
                    .levels(role)
                    .iter()
                    .map(|level| level[particle])
                    .filter(|&slot| slot != SENTINEL)
                    .collect();
                found.sort_unstable();
                expected[particle].sort_unstable();
                assert_eq!(found, expected[particle], "role {role} particle {particle}");
            }
        }
    }

    #[test]
    fn test_unused_levels_hold_sentinel() {
        let topology = Topology::with_terms(3, [Term::pair(0, 1)]).unwrap();
        let map = InverseMap::build(&topology, LevelBudget::uniform(4)).unwrap();

        // particle 0 appears once in role I; levels 1..4 must stay sentinel
        let levels = map.levels(Role::I);
        assert_eq!(levels.len(), 4);
        assert_eq!(levels[0][0], 1);
        for level in &levels[1..] {
            assert!(level.iter().all(|&slot| slot == SENTINEL));
        }
        // particle 2 is referenced by nothing at all
        for level in levels {
            assert_eq!(level[2], SENTINEL);
        }
    }

    #[test]
    fn test_overflow_is_fatal_and_names_the_role() {
        let mut topology = Topology::new(6);
        for other in 1..=4 {
            topology.push(Term::pair(0, other)).unwrap();
        }
        let err = InverseMap::build(&topology, LevelBudget::uniform(3)).unwrap_err();
        match err {
            Error::LevelOverflow {
                role,
                required,
                provisioned,
            } => {
                assert_eq!(role, Role::I);
                assert_eq!(required, 4);
                assert_eq!(provisioned, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_asymmetric_budget() {
        // quadruplet chain; roles J and K see the shared middle particles
        let topology = Topology::with_terms(
            6,
            [
                Term::quadruplet(0, 1, 2, 3),
                Term::quadruplet(1, 2, 3, 4),
                Term::quadruplet(2, 3, 4, 5),
            ],
        )
        .unwrap();
        let budget = LevelBudget::per_role(3, 5, 4, 2);
        let map = InverseMap::build(&topology, budget).unwrap();
        assert_eq!(map.levels(Role::J).len(), 5);
        assert_eq!(map.levels(Role::L).len(), 2);
        assert!(budget.fits(&topology.required_levels()));
    }

    #[test]
    fn test_empty_topology_builds() {
        let topology = Topology::new(4);
        let map = InverseMap::build(&topology, LevelBudget::uniform(3)).unwrap();
        for role in Role::ALL {
            for level in map.levels(role) {
                assert!(level.iter().all(|&slot| slot == SENTINEL));
            }
        }
    }
}
