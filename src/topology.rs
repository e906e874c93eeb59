// Copyright 2024 Mikael Lund
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

//! Interaction terms and the topology they form.
//!
//! A [`Term`] references 2–4 particles, one per [`Role`]. A [`Topology`]
//! collects the terms routed through the scatter/gather path together with
//! the particle count, and knows the per-role *fan-in*: how many terms
//! reference a given particle in a given role. The maximum fan-in decides
//! how many inverse-map levels a role needs.

use crate::{Error, LevelBudget, PerRole, Role, LANE_WIDTH};

/// An interaction referencing 2–4 particles, one per structural role.
///
/// ## Examples
/// ~~~
/// use forcegather::{Role, Term};
/// let angle = Term::triplet(4, 7, 2);
/// assert_eq!(angle.arity(), 3);
/// assert_eq!(angle.participant(Role::J), Some(7));
/// assert_eq!(angle.participant(Role::L), None);
/// ~~~
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Term {
    participants: [Option<usize>; 4],
}

impl Term {
    /// Two-particle term (bond stretch, 1-4 pair, ...)
    pub const fn pair(i: usize, j: usize) -> Self {
        Self {
            participants: [Some(i), Some(j), None, None],
        }
    }

    /// Three-particle term (angle bend, ...)
    pub const fn triplet(i: usize, j: usize, k: usize) -> Self {
        Self {
            participants: [Some(i), Some(j), Some(k), None],
        }
    }

    /// Four-particle term (proper or improper torsion, ...)
    pub const fn quadruplet(i: usize, j: usize, k: usize, l: usize) -> Self {
        Self {
            participants: [Some(i), Some(j), Some(k), Some(l)],
        }
    }

    /// Particle occupying `role`, if the term has that many participants
    pub const fn participant(&self, role: Role) -> Option<usize> {
        self.participants[role.index()]
    }

    /// Number of participating particles (2–4)
    pub fn arity(&self) -> usize {
        self.participants.iter().flatten().count()
    }

    /// Iterate over occupied `(role, particle)` pairs in role order
    pub fn occupied(&self) -> impl Iterator<Item = (Role, usize)> + '_ {
        Role::ALL
            .into_iter()
            .filter_map(|role| Some((role, self.participant(role)?)))
    }
}

/// Particle count plus the terms reduced through the scatter/gather path.
///
/// Supplied once at setup; when the simulated system changes, build a fresh
/// topology and new maps from it. There is no incremental update.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Topology {
    particle_count: usize,
    terms: Vec<Term>,
}

impl Topology {
    /// An empty topology over `particle_count` particles
    pub fn new(particle_count: usize) -> Self {
        Self {
            particle_count,
            terms: Vec::new(),
        }
    }

    /// Build from an iterator of terms, validating every participant id
    pub fn with_terms(
        particle_count: usize,
        terms: impl IntoIterator<Item = Term>,
    ) -> Result<Self, Error> {
        let mut topology = Self::new(particle_count);
        for term in terms {
            topology.push(term)?;
        }
        Ok(topology)
    }

    /// Append a term, rejecting participants outside the particle range
    pub fn push(&mut self, term: Term) -> Result<(), Error> {
        for (_, particle) in term.occupied() {
            if particle >= self.particle_count {
                return Err(Error::ParticleOutOfRange {
                    term: self.terms.len(),
                    particle,
                    particle_count: self.particle_count,
                });
            }
        }
        self.terms.push(term);
        Ok(())
    }

    pub fn particle_count(&self) -> usize {
        self.particle_count
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Slots provisioned for the term arrays: one reserved zero slot, one
    /// slot per term, padded up to a [`LANE_WIDTH`] multiple. Padding slots
    /// are never assigned to a term and stay zero.
    pub fn slot_capacity(&self) -> usize {
        (self.terms.len() + 1).next_multiple_of(LANE_WIDTH)
    }

    /// Per-role, per-particle reference counts
    pub fn fan_in(&self) -> PerRole<Vec<u32>> {
        let mut counts = PerRole::from_fn(|_| vec![0u32; self.particle_count]);
        for term in &self.terms {
            for (role, particle) in term.occupied() {
                counts[role][particle] += 1;
            }
        }
        counts
    }

    /// The smallest per-role level budget this topology fits into
    pub fn required_levels(&self) -> LevelBudget {
        let fan_in = self.fan_in();
        LevelBudget::from_fn(|role| {
            fan_in[role].iter().copied().max().unwrap_or(0) as usize
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_roles() {
        let bond = Term::pair(0, 1);
        assert_eq!(bond.arity(), 2);
        assert_eq!(bond.participant(Role::I), Some(0));
        assert_eq!(bond.participant(Role::K), None);

        let torsion = Term::quadruplet(3, 2, 1, 0);
        assert_eq!(torsion.arity(), 4);
        let occupied: Vec<_> = torsion.occupied().collect();
        assert_eq!(
            occupied,
            vec![(Role::I, 3), (Role::J, 2), (Role::K, 1), (Role::L, 0)]
        );
    }

    #[test]
    fn test_rejects_out_of_range_particle() {
        let mut topology = Topology::new(3);
        topology.push(Term::pair(0, 2)).unwrap();
        let err = topology.push(Term::triplet(0, 1, 3)).unwrap_err();
        assert!(matches!(
            err,
            Error::ParticleOutOfRange {
                term: 1,
                particle: 3,
                particle_count: 3
            }
        ));
        // the failed push must not have been recorded
        assert_eq!(topology.term_count(), 1);
    }

    #[test]
    fn test_fan_in_and_required_levels() {
        // particle 1 is role-I participant of three terms, role-J of one
        let topology = Topology::with_terms(
            4,
            [
                Term::pair(1, 0),
                Term::pair(1, 2),
                Term::triplet(1, 3, 2),
                Term::pair(0, 1),
            ],
        )
        .unwrap();

        let fan_in = topology.fan_in();
        assert_eq!(fan_in[Role::I], vec![0, 3, 0, 0]);
        assert_eq!(fan_in[Role::J], vec![1, 1, 1, 1]);
        assert_eq!(fan_in[Role::K], vec![0, 0, 1, 0]);
        assert_eq!(fan_in[Role::L], vec![0, 0, 0, 0]);

        let required = topology.required_levels();
        assert_eq!(required.get(Role::I), 3);
        assert_eq!(required.get(Role::J), 1);
        assert_eq!(required.get(Role::K), 1);
        assert_eq!(required.get(Role::L), 0);
    }

    #[test]
    fn test_slot_capacity_is_padded() {
        let topology = Topology::with_terms(2, [Term::pair(0, 1)]).unwrap();
        // one term plus the reserved zero slot, padded to a lane multiple
        assert_eq!(topology.slot_capacity(), LANE_WIDTH);

        let many = Topology::with_terms(2, vec![Term::pair(0, 1); 8]).unwrap();
        assert_eq!(many.slot_capacity(), 2 * LANE_WIDTH);
        assert!(Topology::new(5).slot_capacity() >= 1);
    }
}
