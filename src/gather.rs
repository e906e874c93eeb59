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

//! Scatter/gather reduction of per-term contributions onto particles.
//!
//! Term evaluators write one force vector per occupied role into a
//! [`TermForces`] arena, one slot per term. [`accumulate`] then walks the
//! [`InverseMap`](crate::InverseMap) levels and adds each contribution onto
//! the particle it belongs to:
//!
//! ```text
//! force[p] += contributions[role][map[role][level][p]]
//! ```
//!
//! A particle with no term at a level reads the reserved zero slot, so every
//! lane in a pass executes identical work. Levels of one role write the same
//! destinations and therefore run as strictly sequential passes, while
//! particles within a pass are independent and may run in parallel. Roles
//! are reduced in the fixed order I, J, K, L so repeated runs are bitwise
//! reproducible.

use crate::{Error, InverseMap, PerRole, Role, Topology, Vector3};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Slot-indexed force contributions, one arena per role.
///
/// Slot 0 of every role is the hard-zero sentinel target and cannot be
/// written through this API; term `t` owns slot `t + 1`. Padding slots past
/// the last term also stay zero, so uniform lanes may evaluate them freely.
///
/// Cleared and refilled by the term evaluator on every step; read-only
/// during reduction.
#[derive(Clone, Debug, PartialEq)]
pub struct TermForces {
    slots: PerRole<Vec<Vector3>>,
    term_count: usize,
}

impl TermForces {
    /// Allocate zeroed arenas sized for `topology`
    pub fn for_topology(topology: &Topology) -> Result<Self, Error> {
        let capacity = topology.slot_capacity();
        let mut slots = PerRole::from_fn(|_| Vec::new());
        for role in Role::ALL {
            let arena: &mut Vec<Vector3> = &mut slots[role];
            arena.try_reserve_exact(capacity)?;
            arena.resize(capacity, Vector3::zeros());
        }
        Ok(Self {
            slots,
            term_count: topology.term_count(),
        })
    }

    /// Number of real terms the arenas are sized for
    pub fn term_count(&self) -> usize {
        self.term_count
    }

    /// Reset every contribution to zero, keeping the allocation
    pub fn clear(&mut self) {
        for role in Role::ALL {
            self.slots[role].fill(Vector3::zeros());
        }
    }

    /// Overwrite the contribution of `term` in `role`.
    ///
    /// Panics if `term` is out of range; slot assignment guarantees the
    /// sentinel slot stays untouched.
    pub fn set(&mut self, term: usize, role: Role, force: Vector3) {
        assert!(term < self.term_count, "term {term} out of range");
        self.slots[role][term + 1] = force;
    }

    /// Add onto the contribution of `term` in `role`
    pub fn add(&mut self, term: usize, role: Role, force: Vector3) {
        assert!(term < self.term_count, "term {term} out of range");
        self.slots[role][term + 1] += force;
    }

    /// Contribution of `term` in `role`
    pub fn get(&self, term: usize, role: Role) -> Vector3 {
        self.slots[role][term + 1]
    }

    /// Sum of every contribution over all terms and roles.
    ///
    /// By global conservation this equals the force-buffer delta of an
    /// [`accumulate`] call, up to floating-point rounding.
    pub fn total(&self) -> Vector3 {
        Role::ALL
            .into_iter()
            .flat_map(|role| &self.slots[role])
            .sum()
    }

    pub(crate) fn slots(&self, role: Role) -> &[Vector3] {
        &self.slots[role]
    }

    pub(crate) fn slot_capacity(&self) -> usize {
        self.slots[Role::I].len()
    }
}

/// Add every term contribution onto the particle it belongs to.
///
/// `contributions` must have been allocated for the same topology the map
/// was built from. The force buffer must cover every particle; existing
/// entries are preserved and only added to. On error, nothing has been
/// written.
///
/// ## Examples
/// ~~~
/// use forcegather::{accumulate, InverseMap, LevelBudget, Role, Term, TermForces, Topology, Vector3};
///
/// let topology = Topology::with_terms(2, [Term::pair(0, 1)]).unwrap();
/// let map = InverseMap::build(&topology, LevelBudget::uniform(3)).unwrap();
/// let mut contributions = TermForces::for_topology(&topology).unwrap();
/// contributions.set(0, Role::I, Vector3::new(2.0, 0.0, 0.0));
/// contributions.set(0, Role::J, Vector3::new(-2.0, 0.0, 0.0));
///
/// let mut forces = vec![Vector3::zeros(); 2];
/// accumulate(&map, &contributions, &mut forces).unwrap();
/// assert_eq!(forces[0], Vector3::new(2.0, 0.0, 0.0));
/// ~~~
pub fn accumulate(
    map: &InverseMap,
    contributions: &TermForces,
    forces: &mut [Vector3],
) -> Result<(), Error> {
    let particle_count = map.particle_count();
    if forces.len() < particle_count {
        return Err(Error::ShortBuffer {
            len: forces.len(),
            particle_count,
        });
    }
    debug_assert_eq!(
        contributions.slot_capacity(),
        map.slot_capacity(),
        "contributions and map must come from the same topology"
    );

    let forces = &mut forces[..particle_count];
    for role in Role::ALL {
        let slots = contributions.slots(role);
        for level in map.levels(role) {
            gather_pass(level, slots, forces);
        }
    }
    Ok(())
}

/// One level: a single synchronized pass over all particles.
///
/// Each particle is written exactly once, so the parallel and scalar paths
/// produce bitwise-identical results.
fn gather_pass(level: &[u32], slots: &[Vector3], forces: &mut [Vector3]) {
    #[cfg(feature = "parallel")]
    forces
        .par_iter_mut()
        .zip(level.par_iter())
        .for_each(|(force, &slot)| *force += slots[slot as usize]);

    #[cfg(not(feature = "parallel"))]
    for (force, &slot) in forces.iter_mut().zip(level) {
        *force += slots[slot as usize];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InverseMap, LevelBudget, Term};
    use approx::assert_relative_eq;

    /// Deterministic, nonzero test contribution for a (term, role) pair
    fn synthetic_force(term: usize, role: Role) -> Vector3 {
        let seed = (term * 4 + role.index() + 1) as f64;
        Vector3::new(seed, -0.5 * seed, seed * seed * 0.25)
    }

    fn fill(topology: &Topology, contributions: &mut TermForces) {
        for (index, term) in topology.terms().iter().enumerate() {
            for (role, _) in term.occupied() {
                contributions.set(index, role, synthetic_force(index, role));
            }
        }
    }

    #[test]
    fn test_conservation() {
        // ring of angle terms sharing particles
        let particle_count = 12;
        let terms: Vec<Term> = (0..particle_count)
            .map(|p| {
                Term::triplet(
                    p,
                    (p + 1) % particle_count,
                    (p + 2) % particle_count,
                )
            })
            .collect();
        let topology = Topology::with_terms(particle_count, terms).unwrap();
        let map = InverseMap::build(&topology, topology.required_levels()).unwrap();
        let mut contributions = TermForces::for_topology(&topology).unwrap();
        fill(&topology, &mut contributions);

        // pre-existing forces must be preserved
        let initial = Vector3::new(0.5, 0.25, -1.0);
        let mut forces = vec![initial; particle_count];
        accumulate(&map, &contributions, &mut forces).unwrap();

        let delta: Vector3 = forces.iter().map(|f| f - initial).sum();
        assert_relative_eq!(delta, contributions.total(), epsilon = 1e-12);
    }

    #[test]
    fn test_sentinel_levels_contribute_nothing() {
        // particle 3 referenced by exactly one term; budget leaves spare levels
        let topology =
            Topology::with_terms(5, [Term::pair(3, 0), Term::pair(1, 2), Term::pair(1, 4)])
                .unwrap();
        let map = InverseMap::build(&topology, LevelBudget::uniform(5)).unwrap();
        let mut contributions = TermForces::for_topology(&topology).unwrap();
        fill(&topology, &mut contributions);

        let mut forces = vec![Vector3::zeros(); 5];
        accumulate(&map, &contributions, &mut forces).unwrap();

        // only its single real referencing term, despite five passes per role
        assert_eq!(forces[3], synthetic_force(0, Role::I));
        assert_eq!(forces[4], synthetic_force(2, Role::J));
    }

    #[test]
    fn test_slot_assignment_order_invariance() {
        // same term set in two insertion orders
        let forward = [Term::pair(0, 1), Term::pair(0, 2), Term::triplet(0, 1, 2)];
        let backward = [Term::triplet(0, 1, 2), Term::pair(0, 2), Term::pair(0, 1)];

        let run = |terms: &[Term], forces_of: &dyn Fn(&Term, Role) -> Vector3| {
            let topology = Topology::with_terms(3, terms.iter().copied()).unwrap();
            let map = InverseMap::build(&topology, LevelBudget::uniform(3)).unwrap();
            let mut contributions = TermForces::for_topology(&topology).unwrap();
            for (index, term) in topology.terms().iter().enumerate() {
                for (role, _) in term.occupied() {
                    contributions.set(index, role, forces_of(term, role));
                }
            }
            let mut forces = vec![Vector3::zeros(); 3];
            accumulate(&map, &contributions, &mut forces).unwrap();
            forces
        };

        // contributions keyed by term identity, not slot
        let forces_of = |term: &Term, role: Role| {
            let id = (term.arity() * 10 + role.index()) as f64;
            Vector3::new(0.1 * id, id, -id * 0.3)
        };

        let a = run(&forward, &forces_of);
        let b = run(&backward, &forces_of);
        for (fa, fb) in a.iter().zip(&b) {
            assert_relative_eq!(*fa, *fb, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_short_force_buffer_is_rejected_before_writes() {
        let topology = Topology::with_terms(4, [Term::pair(0, 3)]).unwrap();
        let map = InverseMap::build(&topology, LevelBudget::uniform(3)).unwrap();
        let mut contributions = TermForces::for_topology(&topology).unwrap();
        contributions.set(0, Role::I, Vector3::new(1.0, 0.0, 0.0));

        let mut forces = vec![Vector3::zeros(); 3];
        let err = accumulate(&map, &contributions, &mut forces).unwrap_err();
        assert!(matches!(
            err,
            Error::ShortBuffer {
                len: 3,
                particle_count: 4
            }
        ));
        assert!(forces.iter().all(|f| *f == Vector3::zeros()));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_writing_past_last_term_panics() {
        let topology = Topology::with_terms(2, [Term::pair(0, 1)]).unwrap();
        let mut contributions = TermForces::for_topology(&topology).unwrap();
        contributions.set(1, Role::I, Vector3::zeros());
    }
}
