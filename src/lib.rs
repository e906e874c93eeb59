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

//! # Forcegather
//!
//! A library for summing inter-particle interaction forces without write
//! conflicts. Many independent *terms* (bonds, angles, torsions) each
//! reference 2–4 particles and contribute one force vector per participant.
//! When term contributions are computed by wide, independent lanes, several
//! terms touching the same particle must not race on its accumulator.
//!
//! Two reduction paths are provided:
//!
//! - [`accumulate`]: a scatter/gather reduction over precomputed
//!   [`InverseMap`] index tables for the sparse, irregular bonded terms.
//!   Each map level is one branch-free pass in which every particle is
//!   touched exactly once; a particle with no term at a level reads a
//!   reserved always-zero slot instead of branching.
//! - [`DuplicateBuffers::merge_into`]: a particle-wise sum over duplicated
//!   partial-force lanes for the regular, tiled pairwise path.
//!
//! Both paths only ever *add* to the caller-owned force buffer.
//!
//! ## Examples
//! ~~~
//! use forcegather::{ForceAccumulator, LevelBudget, Role, Term, Topology, Vector3};
//!
//! // One angle term over particles (0, 1, 2)
//! let mut topology = Topology::new(3);
//! topology.push(Term::triplet(0, 1, 2)).unwrap();
//!
//! let mut accumulator = ForceAccumulator::new(&topology, LevelBudget::uniform(3), 1).unwrap();
//! accumulator.contributions_mut().set(0, Role::I, Vector3::new(0.0, 1.0, 0.0));
//! accumulator.contributions_mut().set(0, Role::J, Vector3::new(0.0, -2.0, 0.0));
//! accumulator.contributions_mut().set(0, Role::K, Vector3::new(0.0, 1.0, 0.0));
//!
//! let mut forces = vec![Vector3::zeros(); 3];
//! accumulator.apply(&mut forces).unwrap();
//! assert_eq!(forces[1], Vector3::new(0.0, -2.0, 0.0));
//! ~~~

#[cfg(test)]
extern crate approx;

use std::fmt;
use std::ops::{Index, IndexMut};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A force or position vector in 3D space
pub type Vector3 = nalgebra::Vector3<f64>;

mod accumulator;
mod error;
mod gather;
mod invmap;
mod merge;
mod topology;

pub use accumulator::ForceAccumulator;
pub use error::Error;
pub use gather::{accumulate, TermForces};
pub use invmap::{InverseMap, LevelBudget};
pub use merge::DuplicateBuffers;
pub use topology::{Term, Topology};

/// Slot arrays and duplicated partial-force buffers are padded to a multiple
/// of this width so that uniform lanes never read out of bounds.
pub const LANE_WIDTH: usize = 8;

/// Structural position of a participant within a term.
///
/// A pair term occupies roles I and J; a triplet adds K; a quadruplet adds L.
/// Each role owns its own contribution array and inverse-map levels, so the
/// same particle may appear in different roles of different terms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum Role {
    I,
    J,
    K,
    L,
}

impl Role {
    /// All roles in their fixed reduction order
    pub const ALL: [Role; 4] = [Role::I, Role::J, Role::K, Role::L];

    /// Zero-based position of the role within a term
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::I => write!(f, "I"),
            Role::J => write!(f, "J"),
            Role::K => write!(f, "K"),
            Role::L => write!(f, "L"),
        }
    }
}

/// One value per role, indexable by [`Role`]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PerRole<T>([T; 4]);

impl<T> PerRole<T> {
    /// Build by calling `f` once per role, in role order
    pub fn from_fn(mut f: impl FnMut(Role) -> T) -> Self {
        Self(Role::ALL.map(&mut f))
    }

    /// Iterate over `(role, value)` pairs in role order
    pub fn iter(&self) -> impl Iterator<Item = (Role, &T)> {
        Role::ALL.iter().copied().zip(self.0.iter())
    }
}

impl<T> Index<Role> for PerRole<T> {
    type Output = T;
    fn index(&self, role: Role) -> &T {
        &self.0[role.index()]
    }
}

impl<T> IndexMut<Role> for PerRole<T> {
    fn index_mut(&mut self, role: Role) -> &mut T {
        &mut self.0[role.index()]
    }
}

// Test role order and indexing
#[test]
fn test_role_order() {
    let per_role = PerRole::from_fn(|role| role.index());
    for (i, role) in Role::ALL.into_iter().enumerate() {
        assert_eq!(role.index(), i);
        assert_eq!(per_role[role], i);
    }
    assert_eq!(Role::J.to_string(), "J");
}
