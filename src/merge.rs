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

//! Duplicate-lane merge for the pairwise interaction path.
//!
//! Pairwise (neighbor-list style) interactions have a regular, tiled access
//! pattern, so instead of a sparse inverse map the evaluator spreads its
//! writes over D duplicated partial-force lanes, trading D× memory for
//! branch-free conflict-free parallel writes. The compensating reduction is
//! a particle-wise sum of the lanes into the shared force buffer.

use crate::{Error, Vector3, LANE_WIDTH};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// D duplicated partial-force lanes of equal, padded width.
///
/// Lane width is at least the particle count; entries past the particle
/// count are padding and stay zero. With a duplication factor of 1 the merge
/// is an exact pass-through.
///
/// ## Examples
/// ~~~
/// use forcegather::{DuplicateBuffers, Vector3};
/// let mut partials = DuplicateBuffers::new(2, 3).unwrap();
/// partials.lane_mut(0)[1] = Vector3::new(1.0, 0.0, 0.0);
/// partials.lane_mut(1)[1] = Vector3::new(0.0, 1.0, 0.0);
///
/// let mut forces = vec![Vector3::zeros(); 3];
/// partials.merge_into(&mut forces).unwrap();
/// assert_eq!(forces[1], Vector3::new(1.0, 1.0, 0.0));
/// ~~~
#[derive(Clone, Debug, PartialEq)]
pub struct DuplicateBuffers {
    lanes: Vec<Vec<Vector3>>,
    particle_count: usize,
}

impl DuplicateBuffers {
    /// Duplication factor used by the pairwise path when none is configured
    pub const DEFAULT_DUPLICATION: usize = 4;

    /// Allocate `duplication` zeroed lanes covering `particle_count`
    /// particles, padded to a [`LANE_WIDTH`] multiple.
    pub fn new(duplication: usize, particle_count: usize) -> Result<Self, Error> {
        let width = particle_count.max(1).next_multiple_of(LANE_WIDTH);
        Self::with_width(duplication, particle_count, width)
    }

    /// Allocate lanes of an explicit `width`, which must cover every
    /// particle. Useful when the evaluator tiles its output to a stream
    /// width of its own.
    pub fn with_width(
        duplication: usize,
        particle_count: usize,
        width: usize,
    ) -> Result<Self, Error> {
        assert!(duplication >= 1, "at least one duplicate lane is required");
        if width < particle_count {
            return Err(Error::ShortBuffer {
                len: width,
                particle_count,
            });
        }
        let mut lanes = Vec::new();
        lanes.try_reserve_exact(duplication)?;
        for _ in 0..duplication {
            let mut lane: Vec<Vector3> = Vec::new();
            lane.try_reserve_exact(width)?;
            lane.resize(width, Vector3::zeros());
            lanes.push(lane);
        }
        Ok(Self {
            lanes,
            particle_count,
        })
    }

    /// Number of duplicate lanes, D
    pub fn duplication(&self) -> usize {
        self.lanes.len()
    }

    /// Padded lane width; at least the particle count
    pub fn width(&self) -> usize {
        self.lanes[0].len()
    }

    pub fn particle_count(&self) -> usize {
        self.particle_count
    }

    pub fn lane(&self, lane: usize) -> &[Vector3] {
        &self.lanes[lane]
    }

    /// Mutable view of one lane for the evaluator to write into
    pub fn lane_mut(&mut self, lane: usize) -> &mut [Vector3] {
        &mut self.lanes[lane]
    }

    /// Reset every lane to zero, keeping the allocation
    pub fn clear(&mut self) {
        for lane in &mut self.lanes {
            lane.fill(Vector3::zeros());
        }
    }

    /// Sum of all lane entries within the particle range
    pub fn total(&self) -> Vector3 {
        self.lanes
            .iter()
            .flat_map(|lane| &lane[..self.particle_count])
            .sum()
    }

    /// Add the particle-wise sum over the lanes into `forces`.
    ///
    /// Lanes are summed in ascending order for every particle, so the result
    /// is reproducible and, with a single lane, bitwise equal to adding that
    /// lane directly. Padding entries are ignored. On error, nothing has
    /// been written.
    pub fn merge_into(&self, forces: &mut [Vector3]) -> Result<(), Error> {
        if forces.len() < self.particle_count {
            return Err(Error::ShortBuffer {
                len: forces.len(),
                particle_count: self.particle_count,
            });
        }
        let forces = &mut forces[..self.particle_count];

        #[cfg(feature = "parallel")]
        forces.par_iter_mut().enumerate().for_each(|(particle, force)| {
            *force += self.lane_sum(particle);
        });

        #[cfg(not(feature = "parallel"))]
        for (particle, force) in forces.iter_mut().enumerate() {
            *force += self.lane_sum(particle);
        }

        Ok(())
    }

    /// Sum over the duplicate lanes for one particle, in lane order
    fn lane_sum(&self, particle: usize) -> Vector3 {
        let mut sum = self.lanes[0][particle];
        for lane in &self.lanes[1..] {
            sum += lane[particle];
        }
        sum
    }
}
