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

//! Error type shared by topology setup, map construction, and reduction.

use crate::Role;
use std::collections::TryReserveError;
use thiserror::Error;

/// Errors raised during setup or reduction.
///
/// All variants are fatal for the current call and are raised before any
/// write to the shared force buffer, so a failed call leaves the buffer
/// untouched.
#[derive(Debug, Error)]
pub enum Error {
    /// A particle is referenced by more terms in one role than the
    /// provisioned number of inverse-map levels can hold. Detected when the
    /// map is built; re-provision the budget and rebuild.
    #[error("role {role} needs {required} inverse-map levels but only {provisioned} are provisioned")]
    LevelOverflow {
        role: Role,
        required: usize,
        provisioned: usize,
    },

    /// A term references a particle id outside the topology
    #[error("term {term} references particle {particle}, but the topology holds {particle_count} particles")]
    ParticleOutOfRange {
        term: usize,
        particle: usize,
        particle_count: usize,
    },

    /// A caller-supplied buffer is too short to cover every particle
    #[error("buffer holds {len} entries which cannot cover {particle_count} particles")]
    ShortBuffer { len: usize, particle_count: usize },

    /// Allocation of an internal buffer failed
    #[error("failed to allocate accumulation buffers: {0}")]
    Allocation(#[from] TryReserveError),
}
