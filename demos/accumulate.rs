//! Accumulate forces for a small closed system.
//!
//! A pair interaction between particles 0 and 1 is routed through the
//! duplicate-merge path; an angle-like triplet over particles 1, 2 and 3
//! goes through the inverse-map gather path. The totals cancel.
//!
//! Run with: `cargo run --example accumulate`
//! (set `RUST_LOG=debug` to see the setup summary)

use anyhow::Result;
use forcegather::{ForceAccumulator, LevelBudget, Role, Term, Topology, Vector3};

fn main() -> Result<()> {
    env_logger::init();

    let mut topology = Topology::new(4);
    topology.push(Term::triplet(1, 2, 3))?;

    let mut accumulator = ForceAccumulator::new(&topology, LevelBudget::uniform(3), 1)?;

    // pairwise path: equal and opposite pull between particles 0 and 1
    accumulator.duplicates_mut().lane_mut(0)[0] = Vector3::new(2.0, 0.0, 0.0);
    accumulator.duplicates_mut().lane_mut(0)[1] = Vector3::new(-2.0, 0.0, 0.0);

    // gather path: bending forces on the triplet
    let contributions = accumulator.contributions_mut();
    contributions.set(0, Role::I, Vector3::new(0.0, 1.0, 0.0));
    contributions.set(0, Role::J, Vector3::new(0.0, -2.0, 0.0));
    contributions.set(0, Role::K, Vector3::new(0.0, 1.0, 0.0));

    let mut forces = vec![Vector3::zeros(); 4];
    accumulator.apply(&mut forces)?;

    for (particle, force) in forces.iter().enumerate() {
        println!(
            "particle {particle}: ({:8.3}, {:8.3}, {:8.3})",
            force.x, force.y, force.z
        );
    }
    let total: Vector3 = forces.iter().sum();
    println!("total: ({:.3}, {:.3}, {:.3})", total.x, total.y, total.z);

    Ok(())
}
