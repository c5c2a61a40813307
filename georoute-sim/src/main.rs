// Snowcap: Synthesizing Network-Wide Configuration Updates
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

#![deny(missing_docs)]

//! An in-process discrete-event simulator driving `georoute_core::Protocol`
//! instances over a god-oracle location service and a fixed-position
//! mobility model. Lets the testable scenarios from the protocol's design
//! notes be run and inspected from the command line, and doubles as a
//! worked example of the `HostStack`/`LocationService`/`Mobility` contract
//! a real network stack would implement.

mod sim;

use clap::{Parser, Subcommand, ValueEnum};
use georoute_core::types::{NodeId, Position};
use georoute_core::NodeConfig;
use log::info;
use rand::prelude::*;
use sim::Simulator;
use std::collections::BTreeMap;
use std::error::Error;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "georoute-sim", author, about = "Position-based ad-hoc routing simulator")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one of the canned topologies exercising a specific routing behavior
    Scenario {
        #[arg(value_enum)]
        name: ScenarioName,
    },
    /// Scatter a random topology and route one packet end to end
    Random {
        /// Number of nodes
        #[arg(short, long, default_value_t = 20)]
        nodes: usize,
        /// Hello radio range, meters
        #[arg(short, long, default_value_t = 120.0)]
        radio_range: f64,
        /// Side length of the square deployment area, meters
        #[arg(short = 'a', long, default_value_t = 500.0)]
        area: f64,
        /// Random seed, for reproducible topologies
        #[arg(short, long, default_value_t = 42)]
        seed: u64,
    },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ScenarioName {
    /// Greedy chain: A -> B -> C -> D, mode stays GREEDY throughout
    S1,
    /// Perimeter entry around a communication hole
    S2,
    /// Perimeter entry followed by exit back to greedy once progress resumes
    S3,
    /// Neighbor entries purged once entryLifetime elapses
    S4,
    /// Deferred queue reports queue-timeout once queueTimeout elapses
    S5,
    /// Electrostatic repulsion steers around a hole that greedy routes through
    S6,
}

fn main() -> Result<(), Box<dyn Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    match cli.cmd {
        Command::Scenario { name } => run_scenario(name),
        Command::Random { nodes, radio_range, area, seed } => run_random(nodes, radio_range, area, seed),
    }

    Ok(())
}

fn run_scenario(name: ScenarioName) {
    match name {
        ScenarioName::S1 => scenario_s1(),
        ScenarioName::S2 | ScenarioName::S3 => scenario_s2_s3(),
        ScenarioName::S4 => scenario_s4(),
        ScenarioName::S5 => scenario_s5(),
        ScenarioName::S6 => scenario_s6(),
    }
}

/// S1 — greedy success: A=(0,0), B=(50,0), C=(100,0), D=(150,0). Hello
/// range is kept at 60m so each node hears only its immediate 50m
/// neighbor rather than skipping ahead to a farther one greedy would
/// otherwise prefer (`greedyBest` always picks the closest-to-`dst`
/// neighbor it knows about, not just the nearest hop).
fn scenario_s1() {
    let positions = btreemap_positions(&[(1, 0.0, 0.0), (2, 50.0, 0.0), (3, 100.0, 0.0), (4, 150.0, 0.0)]);
    let mut sim = Simulator::new(positions, 60.0, NodeConfig::default());
    sim.exchange_hellos();
    let outcome = sim.send(NodeId(1), NodeId(4), vec![0xAA]);
    info!("S1: path = {:?}, delivered = {}", outcome.path, outcome.delivered);
    assert_eq!(outcome.path, vec![NodeId(1), NodeId(2), NodeId(3), NodeId(4)]);
    assert!(outcome.delivered);
}

/// S2 — perimeter entry: A=(0,0) has only neighbor B=(0,50); D=(1000,0)
/// is out of range of both, so greedy fails at A and the packet enters
/// perimeter mode with `prevHop = A`.
///
/// S3 — perimeter exit: continuing from B with `perimeterEntryDistance
/// = 1000`, a later node E=(500,0) finds itself closer to D (500) than
/// that entry distance, so forwarding clears the perimeter flag and
/// reverts to greedy. Demonstrated directly against the forwarding
/// engine, since constructing a topology that actually reaches such a
/// node through the simulator's face traversal isn't guaranteed to
/// terminate in a 2-3 node test graph (see `Simulator::MAX_HOPS`).
fn scenario_s2_s3() {
    let positions = btreemap_positions(&[(1, 0.0, 0.0), (2, 0.0, 50.0)]);
    let mut sim = Simulator::new(positions, 100.0, NodeConfig::default());
    sim.exchange_hellos();
    let (next_hop, header) = sim.first_hop(NodeId(1), Position::new_2d(1000.0, 0.0), vec![0xBB]).unwrap();
    info!("S2: next hop from A = {:?}, in perimeter mode = {}", next_hop, header.in_perimeter_mode());
    assert_eq!(next_hop, NodeId(2));
    assert_eq!(header.perimeter_entry_distance, Some(1000.0));

    use georoute_core::forwarding::{decide_next_hop, PacketMode};
    use georoute_core::position_table::PositionTable;
    use georoute_core::types::Time;

    let mut table = PositionTable::new(Duration::from_secs(10));
    table.add_or_update(NodeId(9), Position::new_2d(600.0, 0.0), Time(0.0));
    let mut mode = PacketMode::Perimeter { entry_distance: 1000.0, prev_hop_pos: Position::new_2d(0.0, 50.0) };
    let next = decide_next_hop(
        &mut mode,
        &mut table,
        &NodeConfig::default(),
        Position::new_2d(500.0, 0.0),
        Position::new_2d(1000.0, 0.0),
        Time(0.0),
    );
    info!("S3: at E=(500,0), mode after dispatch = {:?}, next hop = {:?}", mode, next);
    assert_eq!(mode, PacketMode::Greedy);
}

/// S4 — a neighbor learned via Hello is purged once `entryLifetime`
/// elapses without a refresh. Purging happens at the start of every
/// table query, so this is observed through a forwarding decision
/// rather than a raw table peek.
fn scenario_s4() {
    let positions = btreemap_positions(&[(1, 0.0, 0.0), (2, 50.0, 0.0)]);
    let cfg = NodeConfig { entry_lifetime: Duration::from_secs(1), ..NodeConfig::default() };
    let mut sim = Simulator::new(positions, 100.0, cfg);
    sim.fire_hello(NodeId(2));

    sim.advance(Duration::from_millis(900));
    let hop_before = sim.first_hop(NodeId(1), Position::new_2d(150.0, 0.0), vec![1]).map(|(h, _)| h);
    info!("S4: next hop at t=0.9s = {:?}", hop_before);
    assert_eq!(hop_before, Some(NodeId(2)));

    sim.advance(Duration::from_millis(200));
    let hop_after = sim.first_hop(NodeId(1), Position::new_2d(150.0, 0.0), vec![2]).map(|(h, _)| h);
    info!("S4: next hop at t=1.1s = {:?}", hop_after);
    assert_eq!(hop_after, None);
}

/// S5 — the deferred queue reports `queue-timeout` for every entry that
/// outlives `queueTimeout`, purging them before admitting a new one.
fn scenario_s5() {
    let positions = btreemap_positions(&[(1, 0.0, 0.0)]);
    let cfg = NodeConfig {
        max_queue_len: 4,
        queue_timeout: Duration::from_secs(2),
        ..NodeConfig::default()
    };
    let mut sim = Simulator::new(positions, 100.0, cfg);
    for i in 0..4 {
        sim.send_to_position(NodeId(1), Position::new_2d(1000.0 + i as f64, 0.0), vec![i as u8]);
    }
    assert_eq!(sim.queue_len(NodeId(1)), 4);
    sim.advance(Duration::from_millis(2500));
    let outcome = sim.send_to_position(NodeId(1), Position::new_2d(2000.0, 0.0), vec![9]);
    info!("S5: timeouts reported = {}, queue length after = {}", outcome.timeouts_reported, sim.queue_len(NodeId(1)));
    assert_eq!(outcome.timeouts_reported, 4);
    assert_eq!(sim.queue_len(NodeId(1)), 1);
}

/// S6 — with a communication hole between `self` and `dst`, plain
/// greedy routes straight through it while electrostatic repulsion
/// steers around it.
fn scenario_s6() {
    let dst = Position::new_2d(0.0, 6500.0);
    let positions = btreemap_positions(&[(1, 0.0, 0.0), (2, 0.0, 100.0), (3, 2000.0, 100.0)]);

    let greedy_cfg = NodeConfig { repulsion_mode_enabled: false, ..NodeConfig::default() };
    let mut greedy = Simulator::new(positions.clone(), 2500.0, greedy_cfg);
    greedy.exchange_hellos();
    let (greedy_pick, _) = greedy.first_hop(NodeId(1), dst, vec![1]).unwrap();

    let repulsion_cfg = NodeConfig {
        repulsion_mode_enabled: true,
        hole_center: Position::new_2d(0.0, 3250.0),
        hole_radius: 2.0f64.sqrt() * 2000.0,
        ..NodeConfig::default()
    };
    let mut repulsion = Simulator::new(positions, 2500.0, repulsion_cfg);
    repulsion.exchange_hellos();
    let (repulsion_pick, _) = repulsion.first_hop(NodeId(1), dst, vec![1]).unwrap();

    info!("S6: greedy picks {:?}, electrostatic picks {:?}", greedy_pick, repulsion_pick);
    assert_eq!(greedy_pick, NodeId(2));
    assert_eq!(repulsion_pick, NodeId(3));
}

fn run_random(nodes: usize, radio_range: f64, area: f64, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut positions = BTreeMap::new();
    for i in 1..=nodes as u32 {
        let x = rng.gen_range(0.0, area);
        let y = rng.gen_range(0.0, area);
        positions.insert(NodeId(i), Position::new_2d(x, y));
    }

    let mut sim = Simulator::new(positions, radio_range, NodeConfig::default());
    sim.exchange_hellos();

    let src = NodeId(1);
    let dst = NodeId(nodes as u32);
    let dst_pos = sim.position_of(dst);
    let outcome = sim.send_to_position(src, dst_pos, vec![0; 16]);

    info!(
        "random topology: {} nodes, range {}m, seed {} -> path {:?} (delivered: {})",
        nodes, radio_range, seed, outcome.path, outcome.delivered
    );
}

fn btreemap_positions(points: &[(u32, f64, f64)]) -> BTreeMap<NodeId, Position> {
    points.iter().map(|&(id, x, y)| (NodeId(id), Position::new_2d(x, y))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_greedy_chain_delivers() {
        scenario_s1();
    }

    #[test]
    fn s2_s3_perimeter_entry_and_exit() {
        scenario_s2_s3();
    }

    #[test]
    fn s4_hello_purge_matches_scenario() {
        scenario_s4();
    }

    #[test]
    fn s5_queue_timeout_matches_scenario() {
        scenario_s5();
    }

    #[test]
    fn s6_electrostatic_steers_around_hole() {
        scenario_s6();
    }
}
