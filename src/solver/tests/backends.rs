//! End-to-end scenarios exercised against every backend: the threaded and
//! fabric-based drivers must agree with the sequential driver on solution
//! length, and every returned path must actually solve the input.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use cube::{Cube, Move};
use fabric::{Fabric, FabricHost};
use solver::{
    ClusterSolver, HybridSolver, SequentialSolver, SolveOptions, SolveReport, Solver,
    ThreadedSolver,
};

/// Build one solver of every kind against a freshly hosted three-rank
/// fabric, run the test, then shut the worker peers down.
fn with_all_backends<T>(test: impl FnOnce(&[Solver]) -> T) -> T {
    let host = FabricHost::bind(3).unwrap();
    let addr = host.addr().unwrap();
    let workers: Vec<_> = (1..3)
        .map(|rank| {
            thread::spawn(move || {
                solver::serve(Fabric::join(addr, rank, 3).unwrap(), 2);
            })
        })
        .collect();
    let fabric = Arc::new(Mutex::new(host.accept().unwrap()));

    let backends = [
        Solver::Sequential(SequentialSolver::new()),
        Solver::Threaded(ThreadedSolver::new(4)),
        Solver::Cluster(ClusterSolver::new(Arc::clone(&fabric))),
        Solver::Hybrid(HybridSolver::new(Arc::clone(&fabric), 2)),
    ];
    let result = test(&backends);

    drop(backends);
    solver::shutdown_peers(&fabric);
    for worker in workers {
        worker.join().unwrap();
    }
    result
}

fn scrambled(moves: &[Move]) -> Cube {
    let mut cube = Cube::solved();
    cube.apply_all(moves);
    cube
}

fn solve_all(backends: &[Solver], cube: &Cube, options: &SolveOptions) -> Vec<SolveReport> {
    backends
        .iter()
        .map(|backend| {
            backend
                .solve(cube, options)
                .unwrap_or_else(|err| panic!("{} backend failed: {err}", backend.kind()))
        })
        .collect()
}

#[test_log::test]
fn every_backend_inverts_a_single_turn() {
    with_all_backends(|backends| {
        let cube = scrambled(&[Move::U]);
        for report in solve_all(backends, &cube, &SolveOptions::default()) {
            assert_eq!(report.solution, Some(vec![Move::UPrime]));
        }
    });
}

#[test_log::test]
fn every_backend_returns_the_empty_path_on_solved_input() {
    with_all_backends(|backends| {
        for report in solve_all(backends, &Cube::solved(), &SolveOptions::default()) {
            assert_eq!(report.solution, Some(Vec::new()));
            assert!(!report.timed_out);
        }
    });
}

#[test_log::test]
fn every_backend_solves_a_two_turn_scramble_optimally() {
    with_all_backends(|backends| {
        let cube = scrambled(&[Move::R, Move::U]);
        for (backend, report) in backends
            .iter()
            .zip(solve_all(backends, &cube, &SolveOptions::default()))
        {
            let path = report.solution.expect("solvable at depth two");
            assert_eq!(path.len(), 2, "{} found {path:?}", backend.kind());
            let mut check = cube.clone();
            check.apply_all(&path);
            assert!(check.is_solved());
        }
    });
}

#[test_log::test]
fn every_backend_unwinds_a_commutator() {
    with_all_backends(|backends| {
        let cube = scrambled(&[Move::R, Move::U, Move::RPrime, Move::UPrime]);
        let options = SolveOptions {
            max_depth: 12,
            ..SolveOptions::default()
        };
        let lengths: Vec<usize> = backends
            .iter()
            .zip(solve_all(backends, &cube, &options))
            .map(|(backend, report)| {
                let path = report.solution.expect("solvable well within depth 12");
                let mut check = cube.clone();
                check.apply_all(&path);
                assert!(check.is_solved(), "{} path does not solve", backend.kind());
                path.len()
            })
            .collect();
        assert!(
            lengths.windows(2).all(|pair| pair[0] == pair[1]),
            "backends disagree on optimal length: {lengths:?}"
        );
    });
}

#[test_log::test]
fn backends_agree_on_a_five_turn_scramble() {
    with_all_backends(|backends| {
        let cube = scrambled(&[Move::R, Move::U, Move::FPrime, Move::D, Move::L]);
        let lengths: Vec<usize> = backends
            .iter()
            .zip(solve_all(backends, &cube, &SolveOptions::default()))
            .map(|(backend, report)| {
                let path = report.solution.expect("five-turn scramble is solvable");
                let mut check = cube.clone();
                check.apply_all(&path);
                assert!(check.is_solved(), "{} path does not solve", backend.kind());
                path.len()
            })
            .collect();
        assert!(
            lengths.windows(2).all(|pair| pair[0] == pair[1]),
            "backends disagree on optimal length: {lengths:?}"
        );
        assert!(lengths[0] <= 5);
    });
}

#[test_log::test]
fn unreachable_state_exhausts_the_depth_bound() {
    // A single flipped edge cannot be produced by face turns, so the
    // search must run out of bounds rather than find a path.
    let mut state: Vec<char> = Cube::solved().serialize().chars().collect();
    let (up_edge, front_edge) = (7, 2 * 9 + 1);
    state.swap(up_edge, front_edge);
    let cube = Cube::deserialize(&state.iter().collect::<String>()).unwrap();

    let report = SequentialSolver::new().solve(
        &cube,
        &SolveOptions {
            max_depth: 4,
            budget: Duration::from_secs(30),
        },
    );
    assert_eq!(report.solution, None);
    assert!(report.nodes > 0);
    assert!(report.elapsed > Duration::ZERO);
}

#[test_log::test]
fn repeated_threaded_solves_are_stable_across_widths() {
    let cube = scrambled(&[Move::F, Move::U, Move::L]);
    let mut lengths = Vec::new();
    for threads in [1, 2, 4, 8] {
        for _ in 0..2 {
            let report = ThreadedSolver::new(threads).solve(&cube, &SolveOptions::default());
            lengths.push(report.solution.expect("solvable").len());
        }
    }
    assert!(lengths.windows(2).all(|pair| pair[0] == pair[1]));
}
