extern crate nyx_collocation as nyx;

use crate::{linear_guess, MinimumEffort};
use approx::assert_abs_diff_eq;
use nyx::solver::{Parallelism, SparsityDetection};
use nyx::{CollocationError, Problem, Scheme, Solver, Var};
use rstest::*;
use std::fs;

#[test]
fn solver_from_yaml() {
    let problem = MinimumEffort::new();
    let dir = std::env::temp_dir();

    let path = dir.join("nyx_collocation_solver.yaml");
    fs::write(
        &path,
        "transcription_scheme: hermite-simpson\nnum_mesh_intervals: 7\nparallelism: serial\noutput_interval: 2\n",
    )
    .unwrap();
    let solver = Solver::from_yaml(&problem, &path).unwrap();
    assert_eq!(solver.config().transcription_scheme, Scheme::HermiteSimpson);
    assert_eq!(solver.config().num_mesh_intervals, 7);
    assert_eq!(solver.config().parallelism, Parallelism::Serial);
    assert_eq!(solver.config().output_interval, 2);
    assert_eq!(solver.config().sparsity_detection, SparsityDetection::None);
    assert_eq!(solver.create_transcription().unwrap().num_grid_points(), 15);

    // Parsed, but rejected by the validation of the settings
    let invalid = dir.join("nyx_collocation_solver_invalid.yaml");
    fs::write(&invalid, "num_threads: 0\n").unwrap();
    assert!(Solver::from_yaml(&problem, &invalid).err().unwrap().is_config());

    match Solver::from_yaml(&problem, dir.join("nyx_collocation_missing.yaml")) {
        Err(CollocationError::Configuration { .. }) => {}
        other => panic!("expected a configuration error, got {:?}", other.err()),
    }

    let _ = fs::remove_file(path);
    let _ = fs::remove_file(invalid);
}

#[rstest]
#[case("none")]
#[case("random")]
#[case("initial-guess")]
fn sparsity_detection(#[case] detection: &str) {
    let problem = MinimumEffort::new();
    let mut solver = Solver::new(&problem);
    solver.set_transcription_scheme("hermite-simpson").unwrap();
    solver.set_num_mesh_intervals(4).unwrap();
    solver.set_parallelism("serial", 1).unwrap();
    solver.set_sparsity_detection(detection).unwrap();
    solver.set_sparsity_detection_random_count(2).unwrap();

    let guess = linear_guess(problem.description(), 1.0, &[0.0], &[1.0]);
    let solution = solver.solve(&guess).unwrap();
    assert!(solution.success, "{detection}: {}", solution.status);
    assert_abs_diff_eq!(solution.objective, 1.0, epsilon = 1e-5);
    for u in solution.iterate.variables[Var::Controls].iter() {
        assert_abs_diff_eq!(*u, 1.0, epsilon = 1e-4);
    }
}

#[test]
fn thread_pool_matches_serial() {
    let problem = MinimumEffort::new();
    let guess = linear_guess(problem.description(), 1.0, &[0.0], &[1.0]);

    let mut solutions = Vec::new();
    for (mode, num_threads) in [("serial", 1), ("thread", 3)] {
        let mut solver = Solver::new(&problem);
        solver.set_transcription_scheme("legendre-gauss-radau-2").unwrap();
        solver.set_num_mesh_intervals(4).unwrap();
        solver.set_parallelism(mode, num_threads).unwrap();
        solutions.push(solver.solve(&guess).unwrap());
    }
    let (serial, threaded) = (&solutions[0], &solutions[1]);
    assert!(serial.success && threaded.success);
    assert_eq!(serial.num_iterations, threaded.num_iterations);
    assert_abs_diff_eq!(serial.objective, threaded.objective, epsilon = 1e-12);
    for var in [Var::States, Var::Controls] {
        let (a, b) = (
            &serial.iterate.variables[var],
            &threaded.iterate.variables[var],
        );
        assert_eq!(a.shape(), b.shape());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-12);
        }
    }
}

#[test]
fn output_interval() {
    let problem = MinimumEffort::new();
    let mut solver = Solver::new(&problem);
    solver.set_transcription_scheme("trapezoidal").unwrap();
    solver.set_num_mesh_intervals(6).unwrap();
    solver.set_parallelism("serial", 1).unwrap();
    solver.set_output_interval(2);

    let guess = linear_guess(problem.description(), 1.0, &[0.0], &[1.0]);
    let solution = solver.solve(&guess).unwrap();
    assert!(solution.success);

    let seen = problem.seen.lock().unwrap();
    // One callback per iteration, including the one which detects convergence
    assert_eq!(seen.len(), solution.num_iterations + 1);
    for (iteration, received) in seen.iter().enumerate() {
        if iteration % 2 == 0 {
            assert_eq!(*received, Some(iteration));
        } else {
            assert_eq!(*received, None);
        }
    }
}

#[test]
fn callback_aborts_solve() {
    let mut problem = MinimumEffort::new();
    problem.abort_after = Some(2);
    let mut solver = Solver::new(&problem);
    solver.set_num_mesh_intervals(6).unwrap();
    solver.set_parallelism("serial", 1).unwrap();

    let guess = linear_guess(problem.description(), 1.0, &[0.0], &[1.0]);
    match solver.solve(&guess) {
        Err(CollocationError::Aborted { iteration, source }) => {
            assert_eq!(iteration, 1);
            assert!(matches!(*source, CollocationError::Callback { .. }));
        }
        other => panic!("expected the solve to be aborted, got {other:?}"),
    }
    assert_eq!(problem.seen.lock().unwrap().len(), 2);
}

#[test]
fn failed_solve_returns_solution() {
    let problem = MinimumEffort::new();
    let mut solver = Solver::new(&problem);
    solver.set_num_mesh_intervals(6).unwrap();
    solver.set_parallelism("serial", 1).unwrap();
    solver.set_optim_max_iterations(1);

    let guess = linear_guess(problem.description(), 1.0, &[0.0], &[1.0]);
    let solution = solver.solve(&guess).unwrap();
    assert!(!solution.success);
    assert_eq!(solution.num_iterations, 1);
    assert_eq!(solution.status, "maximum number of iterations reached");
}

#[test]
fn guesses_from_solver() {
    let problem = MinimumEffort::new();
    let mut solver = Solver::new(&problem);
    solver.set_transcription_scheme("hermite-simpson").unwrap();
    solver.set_num_mesh_intervals(3).unwrap();

    let guess = solver.create_initial_guess_from_bounds().unwrap();
    assert_eq!(guess.num_times(), 7);
    let states = &guess.variables[Var::States];
    assert_eq!(states[(0, 0)], 0.0);
    assert_eq!(states[(0, 3)], -10.0);
    assert_eq!(states[(0, 6)], 1.0);

    let random = solver.create_random_iterate_within_bounds(1).unwrap();
    assert_eq!(random, solver.create_random_iterate_within_bounds(1).unwrap());
    assert!(random.variables[Var::Controls].iter().all(|u| u.abs() <= 10.0));

    // Problem is used through a trait object
    let dynamic: &dyn Problem = solver.problem();
    assert_eq!(dynamic.description().num_states(), 1);
}
