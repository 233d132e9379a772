extern crate nyx_collocation as nyx;

use crate::{linear_guess, DoubleIntegrator, MinimumEffort};
use approx::assert_abs_diff_eq;
use nyx::{Iterate, Problem, Solver, Var};
use rstest::*;

fn solver<'a>(problem: &'a dyn Problem, scheme: &str, num_mesh_intervals: usize) -> Solver<'a> {
    let mut solver = Solver::new(problem);
    solver.set_transcription_scheme(scheme).unwrap();
    solver.set_num_mesh_intervals(num_mesh_intervals).unwrap();
    solver.set_parallelism("serial", 1).unwrap();
    solver
}

#[rstest]
#[case("trapezoidal")]
#[case("hermite-simpson")]
#[case("legendre-gauss-3")]
#[case("legendre-gauss-radau-3")]
fn single_integrator(#[case] scheme: &str) {
    let _ = pretty_env_logger::try_init();

    let problem = MinimumEffort::new();
    let solver = solver(&problem, scheme, 5);
    let guess = linear_guess(problem.description(), 1.0, &[0.0], &[1.0]);
    let solution = solver.solve(&guess).unwrap();
    println!("{scheme}: {solution}");

    assert!(solution.success, "{}", solution.status);
    assert!(solution.num_iterations < 20);
    assert_abs_diff_eq!(solution.objective, 1.0, epsilon = 1e-5);
    assert_eq!(solution.objective_breakdown.len(), 1);
    assert_eq!(solution.objective_breakdown[0].0, "effort");
    assert_abs_diff_eq!(solution.objective_breakdown[0].1, solution.objective, epsilon = 1e-12);

    let iterate = &solution.iterate;
    assert_eq!(iterate.num_times(), solver.create_transcription().unwrap().num_grid_points());
    assert_eq!(iterate.iteration, Some(solution.num_iterations));
    for (i, t) in iterate.times.iter().enumerate() {
        assert_abs_diff_eq!(iterate.variables[Var::States][(0, i)], *t, epsilon = 1e-5);
        assert_abs_diff_eq!(iterate.variables[Var::Controls][(0, i)], 1.0, epsilon = 1e-4);
    }
    assert!(solution.constraints.defects.amax() < 1e-6);
}

#[test]
fn double_integrator_trapezoidal() {
    let _ = pretty_env_logger::try_init();

    let problem = DoubleIntegrator::new();
    let solver = solver(&problem, "trapezoidal", 10);
    let guess = linear_guess(problem.description(), 1.0, &[0.0, 0.0], &[1.0, 0.0]);
    let solution = solver.solve(&guess).unwrap();
    assert!(solution.success, "{}", solution.status);

    // Optimum of the discretized problem, which converges to 12 as the mesh is refined
    assert_abs_diff_eq!(solution.objective, 12.461059, epsilon = 1e-4);
    let force = &solution.iterate.variables[Var::Controls];
    assert_abs_diff_eq!(force[(0, 0)], 5.607477, epsilon = 1e-3);
    assert_abs_diff_eq!(force[(0, 5)], 0.0, epsilon = 1e-4);
    assert_abs_diff_eq!(force[(0, 10)], -5.607477, epsilon = 1e-3);
    let states = &solution.iterate.variables[Var::States];
    assert_abs_diff_eq!(states[(0, 10)], 1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(states[(1, 5)], 1.526480, epsilon = 1e-3);
}

#[test]
fn double_integrator_hermite_simpson() {
    let _ = pretty_env_logger::try_init();

    let problem = DoubleIntegrator::new();
    let mut solver = solver(&problem, "hermite-simpson", 5);
    solver.set_sparsity_detection("random").unwrap();
    solver.set_sparsity_detection_seed(2024);
    let guess = linear_guess(problem.description(), 1.0, &[0.0, 0.0], &[1.0, 0.0]);
    let solution = solver.solve(&guess).unwrap();
    assert!(solution.success, "{}", solution.status);

    // Hermite-Simpson is exact for the cubic optimal trajectory
    assert_abs_diff_eq!(solution.objective, 12.0, epsilon = 1e-4);
    let force = &solution.iterate.variables[Var::Controls];
    let states = &solution.iterate.variables[Var::States];
    for (i, t) in solution.iterate.times.iter().enumerate() {
        assert_abs_diff_eq!(force[(0, i)], 6.0 - 12.0 * t, epsilon = 1e-3);
        assert_abs_diff_eq!(states[(0, i)], 3.0 * t * t - 2.0 * t.powi(3), epsilon = 1e-4);
    }
}

#[test]
fn double_integrator_implicit() {
    let _ = pretty_env_logger::try_init();

    let problem = DoubleIntegrator::implicit();
    let solver = solver(&problem, "hermite-simpson", 5);
    let guess = linear_guess(problem.description(), 1.0, &[0.0, 0.0], &[1.0, 0.0]);
    let solution = solver.solve(&guess).unwrap();
    assert!(solution.success, "{}", solution.status);

    assert_abs_diff_eq!(solution.objective, 12.0, epsilon = 1e-4);
    let accel = &solution.iterate.variables[Var::Derivatives];
    let force = &solution.iterate.variables[Var::Controls];
    assert_eq!(accel.ncols(), 11);
    for (a, f) in accel.iter().zip(force.iter()) {
        assert_abs_diff_eq!(*a, *f, epsilon = 1e-6);
    }
    assert!(solution.constraints.multibody_residuals.amax() < 1e-6);
}

#[test]
fn warm_start_from_csv() {
    let _ = pretty_env_logger::try_init();

    let problem = MinimumEffort::new();
    let coarse = solver(&problem, "trapezoidal", 4);
    let guess = linear_guess(problem.description(), 1.0, &[0.0], &[1.0]);
    let solution = coarse.solve(&guess).unwrap();
    assert!(solution.success);

    let path = std::env::temp_dir().join("nyx_collocation_min_effort.csv");
    solution.iterate.to_csv(&path).unwrap();
    let read = Iterate::from_csv(&path).unwrap();
    assert_eq!(read.times, solution.iterate.times);
    assert_eq!(read.state_names, vec!["x"]);
    assert_eq!(read.control_names, vec!["u"]);
    for var in [Var::States, Var::Controls] {
        assert_eq!(read.variables[var], solution.iterate.variables[var]);
    }

    // The coarse solution is resampled onto the finer grid and is already optimal there
    let fine = solver(&problem, "hermite-simpson", 8);
    let refined = fine.solve(&read).unwrap();
    assert!(refined.success);
    assert!(refined.num_iterations < 4, "{} iterations", refined.num_iterations);
    assert_abs_diff_eq!(refined.objective, 1.0, epsilon = 1e-5);
    let _ = std::fs::remove_file(path);
}

#[test]
fn solution_report() {
    let problem = MinimumEffort::new();
    let solver = solver(&problem, "hermite-simpson", 3);
    let transcription = solver.create_transcription().unwrap();
    let guess = linear_guess(problem.description(), 1.0, &[0.0], &[1.0]);
    let solution = transcription.solve(&guess, &[]).unwrap();
    assert!(solution.success);

    let mut report = Vec::new();
    transcription
        .write_constraint_values(&solution, &mut report)
        .unwrap();
    let report = String::from_utf8(report).unwrap();
    println!("{report}");
    assert!(report.contains("defects"));
    assert!(report.contains("interp_controls"));
    // Both defects of the state are labeled with its name
    assert_eq!(report.lines().filter(|l| l.trim_start().starts_with("x ")).count(), 2);

    let mut breakdown = String::new();
    solution.write_objective_breakdown(&mut breakdown).unwrap();
    assert!(breakdown.contains("effort: "));
    assert!(breakdown.contains("total: "));
}
