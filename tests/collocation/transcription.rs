extern crate nyx_collocation as nyx;

use crate::{ConstrainedPoint, DescriptionOnly, MinimumEffort};
use approx::assert_abs_diff_eq;
use nyx::linalg::DMatrix;
use nyx::nlp::{FiniteDifferenceScheme, NlpProblem, NlpSparsity};
use nyx::problem::{KinematicConstraintMethod, StateType};
use nyx::solver::Parallelism;
use nyx::{Bounds, CollocationError, ProblemDescription, Scheme, SolverConfig, Transcription, Var};
use rstest::*;

fn config(scheme: &str, num_mesh_intervals: usize) -> SolverConfig {
    SolverConfig::builder()
        .transcription_scheme(scheme.parse::<Scheme>().unwrap())
        .num_mesh_intervals(num_mesh_intervals)
        .parallelism(Parallelism::Serial)
        .build()
}

#[rstest]
#[case("trapezoidal", 4, 1, 5)]
#[case("hermite-simpson", 4, 2, 9)]
#[case("legendre-gauss-3", 2, 4, 9)]
#[case("legendre-gauss-radau-3", 2, 3, 7)]
fn grid_and_mesh_points(
    #[case] scheme: &str,
    #[case] num_mesh_intervals: usize,
    #[case] points_per_interval: usize,
    #[case] num_grid_points: usize,
) {
    let problem = MinimumEffort::new();
    let tx = Transcription::new(&problem, &config(scheme, num_mesh_intervals)).unwrap();

    assert_eq!(tx.num_points_per_interval(), points_per_interval);
    assert_eq!(tx.num_grid_points(), num_grid_points);

    let indices = tx.create_mesh_indices().unwrap();
    assert_eq!(indices.len(), num_grid_points);
    assert_eq!(indices.sum() as usize, num_mesh_intervals + 1);
    for (i, flag) in indices.iter().enumerate() {
        let expected = if i % points_per_interval == 0 { 1.0 } else { 0.0 };
        assert_eq!(*flag, expected, "grid point {i}");
    }
    assert_eq!(
        tx.mesh_interior_points().len(),
        num_grid_points - num_mesh_intervals - 1
    );

    // The grid spans the whole normalized time span and is increasing
    let grid = tx.grid();
    assert_eq!(grid[0], 0.0);
    assert_eq!(grid[num_grid_points - 1], 1.0);
    assert!(grid.as_slice().windows(2).all(|w| w[0] < w[1]));

    let times = tx.create_times(2.0, 6.0);
    assert_abs_diff_eq!(times[num_grid_points - 1], 6.0);
    assert_abs_diff_eq!(times[points_per_interval], 2.0 + 4.0 / num_mesh_intervals as f64);
}

#[rstest]
#[case("trapezoidal", 1)]
#[case("hermite-simpson", 3)]
#[case("legendre-gauss-3", 5)]
#[case("legendre-gauss-radau-3", 4)]
fn quadrature_exactness(#[case] scheme: &str, #[case] exact_degree: i32) {
    let problem = MinimumEffort::new();
    let cfg = SolverConfig::builder()
        .transcription_scheme(scheme.parse::<Scheme>().unwrap())
        .mesh(vec![0.0, 0.1, 0.45, 1.0])
        .build();
    let tx = Transcription::new(&problem, &cfg).unwrap();
    let weights = tx.create_quadrature_coefficients();
    let grid = tx.grid();
    for degree in 0..=exact_degree {
        let integral: f64 = weights
            .iter()
            .zip(grid.iter())
            .map(|(w, t)| w * t.powi(degree))
            .sum();
        assert_abs_diff_eq!(integral, 1.0 / f64::from(degree + 1), epsilon = 1e-12);
    }
}

#[test]
fn initial_guess_from_bounds() {
    let mut desc = ProblemDescription::new();
    desc.set_time_bounds(Bounds::fixed(0.0), Bounds::new(1.0, 2.0).unwrap());
    desc.add_state(
        "x",
        StateType::Auxiliary,
        Bounds::new(-1.0, 1.0).unwrap(),
        Bounds::unset(),
        Bounds::unset(),
    )
    .unwrap();
    desc.add_control(
        "u",
        Bounds::new(f64::NEG_INFINITY, 3.0).unwrap(),
        Bounds::unset(),
        Bounds::unset(),
    );
    desc.add_multiplier("lambda", Bounds::unset());
    desc.add_parameter("mass", Bounds::new(0.5, 2.0).unwrap());
    let problem = DescriptionOnly(desc);

    let tx = Transcription::new(&problem, &config("trapezoidal", 1)).unwrap();
    let guess = tx.create_initial_guess_from_bounds().unwrap();

    assert_eq!(guess.variables[Var::States], DMatrix::from_element(1, 2, -1.0));
    assert_eq!(guess.variables[Var::Controls], DMatrix::from_element(1, 2, 3.0));
    assert_eq!(guess.variables[Var::Multipliers], DMatrix::zeros(1, 2));
    assert_eq!(guess.variables[Var::Parameters], DMatrix::from_element(1, 1, 0.5));
    assert_eq!(guess.variables.shape(Var::Slacks), (0, 0));
    assert_eq!(guess.times.as_slice(), &[0.0, 1.0]);
    assert_eq!(guess.state_names, vec!["x"]);
    assert_eq!(guess.parameter_names, vec!["mass"]);
}

#[test]
fn random_iterate_is_reproducible() {
    let problem = MinimumEffort::new();
    let tx = Transcription::new(&problem, &config("hermite-simpson", 3)).unwrap();

    let first = tx.create_random_iterate_within_bounds(42).unwrap();
    let again = tx.create_random_iterate_within_bounds(42).unwrap();
    let other = tx.create_random_iterate_within_bounds(43).unwrap();
    assert_eq!(first, again);
    assert_ne!(first.variables, other.variables);

    let states = &first.variables[Var::States];
    // Initial and final states are fixed by their bounds
    assert_eq!(states[(0, 0)], 0.0);
    assert_eq!(states[(0, 6)], 1.0);
    let (lower, upper) = tx.variable_bounds();
    for var in [Var::States, Var::Controls] {
        let values = &first.variables[var];
        for (j, value) in values.iter().enumerate() {
            assert!(
                *value >= lower[var][j] && *value <= upper[var][j],
                "{var}[{j}] = {value} out of bounds"
            );
        }
    }
}

#[test]
fn scaling_from_bounds() {
    let mut desc = ProblemDescription::new();
    desc.set_time_bounds(Bounds::fixed(0.0), Bounds::new(1.0, 3.0).unwrap());
    desc.add_state(
        "x",
        StateType::Auxiliary,
        Bounds::new(2.0, 6.0).unwrap(),
        Bounds::fixed(3.0),
        Bounds::unset(),
    )
    .unwrap();
    desc.add_control("u", Bounds::unset(), Bounds::unset(), Bounds::unset());
    let problem = DescriptionOnly(desc);

    let mut cfg = config("trapezoidal", 1);
    cfg.scale_variables_using_bounds = true;
    let tx = Transcription::new(&problem, &cfg).unwrap();

    // Variables: t0, tf, x(0), x(1), u(0), u(1)
    let (scale, shift) = tx.scaling();
    assert_eq!(scale.as_slice(), &[1.0, 2.0, 1.0, 4.0, 1.0, 1.0]);
    assert_eq!(shift.as_slice(), &[0.0, 2.0, 3.0, 4.0, 0.0, 0.0]);

    let bounds = tx.bounds();
    assert_eq!(bounds.x_lower.as_slice()[..4], [0.0, -0.5, 0.0, -0.5]);
    assert_eq!(bounds.x_upper.as_slice()[..4], [0.0, 0.5, 0.0, 0.5]);
    assert_eq!(bounds.x_lower[4], f64::NEG_INFINITY);

    let guess = tx.create_random_iterate_within_bounds(3).unwrap();
    let variables = tx.variables_from_iterate(&guess).unwrap();
    let scaled = tx.scale_variables(&variables).unwrap();
    let unscaled = tx.unscale_variables(&scaled).unwrap();
    for var in [Var::FinalTime, Var::States, Var::Controls] {
        for (a, b) in unscaled[var].iter().zip(variables[var].iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-14);
        }
    }
}

#[test]
fn hessian_pattern_from_samples() {
    let problem = MinimumEffort::new();
    let tx = Transcription::new(&problem, &config("trapezoidal", 4)).unwrap();
    let guess = tx.create_random_iterate_within_bounds(7).unwrap();
    let mut variables = tx.variables_from_iterate(&guess).unwrap();
    let sample = tx.scale_variables(&variables).unwrap();

    let sparsity = NlpSparsity::detect(&tx, &[sample], FiniteDifferenceScheme::Central).unwrap();
    let n = tx.num_variables();
    assert_eq!(sparsity.hessian.num_rows(), n);
    assert!(sparsity.hessian.nnz() < n * n);

    // Locate the states at the first and last grid points in the flat vector
    let marked = DMatrix::from_fn(1, 5, |_, k| 100.0 + k as f64);
    variables.insert(Var::States, marked);
    let flat = tx.flatten_variables(&variables).unwrap();
    let first = flat.iter().position(|v| *v == 100.0).unwrap();
    let last = flat.iter().position(|v| *v == 104.0).unwrap();

    // The objective does not depend on the states and no defect involves both ends
    assert!(sparsity.hessian.contains(first, first));
    assert!(!sparsity.hessian.contains(first, last));
    assert!(!sparsity.hessian.contains(last, first));
}

#[test]
fn flatten_and_expand() {
    let problem = ConstrainedPoint::new(KinematicConstraintMethod::Bordalba2023);
    let tx = Transcription::new(&problem, &config("legendre-gauss-radau-3", 2)).unwrap();
    let guess = tx.create_random_iterate_within_bounds(11).unwrap();
    let variables = tx.variables_from_iterate(&guess).unwrap();

    let flat = tx.flatten_variables(&variables).unwrap();
    assert_eq!(flat.len(), tx.num_variables());
    // States are stored column by column after the two times
    assert_eq!(flat[2], variables[Var::States][(0, 0)]);
    assert_eq!(flat[3], variables[Var::States][(1, 0)]);
    assert_eq!(flat[4], variables[Var::States][(0, 1)]);
    assert_eq!(tx.expand_variables(&flat).unwrap(), variables);

    let mut truncated = variables.clone();
    let states = truncated[Var::States].columns(0, 3).into_owned();
    truncated.insert(Var::States, states);
    match tx.flatten_variables(&truncated) {
        Err(CollocationError::Shape { var, expected, actual }) => {
            assert_eq!(var, Var::States);
            assert_eq!(expected, (2, 7));
            assert_eq!(actual, (2, 3));
        }
        other => panic!("expected a shape error, got {other:?}"),
    }
}

#[rstest]
#[case(KinematicConstraintMethod::Posa2016, "trapezoidal", false)]
#[case(KinematicConstraintMethod::Bordalba2023, "trapezoidal", false)]
#[case(KinematicConstraintMethod::Posa2016, "legendre-gauss-3", false)]
#[case(KinematicConstraintMethod::Posa2016, "hermite-simpson", true)]
#[case(KinematicConstraintMethod::Bordalba2023, "hermite-simpson", true)]
#[case(KinematicConstraintMethod::Bordalba2023, "legendre-gauss-radau-3", true)]
fn kinematic_constraint_schemes(
    #[case] method: KinematicConstraintMethod,
    #[case] scheme: &str,
    #[case] supported: bool,
) {
    let problem = ConstrainedPoint::new(method);
    match Transcription::new(&problem, &config(scheme, 3)).err() {
        None => assert!(supported, "{method:?} should be rejected with {scheme}"),
        Some(err) => {
            assert!(!supported, "{method:?} with {scheme}: {err}");
            assert!(err.is_config(), "{err}");
        }
    }
}

#[test]
fn velocity_correction_at_midpoints() {
    let problem = ConstrainedPoint::new(KinematicConstraintMethod::Posa2016);
    let tx = Transcription::new(&problem, &config("hermite-simpson", 4)).unwrap();
    assert_eq!(tx.slack_points(), &[1, 3, 5, 7]);
    assert_eq!(tx.mesh_points(), &[0, 2, 4, 6, 8]);

    let guess = tx.create_random_iterate_within_bounds(5).unwrap();
    let mut variables = tx.variables_from_iterate(&guess).unwrap();
    assert_eq!(variables.shape(Var::Slacks), (2, 4));

    variables.insert(Var::Slacks, DMatrix::zeros(2, 4));
    let plain = tx.evaluate_constraints(&variables).unwrap();
    variables.insert(Var::Slacks, DMatrix::from_element(2, 4, 0.5));
    let corrected = tx.evaluate_constraints(&variables).unwrap();

    // Position, velocity and acceleration errors at every mesh point
    assert_eq!(plain.kinematic.shape(), (3, 5));
    assert_eq!(plain.kinematic, corrected.kinematic);
    assert_eq!(plain.kinematic_udoterr.shape(), (0, 0));
    assert_eq!(plain.projection.shape(), (0, 4));
    assert_ne!(plain.defects, corrected.defects);

    let states = &variables[Var::States];
    let controls = &variables[Var::Controls];
    let multipliers = &variables[Var::Multipliers];
    for (k, i) in tx.mesh_points().iter().enumerate() {
        assert_eq!(plain.kinematic[(0, k)], states[(0, *i)]);
        assert_eq!(plain.kinematic[(1, k)], states[(1, *i)]);
        assert_abs_diff_eq!(
            plain.kinematic[(2, k)],
            controls[(0, *i)] - multipliers[(0, *i)]
        );
    }
}

#[test]
fn projection_onto_constraint_manifold() {
    let problem = ConstrainedPoint::new(KinematicConstraintMethod::Bordalba2023);
    let tx = Transcription::new(&problem, &config("hermite-simpson", 3)).unwrap();
    assert_eq!(tx.projection_points(), &[2, 4, 6]);
    assert_eq!(tx.slack_points(), tx.projection_points());

    let guess = tx.create_random_iterate_within_bounds(9).unwrap();
    let variables = tx.variables_from_iterate(&guess).unwrap();
    assert_eq!(variables.shape(Var::ProjectionStates), (2, 3));
    assert_eq!(variables.shape(Var::Slacks), (2, 3));

    let values = tx.evaluate_constraints(&variables).unwrap();
    assert_eq!(values.kinematic.shape(), (2, 4));
    assert_eq!(values.kinematic_udoterr.shape(), (1, 7));
    assert_eq!(values.projection.shape(), (2, 3));

    let states = &variables[Var::States];
    let projection = &variables[Var::ProjectionStates];
    let slacks = &variables[Var::Slacks];
    for (k, i) in tx.projection_points().iter().enumerate() {
        for r in 0..2 {
            assert_abs_diff_eq!(
                values.projection[(r, k)],
                states[(r, *i)] - projection[(r, k)] - slacks[(r, k)],
                epsilon = 1e-14
            );
            // The errors at the end of each interval are those of the projected state
            assert_eq!(values.kinematic[(r, k + 1)], projection[(r, k)]);
        }
    }
    assert_eq!(values.kinematic[(0, 0)], states[(0, 0)]);

    let controls = &variables[Var::Controls];
    let multipliers = &variables[Var::Multipliers];
    for i in 0..tx.num_grid_points() {
        assert_abs_diff_eq!(
            values.kinematic_udoterr[(0, i)],
            controls[(0, i)] - multipliers[(0, i)]
        );
    }
    assert_eq!(
        tx.layout().flatten(&values).unwrap().len(),
        tx.num_constraints()
    );
}

#[rstest]
#[case(false, 5)]
#[case(true, 9)]
fn path_constraint_points(#[case] interior: bool, #[case] num_points: usize) {
    let problem = ConstrainedPoint::new(KinematicConstraintMethod::Posa2016);
    let mut cfg = config("hermite-simpson", 4);
    cfg.enforce_path_constraint_mesh_interior_points = interior;
    let tx = Transcription::new(&problem, &cfg).unwrap();
    assert_eq!(tx.path_points().len(), num_points);

    let guess = tx.create_random_iterate_within_bounds(1).unwrap();
    let variables = tx.variables_from_iterate(&guess).unwrap();
    let values = tx.evaluate_constraints(&variables).unwrap();
    assert_eq!(values.path.len(), 1);
    assert_eq!(values.path[0].shape(), (1, num_points));
    for (p, i) in tx.path_points().iter().enumerate() {
        assert_eq!(values.path[0][(0, p)], variables[Var::Controls][(0, *i)]);
    }

    let (lower, upper) = tx.constraint_bounds();
    assert!(lower.path[0].iter().all(|v| *v == -1.0));
    assert!(upper.path[0].iter().all(|v| *v == 1.0));
}

#[test]
fn interpolated_control_points() {
    let problem = MinimumEffort::new();
    let mut cfg = config("hermite-simpson", 3);
    let tx = Transcription::new(&problem, &cfg).unwrap();
    assert_eq!(tx.interp_control_points(), &[1, 3, 5]);

    cfg.interpolate_control_mesh_interior_points = false;
    let tx = Transcription::new(&problem, &cfg).unwrap();
    assert!(tx.interp_control_points().is_empty());
    assert_eq!(tx.layout().num_interp_control_points(), 0);
}

#[test]
fn parallel_evaluation_matches_serial() {
    let problem = ConstrainedPoint::new(KinematicConstraintMethod::Posa2016);
    let serial = Transcription::new(&problem, &config("hermite-simpson", 6)).unwrap();
    let mut cfg = config("hermite-simpson", 6);
    cfg.parallelism = Parallelism::Thread;
    cfg.num_threads = 4;
    let threaded = Transcription::new(&problem, &cfg).unwrap();

    let guess = serial.create_random_iterate_within_bounds(7).unwrap();
    let variables = serial.variables_from_iterate(&guess).unwrap();
    let expected = serial.evaluate_constraints(&variables).unwrap();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(4)
        .build()
        .unwrap();
    let values = pool.install(|| threaded.evaluate_constraints(&variables).unwrap());
    assert_eq!(values, expected);
}
