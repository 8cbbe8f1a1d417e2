//! End-to-end solves of the reference silicon strip

use std::fs;

use modesolver::{
    run, FullVectorial, Geometry, Material, ModeClassifier, ModeError, ModeRecord, ModeSolver,
    Polarization, Report, RidgeWaveguide, RunConfig, ScalarField, SemiVectorial, SolveOptions,
};
use pretty_assertions::assert_eq;

const N_SILICA_BOUND: f64 = 1.44;
const N_SILICON_BOUND: f64 = 3.48;

/// Tabulated Li (1980) index of silicon at 293 K and 1.55 µm
const N_SILICON_TABULATED: f64 = 3.4757;

fn fundamental(solver: &dyn ModeSolver, guide: &RidgeWaveguide) -> f64 {
    let structure = guide.build().unwrap();
    let opts = SolveOptions { n_eigs: 1, tol: 1e-8, compute_fields: false, ..Default::default() };
    solver.solve(&structure, &opts).unwrap().neff[0].re
}

/// Default strip with the tabulated silicon index in place of the fit
fn tabulated_strip() -> RidgeWaveguide {
    RidgeWaveguide { n_wg: Material::Constant(N_SILICON_TABULATED), ..Default::default() }
}

/// Silica, nitride, silica overlay on top of the strip
fn nitride_overlay() -> RidgeWaveguide {
    RidgeWaveguide {
        clad_height: vec![0.05, 0.05, 0.5],
        n_clads: vec![Material::silica(), Material::nitride(), Material::silica()],
        ..tabulated_strip()
    }
}

#[test]
fn test_semi_vectorial_strip() {
    let solver = SemiVectorial::new(ScalarField::Ex, "0000".parse().unwrap());
    let neff = fundamental(&solver, &RidgeWaveguide::default());
    assert!((neff - 2.508).abs() < 1e-3, "semi-vectorial neff {}", neff);
}

#[test]
fn test_full_vectorial_strip_below_semi() {
    let guide = RidgeWaveguide::default();
    let full = fundamental(&FullVectorial::default(), &guide);
    let semi = fundamental(&SemiVectorial::default(), &guide);
    assert!((full - 2.472).abs() < 1e-3, "full-vectorial neff {}", full);
    assert!(full < semi, "full {} not below semi {}", full, semi);
    assert!(full > N_SILICA_BOUND && full < N_SILICON_BOUND);
}

#[test]
fn test_tabulated_silicon_reference_indices() {
    let guide = tabulated_strip();
    let te = fundamental(&SemiVectorial::new(ScalarField::Ex, Default::default()), &guide);
    assert!((te - 2.507954).abs() < 2e-4, "semi-vectorial Ex neff {}", te);
    let tm = fundamental(&SemiVectorial::new(ScalarField::Ey, Default::default()), &guide);
    assert!((tm - 1.859556).abs() < 2e-4, "semi-vectorial Ey neff {}", tm);
    let full = fundamental(&FullVectorial::default(), &guide);
    assert!((full - 2.471708).abs() < 5e-4, "full-vectorial neff {}", full);
}

#[test]
fn test_nitride_overlay_raises_index() {
    let guide = nitride_overlay();
    // 50 nm layers round up to three 20 nm rows each
    let structure = guide.build().unwrap();
    let rows: Vec<usize> = structure.slabs().iter().map(|s| s.rows).collect();
    assert_eq!(rows, vec![25, 11, 3, 3, 25]);

    let covered = fundamental(&FullVectorial::default(), &guide);
    assert!((covered - 2.48348).abs() < 1e-3, "overlay neff {}", covered);
    let plain = fundamental(&FullVectorial::default(), &tabulated_strip());
    assert!(covered > plain, "overlay {} not above plain {}", covered, plain);
}

#[test]
fn test_nitride_overlay_is_repeatable() {
    let structure = nitride_overlay().build().unwrap();
    let opts = SolveOptions { n_eigs: 2, tol: 1e-8, compute_fields: false, ..Default::default() };
    let first = FullVectorial::default().solve(&structure, &opts).unwrap();
    let second = FullVectorial::default().solve(&structure, &opts).unwrap();
    assert_eq!(first.neff, second.neff);
}

#[test]
fn test_single_restart_reports_partial_result() {
    let structure = RidgeWaveguide::default().build().unwrap();
    let opts = SolveOptions {
        n_eigs: 4,
        tol: 1e-14,
        max_iterations: 1,
        compute_fields: false,
        ..Default::default()
    };
    match SemiVectorial::default().solve(&structure, &opts) {
        Err(ModeError::NotConverged { requested, converged, partial }) => {
            assert_eq!(requested, 4);
            assert!(converged < 4);
            assert_eq!(partial.neff.len(), converged);
            assert!(partial.neff.iter().all(|n| n.re > N_SILICA_BOUND && n.re < N_SILICON_BOUND));
        }
        Err(other) => panic!("expected a convergence failure, got {}", other),
        Ok(sol) => panic!("expected a convergence failure, got {:?}", sol.neff),
    }
}

#[test]
fn test_fundamental_is_quasi_te_and_repeatable() {
    let structure = RidgeWaveguide::default().build().unwrap();
    let opts = SolveOptions { n_eigs: 2, ..Default::default() };
    let first = FullVectorial::default().solve(&structure, &opts).unwrap();
    let second = FullVectorial::default().solve(&structure, &opts).unwrap();
    assert_eq!(first.neff, second.neff);

    assert!(first.neff[0].re > first.neff[1].re);
    let classification = ModeClassifier.classify(&first).unwrap();
    assert_eq!(classification.labels[0].polarization, Polarization::QuasiTe);
    for label in &classification.labels {
        assert!((label.e_fractions.iter().sum::<f64>() - 100.0).abs() < 1e-6);
        let h = label.h_fractions.unwrap();
        assert!((h.iter().sum::<f64>() - 100.0).abs() < 1e-6);
        assert!(label.effective_area > 0.0);
    }
    assert_eq!(classification, ModeClassifier.classify(&first).unwrap());
}

#[test]
fn test_run_report_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("run.json");
    let mut config = RunConfig::default();
    config.solver.kind = modesolver::SolverKind::Semi;
    config.solver.n_eigs = 1;
    fs::write(&input, serde_json::to_string_pretty(&config).unwrap()).unwrap();

    let json = fs::read_to_string(&input).unwrap();
    let report = run(&json).unwrap();
    assert_eq!(report.solver, "semi-vectorial");
    assert_eq!(report.record.n_modes, 1);
    let label = &report.classification.as_ref().unwrap().labels[0];
    assert_eq!(label.polarization, Polarization::QuasiTe);

    let output = dir.path().join("report.json");
    fs::write(&output, serde_json::to_string(&report).unwrap()).unwrap();
    let back: Report = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    let Geometry::Ridge(guide) = &config.geometry else { panic!("default geometry is a ridge") };
    let mesh = guide.build().unwrap().mesh().unwrap();
    let solution = back.record.to_solution(mesh, back.wavelength).unwrap();
    assert_eq!(ModeRecord::from_solution(&solution), report.record);
    assert_eq!(solution.modes[0].fields.len(), 1);
}
