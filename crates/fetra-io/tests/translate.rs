//! End-to-end translation scenarios: deck in, target files out.

use std::fs;
use std::path::PathBuf;

use fetra_io::{InputFormat, translate};
use fetra_model::{ConfigurationParameters, SolverName};

fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "fetra_e2e_{tag}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock is sane")
            .as_nanos()
    ));
    fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

fn configuration(deck: &str, dir: &PathBuf, target: SolverName) -> ConfigurationParameters {
    let input = dir.join("model.bdf");
    fs::write(&input, deck).expect("write deck");
    let mut configuration =
        ConfigurationParameters::new(input.to_str().expect("utf8"), target);
    configuration.output_path = dir.clone();
    configuration
}

const PINNED_CHAIN: &str = "\
SOL 101
CEND
SPC = 10
LOAD = 2
BEGIN BULK
GRID,1,,0.0,0.0,0.0
GRID,2,,1.0,0.0,0.0
GRID,3,,2.0,0.0,0.0
GRID,4,,3.0,0.0,0.0
GRID,5,,4.0,0.0,0.0
CROD,1,7,1,2
CROD,2,7,2,3
CROD,3,7,3,4
CROD,4,7,4,5
PROD,7,100,1.0
MAT1,100,210000.0,,0.3
SPC1,10,123456,1,5
FORCE,2,3,,10.0,0.0,0.0,1.0
ENDDATA
";

#[test]
fn aster_translation_pins_six_dofs_and_produces_study_files() {
    let dir = scratch_dir("aster_spc");
    let configuration = configuration(PINNED_CHAIN, &dir, SolverName::CodeAster);
    let export = translate(&configuration, InputFormat::Nastran).expect("translation succeeds");
    assert!(export.exists());
    assert_eq!(export.extension().and_then(|e| e.to_str()), Some("export"));

    let comm = fs::read_to_string(dir.join("model.comm")).expect("comm written");
    assert!(comm.contains("DDL_IMPO=("));
    for pinned in ["DX=0e0", "DY=0e0", "DZ=0e0", "DRX=0e0", "DRY=0e0", "DRZ=0e0"] {
        assert!(comm.contains(pinned), "missing {pinned} in comm");
    }
    assert!(comm.contains("'N1'"));
    assert!(comm.contains("'N5'"));
    assert!(comm.contains("FORCE_NODALE"));

    let mail = fs::read_to_string(dir.join("model.med")).expect("mesh written");
    assert!(mail.contains("COOR_3D"));
    assert!(mail.contains("SEG2"));
}

const HEXA_PLOAD: &str = "\
SOL 101
CEND
LOAD = 2
BEGIN BULK
GRID,50,,0.0,0.0,0.0
GRID,51,,1.0,0.0,0.0
GRID,52,,1.0,1.0,0.0
GRID,53,,0.0,1.0,0.0
GRID,54,,0.0,0.0,1.0
GRID,55,,1.0,0.0,1.0
GRID,56,,1.0,1.0,1.0
GRID,57,,0.0,1.0,1.0
CHEXA,1,9,50,51,52,53,54,55,56,57
PSOLID,9,100
MAT1,100,210000.0,,0.3
PLOAD4,2,1,1000.0,,,,50,52
ENDDATA
";

#[test]
fn skin_extraction_attaches_pressure_to_boundary_quad() {
    let dir = scratch_dir("aster_skin");
    let configuration = configuration(HEXA_PLOAD, &dir, SolverName::CodeAster);
    translate(&configuration, InputFormat::Nastran).expect("translation succeeds");

    let mail = fs::read_to_string(dir.join("model.med")).expect("mesh written");
    // The loaded face became a boundary quad registered in the skin group.
    assert!(mail.contains("QUAD4"));
    assert!(mail.contains("SKIN"));

    let comm = fs::read_to_string(dir.join("model.comm")).expect("comm written");
    assert!(comm.contains("PRES_REP"));
    assert!(comm.contains("PRES=1e3"));
}

const MODAL_DECK: &str = "\
SOL 103
CEND
METHOD = 20
SPC = 10
BEGIN BULK
GRID,1,,0.0,0.0,0.0
GRID,2,,1.0,0.0,0.0
CROD,1,7,1,2
PROD,7,100,1.0
MAT1,100,210000.0,,0.3,7800.0
SPC1,10,123456,1
EIGRL,20,,,5
ENDDATA
";

#[test]
fn reference_eigenvalues_become_test_resu_directives() {
    let dir = scratch_dir("aster_modal");
    let mut configuration = configuration(MODAL_DECK, &dir, SolverName::CodeAster);
    let f06 = dir.join("ref.f06");
    fs::write(
        &f06,
        "\
                                   SUBCASE 1
                              R E A L   E I G E N V A L U E S
   MODE    EXTRACTION      EIGENVALUE            RADIANS             CYCLES            GENERALIZED         GENERALIZED
    NO.       ORDER                                                                       MASS              STIFFNESS
         1         1       8.882644E+05        9.424778E+02        1.500000E+02        1.000000E+00        8.882644E+05
",
    )
    .expect("write reference");
    configuration.result_file = Some(f06);

    translate(&configuration, InputFormat::Nastran).expect("translation succeeds");
    let comm = fs::read_to_string(dir.join("model.comm")).expect("comm written");
    assert!(comm.contains("TEST_RESU"));
    assert!(comm.contains("PARA='FREQ'"));
    assert!(comm.contains("NUME_ORDRE=1"));
    assert!(comm.contains("VALE_REFE=1.5e2"));
    assert!(comm.contains("CALC_MODES"));
}

#[test]
fn systus_translation_emits_subcase_files() {
    let dir = scratch_dir("systus");
    let configuration = configuration(PINNED_CHAIN, &dir, SolverName::Systus);
    let master = translate(&configuration, InputFormat::Nastran).expect("translation succeeds");
    assert!(master.ends_with("model_ALL.DAT"));

    let asc = fs::read_to_string(dir.join("model_SC1_DATA1.ASC")).expect("asc written");
    assert!(asc.contains("BEGIN_NODES 5 3"));
    assert!(asc.contains("BEGIN_ELEMENTS"));
    assert!(asc.contains("END_GROUPS"));
    // Nodes 1 and 5 carry the packed all-DOF constraint code.
    assert!(asc.contains("1 123456 0 0 0 0"));
    assert!(asc.contains("5 123456 0 0 0 0"));

    let dat = fs::read_to_string(dir.join("model_SC1.DAT")).expect("dat written");
    assert!(dat.contains("SOLVE METHOD OPTI"));
}

#[test]
fn nastran_round_trip_reaches_a_fixed_point() {
    let dir = scratch_dir("nastran_rt");
    let configuration = configuration(PINNED_CHAIN, &dir, SolverName::Nastran);
    let dat = translate(&configuration, InputFormat::Nastran).expect("first translation");

    let first = fs::read_to_string(&dat).expect("read first output");
    assert!(first.contains("SOL 101"));
    assert!(first.contains("SPC1"));
    assert!(first.contains("FORCE"));

    // Re-parse our own output and write again: the normalised form is a
    // fixed point of the round-trip.
    let second_dir = scratch_dir("nastran_rt2");
    let mut second_configuration = ConfigurationParameters::new(
        dat.to_str().expect("utf8"),
        SolverName::Nastran,
    );
    second_configuration.output_path = second_dir.clone();
    let dat2 =
        translate(&second_configuration, InputFormat::Nastran).expect("second translation");
    let second = fs::read_to_string(&dat2).expect("read second output");
    assert_eq!(first, second);
}
