//! End-to-end runs through the CLI runner, including the bundled demos

use std::io::Write;
use std::path::PathBuf;

use interpreter::{SharedOutput, VmConfig};
use norn_cli::Runner;
use tempfile::NamedTempFile;

fn demo(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../../demos")
        .join(name)
}

fn run_demo(name: &str, config: VmConfig) -> String {
    let runner = Runner::new(config);
    let program = runner.load(&demo(name)).unwrap();
    let output = SharedOutput::new();
    runner.run(program, output.clone()).unwrap();
    output.contents()
}

#[test]
fn test_demos_agree_across_tiers() {
    let cases = [
        ("fact.nbc", "3628800\n"),
        ("sum.nbc", "500000500000\n"),
        ("greet.nbc", "hello, norn\nhello, norn\nhello, norn\n"),
        ("garbage.nbc", "999\n"),
    ];
    for (name, expected) in cases {
        let interpreted = run_demo(name, VmConfig::default().with_jit(false));
        assert_eq!(interpreted, expected, "{}", name);
        let compiled = run_demo(name, VmConfig::default());
        assert_eq!(compiled, expected, "{}", name);
    }
}

#[test]
fn test_garbage_demo_collects() {
    let runner = Runner::new(VmConfig::default().with_jit(false));
    let program = runner.load(&demo("garbage.nbc")).unwrap();
    let report = runner.run(program, SharedOutput::new()).unwrap();

    assert_eq!(report.gc.allocations, 1000);
    assert!(report.gc.collections >= 1);
}

#[test]
fn test_fact_demo_reaches_optimizing_tier() {
    let runner = Runner::new(VmConfig::default());
    let program = runner.load(&demo("fact.nbc")).unwrap();
    let report = runner.run(program, SharedOutput::new()).unwrap();

    assert_eq!(report.promotion.optimizing_compiles, 1);
}

#[test]
fn test_listing_from_temp_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, ".block main").unwrap();
    writeln!(file, "    LIT_INT 9").unwrap();
    writeln!(file, "    PRINT_INT").unwrap();
    writeln!(file, "    RTRN").unwrap();

    let runner = Runner::new(VmConfig::default());
    let program = runner.load(file.path()).unwrap();
    let output = SharedOutput::new();
    runner.run(program, output.clone()).unwrap();
    assert_eq!(output.contents(), "9");
}

#[test]
fn test_runtime_error_surfaces() {
    let runner = Runner::new(VmConfig::default());
    let result = runner.run_source(
        ".block main\n LIT_INT 0\n LIT_INT 1\n DIV_INT\n PRINT_INT\n RTRN\n",
        SharedOutput::new(),
    );
    assert!(result.is_err());
}
