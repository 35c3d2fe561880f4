//! Configuration applied to a thread

use std::io::Write;

use fidelity_core::{FidelityConfig, Promise, UnhandledRejections, configure, diagnostics, scheduler};

#[test]
fn configure_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "[dispatch]\ndrain_budget = 2\n\n[diagnostics]\nunhandled_rejections = \"warn\""
    )
    .unwrap();

    let config = FidelityConfig::load_from(file.path()).unwrap();
    configure(&config);

    assert_eq!(scheduler::microtasks().budget(), Some(2));
    assert_eq!(diagnostics::unhandled_rejections(), UnhandledRejections::Warn);

    let end = Promise::<i32, String>::resolved(0)
        .then(|v| Ok(v + 1))
        .then(|v| Ok(v + 1))
        .then(|v| Ok(v + 1));
    assert_eq!(scheduler::run_until_idle().ran, 2);
    assert_eq!(scheduler::run_until_idle().ran, 1);
    assert!(!end.is_pending());
}

#[test]
fn missing_sections_fall_back_to_defaults() {
    let config = FidelityConfig::from_toml_str("").unwrap();
    configure(&config);
    assert_eq!(scheduler::microtasks().budget(), None);
    assert_eq!(
        diagnostics::unhandled_rejections(),
        UnhandledRejections::Ignore
    );
}
