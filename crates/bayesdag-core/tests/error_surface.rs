use bayesdag_core::errors::{DagError, ErrorInfo};

fn sample_info(code: &str, message: &str) -> ErrorInfo {
    ErrorInfo::new(code, message)
        .with_context("node", "theta")
        .with_context("attempts", 100)
}

#[test]
fn initialization_error_surface() {
    let err = DagError::Initialization(sample_info(
        "no-computable-starting-state",
        "unable to find a starting state",
    ));
    assert_eq!(err.code(), "no-computable-starting-state");
    assert_eq!(err.info().context.get("attempts").map(String::as_str), Some("100"));
}

#[test]
fn rewire_error_surface() {
    let err = DagError::Rewire(sample_info("missing-node", "no node with that name"));
    assert_eq!(err.info().code, "missing-node");
    assert!(err.info().context.contains_key("node"));
}

#[test]
fn with_context_applies_to_every_family() {
    let errors = vec![
        DagError::Graph(ErrorInfo::new("G", "graph")),
        DagError::Proposal(ErrorInfo::new("P", "proposal")),
        DagError::Schedule(ErrorInfo::new("S", "schedule")),
        DagError::Monitor(ErrorInfo::new("M", "monitor")),
        DagError::Config(ErrorInfo::new("C", "config")),
        DagError::Serde(ErrorInfo::new("D", "serde")),
    ];
    for err in errors {
        let err = err.with_context("move", "slide(theta)");
        assert_eq!(
            err.info().context.get("move").map(String::as_str),
            Some("slide(theta)")
        );
    }
}

#[test]
fn display_lists_context_and_hint() {
    let err = DagError::Rewire(
        ErrorInfo::new("unnamed-node", "variable name was lost")
            .with_context("move", "scale")
            .with_hint("name every node referenced by a move"),
    );
    let rendered = err.to_string();
    assert!(rendered.starts_with("rewire error: variable name was lost (code: unnamed-node)"));
    assert!(rendered.contains("move=scale"));
    assert!(rendered.contains("hint: name every node"));
}
