//! Route-expression parsing through the public API.

use ferry::attachment::{
    self, Destination, ParseError, RawRoute, SpecKind, SpecSource, derive_alias, parse_route,
};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Test: parsing the same route twice gives equal specs
#[test]
fn test_parsing_is_idempotent() {
    let routes = [
        RawRoute::file(["ci,search:data=./in.csv"]),
        RawRoute::dir(["src", "./src"]).recursive(true).extensions([".PY", "rs"]),
        RawRoute::collection(["logs=./logs/*.log"]),
        RawRoute::file(["@inputs.txt"]),
    ];
    for route in &routes {
        assert_eq!(parse_route(route).unwrap(), parse_route(route).unwrap());
    }
}

/// Test: every accepted destination spelling maps to its destination
#[test]
fn test_destination_synonyms() {
    let cases = [
        ("template", Destination::TemplateContext),
        ("prompt", Destination::TemplateContext),
        ("ci", Destination::SandboxExec),
        ("Code-Interpreter", Destination::SandboxExec),
        ("sandbox-exec", Destination::SandboxExec),
        ("fs", Destination::SearchIndex),
        ("file-search", Destination::SearchIndex),
        ("SEARCH", Destination::SearchIndex),
    ];
    for (token, expected) in cases {
        let spec = parse_route(&RawRoute::file([format!("{token}:x.txt")])).unwrap();
        assert_eq!(
            spec.destinations,
            BTreeSet::from([expected]),
            "token '{token}'"
        );
    }
}

/// Test: an unknown destination names the offending token and the accepted set
#[test]
fn test_unknown_destination_lists_accepted_tokens() {
    let err = parse_route(&RawRoute::file(["ci,vision:x.png"])).unwrap_err();
    match err {
        ParseError::UnknownDestination {
            token, accepted, ..
        } => {
            assert_eq!(token, "vision");
            assert!(accepted.contains("sandbox-exec"));
            assert!(accepted.contains("file-search"));
        }
        other => panic!("expected UnknownDestination, got {other:?}"),
    }
}

/// Test: directory routes carry their walk options
#[test]
fn test_directory_route_options() {
    let spec = parse_route(
        &RawRoute::dir(["fs:docs=./docs"])
            .recursive(true)
            .extensions(["md,.TXT"]),
    )
    .unwrap();
    assert_eq!(spec.kind, SpecKind::Directory);
    assert!(spec.recursive);
    assert_eq!(
        spec.extension_filter,
        BTreeSet::from(["md".to_string(), "txt".to_string()])
    );
    assert_eq!(spec.source, SpecSource::Path(PathBuf::from("./docs")));
}

/// Test: options that make no sense for the route kind are rejected
#[test]
fn test_inapplicable_options() {
    let err = parse_route(&RawRoute::file(["a.txt"]).recursive(true)).unwrap_err();
    assert!(matches!(err, ParseError::OptionNotApplicable { ref option, .. } if option == "recursive"));

    let err = parse_route(&RawRoute::file(["a.txt"]).extensions(["txt"])).unwrap_err();
    assert!(matches!(err, ParseError::OptionNotApplicable { ref option, .. } if option == "ext"));

    let err = parse_route(&RawRoute::dir(["src/*.py"])).unwrap_err();
    assert!(matches!(err, ParseError::MalformedRoute { .. }));
}

/// Test: aliases must be identifiers
#[test]
fn test_invalid_alias_in_two_token_form() {
    let err = parse_route(&RawRoute::file(["bad-alias", "./x.txt"])).unwrap_err();
    assert!(matches!(err, ParseError::InvalidAlias { ref alias } if alias == "bad-alias"));
}

/// Test: malformed shapes
#[test]
fn test_malformed_routes() {
    assert_eq!(parse_route(&RawRoute::file(Vec::<String>::new())), Err(ParseError::Empty));
    assert_eq!(parse_route(&RawRoute::file(["  "])), Err(ParseError::Empty));
    assert!(matches!(
        parse_route(&RawRoute::file(["=x.txt"])),
        Err(ParseError::MalformedRoute { .. })
    ));
    assert!(matches!(
        parse_route(&RawRoute::file(["data="])),
        Err(ParseError::MalformedRoute { .. })
    ));
    assert!(matches!(
        parse_route(&RawRoute::file(["ci:"])),
        Err(ParseError::MalformedDestinations { .. })
    ));
}

/// Test: duplicate aliases across routes fail the whole parse
#[test]
fn test_duplicate_alias_across_routes() {
    let err = attachment::parse(&[
        RawRoute::file(["report=./a.csv"]),
        RawRoute::dir(["report", "./reports"]),
    ])
    .unwrap_err();
    assert_eq!(
        err,
        ParseError::DuplicateAlias {
            alias: "report".to_string()
        }
    );
}

/// Test: derived aliases come from the last fixed path component
#[test]
fn test_derived_aliases() {
    assert_eq!(
        derive_alias(&SpecSource::Path(PathBuf::from("./My Data.v2.csv"))).unwrap(),
        "my_data_v2_csv"
    );
    assert_eq!(
        derive_alias(&SpecSource::Glob("logs/2024/*.log".to_string())).unwrap(),
        "2024"
    );
    assert_eq!(
        derive_alias(&SpecSource::FileList(PathBuf::from("lists/inputs.txt"))).unwrap(),
        "inputs_txt"
    );
    assert!(matches!(
        derive_alias(&SpecSource::Glob("*.log".to_string())),
        Err(ParseError::InvalidAlias { .. })
    ));
}
