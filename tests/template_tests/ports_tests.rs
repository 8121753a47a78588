//! Template Tests
//!
//! Tests for port rewriting, placeholder substitution and file rendering.

use std::collections::HashMap;
use std::fs;

use mcharness::template::{
    render_config_file, replace_ports, replace_strings, PortRewriter, PortSubstitution,
};
use mcharness::McError;
use tempfile::TempDir;

fn list(ports: &[u16]) -> PortSubstitution {
    PortSubstitution::List(ports.to_vec())
}

// =============================================================================
// List Substitution Tests
// =============================================================================

#[test]
fn test_list_first_seen_order() {
    let json = r#"{"pools": {"A": {"servers": ["localhost:5000", "localhost:5001"]}}}"#;
    let out = replace_ports(json, &list(&[7000, 7001])).unwrap();
    assert_eq!(
        out,
        r#"{"pools": {"A": {"servers": ["localhost:7000", "localhost:7001"]}}}"#
    );
}

#[test]
fn test_repeated_port_reuses_assignment() {
    let json = r#"["a:5000", "b:5001", "c:5000"]"#;
    let mut rewriter = PortRewriter::new(list(&[1, 2]));
    let out = rewriter.rewrite(json).unwrap();
    assert_eq!(out, r#"["a:1", "b:2", "c:1"]"#);
    assert_eq!(rewriter.port_map().len(), 2);
}

#[test]
fn test_transport_prefix_form() {
    let out = replace_ports(r#"["ssl:host:11211"]"#, &list(&[9000])).unwrap();
    assert_eq!(out, r#"["ssl:host:9000"]"#);
}

#[test]
fn test_non_endpoint_strings_untouched() {
    let json = r#"{"route": "PoolRoute|A", "ttl": 10, "name": "x:y", "s": "a:1"}"#;
    let out = replace_ports(json, &list(&[2])).unwrap();
    assert_eq!(
        out,
        r#"{"route": "PoolRoute|A", "ttl": 10, "name": "x:y", "s": "a:2"}"#
    );
}

#[test]
fn test_numbers_outside_strings_untouched() {
    let json = r#"{"port": 5000, "s": "h:5000"}"#;
    let out = replace_ports(json, &list(&[6000])).unwrap();
    assert_eq!(out, r#"{"port": 5000, "s": "h:6000"}"#);
}

#[test]
fn test_escaped_quote_stays_in_string() {
    let json = r#"{"k": "a\"b:1234"}"#;
    let out = replace_ports(json, &list(&[4321])).unwrap();
    assert_eq!(out, r#"{"k": "a\"b:4321"}"#);
}

#[test]
fn test_escaped_backslash_before_closing_quote() {
    let json = r#"["x\\", "h:10"]"#;
    let out = replace_ports(json, &list(&[20])).unwrap();
    assert_eq!(out, r#"["x\\", "h:20"]"#);
}

// =============================================================================
// Sizing Errors
// =============================================================================

#[test]
fn test_more_ports_than_replacements() {
    let json = r#"["h:1", "h:2", "h:3", "h:4"]"#;
    match replace_ports(json, &list(&[10, 20])).unwrap_err() {
        // Fails on the first port past the end of the list
        McError::ConfigMismatch(message) => assert!(message.contains("port 3"), "{}", message),
        other => panic!("Expected config mismatch, got {:?}", other),
    }
}

#[test]
fn test_fewer_ports_than_replacements() {
    let json = r#"["h:1"]"#;
    let err = replace_ports(json, &list(&[10, 20])).unwrap_err();
    assert!(matches!(err, McError::ConfigMismatch(_)));
}

#[test]
fn test_no_ports_no_replacements() {
    let json = r#"{"a": "b"}"#;
    assert_eq!(replace_ports(json, &list(&[])).unwrap(), json);
}

// =============================================================================
// Map Substitution Tests
// =============================================================================

#[test]
fn test_map_substitution() {
    let map: HashMap<u32, u16> = [(5000, 7000), (5001, 7001)].into_iter().collect();
    let json = r#"["h:5001", "h:5000", "h:5001"]"#;
    let out = replace_ports(json, &PortSubstitution::Map(map)).unwrap();
    assert_eq!(out, r#"["h:7001", "h:7000", "h:7001"]"#);
}

#[test]
fn test_map_missing_port() {
    let map: HashMap<u32, u16> = [(5000, 7000)].into_iter().collect();
    let err = replace_ports(r#"["h:5999"]"#, &PortSubstitution::Map(map)).unwrap_err();
    assert!(matches!(err, McError::ConfigMismatch(_)));
}

#[test]
fn test_map_larger_than_document() {
    let map: HashMap<u32, u16> = [(5000, 7000), (5001, 7001)].into_iter().collect();
    let err = replace_ports(r#"["h:5000"]"#, &PortSubstitution::Map(map)).unwrap_err();
    assert!(matches!(err, McError::ConfigMismatch(_)));
}

// =============================================================================
// Placeholder and File Tests
// =============================================================================

#[test]
fn test_replace_strings() {
    let out = replace_strings(r#"{"dir": "$DIR", "again": "$DIR/x"}"#, [("$DIR", "/tmp/t")]);
    assert_eq!(out, r#"{"dir": "/tmp/t", "again": "/tmp/t/x"}"#);
}

#[test]
fn test_render_config_file() {
    let src_dir = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    let src = src_dir.path().join("route.json");
    fs::write(&src, r#"{"servers": ["localhost:5000"], "spool": "$SPOOL"}"#).unwrap();

    let dest = render_config_file(
        &src,
        out_dir.path(),
        [("$SPOOL", "/var/spool")],
        Some(&list(&[12345])),
    )
    .unwrap();

    assert_eq!(dest, out_dir.path().join("route.json"));
    assert_eq!(
        fs::read_to_string(&dest).unwrap(),
        r#"{"servers": ["localhost:12345"], "spool": "/var/spool"}"#
    );
}

#[test]
fn test_render_writes_nothing_on_mismatch() {
    let src_dir = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    let src = src_dir.path().join("route.json");
    fs::write(&src, r#"["localhost:5000"]"#).unwrap();

    let result = render_config_file(
        &src,
        out_dir.path(),
        Vec::<(String, String)>::new(),
        Some(&list(&[1, 2])),
    );
    assert!(matches!(result, Err(McError::ConfigMismatch(_))));
    assert!(!out_dir.path().join("route.json").exists());
}
