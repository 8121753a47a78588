//! Line Client Tests
//!
//! Drives `AsciiClient` over a scripted transport.

#[path = "../common/mod.rs"]
mod common;

use common::ascii_client;
use mcharness::client::ConnState;
use mcharness::{McError, Outcome, StoreOptions};

// =============================================================================
// Retrieval Tests
// =============================================================================

#[test]
fn test_multiget_reports_every_key() {
    let mut client = ascii_client("VALUE b 0 3\r\nxyz\r\nEND\r\n");
    let result = client.get_multi(&["a", "b", "c"]).unwrap();

    assert_eq!(result.len(), 3);
    assert!(result["a"].is_none());
    assert!(result["c"].is_none());
    let b = result["b"].as_ref().unwrap();
    assert_eq!(&b.value[..], b"xyz");
    assert_eq!(b.flags, 0);

    assert_eq!(client.transport_mut().written_str(), "get a b c\r\n");
    assert_eq!(client.state(), ConnState::Connected);
}

#[test]
fn test_get_miss() {
    let mut client = ascii_client("END\r\n");
    assert!(client.get("nope").unwrap().is_none());
}

#[test]
fn test_gets_returns_cas() {
    let mut client = ascii_client("VALUE k 3 2 900\r\nhi\r\nEND\r\n");
    let record = client.gets("k").unwrap().unwrap();
    assert_eq!(record.cas, Some(900));
    assert_eq!(record.flags, 3);
    assert_eq!(client.transport_mut().written_str(), "gets k\r\n");
}

#[test]
fn test_gets_without_cas_is_framing_error() {
    let mut client = ascii_client("VALUE k 0 1\r\nv\r\nEND\r\n");
    assert!(matches!(client.gets("k"), Err(McError::Framing(_))));
    assert_eq!(client.state(), ConnState::Disconnected);
    assert!(client.transport_mut().closed);

    // Poisoned: nothing more goes out until reconnect
    assert!(matches!(client.get("k"), Err(McError::NotConnected)));
    client.reconnect().unwrap();
    assert_eq!(client.state(), ConnState::Connected);
}

#[test]
fn test_unexpected_line_in_multiget_reconnects() {
    let mut client = ascii_client("STORED\r\n");
    assert!(matches!(client.get_multi(&["a", "b"]), Err(McError::Protocol(_))));
    assert_eq!(client.transport_mut().reopens, 1);
    assert_eq!(client.counters().reconnects, 1);
    assert_eq!(client.state(), ConnState::Connected);
}

#[test]
fn test_unrequested_key_is_protocol_error() {
    let mut client = ascii_client("VALUE zzz 0 1\r\nx\r\nEND\r\n");
    assert!(matches!(client.get("a"), Err(McError::Protocol(_))));
}

#[test]
fn test_server_error_after_hit() {
    let mut client = ascii_client("VALUE a 0 1\r\nx\r\nSERVER_ERROR busy\r\n");
    assert!(matches!(client.get_multi(&["a", "b"]), Err(McError::Protocol(_))));
}

#[test]
fn test_server_error_first_keeps_connection() {
    let mut client = ascii_client("SERVER_ERROR unavailable\r\n");
    match client.get("a") {
        Err(McError::ErrorReply(msg)) => assert_eq!(msg, "SERVER_ERROR unavailable"),
        other => panic!("Expected error reply, got {:?}", other),
    }
    assert_eq!(client.transport_mut().reopens, 0);
    assert_eq!(client.state(), ConnState::Connected);
}

#[test]
fn test_lease_get_and_set() {
    let mut client = ascii_client("LVALUE k 99 0 0\r\n\r\nEND\r\nSTALE_STORED\r\n");
    let lease = client.lease_get("k").unwrap().unwrap();
    assert_eq!(lease.lease_token, Some(99));
    assert!(lease.value.is_empty());

    let outcome = client.lease_set("k", "fresh", 99, 0).unwrap();
    assert_eq!(outcome, Outcome::StaleStored);
    assert_eq!(
        client.transport_mut().written_str(),
        "lease-get k\r\nlease-set k 99 0 0 5\r\nfresh\r\n"
    );
}

#[test]
fn test_lease_get_plain_value() {
    let mut client = ascii_client("VALUE k 0 1\r\nv\r\nEND\r\n");
    let record = client.lease_get("k").unwrap().unwrap();
    assert_eq!(record.lease_token, None);
}

#[test]
fn test_metaget() {
    let mut client =
        ascii_client("META k age: 5; exptime: 0; from: 10.0.0.1; is_transient: 0\r\nEND\r\n");
    let meta = client.metaget("k").unwrap();
    assert_eq!(meta.get("age").map(String::as_str), Some("5"));
    assert_eq!(meta.get("from").map(String::as_str), Some("10.0.0.1"));
}

// =============================================================================
// Storage Tests
// =============================================================================

#[test]
fn test_set_stored() {
    let mut client = ascii_client("STORED\r\n");
    let outcome = client
        .set("k", "value", StoreOptions::default().with_flags(4).with_exptime(60))
        .unwrap();
    assert_eq!(outcome, Outcome::Stored);
    assert_eq!(client.transport_mut().written_str(), "set k 4 60 5\r\nvalue\r\n");
}

#[test]
fn test_add_not_stored_is_outcome() {
    let mut client = ascii_client("NOT_STORED\r\n");
    let outcome = client.add("k", "v", StoreOptions::default()).unwrap();
    assert_eq!(outcome, Outcome::NotStored);
    assert!(!outcome.is_stored());
}

#[test]
fn test_set_error_reply_reconnects() {
    let mut client = ascii_client("SERVER_ERROR object too large for cache\r\n");
    let outcome = client.set("k", "v", StoreOptions::default()).unwrap();
    assert_eq!(
        outcome,
        Outcome::ServerError("object too large for cache".to_string())
    );
    assert_eq!(client.transport_mut().reopens, 1);
}

#[test]
fn test_noreply_silence() {
    let mut client = ascii_client("");
    let outcome = client.set("k", "v", StoreOptions::default().noreply()).unwrap();
    assert_eq!(outcome, Outcome::NoReply);
    assert_eq!(client.transport_mut().written_str(), "set k 0 0 1 noreply\r\nv\r\n");
}

#[test]
fn test_noreply_answered_is_protocol_error() {
    let mut client = ascii_client("STORED\r\n");
    let result = client.set("k", "v", StoreOptions::default().noreply());
    assert!(matches!(result, Err(McError::Protocol(_))));
    assert_eq!(client.transport_mut().reopens, 1);
}

#[test]
fn test_append_and_prepend() {
    let mut client = ascii_client("NOT_STORED\r\nSTORED\r\n");
    assert_eq!(
        client.append("k", "tail", StoreOptions::default()).unwrap(),
        Outcome::NotStored
    );
    assert_eq!(
        client.prepend("k", "head", StoreOptions::default()).unwrap(),
        Outcome::Stored
    );
}

#[test]
fn test_append_rejects_exists() {
    let mut client = ascii_client("EXISTS\r\n");
    let result = client.append("k", "tail", StoreOptions::default());
    assert!(matches!(result, Err(McError::Protocol(_))));
}

#[test]
fn test_cas_outcomes() {
    let mut client = ascii_client("EXISTS\r\nNOT_FOUND\r\nSTORED\r\n");
    let opts = StoreOptions::default();
    assert_eq!(client.cas("k", "v", 1, opts).unwrap(), Outcome::Exists);
    assert_eq!(client.cas("k", "v", 1, opts).unwrap(), Outcome::NotFound);
    assert_eq!(client.cas("k", "v", 2, opts).unwrap(), Outcome::Stored);
    assert!(client.transport_mut().written_str().starts_with("cas k 0 0 1 1\r\nv\r\n"));
}

// =============================================================================
// Delete / Touch / Counter Tests
// =============================================================================

#[test]
fn test_delete_outcomes_and_counter() {
    let mut client = ascii_client("DELETED\r\nNOT_FOUND\r\n");
    assert_eq!(client.delete("k", None, false).unwrap(), Outcome::Deleted);
    assert_eq!(client.delete("k", Some(0), false).unwrap(), Outcome::NotFound);
    assert_eq!(client.counters().deletes, 2);
    assert_eq!(client.counters().requests, 2);
}

#[test]
fn test_delete_illegal_reply() {
    let mut client = ascii_client("STORED\r\n");
    assert!(matches!(client.delete("k", None, false), Err(McError::Protocol(_))));
}

#[test]
fn test_touch_past_and_absolute_exptime() {
    let mut client = ascii_client("TOUCHED\r\nTOUCHED\r\nEND\r\n");
    assert_eq!(client.touch("key", -20, false).unwrap(), Outcome::Touched);
    assert_eq!(client.touch("key", 1_432_250_000, false).unwrap(), Outcome::Touched);

    // Both expiries are already in the past, so the key is gone
    assert!(client.get("key").unwrap().is_none());
    assert_eq!(
        client.transport_mut().written_str(),
        "touch key -20\r\ntouch key 1432250000\r\nget key\r\n"
    );
}

#[test]
fn test_incr_hit_and_miss() {
    let mut client = ascii_client("11\r\nNOT_FOUND\r\n");
    assert_eq!(client.incr("n", 1, false).unwrap(), Some(11));
    assert_eq!(client.decr("missing", 1, false).unwrap(), None);
}

#[test]
fn test_incr_error_reply() {
    let mut client =
        ascii_client("CLIENT_ERROR cannot increment or decrement non-numeric value\r\n");
    assert!(matches!(client.incr("k", 1, false), Err(McError::ErrorReply(_))));
    assert_eq!(client.state(), ConnState::Connected);
}

// =============================================================================
// Stats / Admin / Raw Tests
// =============================================================================

#[test]
fn test_stats() {
    let mut client = ascii_client("STAT pid 42\r\nSTAT version 1.6 beta\r\nEND\r\n");
    let stats = client.stats(None).unwrap().unwrap();
    assert_eq!(stats["pid"], "42");
    assert_eq!(stats["version"], "1.6 beta");
}

#[test]
fn test_stats_silent_server() {
    let mut client = ascii_client("");
    assert!(client.stats(Some("detail")).unwrap().is_none());
    assert_eq!(client.transport_mut().written_str(), "stats detail\r\n");
}

#[test]
fn test_raw_stats() {
    let mut client = ascii_client("STAT pid 42\r\nSTAT uptime 7\r\nEND\r\n");
    let lines = client.raw_stats(None).unwrap().unwrap();
    assert_eq!(lines, vec!["pid 42".to_string(), "uptime 7".to_string()]);
}

#[test]
fn test_version_and_flush() {
    let mut client = ascii_client("VERSION 1.6.21\r\nOK\r\n");
    assert_eq!(client.version().unwrap(), "1.6.21");
    assert_eq!(client.flush_all(Some(0)).unwrap(), Outcome::Ok);
}

#[test]
fn test_issue_command() {
    let mut client = ascii_client("STORED\r\n");
    let reply = client.issue_command("set k 0 0 1\r\nv\r\n").unwrap();
    assert_eq!(reply, "STORED\r\n");
    assert_eq!(client.counters().others, 1);
}

#[test]
fn test_issue_command_and_read_all() {
    let mut client = ascii_client("VALUE k 0 1\r\nv\r\nEND\r\n");
    let answer = client.issue_command_and_read_all("get k\r\n").unwrap();
    assert_eq!(answer.as_deref(), Some("VALUE k 0 1\r\nv\r\nEND\r\n"));
}

#[test]
fn test_issue_command_and_read_all_error_first() {
    let mut client = ascii_client("ERROR\r\n");
    let result = client.issue_command_and_read_all("bogus\r\n");
    assert!(matches!(result, Err(McError::ErrorReply(_))));
    assert_eq!(client.transport_mut().reopens, 1);
}

#[test]
fn test_issue_command_and_read_all_silence() {
    let mut client = ascii_client("");
    assert!(client.issue_command_and_read_all("get k\r\n").unwrap().is_none());
}

// =============================================================================
// Reconnect Failure Tests
// =============================================================================

#[test]
fn test_failed_reconnect_leaves_disconnected() {
    let mut client = ascii_client("STORED\r\n");
    client.transport_mut().refuse_reopen = true;

    // The protocol error wins over the failed reopen
    assert!(matches!(client.delete("k", None, false), Err(McError::Protocol(_))));
    assert_eq!(client.state(), ConnState::Disconnected);
    assert_eq!(client.counters().reconnects, 0);

    assert!(matches!(client.version(), Err(McError::NotConnected)));

    client.transport_mut().refuse_reopen = false;
    client.reconnect().unwrap();
    assert_eq!(client.state(), ConnState::Connected);
}
