//! Property-based tests for the parsers and rewrites that sit on the
//! boundary with remote output.
//!
//! Uses `proptest` to verify invariants across many random inputs.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use proptest::prelude::*;

use burrow_cli::domain::endpoint::{JoinUrl, find_join_url, rewrite_join_url};
use burrow_cli::domain::prefs::Preferences;
use burrow_cli::domain::scheduler::{first_node, parse_squeue, qualify_node};
use burrow_cli::domain::{JobName, SessionRequest};

fn rest_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        "/[a-z0-9]{0,12}",
        "/[a-z]{1,8}\\?[a-z]=[0-9]{1,4}",
        "\\?[a-z]{1,6}=[a-z0-9]{1,6}",
    ]
}

// ============================================================================
// Join URL rewrite
// ============================================================================

proptest! {
    /// Loopback URLs move to localhost:<local> and keep everything after
    /// the authority byte for byte.
    #[test]
    fn prop_loopback_rewrite_keeps_suffix(
        scheme in "[a-z][a-z0-9+.-]{0,6}",
        remote in 1u16..,
        local in 1u16..,
        rest in rest_strategy(),
    ) {
        let raw = format!("{scheme}://127.0.0.1:{remote}{rest}");
        let rewritten = rewrite_join_url(&raw, local).unwrap();
        prop_assert_eq!(rewritten, format!("{scheme}://localhost:{local}{rest}"));
    }

    /// Any other host is left exactly as it was.
    #[test]
    fn prop_non_loopback_host_is_untouched(
        host in "[a-z][a-z0-9-]{0,10}(\\.[a-z]{2,5})?",
        remote in 1u16..,
        local in 1u16..,
        rest in rest_strategy(),
    ) {
        let raw = format!("tcp://{host}:{remote}{rest}");
        prop_assert_eq!(rewrite_join_url(&raw, local).unwrap(), raw);
    }

    /// Rewriting never panics, whatever the input.
    #[test]
    fn prop_rewrite_never_panics(raw in ".{0,80}", local in any::<u16>()) {
        let _ = rewrite_join_url(&raw, local);
    }

    /// The scraper finds a URL embedded in noisy log text.
    #[test]
    fn prop_scraper_finds_embedded_url(
        before in "[a-zA-Z ]{0,30}",
        after in "[a-zA-Z ]{0,30}",
        port in 1u16..,
    ) {
        let text = format!("{before} join at tcp://127.0.0.1:{port}/s {after}\n");
        let found: JoinUrl = find_join_url(&text).expect("url present");
        prop_assert_eq!(found.port, port);
        prop_assert_eq!(found.rest, "/s");
    }
}

// ============================================================================
// Scheduler output
// ============================================================================

proptest! {
    /// Well-formed rows always parse and keep their fields.
    #[test]
    fn prop_squeue_row_parses(
        id in "[0-9]{1,9}",
        state in "(PENDING|RUNNING|CONFIGURING|COMPLETING)",
        reason in "(None|Resources|Priority)",
        node in "cn[0-9]{1,3}",
    ) {
        let status = parse_squeue(&format!("{id}|{state}|{reason}|{node}\n")).unwrap();
        prop_assert_eq!(status.job_id, id);
        prop_assert_eq!(status.state, state);
        prop_assert_eq!(status.nodes, node);
    }

    /// Arbitrary output never panics the parser.
    #[test]
    fn prop_squeue_never_panics(output in ".{0,120}") {
        let _ = parse_squeue(&output);
    }

    /// The first node of a list is a prefix-free host name.
    #[test]
    fn prop_first_node_of_list(
        prefix in "[a-z]{1,4}",
        a in 0u32..1000,
        b in 0u32..1000,
    ) {
        prop_assert_eq!(first_node(&format!("{prefix}{a},{prefix}{b}")), Some(format!("{prefix}{a}")));
        prop_assert_eq!(first_node(&format!("{prefix}[{a}-{b}]")), Some(format!("{prefix}{a}")));
    }

    /// Qualifying twice is the same as qualifying once.
    #[test]
    fn prop_qualify_is_idempotent(node in "cn[0-9]{1,3}", suffix in "[a-z]{2,6}\\.[a-z]{2,3}") {
        let once = qualify_node(&node, &suffix);
        prop_assert_eq!(qualify_node(&once, &suffix), once.clone());
        prop_assert!(once.ends_with(&suffix));
    }
}

// ============================================================================
// Job names and preferences
// ============================================================================

proptest! {
    /// Generated names are accepted back by the parser.
    #[test]
    fn prop_job_name_parses_back(ts in 0i64..4_000_000_000, pid in any::<u32>(), suffix in any::<u16>()) {
        let name = JobName::new(ts, pid, suffix);
        prop_assert!(name.as_str().starts_with("sess-"));
        prop_assert_eq!(JobName::parse(name.as_str()).unwrap(), name);
    }

    /// A request survives being saved as preferences and applied again.
    #[test]
    fn prop_preferences_restore_request(
        hours in 1u32..=168,
        cpus in 1u32..128,
        ram in 1u32..1024,
        gpu in any::<bool>(),
        local in 1u16..,
        partition in "[a-z]{1,8}",
    ) {
        let request = SessionRequest {
            hours,
            cpus,
            ram_gb: ram,
            gpu,
            local_port: local,
            partition,
            image: "/images/backend.sif".to_string(),
            ..SessionRequest::default()
        };
        let text = Preferences::from_request(&request).render();
        let mut restored = SessionRequest::default();
        Preferences::parse(&text).apply(&mut restored).unwrap();
        prop_assert_eq!(restored, request);
    }
}
