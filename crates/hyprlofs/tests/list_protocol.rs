//! Integration tests for the probe-then-fetch list protocol, including the
//! regrow-on-overflow path and its bounded-retry hardening.

use std::sync::Arc;

use hyprlofs::testing::MockKernel;
use hyprlofs::{Filesystem, HyprlofsError, Options};
use nix::errno::Errno;
use proptest::prelude::*;

fn fixture() -> (MockKernel, Arc<Filesystem>) {
    let mock = MockKernel::new();
    let fs = Arc::new(Filesystem::with_kernel(
        "/mnt/hypr",
        Options::default(),
        Box::new(mock.clone()),
    ));
    (mock, fs)
}

fn pairs(mappings: &[hyprlofs::Mapping]) -> Vec<(String, String)> {
    mappings
        .iter()
        .map(|m| (m.source.clone(), m.alias.clone()))
        .collect()
}

#[tokio::test]
async fn empty_table_resolves_on_the_probe_alone() {
    let (mock, fs) = fixture();
    fs.mount().await.unwrap();

    assert!(fs.list_mappings().await.unwrap().is_empty());
    let gets = mock.calls().iter().filter(|c| *c == "ioctl GET").count();
    assert_eq!(gets, 1, "an empty table needs no second fetch");
}

#[tokio::test]
async fn stable_table_needs_probe_plus_one_fetch() {
    let (mock, fs) = fixture();
    mock.set_mounted(true);
    mock.set_table(vec![
        ("/a".to_string(), "a".to_string()),
        ("/b".to_string(), "b".to_string()),
        ("/c".to_string(), "c".to_string()),
    ]);

    let listed = fs.list_mappings().await.unwrap();
    assert_eq!(pairs(&listed), mock.table());

    let gets = mock.calls().iter().filter(|c| *c == "ioctl GET").count();
    assert_eq!(gets, 2);
}

#[tokio::test]
async fn growth_between_probe_and_fetch_regrows_until_it_fits() {
    let (mock, fs) = fixture();
    mock.set_mounted(true);
    mock.set_table(vec![("/a".to_string(), "a".to_string())]);
    // Nothing changes at the probe, then the table grows under the first
    // sized fetch, forcing one regrow round.
    mock.grow_before_get(vec![]);
    mock.grow_before_get(vec![
        ("/b".to_string(), "b".to_string()),
        ("/c".to_string(), "c".to_string()),
    ]);

    let listed = fs.list_mappings().await.unwrap();
    assert_eq!(pairs(&listed), mock.table());
    assert_eq!(listed.len(), 3);

    let gets = mock.calls().iter().filter(|c| *c == "ioctl GET").count();
    assert_eq!(gets, 3, "probe, overflowed fetch, regrown fetch");
}

#[tokio::test]
async fn non_overflow_errors_stop_the_protocol() {
    let (mock, fs) = fixture();
    fs.mount().await.unwrap();

    mock.fail_next_ioctl(Errno::EIO as i32);
    let err = fs.list_mappings().await.unwrap_err();
    assert_eq!(err.errno(), Some(Errno::EIO));
    assert_eq!(err.op(), Some("hyprlofs ioctl GET"));
}

#[tokio::test]
async fn continuously_growing_table_fails_distinctly() {
    let (mock, fs) = fixture();
    mock.set_mounted(true);
    mock.set_table(vec![("/seed".to_string(), "seed".to_string())]);
    // Grow by one entry on every single GET; the fetch can never catch up.
    for i in 0..64 {
        mock.grow_before_get(vec![(format!("/grow/{i}"), format!("g{i}"))]);
    }

    let err = fs.list_mappings().await.unwrap_err();
    assert!(matches!(err, HyprlofsError::TableUnstable { .. }), "{err}");
    assert!(err.to_string().contains("/mnt/hypr"));
    // Distinct from kernel errors: no errno to report.
    assert_eq!(err.errno(), None);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    // Any finite growth schedule settles, and the result matches the table
    // as it stood when the final fetch succeeded.
    #[test]
    fn listing_converges_on_eventually_stable_tables(
        initial in prop::collection::vec(mapping_strategy(), 0..4),
        growth in prop::collection::vec(prop::collection::vec(mapping_strategy(), 0..3), 0..6),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let (mock, fs) = fixture();
            mock.set_mounted(true);
            mock.set_table(initial);
            for batch in growth {
                mock.grow_before_get(batch);
            }

            let listed = fs.list_mappings().await.unwrap();
            let mut listed = pairs(&listed);
            listed.sort();
            let mut expected = mock.table();
            expected.sort();
            assert_eq!(listed, expected);
        });
    }
}

fn mapping_strategy() -> impl Strategy<Value = (String, String)> {
    ("[a-z]{1,8}", "[a-z]{1,8}").prop_map(|(source, alias)| (format!("/src/{source}"), alias))
}
