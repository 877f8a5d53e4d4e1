use std::fs;
use std::path::Path;

use hostsync_core::config::{
    builtin_plan, HOST_CONTAINER_CHECKER, HOST_LAUNCHER, HOST_SERVICE_UNIT, HOST_WATCHDOG, SCRIPTS_DIR,
};
use hostsync_core::{ActionMap, SyncItem, SyncPlan, TargetPath};
use hostsync_sync::{host_ops, run_pass};
use hostsync_test_support::FakeHost;
use tempfile::TempDir;

const SOURCES: &[(&str, &[u8])] = &[
    ("restapi.sh", b"#!/bin/bash\nexec /usr/bin/docker start -a restapi\n"),
    ("restapi.service", b"[Unit]\nDescription=RESTAPI container\n"),
    ("container_checker", b"#!/usr/bin/python3\nprint('ok')\n"),
    ("restapi_watchdog.sh", b"#!/bin/bash\nwhile true; do sleep 60; done\n"),
];

const TARGETS: [&str; 4] = [HOST_LAUNCHER, HOST_SERVICE_UNIT, HOST_CONTAINER_CHECKER, HOST_WATCHDOG];

const ALL_ACTIONS: [&str; 9] = [
    "docker stop restapi",
    "docker rm restapi",
    "systemctl daemon-reload",
    "systemctl restart restapi",
    "systemctl daemon-reload",
    "systemctl restart restapi",
    "systemctl daemon-reload",
    "systemctl restart monit",
    "systemctl restart restapi-watchdog",
];

/// Lay out the image's scripts directory under a temp root and build the
/// shipped plan against it.
fn image_plan(root: &TempDir) -> SyncPlan {
    let scripts = root.path().join(SCRIPTS_DIR.trim_start_matches('/'));
    fs::create_dir_all(&scripts).expect("create scripts dir");
    for (name, content) in SOURCES {
        fs::write(scripts.join(name), content).expect("write source");
    }
    builtin_plan(false).rerooted(root.path())
}

fn source_bytes(index: usize) -> &'static [u8] {
    SOURCES[index].1
}

fn host_in_sync() -> FakeHost {
    let host = FakeHost::new();
    let modes = [0o755, 0o644, 0o755, 0o755];
    for (i, target) in TARGETS.iter().enumerate() {
        host.put_file(target, source_bytes(i), modes[i]);
    }
    host
}

#[tokio::test]
async fn cold_start_creates_every_target_and_runs_all_actions_in_item_order() {
    let root = TempDir::new().expect("root");
    let plan = image_plan(&root);
    let host = FakeHost::new();

    let result = run_pass(&host, &plan).await;

    assert!(result.overall_ok);
    assert_eq!(result.changed.len(), 4);
    for (i, target) in TARGETS.iter().enumerate() {
        let file = host.file(target).expect("target created");
        assert_eq!(file.bytes, source_bytes(i));
    }
    assert_eq!(host.file(HOST_SERVICE_UNIT).unwrap().mode, 0o644);
    assert_eq!(host.file(HOST_WATCHDOG).unwrap().mode, 0o755);
    assert_eq!(host.action_lines(), ALL_ACTIONS);
    assert_eq!(result.actions_run, ALL_ACTIONS.len());
}

#[tokio::test]
async fn warm_start_copies_nothing_and_dispatches_nothing() {
    let root = TempDir::new().expect("root");
    let plan = image_plan(&root);
    let host = host_in_sync();

    let result = run_pass(&host, &plan).await;

    assert!(result.overall_ok);
    assert!(result.changed.is_empty());
    assert_eq!(result.unchanged, 4);
    assert!(host.action_lines().is_empty());
    assert!(host
        .commands()
        .iter()
        .all(|argv| argv[0] == host_ops::SHA256SUM || argv[0] == host_ops::STAT));
}

#[tokio::test]
async fn one_byte_drift_updates_only_that_target() {
    let root = TempDir::new().expect("root");
    let plan = image_plan(&root);
    let host = host_in_sync();
    let mut drifted = source_bytes(2).to_vec();
    drifted[0] ^= 1;
    host.put_file(HOST_CONTAINER_CHECKER, &drifted, 0o755);

    let result = run_pass(&host, &plan).await;

    assert!(result.overall_ok);
    assert_eq!(result.changed, [TargetPath::from(HOST_CONTAINER_CHECKER)]);
    assert_eq!(host.file(HOST_CONTAINER_CHECKER).unwrap().bytes, source_bytes(2));
    assert_eq!(
        host.action_lines(),
        ["systemctl daemon-reload", "systemctl restart monit"]
    );
    let writes = host
        .commands()
        .into_iter()
        .filter(|argv| argv[0] == host_ops::SH)
        .count();
    assert_eq!(writes, 1);
}

#[tokio::test]
async fn failed_action_stops_its_target_only_and_fails_the_pass() {
    let root = TempDir::new().expect("root");
    let plan = image_plan(&root);
    let host = FakeHost::new();
    // Second occurrence overall is the service unit's restart.
    host.fail_on_nth(["systemctl", "restart", "restapi"], 2, 1);

    let result = run_pass(&host, &plan).await;

    assert_eq!(result.changed.len(), 4);
    assert!(result.failed.is_empty());
    assert_eq!(result.action_failures, [TargetPath::from(HOST_SERVICE_UNIT)]);
    assert!(!result.overall_ok);
    assert_eq!(host.action_lines(), ALL_ACTIONS);
}

#[tokio::test]
async fn failed_action_skips_rest_of_its_sequence() {
    let root = TempDir::new().expect("root");
    let plan = image_plan(&root);
    let host = FakeHost::new();
    host.fail_on(["docker", "rm", "restapi"], 1);

    let result = run_pass(&host, &plan).await;

    assert_eq!(result.action_failures, [TargetPath::from(HOST_LAUNCHER)]);
    assert_eq!(
        host.action_lines(),
        [
            "docker stop restapi",
            "docker rm restapi",
            "systemctl daemon-reload",
            "systemctl restart restapi",
            "systemctl daemon-reload",
            "systemctl restart monit",
            "systemctl restart restapi-watchdog",
        ]
    );
}

#[tokio::test]
async fn second_pass_is_idempotent() {
    let root = TempDir::new().expect("root");
    let plan = image_plan(&root);
    let host = FakeHost::new();

    let first = run_pass(&host, &plan).await;
    assert_eq!(first.changed.len(), 4);

    host.clear_log();
    let second = run_pass(&host, &plan).await;
    assert!(second.overall_ok);
    assert!(second.changed.is_empty());
    assert_eq!(second.actions_run, 0);
    assert!(host.action_lines().is_empty());
}

#[tokio::test]
async fn one_pass_converges_content_mode_and_ownership() {
    let root = TempDir::new().expect("root");
    let plan = image_plan(&root);
    let host = host_in_sync();
    host.put_file(HOST_LAUNCHER, source_bytes(0), 0o600);
    host.set_owner(HOST_WATCHDOG, "admin", "admin");

    let result = run_pass(&host, &plan).await;
    assert!(result.overall_ok);
    assert_eq!(
        result.changed,
        [TargetPath::from(HOST_LAUNCHER), TargetPath::from(HOST_WATCHDOG)]
    );

    let launcher = host.file(HOST_LAUNCHER).unwrap();
    assert_eq!(launcher.mode, 0o755);
    let watchdog = host.file(HOST_WATCHDOG).unwrap();
    assert_eq!((watchdog.owner.as_str(), watchdog.group.as_str()), ("root", "root"));
}

#[tokio::test]
async fn observers_only_ever_see_whole_old_or_whole_new_content() {
    let root = TempDir::new().expect("root");
    let plan = image_plan(&root);
    let host = host_in_sync();
    let old = b"#!/bin/bash\n# previous release\n".to_vec();
    host.put_file(HOST_LAUNCHER, &old, 0o755);
    host.watch(HOST_LAUNCHER);

    let result = run_pass(&host, &plan).await;
    assert!(result.overall_ok);

    let snapshots = host.snapshots();
    assert!(!snapshots.is_empty());
    for seen in &snapshots {
        let bytes = seen.as_deref().expect("target never disappears");
        assert!(
            bytes == old.as_slice() || bytes == source_bytes(0),
            "observed partial content: {:?}",
            String::from_utf8_lossy(bytes)
        );
    }
    assert_eq!(snapshots.last().unwrap().as_deref(), Some(source_bytes(0)));

    // Bytes are only ever streamed into the temp, never into the target.
    for argv in host.commands().iter().filter(|argv| argv[0] == host_ops::SH) {
        assert_ne!(argv.last().map(String::as_str), Some(HOST_LAUNCHER));
    }
}

#[tokio::test]
async fn actions_of_one_target_finish_before_the_next_target_starts() {
    let dir = TempDir::new().expect("dir");
    let mut items = Vec::new();
    let mut actions = ActionMap::new();
    for name in ["a", "b", "c"] {
        let src = dir.path().join(name);
        fs::write(&src, name).expect("write source");
        let target = format!("/host/{name}");
        items.push(SyncItem::new(src, &target).with_mode(0o644));
        actions.insert(
            target.as_str(),
            [["stop", name].as_slice(), ["start", name].as_slice()],
        );
    }
    let host = FakeHost::new();

    let result = run_pass(&host, &SyncPlan::new(items, actions)).await;
    assert!(result.overall_ok);
    assert_eq!(
        host.action_lines(),
        ["stop a", "start a", "stop b", "start b", "stop c", "start c"]
    );

    // Every copy finishes before the first action.
    let lines = host.command_lines();
    let last_rename = lines.iter().rposition(|l| l.starts_with(host_ops::MV)).unwrap();
    let first_action = lines.iter().position(|l| l == "stop a").unwrap();
    assert!(last_rename < first_action);
}

#[tokio::test]
async fn copy_failure_of_one_item_does_not_block_the_others() {
    let root = TempDir::new().expect("root");
    let plan = image_plan(&root);
    let host = FakeHost::new();
    let service_tmp = TargetPath::from(HOST_SERVICE_UNIT).temp_path();
    host.fail_on(
        [
            host_ops::MV.to_owned(),
            "-f".to_owned(),
            "-T".to_owned(),
            "--".to_owned(),
            service_tmp.display().to_string(),
        ],
        1,
    );

    let result = run_pass(&host, &plan).await;

    assert!(!result.overall_ok);
    assert_eq!(result.failed, [TargetPath::from(HOST_SERVICE_UNIT)]);
    assert_eq!(result.changed.len(), 3);
    assert!(host.file(HOST_SERVICE_UNIT).is_none());
    assert!(host.file(&service_tmp).is_none(), "temp cleaned up");
    assert_eq!(
        host.action_lines(),
        [
            "docker stop restapi",
            "docker rm restapi",
            "systemctl daemon-reload",
            "systemctl restart restapi",
            "systemctl daemon-reload",
            "systemctl restart monit",
            "systemctl restart restapi-watchdog",
        ]
    );
}

#[tokio::test]
async fn unchanged_target_never_gets_actions() {
    let root = TempDir::new().expect("root");
    let plan = image_plan(&root);
    let host = host_in_sync();
    host.remove_file(HOST_WATCHDOG);

    let result = run_pass(&host, &plan).await;

    assert_eq!(result.changed, [TargetPath::from(HOST_WATCHDOG)]);
    assert_eq!(host.action_lines(), ["systemctl restart restapi-watchdog"]);
}

#[tokio::test]
async fn disabled_post_actions_still_update_targets() {
    let root = TempDir::new().expect("root");
    let plan = image_plan(&root).without_post_actions();
    let host = host_in_sync();
    host.put_file(HOST_LAUNCHER, b"stale", 0o755);

    let result = run_pass(&host, &plan).await;

    assert!(result.overall_ok);
    assert_eq!(result.changed, [TargetPath::from(HOST_LAUNCHER)]);
    assert_eq!(host.file(HOST_LAUNCHER).unwrap().bytes, source_bytes(0));
    assert!(host.action_lines().is_empty());
}

#[tokio::test]
async fn deleted_source_fails_only_its_item() {
    let root = TempDir::new().expect("root");
    let plan = image_plan(&root);
    fs::remove_file(&plan.items()[3].source_path).expect("remove source");
    let host = FakeHost::new();

    let result = run_pass(&host, &plan).await;

    assert_eq!(result.failed, [TargetPath::from(HOST_WATCHDOG)]);
    assert_eq!(result.changed.len(), 3);
    assert!(host.file(Path::new(HOST_WATCHDOG)).is_none());
}

#[tokio::test]
async fn unanswered_rehash_still_runs_the_target_actions() {
    let root = TempDir::new().expect("root");
    let plan = image_plan(&root);
    let host = host_in_sync();
    host.put_file(HOST_WATCHDOG, b"#!/bin/bash\n# older watchdog\n", 0o755);
    // The first fingerprint is the staleness check; the second is the re-hash.
    host.fail_on_nth([host_ops::SHA256SUM, "--", HOST_WATCHDOG], 2, 124);

    let first = run_pass(&host, &plan).await;

    assert!(first.overall_ok);
    assert_eq!(first.changed, [TargetPath::from(HOST_WATCHDOG)]);
    assert_eq!(host.file(HOST_WATCHDOG).unwrap().bytes, source_bytes(3));
    assert_eq!(host.action_lines(), ["systemctl restart restapi-watchdog"]);

    host.clear_log();
    let second = run_pass(&host, &plan).await;
    assert!(second.changed.is_empty());
    assert!(host.action_lines().is_empty());
}

#[tokio::test]
async fn rehash_mismatch_is_recopied_and_acted_on_next_pass() {
    let root = TempDir::new().expect("root");
    let plan = image_plan(&root);
    let host = host_in_sync();
    host.put_file(HOST_WATCHDOG, b"#!/bin/bash\n# older watchdog\n", 0o755);
    host.corrupt_after_rename(HOST_WATCHDOG, b"written by someone else");

    let first = run_pass(&host, &plan).await;
    assert_eq!(first.failed, [TargetPath::from(HOST_WATCHDOG)]);
    assert!(host.action_lines().is_empty());

    let second = run_pass(&host, &plan).await;
    assert!(second.overall_ok);
    assert_eq!(second.changed, [TargetPath::from(HOST_WATCHDOG)]);
    assert_eq!(host.file(HOST_WATCHDOG).unwrap().bytes, source_bytes(3));
    assert_eq!(host.action_lines(), ["systemctl restart restapi-watchdog"]);
}
