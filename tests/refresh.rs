mod common;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use common::{write, write_versioned, FakeTool, Reply, MODEL_RO, REBASING, TOOLS_RW};
use snapview::error::with_retry;
use snapview::refresh::refresh_with_style;
use snapview::{
    Components, LoadRuleSource, PathStyle, RefreshFailure, RefreshOptions, RetryPolicy, Stream,
    SwipeOutcome, Workspace,
};
use tempfile::TempDir;

fn workspace(temp: &TempDir) -> Workspace {
    Workspace::new(temp.path())
        .with_tag("dev_view")
        .with_stream(Stream::new(r"rel_2_int@\PVOB"))
}

/// A view with one versioned file per component and some build output
fn populate(temp: &TempDir) {
    let root = temp.path();
    write(&root.join(".view.dat"), "view_uuid:8a7b3c1d.59f711e2");
    write_versioned(&root.join("Model/src/model.c"), "int model;");
    write_versioned(&root.join("Tools/Build/build.xml"), "<project/>");
    write(&root.join("Model/src/model.o"), "obj");
    write(&root.join("Model/out/a.o"), "obj");
    write(&root.join("Model/out/b.o"), "obj");
    write(&root.join("Tools/Build/target/app.jar"), "jar");
    write(&root.join("notes.txt"), "scratch");
}

#[test]
fn busy_workspace_is_reported_and_update_skipped() -> Result<()> {
    let temp = TempDir::new()?;
    let tool = FakeTool::new()
        .config_spec(&[MODEL_RO, TOOLS_RW])
        .reply("setcs", Reply::Fail(REBASING.to_string()));

    let result = refresh_with_style(
        &tool,
        &workspace(&temp),
        &RefreshOptions::default(),
        PathStyle::Posix,
    )?;

    assert_eq!(
        result.failure,
        Some(RefreshFailure::Busy {
            stream: "rel_2_int".to_string()
        })
    );
    assert!(!result.is_success());
    assert!(tool.call("update").is_none());
    Ok(())
}

#[test]
fn busy_update_is_not_unknown() -> Result<()> {
    let temp = TempDir::new()?;
    let tool = FakeTool::new()
        .config_spec(&[TOOLS_RW])
        .reply("update", Reply::Fail(REBASING.to_string()));

    let result = refresh_with_style(
        &tool,
        &workspace(&temp),
        &RefreshOptions::default(),
        PathStyle::Posix,
    )?;

    let failure = result.failure.expect("update failed");
    assert!(failure.is_retryable());
    assert_eq!(
        failure,
        RefreshFailure::Busy {
            stream: "rel_2_int".to_string()
        }
    );
    Ok(())
}

#[test]
fn steps_run_in_order() -> Result<()> {
    let temp = TempDir::new()?;
    populate(&temp);
    let tool = FakeTool::new().config_spec(&[MODEL_RO, TOOLS_RW]);
    let options = RefreshOptions {
        swipe: true,
        generate_stream: true,
        ..RefreshOptions::default()
    };

    let result = refresh_with_style(&tool, &workspace(&temp), &options, PathStyle::Posix)?;

    assert!(result.is_success());
    assert_eq!(
        tool.subcommands(),
        vec!["chstream", "catcs", "lsco", "setcs", "update"]
    );
    Ok(())
}

#[test]
fn modifiable_update_arguments() -> Result<()> {
    let temp = TempDir::new()?;
    let tool = FakeTool::new().config_spec(&[MODEL_RO, TOOLS_RW]);
    let options = RefreshOptions {
        overwrite: true,
        load_rules: LoadRuleSource::Components(Components::Modifiable),
        ..RefreshOptions::default()
    };

    let result = refresh_with_style(&tool, &workspace(&temp), &options, PathStyle::Posix)?;

    let update = tool.call("update").expect("update ran");
    assert_eq!(
        update.arguments(),
        ["update", "-force", "-overwrite", "-add_loadrules", "Tools/Build"]
    );
    assert!(update.merges_stderr());
    assert_eq!(update.working_dir(), Some(temp.path()));
    assert_eq!(result.load_rules, vec!["Tools/Build"]);
    assert_eq!(result.read_only_rules, vec!["Model"]);
    Ok(())
}

#[test]
fn explicit_rules_skip_the_config_spec() -> Result<()> {
    let temp = TempDir::new()?;
    let tool = FakeTool::new();
    let options = RefreshOptions {
        load_rules: LoadRuleSource::Explicit(r"\Model  \Tools\Build ".to_string()),
        ..RefreshOptions::default()
    };

    let result = refresh_with_style(&tool, &workspace(&temp), &options, PathStyle::Posix)?;

    assert!(tool.call("catcs").is_none());
    assert_eq!(result.load_rules, vec!["Model", "Tools/Build"]);
    assert_eq!(
        tool.call("update").expect("update ran").arguments(),
        ["update", "-force", "-add_loadrules", "Model", "Tools/Build"]
    );
    Ok(())
}

#[test]
fn empty_rule_set_omits_add_loadrules() -> Result<()> {
    let temp = TempDir::new()?;
    let tool = FakeTool::new().config_spec(&["element * CHECKEDOUT", "element * /main/LATEST"]);

    let result = refresh_with_style(
        &tool,
        &workspace(&temp),
        &RefreshOptions::default(),
        PathStyle::Posix,
    )?;

    assert!(result.load_rules.is_empty());
    assert_eq!(
        tool.call("update").expect("update ran").arguments(),
        ["update", "-force"]
    );
    Ok(())
}

#[test]
fn cache_log_path_is_extracted() -> Result<()> {
    let temp = TempDir::new()?;
    let tool = FakeTool::new().config_spec(&[TOOLS_RW]).reply(
        "update",
        Reply::Out(
            "Processing dir \"Tools/Build\".\nDone loading \"Tools/Build\" (12 objects, copied 0 KB).\nLog has been written to \"/views/dev/update.2026-10-17T09:12:44.updt\".\n"
                .to_string(),
        ),
    );

    let result = refresh_with_style(
        &tool,
        &workspace(&temp),
        &RefreshOptions::default(),
        PathStyle::Posix,
    )?;

    assert!(result.is_success());
    assert_eq!(
        result.cache_log_path,
        Some(PathBuf::from("/views/dev/update.2026-10-17T09:12:44.updt"))
    );
    Ok(())
}

#[test]
fn unknown_update_failure_keeps_raw_text() -> Result<()> {
    let temp = TempDir::new()?;
    let message = "cleartool: Error: Unable to load \"Tools/Build/app.jar\": disk full.";
    let tool = FakeTool::new()
        .config_spec(&[TOOLS_RW])
        .reply("update", Reply::Fail(message.to_string()));

    let result = refresh_with_style(
        &tool,
        &workspace(&temp),
        &RefreshOptions::default(),
        PathStyle::Posix,
    )?;

    assert_eq!(
        result.failure,
        Some(RefreshFailure::Unknown {
            message: message.to_string()
        })
    );
    assert!(result.cache_log_path.is_none());
    Ok(())
}

#[test]
fn unlaunchable_tool_is_an_error() -> Result<()> {
    let temp = TempDir::new()?;
    let tool = FakeTool::new()
        .config_spec(&[TOOLS_RW])
        .reply("setcs", Reply::Unlaunchable);

    let err = refresh_with_style(
        &tool,
        &workspace(&temp),
        &RefreshOptions::default(),
        PathStyle::Posix,
    )
    .unwrap_err();

    assert!(err.to_string().contains("Unable to set cs stream"));
    assert!(tool.call("update").is_none());
    Ok(())
}

#[test]
fn failed_stream_generation_aborts() -> Result<()> {
    let temp = TempDir::new()?;
    let tool = FakeTool::new().reply("chstream", Reply::Fail("cleartool: Error: no permission".into()));
    let options = RefreshOptions {
        generate_stream: true,
        ..RefreshOptions::default()
    };

    assert!(refresh_with_style(&tool, &workspace(&temp), &options, PathStyle::Posix).is_err());
    assert_eq!(tool.subcommands(), vec!["chstream"]);
    Ok(())
}

#[test]
fn swipe_removes_view_private_files_only() -> Result<()> {
    let temp = TempDir::new()?;
    populate(&temp);
    let root = temp.path();
    let tool = FakeTool::new().config_spec(&[MODEL_RO, TOOLS_RW]);
    let options = RefreshOptions {
        swipe: true,
        ..RefreshOptions::default()
    };

    let result = refresh_with_style(&tool, &workspace(&temp), &options, PathStyle::Posix)?;

    let outcome = result.swipe.expect("swipe ran");
    assert!(outcome.success);
    // model.o, a.o, b.o, app.jar, notes.txt; out/ and target/
    assert_eq!(outcome.files_deleted, 5);
    assert_eq!(outcome.dirs_deleted, 2);
    assert!(root.join("Model/src/model.c").exists());
    assert!(root.join("Tools/Build/build.xml").exists());
    assert!(root.join(".view.dat").exists());
    assert!(!root.join("Model/out").exists());
    assert!(!root.join("notes.txt").exists());
    Ok(())
}

#[test]
fn second_swipe_finds_nothing() -> Result<()> {
    let temp = TempDir::new()?;
    populate(&temp);
    let tool = FakeTool::new().config_spec(&[MODEL_RO, TOOLS_RW]);
    let options = RefreshOptions {
        swipe: true,
        ..RefreshOptions::default()
    };

    refresh_with_style(&tool, &workspace(&temp), &options, PathStyle::Posix)?;
    let second = refresh_with_style(&tool, &workspace(&temp), &options, PathStyle::Posix)?;

    assert_eq!(
        second.swipe,
        Some(SwipeOutcome {
            total_candidates: 0,
            files_deleted: 0,
            dirs_deleted: 0,
            foreign_dirs_removed: 0,
            foreign_dirs_failed: 0,
            success: true,
        })
    );
    Ok(())
}

#[test]
fn checked_out_files_survive_the_swipe() -> Result<()> {
    let temp = TempDir::new()?;
    populate(&temp);
    let root = temp.path();
    write(&root.join("Tools/Build/edited.xml"), "<project name=\"wip\"/>");
    let tool = FakeTool::new()
        .config_spec(&[MODEL_RO, TOOLS_RW])
        .reply("lsco", Reply::Out("Tools/Build/edited.xml\n".to_string()));
    let options = RefreshOptions {
        swipe: true,
        ..RefreshOptions::default()
    };

    refresh_with_style(&tool, &workspace(&temp), &options, PathStyle::Posix)?;

    assert!(root.join("Tools/Build/edited.xml").exists());
    assert!(!root.join("Tools/Build/target").exists());
    Ok(())
}

#[test]
fn exclude_root_keeps_root_files() -> Result<()> {
    let temp = TempDir::new()?;
    populate(&temp);
    let tool = FakeTool::new().config_spec(&[MODEL_RO, TOOLS_RW]);
    let options = RefreshOptions {
        swipe: true,
        exclude_root: true,
        ..RefreshOptions::default()
    };

    let result = refresh_with_style(&tool, &workspace(&temp), &options, PathStyle::Posix)?;

    assert_eq!(result.swipe.expect("swipe ran").files_deleted, 4);
    assert!(temp.path().join("notes.txt").exists());
    Ok(())
}

#[test]
fn membership_fallback_without_load_rules() -> Result<()> {
    let temp = TempDir::new()?;
    let root = temp.path();
    write_versioned(&root.join("Model/src/model.c"), "int model;");
    write(&root.join("Model/src/model.o"), "obj");
    write(&root.join("scratch/tmp/dump.bin"), "junk");

    let tool = FakeTool::new()
        .config_spec(&["element * /main/LATEST"])
        .reply(
            &format!("describe -short vob:{}", root.join("scratch").display()),
            Reply::Missing("cleartool: Error: Unable to determine VOB for pathname".into()),
        );
    let options = RefreshOptions {
        swipe: true,
        ..RefreshOptions::default()
    };

    let result = refresh_with_style(&tool, &workspace(&temp), &options, PathStyle::Posix)?;

    let outcome = result.swipe.expect("swipe ran");
    assert_eq!(outcome.foreign_dirs_removed, 1);
    assert_eq!(outcome.files_deleted, 1);
    assert!(!root.join("scratch").exists());
    assert!(root.join("Model/src/model.c").exists());
    Ok(())
}

#[test]
fn vob_lookup_error_keeps_the_directory() -> Result<()> {
    let temp = TempDir::new()?;
    let root = temp.path();
    write_versioned(&root.join("Model/src/model.c"), "int model;");
    write(&root.join("Model/src/wip.c"), "int wip;");
    write(&root.join("Model/src/model.o"), "obj");

    let tool = FakeTool::new()
        .config_spec(&["element * /main/LATEST"])
        .reply("lsco", Reply::Out("Model/src/wip.c\n".to_string()))
        .reply(
            &format!("describe -short vob:{}", root.join("Model").display()),
            Reply::Missing("cleartool: Error: Unable to access \"Model\": Connection timed out.".into()),
        );
    let options = RefreshOptions {
        swipe: true,
        ..RefreshOptions::default()
    };

    let result = refresh_with_style(&tool, &workspace(&temp), &options, PathStyle::Posix)?;

    let outcome = result.swipe.expect("swipe ran");
    assert_eq!(outcome.foreign_dirs_removed, 0);
    assert_eq!(outcome.files_deleted, 1);
    assert!(root.join("Model/src/wip.c").exists());
    assert!(root.join("Model/src/model.c").exists());
    assert!(!root.join("Model/src/model.o").exists());
    Ok(())
}

#[test]
fn checkouts_outside_every_vob_are_not_removed_wholesale() -> Result<()> {
    let temp = TempDir::new()?;
    let root = temp.path();
    write(&root.join("scratch/notes/wip.txt"), "draft");
    write(&root.join("scratch/notes/dump.bin"), "junk");

    let tool = FakeTool::new()
        .config_spec(&["element * /main/LATEST"])
        .reply("lsco", Reply::Out("scratch/notes/wip.txt\n".to_string()))
        .reply(
            &format!("describe -short vob:{}", root.join("scratch").display()),
            Reply::Missing("cleartool: Error: Unable to determine VOB for pathname \"scratch\".".into()),
        );
    let options = RefreshOptions {
        swipe: true,
        ..RefreshOptions::default()
    };

    let result = refresh_with_style(&tool, &workspace(&temp), &options, PathStyle::Posix)?;

    let outcome = result.swipe.expect("swipe ran");
    assert_eq!(outcome.foreign_dirs_removed, 0);
    assert!(root.join("scratch/notes/wip.txt").exists());
    assert!(!root.join("scratch/notes/dump.bin").exists());
    Ok(())
}

#[tokio::test]
async fn retry_until_the_rebase_finishes() -> Result<()> {
    let temp = TempDir::new()?;
    let tool = FakeTool::new()
        .config_spec(&[TOOLS_RW])
        .reply("setcs", Reply::Fail(REBASING.to_string()))
        .reply("setcs", Reply::Fail(REBASING.to_string()))
        .reply("setcs", Reply::Out(String::new()));
    let ws = workspace(&temp);
    let policy = RetryPolicy {
        max_attempts: 5,
        initial_delay: Duration::from_millis(1),
        backoff_multiplier: 1.0,
        max_delay: Duration::from_millis(5),
    };

    let result = with_retry(&policy, || {
        let result = refresh_with_style(&tool, &ws, &RefreshOptions::default(), PathStyle::Posix);
        async move { result }
    })
    .await?;

    assert!(result.is_success());
    let setcs = tool
        .subcommands()
        .iter()
        .filter(|sub| sub.as_str() == "setcs")
        .count();
    assert_eq!(setcs, 3);
    Ok(())
}
