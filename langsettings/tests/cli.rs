// SPDX-License-Identifier: GPL-3.0-or-later

use assert_cmd::Command;
use assert_fs::TempDir;
use assert_fs::prelude::*;
use predicates::prelude::*;
use std::error::Error;

fn langsettings(work_dir: &TempDir) -> Result<Command, Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("langsettings")?;
    cmd.current_dir(work_dir.path());
    cmd.env_remove("RUST_LOG");
    Ok(cmd)
}

/// A configuration with the temporary directory as the only project.
fn write_config(work_dir: &TempDir, extra_providers: &str) -> Result<(), Box<dyn Error>> {
    let config = format!(
        r#"
schema: 1.0

workspace:
  projects:
    - name: app
      location: {location}

providers:
  - id: parser
    kind: build-output
    project: app
{extra_providers}
"#,
        location = work_dir.path().display()
    );
    work_dir.child("langsettings.yml").write_str(&config)?;
    Ok(())
}

#[test]
fn test_help() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("langsettings")?;
    cmd.arg("--help");
    cmd.assert().success().stdout(predicate::str::contains("Usage: langsettings"));
    Ok(())
}

#[test]
fn test_subcommand_is_required() -> Result<(), Box<dyn Error>> {
    let work_dir = TempDir::new()?;

    langsettings(&work_dir)?.assert().failure().stderr(predicate::str::contains("Usage: langsettings"));
    Ok(())
}

#[test]
fn test_parse_build_log_from_stdin() -> Result<(), Box<dyn Error>> {
    let work_dir = TempDir::new()?;
    work_dir.child("src/main.c").touch()?;
    work_dir.child("include").create_dir_all()?;
    write_config(&work_dir, "")?;

    langsettings(&work_dir)?
        .args(["parse", "--provider", "parser"])
        .write_stdin("gcc -Iinclude -DGREETING=hello -c src/main.c -o main.o\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"GREETING\""))
        .stdout(predicate::str::contains("\"hello\""))
        .stdout(predicate::str::contains("main.c"))
        .stdout(predicate::str::contains("\"provider\": \"parser\""));
    Ok(())
}

#[test]
fn test_parse_follows_make_directories() -> Result<(), Box<dyn Error>> {
    let work_dir = TempDir::new()?;
    work_dir.child("lib/util.c").touch()?;
    write_config(&work_dir, "")?;
    let log = format!(
        "make[1]: Entering directory '{dir}'\ngcc -DIN_LIB -c util.c\nmake[1]: Leaving directory '{dir}'\n",
        dir = work_dir.child("lib").path().display()
    );
    work_dir.child("build.log").write_str(&log)?;

    langsettings(&work_dir)?
        .args(["parse", "--input", "build.log", "--output", "entries.json"])
        .assert()
        .success();

    work_dir.child("entries.json").assert(predicate::str::contains("IN_LIB"));
    work_dir.child("entries.json").assert(predicate::str::contains("util.c"));
    Ok(())
}

#[test]
fn test_unknown_provider() -> Result<(), Box<dyn Error>> {
    let work_dir = TempDir::new()?;
    write_config(&work_dir, "")?;

    langsettings(&work_dir)?
        .args(["parse", "--provider", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown provider 'missing'"));
    Ok(())
}

#[test]
fn test_invalid_configuration() -> Result<(), Box<dyn Error>> {
    let work_dir = TempDir::new()?;
    work_dir.child("langsettings.yml").write_str("schema: 1.0\nscheduler:\n  workers: 0\n")?;

    langsettings(&work_dir)?
        .arg("database")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration validation failed"));
    Ok(())
}

#[test]
fn test_database_with_state() -> Result<(), Box<dyn Error>> {
    let work_dir = TempDir::new()?;
    work_dir.child("src/main.c").touch()?;
    write_config(
        &work_dir,
        r#"  - id: cdb
    kind: compilation-database
    project: app
    path: compile_commands.json
    build-parser: parser
"#,
    )?;
    let database = serde_json::json!([{
        "directory": work_dir.path(),
        "file": "src/main.c",
        "arguments": ["gcc", "-DFROM_DATABASE=1", "-c", "src/main.c"],
    }]);
    work_dir.child("compile_commands.json").write_str(&database.to_string())?;

    langsettings(&work_dir)?
        .args(["--state", "state.json", "database"])
        .assert()
        .success()
        .stdout(predicate::str::contains("FROM_DATABASE"));

    work_dir.child("state.json").assert(predicate::str::contains("\"cdb-modified-time\""));
    work_dir.child("state.json").assert(predicate::str::contains("FROM_DATABASE"));
    Ok(())
}

#[test]
fn test_database_missing_file_fails() -> Result<(), Box<dyn Error>> {
    let work_dir = TempDir::new()?;
    write_config(
        &work_dir,
        r#"  - id: cdb
    kind: compilation-database
    path: compile_commands.json
    build-parser: parser
"#,
    )?;

    langsettings(&work_dir)?
        .arg("database")
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"executed\": false"));
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_builtins_are_restored_from_the_state() -> Result<(), Box<dyn Error>> {
    use std::os::unix::fs::PermissionsExt;

    let work_dir = TempDir::new()?;
    let sysroot = work_dir.child("sysroot/include");
    sysroot.create_dir_all()?;
    let compiler = work_dir.child("bin/fakecc");
    let counter = work_dir.child("runs.txt");
    compiler.write_str(&format!(
        "#!/bin/sh\n\
         echo run >> '{counter}'\n\
         echo '#include <...> search starts here:' >&2\n\
         echo ' {include}' >&2\n\
         echo 'End of search list.' >&2\n\
         echo '#define __FAKE_COMPILER__ 1'\n",
        include = sysroot.path().display(),
        counter = counter.path().display()
    ))?;
    std::fs::set_permissions(compiler.path(), std::fs::Permissions::from_mode(0o755))?;
    work_dir.child("langsettings.yml").write_str(&format!(
        r#"
schema: 1.0

toolchain:
  - language: c
    compiler: {compiler}

providers:
  - id: fake
    kind: builtin-specs
    languages: [c]
    command: ${{COMMAND}} ${{FLAGS}} -E -P -v -dD "${{INPUTS}}"
"#,
        compiler = compiler.path().display()
    ))?;

    langsettings(&work_dir)?
        .args(["--state", "state.json", "builtins"])
        .assert()
        .success()
        .stdout(predicate::str::contains("__FAKE_COMPILER__"))
        .stdout(predicate::str::contains("sysroot"));
    work_dir.child("state.json").assert(predicate::str::contains("\"signature\""));
    work_dir.child("spec.c").assert(predicate::path::missing());

    // Nothing changed, the entries come from the state file.
    langsettings(&work_dir)?
        .args(["--state", "state.json", "builtins", "--provider", "fake"])
        .assert()
        .success()
        .stdout(predicate::str::contains("__FAKE_COMPILER__"));
    counter.assert("run\n");
    Ok(())
}
