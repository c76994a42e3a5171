use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn lychen(dir: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("lychen");
    cmd.current_dir(dir);
    cmd
}

fn write_script(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, body).expect("write script");
    name.to_string()
}

#[test]
fn no_arguments_is_exit_one() {
    let dir = tempdir().expect("create temp dir");
    lychen(dir.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("No script."));
}

#[test]
fn missing_script_is_exit_two() {
    let dir = tempdir().expect("create temp dir");
    lychen(dir.path())
        .arg("nowhere.py")
        .assert()
        .code(2)
        .stdout(predicate::str::contains("nowhere.py").and(predicate::str::contains("not found")));
}

#[test]
fn directory_is_not_a_script() {
    let dir = tempdir().expect("create temp dir");
    fs::create_dir(dir.path().join("sub")).expect("create subdirectory");
    lychen(dir.path())
        .arg("sub")
        .assert()
        .code(2)
        .stdout(predicate::str::contains("Script sub not found."));
}

#[test]
fn empty_repl_value_means_no_transcript() {
    let dir = tempdir().expect("create temp dir");
    lychen(dir.path())
        .env("LYCHEN_LOG", "warn")
        .arg("/REPL:")
        .write_stdin("x = 1\nprint(x)\nbye\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("1"))
        .stderr(predicate::str::contains("transcript").not());
}

#[test]
fn script_runs_with_settings_visible() {
    let dir = tempdir().expect("create temp dir");
    let script = write_script(
        dir.path(),
        "hello.py",
        "print('hello ' + LYSettings['$ARG1'])\nprint(LYSettings['/mode'])\n",
    );
    lychen(dir.path())
        .args([script.as_str(), "world", "/mode:fast"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello world").and(predicate::str::contains("fast")));
}

#[test]
fn script_error_still_exits_zero_and_enters_repl() {
    let dir = tempdir().expect("create temp dir");
    let script = write_script(dir.path(), "broken.py", "ready = 1\nraise ValueError('broken on purpose')\n");
    lychen(dir.path())
        .args([script.as_str(), "/REPL"])
        .write_stdin("print(ready + 1)\nbye\n")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("ValueError")
                .and(predicate::str::contains("broken on purpose"))
                .and(predicate::str::contains("Lychen>"))
                .and(predicate::str::contains("2")),
        );
}

#[test]
fn repl_writes_transcript_without_sentinel() {
    let dir = tempdir().expect("create temp dir");
    let transcript = dir.path().join("session.txt");
    lychen(dir.path())
        .arg(format!("/REPL:{}", transcript.display()))
        .write_stdin("x = 41\nprint(x + 1)\nbye\nprint('after bye')\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("42").and(predicate::str::contains("after bye").not()));

    let recorded = fs::read_to_string(&transcript).expect("read transcript");
    assert_eq!(recorded, "x = 41\r\nprint(x + 1)\r\n");
}

#[test]
fn sentinel_alone_leaves_transcript_unchanged() {
    let dir = tempdir().expect("create temp dir");
    let transcript = dir.path().join("session.txt");
    fs::write(&transcript, "old line\r\n").expect("seed transcript");
    lychen(dir.path())
        .arg(format!("/REPL={}", transcript.display()))
        .write_stdin("bye\n")
        .assert()
        .success();
    assert_eq!(fs::read_to_string(&transcript).expect("read transcript"), "old line\r\n");
}

#[test]
fn failing_statement_does_not_end_repl() {
    let dir = tempdir().expect("create temp dir");
    lychen(dir.path())
        .arg("/REPL")
        .write_stdin("undefined_thing\nNone.upper()\nprint('still here')\nbye\n")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("undefined_thing")
                .and(predicate::str::contains("NoneType"))
                .and(predicate::str::contains("still here")),
        );
}

#[test]
fn prompt_can_be_changed_by_statements() {
    let dir = tempdir().expect("create temp dir");
    lychen(dir.path())
        .arg("/REPL")
        .write_stdin("LYSettings['$PROMPT'] = 'py$ '\nbye\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Lychen>py$ "));
}

#[test]
fn attach_binds_under_explicit_name() {
    let dir = tempdir().expect("create temp dir");
    let script = write_script(
        dir.path(),
        "attach.py",
        "attach('json', 'J')\nprint(J.JSONDecoder.__name__)\nattach('no_such_library_here')\nprint('continued')\n",
    );
    lychen(dir.path())
        .arg(&script)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Attached json as J")
                .and(predicate::str::contains("JSONDecoder"))
                .and(predicate::str::contains("no_such_library_here"))
                .and(predicate::str::contains("continued")),
        );
}

#[test]
fn bad_extra_library_is_reported_and_skipped() {
    let dir = tempdir().expect("create temp dir");
    let script = write_script(dir.path(), "libs.py", "print(LY.OrderedDict.__name__)\n");
    lychen(dir.path())
        .args([script.as_str(), "/ASSEMBLIES:missing_extra_library"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("missing_extra_library")
                .and(predicate::str::contains("OrderedDict")),
        );
}

#[test]
fn script_reads_its_configuration_file() {
    let dir = tempdir().expect("create temp dir");
    let script = write_script(dir.path(), "job.py", "print(LYScriptINI.read('db', 'host'))\n");
    fs::write(dir.path().join("job.INI"), "[db]\nhost=db.internal\n").expect("write config");
    lychen(dir.path())
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("db.internal"));
}

#[test]
fn repl_only_uses_repl_config() {
    let dir = tempdir().expect("create temp dir");
    fs::write(dir.path().join("repl.INI"), "greeting=hi there\n").expect("write config");
    lychen(dir.path())
        .arg("/REPL")
        .write_stdin("print(LYScriptINI.read('', 'greeting'))\nbye\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("hi there"));
}
