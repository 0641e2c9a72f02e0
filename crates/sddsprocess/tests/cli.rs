use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use pretty_assertions::assert_eq;
use sdds_io::AsciiReader;
use sdds_model::{Page, PageReader};

const TWO_PAGES: &str = "SDDS1\n\
&parameter name=run, type=long, &end\n\
&column name=x, type=double, &end\n\
&data mode=ascii, &end\n\
1\n\
3\n\
1\n\
2\n\
3\n\
2\n\
2\n\
10\n\
20\n";

fn sddsprocess() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("sddsprocess"))
}

fn fixture(dir: &Path) -> PathBuf {
    let path = dir.join("in.sdds");
    fs::write(&path, TWO_PAGES).expect("write fixture");
    path
}

fn pages<R: std::io::BufRead>(mut reader: AsciiReader<R>) -> Vec<Page> {
    let mut pages = Vec::new();
    while let Some(page) = reader.read_page().expect("page") {
        pages.push(page);
    }
    pages
}

fn read_file(path: &Path) -> Vec<Page> {
    pages(AsciiReader::open(path).expect("open output"))
}

fn column(page: &Page, name: &str) -> Vec<f64> {
    page.column(name).expect("column").to_f64_vec()
}

#[test]
fn defines_a_column_into_a_new_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = fixture(dir.path());
    let output = dir.path().join("out.sdds");

    sddsprocess()
        .arg(&input)
        .arg(&output)
        .arg("-define=column,y,x 2 *,units=m")
        .assert()
        .success();

    let pages = read_file(&output);
    assert_eq!(pages.len(), 2);
    assert_eq!(column(&pages[0], "y"), [2.0, 4.0, 6.0]);
    assert_eq!(column(&pages[1], "y"), [20.0, 40.0]);
    assert_eq!(
        pages[0]
            .layout()
            .column("y")
            .and_then(|d| d.units.as_deref()),
        Some("m")
    );
    assert_eq!(fs::read_to_string(&input).expect("input"), TWO_PAGES);
}

#[test]
fn single_file_is_replaced_with_a_backup() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = fixture(dir.path());

    sddsprocess()
        .arg(&input)
        .arg("-filter=column,x,2,15")
        .assert()
        .success();

    let pages = read_file(&input);
    assert_eq!(column(&pages[0], "x"), [2.0, 3.0]);
    assert_eq!(column(&pages[1], "x"), [10.0]);
    let backup = dir.path().join("in.sdds.~1~");
    assert_eq!(fs::read_to_string(backup).expect("backup"), TWO_PAGES);
}

#[test]
fn pipe_reads_stdin_and_writes_stdout() {
    let assert = assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("sddsprocess"))
        .arg("-pipe")
        .arg("-process=x,sum,total")
        .arg("-retain=column,x")
        .write_stdin(TWO_PAGES)
        .assert()
        .success();

    let stdout = assert.get_output().stdout.clone();
    let pages = pages(AsciiReader::from_reader(Cursor::new(stdout)).expect("header"));
    let totals: Vec<f64> = pages
        .iter()
        .map(|p| p.parameter("total").and_then(|v| v.to_f64().ok()).expect("total"))
        .collect();
    assert_eq!(totals, [6.0, 30.0]);
}

#[test]
fn autostop_after_a_written_page_exits_with_two() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = fixture(dir.path());
    let output = dir.path().join("out.sdds");

    sddsprocess()
        .arg(&input)
        .arg(&output)
        .arg("-test=parameter,run 2 <,autostop")
        .assert()
        .code(2);

    let pages = read_file(&output);
    assert_eq!(pages.len(), 1);
    assert_eq!(column(&pages[0], "x"), [1.0, 2.0, 3.0]);
}

#[test]
fn missing_required_item_writes_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = fixture(dir.path());
    let output = dir.path().join("out.sdds");

    sddsprocess()
        .arg(&input)
        .arg(&output)
        .arg("-ifis=column,missing")
        .assert()
        .success();

    assert!(!output.exists());
}

#[test]
fn usage_errors_exit_with_one() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = fixture(dir.path());

    sddsprocess().arg(&input).arg("-bogus").assert().code(1);
    sddsprocess()
        .arg(&input)
        .arg("-process=x,nosuchanalysis,r")
        .assert()
        .code(1);
    assert_eq!(fs::read_to_string(&input).expect("input"), TWO_PAGES);
}

#[test]
fn evaluation_failures_name_their_category() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = fixture(dir.path());
    let output = dir.path().join("out.sdds");

    let assert = sddsprocess()
        .arg(&input)
        .arg(&output)
        .arg("-define=parameter,bad,+")
        .assert()
        .code(1);
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr);
    assert!(stderr.contains("EvalError"), "stderr:\n{stderr}");
}

#[test]
fn summarize_lists_operators_on_stderr() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = fixture(dir.path());
    let output = dir.path().join("out.sdds");

    let assert = sddsprocess()
        .arg(&input)
        .arg(&output)
        .arg("-SUMMARIZE")
        .arg("-define=column,y,x 1 +")
        .arg("-sparse=2")
        .assert()
        .success();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr);
    let define = stderr.find("define column y").expect("define listed");
    let sparse = stderr.find("sparse").expect("sparse listed");
    assert!(define < sparse, "stderr:\n{stderr}");
}
