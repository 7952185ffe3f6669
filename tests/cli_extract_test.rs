//! Integration tests for `blens extract`.

mod common;

use common::TestEnv;
use predicates::prelude::*;

const FENCED: &str = r#"Here is my evaluation:

```json
[
  {"id": 7, "title": "Checkout", "complexity": 3, "suggested_improvements": ["Split"]},
  {"id": 8, "title": "Refund", "complexity": "2"}
]
```

Let me know if you need anything else."#;

#[test]
fn test_extract_from_file() {
    let env = TestEnv::new();
    let path = env.write_file("response.txt", FENCED);

    let output = env
        .blens()
        .args(["extract", path.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["count"], 2);
    assert_eq!(json["records"][0]["id"], 7);
    assert_eq!(json["records"][1]["complexity"], 2.0);
}

#[test]
fn test_extract_from_stdin_bare_array() {
    let env = TestEnv::new();
    env.blens()
        .arg("extract")
        .write_stdin("Sure! [ {\"id\": 1, \"title\": \"A\"} ] Done.")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""count":1"#));
}

#[test]
fn test_extract_human_output() {
    let env = TestEnv::new();
    env.blens()
        .args(["-H", "extract"])
        .write_stdin(FENCED)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 record(s)"))
        .stdout(predicate::str::contains("#7 Checkout (complexity 3)"));
}

#[test]
fn test_extract_without_array_fails() {
    let env = TestEnv::new();
    env.blens()
        .arg("extract")
        .write_stdin("I could not evaluate these stories.")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no JSON array located"));
}

#[test]
fn test_extract_trailing_comma_fails_to_decode() {
    let env = TestEnv::new();
    env.blens()
        .args(["-H", "extract"])
        .write_stdin("```json\n[{\"id\": 1,}]\n```")
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("Error:"));
}

#[test]
fn test_extract_missing_file_fails() {
    let env = TestEnv::new();
    env.blens()
        .args(["extract", "missing.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}
