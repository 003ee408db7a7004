//! Integration tests for plugdeps

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn plugdeps() -> Command {
        cargo_bin_cmd!("plugdeps")
    }

    /// Config with the cache inside `dir` and auditing off
    fn isolated_config(dir: &Path) -> PathBuf {
        let path = dir.join("config.toml");
        let content = format!(
            "[general]\naudit_log = false\n\n[cache]\ndir = '{}'\n",
            dir.join("cache").display()
        );
        std::fs::write(&path, content).unwrap();
        path
    }

    fn plugdeps_in(dir: &TempDir) -> Command {
        let mut cmd = plugdeps();
        cmd.arg("--config").arg(isolated_config(dir.path()));
        cmd
    }

    /// Serve `body` at `path` over HTTP, 404 for everything else
    fn serve(path: &'static str, body: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let mut request_line = String::new();
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                if reader.read_line(&mut request_line).is_err() {
                    continue;
                }
                loop {
                    let mut header = String::new();
                    if reader.read_line(&mut header).is_err() || header.trim().is_empty() {
                        break;
                    }
                }
                let target = request_line.split_whitespace().nth(1).unwrap_or("");
                let response: Vec<u8> = if target == path {
                    let mut r = format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    )
                    .into_bytes();
                    r.extend_from_slice(body);
                    r
                } else {
                    b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                        .to_vec()
                };
                let _ = stream.write_all(&response);
            }
        });
        format!("http://127.0.0.1:{}/", port)
    }

    #[test]
    fn help_displays() {
        plugdeps()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("runtime dependency loader"));
    }

    #[test]
    fn version_displays() {
        plugdeps()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("plugdeps"));
    }

    #[test]
    fn config_path() {
        let dir = TempDir::new().unwrap();
        plugdeps_in(&dir)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let dir = TempDir::new().unwrap();
        plugdeps_in(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[general]"))
            .stdout(predicate::str::contains("[download]"));
    }

    #[test]
    fn config_set_unknown_key_fails() {
        let dir = TempDir::new().unwrap();
        plugdeps_in(&dir)
            .args(["config", "set", "vm.name", "x"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown config key"));
    }

    #[test]
    fn cache_path_and_empty_list() {
        let dir = TempDir::new().unwrap();
        plugdeps_in(&dir)
            .args(["cache", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cache"));

        plugdeps_in(&dir)
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Cache is empty"));
    }

    #[test]
    fn resolve_missing_request_file() {
        let dir = TempDir::new().unwrap();
        plugdeps_in(&dir)
            .args(["resolve", "does-not-exist.toml"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"));
    }

    #[test]
    fn resolve_rejects_bad_checksum_before_downloading() {
        let dir = TempDir::new().unwrap();
        let request = dir.path().join("deps.toml");
        std::fs::write(
            &request,
            r#"
repositories = ["http://127.0.0.1:9/"]

[[dependencies]]
coordinate = "g:a:1"
checksum = "definitely-not-a-digest"
"#,
        )
        .unwrap();

        plugdeps_in(&dir)
            .arg("resolve")
            .arg(&request)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid checksum"));
    }

    #[test]
    fn fetch_invalid_coordinate_shows_hint() {
        let dir = TempDir::new().unwrap();
        plugdeps_in(&dir)
            .args(["fetch", "not-a-coordinate"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid coordinate"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn fetch_falls_back_and_writes_classpath() {
        let dir = TempDir::new().unwrap();
        let good = serve("/g/a/1/a-1.jar", b"hello");
        let empty = serve("/nothing", b"");

        let request = dir.path().join("deps.toml");
        std::fs::write(
            &request,
            format!(
                r#"
repositories = ["{}", "{}"]

[[dependencies]]
coordinate = "g:a:1"
checksum = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
"#,
                empty, good
            ),
        )
        .unwrap();
        let argfile = dir.path().join("cp.args");

        plugdeps_in(&dir)
            .arg("resolve")
            .arg(&request)
            .arg("--classpath-file")
            .arg(&argfile)
            .assert()
            .success()
            .stdout(predicate::str::contains("a-1.jar"));

        let args = std::fs::read_to_string(&argfile).unwrap();
        assert!(args.starts_with("-cp"));
        assert!(args.contains("a-1.jar"));

        plugdeps_in(&dir)
            .args(["cache", "list", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("g/a/1/a-1.jar"));

        plugdeps_in(&dir)
            .args(["cache", "invalidate", "g:a:1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("removed"));
    }

    #[test]
    fn fetch_missing_everywhere_fails_with_attempts() {
        let dir = TempDir::new().unwrap();
        let first = serve("/nothing", b"");
        let second = serve("/nothing", b"");

        plugdeps_in(&dir)
            .args(["fetch", "g:missing:1", "-r", &first, "-r", &second])
            .assert()
            .failure()
            .stderr(predicate::str::contains("2 attempt(s)"))
            .stderr(predicate::str::contains("404"));
    }
}
