use std::cell::RefCell;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::thread;

use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::TempDir;

use rollout::defaults::{builtin_defaults, Defaults};
use rollout::deploy::HostStatus;
use rollout::digest::{compute_digest, DigestAlgorithm, DigestCheck};
use rollout::pipeline;
use rollout::request::DeploymentRequest;
use rollout::ssh::RemoteShell;

const BINARY: &[u8] = b"#!/bin/sh\necho myapp\n";

/// Records every remote call; answers release listings with `listing`.
#[derive(Default)]
struct RecordingShell {
    calls: RefCell<Vec<String>>,
    listing: String,
}

impl RemoteShell for RecordingShell {
    fn run(&self, host: &str, command: &str) -> rollout::Result<String> {
        self.calls.borrow_mut().push(format!("{} $ {}", host, command));
        if command.contains("-printf") {
            return Ok(self.listing.clone());
        }
        Ok(String::new())
    }

    fn copy_to(&self, host: &str, sources: &[PathBuf], remote_dir: &str) -> rollout::Result<()> {
        self.calls
            .borrow_mut()
            .push(format!("{} scp {} -> {}", host, sources.len(), remote_dir));
        Ok(())
    }
}

fn append(builder: &mut tar::Builder<GzEncoder<File>>, path: &str, body: &[u8], mode: u32) {
    let mut header = tar::Header::new_gnu();
    header.set_path(path).unwrap();
    header.set_size(body.len() as u64);
    header.set_mode(mode);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();
    builder.append(&header, body).unwrap();
}

fn build_package(dir: &Path) -> Vec<u8> {
    let binary = dir.join("binary");
    std::fs::write(&binary, BINARY).unwrap();
    let md5 = compute_digest(&binary, DigestAlgorithm::Md5).unwrap();

    let path = dir.join("build_42_myapp.tar.gz");
    let mut builder =
        tar::Builder::new(GzEncoder::new(File::create(&path).unwrap(), Compression::fast()));
    append(&mut builder, "build_42_myapp/myapp", BINARY, 0o755);
    append(
        &mut builder,
        "build_42_myapp/myapp.md5sum",
        format!("{}\n", md5).as_bytes(),
        0o644,
    );
    builder.into_inner().unwrap().finish().unwrap();
    std::fs::read(path).unwrap()
}

/// Serve `body` to a single request and return the base URL.
fn serve_once(body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap_or(0) > 0 && line != "\r\n" {
                line.clear();
            }
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(&body);
        }
    });
    format!("http://{}/", addr)
}

fn defaults_for(base_url: String) -> Defaults {
    let mut defaults = builtin_defaults();
    defaults.artifact.base_url = base_url;
    defaults
}

#[test]
fn deploys_package_to_single_host() {
    let scratch = TempDir::new().unwrap();
    let package = build_package(scratch.path());
    let defaults = defaults_for(serve_once(package));
    let request = DeploymentRequest::new(
        "build_42_myapp.tar.gz",
        "myapp",
        DigestCheck::Skip,
        None,
        vec!["10.0.0.5".to_string()],
    )
    .unwrap();

    let listing: String = ["r1", "r2", "r3", "r4", "r5", "myapp"]
        .iter()
        .enumerate()
        .map(|(i, name)| format!("{}.5 {}\n", 1_700_000_000 + i, name))
        .collect();
    let shell = RecordingShell {
        listing,
        ..Default::default()
    };

    let deployment = pipeline::deploy_release(&request, &defaults, &shell).unwrap();

    assert_eq!(deployment.artifact.release_name, "myapp");
    assert_eq!(deployment.report.release.as_deref(), Some("myapp"));
    let outcome = &deployment.report.hosts[0];
    assert_eq!(outcome.status, HostStatus::Succeeded);
    assert_eq!(outcome.pruned, vec!["r1"]);

    let calls = shell.calls.borrow();
    assert!(calls.contains(&"10.0.0.5 scp 2 -> /data/app/myapp/release/myapp".to_string()));
    assert!(calls.contains(
        &"10.0.0.5 $ ln -sfn '/data/app/myapp/release/myapp' '/data/app/myapp/current'"
            .to_string()
    ));
    assert!(calls.contains(&"10.0.0.5 $ rm -rf '/data/app/myapp/release/r1'".to_string()));
    assert_eq!(
        calls.last().map(String::as_str),
        Some("10.0.0.5 $ systemctl restart 'myapp.service'")
    );
}

#[test]
fn wrong_md5_halts_before_any_host_is_contacted() {
    let scratch = TempDir::new().unwrap();
    let package = build_package(scratch.path());
    let defaults = defaults_for(serve_once(package));
    let request = DeploymentRequest::new(
        "build_42_myapp.tar.gz",
        "myapp",
        DigestCheck::Verify,
        Some("00000000000000000000000000000000"),
        vec!["10.0.0.5".to_string(), "10.0.0.6".to_string()],
    )
    .unwrap();
    let shell = RecordingShell::default();

    let err = pipeline::deploy_release(&request, &defaults, &shell).unwrap_err();

    assert_eq!(err.code.as_str(), "digest.mismatch");
    assert!(shell.calls.borrow().is_empty());
}

#[test]
fn missing_package_is_fetch_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap_or(0) > 0 && line != "\r\n" {
                line.clear();
            }
            let _ = stream.write_all(
                b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            );
        }
    });

    let defaults = defaults_for(format!("http://{}/", addr));
    let request = DeploymentRequest::new(
        "build_42_myapp.tar.gz",
        "myapp",
        DigestCheck::Skip,
        None,
        vec!["10.0.0.5".to_string()],
    )
    .unwrap();
    let shell = RecordingShell::default();

    let err = pipeline::deploy_release(&request, &defaults, &shell).unwrap_err();
    assert_eq!(err.code.as_str(), "fetch.http_status");
    assert!(shell.calls.borrow().is_empty());
}
