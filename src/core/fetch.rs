//! HTTP artifact download.

use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// File name used when the URL has no usable last segment.
pub const FALLBACK_FILE_NAME: &str = "downloaded_file";

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub max_redirects: usize,
}

/// Last path segment of `url`, ignoring any query string or fragment.
pub fn file_name_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

fn build_client(options: &FetchOptions) -> Result<Client> {
    let max_redirects = options.max_redirects;
    let policy = Policy::custom(move |attempt| {
        if attempt.previous().len() > max_redirects {
            return attempt.error("too many redirects");
        }
        log_status!("fetch", "Redirected to {}", attempt.url());
        attempt.follow()
    });

    Client::builder()
        .user_agent(format!("rollout/{}", VERSION))
        .timeout(options.timeout)
        .redirect(policy)
        .build()
        .map_err(|e| Error::internal_io(e.to_string(), Some("create HTTP client".to_string())))
}

/// Download `base_url + package_name` into `dest_dir`, returning the local path.
///
/// A failed body copy can leave a truncated file behind; callers must verify it
/// before use.
pub fn fetch(
    base_url: &str,
    package_name: &str,
    dest_dir: &Path,
    options: &FetchOptions,
) -> Result<PathBuf> {
    let url = format!("{}{}", base_url, package_name);
    let client = build_client(options)?;

    log_status!("fetch", "Downloading {}", url);
    let mut response = client
        .get(&url)
        .send()
        .map_err(|e| Error::fetch_failed(&url, e.to_string()))?;

    if response.status() != StatusCode::OK {
        return Err(Error::fetch_http_status(&url, response.status().as_u16()));
    }

    let file_name = file_name_from_url(&url).unwrap_or_else(|| FALLBACK_FILE_NAME.to_string());
    let dest = dest_dir.join(file_name);
    let mut out = File::create(&dest).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("create {}", dest.display())))
    })?;

    let bytes = response
        .copy_to(&mut out)
        .map_err(|e| Error::fetch_failed(&url, format!("write {}: {}", dest.display(), e)))?;

    log_status!("fetch", "Saved {} ({} bytes)", dest.display(), bytes);
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;
    use tempfile::TempDir;

    fn options() -> FetchOptions {
        FetchOptions {
            timeout: Duration::from_secs(10),
            max_redirects: 10,
        }
    }

    /// Serve each canned response to one connection, in order.
    fn serve(responses: Vec<String>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            for response in responses {
                let (mut stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut line = String::new();
                while reader.read_line(&mut line).unwrap() > 0 && line != "\r\n" {
                    line.clear();
                }
                stream.write_all(response.as_bytes()).unwrap();
            }
        });
        format!("http://{}/", addr)
    }

    fn ok(body: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    }

    #[test]
    fn file_name_is_last_segment() {
        assert_eq!(
            file_name_from_url("https://host/bucket/build_42_myapp.tar.gz").as_deref(),
            Some("build_42_myapp.tar.gz")
        );
        assert_eq!(
            file_name_from_url("https://host/pkg.tgz?sig=abc").as_deref(),
            Some("pkg.tgz")
        );
        assert_eq!(file_name_from_url("https://host/bucket/"), None);
    }

    #[test]
    fn downloads_into_dest_dir() {
        let base = serve(vec![ok("archive-bytes")]);
        let dir = TempDir::new().unwrap();

        let path = fetch(&base, "build_42_myapp.tar.gz", dir.path(), &options()).unwrap();
        assert_eq!(path, dir.path().join("build_42_myapp.tar.gz"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "archive-bytes");
    }

    #[test]
    fn follows_redirects() {
        let target = serve(vec![ok("moved-bytes")]);
        let redirect = format!(
            "HTTP/1.1 302 Found\r\nLocation: {}build_42_myapp.tar.gz\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            target
        );
        let base = serve(vec![redirect]);

        let dir = TempDir::new().unwrap();
        let path = fetch(&base, "build_42_myapp.tar.gz", dir.path(), &options()).unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "moved-bytes");
    }

    #[test]
    fn non_200_is_http_status_error() {
        let base = serve(vec![
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
        ]);
        let dir = TempDir::new().unwrap();

        let err = fetch(&base, "missing.tar.gz", dir.path(), &options()).unwrap_err();
        assert_eq!(err.code.as_str(), "fetch.http_status");
        assert_eq!(err.details["status"], 404);
        assert!(!dir.path().join("missing.tar.gz").exists());
    }

    #[test]
    fn unreachable_host_is_fetch_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}/", listener.local_addr().unwrap());
        drop(listener);
        let dir = TempDir::new().unwrap();

        let err = fetch(&base, "pkg.tar.gz", dir.path(), &options()).unwrap_err();
        assert_eq!(err.code.as_str(), "fetch.failed");
    }
}
