//! Git-based VCS operations for remote dependency fetching.
//!
//! A package address doubles as its clone location: `github.com/org/repo`
//! becomes `https://github.com/org/repo.git`. Tag listing and cloning shell
//! out to the host `git` binary; both are bounded by a timeout and a
//! timed-out child is killed rather than orphaned. The `Vcs` trait is the
//! seam the resolver is tested through.

use failure::Error;
use itertools::Itertools;
use semver::Version;
use slog::Logger;
use std::io::{self, Read};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use std::thread;

use package::version::{parse_version_tag, select_min, Constraint};
use package::PackageAddress;
use util::errors::*;

const TAG_LIST_TIMEOUT: Duration = Duration::from_secs(60);
const CLONE_TIMEOUT: Duration = Duration::from_secs(120);

/// Remote operations against a version-control host.
pub trait Vcs {
    /// Lists the remote's semver tags as `(version, original_tag_name)`.
    fn list_version_tags(&self, clone_url: &str) -> Res<Vec<(Version, String)>>;

    /// Clones the repository at the given tag into `dest`, shallowly.
    fn clone_at_tag(&self, clone_url: &str, tag: &str, dest: &Path) -> Res<()>;
}

/// Maps a package address to its HTTPS clone URL, appending `.git` unless the
/// address already ends with it.
pub fn address_to_clone_url(address: &PackageAddress) -> String {
    let url = format!("https://{}", address);
    if url.ends_with(".git") {
        url
    } else {
        format!("{}.git", url)
    }
}

/// Selects the minimum tagged version matching `constraint` (MVS).
pub fn resolve_version_from_tags(
    version_tags: &[(Version, String)],
    constraint: &Constraint,
) -> Res<(Version, String)> {
    if version_tags.is_empty() {
        return Err(ErrorKind::VersionResolution(format!(
            "no version tags available to satisfy constraint '{}'",
            constraint
        )))?;
    }

    let versions: Vec<Version> = version_tags.iter().map(|entry| entry.0.clone()).collect();
    let selected = select_min(&versions, constraint).ok_or_else(|| {
        let mut available = versions.clone();
        available.sort();
        ErrorKind::VersionResolution(format!(
            "no version satisfying '{}' found among: {}",
            constraint,
            available.iter().join(", ")
        ))
    })?;

    for &(ref version, ref tag_name) in version_tags {
        if *version == selected {
            return Ok((selected, tag_name.clone()));
        }
    }
    // `selected` came out of the same list, so this cannot happen.
    Err(ErrorKind::VersionResolution(format!(
        "selected version {} not found in tag list",
        selected
    )))?
}

/// The production `Vcs` backed by the host `git` binary.
pub struct GitCli {
    logger: Logger,
}

impl GitCli {
    pub fn new(plog: &Logger) -> GitCli {
        GitCli {
            logger: plog.new(o!("vcs" => "git")),
        }
    }
}

impl Vcs for GitCli {
    fn list_version_tags(&self, clone_url: &str) -> Res<Vec<(Version, String)>> {
        debug!(self.logger, "listing remote tags"; "url" => clone_url);

        let output = run_git(
            &["ls-remote", "--tags", clone_url],
            TAG_LIST_TIMEOUT,
        )
        .map_err(|e| git_error(e, || format!("failed to list remote tags from '{}'", clone_url)))?;

        if !output.status.success() {
            return Err(ErrorKind::VcsFetch(format!(
                "failed to list remote tags from '{}': {}",
                clone_url,
                String::from_utf8_lossy(&output.stderr).trim()
            )))?;
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let mut version_tags = Vec::new();
        for line in stdout.lines() {
            let mut parts = line.split('\t');
            let _object_id = match parts.next() {
                Some(id) if !id.trim().is_empty() => id,
                _ => continue,
            };
            let reference = match parts.next() {
                Some(reference) => reference,
                None => continue,
            };

            // Dereferenced tag entries point at the same tag again.
            if reference.ends_with("^{}") {
                continue;
            }

            let tag_name = if reference.starts_with("refs/tags/") {
                &reference["refs/tags/".len()..]
            } else {
                reference
            };
            if let Some(version) = parse_version_tag(tag_name) {
                version_tags.push((version, tag_name.to_string()));
            }
        }

        Ok(version_tags)
    }

    fn clone_at_tag(&self, clone_url: &str, tag: &str, dest: &Path) -> Res<()> {
        debug!(self.logger, "cloning at tag"; "url" => clone_url, "tag" => tag);

        let dest = dest.to_string_lossy().into_owned();
        let output = run_git(
            &["clone", "--depth", "1", "--branch", tag, clone_url, &dest],
            CLONE_TIMEOUT,
        )
        .map_err(|e| {
            git_error(e, || format!("failed to clone '{}' at tag '{}'", clone_url, tag))
        })?;

        if !output.status.success() {
            return Err(ErrorKind::VcsFetch(format!(
                "failed to clone '{}' at tag '{}': {}",
                clone_url,
                tag,
                String::from_utf8_lossy(&output.stderr).trim()
            )))?;
        }
        Ok(())
    }
}

struct GitOutput {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

enum GitFailure {
    NotInstalled,
    TimedOut,
    Io(io::Error),
}

fn git_error<F: FnOnce() -> String>(failure: GitFailure, what: F) -> Error {
    let message = match failure {
        GitFailure::NotInstalled => "git is not installed or not found on PATH".to_string(),
        GitFailure::TimedOut => format!("{}: timed out", what()),
        GitFailure::Io(err) => format!("{}: {}", what(), err),
    };
    ErrorKind::VcsFetch(message).into()
}

/// Runs `git` with the given arguments, killing it once `timeout` elapses.
/// Stdout and stderr are drained on reader threads so a chatty child cannot
/// deadlock against a full pipe.
fn run_git(args: &[&str], timeout: Duration) -> Result<GitOutput, GitFailure> {
    let mut child = Command::new("git")
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                GitFailure::NotInstalled
            } else {
                GitFailure::Io(e)
            }
        })?;

    let stdout_rx = drain_pipe(child.stdout.take());
    let stderr_rx = drain_pipe(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(GitFailure::TimedOut);
                }
                thread::sleep(Duration::from_millis(20));
            }
            Err(e) => {
                let _ = child.kill();
                return Err(GitFailure::Io(e));
            }
        }
    };

    let stdout = stdout_rx.recv().unwrap_or_else(|_| Vec::new());
    let stderr = stderr_rx.recv().unwrap_or_else(|_| Vec::new());

    Ok(GitOutput {
        status,
        stdout,
        stderr,
    })
}

fn drain_pipe<R: Read + Send + 'static>(pipe: Option<R>) -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    match pipe {
        Some(mut pipe) => {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf);
                let _ = tx.send(buf);
            });
        }
        None => {
            let _ = tx.send(Vec::new());
        }
    }
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn clone_url_mapping() {
        let addr = PackageAddress::from_str("github.com/org/pkg").unwrap();
        assert_eq!(address_to_clone_url(&addr), "https://github.com/org/pkg.git");

        let already_git = PackageAddress::from_str("github.com/org/pkg.git").unwrap();
        assert_eq!(
            address_to_clone_url(&already_git),
            "https://github.com/org/pkg.git"
        );
    }

    #[test]
    fn version_selection_from_tags() {
        let tags = vec![
            (v("2.0.0"), "v2.0.0".to_string()),
            (v("1.0.0"), "v1.0.0".to_string()),
            (v("1.2.0"), "1.2.0".to_string()),
        ];

        let constraint = Constraint::from_str("^1.0.0").unwrap();
        let (version, tag) = resolve_version_from_tags(&tags, &constraint).unwrap();
        assert_eq!(version, v("1.0.0"));
        assert_eq!(tag, "v1.0.0");

        let newer = Constraint::from_str("^1.1.0").unwrap();
        let (version, tag) = resolve_version_from_tags(&tags, &newer).unwrap();
        assert_eq!(version, v("1.2.0"));
        assert_eq!(tag, "1.2.0");
    }

    #[test]
    fn version_selection_failures() {
        let constraint = Constraint::from_str("^1.0.0").unwrap();

        let err = resolve_version_from_tags(&[], &constraint).unwrap_err();
        match kind_of(&err) {
            Some(&ErrorKind::VersionResolution(_)) => {}
            other => panic!("unexpected kind: {:?}", other),
        }

        let tags = vec![(v("2.0.0"), "v2.0.0".to_string())];
        let err = resolve_version_from_tags(&tags, &constraint).unwrap_err();
        match kind_of(&err) {
            Some(&ErrorKind::VersionResolution(ref msg)) => {
                assert!(msg.contains("2.0.0"));
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }
}
