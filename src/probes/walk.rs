// src/probes/walk.rs

//! Filesystem and command helpers shared by the probes.

use crate::agent_log;
use log::Level;
use std::{
    fs,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

/// Recursively list all files under a directory.
/// Symlinked directories are not followed, so link cycles cannot loop.
pub fn list_files(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Ok(entries) = fs::read_dir(dir) {
        for e in entries.flatten() {
            let p = e.path();
            match e.file_type() {
                Ok(t) if t.is_dir() => out.extend(list_files(&p)),
                Ok(t) if t.is_file() => out.push(p),
                _ => {}
            }
        }
    }

    agent_log!(Level::Debug, "walk", "list_files: {:?} → {} entries", dir, out.len());
    out
}

/// Regular files directly inside `dir` (no recursion).
pub fn top_level_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else { return Vec::new() };
    entries
        .flatten()
        .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
        .map(|e| e.path())
        .collect()
}

/// Stdout of `program args…`, or `None` if it could not run or failed.
pub fn run_cmd(program: &str, args: &[&str]) -> Option<String> {
    let out = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .ok()?;
    if !out.status.success() && out.stdout.is_empty() {
        agent_log!(Level::Debug, "walk", "{} {:?} exited with {}", program, args, out.status);
        return None;
    }
    Some(String::from_utf8_lossy(&out.stdout).into_owned())
}
