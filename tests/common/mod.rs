#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use encoding_rs::WINDOWS_1251;
use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Writes UTF-8 `contents` into a file under the workspace.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        self.write_bytes(name, contents.as_bytes())
    }

    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents).expect("write temp file contents");
        path
    }

    /// Writes `contents` encoded as windows-1251.
    pub fn write_cp1251(&self, name: &str, contents: &str) -> PathBuf {
        self.write_bytes(name, &to_cp1251(contents))
    }

    pub fn read(&self, name: &str) -> Vec<u8> {
        fs::read(self.join(name)).expect("read workspace file")
    }
}

pub fn to_cp1251(text: &str) -> Vec<u8> {
    let (bytes, _, had_errors) = WINDOWS_1251.encode(text);
    assert!(!had_errors, "fixture text must be representable in cp1251");
    bytes.into_owned()
}

pub fn from_cp1251(bytes: &[u8]) -> String {
    let (text, had_errors) = WINDOWS_1251.decode_without_bom_handling(bytes);
    assert!(!had_errors, "output must be valid cp1251");
    text.into_owned()
}
