//! Local key pair files and the `ssh-keygen` arguments that create them.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Parameters for a new key pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpec {
    /// `ssh-keygen -t` value
    pub key_type: String,
    pub bits: u32,
    pub comment: String,
}

impl KeySpec {
    pub fn rsa(bits: u32, comment: impl Into<String>) -> Self {
        Self {
            key_type: "rsa".to_string(),
            bits,
            comment: comment.into(),
        }
    }

    /// Arguments for a quiet, passphrase-less `ssh-keygen` run writing to `private_key`.
    pub fn keygen_args(&self, private_key: &Path) -> Vec<OsString> {
        vec![
            "-q".into(),
            "-t".into(),
            self.key_type.clone().into(),
            "-b".into(),
            self.bits.to_string().into(),
            "-N".into(),
            "".into(),
            "-C".into(),
            self.comment.clone().into(),
            "-f".into(),
            private_key.as_os_str().to_owned(),
        ]
    }
}

/// What exists on disk for a key pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    /// No private key; a new pair must be generated.
    Missing,
    /// Private key present, public half missing; it can be re-derived.
    PublicMissing,
    Complete,
}

/// Paths of a private key and its `.pub` sibling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub private: PathBuf,
    pub public: PathBuf,
}

impl KeyPair {
    pub fn at(private: impl Into<PathBuf>) -> Self {
        let private = private.into();
        let mut public: OsString = private.as_os_str().to_owned();
        public.push(".pub");
        Self {
            private,
            public: public.into(),
        }
    }

    /// The private key decides: a stray `.pub` without its private half counts as missing.
    pub fn state(&self) -> KeyState {
        match (self.private.exists(), self.public.exists()) {
            (false, _) => KeyState::Missing,
            (true, false) => KeyState::PublicMissing,
            (true, true) => KeyState::Complete,
        }
    }

    /// Public key line (`<type> <base64> <comment>`), trimmed.
    pub fn read_public(&self) -> io::Result<String> {
        let content = fs::read_to_string(&self.public)?;
        let line = content.trim();
        if line.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("public key {:?} is empty", self.public),
            ));
        }
        Ok(line.to_string())
    }

    /// Write a re-derived public key line next to the private key.
    pub fn write_public(&self, line: &str) -> io::Result<()> {
        fs::write(&self.public, format!("{}\n", line.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_keygen_args() {
        let spec = KeySpec::rsa(4096, "pi-link@pi-orchestrator");
        let args = spec.keygen_args(Path::new("/home/dev/.ssh/pi_orchestrator_rsa"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "-q",
                "-t",
                "rsa",
                "-b",
                "4096",
                "-N",
                "",
                "-C",
                "pi-link@pi-orchestrator",
                "-f",
                "/home/dev/.ssh/pi_orchestrator_rsa",
            ]
        );
    }

    #[test]
    fn test_pair_paths() {
        let pair = KeyPair::at("/k/pi_orchestrator_rsa");
        assert_eq!(pair.public, PathBuf::from("/k/pi_orchestrator_rsa.pub"));
    }

    #[test]
    fn test_state_transitions() {
        let dir = TempDir::new().unwrap();
        let pair = KeyPair::at(dir.path().join("id"));
        assert_eq!(pair.state(), KeyState::Missing);

        fs::write(&pair.public, "ssh-rsa AAAA stray\n").unwrap();
        assert_eq!(pair.state(), KeyState::Missing);

        fs::remove_file(&pair.public).unwrap();
        fs::write(&pair.private, "PRIVATE").unwrap();
        assert_eq!(pair.state(), KeyState::PublicMissing);

        pair.write_public("ssh-rsa AAAA comment").unwrap();
        assert_eq!(pair.state(), KeyState::Complete);
        assert_eq!(pair.read_public().unwrap(), "ssh-rsa AAAA comment");
    }

    #[test]
    fn test_read_empty_public_fails() {
        let dir = TempDir::new().unwrap();
        let pair = KeyPair::at(dir.path().join("id"));
        fs::write(&pair.public, "\n").unwrap();
        assert_eq!(
            pair.read_public().unwrap_err().kind(),
            io::ErrorKind::InvalidData
        );
    }
}
