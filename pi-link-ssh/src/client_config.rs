//! Structured view of an OpenSSH client config (`~/.ssh/config`).
//!
//! The document keeps every original line verbatim so that rendering an
//! unmodified document reproduces the input byte-for-byte. Lines are grouped
//! into sections: a preamble before the first `Host`/`Match`, then one section
//! per `Host` or `Match` header. Only `Host` sections take part in alias lookups.
//!
//! `Include` directives are preserved but not followed.

use super::types::HostEntry;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
enum LineKind {
    Blank,
    Comment,
    /// Key is lowercased; value has surrounding quotes removed.
    Directive { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Line {
    raw: String,
    kind: LineKind,
}

impl Line {
    fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let kind = if trimmed.is_empty() {
            LineKind::Blank
        } else if trimmed.starts_with('#') {
            LineKind::Comment
        } else if let Some((key, value)) = split_directive(trimmed) {
            LineKind::Directive {
                key: key.to_lowercase(),
                value: unquote(value).to_string(),
            }
        } else {
            // A bare keyword with no value; ssh rejects these, we keep them as-is.
            LineKind::Comment
        };
        Self {
            raw: raw.to_string(),
            kind,
        }
    }

    fn is_directive(&self) -> bool {
        matches!(self.kind, LineKind::Directive { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Header {
    Preamble,
    Host(Vec<String>),
    Match,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    header: Header,
    /// Includes the header line itself for `Host`/`Match` sections.
    lines: Vec<Line>,
}

impl Section {
    fn has_alias(&self, alias: &str) -> bool {
        matches!(&self.header, Header::Host(patterns) if patterns.iter().any(|p| p == alias))
    }

    /// First value of a directive within this section (ssh uses the first one it sees).
    fn value(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| match &line.kind {
            LineKind::Directive { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    fn to_entry(&self, alias: &str) -> HostEntry {
        HostEntry {
            alias: alias.to_string(),
            hostname: self.value("hostname").map(String::from),
            user: self.value("user").map(String::from),
            port: self.value("port").and_then(|p| p.parse().ok()),
            identity_file: self.value("identityfile").map(expand_tilde),
            strict_host_key_checking: self.value("stricthostkeychecking").map(String::from),
        }
    }
}

/// A field of the managed entry that differs from what the file holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drift {
    pub field: &'static str,
    pub expected: String,
    pub found: Option<String>,
}

impl std::fmt::Display for Drift {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.found {
            Some(found) => write!(f, "{}: expected {}, found {}", self.field, self.expected, found),
            None => write!(f, "{}: expected {}, not set", self.field, self.expected),
        }
    }
}

/// Result of comparing the desired entry against the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryStatus {
    /// No `Host` block names the alias.
    Missing,
    /// A block names the alias and every managed field matches.
    Matches,
    /// A block names the alias but some fields differ.
    Differs(Vec<Drift>),
}

/// Result of [`SshConfigDocument::replace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Replaced,
    NotFound,
    /// The alias shares its `Host` line with other patterns; rewriting it would
    /// change those hosts too, so the document is left alone.
    SharedBlock,
}

/// An SSH client config file held as structured, order-preserving sections.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SshConfigDocument {
    sections: Vec<Section>,
    trailing_newline: bool,
    /// The file's first line ends in `\r\n`; lines written by us follow suit.
    crlf: bool,
}

impl SshConfigDocument {
    /// Read a config file. A missing file is an empty document.
    pub fn load(path: &Path) -> io::Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Self::parse(&content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Parse config text.
    pub fn parse(content: &str) -> Self {
        let mut doc = Self {
            sections: Vec::new(),
            trailing_newline: content.ends_with('\n'),
            crlf: content
                .split_once('\n')
                .is_some_and(|(first, _)| first.ends_with('\r')),
        };
        if content.is_empty() {
            return doc;
        }

        let body = content.strip_suffix('\n').unwrap_or(content);
        let mut current = Section {
            header: Header::Preamble,
            lines: Vec::new(),
        };

        for raw in body.split('\n') {
            let line = Line::parse(raw);
            let header = match &line.kind {
                LineKind::Directive { key, value } if key == "host" => Some(Header::Host(
                    value
                        .split_whitespace()
                        .map(|p| unquote(p).to_string())
                        .collect(),
                )),
                LineKind::Directive { key, .. } if key == "match" => Some(Header::Match),
                _ => None,
            };

            if let Some(header) = header {
                doc.push_section(std::mem::replace(
                    &mut current,
                    Section {
                        header,
                        lines: Vec::new(),
                    },
                ));
            }
            current.lines.push(line);
        }
        doc.push_section(current);
        doc
    }

    fn push_section(&mut self, section: Section) {
        if section.header == Header::Preamble && section.lines.is_empty() {
            return;
        }
        self.sections.push(section);
    }

    /// Render back to text. Unmodified documents reproduce their input exactly.
    pub fn render(&self) -> String {
        let mut out = self
            .sections
            .iter()
            .flat_map(|s| s.lines.iter())
            .map(|l| l.raw.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if self.trailing_newline && !self.sections.is_empty() {
            out.push('\n');
        }
        out
    }

    /// The first `Host` block naming `alias`.
    pub fn find_entry(&self, alias: &str) -> Option<HostEntry> {
        self.sections
            .iter()
            .find(|s| s.has_alias(alias))
            .map(|s| s.to_entry(alias))
    }

    /// Compare `desired` with the block for its alias, field by field.
    ///
    /// Only fields set on `desired` are checked. Hostnames and the host key
    /// policy compare case-insensitively; a missing `Port` counts as 22.
    pub fn entry_status(&self, desired: &HostEntry) -> EntryStatus {
        let Some(found) = self.find_entry(&desired.alias) else {
            return EntryStatus::Missing;
        };

        let mut drift = Vec::new();
        let mut check = |field: &'static str,
                         expected: Option<String>,
                         got: Option<String>,
                         eq: fn(&str, &str) -> bool| {
            if let Some(expected) = expected {
                let same = got.as_deref().is_some_and(|g| eq(&expected, g));
                if !same {
                    drift.push(Drift {
                        field,
                        expected,
                        found: got,
                    });
                }
            }
        };

        check(
            "HostName",
            desired.hostname.clone(),
            found.hostname.clone(),
            |a, b| a.eq_ignore_ascii_case(b),
        );
        check("User", desired.user.clone(), found.user.clone(), |a, b| a == b);
        check(
            "Port",
            desired.port.map(|p| p.to_string()),
            Some(found.effective_port().to_string()),
            |a, b| a == b,
        );
        check(
            "IdentityFile",
            desired.identity_file.as_ref().map(|p| p.display().to_string()),
            found.identity_file.as_ref().map(|p| p.display().to_string()),
            |a, b| a == b,
        );
        check(
            "StrictHostKeyChecking",
            desired.strict_host_key_checking.clone(),
            found.strict_host_key_checking.clone(),
            |a, b| a.eq_ignore_ascii_case(b),
        );

        if drift.is_empty() {
            EntryStatus::Matches
        } else {
            EntryStatus::Differs(drift)
        }
    }

    /// Append a `Host` block for `entry`, separated from existing content by a blank line.
    ///
    /// Does not check for an existing alias; callers decide via [`Self::entry_status`].
    pub fn append(&mut self, entry: &HostEntry) {
        let eol = self.eol_suffix();
        if let Some(last) = self.sections.last_mut()
            && let Some(last_line) = last.lines.last_mut()
        {
            // the old last line may have had no terminator at all
            if !last_line.raw.ends_with(eol) {
                last_line.raw.push_str(eol);
            }
            if last_line.kind != LineKind::Blank {
                last.lines.push(Line::parse(eol));
            }
        }
        self.sections.push(Section {
            header: Header::Host(vec![entry.alias.clone()]),
            lines: self.entry_lines(entry),
        });
        self.trailing_newline = true;
    }

    /// Rewrite the block for `entry.alias` in place.
    ///
    /// Comments and blank lines trailing the old block are kept so spacing
    /// around neighbouring blocks is unchanged.
    pub fn replace(&mut self, entry: &HostEntry) -> ReplaceOutcome {
        let lines = self.entry_lines(entry);
        let Some(section) = self.sections.iter_mut().find(|s| s.has_alias(&entry.alias)) else {
            return ReplaceOutcome::NotFound;
        };
        if matches!(&section.header, Header::Host(patterns) if patterns.len() > 1) {
            return ReplaceOutcome::SharedBlock;
        }

        let body_end = section
            .lines
            .iter()
            .rposition(Line::is_directive)
            .map_or(0, |i| i + 1);
        let trailing = section.lines.split_off(body_end);
        section.lines = lines;
        section.lines.extend(trailing);
        ReplaceOutcome::Replaced
    }

    /// What precedes the `\n` separator on lines we add: `\r` for CRLF files.
    fn eol_suffix(&self) -> &'static str {
        if self.crlf { "\r" } else { "" }
    }

    fn entry_lines(&self, entry: &HostEntry) -> Vec<Line> {
        let eol = self.eol_suffix();
        render_entry(entry)
            .into_iter()
            .map(|raw| Line::parse(&format!("{raw}{eol}")))
            .collect()
    }

    /// Write the document to `path` with owner-only permissions.
    ///
    /// Creates the parent directory (mode `0700`) if needed. Symlinked configs
    /// are written through the link so dotfile managers keep working; regular
    /// files are replaced atomically via a temp file.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)?;
            restrict_permissions(parent, 0o700)?;
        }

        let content = self.render();
        let is_symlink = fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink());
        if is_symlink {
            fs::write(path, &content)?;
        } else {
            let temp_path = temp_sibling(path);
            fs::write(&temp_path, &content)?;
            restrict_permissions(&temp_path, 0o600)?;
            fs::rename(&temp_path, path)?;
        }
        restrict_permissions(path, 0o600)
    }
}

/// Render the managed block for an entry.
fn render_entry(entry: &HostEntry) -> Vec<String> {
    let mut lines = vec![format!("Host {}", entry.alias)];
    if let Some(hostname) = &entry.hostname {
        lines.push(format!("    HostName {hostname}"));
    }
    if let Some(user) = &entry.user {
        lines.push(format!("    User {user}"));
    }
    if let Some(port) = entry.port {
        lines.push(format!("    Port {port}"));
    }
    if let Some(identity) = &entry.identity_file {
        let identity = quote_if_needed(&identity.display().to_string());
        lines.push(format!("    IdentityFile {}", identity));
    }
    if let Some(policy) = &entry.strict_host_key_checking {
        lines.push(format!("    StrictHostKeyChecking {policy}"));
    }
    lines
}

/// Split `Key value` or `Key=value` (whitespace around `=` allowed).
fn split_directive(line: &str) -> Option<(&str, &str)> {
    let key_end = line.find(|c: char| c.is_whitespace() || c == '=')?;
    let (key, rest) = line.split_at(key_end);
    let rest = rest.trim_start();
    let value = rest.strip_prefix('=').unwrap_or(rest).trim();
    if key.is_empty() || value.is_empty() {
        return None;
    }
    Some((key, value))
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn quote_if_needed(value: &str) -> String {
    if value.chars().any(char::is_whitespace) {
        format!("\"{value}\"")
    } else {
        value.to_string()
    }
}

fn expand_tilde(value: &str) -> PathBuf {
    if let Some(rest) = value.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(value)
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "config".into());
    name.push(".pi-link.tmp");
    path.with_file_name(name)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SshTarget;

    fn managed(host: &str, port: u16) -> HostEntry {
        HostEntry::managed(
            "pi-orchestrator",
            &SshTarget::new(host, "pi", port),
            Path::new("/home/dev/.ssh/pi_orchestrator_rsa"),
        )
    }

    #[test]
    fn test_round_trip_is_exact() {
        let inputs = [
            "",
            "\n",
            "Host *\n    ServerAliveInterval 60\n",
            "# leading comment\n\nHost a b\n  HostName=a.example.com\n\tUser root\n\nMatch host x\n  User y",
            "Host web\r\n    HostName web.example.com\r\n",
        ];
        for input in inputs {
            assert_eq!(SshConfigDocument::parse(input).render(), input);
        }
    }

    #[test]
    fn test_parse_basic_host() {
        let doc = SshConfigDocument::parse(
            "Host myserver\n    HostName 192.168.1.100\n    User deploy\n    Port 2222\n",
        );
        let entry = doc.find_entry("myserver").unwrap();
        assert_eq!(entry.hostname.as_deref(), Some("192.168.1.100"));
        assert_eq!(entry.user.as_deref(), Some("deploy"));
        assert_eq!(entry.port, Some(2222));
    }

    #[test]
    fn test_multi_alias_host_line_resolves_each_alias() {
        let doc = SshConfigDocument::parse(
            "Host *\n    ServerAliveInterval 60\n\nHost foo bar\n    HostName shared.example.com\n",
        );
        let foo = doc.find_entry("foo").unwrap();
        let bar = doc.find_entry("bar").unwrap();
        assert_eq!(foo.hostname.as_deref(), Some("shared.example.com"));
        assert_eq!(foo.hostname, bar.hostname);
        assert!(doc.find_entry("*").is_some());
    }

    #[test]
    fn test_alias_match_is_exact() {
        let doc = SshConfigDocument::parse("Host pi-orchestrator-old\n    HostName 1.2.3.4\n");
        assert!(doc.find_entry("pi-orchestrator").is_none());
        assert_eq!(doc.entry_status(&managed("10.0.0.5", 22)), EntryStatus::Missing);
    }

    #[test]
    fn test_commented_alias_is_not_an_entry() {
        let doc = SshConfigDocument::parse("# Host pi-orchestrator\n#   HostName 10.0.0.5\n");
        assert!(doc.find_entry("pi-orchestrator").is_none());
    }

    #[test]
    fn test_equals_syntax_and_quotes() {
        let doc = SshConfigDocument::parse(
            "Host eqhost\n    HostName = eq.example.com\n    IdentityFile \"/keys/my key\"\n",
        );
        let entry = doc.find_entry("eqhost").unwrap();
        assert_eq!(entry.hostname.as_deref(), Some("eq.example.com"));
        assert_eq!(entry.identity_file, Some(PathBuf::from("/keys/my key")));
    }

    #[test]
    fn test_identity_file_tilde_expansion() {
        let doc = SshConfigDocument::parse("Host myhost\n    IdentityFile ~/.ssh/id_work\n");
        let entry = doc.find_entry("myhost").unwrap();
        assert!(!entry.identity_file.unwrap().starts_with("~"));
    }

    #[test]
    fn test_append_to_empty() {
        let mut doc = SshConfigDocument::default();
        doc.append(&managed("10.0.0.5", 22));
        assert_eq!(
            doc.render(),
            "Host pi-orchestrator\n    HostName 10.0.0.5\n    User pi\n    Port 22\n    IdentityFile /home/dev/.ssh/pi_orchestrator_rsa\n    StrictHostKeyChecking accept-new\n"
        );
        assert_eq!(doc.entry_status(&managed("10.0.0.5", 22)), EntryStatus::Matches);
    }

    #[test]
    fn test_append_separates_with_blank_line() {
        let mut doc = SshConfigDocument::parse("Host web\n    HostName web.example.com");
        doc.append(&managed("10.0.0.5", 22));
        let rendered = doc.render();
        assert!(
            rendered.starts_with("Host web\n    HostName web.example.com\n\nHost pi-orchestrator\n")
        );
        assert!(rendered.ends_with('\n'));
        assert_eq!(rendered.matches("Host pi-orchestrator").count(), 1);
    }

    #[test]
    fn test_append_after_blank_line_adds_no_extra_blank() {
        let mut doc = SshConfigDocument::parse("Host web\n    User www\n\n");
        doc.append(&managed("10.0.0.5", 22));
        assert!(doc.render().starts_with("Host web\n    User www\n\nHost pi-orchestrator\n"));
    }

    #[test]
    fn test_append_keeps_crlf_line_endings() {
        let mut doc = SshConfigDocument::parse("Host web\r\n    HostName web.example.com\r\n");
        doc.append(&managed("10.0.0.5", 22));
        let rendered = doc.render();
        assert!(rendered.starts_with(
            "Host web\r\n    HostName web.example.com\r\n\r\nHost pi-orchestrator\r\n"
        ));
        assert!(rendered.ends_with("    StrictHostKeyChecking accept-new\r\n"));
        assert_eq!(rendered.matches('\n').count(), rendered.matches("\r\n").count());
        assert_eq!(
            SshConfigDocument::parse(&rendered).entry_status(&managed("10.0.0.5", 22)),
            EntryStatus::Matches
        );
    }

    #[test]
    fn test_append_to_crlf_file_without_final_newline() {
        let mut doc = SshConfigDocument::parse("Host web\r\n    User www");
        doc.append(&managed("10.0.0.5", 22));
        assert!(
            doc.render()
                .starts_with("Host web\r\n    User www\r\n\r\nHost pi-orchestrator\r\n")
        );
    }

    #[test]
    fn test_replace_keeps_crlf_line_endings() {
        let mut doc = SshConfigDocument::parse(
            "Host pi-orchestrator\r\n    HostName 10.0.0.9\r\n\r\nHost web\r\n    User www\r\n",
        );
        assert_eq!(doc.replace(&managed("10.0.0.5", 22)), ReplaceOutcome::Replaced);
        let rendered = doc.render();
        assert!(rendered.contains("    HostName 10.0.0.5\r\n"));
        assert_eq!(rendered.matches('\n').count(), rendered.matches("\r\n").count());
    }

    #[test]
    fn test_status_reports_drift() {
        let mut doc = SshConfigDocument::default();
        doc.append(&managed("10.0.0.5", 22));
        match doc.entry_status(&managed("10.0.0.9", 2222)) {
            EntryStatus::Differs(drift) => {
                let fields: Vec<_> = drift.iter().map(|d| d.field).collect();
                assert_eq!(fields, vec!["HostName", "Port"]);
                assert_eq!(drift[0].found.as_deref(), Some("10.0.0.5"));
                assert_eq!(drift[1].to_string(), "Port: expected 2222, found 22");
            }
            other => panic!("expected drift, got {other:?}"),
        }
    }

    #[test]
    fn test_status_defaults_port_and_ignores_case() {
        let doc = SshConfigDocument::parse(
            "Host pi-orchestrator\n  hostname PI.LOCAL\n  user pi\n  identityfile /home/dev/.ssh/pi_orchestrator_rsa\n  stricthostkeychecking Accept-New\n",
        );
        assert_eq!(doc.entry_status(&managed("pi.local", 22)), EntryStatus::Matches);
    }

    #[test]
    fn test_status_missing_field_is_drift() {
        let doc = SshConfigDocument::parse("Host pi-orchestrator\n    HostName 10.0.0.5\n");
        match doc.entry_status(&managed("10.0.0.5", 22)) {
            EntryStatus::Differs(drift) => {
                assert!(drift.iter().any(|d| d.field == "User" && d.found.is_none()));
                assert!(drift.iter().all(|d| d.field != "Port"));
            }
            other => panic!("expected drift, got {other:?}"),
        }
    }

    #[test]
    fn test_replace_preserves_neighbours() {
        let original = "# mine\nHost web\n    User www\n\nHost pi-orchestrator\n    HostName 1.1.1.1\n\n# tail comment\nHost db\n    User pg\n";
        let mut doc = SshConfigDocument::parse(original);
        assert_eq!(doc.replace(&managed("10.0.0.5", 22)), ReplaceOutcome::Replaced);
        let rendered = doc.render();
        assert!(rendered.starts_with(
            "# mine\nHost web\n    User www\n\nHost pi-orchestrator\n    HostName 10.0.0.5\n"
        ));
        assert!(rendered.ends_with(
            "StrictHostKeyChecking accept-new\n\n# tail comment\nHost db\n    User pg\n"
        ));
        assert_eq!(doc.entry_status(&managed("10.0.0.5", 22)), EntryStatus::Matches);
    }

    #[test]
    fn test_replace_refuses_shared_block() {
        let mut doc =
            SshConfigDocument::parse("Host pi-orchestrator other\n    HostName 1.1.1.1\n");
        assert_eq!(doc.replace(&managed("10.0.0.5", 22)), ReplaceOutcome::SharedBlock);
        assert_eq!(doc.render(), "Host pi-orchestrator other\n    HostName 1.1.1.1\n");
    }

    #[test]
    fn test_replace_not_found() {
        let mut doc = SshConfigDocument::default();
        assert_eq!(doc.replace(&managed("10.0.0.5", 22)), ReplaceOutcome::NotFound);
    }

    #[test]
    fn test_load_missing_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let doc = SshConfigDocument::load(&dir.path().join("config")).unwrap();
        assert_eq!(doc.render(), "");
    }

    #[cfg(unix)]
    #[test]
    fn test_save_creates_dir_and_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(".ssh").join("config");
        let mut doc = SshConfigDocument::default();
        doc.append(&managed("10.0.0.5", 22));
        doc.save(&path).unwrap();

        let file_mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        let dir_mode = fs::metadata(path.parent().unwrap()).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        assert_eq!(dir_mode, 0o700);
        assert_eq!(SshConfigDocument::load(&path).unwrap(), doc);
    }

    #[cfg(unix)]
    #[test]
    fn test_save_writes_through_symlink() {
        let dir = tempfile::TempDir::new().unwrap();
        let real = dir.path().join("dotfiles-ssh-config");
        fs::write(&real, "Host web\n    User www\n").unwrap();
        let link = dir.path().join("config");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let mut doc = SshConfigDocument::load(&link).unwrap();
        doc.append(&managed("10.0.0.5", 22));
        doc.save(&link).unwrap();

        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert!(fs::read_to_string(&real).unwrap().contains("Host pi-orchestrator"));
    }
}
