//! In-memory host for tests.
//!
//! [`FakeHost`] implements [`HostExecutor`] by interpreting the small command
//! vocabulary the sync engine issues (`sha256sum`, `stat`, `mkdir`, `rm`,
//! `sh -c 'cat > "$1"'`, `chmod`, `chown`, `mv`) against a map of files.
//! Any other program succeeds with empty output and is only recorded, which
//! covers `systemctl` and `docker`. Programs are matched by basename.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use hostsync_exec::{HostCommand, HostExecError, HostExecutor, HostExit, HostOutput};

/// Programs that belong to the copy machinery rather than to post-copy actions.
const COPY_PROGRAMS: &[&str] = &["sha256sum", "stat", "mkdir", "rm", "sh", "chmod", "chown", "mv"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeFile {
    pub bytes: Vec<u8>,
    pub mode: u32,
    pub owner: String,
    pub group: String,
}

#[derive(Debug)]
struct FailRule {
    prefix: Vec<String>,
    /// Fail only the n-th matching command (1-based); `None` fails all.
    nth: Option<usize>,
    seen: usize,
    exit: i32,
}

#[derive(Debug)]
struct State {
    files: BTreeMap<PathBuf, FakeFile>,
    dirs: BTreeSet<PathBuf>,
    log: Vec<Vec<String>>,
    rules: Vec<FailRule>,
    corrupt: HashMap<PathBuf, Vec<u8>>,
    watched: Vec<PathBuf>,
    snapshots: Vec<Option<Vec<u8>>>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            files: BTreeMap::new(),
            dirs: BTreeSet::from([PathBuf::from("/")]),
            log: Vec::new(),
            rules: Vec::new(),
            corrupt: HashMap::new(),
            watched: Vec::new(),
            snapshots: Vec::new(),
        }
    }
}

impl State {
    fn make_dirs(&mut self, dir: &Path) {
        for ancestor in dir.ancestors() {
            if !ancestor.as_os_str().is_empty() {
                self.dirs.insert(ancestor.to_path_buf());
            }
        }
    }

    fn parent_exists(&self, path: &Path) -> bool {
        path.parent().map_or(true, |p| p.as_os_str().is_empty() || self.dirs.contains(p))
    }

    fn injected_failure(&mut self, argv: &[String]) -> Option<i32> {
        for rule in &mut self.rules {
            let matches = argv.len() >= rule.prefix.len()
                && rule.prefix.iter().zip(argv).all(|(want, got)| want == got);
            if !matches {
                continue;
            }
            rule.seen += 1;
            match rule.nth {
                None => return Some(rule.exit),
                Some(n) if n == rule.seen => return Some(rule.exit),
                Some(_) => {}
            }
        }
        None
    }

    fn interpret(&mut self, argv: &[String], stdin: Option<&[u8]>) -> Reply {
        let program = basename(&argv[0]);
        let last = argv.last().map(PathBuf::from).unwrap_or_default();
        match program {
            "sha256sum" => match self.files.get(&last) {
                Some(file) => {
                    let digest = hex::encode(Sha256::digest(&file.bytes));
                    Reply::ok(format!("{digest}  {}\n", last.display()))
                }
                None => Reply::fail(1, format!("sha256sum: {}: No such file or directory", last.display())),
            },
            "stat" => match self.files.get(&last) {
                Some(file) => Reply::ok(format!("{:o} {} {}\n", file.mode, file.owner, file.group)),
                None => Reply::fail(1, format!("stat: cannot statx '{}'", last.display())),
            },
            "mkdir" => {
                if self.files.contains_key(&last) {
                    return Reply::fail(1, "mkdir: File exists".to_owned());
                }
                self.make_dirs(&last);
                Reply::ok(String::new())
            }
            "rm" => {
                self.files.remove(&last);
                Reply::ok(String::new())
            }
            "sh" => {
                if !self.parent_exists(&last) {
                    return Reply::fail(2, "sh: cannot create: Directory nonexistent".to_owned());
                }
                let bytes = stdin.unwrap_or_default().to_vec();
                match self.files.get_mut(&last) {
                    Some(existing) => existing.bytes = bytes,
                    None => {
                        self.files.insert(last, FakeFile::root(bytes, 0o644));
                    }
                }
                Reply::ok(String::new())
            }
            "chmod" => {
                let mode = argv.get(1).and_then(|m| u32::from_str_radix(m, 8).ok());
                match (mode, self.files.get_mut(&last)) {
                    (Some(mode), Some(file)) => {
                        file.mode = mode;
                        Reply::ok(String::new())
                    }
                    _ => Reply::fail(1, "chmod: cannot access".to_owned()),
                }
            }
            "chown" => {
                let owner_group = argv.get(1).and_then(|s| s.split_once(':'));
                match (owner_group, self.files.get_mut(&last)) {
                    (Some((owner, group)), Some(file)) => {
                        file.owner = owner.to_owned();
                        file.group = group.to_owned();
                        Reply::ok(String::new())
                    }
                    _ => Reply::fail(1, "chown: cannot access".to_owned()),
                }
            }
            "mv" => {
                let from = PathBuf::from(&argv[argv.len().saturating_sub(2)]);
                if !self.parent_exists(&last) {
                    return Reply::fail(1, "mv: cannot move: No such file or directory".to_owned());
                }
                let Some(mut file) = self.files.remove(&from) else {
                    return Reply::fail(1, "mv: cannot stat: No such file or directory".to_owned());
                };
                if let Some(bytes) = self.corrupt.remove(&last) {
                    file.bytes = bytes;
                }
                self.files.insert(last, file);
                Reply::ok(String::new())
            }
            _ => Reply::ok(String::new()),
        }
    }

    fn snapshot(&mut self) {
        for path in self.watched.clone() {
            let bytes = self.files.get(&path).map(|f| f.bytes.clone());
            self.snapshots.push(bytes);
        }
    }
}

struct Reply {
    code: i32,
    stdout: String,
    stderr: String,
}

impl Reply {
    fn ok(stdout: String) -> Self {
        Self {
            code: 0,
            stdout,
            stderr: String::new(),
        }
    }

    fn fail(code: i32, stderr: String) -> Self {
        Self {
            code,
            stdout: String::new(),
            stderr,
        }
    }
}

impl FakeFile {
    fn root(bytes: Vec<u8>, mode: u32) -> Self {
        Self {
            bytes,
            mode,
            owner: "root".to_owned(),
            group: "root".to_owned(),
        }
    }
}

fn basename(program: &str) -> &str {
    program.rsplit('/').next().unwrap_or(program)
}

/// Scriptable in-memory host.
#[derive(Debug, Default)]
pub struct FakeHost {
    state: Mutex<State>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Place a root-owned file on the host, creating its directories.
    pub fn put_file(&self, path: impl AsRef<Path>, bytes: &[u8], mode: u32) {
        let path = path.as_ref();
        let mut state = self.state();
        if let Some(parent) = path.parent() {
            state.make_dirs(parent);
        }
        state.files.insert(path.to_path_buf(), FakeFile::root(bytes.to_vec(), mode));
    }

    /// Change ownership of an existing file, as an operator might by hand.
    pub fn set_owner(&self, path: impl AsRef<Path>, owner: &str, group: &str) {
        if let Some(file) = self.state().files.get_mut(path.as_ref()) {
            file.owner = owner.to_owned();
            file.group = group.to_owned();
        }
    }

    pub fn remove_file(&self, path: impl AsRef<Path>) {
        self.state().files.remove(path.as_ref());
    }

    pub fn file(&self, path: impl AsRef<Path>) -> Option<FakeFile> {
        self.state().files.get(path.as_ref()).cloned()
    }

    pub fn dir_exists(&self, path: impl AsRef<Path>) -> bool {
        self.state().dirs.contains(path.as_ref())
    }

    /// Every argv run so far, in order.
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.state().log.clone()
    }

    /// Every command run so far, space-joined.
    pub fn command_lines(&self) -> Vec<String> {
        self.commands().iter().map(|argv| argv.join(" ")).collect()
    }

    /// Commands other than the copy machinery: the post-copy actions.
    pub fn action_lines(&self) -> Vec<String> {
        self.commands()
            .iter()
            .filter(|argv| !COPY_PROGRAMS.contains(&basename(&argv[0])))
            .map(|argv| argv.join(" "))
            .collect()
    }

    pub fn clear_log(&self) {
        self.state().log.clear();
    }

    /// Fail every command whose argv starts with `prefix`.
    pub fn fail_on<I, S>(&self, prefix: I, exit: i32)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push_rule(prefix, None, exit);
    }

    /// Fail only the `n`-th command (1-based) whose argv starts with `prefix`.
    pub fn fail_on_nth<I, S>(&self, prefix: I, n: usize, exit: i32)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push_rule(prefix, Some(n), exit);
    }

    fn push_rule<I, S>(&self, prefix: I, nth: Option<usize>, exit: i32)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state().rules.push(FailRule {
            prefix: prefix.into_iter().map(Into::into).collect(),
            nth,
            seen: 0,
            exit,
        });
    }

    pub fn clear_failures(&self) {
        self.state().rules.clear();
    }

    /// The next rename onto `path` lands `bytes` instead of the staged content.
    pub fn corrupt_after_rename(&self, path: impl AsRef<Path>, bytes: &[u8]) {
        self.state()
            .corrupt
            .insert(path.as_ref().to_path_buf(), bytes.to_vec());
    }

    /// Record the content of `path` after every command.
    pub fn watch(&self, path: impl AsRef<Path>) {
        self.state().watched.push(path.as_ref().to_path_buf());
    }

    /// Observed contents of watched paths; `None` when absent.
    pub fn snapshots(&self) -> Vec<Option<Vec<u8>>> {
        self.state().snapshots.clone()
    }
}

#[async_trait]
impl HostExecutor for FakeHost {
    async fn run_on_host(&self, command: &HostCommand) -> Result<HostOutput, HostExecError> {
        let argv = command.argv();
        if argv.is_empty() {
            return Err(HostExecError::EmptyCommand);
        }

        let mut state = self.state();
        state.log.push(argv.to_vec());
        let reply = match state.injected_failure(argv) {
            Some(code) => Reply::fail(code, "injected failure".to_owned()),
            None => state.interpret(argv, command.stdin()),
        };
        state.snapshot();

        Ok(HostOutput {
            exit: HostExit::Code(reply.code),
            stdout: reply.stdout.into_bytes(),
            stderr: reply.stderr.into_bytes(),
            duration: Duration::ZERO,
        })
    }
}
