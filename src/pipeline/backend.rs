//! Backend adapters: one external converter per [`BackendDescriptor`].
//!
//! A backend is plain data (name, priority, command template, formats) plus
//! an availability check, which may be a closure. The fallback chain iterates
//! an ordered list of them; there is no trait hierarchy to implement.
//!
//! ## Timeouts
//!
//! External converters are not trusted to exit on their own. LibreOffice in
//! particular can sit forever behind an invisible dialog. Every invocation
//! races the child against a deadline. Each child leads its own process
//! group (unix), so when the deadline wins the whole group gets SIGKILL,
//! including launcher-spawned workers such as `soffice.bin`. The child is then
//! reaped and whatever it half-wrote is deleted before returning. Elsewhere
//! the kill falls back to [`tokio::process::Child::start_kill`].
//!
//! ## Output locations
//!
//! Converters disagree about where they write. [`OutputTarget`] captures the
//! four conventions seen in practice and the adapter always relocates the
//! result onto the caller-specified path.

use crate::error::ConvertError;
use crate::format::DocumentFormat;
use crate::request::ConversionRequest;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// How long an availability probe (`<program> --version`) may take.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

static RE_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([a-z_]+)\}").unwrap());

/// Placeholders a command template may reference.
pub const PLACEHOLDERS: [&str; 7] = [
    "input",
    "input_stem",
    "output",
    "output_dir",
    "output_stem",
    "target_ext",
    "profile_dir",
];

// ── Command template ─────────────────────────────────────────────────────

/// Program plus argument list with `{placeholder}` substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    program: String,
    program_env: Option<String>,
    /// Tried in order when `program` does not resolve.
    fallback_programs: Vec<String>,
    args: Vec<String>,
}

impl CommandTemplate {
    /// Build a template, rejecting unknown placeholders.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Result<Self, ConvertError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let program = program.into();
        if program.trim().is_empty() {
            return Err(ConvertError::InvalidConfig(
                "command template has an empty program".into(),
            ));
        }
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        for arg in &args {
            for cap in RE_PLACEHOLDER.captures_iter(arg) {
                let name = &cap[1];
                if !PLACEHOLDERS.contains(&name) {
                    return Err(ConvertError::InvalidConfig(format!(
                        "unknown placeholder '{{{name}}}' in argument '{arg}' (known: {})",
                        PLACEHOLDERS.join(", ")
                    )));
                }
            }
        }
        Ok(Self {
            program,
            program_env: None,
            fallback_programs: Vec::new(),
            args,
        })
    }

    /// Let an environment variable (e.g. `LIBREOFFICE_PATH`) override the program.
    pub fn with_program_env(mut self, var: impl Into<String>) -> Self {
        self.program_env = Some(var.into());
        self
    }

    /// Alternative names or install locations, e.g. `/opt/libreoffice/program/soffice`.
    pub fn with_fallback_programs<I, S>(mut self, programs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback_programs = programs
            .into_iter()
            .map(Into::into)
            .filter(|p: &String| !p.trim().is_empty())
            .collect();
        self
    }

    pub fn fallback_programs(&self) -> &[String] {
        &self.fallback_programs
    }

    /// The program to execute.
    ///
    /// The environment override wins when set. Otherwise the first of
    /// `program` and the fallbacks that resolves is used, and `program`
    /// itself when none does.
    pub fn program(&self) -> String {
        if let Some(p) = self
            .program_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|p| !p.trim().is_empty())
        {
            return p;
        }
        if self.fallback_programs.is_empty() {
            return self.program.clone();
        }
        std::iter::once(&self.program)
            .chain(&self.fallback_programs)
            .find(|p| find_program(p).is_some())
            .unwrap_or(&self.program)
            .clone()
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn uses(&self, placeholder: &str) -> bool {
        let needle = format!("{{{placeholder}}}");
        self.args.iter().any(|a| a.contains(&needle))
    }

    fn render(&self, values: &HashMap<&'static str, String>) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                RE_PLACEHOLDER
                    .replace_all(arg, |caps: &regex::Captures<'_>| {
                        values
                            .get(&caps[1])
                            .cloned()
                            .unwrap_or_else(|| caps[0].to_string())
                    })
                    .into_owned()
            })
            .collect()
    }
}

// ── Descriptor ───────────────────────────────────────────────────────────

/// Where a converter leaves its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputTarget {
    /// The tool writes exactly `{output}`. (default)
    #[default]
    File,
    /// The tool writes `<{output_dir}>/<input stem>.<ext>` (LibreOffice).
    Directory,
    /// The tool appends the extension to `{output_stem}` (Tesseract).
    Stem,
    /// The tool writes the document to stdout.
    Stdout,
}

/// Decides whether a backend is installed and usable.
#[derive(Clone, Default)]
pub enum AvailabilityCheck {
    /// Always available.
    Always,
    /// Available when the program resolves on `PATH` (or exists, if a path). (default)
    #[default]
    OnPath,
    /// Available when `<program> <args>` exits 0 within 5 s. Cached per descriptor.
    Probe { args: Vec<String> },
    /// Caller-supplied check.
    Custom(Arc<dyn Fn() -> bool + Send + Sync>),
}

impl fmt::Debug for AvailabilityCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AvailabilityCheck::Always => f.write_str("Always"),
            AvailabilityCheck::OnPath => f.write_str("OnPath"),
            AvailabilityCheck::Probe { args } => f.debug_struct("Probe").field("args", args).finish(),
            AvailabilityCheck::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}

/// One external converter.
#[derive(Debug, Clone)]
pub struct BackendDescriptor {
    /// Unique name; also used as the attempt's scratch directory name.
    pub name: String,
    /// Lower is tried first.
    pub priority: i32,
    pub command: CommandTemplate,
    pub availability: AvailabilityCheck,
    /// Source formats this backend reads. Empty means any.
    pub accepts: Vec<DocumentFormat>,
    pub produces: DocumentFormat,
    pub output: OutputTarget,
    /// Extra environment variables for the child process.
    pub env: Vec<(String, String)>,
    probe_cache: Arc<OnceCell<bool>>,
}

impl BackendDescriptor {
    /// A backend producing PDF into `{output}`, available when on `PATH`.
    pub fn new(name: impl Into<String>, priority: i32, command: CommandTemplate) -> Self {
        Self {
            name: name.into(),
            priority,
            command,
            availability: AvailabilityCheck::default(),
            accepts: Vec::new(),
            produces: DocumentFormat::Pdf,
            output: OutputTarget::default(),
            env: Vec::new(),
            probe_cache: Arc::new(OnceCell::new()),
        }
    }

    pub fn availability(mut self, check: AvailabilityCheck) -> Self {
        self.availability = check;
        self.probe_cache = Arc::new(OnceCell::new());
        self
    }

    pub fn accepts(mut self, formats: impl IntoIterator<Item = DocumentFormat>) -> Self {
        self.accepts = formats.into_iter().collect();
        self
    }

    pub fn produces(mut self, format: DocumentFormat) -> Self {
        self.produces = format;
        self
    }

    pub fn output(mut self, target: OutputTarget) -> Self {
        self.output = target;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Whether this backend converts `source` into `target`.
    pub fn handles(&self, source: DocumentFormat, target: DocumentFormat) -> bool {
        self.produces == target && (self.accepts.is_empty() || self.accepts.contains(&source))
    }

    /// Run the availability check.
    pub async fn is_available(&self) -> bool {
        match &self.availability {
            AvailabilityCheck::Always => true,
            AvailabilityCheck::OnPath => find_program(&self.command.program()).is_some(),
            AvailabilityCheck::Probe { args } => {
                let program = self.command.program();
                *self
                    .probe_cache
                    .get_or_init(|| probe(program, args.clone()))
                    .await
            }
            AvailabilityCheck::Custom(check) => check(),
        }
    }

    /// Invoke the converter for `request`, leaving its output at `output_path`.
    ///
    /// Never blocks past `request.timeout()` plus `limits.kill_grace`. On
    /// timeout or failure no file is left at `output_path`, nor where the
    /// tool writes for [`OutputTarget::Directory`] and [`OutputTarget::Stem`].
    pub async fn invoke(
        &self,
        request: &ConversionRequest,
        output_path: &Path,
        limits: &InvokeLimits,
    ) -> RawResult {
        let start = Instant::now();
        let spawn_failed = |detail: String| RawResult {
            status: RawStatus::SpawnFailed { detail },
            output_path: None,
            stderr: String::new(),
            duration: start.elapsed(),
        };

        let output_dir = output_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        if let Err(e) = tokio::fs::create_dir_all(&output_dir).await {
            return spawn_failed(format!("cannot create '{}': {e}", output_dir.display()));
        }
        remove_if_exists(output_path).await;

        // Isolated per-attempt profile, removed when `profile` drops.
        let profile = if self.command.uses("profile_dir") {
            match tempfile::Builder::new()
                .prefix("profile-")
                .tempdir_in(&output_dir)
            {
                Ok(dir) => Some(dir),
                Err(e) => return spawn_failed(format!("cannot create profile dir: {e}")),
            }
        } else {
            None
        };

        let target_ext = request.target_format().extension();
        let input_stem = request
            .source_path()
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let output_stem = output_path.with_extension("");

        let mut values: HashMap<&'static str, String> = HashMap::new();
        values.insert("input", request.source_path().display().to_string());
        values.insert("input_stem", input_stem.clone());
        values.insert("output", output_path.display().to_string());
        values.insert("output_dir", output_dir.display().to_string());
        values.insert("output_stem", output_stem.display().to_string());
        values.insert("target_ext", target_ext.to_string());
        if let Some(ref p) = profile {
            values.insert("profile_dir", p.path().display().to_string());
        }

        let program = self.command.program();
        let args = self.command.render(&values);
        debug!("[{}] {} {}", self.name, program, args.join(" "));

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(if self.output == OutputTarget::Stdout {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => return spawn_failed(format!("{program}: {e}")),
        };

        let max_stderr = limits.max_stderr_bytes;
        let stderr_task = child
            .stderr
            .take()
            .map(|err| tokio::spawn(read_bounded(err, max_stderr)));
        let stdout_task = child.stdout.take().map(|out| {
            let dest = output_path.to_path_buf();
            tokio::spawn(async move {
                let mut file = tokio::fs::File::create(&dest).await?;
                let mut out = out;
                tokio::io::copy(&mut out, &mut file).await?;
                file.sync_all().await
            })
        });

        let waited = tokio::select! {
            status = child.wait() => Some(status),
            _ = tokio::time::sleep(request.timeout()) => None,
        };

        let status = match waited {
            Some(Ok(status)) => Some(status),
            Some(Err(e)) => {
                warn!("[{}] wait failed: {}", self.name, e);
                kill_tree(&mut child, &self.name);
                let _ = child.wait().await;
                None
            }
            None => {
                warn!(
                    "[{}] exceeded {}s, killing pid {:?} and its group",
                    self.name,
                    request.timeout_secs(),
                    child.id()
                );
                kill_tree(&mut child, &self.name);
                let _ = child.wait().await;
                None
            }
        };

        // A grandchild may still hold the pipes open; never wait on it long.
        let stderr = match stderr_task {
            Some(task) => join_within(task, limits.kill_grace).await.unwrap_or_default(),
            None => String::new(),
        };
        let stdout_ok = match stdout_task {
            Some(task) => match join_within(task, limits.kill_grace).await {
                Some(Ok(())) => true,
                Some(Err(e)) => {
                    warn!("[{}] writing stdout to output failed: {}", self.name, e);
                    false
                }
                None => false,
            },
            None => true,
        };

        // Where the tool itself writes, before relocation.
        let produced = match self.output {
            OutputTarget::File | OutputTarget::Stdout => output_path.to_path_buf(),
            OutputTarget::Directory => output_dir.join(format!("{input_stem}.{target_ext}")),
            OutputTarget::Stem => {
                let mut name = output_stem.into_os_string();
                name.push(".");
                name.push(target_ext);
                PathBuf::from(name)
            }
        };

        let Some(status) = status else {
            discard(output_path, &produced).await;
            return RawResult {
                status: RawStatus::TimedOut,
                output_path: None,
                stderr,
                duration: start.elapsed(),
            };
        };

        if !status.success() {
            discard(output_path, &produced).await;
            return RawResult {
                status: RawStatus::Failed {
                    exit_code: status.code(),
                },
                output_path: None,
                stderr,
                duration: start.elapsed(),
            };
        }

        let found = stdout_ok && relocate(&produced, output_path).await;
        if !found {
            discard(output_path, &produced).await;
        }

        RawResult {
            status: RawStatus::Success,
            output_path: found.then(|| output_path.to_path_buf()),
            stderr,
            duration: start.elapsed(),
        }
    }
}

// ── Invocation result ────────────────────────────────────────────────────

/// Knobs applied to every invocation.
#[derive(Debug, Clone)]
pub struct InvokeLimits {
    /// Stderr kept per attempt; the rest is drained and discarded.
    pub max_stderr_bytes: usize,
    /// How long to wait for pipes to close after the child exits or is killed.
    pub kill_grace: Duration,
}

impl Default for InvokeLimits {
    fn default() -> Self {
        Self {
            max_stderr_bytes: 8 * 1024,
            kill_grace: Duration::from_secs(1),
        }
    }
}

/// How the process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawStatus {
    Success,
    Failed { exit_code: Option<i32> },
    TimedOut,
    SpawnFailed { detail: String },
}

/// What one invocation left behind.
#[derive(Debug, Clone)]
pub struct RawResult {
    pub status: RawStatus,
    /// Set only when the process succeeded and a file exists at the requested path.
    pub output_path: Option<PathBuf>,
    pub stderr: String,
    pub duration: Duration,
}

// ── Backend set ──────────────────────────────────────────────────────────

/// The static, validated list of backends loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct BackendSet {
    backends: Vec<BackendDescriptor>,
}

impl BackendSet {
    /// Validate names (unique, filesystem-safe) and build the set.
    pub fn new(backends: Vec<BackendDescriptor>) -> Result<Self, ConvertError> {
        let mut seen = std::collections::HashSet::new();
        for b in &backends {
            let safe = !b.name.is_empty()
                && b.name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            if !safe {
                return Err(ConvertError::InvalidConfig(format!(
                    "backend name '{}' must be non-empty ASCII letters, digits, '-' or '_'",
                    b.name
                )));
            }
            if !seen.insert(b.name.as_str()) {
                return Err(ConvertError::InvalidConfig(format!(
                    "duplicate backend name '{}'",
                    b.name
                )));
            }
        }
        Ok(Self { backends })
    }

    pub fn iter(&self) -> impl Iterator<Item = &BackendDescriptor> {
        self.backends.iter()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Backends able to convert `source` into `target`, in ascending
    /// priority (configuration order breaks ties).
    pub fn routes(&self, source: DocumentFormat, target: DocumentFormat) -> Vec<BackendDescriptor> {
        let mut routes: Vec<BackendDescriptor> = self
            .backends
            .iter()
            .filter(|b| b.handles(source, target))
            .cloned()
            .collect();
        routes.sort_by_key(|b| b.priority);
        routes
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// Resolve a program name against `PATH`, or check a path directly.
pub fn find_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|p| is_executable(p))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file()
}

async fn probe(program: String, args: Vec<String>) -> bool {
    let child = Command::new(&program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status();
    match tokio::time::timeout(PROBE_TIMEOUT, child).await {
        Ok(Ok(status)) => status.success(),
        Ok(Err(e)) => {
            debug!("probe {} failed: {}", program, e);
            false
        }
        Err(_) => {
            warn!("probe {} timed out after {:?}", program, PROBE_TIMEOUT);
            false
        }
    }
}

/// Drain `reader` to EOF, keeping at most `max` bytes.
async fn read_bounded<R: AsyncRead + Unpin>(mut reader: R, max: usize) -> String {
    let mut kept = Vec::new();
    let mut truncated = false;
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = max.saturating_sub(kept.len());
                if n > room {
                    truncated = true;
                }
                kept.extend_from_slice(&buf[..n.min(room)]);
            }
        }
    }
    let mut text = String::from_utf8_lossy(&kept).trim().to_string();
    if truncated {
        text.push_str(" …[truncated]");
    }
    text
}

async fn join_within<T>(mut task: tokio::task::JoinHandle<T>, grace: Duration) -> Option<T> {
    match tokio::time::timeout(grace, &mut task).await {
        Ok(Ok(v)) => Some(v),
        Ok(Err(_)) => None,
        Err(_) => {
            task.abort();
            None
        }
    }
}

/// SIGKILL the child's process group; the child alone where groups are unavailable.
fn kill_tree(child: &mut Child, name: &str) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;
        // The child is not reaped yet, so its pid still names its group.
        match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) => return,
            Err(e) => warn!("[{}] killpg({}) failed: {}", name, pid, e),
        }
    }
    if let Err(e) = child.start_kill() {
        warn!("[{}] kill failed: {}", name, e);
    }
}

/// Remove the requested output and the tool's own output location.
async fn discard(output_path: &Path, produced: &Path) {
    remove_if_exists(output_path).await;
    if produced != output_path {
        remove_if_exists(produced).await;
    }
}

async fn remove_if_exists(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("could not remove '{}': {}", path.display(), e);
        }
    }
}

/// Move `from` onto `to` if they differ. Returns whether `to` now exists.
async fn relocate(from: &Path, to: &Path) -> bool {
    if from != to {
        if tokio::fs::metadata(from).await.is_err() {
            return false;
        }
        if let Err(e) = tokio::fs::rename(from, to).await {
            warn!(
                "could not move '{}' to '{}': {}",
                from.display(),
                to.display(),
                e
            );
            remove_if_exists(from).await;
            return false;
        }
    }
    tokio::fs::metadata(to).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_rejects_unknown_placeholder() {
        let err = CommandTemplate::new("soffice", ["--outdir", "{outdir}"]).unwrap_err();
        assert!(err.to_string().contains("{outdir}"), "got: {err}");
    }

    #[test]
    fn template_ignores_json_braces() {
        let t = CommandTemplate::new(
            "soffice",
            ["pdf:writer_pdf_Export:{\"EmbedStandardFonts\":true}", "{input}"],
        );
        assert!(t.is_ok());
    }

    #[test]
    fn template_renders_embedded_placeholders() {
        let t = CommandTemplate::new(
            "soffice",
            ["-env:UserInstallation=file://{profile_dir}", "{input}", "{bogus}"],
        );
        assert!(t.is_err());

        let t = CommandTemplate::new("soffice", ["-env:UserInstallation=file://{profile_dir}", "{input}"])
            .unwrap();
        let mut values = HashMap::new();
        values.insert("profile_dir", "/tmp/p1".to_string());
        values.insert("input", "/data/a b.docx".to_string());
        assert_eq!(
            t.render(&values),
            vec!["-env:UserInstallation=file:///tmp/p1", "/data/a b.docx"]
        );
        assert!(t.uses("profile_dir"));
        assert!(!t.uses("output"));
    }

    #[test]
    fn program_env_override() {
        let t = CommandTemplate::new("soffice", ["{input}"])
            .unwrap()
            .with_program_env("DOCCONV_TEST_SOFFICE_OVERRIDE");
        std::env::set_var("DOCCONV_TEST_SOFFICE_OVERRIDE", "/opt/lo/program/soffice");
        assert_eq!(t.program(), "/opt/lo/program/soffice");
        std::env::remove_var("DOCCONV_TEST_SOFFICE_OVERRIDE");
        assert_eq!(t.program(), "soffice");
    }

    #[cfg(unix)]
    #[test]
    fn fallback_programs_resolve_in_order() {
        let t = CommandTemplate::new("docconv-not-installed", ["{input}"])
            .unwrap()
            .with_fallback_programs(["docconv-also-missing", "sh", "bash"]);
        assert_eq!(t.program(), "sh");
        assert_eq!(t.fallback_programs().len(), 3);

        let none = CommandTemplate::new("docconv-not-installed", ["{input}"])
            .unwrap()
            .with_fallback_programs(["docconv-also-missing"]);
        assert_eq!(none.program(), "docconv-not-installed");
    }

    #[test]
    fn handles_respects_accepts_and_produces() {
        let cmd = CommandTemplate::new("pandoc", ["{input}", "-o", "{output}"]).unwrap();
        let b = BackendDescriptor::new("pandoc", 20, cmd.clone())
            .accepts([DocumentFormat::Markdown, DocumentFormat::Html]);
        assert!(b.handles(DocumentFormat::Markdown, DocumentFormat::Pdf));
        assert!(!b.handles(DocumentFormat::Docx, DocumentFormat::Pdf));
        assert!(!b.handles(DocumentFormat::Markdown, DocumentFormat::Txt));

        let any = BackendDescriptor::new("any", 1, cmd);
        assert!(any.handles(DocumentFormat::Tiff, DocumentFormat::Pdf));
    }

    #[test]
    fn routes_sorted_by_priority_stable() {
        let cmd = CommandTemplate::new("true", Vec::<String>::new()).unwrap();
        let set = BackendSet::new(vec![
            BackendDescriptor::new("c", 30, cmd.clone()),
            BackendDescriptor::new("a", 10, cmd.clone()),
            BackendDescriptor::new("b1", 20, cmd.clone()),
            BackendDescriptor::new("b2", 20, cmd.clone()),
            BackendDescriptor::new("txt", 1, cmd).produces(DocumentFormat::Txt),
        ])
        .unwrap();
        let names: Vec<_> = set
            .routes(DocumentFormat::Docx, DocumentFormat::Pdf)
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["a", "b1", "b2", "c"]);
    }

    #[test]
    fn backend_set_rejects_duplicates_and_unsafe_names() {
        let cmd = CommandTemplate::new("true", Vec::<String>::new()).unwrap();
        let dup = BackendSet::new(vec![
            BackendDescriptor::new("x", 1, cmd.clone()),
            BackendDescriptor::new("x", 2, cmd.clone()),
        ]);
        assert!(dup.unwrap_err().to_string().contains("duplicate"));

        let unsafe_name = BackendSet::new(vec![BackendDescriptor::new("../x", 1, cmd)]);
        assert!(unsafe_name.is_err());
    }

    #[tokio::test]
    async fn custom_availability_closure() {
        let cmd = CommandTemplate::new("true", Vec::<String>::new()).unwrap();
        let on = BackendDescriptor::new("on", 1, cmd.clone())
            .availability(AvailabilityCheck::Custom(Arc::new(|| true)));
        let off = BackendDescriptor::new("off", 1, cmd)
            .availability(AvailabilityCheck::Custom(Arc::new(|| false)));
        assert!(on.is_available().await);
        assert!(!off.is_available().await);
    }

    #[tokio::test]
    async fn missing_program_is_unavailable() {
        let cmd = CommandTemplate::new("docconv-definitely-not-installed", ["{input}"]).unwrap();
        let on_path = BackendDescriptor::new("ghost", 1, cmd.clone());
        assert!(!on_path.is_available().await);

        let probe = BackendDescriptor::new("ghost-probe", 1, cmd).availability(
            AvailabilityCheck::Probe {
                args: vec!["--version".into()],
            },
        );
        assert!(!probe.is_available().await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn sh_is_found_on_path() {
        assert!(find_program("sh").is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_directory_backend_leaves_no_tool_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = dir.path().join("letter.docx");
        std::fs::write(&source, b"PK\x03\x04 body").unwrap();
        let cmd = CommandTemplate::new(
            "sh",
            ["-c", "printf '%%PDF-partial' > \"$1/letter.pdf\"; exit 3", "sh", "{output_dir}"],
        )
        .unwrap();
        let backend = BackendDescriptor::new("lo", 1, cmd).output(OutputTarget::Directory);
        let request =
            ConversionRequest::new(&source, DocumentFormat::Docx, DocumentFormat::Pdf, 5);
        let attempt_dir = dir.path().join("attempt");
        let output_path = attempt_dir.join("renamed.pdf");

        let raw = backend
            .invoke(&request, &output_path, &InvokeLimits::default())
            .await;

        assert_eq!(raw.status, RawStatus::Failed { exit_code: Some(3) });
        assert!(raw.output_path.is_none());
        assert!(!attempt_dir.join("letter.pdf").exists());
        assert!(!output_path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timed_out_stem_backend_leaves_no_tool_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = dir.path().join("scan.png");
        std::fs::write(&source, b"\x89PNG").unwrap();
        let cmd = CommandTemplate::new(
            "sh",
            ["-c", "echo partial > \"$1.txt\"; sleep 10", "sh", "{output_stem}"],
        )
        .unwrap();
        let backend = BackendDescriptor::new("ocr", 1, cmd).output(OutputTarget::Stem);
        let request = ConversionRequest::new(&source, DocumentFormat::Png, DocumentFormat::Txt, 1);
        let output_path = dir.path().join("attempt").join("scan.v2.txt");
        let limits = InvokeLimits {
            kill_grace: Duration::from_millis(200),
            ..InvokeLimits::default()
        };

        let raw = backend.invoke(&request, &output_path, &limits).await;

        assert_eq!(raw.status, RawStatus::TimedOut);
        assert!(!output_path.exists());
    }

    #[tokio::test]
    async fn read_bounded_truncates() {
        let data: &[u8] = &[b'e'; 100];
        let text = read_bounded(data, 10).await;
        assert!(text.starts_with("eeeeeeeeee"));
        assert!(text.ends_with("[truncated]"));
    }
}
