use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use codespan_reporting::term::termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use serde::Deserialize;

use runtime::{CVarValue, ExecutionContext, Globals, Settings};

const TEST_SUFFIX: &str = ".test.bs";
const FENCE: &str = "---";

/// Expected value of a variable after the run.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ExpectedValue {
    Single(String),
    List(Vec<String>),
}

impl ExpectedValue {
    fn matches(&self, actual: &CVarValue) -> bool {
        match (self, actual) {
            (ExpectedValue::Single(want), CVarValue::Single(got)) => want == got,
            (ExpectedValue::List(want), CVarValue::List(got)) => want == got,
            _ => false,
        }
    }
}

/// Frontmatter of a `.test.bs` file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    pub description: Option<String>,
    /// Task input, available as <INPUT>.
    pub input: String,
    pub seed: Option<u64>,
    pub expect_parse_error: bool,
    /// Substring of the expected runtime error.
    pub expect_error: Option<String>,
    /// Local variables that must hold these values after the run.
    pub expect_variables: BTreeMap<String, ExpectedValue>,
    /// Substrings that must each appear in some task log entry.
    pub expect_log: Vec<String>,
}

/// Split a test file into its TOML header and script body.
///
/// The header sits between two lines consisting of `---`.
fn parse_test_file(content: &str) -> Result<(TestConfig, &str), String> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let mut lines = content.split_inclusive('\n');
    let first = lines.next().unwrap_or_default();
    if first.trim_end() != FENCE {
        return Err(format!("file must start with a {} line", FENCE));
    }

    let header_start = first.len();
    let mut offset = header_start;
    for line in lines {
        if line.trim_end() == FENCE {
            let header = &content[header_start..offset];
            let body = &content[offset + line.len()..];
            let config = toml::from_str(header).map_err(|e| format!("bad frontmatter: {}", e))?;
            return Ok((config, body));
        }
        offset += line.len();
    }
    Err(format!("frontmatter is not closed by a {} line", FENCE))
}

/// What happened to one test file.
pub struct TestReport {
    pub path: PathBuf,
    pub description: Option<String>,
    pub outcome: Result<(), String>,
}

impl TestReport {
    fn name(&self) -> String {
        match &self.description {
            Some(description) => description.clone(),
            None => self.path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
        }
    }
}

fn run_single_test(path: &Path) -> TestReport {
    let loaded = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read file: {}", e))
        .and_then(|content| {
            let (config, source) = parse_test_file(&content)?;
            Ok((config, source.to_string()))
        });

    match loaded {
        Ok((config, source)) => {
            let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
            TestReport {
                path: path.to_path_buf(),
                outcome: check(&config, &source, base_dir),
                description: config.description,
            }
        }
        Err(reason) => TestReport {
            path: path.to_path_buf(),
            description: None,
            outcome: Err(reason),
        },
    }
}

/// Parse and run `source`, then hold the result against the expectations.
fn check(config: &TestConfig, source: &str, base_dir: PathBuf) -> Result<(), String> {
    let parsed = blockscript::Parser::new(source.to_string(), 0).parse();
    let script = match (parsed, config.expect_parse_error) {
        (Err(_), true) => return Ok(()),
        (Ok(_), true) => return Err("script parsed, but a parse error was expected".into()),
        (Err(errors), false) => {
            let messages: Vec<_> = errors.iter().map(|e| e.message.as_str()).collect();
            return Err(format!("script failed to parse: {}", messages.join("; ")));
        }
        (Ok(script), false) => script,
    };

    let settings = Settings { base_dir, ..Settings::default() };
    let mut ctx = ExecutionContext::new(Arc::new(Globals::new()), settings).with_input(config.input.clone());
    if let Some(seed) = config.seed {
        ctx = ctx.with_seed(seed);
    }

    match (runtime::execute_config(&script, &mut ctx), &config.expect_error) {
        (Ok(()), None) => {}
        (Err(error), Some(wanted)) if error.to_string().contains(wanted.as_str()) => {}
        (Err(error), Some(wanted)) => {
            return Err(format!("runtime error \"{}\" does not mention \"{}\"", error, wanted));
        }
        (Err(error), None) => return Err(format!("runtime error: {}", error)),
        (Ok(()), Some(wanted)) => {
            return Err(format!("ran to completion, but an error mentioning \"{}\" was expected", wanted));
        }
    }

    check_variables(&ctx, &config.expect_variables)?;
    check_log(&ctx, &config.expect_log)
}

fn check_variables(ctx: &ExecutionContext, expected: &BTreeMap<String, ExpectedValue>) -> Result<(), String> {
    for (name, want) in expected {
        let var = ctx
            .variables
            .get(name)
            .ok_or_else(|| format!("variable {} was never set", name))?;
        if !want.matches(&var.value) {
            return Err(format!(
                "variable {}\n  want: {:?}\n  got:  {}",
                name,
                want,
                var.value.render()
            ));
        }
    }
    Ok(())
}

fn check_log(ctx: &ExecutionContext, expected: &[String]) -> Result<(), String> {
    let Some(missing) = expected.iter().find(|needle| !ctx.log.contains(needle)) else {
        return Ok(());
    };
    let mut reason = format!("no log entry mentions \"{}\"", missing);
    if ctx.log.entries().is_empty() {
        reason.push_str("\n  (log is empty)");
    }
    for entry in ctx.log.entries() {
        reason.push_str(&format!("\n  {} {}", entry.level, entry.message));
    }
    Err(reason)
}

/// Test files under `root`, keyed by the folder they sit in relative to
/// `root` ("" for `root` itself). Files are sorted within each category.
fn discover_categorized(root: &Path) -> BTreeMap<String, Vec<PathBuf>> {
    let mut suites: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for path in entries.flatten().map(|entry| entry.path()) {
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            let is_test = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(TEST_SUFFIX));
            if is_test {
                suites.entry(category_of(&dir, root)).or_default().push(path);
            }
        }
    }

    suites.values_mut().for_each(|files| files.sort());
    suites
}

fn category_of(dir: &Path, root: &Path) -> String {
    dir.strip_prefix(root)
        .map(|rel| {
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default()
}

fn display_category(category: &str) -> &str {
    if category.is_empty() { "(root)" } else { category }
}

/// Print the categories found under `path` with their test counts.
pub fn list_categories(path: &Path) {
    if path.is_file() {
        eprintln!("{} is a single test file", path.display());
        return;
    }

    let suites = discover_categorized(path);
    if suites.is_empty() {
        eprintln!("no {} files under {}", TEST_SUFFIX, path.display());
        return;
    }
    for (category, files) in &suites {
        eprintln!("{:<24} {} tests", display_category(category), files.len());
    }
}

/// Writes coloured PASS/FAIL lines and the summary.
struct Reporter {
    out: StandardStream,
}

impl Reporter {
    fn new(no_color: bool) -> Self {
        let choice = if no_color { ColorChoice::Never } else { ColorChoice::Auto };
        Reporter { out: StandardStream::stderr(choice) }
    }

    fn styled(&mut self, text: &str, color: Option<Color>, bold: bool) {
        let _ = self.out.set_color(ColorSpec::new().set_fg(color).set_bold(bold));
        let _ = write!(self.out, "{}", text);
        let _ = self.out.reset();
    }

    fn heading(&mut self, category: &str) {
        let _ = writeln!(self.out);
        self.styled(display_category(category), None, true);
        let _ = writeln!(self.out);
    }

    fn result(&mut self, report: &TestReport) {
        let _ = write!(self.out, "  ");
        match report.outcome {
            Ok(()) => self.styled("PASS", Some(Color::Green), false),
            Err(_) => self.styled("FAIL", Some(Color::Red), false),
        }
        let _ = writeln!(self.out, "  {}", report.name());
    }

    fn failures(&mut self, failed: &[TestReport]) {
        if failed.is_empty() {
            return;
        }
        let _ = writeln!(self.out, "\nfailures:");
        for report in failed {
            let _ = writeln!(self.out, "\n  {}", report.path.display());
            if let Err(reason) = &report.outcome {
                for line in reason.lines() {
                    let _ = writeln!(self.out, "    {}", line);
                }
            }
        }
    }

    fn summary(&mut self, passed: usize, failed: usize) {
        let _ = write!(self.out, "\ntest result: ");
        if failed == 0 {
            self.styled("ok", Some(Color::Green), true);
        } else {
            self.styled("FAILED", Some(Color::Red), true);
        }
        let _ = writeln!(self.out, ". {} passed; {} failed", passed, failed);
    }
}

/// Run the test file at `path`, or every test file below it.
///
/// `categories` narrows a directory run to those folders (and their
/// subfolders). Returns the process exit code.
pub fn run_tests(path: &Path, no_color: bool, categories: &[String]) -> i32 {
    let suites = if path.is_file() {
        BTreeMap::from([(String::new(), vec![path.to_path_buf()])])
    } else {
        let found = discover_categorized(path);
        if found.is_empty() {
            eprintln!("no {} files under {}", TEST_SUFFIX, path.display());
            return 1;
        }
        filter_categories(found, categories)
    };
    if suites.is_empty() {
        eprintln!("none of the requested categories exist");
        return 1;
    }

    let mut reporter = Reporter::new(no_color);
    let mut passed = 0;
    let mut failed = Vec::new();

    for (category, files) in &suites {
        if path.is_dir() {
            reporter.heading(category);
        }
        for file in files {
            let report = run_single_test(file);
            reporter.result(&report);
            if report.outcome.is_ok() {
                passed += 1;
            } else {
                failed.push(report);
            }
        }
    }

    reporter.failures(&failed);
    reporter.summary(passed, failed.len());
    if failed.is_empty() { 0 } else { 1 }
}

fn filter_categories(
    suites: BTreeMap<String, Vec<PathBuf>>,
    requested: &[String],
) -> BTreeMap<String, Vec<PathBuf>> {
    if requested.is_empty() {
        return suites;
    }

    let wanted: Vec<&str> = requested.iter().map(|r| r.trim_matches('/')).collect();
    for req in wanted.iter().filter(|req| !suites.keys().any(|cat| in_category(cat, req))) {
        let known: Vec<&str> = suites.keys().map(|k| display_category(k)).collect();
        eprintln!("warning: no category '{}' (known: {})", req, known.join(", "));
    }

    suites
        .into_iter()
        .filter(|(cat, _)| wanted.iter().any(|req| in_category(cat, req)))
        .collect()
}

/// `cat` is `req` or one of its subfolders.
fn in_category(cat: &str, req: &str) -> bool {
    cat == req || cat.strip_prefix(req).is_some_and(|rest| rest.starts_with('/'))
}
