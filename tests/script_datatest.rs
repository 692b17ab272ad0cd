mod common;

use datatest_stable::Utf8Path;
use pila::{lexer::Scanner, VmConfig};

#[derive(thiserror::Error, Debug)]
#[error("mismatch in datatest at {0}")]
pub struct DatatestError(Box<Utf8Path>);

/// A test file: two expectation sections and the source, separated by `---` lines.
///
/// Lines starting with `;` in the expectation sections are comments. Running with
/// `DATATEST_EXPECT` set rewrites the expectations from what actually happened, keeping
/// comments at the top of the section they were found in.
#[derive(Debug, Default)]
struct Datatest<'a> {
    first: Vec<&'a str>,
    second: Vec<&'a str>,
    source: String,
    first_comments: Vec<&'a str>,
    second_comments: Vec<&'a str>,
}

fn read_datatest(contents: &str) -> Datatest<'_> {
    #[derive(PartialEq, Eq)]
    enum Section {
        First,
        Second,
        Source,
    }
    let mut section = Section::First;
    let mut test = Datatest::default();
    for line in contents.lines() {
        if section != Section::Source && line.trim_end() == "---" {
            section = match section {
                Section::First => Section::Second,
                _ => Section::Source,
            };
            continue;
        }
        let comment = line.trim_start().starts_with(';');
        match section {
            Section::First if comment => test.first_comments.push(line),
            Section::First => test.first.push(line),
            Section::Second if comment => test.second_comments.push(line),
            Section::Second => test.second.push(line),
            Section::Source => {
                if !test.source.is_empty() {
                    test.source.push('\n');
                }
                test.source.push_str(line);
            }
        }
    }
    test
}

fn stitch_to_datatest(test: &Datatest, first: &str, second: &str) -> String {
    let mut lines = test.first_comments.clone();
    lines.extend(first.lines());
    lines.push("---");
    lines.extend(test.second_comments.iter().copied());
    lines.extend(second.lines());
    lines.push("---");
    lines.push(&test.source);
    let mut file = lines.join("\n");
    file.push('\n');
    file
}

fn expect(path: &Utf8Path, what: &str, got: &str, expected: &str) -> bool {
    if got.trim_end() == expected.trim_end() {
        return true;
    }
    println!(
        "error in {path}: mismatched {what}\n\nGot:\n{}\n\nExpected:\n{}",
        got.trim_end(),
        expected.trim_end()
    );
    false
}

/// `*.pila`: diagnostics, then program output, then the script.
fn script_test(path: &Utf8Path, contents: String) -> datatest_stable::Result<()> {
    let test = read_datatest(&contents);
    let run = common::run_with(VmConfig::default(), "", &test.source);

    if std::env::var("DATATEST_EXPECT").is_ok() {
        std::fs::write(path, stitch_to_datatest(&test, &run.diagnostics, &run.output))?;
        return Ok(());
    }

    let diagnostics_match = expect(path, "diagnostics", &run.diagnostics, &test.first.join("\n"));
    let output_match = expect(path, "output", &run.output, &test.second.join("\n"));
    if diagnostics_match && output_match {
        Ok(())
    } else {
        Err(DatatestError(Box::from(path)))?
    }
}

/// `*.lxd`: lexical errors, then tokens, then the source.
fn lexer_test(path: &Utf8Path, contents: String) -> datatest_stable::Result<()> {
    let test = read_datatest(&contents);
    let mut errors = vec![];
    let mut tokens = vec![];
    for lexeme in Scanner::new(&test.source) {
        match lexeme.token {
            Ok(token) => tokens.push(format!("[{:?}] {} {token:?}", lexeme.span, lexeme.line)),
            Err(error) => errors.push(format!("[{:?}] {} {error}", lexeme.span, lexeme.line)),
        }
    }
    let (errors, tokens) = (errors.join("\n"), tokens.join("\n"));

    if std::env::var("DATATEST_EXPECT").is_ok() {
        std::fs::write(path, stitch_to_datatest(&test, &errors, &tokens))?;
        return Ok(());
    }

    let errors_match = expect(path, "errors", &errors, &test.first.join("\n"));
    let tokens_match = expect(path, "tokens", &tokens, &test.second.join("\n"));
    if errors_match && tokens_match {
        Ok(())
    } else {
        Err(DatatestError(Box::from(path)))?
    }
}

datatest_stable::harness! {
    script_test, "test_data", r"^.*\.pila",
    lexer_test, "test_data", r"^.*\.lxd",
}
