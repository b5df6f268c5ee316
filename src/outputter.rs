use std::fmt::Write;

use console::Style;

use crate::asserter::AssertResult;
use crate::asserter::TestResult;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub recorded: usize,
}

impl Summary {
    pub fn of(results: &[AssertResult]) -> Self {
        results
            .iter()
            .fold(Summary::default(), |mut summary, result| {
                match result.status {
                    TestResult::Pass => summary.passed += 1,
                    TestResult::Fail(_) => summary.failed += 1,
                    TestResult::New => summary.recorded += 1,
                }
                summary
            })
    }
}

pub struct OutPutter;

impl OutPutter {
    pub fn start(script: &str, n_tests: usize) {
        let style = Style::new().bold().cyan();
        let open_text = format!("Running test file: {script} Found {n_tests} tests: Running...");

        println!("{}\n", style.apply_to(open_text));
    }

    /// Prints one block per test and a summary line. Returns the counts so
    /// the caller can decide the exit status.
    pub fn print(results: &[AssertResult]) -> Summary {
        let summary = Summary::of(results);
        print!("{}", Self::render(results, summary));
        summary
    }

    fn render(results: &[AssertResult], summary: Summary) -> String {
        let mut out = String::new();

        for result in results {
            // Writing to a String cannot fail.
            let _ = writeln!(out, "{result}");
        }

        let failed = if summary.failed > 0 {
            console::style(format!("{} failed", summary.failed)).red().bold()
        } else {
            console::style(format!("{} failed", summary.failed)).dim()
        };

        let _ = writeln!(
            out,
            "{}, {}, {}",
            console::style(format!("{} passed", summary.passed)).green().bold(),
            failed,
            console::style(format!("{} recorded", summary.recorded)).yellow(),
        );

        out
    }
}
