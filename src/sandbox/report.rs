use anyhow::{Context, Result, anyhow, bail};

use super::Verdict;

// Fixed positions in the sandbox report
const MEMORY_LINE: usize = 2;
const TIME_LINE: usize = 3;
const VALUE_TOKEN: usize = 2;

/// Outcome extracted from one sandbox report
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSummary {
    pub verdict: Verdict,
    /// CPU time in seconds
    pub time_s: f64,
    /// Peak memory in KiB
    pub memory_kb: u32,
}

/// Classifies a sandbox report into a verdict and its measurements
///
/// `lines` are the report file's lines with surrounding whitespace trimmed.
/// The sandbox's own time accounting is not fully trusted: a run reported
/// `OK` whose CPU time exceeds `time_limit_s` is reclassified as
/// `TimeLimitExceeded`. The check uses the caller's original fractional
/// limit, not the whole-second limit the sandbox was instructed with. No
/// analogous re-check exists for memory.
///
/// Returns an error when the report does not follow the expected format;
/// an unrecognized status line is never mapped to a verdict, so format
/// drift in the sandbox surfaces as a fault instead of a misjudged run.
pub fn interpret_report<S: AsRef<str>>(lines: &[S], time_limit_s: f64) -> Result<ReportSummary> {
    let memory_token = field_token(lines, MEMORY_LINE)?;
    let memory_kb: u32 = memory_token
        .parse()
        .with_context(|| format!("Bad memory field in sandbox report: {memory_token:?}"))?;

    let time_token = field_token(lines, TIME_LINE)?;
    let time_s: f64 = time_token
        .parse()
        .with_context(|| format!("Bad cpu time field in sandbox report: {time_token:?}"))?;

    let status = lines
        .first()
        .map(S::as_ref)
        .ok_or_else(|| anyhow!("Sandbox report is empty"))?;

    let verdict = match status {
        "OK" => {
            if time_s > time_limit_s {
                Verdict::TimeLimitExceeded
            } else {
                Verdict::Ok
            }
        }
        "Time Limit Exceeded" => Verdict::TimeLimitExceeded,
        "Invalid Function" => Verdict::RestrictedFunction,
        "Internal Error" => Verdict::InternalError,
        s if s.starts_with("Command exited with non-zero status") => Verdict::NonZeroExit,
        s if s.starts_with("Command terminated by signal") => Verdict::Signal(signal_name(s)?),
        other => bail!("Unrecognized sandbox status line: {other:?}"),
    };

    Ok(ReportSummary {
        verdict,
        time_s,
        memory_kb,
    })
}

/// Returns the third whitespace-separated token of the given report line
fn field_token<'a, S: AsRef<str>>(lines: &'a [S], index: usize) -> Result<&'a str> {
    let line = lines
        .get(index)
        .map(S::as_ref)
        .ok_or_else(|| anyhow!("Sandbox report has no line {index}"))?;

    line.split_whitespace()
        .nth(VALUE_TOKEN)
        .ok_or_else(|| anyhow!("Sandbox report line {index} is too short: {line:?}"))
}

/// Extracts the signal name from a "Command terminated by signal ..." status
///
/// The sandbox appends a punctuation character directly after the name, so
/// the last token is taken with its trailing character removed.
fn signal_name(status: &str) -> Result<String> {
    let token = status.split_whitespace().next_back().unwrap_or("");
    let mut chars = token.chars();
    if chars.next_back().is_none() {
        bail!("Signal status carries no signal name: {status:?}");
    }
    Ok(chars.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn report_lines(status: &str, memory_kb: u32, time_s: f64) -> Vec<String> {
        vec![
            status.to_string(),
            "elapsed time: 1 seconds".to_string(),
            format!("memory usage: {memory_kb} kbytes"),
            format!("cpu usage: {time_s} seconds"),
        ]
    }

    #[test]
    fn test_ok_within_limit() {
        let lines = ["OK", "x", "mem 0 2048", "time 0 0.37"];
        let summary = interpret_report(&lines, 1.0).unwrap();
        assert_eq!(
            summary,
            ReportSummary {
                verdict: Verdict::Ok,
                time_s: 0.37,
                memory_kb: 2048,
            }
        );
    }

    #[test]
    fn test_ok_at_exact_limit_stays_ok() {
        let lines = report_lines("OK", 1024, 0.5);
        let summary = interpret_report(&lines, 0.5).unwrap();
        assert_eq!(summary.verdict, Verdict::Ok);
    }

    #[test]
    fn test_ok_over_limit_becomes_tle() {
        let lines = ["OK", "x", "mem 0 2048", "time 0 0.37"];
        let summary = interpret_report(&lines, 0.1).unwrap();
        assert_eq!(summary.verdict, Verdict::TimeLimitExceeded);
        assert_eq!(summary.time_s, 0.37);
        assert_eq!(summary.memory_kb, 2048);
    }

    #[test]
    fn test_explicit_time_limit_exceeded() {
        let lines = report_lines("Time Limit Exceeded", 500, 3.0);
        let summary = interpret_report(&lines, 10.0).unwrap();
        assert_eq!(summary.verdict, Verdict::TimeLimitExceeded);
    }

    #[test]
    fn test_invalid_function_is_rf() {
        let lines = report_lines("Invalid Function", 500, 0.01);
        let summary = interpret_report(&lines, 1.0).unwrap();
        assert_eq!(summary.verdict, Verdict::RestrictedFunction);
    }

    #[test]
    fn test_internal_error_is_ie() {
        let lines = report_lines("Internal Error", 0, 0.0);
        let summary = interpret_report(&lines, 1.0).unwrap();
        assert_eq!(summary.verdict, Verdict::InternalError);
    }

    #[test]
    fn test_non_zero_exit_is_nzec() {
        let lines = report_lines("Command exited with non-zero status 1", 800, 0.02);
        let summary = interpret_report(&lines, 1.0).unwrap();
        assert_eq!(summary.verdict, Verdict::NonZeroExit);
    }

    #[test]
    fn test_signal_name_extracted_without_trailing_period() {
        let lines = report_lines("Command terminated by signal SIGSEGV.", 1200, 0.05);
        let summary = interpret_report(&lines, 1.0).unwrap();
        assert_eq!(summary.verdict, Verdict::Signal("SIGSEGV".to_string()));
    }

    #[test]
    fn test_signal_with_other_trailing_punctuation() {
        let lines = report_lines("Command terminated by signal SIGKILL!", 64, 0.9);
        let summary = interpret_report(&lines, 1.0).unwrap();
        assert_eq!(summary.verdict, Verdict::Signal("SIGKILL".to_string()));
    }

    #[test]
    fn test_unrecognized_status_fails() {
        let lines = report_lines("Mystery Status", 100, 0.1);
        let err = interpret_report(&lines, 1.0).unwrap_err();
        assert!(err.to_string().contains("Unrecognized sandbox status"));
    }

    #[test]
    fn test_truncated_report_fails() {
        let lines = ["OK", "elapsed time: 1 seconds"];
        let err = interpret_report(&lines, 1.0).unwrap_err();
        assert!(err.to_string().contains("has no line 2"));
    }

    #[test]
    fn test_short_field_line_fails() {
        let lines = ["OK", "x", "memory", "cpu usage: 0.1 seconds"];
        let err = interpret_report(&lines, 1.0).unwrap_err();
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn test_bad_numeric_field_fails() {
        let lines = ["OK", "x", "memory usage: lots kbytes", "cpu usage: 0.1 seconds"];
        assert!(interpret_report(&lines, 1.0).is_err());

        let lines = ["OK", "x", "memory usage: 128 kbytes", "cpu usage: fast seconds"];
        assert!(interpret_report(&lines, 1.0).is_err());
    }

    #[test]
    fn test_known_outcomes_round_trip() {
        let cases = [
            ("OK", Verdict::Ok),
            ("Time Limit Exceeded", Verdict::TimeLimitExceeded),
            ("Invalid Function", Verdict::RestrictedFunction),
            ("Internal Error", Verdict::InternalError),
            (
                "Command exited with non-zero status 137",
                Verdict::NonZeroExit,
            ),
            (
                "Command terminated by signal SIGXFSZ.",
                Verdict::Signal("SIGXFSZ".to_string()),
            ),
        ];

        for (status, expected) in cases {
            let lines = report_lines(status, 4096, 0.25);
            let summary = interpret_report(&lines, 2.0).unwrap();
            assert_eq!(summary.verdict, expected, "status {status:?}");
            assert_eq!(summary.time_s, 0.25);
            assert_eq!(summary.memory_kb, 4096);
        }
    }
}
