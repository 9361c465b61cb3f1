use crate::aggregator::RunReport;
use crate::types::{Outcome, Status};
use owo_colors::OwoColorize;
use std::fmt::Write;

/// 单台主机结果的文本形式
///
/// ```text
///     web1 | SUCCESS |     12.3456ms =>
/// hello
/// ```
pub fn render_outcome(outcome: &Outcome, color: bool) -> String {
    let elapsed = format!("{:?}", outcome.elapsed());
    let text = format!(
        "{:>8} |{:>8} |{:>13} =>\n{}\n",
        outcome.host(),
        outcome.status(),
        elapsed,
        outcome.message()
    );

    if !color {
        return text;
    }

    if outcome.changed() {
        return text.yellow().to_string();
    }
    match outcome.status() {
        Status::Success => text.green().to_string(),
        Status::Failed => text.red().to_string(),
        Status::Warning => text.purple().to_string(),
    }
}

/// 运行汇总：各状态计数与总耗时
pub fn render_summary(report: &RunReport, color: bool) -> String {
    let mut summary = String::new();
    let total = report
        .total_elapsed
        .map(|d| format!("{:?}", d))
        .unwrap_or_else(|| "-".to_string());

    let _ = write!(summary, "{} host(s) in {}: ", report.outcomes.len(), total);
    if color {
        let _ = write!(
            summary,
            "{} succeeded, {} failed, {} unmatched",
            report.successful.len().green(),
            report.failed.len().red(),
            report.warnings.len().purple()
        );
    } else {
        let _ = write!(
            summary,
            "{} succeeded, {} failed, {} unmatched",
            report.successful.len(),
            report.failed.len(),
            report.warnings.len()
        );
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlockError;
    use std::time::Duration;

    #[test]
    fn test_plain_outcome_layout() {
        let outcome = Outcome::success("web1", "hello".to_string(), false, Duration::from_millis(5));
        let text = render_outcome(&outcome, false);
        assert!(text.starts_with("    web1 | SUCCESS |"));
        assert!(text.ends_with(" =>\nhello\n"));
    }

    #[test]
    fn test_colored_outcome() {
        let failed = Outcome::failed(
            "db",
            &FlockError::Connection("refused".into()),
            Duration::ZERO,
        );
        let text = render_outcome(&failed, true);
        assert!(text.starts_with("\u{1b}[31m"));
        assert!(text.contains("refused"));

        let changed = Outcome::success("db", "copied".into(), true, Duration::ZERO);
        assert!(render_outcome(&changed, true).starts_with("\u{1b}[33m"));
    }

    #[test]
    fn test_summary() {
        let report = RunReport {
            outcomes: vec![
                Outcome::success("a", String::new(), false, Duration::ZERO),
                Outcome::warning("b", Duration::ZERO),
            ],
            total_elapsed: Some(Duration::from_secs(1)),
            successful: vec!["a".into()],
            failed: vec![],
            warnings: vec!["b".into()],
        };
        assert_eq!(
            render_summary(&report, false),
            "2 host(s) in 1s: 1 succeeded, 0 failed, 1 unmatched"
        );
    }
}
